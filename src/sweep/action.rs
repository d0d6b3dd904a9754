//! Actions - the units of work executed at each sweep point.
//!
//! Actions are a tagged variant dispatched by the engine's interpreter loop
//! rather than duck-typed callables. This keeps the per-point schedule
//! inspectable: the loop can enumerate which parameters will be read (and
//! therefore which dataset arrays to allocate) before any hardware traffic
//! happens.

use std::sync::Arc;
use std::time::Duration;

use crate::parameter::Parameter;

/// One unit of work at a sweep point.
#[derive(Clone)]
pub enum Action {
    /// Read a parameter; the sample lands in the matching dataset array at
    /// the current coordinate.
    Read(Arc<Parameter<f64>>),

    /// Write a fixed value to a parameter (a per-point side effect, e.g.
    /// re-arming a trigger line).
    Write(Arc<Parameter<f64>>, f64),

    /// Sleep for a fixed duration before the next action.
    Delay(Duration),

    /// Nested task list, executed in order.
    Group(Vec<Action>),
}

impl Action {
    /// Parameters this action reads, in execution order.
    ///
    /// Drives dataset array allocation at compile time.
    pub fn measured_parameters(&self) -> Vec<Arc<Parameter<f64>>> {
        let mut out = Vec::new();
        self.collect_measured(&mut out);
        out
    }

    fn collect_measured(&self, out: &mut Vec<Arc<Parameter<f64>>>) {
        match self {
            Action::Read(param) => out.push(param.clone()),
            Action::Group(actions) => {
                for action in actions {
                    action.collect_measured(out);
                }
            }
            Action::Write(..) | Action::Delay(_) => {}
        }
    }
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Read(p) => write!(f, "Read({})", p.name()),
            Action::Write(p, v) => write!(f, "Write({}, {})", p.name(), v),
            Action::Delay(d) => write!(f, "Delay({:?})", d),
            Action::Group(actions) => f.debug_tuple("Group").field(actions).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measured_parameters_flattens_groups() {
        let a = Arc::new(Parameter::new("a"));
        let b = Arc::new(Parameter::new("b"));

        let action = Action::Group(vec![
            Action::Read(a.clone()),
            Action::Delay(Duration::from_millis(1)),
            Action::Group(vec![Action::Read(b.clone()), Action::Write(a.clone(), 0.0)]),
        ]);

        let measured = action.measured_parameters();
        let names: Vec<&str> = measured.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_write_and_delay_measure_nothing() {
        let a = Arc::new(Parameter::new("a"));
        assert!(Action::Write(a, 1.0).measured_parameters().is_empty());
        assert!(Action::Delay(Duration::ZERO).measured_parameters().is_empty());
    }
}
