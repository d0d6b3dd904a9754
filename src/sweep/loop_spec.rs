//! Loop - the declarative sweep specification.
//!
//! A [`Loop`] is a pure description: axes from outermost to innermost, the
//! per-point action schedule, and the settle delay. Nothing touches hardware
//! or disk until [`Loop::compile`] allocates the dataset and returns an
//! [`ActiveLoop`](crate::sweep::ActiveLoop) ready to run. Because the spec
//! is a value, the same loop can be compiled and run any number of times,
//! each run landing in a fresh location.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SweepConfig;
use crate::dataset::{ArrayDescriptor, ArrayKind, DataSet, RunMetadata};
use crate::error::{SweepError, SweepResult};
use crate::formatter::Formatter;
use crate::parameter::Parameter;
use crate::sweep::active::ActiveLoop;
use crate::sweep::{Action, SweepRange};

/// One swept axis: a settable parameter and its set-points.
#[derive(Clone, Debug)]
pub struct SweepAxis {
    /// Parameter driven along this axis.
    pub parameter: Arc<Parameter<f64>>,
    /// Set-points visited along this axis.
    pub range: SweepRange,
}

/// Declarative sweep over one or more nested axes.
#[derive(Clone, Debug, Default)]
pub struct Loop {
    axes: Vec<SweepAxis>,
    actions: Vec<Action>,
    delay: Duration,
}

impl Loop {
    /// Start a loop with its outermost axis.
    pub fn sweep(parameter: Arc<Parameter<f64>>, range: SweepRange) -> Self {
        Self {
            axes: vec![SweepAxis { parameter, range }],
            actions: Vec::new(),
            delay: Duration::ZERO,
        }
    }

    /// Nest another axis inside the current innermost one.
    ///
    /// The new axis varies fastest: for each point of the enclosing axes it
    /// runs through its full range.
    pub fn nest(mut self, parameter: Arc<Parameter<f64>>, range: SweepRange) -> Self {
        self.axes.push(SweepAxis { parameter, range });
        self
    }

    /// Settle delay after each set, before the point's actions run.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Append one action to the per-point schedule.
    pub fn each(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Axes, outermost first.
    pub fn axes(&self) -> &[SweepAxis] {
        &self.axes
    }

    /// Per-point action schedule.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Settle delay after each set.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Product shape of the sweep, outermost dimension first.
    pub fn shape(&self) -> Vec<usize> {
        self.axes.iter().map(|a| a.range.len()).collect()
    }

    /// Total number of sweep points.
    pub fn num_points(&self) -> usize {
        self.shape().iter().product()
    }

    /// Parameters read by the per-point schedule, in execution order.
    pub fn measured_parameters(&self) -> Vec<Arc<Parameter<f64>>> {
        let mut out = Vec::new();
        for action in &self.actions {
            out.extend(action.measured_parameters());
        }
        out
    }

    /// Allocate storage and bind the loop to a fresh run.
    ///
    /// Builds the metadata record (one swept array per axis, one full-shape
    /// measured array per read parameter), creates the dataset location under
    /// `config.data_root`, and returns the runnable handle. The hardware is
    /// not touched here.
    pub async fn compile(
        self,
        name: &str,
        config: &SweepConfig,
        formatter: Arc<dyn Formatter>,
    ) -> SweepResult<ActiveLoop> {
        if self.axes.is_empty() {
            return Err(SweepError::Configuration(
                "a loop needs at least one swept axis".into(),
            ));
        }

        let shape = self.shape();
        let mut seen = HashSet::new();
        let mut metadata = RunMetadata::new(name, shape.clone());
        metadata.delay_s = self.delay.as_secs_f64();

        for axis in &self.axes {
            if !seen.insert(axis.parameter.name().to_string()) {
                return Err(SweepError::Configuration(format!(
                    "duplicate array name '{}' in loop",
                    axis.parameter.name()
                )));
            }
            metadata = metadata.with_array(ArrayDescriptor {
                name: axis.parameter.name().to_string(),
                unit: axis.parameter.unit().to_string(),
                shape: vec![axis.range.len()],
                validator: axis.parameter.validator().summary(),
                kind: ArrayKind::Swept,
            });
        }

        for parameter in self.measured_parameters() {
            if !seen.insert(parameter.name().to_string()) {
                return Err(SweepError::Configuration(format!(
                    "duplicate array name '{}' in loop",
                    parameter.name()
                )));
            }
            metadata = metadata.with_array(ArrayDescriptor {
                name: parameter.name().to_string(),
                unit: parameter.unit().to_string(),
                shape: shape.clone(),
                validator: parameter.validator().summary(),
                kind: ArrayKind::Measured,
            });
        }

        let dataset = DataSet::create(&config.data_root, metadata, formatter).await?;
        Ok(ActiveLoop::new(self, Arc::new(dataset), config.clone()))
    }
}
