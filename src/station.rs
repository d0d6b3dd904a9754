//! Station - the explicit parameter registry for one rig.
//!
//! Everything a measurement can touch is registered here by name, so a loop
//! spec and its metadata can be audited against one object instead of
//! process-global state. Registration is append-only; an instrument that
//! goes away stays in the station so old run metadata keeps resolving.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{SweepError, SweepResult};
use crate::parameter::{Parameter, ParameterSnapshot};

/// Named collection of the parameters available on one rig.
#[derive(Debug, Default)]
pub struct Station {
    parameters: RwLock<HashMap<String, Arc<Parameter<f64>>>>,
}

impl Station {
    /// Empty station.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter under its own name.
    ///
    /// Names are unique per station; a duplicate fails rather than silently
    /// replacing the earlier registration.
    pub fn add(&self, parameter: Arc<Parameter<f64>>) -> SweepResult<()> {
        let mut parameters = self.parameters.write();
        let name = parameter.name().to_string();
        if parameters.contains_key(&name) {
            return Err(SweepError::Configuration(format!(
                "parameter '{name}' is already registered"
            )));
        }
        parameters.insert(name, parameter);
        Ok(())
    }

    /// Look up a parameter by name.
    pub fn get(&self, name: &str) -> Option<Arc<Parameter<f64>>> {
        self.parameters.read().get(name).cloned()
    }

    /// Registered parameter names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.parameters.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered parameters.
    pub fn len(&self) -> usize {
        self.parameters.read().len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.parameters.read().is_empty()
    }

    /// Snapshot of every registered parameter, keyed by name.
    ///
    /// Attached to run metadata as annotations so a dataset records the full
    /// state of the rig at run time, not just the swept axes.
    pub fn snapshot(&self) -> HashMap<String, ParameterSnapshot<f64>> {
        self.parameters
            .read()
            .iter()
            .map(|(name, parameter)| (name.clone(), parameter.snapshot()))
            .collect()
    }
}
