//! Background monitors - timer-driven polling alongside a sweep.
//!
//! A monitor owns its own 1-D append arrays inside the shared dataset, so
//! its samples never collide with the sweep's coordinate writes. Polling is
//! best-effort: a communication failure is logged and the tick skipped, and
//! a full array stops that entry quietly. The sweep never waits for a
//! monitor and a monitor never aborts a sweep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SweepConfig;
use crate::dataset::{ArrayDescriptor, ArrayKind, DataSet};
use crate::error::SweepResult;
use crate::parameter::Parameter;

/// Suffix distinguishing monitor arrays from sweep arrays of the same
/// parameter.
const MONITOR_SUFFIX: &str = "_monitor";

#[derive(Clone)]
struct MonitorEntry {
    parameter: Arc<Parameter<f64>>,
    interval: Duration,
}

/// Builder for a set of polled parameters.
#[derive(Clone, Default)]
pub struct Monitor {
    entries: Vec<MonitorEntry>,
}

impl Monitor {
    /// Empty monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Poll `parameter` every `interval`.
    pub fn poll(mut self, parameter: Arc<Parameter<f64>>, interval: Duration) -> Self {
        self.entries.push(MonitorEntry {
            parameter,
            interval,
        });
        self
    }

    /// Reserve one append array per polled parameter in `dataset`.
    ///
    /// Arrays are named `<parameter>_monitor` and sized by
    /// `config.monitor_capacity`. Must happen before the dataset is
    /// finalized.
    pub fn attach(
        self,
        dataset: Arc<DataSet>,
        config: &SweepConfig,
    ) -> SweepResult<AttachedMonitor> {
        for entry in &self.entries {
            dataset.add_array(ArrayDescriptor {
                name: format!("{}{}", entry.parameter.name(), MONITOR_SUFFIX),
                unit: entry.parameter.unit().to_string(),
                shape: vec![config.monitor_capacity],
                validator: entry.parameter.validator().summary(),
                kind: ArrayKind::Monitor,
            })?;
        }
        Ok(AttachedMonitor {
            entries: self.entries,
            dataset,
            flush_every: config.flush_every_points,
        })
    }
}

/// A monitor bound to a dataset, ready to spawn its polling tasks.
pub struct AttachedMonitor {
    entries: Vec<MonitorEntry>,
    dataset: Arc<DataSet>,
    flush_every: usize,
}

impl AttachedMonitor {
    /// Spawn one polling task per entry.
    pub fn spawn(self) -> MonitorHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let mut tasks = Vec::with_capacity(self.entries.len());
        for entry in self.entries {
            tasks.push(tokio::spawn(poll_loop(
                entry,
                self.dataset.clone(),
                self.flush_every,
                stop.clone(),
            )));
        }
        MonitorHandle { stop, tasks }
    }
}

/// Cooperative stop handle for the polling tasks.
pub struct MonitorHandle {
    stop: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Request a stop at the next poll boundary.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Request a stop and wait for all polling tasks to exit.
    pub async fn shutdown(self) {
        self.stop();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Monitor task panicked");
            }
        }
    }
}

async fn poll_loop(
    entry: MonitorEntry,
    dataset: Arc<DataSet>,
    flush_every: usize,
    stop: Arc<AtomicBool>,
) {
    let array = format!("{}{}", entry.parameter.name(), MONITOR_SUFFIX);
    let capacity = match dataset.shape(&array) {
        Ok(shape) => shape.iter().product::<usize>(),
        Err(e) => {
            warn!(array, error = %e, "Monitor array missing, not polling");
            return;
        }
    };

    let mut ticker = tokio::time::interval(entry.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first interval tick fires immediately; skip it so samples are
    // spaced by the configured interval from spawn time.
    ticker.tick().await;

    info!(array, interval = ?entry.interval, "Monitor polling started");
    let mut next = 0usize;
    let mut since_flush = 0usize;

    while !stop.load(Ordering::Acquire) {
        ticker.tick().await;
        if stop.load(Ordering::Acquire) {
            break;
        }
        if next >= capacity {
            warn!(array, capacity, "Monitor array full, stopping this entry");
            break;
        }

        match entry.parameter.get().await {
            Ok(value) => {
                match dataset.write(&array, &[next], value) {
                    Ok(()) => {
                        debug!(array, index = next, value, "Monitor sample");
                        next += 1;
                        since_flush += 1;
                    }
                    Err(e) => {
                        // Finalized dataset: the run is over, so are we.
                        warn!(array, error = %e, "Monitor write rejected, stopping");
                        break;
                    }
                }
            }
            Err(e) => {
                warn!(array, error = %e, "Monitor read failed, skipping tick");
            }
        }

        if since_flush >= flush_every {
            if let Err(e) = dataset.flush().await {
                warn!(array, error = %e, "Monitor flush failed, will retry");
            }
            since_flush = 0;
        }
    }
    info!(array, samples = next, "Monitor polling stopped");
}

#[cfg(all(test, feature = "storage_csv"))]
mod tests {
    use super::*;
    use crate::dataset::{is_sentinel, RunMetadata, RunStatus};
    use crate::formatter::CsvFormatter;

    fn config(root: &std::path::Path) -> SweepConfig {
        SweepConfig {
            data_root: root.to_path_buf(),
            monitor_capacity: 8,
            ..SweepConfig::default()
        }
    }

    async fn dataset(root: &std::path::Path) -> Arc<DataSet> {
        Arc::new(
            DataSet::create(
                root,
                RunMetadata::new("mon", vec![0]),
                Arc::new(CsvFormatter::new()),
            )
            .await
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_attach_reserves_append_array() {
        let dir = tempfile::tempdir().unwrap();
        let ds = dataset(dir.path()).await;
        let cfg = config(dir.path());

        let temperature = Arc::new(Parameter::new("cryo_temp").with_initial(4.2));
        Monitor::new()
            .poll(temperature, Duration::from_millis(5))
            .attach(ds.clone(), &cfg)
            .unwrap();

        assert_eq!(ds.shape("cryo_temp_monitor").unwrap(), vec![8]);
    }

    #[tokio::test]
    async fn test_polling_appends_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let ds = dataset(dir.path()).await;
        let cfg = config(dir.path());

        let temperature = Arc::new(Parameter::new("cryo_temp").with_initial(4.2));
        let handle = Monitor::new()
            .poll(temperature, Duration::from_millis(2))
            .attach(ds.clone(), &cfg)
            .unwrap()
            .spawn();

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.shutdown().await;

        let samples = ds.snapshot("cryo_temp_monitor").unwrap();
        let written = samples.iter().filter(|v| !is_sentinel(**v)).count();
        assert!(written >= 1);
        assert!(samples[..written].iter().all(|&v| v == 4.2));
    }

    #[tokio::test]
    async fn test_monitor_survives_read_failures() {
        let dir = tempfile::tempdir().unwrap();
        let ds = dataset(dir.path()).await;
        let cfg = config(dir.path());

        let mut flaky = Parameter::new("flaky");
        flaky.connect_reader(|| {
            Box::pin(async { Err(crate::error::SweepError::comm("offline")) })
        });
        let handle = Monitor::new()
            .poll(Arc::new(flaky), Duration::from_millis(2))
            .attach(ds.clone(), &cfg)
            .unwrap()
            .spawn();

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.shutdown().await;

        // Ticks were skipped, nothing written, nothing crashed.
        assert!(ds
            .snapshot("flaky_monitor")
            .unwrap()
            .iter()
            .all(|&v| is_sentinel(v)));
        ds.finalize(RunStatus::Completed, None).await.unwrap();
    }
}
