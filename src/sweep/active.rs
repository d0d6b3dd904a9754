//! ActiveLoop - the compiled, runnable side of a sweep.
//!
//! The engine is a small interpreter over the loop's action schedule. It
//! walks the Cartesian grid in row-major order (innermost axis fastest),
//! sets only the axes whose index changed since the previous point, settles,
//! then executes the per-point actions. An external abort is honored
//! cooperatively between points, so the cell being measured when the signal
//! arrives is always completed or marked failed, never torn.
//!
//! Communication errors are retried with backoff; on exhaustion the
//! configured [`CommErrorPolicy`] decides between marking the cell failed
//! and carrying on, or stopping the run with everything gathered so far
//! flushed and finalized.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::config::{CommErrorPolicy, SweepConfig};
use crate::dataset::{DataSet, RunStatus};
use crate::error::{SweepError, SweepResult};
use crate::parameter::Parameter;
use crate::sweep::loop_spec::Loop;
use crate::sweep::Action;

/// Lifecycle state of an [`ActiveLoop`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    /// Storage allocated, hardware untouched.
    Compiled,
    /// The point loop is executing.
    Running,
    /// Every point was visited.
    Completed,
    /// Stopped by an abort signal; partial data preserved.
    Aborted,
    /// Stopped by an escalated error; partial data preserved.
    Failed,
}

/// Cloneable handle used to request a cooperative abort.
#[derive(Clone, Debug, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    /// Request that the run stop at the next point boundary.
    pub fn abort(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// True once an abort was requested.
    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Summary returned when a run ends.
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    /// How the run ended.
    pub status: RunStatus,
    /// Points in the full grid.
    pub points_total: usize,
    /// Points actually visited.
    pub points_completed: usize,
    /// Cells marked failed by the fail-forward policy.
    pub cells_failed: usize,
    /// Dataset location of the run.
    pub location: PathBuf,
}

/// A compiled loop bound to a dataset, ready to run exactly once.
pub struct ActiveLoop {
    spec: Loop,
    dataset: Arc<DataSet>,
    config: SweepConfig,
    state: Mutex<LoopState>,
    abort: AbortHandle,
}

impl ActiveLoop {
    pub(crate) fn new(spec: Loop, dataset: Arc<DataSet>, config: SweepConfig) -> Self {
        Self {
            spec,
            dataset,
            config,
            state: Mutex::new(LoopState::Compiled),
            abort: AbortHandle::default(),
        }
    }

    /// The dataset this run writes into. Safe to share with monitors and
    /// subscribers while the run is going.
    pub fn dataset(&self) -> Arc<DataSet> {
        self.dataset.clone()
    }

    /// Handle for requesting a cooperative abort from another task.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LoopState {
        *self.state.lock()
    }

    /// Execute the sweep to completion, abort, or failure.
    ///
    /// Runs at most once per compiled loop; a second call fails with
    /// [`SweepError::InvalidState`]. On any exit path the dataset is
    /// finalized with the matching status and everything gathered so far is
    /// flushed.
    pub async fn run(&self) -> SweepResult<RunReport> {
        {
            let mut state = self.state.lock();
            if *state != LoopState::Compiled {
                return Err(SweepError::InvalidState(format!(
                    "loop already ran (state: {:?})",
                    *state
                )));
            }
            *state = LoopState::Running;
        }

        info!(
            location = %self.dataset.location().display(),
            shape = ?self.spec.shape(),
            points = self.spec.num_points(),
            "Sweep started"
        );

        match self.drive().await {
            Ok(report) => {
                *self.state.lock() = match report.status {
                    RunStatus::Aborted => LoopState::Aborted,
                    _ => LoopState::Completed,
                };
                info!(
                    status = ?report.status,
                    completed = report.points_completed,
                    failed_cells = report.cells_failed,
                    "Sweep finished"
                );
                Ok(report)
            }
            Err(e) => {
                *self.state.lock() = LoopState::Failed;
                error!(error = %e, "Sweep failed");
                if !self.dataset.is_finalized() {
                    if let Err(fin) = self
                        .dataset
                        .finalize(RunStatus::Failed, Some(e.to_string()))
                        .await
                    {
                        warn!(error = %fin, "Finalize after failure also failed");
                    }
                }
                Err(e)
            }
        }
    }

    async fn drive(&self) -> SweepResult<RunReport> {
        let shape = self.spec.shape();
        let total = self.spec.num_points();

        // Swept axes are deterministic, so their 1-D arrays are filled up
        // front and land in the first flush.
        for axis in self.spec.axes() {
            let name = axis.parameter.name();
            for (index, value) in axis.range.points().enumerate() {
                self.dataset.write(name, &[index], value)?;
            }
        }
        let mut flush_failures = 0u32;
        self.flush_tolerant(&mut flush_failures).await?;

        let mut completed = 0;
        let mut cells_failed = 0;
        let mut since_flush = 0;
        let mut previous: Option<Vec<usize>> = None;

        for linear in 0..total {
            if self.abort.is_aborted() {
                info!(completed, "Abort requested, stopping at point boundary");
                self.dataset
                    .finalize(RunStatus::Aborted, Some("abort requested".into()))
                    .await?;
                return Ok(self.report(RunStatus::Aborted, total, completed, cells_failed));
            }

            let coordinate = unravel(linear, &shape);
            for (i, axis) in self.spec.axes().iter().enumerate() {
                let changed = previous.as_ref().map_or(true, |p| p[i] != coordinate[i]);
                if changed {
                    // Points are in range by construction of the grid walk.
                    let value = axis.range.point(coordinate[i]).unwrap_or_default();
                    self.set_with_retry(&axis.parameter, value).await?;
                }
            }
            if self.spec.delay() > Duration::ZERO {
                tokio::time::sleep(self.spec.delay()).await;
            }

            for action in self.spec.actions() {
                self.execute(action, &coordinate, &mut cells_failed).await?;
            }

            previous = Some(coordinate);
            completed += 1;
            since_flush += 1;
            if since_flush >= self.config.flush_every_points {
                self.flush_tolerant(&mut flush_failures).await?;
                since_flush = 0;
            }
        }

        self.dataset.finalize(RunStatus::Completed, None).await?;
        Ok(self.report(RunStatus::Completed, total, completed, cells_failed))
    }

    fn report(
        &self,
        status: RunStatus,
        total: usize,
        completed: usize,
        cells_failed: usize,
    ) -> RunReport {
        RunReport {
            status,
            points_total: total,
            points_completed: completed,
            cells_failed,
            location: self.dataset.location().to_path_buf(),
        }
    }

    fn execute<'a>(
        &'a self,
        action: &'a Action,
        coordinate: &'a [usize],
        cells_failed: &'a mut usize,
    ) -> BoxFuture<'a, SweepResult<()>> {
        Box::pin(async move {
            match action {
                Action::Read(parameter) => match self.get_with_retry(parameter).await {
                    Ok(value) => self.dataset.write(parameter.name(), coordinate, value),
                    Err(e) if e.is_recoverable() => match self.config.on_comm_error {
                        CommErrorPolicy::FailForward => {
                            warn!(
                                parameter = parameter.name(),
                                coordinate = ?coordinate,
                                error = %e,
                                "Measurement failed, marking cell and continuing"
                            );
                            self.dataset.mark_failed(parameter.name(), coordinate)?;
                            *cells_failed += 1;
                            Ok(())
                        }
                        CommErrorPolicy::Abort => Err(e),
                    },
                    Err(e) => Err(e),
                },
                Action::Write(parameter, value) => {
                    self.set_with_retry(parameter, *value).await
                }
                Action::Delay(duration) => {
                    tokio::time::sleep(*duration).await;
                    Ok(())
                }
                Action::Group(actions) => {
                    for action in actions {
                        self.execute(action, coordinate, cells_failed).await?;
                    }
                    Ok(())
                }
            }
        })
    }

    /// Set with retry on communication errors. Validation errors are never
    /// retried and escalate immediately; an unsettable axis is a broken rig,
    /// so exhausted set retries always fail the run regardless of the
    /// fail-forward policy.
    /// Flush with the deferred-failure policy.
    ///
    /// A failed flush leaves the cursors in place and the data in memory,
    /// so the next cycle retries the same cells; the run only stops after
    /// `max_flush_failures` consecutive failures.
    async fn flush_tolerant(&self, failures: &mut u32) -> SweepResult<()> {
        match self.dataset.flush().await {
            Ok(_) => {
                *failures = 0;
                Ok(())
            }
            Err(e) => {
                *failures += 1;
                if *failures >= self.config.max_flush_failures {
                    error!(
                        consecutive = *failures,
                        error = %e,
                        "Flush failing persistently, stopping run"
                    );
                    Err(e)
                } else {
                    warn!(
                        consecutive = *failures,
                        error = %e,
                        "Flush failed, holding data in memory for retry"
                    );
                    Ok(())
                }
            }
        }
    }

    async fn set_with_retry(&self, parameter: &Parameter<f64>, value: f64) -> SweepResult<()> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match parameter.set(value).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_recoverable() && attempt < self.config.retry.max_attempts => {
                    warn!(
                        parameter = parameter.name(),
                        attempt,
                        error = %e,
                        "Instrument write failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry.backoff).await;
                }
                Err(SweepError::Communication { source_msg, .. }) => {
                    return Err(SweepError::Communication {
                        source_msg,
                        attempts: attempt,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_with_retry(&self, parameter: &Parameter<f64>) -> SweepResult<f64> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match parameter.get().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_recoverable() && attempt < self.config.retry.max_attempts => {
                    warn!(
                        parameter = parameter.name(),
                        attempt,
                        error = %e,
                        "Instrument read failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry.backoff).await;
                }
                Err(SweepError::Communication { source_msg, .. }) => {
                    return Err(SweepError::Communication {
                        source_msg,
                        attempts: attempt,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl std::fmt::Debug for ActiveLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveLoop")
            .field("shape", &self.spec.shape())
            .field("state", &self.state())
            .field("location", &self.dataset.location())
            .finish()
    }
}

/// Row-major coordinate for a linear point index.
fn unravel(mut linear: usize, shape: &[usize]) -> Vec<usize> {
    let mut coordinate = vec![0; shape.len()];
    for (i, &dim) in shape.iter().enumerate().rev() {
        coordinate[i] = linear % dim;
        linear /= dim;
    }
    coordinate
}
