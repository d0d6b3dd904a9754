//! DataSet - the concurrent coordinate-indexed sample store.
//!
//! One dataset per run. The sweep engine writes measured cells, background
//! monitors append into their own arrays, and any number of readers snapshot
//! contents at any time. The only shared resources needing mutual exclusion
//! are the flush cursors and the location state; individual arrays sit
//! behind their own `parking_lot::RwLock`, held only for the duration of a
//! cell access, never across an await.
//!
//! # Cell discipline
//!
//! A cell is written at most once (enforced by the overwrite check), so
//! writes into any single cell are totally ordered. Writes across arrays are
//! unordered relative to each other, but each carries its own coordinate, so
//! concurrent sweep/monitor traffic cannot corrupt anything.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::dataset::array::{DataArray, SENTINEL};
use crate::dataset::metadata::{ArrayDescriptor, RunMetadata, RunStatus};
use crate::dataset::subscriber::{
    FlushNotice, FlushedRegion, OverflowPolicy, SubscriberRegistry,
};
use crate::error::{SweepError, SweepResult};
use crate::formatter::Formatter;

/// Name of the lock file held while a location is being written.
const LOCK_FILE: &str = "run.lock";

struct FlushState {
    /// Written-prefix already persisted, per array.
    cursors: HashMap<String, usize>,
}

/// Named collection of arrays indexed by a shared set-point grid.
pub struct DataSet {
    location: PathBuf,
    arrays: RwLock<HashMap<String, Arc<RwLock<DataArray>>>>,
    metadata: RwLock<RunMetadata>,
    flush_state: Mutex<FlushState>,
    subscribers: SubscriberRegistry,
    formatter: Arc<dyn Formatter>,
    finalized: AtomicBool,
    /// Set when arrays were added after creation; cleared when the metadata
    /// record is rewritten on the next flush.
    metadata_dirty: AtomicBool,
}

impl DataSet {
    /// Create a dataset at a fresh location under `root`.
    ///
    /// The location (`<root>/<name>_<run_uid>`) is assigned here and is
    /// immutable for the dataset's lifetime. A `run.lock` file is held until
    /// [`DataSet::finalize`] releases it. The initial metadata record is
    /// written immediately so concurrent readers can discover the shapes.
    pub async fn create(
        root: &Path,
        metadata: RunMetadata,
        formatter: Arc<dyn Formatter>,
    ) -> SweepResult<Self> {
        let location = root.join(format!("{}_{}", metadata.name, metadata.run_uid));
        std::fs::create_dir_all(&location)?;
        std::fs::write(location.join(LOCK_FILE), metadata.run_uid.as_bytes())?;

        let mut arrays = HashMap::new();
        let mut cursors = HashMap::new();
        for descriptor in &metadata.arrays {
            arrays.insert(
                descriptor.name.clone(),
                Arc::new(RwLock::new(DataArray::new(
                    descriptor.name.clone(),
                    descriptor.unit.clone(),
                    descriptor.shape.clone(),
                ))),
            );
            cursors.insert(descriptor.name.clone(), 0);
        }

        formatter.write_metadata(&location, &metadata).await?;
        info!(location = %location.display(), run_uid = %metadata.run_uid, "Dataset created");

        Ok(Self {
            location,
            arrays: RwLock::new(arrays),
            metadata: RwLock::new(metadata),
            flush_state: Mutex::new(FlushState { cursors }),
            subscribers: SubscriberRegistry::new(),
            formatter,
            finalized: AtomicBool::new(false),
            metadata_dirty: AtomicBool::new(false),
        })
    }

    /// Reconstruct a dataset from a persisted location.
    ///
    /// Cells flushed so far come back exactly; unflushed cells report the
    /// sentinel. The loaded handle is read-only: it exists for inspecting
    /// completed or in-progress runs, not for resuming writes.
    pub async fn load(location: &Path, formatter: Arc<dyn Formatter>) -> SweepResult<Self> {
        let metadata = formatter.read_metadata(location).await?;

        let mut arrays = HashMap::new();
        let mut cursors = HashMap::new();
        for descriptor in &metadata.arrays {
            let array = formatter.read_array(location, descriptor).await?;
            cursors.insert(descriptor.name.clone(), array.written_prefix());
            arrays.insert(descriptor.name.clone(), Arc::new(RwLock::new(array)));
        }

        Ok(Self {
            location: location.to_path_buf(),
            arrays: RwLock::new(arrays),
            metadata: RwLock::new(metadata),
            flush_state: Mutex::new(FlushState { cursors }),
            subscribers: SubscriberRegistry::new(),
            formatter,
            finalized: AtomicBool::new(true),
            metadata_dirty: AtomicBool::new(false),
        })
    }

    /// Location directory of this run.
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Names of all arrays.
    pub fn array_names(&self) -> Vec<String> {
        self.metadata.read().arrays.iter().map(|a| a.name.clone()).collect()
    }

    /// Shape of one array.
    pub fn shape(&self, array: &str) -> SweepResult<Vec<usize>> {
        Ok(self.array(array)?.read().shape().to_vec())
    }

    /// Copy of the current metadata record.
    pub fn metadata(&self) -> RunMetadata {
        self.metadata.read().clone()
    }

    /// True once the dataset has been finalized (or was loaded from disk).
    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    /// Set a cell exactly once.
    ///
    /// Fails with [`SweepError::Overwrite`] when the cell already holds a
    /// non-sentinel value; use [`DataSet::rewrite`] for explicit partial
    /// reruns.
    pub fn write(&self, array: &str, coordinate: &[usize], value: f64) -> SweepResult<()> {
        self.write_inner(array, coordinate, value, false)
    }

    /// Replace a cell in rerun mode, bypassing the overwrite check.
    pub fn rewrite(&self, array: &str, coordinate: &[usize], value: f64) -> SweepResult<()> {
        self.write_inner(array, coordinate, value, true)
    }

    /// Mark a cell as a failed measurement.
    ///
    /// The cell counts as written (the flush cursor passes it) but holds the
    /// sentinel and may be filled by a later rerun without the rewrite flag.
    pub fn mark_failed(&self, array: &str, coordinate: &[usize]) -> SweepResult<()> {
        self.write_inner(array, coordinate, SENTINEL, false)
    }

    fn write_inner(
        &self,
        array: &str,
        coordinate: &[usize],
        value: f64,
        overwrite: bool,
    ) -> SweepResult<()> {
        if self.is_finalized() {
            return Err(SweepError::ReadOnly(format!(
                "dataset at {}",
                self.location.display()
            )));
        }
        self.array(array)?.write().write(coordinate, value, overwrite)
    }

    /// Current contents of one cell; sentinel when not yet written.
    ///
    /// Safe to call from concurrent readers at any time.
    pub fn read(&self, array: &str, coordinate: &[usize]) -> SweepResult<f64> {
        self.array(array)?.read().read(coordinate)
    }

    /// Flat copy of one array, sentinels included.
    pub fn snapshot(&self, array: &str) -> SweepResult<Vec<f64>> {
        Ok(self.array(array)?.read().snapshot())
    }

    /// Register a live consumer.
    ///
    /// The consumer receives a [`FlushNotice`] per flush cycle over a
    /// bounded channel; overflow drops notifications rather than stalling
    /// acquisition.
    pub fn subscribe(
        &self,
        capacity: usize,
        policy: OverflowPolicy,
    ) -> (u64, mpsc::Receiver<FlushNotice>) {
        self.subscribers.register(capacity, policy)
    }

    /// Remove a subscriber.
    pub fn unsubscribe(&self, id: u64) -> bool {
        self.subscribers.unregister(id)
    }

    /// Notifications dropped for a subscriber due to backpressure.
    pub fn subscriber_dropped(&self, id: u64) -> u64 {
        self.subscribers.dropped_count(id)
    }

    /// Incrementally persist newly written contiguous regions.
    ///
    /// For each array, the cells between the flush cursor and the current
    /// written prefix are handed to the formatter and the cursor advances on
    /// success. Idempotent: with no new data this is a no-op. On formatter
    /// failure the cursor stays put, so the data is retried on the next
    /// flush while remaining readable in memory.
    ///
    /// Returns the number of cells flushed in this cycle.
    pub async fn flush(&self) -> SweepResult<usize> {
        let mut state = self.flush_state.lock().await;

        // Collect pending regions without holding any array lock across an
        // await point.
        let handles: Vec<(String, Arc<RwLock<DataArray>>)> = self
            .arrays
            .read()
            .iter()
            .map(|(name, array)| (name.clone(), array.clone()))
            .collect();
        let mut regions: Vec<FlushedRegion> = Vec::new();
        for (name, array) in handles {
            let cursor = *state.cursors.get(&name).unwrap_or(&0);
            let guard = array.read();
            let prefix = guard.written_prefix();
            if prefix > cursor {
                regions.push(FlushedRegion {
                    array: name.clone(),
                    start: cursor,
                    values: guard.slice(cursor, prefix).to_vec(),
                });
            }
        }

        // Stable region order, so a partial batch is always the same prefix.
        regions.sort_by(|a, b| a.array.cmp(&b.array));

        if self.metadata_dirty.swap(false, Ordering::AcqRel) {
            let metadata = self.metadata.read().clone();
            self.formatter.write_metadata(&self.location, &metadata).await?;
        }

        if regions.is_empty() {
            return Ok(0);
        }

        let mut flushed = 0;
        let mut appended: Vec<FlushedRegion> = Vec::with_capacity(regions.len());
        for region in regions {
            if let Err(e) = self
                .formatter
                .append_region(&self.location, &region.array, region.start, &region.values)
                .await
            {
                drop(state);
                // Regions persisted before the failure advanced their
                // cursors, so this is the only chance to announce them.
                self.subscribers.notify_all(appended);
                return Err(e);
            }
            flushed += region.values.len();
            state
                .cursors
                .insert(region.array.clone(), region.start + region.values.len());
            appended.push(region);
        }
        drop(state);

        debug!(cells = flushed, "Flushed dataset regions");
        self.subscribers.notify_all(appended);
        Ok(flushed)
    }

    /// Mark the dataset read-only, perform a final flush, persist the
    /// terminal metadata, and release the location lock.
    pub async fn finalize(&self, status: RunStatus, reason: Option<String>) -> SweepResult<()> {
        if self.is_finalized() {
            return Err(SweepError::InvalidState(
                "dataset already finalized".to_string(),
            ));
        }

        self.flush().await?;

        let metadata = {
            let mut meta = self.metadata.write();
            meta.finish(status, reason);
            meta.clone()
        };
        self.formatter.write_metadata(&self.location, &metadata).await?;

        self.finalized.store(true, Ordering::Release);
        let lock_path = self.location.join(LOCK_FILE);
        if let Err(e) = std::fs::remove_file(&lock_path) {
            warn!(path = %lock_path.display(), error = %e, "Failed to remove lock file");
        }
        info!(
            location = %self.location.display(),
            status = ?status,
            "Dataset finalized"
        );
        Ok(())
    }

    /// Reserve an additional array after creation (used by monitors).
    ///
    /// Fails once the dataset is finalized or when the name is taken. The
    /// persisted metadata record is refreshed on the next flush.
    pub fn add_array(&self, descriptor: ArrayDescriptor) -> SweepResult<()> {
        if self.is_finalized() {
            return Err(SweepError::ReadOnly(format!(
                "dataset at {}",
                self.location.display()
            )));
        }
        let mut arrays = self.arrays.write();
        if arrays.contains_key(&descriptor.name) {
            return Err(SweepError::Configuration(format!(
                "array '{}' already exists",
                descriptor.name
            )));
        }
        arrays.insert(
            descriptor.name.clone(),
            Arc::new(RwLock::new(DataArray::new(
                descriptor.name.clone(),
                descriptor.unit.clone(),
                descriptor.shape.clone(),
            ))),
        );
        drop(arrays);
        self.metadata.write().arrays.push(descriptor);
        self.metadata_dirty.store(true, Ordering::Release);
        Ok(())
    }

    fn array(&self, name: &str) -> SweepResult<Arc<RwLock<DataArray>>> {
        self.arrays
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| SweepError::UnknownArray(name.to_string()))
    }
}

impl std::fmt::Debug for DataSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSet")
            .field("location", &self.location)
            .field("arrays", &self.array_names())
            .field("finalized", &self.is_finalized())
            .finish()
    }
}
