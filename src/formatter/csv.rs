//! CSV formatter with clean feature flag handling.
//!
//! Layout of a location directory:
//!
//! ```text
//! <root>/<name>_<run_uid>/
//!   metadata.json        # RunMetadata via serde_json
//!   <array>.csv          # "index,value" records, append-only
//! ```
//!
//! Failed cells are written with an empty value field and read back as the
//! sentinel; indices absent from the file stay sentinel too, which is what
//! makes partially flushed runs inspectable.

#[cfg(feature = "storage_csv")]
mod csv_enabled {
    use std::fs::{File, OpenOptions};
    use std::io::{BufReader, BufWriter, Write};
    use std::path::Path;

    use async_trait::async_trait;

    use crate::dataset::array::{is_sentinel, DataArray, SENTINEL};
    use crate::dataset::metadata::{ArrayDescriptor, RunMetadata};
    use crate::error::{SweepError, SweepResult};
    use crate::formatter::Formatter;

    /// One `<array>.csv` per array plus `metadata.json`.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct CsvFormatter;

    impl CsvFormatter {
        /// Create the formatter.
        pub fn new() -> Self {
            Self
        }

        fn array_path(location: &Path, array: &str) -> std::path::PathBuf {
            location.join(format!("{array}.csv"))
        }

        fn metadata_path(location: &Path) -> std::path::PathBuf {
            location.join("metadata.json")
        }
    }

    #[async_trait]
    impl Formatter for CsvFormatter {
        async fn write_metadata(
            &self,
            location: &Path,
            metadata: &RunMetadata,
        ) -> SweepResult<()> {
            let path = Self::metadata_path(location);
            let json = serde_json::to_string_pretty(metadata)
                .map_err(|e| SweepError::Formatter(format!("metadata encode: {e}")))?;
            // Write-then-rename so readers never see a torn metadata file.
            let tmp = path.with_extension("json.tmp");
            {
                let mut file = BufWriter::new(File::create(&tmp)?);
                file.write_all(json.as_bytes())?;
                file.flush()?;
            }
            std::fs::rename(&tmp, &path)?;
            Ok(())
        }

        async fn append_region(
            &self,
            location: &Path,
            array: &str,
            start: usize,
            values: &[f64],
        ) -> SweepResult<()> {
            let path = Self::array_path(location, array);
            let fresh = !path.exists();
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            let mut writer = csv::Writer::from_writer(BufWriter::new(file));

            if fresh {
                writer
                    .write_record(["index", "value"])
                    .map_err(|e| SweepError::Formatter(format!("{array}: header: {e}")))?;
            }
            for (offset, &value) in values.iter().enumerate() {
                let value_field = if is_sentinel(value) {
                    String::new()
                } else {
                    value.to_string()
                };
                writer
                    .write_record([(start + offset).to_string(), value_field])
                    .map_err(|e| SweepError::Formatter(format!("{array}: record: {e}")))?;
            }
            writer
                .flush()
                .map_err(|e| SweepError::Formatter(format!("{array}: flush: {e}")))?;
            Ok(())
        }

        async fn read_metadata(&self, location: &Path) -> SweepResult<RunMetadata> {
            let file = File::open(Self::metadata_path(location))?;
            serde_json::from_reader(BufReader::new(file))
                .map_err(|e| SweepError::Formatter(format!("metadata decode: {e}")))
        }

        async fn read_array(
            &self,
            location: &Path,
            descriptor: &ArrayDescriptor,
        ) -> SweepResult<DataArray> {
            let mut array = DataArray::new(
                descriptor.name.clone(),
                descriptor.unit.clone(),
                descriptor.shape.clone(),
            );

            let path = Self::array_path(location, &descriptor.name);
            if !path.exists() {
                // Nothing flushed yet for this array; all cells stay sentinel.
                return Ok(array);
            }

            let mut reader = csv::Reader::from_reader(BufReader::new(File::open(&path)?));
            for record in reader.records() {
                let record = record
                    .map_err(|e| SweepError::Formatter(format!("{}: {e}", descriptor.name)))?;
                let index: usize = record
                    .get(0)
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| {
                        SweepError::Formatter(format!("{}: bad index field", descriptor.name))
                    })?;
                let value = match record.get(1) {
                    None | Some("") => SENTINEL,
                    Some(s) => s.parse().map_err(|e| {
                        SweepError::Formatter(format!("{}: bad value field: {e}", descriptor.name))
                    })?,
                };
                array.restore(index, value)?;
            }
            Ok(array)
        }
    }
}

#[cfg(not(feature = "storage_csv"))]
mod csv_disabled {
    use std::path::Path;

    use async_trait::async_trait;

    use crate::dataset::array::DataArray;
    use crate::dataset::metadata::{ArrayDescriptor, RunMetadata};
    use crate::error::{SweepError, SweepResult};
    use crate::formatter::Formatter;

    /// Stub that reports the missing `storage_csv` feature.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct CsvFormatter;

    impl CsvFormatter {
        /// Create the formatter stub.
        pub fn new() -> Self {
            Self
        }
    }

    #[async_trait]
    impl Formatter for CsvFormatter {
        async fn write_metadata(&self, _: &Path, _: &RunMetadata) -> SweepResult<()> {
            Err(SweepError::FeatureNotEnabled("storage_csv".to_string()))
        }

        async fn append_region(&self, _: &Path, _: &str, _: usize, _: &[f64]) -> SweepResult<()> {
            Err(SweepError::FeatureNotEnabled("storage_csv".to_string()))
        }

        async fn read_metadata(&self, _: &Path) -> SweepResult<RunMetadata> {
            Err(SweepError::FeatureNotEnabled("storage_csv".to_string()))
        }

        async fn read_array(&self, _: &Path, _: &ArrayDescriptor) -> SweepResult<DataArray> {
            Err(SweepError::FeatureNotEnabled("storage_csv".to_string()))
        }
    }
}

#[cfg(feature = "storage_csv")]
pub use csv_enabled::CsvFormatter;

#[cfg(not(feature = "storage_csv"))]
pub use csv_disabled::CsvFormatter;
