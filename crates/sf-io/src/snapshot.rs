//! Materialize a view into a skim artifact, publishing it atomically.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use indexmap::IndexSet;
use sf_core::{ControlPlots, Error, Result};
use sf_frame::{EventStream, ExecutionRequest, MonitorHistogramCollector};

use crate::artifact::{
    META_KEY_CONTROL_PLOTS, META_KEY_SCHEMA_VERSION, META_KEY_TABLE_NAME, OutputArtifact,
    SKIM_SCHEMA_V1, write_batch,
};

/// Writes the surviving events of a view, its cut-flow and its monitor
/// histograms into one Parquet file.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    table_name: String,
}

impl SnapshotWriter {
    /// Writer producing an event table called `table_name`.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self { table_name: table_name.into() }
    }

    /// Event table name.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Run the event loop of `stream` once and publish the artifact at `path`.
    ///
    /// `output_columns` must not be empty; they are de-duplicated (first
    /// occurrence wins) and checked against the view before the filesystem is
    /// touched. The artifact is
    /// written to a temporary file next to `path` and renamed into place only
    /// after everything succeeded; on failure `path` is left as it was.
    pub fn write<S: AsRef<str>>(
        &self,
        stream: &EventStream,
        output_columns: &[S],
        collector: MonitorHistogramCollector,
        path: &Path,
    ) -> Result<OutputArtifact> {
        let columns = dedup_columns(output_columns);
        if columns.is_empty() {
            return Err(Error::Validation(format!(
                "no output columns requested for {}",
                path.display()
            )));
        }
        for c in &columns {
            stream.column(c)?;
        }

        let mut tmp = create_temp_near(path)?;
        tracing::info!(
            path = %path.display(),
            columns = columns.len(),
            histograms = collector.len(),
            "writing skim"
        );

        let start = Instant::now();
        let request =
            ExecutionRequest::new().collect(columns.clone()).histograms(collector.into_bookings());
        let result = stream.execute(request)?;
        let table = result.table.unwrap_or_default();

        let plots = ControlPlots::new(&result.report, result.histograms.clone());
        let metadata = HashMap::from([
            (META_KEY_SCHEMA_VERSION.to_string(), SKIM_SCHEMA_V1.to_string()),
            (META_KEY_TABLE_NAME.to_string(), self.table_name.clone()),
            (META_KEY_CONTROL_PLOTS.to_string(), serde_json::to_string(&plots)?),
        ]);
        write_batch(tmp.as_file_mut(), &table, metadata)
            .map_err(|e| Error::io_write(path, e.to_string()))?;
        tmp.as_file().sync_all().map_err(|e| Error::io_write(path, e.to_string()))?;
        tmp.persist(path).map_err(|e| Error::io_write(path, e.error.to_string()))?;

        tracing::info!(
            path = %path.display(),
            events = table.n_events(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "skim written"
        );
        Ok(OutputArtifact {
            path: path.to_path_buf(),
            table_name: self.table_name.clone(),
            n_events: table.n_events() as u64,
            columns,
            report: result.report,
            histograms: result.histograms,
        })
    }
}

/// Order-stable de-duplication: first occurrence wins.
pub fn dedup_columns<S: AsRef<str>>(columns: &[S]) -> Vec<String> {
    let set: IndexSet<&str> = columns.iter().map(AsRef::as_ref).collect();
    set.into_iter().map(str::to_string).collect()
}

/// Probe the destination by creating the temporary file it will be renamed from.
fn create_temp_near(path: &Path) -> Result<tempfile::NamedTempFile> {
    if path.is_dir() {
        return Err(Error::io_write(path, "destination is a directory"));
    }
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    tempfile::Builder::new()
        .prefix(".skimflow-")
        .suffix(".parquet.tmp")
        .tempfile_in(dir)
        .map_err(|e| Error::io_write(path, e.to_string()))
}
