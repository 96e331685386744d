//! Skim artifact layout and plain Parquet event-table files.
//!
//! # Schema: `skimflow_skim_v1`
//!
//! A skim artifact is a single Parquet file. Its columns are the selected
//! per-event columns of the surviving events. Bookkeeping lives in the
//! key-value metadata, never in the event columns:
//!
//! | Key                        | Value                                          |
//! |----------------------------|------------------------------------------------|
//! | `skimflow.schema_version`  | `"skimflow_skim_v1"`                           |
//! | `skimflow.table_name`      | name of the event table (e.g. `Events`)        |
//! | `skimflow.control_plots`   | JSON [`ControlPlots`]: `cutflow` + histograms  |
//!
//! Plain event-table files written by [`write_event_table`] carry only the
//! table name.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde::Serialize;
use sf_core::{ControlPlots, CutFlowReport, Error, MonitorHistogram, Result};
use sf_frame::EventTable;

use crate::convert::{schema_from_arrow, table_from_record_batch, table_to_record_batch};

/// Schema version string embedded in Parquet key-value metadata.
pub const SKIM_SCHEMA_V1: &str = "skimflow_skim_v1";

/// Parquet metadata key for the schema version.
pub const META_KEY_SCHEMA_VERSION: &str = "skimflow.schema_version";

/// Parquet metadata key for the event table name.
pub const META_KEY_TABLE_NAME: &str = "skimflow.table_name";

/// Parquet metadata key for the control-plots namespace (JSON).
pub const META_KEY_CONTROL_PLOTS: &str = "skimflow.control_plots";

/// Summary of a successfully published skim artifact.
#[derive(Debug, Clone, Serialize)]
pub struct OutputArtifact {
    /// Final location.
    pub path: PathBuf,
    /// Event table name.
    pub table_name: String,
    /// Surviving events written.
    pub n_events: u64,
    /// Written columns, in order.
    pub columns: Vec<String>,
    /// Cut-flow of the written view.
    pub report: CutFlowReport,
    /// Monitor histograms, in booking order.
    pub histograms: Vec<MonitorHistogram>,
}

/// Everything stored in a skim artifact.
#[derive(Debug, Clone)]
pub struct ArtifactContents {
    /// Value of `skimflow.schema_version`.
    pub schema_version: String,
    /// Event table name.
    pub table_name: String,
    /// Surviving events.
    pub table: EventTable,
    /// Cut-flow and monitor histograms.
    pub control_plots: ControlPlots,
}

pub(crate) fn default_compression() -> Compression {
    Compression::SNAPPY
}

pub(crate) fn write_batch<W: std::io::Write + Send>(
    sink: W,
    table: &EventTable,
    metadata: HashMap<String, String>,
) -> Result<()> {
    let batch = table_to_record_batch(table, metadata)?;
    let props = WriterProperties::builder().set_compression(default_compression()).build();
    let mut writer = ArrowWriter::try_new(sink, batch.schema(), Some(props))
        .map_err(|e| Error::Validation(format!("failed to create Parquet writer: {e}")))?;
    writer.write(&batch).map_err(|e| Error::Validation(format!("failed to write Parquet: {e}")))?;
    writer
        .close()
        .map_err(|e| Error::Validation(format!("failed to close Parquet writer: {e}")))?;
    Ok(())
}

/// Write an event table as a plain Parquet file tagged with `table_name`.
pub fn write_event_table(table: &EventTable, table_name: &str, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| Error::io_write(path, e.to_string()))?;
    let metadata = HashMap::from([(META_KEY_TABLE_NAME.to_string(), table_name.to_string())]);
    write_batch(file, table, metadata)
}

/// Read a skim artifact back.
pub fn read_artifact(path: &Path) -> Result<ArtifactContents> {
    let file = File::open(path)
        .map_err(|e| Error::Validation(format!("failed to open {}: {e}", path.display())))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| Error::Validation(format!("failed to read Parquet: {e}")))?;

    let full_schema = builder.schema().clone();
    let meta = full_schema.metadata();
    let schema_version = meta.get(META_KEY_SCHEMA_VERSION).cloned().ok_or_else(|| {
        Error::Validation(format!("{} is not a skim artifact (no schema version)", path.display()))
    })?;
    if schema_version != SKIM_SCHEMA_V1 {
        return Err(Error::Validation(format!(
            "unsupported artifact schema '{schema_version}' (expected '{SKIM_SCHEMA_V1}')"
        )));
    }
    let table_name = meta.get(META_KEY_TABLE_NAME).cloned().unwrap_or_default();
    let plots_json = meta
        .get(META_KEY_CONTROL_PLOTS)
        .ok_or_else(|| Error::Validation("artifact has no control plots".into()))?;
    let control_plots: ControlPlots = serde_json::from_str(plots_json)?;

    let schema = schema_from_arrow(&full_schema);
    let columns: Vec<String> = schema.names().map(str::to_string).collect();
    let reader = builder
        .build()
        .map_err(|e| Error::Validation(format!("failed to build Parquet reader: {e}")))?;
    let mut table = EventTable::new();
    let mut first = true;
    for batch in reader {
        let batch =
            batch.map_err(|e| Error::Validation(format!("failed to read Parquet batch: {e}")))?;
        let part = table_from_record_batch(&batch, &schema, &columns)?;
        if first {
            table = part;
            first = false;
        } else {
            table.extend(&part)?;
        }
    }
    if first {
        table = empty_table(&schema)?;
    }

    Ok(ArtifactContents { schema_version, table_name, table, control_plots })
}

pub(crate) fn empty_table(schema: &sf_frame::Schema) -> Result<EventTable> {
    let mut t = EventTable::new();
    for (name, ty) in schema.iter() {
        t.insert(name, sf_frame::Column::empty(ty))?;
    }
    Ok(t)
}
