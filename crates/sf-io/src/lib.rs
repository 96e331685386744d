//! # sf-io
//!
//! Parquet I/O for skimflow: reading event tables as an
//! [`EventSource`](sf_frame::EventSource), and publishing skim artifacts
//! (selected columns + cut-flow + monitor histograms) atomically.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod artifact;
pub mod convert;
pub mod parquet_source;
pub mod snapshot;

pub use artifact::{
    ArtifactContents, META_KEY_CONTROL_PLOTS, META_KEY_SCHEMA_VERSION, META_KEY_TABLE_NAME,
    OutputArtifact, SKIM_SCHEMA_V1, read_artifact, write_event_table,
};
pub use parquet_source::{ParquetSource, is_remote};
pub use snapshot::{SnapshotWriter, dedup_columns};
