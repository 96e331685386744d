//! # sf-skim
//!
//! Cut-flow skimming on top of `sf-frame` and `sf-io`.
//!
//! [`CutFlowPipeline`] derives object-quality columns, applies the trigger
//! (OR) and data-quality (AND) stages plus any further selections, books
//! checkpoint histograms and writes one artifact. [`SkimRunner`] drives a
//! pipeline from a [`SkimConfig`], resolving inputs through a
//! [`DatasetCatalog`] and its file-list cache.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod config;
pub mod objects;
pub mod pipeline;
pub mod runner;

pub use catalog::{CommandCatalog, DatasetCatalog, FileListCache, apply_file_limit, resolve_inputs};
pub use config::{CheckpointNames, MonitorConfig, SelectionStage, SkimConfig, read_skim_config};
pub use objects::ObjectSelection;
pub use pipeline::{
    CutFlowPipeline, PipelineState, QUALITY_STAGE, StagePhase, StageRecord, TRIGGER_STAGE,
};
pub use runner::{RunSummary, SkimRunner};
