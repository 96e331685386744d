//! # sf-core
//!
//! Shared error taxonomy and value types for skimflow.
//!
//! Every other crate in the workspace returns [`Result`] and exchanges
//! cut-flow reports and monitor histograms through the plain value types
//! defined here, so no crate depends on another crate's execution internals.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

pub use error::{Error, NameKind, Result};
pub use types::{
    CONTROL_PLOTS_NAMESPACE, ColumnType, ControlPlots, CutFlowEntry, CutFlowHistogram,
    CutFlowReport, DType, FlowPolicy, HistogramBinning, MonitorHistogram, Shape,
    TOTAL_INPUT_STAGE,
};

/// Workspace version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
