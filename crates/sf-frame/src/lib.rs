//! # sf-frame
//!
//! Lazy columnar event streams for skimflow.
//!
//! An [`EventStream`] is an immutable view over an [`EventSource`]: a chain of
//! column definitions and named filters. Building a view reads nothing;
//! materializing it runs one partitioned event loop on the view's [`Engine`]
//! and yields the cut-flow, the surviving events and any monitor histograms
//! booked through a [`MonitorHistogramCollector`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use sf_frame::{Column, Engine, EventStream, EventTable, MemorySource};
//!
//! # fn main() -> sf_core::Result<()> {
//! let table = EventTable::from_columns([("MET_pt", Column::floats([10.0, 40.0]))])?;
//! let stream = EventStream::new(Arc::new(MemorySource::new(table)), Engine::new(0)?);
//! let high_met = stream.filter("MET_pt > 25", "MET > 25")?;
//! assert_eq!(high_met.count()?, 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod column;
pub mod engine;
pub mod expr;
pub mod histogram;
pub mod monitor;
pub mod source;
pub mod stream;

pub use column::{Column, ColumnData, EventTable, JaggedCol, Schema};
pub use engine::Engine;
pub use expr::CompiledExpr;
pub use histogram::HistogramAccumulator;
pub use monitor::{HistogramBooking, MonitorHistogramCollector};
pub use source::{EventSource, MemorySource, Partition};
pub use stream::{ColumnHandle, EventStream, ExecutionRequest, ExecutionResult};
