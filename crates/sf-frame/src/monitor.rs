//! Checkpoint histogram bookings.

use sf_core::{Error, FlowPolicy, HistogramBinning, NameKind, Result};

use crate::histogram::HistogramAccumulator;
use crate::stream::EventStream;

/// One histogram to be filled from `column` on `view`.
#[derive(Debug, Clone)]
pub struct HistogramBooking {
    /// `<column>_<checkpoint>`.
    pub name: String,
    /// Monitored scalar column.
    pub column: String,
    /// Checkpoint label.
    pub checkpoint: String,
    /// View whose surviving events are histogrammed.
    pub view: EventStream,
    /// Binning.
    pub binning: HistogramBinning,
    /// Under/overflow handling.
    pub policy: FlowPolicy,
}

impl HistogramBooking {
    pub(crate) fn accumulator(&self) -> HistogramAccumulator {
        HistogramAccumulator::new(&self.name, &self.column, &self.checkpoint, self.binning, self.policy)
    }
}

/// Append-only list of histogram bookings.
///
/// Bookings are filled later, during the single event loop of the view the
/// output is written from. Once handed to a writer the collector is consumed.
#[derive(Debug, Clone, Default)]
pub struct MonitorHistogramCollector {
    binning: HistogramBinning,
    policy: FlowPolicy,
    bookings: Vec<HistogramBooking>,
}

impl MonitorHistogramCollector {
    /// Collector using `binning` and `policy` for every booking.
    pub fn new(binning: HistogramBinning, policy: FlowPolicy) -> Result<Self> {
        binning.validate()?;
        Ok(Self { binning, policy, bookings: Vec::new() })
    }

    /// Book `<column>_<checkpoint>` on `view`.
    pub fn book(&mut self, view: &EventStream, column: &str, checkpoint: &str) -> Result<()> {
        let (binning, policy) = (self.binning, self.policy);
        self.book_with(view, column, checkpoint, binning, policy)
    }

    /// Book with explicit binning and flow policy.
    pub fn book_with(
        &mut self,
        view: &EventStream,
        column: &str,
        checkpoint: &str,
        binning: HistogramBinning,
        policy: FlowPolicy,
    ) -> Result<()> {
        if checkpoint.trim().is_empty() {
            return Err(Error::Validation("checkpoint name must not be empty".into()));
        }
        binning.validate()?;
        let handle = view.column(column)?;
        if !handle.column_type.is_scalar() {
            return Err(Error::Validation(format!(
                "cannot monitor '{column}': expected a scalar column, got {}",
                handle.column_type
            )));
        }
        let name = format!("{column}_{checkpoint}");
        if self.bookings.iter().any(|b| b.name == name) {
            return Err(Error::duplicate(NameKind::Histogram, name));
        }
        tracing::debug!(histogram = %name, column, checkpoint, "booked monitor histogram");
        self.bookings.push(HistogramBooking {
            name,
            column: column.to_string(),
            checkpoint: checkpoint.to_string(),
            view: view.clone(),
            binning,
            policy,
        });
        Ok(())
    }

    /// Bookings in order.
    pub fn bookings(&self) -> &[HistogramBooking] {
        &self.bookings
    }

    /// Histogram names in booking order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bookings.iter().map(|b| b.name.as_str())
    }

    /// Number of bookings.
    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    /// True if nothing is booked.
    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }

    /// Hand the bookings over for filling.
    pub fn into_bookings(self) -> Vec<HistogramBooking> {
        self.bookings
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::column::{Column, EventTable};
    use crate::engine::Engine;
    use crate::source::MemorySource;
    use sf_core::DType;

    fn stream() -> EventStream {
        let t = EventTable::from_columns([
            ("nMuon", Column::ints([0, 1, 2])),
            ("Muon_pt", Column::jagged(DType::Float, [vec![], vec![1.0], vec![2.0, 3.0]])),
        ])
        .unwrap();
        EventStream::new(Arc::new(MemorySource::new(t)), Engine::sequential())
    }

    #[test]
    fn names_follow_column_and_checkpoint() {
        let s = stream();
        let mut c = MonitorHistogramCollector::default();
        c.book(&s, "nMuon", "Initial").unwrap();
        c.book(&s, "nMuon", "Trigger").unwrap();
        assert_eq!(c.names().collect::<Vec<_>>(), vec!["nMuon_Initial", "nMuon_Trigger"]);

        let err = c.book(&s, "nMuon", "Initial").unwrap_err();
        assert!(matches!(err, Error::DuplicateName { kind: NameKind::Histogram, .. }));
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn rejects_unknown_and_jagged_columns() {
        let s = stream();
        let mut c = MonitorHistogramCollector::default();
        assert!(matches!(c.book(&s, "nTau", "Initial"), Err(Error::UnknownColumn(_))));
        assert!(c.book(&s, "Muon_pt", "Initial").is_err());
        assert!(c.book(&s, "nMuon", "").is_err());
        assert!(c.is_empty());
    }

    #[test]
    fn invalid_binning_is_rejected() {
        assert!(MonitorHistogramCollector::new(HistogramBinning { bins: 0, low: 0.0, high: 1.0 }, FlowPolicy::Fold).is_err());
    }
}
