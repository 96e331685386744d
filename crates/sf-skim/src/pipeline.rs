//! The cut-flow pipeline: object derivations, ordered event-level stages,
//! checkpoint histograms and a single write.
//!
//! Stage order is fixed: the trigger stage (OR of trigger flags) comes first,
//! then the data-quality stage (AND of quality flags), then any further
//! selections. Cumulative counts are reported in that order.

use std::fmt;
use std::path::Path;

use sf_core::{CutFlowReport, Error, Result};
use sf_frame::{EventStream, MonitorHistogramCollector};
use sf_io::{OutputArtifact, SnapshotWriter};

use crate::objects::ObjectSelection;

/// Stage name of the OR-combined trigger cut.
pub const TRIGGER_STAGE: &str = "Combined Trigger Cut";

/// Stage name of the AND-combined data-quality (MET filter) cut.
pub const QUALITY_STAGE: &str = "Combined MET Cut";

/// Ordering class of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StagePhase {
    /// OR of trigger flags.
    Trigger,
    /// AND of data-quality flags.
    Quality,
    /// Any further event-level selection.
    Selection,
}

impl fmt::Display for StagePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StagePhase::Trigger => f.write_str("trigger"),
            StagePhase::Quality => f.write_str("quality"),
            StagePhase::Selection => f.write_str("selection"),
        }
    }
}

/// A registered event-level stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRecord {
    /// Stage name as it appears in the report.
    pub name: String,
    /// Ordering class.
    pub phase: StagePhase,
    /// Predicate.
    pub expr: String,
}

/// Lifecycle of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Stages and derivations registered, no output written.
    Built,
    /// The event loop of `write` is running.
    Materializing,
    /// Artifact published (terminal).
    Written,
    /// `write` failed (terminal).
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Built => "Built",
            PipelineState::Materializing => "Materializing",
            PipelineState::Written => "Written",
            PipelineState::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Ordered selection over an [`EventStream`] with cut-flow bookkeeping.
#[derive(Debug)]
pub struct CutFlowPipeline {
    stream: EventStream,
    stages: Vec<StageRecord>,
    outputs: Vec<String>,
    collector: Option<MonitorHistogramCollector>,
    monitored: Vec<String>,
    state: PipelineState,
    written_report: Option<CutFlowReport>,
}

impl CutFlowPipeline {
    /// Pipeline over `stream` with the default histogram binning.
    pub fn new(stream: EventStream) -> Self {
        Self::with_collector(stream, MonitorHistogramCollector::default())
    }

    /// Pipeline over `stream` booking checkpoint histograms into `collector`.
    pub fn with_collector(stream: EventStream, collector: MonitorHistogramCollector) -> Self {
        Self {
            stream,
            stages: Vec::new(),
            outputs: Vec::new(),
            collector: Some(collector),
            monitored: Vec::new(),
            state: PipelineState::Built,
            written_report: None,
        }
    }

    /// Columns histogrammed at every checkpoint.
    pub fn monitor<S: AsRef<str>>(&mut self, columns: &[S]) -> Result<&mut Self> {
        self.ensure_built("monitor")?;
        self.monitored = columns.iter().map(|c| c.as_ref().to_string()).collect();
        Ok(self)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Current (most downstream) view.
    pub fn stream(&self) -> &EventStream {
        &self.stream
    }

    /// Registered stages, in report order.
    pub fn stages(&self) -> &[StageRecord] {
        &self.stages
    }

    /// Registered output columns (derived columns first, in registration order).
    pub fn output_columns(&self) -> &[String] {
        &self.outputs
    }

    /// Names of the booked checkpoint histograms.
    pub fn histogram_names(&self) -> Vec<String> {
        self.collector.iter().flat_map(|c| c.names().map(str::to_string)).collect()
    }

    fn ensure_built(&self, op: &str) -> Result<()> {
        match self.state {
            PipelineState::Built => Ok(()),
            s => Err(Error::InvalidState(format!("cannot {op}: pipeline is {s}"))),
        }
    }

    fn check_phase(&self, phase: StagePhase) -> Result<()> {
        match self.stages.iter().find(|s| s.phase > phase) {
            Some(later) => Err(Error::Validation(format!(
                "{phase} stage must come before {} stage '{}'",
                later.phase, later.name
            ))),
            None => Ok(()),
        }
    }

    // ── Derivations ────────────────────────────────────────────

    /// Define a column on the current view.
    pub fn define(&mut self, name: &str, expr: &str) -> Result<&mut Self> {
        self.ensure_built("define")?;
        self.stream = self.stream.define(name, expr)?;
        Ok(self)
    }

    /// Derive mask, sliced attributes and count for one object selection,
    /// and register the slices and the count as output columns.
    pub fn define_objects(&mut self, sel: &ObjectSelection) -> Result<&mut Self> {
        self.ensure_built("define objects")?;
        let mut s = self.stream.define(&sel.mask, &sel.selection)?;
        let mask_ty = s.column(&sel.mask)?.column_type;
        if mask_ty.is_scalar() || mask_ty.dtype != sf_core::DType::Bool {
            return Err(Error::Expression(format!(
                "object selection '{}' must yield a per-object boolean mask, got {mask_ty}",
                sel.name
            )));
        }
        for (derived, source) in sel.sliced_columns() {
            s = s.define(&derived, &format!("{source}[{}]", sel.mask))?;
        }
        s = s.define(&sel.count_column(), &format!("Sum({})", sel.mask))?;

        tracing::info!(objects = %sel.name, mask = %sel.mask, "defined object selection");
        self.stream = s;
        self.outputs.extend(sel.output_columns());
        Ok(self)
    }

    /// Add extra columns to the output list; each must exist on the current view.
    pub fn register_outputs<S: AsRef<str>>(&mut self, columns: &[S]) -> Result<&mut Self> {
        self.ensure_built("register outputs")?;
        for c in columns {
            self.stream.column(c.as_ref())?;
        }
        self.outputs.extend(columns.iter().map(|c| c.as_ref().to_string()));
        Ok(self)
    }

    // ── Stages ─────────────────────────────────────────────────

    fn flag_stage(&mut self, names: &[String], op: &str, stage: &str, phase: StagePhase) -> Result<()> {
        self.ensure_built("add a stage")?;
        if names.is_empty() {
            tracing::info!(stage, "no flags configured, stage skipped");
            return Ok(());
        }
        self.check_phase(phase)?;
        for n in names {
            let h = self.stream.column(n)?;
            if !h.column_type.is_scalar() {
                return Err(Error::Validation(format!(
                    "flag '{n}' for '{stage}' must be a per-event scalar, got {}",
                    h.column_type
                )));
            }
        }
        let expr = names.join(op);
        self.stream = self.stream.filter(&expr, stage)?;
        self.stages.push(StageRecord { name: stage.to_string(), phase, expr });
        tracing::info!(stage, flags = names.len(), "applied");
        Ok(())
    }

    /// OR of the trigger flags as stage [`TRIGGER_STAGE`]; skipped if empty.
    pub fn apply_triggers(&mut self, triggers: &[String]) -> Result<&mut Self> {
        self.flag_stage(triggers, " || ", TRIGGER_STAGE, StagePhase::Trigger)?;
        Ok(self)
    }

    /// AND of the quality flags as stage [`QUALITY_STAGE`]; skipped if empty.
    pub fn apply_quality_flags(&mut self, flags: &[String]) -> Result<&mut Self> {
        self.flag_stage(flags, " && ", QUALITY_STAGE, StagePhase::Quality)?;
        Ok(self)
    }

    /// Trigger stage, then quality stage.
    pub fn apply_global_filters(
        &mut self,
        triggers: &[String],
        flags: &[String],
    ) -> Result<&mut Self> {
        self.apply_triggers(triggers)?;
        self.apply_quality_flags(flags)
    }

    /// Extra event-level selection stage.
    pub fn filter(&mut self, expr: &str, name: &str) -> Result<&mut Self> {
        self.ensure_built("add a stage")?;
        self.stream = self.stream.filter(expr, name)?;
        self.stages.push(StageRecord {
            name: name.to_string(),
            phase: StagePhase::Selection,
            expr: expr.to_string(),
        });
        Ok(self)
    }

    /// Book `<column>_<name>` for every monitored column on the current view.
    pub fn checkpoint(&mut self, name: &str) -> Result<&mut Self> {
        self.ensure_built("add a checkpoint")?;
        let Some(current) = self.collector.as_ref() else {
            return Err(Error::InvalidState("histogram collector already handed over".into()));
        };
        let mut collector = current.clone();
        for column in &self.monitored {
            collector.book(&self.stream, column, name)?;
        }
        self.collector = Some(collector);
        Ok(self)
    }

    // ── Materialization ────────────────────────────────────────

    /// Cut-flow of the current view.
    ///
    /// Runs an event loop while the pipeline is being built; after a
    /// successful write it returns the report of the written artifact.
    pub fn report(&self) -> Result<CutFlowReport> {
        match (self.state, &self.written_report) {
            (PipelineState::Built, _) => self.stream.report(),
            (PipelineState::Written, Some(r)) => Ok(r.clone()),
            (s, _) => Err(Error::InvalidState(format!("cannot report: pipeline is {s}"))),
        }
    }

    /// Write the surviving events, the cut-flow and the checkpoint histograms.
    ///
    /// Output columns are the registered columns followed by `extra_columns`.
    /// The pipeline ends in [`PipelineState::Written`] or [`PipelineState::Failed`].
    pub fn write<S: AsRef<str>>(
        &mut self,
        writer: &SnapshotWriter,
        path: &Path,
        extra_columns: &[S],
    ) -> Result<OutputArtifact> {
        self.ensure_built("write")?;
        let mut columns = self.outputs.clone();
        columns.extend(extra_columns.iter().map(|c| c.as_ref().to_string()));
        let collector = self.collector.take().unwrap_or_default();

        self.state = PipelineState::Materializing;
        match writer.write(&self.stream, &columns, collector, path) {
            Ok(artifact) => {
                self.state = PipelineState::Written;
                self.written_report = Some(artifact.report.clone());
                Ok(artifact)
            }
            Err(e) => {
                self.state = PipelineState::Failed;
                tracing::error!(error = %e, path = %path.display(), "write failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use sf_core::DType;
    use sf_frame::{Column, Engine, EventTable, MemorySource};

    fn pipeline() -> CutFlowPipeline {
        let t = EventTable::from_columns([
            ("HLT_A", Column::bools([true, false, true, true])),
            ("HLT_B", Column::bools([false, true, false, false])),
            ("Flag_good", Column::bools([true, true, false, true])),
            ("PV_npvsGood", Column::ints([1, 2, 0, 3])),
            ("Muon_pt", Column::jagged(DType::Float, [vec![20.0], vec![], vec![5.0], vec![30.0, 16.0]])),
            ("Muon_eta", Column::jagged(DType::Float, [vec![0.1], vec![], vec![3.0], vec![-1.0, 2.5]])),
        ])
        .unwrap();
        let s = EventStream::new(Arc::new(MemorySource::new(t)), Engine::sequential());
        CutFlowPipeline::new(s)
    }

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn global_filters_in_order() {
        let mut p = pipeline();
        p.apply_global_filters(&names(&["HLT_A", "HLT_B"]), &names(&["Flag_good"])).unwrap();
        let r = p.report().unwrap();
        assert_eq!(r.pass_count(TRIGGER_STAGE), Some(4));
        assert_eq!(r.pass_count(QUALITY_STAGE), Some(3));
        assert_eq!(p.stages()[0].expr, "HLT_A || HLT_B");
    }

    #[test]
    fn empty_lists_add_no_stage() {
        let mut p = pipeline();
        p.apply_global_filters(&[], &[]).unwrap();
        assert!(p.stages().is_empty());
        assert_eq!(p.report().unwrap().entries().len(), 1);
    }

    #[test]
    fn unknown_trigger_fails_fast() {
        let mut p = pipeline();
        let err = p.apply_triggers(&names(&["HLT_A", "HLT_Missing"])).unwrap_err();
        assert!(matches!(err, Error::UnknownColumn(ref n) if n == "HLT_Missing"));
        assert!(p.stages().is_empty());
    }

    #[test]
    fn jagged_flag_is_rejected() {
        let mut p = pipeline();
        assert!(matches!(p.apply_quality_flags(&names(&["Muon_pt"])), Err(Error::Validation(_))));
    }

    #[test]
    fn phase_order_is_enforced() {
        let mut p = pipeline();
        p.filter("PV_npvsGood > 0", "Good primary vertex").unwrap();
        let err = p.apply_triggers(&names(&["HLT_A"])).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let mut p = pipeline();
        p.apply_quality_flags(&names(&["Flag_good"])).unwrap();
        assert!(p.apply_triggers(&names(&["HLT_A"])).is_err());
        // An empty list is skipped regardless of position.
        assert!(p.apply_triggers(&[]).is_ok());
    }

    #[test]
    fn object_selection_defines_slices_and_count() {
        let mut p = pipeline();
        p.define_objects(&ObjectSelection::good_muons()).unwrap();
        assert_eq!(p.output_columns(), &["GoodMuon_pt", "GoodMuon_eta", "nGoodMuon"]);
        let t = p.stream().collect(&["GoodMuon_pt", "nGoodMuon"]).unwrap();
        assert_eq!(t.get("nGoodMuon").unwrap().as_scalar().unwrap(), &[1.0, 0.0, 0.0, 1.0]);
        assert_eq!(t.get("GoodMuon_pt").unwrap().as_jagged().unwrap().flat, vec![20.0, 30.0]);
    }

    #[test]
    fn scalar_object_selection_is_rejected() {
        let mut p = pipeline();
        let bad = ObjectSelection::new("GoodPV", "PV", "pv_mask", "PV_npvsGood > 0");
        assert!(matches!(p.define_objects(&bad), Err(Error::Expression(_))));
        assert!(p.stream().column("pv_mask").is_err());
    }

    #[test]
    fn checkpoints_book_each_monitored_column() {
        let mut p = pipeline();
        p.define_objects(&ObjectSelection::good_muons()).unwrap();
        p.monitor(&["nGoodMuon", "PV_npvsGood"]).unwrap();
        p.checkpoint("Initial").unwrap();
        p.apply_triggers(&names(&["HLT_A"])).unwrap();
        p.checkpoint("AfterTrigger").unwrap();
        assert_eq!(
            p.histogram_names(),
            vec!["nGoodMuon_Initial", "PV_npvsGood_Initial", "nGoodMuon_AfterTrigger", "PV_npvsGood_AfterTrigger"]
        );
        let err = p.checkpoint("Initial").unwrap_err();
        assert!(matches!(err, Error::DuplicateName { .. }));
        assert_eq!(p.histogram_names().len(), 4);
    }
}
