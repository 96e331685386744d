//! Common data types for skimflow

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Label of the first cut-flow entry: every event read from the source.
pub const TOTAL_INPUT_STAGE: &str = "Total Input Events";

/// Logical namespace holding the cut-flow and monitor histograms in an output artifact.
pub const CONTROL_PLOTS_NAMESPACE: &str = "ControlPlots";

/// Element type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    /// Boolean flag (stored as 0/1).
    Bool,
    /// Integer (counts, multiplicities, indices).
    Int,
    /// Floating point.
    Float,
}

impl DType {
    /// Result type of arithmetic between `self` and `other`.
    pub fn promote(self, other: DType) -> DType {
        match (self, other) {
            (DType::Float, _) | (_, DType::Float) => DType::Float,
            _ => DType::Int,
        }
    }
}

/// Per-event shape of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    /// One value per event.
    Scalar,
    /// Variable-length array per event (one entry per reconstructed object).
    Jagged,
}

/// Static type of a column or expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnType {
    /// Per-event shape.
    pub shape: Shape,
    /// Element type.
    pub dtype: DType,
}

impl ColumnType {
    /// Scalar column of `dtype`.
    pub const fn scalar(dtype: DType) -> Self {
        Self { shape: Shape::Scalar, dtype }
    }

    /// Jagged column of `dtype`.
    pub const fn jagged(dtype: DType) -> Self {
        Self { shape: Shape::Jagged, dtype }
    }

    /// True for one-value-per-event columns.
    pub fn is_scalar(&self) -> bool {
        self.shape == Shape::Scalar
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let elem = match self.dtype {
            DType::Bool => "bool",
            DType::Int => "int",
            DType::Float => "float",
        };
        match self.shape {
            Shape::Scalar => f.write_str(elem),
            Shape::Jagged => write!(f, "RVec<{elem}>"),
        }
    }
}

// ── Cut flow ───────────────────────────────────────────────────

/// One row of a [`CutFlowReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutFlowEntry {
    /// Stage name ([`TOTAL_INPUT_STAGE`] for the first entry).
    pub name: String,
    /// Events passing this stage and every stage before it.
    pub pass: u64,
}

/// Ordered `(stage, cumulative pass count)` pairs.
///
/// The first entry is always [`TOTAL_INPUT_STAGE`]; the pass count of stage
/// `i` counts events passing stages `0..=i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutFlowReport {
    entries: Vec<CutFlowEntry>,
}

impl CutFlowReport {
    /// Build a report from the input count and the cumulative stage counts.
    pub fn new(total: u64, stages: impl IntoIterator<Item = (String, u64)>) -> Self {
        let mut entries = vec![CutFlowEntry { name: TOTAL_INPUT_STAGE.to_string(), pass: total }];
        entries.extend(stages.into_iter().map(|(name, pass)| CutFlowEntry { name, pass }));
        Self { entries }
    }

    /// All entries, total input first.
    pub fn entries(&self) -> &[CutFlowEntry] {
        &self.entries
    }

    /// Stage entries only (total input excluded).
    pub fn stages(&self) -> &[CutFlowEntry] {
        &self.entries[1..]
    }

    /// Events read from the source.
    pub fn total(&self) -> u64 {
        self.entries[0].pass
    }

    /// Events surviving every stage.
    pub fn surviving(&self) -> u64 {
        self.entries.last().map(|e| e.pass).unwrap_or(0)
    }

    /// Cumulative pass count of the named entry.
    pub fn pass_count(&self, name: &str) -> Option<u64> {
        self.entries.iter().find(|e| e.name == name).map(|e| e.pass)
    }

    /// True if the named entry is present.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Efficiency of entry `index` relative to the entry before it, in percent.
    ///
    /// Returns `None` for the total-input entry and when the previous count is 0.
    pub fn efficiency(&self, index: usize) -> Option<f64> {
        if index == 0 || index >= self.entries.len() {
            return None;
        }
        let prev = self.entries[index - 1].pass;
        (prev > 0).then(|| 100.0 * self.entries[index].pass as f64 / prev as f64)
    }

    /// Efficiency of entry `index` relative to the total input, in percent.
    pub fn cumulative_efficiency(&self, index: usize) -> Option<f64> {
        let total = self.total();
        let e = self.entries.get(index)?;
        (total > 0).then(|| 100.0 * e.pass as f64 / total as f64)
    }

    /// Render as a labelled histogram, one bin per entry in report order.
    pub fn to_histogram(&self) -> CutFlowHistogram {
        CutFlowHistogram {
            name: "cutflow".to_string(),
            labels: self.entries.iter().map(|e| e.name.clone()).collect(),
            bin_content: self.entries.iter().map(|e| e.pass).collect(),
        }
    }

    /// Rebuild a report from its histogram rendering.
    pub fn from_histogram(h: &CutFlowHistogram) -> Result<Self> {
        if h.labels.len() != h.bin_content.len() {
            return Err(Error::Validation(format!(
                "cutflow histogram has {} labels but {} bins",
                h.labels.len(),
                h.bin_content.len()
            )));
        }
        match h.labels.first() {
            Some(first) if first == TOTAL_INPUT_STAGE => {}
            other => {
                return Err(Error::Validation(format!(
                    "cutflow histogram must start with '{TOTAL_INPUT_STAGE}', got {other:?}"
                )));
            }
        }
        let entries = h
            .labels
            .iter()
            .zip(&h.bin_content)
            .map(|(name, &pass)| CutFlowEntry { name: name.clone(), pass })
            .collect();
        Ok(Self { entries })
    }
}

impl fmt::Display for CutFlowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.entries.iter().enumerate() {
            write!(f, "{:<30} pass={:<12}", e.name, e.pass)?;
            if i > 0 {
                let all = self.entries[i - 1].pass;
                let eff = self.efficiency(i).unwrap_or(0.0);
                let cum = self.cumulative_efficiency(i).unwrap_or(0.0);
                write!(f, " all={all:<12} -- eff={eff:.2} % cumulative eff={cum:.2} %")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// The `cutflow` histogram stored in the control-plots namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutFlowHistogram {
    /// Always `cutflow`.
    pub name: String,
    /// Bin labels (stage names).
    pub labels: Vec<String>,
    /// Cumulative pass counts.
    pub bin_content: Vec<u64>,
}

// ── Monitor histograms ─────────────────────────────────────────

/// Under/overflow handling for monitor histograms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowPolicy {
    /// Clip: fold underflow into the first bin and overflow into the last bin.
    #[default]
    Fold,
    /// Keep out-of-range values out of the bins (still recorded in `underflow/overflow`).
    Drop,
    /// Fail the event loop on the first out-of-range value.
    Error,
}

/// Fixed-range uniform binning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramBinning {
    /// Number of bins.
    pub bins: usize,
    /// Lower edge of the first bin.
    pub low: f64,
    /// Upper edge of the last bin.
    pub high: f64,
}

impl Default for HistogramBinning {
    fn default() -> Self {
        Self { bins: 10, low: 0.0, high: 10.0 }
    }
}

impl HistogramBinning {
    /// Create and validate a binning.
    pub fn new(bins: usize, low: f64, high: f64) -> Result<Self> {
        let b = Self { bins, low, high };
        b.validate()?;
        Ok(b)
    }

    /// Check `bins > 0` and `low < high` (both finite).
    pub fn validate(&self) -> Result<()> {
        if self.bins == 0 {
            return Err(Error::Validation("histogram binning needs at least one bin".into()));
        }
        if !self.low.is_finite() || !self.high.is_finite() || self.low >= self.high {
            return Err(Error::Validation(format!(
                "invalid histogram range: expected low < high, got ({}, {})",
                self.low, self.high
            )));
        }
        Ok(())
    }

    /// Bin edges (length = `bins + 1`).
    pub fn edges(&self) -> Vec<f64> {
        let width = (self.high - self.low) / self.bins as f64;
        (0..=self.bins).map(|i| self.low + width * i as f64).collect()
    }
}

/// Frequency distribution of one scalar column at one checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorHistogram {
    /// `<column>_<checkpoint>`.
    pub name: String,
    /// Monitored column.
    pub column: String,
    /// Checkpoint the histogram was filled at.
    pub checkpoint: String,
    /// Binning.
    pub binning: HistogramBinning,
    /// Flow policy used while filling.
    pub flow_policy: FlowPolicy,
    /// Bin contents (length = `binning.bins`).
    pub bin_content: Vec<f64>,
    /// Values below `binning.low` (before optional folding).
    pub underflow: f64,
    /// Values at or above `binning.high` (before optional folding).
    pub overflow: f64,
    /// Values that landed in a bin (after folding).
    pub entries: u64,
}

impl MonitorHistogram {
    /// Sum of all bin contents.
    pub fn integral(&self) -> f64 {
        self.bin_content.iter().sum()
    }
}

/// Everything stored next to the event table in an output artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlPlots {
    /// Always [`CONTROL_PLOTS_NAMESPACE`].
    pub namespace: String,
    /// Cut-flow rendering.
    pub cutflow: CutFlowHistogram,
    /// Monitor histograms in booking order.
    pub histograms: Vec<MonitorHistogram>,
}

impl ControlPlots {
    /// Bundle a report and its histograms.
    pub fn new(report: &CutFlowReport, histograms: Vec<MonitorHistogram>) -> Self {
        Self {
            namespace: CONTROL_PLOTS_NAMESPACE.to_string(),
            cutflow: report.to_histogram(),
            histograms,
        }
    }

    /// The cut-flow as a report.
    pub fn report(&self) -> Result<CutFlowReport> {
        CutFlowReport::from_histogram(&self.cutflow)
    }

    /// Look up a histogram by name.
    pub fn histogram(&self, name: &str) -> Option<&MonitorHistogram> {
        self.histograms.iter().find(|h| h.name == name)
    }
}
