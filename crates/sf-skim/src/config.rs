//! Skim configuration (YAML or JSON).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sf_core::{Error, FlowPolicy, HistogramBinning, Result};

use crate::objects::ObjectSelection;

/// Default XRootD redirector prefixed to catalog file names.
pub const DEFAULT_REDIRECTOR: &str = "root://cmsxrootd.fnal.gov/";

/// Default event table name.
pub const DEFAULT_TREE_NAME: &str = "Events";

/// One skim job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkimConfig {
    /// Dataset path queried from the catalog when `files` is empty.
    #[serde(default)]
    pub dataset: Option<String>,
    /// Prefix added to every catalog file name.
    #[serde(default = "default_redirector")]
    pub redirector: String,
    /// Explicit input locators; bypass the catalog when non-empty.
    #[serde(default)]
    pub files: Vec<String>,
    /// Directory holding the file-list cache (default: working directory).
    #[serde(default)]
    pub file_list_cache: Option<PathBuf>,
    /// Output artifact path.
    #[serde(default = "default_output")]
    pub output: PathBuf,
    /// Event table name, for both input and output.
    #[serde(default = "default_tree_name")]
    pub tree_name: String,
    /// Process at most this many files (`None` or 0: all).
    #[serde(default)]
    pub max_files: Option<usize>,
    /// Worker threads (0: all cores, 1: sequential).
    #[serde(default)]
    pub threads: usize,
    /// Trigger flags, OR-combined.
    #[serde(default)]
    pub triggers: Vec<String>,
    /// Data-quality flags, AND-combined.
    #[serde(default)]
    pub met_filters: Vec<String>,
    /// Input columns copied to the output next to the derived ones.
    #[serde(default)]
    pub branches_to_save: Vec<String>,
    /// Object-quality selections.
    #[serde(default = "ObjectSelection::defaults")]
    pub objects: Vec<ObjectSelection>,
    /// Event-level selections applied after the quality flags.
    #[serde(default)]
    pub selections: Vec<SelectionStage>,
    /// Checkpoint histograms.
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Checkpoint names.
    #[serde(default)]
    pub checkpoints: CheckpointNames,
}

fn default_redirector() -> String {
    DEFAULT_REDIRECTOR.to_string()
}

fn default_tree_name() -> String {
    DEFAULT_TREE_NAME.to_string()
}

fn default_output() -> PathBuf {
    PathBuf::from("skim.parquet")
}

/// Extra event-level stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectionStage {
    /// Stage name in the cut-flow.
    pub name: String,
    /// Per-event predicate.
    pub expr: String,
    /// Checkpoint booked right after this stage.
    #[serde(default)]
    pub checkpoint: Option<String>,
}

/// Monitored columns and their binning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    /// Scalar columns histogrammed at every checkpoint.
    #[serde(default)]
    pub columns: Vec<String>,
    /// Number of bins.
    #[serde(default = "default_bins")]
    pub bins: usize,
    /// Lower edge.
    #[serde(default)]
    pub low: f64,
    /// Upper edge.
    #[serde(default = "default_high")]
    pub high: f64,
    /// Under/overflow handling.
    #[serde(default)]
    pub flow: FlowPolicy,
}

fn default_bins() -> usize {
    10
}

fn default_high() -> f64 {
    10.0
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { columns: Vec::new(), bins: default_bins(), low: 0.0, high: default_high(), flow: FlowPolicy::Fold }
    }
}

impl MonitorConfig {
    /// Validated binning.
    pub fn binning(&self) -> Result<HistogramBinning> {
        HistogramBinning::new(self.bins, self.low, self.high)
    }
}

/// Names of the standard checkpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CheckpointNames {
    /// Before any stage.
    pub initial: String,
    /// After the trigger stage.
    pub trigger: String,
    /// After the data-quality stage.
    pub quality: String,
}

impl Default for CheckpointNames {
    fn default() -> Self {
        Self {
            initial: "Initial".into(),
            trigger: "AfterTrigger".into(),
            quality: "AfterMETFilters".into(),
        }
    }
}

/// Read a [`SkimConfig`]: JSON for `.json`, YAML otherwise.
pub fn read_skim_config(path: &Path) -> Result<SkimConfig> {
    let bytes = std::fs::read(path)?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
    let cfg: SkimConfig = if ext == "json" {
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::Validation(format!("invalid config {}: {e}", path.display())))?
    } else {
        serde_yaml_ng::from_slice(&bytes)
            .map_err(|e| Error::Validation(format!("invalid config {}: {e}", path.display())))?
    };
    cfg.monitor.binning()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_yaml_gets_defaults() {
        let cfg: SkimConfig = serde_yaml_ng::from_str("files: [a.parquet]\n").unwrap();
        assert_eq!(cfg.redirector, DEFAULT_REDIRECTOR);
        assert_eq!(cfg.tree_name, "Events");
        assert_eq!(cfg.threads, 0);
        assert_eq!(cfg.objects, ObjectSelection::defaults());
        assert_eq!(cfg.monitor.binning().unwrap(), HistogramBinning::default());
        assert_eq!(cfg.checkpoints.quality, "AfterMETFilters");
        assert!(cfg.triggers.is_empty());
    }

    #[test]
    fn reads_json_and_yaml_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let y = dir.path().join("skim.yaml");
        std::fs::write(
            &y,
            "dataset: /MuonEG/Run2022D-22Sep2023-v1/NANOAOD\nmax_files: 2\n\
             triggers: [HLT_A, HLT_B]\nselections:\n  - {name: Vertex, expr: PV_npvsGood > 0, checkpoint: AfterVertex}\n\
             monitor: {columns: [nGoodMuon], bins: 5, high: 5, flow: drop}\n\
             checkpoints: {initial: Start}\n",
        )
        .unwrap();
        let cfg = read_skim_config(&y).unwrap();
        assert_eq!(cfg.max_files, Some(2));
        assert_eq!(cfg.selections[0].checkpoint.as_deref(), Some("AfterVertex"));
        assert_eq!(cfg.monitor.flow, FlowPolicy::Drop);
        assert_eq!(cfg.checkpoints.initial, "Start");
        assert_eq!(cfg.checkpoints.trigger, "AfterTrigger");

        let j = dir.path().join("skim.json");
        std::fs::write(&j, serde_json::to_vec(&cfg).unwrap()).unwrap();
        assert_eq!(read_skim_config(&j).unwrap(), cfg);
    }

    #[test]
    fn bundled_muoneg_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../configs/muoneg_run2022d.yaml");
        let cfg = read_skim_config(&path).unwrap();
        assert_eq!(cfg.triggers.len(), 3);
        assert_eq!(cfg.met_filters.len(), 7);
        assert_eq!(cfg.objects, ObjectSelection::defaults());
        assert_eq!(cfg.max_files, Some(2));
    }

    #[test]
    fn rejects_unknown_fields_and_bad_binning() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("bad.yaml");
        std::fs::write(&p, "trigers: [HLT_A]\n").unwrap();
        assert!(matches!(read_skim_config(&p), Err(Error::Validation(_))));

        std::fs::write(&p, "monitor: {bins: 0}\n").unwrap();
        assert!(matches!(read_skim_config(&p), Err(Error::Validation(_))));
    }
}
