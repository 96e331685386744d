//! End-to-end skim driver.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use sf_core::Result;
use sf_frame::{Engine, EventStream, MonitorHistogramCollector};
use sf_io::{OutputArtifact, ParquetSource, SnapshotWriter};

use crate::catalog::{CommandCatalog, DatasetCatalog, resolve_inputs};
use crate::config::SkimConfig;
use crate::pipeline::CutFlowPipeline;

/// Outcome of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Input locators, in processing order.
    pub files: Vec<String>,
    /// Published artifact.
    pub artifact: OutputArtifact,
    /// Wall time from input resolution to publication.
    pub elapsed_seconds: f64,
}

impl RunSummary {
    /// Events read from the inputs.
    pub fn events_processed(&self) -> u64 {
        self.artifact.report.total()
    }
}

/// Runs one [`SkimConfig`].
pub struct SkimRunner {
    config: SkimConfig,
    catalog: Box<dyn DatasetCatalog>,
}

impl std::fmt::Debug for SkimRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkimRunner").field("config", &self.config).finish_non_exhaustive()
    }
}

impl SkimRunner {
    /// Runner resolving datasets with `dasgoclient`.
    pub fn new(config: SkimConfig) -> Self {
        Self::with_catalog(config, Box::new(CommandCatalog::default()))
    }

    /// Runner with a custom dataset catalog.
    pub fn with_catalog(config: SkimConfig, catalog: Box<dyn DatasetCatalog>) -> Self {
        Self { config, catalog }
    }

    /// Configuration in use.
    pub fn config(&self) -> &SkimConfig {
        &self.config
    }

    /// Input locators after catalog lookup and the file limit.
    pub fn resolve_inputs(&self) -> Result<Vec<String>> {
        resolve_inputs(&self.config, self.catalog.as_ref())
    }

    /// Open `files` and register objects, stages and checkpoints.
    pub fn build(&self, files: &[String]) -> Result<CutFlowPipeline> {
        let cfg = &self.config;
        let source = ParquetSource::open(files, &cfg.tree_name)?;
        let engine = Engine::new(cfg.threads)?;
        tracing::info!(files = files.len(), threads = engine.threads(), "initializing event stream");
        let stream = EventStream::new(Arc::new(source), engine);

        let collector = MonitorHistogramCollector::new(cfg.monitor.binning()?, cfg.monitor.flow)?;
        let mut p = CutFlowPipeline::with_collector(stream, collector);
        p.monitor(&cfg.monitor.columns)?;
        for sel in &cfg.objects {
            p.define_objects(sel)?;
        }
        p.checkpoint(&cfg.checkpoints.initial)?;
        // A skipped stage gets no checkpoint either.
        if !cfg.triggers.is_empty() {
            p.apply_triggers(&cfg.triggers)?;
            p.checkpoint(&cfg.checkpoints.trigger)?;
        }
        if !cfg.met_filters.is_empty() {
            p.apply_quality_flags(&cfg.met_filters)?;
            p.checkpoint(&cfg.checkpoints.quality)?;
        }
        for stage in &cfg.selections {
            p.filter(&stage.expr, &stage.name)?;
            if let Some(cp) = &stage.checkpoint {
                p.checkpoint(cp)?;
            }
        }
        Ok(p)
    }

    /// Resolve, build and write.
    pub fn run(&self) -> Result<RunSummary> {
        let start = Instant::now();
        let files = self.resolve_inputs()?;
        let mut pipeline = self.build(&files)?;
        let writer = SnapshotWriter::new(self.config.tree_name.clone());
        let artifact = pipeline.write(&writer, &self.config.output, &self.config.branches_to_save)?;
        let elapsed_seconds = start.elapsed().as_secs_f64();
        tracing::info!(
            files = files.len(),
            events = artifact.report.total(),
            surviving = artifact.n_events,
            elapsed_s = elapsed_seconds,
            "skim complete"
        );
        Ok(RunSummary { files, artifact, elapsed_seconds })
    }
}
