//! Human-readable reports for `skim` and `inspect`.

use std::fmt::{self, Write as _};

use sf_core::CutFlowReport;
use sf_io::ArtifactContents;
use sf_skim::RunSummary;

const RULE_WIDTH: usize = 50;

fn write_cutflow_lines(out: &mut String, report: &CutFlowReport) -> fmt::Result {
    for e in report.entries() {
        writeln!(out, "{:30} | Events: {}", e.name, e.pass)?;
    }
    Ok(())
}

fn write_validation(out: &mut String, summary: &RunSummary) -> fmt::Result {
    let heavy = "=".repeat(RULE_WIDTH);
    writeln!(out, "\n{heavy}")?;
    writeln!(out, "       PROCESSING VERIFICATION REPORT")?;
    writeln!(out, "{heavy}")?;
    write_cutflow_lines(out, &summary.artifact.report)?;
    writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;
    writeln!(out, "Files Requested : {}", summary.files.len())?;
    writeln!(out, "Events Processed: {}", summary.events_processed())?;
    writeln!(out, "Time Elapsed    : {:.2} minutes", summary.elapsed_seconds / 60.0)?;
    writeln!(
        out,
        "Output          : {} ({} events, {} columns)",
        summary.artifact.path.display(),
        summary.artifact.n_events,
        summary.artifact.columns.len()
    )?;
    if summary.events_processed() == 0 {
        writeln!(out, "\n[WARNING] Total events is 0. Something is wrong (empty files?)")?;
    } else {
        writeln!(out, "\n[SUCCESS] Event loop completed over all input files.")?;
    }
    writeln!(out, "{heavy}")
}

/// Post-run verification report: cut-flow, inputs, events read and timing.
pub fn validation_report(summary: &RunSummary) -> anyhow::Result<String> {
    let mut out = String::new();
    write_validation(&mut out, summary)?;
    Ok(out)
}

fn write_inspect(
    out: &mut String,
    contents: &ArtifactContents,
    report: &CutFlowReport,
) -> fmt::Result {
    let plots = &contents.control_plots;
    writeln!(out, "table   : {}", contents.table_name)?;
    writeln!(out, "schema  : {}", contents.schema_version)?;
    writeln!(out, "events  : {}", contents.table.n_events())?;
    let columns: Vec<&str> = contents.table.column_names().collect();
    writeln!(out, "columns : {}", columns.join(", "))?;

    writeln!(out, "\ncut-flow:")?;
    write!(out, "{report}")?;

    if !plots.histograms.is_empty() {
        writeln!(out, "\n{} histograms:", plots.namespace)?;
        for h in &plots.histograms {
            writeln!(
                out,
                "  {:32} entries={} integral={} underflow={} overflow={} bins={} [{}, {})",
                h.name,
                h.entries,
                h.integral(),
                h.underflow,
                h.overflow,
                h.binning.bins,
                h.binning.low,
                h.binning.high
            )?;
        }
    }
    Ok(())
}

/// Cut-flow with efficiencies and one line per monitor histogram.
pub fn inspect_report(contents: &ArtifactContents) -> anyhow::Result<String> {
    let report = contents.control_plots.report()?;
    let mut out = String::new();
    write_inspect(&mut out, contents, &report)?;
    Ok(out)
}

/// JSON form of `inspect`.
pub fn inspect_json(contents: &ArtifactContents) -> serde_json::Value {
    serde_json::json!({
        "schema_version": contents.schema_version,
        "table_name": contents.table_name,
        "n_events": contents.table.n_events(),
        "columns": contents.table.column_names().collect::<Vec<_>>(),
        "control_plots": contents.control_plots,
    })
}
