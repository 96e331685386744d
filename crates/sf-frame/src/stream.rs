//! Lazily evaluated, persistent views over an event source.
//!
//! Every [`EventStream::define`] and [`EventStream::filter`] call returns a new
//! view that shares its ancestry with the receiver. Views are immutable: an
//! intermediate view can be reused to branch off several selections, and
//! nothing is read from the source until a materializing action runs.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use sf_core::{
    ColumnType, CutFlowReport, Error, MonitorHistogram, NameKind, Result, TOTAL_INPUT_STAGE,
};

use crate::column::{Column, EventTable, Schema};
use crate::engine::Engine;
use crate::expr::CompiledExpr;
use crate::histogram::HistogramAccumulator;
use crate::monitor::HistogramBooking;
use crate::source::{EventSource, Partition};

/// Read access to a named column of a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnHandle {
    /// Column name.
    pub name: String,
    /// Static type.
    pub column_type: ColumnType,
    /// True for columns created by [`EventStream::define`].
    pub derived: bool,
}

struct Root {
    source: Arc<dyn EventSource>,
    engine: Engine,
}

enum Step {
    Source,
    Define { name: String, expr: CompiledExpr },
    Filter { stage: String, expr: CompiledExpr },
}

struct Node {
    step: Step,
    parent: Option<Arc<Node>>,
    schema: Schema,
    stages: Vec<String>,
}

/// A logical view: source plus an ordered chain of defines and filters.
#[derive(Clone)]
pub struct EventStream {
    root: Arc<Root>,
    node: Arc<Node>,
}

/// What a materialization should produce besides the cut-flow.
#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    columns: Option<Vec<String>>,
    histograms: Vec<HistogramBooking>,
}

impl ExecutionRequest {
    /// Counting only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the surviving events' values of `columns`, in this order.
    pub fn collect(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    /// Fill these histogram bookings during the same pass.
    pub fn histograms(mut self, bookings: Vec<HistogramBooking>) -> Self {
        self.histograms = bookings;
        self
    }
}

/// Output of one event loop.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Cumulative pass counts.
    pub report: CutFlowReport,
    /// Filled histograms, in booking order.
    pub histograms: Vec<MonitorHistogram>,
    /// Surviving events, when columns were requested.
    pub table: Option<EventTable>,
}

impl EventStream {
    /// Root view over `source`, materialized by `engine`.
    pub fn new(source: Arc<dyn EventSource>, engine: Engine) -> Self {
        let node = Node { step: Step::Source, parent: None, schema: source.schema().clone(), stages: Vec::new() };
        Self { root: Arc::new(Root { source, engine }), node: Arc::new(node) }
    }

    /// Columns visible in this view, source columns first.
    pub fn schema(&self) -> &Schema {
        &self.node.schema
    }

    /// Stage names upstream of (and including) this view, in application order.
    pub fn stage_names(&self) -> &[String] {
        &self.node.stages
    }

    /// Source this view reads from.
    pub fn source(&self) -> &Arc<dyn EventSource> {
        &self.root.source
    }

    /// Look up a column.
    pub fn column(&self, name: &str) -> Result<ColumnHandle> {
        let column_type = self.node.schema.column_type(name)?;
        Ok(ColumnHandle {
            name: name.to_string(),
            column_type,
            derived: !self.root.source.schema().contains(name),
        })
    }

    /// New view with an extra column computed by `expr`.
    pub fn define(&self, name: &str, expr: &str) -> Result<EventStream> {
        if !is_identifier(name) {
            return Err(Error::Validation(format!("invalid column name: '{name}'")));
        }
        if self.node.schema.contains(name) {
            return Err(Error::duplicate(NameKind::Column, name));
        }
        let expr = CompiledExpr::compile(expr, &self.node.schema)?;
        let mut schema = self.node.schema.clone();
        schema.insert(name, expr.output_type())?;
        tracing::debug!(column = name, expr = expr.text(), ty = %expr.output_type(), "define");
        Ok(self.child(Step::Define { name: name.to_string(), expr }, schema, self.node.stages.clone()))
    }

    /// New view keeping only events for which `expr` is true, recorded as `stage`.
    pub fn filter(&self, expr: &str, stage: &str) -> Result<EventStream> {
        if stage.trim().is_empty() {
            return Err(Error::Validation("stage name must not be empty".into()));
        }
        if stage == TOTAL_INPUT_STAGE || self.node.stages.iter().any(|s| s == stage) {
            return Err(Error::duplicate(NameKind::Stage, stage));
        }
        let expr = CompiledExpr::compile(expr, &self.node.schema)?;
        if !expr.output_type().is_scalar() {
            return Err(Error::Expression(format!(
                "filter '{stage}': predicate '{}' yields {} per event, expected a scalar",
                expr.text(),
                expr.output_type()
            )));
        }
        let mut stages = self.node.stages.clone();
        stages.push(stage.to_string());
        tracing::debug!(stage, expr = expr.text(), "filter");
        Ok(self.child(Step::Filter { stage: stage.to_string(), expr }, self.node.schema.clone(), stages))
    }

    /// True if `self` is `other` or one of its ancestors.
    pub fn is_upstream_of(&self, other: &EventStream) -> bool {
        Arc::ptr_eq(&self.root, &other.root)
            && other.chain().iter().any(|n| std::ptr::eq(*n, Arc::as_ptr(&self.node)))
    }

    /// Cut-flow of this view.
    pub fn report(&self) -> Result<CutFlowReport> {
        Ok(self.execute(ExecutionRequest::new())?.report)
    }

    /// Number of events surviving every stage of this view.
    pub fn count(&self) -> Result<u64> {
        Ok(self.report()?.surviving())
    }

    /// Surviving events' values of `columns`.
    pub fn collect<S: AsRef<str>>(&self, columns: &[S]) -> Result<EventTable> {
        let columns = columns.iter().map(|c| c.as_ref().to_string()).collect();
        let result = self.execute(ExecutionRequest::new().collect(columns))?;
        Ok(result.table.unwrap_or_default())
    }

    /// Run one event loop producing everything in `request`.
    pub fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult> {
        let plan = Plan::new(self, &request)?;
        let start = Instant::now();
        let parts = self.root.engine.run(self.root.source.as_ref(), |p| plan.run_partition(self, p))?;

        let mut total = 0u64;
        let mut stage_counts = vec![0u64; self.node.stages.len()];
        let mut hists = plan.empty_histograms();
        let mut table = plan.empty_table()?;
        for part in parts {
            total += part.n_input;
            for (acc, n) in stage_counts.iter_mut().zip(&part.stage_counts) {
                *acc += n;
            }
            for (acc, h) in hists.iter_mut().zip(&part.histograms) {
                acc.merge(h)?;
            }
            if let (Some(t), Some(pt)) = (table.as_mut(), part.table.as_ref()) {
                t.extend(pt)?;
            }
        }

        let report = CutFlowReport::new(total, self.node.stages.iter().cloned().zip(stage_counts));
        tracing::info!(
            events = total,
            surviving = report.surviving(),
            histograms = hists.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "event loop finished"
        );
        Ok(ExecutionResult {
            report,
            histograms: hists.into_iter().map(HistogramAccumulator::finish).collect(),
            table,
        })
    }

    fn child(&self, step: Step, schema: Schema, stages: Vec<String>) -> EventStream {
        let node = Node { step, parent: Some(Arc::clone(&self.node)), schema, stages };
        EventStream { root: Arc::clone(&self.root), node: Arc::new(node) }
    }

    /// Nodes from the source to this view.
    fn chain(&self) -> Vec<&Node> {
        let mut out = Vec::new();
        let mut cur = Some(self.node.as_ref());
        while let Some(n) = cur {
            out.push(n);
            cur = n.parent.as_deref();
        }
        out.reverse();
        out
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("source", &self.root.source.describe())
            .field("columns", &self.node.schema.len())
            .field("stages", &self.node.stages)
            .finish()
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ── Execution plan ─────────────────────────────────────────────

struct PartitionOutput {
    n_input: u64,
    stage_counts: Vec<u64>,
    histograms: Vec<HistogramAccumulator>,
    table: Option<EventTable>,
}

/// Resolved work for one materialization of a view.
struct Plan {
    /// Source columns to read.
    read: Vec<String>,
    /// Per chain position: evaluate this define?
    compute: Vec<bool>,
    /// Per booking: chain position where it is filled.
    fill_at: Vec<usize>,
    bookings: Vec<HistogramBooking>,
    /// Columns to collect, with their types.
    columns: Option<Vec<(String, ColumnType)>>,
}

impl Plan {
    fn new(view: &EventStream, request: &ExecutionRequest) -> Result<Self> {
        let chain = view.chain();

        let columns = match &request.columns {
            Some(cols) => Some(
                cols.iter()
                    .map(|c| Ok((c.clone(), view.node.schema.column_type(c)?)))
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => None,
        };
        let mut fill_at = Vec::with_capacity(request.histograms.len());
        for b in &request.histograms {
            let pos = chain.iter().position(|n| std::ptr::eq(*n, Arc::as_ptr(&b.view.node)));
            match pos {
                Some(p) if Arc::ptr_eq(&b.view.root, &view.root) => fill_at.push(p),
                _ => {
                    return Err(Error::Validation(format!(
                        "histogram '{}' was booked on a view that is not upstream of the materialized view",
                        b.name
                    )));
                }
            }
        }

        // Walk backwards so a define is evaluated only if something downstream uses it.
        let mut needed: HashSet<&str> = HashSet::new();
        needed.extend(request.columns.iter().flatten().map(String::as_str));
        needed.extend(request.histograms.iter().map(|b| b.column.as_str()));
        let mut compute = vec![false; chain.len()];
        for (i, node) in chain.iter().enumerate().rev() {
            match &node.step {
                Step::Source => {}
                Step::Define { name, expr } => {
                    if needed.contains(name.as_str()) {
                        compute[i] = true;
                        needed.extend(expr.required_columns.iter().map(String::as_str));
                    }
                }
                Step::Filter { expr, .. } => {
                    needed.extend(expr.required_columns.iter().map(String::as_str));
                }
            }
        }
        let read = view
            .root
            .source
            .schema()
            .names()
            .filter(|n| needed.contains(n))
            .map(str::to_string)
            .collect();

        Ok(Plan {
            read,
            compute,
            fill_at,
            bookings: request.histograms.clone(),
            columns,
        })
    }

    fn empty_histograms(&self) -> Vec<HistogramAccumulator> {
        self.bookings.iter().map(HistogramBooking::accumulator).collect()
    }

    fn empty_table(&self) -> Result<Option<EventTable>> {
        let Some(cols) = &self.columns else { return Ok(None) };
        let mut t = EventTable::new();
        for (name, ty) in cols {
            t.insert(name.as_str(), Column::empty(*ty))?;
        }
        Ok(Some(t))
    }

    fn run_partition(&self, view: &EventStream, p: &Partition) -> Result<(PartitionOutput, u64)> {
        let chain = view.chain();
        let mut table = view.root.source.read_partition(p.index, &self.read)?;
        let n_input = table.n_events() as u64;
        let mut stage_counts = Vec::with_capacity(view.node.stages.len());
        let mut hists = self.empty_histograms();

        for (i, node) in chain.iter().enumerate() {
            match &node.step {
                Step::Source => {}
                Step::Define { name, expr } => {
                    if self.compute[i] {
                        let col = expr.eval(&table)?;
                        table.insert(name.as_str(), col)?;
                    }
                }
                Step::Filter { stage, expr } => {
                    let mask = expr.eval_mask(&table)?;
                    table.retain(&mask);
                    tracing::trace!(partition = %p.label, stage = stage.as_str(), pass = table.n_events(), "stage");
                    stage_counts.push(table.n_events() as u64);
                }
            }
            for (h, _) in hists.iter_mut().zip(&self.fill_at).filter(|(_, at)| **at == i) {
                let values = table.get(h.column())?.as_scalar().ok_or_else(|| {
                    Error::Validation(format!("monitored column '{}' is not a scalar", h.column()))
                })?;
                h.fill_all(values)?;
            }
        }

        let table = match &self.columns {
            Some(cols) => {
                let names: Vec<&str> = cols.iter().map(|(n, _)| n.as_str()).collect();
                Some(table.select(&names)?)
            }
            None => None,
        };
        Ok((PartitionOutput { n_input, stage_counts, histograms: hists, table }, n_input))
    }
}
