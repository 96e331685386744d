//! End-to-end behaviour of persistent stream views over an in-memory source.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use sf_core::{DType, Error, FlowPolicy, HistogramBinning, NameKind, Result, TOTAL_INPUT_STAGE};
use sf_frame::{
    Column, Engine, EventSource, EventStream, EventTable, ExecutionRequest, MemorySource,
    MonitorHistogramCollector, Partition, Schema,
};

/// 12 events: nMuon = i % 3, MET_pt = 10 * i, muons with pt 10, 20, ...
fn table() -> EventTable {
    let n_mu: Vec<i64> = (0..12).map(|i| i % 3).collect();
    let muon_pt: Vec<Vec<f64>> =
        n_mu.iter().map(|&n| (0..n).map(|k| 10.0 * (k + 1) as f64).collect()).collect();
    EventTable::from_columns([
        ("nMuon", Column::ints(n_mu.iter().copied())),
        ("MET_pt", Column::floats((0..12).map(|i| 10.0 * i as f64))),
        ("HLT_A", Column::bools((0..12).map(|i| i % 2 == 0))),
        ("Muon_pt", Column::jagged(DType::Float, muon_pt)),
    ])
    .unwrap()
}

#[derive(Debug)]
struct CountingSource {
    inner: MemorySource,
    reads: AtomicUsize,
}

impl EventSource for CountingSource {
    fn describe(&self) -> String {
        "counting".into()
    }
    fn schema(&self) -> &Schema {
        self.inner.schema()
    }
    fn partitions(&self) -> Vec<Partition> {
        self.inner.partitions()
    }
    fn read_partition(&self, index: usize, columns: &[String]) -> Result<EventTable> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_partition(index, columns)
    }
}

fn stream(threads: usize) -> EventStream {
    let src = MemorySource::new(table()).with_chunk_size(5);
    EventStream::new(Arc::new(src), Engine::new(threads).unwrap())
}

#[test]
fn building_views_reads_nothing() {
    let src = Arc::new(CountingSource {
        inner: MemorySource::new(table()).with_chunk_size(5),
        reads: AtomicUsize::new(0),
    });
    let s = EventStream::new(src.clone(), Engine::sequential());
    let v = s
        .define("good_mu", "Muon_pt > 15")
        .and_then(|v| v.define("nGood", "Sum(good_mu)"))
        .and_then(|v| v.filter("nGood >= 1", "One good muon"))
        .unwrap();
    assert_eq!(src.reads.load(Ordering::SeqCst), 0);

    v.report().unwrap();
    assert_eq!(src.reads.load(Ordering::SeqCst), 3);
}

#[test]
fn report_is_cumulative_and_idempotent() {
    let s = stream(1);
    let v = s
        .filter("HLT_A", "Trigger")
        .and_then(|v| v.filter("MET_pt > 35", "MET"))
        .unwrap();
    let r1 = v.report().unwrap();
    let r2 = v.report().unwrap();
    assert_eq!(r1, r2);
    assert_eq!(r1.entries()[0].name, TOTAL_INPUT_STAGE);
    assert_eq!(r1.total(), 12);
    assert_eq!(r1.pass_count("Trigger"), Some(6));
    // even i with 10 i > 35: 4, 6, 8, 10
    assert_eq!(r1.pass_count("MET"), Some(4));
    assert_eq!(v.count().unwrap(), 4);
}

#[test]
fn parallel_and_sequential_agree() {
    let build = |s: EventStream| {
        s.define("good_mu", "Muon_pt > 15")
            .and_then(|v| v.define("GoodMuon_pt", "Muon_pt[good_mu]"))
            .and_then(|v| v.filter("Length(GoodMuon_pt) > 0", "Good muon"))
            .unwrap()
    };
    let seq = build(stream(1));
    let par = build(stream(4));
    assert_eq!(seq.report().unwrap(), par.report().unwrap());
    let a = seq.collect(&["MET_pt", "GoodMuon_pt"]).unwrap();
    let b = par.collect(&["MET_pt", "GoodMuon_pt"]).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.n_events(), 4);
    assert_eq!(a.get("GoodMuon_pt").unwrap().as_jagged().unwrap().flat, vec![20.0; 4]);
}

#[test]
fn views_are_persistent() {
    let base = stream(1).define("x", "MET_pt * 2").unwrap();
    let a = base.filter("x > 100", "Cut").unwrap();
    let b = base.filter("x <= 100", "Cut").unwrap();
    assert!(base.stage_names().is_empty());
    assert_eq!(a.count().unwrap() + b.count().unwrap(), 12);
    assert!(base.is_upstream_of(&a));
    assert!(!a.is_upstream_of(&b));
    assert!(base.define("y", "x + 1").is_ok());
    assert!(base.column("y").is_err());
}

#[test]
fn duplicate_names_fail_at_build() {
    let s = stream(1);
    let err = s.define("MET_pt", "1").unwrap_err();
    assert!(matches!(err, Error::DuplicateName { kind: NameKind::Column, .. }));

    let v = s.define("x", "1").unwrap().filter("x > 0", "Stage").unwrap();
    let err = v.define("x", "2").unwrap_err();
    assert!(matches!(err, Error::DuplicateName { kind: NameKind::Column, .. }));
    let err = v.filter("MET_pt > 0", "Stage").unwrap_err();
    assert!(matches!(err, Error::DuplicateName { kind: NameKind::Stage, .. }));
    let err = v.filter("MET_pt > 0", TOTAL_INPUT_STAGE).unwrap_err();
    assert!(matches!(err, Error::DuplicateName { kind: NameKind::Stage, .. }));
    assert!(matches!(v.filter("MET_pt > 0", ""), Err(Error::Validation(_))));
}

#[test]
fn column_handles_and_unknown_columns() {
    let v = stream(1).define("n2", "nMuon * 2").unwrap();
    let h = v.column("n2").unwrap();
    assert!(h.derived);
    assert!(!v.column("nMuon").unwrap().derived);
    assert!(matches!(v.column("Foo_bar"), Err(Error::UnknownColumn(_))));
    assert!(matches!(v.filter("Foo_bar > 1", "x"), Err(Error::UnknownColumn(_))));
    assert!(matches!(v.collect(&["Foo_bar"]), Err(Error::UnknownColumn(_))));
}

#[test]
fn jagged_predicate_is_rejected_as_filter() {
    let err = stream(1).filter("Muon_pt > 10", "x").unwrap_err();
    assert!(matches!(err, Error::Expression(_)));
}

#[test]
fn checkpoint_histograms_fill_at_their_view() {
    let s = stream(2);
    let binning = HistogramBinning::new(10, 0.0, 10.0).unwrap();
    let mut collector = MonitorHistogramCollector::new(binning, FlowPolicy::Fold).unwrap();
    collector.book(&s, "nMuon", "Initial").unwrap();
    let v = s.filter("HLT_A", "Trigger").unwrap();
    collector.book(&v, "nMuon", "Trigger").unwrap();
    let last = v.filter("nMuon == 2", "Two muons").unwrap();

    let result = last.execute(ExecutionRequest::new().histograms(collector.into_bookings())).unwrap();
    let initial = &result.histograms[0];
    assert_eq!(initial.name, "nMuon_Initial");
    assert_eq!(&initial.bin_content[..3], &[4.0, 4.0, 4.0]);
    let trig = &result.histograms[1];
    assert_eq!(trig.entries, 6);
    // even i: i % 3 over 0, 2, 4, 6, 8, 10 = 0, 2, 1, 0, 2, 1
    assert_eq!(&trig.bin_content[..3], &[2.0, 2.0, 2.0]);
    assert_eq!(result.report.surviving(), 2);
}

#[test]
fn booking_from_another_branch_is_rejected() {
    let s = stream(1);
    let a = s.filter("HLT_A", "A").unwrap();
    let b = s.filter("!HLT_A", "B").unwrap();
    let mut collector = MonitorHistogramCollector::default();
    collector.book(&a, "nMuon", "A").unwrap();
    let err = b.execute(ExecutionRequest::new().histograms(collector.into_bookings())).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn runtime_failures_name_the_partition() {
    let v = stream(1).define("first", "Muon_pt[0]").unwrap();
    let err = v.collect(&["first"]).unwrap_err();
    match err {
        Error::EngineExecution { source_name, events_processed, .. } => {
            assert_eq!(source_name, "memory[0]");
            assert_eq!(events_processed, 0);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn empty_selection_yields_typed_empty_table() {
    let v = stream(1).filter("MET_pt > 1000", "Nothing").unwrap();
    let t = v.collect(&["MET_pt", "Muon_pt"]).unwrap();
    assert_eq!(t.n_events(), 0);
    assert_eq!(t.n_columns(), 2);
    assert_eq!(v.report().unwrap().surviving(), 0);
}
