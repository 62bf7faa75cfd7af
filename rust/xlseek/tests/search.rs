mod common;

use common::{
    LIBRARY,
    build_pipeline,
    crosslinked_scan,
    dss,
    linear_scan,
};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{
    AtomicBool,
    AtomicU32,
    Ordering,
};
use std::time::Duration;
use xlseek::models::MatchRecord;
use xlseek::scoring::{
    CandidatePair,
    ScanTimings,
    ScoredCandidate,
    rank_scan,
};
use xlseek::search::{
    BufferedSink,
    DeadlockProbe,
    MemorySink,
    QueueScanSource,
    ScanSource,
    SinkStack,
};
use xlseek::{
    OrchestratorConfig,
    Scan,
    SearchError,
    SearchOrchestrator,
    SearchParameters,
};

fn fast_config(threads: usize) -> OrchestratorConfig {
    OrchestratorConfig {
        threads,
        poll_interval_ms: 5,
        progress_interval_ms: 50,
        drain_sleep_ms: 1,
        ..Default::default()
    }
}

fn scans() -> Vec<Scan> {
    let mut out: Vec<Scan> = LIBRARY
        .iter()
        .enumerate()
        .map(|(i, seq)| linear_scan(i as u32, seq))
        .collect();
    out.push(crosslinked_scan(100, "GAKLVPER", "SVKEPLR"));
    out.push(crosslinked_scan(101, "TTKAGFER", "EFLGDKVR"));
    out
}

/// Everything about a record that must not depend on scheduling.
fn fingerprint(records: &[MatchRecord]) -> BTreeSet<String> {
    records
        .iter()
        .map(|r| {
            format!(
                "{}:{}:{}:{}:{:.9}:{:.9}",
                r.run,
                r.scan_number,
                r.label(),
                r.rank,
                r.score,
                r.delta
            )
        })
        .collect()
}

fn run_search(threads: usize) -> (Vec<MatchRecord>, xlseek::RunSummary) {
    let pipeline = build_pipeline(&LIBRARY, vec![dss()], SearchParameters::default());
    let memory = Arc::new(MemorySink::new());
    let sinks = SinkStack::new(memory.clone())
        .wrap(|inner| BufferedSink::new(inner, 4))
        .unwrap();
    let source = Arc::new(QueueScanSource::from(scans()));
    let summary = SearchOrchestrator::new(pipeline, source, sinks, fast_config(threads))
        .run()
        .unwrap();
    (memory.take(), summary)
}

#[test]
fn test_linear_sole_match() {
    let pipeline = build_pipeline(&LIBRARY, vec![dss()], SearchParameters::default());
    let scan = linear_scan(1, "PEPTLDEK");
    let out = pipeline
        .process_scan(&scan, &mut ScanTimings::default())
        .unwrap();
    assert_eq!(out.len(), 1);
    let top = &out[0];
    assert_eq!(top.base_sequence(), "PEPTLDEK");
    assert!(!top.is_crosslinked());
    assert!(top.crosslinker.is_none());
    assert_eq!(top.combined_delta, top.score);
    assert_eq!(top.delta, top.score);
}

#[test]
fn test_crosslinked_pair_is_found_once() {
    let pipeline = build_pipeline(&LIBRARY, vec![dss()], SearchParameters::default());
    let scan = crosslinked_scan(7, "GAKLVPER", "SVKEPLR");
    let mut timings = ScanTimings::default();
    let out = pipeline.process_scan(&scan, &mut timings).unwrap();

    let pairs: Vec<&MatchRecord> = out.iter().filter(|r| r.is_crosslinked()).collect();
    assert_eq!(pairs.len(), 1);
    let top = pairs[0];
    assert!(top.is_top());
    let seqs: BTreeSet<&str> = top.peptides.iter().map(|p| p.base_sequence()).collect();
    assert_eq!(seqs, BTreeSet::from(["GAKLVPER", "SVKEPLR"]));
    assert_eq!(top.crosslinker.as_deref(), Some("DSS"));
    assert_eq!(top.link_sites, vec![2, 2]);
    assert!(top.sub_score("mgc_score").unwrap() > 0.0);
    assert!(top.sub_score("mgx_score").unwrap() > 0.0);
    assert!(timings.total() > Duration::ZERO);
}

#[test]
fn test_tied_pairs_share_rank() {
    let pipeline = build_pipeline(&LIBRARY, vec![dss()], SearchParameters::default());
    let pep = |s: &str| Arc::new(common::peptide(s));
    let candidate = |a: &str, b: &str, score: f64| ScoredCandidate {
        pair: CandidatePair::crosslinked(pep(a), pep(b), 0),
        link_sites: vec![2, 2],
        scores: Default::default(),
        score,
    };
    let scan = crosslinked_scan(1, "GAKLVPER", "SVKEPLR");
    let records = rank_scan(
        &scan,
        vec![
            candidate("GAKLVPER", "SVKEPLR", 20.0),
            candidate("TTKAGFER", "SVKEPLR", 20.0),
            candidate("GAKLVPER", "SVKEPLR", 15.0),
            candidate("AGLFKSTR", "EFLGDKVR", 12.0),
        ],
        pipeline.crosslinkers(),
        &Default::default(),
    );
    let ranks: Vec<u32> = records.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, vec![1, 1, 2, 3]);
    // The 15.0 pair repeats a rank 1 pair, so 12.0 is the distinct runner-up.
    assert_eq!(records[2].delta, 8.0);
    assert_eq!(records[0].combined_delta, 14.0);
    assert_eq!(records[0].crosslinker.as_deref(), Some("DSS"));
}

#[test]
fn test_worker_count_does_not_change_results() {
    let (single, summary) = run_search(1);
    let (multi, multi_summary) = run_search(4);
    assert!(!single.is_empty());
    assert_eq!(fingerprint(&single), fingerprint(&multi));
    assert_eq!(summary.scans_processed, scans().len() as u64);
    assert_eq!(summary.results, multi_summary.results);
    assert_eq!(summary.top_results, multi_summary.top_results);
    assert_eq!(summary.scans_failed, 0);

    // Within a scan, records arrive in rank order.
    for scan in single.chunk_by(|a, b| a.scan_number == b.scan_number) {
        assert!(scan.windows(2).all(|w| w[0].rank <= w[1].rank));
    }
}

#[test]
fn test_bad_scans_are_skipped() {
    let pipeline = build_pipeline(&LIBRARY, vec![dss()], SearchParameters::default());
    let memory = Arc::new(MemorySink::new());
    let source = Arc::new(QueueScanSource::from(vec![
        Scan::new("run1", 1, f64::NAN, 2, vec![]),
        linear_scan(2, "LVNDFYR"),
    ]));
    let summary = SearchOrchestrator::new(
        pipeline,
        source,
        SinkStack::new(memory.clone()),
        fast_config(2),
    )
    .run()
    .unwrap();
    assert_eq!(summary.scans_processed, 2);
    assert_eq!(summary.scans_failed, 1);
    assert!(memory.records().iter().all(|r| r.scan_number == 2));
    assert!(memory.is_finished());
}

#[test]
fn test_empty_source_without_total_fails() {
    let pipeline = build_pipeline(&LIBRARY, vec![dss()], SearchParameters::default());
    let err = SearchOrchestrator::new(
        pipeline,
        Arc::new(QueueScanSource::new()),
        SinkStack::new(Arc::new(MemorySink::new())),
        fast_config(1),
    )
    .run()
    .unwrap_err();
    assert!(matches!(err, SearchError::NoScansProcessed));
}

/// Reports more scans once, right after running dry, as a file still being
/// written would.
struct LateSource {
    inner: QueueScanSource,
    late: Mutex<Option<Vec<Scan>>>,
}

impl ScanSource for LateSource {
    fn has_next(&self) -> bool {
        if self.inner.has_next() {
            return true;
        }
        match self.late.lock().take() {
            Some(scans) => {
                self.inner.extend(scans);
                true
            }
            None => false,
        }
    }

    fn next_scan(&self) -> Option<Scan> {
        self.inner.next_scan()
    }

    fn count_read(&self) -> u64 {
        self.inner.count_read()
    }

    fn total_count(&self) -> u64 {
        self.inner.total_count()
    }
}

#[test]
fn test_late_scans_restart_workers() {
    let pipeline = build_pipeline(&LIBRARY, vec![dss()], SearchParameters::default());
    let memory = Arc::new(MemorySink::new());
    let source = Arc::new(LateSource {
        inner: QueueScanSource::from(vec![linear_scan(1, "LVNDFYR")]),
        late: Mutex::new(Some(vec![linear_scan(2, "NNVLAPYR")])),
    });
    let summary = SearchOrchestrator::new(
        pipeline,
        source,
        SinkStack::new(memory.clone()),
        fast_config(2),
    )
    .run()
    .unwrap();
    assert_eq!(summary.restarts, 1);
    assert_eq!(summary.scans_processed, 2);
    let scans: BTreeSet<u32> = memory.records().iter().map(|r| r.scan_number).collect();
    assert_eq!(scans, BTreeSet::from([1, 2]));
}

/// Blocks every read until the search is stopped.
struct StuckSource {
    stop: Arc<AtomicBool>,
}

impl ScanSource for StuckSource {
    fn has_next(&self) -> bool {
        false
    }

    fn next_scan(&self) -> Option<Scan> {
        while !self.stop.load(Ordering::Acquire) {
            std::thread::sleep(Duration::from_millis(2));
        }
        None
    }

    fn count_read(&self) -> u64 {
        0
    }

    fn total_count(&self) -> u64 {
        1
    }
}

struct AlwaysDeadlocked;

impl DeadlockProbe for AlwaysDeadlocked {
    fn check(&self) -> Option<String> {
        Some("worker-0 waits on worker-1\nworker-1 waits on worker-0".into())
    }
}

#[derive(Default)]
struct CountingProbe {
    calls: Arc<AtomicU32>,
}

impl DeadlockProbe for CountingProbe {
    fn check(&self) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        None
    }
}

/// Sleeps on its first read, then hands out its scans.
struct SlowSource {
    inner: QueueScanSource,
    slept: AtomicBool,
}

impl ScanSource for SlowSource {
    fn has_next(&self) -> bool {
        self.inner.has_next()
    }

    fn next_scan(&self) -> Option<Scan> {
        if !self.slept.swap(true, Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(200));
        }
        self.inner.next_scan()
    }

    fn count_read(&self) -> u64 {
        self.inner.count_read()
    }

    fn total_count(&self) -> u64 {
        self.inner.total_count()
    }
}

#[test]
fn test_deadlock_aborts_run() {
    let pipeline = build_pipeline(&LIBRARY, vec![dss()], SearchParameters::default());
    let stop = Arc::new(AtomicBool::new(false));
    let config = OrchestratorConfig {
        probe_after: 2,
        ..fast_config(2)
    };
    let orchestrator = SearchOrchestrator::new(
        pipeline,
        Arc::new(StuckSource { stop: stop.clone() }),
        SinkStack::new(Arc::new(MemorySink::new())),
        config,
    )
    .with_probe(Box::new(AlwaysDeadlocked));
    // The source only unblocks through the orchestrator's own stop flag.
    let flag = orchestrator.stop_handle();
    let watcher = std::thread::spawn(move || {
        while !flag.load(Ordering::Acquire) {
            std::thread::sleep(Duration::from_millis(2));
        }
        stop.store(true, Ordering::Release);
    });

    let err = orchestrator.run().unwrap_err();
    match err {
        SearchError::Deadlock { dump } => assert!(dump.contains("worker-1")),
        other => panic!("unexpected error {other:?}"),
    }
    watcher.join().unwrap();
}

#[test]
fn test_quiet_period_is_not_fatal() {
    let pipeline = build_pipeline(&LIBRARY, vec![dss()], SearchParameters::default());
    let probe = CountingProbe::default();
    let calls = probe.calls.clone();
    let config = OrchestratorConfig {
        probe_after: 2,
        probe_widening: 2,
        ..fast_config(1)
    };
    let source = Arc::new(SlowSource {
        inner: QueueScanSource::from(vec![linear_scan(1, "LVNDFYR")]),
        slept: AtomicBool::new(false),
    });
    let summary = SearchOrchestrator::new(
        pipeline,
        source,
        SinkStack::new(Arc::new(MemorySink::new())),
        config,
    )
    .with_probe(Box::new(probe))
    .run()
    .unwrap();
    assert_eq!(summary.scans_processed, 1);
    assert!(calls.load(Ordering::SeqCst) >= 1);
}
