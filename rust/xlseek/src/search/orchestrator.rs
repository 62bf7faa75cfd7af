//! Multi-threaded search driver.
//!
//! A fixed pool of worker threads pulls scans from one shared source, runs
//! them through the shared [`SearchPipeline`] and writes the ranked matches
//! to the top of a [`SinkStack`]. The calling thread supervises: it reports
//! progress, probes for deadlocks when progress stops, and once the workers
//! are done drains and closes the sinks. Scans that show up while draining
//! trigger a new round of workers.

use super::liveness::{
    DeadlockProbe,
    LivenessEvent,
    LivenessMonitor,
    ParkingLotProbe,
};
use super::progress::ProgressReporter;
use super::sink::{
    ResultSink,
    SinkStack,
};
use super::source::ScanSource;
use crate::errors::{
    Result,
    SearchError,
};
use crate::scoring::{
    ScanTimings,
    SearchPipeline,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::sync::Arc;
use std::sync::atomic::{
    AtomicBool,
    AtomicU64,
    Ordering,
};
use std::thread::JoinHandle;
use std::time::{
    Duration,
    Instant,
};
use tracing::{
    error,
    info,
    warn,
};

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub threads: usize,
    pub poll_interval_ms: u64,
    /// Quiet polls before the first deadlock probe.
    pub probe_after: u64,
    /// Factor applied to the probe interval after every quiet probe.
    pub probe_widening: u64,
    pub progress_interval_ms: u64,
    pub drain_window_ms: u64,
    pub drain_sleep_ms: u64,
    pub progress_bar: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            poll_interval_ms: 500,
            probe_after: 20,
            probe_widening: 10,
            progress_interval_ms: 10_000,
            drain_window_ms: 10 * 60 * 1000,
            drain_sleep_ms: 100,
            progress_bar: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub scans_read: u64,
    pub scans_processed: u64,
    pub scans_failed: u64,
    pub results: u64,
    pub top_results: u64,
    /// Extra worker rounds started for scans that arrived while draining.
    pub restarts: u32,
    pub timings: ScanTimings,
    pub elapsed_ms: u128,
}

#[derive(Debug, Default)]
struct RunCounters {
    processed: AtomicU64,
    failed: AtomicU64,
}

/// Everything a worker thread needs, cheap to clone.
#[derive(Clone)]
struct WorkerContext {
    pipeline: Arc<SearchPipeline>,
    source: Arc<dyn ScanSource>,
    sink: Arc<dyn ResultSink>,
    stop: Arc<AtomicBool>,
    counters: Arc<RunCounters>,
}

impl WorkerContext {
    fn run(self) -> Result<ScanTimings> {
        let mut timings = ScanTimings::default();
        while !self.stop.load(Ordering::Acquire) {
            let Some(scan) = self.source.next_scan() else {
                break;
            };
            let outcome = self
                .pipeline
                .process_scan(&scan, &mut timings)
                .and_then(|records| {
                    self.sink
                        .write_results(records)
                        .map_err(SearchError::from)
                });
            match outcome {
                Ok(()) => {}
                Err(e) if e.is_recoverable() => {
                    warn!("Skipping scan {}: {}", scan, e);
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    error!("Stopping search at scan {}: {}", scan, e);
                    self.stop.store(true, Ordering::Release);
                    return Err(e);
                }
            }
            self.counters.processed.fetch_add(1, Ordering::Release);
        }
        Ok(timings)
    }
}

pub struct SearchOrchestrator {
    pipeline: Arc<SearchPipeline>,
    source: Arc<dyn ScanSource>,
    sinks: SinkStack,
    config: OrchestratorConfig,
    probe: Box<dyn DeadlockProbe>,
    stop: Arc<AtomicBool>,
    counters: Arc<RunCounters>,
}

impl SearchOrchestrator {
    pub fn new(
        pipeline: Arc<SearchPipeline>,
        source: Arc<dyn ScanSource>,
        sinks: SinkStack,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            pipeline,
            source,
            sinks,
            config,
            probe: Box::new(ParkingLotProbe),
            stop: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(RunCounters::default()),
        }
    }

    pub fn with_probe(mut self, probe: Box<dyn DeadlockProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Setting the flag makes workers exit after their current scan.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn processed(&self) -> u64 {
        self.counters.processed.load(Ordering::Acquire)
    }

    fn spawn_workers(&self) -> Result<Vec<JoinHandle<Result<ScanTimings>>>> {
        let ctx = WorkerContext {
            pipeline: self.pipeline.clone(),
            source: self.source.clone(),
            sink: self.sinks.top(),
            stop: self.stop.clone(),
            counters: self.counters.clone(),
        };
        let threads = self.config.threads.max(1);
        let mut handles = Vec::with_capacity(threads);
        for i in 0..threads {
            let name = format!("xlseek-worker-{i}");
            let worker = ctx.clone();
            let handle = std::thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker.run())
                .map_err(|source| SearchError::ThreadSpawn { name, source })?;
            handles.push(handle);
        }
        info!("Started {} search workers", threads);
        Ok(handles)
    }

    /// Waits for the workers to finish, probing for deadlocks when no scan
    /// completes for a while.
    fn supervise(
        &self,
        handles: &[JoinHandle<Result<ScanTimings>>],
        reporter: &mut ProgressReporter,
    ) -> Result<()> {
        let poll = Duration::from_millis(self.config.poll_interval_ms.max(1));
        let mut monitor = LivenessMonitor::new(self.config.probe_after, self.config.probe_widening);
        while handles.iter().any(|h| !h.is_finished()) {
            std::thread::sleep(poll);
            reporter.update(self.source.count_read(), self.source.total_count());
            if monitor.observe(self.processed()) != LivenessEvent::ProbeDue {
                continue;
            }
            match self.probe.check() {
                Some(dump) => {
                    error!("Deadlock detected, aborting search:\n{}", dump);
                    self.stop.store(true, Ordering::Release);
                    return Err(SearchError::Deadlock { dump });
                }
                None => warn!(
                    "No scan finished for {} polls ({:?} each) and no deadlock was found, \
                     next check after {} quiet polls",
                    monitor.quiet_polls(),
                    poll,
                    monitor.next_probe()
                ),
            }
        }
        Ok(())
    }

    fn join_workers(handles: Vec<JoinHandle<Result<ScanTimings>>>) -> Result<ScanTimings> {
        let mut timings = ScanTimings::default();
        let mut first_error = None;
        for handle in handles {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            match handle.join() {
                Ok(Ok(t)) => timings += t,
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(_) => {
                    first_error.get_or_insert(SearchError::WorkerPanicked { name });
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(timings),
        }
    }

    /// Runs until the source is exhausted and every sink is closed.
    ///
    /// Per-scan failures are logged and counted. Any other failure stops all
    /// workers; results written up to that point stay in the sinks.
    pub fn run(&self) -> Result<RunSummary> {
        let start = Instant::now();
        let mut reporter =
            ProgressReporter::new(Duration::from_millis(self.config.progress_interval_ms));
        if self.config.progress_bar {
            reporter = reporter.with_bar();
        }
        let drain_window = Duration::from_millis(self.config.drain_window_ms);
        let drain_sleep = Duration::from_millis(self.config.drain_sleep_ms);

        let mut timings = ScanTimings::default();
        let mut restarts = 0;
        loop {
            let handles = self.spawn_workers()?;
            self.supervise(&handles, &mut reporter)?;
            match Self::join_workers(handles) {
                Ok(t) => timings += t,
                Err(e) => {
                    if let Err(close_err) = self.sinks.close() {
                        warn!("Unable to close sinks after failure: {}", close_err);
                    }
                    return Err(e);
                }
            }

            self.sinks.drain_buffers(drain_window, drain_sleep)?;
            if self.stop.load(Ordering::Acquire) || !self.source.has_next() {
                break;
            }
            restarts += 1;
            info!("Scans arrived while draining, restarting workers");
        }
        self.sinks.close()?;
        reporter.update(self.source.count_read(), self.source.total_count());
        reporter.finish();

        let storage = self.sinks.innermost();
        let summary = RunSummary {
            scans_read: self.source.count_read(),
            scans_processed: self.processed(),
            scans_failed: self.counters.failed.load(Ordering::Relaxed),
            results: storage.result_count(),
            top_results: storage.top_result_count(),
            restarts,
            timings,
            elapsed_ms: start.elapsed().as_millis(),
        };
        info!(
            "Search finished: {} scans, {} failed, all results: {}, top results: {}",
            summary.scans_processed, summary.scans_failed, summary.results, summary.top_results
        );
        if summary.scans_processed == 0 && self.source.total_count() == 0 {
            return Err(SearchError::NoScansProcessed);
        }
        Ok(summary)
    }
}
