//! Result sinks.
//!
//! Sinks are stacked: every wrapping stage forwards to the sink it was built
//! around. [`SinkStack`] keeps the stages in a list, innermost first, so that
//! draining and closing walk them explicitly.

use crate::errors::SinkError;
use crate::models::MatchRecord;
use crossbeam_channel::{
    Receiver,
    SendTimeoutError,
    Sender,
};
use parking_lot::Mutex;
use serde::{
    Deserialize,
    Serialize,
};
use std::fs::File;
use std::io::{
    BufWriter,
    Write,
};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{
    AtomicBool,
    AtomicU32,
    AtomicU64,
    AtomicUsize,
    Ordering,
};
use std::thread::JoinHandle;
use std::time::{
    Duration,
    Instant,
};
use tracing::{
    debug,
    info,
    warn,
};

type SinkResult<T> = std::result::Result<T, SinkError>;

/// Receives ranked matches. Must tolerate concurrent writers.
pub trait ResultSink: Send + Sync {
    fn name(&self) -> &'static str;

    fn write_result(&self, record: MatchRecord) -> SinkResult<()>;

    /// Writes the matches of one scan, keeping their order.
    fn write_results(&self, records: Vec<MatchRecord>) -> SinkResult<()> {
        for r in records {
            self.write_result(r)?;
        }
        Ok(())
    }

    fn flush(&self) -> SinkResult<()>;

    /// No more writes will follow.
    fn finish(&self) -> SinkResult<()>;

    /// Blocks until everything accepted before `finish` is handled.
    fn wait_for_finished(&self) -> SinkResult<()>;

    fn result_count(&self) -> u64;
    fn top_result_count(&self) -> u64;

    /// Records accepted but not yet handed to the wrapped sink.
    fn pending(&self) -> usize {
        0
    }

    /// Whether the stage can still make progress on its pending records.
    fn is_alive(&self) -> bool {
        true
    }

    /// Revives a dead stage. `Ok(false)` when nothing needed restarting.
    fn restart(&self) -> SinkResult<bool> {
        Ok(false)
    }
}

#[derive(Debug, Default)]
struct Counts {
    all: AtomicU64,
    top: AtomicU64,
}

impl Counts {
    fn record(&self, record: &MatchRecord) {
        self.all.fetch_add(1, Ordering::Relaxed);
        if record.is_top() {
            self.top.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<MatchRecord>>,
    counts: Counts,
    finished: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<MatchRecord> {
        self.records.lock().clone()
    }

    pub fn take(&self) -> Vec<MatchRecord> {
        std::mem::take(&mut *self.records.lock())
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

impl ResultSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn write_result(&self, record: MatchRecord) -> SinkResult<()> {
        if self.is_finished() {
            return Err(SinkError::AlreadyFinished { sink: self.name() });
        }
        self.counts.record(&record);
        self.records.lock().push(record);
        Ok(())
    }

    fn flush(&self) -> SinkResult<()> {
        Ok(())
    }

    fn finish(&self) -> SinkResult<()> {
        self.finished.store(true, Ordering::Release);
        Ok(())
    }

    fn wait_for_finished(&self) -> SinkResult<()> {
        Ok(())
    }

    fn result_count(&self) -> u64 {
        self.counts.all.load(Ordering::Relaxed)
    }

    fn top_result_count(&self) -> u64 {
        self.counts.top.load(Ordering::Relaxed)
    }
}

/// Writes one JSON object per line.
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<Option<BufWriter<W>>>,
    counts: Counts,
}

impl JsonLinesSink<File> {
    pub fn create(path: impl AsRef<Path>) -> SinkResult<Self> {
        let file = File::create(path.as_ref()).map_err(|source| SinkError::Io {
            sink: "json_lines",
            source,
        })?;
        info!("Writing results to {}", path.as_ref().display());
        Ok(Self::new(file))
    }
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(Some(BufWriter::new(writer))),
            counts: Counts::default(),
        }
    }

    fn io_error(source: std::io::Error) -> SinkError {
        SinkError::Io {
            sink: "json_lines",
            source,
        }
    }
}

impl<W: Write + Send> ResultSink for JsonLinesSink<W> {
    fn name(&self) -> &'static str {
        "json_lines"
    }

    fn write_result(&self, record: MatchRecord) -> SinkResult<()> {
        let line = serde_json::to_vec(&record)?;
        let mut guard = self.writer.lock();
        let writer = guard
            .as_mut()
            .ok_or(SinkError::AlreadyFinished { sink: self.name() })?;
        writer.write_all(&line).map_err(Self::io_error)?;
        writer.write_all(b"\n").map_err(Self::io_error)?;
        self.counts.record(&record);
        Ok(())
    }

    fn flush(&self) -> SinkResult<()> {
        match self.writer.lock().as_mut() {
            Some(w) => w.flush().map_err(Self::io_error),
            None => Ok(()),
        }
    }

    fn finish(&self) -> SinkResult<()> {
        if let Some(mut w) = self.writer.lock().take() {
            w.flush().map_err(Self::io_error)?;
        }
        Ok(())
    }

    fn wait_for_finished(&self) -> SinkResult<()> {
        Ok(())
    }

    fn result_count(&self) -> u64 {
        self.counts.all.load(Ordering::Relaxed)
    }

    fn top_result_count(&self) -> u64 {
        self.counts.top.load(Ordering::Relaxed)
    }
}

struct BufferState {
    sender: Option<Sender<Vec<MatchRecord>>>,
    receiver: Receiver<Vec<MatchRecord>>,
    consumer: Option<JoinHandle<()>>,
}

/// Decouples workers from a slow sink with a bounded queue drained by a
/// dedicated consumer thread.
///
/// The consumer stops at the first error of the wrapped sink, dropping the
/// batch it was writing. The error is reported by the next call into the
/// buffer, and the consumer can be restarted once. A restart keeps the run
/// going but the dropped batch is still reported by `wait_for_finished`.
pub struct BufferedSink {
    inner: Arc<dyn ResultSink>,
    state: Mutex<BufferState>,
    pending: Arc<AtomicUsize>,
    /// Failure of the consumer and the size of the batch it dropped.
    error: Arc<Mutex<Option<(usize, SinkError)>>>,
    lost: Mutex<Option<SinkError>>,
    restarts: AtomicU32,
    finished: AtomicBool,
    counts: Counts,
    send_timeout: Duration,
}

impl BufferedSink {
    pub fn new(inner: Arc<dyn ResultSink>, capacity: usize) -> SinkResult<Self> {
        let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
        let out = Self {
            inner,
            state: Mutex::new(BufferState {
                sender: Some(sender),
                receiver,
                consumer: None,
            }),
            pending: Arc::new(AtomicUsize::new(0)),
            error: Arc::new(Mutex::new(None)),
            lost: Mutex::new(None),
            restarts: AtomicU32::new(0),
            finished: AtomicBool::new(false),
            counts: Counts::default(),
            send_timeout: Duration::from_millis(100),
        };
        out.spawn_consumer()?;
        Ok(out)
    }

    pub fn restarts(&self) -> u32 {
        self.restarts.load(Ordering::Relaxed)
    }

    fn spawn_consumer(&self) -> SinkResult<()> {
        let mut state = self.state.lock();
        let rx = state.receiver.clone();
        let inner = self.inner.clone();
        let pending = self.pending.clone();
        let error = self.error.clone();
        let handle = std::thread::Builder::new()
            .name(format!("{}-buffer", self.inner.name()))
            .spawn(move || {
                for batch in rx.iter() {
                    let n = batch.len();
                    let res = inner.write_results(batch);
                    pending.fetch_sub(n, Ordering::AcqRel);
                    if let Err(e) = res {
                        *error.lock() = Some((n, e));
                        return;
                    }
                }
            })
            .map_err(|source| SinkError::Io {
                sink: "buffer",
                source,
            })?;
        state.consumer = Some(handle);
        Ok(())
    }

    fn take_error(&self) -> SinkResult<()> {
        match self.error.lock().take() {
            Some((_, e)) => Err(e),
            None => Ok(()),
        }
    }

    fn take_lost(&self) -> SinkResult<()> {
        match self.lost.lock().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn send(&self, mut batch: Vec<MatchRecord>) -> SinkResult<()> {
        let sender = self
            .state
            .lock()
            .sender
            .clone()
            .ok_or(SinkError::AlreadyFinished { sink: self.name() })?;
        let n = batch.len();
        self.pending.fetch_add(n, Ordering::AcqRel);
        loop {
            match sender.send_timeout(batch, self.send_timeout) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(b)) => {
                    batch = b;
                    if !self.is_alive() {
                        warn!("Buffer consumer of '{}' died while full", self.inner.name());
                        if let Err(e) = self.restart() {
                            self.pending.fetch_sub(n, Ordering::AcqRel);
                            return Err(e);
                        }
                    }
                }
                Err(SendTimeoutError::Disconnected(_)) => {
                    self.pending.fetch_sub(n, Ordering::AcqRel);
                    return Err(SinkError::BufferThreadDead { sink: self.name() });
                }
            }
        }
    }
}

impl ResultSink for BufferedSink {
    fn name(&self) -> &'static str {
        "buffer"
    }

    fn write_result(&self, record: MatchRecord) -> SinkResult<()> {
        self.write_results(vec![record])
    }

    fn write_results(&self, records: Vec<MatchRecord>) -> SinkResult<()> {
        if self.finished.load(Ordering::Acquire) {
            return Err(SinkError::AlreadyFinished { sink: self.name() });
        }
        self.take_error()?;
        if records.is_empty() {
            return Ok(());
        }
        for r in records.iter() {
            self.counts.record(r);
        }
        self.send(records)
    }

    fn flush(&self) -> SinkResult<()> {
        self.take_error()
    }

    fn finish(&self) -> SinkResult<()> {
        self.finished.store(true, Ordering::Release);
        self.state.lock().sender = None;
        Ok(())
    }

    fn wait_for_finished(&self) -> SinkResult<()> {
        let consumer = self.state.lock().consumer.take();
        if let Some(handle) = consumer {
            if handle.join().is_err() {
                return Err(SinkError::BufferThreadDead { sink: self.name() });
            }
        }
        self.take_error()?;
        self.take_lost()
    }

    fn result_count(&self) -> u64 {
        self.counts.all.load(Ordering::Relaxed)
    }

    fn top_result_count(&self) -> u64 {
        self.counts.top.load(Ordering::Relaxed)
    }

    fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    fn is_alive(&self) -> bool {
        self.state
            .lock()
            .consumer
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    fn restart(&self) -> SinkResult<bool> {
        if self.is_alive() || self.finished.load(Ordering::Acquire) {
            return Ok(false);
        }
        if self.restarts.fetch_add(1, Ordering::AcqRel) > 0 {
            return Err(SinkError::BufferThreadDead { sink: self.name() });
        }
        if let Some((n, e)) = self.error.lock().take() {
            warn!("Restarting buffer consumer after error, {} records lost: {}", n, e);
            *self.lost.lock() = Some(SinkError::RecordsLost {
                sink: self.inner.name(),
                lost: n,
                cause: e.to_string(),
            });
        }
        self.spawn_consumer()?;
        Ok(true)
    }
}

/// Conditions a record must meet to pass a [`FilterSink`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchFilter {
    MaxRank { rank: u32 },
    /// `name` is a recorded score, or `"score"` for the primary score.
    MinScore { name: String, min: f64 },
    TargetsOnly,
}

impl MatchFilter {
    pub fn accepts(&self, record: &MatchRecord) -> bool {
        match self {
            MatchFilter::MaxRank { rank } => record.rank <= *rank,
            MatchFilter::MinScore { name, min } => {
                let value = if name == "score" {
                    Some(record.score)
                } else {
                    record.sub_score(name)
                };
                value.is_some_and(|v| v >= *min)
            }
            MatchFilter::TargetsOnly => !record.is_decoy,
        }
    }
}

/// Forwards only the records accepted by every filter.
pub struct FilterSink {
    inner: Arc<dyn ResultSink>,
    filters: Vec<MatchFilter>,
    counts: Counts,
}

impl FilterSink {
    pub fn new(inner: Arc<dyn ResultSink>, filters: Vec<MatchFilter>) -> Self {
        Self {
            inner,
            filters,
            counts: Counts::default(),
        }
    }

    fn accepts(&self, record: &MatchRecord) -> bool {
        self.filters.iter().all(|f| f.accepts(record))
    }
}

impl ResultSink for FilterSink {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn write_result(&self, record: MatchRecord) -> SinkResult<()> {
        if !self.accepts(&record) {
            return Ok(());
        }
        self.counts.record(&record);
        self.inner.write_result(record)
    }

    fn write_results(&self, records: Vec<MatchRecord>) -> SinkResult<()> {
        let kept: Vec<MatchRecord> = records.into_iter().filter(|r| self.accepts(r)).collect();
        for r in kept.iter() {
            self.counts.record(r);
        }
        if kept.is_empty() {
            return Ok(());
        }
        self.inner.write_results(kept)
    }

    fn flush(&self) -> SinkResult<()> {
        Ok(())
    }

    fn finish(&self) -> SinkResult<()> {
        Ok(())
    }

    fn wait_for_finished(&self) -> SinkResult<()> {
        Ok(())
    }

    fn result_count(&self) -> u64 {
        self.counts.all.load(Ordering::Relaxed)
    }

    fn top_result_count(&self) -> u64 {
        self.counts.top.load(Ordering::Relaxed)
    }
}

/// The stages of a sink pipeline, innermost (storage) first.
#[derive(Clone)]
pub struct SinkStack {
    stages: Vec<Arc<dyn ResultSink>>,
}

impl SinkStack {
    pub fn new(inner: Arc<dyn ResultSink>) -> Self {
        Self {
            stages: vec![inner],
        }
    }

    /// Adds a stage around the current top.
    pub fn wrap<S, F>(mut self, build: F) -> SinkResult<Self>
    where
        S: ResultSink + 'static,
        F: FnOnce(Arc<dyn ResultSink>) -> SinkResult<S>,
    {
        let stage = build(self.top())?;
        self.stages.push(Arc::new(stage));
        Ok(self)
    }

    /// The stage workers write to.
    pub fn top(&self) -> Arc<dyn ResultSink> {
        // `new` seeds one stage and stages are never removed.
        self.stages[self.stages.len() - 1].clone()
    }

    pub fn innermost(&self) -> Arc<dyn ResultSink> {
        self.stages[0].clone()
    }

    pub fn stages(&self) -> &[Arc<dyn ResultSink>] {
        &self.stages
    }

    pub fn pending(&self) -> usize {
        self.stages.iter().map(|s| s.pending()).sum()
    }

    /// Waits until no stage holds pending records on two consecutive checks.
    ///
    /// A stage that is dead with records pending is restarted, which fails if
    /// it was restarted before. Once `window` has passed the remaining
    /// records are left to `close`, after a warning.
    pub fn drain_buffers(&self, window: Duration, sleep: Duration) -> SinkResult<()> {
        let start = Instant::now();
        let mut empty_checks = 0;
        loop {
            let mut pending = 0;
            for stage in self.stages.iter() {
                let p = stage.pending();
                if p > 0 && !stage.is_alive() {
                    warn!(
                        "Stage '{}' has {} pending records but its thread is gone, restarting",
                        stage.name(),
                        p
                    );
                    stage.restart()?;
                }
                pending += p;
            }
            if pending == 0 {
                empty_checks += 1;
                if empty_checks >= 2 {
                    debug!("Sink buffers drained in {:?}", start.elapsed());
                    return Ok(());
                }
            } else {
                empty_checks = 0;
                debug!("Waiting on {} buffered records", pending);
            }
            if start.elapsed() > window {
                warn!(
                    "{}",
                    SinkError::DrainTimeout {
                        sink: self.top().name(),
                        pending,
                        waited: start.elapsed(),
                    }
                );
                return Ok(());
            }
            std::thread::sleep(sleep);
        }
    }

    /// Flushes, finishes and waits on every stage, outermost first, so each
    /// buffer empties into a stage that still accepts writes. Every stage is
    /// closed even after a failure; the first error is returned.
    pub fn close(&self) -> SinkResult<()> {
        let mut first_error = None;
        for stage in self.stages.iter().rev() {
            let steps = [stage.flush(), stage.finish(), stage.wait_for_finished()];
            for e in steps.into_iter().filter_map(|r| r.err()) {
                warn!("Closing sink '{}' failed: {}", stage.name(), e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
