pub mod liveness;
pub mod orchestrator;
pub mod progress;
pub mod sink;
pub mod source;

pub use liveness::{
    DeadlockProbe,
    LivenessEvent,
    LivenessMonitor,
    ParkingLotProbe,
};
pub use orchestrator::{
    OrchestratorConfig,
    RunSummary,
    SearchOrchestrator,
};
pub use progress::{
    ProgressReporter,
    progress_line,
};
pub use sink::{
    BufferedSink,
    FilterSink,
    JsonLinesSink,
    MatchFilter,
    MemorySink,
    ResultSink,
    SinkStack,
};
pub use source::{
    QueueScanSource,
    ScanSource,
};
