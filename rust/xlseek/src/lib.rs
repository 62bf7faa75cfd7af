pub mod errors;
pub mod index;
pub mod models;
pub mod scoring;
pub mod search;
pub mod tolerance;
pub mod utils;

pub use errors::{
    Result,
    SearchError,
    SinkError,
};
pub use index::{
    FragmentIndex,
    FragmentSource,
    FragmentTable,
    IndexBuilder,
    IndexParameters,
    MassIndex,
    PeptideIndices,
    ResidueLadder,
};
pub use models::{
    CrossLinker,
    DecoyMarking,
    DecoyReconciliation,
    MatchRecord,
    Modification,
    Peak,
    Peptide,
    Scan,
};
pub use scoring::{
    ScoredOccurrence,
    SearchParameters,
    SearchPipeline,
};
pub use search::{
    OrchestratorConfig,
    RunSummary,
    SearchOrchestrator,
};
pub use tolerance::MassTolerance;
