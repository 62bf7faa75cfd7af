pub mod occurrence;
pub mod pipeline;
pub mod ranking;
pub mod subscores;
pub mod timings;

pub use occurrence::{
    Occurrence,
    ScoredOccurrence,
};
pub use pipeline::{
    PIPELINE_SCORES,
    SearchParameters,
    SearchPipeline,
};
pub use ranking::{
    RankingParameters,
    ScoredCandidate,
    rank_scan,
};
pub use subscores::{
    CandidateMatch,
    CandidatePair,
    ExplainedIntensity,
    FragmentMatch,
    FragmentsMatched,
    MatchCleanup,
    MatchScore,
    PeakCoverage,
    SubScore,
    compute_sub_scores,
    default_sub_scores,
};
pub use timings::ScanTimings;
