//! Timing instrumentation for the per-scan pipeline.
//!
//! Every worker keeps its own [`ScanTimings`], the orchestrator sums them once
//! the workers have joined.

use serde::Serialize;
use std::time::Duration;

/// Accumulated time spent in each stage across all processed scans.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScanTimings {
    /// Per-peak fragment lookups (MGC).
    pub coarse: Duration,

    /// Alpha selection and beta lookups.
    pub candidates: Duration,

    /// Fine filtering (MGX) plus full matching and sub-scores.
    pub matching: Duration,

    /// Sorting and delta scores.
    pub ranking: Duration,
}

impl ScanTimings {
    pub fn total(&self) -> Duration {
        self.coarse + self.candidates + self.matching + self.ranking
    }
}

impl Serialize for ScanTimings {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ScanTimings", 5)?;
        state.serialize_field("coarse_ms", &self.coarse.as_millis())?;
        state.serialize_field("candidates_ms", &self.candidates.as_millis())?;
        state.serialize_field("matching_ms", &self.matching.as_millis())?;
        state.serialize_field("ranking_ms", &self.ranking.as_millis())?;
        state.serialize_field("total_ms", &self.total().as_millis())?;
        state.end()
    }
}

impl std::ops::AddAssign for ScanTimings {
    fn add_assign(&mut self, rhs: Self) {
        self.coarse += rhs.coarse;
        self.candidates += rhs.candidates;
        self.matching += rhs.matching;
        self.ranking += rhs.ranking;
    }
}
