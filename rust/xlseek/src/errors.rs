use std::time::Duration;

/// Failures surfaced by the search engine.
///
/// Only `InvalidScan` and `NonFiniteScore` are recovered from, by skipping the
/// offending scan. Everything else terminates the run.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("invalid scan {run}:{scan_number}: {reason}")]
    InvalidScan {
        run: String,
        scan_number: u32,
        reason: &'static str,
    },

    #[error("sub-score '{name}' produced a non-finite value ({value})")]
    NonFiniteScore { name: String, value: f64 },

    #[error("invalid search configuration: {reason}")]
    Configuration { reason: String },

    #[error("mass index is inconsistent: {context}")]
    IndexInconsistency { context: String },

    #[error("deadlock detected between worker threads:\n{dump}")]
    Deadlock { dump: String },

    #[error("no scans were read and the source reports no total")]
    NoScansProcessed,

    /// Only reachable in builds that unwind. The release profile sets
    /// `panic = 'abort'`, so there a panicking worker ends the process.
    #[error("worker thread '{name}' panicked")]
    WorkerPanicked { name: String },

    #[error("unable to spawn thread '{name}': {source}")]
    ThreadSpawn {
        name: String,
        source: std::io::Error,
    },

    #[error("result sink failed: {0}")]
    Sink(#[from] SinkError),
}

impl SearchError {
    /// Whether the error only invalidates the scan being processed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SearchError::InvalidScan { .. } | SearchError::NonFiniteScore { .. }
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("io error in sink '{sink}': {source}")]
    Io {
        sink: &'static str,
        source: std::io::Error,
    },

    #[error("unable to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("buffer thread of '{sink}' is gone and could not be restarted")]
    BufferThreadDead { sink: &'static str },

    #[error("sink '{sink}' was written to after it finished")]
    AlreadyFinished { sink: &'static str },

    #[error("sink '{sink}' still had {pending} buffered records after {waited:?}")]
    DrainTimeout {
        sink: &'static str,
        pending: usize,
        waited: Duration,
    },

    #[error("buffer of '{sink}' dropped {lost} records after a write failure: {cause}")]
    RecordsLost {
        sink: &'static str,
        lost: usize,
        cause: String,
    },
}

pub type Result<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        let err = SearchError::InvalidScan {
            run: "run1".into(),
            scan_number: 7,
            reason: "no peaks",
        };
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "invalid scan run1:7: no peaks");

        let err = SearchError::Deadlock {
            dump: "thread a".into(),
        };
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_sink_error_converts() {
        let err: SearchError = SinkError::BufferThreadDead { sink: "buffer" }.into();
        assert!(matches!(err, SearchError::Sink(_)));
    }
}
