use thiserror::Error;

/// Failures raised by the scoring engines.
///
/// An empty beat sequence is not an error: matching still proceeds and the affected
/// metrics come back undefined.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BenchError {
    #[error("insufficient beats: need at least {required}, found {found}")]
    InsufficientBeats { required: usize, found: usize },

    #[error(
        "rate series do not overlap: reference spans {reference_start:.3}..{reference_end:.3} s, \
         candidate spans {candidate_start:.3}..{candidate_end:.3} s"
    )]
    NoOverlap {
        reference_start: f64,
        reference_end: f64,
        candidate_start: f64,
        candidate_end: f64,
    },

    #[error("invalid {name}: {value}")]
    InvalidTolerance { name: &'static str, value: f64 },

    #[error("beat timestamps are not sorted (beat {index} precedes its predecessor)")]
    UnsortedBeats { index: usize },

    #[error("beat {index} has a non-finite timestamp")]
    NonFiniteTimestamp { index: usize },

    #[error("invalid sampling frequency: {fs} Hz")]
    InvalidSampleRate { fs: f64 },
}

pub type BenchResult<T> = Result<T, BenchError>;

impl BenchError {
    /// Stable short tag used in tabular reports.
    pub fn code(&self) -> &'static str {
        match self {
            BenchError::InsufficientBeats { .. } => "insufficient_beats",
            BenchError::NoOverlap { .. } => "no_overlap",
            BenchError::InvalidTolerance { .. } => "invalid_tolerance",
            BenchError::UnsortedBeats { .. } => "unsorted_beats",
            BenchError::NonFiniteTimestamp { .. } => "non_finite_timestamp",
            BenchError::InvalidSampleRate { .. } => "invalid_sample_rate",
        }
    }
}
