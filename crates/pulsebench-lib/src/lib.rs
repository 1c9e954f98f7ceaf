pub mod bench;
pub mod error;
pub mod io;
pub mod metrics;
pub mod plot;
pub mod report;
pub mod signal;
pub mod window;

pub use bench::{score_recording, BenchConfig, RecordingScore};
pub use error::{BenchError, BenchResult};
pub use metrics::{
    accuracy::ihr_ipr_accuracy, matching::match_beats, rate::build_rate_series,
};
pub use report::BenchmarkSummary;
pub use signal::*;
