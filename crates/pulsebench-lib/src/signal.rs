use crate::error::{BenchError, BenchResult};
use serde::{Deserialize, Serialize};

/// Uniformly sampled series anchored at `start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Time of the first sample (seconds)
    pub start: f64,
    /// Uniform sampling frequency in Hz
    pub fs: f64,
    /// Samples
    pub data: Vec<f64>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn duration(&self) -> f64 {
        self.data.len() as f64 / self.fs
    }
    pub fn time_at(&self, index: usize) -> f64 {
        self.start + index as f64 / self.fs
    }
}

/// Detected beats on one channel, in seconds from the recording start.
///
/// Always strictly increasing: construction rejects unsorted or non-finite input
/// and collapses beats sharing an identical timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct BeatSequence {
    times: Vec<f64>,
}

impl BeatSequence {
    /// Build from timestamps that are already in non-decreasing order.
    pub fn new(times: Vec<f64>) -> BenchResult<Self> {
        check_finite(&times)?;
        if let Some(index) = (1..times.len()).find(|&i| times[i] < times[i - 1]) {
            return Err(BenchError::UnsortedBeats { index });
        }
        let mut times = times;
        times.dedup();
        Ok(Self { times })
    }

    /// Build from timestamps in any order.
    pub fn from_unsorted(times: Vec<f64>) -> BenchResult<Self> {
        check_finite(&times)?;
        let mut times = times;
        times.sort_by(f64::total_cmp);
        times.dedup();
        Ok(Self { times })
    }

    /// Convert detector sample positions at `fs` Hz into a beat sequence.
    pub fn from_sample_indices(indices: &[usize], fs: f64) -> BenchResult<Self> {
        if !fs.is_finite() || fs <= 0.0 {
            return Err(BenchError::InvalidSampleRate { fs });
        }
        Self::from_unsorted(indices.iter().map(|&i| i as f64 / fs).collect())
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }
    pub fn len(&self) -> usize {
        self.times.len()
    }
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
    pub fn start(&self) -> Option<f64> {
        self.times.first().copied()
    }
    pub fn end(&self) -> Option<f64> {
        self.times.last().copied()
    }

    /// Time between the first and last beat; zero for fewer than two beats.
    pub fn span(&self) -> f64 {
        match (self.start(), self.end()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    /// The same beats moved by a constant offset.
    pub fn shifted(&self, offset_s: f64) -> BenchResult<Self> {
        Self::new(self.times.iter().map(|t| t + offset_s).collect())
    }

    /// Beats falling in the half-open window `[start, end)`.
    pub fn within(&self, start: f64, end: f64) -> Self {
        let lo = self.times.partition_point(|&t| t < start);
        let hi = self.times.partition_point(|&t| t < end).max(lo);
        Self {
            times: self.times[lo..hi].to_vec(),
        }
    }

    pub fn intervals(&self) -> IntervalSeries {
        IntervalSeries::from_beats(self)
    }
}

impl TryFrom<Vec<f64>> for BeatSequence {
    type Error = BenchError;

    fn try_from(times: Vec<f64>) -> BenchResult<Self> {
        Self::new(times)
    }
}

impl From<BeatSequence> for Vec<f64> {
    fn from(beats: BeatSequence) -> Self {
        beats.times
    }
}

fn check_finite(times: &[f64]) -> BenchResult<()> {
    match times.iter().position(|t| !t.is_finite()) {
        Some(index) => Err(BenchError::NonFiniteTimestamp { index }),
        None => Ok(()),
    }
}

/// Inter-beat intervals (seconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalSeries {
    pub intervals: Vec<f64>,
}

impl IntervalSeries {
    pub fn from_beats(beats: &BeatSequence) -> Self {
        let intervals = beats.times.windows(2).map(|w| w[1] - w[0]).collect();
        Self { intervals }
    }
}

/// Instantaneous rate samples (beats per minute) anchored on the beat timeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateSeries {
    pub times: Vec<f64>,
    pub bpm: Vec<f64>,
    /// Intervals discarded by the outlier policy.
    pub rejected: usize,
}

impl RateSeries {
    pub fn len(&self) -> usize {
        self.times.len()
    }
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
    pub fn start(&self) -> Option<f64> {
        self.times.first().copied()
    }
    pub fn end(&self) -> Option<f64> {
        self.times.last().copied()
    }
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.times.iter().copied().zip(self.bpm.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_collapses_duplicate_beats() {
        let beats = BeatSequence::new(vec![0.0, 1.0, 1.0, 2.0]).unwrap();
        assert_eq!(beats.times(), &[0.0, 1.0, 2.0]);
    }

    #[test]
    fn new_rejects_unsorted_input() {
        let err = BeatSequence::new(vec![0.0, 2.0, 1.0]).unwrap_err();
        assert_eq!(err, BenchError::UnsortedBeats { index: 2 });
    }

    #[test]
    fn rejects_non_finite_timestamps() {
        let err = BeatSequence::from_unsorted(vec![0.0, f64::NAN]).unwrap_err();
        assert_eq!(err, BenchError::NonFiniteTimestamp { index: 1 });
    }

    #[test]
    fn from_unsorted_sorts_and_dedups() {
        let beats = BeatSequence::from_unsorted(vec![2.0, 0.5, 2.0, 1.0]).unwrap();
        assert_eq!(beats.times(), &[0.5, 1.0, 2.0]);
    }

    #[test]
    fn sample_indices_convert_to_seconds() {
        let beats = BeatSequence::from_sample_indices(&[0, 256, 512], 256.0).unwrap();
        assert_eq!(beats.times(), &[0.0, 1.0, 2.0]);
        assert!(BeatSequence::from_sample_indices(&[1], 0.0).is_err());
    }

    #[test]
    fn within_is_half_open() {
        let beats = BeatSequence::new(vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        assert_eq!(beats.within(1.0, 3.0).times(), &[1.0, 2.0]);
        assert!(beats.within(5.0, 4.0).is_empty());
    }

    #[test]
    fn deserializes_through_validation() {
        let beats: BeatSequence = serde_json::from_str("[0.0, 0.8, 1.6]").unwrap();
        assert_eq!(beats.len(), 3);
        assert!(serde_json::from_str::<BeatSequence>("[1.0, 0.0]").is_err());
    }
}
