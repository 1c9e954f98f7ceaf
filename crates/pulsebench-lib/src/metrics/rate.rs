use crate::{
    error::{BenchError, BenchResult},
    signal::{BeatSequence, RateSeries},
    window::require_positive,
};
use log::debug;
use serde::{Deserialize, Serialize};

/// Where on its interval an instantaneous rate sample is placed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Anchor {
    /// Earlier beat of the pair.
    Start,
    /// Later beat of the pair.
    #[default]
    End,
    Midpoint,
}

impl Anchor {
    pub fn place(self, earlier: f64, later: f64) -> f64 {
        match self {
            Anchor::Start => earlier,
            Anchor::End => later,
            Anchor::Midpoint => 0.5 * (earlier + later),
        }
    }
}

/// Treatment of intervals outside the physiological range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutlierPolicy {
    #[default]
    Drop,
    /// Clamp the interval to the nearest bound.
    Clip,
    Keep,
}

/// Moving-average interval filter: an interval further than `percent` from the
/// mean of its `window_beats` neighbours on either side is replaced by linear
/// interpolation between accepted intervals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalFilter {
    pub window_beats: usize,
    pub percent: f64,
}

impl Default for IntervalFilter {
    fn default() -> Self {
        Self {
            window_beats: 10,
            percent: 50.0,
        }
    }
}

impl IntervalFilter {
    pub fn apply(&self, intervals: &[f64]) -> Vec<f64> {
        let n = intervals.len();
        if n < 2 || self.window_beats == 0 {
            return intervals.to_vec();
        }
        let band = self.percent / 100.0;
        let accepted: Vec<bool> = (0..n)
            .map(|i| {
                let lo = i.saturating_sub(self.window_beats);
                let hi = (i + self.window_beats).min(n - 1);
                let (sum, count) = (lo..=hi)
                    .filter(|&j| j != i)
                    .fold((0.0, 0usize), |(s, c), j| (s + intervals[j], c + 1));
                if count == 0 {
                    return true;
                }
                let mean = sum / count as f64;
                let x = intervals[i];
                x > (1.0 - band) * mean && x < (1.0 + band) * mean
            })
            .collect();
        let anchors: Vec<usize> = (0..n).filter(|&i| accepted[i]).collect();
        if anchors.is_empty() {
            return intervals.to_vec();
        }
        (0..n)
            .map(|i| {
                if accepted[i] {
                    intervals[i]
                } else {
                    interpolate_gap(intervals, &anchors, i)
                }
            })
            .collect()
    }
}

fn interpolate_gap(values: &[f64], anchors: &[usize], i: usize) -> f64 {
    let next = anchors.partition_point(|&a| a < i);
    match (next.checked_sub(1).map(|p| anchors[p]), anchors.get(next)) {
        (Some(a), Some(&b)) => {
            let frac = (i - a) as f64 / (b - a) as f64;
            values[a] + frac * (values[b] - values[a])
        }
        (Some(a), None) => values[a],
        (None, Some(&b)) => values[b],
        (None, None) => values[i],
    }
}

/// Rate series construction parameters. Both sides of a comparison must share one
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateSeriesConfig {
    pub anchor: Anchor,
    pub outliers: OutlierPolicy,
    /// Shortest plausible inter-beat interval (seconds); 0.25 s = 240 bpm.
    pub min_interval_s: f64,
    /// Longest plausible inter-beat interval (seconds); 2.5 s = 24 bpm.
    pub max_interval_s: f64,
    pub filter: Option<IntervalFilter>,
}

impl Default for RateSeriesConfig {
    fn default() -> Self {
        Self {
            anchor: Anchor::End,
            outliers: OutlierPolicy::Drop,
            min_interval_s: 0.25,
            max_interval_s: 2.5,
            filter: None,
        }
    }
}

impl RateSeriesConfig {
    pub fn validate(&self) -> BenchResult<()> {
        require_positive("min_interval_s", self.min_interval_s)?;
        require_positive("max_interval_s", self.max_interval_s)?;
        if self.max_interval_s <= self.min_interval_s {
            return Err(BenchError::InvalidTolerance {
                name: "max_interval_s",
                value: self.max_interval_s,
            });
        }
        if let Some(filter) = &self.filter {
            require_positive("filter percent", filter.percent)?;
        }
        Ok(())
    }

    fn is_outlier(&self, interval: f64) -> bool {
        interval < self.min_interval_s || interval > self.max_interval_s
    }
}

/// Convert a beat sequence into instantaneous rate samples (bpm), one per accepted
/// inter-beat interval.
pub fn build_rate_series(beats: &BeatSequence, cfg: &RateSeriesConfig) -> BenchResult<RateSeries> {
    if beats.len() < 2 {
        return Err(BenchError::InsufficientBeats {
            required: 2,
            found: beats.len(),
        });
    }
    cfg.validate()?;

    let times = beats.times();
    let mut intervals = beats.intervals().intervals;
    if let Some(filter) = &cfg.filter {
        intervals = filter.apply(&intervals);
    }

    let mut series = RateSeries::default();
    for (i, &interval) in intervals.iter().enumerate() {
        let interval = match cfg.outliers {
            OutlierPolicy::Drop if cfg.is_outlier(interval) => {
                series.rejected += 1;
                continue;
            }
            OutlierPolicy::Clip => interval.clamp(cfg.min_interval_s, cfg.max_interval_s),
            _ => interval,
        };
        series.times.push(cfg.anchor.place(times[i], times[i + 1]));
        series.bpm.push(60.0 / interval);
    }

    if series.rejected > 0 {
        debug!(
            "dropped {} of {} intervals outside {:.3}..{:.3} s",
            series.rejected,
            intervals.len(),
            cfg.min_interval_s,
            cfg.max_interval_s
        );
    }
    if series.is_empty() {
        return Err(BenchError::InsufficientBeats {
            required: 2,
            found: 0,
        });
    }
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beats(times: &[f64]) -> BeatSequence {
        BeatSequence::new(times.to_vec()).unwrap()
    }

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn evenly_spaced_beats_give_constant_rate() {
        let seq = beats(&[0.0, 0.8, 1.6, 2.4, 3.2, 4.0]);
        let rate = build_rate_series(&seq, &RateSeriesConfig::default()).unwrap();
        assert_eq!(rate.len(), 5);
        for bpm in &rate.bpm {
            assert_close(*bpm, 75.0, 1e-9);
        }
        assert_eq!(rate.times, vec![0.8, 1.6, 2.4, 3.2, 4.0]);
    }

    #[test]
    fn fewer_than_two_beats_is_an_error() {
        let err = build_rate_series(&beats(&[1.0]), &RateSeriesConfig::default()).unwrap_err();
        assert_eq!(
            err,
            BenchError::InsufficientBeats {
                required: 2,
                found: 1
            }
        );
    }

    #[test]
    fn anchors_place_samples_consistently() {
        let seq = beats(&[1.0, 2.0, 3.0]);
        let mut cfg = RateSeriesConfig::default();
        cfg.anchor = Anchor::Start;
        assert_eq!(build_rate_series(&seq, &cfg).unwrap().times, vec![1.0, 2.0]);
        cfg.anchor = Anchor::Midpoint;
        assert_eq!(build_rate_series(&seq, &cfg).unwrap().times, vec![1.5, 2.5]);
    }

    #[test]
    fn outlier_policies() {
        // 0.1 s (600 bpm) and 3.0 s (20 bpm) intervals are implausible.
        let seq = beats(&[0.0, 1.0, 1.1, 2.1, 5.1, 6.1]);
        let mut cfg = RateSeriesConfig::default();

        let dropped = build_rate_series(&seq, &cfg).unwrap();
        assert_eq!(dropped.len(), 3);
        assert_eq!(dropped.rejected, 2);
        assert!(dropped.bpm.iter().all(|&b| (b - 60.0).abs() < 1e-9));

        cfg.outliers = OutlierPolicy::Clip;
        let clipped = build_rate_series(&seq, &cfg).unwrap();
        assert_eq!(clipped.len(), 5);
        assert_close(clipped.bpm[1], 240.0, 1e-9);
        assert_close(clipped.bpm[3], 24.0, 1e-9);

        cfg.outliers = OutlierPolicy::Keep;
        let kept = build_rate_series(&seq, &cfg).unwrap();
        assert_close(kept.bpm[1], 600.0, 1e-6);
        assert_close(kept.bpm[3], 20.0, 1e-9);
    }

    #[test]
    fn all_intervals_rejected_is_insufficient() {
        let seq = beats(&[0.0, 0.1, 0.2]);
        let err = build_rate_series(&seq, &RateSeriesConfig::default()).unwrap_err();
        assert!(matches!(err, BenchError::InsufficientBeats { .. }));
    }

    #[test]
    fn interval_filter_interpolates_ectopic_interval() {
        let filter = IntervalFilter {
            window_beats: 3,
            percent: 30.0,
        };
        let intervals = [1.0, 1.0, 1.0, 0.4, 1.0, 1.0, 1.0];
        let filtered = filter.apply(&intervals);
        assert_eq!(filtered.len(), intervals.len());
        assert_close(filtered[3], 1.0, 1e-12);
        assert_close(filtered[0], 1.0, 1e-12);
    }

    #[test]
    fn invalid_bounds_are_rejected() {
        let mut cfg = RateSeriesConfig::default();
        cfg.max_interval_s = 0.1;
        let err = build_rate_series(&beats(&[0.0, 1.0]), &cfg).unwrap_err();
        assert!(matches!(err, BenchError::InvalidTolerance { .. }));
    }

    #[test]
    fn config_names_are_kebab_case() {
        let anchor: Anchor = serde_json::from_str("\"midpoint\"").unwrap();
        assert_eq!(anchor, Anchor::Midpoint);
        let policy: OutlierPolicy = serde_json::from_str("\"clip\"").unwrap();
        assert_eq!(policy, OutlierPolicy::Clip);
        assert!(serde_json::from_str::<Anchor>("\"mid\"").is_err());
    }
}
