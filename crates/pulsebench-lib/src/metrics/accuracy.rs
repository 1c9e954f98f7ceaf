use crate::{
    error::{BenchError, BenchResult},
    metrics::rate::{build_rate_series, RateSeriesConfig},
    signal::{BeatSequence, RateSeries, TimeSeries},
    window::{grid_len, require_positive, within_tolerance},
};
use serde::{Deserialize, Serialize};

/// How a rate series is evaluated between its samples. Both sides of a comparison
/// are resampled with the same method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Interpolation {
    #[default]
    Linear,
    /// Hold the most recent sample until the next one.
    StepHold,
}

/// Parameters of the IHR/IPR agreement score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccuracyConfig {
    /// Half-width of the agreement band (bpm).
    pub tolerance_bpm: f64,
    /// Spacing of the common resampling grid (seconds).
    pub resample_interval_s: f64,
    pub interpolation: Interpolation,
    /// Constant delay applied to the reference beats before comparison (seconds).
    pub reference_delay_s: f64,
    /// Extra bands reported alongside the main tolerance.
    pub agreement_bands: Vec<f64>,
    #[serde(skip)]
    pub rate: RateSeriesConfig,
}

impl Default for AccuracyConfig {
    fn default() -> Self {
        Self {
            tolerance_bpm: 5.0,
            resample_interval_s: 0.5,
            interpolation: Interpolation::Linear,
            reference_delay_s: 0.0,
            agreement_bands: vec![1.0, 2.0, 3.0, 4.0, 5.0],
            rate: RateSeriesConfig::default(),
        }
    }
}

/// One grid point where both rate series are defined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignedSample {
    pub time: f64,
    pub ihr: f64,
    pub ipr: f64,
    pub within_tolerance: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgreementBand {
    pub tolerance_bpm: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccuracyResult {
    pub overlap_start: f64,
    pub overlap_end: f64,
    pub tolerance_bpm: f64,
    pub samples: Vec<AlignedSample>,
    pub within_tolerance: usize,
    /// Share of aligned samples inside the band, 0..=100.
    pub percentage: f64,
    pub mean_abs_error_bpm: f64,
}

impl AccuracyResult {
    pub fn aligned_samples(&self) -> usize {
        self.samples.len()
    }

    /// Percentage of the same aligned samples that fall within `tolerance_bpm`.
    pub fn agreement(&self, tolerance_bpm: f64) -> f64 {
        let hits = self
            .samples
            .iter()
            .filter(|s| within_tolerance(s.ihr, s.ipr, tolerance_bpm))
            .count();
        percentage(hits, self.samples.len())
    }

    pub fn agreement_curve(&self, bands: &[f64]) -> Vec<AgreementBand> {
        bands
            .iter()
            .map(|&tolerance_bpm| AgreementBand {
                tolerance_bpm,
                percentage: self.agreement(tolerance_bpm),
            })
            .collect()
    }

    pub fn scores(&self, bands: &[f64]) -> AccuracyScores {
        AccuracyScores {
            aligned_samples: self.samples.len(),
            within_tolerance: self.within_tolerance,
            percentage: self.percentage,
            mean_abs_error_bpm: self.mean_abs_error_bpm,
            agreement: self.agreement_curve(bands),
        }
    }
}

/// Compact summary kept per recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyScores {
    pub aligned_samples: usize,
    pub within_tolerance: usize,
    pub percentage: f64,
    pub mean_abs_error_bpm: f64,
    pub agreement: Vec<AgreementBand>,
}

fn percentage(hits: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        hits as f64 * 100.0 / total as f64
    }
}

/// Both rate series evaluated on one uniform grid covering their common span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignedRates {
    pub ihr: TimeSeries,
    pub ipr: TimeSeries,
}

/// Resample two rate series onto a shared grid restricted to the span where both are
/// defined. Nothing is extrapolated.
pub fn align_rate_series(
    ihr: &RateSeries,
    ipr: &RateSeries,
    interval_s: f64,
    method: Interpolation,
) -> BenchResult<AlignedRates> {
    let interval_s = require_positive("resample_interval_s", interval_s)?;
    let (Some(ref_start), Some(ref_end), Some(cand_start), Some(cand_end)) =
        (ihr.start(), ihr.end(), ipr.start(), ipr.end())
    else {
        return Err(BenchError::InsufficientBeats {
            required: 2,
            found: 0,
        });
    };
    let start = ref_start.max(cand_start);
    let end = ref_end.min(cand_end);
    if start > end {
        return Err(BenchError::NoOverlap {
            reference_start: ref_start,
            reference_end: ref_end,
            candidate_start: cand_start,
            candidate_end: cand_end,
        });
    }

    let count = grid_len("resample_interval_s", end - start, interval_s)? + 1;
    let fs = 1.0 / interval_s;
    let grid: Vec<f64> = (0..count).map(|k| start + k as f64 * interval_s).collect();
    Ok(AlignedRates {
        ihr: TimeSeries {
            start,
            fs,
            data: grid.iter().map(|&t| sample_at(ihr, t, method)).collect(),
        },
        ipr: TimeSeries {
            start,
            fs,
            data: grid.iter().map(|&t| sample_at(ipr, t, method)).collect(),
        },
    })
}

/// Value of `series` at `t`, which must lie inside its span (clamped otherwise).
fn sample_at(series: &RateSeries, t: f64, method: Interpolation) -> f64 {
    let times = &series.times;
    let values = &series.bpm;
    // index of the first sample strictly after t
    let next = times.partition_point(|&x| x <= t);
    if next == 0 {
        return values[0];
    }
    if next == times.len() {
        return values[times.len() - 1];
    }
    let prev = next - 1;
    match method {
        Interpolation::StepHold => values[prev],
        Interpolation::Linear => {
            let (t0, t1) = (times[prev], times[next]);
            let frac = (t - t0) / (t1 - t0);
            values[prev] + frac * (values[next] - values[prev])
        }
    }
}

/// Score agreement between the reference heart rate (IHR) and candidate pulse rate
/// (IPR) derived from two beat sequences.
pub fn ihr_ipr_accuracy(
    reference: &BeatSequence,
    candidate: &BeatSequence,
    cfg: &AccuracyConfig,
) -> BenchResult<AccuracyResult> {
    let tolerance_bpm = require_positive("tolerance_bpm", cfg.tolerance_bpm)?;
    require_positive("resample_interval_s", cfg.resample_interval_s)?;

    let delayed;
    let reference = if cfg.reference_delay_s != 0.0 {
        delayed = reference.shifted(cfg.reference_delay_s)?;
        &delayed
    } else {
        reference
    };

    let ihr = build_rate_series(reference, &cfg.rate)?;
    let ipr = build_rate_series(candidate, &cfg.rate)?;
    let aligned = align_rate_series(&ihr, &ipr, cfg.resample_interval_s, cfg.interpolation)?;

    let samples: Vec<AlignedSample> = aligned
        .ihr
        .data
        .iter()
        .zip(&aligned.ipr.data)
        .enumerate()
        .map(|(k, (&h, &p))| AlignedSample {
            time: aligned.ihr.time_at(k),
            ihr: h,
            ipr: p,
            within_tolerance: within_tolerance(h, p, tolerance_bpm),
        })
        .collect();
    let hits = samples.iter().filter(|s| s.within_tolerance).count();
    let mean_abs_error_bpm =
        samples.iter().map(|s| (s.ihr - s.ipr).abs()).sum::<f64>() / samples.len() as f64;

    Ok(AccuracyResult {
        overlap_start: aligned.ihr.start,
        overlap_end: samples.last().map_or(aligned.ihr.start, |s| s.time),
        tolerance_bpm,
        within_tolerance: hits,
        percentage: percentage(hits, samples.len()),
        mean_abs_error_bpm,
        samples,
    })
}
