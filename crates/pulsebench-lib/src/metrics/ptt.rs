//! Pulse transit time (PTT) estimation: the delay between an ECG R-peak and the PPG
//! peak it produces. Delaying the reference by its PTT places each reference beat
//! where the candidate detector should have fired.

use crate::{
    error::{BenchError, BenchResult},
    signal::BeatSequence,
    window::{require_non_negative, require_positive},
};
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PttConfig {
    /// Shortest accepted R-peak to pulse-peak delay (seconds).
    pub min_ptt_s: f64,
    /// Longest accepted R-peak to pulse-peak delay (seconds).
    pub max_ptt_s: f64,
    /// Length of the centred moving average applied to the per-beat delays.
    pub smoothing_beats: usize,
}

impl Default for PttConfig {
    fn default() -> Self {
        Self {
            min_ptt_s: 0.20,
            max_ptt_s: 0.54,
            smoothing_beats: 300,
        }
    }
}

impl PttConfig {
    fn validate(&self) -> BenchResult<()> {
        require_non_negative("min_ptt_s", self.min_ptt_s)?;
        require_positive("max_ptt_s", self.max_ptt_s)?;
        if self.max_ptt_s <= self.min_ptt_s {
            return Err(BenchError::InvalidTolerance {
                name: "max_ptt_s",
                value: self.max_ptt_s,
            });
        }
        Ok(())
    }

    fn midpoint(&self) -> f64 {
        0.5 * (self.min_ptt_s + self.max_ptt_s)
    }

    fn in_range(&self, ptt: f64) -> bool {
        ptt > self.min_ptt_s && ptt < self.max_ptt_s
    }
}

/// Per-reference-beat PTT estimate (seconds), one value per reference beat.
pub fn estimate_ptt(
    reference: &BeatSequence,
    candidate: &BeatSequence,
    cfg: &PttConfig,
) -> BenchResult<Vec<f64>> {
    if reference.is_empty() {
        return Err(BenchError::InsufficientBeats {
            required: 1,
            found: 0,
        });
    }
    cfg.validate()?;

    let refs = reference.times();
    let cands = candidate.times();

    // first candidate strictly inside each R-R interval
    let mut raw: Vec<Option<f64>> = vec![None; refs.len()];
    for (i, pair) in refs.windows(2).enumerate() {
        let next = cands.partition_point(|&c| c <= pair[0]);
        if let Some(&c) = cands.get(next) {
            if c < pair[1] {
                raw[i] = Some(c - pair[0]);
            }
        }
    }

    let mut ptt = fill_gaps(&raw, cfg.midpoint());

    let accepted: Vec<f64> = ptt.iter().copied().filter(|&p| cfg.in_range(p)).collect();
    let replacement = if accepted.is_empty() {
        cfg.midpoint()
    } else {
        accepted.iter().sum::<f64>() / accepted.len() as f64
    };
    let replaced = ptt.len() - accepted.len();
    for p in ptt.iter_mut().filter(|p| !cfg.in_range(**p)) {
        *p = replacement;
    }
    if replaced > 0 {
        debug!(
            "replaced {} of {} PTT estimates outside {:.2}..{:.2} s with {:.3} s",
            replaced,
            ptt.len(),
            cfg.min_ptt_s,
            cfg.max_ptt_s,
            replacement
        );
    }

    Ok(centred_moving_average(&ptt, cfg.smoothing_beats))
}

/// Shift every reference beat by its estimated PTT.
pub fn delay_reference(
    reference: &BeatSequence,
    candidate: &BeatSequence,
    cfg: &PttConfig,
) -> BenchResult<BeatSequence> {
    let ptt = estimate_ptt(reference, candidate, cfg)?;
    BeatSequence::from_unsorted(
        reference
            .times()
            .iter()
            .zip(&ptt)
            .map(|(r, p)| r + p)
            .collect(),
    )
}

fn fill_gaps(raw: &[Option<f64>], fallback: f64) -> Vec<f64> {
    let known: Vec<usize> = (0..raw.len()).filter(|&i| raw[i].is_some()).collect();
    if known.is_empty() {
        return vec![fallback; raw.len()];
    }
    let value = |i: usize| raw[i].unwrap_or(fallback);
    (0..raw.len())
        .map(|i| {
            if let Some(v) = raw[i] {
                return v;
            }
            let next = known.partition_point(|&k| k < i);
            match (next.checked_sub(1).map(|p| known[p]), known.get(next)) {
                (Some(a), Some(&b)) => {
                    let frac = (i - a) as f64 / (b - a) as f64;
                    value(a) + frac * (value(b) - value(a))
                }
                (Some(a), None) => value(a),
                (None, Some(&b)) => value(b),
                (None, None) => fallback,
            }
        })
        .collect()
}

fn centred_moving_average(data: &[f64], win: usize) -> Vec<f64> {
    if win <= 1 || data.len() < 2 {
        return data.to_vec();
    }
    let mut prefix = Vec::with_capacity(data.len() + 1);
    prefix.push(0.0);
    for &x in data {
        prefix.push(prefix.last().copied().unwrap_or(0.0) + x);
    }
    let before = win / 2;
    let after = (win - 1) / 2;
    (0..data.len())
        .map(|i| {
            let lo = i.saturating_sub(before);
            let hi = (i + after).min(data.len() - 1);
            (prefix[hi + 1] - prefix[lo]) / (hi + 1 - lo) as f64
        })
        .collect()
}
