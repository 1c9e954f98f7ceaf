use crate::{
    error::BenchResult,
    signal::BeatSequence,
    window::{require_positive, within_tolerance, COMPARISON_EPSILON},
};
use serde::{Deserialize, Serialize};
use std::{
    iter::Sum,
    ops::{Add, AddAssign},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceOutcome {
    Matched,
    Missed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateOutcome {
    Matched,
    Spurious,
}

/// One reference beat paired with one candidate beat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub reference_index: usize,
    pub candidate_index: usize,
    /// Candidate time minus reference time (seconds).
    pub offset_s: f64,
}

/// Detection counts for one recording (or one epoch of it).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionTally {
    pub true_positives: usize,
    pub false_negatives: usize,
    pub false_positives: usize,
}

impl ConfusionTally {
    /// TP / (TP + FP); undefined when the candidate produced no beats.
    pub fn precision(&self) -> Option<f64> {
        ratio(
            self.true_positives,
            self.true_positives + self.false_positives,
        )
    }

    /// TP / (TP + FN); undefined when the reference has no beats.
    pub fn recall(&self) -> Option<f64> {
        ratio(
            self.true_positives,
            self.true_positives + self.false_negatives,
        )
    }

    /// Harmonic mean of precision and recall, undefined whenever either is.
    /// Zero (not undefined) when both sides have beats but none match.
    pub fn f1(&self) -> Option<f64> {
        self.precision()?;
        self.recall()?;
        ratio(
            2 * self.true_positives,
            2 * self.true_positives + self.false_positives + self.false_negatives,
        )
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn ratio(num: usize, den: usize) -> Option<f64> {
    (den > 0).then(|| num as f64 / den as f64)
}

impl Add for ConfusionTally {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            true_positives: self.true_positives + rhs.true_positives,
            false_negatives: self.false_negatives + rhs.false_negatives,
            false_positives: self.false_positives + rhs.false_positives,
        }
    }
}

impl AddAssign for ConfusionTally {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for ConfusionTally {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Serializable detection summary; undefined metrics serialize as `null`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionScores {
    pub true_positives: usize,
    pub false_negatives: usize,
    pub false_positives: usize,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub f1: Option<f64>,
    /// Mean |candidate - reference| over matched pairs (seconds).
    pub mean_abs_offset_s: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub tally: ConfusionTally,
    pub pairs: Vec<MatchedPair>,
    pub reference: Vec<ReferenceOutcome>,
    pub candidate: Vec<CandidateOutcome>,
}

impl MatchResult {
    pub fn mean_abs_offset(&self) -> Option<f64> {
        if self.pairs.is_empty() {
            return None;
        }
        let total: f64 = self.pairs.iter().map(|p| p.offset_s.abs()).sum();
        Some(total / self.pairs.len() as f64)
    }

    pub fn max_abs_offset(&self) -> Option<f64> {
        self.pairs
            .iter()
            .map(|p| p.offset_s.abs())
            .reduce(f64::max)
    }

    pub fn scores(&self) -> DetectionScores {
        DetectionScores {
            true_positives: self.tally.true_positives,
            false_negatives: self.tally.false_negatives,
            false_positives: self.tally.false_positives,
            precision: self.tally.precision(),
            recall: self.tally.recall(),
            f1: self.tally.f1(),
            mean_abs_offset_s: self.mean_abs_offset(),
        }
    }
}

/// Pair candidate beats with reference beats lying within `tolerance_s` of them.
///
/// References are visited in time order; each takes the nearest unused candidate in
/// `[t - tolerance_s, t + tolerance_s]`, the earlier candidate winning a tie. A cursor
/// skips candidates that fell behind the window, so the scan is linear in the
/// combined length for locally dense sequences.
pub fn match_beats(
    reference: &BeatSequence,
    candidate: &BeatSequence,
    tolerance_s: f64,
) -> BenchResult<MatchResult> {
    let tol = require_positive("tolerance_s", tolerance_s)?;
    let refs = reference.times();
    let cands = candidate.times();

    let mut used = vec![false; cands.len()];
    let mut ref_outcomes = vec![ReferenceOutcome::Missed; refs.len()];
    let mut pairs = Vec::new();
    let mut cursor = 0usize;

    for (ri, &r) in refs.iter().enumerate() {
        let earliest = r - tol - COMPARISON_EPSILON;
        let latest = r + tol + COMPARISON_EPSILON;
        while cursor < cands.len() && (used[cursor] || cands[cursor] < earliest) {
            cursor += 1;
        }

        let mut best: Option<(usize, f64)> = None;
        for (ci, &c) in cands.iter().enumerate().skip(cursor) {
            if c > latest {
                break;
            }
            if used[ci] || !within_tolerance(c, r, tol) {
                continue;
            }
            let distance = (c - r).abs();
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((ci, distance));
            }
        }

        if let Some((ci, _)) = best {
            used[ci] = true;
            ref_outcomes[ri] = ReferenceOutcome::Matched;
            pairs.push(MatchedPair {
                reference_index: ri,
                candidate_index: ci,
                offset_s: cands[ci] - r,
            });
        }
    }

    let tp = pairs.len();
    let tally = ConfusionTally {
        true_positives: tp,
        false_negatives: refs.len() - tp,
        false_positives: cands.len() - tp,
    };
    let candidate_outcomes = used
        .into_iter()
        .map(|u| {
            if u {
                CandidateOutcome::Matched
            } else {
                CandidateOutcome::Spurious
            }
        })
        .collect();

    Ok(MatchResult {
        tally,
        pairs,
        reference: ref_outcomes,
        candidate: candidate_outcomes,
    })
}
