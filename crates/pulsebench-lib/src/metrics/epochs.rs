use crate::{
    error::BenchResult,
    metrics::{
        accuracy::{ihr_ipr_accuracy, AccuracyConfig},
        matching::{match_beats, DetectionScores},
    },
    signal::BeatSequence,
    window::{epochs, Epoch},
};
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMatch {
    pub epoch: Epoch,
    pub scores: DetectionScores,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochAccuracy {
    pub epoch: Epoch,
    pub aligned_samples: usize,
    pub within_tolerance: usize,
    /// `None` when no aligned sample falls inside the epoch.
    pub percentage: Option<f64>,
}

/// Epoch grid for a recording: whole windows from the recording origin (or the
/// earliest beat, if that is negative) up to the last beat on either channel.
pub fn recording_epochs(
    reference: &BeatSequence,
    candidate: &BeatSequence,
    window_s: f64,
) -> BenchResult<Vec<Epoch>> {
    let first = [reference.start(), candidate.start()]
        .into_iter()
        .flatten()
        .fold(0.0, f64::min);
    let last = [reference.end(), candidate.end()]
        .into_iter()
        .flatten()
        .reduce(f64::max);
    match last {
        Some(last) => epochs(first, last, window_s),
        None => epochs(0.0, 0.0, window_s),
    }
}

/// Match beats independently inside each epoch.
pub fn windowed_matching(
    reference: &BeatSequence,
    candidate: &BeatSequence,
    tolerance_s: f64,
    window_s: f64,
) -> BenchResult<Vec<EpochMatch>> {
    let windows = recording_epochs(reference, candidate, window_s)?;
    let mut out = Vec::with_capacity(windows.len());
    for epoch in windows {
        let result = match_beats(
            &reference.within(epoch.start, epoch.end),
            &candidate.within(epoch.start, epoch.end),
            tolerance_s,
        )?;
        out.push(EpochMatch {
            epoch,
            scores: result.scores(),
        });
    }
    debug!("matched {} epochs of {:.1} s", out.len(), window_s);
    Ok(out)
}

/// IHR/IPR agreement per epoch. Rate series are built over the whole recording so
/// intervals spanning an epoch boundary keep their context; aligned samples are then
/// bucketed by time.
pub fn windowed_accuracy(
    reference: &BeatSequence,
    candidate: &BeatSequence,
    cfg: &AccuracyConfig,
    window_s: f64,
) -> BenchResult<Vec<EpochAccuracy>> {
    let windows = recording_epochs(reference, candidate, window_s)?;
    let result = ihr_ipr_accuracy(reference, candidate, cfg)?;
    let out: Vec<EpochAccuracy> = windows
        .into_iter()
        .map(|epoch| {
            let (total, hits) = result
                .samples
                .iter()
                .filter(|s| epoch.contains(s.time))
                .fold((0usize, 0usize), |(n, h), s| {
                    (n + 1, h + usize::from(s.within_tolerance))
                });
            EpochAccuracy {
                epoch,
                aligned_samples: total,
                within_tolerance: hits,
                percentage: (total > 0).then(|| hits as f64 * 100.0 / total as f64),
            }
        })
        .collect();
    debug!(
        "scored agreement in {} epochs, {} without aligned samples",
        out.len(),
        out.iter().filter(|e| e.percentage.is_none()).count()
    );
    Ok(out)
}
