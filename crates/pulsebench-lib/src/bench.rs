use crate::{
    error::{BenchError, BenchResult},
    metrics::{
        accuracy::{ihr_ipr_accuracy, AccuracyConfig, AccuracyScores},
        epochs::{windowed_accuracy, windowed_matching, EpochAccuracy, EpochMatch},
        matching::{match_beats, DetectionScores},
        ptt::{delay_reference, PttConfig},
        rate::RateSeriesConfig,
    },
    signal::BeatSequence,
    window::require_positive,
};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Half-width of the matching window (seconds).
    pub tolerance_s: f64,
    /// Delay the reference by its estimated pulse transit time before matching.
    pub delay_reference: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            tolerance_s: 0.15,
            delay_reference: false,
        }
    }
}

/// Everything needed to score one recording.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Optional epoch length (seconds) for windowed scores.
    pub epoch_s: Option<f64>,
    pub matching: MatchingConfig,
    pub accuracy: AccuracyConfig,
    pub rate: RateSeriesConfig,
    pub ptt: PttConfig,
}

impl BenchConfig {
    /// Accuracy parameters with the shared rate-series settings folded in.
    pub fn accuracy_config(&self) -> AccuracyConfig {
        AccuracyConfig {
            rate: self.rate,
            ..self.accuracy.clone()
        }
    }

    /// Reject parameter sets that would fail every recording.
    pub fn validate(&self) -> BenchResult<()> {
        require_positive("tolerance_s", self.matching.tolerance_s)?;
        require_positive("tolerance_bpm", self.accuracy.tolerance_bpm)?;
        require_positive("resample_interval_s", self.accuracy.resample_interval_s)?;
        if let Some(epoch_s) = self.epoch_s {
            require_positive("epoch_s", epoch_s)?;
        }
        self.rate.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    /// The beat files themselves could not be read.
    Input,
    Detection,
    Accuracy,
    /// Per-epoch scores only; the whole-recording scores still stand.
    Epochs,
}

/// Why one engine produced no usable score for a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclusion {
    pub engine: Engine,
    pub code: String,
    pub message: String,
}

impl Exclusion {
    fn from_error(engine: Engine, err: &BenchError) -> Self {
        Self {
            engine,
            code: err.code().into(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingStatus {
    /// Both engines produced defined scores.
    Scored,
    /// One engine was excluded, or only the epoch scores were.
    Partial,
    Excluded,
}

impl fmt::Display for RecordingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordingStatus::Scored => "scored",
            RecordingStatus::Partial => "partial",
            RecordingStatus::Excluded => "excluded",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingScore {
    pub recording: String,
    pub detector: String,
    pub reference_beats: usize,
    pub candidate_beats: usize,
    pub status: RecordingStatus,
    pub detection: Option<DetectionScores>,
    pub accuracy: Option<AccuracyScores>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclusions: Vec<Exclusion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detection_epochs: Vec<EpochMatch>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accuracy_epochs: Vec<EpochAccuracy>,
}

impl RecordingScore {
    /// F1 if the detection score is defined.
    pub fn f1(&self) -> Option<f64> {
        self.detection.and_then(|d| d.f1)
    }

    pub fn accuracy_percentage(&self) -> Option<f64> {
        self.accuracy.as_ref().map(|a| a.percentage)
    }

    /// Row for a recording whose beat files could not be loaded.
    pub fn unreadable(recording: &str, detector: &str, message: impl Into<String>) -> Self {
        let exclusion = Exclusion {
            engine: Engine::Input,
            code: "unreadable_input".into(),
            message: message.into(),
        };
        warn!("{}/{}: {}", recording, detector, exclusion.message);
        Self {
            recording: recording.to_string(),
            detector: detector.to_string(),
            reference_beats: 0,
            candidate_beats: 0,
            status: RecordingStatus::Excluded,
            detection: None,
            accuracy: None,
            exclusions: vec![exclusion],
            detection_epochs: Vec::new(),
            accuracy_epochs: Vec::new(),
        }
    }

    pub fn exclusion_codes(&self) -> Vec<&str> {
        self.exclusions.iter().map(|e| e.code.as_str()).collect()
    }
}

/// Score one recording with both engines. Failures are recorded as exclusions rather
/// than returned, so a dataset run can always account for every recording.
pub fn score_recording(
    recording: &str,
    detector: &str,
    reference: &BeatSequence,
    candidate: &BeatSequence,
    cfg: &BenchConfig,
) -> RecordingScore {
    let mut exclusions = Vec::new();

    let epoch_s = match cfg.epoch_s.map(|w| require_positive("epoch_s", w)).transpose() {
        Ok(epoch_s) => epoch_s,
        Err(err) => {
            exclusions.push(Exclusion::from_error(Engine::Epochs, &err));
            None
        }
    };

    let tolerance_s = cfg.matching.tolerance_s;
    let mut detection = None;
    let mut detection_epochs = Vec::new();
    let matched = matching_reference(reference, candidate, cfg).and_then(|matched_reference| {
        let scores = match_beats(&matched_reference, candidate, tolerance_s)?.scores();
        Ok((matched_reference, scores))
    });
    match matched {
        Ok((matched_reference, scores)) => {
            if scores.f1.is_none() {
                exclusions.push(undefined_detection(reference, candidate));
            }
            if let Some(window_s) = epoch_s {
                detection_epochs = epoch_scores(
                    windowed_matching(&matched_reference, candidate, tolerance_s, window_s),
                    &mut exclusions,
                );
            }
            detection = Some(scores);
        }
        Err(err) => exclusions.push(Exclusion::from_error(Engine::Detection, &err)),
    }

    let accuracy_cfg = cfg.accuracy_config();
    let mut accuracy = None;
    let mut accuracy_epochs = Vec::new();
    match ihr_ipr_accuracy(reference, candidate, &accuracy_cfg) {
        Ok(result) => {
            if let Some(window_s) = epoch_s {
                accuracy_epochs = epoch_scores(
                    windowed_accuracy(reference, candidate, &accuracy_cfg, window_s),
                    &mut exclusions,
                );
            }
            accuracy = Some(result.scores(&accuracy_cfg.agreement_bands));
        }
        Err(err) => exclusions.push(Exclusion::from_error(Engine::Accuracy, &err)),
    }

    for exclusion in &exclusions {
        warn!(
            "{}/{}: {:?} excluded: {}",
            recording, detector, exclusion.engine, exclusion.message
        );
    }

    let failed_engines = exclusions
        .iter()
        .filter(|e| e.engine != Engine::Epochs)
        .count();
    let status = match (failed_engines, exclusions.len()) {
        (_, 0) => RecordingStatus::Scored,
        (0 | 1, _) => RecordingStatus::Partial,
        _ => RecordingStatus::Excluded,
    };

    RecordingScore {
        recording: recording.to_string(),
        detector: detector.to_string(),
        reference_beats: reference.len(),
        candidate_beats: candidate.len(),
        status,
        detection,
        accuracy,
        exclusions,
        detection_epochs,
        accuracy_epochs,
    }
}

/// Reference beats as seen by the matcher, delayed by the estimated transit time
/// when configured.
fn matching_reference<'a>(
    reference: &'a BeatSequence,
    candidate: &BeatSequence,
    cfg: &BenchConfig,
) -> BenchResult<Cow<'a, BeatSequence>> {
    if cfg.matching.delay_reference && !reference.is_empty() {
        Ok(Cow::Owned(delay_reference(reference, candidate, &cfg.ptt)?))
    } else {
        Ok(Cow::Borrowed(reference))
    }
}

fn epoch_scores<T>(result: BenchResult<Vec<T>>, exclusions: &mut Vec<Exclusion>) -> Vec<T> {
    match result {
        Ok(epochs) => epochs,
        Err(err) => {
            let exclusion = Exclusion::from_error(Engine::Epochs, &err);
            if !exclusions.contains(&exclusion) {
                exclusions.push(exclusion);
            }
            Vec::new()
        }
    }
}

fn undefined_detection(reference: &BeatSequence, candidate: &BeatSequence) -> Exclusion {
    let (code, message) = match (reference.is_empty(), candidate.is_empty()) {
        (true, true) => ("empty_recording", "neither channel has beats"),
        (true, false) => ("empty_reference", "reference has no beats"),
        _ => ("empty_candidate", "candidate has no beats"),
    };
    Exclusion {
        engine: Engine::Detection,
        code: code.into(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regular(start: f64, interval: f64, n: usize) -> BeatSequence {
        BeatSequence::new((0..n).map(|k| start + k as f64 * interval).collect()).unwrap()
    }

    #[test]
    fn clean_recording_is_fully_scored() {
        let reference = regular(0.0, 0.8, 100);
        let candidate = reference.shifted(0.05).unwrap();
        let score = score_recording("rec-1", "det", &reference, &candidate, &BenchConfig::default());
        assert_eq!(score.status, RecordingStatus::Scored);
        assert_eq!(score.f1(), Some(1.0));
        assert_eq!(score.accuracy_percentage(), Some(100.0));
        assert!(score.exclusions.is_empty());
        assert!(score.detection_epochs.is_empty());
        assert_eq!(score.accuracy.as_ref().unwrap().agreement.len(), 5);
    }

    #[test]
    fn single_candidate_beat_excludes_accuracy_only() {
        let reference = regular(0.0, 1.0, 10);
        let candidate = BeatSequence::new(vec![3.02]).unwrap();
        let score = score_recording("rec-2", "det", &reference, &candidate, &BenchConfig::default());
        assert_eq!(score.status, RecordingStatus::Partial);
        assert_eq!(score.detection.unwrap().true_positives, 1);
        assert!(score.accuracy.is_none());
        assert_eq!(score.exclusions[0].engine, Engine::Accuracy);
        assert_eq!(score.exclusions[0].code, "insufficient_beats");
    }

    #[test]
    fn empty_candidate_is_excluded_not_zero() {
        let reference = regular(0.0, 1.0, 10);
        let score = score_recording(
            "rec-3",
            "det",
            &reference,
            &BeatSequence::empty(),
            &BenchConfig::default(),
        );
        assert_eq!(score.status, RecordingStatus::Excluded);
        assert_eq!(score.f1(), None);
        assert_eq!(score.detection.unwrap().false_negatives, 10);
        assert_eq!(score.exclusions[0].code, "empty_candidate");
    }

    #[test]
    fn invalid_tolerance_is_reported_per_recording() {
        let reference = regular(0.0, 1.0, 10);
        let mut cfg = BenchConfig::default();
        cfg.matching.tolerance_s = 0.0;
        assert!(cfg.validate().is_err());
        let score = score_recording("rec-4", "det", &reference, &reference, &cfg);
        assert_eq!(score.status, RecordingStatus::Partial);
        assert!(score.detection.is_none());
        assert_eq!(score.exclusions[0].code, "invalid_tolerance");
    }

    #[test]
    fn epochs_are_emitted_when_configured() {
        let reference = regular(0.0, 1.0, 91);
        let cfg = BenchConfig {
            epoch_s: Some(30.0),
            ..BenchConfig::default()
        };
        let score = score_recording("rec-5", "det", &reference, &reference, &cfg);
        assert_eq!(score.detection_epochs.len(), 3);
        assert_eq!(score.accuracy_epochs.len(), 3);
    }

    #[test]
    fn invalid_epoch_length_keeps_whole_recording_scores() {
        let reference = regular(0.0, 1.0, 91);
        let cfg = BenchConfig {
            epoch_s: Some(0.0),
            ..BenchConfig::default()
        };
        assert!(cfg.validate().is_err());
        let score = score_recording("rec-8", "det", &reference, &reference, &cfg);
        assert_eq!(score.f1(), Some(1.0));
        assert_eq!(score.accuracy_percentage(), Some(100.0));
        assert!(score.detection_epochs.is_empty());
        assert!(score.accuracy_epochs.is_empty());
        assert_eq!(score.exclusions.len(), 1);
        assert_eq!(score.exclusions[0].engine, Engine::Epochs);
        assert_eq!(score.exclusions[0].code, "invalid_tolerance");
        assert_eq!(score.status, RecordingStatus::Partial);
    }

    #[test]
    fn zero_bpm_tolerance_is_invalid() {
        let reference = regular(0.0, 1.0, 10);
        let mut cfg = BenchConfig::default();
        cfg.accuracy.tolerance_bpm = 0.0;
        assert!(cfg.validate().is_err());
        let score = score_recording("rec-9", "det", &reference, &reference, &cfg);
        assert!(score.accuracy.is_none());
        assert_eq!(score.exclusions[0].engine, Engine::Accuracy);
        assert_eq!(score.exclusions[0].code, "invalid_tolerance");
    }

    #[test]
    fn ptt_delay_recovers_late_detector() {
        let reference = regular(0.0, 0.9, 60);
        let candidate = reference.shifted(0.3).unwrap();
        let mut cfg = BenchConfig::default();
        cfg.matching.tolerance_s = 0.05;
        let undelayed = score_recording("rec-6", "det", &reference, &candidate, &cfg);
        assert_eq!(undelayed.f1(), Some(0.0));
        cfg.matching.delay_reference = true;
        let delayed = score_recording("rec-6", "det", &reference, &candidate, &cfg);
        assert_eq!(delayed.f1(), Some(1.0));
    }

    #[test]
    fn unreadable_recording_is_excluded() {
        let score = RecordingScore::unreadable("rec-7", "det", "failed to read ppg.txt");
        assert_eq!(score.status, RecordingStatus::Excluded);
        assert_eq!(score.exclusion_codes(), vec!["unreadable_input"]);
        assert_eq!(score.exclusions[0].engine, Engine::Input);
    }

    #[test]
    fn parses_config_sections_with_defaults() {
        let cfg: BenchConfig = serde_json::from_value(serde_json::json!({
            "matching": { "tolerance_s": 0.1 },
            "rate": { "anchor": "midpoint", "filter": { "window_beats": 5, "percent": 40.0 } },
            "accuracy": { "interpolation": "step-hold" }
        }))
        .unwrap();
        assert_eq!(cfg.matching.tolerance_s, 0.1);
        assert!(!cfg.matching.delay_reference);
        assert_eq!(cfg.accuracy.tolerance_bpm, 5.0);
        assert_eq!(
            cfg.accuracy_config().rate.anchor,
            crate::metrics::rate::Anchor::Midpoint
        );
        assert_eq!(cfg.rate.filter.unwrap().window_beats, 5);
        assert!(cfg.validate().is_ok());
    }
}
