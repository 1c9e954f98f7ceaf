//! Aggregation of per-recording scores into one summary per detector.

use crate::{
    bench::{RecordingScore, RecordingStatus},
    metrics::matching::{ConfusionTally, DetectionScores},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorSummary {
    pub detector: String,
    pub recordings: usize,
    pub scored: usize,
    pub partial: usize,
    pub excluded: usize,
    /// Mean of per-recording F1 over recordings where it is defined.
    pub mean_f1: Option<f64>,
    pub median_f1: Option<f64>,
    pub mean_precision: Option<f64>,
    pub mean_recall: Option<f64>,
    /// Beats pooled over every recording with a defined F1.
    pub pooled: ConfusionTally,
    pub pooled_f1: Option<f64>,
    pub mean_accuracy: Option<f64>,
    pub median_accuracy: Option<f64>,
    pub detection_coverage: String,
    pub accuracy_coverage: String,
    /// Exclusion code -> number of recordings.
    pub exclusions: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSummary {
    pub detectors: Vec<DetectorSummary>,
}

impl BenchmarkSummary {
    pub fn from_scores(scores: &[RecordingScore]) -> Self {
        let mut groups: BTreeMap<&str, Vec<&RecordingScore>> = BTreeMap::new();
        for score in scores {
            groups.entry(score.detector.as_str()).or_default().push(score);
        }
        Self {
            detectors: groups
                .into_iter()
                .map(|(detector, group)| summarize(detector, &group))
                .collect(),
        }
    }

    pub fn detector(&self, name: &str) -> Option<&DetectorSummary> {
        self.detectors.iter().find(|d| d.detector == name)
    }
}

fn summarize(detector: &str, group: &[&RecordingScore]) -> DetectorSummary {
    let count_status = |status| group.iter().filter(|s| s.status == status).count();

    // recordings whose detection score was excluded contribute nothing below
    let detection: Vec<DetectionScores> = group
        .iter()
        .filter_map(|s| s.detection.filter(|d| d.f1.is_some()))
        .collect();
    let f1: Vec<f64> = detection.iter().filter_map(|d| d.f1).collect();
    let precision: Vec<f64> = detection.iter().filter_map(|d| d.precision).collect();
    let recall: Vec<f64> = detection.iter().filter_map(|d| d.recall).collect();
    let accuracy: Vec<f64> = group.iter().filter_map(|s| s.accuracy_percentage()).collect();

    let pooled: ConfusionTally = detection
        .iter()
        .map(|d| ConfusionTally {
            true_positives: d.true_positives,
            false_negatives: d.false_negatives,
            false_positives: d.false_positives,
        })
        .sum();

    let mut exclusions = BTreeMap::new();
    for exclusion in group.iter().flat_map(|s| &s.exclusions) {
        *exclusions.entry(exclusion.code.clone()).or_insert(0) += 1;
    }

    DetectorSummary {
        detector: detector.to_string(),
        recordings: group.len(),
        scored: count_status(RecordingStatus::Scored),
        partial: count_status(RecordingStatus::Partial),
        excluded: count_status(RecordingStatus::Excluded),
        mean_f1: mean(&f1),
        median_f1: median(&f1),
        mean_precision: mean(&precision),
        mean_recall: mean(&recall),
        pooled_f1: pooled.f1(),
        pooled,
        mean_accuracy: mean(&accuracy),
        median_accuracy: median(&accuracy),
        detection_coverage: coverage(f1.len(), group.len()),
        accuracy_coverage: coverage(accuracy.len(), group.len()),
        exclusions,
    }
}

fn coverage(scored: usize, total: usize) -> String {
    format!("scored on {} of {} recordings", scored, total)
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        0.5 * (sorted[mid - 1] + sorted[mid])
    } else {
        sorted[mid]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bench::{score_recording, BenchConfig},
        signal::BeatSequence,
    };

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    fn regular(n: usize) -> BeatSequence {
        BeatSequence::new((0..n).map(|k| k as f64).collect()).unwrap()
    }

    fn scores() -> Vec<RecordingScore> {
        let cfg = BenchConfig::default();
        let reference = regular(20);
        let half = BeatSequence::new((0..20).step_by(2).map(|k| k as f64).collect()).unwrap();
        vec![
            score_recording("r1", "good", &reference, &reference, &cfg),
            score_recording("r2", "good", &reference, &half, &cfg),
            score_recording("r3", "good", &reference, &BeatSequence::empty(), &cfg),
            score_recording("r1", "bad", &reference, &BeatSequence::empty(), &cfg),
        ]
    }

    #[test]
    fn groups_by_detector_in_name_order() {
        let summary = BenchmarkSummary::from_scores(&scores());
        let names: Vec<&str> = summary.detectors.iter().map(|d| d.detector.as_str()).collect();
        assert_eq!(names, vec!["bad", "good"]);
    }

    #[test]
    fn undefined_scores_are_left_out_of_means() {
        let summary = BenchmarkSummary::from_scores(&scores());
        let good = summary.detector("good").unwrap();
        assert_eq!(good.recordings, 3);
        assert_eq!(good.scored, 2);
        assert_eq!(good.excluded, 1);
        // r1: F1 = 1, r2: precision 1, recall 0.5, F1 = 2/3
        assert_close(good.mean_f1.unwrap(), (1.0 + 2.0 / 3.0) / 2.0);
        assert_close(good.median_f1.unwrap(), (1.0 + 2.0 / 3.0) / 2.0);
        assert_close(good.mean_recall.unwrap(), (1.0 + 0.5) / 2.0);
        assert_close(good.mean_precision.unwrap(), 1.0);
        assert_eq!(good.detection_coverage, "scored on 2 of 3 recordings");
        assert_eq!(good.accuracy_coverage, "scored on 2 of 3 recordings");
        assert_eq!(good.exclusions.get("empty_candidate"), Some(&1));
        assert_eq!(good.exclusions.get("insufficient_beats"), Some(&1));
    }

    #[test]
    fn pooled_tally_counts_scored_recordings_only() {
        let summary = BenchmarkSummary::from_scores(&scores());
        let good = summary.detector("good").unwrap();
        // r3 has no candidate beats and stays out of the pool
        assert_eq!(good.pooled.true_positives, 30);
        assert_eq!(good.pooled.false_negatives, 10);
        assert_eq!(good.pooled.false_positives, 0);
        assert_close(good.pooled_f1.unwrap(), 60.0 / 70.0);
    }

    #[test]
    fn excluded_recording_does_not_dilute_detection_means() {
        let cfg = BenchConfig::default();
        let reference = regular(20);
        let scores = vec![
            score_recording("r1", "det", &reference, &reference, &cfg),
            score_recording("r2", "det", &reference, &BeatSequence::empty(), &cfg),
        ];
        let summary = BenchmarkSummary::from_scores(&scores);
        let det = summary.detector("det").unwrap();
        assert_eq!(det.excluded, 1);
        assert_eq!(det.mean_recall, Some(1.0));
        assert_eq!(det.mean_precision, Some(1.0));
        assert_eq!(det.pooled.false_negatives, 0);
        assert_eq!(det.pooled_f1, Some(1.0));
    }

    #[test]
    fn detector_without_defined_scores_reports_none() {
        let summary = BenchmarkSummary::from_scores(&scores());
        let bad = summary.detector("bad").unwrap();
        assert_eq!(bad.mean_f1, None);
        assert_eq!(bad.mean_accuracy, None);
        assert_eq!(bad.detection_coverage, "scored on 0 of 1 recordings");
    }

    #[test]
    fn median_of_even_count_averages_middle_pair() {
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }
}
