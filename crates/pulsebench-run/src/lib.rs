pub mod simulate;

use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use log::info;
use pulsebench_lib::{
    bench::{score_recording, BenchConfig, RecordingScore},
    io::{load_beats, BeatFormat},
    report::BenchmarkSummary,
    signal::BeatSequence,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// One manifest row: a recording scored for one detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub recording: String,
    pub detector: String,
    pub reference: PathBuf,
    pub candidate: PathBuf,
    /// Applies to both files; guessed per file from its extension when empty.
    #[serde(default)]
    pub format: Option<BeatFormat>,
    #[serde(default)]
    pub fs: Option<f64>,
}

impl ManifestEntry {
    fn resolve(mut self, base: &Path) -> Self {
        if self.reference.is_relative() {
            self.reference = base.join(&self.reference);
        }
        if self.candidate.is_relative() {
            self.candidate = base.join(&self.candidate);
        }
        self
    }

    fn load(&self, path: &Path) -> Result<BeatSequence> {
        let format = self.format.unwrap_or_else(|| BeatFormat::from_path(path));
        load_beats(path, format, self.fs)
    }

    pub fn load_pair(&self) -> Result<(BeatSequence, BeatSequence)> {
        Ok((self.load(&self.reference)?, self.load(&self.candidate)?))
    }
}

/// Read a TOML benchmark configuration. Missing sections take their defaults.
pub fn read_config(path: &Path) -> Result<BenchConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: BenchConfig =
        toml::from_str(&contents).with_context(|| format!("parsing config {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

/// Read a manifest CSV; relative beat paths resolve against the manifest's directory.
pub fn read_manifest(path: &Path) -> Result<Vec<ManifestEntry>> {
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .from_path(path)
        .with_context(|| format!("opening manifest {}", path.display()))?;
    let mut entries = Vec::new();
    for (idx, row) in reader.deserialize::<ManifestEntry>().enumerate() {
        let row = row.with_context(|| format!("parsing manifest row {}", idx + 1))?;
        entries.push(row.resolve(base));
    }
    Ok(entries)
}

pub fn write_manifest(path: &Path, entries: &[ManifestEntry]) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("creating manifest {}", path.display()))?;
    for entry in entries {
        writer.serialize(entry)?;
    }
    writer.flush()?;
    Ok(())
}

fn score_entry(entry: &ManifestEntry, config: &BenchConfig) -> RecordingScore {
    match entry.load_pair() {
        Ok((reference, candidate)) => score_recording(
            &entry.recording,
            &entry.detector,
            &reference,
            &candidate,
            config,
        ),
        Err(err) => {
            RecordingScore::unreadable(&entry.recording, &entry.detector, format!("{:#}", err))
        }
    }
}

/// Score every manifest entry in parallel. Output order follows the manifest; a
/// recording that fails to load or score is reported, never dropped.
pub fn score_dataset(
    entries: &[ManifestEntry],
    config: &BenchConfig,
    jobs: Option<usize>,
) -> Result<Vec<RecordingScore>> {
    config.validate()?;
    let run = || {
        entries
            .par_iter()
            .map(|entry| score_entry(entry, config))
            .collect::<Vec<_>>()
    };
    let scores = match jobs {
        Some(jobs) => rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()
            .context("building thread pool")?
            .install(run),
        None => run(),
    };
    let excluded = scores.iter().filter(|s| !s.exclusions.is_empty()).count();
    info!(
        "scored {} recordings ({} with exclusions)",
        scores.len(),
        excluded
    );
    Ok(scores)
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| format!("{:.6}", v)).unwrap_or_default()
}

const SCORE_COLUMNS: [&str; 16] = [
    "recording",
    "detector",
    "status",
    "reference_beats",
    "candidate_beats",
    "tp",
    "fn",
    "fp",
    "precision",
    "recall",
    "f1",
    "mean_abs_offset_s",
    "aligned_samples",
    "accuracy_pct",
    "mean_abs_error_bpm",
    "exclusions",
];

/// One row per recording; undefined metrics are left as empty cells.
pub fn write_scores_tsv(path: &Path, scores: &[RecordingScore]) -> Result<()> {
    let file =
        fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = WriterBuilder::new().delimiter(b'\t').from_writer(file);
    writer.write_record(SCORE_COLUMNS)?;
    for score in scores {
        let detection = score.detection.as_ref();
        let accuracy = score.accuracy.as_ref();
        writer.write_record([
            score.recording.clone(),
            score.detector.clone(),
            score.status.to_string(),
            score.reference_beats.to_string(),
            score.candidate_beats.to_string(),
            detection
                .map(|d| d.true_positives.to_string())
                .unwrap_or_default(),
            detection
                .map(|d| d.false_negatives.to_string())
                .unwrap_or_default(),
            detection
                .map(|d| d.false_positives.to_string())
                .unwrap_or_default(),
            cell(detection.and_then(|d| d.precision)),
            cell(detection.and_then(|d| d.recall)),
            cell(detection.and_then(|d| d.f1)),
            cell(detection.and_then(|d| d.mean_abs_offset_s)),
            accuracy
                .map(|a| a.aligned_samples.to_string())
                .unwrap_or_default(),
            cell(accuracy.map(|a| a.percentage)),
            cell(accuracy.map(|a| a.mean_abs_error_bpm)),
            score.exclusion_codes().join(";"),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file =
        fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(file, value)?;
    Ok(())
}

/// Paths of the artefacts written by [`write_outputs`].
#[derive(Debug, Clone)]
pub struct OutputBundle {
    pub scores_tsv: PathBuf,
    pub scores_json: PathBuf,
    pub summary_json: PathBuf,
}

/// Write `scores.tsv`, `scores.json` and `summary.json` into `dir`.
pub fn write_outputs(
    dir: &Path,
    scores: &[RecordingScore],
    summary: &BenchmarkSummary,
) -> Result<OutputBundle> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let bundle = OutputBundle {
        scores_tsv: dir.join("scores.tsv"),
        scores_json: dir.join("scores.json"),
        summary_json: dir.join("summary.json"),
    };
    write_scores_tsv(&bundle.scores_tsv, scores)?;
    write_json(&bundle.scores_json, &scores)?;
    write_json(&bundle.summary_json, summary)?;
    info!("wrote results to {}", dir.display());
    Ok(bundle)
}

/// Manifest in, result files out.
pub fn run_benchmark(
    manifest: &Path,
    config: &BenchConfig,
    out_dir: &Path,
    jobs: Option<usize>,
) -> Result<BenchmarkSummary> {
    let entries = read_manifest(manifest)?;
    info!(
        "loaded {} manifest entries from {}",
        entries.len(),
        manifest.display()
    );
    let scores = score_dataset(&entries, config, jobs)?;
    let summary = BenchmarkSummary::from_scores(&scores);
    write_outputs(out_dir, &scores, &summary)?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulate::{write_simulated_dataset, SimulationSpec};
    use pulsebench_lib::bench::RecordingStatus;
    use tempfile::tempdir;

    #[test]
    fn reads_partial_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bench.toml");
        fs::write(
            &path,
            "epoch_s = 30.0\n\n[matching]\ntolerance_s = 0.1\n\n[rate.filter]\nwindow_beats = 8\npercent = 40.0\n",
        )
        .unwrap();
        let config = read_config(&path).unwrap();
        assert_eq!(config.epoch_s, Some(30.0));
        assert_eq!(config.matching.tolerance_s, 0.1);
        assert_eq!(config.accuracy.tolerance_bpm, 5.0);
        assert_eq!(config.rate.filter.unwrap().window_beats, 8);
    }

    #[test]
    fn rejects_invalid_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bench.toml");
        fs::write(&path, "[matching]\ntolerance_s = -1.0\n").unwrap();
        let err = read_config(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("tolerance_s"), "{err:#}");
    }

    #[test]
    fn manifest_paths_resolve_against_manifest_dir() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.csv");
        fs::write(
            &path,
            "recording,detector,reference,candidate,format,fs\n\
             r1, det , ecg/r1.txt, /abs/r1.txt,,\n\
             r2,det,r2.atr,r2_ppg.txt,indices,125\n",
        )
        .unwrap();
        let entries = read_manifest(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].detector, "det");
        assert_eq!(entries[0].reference, dir.path().join("ecg/r1.txt"));
        assert_eq!(entries[0].candidate, PathBuf::from("/abs/r1.txt"));
        assert_eq!(entries[0].format, None);
        assert_eq!(entries[1].format, Some(BeatFormat::Indices));
        assert_eq!(entries[1].fs, Some(125.0));
    }

    #[test]
    fn manifest_without_optional_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.csv");
        fs::write(&path, "recording,detector,reference,candidate\nr1,d,a.txt,b.txt\n").unwrap();
        let entries = read_manifest(&path).unwrap();
        assert_eq!(entries[0].format, None);
        assert_eq!(entries[0].fs, None);
    }

    #[test]
    fn scores_simulated_dataset_in_manifest_order() {
        let dir = tempdir().unwrap();
        let spec = SimulationSpec {
            duration_s: 120.0,
            ..SimulationSpec::default()
        };
        let manifest = write_simulated_dataset(dir.path(), &spec, 6, "sim").unwrap();
        let entries = read_manifest(&manifest).unwrap();
        let config = BenchConfig {
            matching: pulsebench_lib::bench::MatchingConfig {
                delay_reference: true,
                ..Default::default()
            },
            ..BenchConfig::default()
        };
        let scores = score_dataset(&entries, &config, Some(2)).unwrap();
        let order: Vec<&str> = scores.iter().map(|s| s.recording.as_str()).collect();
        let expected: Vec<&str> = entries.iter().map(|e| e.recording.as_str()).collect();
        assert_eq!(order, expected);
        assert!(scores.iter().all(|s| s.status == RecordingStatus::Scored));
        assert!(scores.iter().all(|s| s.f1().unwrap() > 0.9));
    }

    #[test]
    fn unreadable_recording_does_not_abort_run() {
        let dir = tempdir().unwrap();
        let reference = dir.path().join("ref.txt");
        fs::write(&reference, "1.0\n2.0\n3.0\n4.0\n").unwrap();
        let entries = vec![
            ManifestEntry {
                recording: "ok".into(),
                detector: "d".into(),
                reference: reference.clone(),
                candidate: reference.clone(),
                format: None,
                fs: None,
            },
            ManifestEntry {
                recording: "missing".into(),
                detector: "d".into(),
                reference: reference.clone(),
                candidate: dir.path().join("nope.txt"),
                format: None,
                fs: None,
            },
        ];
        let scores = score_dataset(&entries, &BenchConfig::default(), None).unwrap();
        assert_eq!(scores[0].status, RecordingStatus::Scored);
        assert_eq!(scores[1].status, RecordingStatus::Excluded);
        assert!(scores[1].exclusions[0].message.contains("nope.txt"));
        let summary = BenchmarkSummary::from_scores(&scores);
        assert_eq!(
            summary.detectors[0].detection_coverage,
            "scored on 1 of 2 recordings"
        );
    }

    #[test]
    fn writes_all_outputs_with_empty_cells_for_undefined() {
        let dir = tempdir().unwrap();
        let reference = BeatSequence::new(vec![1.0, 2.0, 3.0]).unwrap();
        let scores = vec![score_recording(
            "r1",
            "d",
            &reference,
            &BeatSequence::empty(),
            &BenchConfig::default(),
        )];
        let summary = BenchmarkSummary::from_scores(&scores);
        let bundle = write_outputs(&dir.path().join("out"), &scores, &summary).unwrap();

        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .from_path(&bundle.scores_tsv)
            .unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.len(), SCORE_COLUMNS.len());
        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(&row[2], "excluded");
        assert_eq!(&row[6], "3");
        assert_eq!(&row[8], "");
        assert_eq!(&row[10], "");
        assert_eq!(&row[15], "empty_candidate;insufficient_beats");

        let summary_json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&bundle.summary_json).unwrap()).unwrap();
        assert!(summary_json["detectors"][0]["mean_f1"].is_null());
        assert!(bundle.scores_json.exists());
    }
}
