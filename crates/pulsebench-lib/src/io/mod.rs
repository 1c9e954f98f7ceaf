pub mod text;
pub mod wfdb;

use crate::signal::BeatSequence;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path};

/// On-disk layout of a beat file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BeatFormat {
    /// One timestamp in seconds per line.
    #[default]
    Seconds,
    /// One sample index per line.
    Indices,
    /// MIT annotation file.
    Wfdb,
}

impl BeatFormat {
    pub fn needs_sample_rate(self) -> bool {
        !matches!(self, BeatFormat::Seconds)
    }

    /// Guess from the file extension: `.atr` is WFDB, anything else seconds.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|s| s.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("atr") => BeatFormat::Wfdb,
            _ => BeatFormat::Seconds,
        }
    }
}

impl fmt::Display for BeatFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BeatFormat::Seconds => "seconds",
            BeatFormat::Indices => "indices",
            BeatFormat::Wfdb => "wfdb",
        })
    }
}

/// Load a beat file in the given format. `fs` is required for index-based formats.
pub fn load_beats(path: &Path, format: BeatFormat, fs: Option<f64>) -> Result<BeatSequence> {
    let sample_rate = || match fs {
        Some(fs) => Ok(fs),
        None => bail!(
            "{} is a {} file and needs a sampling frequency",
            path.display(),
            format
        ),
    };
    match format {
        BeatFormat::Seconds => text::read_beat_seconds(path),
        BeatFormat::Indices => text::read_beat_indices(path, sample_rate()?),
        BeatFormat::Wfdb => wfdb::load_wfdb_beats(path, sample_rate()?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn guesses_format_from_extension() {
        assert_eq!(BeatFormat::from_path(&PathBuf::from("100.ATR")), BeatFormat::Wfdb);
        assert_eq!(BeatFormat::from_path(&PathBuf::from("ppg.txt")), BeatFormat::Seconds);
    }

    #[test]
    fn index_files_require_sampling_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peaks.txt");
        std::fs::write(&path, "100\n200\n").unwrap();
        let err = load_beats(&path, BeatFormat::Indices, None).unwrap_err();
        assert!(err.to_string().contains("sampling frequency"), "{err}");
        let beats = load_beats(&path, BeatFormat::Indices, Some(100.0)).unwrap();
        assert_eq!(beats.times(), &[1.0, 2.0]);
    }
}
