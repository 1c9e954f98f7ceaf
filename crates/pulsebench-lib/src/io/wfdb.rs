use crate::signal::BeatSequence;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// One entry of an MIT-format annotation file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WfdbAnnotation {
    pub sample: usize,
    pub code: u8,
}

impl WfdbAnnotation {
    /// QRS-bearing beat labels (N, L, R, a, V, F, J, A, S, E, j, /, Q, B, ?, !, e, n,
    /// f, r). Rhythm, noise, waveform and comment marks are not beats.
    pub fn is_beat(&self) -> bool {
        matches!(self.code, 1..=13 | 25 | 30 | 31 | 34 | 35 | 38 | 41)
    }
}

const SKIP: u8 = 59;
const AUX: u8 = 63;

/// Parse an MIT annotation byte stream into samples and codes.
pub fn parse_wfdb_annotations(buf: &[u8]) -> Vec<WfdbAnnotation> {
    let mut out = Vec::new();
    let mut idx = 0;
    let mut sample: usize = 0;
    while idx + 2 <= buf.len() {
        let word = u16::from_le_bytes([buf[idx], buf[idx + 1]]);
        idx += 2;
        let code = (word >> 10) as u8;
        let diff = (word & 0x03FF) as usize;
        if code == 0 && diff == 0 {
            break;
        }
        match code {
            SKIP => {
                if idx + 4 > buf.len() {
                    break;
                }
                let high = u16::from_le_bytes([buf[idx], buf[idx + 1]]) as u32;
                let low = u16::from_le_bytes([buf[idx + 2], buf[idx + 3]]) as u32;
                idx += 4;
                sample = sample.wrapping_add(((high << 16) | low) as usize);
            }
            // NUM/SUB/CHN carry no time of their own
            60..=62 => {}
            AUX => {
                idx += diff + diff % 2;
            }
            _ => {
                sample = sample.wrapping_add(diff);
                out.push(WfdbAnnotation { sample, code });
            }
        }
    }
    out
}

/// Beat annotations of an `.atr` file as a beat sequence at `fs` Hz.
pub fn load_wfdb_beats(path: &Path, fs: f64) -> Result<BeatSequence> {
    let buf = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let samples: Vec<usize> = parse_wfdb_annotations(&buf)
        .into_iter()
        .filter(WfdbAnnotation::is_beat)
        .map(|ann| ann.sample)
        .collect();
    BeatSequence::from_sample_indices(&samples, fs)
        .with_context(|| format!("converting annotations in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(code: u16, diff: u16) -> [u8; 2] {
        ((code << 10) | diff).to_le_bytes()
    }

    fn sample_stream() -> Vec<u8> {
        let mut bytes = vec![];
        // normal beat at sample 5, then another 10 samples later
        bytes.extend(word(1, 5));
        bytes.extend(word(1, 10));
        // rhythm change (non-beat) 5 samples later
        bytes.extend(word(28, 5));
        // aux string of 3 bytes, padded to 4
        bytes.extend(word(63, 3));
        bytes.extend(b"(N\0\0");
        // skip 5000 samples, then a ventricular beat
        bytes.extend(word(59, 0));
        bytes.extend(0x0000u16.to_le_bytes());
        bytes.extend(0x1388u16.to_le_bytes());
        bytes.extend(word(5, 0));
        bytes.extend(0u16.to_le_bytes());
        bytes
    }

    #[test]
    fn parses_annotation_stream() {
        let annotations = parse_wfdb_annotations(&sample_stream());
        let samples: Vec<usize> = annotations.iter().map(|a| a.sample).collect();
        assert_eq!(samples, vec![5, 15, 20, 5020]);
        assert!(!annotations[2].is_beat());
        assert_eq!(annotations[3].code, 5);
    }

    #[test]
    fn loads_beats_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("100.atr");
        fs::write(&path, sample_stream()).unwrap();
        let beats = load_wfdb_beats(&path, 250.0).unwrap();
        assert_eq!(beats.times(), &[0.02, 0.06, 20.08]);
    }

    #[test]
    fn non_beat_marks_are_not_beats() {
        // NOISE, ARFCT, NOTE, RHYTHM, VFON, VFOFF, blocked APC
        for code in [14, 16, 22, 28, 32, 33, 37] {
            assert!(!WfdbAnnotation { sample: 0, code }.is_beat(), "code {code}");
        }
        for code in [1, 5, 12, 13, 25, 30, 34, 35, 38, 41] {
            assert!(WfdbAnnotation { sample: 0, code }.is_beat(), "code {code}");
        }
    }

    #[test]
    fn truncated_stream_stops_cleanly() {
        let mut bytes = word(1, 5).to_vec();
        bytes.extend(word(59, 0));
        bytes.push(0);
        assert_eq!(parse_wfdb_annotations(&bytes).len(), 1);
    }
}
