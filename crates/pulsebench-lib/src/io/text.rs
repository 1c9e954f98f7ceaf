use crate::signal::BeatSequence;
use anyhow::{Context, Result};
use std::path::Path;

fn data_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

/// Parse newline-delimited floating point values, ignoring blank/comment lines.
/// An input without any values yields an empty vector.
pub fn parse_f64_series(text: &str) -> Result<Vec<f64>> {
    data_lines(text)
        .map(|(line_no, line)| {
            line.parse::<f64>()
                .with_context(|| format!("line {} is not f64: {}", line_no, line))
        })
        .collect()
}

/// Parse newline-delimited sample indices.
pub fn parse_sample_indices(text: &str) -> Result<Vec<usize>> {
    data_lines(text)
        .map(|(line_no, line)| {
            line.parse::<usize>()
                .with_context(|| format!("line {} is not an integer index: {}", line_no, line))
        })
        .collect()
}

/// Beat times in seconds, one per line.
pub fn parse_beat_seconds(text: &str) -> Result<BeatSequence> {
    let times = parse_f64_series(text)?;
    Ok(BeatSequence::new(times)?)
}

/// Beat sample indices, one per line, converted to seconds at `fs`.
pub fn parse_beat_indices(text: &str, fs: f64) -> Result<BeatSequence> {
    let indices = parse_sample_indices(text)?;
    Ok(BeatSequence::from_sample_indices(&indices, fs)?)
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

pub fn read_beat_seconds(path: &Path) -> Result<BeatSequence> {
    parse_beat_seconds(&read_text(path)?).with_context(|| format!("parsing {}", path.display()))
}

pub fn read_beat_indices(path: &Path, fs: f64) -> Result<BeatSequence> {
    parse_beat_indices(&read_text(path)?, fs)
        .with_context(|| format!("parsing {}", path.display()))
}

/// Write beat times one per line, the format `read_beat_seconds` accepts.
pub fn write_beat_seconds(path: &Path, beats: &BeatSequence) -> Result<()> {
    let mut out = String::with_capacity(beats.len() * 10);
    for t in beats.times() {
        out.push_str(&format!("{:.4}\n", t));
    }
    std::fs::write(path, out).with_context(|| format!("failed to write {}", path.display()))
}
