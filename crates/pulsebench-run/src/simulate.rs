//! Synthetic ECG/PPG beat pairs with a known ground truth, for exercising the
//! benchmark without real recordings.

use crate::{write_manifest, ManifestEntry};
use anyhow::{bail, Result};
use log::info;
use pulsebench_lib::{io::text::write_beat_seconds, signal::BeatSequence};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSpec {
    pub duration_s: f64,
    pub mean_hr_bpm: f64,
    /// Amplitude of the slow sinusoidal heart-rate swing.
    pub hr_swing_bpm: f64,
    pub hr_period_s: f64,
    /// Uniform beat-to-beat interval jitter, +/- seconds.
    pub rr_jitter_s: f64,
    /// Delay from R-peak to pulse peak.
    pub ptt_s: f64,
    /// Uniform pulse-peak timing jitter, +/- seconds.
    pub peak_jitter_s: f64,
    /// Probability that the PPG detector misses a pulse.
    pub miss_rate: f64,
    pub spurious_per_min: f64,
    pub seed: u64,
}

impl Default for SimulationSpec {
    fn default() -> Self {
        Self {
            duration_s: 300.0,
            mean_hr_bpm: 70.0,
            hr_swing_bpm: 6.0,
            hr_period_s: 60.0,
            rr_jitter_s: 0.02,
            ptt_s: 0.3,
            peak_jitter_s: 0.01,
            miss_rate: 0.03,
            spurious_per_min: 1.0,
            seed: 0,
        }
    }
}

impl SimulationSpec {
    fn validate(&self) -> Result<()> {
        if !(self.duration_s > 0.0) {
            bail!("duration_s must be positive, got {}", self.duration_s);
        }
        if !(self.mean_hr_bpm > 0.0) || self.hr_swing_bpm.abs() >= self.mean_hr_bpm {
            bail!(
                "heart rate {} +/- {} bpm must stay positive",
                self.mean_hr_bpm,
                self.hr_swing_bpm
            );
        }
        if !(0.0..=1.0).contains(&self.miss_rate) {
            bail!("miss_rate must lie in [0, 1], got {}", self.miss_rate);
        }
        if self.spurious_per_min < 0.0 {
            bail!("spurious_per_min must be non-negative");
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedRecording {
    pub reference: BeatSequence,
    pub candidate: BeatSequence,
}

fn jitter(rng: &mut StdRng, width: f64) -> f64 {
    if width > 0.0 {
        rng.gen_range(-width..=width)
    } else {
        0.0
    }
}

/// Generate one reference/candidate pair. Identical parameters always yield the same beats.
pub fn simulate_recording(spec: &SimulationSpec) -> Result<SimulatedRecording> {
    spec.validate()?;
    let mut rng = StdRng::seed_from_u64(spec.seed);

    let mut reference = Vec::new();
    let mut t = rng.gen_range(0.0..60.0 / spec.mean_hr_bpm);
    while t < spec.duration_s {
        reference.push(t);
        let hr = spec.mean_hr_bpm + spec.hr_swing_bpm * (TAU * t / spec.hr_period_s).sin();
        let rr = 60.0 / hr + jitter(&mut rng, spec.rr_jitter_s);
        t += rr.max(0.25);
    }

    let mut candidate = Vec::with_capacity(reference.len());
    for &r in &reference {
        if rng.gen::<f64>() < spec.miss_rate {
            continue;
        }
        candidate.push(r + spec.ptt_s + jitter(&mut rng, spec.peak_jitter_s));
    }
    let spurious = (spec.spurious_per_min * spec.duration_s / 60.0).round() as usize;
    for _ in 0..spurious {
        candidate.push(rng.gen_range(0.0..spec.duration_s));
    }

    Ok(SimulatedRecording {
        reference: BeatSequence::new(reference)?,
        candidate: BeatSequence::from_unsorted(candidate)?,
    })
}

/// Write `count` simulated recordings plus a `manifest.csv` into `dir`. Recording
/// `i` is generated with seed `spec.seed + i`. Returns the manifest path.
pub fn write_simulated_dataset(
    dir: &Path,
    spec: &SimulationSpec,
    count: usize,
    detector: &str,
) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let recording = format!("sim-{:03}", i + 1);
        let sim = simulate_recording(&SimulationSpec {
            seed: spec.seed.wrapping_add(i as u64),
            ..spec.clone()
        })?;
        let reference = PathBuf::from(format!("{}_ecg.txt", recording));
        let candidate = PathBuf::from(format!("{}_ppg.txt", recording));
        write_beat_seconds(&dir.join(&reference), &sim.reference)?;
        write_beat_seconds(&dir.join(&candidate), &sim.candidate)?;
        entries.push(ManifestEntry {
            recording,
            detector: detector.to_string(),
            reference,
            candidate,
            format: None,
            fs: None,
        });
    }
    let manifest = dir.join("manifest.csv");
    write_manifest(&manifest, &entries)?;
    info!("simulated {} recordings into {}", count, dir.display());
    Ok(manifest)
}
