use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::info;
use plotters::{prelude::*, series::DashedLineSeries};
use pulsebench_lib::{
    bench::{score_recording, BenchConfig},
    io::{load_beats, text as text_io, BeatFormat},
    metrics::{
        accuracy::{ihr_ipr_accuracy, AccuracyConfig, Interpolation},
        epochs::{windowed_accuracy, windowed_matching},
        matching::match_beats,
        ptt::{delay_reference, estimate_ptt, PttConfig},
        rate::{build_rate_series, Anchor, IntervalFilter, OutlierPolicy, RateSeriesConfig},
    },
    plot::{figure_from_accuracy, figure_from_rates, Figure, PlotBackend, Series},
    signal::BeatSequence,
};
use pulsebench_run::{
    read_config, run_benchmark,
    simulate::{write_simulated_dataset, SimulationSpec},
};
use serde_json::json;
use std::{
    io::{self, Read},
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(
    name = "pulsebench",
    version,
    about = "Benchmark PPG peak detectors against ECG reference beats"
)]
struct Cli {
    /// Log filter (error, warn, info, debug, trace); RUST_LOG takes precedence.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum FormatArg {
    /// One timestamp in seconds per line
    #[value(name = "seconds")]
    Seconds,
    /// One sample index per line
    #[value(name = "indices")]
    Indices,
    /// MIT annotation file
    #[value(name = "wfdb")]
    Wfdb,
}

impl From<FormatArg> for BeatFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Seconds => BeatFormat::Seconds,
            FormatArg::Indices => BeatFormat::Indices,
            FormatArg::Wfdb => BeatFormat::Wfdb,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum AnchorArg {
    #[value(name = "start")]
    Start,
    #[value(name = "end")]
    End,
    #[value(name = "midpoint")]
    Midpoint,
}

impl From<AnchorArg> for Anchor {
    fn from(arg: AnchorArg) -> Self {
        match arg {
            AnchorArg::Start => Anchor::Start,
            AnchorArg::End => Anchor::End,
            AnchorArg::Midpoint => Anchor::Midpoint,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutliersArg {
    #[value(name = "drop")]
    Drop,
    #[value(name = "clip")]
    Clip,
    #[value(name = "keep")]
    Keep,
}

impl From<OutliersArg> for OutlierPolicy {
    fn from(arg: OutliersArg) -> Self {
        match arg {
            OutliersArg::Drop => OutlierPolicy::Drop,
            OutliersArg::Clip => OutlierPolicy::Clip,
            OutliersArg::Keep => OutlierPolicy::Keep,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum InterpolationArg {
    #[value(name = "linear")]
    Linear,
    /// Hold the previous sample
    #[value(name = "step-hold")]
    StepHold,
}

impl From<InterpolationArg> for Interpolation {
    fn from(arg: InterpolationArg) -> Self {
        match arg {
            InterpolationArg::Linear => Interpolation::Linear,
            InterpolationArg::StepHold => Interpolation::StepHold,
        }
    }
}

/// How a beat file is read.
#[derive(Args, Clone, Debug)]
struct BeatInput {
    /// Guessed from the extension when omitted
    #[arg(long, value_enum)]
    format: Option<FormatArg>,
    /// Sampling frequency for index and WFDB files (Hz)
    #[arg(long)]
    fs: Option<f64>,
}

impl BeatInput {
    fn load(&self, path: &Path) -> Result<BeatSequence> {
        let format = self
            .format
            .map(BeatFormat::from)
            .unwrap_or_else(|| BeatFormat::from_path(path));
        load_beats(path, format, self.fs)
    }

    /// Beats from a file, or newline-delimited seconds from stdin.
    fn load_or_stdin(&self, path: Option<&Path>) -> Result<BeatSequence> {
        match path {
            Some(path) => self.load(path),
            None => {
                let mut buf = String::new();
                io::stdin().read_to_string(&mut buf)?;
                match self.format.map(BeatFormat::from).unwrap_or_default() {
                    BeatFormat::Seconds => text_io::parse_beat_seconds(&buf),
                    BeatFormat::Indices => match self.fs {
                        Some(fs) => text_io::parse_beat_indices(&buf, fs),
                        None => bail!("--fs is required for index input"),
                    },
                    BeatFormat::Wfdb => bail!("WFDB annotations must be given as a file"),
                }
            }
        }
    }
}

#[derive(Args, Clone, Debug)]
struct RateArgs {
    /// Where each rate sample sits on its interval
    #[arg(long, value_enum, default_value_t = AnchorArg::End)]
    anchor: AnchorArg,
    /// Treatment of intervals outside the plausible range
    #[arg(long, value_enum, default_value_t = OutliersArg::Drop)]
    outliers: OutliersArg,
    #[arg(long, default_value_t = 0.25)]
    min_interval_s: f64,
    #[arg(long, default_value_t = 2.5)]
    max_interval_s: f64,
    /// Enable the moving-average interval filter with this many neighbours per side
    #[arg(long)]
    filter_window: Option<usize>,
    #[arg(long, default_value_t = 50.0)]
    filter_percent: f64,
}

impl RateArgs {
    fn config(&self) -> RateSeriesConfig {
        RateSeriesConfig {
            anchor: self.anchor.into(),
            outliers: self.outliers.into(),
            min_interval_s: self.min_interval_s,
            max_interval_s: self.max_interval_s,
            filter: self.filter_window.map(|window_beats| IntervalFilter {
                window_beats,
                percent: self.filter_percent,
            }),
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PlotKind {
    /// Instantaneous rates at their beat times
    #[value(name = "raw")]
    Raw,
    /// The common grid the accuracy score is computed on
    #[value(name = "resampled")]
    Resampled,
}

#[derive(Subcommand)]
enum Commands {
    /// Match candidate beats to reference beats and report precision/recall/F1
    MatchPeaks {
        #[arg(long)]
        reference: PathBuf,
        #[arg(long)]
        candidate: PathBuf,
        #[command(flatten)]
        input: BeatInput,
        #[arg(long, default_value_t = 0.15)]
        tolerance_s: f64,
        /// Score fixed-length epochs as well (seconds)
        #[arg(long)]
        epoch_s: Option<f64>,
        /// Include every matched pair in the output
        #[arg(long)]
        pairs: bool,
    },
    /// Convert beats (file or stdin) to an instantaneous rate series
    RateSeries {
        #[arg(long)]
        input: Option<PathBuf>,
        #[command(flatten)]
        beats: BeatInput,
        #[command(flatten)]
        rate: RateArgs,
    },
    /// Agreement between reference heart rate and candidate pulse rate
    IhrIprAccuracy {
        #[arg(long)]
        reference: PathBuf,
        #[arg(long)]
        candidate: PathBuf,
        #[command(flatten)]
        input: BeatInput,
        #[arg(long, default_value_t = 5.0)]
        tolerance_bpm: f64,
        #[arg(long, default_value_t = 0.5)]
        resample_interval_s: f64,
        #[arg(long, value_enum, default_value_t = InterpolationArg::Linear)]
        interpolation: InterpolationArg,
        /// Constant shift applied to the reference before scoring (seconds)
        #[arg(long, default_value_t = 0.0)]
        reference_delay_s: f64,
        #[arg(long)]
        epoch_s: Option<f64>,
        /// Also return every aligned sample
        #[arg(long)]
        samples: bool,
        #[command(flatten)]
        rate: RateArgs,
    },
    /// Shift reference beats by their estimated pulse transit time
    DelayReference {
        #[arg(long)]
        reference: PathBuf,
        #[arg(long)]
        candidate: PathBuf,
        #[command(flatten)]
        input: BeatInput,
        #[arg(long, default_value_t = 0.20)]
        min_ptt_s: f64,
        #[arg(long, default_value_t = 0.54)]
        max_ptt_s: f64,
        #[arg(long, default_value_t = 300)]
        smoothing_beats: usize,
        /// Write the delayed beats here (seconds, one per line) instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Score one recording with both engines
    Score {
        #[arg(long)]
        reference: PathBuf,
        #[arg(long)]
        candidate: PathBuf,
        #[command(flatten)]
        input: BeatInput,
        /// TOML benchmark configuration
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value = "recording")]
        recording: String,
        #[arg(long, default_value = "detector")]
        detector: String,
    },
    /// Score every recording of a manifest and write scores.tsv/scores.json/summary.json
    Bench {
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
        /// Worker threads (defaults to one per core)
        #[arg(long)]
        jobs: Option<usize>,
    },
    /// Generate synthetic ECG/PPG beat files and a manifest
    Simulate {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 5)]
        recordings: usize,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        #[arg(long, default_value_t = 300.0)]
        duration_s: f64,
        #[arg(long, default_value_t = 70.0)]
        mean_hr_bpm: f64,
        #[arg(long, default_value_t = 0.3)]
        ptt_s: f64,
        #[arg(long, default_value_t = 0.03)]
        miss_rate: f64,
        #[arg(long, default_value_t = 1.0)]
        spurious_per_min: f64,
        #[arg(long, default_value = "sim")]
        detector: String,
    },
    /// Render IHR and IPR to a PNG via plotters
    PlotRates {
        #[arg(long)]
        reference: PathBuf,
        #[arg(long)]
        candidate: PathBuf,
        #[command(flatten)]
        input: BeatInput,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, value_enum, default_value_t = PlotKind::Raw)]
        kind: PlotKind,
        #[arg(long, default_value_t = 2000)]
        max_points: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();
    match cli.command {
        Commands::MatchPeaks {
            reference,
            candidate,
            input,
            tolerance_s,
            epoch_s,
            pairs,
        } => cmd_match_peaks(&reference, &candidate, &input, tolerance_s, epoch_s, pairs)?,
        Commands::RateSeries { input, beats, rate } => {
            cmd_rate_series(input.as_deref(), &beats, &rate)?
        }
        Commands::IhrIprAccuracy {
            reference,
            candidate,
            input,
            tolerance_bpm,
            resample_interval_s,
            interpolation,
            reference_delay_s,
            epoch_s,
            samples,
            rate,
        } => {
            let cfg = AccuracyConfig {
                tolerance_bpm,
                resample_interval_s,
                interpolation: interpolation.into(),
                reference_delay_s,
                rate: rate.config(),
                ..AccuracyConfig::default()
            };
            cmd_ihr_ipr_accuracy(&reference, &candidate, &input, &cfg, epoch_s, samples)?
        }
        Commands::DelayReference {
            reference,
            candidate,
            input,
            min_ptt_s,
            max_ptt_s,
            smoothing_beats,
            out,
        } => {
            let cfg = PttConfig {
                min_ptt_s,
                max_ptt_s,
                smoothing_beats,
            };
            cmd_delay_reference(&reference, &candidate, &input, &cfg, out.as_deref())?
        }
        Commands::Score {
            reference,
            candidate,
            input,
            config,
            recording,
            detector,
        } => cmd_score(
            &reference,
            &candidate,
            &input,
            config.as_deref(),
            &recording,
            &detector,
        )?,
        Commands::Bench {
            manifest,
            config,
            out,
            jobs,
        } => cmd_bench(&manifest, config.as_deref(), &out, jobs)?,
        Commands::Simulate {
            out,
            recordings,
            seed,
            duration_s,
            mean_hr_bpm,
            ptt_s,
            miss_rate,
            spurious_per_min,
            detector,
        } => {
            let spec = SimulationSpec {
                duration_s,
                mean_hr_bpm,
                ptt_s,
                miss_rate,
                spurious_per_min,
                seed,
                ..SimulationSpec::default()
            };
            cmd_simulate(&out, &spec, recordings, &detector)?
        }
        Commands::PlotRates {
            reference,
            candidate,
            input,
            out,
            kind,
            max_points,
        } => cmd_plot_rates(&reference, &candidate, &input, &out, kind, max_points)?,
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<BenchConfig> {
    match path {
        Some(path) => read_config(path),
        None => Ok(BenchConfig::default()),
    }
}

fn cmd_match_peaks(
    reference: &Path,
    candidate: &Path,
    input: &BeatInput,
    tolerance_s: f64,
    epoch_s: Option<f64>,
    pairs: bool,
) -> Result<()> {
    let reference = input.load(reference)?;
    let candidate = input.load(candidate)?;
    let result = match_beats(&reference, &candidate, tolerance_s)?;
    let mut out = json!({
        "scores": result.scores(),
        "max_abs_offset_s": result.max_abs_offset(),
    });
    if pairs {
        out["pairs"] = serde_json::to_value(&result.pairs)?;
    }
    if let Some(window_s) = epoch_s {
        let epochs = windowed_matching(&reference, &candidate, tolerance_s, window_s)?;
        out["epochs"] = serde_json::to_value(epochs)?;
    }
    println!("{}", serde_json::to_string(&out)?);
    Ok(())
}

fn cmd_rate_series(input: Option<&Path>, beats: &BeatInput, rate: &RateArgs) -> Result<()> {
    let beats = beats.load_or_stdin(input)?;
    let series = build_rate_series(&beats, &rate.config())?;
    println!("{}", serde_json::to_string(&series)?);
    Ok(())
}

fn cmd_ihr_ipr_accuracy(
    reference: &Path,
    candidate: &Path,
    input: &BeatInput,
    cfg: &AccuracyConfig,
    epoch_s: Option<f64>,
    samples: bool,
) -> Result<()> {
    let reference = input.load(reference)?;
    let candidate = input.load(candidate)?;
    let result = ihr_ipr_accuracy(&reference, &candidate, cfg)?;
    let mut out = json!({
        "overlap_start": result.overlap_start,
        "overlap_end": result.overlap_end,
        "scores": result.scores(&cfg.agreement_bands),
    });
    if samples {
        out["samples"] = serde_json::to_value(&result.samples)?;
    }
    if let Some(window_s) = epoch_s {
        let epochs = windowed_accuracy(&reference, &candidate, cfg, window_s)?;
        out["epochs"] = serde_json::to_value(epochs)?;
    }
    println!("{}", serde_json::to_string(&out)?);
    Ok(())
}

fn cmd_delay_reference(
    reference: &Path,
    candidate: &Path,
    input: &BeatInput,
    cfg: &PttConfig,
    out: Option<&Path>,
) -> Result<()> {
    let reference = input.load(reference)?;
    let candidate = input.load(candidate)?;
    let ptt = estimate_ptt(&reference, &candidate, cfg)?;
    let delayed = delay_reference(&reference, &candidate, cfg)?;
    let mean_ptt_s = ptt.iter().sum::<f64>() / ptt.len() as f64;
    info!(
        "mean pulse transit time {:.3} s over {} beats",
        mean_ptt_s,
        ptt.len()
    );
    match out {
        Some(path) => {
            text_io::write_beat_seconds(path, &delayed)?;
            println!(
                "{}",
                serde_json::to_string(&json!({
                    "out": path,
                    "beats": delayed.len(),
                    "mean_ptt_s": mean_ptt_s,
                }))?
            );
        }
        None => println!(
            "{}",
            serde_json::to_string(&json!({
                "mean_ptt_s": mean_ptt_s,
                "ptt_s": ptt,
                "beats": delayed,
            }))?
        ),
    }
    Ok(())
}

fn cmd_score(
    reference: &Path,
    candidate: &Path,
    input: &BeatInput,
    config: Option<&Path>,
    recording: &str,
    detector: &str,
) -> Result<()> {
    let config = load_config(config)?;
    let reference = input.load(reference)?;
    let candidate = input.load(candidate)?;
    let score = score_recording(recording, detector, &reference, &candidate, &config);
    println!("{}", serde_json::to_string(&score)?);
    Ok(())
}

fn cmd_bench(
    manifest: &Path,
    config: Option<&Path>,
    out: &Path,
    jobs: Option<usize>,
) -> Result<()> {
    let config = load_config(config)?;
    let summary = run_benchmark(manifest, &config, out, jobs)
        .with_context(|| format!("benchmarking {}", manifest.display()))?;
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn cmd_simulate(
    out: &Path,
    spec: &SimulationSpec,
    recordings: usize,
    detector: &str,
) -> Result<()> {
    let manifest = write_simulated_dataset(out, spec, recordings, detector)?;
    println!(
        "{}",
        serde_json::to_string(&json!({ "manifest": manifest, "recordings": recordings }))?
    );
    Ok(())
}

fn cmd_plot_rates(
    reference: &Path,
    candidate: &Path,
    input: &BeatInput,
    out: &Path,
    kind: PlotKind,
    max_points: usize,
) -> Result<()> {
    let reference = input.load(reference)?;
    let candidate = input.load(candidate)?;
    let fig = match kind {
        PlotKind::Raw => {
            let rate = RateSeriesConfig::default();
            figure_from_rates(
                &build_rate_series(&reference, &rate)?,
                &build_rate_series(&candidate, &rate)?,
                max_points,
            )
        }
        PlotKind::Resampled => {
            let result = ihr_ipr_accuracy(&reference, &candidate, &AccuracyConfig::default())?;
            figure_from_accuracy(&result, max_points)
        }
    };
    PngBackend::new(out).draw(&fig)
}

/// Bitmap renderer for the library's figure model.
struct PngBackend<'a> {
    path: &'a Path,
    size: (u32, u32),
}

impl<'a> PngBackend<'a> {
    fn new(path: &'a Path) -> Self {
        Self {
            path,
            size: (1000, 480),
        }
    }
}

impl PlotBackend for PngBackend<'_> {
    fn draw(&mut self, fig: &Figure) -> Result<()> {
        let Some((x_min, x_max, y_min, y_max)) = fig.bounds() else {
            bail!("nothing to plot");
        };
        let pad = ((y_max - y_min) * 0.05).max(1.0);
        let root = BitMapBackend::new(self.path, self.size).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .caption(
                fig.title.clone().unwrap_or_else(|| "Plot".into()),
                ("sans-serif", 24),
            )
            .x_label_area_size(30)
            .y_label_area_size(40)
            .build_cartesian_2d(x_min..x_max.max(x_min + 1.0), (y_min - pad)..(y_max + pad))?;
        chart
            .configure_mesh()
            .x_desc(fig.x.label.clone().unwrap_or_default())
            .y_desc(fig.y.label.clone().unwrap_or_default())
            .draw()?;
        for series in &fig.series {
            match series {
                Series::Line(line) => {
                    let (r, g, b) = line.style.color.rgb();
                    let color = RGBColor(r, g, b);
                    let style = color.stroke_width(line.style.width.round().max(1.0) as u32);
                    let points = line.points.iter().map(|p| (p[0], p[1]));
                    let anno = match line.style.dash {
                        Some([on, off]) => chart.draw_series(DashedLineSeries::new(
                            points,
                            on.round().max(1.0) as u32,
                            off.round().max(1.0) as u32,
                            style,
                        ))?,
                        None => chart.draw_series(LineSeries::new(points, style))?,
                    };
                    anno.label(line.name.clone())
                        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
                }
            }
        }
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
        root.present()?;
        info!("wrote {}", self.path.display());
        Ok(())
    }
}
