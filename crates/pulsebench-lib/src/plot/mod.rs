//! Backend-free figure model. Renderers live with the binaries.

use crate::{
    metrics::accuracy::AccuracyResult,
    signal::RateSeries,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    /// Dash and gap lengths in pixels; solid when `None`.
    pub dash: Option<[f32; 2]>,
    pub color: Color,
}

/// 0xRRGGBB
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

pub const REFERENCE_COLOR: Color = Color(0xD62728);
pub const CANDIDATE_COLOR: Color = Color(0x1F77B4);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
}

impl Series {
    pub fn points(&self) -> &[[f64; 2]] {
        match self {
            Series::Line(line) => &line.points,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis { label: None },
            y: Axis { label: None },
            series: Vec::new(),
        }
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }

    /// `(x_min, x_max, y_min, y_max)` over every series, or `None` for an empty figure.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let mut points = self.series.iter().flat_map(|s| s.points().iter());
        let first = points.next()?;
        Some(points.fold(
            (first[0], first[0], first[1], first[1]),
            |(x0, x1, y0, y1), p| (x0.min(p[0]), x1.max(p[0]), y0.min(p[1]), y1.max(p[1])),
        ))
    }
}

pub trait PlotBackend {
    fn draw(&mut self, fig: &Figure) -> anyhow::Result<()>;
}

pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    let mut result = Vec::with_capacity(max_points);
    for i in 0..max_points {
        let start = (i as f64 * bucket_size).floor() as usize;
        if start >= points.len() {
            break;
        }
        result.push(points[start]);
    }
    result
}

fn line(name: &str, points: Vec<[f64; 2]>, color: Color, dash: Option<[f32; 2]>) -> Series {
    Series::Line(LineSeries {
        name: name.into(),
        points,
        style: Style {
            width: 1.6,
            dash,
            color,
        },
    })
}

/// IHR and IPR overlaid against time.
pub fn figure_from_rates(ihr: &RateSeries, ipr: &RateSeries, max_points: usize) -> Figure {
    let mut fig = Figure::new(Some("Heart rate vs pulse rate".into()));
    fig.x.label = Some("time (s)".into());
    fig.y.label = Some("rate (bpm)".into());
    for (name, series, color, dash) in [
        ("IHR", ihr, REFERENCE_COLOR, None),
        ("IPR", ipr, CANDIDATE_COLOR, Some([8.0, 4.0])),
    ] {
        let points: Vec<[f64; 2]> = series.points().map(|(t, bpm)| [t, bpm]).collect();
        fig.add_series(line(name, decimate_points(&points, max_points), color, dash));
    }
    fig
}

/// The resampled pair actually compared by the accuracy engine.
pub fn figure_from_accuracy(result: &AccuracyResult, max_points: usize) -> Figure {
    let ihr: Vec<[f64; 2]> = result.samples.iter().map(|s| [s.time, s.ihr]).collect();
    let ipr: Vec<[f64; 2]> = result.samples.iter().map(|s| [s.time, s.ipr]).collect();
    let mut fig = Figure::new(Some(format!(
        "{:.1} % within {} bpm",
        result.percentage, result.tolerance_bpm
    )));
    fig.x.label = Some("time (s)".into());
    fig.y.label = Some("rate (bpm)".into());
    fig.add_series(line("IHR", decimate_points(&ihr, max_points), REFERENCE_COLOR, None));
    fig.add_series(line(
        "IPR",
        decimate_points(&ipr, max_points),
        CANDIDATE_COLOR,
        Some([8.0, 4.0]),
    ));
    fig
}
