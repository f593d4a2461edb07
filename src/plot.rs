//! # Diagnostic Plots
//!
//! Renders two PNG sanity checks before a conversion: a map of one time slice
//! over the selected cells and a line chart of one cell over the converted
//! time range. Both apply the unit-conversion factor so the plotted values
//! match the written table.
//!
//! Plotting never aborts a conversion: [`run_diagnostics`] logs failures at
//! `warn` and returns whatever it managed to render.

use crate::error::{Nc2ShetranError, Result};
use crate::filters::Selection;
use crate::grid::GriddedDataset;
use crate::time::{IndexRange, TIMESTAMP_FORMAT};
use log::{debug, info, warn};
use plotters::prelude::*;
use plotters::style::register_font;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Path of the font registered for this process, if any
static REGISTERED_FONT: OnceLock<Option<String>> = OnceLock::new();

const MISSING_COLOR: RGBColor = RGBColor(170, 170, 170);
const SERIES_COLOR: RGBColor = RGBColor(30, 144, 255);

/// Settings of the diagnostic plots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotConfig {
    /// Directory the PNG files are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// Time step (index into the file's time axis) shown on the map
    #[serde(default)]
    pub time_index: usize,
    /// Latitude index of the cell shown on the line chart
    #[serde(default)]
    pub lat_index: usize,
    /// Longitude index of the cell shown on the line chart
    #[serde(default)]
    pub lon_index: usize,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// TrueType font used for titles and axis labels. Fonts are registered once
    /// per process, so a different font in a later job is ignored with a warning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_path: Option<String>,
    /// Whether titles and axis labels are drawn
    #[serde(default = "default_labels")]
    pub labels: bool,
}

fn default_output_dir() -> String {
    "plots".to_string()
}

fn default_width() -> u32 {
    1024
}

fn default_height() -> u32 {
    768
}

fn default_labels() -> bool {
    true
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            time_index: 0,
            lat_index: 0,
            lon_index: 0,
            width: default_width(),
            height: default_height(),
            font_path: None,
            labels: default_labels(),
        }
    }
}

impl PlotConfig {
    pub fn map_path(&self, variable: &str) -> PathBuf {
        Path::new(&self.output_dir).join(format!("{}_map_t{}.png", variable, self.time_index))
    }

    pub fn series_path(&self, variable: &str) -> PathBuf {
        Path::new(&self.output_dir).join(format!(
            "{}_series_lat{}_lon{}.png",
            variable, self.lat_index, self.lon_index
        ))
    }

    /// Labels are only drawn when a font could be registered
    fn draw_labels(&self) -> bool {
        if !self.labels {
            return false;
        }
        let registered = REGISTERED_FONT
            .get_or_init(|| load_font(self.font_path.as_deref()))
            .as_deref();
        if let Some(ignored) = ignored_font(self.font_path.as_deref(), registered) {
            warn!(
                "Font {} ignored, {} is already registered",
                ignored,
                registered.unwrap_or("no font")
            );
        }
        if registered.is_none() {
            warn!("No usable font found, plots are rendered without labels");
        }
        registered.is_some()
    }
}

/// The requested font when another one (or none) is already in use
fn ignored_font<'a>(requested: Option<&'a str>, registered: Option<&str>) -> Option<&'a str> {
    requested.filter(|path| Some(*path) != registered)
}

fn load_font(preferred: Option<&str>) -> Option<String> {
    let candidates = preferred.into_iter().chain(FONT_CANDIDATES.iter().copied());
    for candidate in candidates {
        let Ok(bytes) = fs::read(candidate) else {
            continue;
        };
        let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
        match register_font("sans-serif", FontStyle::Normal, bytes) {
            Ok(()) => {
                debug!("Registered plot font {}", candidate);
                return Some(candidate.to_string());
            }
            Err(_) => debug!("Font {} could not be parsed", candidate),
        }
    }
    None
}

fn plot_err<E: std::fmt::Display>(e: E) -> Nc2ShetranError {
    Nc2ShetranError::Plot(e.to_string())
}

/// Minimum and maximum of the finite values
pub fn value_range(values: &[f64]) -> Option<(f64, f64)> {
    values
        .iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Widens a degenerate range so it can be used as a chart axis
fn padded(lo: f64, hi: f64) -> (f64, f64) {
    if hi > lo {
        let pad = (hi - lo) * 0.05;
        (lo - pad, hi + pad)
    } else {
        let pad = if lo == 0.0 { 1.0 } else { lo.abs() * 0.1 };
        (lo - pad, hi + pad)
    }
}

/// Blue for the low end of the range through to red for the high end
pub fn color_for(value: f64, lo: f64, hi: f64) -> HSLColor {
    let t = if hi > lo {
        ((value - lo) / (hi - lo)).clamp(0.0, 1.0)
    } else {
        0.5
    };
    HSLColor((1.0 - t) * 240.0 / 360.0, 0.8, 0.5)
}

/// Renders the selected cells at one time step as coloured rectangles
pub fn render_map(
    dataset: &GriddedDataset,
    variable: &str,
    selection: &Selection,
    factor: f64,
    config: &PlotConfig,
) -> Result<PathBuf> {
    let time_index = config.time_index;
    let timestamp = dataset.time_axis().get(time_index).ok_or_else(|| {
        Nc2ShetranError::Plot(format!(
            "time index {} is outside the {} time steps",
            time_index,
            dataset.time_axis().len()
        ))
    })?;
    let step = IndexRange {
        start: time_index,
        end: time_index,
    };
    let slab = dataset.read_window(variable, step, selection.lat_range, selection.lon_range)?;

    let cells: Vec<(f64, f64, f64)> = selection
        .cells
        .iter()
        .map(|c| {
            let value = slab
                .value(time_index, c.lat_index, c.lon_index)
                .unwrap_or(f64::NAN);
            (c.longitude, c.latitude, value * factor)
        })
        .collect();
    let values: Vec<f64> = cells.iter().map(|c| c.2).collect();
    let (lo, hi) = value_range(&values).unwrap_or((0.0, 0.0));

    let half = dataset.coordinates().resolution().unwrap_or(0.1) / 2.0;
    let (lon_lo, lon_hi) = value_range(&cells.iter().map(|c| c.0).collect::<Vec<_>>())
        .ok_or_else(|| Nc2ShetranError::EmptySelection("nothing to plot".to_string()))?;
    let (lat_lo, lat_hi) = value_range(&cells.iter().map(|c| c.1).collect::<Vec<_>>())
        .ok_or_else(|| Nc2ShetranError::EmptySelection("nothing to plot".to_string()))?;

    let path = config.map_path(variable);
    prepare_dir(&path)?;
    let labels = config.draw_labels();

    let root = BitMapBackend::new(&path, (config.width, config.height)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut builder = ChartBuilder::on(&root);
    builder.margin(15);
    let title = format!(
        "{} at {} (range {:.3} to {:.3})",
        variable,
        timestamp.format(TIMESTAMP_FORMAT),
        lo,
        hi
    );
    if labels {
        builder
            .caption(title, ("sans-serif", 22))
            .x_label_area_size(40)
            .y_label_area_size(50);
    }
    let mut chart = builder
        .build_cartesian_2d(lon_lo - half..lon_hi + half, lat_lo - half..lat_hi + half)
        .map_err(plot_err)?;
    if labels {
        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc("Longitude")
            .y_desc("Latitude")
            .draw()
            .map_err(plot_err)?;
    }

    chart
        .draw_series(cells.iter().map(|&(lon, lat, value)| {
            let style = if value.is_finite() {
                color_for(value, lo, hi).filled()
            } else {
                MISSING_COLOR.filled()
            };
            Rectangle::new([(lon - half, lat + half), (lon + half, lat - half)], style)
        }))
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    info!("Rendered map to {}", path.display());
    Ok(path.clone())
}

/// Renders one cell over `range` as a line chart; gaps mark missing values
pub fn render_series(
    dataset: &GriddedDataset,
    variable: &str,
    range: IndexRange,
    factor: f64,
    config: &PlotConfig,
) -> Result<PathBuf> {
    let (lat, lon) = (config.lat_index, config.lon_index);
    let coordinates = dataset.coordinates();
    if lat >= coordinates.n_lat() || lon >= coordinates.n_lon() {
        return Err(Nc2ShetranError::CellOutOfRange {
            lat_index: lat,
            lon_index: lon,
            n_lat: coordinates.n_lat(),
            n_lon: coordinates.n_lon(),
        });
    }

    let slab = dataset.read_window(variable, range, (lat, lat), (lon, lon))?;
    let values: Vec<f64> = slab.series(lat, lon).into_iter().map(|v| v * factor).collect();
    let (lo, hi) = padded_range(&values);
    let timestamps = dataset.time_axis().format_range(range);
    let x_max = values.len().saturating_sub(1).max(1) as f64;

    let path = config.series_path(variable);
    prepare_dir(&path)?;
    let labels = config.draw_labels();

    let root = BitMapBackend::new(&path, (config.width, config.height)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut builder = ChartBuilder::on(&root);
    builder.margin(15);
    if labels {
        builder
            .caption(
                format!(
                    "{} at ({:.3}, {:.3})",
                    variable, coordinates.latitudes[lat], coordinates.longitudes[lon]
                ),
                ("sans-serif", 22),
            )
            .x_label_area_size(40)
            .y_label_area_size(60);
    }
    let mut chart = builder
        .build_cartesian_2d(0.0..x_max, lo..hi)
        .map_err(plot_err)?;
    if labels {
        let x_formatter = |x: &f64| {
            timestamps
                .get(x.round() as usize)
                .map(|ts| ts.chars().take(10).collect::<String>())
                .unwrap_or_default()
        };
        chart
            .configure_mesh()
            .x_labels(5)
            .x_label_formatter(&x_formatter)
            .y_desc(variable)
            .draw()
            .map_err(plot_err)?;
    }

    for run in finite_runs(&values) {
        chart
            .draw_series(LineSeries::new(run, &SERIES_COLOR))
            .map_err(plot_err)?;
    }

    root.present().map_err(plot_err)?;
    info!("Rendered time series to {}", path.display());
    Ok(path.clone())
}

fn padded_range(values: &[f64]) -> (f64, f64) {
    let (lo, hi) = value_range(values).unwrap_or((0.0, 0.0));
    padded(lo, hi)
}

/// Splits a series into contiguous runs of finite `(index, value)` points
fn finite_runs(values: &[f64]) -> Vec<Vec<(f64, f64)>> {
    let mut runs = Vec::new();
    let mut current = Vec::new();
    for (i, &v) in values.iter().enumerate() {
        if v.is_finite() {
            current.push((i as f64, v));
        } else if !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

fn prepare_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Renders both diagnostic plots; failures are logged and skipped
pub fn run_diagnostics(
    dataset: &GriddedDataset,
    variable: &str,
    range: IndexRange,
    selection: &Selection,
    factor: f64,
    config: &PlotConfig,
) -> Vec<PathBuf> {
    let mut rendered = Vec::new();
    match render_map(dataset, variable, selection, factor, config) {
        Ok(path) => rendered.push(path),
        Err(e) => warn!("Skipping map plot: {}", e),
    }
    match render_series(dataset, variable, range, factor, config) {
        Ok(path) => rendered.push(path),
        Err(e) => warn!("Skipping time-series plot: {}", e),
    }
    rendered
}
