//! # nc2shetran
//!
//! A Rust library for converting ERA5 / ERA5-Land gridded NetCDF time series
//! into the delimited text inputs of the SHETRAN hydrological model.
//!
//! ## Features
//!
//! - **Calendar-correct time axis**: CF offsets ("hours since 1900-01-01") are
//!   resolved with chrono, and time windows are located by exact lookup
//! - **Spatial selections**: a single cell by index, the cell nearest a
//!   coordinate, a bounding box or the full grid
//! - **SHETRAN layout**: one row per time step and one column per cell, plus an
//!   ESRI ASCII cell-ID map for map selections
//! - **Diagnostics**: PNG map and time-series plots rendered before conversion
//! - **CDS download**: optional retrieval of the input from the Copernicus
//!   Climate Data Store
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nc2shetran::{process_job, input::JobConfig};
//!
//! let config = JobConfig::from_file("essequibo.yaml")?;
//! let summary = process_job(&config)?;
//! println!("{} rows written to {}", summary.rows, summary.output);
//! # Ok::<(), nc2shetran::error::Nc2ShetranError>(())
//! ```
//!
//! ## Configuration Example
//!
//! ```yaml
//! input: evaporation_Essequibo_years2000-2021_hours00.nc
//! variable: e
//! output: total_evaporation_Essequibo_cells.csv
//! unit_conversion: 1000
//! time_window:
//!   start: "2000-01-01 00:00:00"
//!   end: "2010-01-01 00:00:00"
//! selection:
//!   kind: bounding_box
//!   params: { north: 8.21, south: 1.09, east: -57.67, west: -62.94 }
//! ```

pub mod cli;
pub mod download;
pub mod error;
pub mod extract;
pub mod filters;
pub mod grid;
pub mod info;
pub mod input;
pub mod log;
pub mod output;
pub mod plot;
pub mod time;

#[cfg(test)]
mod tests;

use crate::download::run_download;
use crate::error::{Nc2ShetranError, Result};
use crate::extract::extract_table;
use crate::filters::Selection;
use crate::grid::GriddedDataset;
use crate::input::JobConfig;
use crate::output::{write_cell_map, write_table_csv};
use crate::plot::run_diagnostics;
use crate::time::{IndexRange, TIMESTAMP_FORMAT};
use ::log::info;
use std::path::PathBuf;

/// What a conversion produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobSummary {
    pub output: String,
    pub cell_map: Option<String>,
    pub rows: usize,
    pub cells: usize,
    pub first_timestamp: String,
    pub last_timestamp: String,
    pub plots: Vec<PathBuf>,
}

/// An open dataset with the job's time range and spatial selection resolved
struct PreparedJob {
    dataset: GriddedDataset,
    range: IndexRange,
    selection: Selection,
}

fn prepare(config: &JobConfig) -> Result<PreparedJob> {
    config.validate()?;
    let dataset = GriddedDataset::open(&config.input, &config.coordinates)?;
    dataset.check_layout(&config.variable)?;

    let range = dataset.time_axis().resolve_window(&config.time_window()?)?;
    let selector = config.selection.to_selector()?;
    let selection = selector.select(dataset.coordinates())?;
    info!(
        "Selected {} cells with the {} selector over {} time steps",
        selection.len(),
        selector.kind(),
        range.len()
    );

    Ok(PreparedJob {
        dataset,
        range,
        selection,
    })
}

/// Converts the input file according to `config`.
///
/// Stages run in order: validate, open, resolve the time window, select cells,
/// render diagnostics (failures are logged, never fatal), extract and scale,
/// write the table and, for map selections, the cell-ID map.
///
/// # Errors
///
/// - [`Nc2ShetranError::VariableNotFound`] when the variable is not in the file
/// - [`Nc2ShetranError::TimestampNotFound`] when a window bound is not on the time axis
/// - [`Nc2ShetranError::CellOutOfRange`] when a cell index exceeds the grid
/// - I/O, NetCDF and Polars errors from reading and writing
pub fn process_job(config: &JobConfig) -> Result<JobSummary> {
    let PreparedJob {
        dataset,
        range,
        selection,
    } = prepare(config)?;

    let plots = match &config.plot {
        Some(plot) => run_diagnostics(
            &dataset,
            &config.variable,
            range,
            &selection,
            config.unit_conversion,
            plot,
        ),
        None => Vec::new(),
    };

    let df = extract_table(
        &dataset,
        &config.variable,
        range,
        &selection,
        config.unit_conversion,
    )?;
    write_table_csv(&df, &config.output, &config.format)?;

    let cell_map = match config.cell_map_path() {
        Some(path) => {
            let cellsize = dataset.coordinates().resolution().ok_or_else(|| {
                Nc2ShetranError::Config(
                    "Cell map needs at least two grid points to infer the cell size".to_string(),
                )
            })?;
            write_cell_map(&selection, cellsize, &path)?;
            Some(path)
        }
        None => None,
    };

    let axis = dataset.time_axis();
    let format_at = |index: usize| {
        axis.get(index)
            .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string())
            .unwrap_or_default()
    };
    let summary = JobSummary {
        output: config.output.clone(),
        cell_map,
        rows: df.height(),
        cells: selection.len(),
        first_timestamp: format_at(range.start),
        last_timestamp: format_at(range.end),
        plots,
    };
    dataset.close()?;

    Ok(summary)
}

/// Renders only the diagnostic plots of a job, using default plot settings
/// when the job has none
pub fn plot_job(config: &JobConfig) -> Result<Vec<PathBuf>> {
    let PreparedJob {
        dataset,
        range,
        selection,
    } = prepare(config)?;
    let plot = config.plot.clone().unwrap_or_default();
    let rendered = run_diagnostics(
        &dataset,
        &config.variable,
        range,
        &selection,
        config.unit_conversion,
        &plot,
    );
    dataset.close()?;
    if rendered.is_empty() {
        return Err(Nc2ShetranError::Plot(
            "no plot could be rendered, see the warnings above".to_string(),
        ));
    }
    Ok(rendered)
}

/// Where the download stage saves its file
pub fn download_target(config: &JobConfig) -> Option<String> {
    let download = config.download.as_ref()?;
    Some(download.target.clone().unwrap_or_else(|| config.input.clone()))
}

/// Runs the optional download stage, then converts the downloaded file
pub async fn run_pipeline(config: &JobConfig, force_download: bool) -> Result<JobSummary> {
    let (Some(download), Some(target)) = (&config.download, download_target(config)) else {
        return process_job(config);
    };
    let downloaded = run_download(download, &target, force_download).await?;
    let downloaded = downloaded.to_string_lossy().to_string();
    if downloaded == config.input {
        return process_job(config);
    }
    info!("Converting the downloaded file {} instead of {}", downloaded, config.input);
    process_job(&JobConfig {
        input: downloaded,
        ..config.clone()
    })
}
