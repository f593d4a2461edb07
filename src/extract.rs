//! # Grid-to-Series Conversion
//!
//! Turns one variable of a [`GriddedDataset`] into the SHETRAN table layout:
//! one row per time step, a `time` column followed by one column per selected
//! cell, named by the cell's 1-based id.
//!
//! ## Key Components
//!
//! - [`extract_table`]: reads the slab covering a selection and builds the scaled table
//! - [`build_table`]: lays out an already-read [`Slab`] as a DataFrame
//! - [`scale_values`]: multiplies every value column by the unit-conversion factor

use crate::error::Result;
use crate::filters::{GridCell, Selection};
use crate::grid::{GriddedDataset, Slab};
use crate::time::IndexRange;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use polars::prelude::*;

/// Name of the timestamp column
pub const TIME_COLUMN: &str = "time";

/// Number of cells above which a progress bar is shown while building columns
const PROGRESS_THRESHOLD: usize = 500;

/// Extracts `variable` over `range` and `selection` into a scaled table.
///
/// Fill and missing values become nulls. The row count is `range.len()` and
/// there is one value column per selected cell.
pub fn extract_table(
    dataset: &GriddedDataset,
    variable: &str,
    range: IndexRange,
    selection: &Selection,
    factor: f64,
) -> Result<DataFrame> {
    info!(
        "Extracting '{}' for {} time steps and {} cells",
        variable,
        range.len(),
        selection.len()
    );
    let slab = dataset.read_slab(variable, range, selection)?;
    let timestamps = dataset.time_axis().format_range(range);
    let df = build_table(&timestamps, &slab, &selection.cells)?;
    scale_values(df, factor)
}

/// Builds the unscaled table from a slab; `timestamps` must have one entry per
/// time step of the slab
pub fn build_table(timestamps: &[String], slab: &Slab, cells: &[GridCell]) -> Result<DataFrame> {
    let progress = column_progress(cells.len());
    let mut columns: Vec<Column> = Vec::with_capacity(cells.len() + 1);
    columns.push(Series::new(TIME_COLUMN.into(), timestamps.to_vec()).into());

    for cell in cells {
        let values: Vec<Option<f64>> = slab
            .series(cell.lat_index, cell.lon_index)
            .into_iter()
            .map(|v| if v.is_nan() { None } else { Some(v) })
            .collect();
        columns.push(Series::new(cell.id.to_string().into(), values).into());
        if let Some(pb) = &progress {
            pb.inc(1);
        }
    }
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    let df = DataFrame::new(columns)?;
    debug!("Built table with shape {:?}", df.shape());
    Ok(df)
}

fn column_progress(n_cells: usize) -> Option<ProgressBar> {
    if n_cells < PROGRESS_THRESHOLD {
        return None;
    }
    let pb = ProgressBar::new(n_cells as u64);
    let style = ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} cells")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    pb.set_style(style);
    pb.set_message("Building columns");
    Some(pb)
}

/// Multiplies every column except `time` by `factor`
pub fn scale_values(df: DataFrame, factor: f64) -> Result<DataFrame> {
    if factor == 1.0 {
        return Ok(df);
    }
    let exprs: Vec<Expr> = df
        .get_column_names()
        .into_iter()
        .filter(|name| name.as_str() != TIME_COLUMN)
        .map(|name| (col(name.as_str()) * lit(factor)).alias(name.as_str()))
        .collect();
    if exprs.is_empty() {
        return Ok(df);
    }
    Ok(df.lazy().with_columns(exprs).collect()?)
}

/// Names of the value columns, in table order
pub fn value_columns(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .filter(|name| name.as_str() != TIME_COLUMN)
        .map(|name| name.to_string())
        .collect()
}
