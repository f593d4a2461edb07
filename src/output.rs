//! # SHETRAN Output Module
//!
//! Writes converted tables as delimited text files in the SHETRAN time-series
//! layout and, for map selections, the ESRI ASCII grid that maps each model
//! cell to its table column.
//!
//! ## Features
//!
//! - **Configurable layout**: delimiter, header, `time` column, float precision
//!   and missing-value marker come from [`TableFormat`]
//! - **Atomic writes**: files are written to a temporary file in the target
//!   directory and renamed into place once complete
//! - **Cell-ID map**: [`write_cell_map`] writes the selection's cell ids in
//!   their geographic arrangement

use crate::error::{Nc2ShetranError, Result};
use crate::extract::TIME_COLUMN;
use crate::filters::Selection;
use log::{debug, info};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Marker written for grid cells outside the selection in the cell-ID map
pub const NODATA_VALUE: i64 = -9999;

/// Layout of the output time-series table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableFormat {
    /// Column separator, a single ASCII character
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Whether the `time` column is written
    #[serde(default = "default_true")]
    pub include_time: bool,
    /// Whether the header row is written
    #[serde(default = "default_true")]
    pub header: bool,
    /// Number of decimals written for values, `None` for full precision
    #[serde(default = "default_precision")]
    pub precision: Option<usize>,
    /// Text written in place of missing values
    #[serde(default = "default_missing_value")]
    pub missing_value: String,
}

fn default_delimiter() -> char {
    ','
}

fn default_true() -> bool {
    true
}

fn default_precision() -> Option<usize> {
    Some(6)
}

fn default_missing_value() -> String {
    "-999".to_string()
}

impl Default for TableFormat {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            include_time: true,
            header: true,
            precision: default_precision(),
            missing_value: default_missing_value(),
        }
    }
}

impl TableFormat {
    pub fn validate(&self) -> Result<()> {
        self.separator()?;
        if self.missing_value.contains(self.delimiter) {
            return Err(Nc2ShetranError::Config(format!(
                "Missing-value marker '{}' contains the delimiter",
                self.missing_value
            )));
        }
        Ok(())
    }

    fn separator(&self) -> Result<u8> {
        if !self.delimiter.is_ascii() || self.delimiter.is_ascii_alphanumeric() {
            return Err(Nc2ShetranError::Config(format!(
                "Delimiter must be a single ASCII punctuation or whitespace character, got '{}'",
                self.delimiter
            )));
        }
        Ok(self.delimiter as u8)
    }
}

/// Writes the table to `output_path` as delimited text.
///
/// Parent directories are created as needed and the file is only replaced
/// once the whole table has been written.
pub fn write_table_csv(df: &DataFrame, output_path: &str, format: &TableFormat) -> Result<()> {
    let separator = format.separator()?;
    debug!("Writing table with shape {:?} to {}", df.shape(), output_path);
    debug!("First few rows:\n{}", df.head(Some(5)));

    let mut table = if format.include_time {
        df.clone()
    } else {
        df.drop(TIME_COLUMN)?
    };

    write_atomically(Path::new(output_path), |file| {
        CsvWriter::new(file)
            .include_header(format.header)
            .with_separator(separator)
            .with_float_precision(format.precision)
            .with_null_value(format.missing_value.clone())
            .finish(&mut table)?;
        Ok(())
    })?;

    info!(
        "Wrote {} rows x {} columns to {}",
        table.height(),
        table.width(),
        output_path
    );
    Ok(())
}

/// Writes an ESRI ASCII grid whose values are the selection's cell ids.
///
/// Rows run north to south and columns west to east, matching the id order
/// of the table header. `cellsize` is the grid spacing in degrees; the lower
/// left corner is half a cell south-west of the south-west cell centre.
pub fn write_cell_map(selection: &Selection, cellsize: f64, output_path: &str) -> Result<()> {
    if selection.is_empty() || selection.len() != selection.n_rows * selection.n_cols {
        return Err(Nc2ShetranError::EmptySelection(format!(
            "cell map needs a full rectangle of cells, got {} cells for {} x {}",
            selection.len(),
            selection.n_rows,
            selection.n_cols
        )));
    }
    if !(cellsize.is_finite() && cellsize > 0.0) {
        return Err(Nc2ShetranError::Config(format!(
            "Cell size must be positive, got {}",
            cellsize
        )));
    }

    let west = selection
        .cells
        .iter()
        .map(|c| c.longitude)
        .fold(f64::INFINITY, f64::min);
    let south = selection
        .cells
        .iter()
        .map(|c| c.latitude)
        .fold(f64::INFINITY, f64::min);

    write_atomically(Path::new(output_path), |file| {
        let mut out = BufWriter::new(file);
        writeln!(out, "ncols         {}", selection.n_cols)?;
        writeln!(out, "nrows         {}", selection.n_rows)?;
        writeln!(out, "xllcorner     {}", west - cellsize / 2.0)?;
        writeln!(out, "yllcorner     {}", south - cellsize / 2.0)?;
        writeln!(out, "cellsize      {}", cellsize)?;
        writeln!(out, "NODATA_value  {}", NODATA_VALUE)?;
        for row in selection.cells.chunks(selection.n_cols) {
            let line: Vec<String> = row.iter().map(|c| c.id.to_string()).collect();
            writeln!(out, "{}", line.join(" "))?;
        }
        out.flush()?;
        Ok(())
    })?;

    info!(
        "Wrote {} x {} cell map to {}",
        selection.n_rows, selection.n_cols, output_path
    );
    Ok(())
}

fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut fs::File) -> Result<()>,
{
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    write(temp.as_file_mut())?;
    temp.persist(path).map_err(|e| Nc2ShetranError::Io(e.error))?;
    Ok(())
}
