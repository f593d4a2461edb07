//! # Input Configuration Module
//!
//! This module provides configuration parsing and validation for nc2shetran jobs.
//! A job is described once by an immutable [`JobConfig`], loaded from JSON or YAML
//! and passed by reference to every pipeline stage.
//!
//! ## Configuration Structure
//!
//! A configuration file specifies:
//! - **input**: Path to the input NetCDF file
//! - **variable**: Short name of the variable to convert (e.g. `e` for total evaporation)
//! - **output**: Path of the SHETRAN time-series file to write
//! - **unit_conversion**: Multiplicative factor applied to every value (1000 for m to mm)
//! - **time_window**: Optional `start` / `end` timestamps
//! - **selection**: Single cell, nearest point, bounding box or the full grid
//! - **format**: Delimiter, precision and missing-value marker of the output table
//! - **plot** / **download**: Optional diagnostic and retrieval stages
//!
//! ## Example Usage
//!
//! ```rust
//! use nc2shetran::input::JobConfig;
//!
//! let json = r#"
//! {
//!   "input": "evaporation.nc",
//!   "variable": "e",
//!   "output": "total_evaporation.csv",
//!   "selection": {
//!     "kind": "bounding_box",
//!     "params": { "north": 8.21, "south": 1.09, "east": -57.67, "west": -62.94 }
//!   }
//! }"#;
//! let config = JobConfig::from_json(json)?;
//! assert_eq!(config.unit_conversion, 1000.0);
//! # Ok::<(), nc2shetran::error::Nc2ShetranError>(())
//! ```

use crate::download::{DownloadConfig, EvaporationVariable};
use crate::error::{Nc2ShetranError, Result};
use crate::filters::{BoundingBox, CellIndexSelector, FullGridSelector, GridSelector, NearestPointSelector};
use crate::output::TableFormat;
use crate::plot::PlotConfig;
use crate::time::{TimeWindow, parse_timestamp};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main configuration structure for nc2shetran jobs.
///
/// # Examples
///
/// ```rust
/// use nc2shetran::input::{JobConfig, SelectionConfig, CellParams};
///
/// let config = JobConfig {
///     selection: SelectionConfig::Cell {
///         params: CellParams { lat_index: 0, lon_index: 0 },
///     },
///     ..JobConfig::new("era5.nc", "e", "evaporation.csv")
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Path to the input NetCDF file
    pub input: String,
    /// Name of the variable to extract from the NetCDF file
    pub variable: String,
    /// Path for the output time-series table
    pub output: String,
    /// Factor every value is multiplied by before writing
    #[serde(default = "default_unit_conversion")]
    pub unit_conversion: f64,
    /// Names of the coordinate variables
    #[serde(default)]
    pub coordinates: CoordinateNames,
    /// Time window to convert
    #[serde(default)]
    pub time_window: TimeWindowConfig,
    /// Spatial selection to convert
    #[serde(default)]
    pub selection: SelectionConfig,
    /// Output table layout
    #[serde(default)]
    pub format: TableFormat,
    /// Path of the cell-ID map written in map mode (defaults to the output path with `.asc`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_map: Option<String>,
    /// Diagnostic plots rendered before conversion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot: Option<PlotConfig>,
    /// CDS retrieval performed before the input file is opened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download: Option<DownloadConfig>,
}

fn default_unit_conversion() -> f64 {
    1000.0
}

/// Names of the time, latitude and longitude coordinate variables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateNames {
    #[serde(default = "default_time_name")]
    pub time: String,
    #[serde(default = "default_latitude_name")]
    pub latitude: String,
    #[serde(default = "default_longitude_name")]
    pub longitude: String,
}

fn default_time_name() -> String {
    "time".to_string()
}

fn default_latitude_name() -> String {
    "latitude".to_string()
}

fn default_longitude_name() -> String {
    "longitude".to_string()
}

impl Default for CoordinateNames {
    fn default() -> Self {
        Self {
            time: default_time_name(),
            latitude: default_latitude_name(),
            longitude: default_longitude_name(),
        }
    }
}

/// Time window bounds as written in configuration files (`YYYY-MM-DD HH:MM:SS`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeWindowConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

impl TimeWindowConfig {
    /// Parses both bounds into a [`TimeWindow`]
    pub fn to_window(&self) -> Result<TimeWindow> {
        let start = self.start.as_deref().map(parse_timestamp).transpose()?;
        let end = self.end.as_deref().map(parse_timestamp).transpose()?;
        if let (Some(start), Some(end)) = (start, end)
            && start > end
        {
            return Err(Nc2ShetranError::InvalidTimeWindow { start, end });
        }
        Ok(TimeWindow { start, end })
    }
}

/// Enumeration of all supported spatial selections.
///
/// # Examples
///
/// ```rust
/// use nc2shetran::input::SelectionConfig;
///
/// let json = r#"{ "kind": "point", "params": { "latitude": 5.0, "longitude": -60.0, "tolerance": 0.05 } }"#;
/// let selection: SelectionConfig = serde_json::from_str(json).unwrap();
/// assert_eq!(selection.kind(), "point");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SelectionConfig {
    /// Single cell addressed by array indices
    #[serde(rename = "cell")]
    Cell { params: CellParams },
    /// Single cell nearest to a coordinate
    #[serde(rename = "point")]
    Point { params: PointParams },
    /// All cells inside a bounding box
    #[serde(rename = "bounding_box")]
    BoundingBox { params: BoundingBox },
    /// Every cell of the grid
    #[default]
    #[serde(rename = "full_grid")]
    FullGrid,
}

/// Parameters for index-based single-cell selection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellParams {
    pub lat_index: usize,
    pub lon_index: usize,
}

/// Parameters for coordinate-based single-cell selection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointParams {
    pub latitude: f64,
    pub longitude: f64,
    /// Maximum distance to the chosen grid point (in degrees)
    pub tolerance: f64,
}

impl SelectionConfig {
    /// Converts this selection configuration into a concrete selector
    pub fn to_selector(&self) -> Result<Box<dyn GridSelector>> {
        match self {
            SelectionConfig::Cell { params } => Ok(Box::new(CellIndexSelector::new(
                params.lat_index,
                params.lon_index,
            ))),
            SelectionConfig::Point { params } => {
                if !params.latitude.is_finite() || !params.longitude.is_finite() {
                    return Err(Nc2ShetranError::Config(format!(
                        "Point coordinates must be finite, got ({}, {})",
                        params.latitude, params.longitude
                    )));
                }
                if params.tolerance.is_nan() || params.tolerance <= 0.0 {
                    return Err(Nc2ShetranError::Config(format!(
                        "Point tolerance must be positive, got {}",
                        params.tolerance
                    )));
                }
                Ok(Box::new(NearestPointSelector::new(
                    params.latitude,
                    params.longitude,
                    params.tolerance,
                )))
            }
            SelectionConfig::BoundingBox { params } => {
                params.validate()?;
                Ok(Box::new(*params))
            }
            SelectionConfig::FullGrid => Ok(Box::new(FullGridSelector)),
        }
    }

    /// Returns the string identifier for this selection type
    pub fn kind(&self) -> &'static str {
        match self {
            SelectionConfig::Cell { .. } => "cell",
            SelectionConfig::Point { .. } => "point",
            SelectionConfig::BoundingBox { .. } => "bounding_box",
            SelectionConfig::FullGrid => "full_grid",
        }
    }

    /// Whether the selection yields a map (one column per cell) rather than a single series
    pub fn is_map(&self) -> bool {
        matches!(
            self,
            SelectionConfig::BoundingBox { .. } | SelectionConfig::FullGrid
        )
    }
}

impl JobConfig {
    /// Creates a configuration with default settings for the given paths
    pub fn new(input: &str, variable: &str, output: &str) -> Self {
        Self {
            input: input.to_string(),
            variable: variable.to_string(),
            output: output.to_string(),
            unit_conversion: default_unit_conversion(),
            coordinates: CoordinateNames::default(),
            time_window: TimeWindowConfig::default(),
            selection: SelectionConfig::default(),
            format: TableFormat::default(),
            cell_map: None,
            plot: None,
            download: None,
        }
    }

    /// Loads a job configuration from a JSON or YAML file.
    ///
    /// The format is chosen from the file extension (`.yaml` / `.yml` for YAML,
    /// anything else is parsed as JSON).
    ///
    /// ```rust,no_run
    /// use nc2shetran::input::JobConfig;
    ///
    /// let config = JobConfig::from_file("essequibo.yaml")?;
    /// println!("Processing variable: {}", config.variable);
    /// # Ok::<(), nc2shetran::error::Nc2ShetranError>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            _ => Self::from_json(&content),
        }
    }

    /// Loads a job configuration from a JSON string
    pub fn from_json(json_str: &str) -> Result<Self> {
        Ok(serde_json::from_str(json_str)?)
    }

    /// Loads a job configuration from a YAML string
    pub fn from_yaml(yaml_str: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml_str)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Checks every setting that can be checked without opening the input file
    pub fn validate(&self) -> Result<()> {
        if self.input.trim().is_empty() {
            return Err(Nc2ShetranError::Config("Input path is empty".to_string()));
        }
        if self.output.trim().is_empty() {
            return Err(Nc2ShetranError::Config("Output path is empty".to_string()));
        }
        if self.variable.trim().is_empty() {
            return Err(Nc2ShetranError::Config("Variable name is empty".to_string()));
        }
        if !self.unit_conversion.is_finite() || self.unit_conversion == 0.0 {
            return Err(Nc2ShetranError::Config(format!(
                "Unit conversion factor must be finite and non-zero, got {}",
                self.unit_conversion
            )));
        }
        self.time_window.to_window()?;
        self.selection.to_selector()?;
        self.format.validate()?;
        if let Some(cell_map) = self.cell_map_path()
            && Path::new(&cell_map) == Path::new(&self.output)
        {
            return Err(Nc2ShetranError::Config(format!(
                "Cell map path {} would overwrite the output table",
                cell_map
            )));
        }
        if let Some(download) = &self.download {
            download.validate()?;
        }
        Ok(())
    }

    /// Parsed time window
    pub fn time_window(&self) -> Result<TimeWindow> {
        self.time_window.to_window()
    }

    /// Path of the cell-ID map, written only for map selections.
    ///
    /// Defaults to the output path with an `.asc` extension, or `<stem>_cells.asc`
    /// when the output itself already ends in `.asc`.
    pub fn cell_map_path(&self) -> Option<String> {
        if !self.selection.is_map() {
            return None;
        }
        if let Some(path) = &self.cell_map {
            return Some(path.clone());
        }
        let output = Path::new(&self.output);
        let is_asc = output
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("asc"));
        let path = if is_asc {
            let stem = output.file_stem().unwrap_or_default().to_string_lossy();
            output.with_file_name(format!("{}_cells.asc", stem))
        } else {
            output.with_extension("asc")
        };
        Some(path.to_string_lossy().to_string())
    }
}

/// Ready-made configurations printed by the `template` command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    /// Full-grid conversion of a local file
    Basic,
    /// Bounding-box map conversion with a cell-ID map
    Map,
    /// Single-cell time series with diagnostic plots
    SingleCell,
    /// CDS download followed by a map conversion
    Era5Download,
}

impl Template {
    pub fn config(&self) -> JobConfig {
        let essequibo = BoundingBox {
            north: 8.21,
            south: 1.09,
            east: -57.67,
            west: -62.94,
        };
        let base = JobConfig::new(
            "evaporation_Essequibo_years2000-2021_hours00.nc",
            EvaporationVariable::TotalEvaporation.short_name(),
            "total_evaporation_Essequibo_cells.csv",
        );
        match self {
            Template::Basic => base,
            Template::Map => JobConfig {
                time_window: TimeWindowConfig {
                    start: Some("2000-01-01 00:00:00".to_string()),
                    end: Some("2010-01-01 00:00:00".to_string()),
                },
                selection: SelectionConfig::BoundingBox { params: essequibo },
                ..base
            },
            Template::SingleCell => JobConfig {
                output: "total_evaporation_Essequibo_series.csv".to_string(),
                selection: SelectionConfig::Cell {
                    params: CellParams {
                        lat_index: 0,
                        lon_index: 0,
                    },
                },
                plot: Some(PlotConfig::default()),
                ..base
            },
            Template::Era5Download => JobConfig {
                selection: SelectionConfig::BoundingBox { params: essequibo },
                download: Some(DownloadConfig::for_area(essequibo, (2000..=2021).collect())),
                ..base
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let json = r#"{ "input": "a.nc", "variable": "e", "output": "a.csv" }"#;
        let config = JobConfig::from_json(json).unwrap();
        assert_eq!(config.unit_conversion, 1000.0);
        assert_eq!(config.coordinates, CoordinateNames::default());
        assert_eq!(config.selection, SelectionConfig::FullGrid);
        assert!(config.plot.is_none());
        assert!(config.download.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_config() {
        let yaml = r#"
input: era5.nc
variable: pev
output: pet.csv
unit_conversion: -1000.0
time_window:
  start: "2000-01-01 00:00:00"
  end: "2000-12-31 00:00:00"
selection:
  kind: bounding_box
  params:
    north: 8.21
    south: 1.09
    east: -57.67
    west: -62.94
"#;
        let config = JobConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.variable, "pev");
        assert_eq!(config.unit_conversion, -1000.0);
        assert_eq!(config.selection.kind(), "bounding_box");
        assert!(config.selection.is_map());
        let window = config.time_window().unwrap();
        assert!(window.start.is_some() && window.end.is_some());
        assert_eq!(config.cell_map_path().as_deref(), Some("pet.asc"));
    }

    #[test]
    fn test_validation_failures() {
        let mut config = JobConfig::new("a.nc", "e", "a.csv");
        config.unit_conversion = 0.0;
        assert!(config.validate().is_err());

        let mut config = JobConfig::new("a.nc", "", "a.csv");
        assert!(config.validate().is_err());
        config.variable = "e".to_string();
        config.time_window.start = Some("2001-01-01".to_string());
        config.time_window.end = Some("2000-01-01".to_string());
        assert!(matches!(
            config.validate(),
            Err(Nc2ShetranError::InvalidTimeWindow { .. })
        ));

        let mut config = JobConfig::new("a.nc", "e", "a.csv");
        config.selection = SelectionConfig::BoundingBox {
            params: BoundingBox {
                north: 1.0,
                south: 8.0,
                east: -57.0,
                west: -62.0,
            },
        };
        assert!(matches!(
            config.validate(),
            Err(Nc2ShetranError::InvalidBoundingBox(_))
        ));

        let mut config = JobConfig::new("a.nc", "e", "a.csv");
        config.selection = SelectionConfig::Point {
            params: PointParams {
                latitude: 1.0,
                longitude: 1.0,
                tolerance: 0.0,
            },
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_point_with_nan_coordinate_is_rejected() {
        let yaml = r#"
input: era5.nc
variable: e
output: point.csv
selection:
  kind: point
  params: { latitude: 5.0, longitude: .nan, tolerance: 0.1 }
"#;
        let config = JobConfig::from_yaml(yaml).unwrap();
        assert!(matches!(config.validate(), Err(Nc2ShetranError::Config(_))));
    }

    #[test]
    fn test_cell_map_never_replaces_asc_output() {
        let config = JobConfig::new("era5.nc", "e", "out/evap.asc");
        assert_eq!(config.cell_map_path().as_deref(), Some("out/evap_cells.asc"));
        assert!(config.validate().is_ok());

        let config = JobConfig {
            cell_map: Some("out/evap.asc".to_string()),
            ..config
        };
        assert!(matches!(config.validate(), Err(Nc2ShetranError::Config(_))));
    }

    #[test]
    fn test_single_cell_has_no_cell_map() {
        let config = Template::SingleCell.config();
        assert!(!config.selection.is_map());
        assert!(config.cell_map_path().is_none());
    }

    #[test]
    fn test_templates_round_trip_and_validate() {
        for template in [
            Template::Basic,
            Template::Map,
            Template::SingleCell,
            Template::Era5Download,
        ] {
            let config = template.config();
            assert!(config.validate().is_ok(), "{:?} template is invalid", template);

            let json = config.to_json().unwrap();
            let from_json = JobConfig::from_json(&json).unwrap();
            assert_eq!(from_json.selection, config.selection);

            let yaml = config.to_yaml().unwrap();
            let from_yaml = JobConfig::from_yaml(&yaml).unwrap();
            assert_eq!(from_yaml.variable, config.variable);
        }
    }

    #[test]
    fn test_invalid_selection_kind() {
        let json = r#"{ "input": "a.nc", "variable": "e", "output": "a.csv",
                        "selection": { "kind": "polygon", "params": {} } }"#;
        assert!(JobConfig::from_json(json).is_err());
    }
}
