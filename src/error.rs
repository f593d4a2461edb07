//! Error types shared by every stage of the conversion pipeline.

use chrono::NaiveDateTime;
use thiserror::Error;

/// Result type for nc2shetran operations
pub type Result<T> = std::result::Result<T, Nc2ShetranError>;

/// Errors that can occur while downloading, reading, converting or writing data
#[derive(Error, Debug)]
pub enum Nc2ShetranError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Variable '{name}' not found in NetCDF file (available: {})", available.join(", "))]
    VariableNotFound { name: String, available: Vec<String> },

    #[error("Timestamp {0} is not present in the time axis")]
    TimestampNotFound(NaiveDateTime),

    #[error("Cell (lat index {lat_index}, lon index {lon_index}) is outside the {n_lat}x{n_lon} grid")]
    CellOutOfRange {
        lat_index: usize,
        lon_index: usize,
        n_lat: usize,
        n_lon: usize,
    },

    #[error("No grid point within {tolerance} degrees of ({latitude}, {longitude})")]
    PointNotFound {
        latitude: f64,
        longitude: f64,
        tolerance: f64,
    },

    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    #[error("Selection does not contain any grid cell: {0}")]
    EmptySelection(String),

    #[error("Invalid time units '{0}'")]
    InvalidTimeUnits(String),

    #[error("Unsupported calendar '{0}'")]
    UnsupportedCalendar(String),

    #[error("Time axis is not strictly increasing at index {index}")]
    NonMonotonicTime { index: usize },

    #[error("Invalid time window: start {start} is after end {end}")]
    InvalidTimeWindow {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("Invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("Variable '{variable}' has dimensions [{}], expected (time, latitude, longitude)", dimensions.join(", "))]
    UnexpectedShape {
        variable: String,
        dimensions: Vec<String>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("CDS credentials not found: set CDSAPI_URL and CDSAPI_KEY or create {0}")]
    CredentialsMissing(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Plotting failed: {0}")]
    Plot(String),
}

impl Nc2ShetranError {
    /// Whether the error reports a name that could not be looked up (variable, coordinate)
    pub fn is_key_error(&self) -> bool {
        matches!(self, Nc2ShetranError::VariableNotFound { .. })
    }

    /// Whether the error reports a value missing from an index (timestamp, nearest point)
    pub fn is_lookup_error(&self) -> bool {
        matches!(
            self,
            Nc2ShetranError::TimestampNotFound(_) | Nc2ShetranError::PointNotFound { .. }
        )
    }

    /// Whether the error reports an index beyond an array bound
    pub fn is_index_error(&self) -> bool {
        matches!(self, Nc2ShetranError::CellOutOfRange { .. })
    }
}
