//! # Gridded Dataset
//!
//! Thin wrapper over an open NetCDF file holding a `(time, latitude, longitude)`
//! time series. It resolves the coordinate axes once on open, looks variables
//! up by name and reads unpacked 3D slabs.
//!
//! CF packing is undone on read: values equal to `_FillValue` or
//! `missing_value` become `NaN`, everything else becomes
//! `raw * scale_factor + add_offset`.

use crate::error::{Nc2ShetranError, Result};
use crate::filters::{GridCoordinates, Selection};
use crate::input::CoordinateNames;
use crate::time::{DEFAULT_TIME_UNITS, IndexRange, TimeAxis, TimeUnits, check_calendar};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// Time coordinate used by recent CDS NetCDF files
const FALLBACK_TIME_NAME: &str = "valid_time";

/// An open NetCDF file with resolved coordinate axes
pub struct GriddedDataset {
    file: netcdf::File,
    path: PathBuf,
    names: CoordinateNames,
    coordinates: GridCoordinates,
    time_axis: TimeAxis,
}

impl std::fmt::Debug for GriddedDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GriddedDataset")
            .field("path", &self.path)
            .field("names", &self.names)
            .field("n_time", &self.time_axis.len())
            .field("n_lat", &self.coordinates.n_lat())
            .field("n_lon", &self.coordinates.n_lon())
            .finish()
    }
}

impl GriddedDataset {
    /// Opens a NetCDF file and resolves its time, latitude and longitude axes
    pub fn open<P: AsRef<Path>>(path: P, names: &CoordinateNames) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        debug!("Opening NetCDF file: {}", path.display());
        let file = netcdf::open(&path)?;

        let mut names = names.clone();
        if file.variable(&names.time).is_none() && file.variable(FALLBACK_TIME_NAME).is_some() {
            info!(
                "Time coordinate '{}' not found, using '{}'",
                names.time, FALLBACK_TIME_NAME
            );
            names.time = FALLBACK_TIME_NAME.to_string();
        }

        let latitudes = read_coordinate(&file, &names.latitude)?;
        let longitudes = read_coordinate(&file, &names.longitude)?;
        let time_axis = read_time_axis(&file, &names.time)?;

        info!(
            "Opened {}: {} time steps, {} latitudes, {} longitudes",
            path.display(),
            time_axis.len(),
            latitudes.len(),
            longitudes.len()
        );

        Ok(Self {
            file,
            path,
            names,
            coordinates: GridCoordinates::new(latitudes, longitudes),
            time_axis,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn coordinate_names(&self) -> &CoordinateNames {
        &self.names
    }

    pub fn coordinates(&self) -> &GridCoordinates {
        &self.coordinates
    }

    pub fn time_axis(&self) -> &TimeAxis {
        &self.time_axis
    }

    pub fn file(&self) -> &netcdf::File {
        &self.file
    }

    /// Names of every variable in the file
    pub fn variable_names(&self) -> Vec<String> {
        self.file.variables().map(|v| v.name().to_string()).collect()
    }

    /// Looks a variable up by name
    pub fn variable(&self, name: &str) -> Result<netcdf::Variable<'_>> {
        self.file
            .variable(name)
            .ok_or_else(|| Nc2ShetranError::VariableNotFound {
                name: name.to_string(),
                available: self.variable_names(),
            })
    }

    /// Checks that a variable is laid out as `(time, latitude, longitude)`
    pub fn check_layout(&self, name: &str) -> Result<()> {
        let var = self.variable(name)?;
        let dimensions: Vec<String> = var
            .dimensions()
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        let expected = [&self.names.time, &self.names.latitude, &self.names.longitude];
        if dimensions.len() != 3 || dimensions.iter().zip(expected).any(|(d, e)| d != e) {
            return Err(Nc2ShetranError::UnexpectedShape {
                variable: name.to_string(),
                dimensions,
            });
        }
        Ok(())
    }

    /// Reads the unpacked values of `name` over a time range and the index
    /// window of a selection
    pub fn read_slab(&self, name: &str, time: IndexRange, selection: &Selection) -> Result<Slab> {
        self.read_window(name, time, selection.lat_range, selection.lon_range)
    }

    /// Reads the unpacked values of `name` over inclusive time, latitude and
    /// longitude index ranges
    pub fn read_window(
        &self,
        name: &str,
        time: IndexRange,
        lat_range: (usize, usize),
        lon_range: (usize, usize),
    ) -> Result<Slab> {
        self.check_layout(name)?;
        let var = self.variable(name)?;

        let n_time = time.len();
        let n_lat = lat_range.1 - lat_range.0 + 1;
        let n_lon = lon_range.1 - lon_range.0 + 1;
        debug!(
            "Reading '{}' over time {}..={}, lat {}..={}, lon {}..={}",
            name, time.start, time.end, lat_range.0, lat_range.1, lon_range.0, lon_range.1
        );

        let raw = var.get_values::<f64, _>((
            time.start..time.end + 1,
            lat_range.0..lat_range.1 + 1,
            lon_range.0..lon_range.1 + 1,
        ))?;
        let packing = Packing::from_variable(&var);
        let values = raw.into_iter().map(|v| packing.unpack(v)).collect();

        Ok(Slab {
            values,
            n_time,
            n_lat,
            n_lon,
            time_offset: time.start,
            lat_offset: lat_range.0,
            lon_offset: lon_range.0,
        })
    }

    /// Units attribute of a variable, if present
    pub fn units(&self, name: &str) -> Option<String> {
        let var = self.file.variable(name)?;
        attr_string(&var, "units")
    }

    /// Releases the underlying file handle
    pub fn close(self) -> Result<()> {
        debug!("Closing NetCDF file: {}", self.path.display());
        self.file.close()?;
        Ok(())
    }
}

/// Unpacked values in `(time, latitude, longitude)` order, addressed with
/// absolute file indices
#[derive(Debug, Clone, PartialEq)]
pub struct Slab {
    pub values: Vec<f64>,
    pub n_time: usize,
    pub n_lat: usize,
    pub n_lon: usize,
    pub time_offset: usize,
    pub lat_offset: usize,
    pub lon_offset: usize,
}

impl Slab {
    /// Value at absolute file indices; `NaN` marks missing data
    pub fn value(&self, time_index: usize, lat_index: usize, lon_index: usize) -> Option<f64> {
        let t = time_index.checked_sub(self.time_offset)?;
        let i = lat_index.checked_sub(self.lat_offset)?;
        let j = lon_index.checked_sub(self.lon_offset)?;
        if t >= self.n_time || i >= self.n_lat || j >= self.n_lon {
            return None;
        }
        self.values.get((t * self.n_lat + i) * self.n_lon + j).copied()
    }

    /// All time steps of one cell
    pub fn series(&self, lat_index: usize, lon_index: usize) -> Vec<f64> {
        (self.time_offset..self.time_offset + self.n_time)
            .map(|t| self.value(t, lat_index, lon_index).unwrap_or(f64::NAN))
            .collect()
    }
}

/// CF packing attributes of a variable
#[derive(Debug, Clone, PartialEq)]
pub struct Packing {
    pub scale_factor: f64,
    pub add_offset: f64,
    pub fill_values: Vec<f64>,
}

impl Default for Packing {
    fn default() -> Self {
        Self {
            scale_factor: 1.0,
            add_offset: 0.0,
            fill_values: Vec::new(),
        }
    }
}

impl Packing {
    pub fn from_variable(var: &netcdf::Variable) -> Self {
        let fill_values = ["_FillValue", "missing_value"]
            .iter()
            .filter_map(|name| attr_f64(var, name))
            .collect();
        Self {
            scale_factor: attr_f64(var, "scale_factor").unwrap_or(1.0),
            add_offset: attr_f64(var, "add_offset").unwrap_or(0.0),
            fill_values,
        }
    }

    pub fn unpack(&self, raw: f64) -> f64 {
        if raw.is_nan() || self.fill_values.contains(&raw) {
            f64::NAN
        } else {
            raw * self.scale_factor + self.add_offset
        }
    }
}

fn read_coordinate(file: &netcdf::File, name: &str) -> Result<Vec<f64>> {
    let var = file
        .variable(name)
        .ok_or_else(|| Nc2ShetranError::VariableNotFound {
            name: name.to_string(),
            available: file.variables().map(|v| v.name().to_string()).collect(),
        })?;
    let packing = Packing::from_variable(&var);
    let values = var.get_values::<f64, _>(..)?;
    Ok(values.into_iter().map(|v| packing.unpack(v)).collect())
}

fn read_time_axis(file: &netcdf::File, name: &str) -> Result<TimeAxis> {
    let var = file
        .variable(name)
        .ok_or_else(|| Nc2ShetranError::VariableNotFound {
            name: name.to_string(),
            available: file.variables().map(|v| v.name().to_string()).collect(),
        })?;

    let units = match attr_string(&var, "units") {
        Some(units) => TimeUnits::parse(&units)?,
        None => {
            warn!(
                "Time coordinate '{}' has no units attribute, assuming '{}'",
                name, DEFAULT_TIME_UNITS
            );
            TimeUnits::default()
        }
    };
    if let Some(calendar) = attr_string(&var, "calendar") {
        check_calendar(&calendar)?;
    }

    let offsets = var.get_values::<f64, _>(..)?;
    TimeAxis::from_offsets(&units, &offsets)
}

/// Check if a variable has an attribute with the given name
fn has_attr(var: &netcdf::Variable, name: &str) -> bool {
    var.attributes().any(|attr| attr.name() == name)
}

fn attr_f64(var: &netcdf::Variable, name: &str) -> Option<f64> {
    if !has_attr(var, name) {
        return None;
    }
    let attr_value = var.attribute_value(name)?.ok()?;
    f64::try_from(attr_value).ok()
}

fn attr_string(var: &netcdf::Variable, name: &str) -> Option<String> {
    if !has_attr(var, name) {
        return None;
    }
    match var.attribute_value(name)?.ok()? {
        netcdf::AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}
