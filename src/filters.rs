//! # Spatial Selection
//!
//! Selectors turn a user request (one cell, the cell nearest a coordinate, a
//! bounding box or the whole grid) into the ordered list of grid cells the
//! converter writes as table columns.
//!
//! Cells are numbered from 1, row by row from the north-west corner, which is
//! the numbering the SHETRAN cell-ID map uses.

use crate::error::{Nc2ShetranError, Result};
use log::debug;
use serde::{Deserialize, Serialize};

/// Absolute tolerance used when comparing coordinates stored as `f32`
const COORD_EPSILON: f64 = 1e-4;

/// One-dimensional latitude and longitude axes of a rectilinear grid
#[derive(Debug, Clone, PartialEq)]
pub struct GridCoordinates {
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
}

impl GridCoordinates {
    pub fn new(latitudes: Vec<f64>, longitudes: Vec<f64>) -> Self {
        Self {
            latitudes,
            longitudes,
        }
    }

    pub fn n_lat(&self) -> usize {
        self.latitudes.len()
    }

    pub fn n_lon(&self) -> usize {
        self.longitudes.len()
    }

    /// Whether the dataset stores longitudes in `[0, 360)` rather than `[-180, 180]`
    pub fn uses_0_360(&self) -> bool {
        self.longitudes.iter().any(|&lon| lon > 180.0 + COORD_EPSILON)
    }

    /// Maps a longitude into the dataset's convention
    pub fn normalize_longitude(&self, lon: f64) -> f64 {
        if self.uses_0_360() {
            if lon < 0.0 { lon + 360.0 } else { lon }
        } else if lon > 180.0 {
            lon - 360.0
        } else {
            lon
        }
    }

    /// Grid spacing in degrees, taken from the first two points of each axis
    pub fn resolution(&self) -> Option<f64> {
        let step = |axis: &[f64]| {
            if axis.len() >= 2 {
                Some((axis[1] - axis[0]).abs())
            } else {
                None
            }
        };
        step(&self.longitudes).or_else(|| step(&self.latitudes))
    }

    fn cell(&self, id: usize, lat_index: usize, lon_index: usize) -> GridCell {
        GridCell {
            id,
            lat_index,
            lon_index,
            latitude: self.latitudes[lat_index],
            longitude: self.longitudes[lon_index],
        }
    }

    /// Builds the selection of every cell in the given inclusive index ranges,
    /// ordered north to south and west to east
    fn rectangle(&self, lat_range: (usize, usize), lon_range: (usize, usize)) -> Selection {
        let mut lat_indices: Vec<usize> = (lat_range.0..=lat_range.1).collect();
        lat_indices.sort_by(|&a, &b| self.latitudes[b].total_cmp(&self.latitudes[a]));
        let mut lon_indices: Vec<usize> = (lon_range.0..=lon_range.1).collect();
        lon_indices.sort_by(|&a, &b| self.longitudes[a].total_cmp(&self.longitudes[b]));

        let mut cells = Vec::with_capacity(lat_indices.len() * lon_indices.len());
        for &i in &lat_indices {
            for &j in &lon_indices {
                cells.push(self.cell(cells.len() + 1, i, j));
            }
        }

        Selection {
            cells,
            lat_range,
            lon_range,
            n_rows: lat_indices.len(),
            n_cols: lon_indices.len(),
            is_map: true,
        }
    }
}

/// A grid cell picked by a selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridCell {
    /// 1-based cell number used as the table column name
    pub id: usize,
    pub lat_index: usize,
    pub lon_index: usize,
    pub latitude: f64,
    pub longitude: f64,
}

/// Ordered cells plus the index window that covers them
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub cells: Vec<GridCell>,
    /// Inclusive latitude index range covering every cell
    pub lat_range: (usize, usize),
    /// Inclusive longitude index range covering every cell
    pub lon_range: (usize, usize),
    pub n_rows: usize,
    pub n_cols: usize,
    /// Whether the cells form a map rather than a single series
    pub is_map: bool,
}

impl Selection {
    fn single(cell: GridCell) -> Self {
        Self {
            lat_range: (cell.lat_index, cell.lat_index),
            lon_range: (cell.lon_index, cell.lon_index),
            cells: vec![cell],
            n_rows: 1,
            n_cols: 1,
            is_map: false,
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

pub trait GridSelector {
    fn select(&self, grid: &GridCoordinates) -> Result<Selection>;

    fn kind(&self) -> &'static str;
}

/// Selects one cell by its array indices
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellIndexSelector {
    pub lat_index: usize,
    pub lon_index: usize,
}

impl CellIndexSelector {
    pub fn new(lat_index: usize, lon_index: usize) -> Self {
        CellIndexSelector {
            lat_index,
            lon_index,
        }
    }
}

impl GridSelector for CellIndexSelector {
    fn select(&self, grid: &GridCoordinates) -> Result<Selection> {
        if self.lat_index >= grid.n_lat() || self.lon_index >= grid.n_lon() {
            return Err(Nc2ShetranError::CellOutOfRange {
                lat_index: self.lat_index,
                lon_index: self.lon_index,
                n_lat: grid.n_lat(),
                n_lon: grid.n_lon(),
            });
        }
        Ok(Selection::single(grid.cell(1, self.lat_index, self.lon_index)))
    }

    fn kind(&self) -> &'static str {
        "cell"
    }
}

/// Selects the grid point nearest to a coordinate, within a tolerance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestPointSelector {
    pub latitude: f64,
    pub longitude: f64,
    pub tolerance: f64,
}

impl NearestPointSelector {
    pub fn new(latitude: f64, longitude: f64, tolerance: f64) -> Self {
        NearestPointSelector {
            latitude,
            longitude,
            tolerance,
        }
    }
}

fn nearest_index(axis: &[f64], target: f64) -> Option<(usize, f64)> {
    axis.iter()
        .enumerate()
        .map(|(i, &v)| (i, (v - target).abs()))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

impl GridSelector for NearestPointSelector {
    fn select(&self, grid: &GridCoordinates) -> Result<Selection> {
        let not_found = || Nc2ShetranError::PointNotFound {
            latitude: self.latitude,
            longitude: self.longitude,
            tolerance: self.tolerance,
        };
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(not_found());
        }
        let longitude = grid.normalize_longitude(self.longitude);

        let (i, lat_distance) = nearest_index(&grid.latitudes, self.latitude).ok_or_else(not_found)?;
        let (j, lon_distance) = nearest_index(&grid.longitudes, longitude).ok_or_else(not_found)?;
        if lat_distance > self.tolerance + COORD_EPSILON || lon_distance > self.tolerance + COORD_EPSILON {
            return Err(not_found());
        }

        debug!(
            "Nearest grid point to ({}, {}) is index ({}, {})",
            self.latitude, self.longitude, i, j
        );
        Ok(Selection::single(grid.cell(1, i, j)))
    }

    fn kind(&self) -> &'static str {
        "point"
    }
}

/// Geographic bounding box in degrees.
///
/// `north > south` and `east > west` are required. Longitudes may be given in
/// either the `[-180, 180]` or the `[0, 360]` convention; they are mapped to
/// the dataset's convention before cells are selected, and a box that would
/// straddle the dataset's longitude seam is rejected.
///
/// ```rust
/// use nc2shetran::filters::BoundingBox;
///
/// let essequibo = BoundingBox { north: 8.21, south: 1.09, east: -57.67, west: -62.94 };
/// assert!(essequibo.validate().is_ok());
///
/// let swapped = BoundingBox { north: 8.21, south: 1.09, east: -62.94, west: -57.67 };
/// assert!(swapped.validate().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BoundingBox {
    pub fn validate(&self) -> Result<()> {
        let bounds = [self.north, self.south, self.east, self.west];
        if bounds.iter().any(|v| !v.is_finite()) {
            return Err(Nc2ShetranError::InvalidBoundingBox(
                "bounds must be finite".to_string(),
            ));
        }
        if self.north <= self.south {
            return Err(Nc2ShetranError::InvalidBoundingBox(format!(
                "north ({}) must be greater than south ({})",
                self.north, self.south
            )));
        }
        if self.east <= self.west {
            return Err(Nc2ShetranError::InvalidBoundingBox(format!(
                "east ({}) must be greater than west ({}); western longitudes are negative in the [-180, 180] convention",
                self.east, self.west
            )));
        }
        if self.north > 90.0 || self.south < -90.0 {
            return Err(Nc2ShetranError::InvalidBoundingBox(format!(
                "latitudes must lie within [-90, 90], got north {} and south {}",
                self.north, self.south
            )));
        }
        if self.west < -180.0 || self.east > 360.0 {
            return Err(Nc2ShetranError::InvalidBoundingBox(format!(
                "longitudes must lie within [-180, 360], got west {} and east {}",
                self.west, self.east
            )));
        }
        Ok(())
    }

    /// The CDS `area` order: north, west, south, east
    pub fn to_cds_area(&self) -> [f64; 4] {
        [self.north, self.west, self.south, self.east]
    }
}

fn matching_range(axis: &[f64], low: f64, high: f64) -> Option<(usize, usize)> {
    let matches: Vec<usize> = axis
        .iter()
        .enumerate()
        .filter(|(_, v)| **v >= low - COORD_EPSILON && **v <= high + COORD_EPSILON)
        .map(|(idx, _)| idx)
        .collect();
    Some((*matches.first()?, *matches.last()?))
}

impl GridSelector for BoundingBox {
    fn select(&self, grid: &GridCoordinates) -> Result<Selection> {
        self.validate()?;

        let west = grid.normalize_longitude(self.west);
        let east = grid.normalize_longitude(self.east);
        if west > east {
            return Err(Nc2ShetranError::InvalidBoundingBox(format!(
                "box from {} to {} crosses the dataset's longitude seam",
                self.west, self.east
            )));
        }

        let lat_range = matching_range(&grid.latitudes, self.south, self.north).ok_or_else(|| {
            Nc2ShetranError::EmptySelection(format!(
                "no latitude between {} and {}",
                self.south, self.north
            ))
        })?;
        let lon_range = matching_range(&grid.longitudes, west, east).ok_or_else(|| {
            Nc2ShetranError::EmptySelection(format!("no longitude between {} and {}", west, east))
        })?;

        let selection = grid.rectangle(lat_range, lon_range);
        debug!(
            "Bounding box selected {} cells ({} rows x {} columns)",
            selection.len(),
            selection.n_rows,
            selection.n_cols
        );
        Ok(selection)
    }

    fn kind(&self) -> &'static str {
        "bounding_box"
    }
}

/// Selects every cell of the grid
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FullGridSelector;

impl GridSelector for FullGridSelector {
    fn select(&self, grid: &GridCoordinates) -> Result<Selection> {
        if grid.n_lat() == 0 || grid.n_lon() == 0 {
            return Err(Nc2ShetranError::EmptySelection("grid has no cells".to_string()));
        }
        Ok(grid.rectangle((0, grid.n_lat() - 1), (0, grid.n_lon() - 1)))
    }

    fn kind(&self) -> &'static str {
        "full_grid"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 0.1 degree grid stored north to south, like ERA5
    fn era5_like_grid() -> GridCoordinates {
        let latitudes = (0..5).map(|i| 8.2 - i as f64 * 0.1).collect();
        let longitudes = (0..4).map(|j| -60.0 + j as f64 * 0.1).collect();
        GridCoordinates::new(latitudes, longitudes)
    }

    #[test]
    fn test_cell_index_selector() {
        let grid = era5_like_grid();
        let selection = CellIndexSelector::new(2, 3).select(&grid).unwrap();
        assert_eq!(selection.len(), 1);
        assert!(!selection.is_map);
        let cell = selection.cells[0];
        assert_eq!((cell.id, cell.lat_index, cell.lon_index), (1, 2, 3));
        assert!((cell.latitude - 8.0).abs() < 1e-9);

        let err = CellIndexSelector::new(5, 0).select(&grid).unwrap_err();
        assert!(err.is_index_error());
        assert!(CellIndexSelector::new(0, 4).select(&grid).is_err());
    }

    #[test]
    fn test_nearest_point_selector() {
        let grid = era5_like_grid();
        let selection = NearestPointSelector::new(8.04, -59.81, 0.05).select(&grid).unwrap();
        let cell = selection.cells[0];
        assert_eq!((cell.lat_index, cell.lon_index), (2, 2));

        let err = NearestPointSelector::new(20.0, -59.8, 0.05).select(&grid).unwrap_err();
        assert!(err.is_lookup_error());
    }

    #[test]
    fn test_nearest_point_rejects_nan_coordinates() {
        let grid = era5_like_grid();
        for (lat, lon) in [(8.04, f64::NAN), (f64::NAN, -59.81), (8.04, f64::INFINITY)] {
            let err = NearestPointSelector::new(lat, lon, 0.05).select(&grid).unwrap_err();
            assert!(matches!(err, Nc2ShetranError::PointNotFound { .. }));
        }
    }

    #[test]
    fn test_bounding_box_orders_cells_north_west_first() {
        let grid = era5_like_grid();
        let bbox = BoundingBox {
            north: 8.15,
            south: 7.95,
            east: -59.85,
            west: -60.05,
        };
        let selection = bbox.select(&grid).unwrap();
        assert!(selection.is_map);
        assert_eq!(selection.n_rows, 2);
        assert_eq!(selection.n_cols, 2);
        assert_eq!(selection.lat_range, (1, 2));
        assert_eq!(selection.lon_range, (0, 1));

        let ids: Vec<usize> = selection.cells.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        // First cell is the north-west corner
        assert_eq!((selection.cells[0].lat_index, selection.cells[0].lon_index), (1, 0));
        assert_eq!((selection.cells[3].lat_index, selection.cells[3].lon_index), (2, 1));
    }

    #[test]
    fn test_bounding_box_edges_are_inclusive_for_f32_coordinates() {
        let latitudes = vec![8.2f32 as f64, 8.1f32 as f64];
        let longitudes = vec![-60.0f32 as f64, -59.9f32 as f64];
        let grid = GridCoordinates::new(latitudes, longitudes);
        let bbox = BoundingBox {
            north: 8.2,
            south: 8.1,
            east: -59.9,
            west: -60.0,
        };
        assert_eq!(bbox.select(&grid).unwrap().len(), 4);
    }

    #[test]
    fn test_bounding_box_longitude_convention() {
        let latitudes = vec![1.0, 0.0];
        let longitudes = (0..3600).map(|j| j as f64 * 0.1).collect();
        let grid = GridCoordinates::new(latitudes, longitudes);
        assert!(grid.uses_0_360());

        let bbox = BoundingBox {
            north: 1.0,
            south: 0.0,
            east: -59.8,
            west: -60.0,
        };
        let selection = bbox.select(&grid).unwrap();
        assert_eq!(selection.n_cols, 3);
        assert!((selection.cells[0].longitude - 300.0).abs() < 1e-9);

        let seam = BoundingBox {
            north: 1.0,
            south: 0.0,
            east: 10.0,
            west: -10.0,
        };
        assert!(matches!(
            seam.select(&grid),
            Err(Nc2ShetranError::InvalidBoundingBox(_))
        ));
    }

    #[test]
    fn test_bounding_box_validation() {
        let valid = BoundingBox {
            north: 8.21,
            south: 1.09,
            east: -57.67,
            west: -62.94,
        };
        assert!(valid.validate().is_ok());
        assert_eq!(valid.to_cds_area(), [8.21, -62.94, 1.09, -57.67]);

        let inverted_lat = BoundingBox { north: 1.0, south: 2.0, ..valid };
        assert!(inverted_lat.validate().is_err());
        let swapped_lon = BoundingBox { east: -62.94, west: -57.67, ..valid };
        assert!(swapped_lon.validate().is_err());
        let out_of_range = BoundingBox { north: 91.0, ..valid };
        assert!(out_of_range.validate().is_err());
        let nan = BoundingBox { west: f64::NAN, ..valid };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_bounding_box_outside_grid_is_empty() {
        let grid = era5_like_grid();
        let bbox = BoundingBox {
            north: -10.0,
            south: -20.0,
            east: -59.0,
            west: -61.0,
        };
        assert!(matches!(
            bbox.select(&grid),
            Err(Nc2ShetranError::EmptySelection(_))
        ));
    }

    #[test]
    fn test_full_grid_selector() {
        let grid = era5_like_grid();
        let selection = FullGridSelector.select(&grid).unwrap();
        assert_eq!(selection.len(), 20);
        assert_eq!((selection.n_rows, selection.n_cols), (5, 4));
        assert_eq!(selection.cells.last().unwrap().id, 20);
        assert_eq!(FullGridSelector.kind(), "full_grid");
    }

    #[test]
    fn test_resolution() {
        let grid = era5_like_grid();
        assert!((grid.resolution().unwrap() - 0.1).abs() < 1e-9);
        assert_eq!(GridCoordinates::new(vec![0.0], vec![0.0]).resolution(), None);
    }
}
