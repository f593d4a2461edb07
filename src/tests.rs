use crate::error::Nc2ShetranError;
use crate::extract::*;
use crate::filters::*;
use crate::input::*;
use crate::plot::PlotConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{TempDir, tempdir};

/// 2000-01-01 00:00:00 as hours since 1900-01-01
const FIRST_OFFSET: f64 = 876576.0;
const N_TIME: usize = 4;
const LATITUDES: [f64; 3] = [8.2, 8.1, 8.0];
const LONGITUDES: [f64; 2] = [-60.0, -59.9];
const FILL: f64 = -32767.0;

/// Total evaporation in metres: `(t * 100 + i * 10 + j + 1) / 10000`, so one
/// step of cell (i, j) scaled by 1000 reads `t*10 + i + (j+1)/10` millimetres
fn evaporation_value(t: usize, i: usize, j: usize) -> f64 {
    (t * 100 + i * 10 + j + 1) as f64 / 10_000.0
}

/// Writes a small ERA5-shaped file: `e` (time, latitude, longitude) as f64 with
/// a fill value at t=1 of the north-west cell, `pev` packed as i16, and a 2-D
/// land-sea mask `lsm`
fn create_era5_fixture(dir: &Path, time_name: &str) -> PathBuf {
    let path = dir.join(format!("era5_{}.nc", time_name));
    let mut file = netcdf::create(&path).unwrap();
    file.add_dimension(time_name, N_TIME).unwrap();
    file.add_dimension("latitude", LATITUDES.len()).unwrap();
    file.add_dimension("longitude", LONGITUDES.len()).unwrap();

    let times: Vec<f64> = (0..N_TIME).map(|t| FIRST_OFFSET + t as f64).collect();
    let mut time = file.add_variable::<f64>(time_name, &[time_name]).unwrap();
    time.put_attribute("units", "hours since 1900-01-01 00:00:00.0").unwrap();
    time.put_attribute("calendar", "gregorian").unwrap();
    time.put_values(&times, ..).unwrap();

    let mut lat = file.add_variable::<f64>("latitude", &["latitude"]).unwrap();
    lat.put_attribute("units", "degrees_north").unwrap();
    lat.put_values(&LATITUDES, ..).unwrap();

    let mut lon = file.add_variable::<f64>("longitude", &["longitude"]).unwrap();
    lon.put_attribute("units", "degrees_east").unwrap();
    lon.put_values(&LONGITUDES, ..).unwrap();

    let dims = [time_name, "latitude", "longitude"];
    let mut values = Vec::with_capacity(N_TIME * LATITUDES.len() * LONGITUDES.len());
    for t in 0..N_TIME {
        for i in 0..LATITUDES.len() {
            for j in 0..LONGITUDES.len() {
                values.push(if (t, i, j) == (1, 0, 0) {
                    FILL
                } else {
                    evaporation_value(t, i, j)
                });
            }
        }
    }
    let mut e = file.add_variable::<f64>("e", &dims).unwrap();
    e.put_attribute("_FillValue", FILL).unwrap();
    e.put_attribute("units", "m of water equivalent").unwrap();
    e.put_values(&values, ..).unwrap();

    // raw (t+1)*100 with scale 0.0001 reads 0.01 * (t+1) metres
    let packed: Vec<i16> = (0..N_TIME)
        .flat_map(|t| std::iter::repeat_n(((t + 1) * 100) as i16, LATITUDES.len() * LONGITUDES.len()))
        .collect();
    let mut pev = file.add_variable::<i16>("pev", &dims).unwrap();
    pev.put_attribute("_FillValue", -32767i16).unwrap();
    pev.put_attribute("scale_factor", 0.0001f64).unwrap();
    pev.put_attribute("add_offset", 0.0f64).unwrap();
    pev.put_values(&packed, ..).unwrap();

    let mut lsm = file.add_variable::<f64>("lsm", &["latitude", "longitude"]).unwrap();
    lsm.put_values(&[1.0; 6], ..).unwrap();

    path
}

struct Fixture {
    dir: TempDir,
    input: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        let input = create_era5_fixture(dir.path(), "time");
        Self { dir, input }
    }

    fn path(&self, name: &str) -> String {
        self.dir.path().join(name).to_string_lossy().to_string()
    }

    fn config(&self, output: &str) -> JobConfig {
        JobConfig::new(&self.input.to_string_lossy(), "e", &self.path(output))
    }
}

fn read_lines(path: &str) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| l.to_string())
        .collect()
}

#[cfg(test)]
mod pipeline_tests {
    use super::*;
    use crate::process_job;

    #[test]
    fn test_map_conversion_writes_table_and_cell_map() {
        let fixture = Fixture::new();
        let config = JobConfig {
            time_window: TimeWindowConfig {
                start: Some("2000-01-01 01:00:00".to_string()),
                end: Some("2000-01-01 03:00:00".to_string()),
            },
            selection: SelectionConfig::BoundingBox {
                params: BoundingBox {
                    north: 8.25,
                    south: 8.05,
                    east: -59.85,
                    west: -60.05,
                },
            },
            ..fixture.config("evaporation.csv")
        };

        let summary = process_job(&config).unwrap();
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.cells, 4);
        assert_eq!(summary.first_timestamp, "2000-01-01 01:00:00");
        assert_eq!(summary.last_timestamp, "2000-01-01 03:00:00");
        assert!(summary.plots.is_empty());

        let lines = read_lines(&config.output);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "time,1,2,3,4");
        assert_eq!(
            lines[1],
            "2000-01-01 01:00:00,-999,10.200000,11.100000,11.200000"
        );
        assert_eq!(
            lines[3],
            "2000-01-01 03:00:00,30.100000,30.200000,31.100000,31.200000"
        );

        let cell_map = summary.cell_map.expect("map selections write a cell map");
        assert!(cell_map.ends_with("evaporation.asc"));
        let map_lines = read_lines(&cell_map);
        assert!(map_lines[0].starts_with("ncols"));
        assert!(map_lines[0].ends_with(" 2"));
        assert!(map_lines[1].ends_with(" 2"));
        assert_eq!(&map_lines[6..], ["1 2", "3 4"]);
    }

    #[test]
    fn test_single_cell_conversion_with_plots() {
        let fixture = Fixture::new();
        let config = JobConfig {
            selection: SelectionConfig::Cell {
                params: CellParams {
                    lat_index: 2,
                    lon_index: 1,
                },
            },
            plot: Some(PlotConfig {
                output_dir: fixture.path("plots"),
                lat_index: 2,
                lon_index: 1,
                width: 320,
                height: 240,
                labels: false,
                ..PlotConfig::default()
            }),
            ..fixture.config("series.csv")
        };

        let summary = process_job(&config).unwrap();
        assert_eq!(summary.rows, N_TIME);
        assert_eq!(summary.cells, 1);
        assert!(summary.cell_map.is_none());
        assert_eq!(summary.plots.len(), 2);
        assert!(summary.plots.iter().all(|p| p.exists()));

        let lines = read_lines(&config.output);
        assert_eq!(lines[0], "time,1");
        assert_eq!(lines[1], "2000-01-01 00:00:00,2.200000");
        assert_eq!(lines[4], "2000-01-01 03:00:00,32.200000");
    }

    #[test]
    fn test_point_selection_and_custom_format() {
        let fixture = Fixture::new();
        let mut config = JobConfig {
            selection: SelectionConfig::Point {
                params: PointParams {
                    latitude: 8.09,
                    longitude: -59.92,
                    tolerance: 0.05,
                },
            },
            ..fixture.config("point.txt")
        };
        config.format.delimiter = '\t';
        config.format.include_time = false;
        config.format.precision = Some(1);

        process_job(&config).unwrap();
        let lines = read_lines(&config.output);
        assert_eq!(lines, ["1", "1.2", "11.2", "21.2", "31.2"]);
    }

    #[test]
    fn test_packed_variable_is_unpacked() {
        let fixture = Fixture::new();
        let config = JobConfig {
            variable: "pev".to_string(),
            selection: SelectionConfig::Cell {
                params: CellParams {
                    lat_index: 0,
                    lon_index: 0,
                },
            },
            ..fixture.config("pev.csv")
        };

        process_job(&config).unwrap();
        let lines = read_lines(&config.output);
        assert_eq!(lines[1], "2000-01-01 00:00:00,10.000000");
        assert_eq!(lines[4], "2000-01-01 03:00:00,40.000000");
    }

    #[test]
    fn test_valid_time_coordinate_is_accepted() {
        let dir = tempdir().unwrap();
        let input = create_era5_fixture(dir.path(), "valid_time");
        let output = dir.path().join("out.csv").to_string_lossy().to_string();
        let config = JobConfig::new(&input.to_string_lossy(), "e", &output);

        let summary = process_job(&config).unwrap();
        assert_eq!(summary.rows, N_TIME);
        assert_eq!(summary.cells, 6);
        assert_eq!(summary.first_timestamp, "2000-01-01 00:00:00");
    }

    #[test]
    fn test_scaling_commutes_with_time_slicing() {
        let fixture = Fixture::new();
        let dataset = crate::grid::GriddedDataset::open(&fixture.input, &CoordinateNames::default())
            .unwrap();
        let selection = FullGridSelector.select(dataset.coordinates()).unwrap();
        let full = crate::time::IndexRange { start: 0, end: 3 };
        let window = crate::time::IndexRange { start: 1, end: 2 };

        let scaled_then_sliced = extract_table(&dataset, "e", full, &selection, 1000.0)
            .unwrap()
            .slice(1, 2);
        let sliced_then_scaled = extract_table(&dataset, "e", window, &selection, 1000.0).unwrap();
        assert!(scaled_then_sliced.equals_missing(&sliced_then_scaled));
        dataset.close().unwrap();
    }

    #[test]
    fn test_rerun_overwrites_output() {
        let fixture = Fixture::new();
        let config = fixture.config("again.csv");
        fs::write(&config.output, "stale").unwrap();

        process_job(&config).unwrap();
        let lines = read_lines(&config.output);
        assert_eq!(lines.len(), N_TIME + 1);
        assert!(lines[0].starts_with("time,1,2"));
    }

    #[test]
    fn test_asc_output_keeps_table_next_to_cell_map() {
        let fixture = Fixture::new();
        let config = fixture.config("evap.asc");
        assert_eq!(config.selection, SelectionConfig::FullGrid);

        let summary = process_job(&config).unwrap();
        let cell_map = summary.cell_map.expect("full grid writes a cell map");
        assert!(cell_map.ends_with("evap_cells.asc"));

        let lines = read_lines(&config.output);
        assert_eq!(lines.len(), N_TIME + 1);
        assert_eq!(lines[0], "time,1,2,3,4,5,6");
        assert!(read_lines(&cell_map)[0].starts_with("ncols"));
    }

    #[test]
    fn test_pipeline_converts_the_downloaded_file() {
        use crate::download::DownloadConfig;

        let fixture = Fixture::new();
        let area = BoundingBox {
            north: 8.25,
            south: 7.95,
            east: -59.85,
            west: -60.05,
        };
        let config = JobConfig {
            input: fixture.path("not_downloaded_here.nc"),
            download: Some(DownloadConfig {
                target: Some(fixture.input.to_string_lossy().to_string()),
                ..DownloadConfig::for_area(area, vec![2000])
            }),
            ..fixture.config("downloaded.csv")
        };

        // the target already exists, so the download itself is skipped
        let summary = tokio_test::block_on(crate::run_pipeline(&config, false)).unwrap();
        assert_eq!(summary.rows, N_TIME);
        assert_eq!(summary.cells, 6);
        assert!(!Path::new(&config.input).exists());
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;
    use crate::process_job;

    #[test]
    fn test_missing_variable_is_key_error() {
        let fixture = Fixture::new();
        let config = JobConfig {
            variable: "tp".to_string(),
            ..fixture.config("missing.csv")
        };
        let err = process_job(&config).unwrap_err();
        assert!(err.is_key_error());
        assert!(err.to_string().contains("'tp'"));
        assert!(!Path::new(&config.output).exists());
    }

    #[test]
    fn test_timestamp_off_axis_is_lookup_error() {
        let fixture = Fixture::new();
        let config = JobConfig {
            time_window: TimeWindowConfig {
                start: Some("2000-01-02 00:00:00".to_string()),
                end: None,
            },
            ..fixture.config("window.csv")
        };
        let err = process_job(&config).unwrap_err();
        assert!(err.is_lookup_error());
        assert!(!Path::new(&config.output).exists());
    }

    #[test]
    fn test_cell_outside_grid_is_index_error() {
        let fixture = Fixture::new();
        let config = JobConfig {
            selection: SelectionConfig::Cell {
                params: CellParams {
                    lat_index: 3,
                    lon_index: 0,
                },
            },
            ..fixture.config("cell.csv")
        };
        let err = process_job(&config).unwrap_err();
        assert!(err.is_index_error());
    }

    #[test]
    fn test_two_dimensional_variable_is_rejected() {
        let fixture = Fixture::new();
        let config = JobConfig {
            variable: "lsm".to_string(),
            ..fixture.config("lsm.csv")
        };
        assert!(matches!(
            process_job(&config),
            Err(Nc2ShetranError::UnexpectedShape { .. })
        ));
    }

    #[test]
    fn test_missing_input_file() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("absent.nc");
        let config = JobConfig::new(&input.to_string_lossy(), "e", "out.csv");
        assert!(process_job(&config).is_err());
    }
}

#[cfg(test)]
mod info_tests {
    use super::*;
    use crate::info::{format_variables_csv, get_netcdf_info};

    #[test]
    fn test_info_reports_time_coverage() {
        let fixture = Fixture::new();
        let info = get_netcdf_info(&fixture.input.to_string_lossy(), None, true).unwrap();

        assert_eq!(info.total_dimensions, 3);
        assert!(info.variables.iter().any(|v| v.name == "e"));
        let coverage = info.time_coverage.expect("time coordinate found");
        assert_eq!(coverage.variable, "time");
        assert_eq!(coverage.steps, N_TIME);
        assert_eq!(coverage.first.as_deref(), Some("2000-01-01 00:00:00"));
        assert_eq!(coverage.last.as_deref(), Some("2000-01-01 03:00:00"));
    }

    #[test]
    fn test_info_single_variable() {
        let fixture = Fixture::new();
        let info = get_netcdf_info(&fixture.input.to_string_lossy(), Some("e"), false).unwrap();
        assert_eq!(info.total_variables, 1);
        let e = &info.variables[0];
        assert_eq!(e.dimensions, ["time", "latitude", "longitude"]);
        assert_eq!(e.shape, [N_TIME, 3, 2]);
        assert!(e.attributes.contains_key("_FillValue"));
        assert!(info.global_attributes.is_empty());

        let csv = format_variables_csv(&info);
        assert!(csv.lines().any(|l| l.starts_with("e,")));
        assert!(csv.contains("\"time;latitude;longitude\""));

        let err = get_netcdf_info(&fixture.input.to_string_lossy(), Some("tp"), false).unwrap_err();
        assert!(err.is_key_error());
    }

    #[test]
    fn test_info_valid_time_fallback() {
        let dir = tempdir().unwrap();
        let input = create_era5_fixture(dir.path(), "valid_time");
        let info = get_netcdf_info(&input.to_string_lossy(), None, false).unwrap();
        assert_eq!(info.time_coverage.unwrap().variable, "valid_time");
    }
}

#[cfg(test)]
mod plot_tests {
    use super::*;
    use crate::grid::GriddedDataset;
    use crate::plot::{render_map, render_series};
    use crate::plot_job;
    use crate::time::IndexRange;

    fn plot_config(fixture: &Fixture) -> PlotConfig {
        PlotConfig {
            output_dir: fixture.path("plots"),
            width: 320,
            height: 240,
            labels: false,
            ..PlotConfig::default()
        }
    }

    #[test]
    fn test_render_map_and_series() {
        let fixture = Fixture::new();
        let dataset = GriddedDataset::open(&fixture.input, &CoordinateNames::default()).unwrap();
        let selection = FullGridSelector.select(dataset.coordinates()).unwrap();
        let config = PlotConfig {
            time_index: 1,
            ..plot_config(&fixture)
        };

        let map = render_map(&dataset, "e", &selection, 1000.0, &config).unwrap();
        assert_eq!(map, config.map_path("e"));
        assert!(fs::metadata(&map).unwrap().len() > 0);

        let series = render_series(
            &dataset,
            "e",
            IndexRange { start: 0, end: 3 },
            1000.0,
            &config,
        )
        .unwrap();
        assert_eq!(series, config.series_path("e"));
        assert!(series.exists());
        dataset.close().unwrap();
    }

    #[test]
    fn test_series_cell_outside_grid() {
        let fixture = Fixture::new();
        let dataset = GriddedDataset::open(&fixture.input, &CoordinateNames::default()).unwrap();
        let config = PlotConfig {
            lat_index: 7,
            ..plot_config(&fixture)
        };
        let err = render_series(
            &dataset,
            "e",
            IndexRange { start: 0, end: 3 },
            1.0,
            &config,
        )
        .unwrap_err();
        assert!(err.is_index_error());
    }

    #[test]
    fn test_plot_job_keeps_going_after_a_failed_plot() {
        let fixture = Fixture::new();
        let config = JobConfig {
            plot: Some(PlotConfig {
                lat_index: 7,
                ..plot_config(&fixture)
            }),
            ..fixture.config("unused.csv")
        };

        let rendered = plot_job(&config).unwrap();
        assert_eq!(rendered.len(), 1);
        assert!(rendered[0].ends_with("e_map_t0.png"));
        assert!(!Path::new(&config.output).exists());
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn test_every_template_is_valid() {
        for template in [
            Template::Basic,
            Template::Map,
            Template::SingleCell,
            Template::Era5Download,
        ] {
            let config = template.config();
            assert!(config.validate().is_ok(), "{:?} template is invalid", template);

            let reparsed = JobConfig::from_yaml(&config.to_yaml().unwrap()).unwrap();
            assert_eq!(reparsed.selection, config.selection);
            assert_eq!(reparsed.download, config.download);
        }
    }

    #[test]
    fn test_config_file_round_trip_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("job.yml");
        let config = Template::Map.config();
        fs::write(&path, config.to_yaml().unwrap()).unwrap();

        let loaded = JobConfig::from_file(&path).unwrap();
        assert_eq!(loaded.input, config.input);
        assert_eq!(loaded.time_window, config.time_window);
        assert_eq!(loaded.cell_map_path(), config.cell_map_path());
    }

    #[test]
    fn test_download_target_defaults_to_input() {
        let config = Template::Era5Download.config();
        assert_eq!(crate::download_target(&config), Some(config.input.clone()));
        assert_eq!(crate::download_target(&Template::Basic.config()), None);
    }
}
