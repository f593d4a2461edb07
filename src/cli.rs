//! # CLI Module
//!
//! Command-line interface of nc2shetran:
//! - Argument parsing with clap, every option also readable from an
//!   `NC2SHETRAN_` environment variable
//! - Configuration file loading (JSON/YAML) merged with command-line overrides
//! - Subcommands for conversion, CDS download, plotting and file inspection
//! - Small DSLs for selections on the command line (`N,S,E,W`, `LAT_IDX,LON_IDX`,
//!   `LAT,LON:TOL`)

use crate::download::{DownloadConfig, EvaporationVariable};
use crate::error::{Nc2ShetranError, Result};
use crate::filters::BoundingBox;
use crate::input::{CellParams, JobConfig, PointParams, SelectionConfig, Template};
use crate::plot::PlotConfig;
use crate::time::parse_timestamp;
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Converts ERA5 gridded NetCDF evaporation data into SHETRAN inputs
#[derive(Parser, Debug)]
#[command(name = "nc2shetran")]
#[command(about = "Convert ERA5 NetCDF evaporation grids into SHETRAN time-series inputs")]
#[command(version)]
#[command(long_about = "
nc2shetran converts ERA5 / ERA5-Land gridded NetCDF data into the delimited
time-series files read by the SHETRAN hydrological model.

FEATURES:
  • Calendar-correct time axis: 'hours since 1900-01-01' offsets resolved exactly
  • Selections: one cell by index, the cell nearest a point, a bounding box or the full grid
  • SHETRAN layout: one row per time step, one column per cell, plus a cell-ID map
  • Diagnostics: PNG map and time-series plots of the input
  • CDS download: optional retrieval of the input from the Climate Data Store

EXAMPLES:
  # Map conversion of a bounding box, metres to millimetres
  nc2shetran convert evaporation.nc total_evaporation.csv -n e \\
    --bbox 8.21,1.09,-57.67,-62.94 --start '2000-01-01 00:00:00' --end '2010-01-01 00:00:00'

  # Single cell series with diagnostic plots
  nc2shetran convert evaporation.nc series.csv -n e --cell 3,4 --plot-dir plots

  # Download then convert, everything from a config file
  nc2shetran convert --config essequibo.yaml --download

  # Inspect the time coverage of a file
  nc2shetran info evaporation.nc -n e
")]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode - suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format for structured data
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Configuration file path (JSON or YAML)
    #[arg(short, long, global = true, env = "NC2SHETRAN_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert a NetCDF grid into a SHETRAN time-series table
    #[command(long_about = "
Convert a NetCDF grid into a SHETRAN time-series table.

Settings come from --config and are overridden by command-line arguments.
Map selections (--bbox, --full-grid) also write an ESRI ASCII cell-ID map
next to the table.

EXAMPLES:
  # Full grid, whole time axis
  nc2shetran convert era5.nc evaporation.csv -n e

  # Bounding box, tab separated, without the time column
  nc2shetran convert era5.nc evaporation.txt -n e \\
    --bbox 8.21,1.09,-57.67,-62.94 --delimiter tab --no-time

  # Nearest cell to a gauge, within 0.1 degrees
  nc2shetran convert era5.nc gauge.csv -n pev --point 5.2,-58.9:0.1

  # Validate the merged settings only
  nc2shetran convert --config essequibo.yaml --dry-run
")]
    Convert(ConvertArgs),

    /// Retrieve ERA5 evaporation data from the Climate Data Store
    #[command(long_about = "
Retrieve ERA5 evaporation data from the Copernicus Climate Data Store.

Credentials are read from CDSAPI_URL / CDSAPI_KEY or from ~/.cdsapirc.
The request comes from the 'download' section of --config, or from
--bbox and --years when no configuration is given.

EXAMPLES:
  # Every evaporation variable, daily at 00:00, over the Essequibo
  nc2shetran download evaporation.nc --bbox 8.21,1.09,-57.67,-62.94 --years 2000-2021

  # Only total and potential evaporation
  nc2shetran download evaporation.nc --bbox 8.21,1.09,-57.67,-62.94 \\
    --years 2000-2001 --variables e,pev

  # Request described in a configuration file
  nc2shetran download --config essequibo.yaml
")]
    Download(DownloadArgs),

    /// Render diagnostic plots of a NetCDF variable
    #[command(long_about = "
Render a map of one time step and the time series of one cell as PNG files.

EXAMPLES:
  # Map of the first step and series of cell (0, 0)
  nc2shetran plot era5.nc -n e

  # Map of step 120 clipped to a box, series of cell (3, 4)
  nc2shetran plot era5.nc -n e --time-index 120 --series-cell 3,4 \\
    --bbox 8.21,1.09,-57.67,-62.94 --plot-dir diagnostics
")]
    Plot(PlotArgs),

    /// Validate configuration file
    #[command(long_about = "
Validate a configuration file without converting anything.

With --detailed the input file is also opened: its grid and time axis are
shown, the time window and the selection are resolved against it.

EXAMPLES:
  # Validate a configuration file
  nc2shetran validate essequibo.json

  # Check the configuration against its input file
  nc2shetran validate essequibo.yaml --detailed
")]
    Validate {
        /// Configuration file to validate
        config_file: Option<PathBuf>,

        /// Also resolve the configuration against the input file
        #[arg(long)]
        detailed: bool,
    },

    /// Show information about NetCDF file
    #[command(long_about = "
Inspect a NetCDF file and display its structure.

Shows dimensions, variables with their attributes and the time span covered
by the time coordinate.

EXAMPLES:
  # Basic file info
  nc2shetran info era5.nc

  # Only the evaporation variable, with global attributes
  nc2shetran info era5.nc -n e --detailed

  # JSON output for scripting
  nc2shetran info era5.nc --format json
")]
    Info {
        /// NetCDF file path
        file: String,

        /// Also show global attributes
        #[arg(long)]
        detailed: bool,

        /// Show only specific variable info
        #[arg(short = 'n', long)]
        variable: Option<String>,

        /// Output format for file information
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Generate configuration templates
    #[command(long_about = "
Generate configuration file templates for common use cases.

Available templates:
• basic: Full-grid conversion of a local file
• map: Bounding-box conversion with a cell-ID map
• single-cell: One cell time series with diagnostic plots
• era5-download: CDS download followed by a map conversion

EXAMPLES:
  # Generate a YAML template to file
  nc2shetran template map --format yaml -o essequibo.yaml

  # Generate and edit a template
  nc2shetran template era5-download > job.json
  nc2shetran convert --config job.json --download
")]
    Template {
        /// Template type to generate
        #[arg(value_enum)]
        template_type: TemplateType,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Configuration format
        #[arg(long, value_enum, default_value_t = ConfigFormat::Json)]
        format: ConfigFormat,
    },

    /// Generate shell completions
    #[command(long_about = "
Generate shell completion scripts for bash, zsh, fish and PowerShell.

INSTALLATION:
  # Bash
  nc2shetran completions bash > ~/.bash_completion.d/nc2shetran

  # Zsh
  nc2shetran completions zsh -o ~/.zsh/completions/_nc2shetran

  # Fish
  nc2shetran completions fish > ~/.config/fish/completions/nc2shetran.fish
")]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Spatial selection options shared by `convert` and `plot`
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Bounding box of the cells to convert: north,south,east,west
    #[arg(
        long,
        value_parser = parse_bbox,
        allow_hyphen_values = true,
        env = "NC2SHETRAN_BBOX",
        conflicts_with_all = ["cell", "point", "full_grid"]
    )]
    pub bbox: Option<BoundingBox>,

    /// Single cell by array indices: lat_index,lon_index
    #[arg(long, value_parser = parse_cell, conflicts_with_all = ["point", "full_grid"])]
    pub cell: Option<CellParams>,

    /// Single cell nearest a coordinate: lat,lon:tolerance
    #[arg(
        long,
        value_parser = parse_point,
        allow_hyphen_values = true,
        conflicts_with = "full_grid"
    )]
    pub point: Option<PointParams>,

    /// Every cell of the grid
    #[arg(long)]
    pub full_grid: bool,
}

impl SelectionArgs {
    /// The selection named on the command line, if any
    pub fn to_selection(&self) -> Option<SelectionConfig> {
        if let Some(params) = self.bbox {
            Some(SelectionConfig::BoundingBox { params })
        } else if let Some(params) = self.cell {
            Some(SelectionConfig::Cell { params })
        } else if let Some(params) = self.point {
            Some(SelectionConfig::Point { params })
        } else if self.full_grid {
            Some(SelectionConfig::FullGrid)
        } else {
            None
        }
    }
}

/// Time window options shared by `convert` and `plot`
#[derive(Args, Debug, Clone, Default)]
pub struct WindowArgs {
    /// First time step to convert: 'YYYY-MM-DD HH:MM:SS'
    #[arg(long, value_parser = parse_timestamp_arg, env = "NC2SHETRAN_START")]
    pub start: Option<String>,

    /// Last time step to convert (inclusive): 'YYYY-MM-DD HH:MM:SS'
    #[arg(long, value_parser = parse_timestamp_arg, env = "NC2SHETRAN_END")]
    pub end: Option<String>,
}

impl WindowArgs {
    fn apply(self, config: &mut JobConfig) {
        if let Some(start) = self.start {
            config.time_window.start = Some(start);
        }
        if let Some(end) = self.end {
            config.time_window.end = Some(end);
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct ConvertArgs {
    /// Input NetCDF file path
    #[arg(value_name = "INPUT", env = "NC2SHETRAN_INPUT")]
    pub input: Option<String>,

    /// Output time-series table path
    #[arg(value_name = "OUTPUT", env = "NC2SHETRAN_OUTPUT")]
    pub output: Option<String>,

    /// NetCDF variable name to extract
    #[arg(short = 'n', long, env = "NC2SHETRAN_VARIABLE")]
    pub variable: Option<String>,

    /// Factor every value is multiplied by (1000 turns metres into millimetres)
    #[arg(
        long,
        value_parser = parse_factor,
        allow_hyphen_values = true,
        env = "NC2SHETRAN_UNIT_CONVERSION"
    )]
    pub factor: Option<f64>,

    #[command(flatten)]
    pub window: WindowArgs,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Column delimiter: a single character, 'tab' or 'space'
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<char>,

    /// Leave the time column out of the table
    #[arg(long)]
    pub no_time: bool,

    /// Leave the header row out of the table
    #[arg(long)]
    pub no_header: bool,

    /// Decimal places written for each value
    #[arg(long)]
    pub precision: Option<usize>,

    /// Path of the cell-ID map written for map selections
    #[arg(long, env = "NC2SHETRAN_CELL_MAP")]
    pub cell_map: Option<String>,

    /// Render diagnostic plots into this directory before converting
    #[arg(long, env = "NC2SHETRAN_PLOT_DIR")]
    pub plot_dir: Option<String>,

    /// Run the configured CDS download before converting
    #[arg(long)]
    pub download: bool,

    /// Download again even when the input file already exists
    #[arg(long, requires = "download")]
    pub force_download: bool,

    /// Force overwrite existing output files
    #[arg(long, env = "NC2SHETRAN_FORCE")]
    pub force: bool,

    /// Dry run - validate configuration without processing
    #[arg(long, env = "NC2SHETRAN_DRY_RUN")]
    pub dry_run: bool,
}

impl ConvertArgs {
    /// Merges these arguments over `base` (the `--config` file, if any).
    ///
    /// Priority: command line > environment > configuration file > defaults.
    pub fn into_job_config(self, base: Option<JobConfig>) -> Result<JobConfig> {
        let mut config = base.unwrap_or_else(|| JobConfig::new("", "", ""));

        if let Some(input) = self.input {
            config.input = input;
        }
        if let Some(output) = self.output {
            config.output = output;
        }
        if let Some(variable) = self.variable {
            config.variable = variable;
        }
        require(&config.input, "No input file given: pass INPUT or a --config file")?;
        require(&config.output, "No output file given: pass OUTPUT or a --config file")?;
        require(&config.variable, "No variable given: pass --variable or a --config file")?;

        if let Some(factor) = self.factor {
            config.unit_conversion = factor;
        }
        self.window.apply(&mut config);
        if let Some(selection) = self.selection.to_selection() {
            config.selection = selection;
        }

        if let Some(delimiter) = self.delimiter {
            config.format.delimiter = delimiter;
        }
        if self.no_time {
            config.format.include_time = false;
        }
        if self.no_header {
            config.format.header = false;
        }
        if let Some(precision) = self.precision {
            config.format.precision = Some(precision);
        }
        if let Some(cell_map) = self.cell_map {
            config.cell_map = Some(cell_map);
        }
        if let Some(dir) = self.plot_dir {
            let plot = config.plot.get_or_insert_with(PlotConfig::default);
            plot.output_dir = dir;
        }
        if self.download && config.download.is_none() {
            return Err(Nc2ShetranError::Config(
                "--download needs a 'download' section in the --config file".to_string(),
            ));
        }
        Ok(config)
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct PlotArgs {
    /// Input NetCDF file path
    #[arg(value_name = "INPUT", env = "NC2SHETRAN_INPUT")]
    pub input: Option<String>,

    /// NetCDF variable name to plot
    #[arg(short = 'n', long, env = "NC2SHETRAN_VARIABLE")]
    pub variable: Option<String>,

    /// Factor every value is multiplied by before plotting
    #[arg(
        long,
        value_parser = parse_factor,
        allow_hyphen_values = true,
        env = "NC2SHETRAN_UNIT_CONVERSION"
    )]
    pub factor: Option<f64>,

    #[command(flatten)]
    pub window: WindowArgs,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Time step (index into the time axis) shown on the map
    #[arg(long)]
    pub time_index: Option<usize>,

    /// Cell whose time series is drawn: lat_index,lon_index
    #[arg(long, value_parser = parse_cell)]
    pub series_cell: Option<CellParams>,

    /// Directory the PNG files are written to
    #[arg(long, env = "NC2SHETRAN_PLOT_DIR")]
    pub plot_dir: Option<String>,

    /// Draw the plots without titles and axis labels
    #[arg(long)]
    pub no_labels: bool,
}

impl PlotArgs {
    /// Merges these arguments over `base`; the output path is never written
    pub fn into_job_config(self, base: Option<JobConfig>) -> Result<JobConfig> {
        let mut config = base.unwrap_or_else(|| JobConfig::new("", "", ""));
        if let Some(input) = self.input {
            config.input = input;
        }
        if let Some(variable) = self.variable {
            config.variable = variable;
        }
        require(&config.input, "No input file given: pass INPUT or a --config file")?;
        require(&config.variable, "No variable given: pass --variable or a --config file")?;
        if config.output.trim().is_empty() {
            config.output = Path::new(&config.input)
                .with_extension("csv")
                .to_string_lossy()
                .to_string();
        }

        if let Some(factor) = self.factor {
            config.unit_conversion = factor;
        }
        self.window.apply(&mut config);
        if let Some(selection) = self.selection.to_selection() {
            config.selection = selection;
        }

        let plot = config.plot.get_or_insert_with(PlotConfig::default);
        if let Some(time_index) = self.time_index {
            plot.time_index = time_index;
        }
        if let Some(cell) = self.series_cell {
            plot.lat_index = cell.lat_index;
            plot.lon_index = cell.lon_index;
        }
        if let Some(dir) = self.plot_dir {
            plot.output_dir = dir;
        }
        if self.no_labels {
            plot.labels = false;
        }
        Ok(config)
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct DownloadArgs {
    /// File the retrieved NetCDF is saved to
    #[arg(value_name = "TARGET", env = "NC2SHETRAN_DOWNLOAD_TARGET")]
    pub target: Option<String>,

    /// Area to retrieve: north,south,east,west
    #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true, env = "NC2SHETRAN_BBOX")]
    pub bbox: Option<BoundingBox>,

    /// Years to retrieve: '2000-2021' or '2000,2005,2010'
    #[arg(long, value_parser = parse_years)]
    pub years: Option<Vec<u16>>,

    /// Variables to retrieve, by short or CDS name (default: all evaporation variables)
    #[arg(long, value_delimiter = ',', value_parser = parse_variable)]
    pub variables: Vec<EvaporationVariable>,

    /// Hours of the day (UTC) to retrieve
    #[arg(long, value_delimiter = ',', value_parser = clap::value_parser!(u8).range(0..=23))]
    pub hours: Vec<u8>,

    /// CDS dataset name
    #[arg(long)]
    pub dataset: Option<String>,

    /// Download again even when the target already exists
    #[arg(long)]
    pub force: bool,
}

impl DownloadArgs {
    /// Resolves the retrieval request and the file it is saved to
    pub fn into_download(self, base: Option<JobConfig>) -> Result<(DownloadConfig, String)> {
        let base_target = base.as_ref().and_then(crate::download_target);
        let mut download = match base.and_then(|job| job.download) {
            Some(download) => download,
            None => match (self.bbox, self.years.clone()) {
                (Some(area), Some(years)) => DownloadConfig::for_area(area, years),
                _ => {
                    return Err(Nc2ShetranError::Config(
                        "Without a 'download' section in --config both --bbox and --years are required"
                            .to_string(),
                    ));
                }
            },
        };

        if let Some(area) = self.bbox {
            download.area = area;
        }
        if let Some(years) = self.years {
            download.years = years;
        }
        if !self.variables.is_empty() {
            download.variables = self.variables;
        }
        if !self.hours.is_empty() {
            download.hours = self.hours;
        }
        if let Some(dataset) = self.dataset {
            download.dataset = dataset;
        }

        let target = self
            .target
            .or_else(|| download.target.clone())
            .or(base_target)
            .ok_or_else(|| {
                Nc2ShetranError::Config("No download target given: pass TARGET".to_string())
            })?;
        download.validate()?;
        Ok((download, target))
    }
}

fn require(value: &str, message: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Nc2ShetranError::Config(message.to_string()));
    }
    Ok(())
}

#[derive(ValueEnum, Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON structured output
    Json,
    /// YAML structured output
    Yaml,
    /// CSV output (where applicable)
    Csv,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TemplateType {
    /// Full-grid conversion template
    Basic,
    /// Bounding-box map template
    Map,
    /// Single cell series template
    SingleCell,
    /// CDS download and conversion template
    Era5Download,
}

impl From<TemplateType> for Template {
    fn from(template: TemplateType) -> Self {
        match template {
            TemplateType::Basic => Template::Basic,
            TemplateType::Map => Template::Map,
            TemplateType::SingleCell => Template::SingleCell,
            TemplateType::Era5Download => Template::Era5Download,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON configuration format
    Json,
    /// YAML configuration format
    Yaml,
}

fn parse_f64(value: &str, what: &str) -> std::result::Result<f64, String> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("Invalid {} '{}'", what, value.trim()))
}

/// Parse bounding box from command line argument
/// Format: north,south,east,west
pub fn parse_bbox(s: &str) -> std::result::Result<BoundingBox, String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 4 {
        return Err("Bounding box must be in format 'north,south,east,west'".to_string());
    }
    let bbox = BoundingBox {
        north: parse_f64(parts[0], "north bound")?,
        south: parse_f64(parts[1], "south bound")?,
        east: parse_f64(parts[2], "east bound")?,
        west: parse_f64(parts[3], "west bound")?,
    };
    bbox.validate().map_err(|e| e.to_string())?;
    Ok(bbox)
}

/// Parse cell indices from command line argument
/// Format: lat_index,lon_index
pub fn parse_cell(s: &str) -> std::result::Result<CellParams, String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 2 {
        return Err("Cell must be in format 'lat_index,lon_index'".to_string());
    }
    let index = |value: &str, what: &str| {
        value
            .trim()
            .parse::<usize>()
            .map_err(|_| format!("Invalid {} '{}'", what, value.trim()))
    };
    Ok(CellParams {
        lat_index: index(parts[0], "latitude index")?,
        lon_index: index(parts[1], "longitude index")?,
    })
}

/// Parse point selection from command line argument
/// Format: lat,lon:tolerance
pub fn parse_point(s: &str) -> std::result::Result<PointParams, String> {
    let (coords, tolerance) = s
        .split_once(':')
        .ok_or("Point must be in format 'lat,lon:tolerance'")?;
    let (lat, lon) = coords
        .split_once(',')
        .ok_or("Point coordinates must be 'lat,lon'")?;
    let latitude = parse_f64(lat, "latitude")?;
    let longitude = parse_f64(lon, "longitude")?;
    let tolerance = parse_f64(tolerance, "tolerance")?;

    if !(-90.0..=90.0).contains(&latitude) {
        return Err(format!("Latitude {} is outside [-90, 90]", latitude));
    }
    if !longitude.is_finite() {
        return Err(format!("Longitude {} is not a finite number", longitude));
    }
    if tolerance.is_nan() || tolerance <= 0.0 {
        return Err("Tolerance must be positive".to_string());
    }
    Ok(PointParams {
        latitude,
        longitude,
        tolerance,
    })
}

/// Parse column delimiter: a single ASCII character, `tab` or `space`
pub fn parse_delimiter(s: &str) -> std::result::Result<char, String> {
    let delimiter = match s {
        "tab" | "\\t" | "\t" => '\t',
        "space" | " " => ' ',
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => return Err(format!("Delimiter must be a single character, got '{}'", other)),
            }
        }
    };
    if !delimiter.is_ascii() || delimiter.is_ascii_alphanumeric() {
        return Err(format!(
            "Delimiter must be an ASCII punctuation or whitespace character, got '{}'",
            delimiter.escape_default()
        ));
    }
    Ok(delimiter)
}

/// Parse years: a range `2000-2021` or a list `2000,2005`
pub fn parse_years(s: &str) -> std::result::Result<Vec<u16>, String> {
    let year = |value: &str| {
        value
            .trim()
            .parse::<u16>()
            .map_err(|_| format!("Invalid year '{}'", value.trim()))
    };
    if let Some((first, last)) = s.split_once('-') {
        let (first, last) = (year(first)?, year(last)?);
        if first > last {
            return Err(format!("Year range {}-{} is reversed", first, last));
        }
        return Ok((first..=last).collect());
    }
    let years = s
        .split(',')
        .filter(|v| !v.trim().is_empty())
        .map(year)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    if years.is_empty() {
        return Err("At least one year is required".to_string());
    }
    Ok(years)
}

fn parse_variable(s: &str) -> std::result::Result<EvaporationVariable, String> {
    s.trim().parse().map_err(|e: Nc2ShetranError| e.to_string())
}

fn parse_factor(s: &str) -> std::result::Result<f64, String> {
    let factor = parse_f64(s, "unit conversion factor")?;
    if !factor.is_finite() || factor == 0.0 {
        return Err("Unit conversion factor must be finite and non-zero".to_string());
    }
    Ok(factor)
}

/// Checks the timestamp format, keeping the text as written
fn parse_timestamp_arg(s: &str) -> std::result::Result<String, String> {
    parse_timestamp(s).map_err(|e| e.to_string())?;
    Ok(s.trim().to_string())
}
