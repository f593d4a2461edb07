use crate::JobSummary;
use crate::filters::Selection;
use crate::grid::GriddedDataset;
use crate::input::{JobConfig, SelectionConfig};
use std::time::Duration;

pub fn show_greeting(config_source: &str) {
    println!("=== ERA5 NetCDF to SHETRAN Converter ===");
    println!("Loading configuration from: {}", config_source);
}

pub fn config_echo(config: &JobConfig) {
    println!("\nConfiguration:");
    println!("  Input NetCDF: {}", config.input);
    println!("  Variable: {}", config.variable);
    println!("  Output table: {}", config.output);
    println!("  Unit conversion: x{}", config.unit_conversion);
    println!(
        "  Time window: {} to {}",
        config.time_window.start.as_deref().unwrap_or("first step"),
        config.time_window.end.as_deref().unwrap_or("last step")
    );
    match &config.selection {
        SelectionConfig::Cell { params } => println!(
            "  Selection: cell (lat index {}, lon index {})",
            params.lat_index, params.lon_index
        ),
        SelectionConfig::Point { params } => println!(
            "  Selection: point ({}, {}) within {} degrees",
            params.latitude, params.longitude, params.tolerance
        ),
        SelectionConfig::BoundingBox { params } => println!(
            "  Selection: bounding box N {} S {} E {} W {}",
            params.north, params.south, params.east, params.west
        ),
        SelectionConfig::FullGrid => println!("  Selection: full grid"),
    }
    if let Some(map) = config.cell_map_path() {
        println!("  Cell map: {}", map);
    }
    if let Some(plot) = &config.plot {
        println!("  Diagnostic plots: {}", plot.output_dir);
    }
    if let Some(download) = &config.download {
        println!(
            "  Download: {} ({} variables, {} years)",
            download.dataset,
            download.variables.len(),
            download.years.len()
        );
    }
}

pub fn show_dataset_info(dataset: &GriddedDataset) {
    let axis = dataset.time_axis();
    let coords = dataset.coordinates();
    println!("\nNetCDF File Info:");
    println!(
        "  Grid: {} latitudes x {} longitudes",
        coords.n_lat(),
        coords.n_lon()
    );
    if let (Some(first), Some(last)) = (axis.first(), axis.last()) {
        println!("  Time: {} steps from {} to {}", axis.len(), first, last);
    }
    println!("  Variables: {}", dataset.variable_names().join(", "));
}

pub fn show_selection(selection: &Selection) {
    println!(
        "\nSelection: {} cells ({} rows x {} columns)",
        selection.len(),
        selection.n_rows,
        selection.n_cols
    );
}

pub fn show_summary(summary: &JobSummary) {
    println!("\nWrote {} rows x {} cells to {}", summary.rows, summary.cells, summary.output);
    if let Some(map) = &summary.cell_map {
        println!("Cell map: {}", map);
    }
    for plot in &summary.plots {
        println!("Plot: {}", plot.display());
    }
}

pub fn show_farewell_with_timing(elapsed: Duration) {
    println!(
        "\n=== Conversion completed successfully in {:.2}s! ===",
        elapsed.as_secs_f64()
    );
}
