//! # NetCDF File Information Module
//!
//! Inspects a NetCDF file before conversion: dimensions, variables with
//! their attributes, global attributes and, when a time coordinate is
//! present, the absolute time span it covers.

use crate::error::{Nc2ShetranError, Result};
use crate::input::CoordinateNames;
use crate::time::{TIMESTAMP_FORMAT, TimeAxis, TimeUnits};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Information about a NetCDF dimension
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetCdfDimensionInfo {
    pub name: String,
    pub length: usize,
    pub is_unlimited: bool,
}

/// Information about a NetCDF variable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetCdfVariableInfo {
    pub name: String,
    pub data_type: String,
    pub dimensions: Vec<String>,
    pub attributes: BTreeMap<String, String>,
    pub shape: Vec<usize>,
}

/// Absolute span of the time coordinate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeCoverage {
    pub variable: String,
    pub units: String,
    pub steps: usize,
    pub first: Option<String>,
    pub last: Option<String>,
}

/// Complete information about a NetCDF file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetCdfInfo {
    pub path: String,
    pub dimensions: Vec<NetCdfDimensionInfo>,
    pub variables: Vec<NetCdfVariableInfo>,
    pub global_attributes: BTreeMap<String, String>,
    pub file_size: Option<u64>,
    pub total_variables: usize,
    pub total_dimensions: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_coverage: Option<TimeCoverage>,
}

/// Extract comprehensive information from a NetCDF file
pub fn get_netcdf_info(file_path: &str, variable: Option<&str>, detailed: bool) -> Result<NetCdfInfo> {
    debug!("Opening NetCDF file: {}", file_path);
    let file = netcdf::open(file_path)?;
    let file_size = std::fs::metadata(file_path).ok().map(|m| m.len());

    let dimensions: Vec<NetCdfDimensionInfo> = file
        .dimensions()
        .map(|dim| NetCdfDimensionInfo {
            name: dim.name().to_string(),
            length: dim.len(),
            is_unlimited: dim.is_unlimited(),
        })
        .collect();

    if let Some(name) = variable {
        if file.variable(name).is_none() {
            return Err(Nc2ShetranError::VariableNotFound {
                name: name.to_string(),
                available: file.variables().map(|v| v.name().to_string()).collect(),
            });
        }
    }

    let variables: Vec<NetCdfVariableInfo> = file
        .variables()
        .filter(|var| variable.is_none_or(|name| var.name() == name))
        .map(|var| NetCdfVariableInfo {
            name: var.name().to_string(),
            data_type: format!("{:?}", var.vartype()),
            dimensions: var.dimensions().iter().map(|d| d.name().to_string()).collect(),
            attributes: var
                .attributes()
                .filter_map(|attr| {
                    attr.value()
                        .ok()
                        .map(|value| (attr.name().to_string(), format_attribute_value(&value)))
                })
                .collect(),
            shape: var.dimensions().iter().map(|d| d.len()).collect(),
        })
        .collect();

    let global_attributes = if detailed {
        file.attributes()
            .filter_map(|attr| {
                attr.value()
                    .ok()
                    .map(|value| (attr.name().to_string(), format_attribute_value(&value)))
            })
            .collect()
    } else {
        BTreeMap::new()
    };

    let time_coverage = time_coverage(&file, &CoordinateNames::default());
    file.close()?;

    Ok(NetCdfInfo {
        path: file_path.to_string(),
        total_dimensions: dimensions.len(),
        total_variables: variables.len(),
        dimensions,
        variables,
        global_attributes,
        file_size,
        time_coverage,
    })
}

fn time_coverage(file: &netcdf::File, names: &CoordinateNames) -> Option<TimeCoverage> {
    let var = file
        .variable(&names.time)
        .or_else(|| file.variable("valid_time"))?;
    let units_attr = match var.attribute_value("units")?.ok()? {
        netcdf::AttributeValue::Str(s) => s,
        _ => return None,
    };
    let units = TimeUnits::parse(&units_attr).ok()?;
    let offsets = var.get_values::<f64, _>(..).ok()?;
    match TimeAxis::from_offsets(&units, &offsets) {
        Ok(axis) => Some(TimeCoverage {
            variable: var.name().to_string(),
            units: units_attr,
            steps: axis.len(),
            first: axis.first().map(|t| t.format(TIMESTAMP_FORMAT).to_string()),
            last: axis.last().map(|t| t.format(TIMESTAMP_FORMAT).to_string()),
        }),
        Err(e) => {
            warn!("Could not resolve time coordinate '{}': {}", var.name(), e);
            None
        }
    }
}

/// Format netcdf attribute value for display
fn format_attribute_value(value: &netcdf::AttributeValue) -> String {
    use netcdf::AttributeValue as A;
    match value {
        A::Str(s) => s.clone(),
        A::Double(v) => v.to_string(),
        A::Float(v) => v.to_string(),
        A::Int(v) => v.to_string(),
        A::Short(v) => v.to_string(),
        A::Longlong(v) => v.to_string(),
        other => format!("{:?}", other),
    }
}

/// Print NetCDF info in human-readable format
pub fn print_file_info_human(info: &NetCdfInfo) {
    println!("NetCDF File Information:");
    println!("  Path: {}", info.path);
    if let Some(size) = info.file_size {
        println!("  File Size: {:.2} MB", size as f64 / 1_048_576.0);
    }
    if let Some(coverage) = &info.time_coverage {
        println!(
            "  Time: {} steps from {} to {} ({} '{}')",
            coverage.steps,
            coverage.first.as_deref().unwrap_or("-"),
            coverage.last.as_deref().unwrap_or("-"),
            coverage.variable,
            coverage.units
        );
    }
    println!("  Dimensions: {} total", info.total_dimensions);
    for dim in &info.dimensions {
        println!(
            "    {} ({}{})",
            dim.name,
            dim.length,
            if dim.is_unlimited { ", unlimited" } else { "" }
        );
    }
    println!("  Variables: {} total", info.total_variables);
    for var in &info.variables {
        println!(
            "    {} ({}) - dimensions: [{}]",
            var.name,
            var.data_type,
            var.dimensions.join(", ")
        );
        for (name, value) in &var.attributes {
            println!("      @{}: {}", name, value);
        }
    }
    if !info.global_attributes.is_empty() {
        println!("  Global Attributes:");
        for (name, value) in &info.global_attributes {
            println!("    @{}: {}", name, value);
        }
    }
}

/// Print NetCDF info in JSON format
pub fn print_file_info_json(info: &NetCdfInfo) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(info)?);
    Ok(())
}

/// Print NetCDF info in YAML format
pub fn print_file_info_yaml(info: &NetCdfInfo) -> Result<()> {
    println!("{}", serde_yaml::to_string(info)?);
    Ok(())
}

/// Print NetCDF info in CSV format (variables only)
pub fn print_file_info_csv(info: &NetCdfInfo) {
    print!("{}", format_variables_csv(info));
}

/// Variables as CSV rows, the most useful tabular view of a file
pub fn format_variables_csv(info: &NetCdfInfo) -> String {
    let mut out = String::from("variable_name,data_type,dimensions,shape,attributes_count\n");
    for var in &info.variables {
        let shape: Vec<String> = var.shape.iter().map(|s| s.to_string()).collect();
        out.push_str(&format!(
            "{},{},\"{}\",\"{}\",{}\n",
            var.name,
            var.data_type,
            var.dimensions.join(";"),
            shape.join(";"),
            var.attributes.len()
        ));
    }
    out
}
