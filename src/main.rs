use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser};
use log::debug;
use nc2shetran::cli::{Cli, Commands, ConfigFormat, ConvertArgs, OutputFormat};
use nc2shetran::download::run_download;
use nc2shetran::grid::GriddedDataset;
use nc2shetran::info::{
    get_netcdf_info, print_file_info_csv, print_file_info_human, print_file_info_json,
    print_file_info_yaml,
};
use nc2shetran::input::{JobConfig, Template};
use nc2shetran::log::{
    config_echo, show_dataset_info, show_farewell_with_timing, show_greeting, show_selection,
    show_summary,
};
use nc2shetran::{plot_job, process_job, run_pipeline};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    let quiet = cli.quiet;

    match cli.command {
        Commands::Convert(args) => convert(args, cli.config, quiet).await,
        Commands::Download(args) => {
            let base = load_config(cli.config.as_deref())?;
            let force = args.force;
            let (download, target) = args.into_download(base).context("Invalid download request")?;
            let saved = run_download(&download, &target, force)
                .await
                .with_context(|| format!("Download to {} failed", target))?;
            if !quiet {
                println!("Saved {}", saved.display());
            }
            Ok(())
        }
        Commands::Plot(args) => {
            let base = load_config(cli.config.as_deref())?;
            let config = args.into_job_config(base).context("Invalid plot settings")?;
            let rendered = plot_job(&config)
                .with_context(|| format!("Could not plot '{}' from {}", config.variable, config.input))?;
            if !quiet {
                for path in rendered {
                    println!("Plot: {}", path.display());
                }
            }
            Ok(())
        }
        Commands::Validate {
            config_file,
            detailed,
        } => {
            let path = config_file
                .or(cli.config)
                .context("No configuration file given: pass CONFIG_FILE or --config")?;
            validate(&path, detailed, quiet)
        }
        Commands::Info {
            file,
            detailed,
            variable,
            format,
        } => {
            let info = get_netcdf_info(&file, variable.as_deref(), detailed)
                .with_context(|| format!("Could not inspect {}", file))?;
            match format.unwrap_or(cli.output_format) {
                OutputFormat::Human => print_file_info_human(&info),
                OutputFormat::Json => print_file_info_json(&info)?,
                OutputFormat::Yaml => print_file_info_yaml(&info)?,
                OutputFormat::Csv => print_file_info_csv(&info),
            }
            Ok(())
        }
        Commands::Template {
            template_type,
            output,
            format,
        } => {
            let config = Template::from(template_type).config();
            let text = match format {
                ConfigFormat::Json => config.to_json()?,
                ConfigFormat::Yaml => config.to_yaml()?,
            };
            write_or_print(output.as_deref(), text.as_bytes())
        }
        Commands::Completions { shell, output } => {
            let mut buffer = Vec::new();
            clap_complete::generate(shell, &mut Cli::command(), "nc2shetran", &mut buffer);
            write_or_print(output.as_deref(), &buffer)
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<Option<JobConfig>> {
    path.map(|p| {
        debug!("Loading configuration from {}", p.display());
        JobConfig::from_file(p).with_context(|| format!("Could not load {}", p.display()))
    })
    .transpose()
}

async fn convert(args: ConvertArgs, config_path: Option<PathBuf>, quiet: bool) -> Result<()> {
    let start_time = Instant::now();
    let source = config_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "command line".to_string());
    if !quiet {
        show_greeting(&source);
    }

    let (dry_run, force, download, force_download) =
        (args.dry_run, args.force, args.download, args.force_download);
    let base = load_config(config_path.as_deref())?;
    let config = args.into_job_config(base).context("Invalid conversion settings")?;
    config.validate().context("Invalid conversion settings")?;
    if !quiet {
        config_echo(&config);
    }

    if dry_run {
        if !quiet {
            println!("\nConfiguration is valid (dry run, nothing written)");
        }
        return Ok(());
    }
    if Path::new(&config.output).exists() && !force {
        bail!(
            "Output {} already exists, pass --force to overwrite it",
            config.output
        );
    }

    let summary = if download {
        run_pipeline(&config, force_download).await
    } else {
        process_job(&config)
    }
    .with_context(|| format!("Conversion of {} failed", config.input))?;

    if !quiet {
        show_summary(&summary);
        show_farewell_with_timing(start_time.elapsed());
    }
    Ok(())
}

fn validate(path: &Path, detailed: bool, quiet: bool) -> Result<()> {
    let config = JobConfig::from_file(path).with_context(|| format!("Could not load {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("{} is not a valid configuration", path.display()))?;
    if !quiet {
        println!("Configuration {} is valid", path.display());
    }
    if !detailed {
        return Ok(());
    }

    if !quiet {
        config_echo(&config);
    }
    if !Path::new(&config.input).exists() {
        if !quiet {
            println!("\nInput {} does not exist yet", config.input);
        }
        return Ok(());
    }
    let dataset = GriddedDataset::open(&config.input, &config.coordinates)?;
    dataset.check_layout(&config.variable)?;
    let range = dataset.time_axis().resolve_window(&config.time_window()?)?;
    let selection = config.selection.to_selector()?.select(dataset.coordinates())?;
    if !quiet {
        show_dataset_info(&dataset);
        show_selection(&selection);
        println!("Time steps in window: {}", range.len());
    }
    dataset.close()?;
    Ok(())
}

fn write_or_print(output: Option<&Path>, content: &[u8]) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, content).with_context(|| format!("Could not write {}", path.display()))?;
            eprintln!("Written to {}", path.display());
        }
        None => io::stdout().write_all(content)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_detailed_validation_still_opens_the_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("era5.nc");
        fs::write(&input, b"not a netcdf file").unwrap();
        let config = JobConfig::new(
            &input.to_string_lossy(),
            "e",
            &dir.path().join("out.csv").to_string_lossy(),
        );
        let path = dir.path().join("job.json");
        fs::write(&path, config.to_json().unwrap()).unwrap();

        assert!(validate(&path, false, true).is_ok());
        assert!(validate(&path, true, true).is_err());
        assert!(validate(&path, true, false).is_err());
    }
}
