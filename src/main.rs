//! geoprov - crash-isolated geodata provider

use anyhow::{Context, Result, bail};
use clap::Parser;
use owo_colors::{OwoColorize, Stream::Stderr};
use serde_json::Value;
use tracing::{debug, instrument};

use geoprov::cli::{Cli, Commands, EchoArgs, FeaturesArgs, RasterArgs, TableArgs};
use geoprov::logging::{self, LogConfig};
use geoprov::output;
use geoprov::theme::{self, Themed};
use geoprov::{DataProvider, ProviderError, paths, provider};

fn main() {
    let cli = Cli::parse();

    // Handle no-color flag - affects both owo_colors and comfy_table
    if cli.no_color {
        theme::disable_colors();
    }

    init_logging(&cli);

    let result = match &cli.command {
        Commands::Worker => provider::run_worker_main(&paths::expand_tilde(&cli.data_dir)),
        Commands::Echo(args) => cmd_echo(&cli, args),
        Commands::Table(args) => cmd_table(&cli, args),
        Commands::Features(args) => cmd_features(&cli, args),
        Commands::Raster(args) => cmd_raster(&cli, args),
        Commands::CrashTest => cmd_crash_test(&cli),
        Commands::Status => cmd_status(&cli),
        Commands::Completions(args) => {
            args.generate();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!(
            "{}: {}",
            "error"
                .if_supports_color(Stderr, |text| text.red())
                .if_supports_color(Stderr, |text| text.bold()),
            e
        );
        // Print the error chain if there are causes
        for cause in e.chain().skip(1) {
            eprintln!(
                "  {}: {}",
                "caused by".if_supports_color(Stderr, |text| text.yellow()),
                cause
            );
        }
        std::process::exit(1);
    }
}

fn init_logging(cli: &Cli) {
    let mut config = match cli.command {
        Commands::Worker => LogConfig::for_worker(),
        _ => LogConfig::for_cli(cli.verbose),
    };
    if let Some(level) = &cli.log_level {
        config = match logging::parse_level(level) {
            Some(level) => config.with_level(level),
            None => config.with_filter(level.clone()),
        };
    }
    logging::init(config.with_env_overrides());
}

fn start_provider(cli: &Cli) -> Result<DataProvider> {
    let config = cli.provider_config();
    debug!(data_dir = %config.data_dir.display(), "starting provider");
    DataProvider::start(config).context("Failed to start the data provider")
}

#[instrument(skip_all)]
fn cmd_echo(cli: &Cli, args: &EchoArgs) -> Result<()> {
    // Bare words are sent as strings
    let value: Value =
        serde_json::from_str(&args.value).unwrap_or_else(|_| Value::String(args.value.clone()));

    let provider = start_provider(cli)?;
    let reply = provider.echo(value)?;
    println!("{}", reply);
    provider.stop();
    Ok(())
}

#[instrument(skip_all, fields(map = %args.map))]
fn cmd_table(cli: &Cli, args: &TableArgs) -> Result<()> {
    let provider = start_provider(cli)?;
    let table = provider.vector_table(&args.map, args.filter.as_deref())?;
    output::print_vector_table(&args.map, &table, args.format.into());
    provider.stop();
    Ok(())
}

#[instrument(skip_all, fields(map = %args.map))]
fn cmd_features(cli: &Cli, args: &FeaturesArgs) -> Result<()> {
    let provider = start_provider(cli)?;
    let features = provider.vector_features(
        &args.map,
        args.extent.extent.as_ref(),
        args.feature_type,
        args.field,
    )?;
    output::print_features(&args.map, &features, args.format.into());
    provider.stop();
    Ok(())
}

#[instrument(skip_all, fields(map = %args.map))]
fn cmd_raster(cli: &Cli, args: &RasterArgs) -> Result<()> {
    let provider = start_provider(cli)?;
    let image = provider.raster_image(&args.map, args.extent.extent.as_ref(), args.pixels)?;
    provider.stop();

    if let Some(path) = &args.output {
        std::fs::write(path, &image.data)
            .with_context(|| format!("Failed to write pixels to {}", path.display()))?;
        eprintln!(
            "Wrote {} x {} pixels to {}",
            image.cols,
            image.rows,
            path.display()
        );
        return Ok(());
    }

    output::print_raster(&args.map, &image, args.format.into());
    Ok(())
}

/// Crash the worker and show that the next call is served by a new one.
fn cmd_crash_test(cli: &Cli) -> Result<()> {
    let provider = start_provider(cli)?;

    provider.echo(Value::from(1))?;
    let before = provider.supervisor().worker_pid();
    println!("{} {}", "worker before:".label(), pid_text(before));

    match provider.trigger_fatal_error("crash test") {
        Err(e @ ProviderError::Fatal { .. }) => println!("{} {}", "fatal:".label(), e),
        Err(e) => return Err(e).context("Expected a fatal error from the worker"),
        Ok(()) => bail!("Worker survived a fatal error"),
    }

    let reply = provider.echo(Value::from(42))?;
    let after = provider.supervisor().worker_pid();
    println!("{} {}", "worker after:".label(), pid_text(after));
    if reply != Value::from(42) {
        bail!("Replacement worker echoed {} instead of 42", reply);
    }
    if before == after {
        bail!("Worker was not replaced");
    }

    output::table::print_stats(&provider.stats());
    println!("{}", "Recovered from worker crash".success());
    provider.stop();
    Ok(())
}

fn pid_text(pid: Option<i32>) -> String {
    match pid {
        Some(pid) => pid.to_string(),
        None => "-".muted(),
    }
}

fn cmd_status(cli: &Cli) -> Result<()> {
    let provider = start_provider(cli)?;
    provider.supervisor().check();
    let stats = provider.stats();
    provider.stop();
    output::json::print_json(&stats);
    Ok(())
}
