//! Command-line interface definitions using clap.

use crate::config::ProviderConfig;
use crate::model::{FeatureType, PixelFormat, Region};
use crate::paths;
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Crash-isolated access to native geospatial raster and vector data.
#[derive(Parser, Debug)]
#[command(name = "geoprov")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Root directory of the map store.
    #[arg(long, global = true, env = "GEOPROV_DATA_DIR", default_value_os_t = paths::get_data_dir())]
    pub data_dir: PathBuf,

    /// Enable verbose output (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log level or filter directive (overrides -v).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Interval between worker liveness checks, in milliseconds.
    #[arg(long, global = true, env = "GEOPROV_WATCHDOG_MS", default_value_t = 200)]
    pub watchdog_ms: u64,

    /// Give up on a single call after this many milliseconds (0 = never).
    #[arg(long, global = true, env = "GEOPROV_CALL_TIMEOUT_MS", default_value_t = 0)]
    pub call_timeout_ms: u64,

    /// Disable colored output.
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve requests on stdin/stdout (started by the provider).
    #[command(hide = true)]
    Worker,

    /// Send a JSON value through the worker and print the reply.
    Echo(EchoArgs),

    /// Print the attribute table of a vector map.
    Table(TableArgs),

    /// Print the features of a vector map with WKB geometry.
    Features(FeaturesArgs),

    /// Render a raster map to pixels.
    Raster(RasterArgs),

    /// Crash the worker on purpose and show that the provider recovers.
    CrashTest,

    /// Start a provider and print its status.
    Status,

    /// Generate shell completions.
    Completions(CompletionsArgs),
}

/// Arguments for shell completions.
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for.
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate and print completions to stdout.
    pub fn generate(&self) {
        clap_complete::generate(
            self.shell,
            &mut Cli::command(),
            "geoprov",
            &mut std::io::stdout(),
        );
    }
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// JSON value to send.
    pub value: String,
}

#[derive(Args, Debug)]
pub struct TableArgs {
    /// Vector map name.
    pub map: String,

    /// Row filter, e.g. "cat > 10" or "name = 'Main St'".
    #[arg(short = 'w', long = "where")]
    pub filter: Option<String>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormatArg::Table)]
    pub format: OutputFormatArg,
}

/// Spatial window flags shared by feature and raster queries.
#[derive(Args, Debug, Default)]
pub struct ExtentArgs {
    /// Window as "north,south,east,west,rows,cols".
    #[arg(long, value_parser = parse_extent)]
    pub extent: Option<Region>,
}

#[derive(Args, Debug)]
pub struct FeaturesArgs {
    /// Vector map name.
    pub map: String,

    /// Geometry type: point, line or area.
    #[arg(short = 't', long = "type", default_value = "point", value_parser = parse_feature_type)]
    pub feature_type: FeatureType,

    /// Layer number.
    #[arg(long, default_value_t = 1)]
    pub field: i32,

    #[command(flatten)]
    pub extent: ExtentArgs,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormatArg::Table)]
    pub format: OutputFormatArg,
}

#[derive(Args, Debug)]
pub struct RasterArgs {
    /// Raster map name.
    pub map: String,

    /// Pixel byte order: argb, bgra or rgba.
    #[arg(long, default_value = "argb", value_parser = parse_pixel_format)]
    pub pixels: PixelFormat,

    #[command(flatten)]
    pub extent: ExtentArgs,

    /// Write raw pixel bytes to this file instead of printing a summary.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormatArg::Table)]
    pub format: OutputFormatArg,
}

/// Output format argument.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormatArg {
    /// Human-readable output.
    #[default]
    Table,
    /// JSON output.
    Json,
}

fn parse_feature_type(s: &str) -> Result<FeatureType, String> {
    s.parse()
}

fn parse_pixel_format(s: &str) -> Result<PixelFormat, String> {
    s.parse()
}

/// Parse "north,south,east,west,rows,cols".
pub fn parse_extent(s: &str) -> Result<Region, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let &[north, south, east, west, rows, cols] = parts.as_slice() else {
        return Err(format!(
            "expected north,south,east,west,rows,cols, got {} values",
            parts.len()
        ));
    };

    let coord = |name: &str, v: &str| {
        v.parse::<f64>()
            .map_err(|_| format!("invalid {} '{}'", name, v))
    };
    let count = |name: &str, v: &str| {
        v.parse::<usize>()
            .map_err(|_| format!("invalid {} '{}'", name, v))
    };

    let region = Region {
        north: coord("north", north)?,
        south: coord("south", south)?,
        east: coord("east", east)?,
        west: coord("west", west)?,
        rows: count("rows", rows)?,
        cols: count("cols", cols)?,
    };
    region.validate()?;
    Ok(region)
}

impl Cli {
    /// Provider configuration from the global flags (which already include
    /// their environment variables).
    pub fn provider_config(&self) -> ProviderConfig {
        let timeout = match self.call_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        ProviderConfig::new()
            .with_env_overrides()
            .with_data_dir(paths::expand_tilde(&self.data_dir))
            .with_watchdog_interval(Duration::from_millis(self.watchdog_ms.max(1)))
            .with_call_timeout(timeout)
    }
}
