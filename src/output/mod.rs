//! Output formatting for provider results.

pub mod json;
pub mod table;

use crate::cli::OutputFormatArg;
use crate::model::{FeatureRecord, RasterImage, VectorTable};

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Colored table output (default).
    #[default]
    Table,
    /// JSON output.
    Json,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Table => OutputFormat::Table,
            OutputFormatArg::Json => OutputFormat::Json,
        }
    }
}

pub fn print_vector_table(map: &str, table: &VectorTable, format: OutputFormat) {
    match format {
        OutputFormat::Table => table::print_vector_table(map, table),
        OutputFormat::Json => json::print_json(table),
    }
}

pub fn print_features(map: &str, features: &[FeatureRecord], format: OutputFormat) {
    match format {
        OutputFormat::Table => table::print_features(map, features),
        OutputFormat::Json => json::print_json(&features),
    }
}

pub fn print_raster(map: &str, image: &RasterImage, format: OutputFormat) {
    match format {
        OutputFormat::Table => table::print_raster_summary(map, image),
        OutputFormat::Json => json::print_json(image),
    }
}
