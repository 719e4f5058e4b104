//! The native geodata library.
//!
//! Everything here runs inside the worker process only. The library keeps
//! process-global state (registered error handlers) and signals unrecoverable
//! errors by aborting the process through [`hook::fatal_error`], which is why
//! the application never links against it directly.

pub mod filter;
pub mod hook;
pub mod render;
pub mod store;
pub mod wkb;

use crate::model::{FeatureRecord, FeatureType, PixelFormat, RasterImage, Region, VectorTable};
use store::MapStore;
use thiserror::Error;

/// Recoverable library errors. These become error responses, not crashes.
#[derive(Error, Debug)]
pub enum NativeError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{kind} map <{name}> not found")]
    MapNotFound { kind: &'static str, name: String },

    #[error("Map <{name}> is unreadable: {reason}")]
    InvalidMap { name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Attribute table of a vector map, optionally filtered.
pub fn vector_table(
    store: &MapStore,
    map: &str,
    filter: Option<&str>,
) -> Result<VectorTable, NativeError> {
    store.vector(map)?.table(filter)
}

/// Geometries of a vector map as WKB.
pub fn vector_features(
    store: &MapStore,
    map: &str,
    extent: Option<&Region>,
    feature_type: FeatureType,
    field: i32,
) -> Result<Vec<FeatureRecord>, NativeError> {
    if let Some(region) = extent {
        region.validate().map_err(NativeError::InvalidArgument)?;
    }
    Ok(store.vector(map)?.features(extent, feature_type, field))
}

/// Colored image of a raster map, resampled to `extent` or to the map's own
/// region.
pub fn raster_image(
    store: &MapStore,
    map: &str,
    extent: Option<&Region>,
    format: PixelFormat,
) -> Result<RasterImage, NativeError> {
    let raster = store.raster(map)?;
    let target = match extent {
        Some(region) => {
            region.validate().map_err(NativeError::InvalidArgument)?;
            *region
        }
        None => raster.region,
    };
    Ok(render::render(&raster, &target, format))
}
