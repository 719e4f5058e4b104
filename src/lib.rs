//! geoprov - crash-isolated access to native geospatial data.
//!
//! Native raster and vector calls run in a supervised worker process. When
//! the worker aborts, the caller gets a [`ProviderError::Fatal`] and the next
//! call is served by a fresh worker.
//!
//! ```no_run
//! use geoprov::{DataProvider, ProviderConfig};
//!
//! let provider = DataProvider::start(ProviderConfig::new().with_data_dir("/srv/maps"))?;
//! let table = provider.vector_table("roads", Some("cat > 2"))?;
//! println!("{} rows", table.rows.len());
//! provider.stop();
//! # Ok::<(), geoprov::ProviderError>(())
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod native;
pub mod output;
pub mod paths;
pub mod provider;
pub mod theme;

pub use config::ProviderConfig;
pub use error::{ProviderError, Result};
pub use model::{
    Column, ColumnType, FeatureRecord, FeatureType, PixelFormat, RasterImage, Region, VectorTable,
};
pub use provider::{DataProvider, ProviderStats, Supervisor};
