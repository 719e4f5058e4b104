//! Typed client API over the supervisor.
//!
//! Each method checks the worker, sends one request, receives its response
//! under a human-readable context and decodes it into the call's result type.

use super::protocol::Opcode;
use super::supervisor::{ProviderStats, Supervisor};
use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use crate::model::{FeatureRecord, FeatureType, PixelFormat, RasterImage, Region, VectorTable};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;

/// Fault-tolerant access to the native geodata library.
pub struct DataProvider {
    supervisor: Supervisor,
}

impl DataProvider {
    /// Start a provider with its first worker generation and watchdog.
    pub fn start(config: ProviderConfig) -> Result<Self> {
        Ok(Self {
            supervisor: Supervisor::start(config)?,
        })
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn stats(&self) -> ProviderStats {
        self.supervisor.stats()
    }

    /// Stop the worker and watchdog. Later calls fail with `Stopped`.
    pub fn stop(&self) {
        self.supervisor.stop();
    }

    fn request(&self, opcode: Opcode, args: Vec<Value>, context: &str) -> Result<Value> {
        self.supervisor.check();
        self.supervisor.call(opcode, args)?.receive(context)
    }

    fn request_as<T: DeserializeOwned>(
        &self,
        opcode: Opcode,
        args: Vec<Value>,
        context: &str,
    ) -> Result<T> {
        let value = self.request(opcode, args, context)?;
        serde_json::from_value(value)
            .map_err(|e| ProviderError::Protocol(format!("{}: unexpected result: {}", context, e)))
    }

    /// Round-trip a value through the worker.
    pub fn echo(&self, value: Value) -> Result<Value> {
        self.request(Opcode::Echo, vec![value], "echoing a value")
    }

    /// Keep the worker busy for `duration`.
    pub fn sleep(&self, duration: Duration) -> Result<Duration> {
        let ms = duration.as_millis() as u64;
        let slept: u64 = self.request_as(
            Opcode::Sleep,
            vec![json!(ms)],
            &format!("sleeping {} ms in the worker", ms),
        )?;
        Ok(Duration::from_millis(slept))
    }

    /// Attribute table of vector map `map`, optionally restricted by a
    /// `<column> <op> <literal>` filter.
    pub fn vector_table(&self, map: &str, filter: Option<&str>) -> Result<VectorTable> {
        self.request_as(
            Opcode::VectorTable,
            vec![json!(map), json!(filter)],
            &format!("reading attribute table of vector map <{}>", map),
        )
    }

    /// Features of one geometry type on layer `field`, as `(id, cat, wkb)`.
    pub fn vector_features(
        &self,
        map: &str,
        extent: Option<&Region>,
        feature_type: FeatureType,
        field: i32,
    ) -> Result<Vec<FeatureRecord>> {
        self.request_as(
            Opcode::VectorFeatures,
            vec![json!(map), json!(extent), json!(feature_type), json!(field)],
            &format!("reading {} features of vector map <{}>", feature_type, map),
        )
    }

    /// Raster map `map` rendered to pixels over `extent` (or the map's own
    /// region).
    pub fn raster_image(
        &self,
        map: &str,
        extent: Option<&Region>,
        format: PixelFormat,
    ) -> Result<RasterImage> {
        let context = format!("rendering raster map <{}>", map);
        let image: RasterImage = self.request_as(
            Opcode::RasterImage,
            vec![json!(map), json!(extent), json!(format)],
            &context,
        )?;

        let expected = image.rows * image.cols * 4;
        if image.data.len() != expected {
            return Err(ProviderError::Protocol(format!(
                "{}: expected {} bytes for {}x{} pixels, got {}",
                context,
                expected,
                image.rows,
                image.cols,
                image.data.len()
            )));
        }
        if let Some(region) = extent
            && (image.rows, image.cols) != (region.rows, region.cols)
        {
            return Err(ProviderError::Protocol(format!(
                "{}: image is {}x{}, requested {}x{}",
                context, image.rows, image.cols, region.rows, region.cols
            )));
        }
        Ok(image)
    }

    /// Make the worker hit a native fatal error. Always fails with
    /// [`ProviderError::Fatal`]; the provider is usable again afterwards.
    pub fn trigger_fatal_error(&self, message: &str) -> Result<()> {
        self.request(
            Opcode::Fatal,
            vec![json!(message)],
            "triggering a fatal error in the worker",
        )
        .map(|_| ())
    }
}
