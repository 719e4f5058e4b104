//! On-disk map store.
//!
//! Maps live under the data directory as JSON documents:
//! `vector/<name>.json` and `raster/<name>.json`.

use super::NativeError;
use super::filter::Filter;
use super::render::ColorRule;
use super::wkb::Geometry;
use crate::model::{Column, FeatureRecord, FeatureType, Region, VectorTable};
use crate::paths;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// A vector feature as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFeature {
    pub id: i64,
    #[serde(default)]
    pub cat: Option<i64>,
    /// Layer number the category belongs to.
    #[serde(default = "default_field")]
    pub field: i32,
    pub geometry: Geometry,
}

fn default_field() -> i32 {
    1
}

/// A vector map: attribute table plus geometries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMap {
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
    #[serde(default)]
    pub features: Vec<StoredFeature>,
}

impl VectorMap {
    /// Attribute rows, optionally restricted by a filter expression.
    pub fn table(&self, filter: Option<&str>) -> Result<VectorTable, NativeError> {
        let rows = match filter.map(str::trim).filter(|f| !f.is_empty()) {
            None => self.rows.clone(),
            Some(expr) => {
                let filter = Filter::parse(expr).map_err(NativeError::InvalidArgument)?;
                let idx = self
                    .columns
                    .iter()
                    .position(|c| c.name == filter.column)
                    .ok_or_else(|| {
                        NativeError::InvalidArgument(format!("unknown column '{}'", filter.column))
                    })?;
                self.rows
                    .iter()
                    .filter(|row| filter.matches(row.get(idx).unwrap_or(&Value::Null)))
                    .cloned()
                    .collect()
            }
        };

        Ok(VectorTable {
            columns: self.columns.clone(),
            rows,
        })
    }

    /// Features of one geometry class on one layer, optionally clipped to an
    /// extent by bounding-box intersection.
    pub fn features(
        &self,
        extent: Option<&Region>,
        feature_type: FeatureType,
        field: i32,
    ) -> Vec<FeatureRecord> {
        self.features
            .iter()
            .filter(|f| f.field == field && f.geometry.feature_type() == feature_type)
            .filter(|f| match (extent, f.geometry.bbox()) {
                (None, _) => true,
                (Some(region), Some((min, max))) => region.intersects_bbox(min, max),
                (Some(_), None) => false,
            })
            .map(|f| FeatureRecord {
                id: f.id,
                cat: f.cat,
                wkb: f.geometry.to_wkb(),
            })
            .collect()
    }
}

/// A raster map: a grid of optional cell values plus color rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterMap {
    pub region: Region,
    pub cells: Vec<Option<f64>>,
    #[serde(default)]
    pub colors: Vec<ColorRule>,
}

impl RasterMap {
    pub fn validate(&self) -> Result<(), String> {
        self.region.validate()?;
        if self.cells.len() != self.region.cell_count() {
            return Err(format!(
                "expected {} cells for {}x{} region, found {}",
                self.region.cell_count(),
                self.region.rows,
                self.region.cols,
                self.cells.len()
            ));
        }
        Ok(())
    }

    /// Value of the cell containing `(x, y)`, if inside the map and not null.
    pub fn sample(&self, x: f64, y: f64) -> Option<f64> {
        let r = &self.region;
        if x < r.west || x >= r.east || y <= r.south || y > r.north {
            return None;
        }
        let row = (((r.north - y) / r.ns_res()) as usize).min(r.rows - 1);
        let col = (((x - r.west) / r.ew_res()) as usize).min(r.cols - 1);
        self.cells[row * r.cols + col]
    }
}

/// Read-only access to the maps under a data directory.
#[derive(Debug, Clone)]
pub struct MapStore {
    root: PathBuf,
}

impl MapStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn vector(&self, name: &str) -> Result<VectorMap, NativeError> {
        let path = self.locate(name, "vector", paths::vector_map_path(&self.root, name))?;
        load_json(&path, name)
    }

    pub fn raster(&self, name: &str) -> Result<RasterMap, NativeError> {
        let path = self.locate(name, "raster", paths::raster_map_path(&self.root, name))?;
        let map: RasterMap = load_json(&path, name)?;
        map.validate().map_err(|reason| NativeError::InvalidMap {
            name: name.to_string(),
            reason,
        })?;
        Ok(map)
    }

    fn locate(&self, name: &str, kind: &'static str, path: PathBuf) -> Result<PathBuf, NativeError> {
        if !paths::is_valid_map_name(name) {
            return Err(NativeError::InvalidArgument(format!(
                "invalid {} map name '{}'",
                kind, name
            )));
        }
        if !path.is_file() {
            return Err(NativeError::MapNotFound {
                kind,
                name: name.to_string(),
            });
        }
        Ok(path)
    }
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path, name: &str) -> Result<T, NativeError> {
    let contents = fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| NativeError::InvalidMap {
        name: name.to_string(),
        reason: e.to_string(),
    })
}
