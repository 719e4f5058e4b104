//! Data types exchanged between worker functions and the typed client API.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A spatial window: bounds plus the grid resolution to sample it at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
    pub rows: usize,
    pub cols: usize,
}

impl Region {
    /// Check that the bounds are ordered and the grid is non-empty.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.north > self.south) {
            return Err(format!(
                "north ({}) must be greater than south ({})",
                self.north, self.south
            ));
        }
        if !(self.east > self.west) {
            return Err(format!(
                "east ({}) must be greater than west ({})",
                self.east, self.west
            ));
        }
        if self.rows == 0 || self.cols == 0 {
            return Err(format!("empty grid: {} rows x {} cols", self.rows, self.cols));
        }
        Ok(())
    }

    /// North-south cell size.
    pub fn ns_res(&self) -> f64 {
        (self.north - self.south) / self.rows as f64
    }

    /// East-west cell size.
    pub fn ew_res(&self) -> f64 {
        (self.east - self.west) / self.cols as f64
    }

    pub fn cell_count(&self) -> usize {
        self.rows * self.cols
    }

    /// Whether the bounding box `[min, max]` touches this region.
    pub fn intersects_bbox(&self, min: [f64; 2], max: [f64; 2]) -> bool {
        min[0] <= self.east && max[0] >= self.west && min[1] <= self.north && max[1] >= self.south
    }
}

/// Geometry class selector for feature queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureType {
    #[default]
    Point,
    Line,
    Area,
}

impl FromStr for FeatureType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "point" | "points" => Ok(Self::Point),
            "line" | "lines" => Ok(Self::Line),
            "area" | "areas" | "polygon" => Ok(Self::Area),
            _ => Err(format!(
                "Unknown feature type: '{}'. Valid options: point, line, area",
                s
            )),
        }
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Point => write!(f, "point"),
            Self::Line => write!(f, "line"),
            Self::Area => write!(f, "area"),
        }
    }
}

/// Channel order of rendered raster pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    #[default]
    Argb,
    Bgra,
    Rgba,
}

impl PixelFormat {
    /// Arrange a color and alpha into this format's byte order.
    pub fn pack(self, [r, g, b]: [u8; 3], a: u8) -> [u8; 4] {
        match self {
            Self::Argb => [a, r, g, b],
            Self::Bgra => [b, g, r, a],
            Self::Rgba => [r, g, b, a],
        }
    }
}

impl FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "argb" => Ok(Self::Argb),
            "bgra" => Ok(Self::Bgra),
            "rgba" => Ok(Self::Rgba),
            _ => Err(format!(
                "Unknown pixel format: '{}'. Valid options: argb, bgra, rgba",
                s
            )),
        }
    }
}

/// Declared type of an attribute column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Double,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ColumnType,
}

/// Attribute table of a vector map as structured rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorTable {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

impl VectorTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// All values of one column, in row order.
    pub fn column_values(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(idx).unwrap_or(&Value::Null))
                .collect(),
        )
    }
}

/// One vector feature: id, category and WKB-encoded geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub id: i64,
    pub cat: Option<i64>,
    #[serde(with = "hex_bytes")]
    pub wkb: Vec<u8>,
}

/// A raster window rendered to pixels, 4 bytes per cell in `format` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterImage {
    pub rows: usize,
    pub cols: usize,
    pub format: PixelFormat,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

impl RasterImage {
    /// Pixel at `(row, col)`, if in range.
    pub fn pixel(&self, row: usize, col: usize) -> Option<[u8; 4]> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        let start = (row * self.cols + col) * 4;
        let bytes = self.data.get(start..start + 4)?;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

/// Serde adapter carrying binary payloads as lowercase hex strings.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use std::fmt::Write;

    pub fn encode(bytes: &[u8]) -> String {
        let mut out = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            let _ = write!(out, "{:02x}", b);
        }
        out
    }

    pub fn decode(hex: &str) -> Result<Vec<u8>, String> {
        if hex.len() % 2 != 0 {
            return Err(format!("odd-length hex string ({} chars)", hex.len()));
        }
        (0..hex.len())
            .step_by(2)
            .map(|i| {
                hex.get(i..i + 2)
                    .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                    .ok_or_else(|| format!("invalid hex at offset {}", i))
            })
            .collect()
    }

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let hex = String::deserialize(deserializer)?;
        decode(&hex).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn region() -> Region {
        Region {
            north: 10.0,
            south: 0.0,
            east: 20.0,
            west: 0.0,
            rows: 5,
            cols: 10,
        }
    }

    #[test]
    fn test_region_resolution() {
        let r = region();
        assert!(r.validate().is_ok());
        assert_eq!(r.ns_res(), 2.0);
        assert_eq!(r.ew_res(), 2.0);
        assert_eq!(r.cell_count(), 50);
    }

    #[test]
    fn test_region_validate_rejects_inverted_bounds() {
        let r = Region {
            north: 0.0,
            south: 10.0,
            ..region()
        };
        assert!(r.validate().unwrap_err().contains("north"));

        let r = Region { rows: 0, ..region() };
        assert!(r.validate().unwrap_err().contains("empty grid"));
    }

    #[test]
    fn test_region_intersects_bbox() {
        let r = region();
        assert!(r.intersects_bbox([5.0, 5.0], [6.0, 6.0]));
        assert!(r.intersects_bbox([-5.0, -5.0], [0.0, 0.0]));
        assert!(!r.intersects_bbox([21.0, 0.0], [30.0, 5.0]));
    }

    #[test]
    fn test_feature_type_from_str() {
        assert_eq!("point".parse::<FeatureType>().unwrap(), FeatureType::Point);
        assert_eq!("Lines".parse::<FeatureType>().unwrap(), FeatureType::Line);
        assert_eq!("polygon".parse::<FeatureType>().unwrap(), FeatureType::Area);
        assert!("boundary".parse::<FeatureType>().is_err());
    }

    #[test]
    fn test_pixel_format_pack() {
        let rgb = [1, 2, 3];
        assert_eq!(PixelFormat::Argb.pack(rgb, 255), [255, 1, 2, 3]);
        assert_eq!(PixelFormat::Bgra.pack(rgb, 255), [3, 2, 1, 255]);
        assert_eq!(PixelFormat::Rgba.pack(rgb, 0), [1, 2, 3, 0]);
    }

    #[test]
    fn test_hex_bytes() {
        assert_eq!(hex_bytes::encode(&[0x01, 0xab, 0xff]), "01abff");
        assert_eq!(hex_bytes::decode("01ABff").unwrap(), vec![0x01, 0xab, 0xff]);
        assert!(hex_bytes::decode("abc").is_err());
        assert!(hex_bytes::decode("zz").is_err());
    }

    #[test]
    fn test_feature_record_wire_format() {
        let record: FeatureRecord =
            serde_json::from_value(json!({"id": 7, "cat": 3, "wkb": "0101"})).unwrap();
        assert_eq!(record.wkb, vec![1, 1]);
        assert_eq!(serde_json::to_value(&record).unwrap()["wkb"], json!("0101"));
    }

    #[test]
    fn test_vector_table_column_values() {
        let table = VectorTable {
            columns: vec![
                Column {
                    name: "cat".into(),
                    kind: ColumnType::Integer,
                },
                Column {
                    name: "name".into(),
                    kind: ColumnType::Text,
                },
            ],
            rows: vec![vec![json!(1), json!("Main")], vec![json!(2)]],
        };
        let names = table.column_values("name").unwrap();
        assert_eq!(names, vec![&json!("Main"), &Value::Null]);
        assert!(table.column_values("missing").is_none());
    }

    #[test]
    fn test_raster_image_pixel() {
        let image = RasterImage {
            rows: 1,
            cols: 2,
            format: PixelFormat::Rgba,
            data: vec![1, 2, 3, 4, 5, 6, 7, 8],
        };
        assert_eq!(image.pixel(0, 1), Some([5, 6, 7, 8]));
        assert_eq!(image.pixel(1, 0), None);
    }
}
