//! Geometry model and Well-Known Binary encoding.
//!
//! Geometries are stored GeoJSON-style in the map store and shipped to
//! clients as little-endian WKB.

use crate::model::FeatureType;
use serde::{Deserialize, Serialize};

const WKB_LITTLE_ENDIAN: u8 = 1;
const WKB_POINT: u32 = 1;
const WKB_LINESTRING: u32 = 2;
const WKB_POLYGON: u32 = 3;

/// A 2D geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: [f64; 2] },
    LineString { coordinates: Vec<[f64; 2]> },
    Polygon { coordinates: Vec<Vec<[f64; 2]>> },
}

impl Geometry {
    pub fn feature_type(&self) -> FeatureType {
        match self {
            Geometry::Point { .. } => FeatureType::Point,
            Geometry::LineString { .. } => FeatureType::Line,
            Geometry::Polygon { .. } => FeatureType::Area,
        }
    }

    /// Bounding box as `(min, max)`, or `None` for an empty geometry.
    pub fn bbox(&self) -> Option<([f64; 2], [f64; 2])> {
        let mut points: Box<dyn Iterator<Item = &[f64; 2]>> = match self {
            Geometry::Point { coordinates } => Box::new(std::iter::once(coordinates)),
            Geometry::LineString { coordinates } => Box::new(coordinates.iter()),
            Geometry::Polygon { coordinates } => Box::new(coordinates.iter().flatten()),
        };
        let first = *points.next()?;
        Some(points.fold((first, first), |(min, max), p| {
            (
                [min[0].min(p[0]), min[1].min(p[1])],
                [max[0].max(p[0]), max[1].max(p[1])],
            )
        }))
    }

    /// Encode as little-endian WKB.
    pub fn to_wkb(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64);
        out.push(WKB_LITTLE_ENDIAN);
        match self {
            Geometry::Point { coordinates } => {
                out.extend_from_slice(&WKB_POINT.to_le_bytes());
                put_point(&mut out, coordinates);
            }
            Geometry::LineString { coordinates } => {
                out.extend_from_slice(&WKB_LINESTRING.to_le_bytes());
                put_ring(&mut out, coordinates);
            }
            Geometry::Polygon { coordinates } => {
                out.extend_from_slice(&WKB_POLYGON.to_le_bytes());
                out.extend_from_slice(&(coordinates.len() as u32).to_le_bytes());
                for ring in coordinates {
                    put_ring(&mut out, ring);
                }
            }
        }
        out
    }
}

fn put_point(out: &mut Vec<u8>, [x, y]: &[f64; 2]) {
    out.extend_from_slice(&x.to_le_bytes());
    out.extend_from_slice(&y.to_le_bytes());
}

fn put_ring(out: &mut Vec<u8>, points: &[[f64; 2]]) {
    out.extend_from_slice(&(points.len() as u32).to_le_bytes());
    for p in points {
        put_point(out, p);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::hex_bytes;

    #[test]
    fn test_point_wkb() {
        let point = Geometry::Point {
            coordinates: [1.0, 2.0],
        };
        assert_eq!(
            hex_bytes::encode(&point.to_wkb()),
            "0101000000000000000000f03f0000000000000040"
        );
    }

    #[test]
    fn test_linestring_wkb_layout() {
        let line = Geometry::LineString {
            coordinates: vec![[0.0, 0.0], [1.0, 1.0], [2.0, 0.0]],
        };
        let wkb = line.to_wkb();
        // byte order + type + count + 3 points
        assert_eq!(wkb.len(), 1 + 4 + 4 + 3 * 16);
        assert_eq!(&wkb[1..5], &2u32.to_le_bytes());
        assert_eq!(&wkb[5..9], &3u32.to_le_bytes());
    }

    #[test]
    fn test_polygon_wkb_layout() {
        let square = vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]];
        let polygon = Geometry::Polygon {
            coordinates: vec![square],
        };
        let wkb = polygon.to_wkb();
        assert_eq!(wkb.len(), 1 + 4 + 4 + 4 + 5 * 16);
        assert_eq!(&wkb[5..9], &1u32.to_le_bytes());
    }

    #[test]
    fn test_bbox() {
        let line = Geometry::LineString {
            coordinates: vec![[3.0, -1.0], [-2.0, 4.0]],
        };
        assert_eq!(line.bbox(), Some(([-2.0, -1.0], [3.0, 4.0])));

        let empty = Geometry::LineString {
            coordinates: vec![],
        };
        assert_eq!(empty.bbox(), None);
    }

    #[test]
    fn test_geojson_style_deserialization() {
        let geom: Geometry =
            serde_json::from_str(r#"{"type": "Point", "coordinates": [5.5, 6.5]}"#).unwrap();
        assert_eq!(geom.feature_type(), FeatureType::Point);
    }
}
