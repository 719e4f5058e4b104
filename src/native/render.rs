//! Raster rendering: resample a raster map onto a region and color it.

use super::store::RasterMap;
use crate::model::{PixelFormat, RasterImage, Region};
use serde::{Deserialize, Serialize};

/// Color assigned to a cell value; colors between rules are interpolated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorRule {
    pub value: f64,
    pub color: [u8; 3],
}

/// Color table built from a map's rules, or a grey ramp over the data range
/// when the map defines none.
#[derive(Debug, Clone)]
pub struct ColorTable {
    rules: Vec<ColorRule>,
}

impl ColorTable {
    pub fn for_map(map: &RasterMap) -> Self {
        let mut rules: Vec<ColorRule> = map
            .colors
            .iter()
            .copied()
            .filter(|r| r.value.is_finite())
            .collect();

        if rules.is_empty() {
            let (min, max) = map
                .cells
                .iter()
                .flatten()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(*v), hi.max(*v))
                });
            if min.is_finite() {
                rules = vec![
                    ColorRule {
                        value: min,
                        color: [0, 0, 0],
                    },
                    ColorRule {
                        value: max,
                        color: [255, 255, 255],
                    },
                ];
            }
        }

        rules.sort_by(|a, b| a.value.total_cmp(&b.value));
        Self { rules }
    }

    pub fn color(&self, value: f64) -> [u8; 3] {
        let Some(first) = self.rules.first() else {
            return [0, 0, 0];
        };
        if value <= first.value {
            return first.color;
        }
        for pair in self.rules.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if value <= hi.value {
                let span = hi.value - lo.value;
                let t = if span > 0.0 {
                    (value - lo.value) / span
                } else {
                    1.0
                };
                return lerp(lo.color, hi.color, t);
            }
        }
        self.rules[self.rules.len() - 1].color
    }
}

fn lerp(a: [u8; 3], b: [u8; 3], t: f64) -> [u8; 3] {
    let mix = |x: u8, y: u8| (x as f64 + (y as f64 - x as f64) * t).round() as u8;
    [mix(a[0], b[0]), mix(a[1], b[1]), mix(a[2], b[2])]
}

/// Render `map` onto `target` (nearest neighbour at cell centers). Cells
/// outside the map or null are fully transparent.
pub fn render(map: &RasterMap, target: &Region, format: PixelFormat) -> RasterImage {
    let colors = ColorTable::for_map(map);
    let (ns, ew) = (target.ns_res(), target.ew_res());
    let mut data = Vec::with_capacity(target.cell_count() * 4);

    for row in 0..target.rows {
        let y = target.north - (row as f64 + 0.5) * ns;
        for col in 0..target.cols {
            let x = target.west + (col as f64 + 0.5) * ew;
            let pixel = match map.sample(x, y) {
                Some(value) => format.pack(colors.color(value), 255),
                None => format.pack([0, 0, 0], 0),
            };
            data.extend_from_slice(&pixel);
        }
    }

    RasterImage {
        rows: target.rows,
        cols: target.cols,
        format,
        data,
    }
}
