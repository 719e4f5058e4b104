//! Colored table output for provider results.

use crate::model::{FeatureRecord, PixelFormat, RasterImage, VectorTable, hex_bytes};
use crate::provider::ProviderStats;
use crate::theme::{Semantic, Themed, ThemedCell};
use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL};
use serde_json::Value;

/// Hex WKB longer than this is shortened in tables.
const MAX_WKB_CHARS: usize = 48;

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn value_cell(value: &Value) -> Cell {
    match value {
        Value::Null => Cell::new("-").themed(Semantic::Muted),
        Value::String(s) => Cell::new(s),
        other => Cell::new(other.to_string()),
    }
}

/// Print an attribute table.
pub fn print_vector_table(map: &str, table: &VectorTable) {
    if table.rows.is_empty() {
        println!("No rows in {}.", map.map_name());
        return;
    }

    let mut out = new_table();
    out.set_header(
        table
            .columns
            .iter()
            .map(|c| format!("{} ({})", c.name, format!("{:?}", c.kind).to_lowercase())),
    );

    for row in &table.rows {
        out.add_row(row.iter().map(value_cell));
    }

    println!("{out}");
    println!("{}", format!("{} rows", table.rows.len()).muted());
}

/// WKB geometry type name from the header bytes.
fn geometry_name(wkb: &[u8]) -> &'static str {
    let Some(&[order, a, b, c, d]) = wkb.first_chunk::<5>() else {
        return "?";
    };
    let code = if order == 1 {
        u32::from_le_bytes([a, b, c, d])
    } else {
        u32::from_be_bytes([a, b, c, d])
    };
    match code {
        1 => "Point",
        2 => "LineString",
        3 => "Polygon",
        _ => "?",
    }
}

fn short_hex(bytes: &[u8]) -> String {
    let hex = hex_bytes::encode(bytes);
    if hex.len() > MAX_WKB_CHARS {
        format!("{}...", &hex[..MAX_WKB_CHARS])
    } else {
        hex
    }
}

/// Print feature records with their geometry type and WKB.
pub fn print_features(map: &str, features: &[FeatureRecord]) {
    if features.is_empty() {
        println!("No features in {}.", map.map_name());
        return;
    }

    let mut table = new_table();
    table.set_header(vec!["Id", "Cat", "Geometry", "WKB"]);

    for feature in features {
        let cat = match feature.cat {
            Some(cat) => Cell::new(cat).themed(Semantic::Category),
            None => Cell::new("-").themed(Semantic::Muted),
        };
        table.add_row(vec![
            Cell::new(feature.id).themed(Semantic::Id),
            cat,
            Cell::new(geometry_name(&feature.wkb)),
            Cell::new(short_hex(&feature.wkb)).themed(Semantic::Payload),
        ]);
    }

    println!("{table}");
    println!("{}", format!("{} features", features.len()).muted());
}

/// Print the size and pixel coverage of a rendered image.
pub fn print_raster_summary(map: &str, image: &RasterImage) {
    let cells = image.rows * image.cols;
    let alpha_index = match image.format {
        PixelFormat::Argb => 0,
        _ => 3,
    };
    let opaque = image
        .data
        .chunks_exact(4)
        .filter(|px| px[alpha_index] != 0)
        .count();

    println!("{}", map.map_name().section_header());
    let mut table = new_table();
    table.add_row(vec![Cell::new("Size"), Cell::new(format!("{} x {}", image.cols, image.rows))]);
    table.add_row(vec![Cell::new("Format"), Cell::new(format!("{:?}", image.format).to_lowercase())]);
    table.add_row(vec![Cell::new("Bytes"), Cell::new(image.data.len())]);
    table.add_row(vec![
        Cell::new("Covered"),
        Cell::new(format!("{} of {} cells", opaque, cells)),
    ]);
    println!("{table}");
}

/// Print supervisor counters.
pub fn print_stats(stats: &ProviderStats) {
    let mut table = new_table();
    table.set_header(vec!["Generation", "Restarts", "Calls", "Fatals", "Pid"]);
    let pid = match stats.pid {
        Some(pid) => Cell::new(pid).themed(Semantic::Id),
        None => Cell::new("-").themed(Semantic::Muted),
    };
    table.add_row(vec![
        Cell::new(stats.generation),
        Cell::new(stats.restarts),
        Cell::new(stats.calls),
        Cell::new(stats.fatals),
        pid,
    ]);
    println!("{table}");
}
