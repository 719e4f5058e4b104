//! Color theming for CLI output.
//!
//! One semantic palette for both `owo_colors` text and `comfy_table` cells.
//! Colors are disabled globally by `--no-color` or `NO_COLOR`, after which
//! every styling function returns plain text.

use owo_colors::OwoColorize;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};

static COLORS_ENABLED: AtomicBool = AtomicBool::new(true);

/// Disable all colors globally. Call early in main().
pub fn disable_colors() {
    COLORS_ENABLED.store(false, Ordering::Relaxed);
    owo_colors::set_override(false);
}

pub fn colors_enabled() -> bool {
    COLORS_ENABLED.load(Ordering::Relaxed)
}

/// Semantic color categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Semantic {
    /// Map names
    MapName,
    /// Feature ids
    Id,
    /// Category numbers
    Category,
    /// WKB and pixel payloads
    Payload,
    /// Null cells and other secondary text
    Muted,
}

/// comfy_table color for a category, `None` when colors are off.
pub fn table_color(semantic: Semantic) -> Option<comfy_table::Color> {
    if !colors_enabled() {
        return None;
    }
    Some(match semantic {
        Semantic::MapName => comfy_table::Color::Cyan,
        Semantic::Id => comfy_table::Color::Green,
        Semantic::Category => comfy_table::Color::Yellow,
        Semantic::Payload => comfy_table::Color::Magenta,
        Semantic::Muted => comfy_table::Color::DarkGrey,
    })
}

/// Semantic coloring for comfy_table cells.
pub trait ThemedCell {
    fn themed(self, semantic: Semantic) -> Self;
}

impl ThemedCell for comfy_table::Cell {
    fn themed(self, semantic: Semantic) -> Self {
        match table_color(semantic) {
            Some(color) => self.fg(color),
            None => self,
        }
    }
}

fn paint<T: Display>(value: &T, style: impl FnOnce(&T) -> String) -> String {
    if colors_enabled() {
        style(value)
    } else {
        value.to_string()
    }
}

/// Semantic styles for terminal text.
pub trait Themed: Display + Sized {
    /// Map names (cyan).
    fn map_name(&self) -> String {
        paint(self, |v| v.cyan().to_string())
    }

    /// Field labels (yellow).
    fn label(&self) -> String {
        paint(self, |v| v.yellow().to_string())
    }

    /// Secondary text (dimmed).
    fn muted(&self) -> String {
        paint(self, |v| v.dimmed().to_string())
    }

    /// Success messages (green + bold).
    fn success(&self) -> String {
        paint(self, |v| v.green().bold().to_string())
    }

    /// Warnings (yellow + bold).
    fn warning(&self) -> String {
        paint(self, |v| v.yellow().bold().to_string())
    }

    /// Section headers (bold + underline).
    fn section_header(&self) -> String {
        paint(self, |v| v.bold().underline().to_string())
    }
}

impl Themed for &str {}
impl Themed for String {}
impl Themed for i32 {}
impl Themed for i64 {}
impl Themed for u64 {}
impl Themed for usize {}
