//! Path utilities for the geoprov map store.

use std::path::{Path, PathBuf};

/// Subdirectory of the data directory holding vector maps.
pub const VECTOR_DIR: &str = "vector";

/// Subdirectory of the data directory holding raster maps.
pub const RASTER_DIR: &str = "raster";

/// Get the default data directory for geoprov.
///
/// Uses the platform data directory:
/// - Linux: `~/.local/share/geoprov`
/// - macOS: `~/Library/Application Support/geoprov`
pub fn get_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("geoprov"))
        .unwrap_or_else(|| PathBuf::from(".geoprov"))
}

/// Path of the JSON document describing vector map `name`.
pub fn vector_map_path<P: AsRef<Path>>(data_dir: P, name: &str) -> PathBuf {
    data_dir
        .as_ref()
        .join(VECTOR_DIR)
        .join(format!("{}.json", name))
}

/// Path of the JSON document describing raster map `name`.
pub fn raster_map_path<P: AsRef<Path>>(data_dir: P, name: &str) -> PathBuf {
    data_dir
        .as_ref()
        .join(RASTER_DIR)
        .join(format!("{}.json", name))
}

/// Whether `name` is usable as a map name: non-empty, no path separators,
/// no leading dot.
pub fn is_valid_map_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '@'))
}

/// Expands a leading `~` in a path to the user's home directory.
///
/// This handles the common case where shell tilde expansion doesn't occur,
/// such as when using `--data-dir=~/maps` instead of `--data-dir ~/maps`.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use geoprov::paths::expand_tilde;
///
/// let path = PathBuf::from("/tmp/foo");
/// assert_eq!(expand_tilde(&path), path);
/// ```
pub fn expand_tilde<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();
    if let Ok(stripped) = path.strip_prefix("~")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(stripped);
    }
    path.to_path_buf()
}
