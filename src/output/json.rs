//! JSON output.

use serde::Serialize;

/// Print any result as pretty JSON.
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("failed to encode output: {}", e),
    }
}
