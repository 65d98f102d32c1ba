//! Test helpers shared across commonlib crates.
//!
//! Enable the `test-utils` feature to use these from another crate's tests.

use std::path::{Path, PathBuf};

/// Walk up from the working directory to the nearest directory holding a
/// `Cargo.toml`.
///
/// # Panics
///
/// Panics when no manifest is found; this indicates a broken test setup.
pub fn crate_root() -> PathBuf {
    let mut current = std::env::current_dir()
        .unwrap_or_else(|e| panic!("failed to read working directory: {}", e));
    loop {
        if current.join("Cargo.toml").is_file() {
            return current;
        }
        if !current.pop() {
            panic!("no Cargo.toml found above the working directory");
        }
    }
}

/// Read a resource file relative to the crate root.
///
/// # Panics
///
/// Panics when the file cannot be read.
pub fn load_resource_file(path: impl AsRef<Path>) -> Vec<u8> {
    let full = crate_root().join(path.as_ref());
    std::fs::read(&full).unwrap_or_else(|e| panic!("failed to read {:?}: {}", full, e))
}
