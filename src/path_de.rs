//! JSON loading that reports the JSON path where deserialization failed.
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;

/// Deserialize with JSON-path context in error messages.
pub fn from_slice_with_path<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let de = &mut serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize::<_, T>(de).map_err(|err| {
        let path = err.path().to_string();
        anyhow!("at JSON path {path}: {}", err.into_inner())
    })
}

/// Read and deserialize a JSON file.
pub fn read_json<T: DeserializeOwned>(file: &Path) -> Result<T> {
    let bytes = std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    from_slice_with_path(&bytes).with_context(|| format!("failed to parse {}", file.display()))
}
