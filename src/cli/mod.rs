mod commands;

pub use commands::{Cli, Commands, MessageArgs, SettingsAction};

use anyhow::{bail, Result};
use serde_json::{Map, Value};

/// Partial settings document for one dotted path. The value is parsed as
/// JSON when possible and kept as a string otherwise.
pub fn settings_patch(path: &str, raw: &str) -> Result<Value> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        bail!("Invalid settings path '{}'", path);
    }

    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok(segments.iter().rev().fold(value, |inner, segment| {
        let mut map = Map::new();
        map.insert(segment.to_string(), inner);
        Value::Object(map)
    }))
}
