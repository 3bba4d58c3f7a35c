//! Settings migration and default merging
//!
//! Both functions operate on raw JSON so they can run before the stored
//! document is known to match the current `UserSettings` layout.

use serde_json::{Map, Value};

use super::SETTINGS_VERSION;

const LEGACY_LANGUAGE_FIELD: &str = "outputLanguage";
const LANGUAGE_FIELDS: [&str; 3] = ["replyLanguage", "analysisLanguage", "translationLanguage"];

/// Upgrade a stored settings document in place.
///
/// Version 1 kept a single `general.outputLanguage`; it is copied into each
/// of the per-purpose language fields that is not already set, then removed.
/// Returns `true` when the document was changed.
pub fn migrate_legacy_settings(stored: &mut Value) -> bool {
    let Some(root) = stored.as_object_mut() else {
        return false;
    };

    let mut changed = false;

    if let Some(general) = root.get_mut("general").and_then(Value::as_object_mut) {
        if let Some(legacy) = general.remove(LEGACY_LANGUAGE_FIELD) {
            for field in LANGUAGE_FIELDS {
                let missing = general.get(field).map_or(true, |v| v.is_null() || v.as_str() == Some(""));
                if missing {
                    general.insert(field.to_string(), legacy.clone());
                }
            }
            changed = true;
            tracing::info!("[Settings] Migrated legacy outputLanguage to per-purpose languages");
        }
    }

    let version = root.get("version").and_then(Value::as_u64).unwrap_or(1);
    if version < u64::from(SETTINGS_VERSION) {
        root.insert("version".to_string(), Value::from(SETTINGS_VERSION));
        changed = true;
    }

    changed
}

/// Recursively merge `source` onto `target`.
/// Objects merge key by key; arrays and scalars from `source` replace.
pub fn deep_merge(target: &Value, source: &Value) -> Value {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            let mut output: Map<String, Value> = target_map.clone();
            for (key, source_value) in source_map {
                let merged = match output.get(key) {
                    Some(target_value) if source_value.is_object() => {
                        deep_merge(target_value, source_value)
                    }
                    _ => source_value.clone(),
                };
                output.insert(key.clone(), merged);
            }
            Value::Object(output)
        }
        (_, source) => source.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn legacy_fixture() -> Value {
        json!({
            "ai": { "apiKey": "sk-legacy", "model": "gpt-4o" },
            "general": {
                "outputLanguage": "ur-roman",
                "translationLanguage": "fr",
                "messageLimit": 30
            },
            "cache": { "retentionDays": 3 }
        })
    }

    #[test]
    fn test_migrates_output_language() {
        let mut stored = legacy_fixture();
        assert!(migrate_legacy_settings(&mut stored));

        let general = &stored["general"];
        assert!(general.get("outputLanguage").is_none());
        assert_eq!(general["replyLanguage"], "ur-roman");
        assert_eq!(general["analysisLanguage"], "ur-roman");
        // Already-set fields win over the legacy value
        assert_eq!(general["translationLanguage"], "fr");
        assert_eq!(stored["version"], SETTINGS_VERSION);
    }

    #[test]
    fn test_migration_is_idempotent() {
        let mut stored = legacy_fixture();
        migrate_legacy_settings(&mut stored);
        let once = stored.clone();

        assert!(!migrate_legacy_settings(&mut stored));
        assert_eq!(stored, once);
    }

    #[test]
    fn test_non_object_is_left_alone() {
        let mut stored = json!("garbage");
        assert!(!migrate_legacy_settings(&mut stored));
    }

    #[test]
    fn test_deep_merge_nested_objects() {
        let defaults = json!({
            "cache": { "retentionDays": 7, "maxCacheSize": 50 },
            "privacy": { "excludedChats": ["a", "b"] },
            "theme": "auto"
        });
        let stored = json!({
            "cache": { "retentionDays": 3 },
            "privacy": { "excludedChats": ["c"] }
        });

        let merged = deep_merge(&defaults, &stored);
        assert_eq!(merged["cache"]["retentionDays"], 3);
        assert_eq!(merged["cache"]["maxCacheSize"], 50);
        assert_eq!(merged["privacy"]["excludedChats"], json!(["c"]));
        assert_eq!(merged["theme"], "auto");
    }
}
