//! Map-backed settings provider.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde_json::Value;

use crate::traits::SettingsProvider;

/// Settings held in a map. Mutable at runtime so delayed retries observe
/// changed values, matching the read-at-use-time contract.
#[derive(Default)]
pub struct StaticSettings {
    values: RwLock<BTreeMap<String, Value>>,
}

impl StaticSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.values.write().insert(key.into(), value);
    }
}

impl SettingsProvider for StaticSettings {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{SETTING_ALLOW_INVALID_CERTS, SETTING_SITE_URL};
    use serde_json::json;

    #[test]
    fn helpers_read_typed_values() {
        let settings = StaticSettings::new();
        assert!(settings.site_url().is_none());
        assert!(!settings.allow_invalid_certs());

        settings.set(SETTING_SITE_URL, json!("https://chat.example"));
        settings.set(SETTING_ALLOW_INVALID_CERTS, json!(true));

        assert_eq!(settings.site_url().as_deref(), Some("https://chat.example"));
        assert!(settings.allow_invalid_certs());
    }
}
