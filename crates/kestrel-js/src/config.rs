//! Script Configuration
//!
//! Options of the `ecmascript` section of the browser configuration.

use serde::Deserialize;

use crate::error::JsError;

/// Script hosting options
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct JsConfig {
    /// Run page scripts at all
    pub enabled: bool,
    /// Let XMLHttpRequest load `file:` URLs
    pub allow_xhr_file: bool,
    /// Refuse `window.open`
    pub block_window_opening: bool,
    /// Lower bound for `setInterval` delays
    pub min_interval_ms: u64,
    /// Timers plus in-flight requests a page may hold
    pub max_pending_operations: usize,
    /// Heap object limit of the reference engine
    pub heap_max_objects: usize,
}

impl Default for JsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_xhr_file: false,
            block_window_opening: false,
            min_interval_ms: 10,
            max_pending_operations: 1024,
            heap_max_objects: 1 << 20,
        }
    }
}

impl JsConfig {
    /// Load from JSON; missing keys keep their defaults
    pub fn from_json(json: &str) -> Result<Self, JsError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json() {
        let config = JsConfig::from_json(r#"{"allow_xhr_file": true, "min_interval_ms": 50}"#).unwrap();
        assert!(config.enabled);
        assert!(config.allow_xhr_file);
        assert_eq!(config.min_interval_ms, 50);
        assert_eq!(config.max_pending_operations, JsConfig::default().max_pending_operations);
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(JsConfig::from_json("{"), Err(JsError::Config(_))));
    }
}
