//! Interpreter configuration
//!
//! Tunables for an interpreter instance. Construct with [`InterpConfig::new`]
//! and the builder methods, or load from TOML:
//!
//! ```toml
//! [interp]
//! node-pool-capacity = 8192
//! data-stack-capacity = 1024
//! level-limit = 256
//! gc-ballast = 4096
//! relaxed-scan = false
//! ```

use serde::Deserialize;
use sigil_core::DEFAULT_BALLAST;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct InterpConfig {
    /// Initial node pool capacity (slots).
    pub node_pool_capacity: usize,
    /// Initial data stack capacity (cells).
    pub data_stack_capacity: usize,
    /// Maximum combined depth of evaluation levels and action frames.
    pub level_limit: usize,
    /// Allocations between automatic collection requests.
    pub gc_ballast: i64,
    /// Scanner default: emit ERROR! values instead of failing the scan.
    pub relaxed_scan: bool,
}

impl Default for InterpConfig {
    fn default() -> Self {
        InterpConfig {
            node_pool_capacity: 8192,
            data_stack_capacity: 1024,
            level_limit: 256,
            gc_ballast: DEFAULT_BALLAST,
            relaxed_scan: false,
        }
    }
}

/// Wrapper table so config files read `[interp]`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    interp: InterpConfig,
}

impl InterpConfig {
    pub fn new() -> Self {
        InterpConfig::default()
    }

    pub fn with_node_pool_capacity(mut self, capacity: usize) -> Self {
        self.node_pool_capacity = capacity;
        self
    }

    pub fn with_data_stack_capacity(mut self, capacity: usize) -> Self {
        self.data_stack_capacity = capacity;
        self
    }

    pub fn with_level_limit(mut self, limit: usize) -> Self {
        self.level_limit = limit;
        self
    }

    pub fn with_gc_ballast(mut self, ballast: i64) -> Self {
        self.gc_ballast = ballast;
        self
    }

    pub fn with_relaxed_scan(mut self, relaxed: bool) -> Self {
        self.relaxed_scan = relaxed;
        self
    }

    /// Parse a TOML configuration document.
    pub fn from_toml(text: &str) -> Result<Self, String> {
        let file: ConfigFile =
            toml::from_str(text).map_err(|e| format!("invalid interpreter config: {e}"))?;
        Ok(file.interp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = InterpConfig::default();
        assert_eq!(c.level_limit, 256);
        assert!(!c.relaxed_scan);
    }

    #[test]
    fn test_builder() {
        let c = InterpConfig::new().with_level_limit(64).with_gc_ballast(16);
        assert_eq!(c.level_limit, 64);
        assert_eq!(c.gc_ballast, 16);
    }

    #[test]
    fn test_from_toml() {
        let c = InterpConfig::from_toml(
            "[interp]\nlevel-limit = 32\nrelaxed-scan = true\n",
        )
        .unwrap();
        assert_eq!(c.level_limit, 32);
        assert!(c.relaxed_scan);
        // Unspecified keys keep defaults.
        assert_eq!(c.gc_ballast, InterpConfig::default().gc_ballast);
    }

    #[test]
    fn test_bad_toml_reports() {
        assert!(InterpConfig::from_toml("interp = 3").is_err());
    }
}
