//! Optimizer configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Secondary join inputs at or below this many bytes are broadcast.
    pub broadcast_limit_bytes: f64,

    /// Upper bound (inclusive) of the `Tiny` size class.
    pub tiny_limit_bytes: f64,

    /// Upper bound (inclusive) of the `Small` size class.
    pub small_limit_bytes: f64,

    /// Checkpoints whose input is known to be at most this many bytes are
    /// removed. `None` keeps every checkpoint.
    pub checkpoint_elision_bytes: Option<f64>,

    /// Remove pass-through marker operators.
    pub remove_markers: bool,

    /// Selectivity applied to filters whose expression is not recognized.
    pub default_selectivity: f64,

    /// Known sizes (bytes) of external inputs, keyed by input name.
    pub source_sizes: Vec<(String, f64)>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            broadcast_limit_bytes: 20.0 * 1024.0 * 1024.0, // 20 MiB
            tiny_limit_bytes: 1024.0 * 1024.0,
            small_limit_bytes: 256.0 * 1024.0 * 1024.0,
            checkpoint_elision_bytes: None,
            remove_markers: true,
            default_selectivity: 0.5,
            source_sizes: Vec::new(),
        }
    }
}

impl OptimizerConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `OPFLOW_BROADCAST_LIMIT_BYTES`
    /// - `OPFLOW_TINY_LIMIT_BYTES`
    /// - `OPFLOW_SMALL_LIMIT_BYTES`
    /// - `OPFLOW_CHECKPOINT_ELISION_BYTES`
    /// - `OPFLOW_REMOVE_MARKERS` (`true`/`false`)
    /// - `OPFLOW_DEFAULT_SELECTIVITY`
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("OPFLOW_BROADCAST_LIMIT_BYTES") {
            if let Ok(v) = s.parse::<f64>() {
                cfg.broadcast_limit_bytes = v;
            }
        }

        if let Ok(s) = std::env::var("OPFLOW_TINY_LIMIT_BYTES") {
            if let Ok(v) = s.parse::<f64>() {
                cfg.tiny_limit_bytes = v;
            }
        }

        if let Ok(s) = std::env::var("OPFLOW_SMALL_LIMIT_BYTES") {
            if let Ok(v) = s.parse::<f64>() {
                cfg.small_limit_bytes = v;
            }
        }

        if let Ok(s) = std::env::var("OPFLOW_CHECKPOINT_ELISION_BYTES") {
            if let Ok(v) = s.parse::<f64>() {
                cfg.checkpoint_elision_bytes = Some(v);
            }
        }

        if let Ok(s) = std::env::var("OPFLOW_REMOVE_MARKERS") {
            if let Ok(v) = s.parse::<bool>() {
                cfg.remove_markers = v;
            }
        }

        if let Ok(s) = std::env::var("OPFLOW_DEFAULT_SELECTIVITY") {
            if let Ok(v) = s.parse::<f64>() {
                cfg.default_selectivity = v;
            }
        }

        cfg
    }

    /// Parse a YAML document; omitted keys keep their defaults.
    ///
    /// ```yaml
    /// broadcast_limit_bytes: 1048576
    /// checkpoint_elision_bytes: 65536
    /// source_sizes:
    ///   - [orders, 5.0e9]
    /// ```
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(s)?;
        Ok(cfg)
    }

    /// Size hint for an external input, if configured.
    pub fn source_size(&self, name: &str) -> Option<f64> {
        self.source_sizes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, size)| *size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_overrides_subset() {
        let cfg = OptimizerConfig::from_yaml_str(
            "broadcast_limit_bytes: 1024\n\
             remove_markers: false\n\
             source_sizes:\n  - [orders, 500.0]\n",
        )
        .unwrap();
        assert_eq!(cfg.broadcast_limit_bytes, 1024.0);
        assert!(!cfg.remove_markers);
        assert_eq!(cfg.source_size("orders"), Some(500.0));
        assert_eq!(cfg.source_size("missing"), None);
        // Untouched keys keep defaults.
        assert_eq!(cfg.default_selectivity, 0.5);
        assert!(cfg.checkpoint_elision_bytes.is_none());
    }

    #[test]
    fn test_yaml_rejects_wrong_type() {
        let err = OptimizerConfig::from_yaml_str("remove_markers: [1, 2]").unwrap_err();
        assert!(err.to_string().starts_with("Invalid configuration"));
    }
}
