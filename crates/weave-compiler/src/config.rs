//! Compiler configuration

use serde::{Deserialize, Serialize};

/// Compiler settings
///
/// Every field has a default, so a partial TOML table is enough:
///
/// ```toml
/// max_chain_depth = 16
/// fallback_to_stale = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    /// Longest inheritance chain accepted before giving up
    pub max_chain_depth: usize,
    /// Serve the previous artifact, marked stale, when compilation fails
    pub fallback_to_stale: bool,
    /// Serialize concurrent compilations of the same view and context
    pub dedupe_inflight: bool,
    /// Log extensions whose order is decided by id alone
    pub warn_on_ordering_conflicts: bool,
}

impl CompilerConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With maximum chain depth
    #[inline]
    #[must_use]
    pub fn with_max_chain_depth(mut self, depth: usize) -> Self {
        self.max_chain_depth = depth;
        self
    }

    /// With stale fallback enabled or disabled
    #[inline]
    #[must_use]
    pub fn with_fallback_to_stale(mut self, enabled: bool) -> Self {
        self.fallback_to_stale = enabled;
        self
    }

    /// With in-flight de-duplication enabled or disabled
    #[inline]
    #[must_use]
    pub fn with_dedupe_inflight(mut self, enabled: bool) -> Self {
        self.dedupe_inflight = enabled;
        self
    }

    /// With ordering conflict warnings enabled or disabled
    #[inline]
    #[must_use]
    pub fn with_warn_on_ordering_conflicts(mut self, enabled: bool) -> Self {
        self.warn_on_ordering_conflicts = enabled;
        self
    }

    /// Parse from a TOML document
    ///
    /// # Errors
    /// Returns [`ConfigError`] on malformed TOML, unknown keys or a zero
    /// chain depth.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] for out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_chain_depth == 0 {
            return Err(ConfigError::Invalid("max_chain_depth must be at least 1".to_string()));
        }
        Ok(())
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_chain_depth: 64,
            fallback_to_stale: true,
            dedupe_inflight: true,
            warn_on_ordering_conflicts: true,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML syntax or type error
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Value out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CompilerConfig::new();
        assert_eq!(config.max_chain_depth, 64);
        assert!(config.fallback_to_stale);
        assert!(config.dedupe_inflight);
        assert!(config.warn_on_ordering_conflicts);
    }

    #[test]
    fn partial_toml() {
        let config = CompilerConfig::from_toml_str("max_chain_depth = 8\nfallback_to_stale = false\n").unwrap();
        assert_eq!(config, CompilerConfig::new().with_max_chain_depth(8).with_fallback_to_stale(false));
        assert_eq!(CompilerConfig::from_toml_str("").unwrap(), CompilerConfig::default());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            CompilerConfig::from_toml_str("max_chain_depth = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            CompilerConfig::from_toml_str("max_depth = 3"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            CompilerConfig::from_toml_str("fallback_to_stale = 1"),
            Err(ConfigError::Parse(_))
        ));
    }
}
