use regex::{Captures, Regex};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub geocoder: GeocoderConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub debounce: DebounceConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

// ============================================================================
// Geocoder Config
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct GeocoderConfig {
    /// Geocoding proxy endpoint, queried with GET
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Name of the query-string parameter carrying the search text
    #[serde(default = "default_query_param")]
    pub query_param: String,
    /// Bearer token (supports ${ENV_VAR} syntax)
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// How long to back off after a 429 without a Retry-After header
    #[serde(default = "default_rate_limit_cooldown")]
    pub rate_limit_cooldown_secs: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            query_param: default_query_param(),
            api_key: None,
            timeout_ms: default_timeout_ms(),
            rate_limit_cooldown_secs: default_rate_limit_cooldown(),
        }
    }
}

impl GeocoderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_secs)
    }

    /// Expand environment variables in api_key, dropping it if it ends up empty
    pub fn resolve_api_key(&mut self) {
        if let Some(key) = &self.api_key {
            let (expanded, unresolved) = expand_env_vars(key);
            if !unresolved.is_empty() {
                warn!(vars = ?unresolved, "api_key references unset environment variables");
            }
            self.api_key = if expanded.trim().is_empty() {
                None
            } else {
                Some(expanded)
            };
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080/api/locations/search".into()
}

fn default_query_param() -> String {
    "q".into()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_rate_limit_cooldown() -> u64 {
    30
}

// ============================================================================
// Matching Config
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingConfig {
    /// Shortest trimmed input that will be sent to the geocoder
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            min_chars: default_min_chars(),
        }
    }
}

fn default_min_chars() -> usize {
    3
}

// ============================================================================
// Debounce Config
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct DebounceConfig {
    /// Quiet interval for city/state/zip edits
    #[serde(default = "default_refresh_ms")]
    pub refresh_ms: u64,
    /// Quiet interval for typeahead search
    #[serde(default = "default_typeahead_ms")]
    pub typeahead_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            refresh_ms: default_refresh_ms(),
            typeahead_ms: default_typeahead_ms(),
        }
    }
}

impl DebounceConfig {
    pub fn refresh(&self) -> Duration {
        Duration::from_millis(self.refresh_ms)
    }

    pub fn typeahead(&self) -> Duration {
        Duration::from_millis(self.typeahead_ms)
    }
}

fn default_refresh_ms() -> u64 {
    500
}

fn default_typeahead_ms() -> u64 {
    300
}

// ============================================================================
// Cache Config
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    300
}

static ENV_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// Substitute `${NAME}` references from the environment.
///
/// Unset variables expand to nothing and their names are returned alongside
/// the result. Anything that is not a well-formed reference is left alone.
fn expand_env_vars(s: &str) -> (String, Vec<String>) {
    let mut unresolved = Vec::new();
    let expanded = ENV_REF.replace_all(s, |caps: &Captures| {
        let name = &caps[1];
        std::env::var(name).unwrap_or_else(|_| {
            unresolved.push(name.to_string());
            String::new()
        })
    });
    (expanded.into_owned(), unresolved)
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(text)?;
        config.geocoder.resolve_api_key();
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("{} not found, using defaults", path.display());
            return Ok(Config::default());
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.matching.min_chars, 3);
        assert_eq!(config.debounce.refresh(), Duration::from_millis(500));
        assert_eq!(config.debounce.typeahead(), Duration::from_millis(300));
        assert_eq!(config.cache.ttl(), Duration::from_secs(300));
        assert!(config.cache.enabled);
        assert_eq!(config.geocoder.query_param, "q");
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_toml(
            r#"
            [geocoder]
            base_url = "https://geo.example.com/search"
            timeout_ms = 1500

            [debounce]
            typeahead_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.geocoder.base_url, "https://geo.example.com/search");
        assert_eq!(config.geocoder.timeout(), Duration::from_millis(1500));
        assert_eq!(config.debounce.typeahead_ms, 250);
        assert_eq!(config.debounce.refresh_ms, 500);
    }

    #[test]
    fn test_missing_env_var_drops_api_key() {
        let config = Config::from_toml(
            r#"
            [geocoder]
            api_key = "${ADDRVERIFY_TEST_UNSET_VARIABLE}"
            "#,
        )
        .unwrap();
        assert_eq!(config.geocoder.api_key, None);
    }

    #[test]
    fn test_expand_reports_unset_vars() {
        // cargo exports CARGO_PKG_NAME to test binaries
        let (expanded, unresolved) =
            expand_env_vars("key-${CARGO_PKG_NAME}-${ADDRVERIFY_TEST_UNSET_VARIABLE}");
        assert_eq!(expanded, "key-addrverify-");
        assert_eq!(unresolved, vec!["ADDRVERIFY_TEST_UNSET_VARIABLE".to_string()]);
    }

    #[test]
    fn test_expand_leaves_malformed_refs() {
        let (expanded, unresolved) = expand_env_vars("abc${unterminated");
        assert_eq!(expanded, "abc${unterminated");
        assert!(unresolved.is_empty());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            Config::from_toml("[cache]\nttl_secs = \"soon\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load(Path::new("/nonexistent/addrverify.toml")).unwrap();
        assert_eq!(config.geocoder.timeout_ms, 5000);
    }
}
