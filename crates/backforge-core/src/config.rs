//! Data layer configuration.
//!
//! Loaded from `BACKFORGE_*` environment variables on top of defaults. The
//! remote backend is optional: without `BACKFORGE_REMOTE_URL` every operation
//! is served by the fallback store.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::healing::DEFAULT_LABEL_COLUMN;
use crate::observability::LogFormat;
use crate::query::DEFAULT_PAGE_SIZE;
use crate::remote::PostgrestConfig;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_TIMEOUT_SECS: u64 = 300;
const DEFAULT_DDL_FUNCTION: &str = "exec_sql";

/// Remote backend connection settings.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Project URL of the PostgREST-compatible backend.
    pub url: String,
    /// API key (service or anon key).
    pub key: String,
    /// Per-call timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// RPC function that executes raw DDL statements.
    #[serde(default = "default_ddl_function")]
    pub ddl_function: String,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("url", &self.url)
            .field("key", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .field("ddl_function", &self.ddl_function)
            .finish()
    }
}

impl RemoteConfig {
    /// Client settings derived from this config.
    #[must_use]
    pub fn postgrest(&self) -> PostgrestConfig {
        PostgrestConfig {
            base_url: self.url.clone(),
            api_key: self.key.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            ddl_function: self.ddl_function.clone(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_ddl_function() -> String {
    DEFAULT_DDL_FUNCTION.to_string()
}

/// Behavioural knobs of the data layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataConfig {
    /// Rows returned when an offset is given without a limit.
    pub default_page_size: usize,
    /// Column receiving displaced non-numeric identifiers.
    pub label_column: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            label_column: DEFAULT_LABEL_COLUMN.to_string(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote backend, if configured.
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
    /// Data layer behaviour.
    #[serde(default)]
    pub data: DataConfig,
    /// Log output format.
    #[serde(skip)]
    pub log_format: LogFormat,
}

impl Config {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` naming the variable that failed to parse
    /// or validate.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` naming the variable that failed to parse
    /// or validate.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = Env(&lookup);
        let mut config = Self::default();

        if let Some(url) = env.string("BACKFORGE_REMOTE_URL") {
            let key = env.string("BACKFORGE_REMOTE_KEY").ok_or_else(|| {
                Error::InvalidInput(
                    "BACKFORGE_REMOTE_KEY is required when BACKFORGE_REMOTE_URL is set".to_string(),
                )
            })?;
            let mut remote = RemoteConfig {
                url,
                key,
                timeout_secs: DEFAULT_TIMEOUT_SECS,
                ddl_function: DEFAULT_DDL_FUNCTION.to_string(),
            };
            if let Some(timeout) = env.u64("BACKFORGE_REMOTE_TIMEOUT_SECS")? {
                remote.timeout_secs = timeout;
            }
            if let Some(function) = env.string("BACKFORGE_DDL_FUNCTION") {
                remote.ddl_function = function;
            }
            config.remote = Some(remote);
        }

        if let Some(size) = env.usize("BACKFORGE_DEFAULT_PAGE_SIZE")? {
            config.data.default_page_size = size;
        }
        if let Some(column) = env.string("BACKFORGE_LABEL_COLUMN") {
            config.data.label_column = column;
        }
        if let Some(format) = env.string("BACKFORGE_LOG_FORMAT") {
            config.log_format = parse_log_format("BACKFORGE_LOG_FORMAT", &format)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if let Some(remote) = &self.remote {
            let url = remote.url.trim();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::InvalidInput(format!(
                    "BACKFORGE_REMOTE_URL must start with http:// or https:// (got {url})"
                )));
            }
            if remote.key.trim().is_empty() {
                return Err(Error::InvalidInput(
                    "BACKFORGE_REMOTE_KEY cannot be empty".to_string(),
                ));
            }
            if remote.timeout_secs == 0 || remote.timeout_secs > MAX_TIMEOUT_SECS {
                return Err(Error::InvalidInput(format!(
                    "BACKFORGE_REMOTE_TIMEOUT_SECS must be between 1 and {MAX_TIMEOUT_SECS}"
                )));
            }
            crate::schema::validate_identifier(&remote.ddl_function, "BACKFORGE_DDL_FUNCTION")
                .map_err(|e| Error::InvalidInput(e.to_string()))?;
        }

        if self.data.default_page_size == 0 {
            return Err(Error::InvalidInput(
                "BACKFORGE_DEFAULT_PAGE_SIZE must be greater than 0".to_string(),
            ));
        }
        crate::schema::validate_identifier(&self.data.label_column, "BACKFORGE_LABEL_COLUMN")
            .map_err(|e| Error::InvalidInput(e.to_string()))?;

        Ok(())
    }
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.0)(name).and_then(|v| {
            let trimmed = v.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
    }

    fn u64(&self, name: &str) -> Result<Option<u64>> {
        let Some(v) = self.string(name) else {
            return Ok(None);
        };
        v.parse::<u64>()
            .map(Some)
            .map_err(|e| Error::InvalidInput(format!("{name} must be a u64: {e}")))
    }

    fn usize(&self, name: &str) -> Result<Option<usize>> {
        let Some(v) = self.string(name) else {
            return Ok(None);
        };
        v.parse::<usize>()
            .map(Some)
            .map_err(|e| Error::InvalidInput(format!("{name} must be a usize: {e}")))
    }
}

fn parse_log_format(name: &str, value: &str) -> Result<LogFormat> {
    match value.trim().to_ascii_lowercase().as_str() {
        "json" => Ok(LogFormat::Json),
        "pretty" | "text" => Ok(LogFormat::Pretty),
        _ => Err(Error::InvalidInput(format!(
            "{name} must be one of: json, pretty (got {value})"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_without_remote() -> Result<()> {
        let config = load(&[])?;
        assert!(config.remote.is_none());
        assert_eq!(config.data.default_page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.data.label_column, "name");
        Ok(())
    }

    #[test]
    fn remote_requires_key() {
        let err = load(&[("BACKFORGE_REMOTE_URL", "https://x.supabase.co")]).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref m) if m.contains("BACKFORGE_REMOTE_KEY")));
    }

    #[test]
    fn remote_overrides_apply() -> Result<()> {
        let config = load(&[
            ("BACKFORGE_REMOTE_URL", "https://x.supabase.co"),
            ("BACKFORGE_REMOTE_KEY", "secret"),
            ("BACKFORGE_REMOTE_TIMEOUT_SECS", "5"),
            ("BACKFORGE_DDL_FUNCTION", "run_sql"),
            ("BACKFORGE_DEFAULT_PAGE_SIZE", "25"),
            ("BACKFORGE_LOG_FORMAT", "json"),
        ])?;
        let remote = config.remote.expect("remote");
        assert_eq!(remote.timeout_secs, 5);
        assert_eq!(remote.ddl_function, "run_sql");
        assert_eq!(remote.postgrest().timeout, Duration::from_secs(5));
        assert_eq!(config.data.default_page_size, 25);
        assert!(matches!(config.log_format, LogFormat::Json));
        Ok(())
    }

    #[test]
    fn blank_values_are_unset() -> Result<()> {
        let config = load(&[("BACKFORGE_REMOTE_URL", "   ")])?;
        assert!(config.remote.is_none());
        Ok(())
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = load(&[("BACKFORGE_DEFAULT_PAGE_SIZE", "lots")]).unwrap_err();
        assert!(err.to_string().contains("BACKFORGE_DEFAULT_PAGE_SIZE"));

        let err = load(&[("BACKFORGE_DEFAULT_PAGE_SIZE", "0")]).unwrap_err();
        assert!(err.to_string().contains("BACKFORGE_DEFAULT_PAGE_SIZE"));

        let err = load(&[
            ("BACKFORGE_REMOTE_URL", "x.supabase.co"),
            ("BACKFORGE_REMOTE_KEY", "k"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("BACKFORGE_REMOTE_URL"));

        let err = load(&[("BACKFORGE_LOG_FORMAT", "xml")]).unwrap_err();
        assert!(err.to_string().contains("BACKFORGE_LOG_FORMAT"));
    }

    #[test]
    fn debug_redacts_key() {
        let remote = RemoteConfig {
            url: "https://x".into(),
            key: "super-secret".into(),
            timeout_secs: 30,
            ddl_function: "exec_sql".into(),
        };
        let rendered = format!("{remote:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
