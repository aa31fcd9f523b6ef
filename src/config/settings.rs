//! TOML-based configuration for lenscope.
//!
//! Supports a config file (lenscope.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [compiler]
//! dialect = "bigquery"
//! timezone = "${REPORTING_TZ}"
//! start_of_week = "sunday"
//! default_limit = 500
//!
//! [log]
//! filter = "lenscope=debug"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::query::WeekDay;
use crate::sql::Dialect;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Compilation defaults.
    pub compiler: CompilerSettings,

    /// Logging configuration.
    pub log: LogSettings,
}

/// Defaults applied when a request does not say otherwise.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompilerSettings {
    /// Target SQL dialect.
    pub dialect: Dialect,

    /// IANA timezone for relative date filters (supports ${ENV_VAR}).
    pub timezone: String,

    /// First day of the week, used to order day-name dimensions.
    pub start_of_week: WeekDay,

    /// Row limit for queries that set none.
    pub default_limit: Option<u64>,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            dialect: Dialect::Postgres,
            timezone: "UTC".to_string(),
            start_of_week: WeekDay::Monday,
            default_limit: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogSettings {
    /// `tracing` filter directive, overridden by `LENSCOPE_LOG`.
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML text, expanding environment variables.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let mut settings: Settings = toml::from_str(content)?;
        settings.compiler.timezone = expand_env_vars(&settings.compiler.timezone)?;
        settings.log.filter = expand_env_vars(&settings.log.filter)?;
        if settings.compiler.timezone.trim().is_empty() {
            return Err(SettingsError::InvalidConfig(
                "compiler.timezone must not be empty".to_string(),
            ));
        }
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `LENSCOPE_CONFIG`
    /// 2. `./lenscope.toml`
    /// 3. `~/.config/lenscope/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("LENSCOPE_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("lenscope.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("lenscope").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        // Return defaults if no config file found
        Ok(Settings::default())
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        if chars.next_if_eq(&'{').is_some() {
            let mut var_name = String::new();
            let mut closed = false;
            for ch in chars.by_ref() {
                if ch == '}' {
                    closed = true;
                    break;
                }
                var_name.push(ch);
            }
            if !closed {
                return Err(SettingsError::InvalidConfig(format!(
                    "Unterminated variable reference: ${{{}",
                    var_name
                )));
            }
            let value =
                env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
            result.push_str(&value);
        } else {
            // $VAR (ends at non-alphanumeric/underscore)
            let mut var_name = String::new();
            while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
                var_name.push(ch);
            }
            if var_name.is_empty() {
                // Just a lone $, keep it
                result.push('$');
            } else {
                let value = env::var(&var_name)
                    .map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
                result.push_str(&value);
            }
        }
    }

    Ok(result)
}
