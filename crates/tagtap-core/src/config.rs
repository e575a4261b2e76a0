//! Application configuration management.
//!
//! Handles loading, saving, and validating tagtap configuration:
//! - The text record written to freshly formatted tags
//! - Key, sector, block and data for the legacy MIFARE Classic write
//! - Whether foreground dispatch starts enabled
//!
//! Values come from an optional TOML file, overridden by `TAGTAP_<SECTION>__<KEY>`
//! environment variables (e.g. `TAGTAP_RECORD__TEXT=hello`).

use std::path::{Path, PathBuf};

use ::config::{Config as Layers, Environment, File, FileFormat};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channel::{MifareKey, MIFARE_BLOCK_SIZE, MIFARE_KEY_DEFAULT};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "TAGTAP";

static LANGUAGE_CODE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]{1,2}$").expect("language pattern is valid"));

static HEX_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9A-Fa-f]{2})*$").expect("hex pattern is valid"));

/// Errors raised while loading, saving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required configuration file does not exist.
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// Reading or merging configuration sources failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] ::config::ConfigError),

    /// The configuration could not be serialized.
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Writing the configuration file failed.
    #[error("Failed to write {path}: {source}")]
    WriteError {
        /// File that could not be written.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A single field holds an invalid value.
    #[error("Invalid {field}: {message}")]
    ValidationError {
        /// Dotted field name, e.g. `record.language`.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields hold invalid values.
    #[error("{} configuration fields are invalid", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Text record written when formatting.
    pub record: RecordConfig,
    /// Legacy MIFARE Classic write parameters.
    pub legacy: LegacyConfig,
    /// Discovery dispatch settings.
    pub dispatch: DispatchConfig,
}

/// The text record written to formatted tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordConfig {
    /// Language code, one or two ASCII letters.
    pub language: String,
    /// Record text.
    pub text: String,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            text: "test".to_string(),
        }
    }
}

/// Parameters for the legacy MIFARE Classic block write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyConfig {
    /// Sector key B as 12 hex digits.
    pub key: String,
    /// Sector to authenticate.
    pub sector: u8,
    /// Block index within the sector.
    pub block: u8,
    /// Block contents as 32 hex digits.
    pub data: String,
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            key: encode_hex(&MIFARE_KEY_DEFAULT),
            sector: 0,
            block: 0,
            data: encode_hex(&[0; MIFARE_BLOCK_SIZE]),
        }
    }
}

impl LegacyConfig {
    /// The sector key as bytes.
    ///
    /// # Errors
    ///
    /// Returns a validation error unless `key` is exactly 12 hex digits.
    pub fn key_bytes(&self) -> ConfigResult<MifareKey> {
        decode_hex("legacy.key", &self.key)
    }

    /// The block contents as bytes.
    ///
    /// # Errors
    ///
    /// Returns a validation error unless `data` is exactly 32 hex digits.
    pub fn data_block(&self) -> ConfigResult<[u8; MIFARE_BLOCK_SIZE]> {
        decode_hex("legacy.data", &self.data)
    }
}

/// Discovery dispatch settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Enable foreground dispatch as soon as the dispatcher is created.
    pub foreground_on_start: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            foreground_on_start: true,
        }
    }
}

impl Config {
    /// Load configuration from `path`, which must exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if the file is missing, or a parse or
    /// validation error.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        Self::build(path, true)
    }

    /// Load configuration from `path`, falling back to defaults if it is missing.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation error.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::build(path.as_ref(), false)
    }

    fn build(path: &Path, required: bool) -> ConfigResult<Self> {
        let config: Self = Layers::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(required))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be serialized or written.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        let write_error = |source: std::io::Error| ConfigError::WriteError {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(write_error)
    }

    /// Default configuration file location for this platform.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "tagtap")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Check every field, collecting all problems.
    ///
    /// # Errors
    ///
    /// Returns the single failure, or [`ConfigError::MultipleValidationErrors`].
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if !is_valid_language_code(&self.record.language) {
            errors.push(invalid(
                "record.language",
                format!(
                    "'{}' must be one or two ASCII letters (e.g., 'en')",
                    self.record.language
                ),
            ));
        }
        if self.record.text.is_empty() {
            errors.push(invalid("record.text", "must not be empty".to_string()));
        }
        if let Err(e) = self.legacy.key_bytes() {
            errors.push(e);
        }
        if let Err(e) = self.legacy.data_block() {
            errors.push(e);
        }
        if self.legacy.sector >= 40 {
            errors.push(invalid(
                "legacy.sector",
                format!("{} is beyond the last sector (39)", self.legacy.sector),
            ));
        } else {
            let blocks = if self.legacy.sector < 32 { 4 } else { 16 };
            if self.legacy.block >= blocks {
                errors.push(invalid(
                    "legacy.block",
                    format!(
                        "{} is outside sector {} ({blocks} blocks)",
                        self.legacy.block, self.legacy.sector
                    ),
                ));
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }
}

/// Returns `true` for a one or two letter ASCII language code.
#[must_use]
pub fn is_valid_language_code(code: &str) -> bool {
    LANGUAGE_CODE_PATTERN.is_match(code)
}

fn invalid(field: &str, message: String) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_string(),
        message,
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn decode_hex<const N: usize>(field: &str, value: &str) -> ConfigResult<[u8; N]> {
    if value.len() != N * 2 || !HEX_PATTERN.is_match(value) {
        return Err(invalid(
            field,
            format!("'{value}' must be exactly {} hex digits", N * 2),
        ));
    }
    let mut out = [0u8; N];
    for (slot, pair) in out.iter_mut().zip(value.as_bytes().chunks_exact(2)) {
        // The pattern check guarantees ASCII hex digits.
        let pair = std::str::from_utf8(pair).map_err(|e| invalid(field, e.to_string()))?;
        *slot = u8::from_str_radix(pair, 16).map_err(|e| invalid(field, e.to_string()))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.record.language, "en");
        assert_eq!(config.record.text, "test");
        assert_eq!(config.legacy.key_bytes().unwrap(), MIFARE_KEY_DEFAULT);
        assert_eq!(config.legacy.data_block().unwrap(), [0; MIFARE_BLOCK_SIZE]);
        assert!(config.dispatch.foreground_on_start);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_language_code_validation() {
        assert!(is_valid_language_code("en"));
        assert!(is_valid_language_code("d"));
        assert!(!is_valid_language_code(""));
        assert!(!is_valid_language_code("eng"));
        assert!(!is_valid_language_code("e1"));
    }

    #[test]
    fn test_single_validation_error() {
        let mut config = Config::default();
        config.record.text = String::new();
        match config.validate() {
            Err(ConfigError::ValidationError { field, .. }) => assert_eq!(field, "record.text"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_multiple_validation_errors() {
        let mut config = Config::default();
        config.record.language = "english".to_string();
        config.legacy.key = "ffff".to_string();
        config.legacy.block = 4;
        match config.validate() {
            Err(ConfigError::MultipleValidationErrors(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_large_sector_allows_sixteen_blocks() {
        let mut config = Config::default();
        config.legacy.sector = 35;
        config.legacy.block = 15;
        assert!(config.validate().is_ok());
        config.legacy.sector = 40;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.record.text = "hello".to_string();
        config.legacy.data = "00112233445566778899aabbccddeeff".to_string();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.record, config.record);
        assert_eq!(loaded.legacy, config.legacy);
        assert_eq!(loaded.legacy.data_block().unwrap()[15], 0xff);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");

        assert!(matches!(Config::load(&path), Err(ConfigError::NotFound(_))));
        let config = Config::load_or_default(&path).unwrap();
        assert_eq!(config.record, RecordConfig::default());
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[record]\ntext = \"partial\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.record.language, "en");
        assert_eq!(config.record.text, "partial");
        assert_eq!(config.legacy, LegacyConfig::default());
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[record]\nlanguage = \"fra\"\n").unwrap();

        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::ValidationError { .. })
        ));
    }
}
