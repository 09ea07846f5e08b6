use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default listening port (overridden by `PORT`)
pub const DEFAULT_PORT: u16 = 5001;
/// Default bind address
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// Default maximum size of a single uploaded file (50 MB)
pub const DEFAULT_MAX_FILE_SIZE: usize = 50 * 1024 * 1024;
/// Default maximum number of files in one convert-and-merge request
pub const DEFAULT_MAX_FILES: usize = 20;
/// Default bound on one external conversion, in seconds
pub const DEFAULT_CONVERSION_TIMEOUT_SECS: u64 = 120;

/// Upload validation limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum size of one uploaded file in bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: usize,

    /// Maximum number of files accepted by the merge endpoint
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Lowercase extensions accepted for conversion
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

const fn default_max_file_size() -> usize {
    DEFAULT_MAX_FILE_SIZE
}

const fn default_max_files() -> usize {
    DEFAULT_MAX_FILES
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["docx".to_string(), "doc".to_string()]
}

impl LimitsConfig {
    /// Whether `filename` carries an allowed extension (case-insensitive).
    pub fn is_allowed(&self, filename: &str) -> bool {
        filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .is_some_and(|ext| self.allowed_extensions.iter().any(|a| a.eq_ignore_ascii_case(&ext)))
    }

    /// Human-readable size limit, e.g. "50 MB"
    pub fn max_file_size_label(&self) -> String {
        format!("{} MB", self.max_file_size_bytes / (1024 * 1024))
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: default_max_file_size(),
            max_files: default_max_files(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

/// External converter configuration.
///
/// `binaries` are tried in order; the first one found on `PATH` (or the first
/// existing absolute path) is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    #[serde(default = "default_binaries")]
    pub binaries: Vec<String>,

    /// Bound on a single conversion process
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Bound on the `--version` probe used by health checks
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

fn default_binaries() -> Vec<String> {
    vec!["soffice".to_string(), "libreoffice".to_string()]
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_CONVERSION_TIMEOUT_SECS
}

const fn default_probe_timeout_secs() -> u64 {
    5
}

impl ConverterConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            binaries: default_binaries(),
            timeout_secs: default_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

/// Formatting of the inserted title paragraph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleStyle {
    #[serde(default = "default_title_font")]
    pub font: String,

    /// Font size in points
    #[serde(default = "default_title_size")]
    pub size_pt: f32,

    #[serde(default = "default_true")]
    pub bold: bool,
}

fn default_title_font() -> String {
    "Cambria".to_string()
}

const fn default_title_size() -> f32 {
    11.0
}

const fn default_true() -> bool {
    true
}

impl TitleStyle {
    /// Size in half-points, the unit WordprocessingML uses for `w:sz`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn half_points(&self) -> u32 {
        // Clamped to Word's accepted range, so the cast is lossless
        (self.size_pt * 2.0).round().clamp(2.0, 3276.0) as u32
    }
}

impl Default for TitleStyle {
    fn default() -> Self {
        Self {
            font: default_title_font(),
            size_pt: default_title_size(),
            bold: true,
        }
    }
}

/// What to do when PDFs cannot be merged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeFallback {
    /// Report the merge failure to the caller
    #[default]
    Fail,
    /// Return the first PDF alone, flagged as degraded
    FirstDocument,
}

/// Merge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeConfig {
    #[serde(default)]
    pub fallback: MergeFallback,
}

/// Upstream fetch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_fetch_timeout_secs() -> u64 {
    60
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

/// Service configuration.
///
/// Built once at startup and handed to the components that need it; nothing
/// reads it from global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub converter: ConverterConfig,

    #[serde(default)]
    pub title: TitleStyle,

    #[serde(default)]
    pub merge: MergeConfig,

    #[serde(default)]
    pub fetch: FetchConfig,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

const fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            limits: LimitsConfig::default(),
            converter: ConverterConfig::default(),
            title: TitleStyle::default(),
            merge: MergeConfig::default(),
            fetch: FetchConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::ConfigLoad(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::ConfigLoad(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from default locations (~/.config/curriculum-docs/config.toml, ./config.toml)
    pub fn load() -> Self {
        // Try user config
        if let Some(config_dir) = crate::util::config_dir() {
            let user_config = config_dir.join("curriculum-docs").join("config.toml");
            if user_config.exists() {
                match Self::from_file(&user_config) {
                    Ok(config) => {
                        tracing::debug!("Loaded config from {}", user_config.display());
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // Try local config
        let local_config = std::path::PathBuf::from("config.toml");
        if local_config.exists() {
            match Self::from_file(&local_config) {
                Ok(config) => {
                    tracing::debug!("Loaded config from ./config.toml");
                    return config;
                }
                Err(e) => {
                    tracing::warn!("Failed to load ./config.toml: {}", e);
                }
            }
        }

        tracing::debug!("No config file found, using defaults");
        Self::default()
    }

    /// Reject values that would make every request fail.
    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &str, reason: &str| {
            Err(Error::ConfigInvalid {
                field: field.to_string(),
                reason: reason.to_string(),
            })
        };

        if self.limits.max_file_size_bytes == 0 {
            return invalid("limits.max_file_size_bytes", "must be greater than zero");
        }
        if self.limits.max_files == 0 {
            return invalid("limits.max_files", "must be greater than zero");
        }
        if self.limits.allowed_extensions.is_empty() {
            return invalid("limits.allowed_extensions", "must not be empty");
        }
        if self.converter.binaries.iter().all(|b| b.trim().is_empty()) {
            return invalid("converter.binaries", "must name at least one binary");
        }
        if self.converter.timeout_secs == 0 {
            return invalid("converter.timeout_secs", "must be greater than zero");
        }
        if self.converter.probe_timeout_secs == 0 {
            return invalid("converter.probe_timeout_secs", "must be greater than zero");
        }
        if self.fetch.timeout_secs == 0 {
            return invalid("fetch.timeout_secs", "must be greater than zero");
        }
        if self.title.font.trim().is_empty() {
            return invalid("title.font", "must not be empty");
        }
        if self.title.size_pt.is_nan() || self.title.size_pt <= 0.0 {
            return invalid("title.size_pt", "must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_published_limits() {
        let config = ServiceConfig::default();
        assert_eq!(config.port, 5001);
        assert_eq!(config.limits.max_file_size_bytes, 50 * 1024 * 1024);
        assert_eq!(config.limits.max_file_size_label(), "50 MB");
        assert_eq!(config.limits.max_files, 20);
        assert_eq!(config.converter.timeout_secs, 120);
        assert_eq!(config.converter.binaries, vec!["soffice", "libreoffice"]);
        assert_eq!(config.merge.fallback, MergeFallback::Fail);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_allowed_extensions_case_insensitive() {
        let limits = LimitsConfig::default();
        assert!(limits.is_allowed("Syllabus.DOCX"));
        assert!(limits.is_allowed("old.doc"));
        assert!(!limits.is_allowed("notes.txt"));
        assert!(!limits.is_allowed("docx"));
        assert!(!limits.is_allowed("archive.docx.zip"));
    }

    #[test]
    fn test_title_half_points() {
        assert_eq!(TitleStyle::default().half_points(), 22);
        let style = TitleStyle {
            size_pt: 10.5,
            ..Default::default()
        };
        assert_eq!(style.half_points(), 21);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = ServiceConfig::from_toml(
            r#"
            port = 8080

            [converter]
            timeout_secs = 30

            [merge]
            fallback = "first_document"
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.converter.timeout_secs, 30);
        assert_eq!(config.converter.binaries.len(), 2);
        assert_eq!(config.merge.fallback, MergeFallback::FirstDocument);
        assert_eq!(config.title.font, "Cambria");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = ServiceConfig::from_toml("[limits]\nmax_files = 0\n").unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid { ref field, .. } if field == "limits.max_files"));

        let err = ServiceConfig::from_toml("[converter]\nbinaries = []\n").unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid { .. }));

        let err = ServiceConfig::from_toml("port = \"not a number\"").unwrap_err();
        assert!(matches!(err, Error::ConfigLoad(_)));
    }
}
