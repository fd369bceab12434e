//! Optional TOML config file
//!
//! Values from the file act as defaults; anything given on the command line
//! wins.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use logtap_types::{ColorMode, OutputMode};
use serde::Deserialize;

/// Settings read from `config.toml`
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub url: Option<String>,
    pub origin: Option<String>,
    pub token_command: Option<String>,
    pub status_command: Option<String>,
    pub tail: Option<usize>,
    pub prefetch_ms: Option<u64>,
    pub color: Option<ColorMode>,
    pub output: Option<OutputMode>,
    pub local_time: Option<bool>,
    pub sources: Vec<String>,
    pub backoff_initial_ms: Option<u64>,
    pub backoff_max_ms: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl Settings {
    /// `logtap/config.toml` in the platform config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("logtap").join("config.toml"))
    }

    /// Load settings from an explicit path, or from the default location.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, SettingsError> {
        if let Some(path) = explicit {
            return Self::read(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Self::read(&path),
            _ => Ok(Self::default()),
        }
    }

    fn read(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_full_file() {
        let settings: Settings = toml::from_str(
            r#"
            url = "wss://logs.example.com/stream"
            token_command = "auth print-token"
            tail = 50
            prefetch_ms = 250
            color = "never"
            output = "json"
            sources = ["app", "router"]
            backoff_max_ms = 5000
            "#,
        )
        .unwrap();

        assert_eq!(settings.url.as_deref(), Some("wss://logs.example.com/stream"));
        assert_eq!(settings.token_command.as_deref(), Some("auth print-token"));
        assert_eq!(settings.tail, Some(50));
        assert_eq!(settings.prefetch_ms, Some(250));
        assert_eq!(settings.color, Some(ColorMode::Never));
        assert_eq!(settings.output, Some(OutputMode::Json));
        assert_eq!(settings.sources, ["app", "router"]);
        assert_eq!(settings.backoff_max_ms, Some(5000));
        assert_eq!(settings.backoff_initial_ms, None);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let result = toml::from_str::<Settings>("tail_lines = 10");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tail = 7").unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.tail, Some(7));
    }

    #[test]
    fn test_missing_explicit_path_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, SettingsError::Read { .. }));
        assert!(err.to_string().contains("nope.toml"));
    }

    #[test]
    fn test_invalid_file_names_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tail = \"lots\"").unwrap();

        let err = Settings::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
    }
}
