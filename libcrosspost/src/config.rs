//! Configuration management for Crosspost

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub mastodon: Option<MastodonConfig>,
    pub bluesky: Option<BlueskyConfig>,
    pub twitter: Option<TwitterConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MastodonConfig {
    pub enabled: bool,
    /// Instance host or URL, e.g. "mastodon.social"
    pub instance: String,
    pub token_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueskyConfig {
    pub enabled: bool,
    #[serde(default = "default_bluesky_service")]
    pub service: String,
    /// Handle or DID
    pub identifier: String,
    pub password_file: String,
}

fn default_bluesky_service() -> String {
    "https://bsky.social".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitterConfig {
    pub enabled: bool,
    pub token_file: String,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            mastodon: Some(MastodonConfig {
                enabled: false,
                instance: "mastodon.social".to_string(),
                token_file: "~/.config/crosspost/mastodon.token".to_string(),
            }),
            bluesky: Some(BlueskyConfig {
                enabled: false,
                service: default_bluesky_service(),
                identifier: "".to_string(),
                password_file: "~/.config/crosspost/bluesky.password".to_string(),
            }),
            twitter: Some(TwitterConfig {
                enabled: false,
                token_file: "~/.config/crosspost/twitter.token".to_string(),
            }),
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CROSSPOST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("crosspost").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [mastodon]
            enabled = true
            instance = "fosstodon.org"
            token_file = "~/.config/crosspost/mastodon.token"

            [bluesky]
            enabled = true
            identifier = "tester.bsky.social"
            password_file = "~/.config/crosspost/bluesky.password"

            [twitter]
            enabled = false
            token_file = "~/.config/crosspost/twitter.token"
        "#;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", toml).unwrap();

        let config = Config::load_from_path(&file.path().to_path_buf()).unwrap();

        let mastodon = config.mastodon.unwrap();
        assert!(mastodon.enabled);
        assert_eq!(mastodon.instance, "fosstodon.org");

        let bluesky = config.bluesky.unwrap();
        assert!(bluesky.enabled);
        // Omitted service falls back to the main PDS
        assert_eq!(bluesky.service, "https://bsky.social");

        assert!(!config.twitter.unwrap().enabled);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
            [twitter]
            enabled = true
            token_file = "/tmp/token"
        "#;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", toml).unwrap();

        let config = Config::load_from_path(&file.path().to_path_buf()).unwrap();
        assert!(config.mastodon.is_none());
        assert!(config.bluesky.is_none());
        assert!(config.twitter.is_some());
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not [valid toml").unwrap();

        let err = Config::load_from_path(&file.path().to_path_buf()).unwrap_err();
        assert!(err.to_string().contains("parse"));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = Config::load_from_path(&PathBuf::from("/nonexistent/config.toml")).unwrap_err();
        assert!(err.to_string().contains("read"));
    }

    #[test]
    fn test_default_config_round_trips() {
        let config = Config::default_config();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert!(parsed.mastodon.is_some());
        assert!(parsed.bluesky.is_some());
        assert!(parsed.twitter.is_some());
    }
}
