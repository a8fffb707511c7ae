//! Runtime configuration
//!
//! Everything is read from the environment once at startup. A missing webhook
//! URL is not a load error: the transport reports it as a configuration
//! failure on the first send so it shows up in the conversation.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const ENV_WEBHOOK_URL: &str = "CHAT_WEBHOOK_URL";
pub const ENV_API_KEY: &str = "CHAT_WEBHOOK_API_KEY";
pub const ENV_ORIGIN: &str = "CHAT_ORIGIN";
pub const ENV_USER_ID: &str = "CHAT_USER_ID";
pub const ENV_REQUEST_TIMEOUT: &str = "CHAT_REQUEST_TIMEOUT_SECS";
pub const ENV_STORAGE_PATH: &str = "CHAT_STORAGE_PATH";
pub const ENV_THEME: &str = "CHAT_THEME";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a positive integer number of seconds, got {value:?}")]
    InvalidTimeout { var: &'static str, value: String },
    #[error("unknown theme {0:?} (expected \"dark\" or \"light\")")]
    InvalidTheme(String),
}

/// Presentation theme, handed to whatever renders the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl FromStr for Theme {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            _ => Err(ConfigError::InvalidTheme(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub webhook_url: Option<String>,
    pub api_key: Option<String>,
    /// Origin named in the CORS hint shown to the user
    pub origin: Option<String>,
    /// Sent as `metadata.userId` with every request
    pub user_id: Option<String>,
    /// Applies to connecting and to each wait for the next body chunk
    pub request_timeout: Duration,
    pub storage_path: PathBuf,
    pub theme: Theme,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            api_key: None,
            origin: None,
            user_id: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            storage_path: default_storage_path(),
            theme: Theme::default(),
        }
    }
}

impl ChatConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is present but unparseable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is present but unparseable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty strings count as unset, matching how build-time env injection
        // tends to leave blanks behind.
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let request_timeout = match get(ENV_REQUEST_TIMEOUT) {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::InvalidTimeout {
                        var: ENV_REQUEST_TIMEOUT,
                        value: raw,
                    })
                }
            },
            None => DEFAULT_REQUEST_TIMEOUT,
        };

        let theme = get(ENV_THEME)
            .map(|raw| raw.parse::<Theme>())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            webhook_url: get(ENV_WEBHOOK_URL).map(|v| v.trim().to_string()),
            api_key: get(ENV_API_KEY),
            origin: get(ENV_ORIGIN),
            user_id: get(ENV_USER_ID),
            request_timeout,
            storage_path: get(ENV_STORAGE_PATH).map_or_else(default_storage_path, PathBuf::from),
            theme,
        })
    }

    pub fn with_webhook_url(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = Some(url.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

fn default_storage_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(format!("{home}/.webhook-chat/storage.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let config = ChatConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.webhook_url.is_none());
        assert!(config.api_key.is_none());
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.theme, Theme::Dark);
    }

    #[test]
    fn test_reads_all_variables() {
        let config = ChatConfig::from_lookup(lookup(&[
            (ENV_WEBHOOK_URL, " https://hooks.example.com/chat "),
            (ENV_API_KEY, "secret"),
            (ENV_ORIGIN, "https://chat.example.com"),
            (ENV_USER_ID, "user-42"),
            (ENV_REQUEST_TIMEOUT, "30"),
            (ENV_STORAGE_PATH, "/var/lib/chat.db"),
            (ENV_THEME, "Light"),
        ]))
        .unwrap();

        assert_eq!(config.webhook_url.as_deref(), Some("https://hooks.example.com/chat"));
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.origin.as_deref(), Some("https://chat.example.com"));
        assert_eq!(config.user_id.as_deref(), Some("user-42"));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.storage_path, PathBuf::from("/var/lib/chat.db"));
        assert_eq!(config.theme, Theme::Light);
    }

    #[test]
    fn test_blank_url_counts_as_missing() {
        let config = ChatConfig::from_lookup(lookup(&[(ENV_WEBHOOK_URL, "   ")])).unwrap();
        assert!(config.webhook_url.is_none());
    }

    #[test]
    fn test_rejects_bad_timeout_and_theme() {
        let err = ChatConfig::from_lookup(lookup(&[(ENV_REQUEST_TIMEOUT, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimeout { .. }));

        let err = ChatConfig::from_lookup(lookup(&[(ENV_THEME, "sepia")])).unwrap_err();
        assert_eq!(err, ConfigError::InvalidTheme("sepia".to_string()));
    }
}
