//! Client configuration loaded from environment variables.
//!
//! Everything has a default so the client starts with zero configuration.
//! A JSON settings file can be given with `LANCHAT_SETTINGS`; environment
//! variables win over values from the file.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use lanchat_core::SettingsData;
use lanchat_net::TransportConfig;
use lanchat_shared::constants::{
    DEFAULT_CHAT_PORT, DEFAULT_MULTICAST_GROUP, DEFAULT_PRIVATE_CHAT_PORT,
};
use lanchat_shared::PeerCode;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// JSON file the settings are loaded from and saved to.
    /// Env: `LANCHAT_SETTINGS`
    pub settings_file: Option<PathBuf>,

    /// Env: `LANCHAT_NICK`
    pub nick: Option<String>,

    /// Fixed peer code instead of a random one.
    /// Env: `LANCHAT_CODE`
    pub code: Option<PeerCode>,

    /// Env: `LANCHAT_OWN_COLOR` (ARGB as a signed integer)
    pub own_color: Option<i32>,

    /// Client name announced to other peers.
    /// Env: `LANCHAT_CLIENT`
    pub client: Option<String>,

    /// Where received files are saved.
    /// Env: `LANCHAT_DOWNLOAD_DIR`
    pub download_dir: Option<PathBuf>,

    /// Env: `LANCHAT_MULTICAST_GROUP`
    /// Default: `224.168.5.200`
    pub multicast_group: Ipv4Addr,

    /// Env: `LANCHAT_CHAT_PORT`
    /// Default: `40556`
    pub chat_port: u16,

    /// First port tried for private chat.
    /// Env: `LANCHAT_PRIVATE_CHAT_PORT`
    /// Default: `40656`
    pub private_chat_port: u16,

    /// Env: `LANCHAT_PRIVATE_CHAT` (true/false)
    pub private_chat_enabled: Option<bool>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            settings_file: None,
            nick: None,
            code: None,
            own_color: None,
            client: None,
            download_dir: None,
            multicast_group: DEFAULT_MULTICAST_GROUP
                .parse()
                .unwrap_or(Ipv4Addr::new(224, 168, 5, 200)),
            chat_port: DEFAULT_CHAT_PORT,
            private_chat_port: DEFAULT_PRIVATE_CHAT_PORT,
            private_chat_enabled: None,
        }
    }
}

impl CliConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any source of variables.
    pub fn from_vars<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = var("LANCHAT_SETTINGS") {
            if !path.is_empty() {
                config.settings_file = Some(PathBuf::from(path));
            }
        }

        if let Some(nick) = var("LANCHAT_NICK") {
            config.nick = Some(nick);
        }

        if let Some(code) = var("LANCHAT_CODE") {
            match code.parse::<PeerCode>() {
                Ok(parsed) => config.code = Some(parsed),
                Err(_) => tracing::warn!(value = %code, "Invalid LANCHAT_CODE, using a random code"),
            }
        }

        if let Some(color) = var("LANCHAT_OWN_COLOR") {
            match color.parse::<i32>() {
                Ok(parsed) => config.own_color = Some(parsed),
                Err(_) => tracing::warn!(value = %color, "Invalid LANCHAT_OWN_COLOR, using default"),
            }
        }

        if let Some(client) = var("LANCHAT_CLIENT") {
            config.client = Some(client);
        }

        if let Some(dir) = var("LANCHAT_DOWNLOAD_DIR") {
            config.download_dir = Some(PathBuf::from(dir));
        }

        if let Some(group) = var("LANCHAT_MULTICAST_GROUP") {
            match group.parse::<Ipv4Addr>() {
                Ok(parsed) if parsed.is_multicast() => config.multicast_group = parsed,
                _ => tracing::warn!(
                    value = %group,
                    "Invalid LANCHAT_MULTICAST_GROUP, using default"
                ),
            }
        }

        if let Some(port) = var("LANCHAT_CHAT_PORT") {
            match port.parse::<u16>() {
                Ok(parsed) if parsed > 0 => config.chat_port = parsed,
                _ => tracing::warn!(value = %port, "Invalid LANCHAT_CHAT_PORT, using default"),
            }
        }

        if let Some(port) = var("LANCHAT_PRIVATE_CHAT_PORT") {
            match port.parse::<u16>() {
                Ok(parsed) if parsed > 0 => config.private_chat_port = parsed,
                _ => tracing::warn!(
                    value = %port,
                    "Invalid LANCHAT_PRIVATE_CHAT_PORT, using default"
                ),
            }
        }

        if let Some(val) = var("LANCHAT_PRIVATE_CHAT") {
            config.private_chat_enabled = Some(val != "false" && val != "0");
        }

        config
    }

    /// Settings from the settings file, if any, with the overrides from the
    /// environment applied.
    pub fn settings_data(&self) -> SettingsData {
        let mut data = match &self.settings_file {
            Some(path) if path.exists() => SettingsData::load(path).unwrap_or_else(|e| {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to load settings, using defaults"
                );
                SettingsData::default()
            }),
            _ => SettingsData::default(),
        };

        if let Some(nick) = &self.nick {
            data.nick = nick.clone();
        }
        if let Some(color) = self.own_color {
            data.own_color = color;
        }
        if let Some(client) = &self.client {
            data.client = client.clone();
        }
        if let Some(dir) = &self.download_dir {
            data.download_dir = dir.clone();
        }
        if let Some(enabled) = self.private_chat_enabled {
            data.private_chat_enabled = enabled;
        }
        if data.host_name.is_none() {
            data.host_name = std::env::var("HOSTNAME").ok().filter(|h| !h.is_empty());
        }

        data
    }

    pub fn transport_config(&self, private_chat_enabled: bool) -> TransportConfig {
        TransportConfig {
            multicast_group: self.multicast_group,
            chat_port: self.chat_port,
            private_chat_port: self.private_chat_port,
            private_chat_enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> CliConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CliConfig::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = config_from(&[]);
        assert_eq!(config.multicast_group, Ipv4Addr::new(224, 168, 5, 200));
        assert_eq!(config.chat_port, 40556);
        assert_eq!(config.private_chat_port, 40656);
        assert!(config.code.is_none());
        assert!(config.settings_file.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("LANCHAT_NICK", "Alice"),
            ("LANCHAT_CODE", "12345678"),
            ("LANCHAT_MULTICAST_GROUP", "239.1.2.3"),
            ("LANCHAT_CHAT_PORT", "5000"),
            ("LANCHAT_PRIVATE_CHAT", "false"),
        ]);
        assert_eq!(config.nick.as_deref(), Some("Alice"));
        assert_eq!(config.code, Some(PeerCode(12345678)));
        assert_eq!(config.multicast_group, Ipv4Addr::new(239, 1, 2, 3));
        assert_eq!(config.chat_port, 5000);

        let data = config.settings_data();
        assert_eq!(data.nick, "Alice");
        assert!(!data.private_chat_enabled);
        assert!(!config.transport_config(data.private_chat_enabled).private_chat_enabled);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = config_from(&[
            ("LANCHAT_CODE", "abc"),
            ("LANCHAT_MULTICAST_GROUP", "10.0.0.1"),
            ("LANCHAT_CHAT_PORT", "0"),
            ("LANCHAT_PRIVATE_CHAT_PORT", "big"),
            ("LANCHAT_OWN_COLOR", "red"),
        ]);
        assert!(config.code.is_none());
        assert_eq!(config.multicast_group, Ipv4Addr::new(224, 168, 5, 200));
        assert_eq!(config.chat_port, 40556);
        assert_eq!(config.private_chat_port, 40656);
        assert!(config.own_color.is_none());
    }

    #[test]
    fn test_settings_file_with_env_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "nick": "Bob", "own_color": 42 }"#).unwrap();

        let config = config_from(&[
            ("LANCHAT_SETTINGS", path.to_str().unwrap()),
            ("LANCHAT_OWN_COLOR", "-1"),
        ]);
        let data = config.settings_data();
        assert_eq!(data.nick, "Bob");
        assert_eq!(data.own_color, -1);
    }

    #[test]
    fn test_broken_settings_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();

        let config = config_from(&[("LANCHAT_SETTINGS", path.to_str().unwrap())]);
        assert_eq!(config.settings_data().nick, SettingsData::default().nick);
    }
}
