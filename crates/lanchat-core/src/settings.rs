//! User settings.
//!
//! Settings live in a `watch` channel so background tasks can react when the
//! user changes them. They can be loaded from and saved to a JSON file.

use std::path::{Path, PathBuf};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use lanchat_shared::constants::{APP_NAME, APP_VERSION, DEFAULT_OWN_COLOR, DEFAULT_SYSTEM_COLOR};
use lanchat_shared::nick::is_valid_nick;
use lanchat_shared::types::PeerCode;

use crate::error::{CoreError, Result};

/// The persisted part of the settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsData {
    pub nick: String,
    pub own_color: i32,
    pub system_color: i32,
    pub private_chat_enabled: bool,
    /// Client name announced in CLIENT messages.
    pub client: String,
    /// Shown next to our ip address when logging on.
    pub host_name: Option<String>,
    /// Where received files are saved.
    pub download_dir: PathBuf,
}

impl Default for SettingsData {
    fn default() -> Self {
        Self {
            nick: String::new(),
            own_color: DEFAULT_OWN_COLOR,
            system_color: DEFAULT_SYSTEM_COLOR,
            private_chat_enabled: true,
            client: format!("{} v{}", APP_NAME, APP_VERSION),
            host_name: None,
            download_dir: std::env::temp_dir(),
        }
    }
}

impl SettingsData {
    /// Read settings from a JSON file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let data: SettingsData = serde_json::from_str(&text)?;
        debug!(path = %path.display(), "Loaded settings");
        Ok(data)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        debug!(path = %path.display(), "Saved settings");
        Ok(())
    }
}

/// Pick a random peer code.
pub fn generate_code() -> PeerCode {
    PeerCode(rand::thread_rng().gen_range(10_000_000..100_000_000))
}

/// Live settings of this instance.
pub struct Settings {
    code: PeerCode,
    data: watch::Sender<SettingsData>,
    file: Option<PathBuf>,
}

impl Settings {
    /// Create settings for the given code. An invalid nick falls back to the
    /// code.
    pub fn new(code: PeerCode, mut data: SettingsData) -> Self {
        if !is_valid_nick(&data.nick) {
            if !data.nick.is_empty() {
                info!(nick = %data.nick, "Configured nick is not valid, using code instead");
            }
            data.nick = code.as_nick();
        }

        let (data, _) = watch::channel(data);
        Self {
            code,
            data,
            file: None,
        }
    }

    /// Persist every change to `path`.
    pub fn with_file(mut self, path: PathBuf) -> Self {
        self.file = Some(path);
        self
    }

    pub fn code(&self) -> PeerCode {
        self.code
    }

    pub fn data(&self) -> SettingsData {
        self.data.borrow().clone()
    }

    pub fn nick(&self) -> String {
        self.data.borrow().nick.clone()
    }

    pub fn set_nick(&self, nick: &str) -> Result<()> {
        if !is_valid_nick(nick) && nick != self.code.as_nick() {
            return Err(CoreError::InvalidNick(nick.to_string()));
        }
        self.modify(|data| data.nick = nick.to_string())
    }

    pub fn own_color(&self) -> i32 {
        self.data.borrow().own_color
    }

    pub fn set_own_color(&self, color: i32) -> Result<()> {
        self.modify(|data| data.own_color = color)
    }

    pub fn system_color(&self) -> i32 {
        self.data.borrow().system_color
    }

    pub fn is_private_chat_enabled(&self) -> bool {
        self.data.borrow().private_chat_enabled
    }

    pub fn set_private_chat_enabled(&self, enabled: bool) -> Result<()> {
        self.modify(|data| data.private_chat_enabled = enabled)
    }

    pub fn client(&self) -> String {
        self.data.borrow().client.clone()
    }

    pub fn host_name(&self) -> Option<String> {
        self.data.borrow().host_name.clone()
    }

    pub fn download_dir(&self) -> PathBuf {
        self.data.borrow().download_dir.clone()
    }

    /// Receiver that is notified whenever a setting changes.
    pub fn subscribe(&self) -> watch::Receiver<SettingsData> {
        self.data.subscribe()
    }

    fn modify<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut SettingsData),
    {
        let changed = self.data.send_if_modified(|data| {
            let before = data.clone();
            f(data);
            *data != before
        });

        if changed {
            if let Some(path) = &self.file {
                self.data.borrow().save(path)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_nick_falls_back_to_code() {
        let settings = Settings::new(
            PeerCode(12345678),
            SettingsData {
                nick: "not valid!".to_string(),
                ..Default::default()
            },
        );
        assert_eq!(settings.nick(), "12345678");
        assert!(settings.set_nick("@Boss").is_err());
        assert!(settings.set_nick("Boss").is_ok());
        assert_eq!(settings.nick(), "Boss");
    }

    #[test]
    fn test_generated_code_range() {
        for _ in 0..100 {
            let code = generate_code();
            assert!((10_000_000..100_000_000).contains(&code.0));
        }
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let settings = Settings::new(PeerCode(1), SettingsData::default());
        let mut rx = settings.subscribe();

        settings.set_private_chat_enabled(false).unwrap();
        rx.changed().await.unwrap();
        assert!(!rx.borrow().private_chat_enabled);

        // setting the same value again is not a change
        settings.set_private_chat_enabled(false).unwrap();
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let settings = Settings::new(
            PeerCode(1),
            SettingsData {
                nick: "Alice".to_string(),
                ..Default::default()
            },
        )
        .with_file(path.clone());
        settings.set_own_color(-65536).unwrap();

        let loaded = SettingsData::load(&path).unwrap();
        assert_eq!(loaded.nick, "Alice");
        assert_eq!(loaded.own_color, -65536);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "nick": "Bob" }"#).unwrap();

        let loaded = SettingsData::load(&path).unwrap();
        assert_eq!(loaded.nick, "Bob");
        assert_eq!(loaded.system_color, DEFAULT_SYSTEM_COLOR);
        assert!(loaded.private_chat_enabled);
    }
}
