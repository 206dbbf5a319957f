//! Desktop host for the negotiator: preferences in a JSON file, navigation
//! printed to the terminal.

use crate::{
    config::ShellConfig,
    epoch_millis,
    host_bridge::{FormView, HostBridge, keys},
};
use anyhow::{Context, Result};
use log::{debug, error, info};
use serde_json::{Map, Value};
use std::{
    fs,
    io::ErrorKind,
    path::PathBuf,
    sync::{Mutex, MutexGuard, PoisonError},
};

/// Network type reported by the Android host for anything not mobile or wifi.
const NETWORK_OTHER: i32 = 3;

pub struct DesktopBridge {
    preferences_file: PathBuf,
    cookies_file: PathBuf,
    preferences: Mutex<Map<String, Value>>,
    version_name: String,
    webview_version: String,
}

impl DesktopBridge {
    pub fn open(config: &ShellConfig) -> Result<Self> {
        fs::create_dir_all(&config.config_dir).context(format!(
            "failed to create config directory: {:?}",
            config.config_dir
        ))?;

        let preferences = match fs::read_to_string(&config.preferences_file) {
            Ok(content) => serde_json::from_str(&content).context(format!(
                "failed to parse preferences: {:?}",
                config.preferences_file
            ))?,
            Err(e) if e.kind() == ErrorKind::NotFound => Map::new(),
            Err(e) => {
                return Err(e).context(format!(
                    "failed to read preferences: {:?}",
                    config.preferences_file
                ));
            }
        };

        Ok(Self {
            preferences_file: config.preferences_file.clone(),
            cookies_file: config.cookies_file.clone(),
            preferences: Mutex::new(preferences),
            version_name: env!("CARGO_PKG_VERSION").to_string(),
            webview_version: config.webview_version.clone(),
        })
    }

    pub fn insecure_tls_enabled(&self) -> bool {
        self.lock()
            .get(keys::INSECURE_TLS)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    fn lock(&self) -> MutexGuard<'_, Map<String, Value>> {
        self.preferences
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn store(&self, key: &str, value: Value) {
        let mut preferences = self.lock();
        preferences.insert(key.to_string(), value);

        if let Err(e) = self.persist(&preferences) {
            error!("failed to store preference {key}: {e:#}");
        }
    }

    fn persist(&self, preferences: &Map<String, Value>) -> Result<()> {
        let content =
            serde_json::to_string_pretty(preferences).context("failed to serialize preferences")?;

        fs::write(&self.preferences_file, content).context(format!(
            "failed to write preferences: {:?}",
            self.preferences_file
        ))
    }
}

impl HostBridge for DesktopBridge {
    fn read_preference(&self, key: &str) -> String {
        self.lock()
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default()
    }

    fn store_preference(&self, key: &str, value: &str) {
        debug!("storePreference {key} {value}");
        self.store(key, Value::from(value));
    }

    fn read_preference_long(&self, key: &str) -> i64 {
        self.lock().get(key).and_then(Value::as_i64).unwrap_or(0)
    }

    fn store_preference_long(&self, key: &str, value: i64) {
        debug!("storePreferenceLong {key} {value}");
        self.store(key, Value::from(value));
    }

    fn have_network(&self) -> i32 {
        // no connectivity manager here, a failing request reports the rest
        NETWORK_OTHER
    }

    fn is_connected(&self) -> i32 {
        0
    }

    fn insecure_tls(&self, enabled: bool) {
        info!("insecureTls {enabled}");
        self.store(keys::INSECURE_TLS, Value::from(enabled));
    }

    fn ws_clear_cache(&self, auto_reload: bool, auto_reconnect: bool) {
        debug!("wsClearCache reload={auto_reload} reconnect={auto_reconnect}");
        self.store_preference_long(keys::LAST_CLEAR_CACHE, epoch_millis());
    }

    fn ws_clear_cookies(&self) {
        match fs::remove_file(&self.cookies_file) {
            Ok(()) => info!("cookies cleared"),
            Err(e) if e.kind() == ErrorKind::NotFound => debug!("no cookies to clear"),
            Err(e) => error!("failed to clear cookies {:?}: {e}", self.cookies_file),
        }
    }

    fn toast(&self, message: &str) {
        println!("{message}");
    }

    fn version_name(&self) -> String {
        self.version_name.clone()
    }

    fn webview_version(&self) -> String {
        self.webview_version.clone()
    }
}

/// Prints navigation targets instead of loading them.
#[derive(Default)]
pub struct TerminalView {
    navigation: Mutex<Option<String>>,
}

impl TerminalView {
    pub fn last_navigation(&self) -> Option<String> {
        self.navigation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn open(&self, url: &str) {
        println!("open {url}");
        *self.navigation.lock().unwrap_or_else(PoisonError::into_inner) = Some(url.to_string());
    }
}

impl FormView for TerminalView {
    fn set_loading(&self, visible: bool) {
        if visible {
            info!("waiting for server...");
        }
    }

    fn release_focus(&self) {}

    fn set_domain_field(&self, domain: &str) {
        info!("domain set to '{domain}'");
    }

    fn load_url(&self, url: &str) {
        self.open(url);
    }

    fn replace_url(&self, url: &str) {
        self.open(url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use tempfile::TempDir;

    fn shell_config(dir: &TempDir) -> ShellConfig {
        let root = dir.path().join("webcall").to_string_lossy().to_string();
        AppConfig::load(move |key: &str| (key == "WEBCALL_CONFIG_PATH").then(|| root.clone()))
            .expect("load config")
            .shell
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = TempDir::new().expect("failed to create temp directory");
        let bridge = DesktopBridge::open(&shell_config(&dir)).expect("open bridge");

        assert_eq!(bridge.read_preference(keys::DOMAIN), "");
        assert_eq!(bridge.read_preference_long(keys::LAST_CLEAR_CACHE), 0);
        assert!(!bridge.insecure_tls_enabled());
        assert_eq!(bridge.webview_version(), "desktop");
        assert_eq!(bridge.version_name(), env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn preferences_survive_reopen() {
        let dir = TempDir::new().expect("failed to create temp directory");
        let config = shell_config(&dir);

        {
            let bridge = DesktopBridge::open(&config).expect("open bridge");
            bridge.store_preference(keys::DOMAIN, "timur.mobi");
            bridge.store_preference(keys::USERNAME, "4711");
            bridge.store_preference_long(keys::LAST_CLEAR_CACHE, 1_700_000_000_000);
            bridge.insecure_tls(true);
        }

        let bridge = DesktopBridge::open(&config).expect("reopen bridge");
        assert_eq!(bridge.read_preference(keys::DOMAIN), "timur.mobi");
        assert_eq!(bridge.read_preference(keys::USERNAME), "4711");
        assert_eq!(
            bridge.read_preference_long(keys::LAST_CLEAR_CACHE),
            1_700_000_000_000
        );
        assert!(bridge.insecure_tls_enabled());
    }

    #[test]
    fn clear_cache_records_time() {
        let dir = TempDir::new().expect("failed to create temp directory");
        let bridge = DesktopBridge::open(&shell_config(&dir)).expect("open bridge");

        let before = epoch_millis();
        bridge.ws_clear_cache(false, false);
        assert!(bridge.read_preference_long(keys::LAST_CLEAR_CACHE) >= before);
    }

    #[test]
    fn clear_cookies_removes_cookie_file() {
        let dir = TempDir::new().expect("failed to create temp directory");
        let config = shell_config(&dir);
        let bridge = DesktopBridge::open(&config).expect("open bridge");

        fs::write(&config.cookies_file, "{}").expect("write cookies");
        bridge.ws_clear_cookies();
        assert!(!config.cookies_file.exists());

        // nothing left to clear is fine
        bridge.ws_clear_cookies();
    }

    #[test]
    fn corrupt_preferences_are_rejected() {
        let dir = TempDir::new().expect("failed to create temp directory");
        let config = shell_config(&dir);
        fs::create_dir_all(&config.config_dir).expect("create dir");
        fs::write(&config.preferences_file, "not json").expect("write preferences");

        let result = DesktopBridge::open(&config);
        assert!(
            result
                .err()
                .expect("open must fail")
                .to_string()
                .contains("failed to parse preferences")
        );
    }

    #[test]
    fn terminal_view_remembers_navigation() {
        let view = TerminalView::default();
        assert_eq!(view.last_navigation(), None);

        view.replace_url("https://timur.mobi/callee/4711?auto=1");
        assert_eq!(
            view.last_navigation().as_deref(),
            Some("https://timur.mobi/callee/4711?auto=1")
        );
    }
}
