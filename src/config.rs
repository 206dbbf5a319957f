use crate::http_client::REQUEST_TIMEOUT;
use anyhow::{Context, Result, ensure};
use std::{env, path::PathBuf, sync::OnceLock, time::Duration};

/// Application configuration loaded and validated at startup
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Connect/register negotiation parameters
    pub negotiation: NegotiationConfig,

    /// Desktop shell (preference store and reported versions)
    pub shell: ShellConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NegotiationConfig {
    /// Host used when the domain field is left empty
    pub default_domain: String,
    pub request_timeout: Duration,
    /// Delay before the loading indicator appears, hides it for fast answers
    pub loading_delay: Duration,
    /// How long a redirect may take before the form is handed back
    pub redirect_fallback: Duration,
    /// Cache is cleared when the last clear is older than this
    pub cache_max_age: Duration,
}

#[derive(Clone, Debug)]
pub struct ShellConfig {
    pub config_dir: PathBuf,
    pub preferences_file: PathBuf,
    pub cookies_file: PathBuf,
    pub webview_version: String,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            default_domain: "timur.mobi".to_string(),
            request_timeout: REQUEST_TIMEOUT,
            loading_delay: Duration::from_millis(200),
            redirect_fallback: Duration::from_secs(8),
            cache_max_age: Duration::from_secs(2 * 24 * 3600),
        }
    }
}

impl AppConfig {
    /// Get or load the application configuration
    ///
    /// On first call all values are read from environment variables, later
    /// calls return the cached instance.
    ///
    /// # Panics
    /// Panics if configuration loading fails.
    pub fn get() -> &'static Self {
        static APP_CONFIG: OnceLock<AppConfig> = OnceLock::new();
        APP_CONFIG.get_or_init(|| {
            Self::load(|key| env::var(key).ok()).expect("failed to load application configuration")
        })
    }

    /// Load configuration through `lookup`, which maps a variable name to its value.
    pub fn load(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            negotiation: NegotiationConfig::load(&lookup)?,
            shell: ShellConfig::load(&lookup)?,
        })
    }
}

impl NegotiationConfig {
    fn load(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let default_domain = lookup("WEBCALL_DEFAULT_DOMAIN")
            .map(|d| d.trim().to_lowercase())
            .unwrap_or(defaults.default_domain);
        ensure!(
            !default_domain.is_empty(),
            "failed to load WEBCALL_DEFAULT_DOMAIN: value is empty"
        );

        let request_timeout = match lookup("WEBCALL_REQUEST_TIMEOUT_MS") {
            Some(ms) => Duration::from_millis(
                ms.parse::<u64>()
                    .context("failed to parse WEBCALL_REQUEST_TIMEOUT_MS: invalid format")?,
            ),
            None => defaults.request_timeout,
        };

        Ok(Self {
            default_domain,
            request_timeout,
            ..defaults
        })
    }
}

impl ShellConfig {
    fn load(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config_dir =
            PathBuf::from(lookup("WEBCALL_CONFIG_PATH").unwrap_or_else(|| ".webcall".to_string()));
        let webview_version =
            lookup("WEBCALL_WEBVIEW_VERSION").unwrap_or_else(|| "desktop".to_string());

        Ok(Self {
            preferences_file: config_dir.join("preferences.json"),
            cookies_file: config_dir.join("cookies.json"),
            config_dir,
            webview_version,
        })
    }
}
