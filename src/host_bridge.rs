//! Capabilities provided by the surrounding application shell.
//!
//! The negotiator never reaches for ambient globals; everything it needs from
//! the host is passed in as an implementation of [`HostBridge`] and the page it
//! drives as an implementation of [`FormView`].

#[cfg(any(test, feature = "mock"))]
use mockall::automock;

/// Preference keys shared with the Android host.
pub mod keys {
    pub const DOMAIN: &str = "webcalldomain";
    pub const USERNAME: &str = "username";
    pub const VERSION_NAME: &str = "versionName";
    /// Epoch milliseconds of the last cache clear, `0` if never.
    pub const LAST_CLEAR_CACHE: &str = "lastClearCache";
    pub const INSECURE_TLS: &str = "insecureTlsFlag";
}

/// Stored domain value meaning "explicitly cleared" as opposed to "never set".
pub const CLEARED_DOMAIN_SENTINEL: &str = " ";

#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait HostBridge: Send + Sync {
    fn read_preference(&self, key: &str) -> String;
    fn store_preference(&self, key: &str, value: &str);
    fn read_preference_long(&self, key: &str) -> i64;
    fn store_preference_long(&self, key: &str, value: i64);

    /// Greater than zero when any network is available.
    fn have_network(&self) -> i32;
    /// Greater than zero when this device holds the active signaling session.
    fn is_connected(&self) -> i32;

    fn insecure_tls(&self, enabled: bool);
    fn ws_clear_cache(&self, auto_reload: bool, auto_reconnect: bool);
    fn ws_clear_cookies(&self);

    fn toast(&self, message: &str);

    fn version_name(&self) -> String;
    fn webview_version(&self) -> String;
}

/// The settings page the negotiator drives.
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait FormView: Send + Sync {
    fn set_loading(&self, visible: bool);
    /// Defocus the active control so the submit button can be pressed again.
    fn release_focus(&self);
    fn set_domain_field(&self, domain: &str);
    /// Navigate keeping the settings page in history.
    fn load_url(&self, url: &str);
    /// Navigate replacing the settings page.
    fn replace_url(&self, url: &str);
}
