//! State of the settings form as loaded from the stored preferences.

use crate::{
    config::NegotiationConfig,
    host_bridge::{CLEARED_DOMAIN_SENTINEL, HostBridge, keys},
};
use log::{debug, info};
use std::net::Ipv4Addr;

const NO_WEBVIEW_VERSION: &str = "no version, old webview?";

/// Username stored by the registration page while it is being shown.
const REGISTER_PLACEHOLDER: &str = "register";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FormOptions {
    pub clear_cookies: bool,
    pub clear_cache: bool,
    pub insecure_tls: bool,
    pub numeric_id: bool,
}

/// Values submitted by the user.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormInput {
    pub domain: String,
    pub username: String,
    pub options: FormOptions,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormField {
    Domain,
    Username,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormState {
    pub domain: String,
    pub username: String,
    pub options: FormOptions,
    pub version_name: String,
    /// Display text, never empty.
    pub webview_version: String,
}

/// Stored domain, lowercase. Never set yields the default host, the cleared
/// sentinel yields an empty domain.
pub(crate) fn stored_domain<B: HostBridge + ?Sized>(bridge: &B, config: &NegotiationConfig) -> String {
    let domain = bridge.read_preference(keys::DOMAIN);
    if domain.is_empty() {
        config.default_domain.clone()
    } else if domain == CLEARED_DOMAIN_SENTINEL {
        String::new()
    } else {
        domain.to_lowercase()
    }
}

/// Stored username, lowercase, with the registration placeholder mapped to empty.
pub(crate) fn stored_username<B: HostBridge + ?Sized>(bridge: &B) -> String {
    normalize_username(&bridge.read_preference(keys::USERNAME))
}

fn normalize_username(stored: &str) -> String {
    let username = stored.to_lowercase();
    if username == REGISTER_PLACEHOLDER {
        String::new()
    } else {
        username
    }
}

pub fn is_numeric_id(username: &str) -> bool {
    username.chars().all(|c| c.is_ascii_digit())
}

/// Servers addressed by plain IPv4 address (optionally with `:port`) rarely
/// carry a certificate matching that address.
pub fn wants_insecure_tls(domain: &str) -> bool {
    let host = domain.split_once(':').map_or(domain, |(host, _)| host);
    host.parse::<Ipv4Addr>().is_ok()
}

impl FormState {
    /// Restore the form on page load and push the derived TLS setting to the host.
    pub fn load<B: HostBridge + ?Sized>(bridge: &B, config: &NegotiationConfig) -> Self {
        let domain = stored_domain(bridge, config);

        let stored = bridge.read_preference(keys::USERNAME);
        let username = normalize_username(&stored);
        if username != stored.to_lowercase() {
            bridge.store_preference(keys::USERNAME, "");
        }

        let mut options = FormOptions::default();

        let version_name = bridge.version_name();
        let last_version_name = bridge.read_preference(keys::VERSION_NAME);
        info!("versionName={version_name} last={last_version_name}");
        if last_version_name != version_name {
            options.clear_cache = true;
            bridge.store_preference(keys::VERSION_NAME, &version_name);
        }

        let mut webview_version = bridge.webview_version();
        if webview_version.is_empty() {
            webview_version = NO_WEBVIEW_VERSION.to_string();
        }

        options.insecure_tls = wants_insecure_tls(&domain);
        options.numeric_id = is_numeric_id(&username);

        debug!("domain {domain}");
        debug!("username {username}");

        let state = Self {
            domain,
            username,
            options,
            version_name,
            webview_version,
        };
        state.apply_insecure_tls(bridge);
        state
    }

    /// Set the domain and derive the TLS setting from it.
    pub fn set_domain(&mut self, domain: &str) {
        self.domain = domain.to_string();
        self.options.insecure_tls = wants_insecure_tls(domain);
        debug!(
            "domain {domain}: insecureTls {}",
            if self.options.insecure_tls { "on" } else { "off" }
        );
    }

    pub fn set_insecure_tls(&mut self, enabled: bool) {
        self.options.insecure_tls = enabled;
    }

    pub fn apply_insecure_tls<B: HostBridge + ?Sized>(&self, bridge: &B) {
        bridge.insecure_tls(self.options.insecure_tls);
        bridge.ws_clear_cache(false, false);
    }

    /// Enabling numeric IDs drops a username that is not numeric.
    pub fn set_numeric_id(&mut self, enabled: bool) {
        self.options.numeric_id = enabled;
        if enabled && !is_numeric_id(&self.username) {
            self.username.clear();
        }
    }

    pub fn clear_field(&mut self, field: FormField) {
        match field {
            FormField::Domain => self.domain.clear(),
            FormField::Username => self.username.clear(),
        }
    }

    pub fn input(&self) -> FormInput {
        FormInput {
            domain: self.domain.clone(),
            username: self.username.clone(),
            options: self.options,
        }
    }
}
