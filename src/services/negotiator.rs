//! Connect / register negotiation of the settings form.
//!
//! Decides whether the submitted domain and user-ID lead to the registration
//! page, to the callee main page, or to a failure toast, without letting a
//! slow or broken request leave the form stuck in its loading state.

use super::{
    form::{FormInput, stored_domain, stored_username},
    pending::PendingRequest,
    status::StatusResponse,
};
use crate::{
    config::NegotiationConfig,
    epoch_millis,
    host_bridge::{CLEARED_DOMAIN_SENTINEL, FormView, HostBridge, keys},
    http_client::{FetchError, FetchRequest, RequestExecutor},
};
use log::{debug, info, warn};
use rand_core::{OsRng, TryRngCore};
use std::{
    sync::{Arc, atomic::Ordering},
    time::Duration,
};
use thiserror::Error;

/// Registration ids are drawn from `[0, REGISTER_ID_RANGE)`.
const REGISTER_ID_RANGE: u32 = 1_000_000;

const CONNECTION_FAILED: &str = "Connection failed. Check server address and user ID.";

/// The (domain, username) pair currently considered active.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionIdentity {
    pub domain: String,
    pub username: String,
}

impl SessionIdentity {
    pub fn restore<B: HostBridge + ?Sized>(bridge: &B, config: &NegotiationConfig) -> Self {
        Self {
            domain: stored_domain(bridge, config),
            username: stored_username(bridge),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NegotiationState {
    #[default]
    Idle,
    Validating,
    AwaitingStatus,
    RedirectRegister,
    RedirectMain,
    Busy,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Navigation {
    Register(String),
    Main(String),
}

impl Navigation {
    pub fn url(&self) -> &str {
        match self {
            Navigation::Register(url) | Navigation::Main(url) => url,
        }
    }
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum InvalidInput {
    #[error("no user-ID given")]
    MissingUserId,
    #[error("user-ID given while registering a new one")]
    UserIdPresent,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("no network")]
    NoNetwork,
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInput),
    #[error("user-ID is logged in elsewhere ({live})")]
    ServerBusy { live: String },
    #[error("server answered {0:?}")]
    UnrecognizedResponse(StatusResponse),
    #[error("request failed: {0}")]
    Transport(#[from] FetchError),
}

impl NegotiationError {
    /// The one message shown to the user for this failure.
    pub fn toast_message(&self) -> &'static str {
        match self {
            NegotiationError::NoNetwork => "No network",
            NegotiationError::InvalidInput(InvalidInput::MissingUserId) => "No user-ID",
            NegotiationError::InvalidInput(InvalidInput::UserIdPresent) => {
                "To register a new User-ID, clear the User-ID form."
            }
            NegotiationError::ServerBusy { .. } => "Busy. Already logged in from another device?",
            NegotiationError::UnrecognizedResponse(_) | NegotiationError::Transport(_) => {
                CONNECTION_FAILED
            }
        }
    }
}

pub fn register_url(domain: &str, id: u32) -> String {
    format!("https://{domain}/callee/register/?i={id}")
}

pub fn status_url(domain: &str, username: &str, version_name: &str, webview_version: &str) -> String {
    format!("https://{domain}/rtcsig/online?id={username}&ver={version_name}_{webview_version}")
}

pub fn main_url(domain: &str, username: &str) -> String {
    format!("https://{domain}/callee/{username}?auto=1")
}

/// A last clear of `0` means "never" and does not count as expired.
pub fn cache_expired(last_clear_ms: i64, now_ms: i64, max_age: Duration) -> bool {
    last_clear_ms > 0 && now_ms - last_clear_ms > max_age.as_millis() as i64
}

/// Cache buster for the registration page, also correlates TLS errors.
fn register_id() -> u32 {
    match OsRng.try_next_u32() {
        Ok(n) => n % REGISTER_ID_RANGE,
        Err(e) => {
            warn!("os random source failed, falling back to clock: {e}");
            (epoch_millis() % i64::from(REGISTER_ID_RANGE)) as u32
        }
    }
}

pub struct ConnectionNegotiator<B, V, E> {
    bridge: Arc<B>,
    view: Arc<V>,
    executor: E,
    config: NegotiationConfig,
    session: SessionIdentity,
    state: NegotiationState,
    pending: Option<PendingRequest>,
}

impl<B, V, E> ConnectionNegotiator<B, V, E>
where
    B: HostBridge,
    V: FormView + 'static,
    E: RequestExecutor,
{
    pub fn new(bridge: Arc<B>, view: Arc<V>, executor: E, config: NegotiationConfig) -> Self {
        let session = SessionIdentity::restore(bridge.as_ref(), &config);
        debug!("restored session {session:?}");

        Self {
            bridge,
            view,
            executor,
            config,
            session,
            state: NegotiationState::Idle,
            pending: None,
        }
    }

    pub fn session(&self) -> &SessionIdentity {
        &self.session
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    /// Send the browser to the registration page for a new user-ID.
    pub fn request_new_id(&mut self, form: &FormInput) -> Result<Navigation, NegotiationError> {
        self.cancel_pending();
        self.transition(NegotiationState::Validating);

        let have_network = self.bridge.have_network();
        debug!("haveNetwork={have_network}");
        if have_network <= 0 {
            return self.reject(NegotiationError::NoNetwork);
        }

        if !form.username.is_empty() {
            return self.reject(InvalidInput::UserIdPresent.into());
        }

        self.bridge.store_preference(keys::USERNAME, "");

        let mut domain = form.domain.to_lowercase();
        if domain.is_empty() {
            domain = self.config.default_domain.clone();
            self.view.set_domain_field(&domain);
        }
        self.bridge.store_preference(keys::DOMAIN, &domain);
        self.bridge.ws_clear_cookies();

        let url = register_url(&domain, register_id());
        info!("load register page {url}");

        self.view.release_focus();
        self.view.load_url(&url);
        self.transition(NegotiationState::RedirectRegister);

        Ok(Navigation::Register(url))
    }

    /// Ask the server whether the user-ID is online and redirect accordingly.
    pub async fn connect_server(&mut self, form: &FormInput) -> Result<Navigation, NegotiationError> {
        self.cancel_pending();
        self.transition(NegotiationState::Validating);

        let domain = form.domain.to_lowercase();
        let username = form.username.to_lowercase();
        info!("connect user={username} host={domain}");

        // persist before anything can navigate away
        self.bridge.store_preference(keys::DOMAIN, &domain);
        self.bridge.store_preference(keys::USERNAME, &username);

        if let Some(reason) = self.cookie_clear_reason(&domain, &username, form.options.clear_cookies)
        {
            debug!("wsClearCookies ({reason})");
            self.bridge.ws_clear_cookies();
        }

        self.session = SessionIdentity {
            domain: domain.clone(),
            username: username.clone(),
        };

        if self.cache_clear_due(form.options.clear_cache) {
            self.bridge.ws_clear_cache(false, false);
        }

        if username.is_empty() {
            return self.reject(InvalidInput::MissingUserId.into());
        }

        let have_network = self.bridge.have_network();
        debug!("haveNetwork={have_network}");
        if have_network <= 0 {
            return self.reject(NegotiationError::NoNetwork);
        }

        self.await_status(&domain, &username).await
    }

    /// The view has navigated away; nothing of the pending attempt may touch it anymore.
    pub fn page_left(&mut self) {
        debug!("page left");
        self.cancel_pending();
    }

    fn cookie_clear_reason(
        &self,
        domain: &str,
        username: &str,
        requested: bool,
    ) -> Option<&'static str> {
        if username != self.session.username {
            Some("username changed")
        } else if domain != self.session.domain {
            Some("domain changed")
        } else if requested {
            Some("checkbox")
        } else {
            None
        }
    }

    fn cache_clear_due(&self, requested: bool) -> bool {
        if requested {
            debug!("wsClearCache (checkbox)");
            return true;
        }

        let last_clear = self.bridge.read_preference_long(keys::LAST_CLEAR_CACHE);
        let expired = cache_expired(last_clear, epoch_millis(), self.config.cache_max_age);
        if expired {
            debug!("wsClearCache (last clear {last_clear} too old)");
        }
        expired
    }

    async fn await_status(
        &mut self,
        domain: &str,
        username: &str,
    ) -> Result<Navigation, NegotiationError> {
        self.transition(NegotiationState::AwaitingStatus);

        let mut pending = PendingRequest::new();
        let abort = pending.abort_flag();
        let view = self.view.clone();
        pending.defer(self.config.loading_delay, move || {
            if !abort.load(Ordering::SeqCst) {
                view.set_loading(true);
            }
        });
        self.pending = Some(pending);

        let url = status_url(
            domain,
            username,
            &self.bridge.version_name(),
            &self.bridge.webview_version(),
        );
        info!("check online {url}");

        let body = match self.executor.fetch(FetchRequest::get(url)).await {
            Ok(response) => response.body,
            Err(e) => {
                warn!("xhr error ({}) errcode={}", e.reason(), e.status());
                return self.fail(e.into());
            }
        };
        debug!("xhr response ({body})");

        match StatusResponse::decode(&body) {
            StatusResponse::NotAvailable => Ok(self.redirect_main(domain, username)),
            StatusResponse::Live(live) => {
                if self.bridge.is_connected() > 0 {
                    info!("callee is logged in from this device");
                    Ok(self.redirect_main(domain, username))
                } else {
                    self.fail(NegotiationError::ServerBusy { live })
                }
            }
            StatusResponse::ClearDomain => {
                self.view.set_domain_field("");
                self.bridge
                    .store_preference(keys::DOMAIN, CLEARED_DOMAIN_SENTINEL);
                self.fail(NegotiationError::UnrecognizedResponse(
                    StatusResponse::ClearDomain,
                ))
            }
            response @ (StatusResponse::Error
            | StatusResponse::Busy
            | StatusResponse::Unrecognized(_)) => {
                self.fail(NegotiationError::UnrecognizedResponse(response))
            }
        }
    }

    fn redirect_main(&mut self, domain: &str, username: &str) -> Navigation {
        let url = main_url(domain, username);

        if let Some(pending) = self.pending.as_mut() {
            let abort = pending.abort_flag();
            let view = self.view.clone();
            pending.defer(self.config.redirect_fallback, move || {
                // still here, the redirect failed (maybe a TLS issue)
                warn!("redirect did not complete, handing the form back");
                abort.store(true, Ordering::SeqCst);
                view.set_loading(false);
                view.release_focus();
            });
        }

        info!("switch to main page {url}");
        self.view.replace_url(&url);
        self.transition(NegotiationState::RedirectMain);

        Navigation::Main(url)
    }

    /// Failure after the request started: hide the loading indicator first.
    fn fail(&mut self, err: NegotiationError) -> Result<Navigation, NegotiationError> {
        if let Some(pending) = self.pending.as_mut() {
            pending.cancel();
        }
        self.view.set_loading(false);
        self.reject(err)
    }

    fn reject(&mut self, err: NegotiationError) -> Result<Navigation, NegotiationError> {
        warn!("negotiation failed: {err}");
        self.view.release_focus();
        self.bridge.toast(err.toast_message());

        let state = match err {
            NegotiationError::ServerBusy { .. } => NegotiationState::Busy,
            _ => NegotiationState::Failed,
        };
        self.transition(state);

        Err(err)
    }

    fn cancel_pending(&mut self) {
        if let Some(mut pending) = self.pending.take() {
            pending.cancel();
        }
    }

    fn transition(&mut self, state: NegotiationState) {
        debug!("negotiation {:?} -> {state:?}", self.state);
        self.state = state;
    }
}
