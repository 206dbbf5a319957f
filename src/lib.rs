pub mod config;
pub mod host_bridge;
pub mod http_client;
pub mod services;
pub mod shell;

pub use crate::{
    config::{AppConfig, NegotiationConfig, ShellConfig},
    host_bridge::{FormView, HostBridge},
    http_client::{
        FetchError, FetchMethod, FetchRequest, FetchResponse, ReqwestExecutor, RequestExecutor,
    },
    services::{
        form::{FormField, FormInput, FormOptions, FormState},
        negotiator::{
            ConnectionNegotiator, InvalidInput, NegotiationError, NegotiationState, Navigation,
            SessionIdentity,
        },
        status::StatusResponse,
    },
};

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the unix epoch, `0` if the clock is set before it.
pub(crate) fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
