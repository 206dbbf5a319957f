//! Decoding of the `/rtcsig/online` status body.

/// Answer of the signaling server to "is this user-ID online?".
///
/// Only the prefix of the plain-text body carries meaning; the body is
/// decoded once here and handled exhaustively by the negotiator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatusResponse {
    Error,
    Busy,
    /// The user-ID is not connected anywhere, logging in may proceed.
    NotAvailable,
    /// The user-ID is connected, the body is its live signaling URL.
    Live(String),
    /// The server asks the client to forget the stored domain.
    ClearDomain,
    Unrecognized(String),
}

impl StatusResponse {
    pub fn decode(body: &str) -> Self {
        if body.starts_with("error") {
            StatusResponse::Error
        } else if body.starts_with("busy") {
            StatusResponse::Busy
        } else if body.starts_with("notavail") {
            StatusResponse::NotAvailable
        } else if body.starts_with("wss://") || body.starts_with("ws://") {
            StatusResponse::Live(body.to_string())
        } else if body.starts_with("clear") {
            StatusResponse::ClearDomain
        } else {
            StatusResponse::Unrecognized(body.to_string())
        }
    }
}
