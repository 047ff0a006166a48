//! Error taxonomy for the core client.
//!
//! Server error codes are mapped once, at the transport boundary:
//! - `1002` / `1005` / `1010` - stale session
//! - `5005` / `5006` - control PIN wrong / locked (terminal for the client)
//! - `6024` - rate limited / previous command still in progress
//! - `1001` on control-family endpoints - endpoint not supported

use thiserror::Error;

use dicloud_crypto::CryptoError;

/// Result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Server codes that signal a stale session.
pub const SESSION_EXPIRED_CODES: [&str; 3] = ["1002", "1005", "1010"];

/// Errors surfaced by transport, ingestion, and command orchestration.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Connection-level failure (DNS, TCP, TLS, timeout). Retried inside
    /// the transport before surfacing.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Malformed envelope, padding, or JSON. Never retried.
    #[error("protocol error from {endpoint}: {detail}")]
    Protocol { endpoint: String, detail: String },

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// An authenticated endpoint was called with no session present.
    #[error("no active session")]
    SessionRequired,

    /// The server rejected the session token set.
    #[error("session expired (code {code})")]
    SessionExpired { code: String },

    /// Any non-zero server code not otherwise classified.
    #[error("api error {code} from {endpoint}: {message}")]
    Api {
        code: String,
        endpoint: String,
        message: String,
    },

    #[error("control password rejected")]
    ControlPasswordWrong,

    #[error("control password locked")]
    ControlPasswordLocked,

    /// No control PIN configured but a command requires one.
    #[error("control PIN required but not configured")]
    ControlPinMissing,

    #[error("rate limited by {endpoint}")]
    RateLimited { endpoint: String },

    #[error("endpoint not supported: {endpoint} ({detail})")]
    EndpointNotSupported { endpoint: String, detail: String },

    /// Command deadline or wall-clock timeout.
    #[error("timed out waiting for {what}")]
    Timeout { what: String },

    /// Server reported the command failed (`controlState = 2`).
    #[error("remote control command failed")]
    RemoteControlFailure,

    #[error("operation cancelled")]
    Cancelled,
}

impl CoreError {
    /// Whether the transport may retry the failed request.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => !e.is_builder() && !e.is_redirect(),
            _ => false,
        }
    }

    /// Map a non-zero server code to the error taxonomy.
    #[must_use]
    pub fn from_server_code(code: &str, message: &str, endpoint: &str) -> Self {
        if SESSION_EXPIRED_CODES.contains(&code) {
            return Self::SessionExpired { code: code.into() };
        }
        match code {
            "5005" => Self::ControlPasswordWrong,
            "5006" => Self::ControlPasswordLocked,
            "6024" => Self::RateLimited {
                endpoint: endpoint.into(),
            },
            "1001" if is_control_endpoint(endpoint) => Self::EndpointNotSupported {
                endpoint: endpoint.into(),
                detail: format!("code {code}"),
            },
            _ => Self::Api {
                code: code.into(),
                endpoint: endpoint.into(),
                message: message.into(),
            },
        }
    }
}

fn is_control_endpoint(endpoint: &str) -> bool {
    endpoint.starts_with("/control/") || endpoint.starts_with("/vehicle/vehicleswitch/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_codes_map_to_expired() {
        for code in SESSION_EXPIRED_CODES {
            assert!(matches!(
                CoreError::from_server_code(code, "", "/x"),
                CoreError::SessionExpired { .. }
            ));
        }
    }

    #[test]
    fn pin_codes_are_terminal_variants() {
        assert!(matches!(
            CoreError::from_server_code("5005", "", "/control/remoteControl"),
            CoreError::ControlPasswordWrong
        ));
        assert!(matches!(
            CoreError::from_server_code("5006", "", "/control/remoteControl"),
            CoreError::ControlPasswordLocked
        ));
    }

    #[test]
    fn not_supported_only_on_control_family() {
        assert!(matches!(
            CoreError::from_server_code("1001", "", "/control/getGpsInfo"),
            CoreError::EndpointNotSupported { .. }
        ));
        assert!(matches!(
            CoreError::from_server_code("1001", "oops", "/app/account/getAllListByUserId"),
            CoreError::Api { .. }
        ));
    }

    #[test]
    fn unknown_code_is_api_error() {
        let err = CoreError::from_server_code("1007", "Service error", "/control/remoteControl");
        match err {
            CoreError::Api { code, message, .. } => {
                assert_eq!(code, "1007");
                assert_eq!(message, "Service error");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
