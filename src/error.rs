//! Error taxonomy shared by the service modules.
//!
//! Service boundaries still return `Result<T, String>` / `{success, error}`
//! envelopes (the operator UI only ever displays the message), but the
//! clients and routines underneath classify failures so callers can tell a
//! missing token from a flaky network from a malformed upload.

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// A write path was attempted without a Google bearer token.
    #[error("Not signed in: a Google bearer token is required for this operation")]
    Auth,

    /// The Sheets API (or the delivery partner) answered with a non-2xx status.
    #[error("{message} (HTTP {status})")]
    Network { status: u16, message: String },

    /// The request never got a status code: connect failure, timeout, bad URL.
    #[error("{0}")]
    Transport(String),

    /// Malformed CSV upload or missing required header.
    #[error("Invalid file format: {0}")]
    Format(String),

    /// A tracking id / product / expense was absent from its sheet.
    #[error("{0} not found")]
    NotFound(String),
}

impl ServiceError {
    /// Map an HTTP status to a `Network` error with an operator-friendly message.
    pub fn from_status(status: StatusCode) -> Self {
        let message = match status.as_u16() {
            401 => "Google token is invalid or expired".to_string(),
            403 => "Access to the spreadsheet is denied".to_string(),
            404 => "Spreadsheet or sheet range not found".to_string(),
            429 => "Google Sheets API rate limit reached".to_string(),
            s if s >= 500 => format!("Google Sheets server error (HTTP {s})"),
            s => format!("Unexpected response from Google Sheets (HTTP {s})"),
        };
        ServiceError::Network {
            status: status.as_u16(),
            message,
        }
    }

    /// Convert a `reqwest::Error` into a user-friendly transport error.
    pub fn from_transport(url: &str, err: &reqwest::Error) -> Self {
        if err.is_connect() {
            return ServiceError::Transport(format!("Cannot reach {url}"));
        }
        if err.is_timeout() {
            return ServiceError::Transport(format!("Connection to {url} timed out"));
        }
        if err.is_builder() {
            return ServiceError::Transport(format!("Invalid URL: {url}"));
        }
        ServiceError::Transport(format!("Network error communicating with {url}: {err}"))
    }

    /// True when the failure is transient enough that a retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceError::Transport(_)
                | ServiceError::Network { status: 429, .. }
                | ServiceError::Network { status: 500..=599, .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_maps_to_friendly_messages() {
        let err = ServiceError::from_status(StatusCode::UNAUTHORIZED);
        match err {
            ServiceError::Network { status, ref message } => {
                assert_eq!(status, 401);
                assert!(message.contains("invalid or expired"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
        assert!(ServiceError::from_status(StatusCode::TOO_MANY_REQUESTS).is_transient());
        assert!(ServiceError::from_status(StatusCode::BAD_GATEWAY).is_transient());
        assert!(!ServiceError::from_status(StatusCode::FORBIDDEN).is_transient());
    }

    #[test]
    fn auth_error_message_mentions_token() {
        assert!(ServiceError::Auth.to_string().contains("bearer token"));
    }
}
