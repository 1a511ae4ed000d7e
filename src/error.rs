//! Error taxonomy for the gateway core.
//!
//! Malformed client frames and auth failures are logged and swallowed by the
//! dispatcher; provider failures surface a single `error` frame to the
//! client and the call continues; persistence failures are logged and never
//! surfaced.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("auth invalid: {0}")]
    AuthInvalid(String),

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("feedback parse error: {0}")]
    FeedbackParseError(String),

    #[error("persist failure: {0}")]
    PersistFailure(String),
}

impl CoreError {
    /// Errors the Dispatcher relays to the client as a single `error` frame.
    /// `Timeout` is folded into the same client-visible bucket as
    /// `ProviderUnavailable` per the design notes.
    pub fn is_client_visible(&self) -> bool {
        matches!(self, CoreError::ProviderUnavailable(_) | CoreError::Timeout(_))
    }

    pub fn client_message(&self) -> String {
        match self {
            CoreError::ProviderUnavailable(msg) => msg.clone(),
            CoreError::Timeout(d) => format!("upstream timed out after {:?}", d),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_and_timeout_are_client_visible() {
        assert!(CoreError::ProviderUnavailable("x".into()).is_client_visible());
        assert!(CoreError::Timeout(Duration::from_secs(1)).is_client_visible());
    }

    #[test]
    fn malformed_and_auth_are_not_client_visible() {
        assert!(!CoreError::MalformedFrame("x".into()).is_client_visible());
        assert!(!CoreError::AuthInvalid("x".into()).is_client_visible());
        assert!(!CoreError::PersistFailure("x".into()).is_client_visible());
        assert!(!CoreError::FeedbackParseError("x".into()).is_client_visible());
    }
}
