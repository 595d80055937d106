//! W3C WebDriver error translation

use action_primitives::DriverError;
use thiserror::Error;

/// Construction-time errors for [`crate::WebDriverDriver`]
#[derive(Debug, Error)]
pub enum WdError {
    #[error("invalid WebDriver endpoint '{0}'")]
    InvalidEndpoint(String),
    #[error("missing WebDriver session id")]
    MissingSession,
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

pub type WdResult<T> = Result<T, WdError>;

/// Map a W3C error code (the `value.error` field of a failed response) to a
/// driver error.
pub fn map_w3c_error(code: &str, message: &str) -> DriverError {
    let detail = if message.is_empty() {
        code.to_string()
    } else {
        message.to_string()
    };
    match code {
        "no such element" | "no such alert" => DriverError::ElementNotFound(detail),
        "stale element reference" | "detached shadow root" => DriverError::StaleElement(detail),
        "timeout" | "script timeout" => DriverError::Timeout(detail),
        "invalid session id" | "session not created" | "no such window" => {
            DriverError::SessionLost(detail)
        }
        "invalid selector" => DriverError::InvalidLocator(detail),
        _ => DriverError::Protocol(format!("{code}: {detail}")),
    }
}

/// Map a transport failure. Connection loss means the browser is gone.
pub fn map_transport_error(err: &reqwest::Error) -> DriverError {
    if err.is_connect() {
        DriverError::SessionLost(format!("connection to WebDriver failed: {err}"))
    } else if err.is_timeout() {
        DriverError::Timeout(format!("WebDriver request timed out: {err}"))
    } else {
        DriverError::Protocol(format!("WebDriver request failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_recoverable_codes() {
        assert!(matches!(
            map_w3c_error("no such element", "#login-btn"),
            DriverError::ElementNotFound(msg) if msg == "#login-btn"
        ));
        assert!(matches!(
            map_w3c_error("stale element reference", ""),
            DriverError::StaleElement(msg) if msg == "stale element reference"
        ));
        assert!(matches!(
            map_w3c_error("script timeout", "slow"),
            DriverError::Timeout(_)
        ));
        assert!(matches!(
            map_w3c_error("invalid selector", "bad xpath"),
            DriverError::InvalidLocator(_)
        ));
    }

    #[test]
    fn session_codes_are_fatal() {
        assert!(map_w3c_error("invalid session id", "gone").is_fatal());
        assert!(map_w3c_error("no such window", "closed").is_fatal());
        assert!(!map_w3c_error("element click intercepted", "overlay").is_fatal());
    }

    #[test]
    fn unknown_codes_keep_the_code() {
        match map_w3c_error("unknown error", "boom") {
            DriverError::Protocol(msg) => assert_eq!(msg, "unknown error: boom"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
