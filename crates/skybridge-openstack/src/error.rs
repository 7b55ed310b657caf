//! Translation of HTTP and transport failures into the bridge taxonomy
//!
//! Everything that leaves this crate is a [`CloudError`]; callers never see
//! a `reqwest::Error` or a raw status code.

use reqwest::StatusCode;
use skybridge_cloud::CloudError;

/// Connection-level failures (refused, reset, DNS, client timeout)
pub(crate) fn transport(err: reqwest::Error) -> CloudError {
    if err.is_timeout() {
        CloudError::TransientRemoteFailure(format!("request timed out: {}", err))
    } else {
        CloudError::Transport(err.to_string())
    }
}

/// Classify a non-success response
pub(crate) fn from_status(status: StatusCode, kind: &str, id: &str, body: &str) -> CloudError {
    let message = fault_message(body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    });

    match status.as_u16() {
        401 | 403 => CloudError::Authorization(message),
        404 => CloudError::not_found(kind, id),
        409 => CloudError::Conflict(message),
        408 | 429 | 500..=599 => {
            CloudError::TransientRemoteFailure(format!("{} {}: {}", status.as_u16(), kind, message))
        }
        code => CloudError::Remote {
            status: code,
            message,
        },
    }
}

/// Pull the message out of a control-plane fault body
///
/// Faults look like `{"itemNotFound": {"message": "...", "code": 404}}` or
/// `{"error": {"message": "...", "code": 401}}`.
fn fault_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let object = value.as_object()?;

    if let Some(message) = object.get("message").and_then(|m| m.as_str()) {
        return Some(message.to_string());
    }

    object
        .values()
        .find_map(|v| v.get("message").and_then(|m| m.as_str()))
        .map(|m| m.to_string())
}
