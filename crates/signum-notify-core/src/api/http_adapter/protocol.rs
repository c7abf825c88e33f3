use std::error::Error as _;

use tracing::debug;

use crate::api::scrub::scrub_secrets;
use crate::error::{ApiError, TransportKind};

/// Decode a response body and surface node-side errors.
///
/// A body is a domain error when it carries `errorCode` and/or
/// `errorDescription`, whatever else it contains.
pub(super) fn parse_envelope(body: &str) -> Result<serde_json::Value, ApiError> {
    let value: serde_json::Value = serde_json::from_str(body).map_err(|e| {
        debug!(body = %scrub_secrets(body), "undecodable node response");
        ApiError::decode(format!("decode node response: {e}"))
    })?;
    check_domain_error(value)
}

pub(crate) fn check_domain_error(value: serde_json::Value) -> Result<serde_json::Value, ApiError> {
    let code = value.get("errorCode");
    let description = value.get("errorDescription");
    if code.is_none() && description.is_none() {
        return Ok(value);
    }

    // Nodes have sent the code both as a number and as a numeric string.
    let code = code
        .and_then(|c| c.as_i64().or_else(|| c.as_str()?.parse().ok()))
        .unwrap_or(-1);
    let description = description
        .and_then(serde_json::Value::as_str)
        .unwrap_or("unknown node error");
    Err(ApiError::domain(code, description))
}

/// Convert a `reqwest` failure into a classified, URL-free transport error.
pub(super) fn transport_error(err: reqwest::Error) -> ApiError {
    let err = err.without_url();
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    let kind = classify_transport(&err, &message);
    ApiError::transport(kind, message)
}

fn classify_transport(err: &reqwest::Error, text: &str) -> TransportKind {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return TransportKind::ConnectionRefused;
            }
        }
        source = cause.source();
    }

    match classify_message(text) {
        TransportKind::Other if err.is_timeout() && err.is_connect() => {
            // The connect phase includes the TLS handshake; nothing reached
            // the node's API handler yet.
            TransportKind::TlsHandshakeTimeout
        }
        TransportKind::Other if err.is_timeout() => TransportKind::Timeout,
        kind => kind,
    }
}

pub(super) fn classify_message(text: &str) -> TransportKind {
    let lower = text.to_ascii_lowercase();
    if lower.contains("connection refused") {
        TransportKind::ConnectionRefused
    } else if lower.contains("host unreachable") || lower.contains("no route to host") {
        TransportKind::HostUnreachable
    } else if lower.contains("certificate") && lower.contains("expired") {
        TransportKind::CertificateExpired
    } else if lower.contains("handshake")
        && (lower.contains("timeout") || lower.contains("timed out"))
    {
        TransportKind::TlsHandshakeTimeout
    } else if lower.contains("remote error") || lower.contains("received fatal alert") {
        TransportKind::RemoteError
    } else {
        TransportKind::Other
    }
}
