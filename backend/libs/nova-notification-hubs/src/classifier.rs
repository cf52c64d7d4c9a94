use reqwest::header::HeaderMap;
use std::borrow::Cow;

use crate::errors::{ErrorCode, NotificationHubError};
use crate::transport::RawResponse;

/// Correlation id assigned by the service to every response
pub const REQUEST_ID_HEADER: &str = "x-ms-request-id";

/// Status → (code, default message)
fn code_for_status(status: u16) -> (ErrorCode, Cow<'static, str>) {
    let (code, message) = match status {
        400 => (ErrorCode::InvalidRequest, "Bad request"),
        401 => (ErrorCode::Unauthorized, "Unauthorized"),
        403 => (ErrorCode::AuthenticationFailed, "Authentication failed"),
        404 => (ErrorCode::RegistrationNotFound, "Resource not found"),
        413 => (ErrorCode::PayloadTooLarge, "Payload too large"),
        429 => (ErrorCode::RateLimited, "Rate limited"),
        500 => (ErrorCode::ServerError, "Internal server error"),
        503 => (ErrorCode::ServiceUnavailable, "Service unavailable"),
        504 => (ErrorCode::Timeout, "Gateway timeout"),
        other => {
            let message = format!("HTTP {}", other);
            return (ErrorCode::ServerError, Cow::Owned(message));
        }
    };
    (code, Cow::Borrowed(message))
}

/// Turn a completed response into a typed error.
///
/// Pure function of its inputs: the body becomes `details` verbatim (lossy
/// UTF-8) and the request id comes from `x-ms-request-id`.
pub fn classify(status: u16, body: &[u8], headers: &HeaderMap) -> NotificationHubError {
    let (code, message) = code_for_status(status);

    let details = String::from_utf8_lossy(body).into_owned();
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    NotificationHubError::from_response(code, message, details, status, request_id)
}

pub fn classify_response(response: &RawResponse) -> NotificationHubError {
    classify(response.status.as_u16(), &response.body, &response.headers)
}
