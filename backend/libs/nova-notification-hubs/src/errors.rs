use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result alias used across the notification hubs client
pub type Result<T> = std::result::Result<T, HubError>;

/// Closed set of error codes a notification hub failure is classified into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidRequest,
    Unauthorized,
    AuthenticationFailed,
    InvalidConnectionString,
    RegistrationNotFound,
    PayloadTooLarge,
    RateLimited,
    ServerError,
    ServiceUnavailable,
    Timeout,
    InvalidPayload,
}

/// Fixed facets attached to every error code
struct CodeFacets {
    name: &'static str,
    retryable: bool,
    authentication: bool,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 11] = [
        ErrorCode::InvalidRequest,
        ErrorCode::Unauthorized,
        ErrorCode::AuthenticationFailed,
        ErrorCode::InvalidConnectionString,
        ErrorCode::RegistrationNotFound,
        ErrorCode::PayloadTooLarge,
        ErrorCode::RateLimited,
        ErrorCode::ServerError,
        ErrorCode::ServiceUnavailable,
        ErrorCode::Timeout,
        ErrorCode::InvalidPayload,
    ];

    // No wildcard arm: every code declares its own facets.
    const fn facets(self) -> CodeFacets {
        match self {
            ErrorCode::InvalidRequest => CodeFacets {
                name: "INVALID_REQUEST",
                retryable: false,
                authentication: false,
            },
            ErrorCode::Unauthorized => CodeFacets {
                name: "UNAUTHORIZED",
                retryable: false,
                authentication: true,
            },
            ErrorCode::AuthenticationFailed => CodeFacets {
                name: "AUTHENTICATION_FAILED",
                retryable: false,
                authentication: true,
            },
            ErrorCode::InvalidConnectionString => CodeFacets {
                name: "INVALID_CONNECTION_STRING",
                retryable: false,
                authentication: true,
            },
            ErrorCode::RegistrationNotFound => CodeFacets {
                name: "REGISTRATION_NOT_FOUND",
                retryable: false,
                authentication: false,
            },
            ErrorCode::PayloadTooLarge => CodeFacets {
                name: "PAYLOAD_TOO_LARGE",
                retryable: false,
                authentication: false,
            },
            ErrorCode::RateLimited => CodeFacets {
                name: "RATE_LIMITED",
                retryable: true,
                authentication: false,
            },
            ErrorCode::ServerError => CodeFacets {
                name: "SERVER_ERROR",
                retryable: true,
                authentication: false,
            },
            ErrorCode::ServiceUnavailable => CodeFacets {
                name: "SERVICE_UNAVAILABLE",
                retryable: true,
                authentication: false,
            },
            ErrorCode::Timeout => CodeFacets {
                name: "TIMEOUT",
                retryable: true,
                authentication: false,
            },
            ErrorCode::InvalidPayload => CodeFacets {
                name: "INVALID_PAYLOAD",
                retryable: false,
                authentication: false,
            },
        }
    }

    /// Wire name, e.g. `INVALID_REQUEST`
    pub const fn as_str(self) -> &'static str {
        self.facets().name
    }

    /// Whether a caller may retry the failed call with backoff
    pub const fn is_retryable(self) -> bool {
        self.facets().retryable
    }

    /// Whether the failure points at credentials rather than the request
    pub const fn is_authentication_error(self) -> bool {
        self.facets().authentication
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure reported by (or about) the notification hub service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationHubError {
    code: ErrorCode,
    message: String,
    details: String,
    status_code: u16,
    request_id: String,
}

impl NotificationHubError {
    /// Create an error that did not come from an HTTP response
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: String::new(),
            status_code: 0,
            request_id: String::new(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub(crate) fn from_response(
        code: ErrorCode,
        message: impl Into<String>,
        details: String,
        status_code: u16,
        request_id: String,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            status_code,
            request_id,
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Raw response body, empty when the service sent none
    pub fn details(&self) -> &str {
        &self.details
    }

    /// HTTP status, `0` for errors raised locally
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Service-assigned correlation id, empty when absent
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    pub fn is_authentication_error(&self) -> bool {
        self.code.is_authentication_error()
    }
}

impl fmt::Display for NotificationHubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "notification hub error [{}]: {}",
            self.code, self.message
        )?;
        if !self.details.is_empty() {
            write!(f, " - {}", self.details)?;
        }
        Ok(())
    }
}

impl std::error::Error for NotificationHubError {}

/// Field-level input rejection raised before any request is sent
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation error for field '{field}': {message} (value: {value})")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub value: String,
}

impl ValidationError {
    pub fn new(
        field: impl Into<String>,
        message: impl Into<String>,
        value: impl fmt::Display,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            value: value.to_string(),
        }
    }
}

/// Immutable set of errors collected by a fan-out operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateError {
    errors: Vec<HubError>,
}

impl AggregateError {
    pub(crate) fn new(errors: Vec<HubError>) -> Self {
        Self { errors }
    }

    pub fn errors(&self) -> &[HubError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HubError> {
        self.errors.iter()
    }
}

impl<'a> IntoIterator for &'a AggregateError {
    type Item = &'a HubError;
    type IntoIter = std::slice::Iter<'a, HubError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        render_summary(&self.errors, f)
    }
}

impl std::error::Error for AggregateError {}

/// Shared rendering for collected errors: one error speaks for itself,
/// several are summarized by count.
pub(crate) fn render_summary(errors: &[HubError], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match errors {
        [] => f.write_str("no errors occurred"),
        [single] => write!(f, "{}", single),
        many => write!(f, "multiple errors occurred ({} errors)", many.len()),
    }
}

/// Notification hubs client error
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HubError {
    #[error(transparent)]
    Service(#[from] NotificationHubError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Multiple(#[from] AggregateError),

    #[error("delivery to device handle '{device_handle}' failed: {source}")]
    Recipient {
        device_handle: String,
        source: Box<HubError>,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Operation cancelled after {completed} of {total} requests completed")]
    Cancelled { completed: usize, total: usize },
}

impl HubError {
    pub(crate) fn recipient(device_handle: &str, source: HubError) -> Self {
        HubError::Recipient {
            device_handle: device_handle.to_string(),
            source: Box::new(source),
        }
    }

    /// Classified code, looking through per-recipient wrappers
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            HubError::Service(e) => Some(e.code()),
            HubError::Recipient { source, .. } => source.code(),
            _ => None,
        }
    }

    /// Advisory retry hint; the client itself never retries
    pub fn is_retryable(&self) -> bool {
        match self {
            HubError::Service(e) => e.is_retryable(),
            HubError::Recipient { source, .. } => source.is_retryable(),
            HubError::Multiple(agg) => !agg.is_empty() && agg.iter().all(HubError::is_retryable),
            HubError::Transport(_) => true,
            HubError::Validation(_) | HubError::Configuration(_) | HubError::Cancelled { .. } => {
                false
            }
        }
    }

    pub fn is_authentication_error(&self) -> bool {
        match self {
            HubError::Service(e) => e.is_authentication_error(),
            HubError::Recipient { source, .. } => source.is_authentication_error(),
            HubError::Multiple(agg) => agg.iter().any(HubError::is_authentication_error),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for HubError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HubError::Service(NotificationHubError::new(
                ErrorCode::Timeout,
                format!("Request timed out: {}", err),
            ))
        } else {
            HubError::Transport(err.to_string())
        }
    }
}
