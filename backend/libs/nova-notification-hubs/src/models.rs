use reqwest::header::{ETAG, LOCATION};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::errors::{HubError, ValidationError};
use crate::transport::RawResponse;

/// Content type of registration descriptions, which are Atom entries
pub const REGISTRATION_CONTENT_TYPE: &str = "application/atom+xml;type=entry;charset=utf-8";

/// Platform format tag sent in `ServiceBusNotification-Format`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationFormat {
    Apple,
    Gcm,
    FcmV1,
    Windows,
    WindowsPhone,
    Template,
    Baidu,
    Adm,
}

impl NotificationFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationFormat::Apple => "apple",
            NotificationFormat::Gcm => "gcm",
            NotificationFormat::FcmV1 => "fcmv1",
            NotificationFormat::Windows => "windows",
            NotificationFormat::WindowsPhone => "windowsphone",
            NotificationFormat::Template => "template",
            NotificationFormat::Baidu => "baidu",
            NotificationFormat::Adm => "adm",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            NotificationFormat::Windows | NotificationFormat::WindowsPhone => {
                "application/xml;charset=utf-8"
            }
            NotificationFormat::Baidu => "application/x-www-form-urlencoded;charset=utf-8",
            _ => "application/json;charset=utf-8",
        }
    }
}

impl fmt::Display for NotificationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "apple" => Ok(NotificationFormat::Apple),
            "gcm" => Ok(NotificationFormat::Gcm),
            "fcmv1" => Ok(NotificationFormat::FcmV1),
            "windows" => Ok(NotificationFormat::Windows),
            "windowsphone" => Ok(NotificationFormat::WindowsPhone),
            "template" => Ok(NotificationFormat::Template),
            "baidu" => Ok(NotificationFormat::Baidu),
            "adm" => Ok(NotificationFormat::Adm),
            _ => Err(ValidationError::new("format", "is not a supported notification format", s)),
        }
    }
}

/// Opaque notification body plus the format tag it was encoded for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub format: NotificationFormat,
    pub payload: Vec<u8>,
}

impl Notification {
    pub fn new(format: NotificationFormat, payload: impl Into<Vec<u8>>) -> Result<Self, HubError> {
        let payload = payload.into();
        if payload.is_empty() {
            return Err(ValidationError::new("payload", "must not be empty", "0 bytes").into());
        }
        Ok(Self { format, payload })
    }

    /// Apple silent push: `{"aps":{"content-available":1}}`
    pub fn is_apple_background(&self) -> bool {
        self.format == NotificationFormat::Apple && is_background_payload(&self.payload)
    }
}

fn is_background_payload(payload: &[u8]) -> bool {
    let value = serde_json::from_slice::<serde_json::Value>(payload).ok();
    value.and_then(|v| v.get("aps")?.get("content-available")?.as_i64()) == Some(1)
}

/// Last non-empty path segment of a `Location` URL
fn last_path_segment(location: &str) -> Option<String> {
    let url = Url::parse(location).ok()?;
    url.path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .map(str::to_string)
}

/// What the service reports back for an accepted send
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTelemetry {
    /// Last path segment of the `Location` header, when the service sent one
    pub notification_message_id: Option<String>,
}

impl NotificationTelemetry {
    pub(crate) fn from_location(location: Option<&str>) -> Self {
        let notification_message_id = location.and_then(last_path_segment);

        Self {
            notification_message_id,
        }
    }
}

/// Successful delivery to one device in a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectSendResult {
    pub device_handle: String,
    pub telemetry: NotificationTelemetry,
}

/// Outcome of a fan-out send
///
/// Successful deliveries are kept even when the batch fails or is
/// cancelled part way through.
#[derive(Debug)]
pub struct BatchSendResult {
    pub delivered: Vec<DirectSendResult>,
    pub error: Option<HubError>,
}

impl BatchSendResult {
    pub fn success_count(&self) -> usize {
        self.delivered.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<Vec<DirectSendResult>, HubError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.delivered),
        }
    }
}

/// Registration description to create or replace
///
/// The body is the service's Atom entry for the target platform and is sent
/// as-is, the same way notification payloads are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// `None` creates a new registration; `Some` replaces the one with this id
    pub registration_id: Option<String>,
    pub body: Vec<u8>,
}

impl Registration {
    pub fn new(body: impl Into<Vec<u8>>) -> Result<Self, HubError> {
        let body = body.into();
        if body.is_empty() {
            return Err(ValidationError::new("registration", "must not be empty", "0 bytes").into());
        }
        Ok(Self {
            registration_id: None,
            body,
        })
    }

    pub fn with_id(mut self, registration_id: impl Into<String>) -> Self {
        self.registration_id = Some(registration_id.into());
        self
    }
}

/// Registration document (or feed) returned by the service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationResponse {
    /// From the `Location` header, else the id the request addressed
    pub registration_id: Option<String>,
    pub etag: Option<String>,
    pub body: Vec<u8>,
}

impl RegistrationResponse {
    pub(crate) fn from_response(response: RawResponse, requested_id: Option<&str>) -> Self {
        let registration_id = response
            .header(LOCATION)
            .and_then(last_path_segment)
            .or_else(|| requested_id.map(str::to_string));
        let etag = response.header(ETAG).map(str::to_string);

        Self {
            registration_id,
            etag,
            body: response.body,
        }
    }

    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}
