use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, LOCATION};
use reqwest::{Method, Request};
use secrecy::ExposeSecret;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::RequestAuthenticator;
use crate::classifier::classify_response;
use crate::clock::Clock;
use crate::config::HubConfig;
use crate::connection::ConnectionDescriptor;
use crate::errors::{ErrorCode, HubError, NotificationHubError, Result, ValidationError};
use crate::models::{
    BatchSendResult, DirectSendResult, Notification, NotificationTelemetry, Registration,
    RegistrationResponse, REGISTRATION_CONTENT_TYPE,
};
use crate::multi_error::MultiError;
use crate::signer::TokenSigner;
use crate::transport::{HttpTransport, RawResponse, ReqwestTransport};
use crate::validation::{
    validate_device_handle, validate_identifier, validate_payload_size, validate_tag_expression,
};

pub const API_VERSION: &str = "2016-07";
pub const SERVICE_VERSION: &str = "2015-01";

const FORMAT_HEADER: HeaderName = HeaderName::from_static("servicebusnotification-format");
const TAGS_HEADER: HeaderName = HeaderName::from_static("servicebusnotification-tags");
const DEVICE_HANDLE_HEADER: HeaderName =
    HeaderName::from_static("servicebusnotification-devicehandle");
const SCHEDULE_TIME_HEADER: HeaderName =
    HeaderName::from_static("servicebusnotification-scheduletime");
const SERVICE_VERSION_HEADER: HeaderName = HeaderName::from_static("x-ms-version");
const APNS_PUSH_TYPE_HEADER: HeaderName = HeaderName::from_static("apns-push-type");
const APNS_PRIORITY_HEADER: HeaderName = HeaderName::from_static("apns-priority");
const IF_MATCH_HEADER: HeaderName = HeaderName::from_static("if-match");

const SCHEDULE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// First characters of a device handle, enough to correlate logs
fn handle_prefix(handle: &str) -> String {
    handle.chars().take(8).collect()
}

fn header_value(field: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| {
        ValidationError::new(field, "contains characters not allowed in a header", value).into()
    })
}

/// Notification Hubs client
///
/// Every call validates its input, builds the request, signs it with a fresh
/// SAS token, executes it under the request timeout, and classifies any
/// non-2xx response. Nothing is retried here; callers decide using
/// `HubError::is_retryable` / `is_authentication_error`.
pub struct NotificationHub {
    hub_url: Url,
    hub_path: String,
    authenticator: RequestAuthenticator,
    transport: Arc<dyn HttpTransport>,
    request_timeout: Duration,
    batch_timeout: Duration,
    max_concurrent_sends: usize,
    max_payload_bytes: usize,
}

impl NotificationHub {
    /// Create a client from a connection string and hub name with default settings
    pub fn new(connection_string: &str, hub_path: &str) -> Result<Self> {
        Self::from_config(&HubConfig::new(connection_string, hub_path))
    }

    pub fn from_config(config: &HubConfig) -> Result<Self> {
        config.check()?;

        let descriptor = ConnectionDescriptor::parse(config.connection_string.expose_secret())?;
        let hub_path = config.hub_path.trim_matches('/').to_string();
        if hub_path.is_empty() {
            let err = ValidationError::new("hub_path", "must not be empty", &config.hub_path);
            return Err(err.into());
        }
        let hub_url = descriptor.endpoint_url()?;

        let transport = ReqwestTransport::new(config.request_timeout())?;
        let signer = TokenSigner::new(config.token_ttl());

        info!(
            host = %descriptor.endpoint_host(),
            hub = %hub_path,
            key_name = %descriptor.key_name(),
            "Initialized notification hub client"
        );

        Ok(Self {
            hub_url,
            hub_path,
            authenticator: RequestAuthenticator::new(Arc::new(descriptor), signer),
            transport: Arc::new(transport),
            request_timeout: config.request_timeout(),
            batch_timeout: config.batch_timeout(),
            max_concurrent_sends: config.max_concurrent_sends,
            max_payload_bytes: config.max_payload_bytes,
        })
    }

    /// Replace the HTTP transport
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// Replace the clock used for token expiry and schedule checks
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        let validity = self.authenticator.signer().validity();
        self.authenticator = self
            .authenticator
            .with_signer(TokenSigner::with_clock(validity, clock));
        self
    }

    pub fn hub_path(&self) -> &str {
        &self.hub_path
    }

    /// `https://{host}/{hub}/{segments..}?{query}`
    fn resource_url(&self, segments: &[&str], query: &str) -> Url {
        let mut url = self.hub_url.clone();
        let mut path = format!("/{}/", self.hub_path);
        path.push_str(&segments.join("/"));
        url.set_path(&path);
        url.set_query(Some(query));
        url
    }

    fn registration_url(&self, registration_id: &str) -> Url {
        self.resource_url(&["registrations", registration_id], &Self::api_query(false))
    }

    fn api_query(direct: bool) -> String {
        if direct {
            format!("direct&api-version={}", API_VERSION)
        } else {
            format!("api-version={}", API_VERSION)
        }
    }

    fn validate_notification(&self, notification: &Notification) -> Result<()> {
        validate_payload_size("payload", &notification.payload, self.max_payload_bytes)?;
        Ok(())
    }

    /// Headers common to every send flavor
    fn notification_headers(&self, notification: &Notification) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static(notification.format.content_type()),
        );
        headers.insert(
            FORMAT_HEADER,
            HeaderValue::from_static(notification.format.as_str()),
        );
        if notification.is_apple_background() {
            headers.insert(
                APNS_PUSH_TYPE_HEADER,
                HeaderValue::from_static("background"),
            );
            headers.insert(APNS_PRIORITY_HEADER, HeaderValue::from_static("5"));
        }
        headers
    }

    fn prepare(
        &self,
        method: Method,
        url: Url,
        mut headers: HeaderMap,
        body: Option<Vec<u8>>,
    ) -> Result<Request> {
        headers.insert(
            SERVICE_VERSION_HEADER,
            HeaderValue::from_static(SERVICE_VERSION),
        );

        let mut request = Request::new(method, url);
        *request.headers_mut() = headers;
        if let Some(body) = body {
            *request.body_mut() = Some(body.into());
        }

        self.authenticator.authenticate(request)
    }

    /// Execute a prepared request; non-2xx responses come back classified
    async fn dispatch(&self, request: Request) -> Result<RawResponse> {
        let method = request.method().clone();
        let path = request.url().path().to_string();

        let response = tokio::time::timeout(self.request_timeout, self.transport.execute(request))
            .await
            .map_err(|_| {
                NotificationHubError::new(
                    ErrorCode::Timeout,
                    format!("Request timed out after {:?}", self.request_timeout),
                )
            })??;

        if response.is_success() {
            debug!(
                %method,
                %path,
                status = response.status.as_u16(),
                "Notification hub request succeeded"
            );
            return Ok(response);
        }

        let err = classify_response(&response);
        warn!(
            %method,
            %path,
            status = err.status_code(),
            code = %err.code(),
            request_id = %err.request_id(),
            retryable = err.is_retryable(),
            "Notification hub request failed"
        );
        Err(err.into())
    }

    async fn post_notification(
        &self,
        url: Url,
        headers: HeaderMap,
        notification: &Notification,
    ) -> Result<NotificationTelemetry> {
        let request = self.prepare(
            Method::POST,
            url,
            headers,
            Some(notification.payload.clone()),
        )?;
        let response = self.dispatch(request).await?;

        Ok(NotificationTelemetry::from_location(response.header(LOCATION)))
    }

    /// Send to every registration matching `tags`, or broadcast when `None`
    pub async fn send(
        &self,
        notification: &Notification,
        tags: Option<&str>,
    ) -> Result<NotificationTelemetry> {
        self.validate_notification(notification)?;

        let mut headers = self.notification_headers(notification);
        if let Some(tags) = tags {
            validate_tag_expression("tags", tags)?;
            headers.insert(TAGS_HEADER, header_value("tags", tags)?);
        }

        let url = self.resource_url(&["messages", ""], &Self::api_query(false));
        let telemetry = self.post_notification(url, headers, notification).await?;

        info!(
            format = %notification.format,
            tagged = tags.is_some(),
            message_id = ?telemetry.notification_message_id,
            "Notification sent"
        );
        Ok(telemetry)
    }

    /// Send straight to one device handle, bypassing registrations
    pub async fn send_direct(
        &self,
        notification: &Notification,
        device_handle: &str,
    ) -> Result<NotificationTelemetry> {
        self.validate_notification(notification)?;
        validate_device_handle("device_handle", device_handle)?;

        let mut headers = self.notification_headers(notification);
        headers.insert(
            DEVICE_HANDLE_HEADER,
            header_value("device_handle", device_handle)?,
        );

        let url = self.resource_url(&["messages", ""], &Self::api_query(true));
        let telemetry = self.post_notification(url, headers, notification).await?;

        debug!(
            format = %notification.format,
            device = %handle_prefix(device_handle),
            "Direct notification sent"
        );
        Ok(telemetry)
    }

    /// Direct send to many handles, bounded by the configured batch timeout
    pub async fn send_direct_batch(
        &self,
        notification: &Notification,
        device_handles: &[String],
    ) -> Result<BatchSendResult> {
        let timeout = tokio::time::sleep(self.batch_timeout);
        self.send_direct_batch_until(notification, device_handles, timeout)
            .await
    }

    /// Direct send to many handles until `cancel` resolves.
    ///
    /// Per-device failures are collected, not short-circuited. When `cancel`
    /// fires first, in-flight sends are dropped, deliveries already made are
    /// kept, and the error carries a `Cancelled` entry.
    pub async fn send_direct_batch_until<C>(
        &self,
        notification: &Notification,
        device_handles: &[String],
        cancel: C,
    ) -> Result<BatchSendResult>
    where
        C: Future<Output = ()>,
    {
        if device_handles.is_empty() {
            return Err(ValidationError::new("device_handles", "must not be empty", "[]").into());
        }
        self.validate_notification(notification)?;

        let total = device_handles.len();
        let errors = MultiError::new();
        let delivered = Mutex::new(Vec::with_capacity(total));

        info!(
            format = %notification.format,
            devices = total,
            concurrency = self.max_concurrent_sends,
            "Sending direct notification batch"
        );

        let completed = {
            let errors = &errors;
            let delivered = &delivered;
            let fan_out = stream::iter(device_handles).for_each_concurrent(
                self.max_concurrent_sends,
                |handle| async move {
                    match self.send_direct(notification, handle).await {
                        Ok(telemetry) => {
                            let result = DirectSendResult {
                                device_handle: handle.clone(),
                                telemetry,
                            };
                            delivered.lock().push(result);
                        }
                        Err(e) => {
                            warn!(
                                device = %handle_prefix(handle),
                                error = %e,
                                "Direct send failed"
                            );
                            errors.add(HubError::recipient(handle, e));
                        }
                    }
                },
            );

            tokio::select! {
                biased;
                _ = fan_out => true,
                _ = cancel => false,
            }
        };

        let delivered = delivered.into_inner();
        if !completed {
            let finished = delivered.len() + errors.len();
            warn!(
                completed = finished,
                total,
                "Direct notification batch cancelled"
            );
            errors.add(HubError::Cancelled {
                completed: finished,
                total,
            });
        }

        info!(
            succeeded = delivered.len(),
            failed = errors.len(),
            "Direct notification batch finished"
        );

        Ok(BatchSendResult {
            delivered,
            error: errors.into_result().err(),
        })
    }

    /// Queue a notification for delivery at `delivery_time` (UTC)
    pub async fn schedule(
        &self,
        notification: &Notification,
        tags: Option<&str>,
        delivery_time: DateTime<Utc>,
    ) -> Result<NotificationTelemetry> {
        self.validate_notification(notification)?;

        let now = self.authenticator.signer().clock().now();
        if delivery_time <= now {
            let value = delivery_time.to_rfc3339();
            let err = ValidationError::new("delivery_time", "must be in the future", value);
            return Err(err.into());
        }

        let mut headers = self.notification_headers(notification);
        if let Some(tags) = tags {
            validate_tag_expression("tags", tags)?;
            headers.insert(TAGS_HEADER, header_value("tags", tags)?);
        }
        let schedule_time = delivery_time.format(SCHEDULE_TIME_FORMAT).to_string();
        headers.insert(
            SCHEDULE_TIME_HEADER,
            header_value("delivery_time", &schedule_time)?,
        );

        let url = self.resource_url(&["schedulednotifications", ""], &Self::api_query(false));
        let telemetry = self.post_notification(url, headers, notification).await?;

        info!(
            format = %notification.format,
            scheduled_for = %schedule_time,
            message_id = ?telemetry.notification_message_id,
            "Notification scheduled"
        );
        Ok(telemetry)
    }

    /// Cancel a scheduled notification by the id returned from `schedule`
    pub async fn cancel_scheduled(&self, notification_id: &str) -> Result<()> {
        validate_identifier("notification_id", notification_id)?;

        let url = self.resource_url(
            &["schedulednotifications", notification_id],
            &Self::api_query(false),
        );
        let request = self.prepare(Method::DELETE, url, HeaderMap::new(), None)?;
        self.dispatch(request).await?;

        info!(notification_id, "Scheduled notification cancelled");
        Ok(())
    }

    fn validate_registration(registration: &Registration) -> Result<()> {
        if registration.body.is_empty() {
            let err = ValidationError::new("registration", "must not be empty", "0 bytes");
            return Err(err.into());
        }
        if let Some(id) = registration.registration_id.as_deref() {
            validate_identifier("registration_id", id)?;
        }
        Ok(())
    }

    /// Run one registration request; an empty `registration_id` targets the collection
    async fn exchange_registration(
        &self,
        method: Method,
        registration_id: &str,
        headers: HeaderMap,
        body: Option<Vec<u8>>,
    ) -> Result<RegistrationResponse> {
        let url = self.registration_url(registration_id);
        let request = self.prepare(method, url, headers, body)?;
        let response = self.dispatch(request).await?;

        let requested_id = Some(registration_id).filter(|id| !id.is_empty());
        Ok(RegistrationResponse::from_response(response, requested_id))
    }

    /// Create a registration, or replace it when `registration_id` is set
    ///
    /// New registrations are POSTed to the collection; updates are PUT to the
    /// registration's own URL and overwrite it unconditionally.
    pub async fn register(&self, registration: &Registration) -> Result<RegistrationResponse> {
        Self::validate_registration(registration)?;

        let (method, registration_id) = match registration.registration_id.as_deref() {
            Some(id) => (Method::PUT, id),
            None => (Method::POST, ""),
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static(REGISTRATION_CONTENT_TYPE),
        );

        let body = Some(registration.body.clone());
        let response = self
            .exchange_registration(method, registration_id, headers, body)
            .await?;

        info!(
            registration_id = ?response.registration_id,
            etag = ?response.etag,
            updated = registration.registration_id.is_some(),
            "Registration saved"
        );
        Ok(response)
    }

    /// Fetch one registration description
    pub async fn registration(&self, registration_id: &str) -> Result<RegistrationResponse> {
        validate_identifier("registration_id", registration_id)?;

        let response = self
            .exchange_registration(Method::GET, registration_id, HeaderMap::new(), None)
            .await?;

        debug!(registration_id, etag = ?response.etag, "Registration fetched");
        Ok(response)
    }

    /// Fetch the hub's registration feed
    pub async fn registrations(&self) -> Result<RegistrationResponse> {
        let response = self
            .exchange_registration(Method::GET, "", HeaderMap::new(), None)
            .await?;

        debug!(bytes = response.body.len(), "Registration feed fetched");
        Ok(response)
    }

    /// Remove a device registration regardless of its current ETag
    pub async fn delete_registration(&self, registration_id: &str) -> Result<()> {
        validate_identifier("registration_id", registration_id)?;

        let mut headers = HeaderMap::new();
        headers.insert(IF_MATCH_HEADER, HeaderValue::from_static("*"));

        let url = self.registration_url(registration_id);
        let request = self.prepare(Method::DELETE, url, headers, None)?;
        self.dispatch(request).await?;

        info!(registration_id, "Registration deleted");
        Ok(())
    }
}
