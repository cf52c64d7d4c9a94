//! Recording transport for integration tests
//!
//! Captures every request the client hands to the transport and answers with
//! whatever the scripted responder returns, so tests never touch the network.

#![allow(dead_code)]

use async_trait::async_trait;
use nova_notification_hubs::{
    FixedClock, HttpTransport, HubConfig, HubError, NotificationHub, RawResponse, Result,
};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, LOCATION};
use reqwest::{Method, Request, StatusCode};
use std::sync::Arc;
use std::time::Duration;

pub const CONNECTION_STRING: &str = "Endpoint=sb://testhub-ns.servicebus.windows.net/;SharedAccessKeyName=testAccessKeyName;SharedAccessKey=testAccessKey";
pub const HUB_PATH: &str = "testhub";

/// Instant used by tests that pin the clock (2023-11-14T22:13:20Z)
pub const FIXED_NOW: i64 = 1_700_000_000;

/// What the transport saw for one request
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Device handle of a direct send, if any
    pub fn device_handle(&self) -> Option<&str> {
        self.header("servicebusnotification-devicehandle")
    }
}

/// Scripted answer for one request
pub enum Reply {
    Respond(RawResponse),
    /// Answer after a delay
    Delayed(Duration, RawResponse),
    /// Never answer
    Hang,
    Fail(HubError),
}

type Responder = dyn Fn(&RecordedRequest) -> Reply + Send + Sync;

pub struct RecordingTransport {
    requests: Mutex<Vec<RecordedRequest>>,
    responder: Box<Responder>,
}

impl RecordingTransport {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&RecordedRequest) -> Reply + Send + Sync + 'static,
    {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        })
    }

    /// Every request gets `201 Created` with a `Location` header
    pub fn accepting() -> Arc<Self> {
        Self::new(|_| Reply::Respond(created("3771420011461231522-1")))
    }

    pub fn responding(status: StatusCode, headers: HeaderMap, body: &'static str) -> Arc<Self> {
        Self::new(move |_| Reply::Respond(RawResponse::new(status, headers.clone(), body)))
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl HttpTransport for RecordingTransport {
    async fn execute(&self, request: Request) -> Result<RawResponse> {
        let recorded = RecordedRequest {
            method: request.method().clone(),
            url: request.url().to_string(),
            headers: request.headers().clone(),
            body: request
                .body()
                .and_then(|b| b.as_bytes())
                .map(|b| b.to_vec())
                .unwrap_or_default(),
        };
        let reply = (self.responder)(&recorded);
        self.requests.lock().push(recorded);

        match reply {
            Reply::Respond(response) => Ok(response),
            Reply::Delayed(delay, response) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            Reply::Hang => futures::future::pending().await,
            Reply::Fail(err) => Err(err),
        }
    }
}

/// `201 Created` whose `Location` ends in `message_id`
pub fn created(message_id: &str) -> RawResponse {
    let mut headers = HeaderMap::new();
    let location = format!(
        "https://testhub-ns.servicebus.windows.net/testhub/messages/{}?api-version=2016-07",
        message_id
    );
    if let Ok(value) = HeaderValue::from_str(&location) {
        headers.insert(LOCATION, value);
    }
    RawResponse::new(StatusCode::CREATED, headers, Vec::<u8>::new())
}

pub fn ok() -> RawResponse {
    RawResponse::new(StatusCode::OK, HeaderMap::new(), Vec::<u8>::new())
}

/// Route client logs to the test writer; `RUST_LOG` picks the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn hub_with(transport: Arc<RecordingTransport>) -> NotificationHub {
    init_tracing();
    NotificationHub::new(CONNECTION_STRING, HUB_PATH)
        .unwrap()
        .with_transport(transport)
}

pub fn hub_with_config(config: HubConfig, transport: Arc<RecordingTransport>) -> NotificationHub {
    init_tracing();
    NotificationHub::from_config(&config)
        .unwrap()
        .with_transport(transport)
}

pub fn fixed_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::from_unix(FIXED_NOW).unwrap())
}
