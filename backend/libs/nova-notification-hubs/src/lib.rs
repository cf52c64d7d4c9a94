//! Nova Notification Hubs client
//!
//! Client for Azure Notification Hubs used by the Nova platform to reach iOS,
//! Android and Windows devices through a single relay.
//!
//! It handles:
//! - Connection string parsing (`Endpoint`, `SharedAccessKeyName`, `SharedAccessKey`)
//! - Shared access signature (SAS) tokens, signed fresh for every request
//! - Classification of failed responses into retryable / authentication / fatal errors
//! - Aggregation of per-device failures in batch sends
//! - Pre-flight validation of device handles, tag expressions and payload sizes
//! - Registration create, replace, read and delete
//!
//! Platform payloads are built by the caller and handed over as opaque bytes
//! together with a [`NotificationFormat`].
//!
//! # Example
//!
//! ```no_run
//! use nova_notification_hubs::{HubConfig, Notification, NotificationFormat, NotificationHub};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HubConfig::from_env()?;
//!     let hub = NotificationHub::from_config(&config)?;
//!
//!     let notification = Notification::new(
//!         NotificationFormat::Apple,
//!         r#"{"aps":{"alert":"Hello from Nova"}}"#,
//!     )?;
//!
//!     match hub.send(&notification, Some("premium_users && ios_users")).await {
//!         Ok(telemetry) => println!("sent: {:?}", telemetry.notification_message_id),
//!         Err(e) if e.is_retryable() => eprintln!("try again later: {}", e),
//!         Err(e) => return Err(e.into()),
//!     }
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod classifier;
pub mod client;
pub mod clock;
pub mod config;
pub mod connection;
pub mod errors;
pub mod models;
pub mod multi_error;
pub mod signer;
pub mod transport;
pub mod validation;

pub use auth::RequestAuthenticator;
pub use classifier::{classify, classify_response};
pub use client::NotificationHub;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::HubConfig;
pub use connection::ConnectionDescriptor;
pub use errors::{
    AggregateError, ErrorCode, HubError, NotificationHubError, Result, ValidationError,
};
pub use models::{
    BatchSendResult, DirectSendResult, Notification, NotificationFormat, NotificationTelemetry,
    Registration, RegistrationResponse, REGISTRATION_CONTENT_TYPE,
};
pub use multi_error::MultiError;
pub use signer::{SignedToken, TokenSigner};
pub use transport::{HttpTransport, RawResponse, ReqwestTransport};
