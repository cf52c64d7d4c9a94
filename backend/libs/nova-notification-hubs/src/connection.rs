use secrecy::SecretString;
use url::Url;

use crate::errors::{ErrorCode, HubError, NotificationHubError, Result};

const ENDPOINT_KEY: &str = "Endpoint";
const KEY_NAME_KEY: &str = "SharedAccessKeyName";
const KEY_VALUE_KEY: &str = "SharedAccessKey";

/// The service only accepts TLS endpoints, whatever the connection string says.
pub const SCHEME: &str = "https";

/// Endpoint and shared access key parsed from a connection string
///
/// Format: `Endpoint=sb://{namespace}.servicebus.windows.net/;SharedAccessKeyName={name};SharedAccessKey={key}`
#[derive(Debug)]
pub struct ConnectionDescriptor {
    endpoint_host: String,
    key_name: String,
    key_value: SecretString,
}

#[derive(Default)]
struct Segments<'a> {
    endpoint: Option<&'a str>,
    key_name: Option<&'a str>,
    key_value: Option<&'a str>,
}

fn split_segments(connection_string: &str) -> Segments<'_> {
    let mut segments = Segments::default();

    for part in connection_string.split(';') {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            k if k.eq_ignore_ascii_case(ENDPOINT_KEY) => segments.endpoint = Some(value),
            k if k.eq_ignore_ascii_case(KEY_NAME_KEY) => segments.key_name = Some(value),
            k if k.eq_ignore_ascii_case(KEY_VALUE_KEY) => segments.key_value = Some(value),
            _ => {}
        }
    }

    segments
}

/// Host (and port, when given) of the endpoint URI
fn endpoint_authority(endpoint: &str) -> Option<String> {
    let url = Url::parse(endpoint).ok()?;
    let host = url.host_str().filter(|h| !h.is_empty())?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

fn invalid(details: impl Into<String>) -> HubError {
    NotificationHubError::new(
        ErrorCode::InvalidConnectionString,
        "Invalid connection string",
    )
    .with_details(details)
    .into()
}

impl ConnectionDescriptor {
    /// Parse a connection string, rejecting anything without all three segments
    pub fn parse(connection_string: &str) -> Result<Self> {
        let segments = split_segments(connection_string);

        let endpoint = segments
            .endpoint
            .filter(|v| !v.is_empty())
            .ok_or_else(|| invalid(format!("missing {}", ENDPOINT_KEY)))?;
        let key_name = segments
            .key_name
            .filter(|v| !v.is_empty())
            .ok_or_else(|| invalid(format!("missing {}", KEY_NAME_KEY)))?;
        let key_value = segments
            .key_value
            .filter(|v| !v.is_empty())
            .ok_or_else(|| invalid(format!("missing {}", KEY_VALUE_KEY)))?;

        let endpoint_host = endpoint_authority(endpoint)
            .ok_or_else(|| invalid(format!("{} is not a valid URI", ENDPOINT_KEY)))?;

        Ok(Self {
            endpoint_host,
            key_name: key_name.to_string(),
            key_value: SecretString::from(key_value.to_string()),
        })
    }

    pub fn endpoint_host(&self) -> &str {
        &self.endpoint_host
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    pub fn scheme(&self) -> &'static str {
        SCHEME
    }

    pub(crate) fn key_value(&self) -> &SecretString {
        &self.key_value
    }

    /// `https://{host}/`
    pub fn endpoint_url(&self) -> Result<Url> {
        Url::parse(&format!("{}://{}/", SCHEME, self.endpoint_host))
            .map_err(|e| invalid(format!("{} is not a valid URI: {}", ENDPOINT_KEY, e)))
    }

    /// Descriptor with a host but no key, for exercising the signing guard
    #[cfg(test)]
    pub(crate) fn without_key(endpoint_host: &str) -> Self {
        Self {
            endpoint_host: endpoint_host.to_string(),
            key_name: String::new(),
            key_value: SecretString::from(String::new()),
        }
    }
}
