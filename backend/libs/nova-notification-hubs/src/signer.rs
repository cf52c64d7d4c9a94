// Shared access signature (SAS) token signing - HMAC-SHA256 over the scoped resource URI

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::connection::ConnectionDescriptor;
use crate::errors::{HubError, Result};

type HmacSha256 = Hmac<Sha256>;

pub const TOKEN_PREFIX: &str = "SharedAccessSignature";

/// Default validity window of a freshly signed token
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

/// Signed credential for a single outbound request
#[derive(Clone, PartialEq, Eq)]
pub struct SignedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl SignedToken {
    /// Header value, `SharedAccessSignature sr=..&sig=..&se=..&skn=..`
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

impl fmt::Debug for SignedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedToken")
            .field("value", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Computes time-boxed SAS tokens
///
/// Stateless apart from the injected clock, so one signer can serve any
/// number of concurrent requests.
#[derive(Clone)]
pub struct TokenSigner {
    clock: Arc<dyn Clock>,
    validity: Duration,
}

impl TokenSigner {
    pub fn new(validity: Duration) -> Self {
        Self::with_clock(validity, Arc::new(SystemClock))
    }

    pub fn with_clock(validity: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { clock, validity }
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Sign `resource_uri` with the descriptor's key, valid from now
    pub fn sign(
        &self,
        resource_uri: &str,
        descriptor: &ConnectionDescriptor,
    ) -> Result<SignedToken> {
        self.sign_at(resource_uri, descriptor, self.clock.now())
    }

    /// Sign as of `now`; the same inputs always produce the same token
    pub fn sign_at(
        &self,
        resource_uri: &str,
        descriptor: &ConnectionDescriptor,
        now: DateTime<Utc>,
    ) -> Result<SignedToken> {
        let key = descriptor.key_value().expose_secret();
        if key.is_empty() || descriptor.key_name().is_empty() {
            return Err(HubError::Configuration("shared access key is not configured".to_string()));
        }

        let encoded_uri = canonical_resource(resource_uri);
        let expires_at = now + self.validity;
        let expiry = expires_at.timestamp();

        let string_to_sign = format!("{}\n{}", encoded_uri, expiry);
        let signature = compute_signature(key.as_bytes(), &string_to_sign)?;

        let value = format!(
            "{} sr={}&sig={}&se={}&skn={}",
            TOKEN_PREFIX,
            encoded_uri,
            urlencoding::encode(&signature),
            expiry,
            urlencoding::encode(descriptor.key_name()),
        );

        debug!(
            resource = %resource_uri,
            key_name = %descriptor.key_name(),
            expires_at = %expires_at,
            "Signed shared access token"
        );

        Ok(SignedToken { value, expires_at })
    }
}

/// Lower-cased, percent-encoded form the signature is computed over
pub fn canonical_resource(resource_uri: &str) -> String {
    urlencoding::encode(&resource_uri.to_lowercase()).into_owned()
}

fn compute_signature(key: &[u8], payload: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| HubError::Configuration(format!("HMAC error: {}", e)))?;

    mac.update(payload.as_bytes());
    let digest = mac.finalize().into_bytes();

    Ok(STANDARD.encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;

    const CONNECTION_STRING: &str = "Endpoint=sb://testhub-ns.servicebus.windows.net/;SharedAccessKeyName=testAccessKeyName;SharedAccessKey=testAccessKey";
    const RESOURCE: &str =
        "https://testhub-ns.servicebus.windows.net/testhub/messages?api-version=2016-07";

    fn descriptor() -> ConnectionDescriptor {
        ConnectionDescriptor::parse(CONNECTION_STRING).unwrap()
    }

    fn signer_at(secs: i64) -> TokenSigner {
        TokenSigner::with_clock(
            Duration::seconds(DEFAULT_TOKEN_TTL_SECS),
            Arc::new(FixedClock::from_unix(secs).unwrap()),
        )
    }

    fn field<'a>(token: &'a SignedToken, name: &str) -> &'a str {
        token
            .value()
            .trim_start_matches("SharedAccessSignature ")
            .split('&')
            .find_map(|pair| pair.strip_prefix(&format!("{}=", name)))
            .unwrap()
    }

    #[test]
    fn test_known_good_token() {
        let token = signer_at(1_700_000_000)
            .sign(RESOURCE, &descriptor())
            .unwrap();

        assert_eq!(
            token.value(),
            "SharedAccessSignature sr=https%3A%2F%2Ftesthub-ns.servicebus.windows.net%2Ftesthub%2Fmessages%3Fapi-version%3D2016-07\
             &sig=5%2BPb7PAu%2Fg0VR6dotFhVPL88%2FOJYVtSc40quZZgxUjg%3D&se=1700003600&skn=testAccessKeyName"
        );
        assert_eq!(token.expires_at().timestamp(), 1_700_003_600);
    }

    #[test]
    fn test_same_instant_same_token() {
        let signer = signer_at(1_700_000_000);
        let descriptor = descriptor();

        let first = signer.sign(RESOURCE, &descriptor).unwrap();
        let second = signer.sign(RESOURCE, &descriptor).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_different_instant_changes_only_expiry_and_signature() {
        let descriptor = descriptor();
        let earlier = signer_at(1_700_000_000)
            .sign(RESOURCE, &descriptor)
            .unwrap();
        let later = signer_at(1_700_000_060)
            .sign(RESOURCE, &descriptor)
            .unwrap();

        assert_eq!(field(&earlier, "sr"), field(&later, "sr"));
        assert_eq!(field(&earlier, "skn"), field(&later, "skn"));
        assert_ne!(field(&earlier, "se"), field(&later, "se"));
        assert_ne!(field(&earlier, "sig"), field(&later, "sig"));
        assert_eq!(
            later.expires_at() - earlier.expires_at(),
            Duration::seconds(60)
        );
    }

    #[test]
    fn test_resource_is_lowercased_before_signing() {
        let descriptor = descriptor();
        let signer = signer_at(1_700_000_000);

        let lower = signer.sign(RESOURCE, &descriptor).unwrap();
        let upper = signer.sign(&RESOURCE.to_uppercase(), &descriptor).unwrap();

        assert_eq!(lower, upper);
    }

    #[test]
    fn test_different_keys_produce_different_signatures() {
        let signer = signer_at(1_700_000_000);
        let other = ConnectionDescriptor::parse(
            "Endpoint=sb://testhub-ns.servicebus.windows.net/;SharedAccessKeyName=testAccessKeyName;SharedAccessKey=otherKey",
        )
        .unwrap();

        let a = signer.sign(RESOURCE, &descriptor()).unwrap();
        let b = signer.sign(RESOURCE, &other).unwrap();

        assert_ne!(field(&a, "sig"), field(&b, "sig"));
    }

    #[test]
    fn test_empty_key_is_configuration_error() {
        let keyless = ConnectionDescriptor::without_key("testhub-ns.servicebus.windows.net");
        let err = signer_at(1_700_000_000)
            .sign(RESOURCE, &keyless)
            .unwrap_err();

        assert!(matches!(err, HubError::Configuration(_)));
    }

    #[test]
    fn test_debug_hides_token_value() {
        let token = signer_at(1_700_000_000)
            .sign(RESOURCE, &descriptor())
            .unwrap();
        let debug = format!("{:?}", token);

        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("sig="));
    }
}
