use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::Request;
use std::sync::Arc;

use crate::connection::ConnectionDescriptor;
use crate::errors::{HubError, Result};
use crate::signer::TokenSigner;

/// Attaches a freshly signed SAS token to every outbound request
///
/// Tokens are never cached: two requests issued back to back each get their
/// own signature, valid from the instant they are authenticated.
#[derive(Clone)]
pub struct RequestAuthenticator {
    descriptor: Arc<ConnectionDescriptor>,
    signer: TokenSigner,
}

impl RequestAuthenticator {
    pub fn new(descriptor: Arc<ConnectionDescriptor>, signer: TokenSigner) -> Self {
        Self { descriptor, signer }
    }

    /// Same key, different signer (e.g. another clock or validity window)
    pub fn with_signer(&self, signer: TokenSigner) -> Self {
        Self {
            descriptor: Arc::clone(&self.descriptor),
            signer,
        }
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// Set `Authorization` to a token scoped to the request's target URI.
    /// Only the header map is touched.
    pub fn authenticate(&self, mut request: Request) -> Result<Request> {
        let token = self.signer.sign(request.url().as_str(), &self.descriptor)?;

        let mut value = HeaderValue::from_str(token.value())
            .map_err(|e| HubError::Configuration(format!("Invalid authorization header: {}", e)))?;
        value.set_sensitive(true);

        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(request)
    }
}
