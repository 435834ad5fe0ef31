//! The authentication engine.
//!
//! [`AuthServer`] takes serialized request envelopes and returns serialized,
//! signed responses. It holds no state of its own: the registry, the
//! challenge store, and the access-key reservation store carry everything,
//! so any number of engine instances can share them.

mod authentication;
pub mod config;
mod linking;
mod recovery;
mod registry;
mod token;


pub use config::AuthConfig;
pub use registry::Registration;

use crate::{
    encoding::Derivation,
    error::{Error, Result},
    interfaces::{
        AuthenticationNonceStore, Hasher, Noncer, RegistryStore, SigningKey, TimeLockStore,
        Timestamper, TokenEncoder, Verifier, within,
    },
    messages::{ClientRequest, ServerAccess, ServerPayload, ServerResponse, SignedMessage},
};
use serde::{Serialize, de::DeserializeOwned};
use std::{future::Future, sync::Arc};
use time::OffsetDateTime;

/// Crypto collaborators. `access_key` signs access tokens and
/// `response_key` signs responses; they may be the same key.
#[derive(Clone)]
pub struct AuthCrypto {
    pub hasher: Arc<dyn Hasher>,
    pub noncer: Arc<dyn Noncer>,
    pub verifier: Arc<dyn Verifier>,
    pub access_key: Arc<dyn SigningKey>,
    pub response_key: Arc<dyn SigningKey>,
}

#[derive(Clone)]
pub struct AuthEncoding {
    pub timestamper: Arc<dyn Timestamper>,
    pub token_encoder: Arc<dyn TokenEncoder>,
}

#[derive(Clone)]
pub struct AuthStores {
    pub registry: Arc<dyn RegistryStore>,
    pub challenge_nonces: Arc<dyn AuthenticationNonceStore>,
    pub access_key_hashes: Arc<dyn TimeLockStore>,
}

pub struct AuthServer {
    config: AuthConfig,
    crypto: AuthCrypto,
    encoding: AuthEncoding,
    stores: AuthStores,
}

impl AuthServer {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        crypto: AuthCrypto,
        encoding: AuthEncoding,
        stores: AuthStores,
    ) -> Self {
        Self {
            config,
            crypto,
            encoding,
            stores,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Identity verifiers use to look up the token-signing key.
    #[must_use]
    pub fn access_identity(&self) -> String {
        self.crypto.access_key.identity()
    }

    #[must_use]
    pub fn access_public_key(&self) -> String {
        self.crypto.access_key.public()
    }

    #[must_use]
    pub fn response_public_key(&self) -> String {
        self.crypto.response_key.public()
    }

    fn now(&self) -> OffsetDateTime {
        self.encoding.timestamper.now()
    }

    fn stamp(&self, when: OffsetDateTime) -> String {
        self.encoding.timestamper.format(when)
    }

    fn derivation(&self) -> Derivation<'_> {
        Derivation::new(
            self.crypto.hasher.as_ref(),
            self.config.derivation_context(),
        )
    }

    async fn with_deadline<T>(
        &self,
        collaborator: &str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        within(self.config.store_timeout(), collaborator, call).await
    }

    fn parse<T: DeserializeOwned>(message: &str) -> Result<ClientRequest<T>> {
        SignedMessage::parse(message)
    }

    /// Wrap `response` in a signed envelope echoing the request nonce.
    async fn respond<T: Serialize>(&self, nonce: &str, response: T) -> Result<String> {
        let mut envelope = ServerResponse::new(ServerPayload {
            access: ServerAccess {
                nonce: nonce.to_string(),
                server_identity: self.crypto.response_key.identity(),
            },
            response,
        })?;
        self.with_deadline(
            "response key",
            envelope.sign(self.crypto.response_key.as_ref()),
        )
        .await?;
        envelope.to_json()
    }
}

/// A required field that may be absent on the wire.
fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
    value
        .filter(|value| !value.is_empty())
        .ok_or_else(|| Error::missing(field))
}
