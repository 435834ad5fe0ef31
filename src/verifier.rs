//! Resource-side access verification.
//!
//! A resource server needs no registry: the token carries the session's
//! access key, the issuer's signature over the token is checked against a
//! trusted key fetched out of band, and request replay is bounded by the
//! freshness window plus a short-lived nonce reservation.

use crate::{
    error::{Error, Result},
    interfaces::{TimeLockStore, Timestamper, TokenEncoder, VerificationKeyStore, Verifier, within},
    messages::{AccessRequest, AccessToken, DecodedToken, SignedMessage},
};
use serde::de::DeserializeOwned;
use std::{sync::Arc, time::Duration};
use tracing::{debug, instrument};

const DEFAULT_ACCESS_WINDOW_SECONDS: u64 = 30;
const DEFAULT_STORE_TIMEOUT_MILLIS: u64 = 5_000;

/// What a verified access request yields. Authorization decisions are the
/// resource's own.
#[derive(Clone, Debug)]
pub struct VerifiedAccess<T, A> {
    pub request: T,
    pub token: AccessToken<A>,
    pub nonce: String,
}

pub struct AccessVerifier {
    verifier: Arc<dyn Verifier>,
    timestamper: Arc<dyn Timestamper>,
    token_encoder: Arc<dyn TokenEncoder>,
    access_nonces: Arc<dyn TimeLockStore>,
    access_keys: Arc<dyn VerificationKeyStore>,
    window: Duration,
    store_timeout: Duration,
}

impl AccessVerifier {
    #[must_use]
    pub fn new(
        verifier: Arc<dyn Verifier>,
        timestamper: Arc<dyn Timestamper>,
        token_encoder: Arc<dyn TokenEncoder>,
        access_nonces: Arc<dyn TimeLockStore>,
        access_keys: Arc<dyn VerificationKeyStore>,
    ) -> Self {
        Self {
            verifier,
            timestamper,
            token_encoder,
            access_nonces,
            access_keys,
            window: Duration::from_secs(DEFAULT_ACCESS_WINDOW_SECONDS),
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MILLIS),
        }
    }

    /// Accepted clock skew for request timestamps and token issue times.
    /// Request nonces are held for the same span.
    #[must_use]
    pub const fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    #[must_use]
    pub const fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Verify a serialized access request.
    ///
    /// # Errors
    /// [`Error::UnknownVerificationKey`] for untrusted issuers, signature
    /// failures on the token or the request, [`Error::ExpiredToken`],
    /// [`Error::FutureToken`], [`Error::StaleRequest`],
    /// [`Error::FutureRequest`], or [`Error::Replay`] for a reused nonce.
    #[instrument(skip_all)]
    pub async fn verify<T, A>(&self, message: &str) -> Result<VerifiedAccess<T, A>>
    where
        T: DeserializeOwned,
        A: DeserializeOwned,
    {
        let request: AccessRequest<T> = SignedMessage::parse(message)?;
        let access = &request.payload().access;

        let decoded = DecodedToken::<A>::decode(&access.token, self.token_encoder.as_ref())?;
        let issuer_key = within(
            self.store_timeout,
            "verification key store",
            self.access_keys.get(&decoded.claims.server_identity),
        )
        .await?;
        decoded.verify_signature(self.verifier.as_ref(), &issuer_key)?;
        let token = decoded.into_claims();

        let now = self.timestamper.now();
        token.ensure_not_future(self.timestamper.as_ref(), now, self.window)?;
        token.ensure_unexpired(self.timestamper.as_ref(), now)?;

        request.verify(self.verifier.as_ref(), &token.public_key, "access request")?;

        let timestamp = self.timestamper.parse(&access.timestamp)?;
        if timestamp + self.window < now {
            return Err(Error::StaleRequest {
                timestamp: access.timestamp.clone(),
                now: self.timestamper.format(now),
            });
        }
        if timestamp > now + self.window {
            return Err(Error::FutureRequest {
                timestamp: access.timestamp.clone(),
                now: self.timestamper.format(now),
            });
        }

        // Held for as long as the timestamp itself stays fresh.
        within(
            self.store_timeout,
            "access nonce store",
            self.access_nonces
                .reserve(&access.nonce, now, timestamp.max(now) + self.window),
        )
        .await?;

        debug!(identity = %token.identity, device = %token.device, "Access verified");
        let nonce = access.nonce.clone();
        Ok(VerifiedAccess {
            request: request.into_payload().request,
            token,
            nonce,
        })
    }
}
