//! Two-phase session establishment: a challenge nonce, then a signed
//! answer that yields the first access token.

use super::{AuthServer, token::Grant};
use crate::{
    error::{Error, Result},
    interfaces::Challenge,
    messages::{
        ChallengeNonce, CreateSessionRequest, IssuedToken, RequestSessionRequest,
        RequestSessionResponse, SessionResponse,
    },
};
use serde::Serialize;
use tracing::{debug, info, instrument};

impl AuthServer {
    /// Issue a challenge nonce for an active identity. The request needs
    /// no signature.
    ///
    /// # Errors
    /// [`Error::IdentityNotFound`] or [`Error::IdentityDeleted`].
    #[instrument(skip_all)]
    pub async fn request_session(&self, message: &str) -> Result<String> {
        let request = Self::parse::<RequestSessionRequest>(message)?;
        let identity = &request.request().authentication.identity;
        self.active_identity(identity).await?;

        let nonce = self.crypto.noncer.generate_128()?;
        let now = self.now();
        let expiry = now + self.config.challenge_lifetime();
        self.with_deadline(
            "authentication nonce store",
            self.stores.challenge_nonces.insert(
                &nonce,
                Challenge {
                    identity: identity.clone(),
                    expiry,
                },
                now,
            ),
        )
        .await?;

        debug!(identity = %identity, "Session challenge issued");
        self.respond(
            request.nonce(),
            RequestSessionResponse {
                authentication: ChallengeNonce { nonce },
            },
        )
        .await
    }

    /// Answer a challenge: consume the nonce, check the device signature,
    /// and mint the first access token with `attributes`.
    ///
    /// # Errors
    /// [`Error::NonceNotFound`], [`Error::NonceUsed`], [`Error::NonceExpired`],
    /// [`Error::MismatchedIdentities`], inactive identity or device, or a
    /// bad device signature.
    #[instrument(skip_all)]
    pub async fn create_session<A: Serialize>(&self, message: &str, attributes: A) -> Result<String> {
        let request = Self::parse::<CreateSessionRequest>(message)?;
        let auth = &request.request().authentication;
        let access = &request.request().access;
        let now = self.now();

        // Consuming first makes every challenge single-use, even when the
        // answer turns out to be bad.
        let challenge = self
            .with_deadline(
                "authentication nonce store",
                self.stores.challenge_nonces.consume(&auth.nonce, now),
            )
            .await?;

        if now > challenge.expiry {
            return Err(Error::NonceExpired {
                expiry: self.stamp(challenge.expiry),
                now: self.stamp(now),
            });
        }
        if challenge.identity != auth.identity {
            return Err(Error::MismatchedIdentities {
                expected: challenge.identity,
                actual: auth.identity.clone(),
            });
        }

        let public_key = self.public_key(&auth.identity, &auth.device).await?;
        request.verify(self.crypto.verifier.as_ref(), &public_key, "session creation")?;

        let refresh_expiry = now + self.config.refresh_lifetime();
        let token = self
            .mint(
                &Grant {
                    identity: &auth.identity,
                    device: &auth.device,
                    public_key: &access.public_key,
                    rotation_hash: &access.rotation_hash,
                },
                now,
                refresh_expiry,
                &attributes,
            )
            .await?;

        info!(identity = %auth.identity, device = %auth.device, "Session created");
        self.respond(
            request.nonce(),
            SessionResponse {
                access: IssuedToken { token },
            },
        )
        .await
    }
}
