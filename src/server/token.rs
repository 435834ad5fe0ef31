//! Access token minting and refresh.

use super::AuthServer;
use crate::{
    chain::CommitmentChain,
    error::{Error, Result},
    messages::{AccessToken, DecodedToken, IssuedToken, RefreshSessionRequest, SessionResponse},
};
use serde::{Serialize, de::DeserializeOwned};
use time::OffsetDateTime;
use tracing::{debug, instrument};

/// Who a token is for and which access key it binds.
pub(super) struct Grant<'a> {
    pub identity: &'a str,
    pub device: &'a str,
    pub public_key: &'a str,
    pub rotation_hash: &'a str,
}

impl AuthServer {
    /// Sign a token issued at `now`. Its expiry never passes `refresh_expiry`.
    pub(super) async fn mint<A: Serialize>(
        &self,
        grant: &Grant<'_>,
        now: OffsetDateTime,
        refresh_expiry: OffsetDateTime,
        attributes: &A,
    ) -> Result<String> {
        let expiry = (now + self.config.access_lifetime()).min(refresh_expiry);
        let claims = AccessToken {
            server_identity: self.access_identity(),
            device: grant.device.to_string(),
            identity: grant.identity.to_string(),
            public_key: grant.public_key.to_string(),
            rotation_hash: grant.rotation_hash.to_string(),
            issued_at: self.stamp(now),
            expiry: self.stamp(expiry),
            refresh_expiry: self.stamp(refresh_expiry),
            attributes,
        };

        self.with_deadline(
            "access key",
            claims.sign(
                self.crypto.access_key.as_ref(),
                self.encoding.token_encoder.as_ref(),
            ),
        )
        .await
    }

    /// Exchange a token for its successor by revealing the next access key.
    /// Attributes and the refresh ceiling carry over unchanged.
    ///
    /// # Errors
    /// Bad request or token signatures, [`Error::RefreshExpired`],
    /// [`Error::HashMismatch`] for a wrong reveal, [`Error::Replay`] when the
    /// generation was already refreshed, or a revoked device.
    #[instrument(skip_all)]
    pub async fn refresh_session<A>(&self, message: &str) -> Result<String>
    where
        A: Serialize + DeserializeOwned,
    {
        let request = Self::parse::<RefreshSessionRequest>(message)?;
        let access = &request.request().access;
        request.verify(
            self.crypto.verifier.as_ref(),
            &access.public_key,
            "session refresh",
        )?;

        let decoded = DecodedToken::<A>::decode(&access.token, self.encoding.token_encoder.as_ref())?;
        decoded.verify_signature(self.crypto.verifier.as_ref(), &self.access_public_key())?;
        let claims = decoded.into_claims();
        if claims.server_identity != self.access_identity() {
            return Err(Error::UnknownVerificationKey {
                identity: claims.server_identity,
            });
        }

        let now = self.now();
        let timestamper = self.encoding.timestamper.as_ref();
        claims.ensure_not_future(timestamper, now, self.config.access_window())?;
        let refresh_expiry = claims.ensure_refreshable(timestamper, now)?;
        self.ensure_active(&claims.identity, &claims.device).await?;

        CommitmentChain::access(
            self.crypto.hasher.as_ref(),
            self.stores.access_key_hashes.as_ref(),
            self.config.store_timeout(),
        )
        .advance(&claims.rotation_hash, &access.public_key, now, refresh_expiry)
        .await?;

        let token = self
            .mint(
                &Grant {
                    identity: &claims.identity,
                    device: &claims.device,
                    public_key: &access.public_key,
                    rotation_hash: &access.rotation_hash,
                },
                now,
                refresh_expiry,
                &claims.attributes,
            )
            .await?;

        debug!(identity = %claims.identity, device = %claims.device, "Session refreshed");
        self.respond(
            request.nonce(),
            SessionResponse {
                access: IssuedToken { token },
            },
        )
        .await
    }
}
