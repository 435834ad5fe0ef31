//! Access tokens and the requests that present them.
//!
//! A token is `<signature><encoded claims>`: the issuer signs the encoded
//! claims text, and the signature's leading code tells a reader where the
//! body starts.

use super::SignedMessage;
use crate::{
    error::{Error, Result},
    interfaces::{SigningKey, Timestamper, TokenEncoder, Verifier},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken<A> {
    pub server_identity: String,
    pub device: String,
    pub identity: String,
    /// Current access key.
    pub public_key: String,
    /// Commitment to the next access key.
    pub rotation_hash: String,
    pub issued_at: String,
    pub expiry: String,
    pub refresh_expiry: String,
    pub attributes: A,
}

impl<A: Serialize> AccessToken<A> {
    /// Serialize, encode, and sign the claims.
    ///
    /// # Errors
    /// Encoding or signing failures.
    pub async fn sign(&self, key: &dyn SigningKey, encoder: &dyn TokenEncoder) -> Result<String> {
        let claims = serde_json::to_string(self)?;
        let body = encoder.encode(&claims)?;
        let signature = key.sign(body.as_bytes()).await?;
        Ok(format!("{signature}{body}"))
    }
}

impl<A> AccessToken<A> {
    /// # Errors
    /// [`Error::FutureToken`] when issued more than `tolerance` after `now`.
    pub fn ensure_not_future(
        &self,
        timestamper: &dyn Timestamper,
        now: OffsetDateTime,
        tolerance: Duration,
    ) -> Result<()> {
        let issued_at = timestamper.parse(&self.issued_at)?;
        if issued_at > now + tolerance {
            return Err(Error::FutureToken {
                issued_at: self.issued_at.clone(),
                now: timestamper.format(now),
            });
        }
        Ok(())
    }

    /// # Errors
    /// [`Error::ExpiredToken`] once `expiry` is reached.
    pub fn ensure_unexpired(&self, timestamper: &dyn Timestamper, now: OffsetDateTime) -> Result<()> {
        let expiry = timestamper.parse(&self.expiry)?;
        if now >= expiry {
            return Err(Error::ExpiredToken {
                expiry: self.expiry.clone(),
                now: timestamper.format(now),
            });
        }
        Ok(())
    }

    /// Returns the refresh ceiling while it is still ahead of `now`.
    ///
    /// # Errors
    /// [`Error::RefreshExpired`] once the ceiling is reached.
    pub fn ensure_refreshable(
        &self,
        timestamper: &dyn Timestamper,
        now: OffsetDateTime,
    ) -> Result<OffsetDateTime> {
        let refresh_expiry = timestamper.parse(&self.refresh_expiry)?;
        if now >= refresh_expiry {
            return Err(Error::RefreshExpired {
                refresh_expiry: self.refresh_expiry.clone(),
                now: timestamper.format(now),
            });
        }
        Ok(refresh_expiry)
    }
}

/// A token split into its signature and claims.
#[derive(Clone, Debug)]
pub struct DecodedToken<A> {
    pub claims: AccessToken<A>,
    signature: String,
    body: String,
}

impl<A: DeserializeOwned> DecodedToken<A> {
    /// # Errors
    /// [`Error::InvalidToken`] for truncated or undecodable tokens.
    pub fn decode(token: &str, encoder: &dyn TokenEncoder) -> Result<Self> {
        let length = encoder.signature_length(token)?;
        if token.len() <= length || !token.is_char_boundary(length) {
            return Err(Error::InvalidToken {
                reason: "token shorter than its signature".to_string(),
            });
        }

        let (signature, body) = token.split_at(length);
        let claims = encoder.decode(body)?;
        let claims = serde_json::from_str(&claims).map_err(|err| Error::InvalidToken {
            reason: err.to_string(),
        })?;

        Ok(Self {
            claims,
            signature: signature.to_string(),
            body: body.to_string(),
        })
    }
}

impl<A> DecodedToken<A> {
    /// # Errors
    /// [`Error::SignatureVerificationFailed`] unless `public_key` signed the token.
    pub fn verify_signature(&self, verifier: &dyn Verifier, public_key: &str) -> Result<()> {
        verifier
            .verify(self.body.as_bytes(), &self.signature, public_key)
            .map_err(|err| match err {
                Error::SignatureVerificationFailed { .. } => Error::signature("access token"),
                other => other,
            })
    }

    #[must_use]
    pub fn into_claims(self) -> AccessToken<A> {
        self.claims
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessContext {
    pub nonce: String,
    pub timestamp: String,
    pub token: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPayload<T> {
    pub access: AccessContext,
    pub request: T,
}

/// Request to a resource server, signed by the session's current access key.
pub type AccessRequest<T> = SignedMessage<AccessPayload<T>>;
