//! Wire messages.
//!
//! Every message is a JSON envelope `{"payload": …, "signature": …}`. The
//! signature covers the payload's exact JSON text: parsing keeps the raw
//! payload so verification never depends on re-serialization, and nested
//! envelopes (a device-link endorsement) keep theirs too.

pub mod access;
pub mod account;
pub mod device;
pub mod session;

pub use access::{AccessContext, AccessPayload, AccessRequest, AccessToken, DecodedToken};
pub use account::{
    CreateAccountAuthentication, CreateAccountRequest, CreateAccountResponse,
    DeleteAccountRequest, RecoverAccountAuthentication, RecoverAccountRequest,
};
pub use device::{
    ChangeRecoveryKeyAuthentication, ChangeRecoveryKeyRequest, DeviceAuthentication,
    LinkDeviceRequest, RotateDeviceRequest, UnlinkDeviceRequest, UnlinkTarget,
};
pub use session::{
    AccessKeys, ChallengeNonce, CreateSessionAuthentication, CreateSessionRequest, IssuedToken,
    RefreshAccess, RefreshSessionRequest, RequestSessionAuthentication, RequestSessionRequest,
    RequestSessionResponse, SessionResponse,
};

use crate::{
    error::{Error, Result},
    interfaces::{SigningKey, Verifier},
};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{DeserializeOwned, Error as _},
    ser::{Error as _, SerializeStruct},
};
use serde_json::value::RawValue;

/// Signed envelope around a payload.
#[derive(Clone, Debug)]
pub struct SignedMessage<P> {
    payload: P,
    canonical: String,
    signature: Option<String>,
}

impl<P: Serialize> SignedMessage<P> {
    /// # Errors
    /// Returns an error if the payload cannot be serialized.
    pub fn new(payload: P) -> Result<Self> {
        let canonical = serde_json::to_string(&payload)?;
        Ok(Self {
            payload,
            canonical,
            signature: None,
        })
    }
}

impl<P: DeserializeOwned> SignedMessage<P> {
    /// # Errors
    /// Returns [`Error::InvalidMessage`] for malformed JSON or payloads.
    pub fn parse(message: &str) -> Result<Self> {
        serde_json::from_str(message).map_err(Error::invalid_message)
    }
}

impl<P> SignedMessage<P> {
    #[must_use]
    pub const fn payload(&self) -> &P {
        &self.payload
    }

    #[must_use]
    pub fn into_payload(self) -> P {
        self.payload
    }

    /// Exact JSON text the signature covers.
    #[must_use]
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    #[must_use]
    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    /// # Errors
    /// Propagates signing failures.
    pub async fn sign(&mut self, key: &dyn SigningKey) -> Result<()> {
        self.signature = Some(key.sign(self.canonical.as_bytes()).await?);
        Ok(())
    }

    /// Verify the envelope signature against `public_key`; `subject` names
    /// the message in the failure.
    ///
    /// # Errors
    /// [`Error::MissingField`] for unsigned envelopes and
    /// [`Error::SignatureVerificationFailed`] for bad signatures.
    pub fn verify(&self, verifier: &dyn Verifier, public_key: &str, subject: &str) -> Result<()> {
        let signature = self.signature.as_deref().ok_or_else(|| Error::missing("signature"))?;
        verifier
            .verify(self.canonical.as_bytes(), signature, public_key)
            .map_err(|err| match err {
                Error::SignatureVerificationFailed { .. } => Error::signature(subject),
                other => other,
            })
    }

    /// # Errors
    /// Returns an error if the envelope cannot be serialized.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl<P> Serialize for SignedMessage<P> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let payload = RawValue::from_string(self.canonical.clone()).map_err(S::Error::custom)?;
        let mut state = serializer.serialize_struct("SignedMessage", 2)?;
        state.serialize_field("payload", &payload)?;
        match &self.signature {
            Some(signature) => state.serialize_field("signature", signature)?,
            None => state.skip_field("signature")?,
        }
        state.end()
    }
}

#[derive(Deserialize)]
struct Envelope {
    payload: Box<RawValue>,
    #[serde(default)]
    signature: Option<String>,
}

impl<'de, P: DeserializeOwned> Deserialize<'de> for SignedMessage<P> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let envelope = Envelope::deserialize(deserializer)?;
        let payload = serde_json::from_str(envelope.payload.get()).map_err(D::Error::custom)?;
        Ok(Self {
            payload,
            canonical: envelope.payload.get().to_string(),
            signature: envelope.signature,
        })
    }
}

/// Client-side access block: the nonce the server must echo.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientAccess {
    pub nonce: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientPayload<T> {
    pub access: ClientAccess,
    pub request: T,
}

/// Server-side access block: the echoed nonce and the responding key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerAccess {
    pub nonce: String,
    pub server_identity: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerPayload<T> {
    pub access: ServerAccess,
    pub response: T,
}

pub type ClientRequest<T> = SignedMessage<ClientPayload<T>>;
pub type ServerResponse<T> = SignedMessage<ServerPayload<T>>;

impl<T: Serialize> ClientRequest<T> {
    /// # Errors
    /// Returns an error if the request cannot be serialized.
    pub fn from_request(nonce: impl Into<String>, request: T) -> Result<Self> {
        Self::new(ClientPayload {
            access: ClientAccess {
                nonce: nonce.into(),
            },
            request,
        })
    }
}

impl<T> ClientRequest<T> {
    #[must_use]
    pub fn request(&self) -> &T {
        &self.payload().request
    }

    #[must_use]
    pub fn nonce(&self) -> &str {
        &self.payload().access.nonce
    }
}

impl<T> ServerResponse<T> {
    #[must_use]
    pub fn response(&self) -> &T {
        &self.payload().response
    }

    /// # Errors
    /// Returns [`Error::IncorrectNonce`] when the echoed nonce differs.
    pub fn ensure_nonce(&self, expected: &str) -> Result<()> {
        let actual = &self.payload().access.nonce;
        if actual == expected {
            Ok(())
        } else {
            Err(Error::IncorrectNonce {
                expected: expected.to_string(),
                actual: actual.clone(),
            })
        }
    }

    /// Check the response signature with `public_key` and the echoed nonce.
    ///
    /// # Errors
    /// Signature or nonce failures.
    pub fn verify_response(
        &self,
        verifier: &dyn Verifier,
        public_key: &str,
        expected_nonce: &str,
    ) -> Result<()> {
        self.verify(verifier, public_key, "response")?;
        self.ensure_nonce(expected_nonce)
    }
}

/// Empty response body; serializes as `{}`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}
