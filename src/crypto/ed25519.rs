use super::cesr;
use crate::{
    error::{Error, Result},
    interfaces::{BoxFuture, SigningKey, Verifier},
};
use ed25519_dalek::{Signature, Signer, SigningKey as DalekSigningKey, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;

/// In-process Ed25519 signing key.
pub struct Ed25519Key {
    key: DalekSigningKey,
    public: String,
}

impl Ed25519Key {
    #[must_use]
    pub fn generate() -> Self {
        Self::from_dalek(DalekSigningKey::generate(&mut OsRng))
    }

    #[must_use]
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::from_dalek(DalekSigningKey::from_bytes(seed))
    }

    fn from_dalek(key: DalekSigningKey) -> Self {
        let public = cesr::encode(cesr::ED25519_PUBLIC, key.verifying_key().as_bytes());
        Self { key, public }
    }
}

impl fmt::Debug for Ed25519Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519Key")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

impl SigningKey for Ed25519Key {
    fn public(&self) -> String {
        self.public.clone()
    }

    fn sign<'a>(&'a self, message: &'a [u8]) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let signature: Signature = self.key.sign(message);
            Ok(cesr::encode(cesr::ED25519_SIGNATURE, &signature.to_bytes()))
        })
    }

    fn verifier(&self) -> &dyn Verifier {
        &Ed25519Verifier
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Ed25519Verifier;

impl Verifier for Ed25519Verifier {
    fn verify(&self, message: &[u8], signature: &str, public_key: &str) -> Result<()> {
        let key: [u8; 32] = cesr::decode("public key", cesr::ED25519_PUBLIC, public_key, 32)?
            .try_into()
            .map_err(|_| Error::encoding("public key", "expected 32 bytes"))?;
        let key =
            VerifyingKey::from_bytes(&key).map_err(|err| Error::encoding("public key", err))?;

        let raw: [u8; 64] = cesr::decode("signature", cesr::ED25519_SIGNATURE, signature, 64)?
            .try_into()
            .map_err(|_| Error::encoding("signature", "expected 64 bytes"))?;
        let signature = Signature::from_bytes(&raw);

        key.verify_strict(message, &signature)
            .map_err(|_| Error::signature("message"))
    }
}
