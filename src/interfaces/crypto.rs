use super::BoxFuture;
use crate::error::Result;

/// Digest function producing self-describing text digests.
pub trait Hasher: Send + Sync {
    fn sum(&self, message: &[u8]) -> String;
}

/// Checks a signature produced by some [`SigningKey`].
pub trait Verifier: Send + Sync {
    /// # Errors
    /// Returns [`crate::Error::SignatureVerificationFailed`] when the signature
    /// does not match, or [`crate::Error::InvalidEncoding`] for undecodable input.
    fn verify(&self, message: &[u8], signature: &str, public_key: &str) -> Result<()>;
}

/// A signing key. Signing is async so the key may live in an HSM or a
/// remote signer.
pub trait SigningKey: Send + Sync {
    /// Encoded public key.
    fn public(&self) -> String;

    /// Identity under which verifiers look this key up.
    fn identity(&self) -> String {
        self.public()
    }

    fn sign<'a>(&'a self, message: &'a [u8]) -> BoxFuture<'a, Result<String>>;

    /// Verifier able to check this key's signatures.
    fn verifier(&self) -> &dyn Verifier;
}

/// Source of fresh 128-bit nonces.
pub trait Noncer: Send + Sync {
    /// # Errors
    /// Returns a collaborator failure when the entropy source is unavailable.
    fn generate_128(&self) -> Result<String>;
}
