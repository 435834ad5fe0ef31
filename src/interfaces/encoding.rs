use crate::error::Result;
use time::OffsetDateTime;

/// The engine's only clock.
pub trait Timestamper: Send + Sync {
    fn now(&self) -> OffsetDateTime;

    fn format(&self, when: OffsetDateTime) -> String;

    /// # Errors
    /// Returns [`crate::Error::InvalidEncoding`] for unparseable timestamps.
    fn parse(&self, value: &str) -> Result<OffsetDateTime>;
}

/// Turns serialized token claims into the transport body and back.
pub trait TokenEncoder: Send + Sync {
    /// Length of the signature prefix, read from the token's leading code.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidToken`] for an unknown signature code.
    fn signature_length(&self, token: &str) -> Result<usize>;

    /// # Errors
    /// Returns an error if the claims cannot be encoded.
    fn encode(&self, claims: &str) -> Result<String>;

    /// # Errors
    /// Returns [`crate::Error::InvalidToken`] if the body does not decode.
    fn decode(&self, encoded: &str) -> Result<String>;
}
