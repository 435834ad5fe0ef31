//! Reference timestamp, token, and derivation encodings.

pub mod identity;
pub mod timestamper;
pub mod token;

pub use identity::{Derivation, DerivationContext, IdentityPolicy};
pub use timestamper::Rfc3339Timestamper;
pub use token::Base64TokenEncoder;
