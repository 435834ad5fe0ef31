//! Reference implementations of the crypto collaborators.

pub mod cesr;
pub mod digest;
pub mod ed25519;
pub mod noncer;

pub use digest::Blake3Hasher;
pub use ed25519::{Ed25519Key, Ed25519Verifier};
pub use noncer::OsNoncer;
