//! # Cadena (forward-committed device authentication)
//!
//! `cadena` authenticates devices with hash-chained keys. Every signing key
//! is announced ahead of use by publishing the digest of the next one, so a
//! compromised key is only useful until its successor is revealed.
//!
//! ## Chains
//!
//! Three chains share one reveal-then-recommit primitive
//! ([`chain::CommitmentChain`]):
//!
//! - **Authentication:** each device rotates its signing key on every
//!   state-changing operation. The server stores the current public key and
//!   the digest of the next one.
//! - **Access:** a session holds a short-lived key that signs requests to
//!   resource servers. Refreshing reveals the next access key and retires
//!   the current one, so a stolen access key cannot outlive one refresh.
//! - **Recovery:** a committed, offline recovery key that revokes every
//!   device and starts a fresh one.
//!
//! ## Stateless verification
//!
//! Resource servers run an [`AccessVerifier`]. It checks the token's issuer
//! signature, its lifetime, the request signature under the token's access
//! key, the request timestamp window, and a single-use request nonce. It
//! never calls the issuer on the request path.
//!
//! ## Registry
//!
//! Registry state is append-only. Every change writes a new sequence number
//! and a batch commits all-or-nothing, so concurrent rotations of the same
//! device cannot both win. [`storage::MemoryRegistry`] serves tests and
//! single-node deployments; [`storage::PostgresRegistry`] persists to
//! `PostgreSQL`, next to challenge and reservation stores that every
//! instance sharing the database sees.

pub mod api;
pub mod chain;
pub mod cli;
pub mod crypto;
pub mod encoding;
pub mod error;
pub mod interfaces;
pub mod messages;
pub mod server;
pub mod storage;
pub mod verifier;

#[cfg(test)]
mod testing;

pub use error::{Error, ErrorCategory, Result};
pub use server::{AuthConfig, AuthServer};
pub use verifier::{AccessVerifier, VerifiedAccess};

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
