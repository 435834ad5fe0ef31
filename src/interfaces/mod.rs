//! Collaborator contracts.
//!
//! The engine never touches a clock, key, or database directly. Every
//! effect goes through one of these traits so deployments can swap in
//! HSM-backed keys, shared stores, or a controllable clock.

pub mod crypto;
pub mod encoding;
pub mod storage;

pub use crypto::{Hasher, Noncer, SigningKey, Verifier};
pub use encoding::{Timestamper, TokenEncoder};
pub use storage::{
    AuthenticationNonceStore, Challenge, DeviceRecord, IdentityRecord, RecoveryRecord,
    RegistryStore, TimeLockStore, VerificationKeyStore, VersionWrite, Versioned,
};

use crate::error::{Error, Result};
use std::{future::Future, pin::Pin, time::Duration};

/// Boxed future returned by object-safe async collaborator methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Run a collaborator call under a deadline.
///
/// An elapsed deadline surfaces as a transient collaborator failure so the
/// caller can retry.
///
/// # Errors
/// Returns the inner error, or a transient [`Error::Collaborator`] on timeout.
pub async fn within<T, F>(deadline: Duration, collaborator: &str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::collaborator(
            collaborator,
            format!("deadline of {}ms elapsed", deadline.as_millis()),
            true,
        )),
    }
}
