//! Storage contracts.
//!
//! The registry is append-only: each identity, device, and recovery
//! commitment is a sequence of versions keyed by `(key, sequence)`, and the
//! current state is the highest sequence. Writes are batched and committed
//! all-or-nothing, with every write carrying the sequence it was planned
//! against so concurrent updates of the same entity cannot both succeed.

use super::BoxFuture;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub sequence: u64,
    pub record: T,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub identity: String,
    pub deleted: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub identity: String,
    pub device: String,
    pub public_key: String,
    pub rotation_hash: String,
    pub revoked: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryRecord {
    pub identity: String,
    pub recovery_hash: String,
}

/// One planned write. `expected` is the sequence the write was planned
/// against; `None` creates the entity at sequence zero.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VersionWrite {
    Identity {
        expected: Option<u64>,
        record: IdentityRecord,
    },
    Device {
        expected: Option<u64>,
        record: DeviceRecord,
    },
    Recovery {
        expected: Option<u64>,
        record: RecoveryRecord,
    },
}

impl VersionWrite {
    #[must_use]
    pub const fn expected(&self) -> Option<u64> {
        match self {
            Self::Identity { expected, .. }
            | Self::Device { expected, .. }
            | Self::Recovery { expected, .. } => *expected,
        }
    }

    /// Sequence this write produces.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        match self.expected() {
            Some(sequence) => sequence + 1,
            None => 0,
        }
    }

    /// Entity kind and key, as used in conflict reports.
    #[must_use]
    pub fn entity(&self) -> (EntityKind, &str) {
        match self {
            Self::Identity { record, .. } => (EntityKind::Identity, &record.identity),
            Self::Device { record, .. } => (EntityKind::Device, &record.device),
            Self::Recovery { record, .. } => (EntityKind::Recovery, &record.identity),
        }
    }

    /// Error for a write that lost its race: a create against an existing
    /// entity, or an update planned against a superseded sequence.
    #[must_use]
    pub fn conflict(&self) -> Error {
        match (self, self.expected()) {
            (Self::Identity { record, .. }, None) => Error::IdentityExists {
                identity: record.identity.clone(),
            },
            (Self::Device { record, .. }, None) => Error::DeviceCollision {
                device: record.device.clone(),
            },
            (Self::Recovery { record, .. }, None) => Error::RecoveryExists {
                identity: record.identity.clone(),
            },
            (_, Some(sequence)) => {
                let (kind, key) = self.entity();
                Error::StaleCommitment {
                    entity: kind.to_string(),
                    key: key.to_string(),
                    sequence,
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Identity,
    Device,
    Recovery,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Identity => "identity",
            Self::Device => "device",
            Self::Recovery => "recovery",
        })
    }
}

/// Identity, device, and recovery-commitment registry.
pub trait RegistryStore: Send + Sync {
    fn identity<'a>(
        &'a self,
        identity: &'a str,
    ) -> BoxFuture<'a, Result<Option<Versioned<IdentityRecord>>>>;

    /// Latest version of `device`, only if it belongs to `identity`.
    fn device<'a>(
        &'a self,
        identity: &'a str,
        device: &'a str,
    ) -> BoxFuture<'a, Result<Option<Versioned<DeviceRecord>>>>;

    /// Latest version of every device registered under `identity`,
    /// revoked ones included.
    fn devices<'a>(&'a self, identity: &'a str)
    -> BoxFuture<'a, Result<Vec<Versioned<DeviceRecord>>>>;

    fn recovery<'a>(
        &'a self,
        identity: &'a str,
    ) -> BoxFuture<'a, Result<Option<Versioned<RecoveryRecord>>>>;

    /// Apply every write or none of them.
    ///
    /// # Errors
    /// A create against an existing entity fails with the matching
    /// "exists" error ([`crate::Error::IdentityExists`],
    /// [`crate::Error::DeviceCollision`], [`crate::Error::RecoveryExists`]);
    /// an update whose expected sequence is no longer current fails with
    /// [`crate::Error::StaleCommitment`].
    fn commit<'a>(&'a self, writes: Vec<VersionWrite>) -> BoxFuture<'a, Result<()>>;
}

/// Outstanding authentication challenge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Challenge {
    pub identity: String,
    pub expiry: OffsetDateTime,
}

/// Single-use challenge nonces.
pub trait AuthenticationNonceStore: Send + Sync {
    /// Record a fresh challenge. `now` lets the store drop challenges that
    /// expired unanswered.
    ///
    /// # Errors
    /// [`crate::Error::Replay`] if `nonce` is already outstanding.
    fn insert<'a>(
        &'a self,
        nonce: &'a str,
        challenge: Challenge,
        now: OffsetDateTime,
    ) -> BoxFuture<'a, Result<()>>;

    /// Atomically mark `nonce` used and return its challenge. Expiry is the
    /// caller's check; `now` only lets the store drop dead entries.
    ///
    /// # Errors
    /// [`crate::Error::NonceNotFound`] for unknown nonces and
    /// [`crate::Error::NonceUsed`] for every consume after the first.
    fn consume<'a>(
        &'a self,
        nonce: &'a str,
        now: OffsetDateTime,
    ) -> BoxFuture<'a, Result<Challenge>>;
}

/// Exists-and-reserve store. A reserved value cannot be reserved again
/// until its reservation lapses.
pub trait TimeLockStore: Send + Sync {
    /// # Errors
    /// [`crate::Error::Replay`] if `value` holds a live reservation.
    fn reserve<'a>(
        &'a self,
        value: &'a str,
        now: OffsetDateTime,
        until: OffsetDateTime,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Issuer public keys, looked up by issuer identity.
pub trait VerificationKeyStore: Send + Sync {
    /// # Errors
    /// [`crate::Error::UnknownVerificationKey`] for unknown issuers.
    fn get<'a>(&'a self, identity: &'a str) -> BoxFuture<'a, Result<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device_write(expected: Option<u64>) -> VersionWrite {
        VersionWrite::Device {
            expected,
            record: DeviceRecord {
                identity: "Eid".into(),
                device: "Edev".into(),
                public_key: "Dkey".into(),
                rotation_hash: "Enext".into(),
                revoked: false,
            },
        }
    }

    #[test]
    fn creates_start_at_zero() {
        assert_eq!(device_write(None).sequence(), 0);
        assert_eq!(device_write(Some(0)).sequence(), 1);
        assert_eq!(device_write(Some(41)).sequence(), 42);
    }

    #[test]
    fn entity_names_the_key() {
        let write = device_write(None);
        let (kind, key) = write.entity();
        assert_eq!(kind, EntityKind::Device);
        assert_eq!(key, "Edev");
        assert_eq!(kind.to_string(), "device");
    }

    #[test]
    fn conflicts_distinguish_creates_from_updates() {
        assert_eq!(
            device_write(None).conflict(),
            Error::DeviceCollision {
                device: "Edev".into()
            }
        );
        assert_eq!(
            device_write(Some(3)).conflict(),
            Error::StaleCommitment {
                entity: "device".into(),
                key: "Edev".into(),
                sequence: 3,
            }
        );
    }
}
