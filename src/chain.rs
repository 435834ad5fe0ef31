//! Forward-commitment chains.
//!
//! Each generation publishes `hash(next_key)`; the next operation must reveal
//! `next_key` and publish a fresh commitment. The same reveal-then-recommit
//! rule backs device authentication keys, access keys, and recovery keys.
//! Device and recovery chains get their single-advance guarantee from the
//! registry's sequence check; the access chain, which has no registry row,
//! reserves each revealed generation in a time-lock store instead.

use crate::{
    error::{Error, Result},
    interfaces::{Hasher, TimeLockStore, within},
};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use time::OffsetDateTime;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainKind {
    Authentication,
    Access,
    Recovery,
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Authentication => "authentication",
            Self::Access => "access",
            Self::Recovery => "recovery",
        })
    }
}

struct Reservations<'a> {
    store: &'a dyn TimeLockStore,
    deadline: Duration,
}

pub struct CommitmentChain<'a> {
    kind: ChainKind,
    hasher: &'a dyn Hasher,
    reservations: Option<Reservations<'a>>,
}

impl<'a> CommitmentChain<'a> {
    #[must_use]
    pub fn authentication(hasher: &'a dyn Hasher) -> Self {
        Self {
            kind: ChainKind::Authentication,
            hasher,
            reservations: None,
        }
    }

    #[must_use]
    pub fn recovery(hasher: &'a dyn Hasher) -> Self {
        Self {
            kind: ChainKind::Recovery,
            hasher,
            reservations: None,
        }
    }

    #[must_use]
    pub fn access(hasher: &'a dyn Hasher, store: &'a dyn TimeLockStore, deadline: Duration) -> Self {
        Self {
            kind: ChainKind::Access,
            hasher,
            reservations: Some(Reservations { store, deadline }),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ChainKind {
        self.kind
    }

    /// Commitment to publish for `next_key`.
    #[must_use]
    pub fn commit(&self, next_key: &str) -> String {
        self.hasher.sum(next_key.as_bytes())
    }

    /// Check that `revealed` opens `commitment`; returns the digest.
    ///
    /// # Errors
    /// Returns [`Error::HashMismatch`] when it does not.
    pub fn check(&self, commitment: &str, revealed: &str) -> Result<String> {
        let digest = self.commit(revealed);
        if digest == commitment {
            return Ok(digest);
        }

        warn!(
            alert = true,
            chain = %self.kind,
            "revealed key does not open the {} commitment",
            self.kind
        );
        Err(Error::HashMismatch {
            chain: self.kind,
            expected: commitment.to_string(),
            actual: digest,
        })
    }

    /// Check the reveal and, for reserving chains, claim the revealed
    /// generation until `until`. Only one caller can advance a generation.
    ///
    /// # Errors
    /// [`Error::HashMismatch`] on a bad reveal, [`Error::Replay`] when the
    /// generation was already claimed.
    pub async fn advance(
        &self,
        commitment: &str,
        revealed: &str,
        now: OffsetDateTime,
        until: OffsetDateTime,
    ) -> Result<String> {
        let digest = self.check(commitment, revealed)?;

        if let Some(reservations) = &self.reservations {
            within(
                reservations.deadline,
                "access key hash store",
                reservations.store.reserve(&digest, now, until),
            )
            .await?;
        }

        Ok(digest)
    }
}
