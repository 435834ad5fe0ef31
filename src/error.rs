//! Error taxonomy for the authentication engine.
//!
//! Every operation reports a structured [`Error`] whose [`ErrorCategory`]
//! tells callers how to react: validation and cryptographic failures are
//! the caller's fault, state failures reflect the registry, and
//! collaborator failures may be retried when flagged transient.

use crate::chain::ChainKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Cryptographic,
    Authentication,
    Token,
    Temporal,
    State,
    Collaborator,
}

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Error {
    #[error("malformed message: {reason}")]
    InvalidMessage { reason: String },

    #[error("missing field: {field}")]
    MissingField { field: String },

    #[error("invalid {subject} encoding: {reason}")]
    InvalidEncoding { subject: String, reason: String },

    #[error("{chain} commitment mismatch (expected {expected}, revealed digest {actual})")]
    HashMismatch {
        chain: ChainKind,
        expected: String,
        actual: String,
    },

    #[error("identity does not match its derivation (expected {expected}, got {actual})")]
    InvalidIdentity { expected: String, actual: String },

    #[error("device does not match its derivation (expected {expected}, got {actual})")]
    InvalidDevice { expected: String, actual: String },

    #[error("signature verification failed for {subject}")]
    SignatureVerificationFailed { subject: String },

    #[error("incorrect nonce (expected {expected}, got {actual})")]
    IncorrectNonce { expected: String, actual: String },

    #[error("mismatched identities (expected {expected}, got {actual})")]
    MismatchedIdentities { expected: String, actual: String },

    #[error("no verification key for issuer {identity}")]
    UnknownVerificationKey { identity: String },

    #[error("invalid token: {reason}")]
    InvalidToken { reason: String },

    #[error("token expired at {expiry} (now {now})")]
    ExpiredToken { expiry: String, now: String },

    #[error("token issued in the future at {issued_at} (now {now})")]
    FutureToken { issued_at: String, now: String },

    #[error("refresh window closed at {refresh_expiry} (now {now})")]
    RefreshExpired { refresh_expiry: String, now: String },

    #[error("stale request timestamp {timestamp} (now {now})")]
    StaleRequest { timestamp: String, now: String },

    #[error("request timestamp {timestamp} is in the future (now {now})")]
    FutureRequest { timestamp: String, now: String },

    #[error("identity {identity} already exists")]
    IdentityExists { identity: String },

    #[error("identity {identity} not found")]
    IdentityNotFound { identity: String },

    #[error("identity {identity} has been deleted")]
    IdentityDeleted { identity: String },

    #[error("device {device} is already registered")]
    DeviceCollision { device: String },

    #[error("device {device} not found for identity {identity}")]
    DeviceNotFound { identity: String, device: String },

    #[error("device {device} of identity {identity} has been revoked")]
    DeviceRevoked { identity: String, device: String },

    #[error("recovery commitment for identity {identity} already exists")]
    RecoveryExists { identity: String },

    #[error("no recovery commitment for identity {identity}")]
    RecoveryNotFound { identity: String },

    #[error("{entity} {key} moved past sequence {sequence}")]
    StaleCommitment {
        entity: String,
        key: String,
        sequence: u64,
    },

    #[error("nonce not found")]
    NonceNotFound,

    #[error("nonce already used")]
    NonceUsed,

    #[error("nonce expired at {expiry} (now {now})")]
    NonceExpired { expiry: String, now: String },

    #[error("{store} value reserved too recently")]
    Replay { store: String, value: String },

    #[error("{collaborator} failure: {reason}")]
    Collaborator {
        collaborator: String,
        reason: String,
        transient: bool,
    },
}

impl Error {
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidMessage { .. }
            | Self::MissingField { .. }
            | Self::InvalidEncoding { .. }
            | Self::HashMismatch { .. }
            | Self::InvalidIdentity { .. }
            | Self::InvalidDevice { .. } => ErrorCategory::Validation,
            Self::SignatureVerificationFailed { .. } | Self::IncorrectNonce { .. } => {
                ErrorCategory::Cryptographic
            }
            Self::MismatchedIdentities { .. } | Self::UnknownVerificationKey { .. } => {
                ErrorCategory::Authentication
            }
            Self::InvalidToken { .. }
            | Self::ExpiredToken { .. }
            | Self::FutureToken { .. }
            | Self::RefreshExpired { .. } => ErrorCategory::Token,
            Self::StaleRequest { .. } | Self::FutureRequest { .. } => ErrorCategory::Temporal,
            Self::IdentityExists { .. }
            | Self::IdentityNotFound { .. }
            | Self::IdentityDeleted { .. }
            | Self::DeviceCollision { .. }
            | Self::DeviceNotFound { .. }
            | Self::DeviceRevoked { .. }
            | Self::RecoveryExists { .. }
            | Self::RecoveryNotFound { .. }
            | Self::StaleCommitment { .. }
            | Self::NonceNotFound
            | Self::NonceUsed
            | Self::NonceExpired { .. }
            | Self::Replay { .. } => ErrorCategory::State,
            Self::Collaborator { .. } => ErrorCategory::Collaborator,
        }
    }

    /// True when retrying the same request may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Collaborator {
                transient: true,
                ..
            }
        )
    }

    pub(crate) fn invalid_message(reason: impl std::fmt::Display) -> Self {
        Self::InvalidMessage {
            reason: reason.to_string(),
        }
    }

    pub(crate) fn missing(field: &str) -> Self {
        Self::MissingField {
            field: field.to_string(),
        }
    }

    pub(crate) fn encoding(subject: &str, reason: impl std::fmt::Display) -> Self {
        Self::InvalidEncoding {
            subject: subject.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn signature(subject: &str) -> Self {
        Self::SignatureVerificationFailed {
            subject: subject.to_string(),
        }
    }

    pub(crate) fn collaborator(
        collaborator: &str,
        reason: impl std::fmt::Display,
        transient: bool,
    ) -> Self {
        Self::Collaborator {
            collaborator: collaborator.to_string(),
            reason: reason.to_string(),
            transient,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_message(err)
    }
}
