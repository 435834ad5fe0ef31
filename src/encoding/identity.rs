//! Identity and device derivation.
//!
//! A device identifier is the digest of the device's first public key, its
//! first rotation commitment, and the device context. A self-certifying
//! identity additionally binds the recovery commitment and uses the
//! identity context.

use crate::{
    error::{Error, Result},
    interfaces::Hasher,
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Domain-separation strings mixed into derivations.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationContext {
    pub device: String,
    pub identity: String,
}

/// How account identities are chosen at registration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityPolicy {
    /// The client derives the identity and the server checks it.
    #[default]
    SelfCertifying,
    /// The server assigns an identity when the client leaves it out.
    IssuerAssigned,
}

impl fmt::Display for IdentityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SelfCertifying => "self-certifying",
            Self::IssuerAssigned => "issuer-assigned",
        })
    }
}

impl FromStr for IdentityPolicy {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "self-certifying" => Ok(Self::SelfCertifying),
            "issuer-assigned" => Ok(Self::IssuerAssigned),
            other => Err(format!("unknown identity policy: {other}")),
        }
    }
}

pub struct Derivation<'a> {
    hasher: &'a dyn Hasher,
    context: &'a DerivationContext,
}

impl<'a> Derivation<'a> {
    #[must_use]
    pub fn new(hasher: &'a dyn Hasher, context: &'a DerivationContext) -> Self {
        Self { hasher, context }
    }

    #[must_use]
    pub fn device(&self, public_key: &str, rotation_hash: &str) -> String {
        self.hasher
            .sum(format!("{public_key}{rotation_hash}{}", self.context.device).as_bytes())
    }

    #[must_use]
    pub fn identity(&self, public_key: &str, rotation_hash: &str, recovery_hash: &str) -> String {
        self.hasher.sum(
            format!(
                "{public_key}{rotation_hash}{recovery_hash}{}",
                self.context.identity
            )
            .as_bytes(),
        )
    }

    /// # Errors
    /// Returns [`Error::InvalidDevice`] when `device` is not the derivation.
    pub fn check_device(&self, device: &str, public_key: &str, rotation_hash: &str) -> Result<()> {
        let expected = self.device(public_key, rotation_hash);
        if expected == device {
            Ok(())
        } else {
            Err(Error::InvalidDevice {
                expected,
                actual: device.to_string(),
            })
        }
    }

    /// # Errors
    /// Returns [`Error::InvalidIdentity`] when `identity` is not the derivation.
    pub fn check_identity(
        &self,
        identity: &str,
        public_key: &str,
        rotation_hash: &str,
        recovery_hash: &str,
    ) -> Result<()> {
        let expected = self.identity(public_key, rotation_hash, recovery_hash);
        if expected == identity {
            Ok(())
        } else {
            Err(Error::InvalidIdentity {
                expected,
                actual: identity.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Blake3Hasher;

    #[test]
    fn context_separates_devices() {
        let plain = DerivationContext::default();
        let scoped = DerivationContext {
            device: "tenant-a".into(),
            identity: String::new(),
        };

        let a = Derivation::new(&Blake3Hasher, &plain).device("Dkey", "Enext");
        let b = Derivation::new(&Blake3Hasher, &scoped).device("Dkey", "Enext");
        assert_ne!(a, b);
    }

    #[test]
    fn checks_report_expected_value() {
        let context = DerivationContext::default();
        let derivation = Derivation::new(&Blake3Hasher, &context);
        let device = derivation.device("Dkey", "Enext");

        assert!(derivation.check_device(&device, "Dkey", "Enext").is_ok());
        assert_eq!(
            derivation.check_device("Ewrong", "Dkey", "Enext"),
            Err(Error::InvalidDevice {
                expected: device,
                actual: "Ewrong".into(),
            })
        );
    }

    #[test]
    fn identity_binds_recovery_commitment() {
        let context = DerivationContext::default();
        let derivation = Derivation::new(&Blake3Hasher, &context);
        let identity = derivation.identity("Dkey", "Enext", "Erecovery");

        assert!(
            derivation
                .check_identity(&identity, "Dkey", "Enext", "Erecovery")
                .is_ok()
        );
        assert!(matches!(
            derivation.check_identity(&identity, "Dkey", "Enext", "Eother"),
            Err(Error::InvalidIdentity { .. })
        ));
    }

    #[test]
    fn policy_parses_and_displays() {
        assert_eq!(
            "issuer-assigned".parse::<IdentityPolicy>(),
            Ok(IdentityPolicy::IssuerAssigned)
        );
        assert_eq!(
            IdentityPolicy::SelfCertifying.to_string(),
            "self-certifying"
        );
        assert!("whatever".parse::<IdentityPolicy>().is_err());
    }
}
