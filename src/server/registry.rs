//! Identity and device registry operations.

use super::{AuthServer, required};
use crate::{
    chain::CommitmentChain,
    encoding::IdentityPolicy,
    error::{Error, Result},
    interfaces::{DeviceRecord, IdentityRecord, RecoveryRecord, VersionWrite, Versioned},
    messages::{
        CreateAccountRequest, CreateAccountResponse, DeleteAccountRequest, DeviceAuthentication,
        Empty, RotateDeviceRequest,
    },
};
use tracing::{debug, info, instrument};
use ulid::Ulid;

/// Registration of one device, either founding a new identity or joining
/// an existing one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration<'a> {
    pub identity: &'a str,
    pub device: &'a str,
    pub public_key: &'a str,
    pub rotation_hash: &'a str,
    /// Recovery commitment for a new identity.
    pub recovery_hash: Option<&'a str>,
    pub existing_identity: bool,
}

/// A planned device version on top of the version it was read at.
#[derive(Clone, Debug)]
pub(super) struct DeviceUpdate {
    expected: u64,
    record: DeviceRecord,
}

impl DeviceUpdate {
    pub(super) fn revoked(mut self) -> Self {
        self.record.revoked = true;
        self
    }

    pub(super) fn device(&self) -> &str {
        &self.record.device
    }

    pub(super) fn into_write(self) -> VersionWrite {
        VersionWrite::Device {
            expected: Some(self.expected),
            record: self.record,
        }
    }
}

impl AuthServer {
    pub(super) async fn commit(&self, writes: Vec<VersionWrite>) -> Result<()> {
        self.with_deadline("registry", self.stores.registry.commit(writes))
            .await
    }

    /// Latest identity version, which must exist and not be deleted.
    pub(super) async fn active_identity(&self, identity: &str) -> Result<Versioned<IdentityRecord>> {
        let found = self
            .with_deadline("registry", self.stores.registry.identity(identity))
            .await?
            .ok_or_else(|| Error::IdentityNotFound {
                identity: identity.to_string(),
            })?;

        if found.record.deleted {
            return Err(Error::IdentityDeleted {
                identity: identity.to_string(),
            });
        }
        Ok(found)
    }

    /// Check that the identity is live and the device exists under it and
    /// has not been revoked. Returns the device's current version.
    ///
    /// # Errors
    /// [`Error::IdentityNotFound`], [`Error::IdentityDeleted`],
    /// [`Error::DeviceNotFound`], or [`Error::DeviceRevoked`].
    pub async fn ensure_active(
        &self,
        identity: &str,
        device: &str,
    ) -> Result<Versioned<DeviceRecord>> {
        self.active_identity(identity).await?;

        let found = self
            .with_deadline("registry", self.stores.registry.device(identity, device))
            .await?
            .ok_or_else(|| Error::DeviceNotFound {
                identity: identity.to_string(),
                device: device.to_string(),
            })?;

        if found.record.revoked {
            return Err(Error::DeviceRevoked {
                identity: identity.to_string(),
                device: device.to_string(),
            });
        }
        Ok(found)
    }

    /// Current authentication key of an active device.
    ///
    /// # Errors
    /// As [`AuthServer::ensure_active`].
    pub async fn public_key(&self, identity: &str, device: &str) -> Result<String> {
        Ok(self.ensure_active(identity, device).await?.record.public_key)
    }

    pub(super) fn registration_writes(registration: &Registration<'_>) -> Vec<VersionWrite> {
        let mut writes = Vec::with_capacity(3);
        if !registration.existing_identity {
            writes.push(VersionWrite::Identity {
                expected: None,
                record: IdentityRecord {
                    identity: registration.identity.to_string(),
                    deleted: false,
                },
            });
            if let Some(recovery_hash) = registration.recovery_hash {
                writes.push(VersionWrite::Recovery {
                    expected: None,
                    record: RecoveryRecord {
                        identity: registration.identity.to_string(),
                        recovery_hash: recovery_hash.to_string(),
                    },
                });
            }
        }
        writes.push(VersionWrite::Device {
            expected: None,
            record: DeviceRecord {
                identity: registration.identity.to_string(),
                device: registration.device.to_string(),
                public_key: registration.public_key.to_string(),
                rotation_hash: registration.rotation_hash.to_string(),
                revoked: false,
            },
        });
        writes
    }

    /// Register a device, creating its identity unless it joins an
    /// existing one.
    ///
    /// # Errors
    /// [`Error::IdentityExists`] or [`Error::DeviceCollision`] for a taken
    /// identity or device; for an existing identity, the errors of
    /// looking it up.
    pub async fn register(&self, registration: &Registration<'_>) -> Result<()> {
        if registration.existing_identity {
            self.active_identity(registration.identity).await?;
        }
        self.commit(Self::registration_writes(registration)).await
    }

    /// Check a reveal against the device's commitment and plan the next
    /// device version. Nothing is written.
    pub(super) async fn plan_rotation(
        &self,
        identity: &str,
        device: &str,
        revealed: &str,
        rotation_hash: &str,
    ) -> Result<DeviceUpdate> {
        let current = self.ensure_active(identity, device).await?;
        CommitmentChain::authentication(self.crypto.hasher.as_ref())
            .check(&current.record.rotation_hash, revealed)?;

        Ok(DeviceUpdate {
            expected: current.sequence,
            record: DeviceRecord {
                public_key: revealed.to_string(),
                rotation_hash: rotation_hash.to_string(),
                ..current.record
            },
        })
    }

    /// Advance a device's authentication chain.
    ///
    /// # Errors
    /// [`Error::HashMismatch`] for a bad reveal, [`Error::StaleCommitment`]
    /// when a concurrent rotation won, or the lookup errors of
    /// [`AuthServer::ensure_active`].
    pub async fn rotate(
        &self,
        identity: &str,
        device: &str,
        revealed: &str,
        rotation_hash: &str,
    ) -> Result<()> {
        let update = self
            .plan_rotation(identity, device, revealed, rotation_hash)
            .await?;
        self.commit(vec![update.into_write()]).await
    }

    /// Revocation writes for every live device of `identity` except `keep`.
    pub(super) async fn revocation_writes(
        &self,
        identity: &str,
        keep: Option<&str>,
    ) -> Result<Vec<VersionWrite>> {
        let devices = self
            .with_deadline("registry", self.stores.registry.devices(identity))
            .await?;

        Ok(devices
            .into_iter()
            .filter(|found| !found.record.revoked && Some(found.record.device.as_str()) != keep)
            .map(|found| VersionWrite::Device {
                expected: Some(found.sequence),
                record: DeviceRecord {
                    revoked: true,
                    ..found.record
                },
            })
            .collect())
    }

    /// # Errors
    /// [`Error::DeviceNotFound`] for unknown devices. Revoking a revoked
    /// device is a no-op.
    pub async fn revoke_device(&self, identity: &str, device: &str) -> Result<()> {
        self.active_identity(identity).await?;
        let found = self
            .with_deadline("registry", self.stores.registry.device(identity, device))
            .await?
            .ok_or_else(|| Error::DeviceNotFound {
                identity: identity.to_string(),
                device: device.to_string(),
            })?;

        if found.record.revoked {
            return Ok(());
        }
        self.commit(vec![VersionWrite::Device {
            expected: Some(found.sequence),
            record: DeviceRecord {
                revoked: true,
                ..found.record
            },
        }])
        .await
    }

    /// # Errors
    /// Lookup or commit failures.
    pub async fn revoke_devices(&self, identity: &str) -> Result<()> {
        self.active_identity(identity).await?;
        let writes = self.revocation_writes(identity, None).await?;
        if writes.is_empty() {
            return Ok(());
        }
        self.commit(writes).await
    }

    pub(super) async fn deletion_write(&self, identity: &str) -> Result<VersionWrite> {
        let current = self.active_identity(identity).await?;
        Ok(VersionWrite::Identity {
            expected: Some(current.sequence),
            record: IdentityRecord {
                identity: identity.to_string(),
                deleted: true,
            },
        })
    }

    /// Mark the identity deleted and revoke all of its devices at once.
    ///
    /// # Errors
    /// Lookup or commit failures.
    pub async fn delete_identity(&self, identity: &str) -> Result<()> {
        let mut writes = self.revocation_writes(identity, None).await?;
        writes.push(self.deletion_write(identity).await?);
        self.commit(writes).await
    }

    /// Handle a serialized account-creation request.
    ///
    /// # Errors
    /// Malformed or unsigned requests, a device or identity that does not
    /// match its derivation, or a taken identity or device.
    #[instrument(skip_all)]
    pub async fn create_account(&self, message: &str) -> Result<String> {
        let request = Self::parse::<CreateAccountRequest>(message)?;
        let auth = &request.request().authentication;
        request.verify(
            self.crypto.verifier.as_ref(),
            &auth.public_key,
            "account creation",
        )?;

        let derivation = self.derivation();
        derivation.check_device(&auth.device, &auth.public_key, &auth.rotation_hash)?;

        let identity = match self.config.identity_policy() {
            IdentityPolicy::SelfCertifying => {
                let identity = required(auth.identity.as_deref(), "identity")?;
                derivation.check_identity(
                    identity,
                    &auth.public_key,
                    &auth.rotation_hash,
                    &auth.recovery_hash,
                )?;
                identity.to_string()
            }
            IdentityPolicy::IssuerAssigned => auth
                .identity
                .clone()
                .filter(|identity| !identity.is_empty())
                .unwrap_or_else(|| Ulid::new().to_string()),
        };

        self.register(&Registration {
            identity: &identity,
            device: &auth.device,
            public_key: &auth.public_key,
            rotation_hash: &auth.rotation_hash,
            recovery_hash: Some(&auth.recovery_hash),
            existing_identity: false,
        })
        .await?;

        info!(identity = %identity, device = %auth.device, "Account created");
        self.respond(request.nonce(), CreateAccountResponse { identity })
            .await
    }

    /// Handle a serialized device-rotation request, signed by the revealed key.
    ///
    /// # Errors
    /// Signature failures and the errors of [`AuthServer::rotate`].
    #[instrument(skip_all)]
    pub async fn rotate_device(&self, message: &str) -> Result<String> {
        let request = Self::parse::<RotateDeviceRequest>(message)?;
        let auth = &request.request().authentication;
        self.verify_revealed(&request, auth, "device rotation")?;

        self.rotate(
            &auth.identity,
            &auth.device,
            &auth.public_key,
            &auth.rotation_hash,
        )
        .await?;

        debug!(identity = %auth.identity, device = %auth.device, "Device rotated");
        self.respond(request.nonce(), Empty {}).await
    }

    /// Handle a serialized account-deletion request. The caller's device
    /// rotates and every device is revoked in the same commit as the
    /// identity deletion.
    ///
    /// # Errors
    /// Signature, commitment, or registry failures.
    #[instrument(skip_all)]
    pub async fn delete_account(&self, message: &str) -> Result<String> {
        let request = Self::parse::<DeleteAccountRequest>(message)?;
        let auth = &request.request().authentication;
        self.verify_revealed(&request, auth, "account deletion")?;

        let update = self
            .plan_rotation(
                &auth.identity,
                &auth.device,
                &auth.public_key,
                &auth.rotation_hash,
            )
            .await?;

        let mut writes = vec![update.revoked().into_write()];
        writes.extend(
            self.revocation_writes(&auth.identity, Some(&auth.device))
                .await?,
        );
        writes.push(self.deletion_write(&auth.identity).await?);
        self.commit(writes).await?;

        info!(identity = %auth.identity, "Account deleted");
        self.respond(request.nonce(), Empty {}).await
    }

    /// Requests authenticated by a device's revealed next key are signed
    /// by that key.
    pub(super) fn verify_revealed<T>(
        &self,
        request: &crate::messages::ClientRequest<T>,
        auth: &DeviceAuthentication,
        subject: &str,
    ) -> Result<()> {
        request.verify(self.crypto.verifier.as_ref(), &auth.public_key, subject)
    }
}
