//! Device linking and unlinking.

use super::{AuthServer, Registration};
use crate::{
    error::{Error, Result},
    interfaces::{DeviceRecord, VersionWrite},
    messages::{Empty, LinkDeviceRequest, UnlinkDeviceRequest},
};
use tracing::{info, instrument};

impl AuthServer {
    /// Handle a serialized link request. An active device endorses the new
    /// device's self-signed link container; the endorser rotates and the new
    /// device is registered in the same commit.
    ///
    /// # Errors
    /// [`Error::MismatchedIdentities`] when the container names another
    /// identity, [`Error::DeviceCollision`] for a taken device, or
    /// signature, derivation, and commitment failures.
    #[instrument(skip_all)]
    pub async fn link_device(&self, message: &str) -> Result<String> {
        let request = Self::parse::<LinkDeviceRequest>(message)?;
        let auth = &request.request().authentication;
        self.verify_revealed(&request, auth, "device link")?;

        let link = &request.request().link;
        let joining = link.payload();
        link.verify(
            self.crypto.verifier.as_ref(),
            &joining.public_key,
            "link container",
        )?;
        if joining.identity != auth.identity {
            return Err(Error::MismatchedIdentities {
                expected: auth.identity.clone(),
                actual: joining.identity.clone(),
            });
        }
        self.derivation()
            .check_device(&joining.device, &joining.public_key, &joining.rotation_hash)?;

        let endorser = self
            .plan_rotation(
                &auth.identity,
                &auth.device,
                &auth.public_key,
                &auth.rotation_hash,
            )
            .await?;

        let mut writes = vec![endorser.into_write()];
        writes.extend(Self::registration_writes(&Registration {
            identity: &auth.identity,
            device: &joining.device,
            public_key: &joining.public_key,
            rotation_hash: &joining.rotation_hash,
            recovery_hash: None,
            existing_identity: true,
        }));
        self.commit(writes).await?;

        info!(
            identity = %auth.identity,
            endorser = %auth.device,
            device = %joining.device,
            "Device linked"
        );
        self.respond(request.nonce(), Empty {}).await
    }

    /// Handle a serialized unlink request. Any active device may revoke any
    /// device of its identity, itself included.
    ///
    /// # Errors
    /// [`Error::DeviceNotFound`] for an unknown target, or signature,
    /// commitment, and registry failures.
    #[instrument(skip_all)]
    pub async fn unlink_device(&self, message: &str) -> Result<String> {
        let request = Self::parse::<UnlinkDeviceRequest>(message)?;
        let auth = &request.request().authentication;
        let target = &request.request().link.device;
        self.verify_revealed(&request, auth, "device unlink")?;

        let caller = self
            .plan_rotation(
                &auth.identity,
                &auth.device,
                &auth.public_key,
                &auth.rotation_hash,
            )
            .await?;

        let writes = if caller.device() == target.as_str() {
            vec![caller.revoked().into_write()]
        } else {
            let found = self
                .with_deadline(
                    "registry",
                    self.stores.registry.device(&auth.identity, target),
                )
                .await?
                .ok_or_else(|| Error::DeviceNotFound {
                    identity: auth.identity.clone(),
                    device: target.clone(),
                })?;

            let mut writes = vec![caller.into_write()];
            if !found.record.revoked {
                writes.push(VersionWrite::Device {
                    expected: Some(found.sequence),
                    record: DeviceRecord {
                        revoked: true,
                        ..found.record
                    },
                });
            }
            writes
        };
        self.commit(writes).await?;

        info!(identity = %auth.identity, device = %target, "Device unlinked");
        self.respond(request.nonce(), Empty {}).await
    }
}
