//! Recovery commitments: the authenticated change path and the
//! break-glass recovery path.

use super::{AuthServer, Registration};
use crate::{
    chain::CommitmentChain,
    error::{Error, Result},
    interfaces::{RecoveryRecord, VersionWrite, Versioned},
    messages::{ChangeRecoveryKeyRequest, Empty, RecoverAccountRequest},
};
use tracing::{info, instrument, warn};

impl AuthServer {
    async fn recovery_commitment(&self, identity: &str) -> Result<Option<Versioned<RecoveryRecord>>> {
        self.with_deadline("registry", self.stores.registry.recovery(identity))
            .await
    }

    fn recovery_write(
        identity: &str,
        current: Option<&Versioned<RecoveryRecord>>,
        recovery_hash: &str,
    ) -> VersionWrite {
        VersionWrite::Recovery {
            expected: current.map(|found| found.sequence),
            record: RecoveryRecord {
                identity: identity.to_string(),
                recovery_hash: recovery_hash.to_string(),
            },
        }
    }

    /// Handle a serialized recovery request signed by the revealed recovery
    /// key. Every device of the identity is revoked, one new device is
    /// registered, and the recovery commitment moves forward, all in one
    /// commit.
    ///
    /// # Errors
    /// [`Error::RecoveryNotFound`] when the identity has no commitment,
    /// [`Error::HashMismatch`] for a recovery key that does not open it,
    /// [`Error::IdentityDeleted`] for deleted identities, or signature and
    /// derivation failures.
    #[instrument(skip_all)]
    pub async fn recover_account(&self, message: &str) -> Result<String> {
        let request = Self::parse::<RecoverAccountRequest>(message)?;
        let auth = &request.request().authentication;
        request.verify(
            self.crypto.verifier.as_ref(),
            &auth.recovery_key,
            "account recovery",
        )?;
        self.derivation()
            .check_device(&auth.device, &auth.public_key, &auth.rotation_hash)?;

        self.active_identity(&auth.identity).await?;
        let current = self
            .recovery_commitment(&auth.identity)
            .await?
            .ok_or_else(|| Error::RecoveryNotFound {
                identity: auth.identity.clone(),
            })?;
        CommitmentChain::recovery(self.crypto.hasher.as_ref())
            .check(&current.record.recovery_hash, &auth.recovery_key)?;

        let mut writes = self.revocation_writes(&auth.identity, None).await?;
        let revoked = writes.len();
        writes.extend(Self::registration_writes(&Registration {
            identity: &auth.identity,
            device: &auth.device,
            public_key: &auth.public_key,
            rotation_hash: &auth.rotation_hash,
            recovery_hash: None,
            existing_identity: true,
        }));
        writes.push(Self::recovery_write(
            &auth.identity,
            Some(&current),
            &auth.recovery_hash,
        ));
        self.commit(writes).await?;

        warn!(
            identity = %auth.identity,
            device = %auth.device,
            revoked,
            "Account recovered"
        );
        self.respond(request.nonce(), Empty {}).await
    }

    /// Handle a serialized recovery-key change. The request rotates the
    /// caller's device like any authenticated request and replaces the
    /// recovery commitment in the same commit.
    ///
    /// # Errors
    /// Signature, commitment, or registry failures.
    #[instrument(skip_all)]
    pub async fn change_recovery_key(&self, message: &str) -> Result<String> {
        let request = Self::parse::<ChangeRecoveryKeyRequest>(message)?;
        let auth = &request.request().authentication;
        request.verify(
            self.crypto.verifier.as_ref(),
            &auth.public_key,
            "recovery key change",
        )?;

        let update = self
            .plan_rotation(
                &auth.identity,
                &auth.device,
                &auth.public_key,
                &auth.rotation_hash,
            )
            .await?;
        let current = self.recovery_commitment(&auth.identity).await?;

        self.commit(vec![
            update.into_write(),
            Self::recovery_write(&auth.identity, current.as_ref(), &auth.recovery_hash),
        ])
        .await?;

        info!(identity = %auth.identity, device = %auth.device, "Recovery key changed");
        self.respond(request.nonce(), Empty {}).await
    }
}
