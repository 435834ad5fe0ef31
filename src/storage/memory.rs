use crate::{
    error::Result,
    interfaces::{
        BoxFuture, DeviceRecord, IdentityRecord, RecoveryRecord, RegistryStore, VersionWrite,
        Versioned, storage::EntityKind,
    },
};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct State {
    identities: HashMap<String, Vec<IdentityRecord>>,
    devices: HashMap<String, Vec<DeviceRecord>>,
    devices_by_identity: HashMap<String, Vec<String>>,
    recoveries: HashMap<String, Vec<RecoveryRecord>>,
}

fn latest<T: Clone>(versions: Option<&Vec<T>>) -> Option<Versioned<T>> {
    let versions = versions?;
    let record = versions.last()?.clone();
    Some(Versioned {
        sequence: versions.len() as u64 - 1,
        record,
    })
}

impl State {
    fn current(&self, kind: EntityKind, key: &str) -> Option<u64> {
        let len = match kind {
            EntityKind::Identity => self.identities.get(key).map(Vec::len),
            EntityKind::Device => self.devices.get(key).map(Vec::len),
            EntityKind::Recovery => self.recoveries.get(key).map(Vec::len),
        }?;
        (len as u64).checked_sub(1)
    }

    fn apply(&mut self, write: VersionWrite) {
        match write {
            VersionWrite::Identity { record, .. } => {
                self.identities
                    .entry(record.identity.clone())
                    .or_default()
                    .push(record);
            }
            VersionWrite::Device { expected, record } => {
                if expected.is_none() {
                    self.devices_by_identity
                        .entry(record.identity.clone())
                        .or_default()
                        .push(record.device.clone());
                }
                self.devices
                    .entry(record.device.clone())
                    .or_default()
                    .push(record);
            }
            VersionWrite::Recovery { record, .. } => {
                self.recoveries
                    .entry(record.identity.clone())
                    .or_default()
                    .push(record);
            }
        }
    }
}

/// Versioned registry held in process memory.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    state: Mutex<State>,
}

impl MemoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegistryStore for MemoryRegistry {
    fn identity<'a>(
        &'a self,
        identity: &'a str,
    ) -> BoxFuture<'a, Result<Option<Versioned<IdentityRecord>>>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(latest(state.identities.get(identity)))
        })
    }

    fn device<'a>(
        &'a self,
        identity: &'a str,
        device: &'a str,
    ) -> BoxFuture<'a, Result<Option<Versioned<DeviceRecord>>>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(latest(state.devices.get(device)).filter(|found| found.record.identity == identity))
        })
    }

    fn devices<'a>(
        &'a self,
        identity: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Versioned<DeviceRecord>>>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            let devices = state
                .devices_by_identity
                .get(identity)
                .map(|ids| {
                    ids.iter()
                        .filter_map(|id| latest(state.devices.get(id)))
                        .collect()
                })
                .unwrap_or_default();
            Ok(devices)
        })
    }

    fn recovery<'a>(
        &'a self,
        identity: &'a str,
    ) -> BoxFuture<'a, Result<Option<Versioned<RecoveryRecord>>>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(latest(state.recoveries.get(identity)))
        })
    }

    fn commit<'a>(&'a self, writes: Vec<VersionWrite>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;

            // Validate the whole batch against current state plus earlier
            // writes in the same batch before touching anything.
            let mut staged: HashMap<(EntityKind, String), u64> = HashMap::new();
            for write in &writes {
                let (kind, key) = write.entity();
                let current = staged
                    .get(&(kind, key.to_string()))
                    .copied()
                    .or_else(|| state.current(kind, key));

                match (write.expected(), current) {
                    (None, None) => {}
                    (Some(expected), Some(current)) if expected == current => {}
                    _ => return Err(write.conflict()),
                }
                staged.insert((kind, key.to_string()), write.sequence());
            }

            for write in writes {
                state.apply(write);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::Arc;

    fn identity(deleted: bool) -> IdentityRecord {
        IdentityRecord {
            identity: "Eid".into(),
            deleted,
        }
    }

    fn device(id: &str, key: &str, revoked: bool) -> DeviceRecord {
        DeviceRecord {
            identity: "Eid".into(),
            device: id.into(),
            public_key: key.into(),
            rotation_hash: format!("E{key}"),
            revoked,
        }
    }

    async fn seeded() -> anyhow::Result<MemoryRegistry> {
        let registry = MemoryRegistry::new();
        registry
            .commit(vec![
                VersionWrite::Identity {
                    expected: None,
                    record: identity(false),
                },
                VersionWrite::Device {
                    expected: None,
                    record: device("Edev", "D0", false),
                },
                VersionWrite::Recovery {
                    expected: None,
                    record: RecoveryRecord {
                        identity: "Eid".into(),
                        recovery_hash: "Erecovery".into(),
                    },
                },
            ])
            .await?;
        Ok(registry)
    }

    #[tokio::test]
    async fn latest_version_wins() -> anyhow::Result<()> {
        let registry = seeded().await?;
        registry
            .commit(vec![VersionWrite::Device {
                expected: Some(0),
                record: device("Edev", "D1", false),
            }])
            .await?;

        let current = registry.device("Eid", "Edev").await?;
        assert_eq!(current.as_ref().map(|d| d.sequence), Some(1));
        assert_eq!(current.map(|d| d.record.public_key), Some("D1".into()));
        Ok(())
    }

    #[tokio::test]
    async fn device_lookup_is_scoped_to_identity() -> anyhow::Result<()> {
        let registry = seeded().await?;
        assert!(registry.device("Eother", "Edev").await?.is_none());
        assert_eq!(registry.devices("Eid").await?.len(), 1);
        assert!(registry.devices("Eother").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn creates_conflict_with_existing_entities() -> anyhow::Result<()> {
        let registry = seeded().await?;
        let result = registry
            .commit(vec![VersionWrite::Identity {
                expected: None,
                record: identity(false),
            }])
            .await;
        assert_eq!(
            result,
            Err(Error::IdentityExists {
                identity: "Eid".into()
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn failed_batch_writes_nothing() -> anyhow::Result<()> {
        let registry = seeded().await?;
        let result = registry
            .commit(vec![
                VersionWrite::Device {
                    expected: Some(0),
                    record: device("Edev", "D1", true),
                },
                VersionWrite::Device {
                    expected: None,
                    record: device("Edev", "Dx", false),
                },
            ])
            .await;
        assert!(matches!(result, Err(Error::DeviceCollision { .. })));

        let current = registry.device("Eid", "Edev").await?;
        assert_eq!(current.map(|d| d.sequence), Some(0));
        Ok(())
    }

    #[tokio::test]
    async fn batch_may_chain_writes_to_one_entity() -> anyhow::Result<()> {
        let registry = seeded().await?;
        registry
            .commit(vec![
                VersionWrite::Device {
                    expected: Some(0),
                    record: device("Edev", "D1", false),
                },
                VersionWrite::Device {
                    expected: Some(1),
                    record: device("Edev", "D1", true),
                },
            ])
            .await?;

        let current = registry.device("Eid", "Edev").await?;
        assert_eq!(current.map(|d| (d.sequence, d.record.revoked)), Some((2, true)));
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_updates_of_one_sequence_admit_one() -> anyhow::Result<()> {
        let registry = Arc::new(seeded().await?);

        let mut handles = Vec::new();
        for n in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry
                    .commit(vec![VersionWrite::Device {
                        expected: Some(0),
                        record: device("Edev", &format!("D{n}"), false),
                    }])
                    .await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.await? {
                Ok(()) => successes += 1,
                Err(err) => assert!(matches!(err, Error::StaleCommitment { sequence: 0, .. })),
            }
        }
        assert_eq!(successes, 1);
        Ok(())
    }
}
