use std::collections::{BTreeSet, HashMap};
use time::OffsetDateTime;

/// Map whose entries carry an expiry and can be swept in expiry order.
#[derive(Debug)]
pub(crate) struct ExpiringMap<V> {
    entries: HashMap<String, (OffsetDateTime, V)>,
    by_expiry: BTreeSet<(OffsetDateTime, String)>,
}

impl<V> Default for ExpiringMap<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            by_expiry: BTreeSet::new(),
        }
    }
}

impl<V> ExpiringMap<V> {
    /// Drop every entry that expired strictly before `now`.
    pub(crate) fn sweep(&mut self, now: OffsetDateTime) {
        while let Some((expiry, _)) = self.by_expiry.first() {
            if *expiry >= now {
                break;
            }
            if let Some((_, key)) = self.by_expiry.pop_first() {
                self.entries.remove(&key);
            }
        }
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub(crate) fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.entries.get_mut(key).map(|(_, value)| value)
    }

    pub(crate) fn insert(&mut self, key: &str, expiry: OffsetDateTime, value: V) {
        if let Some((previous, _)) = self.entries.insert(key.to_string(), (expiry, value)) {
            self.by_expiry.remove(&(previous, key.to_string()));
        }
        self.by_expiry.insert((expiry, key.to_string()));
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
