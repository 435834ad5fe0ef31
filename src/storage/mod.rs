//! Reference storage collaborators: in-memory stores for single-node use
//! and tests, PostgreSQL stores shared between instances, and verification
//! key feeds.

mod expiry;
pub mod keys;
pub mod memory;
pub mod nonces;
pub mod postgres;

pub use keys::{HttpVerificationKeyStore, KeySet, MemoryVerificationKeyStore};
pub use memory::MemoryRegistry;
pub use nonces::{MemoryChallengeStore, MemoryTimeLockStore};
pub use postgres::{PostgresChallengeStore, PostgresRegistry, PostgresTimeLockStore};
