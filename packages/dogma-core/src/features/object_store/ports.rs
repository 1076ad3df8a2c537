//! Object store port (§4.A): append-only content-addressed storage.

use async_trait::async_trait;

use super::domain::Hash;
use crate::error::Result;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store an object's canonical bytes under its own hash. Idempotent:
    /// storing the same bytes twice is a no-op on the second call.
    async fn put(&self, hash: Hash, bytes: Vec<u8>) -> Result<()>;

    async fn get(&self, hash: Hash) -> Result<Option<Vec<u8>>>;

    async fn exists(&self, hash: Hash) -> Result<bool>;
}
