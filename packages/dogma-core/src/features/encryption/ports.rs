//! Key management service port (§6 external collaborator interfaces):
//! wraps/unwraps raw key bytes under an external key-encryption key. The
//! crate ships only [`infrastructure::LocalKms`], a reference
//! implementation suitable for a single process and for tests; a real
//! deployment plugs in an actual KMS behind this trait.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait KeyManagementService: Send + Sync {
    async fn wrap(&self, key_bytes: &[u8], kek_id: &str) -> Result<Vec<u8>>;

    async fn unwrap(&self, wrapped_bytes: &[u8], kek_id: &str) -> Result<Vec<u8>>;
}
