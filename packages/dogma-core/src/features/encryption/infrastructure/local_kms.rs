//! Reference [`KeyManagementService`]: holds one AES-256-GCM-SIV key per
//! `kek_id`, generated on first use and kept only in process memory. A
//! real deployment replaces this with a client for an actual KMS; this
//! exists so the envelope-encryption path (§4.G) is exercisable without
//! one, matching spec §6's "external collaborator" framing.

use aes_gcm_siv::aead::{Aead, KeyInit, Payload};
use aes_gcm_siv::{Aes256GcmSiv, Key, Nonce};
use dashmap::DashMap;
use rand::RngCore;

use super::super::ports::KeyManagementService;
use crate::error::{DogmaError, Result};

const KEK_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Default)]
pub struct LocalKms {
    keks: DashMap<String, [u8; KEK_LEN]>,
}

impl LocalKms {
    pub fn new() -> Self {
        Self::default()
    }

    fn kek_for(&self, kek_id: &str) -> [u8; KEK_LEN] {
        *self.keks.entry(kek_id.to_string()).or_insert_with(|| {
            let mut bytes = [0u8; KEK_LEN];
            rand::thread_rng().fill_bytes(&mut bytes);
            bytes
        })
    }
}

#[async_trait::async_trait]
impl KeyManagementService for LocalKms {
    async fn wrap(&self, key_bytes: &[u8], kek_id: &str) -> Result<Vec<u8>> {
        let kek = self.kek_for(kek_id);
        let cipher = Aes256GcmSiv::new(Key::<Aes256GcmSiv>::from_slice(&kek));
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, Payload { msg: key_bytes, aad: kek_id.as_bytes() })
            .map_err(|e| DogmaError::Storage(format!("kms wrap failed: {e}")))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    async fn unwrap(&self, wrapped_bytes: &[u8], kek_id: &str) -> Result<Vec<u8>> {
        if wrapped_bytes.len() < NONCE_LEN {
            return Err(DogmaError::Storage("wrapped key too short".into()));
        }
        let kek = self.kek_for(kek_id);
        let cipher = Aes256GcmSiv::new(Key::<Aes256GcmSiv>::from_slice(&kek));
        let (nonce_bytes, ciphertext) = wrapped_bytes.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        cipher
            .decrypt(nonce, Payload { msg: ciphertext, aad: kek_id.as_bytes() })
            .map_err(|e| DogmaError::Storage(format!("kms unwrap failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wrap_then_unwrap_round_trips() {
        let kms = LocalKms::new();
        let key = b"0123456789abcdef0123456789abcdef".to_vec();
        let wrapped = kms.wrap(&key, "kek-1").await.unwrap();
        assert_ne!(wrapped, key);
        let unwrapped = kms.unwrap(&wrapped, "kek-1").await.unwrap();
        assert_eq!(unwrapped, key);
    }

    #[tokio::test]
    async fn unwrap_with_wrong_kek_fails() {
        let kms = LocalKms::new();
        let key = b"0123456789abcdef0123456789abcdef".to_vec();
        let wrapped = kms.wrap(&key, "kek-1").await.unwrap();
        assert!(kms.unwrap(&wrapped, "kek-2").await.is_err());
    }

    #[tokio::test]
    async fn same_kek_id_is_stable_across_calls() {
        let kms = LocalKms::new();
        let a = kms.wrap(b"key-a", "kek-shared").await.unwrap();
        let b = kms.unwrap(&a, "kek-shared").await.unwrap();
        assert_eq!(b, b"key-a");
    }
}
