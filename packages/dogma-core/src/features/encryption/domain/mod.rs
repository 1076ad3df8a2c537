//! Encryption-substrate value types (§4.G): key paths, versions, and the
//! small binary structures stored in the `wdek`/`encryption_metadata`
//! column families.

pub const DEK_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;

pub type Dek = [u8; DEK_LEN];
pub type Nonce = [u8; NONCE_LEN];

/// Metadata stored per logical key in `encryption_metadata`: the DEK
/// version used to encrypt it and the nonce, per §4.G's layout ("key
/// version (4 bytes) + nonce (12 bytes)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionMetadata {
    pub version: u32,
    pub nonce: Nonce,
}

impl EncryptionMetadata {
    pub fn new(version: u32, nonce: Nonce) -> Self {
        Self { version, nonce }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + NONCE_LEN);
        out.extend_from_slice(&self.version.to_be_bytes());
        out.extend_from_slice(&self.nonce);
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 4 + NONCE_LEN {
            return None;
        }
        let mut version_bytes = [0u8; 4];
        version_bytes.copy_from_slice(&bytes[0..4]);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[4..4 + NONCE_LEN]);
        Some(Self {
            version: u32::from_be_bytes(version_bytes),
            nonce,
        })
    }
}

/// `wdeks/<project>/<repo>/<version>` — a version's wrapped DEK.
pub fn wdek_key(project: &str, repo: &str, version: u32) -> Vec<u8> {
    format!("wdeks/{project}/{repo}/{version}").into_bytes()
}

/// `wdeks/<project>/<repo>/current` — the version currently in use.
pub fn wdek_current_key(project: &str, repo: &str) -> Vec<u8> {
    format!("wdeks/{project}/{repo}/current").into_bytes()
}

pub fn wdek_prefix(project: &str, repo: &str) -> Vec<u8> {
    format!("wdeks/{project}/{repo}/").into_bytes()
}

/// `session/master/<version>` and its companion salt.
pub fn session_master_key(version: u32) -> Vec<u8> {
    format!("session/master/{version}").into_bytes()
}

pub fn session_master_salt_key(version: u32) -> Vec<u8> {
    format!("session/master/{version}/salt").into_bytes()
}

pub fn session_master_current_key() -> Vec<u8> {
    b"session/master/current".to_vec()
}

/// `project/repo/objs/<hash-hex>` metadata key for an object.
pub fn object_metadata_key(project: &str, repo: &str, hash_hex: &str) -> String {
    format!("{project}/{repo}/objs/{hash_hex}")
}

/// `project/repo/<ref-or-rev>` metadata key for a ref/revision mapping,
/// e.g. `HEAD`, `refs/<name>`, or `rev2sha/<u32>`.
pub fn object_id_metadata_key(project: &str, repo: &str, ref_or_rev: &str) -> String {
    format!("{project}/{repo}/{ref_or_rev}")
}

pub fn repository_metadata_prefix(project: &str, repo: &str) -> String {
    format!("{project}/{repo}/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encryption_metadata_round_trips() {
        let meta = EncryptionMetadata::new(3, [7u8; NONCE_LEN]);
        let encoded = meta.encode();
        assert_eq!(EncryptionMetadata::decode(&encoded), Some(meta));
    }

    #[test]
    fn truncated_metadata_fails_to_decode() {
        assert_eq!(EncryptionMetadata::decode(&[1, 2, 3]), None);
    }
}
