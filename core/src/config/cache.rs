use super::error::ConfigError;
use crate::defaults::CONFIG_CACHE_VERSION;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine as _;
use fs::directory_manager::{DirectoryManager, DirectoryManagerFs};
use fs::file::reader::FileReader;
use fs::file::writer::FileWriter;
use fs::file::LocalFile;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;

const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// On-disk representation of the config cache file (§6): `_version` guards
/// against reading a cache written by an incompatible resolver, and
/// `provider_log_info` carries ancillary provider state restored alongside
/// the config on a cache hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    #[serde(rename = "_version")]
    pub version: u32,
    pub provider_log_info: Value,
    /// base64(nonce || aes_gcm_ciphertext(json(config)))
    pub config: String,
}

/// Derives a per-cluster AES-256-GCM key and handles the encrypt/decrypt +
/// base64 envelope around the cached config. The key is deterministic from
/// the cluster name and a salt persisted next to the cache directory, so the
/// cache survives process restarts without needing a separate secrets store.
pub struct CacheCipher {
    cipher: Aes256Gcm,
}

impl CacheCipher {
    pub fn for_cluster(cluster_name: &str, salt: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(cluster_name.as_bytes());
        hasher.update(salt);
        let key_bytes = hasher.finalize();
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, ConfigError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| ConfigError::Cache(format!("encryption failed: {e}")))?;
        let mut payload = nonce.to_vec();
        payload.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(payload))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>, ConfigError> {
        let payload = BASE64
            .decode(encoded)
            .map_err(|e| ConfigError::Cache(format!("invalid base64 in cache: {e}")))?;
        if payload.len() < 12 {
            return Err(ConfigError::Cache("cache payload too short".to_string()));
        }
        let (nonce_bytes, ciphertext) = payload.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| ConfigError::Cache(format!("decryption failed: {e}")))
    }
}

/// Canonical JSON hash used both as the cache-file key and as the
/// `config_hash` recorded on the resolved config (§4.1 step 3). Keys are
/// sorted because `serde_json::Value` from a `BTreeMap`/struct already
/// serializes in a stable order; whitespace is eliminated by using the
/// compact writer.
pub fn canonical_config_hash(config: &Value) -> Result<String, ConfigError> {
    let canonical = serde_json::to_vec(config)?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Reads a cache record from `path`, if present. A missing file or one that
/// fails to parse is reported as `Ok(None)` rather than an error: per the
/// fallback policy in §7, the cache subsystem never raises on a missing or
/// corrupt file.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn read_cache(path: &Path) -> Option<CacheRecord> {
    let contents = LocalFile.read(path).ok()?;
    match serde_json::from_str::<CacheRecord>(&contents) {
        Ok(record) => Some(record),
        Err(err) => {
            tracing::warn!(error = %err, "failed to parse config cache file, ignoring");
            None
        }
    }
}

/// Writes `record` to `path` with file permission 0o600 (Unix) or an
/// administrators-only ACL (Windows), creating the parent `configs/`
/// directory if needed. Delegates to the `fs` crate's `LocalFile` so the
/// cache shares the same cross-platform restricted-permission behavior as
/// every other sensitive file this control plane writes.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn write_cache(path: &Path, record: &CacheRecord) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        DirectoryManagerFs
            .create(parent)
            .map_err(|err| ConfigError::Cache(format!("failed to create config cache directory: {err}")))?;
    }
    let json = serde_json::to_string(record)?;
    LocalFile
        .write(path, json)
        .map_err(|err| ConfigError::Cache(format!("failed to write config cache file: {err}")))?;
    Ok(())
}

pub fn cache_version_matches(record: &CacheRecord) -> bool {
    record.version == CONFIG_CACHE_VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trips() {
        let cipher = CacheCipher::for_cluster("my-cluster", b"fixed-test-salt");
        let plaintext = br#"{"cluster_name":"my-cluster"}"#;
        let encoded = cipher.encrypt(plaintext).unwrap();
        let decoded = cipher.decrypt(&encoded).unwrap();
        assert_eq!(decoded, plaintext);
    }

    #[test]
    fn different_clusters_derive_different_keys() {
        let a = CacheCipher::for_cluster("cluster-a", b"salt");
        let b = CacheCipher::for_cluster("cluster-b", b"salt");
        let encoded = a.encrypt(b"secret").unwrap();
        assert!(b.decrypt(&encoded).is_err());
    }

    #[test]
    fn canonical_hash_is_stable_for_equal_values() {
        let v1: Value = serde_json::json!({"a": 1, "b": 2});
        let v2: Value = serde_json::json!({"a": 1, "b": 2});
        assert_eq!(
            canonical_config_hash(&v1).unwrap(),
            canonical_config_hash(&v2).unwrap()
        );
    }

    #[test]
    fn write_then_read_cache_round_trips_with_0600_permissions() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("configs").join("cloudtik-config-abc");
        let record = CacheRecord {
            version: CONFIG_CACHE_VERSION,
            provider_log_info: serde_json::json!({"foo": "bar"}),
            config: "ciphertext".to_string(),
        };
        write_cache(&path, &record).unwrap();

        #[cfg(target_family = "unix")]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }

        let read_back = read_cache(&path).unwrap();
        assert_eq!(read_back.version, CONFIG_CACHE_VERSION);
        assert_eq!(read_back.config, "ciphertext");
    }

    #[test]
    fn missing_cache_file_is_none_not_error() {
        assert!(read_cache(Path::new("/nonexistent/path/to/cache")).is_none());
    }
}
