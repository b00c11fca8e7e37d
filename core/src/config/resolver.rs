//! `ConfigResolver::bootstrap` (§4.1): the single entry point that turns a
//! user-supplied config into a fully resolved, provider-canonicalized,
//! cached form.

use super::cache::{canonical_config_hash, cache_version_matches, read_cache, write_cache, CacheCipher, CacheRecord};
use super::error::ConfigError;
use super::model::ClusterConfig;
use super::registry::ProviderRegistry;
use super::validate::{prepare_config, verify_config};
use crate::defaults::{config_cache_dir, config_cache_path, CONFIG_CACHE_VERSION};
use fs::directory_manager::{DirectoryManager, DirectoryManagerFs};
use fs::file::reader::FileReader;
use fs::file::writer::FileWriter;
use fs::file::LocalFile;
use std::path::PathBuf;
use tracing::{info, instrument, warn};

/// Per-runtime config preparation/bootstrap (Spark, MySQL, Redis, ...): the
/// core only ever sees this as an opaque hook (§1 Out of scope), never as a
/// concrete implementation. A no-op default is provided so the resolver is
/// usable without a runtime configured at all.
pub trait RuntimeConfigHook: Send + Sync {
    fn prepare(&self, config: ClusterConfig) -> Result<ClusterConfig, ConfigError> {
        Ok(config)
    }
    fn bootstrap(&self, config: ClusterConfig) -> Result<ClusterConfig, ConfigError> {
        Ok(config)
    }
}

pub struct NoopRuntimeConfigHook;
impl RuntimeConfigHook for NoopRuntimeConfigHook {}

/// Flags accepted by `bootstrap` (§4.1).
#[derive(Debug, Clone, Copy, Default)]
pub struct BootstrapOptions {
    pub no_cache: bool,
    pub init_cache: bool,
    pub skip_runtime: bool,
}

pub struct ConfigResolver<'a> {
    registry: &'a ProviderRegistry,
    runtime_hook: &'a dyn RuntimeConfigHook,
    tmp_dir: PathBuf,
}

impl<'a> ConfigResolver<'a> {
    pub fn new(registry: &'a ProviderRegistry, runtime_hook: &'a dyn RuntimeConfigHook, tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            runtime_hook,
            tmp_dir: tmp_dir.into(),
        }
    }

    /// Implements §4.1 steps 1-7.
    #[instrument(skip_all, fields(cluster_name = %config.cluster_name))]
    pub fn bootstrap(
        &self,
        config: ClusterConfig,
        options: BootstrapOptions,
    ) -> Result<ClusterConfig, ConfigError> {
        // Step 1: already-bootstrapped configs are a fixed point.
        if config.bootstrapped {
            return Ok(config);
        }

        // Step 2: generic normalization.
        let config = prepare_config(config)?;

        // Step 3: canonical hash, used both as the cache key and as the
        // recorded `config_hash`.
        let canonical = serde_json::to_value(&config)?;
        let config_hash = canonical_config_hash(&canonical)?;
        let cache_path = config_cache_path(self.tmp_dir.to_string_lossy().as_ref(), &config_hash);

        // Step 4: cache hit.
        if !options.no_cache {
            if let Some(resolved) = self.try_read_cache(&config, &cache_path)? {
                return Ok(resolved);
            }
        }

        // Step 5: provider lookup + post_prepare + runtime prepare + validate.
        let provider_type = config.provider.provider_type.clone();
        let provider = self
            .registry
            .create(&provider_type, &config.cluster_name)
            .ok_or_else(|| ConfigError::UnsupportedProvider(provider_type.clone()))?;

        let config = provider
            .post_prepare(config)
            .map_err(|err| ConfigError::Validation(err.to_string()))?;

        let config = if options.skip_runtime {
            config
        } else {
            self.runtime_hook.prepare(config)?
        };
        verify_config(&config)?;

        // Step 6: provider-specific canonicalization + runtime bootstrap + verify.
        let config = provider
            .bootstrap_config(config)
            .map_err(|err| ConfigError::Validation(err.to_string()))?;
        let config = if options.skip_runtime {
            config
        } else {
            self.runtime_hook.bootstrap(config)?
        };
        verify_config(&config)?;

        let mut resolved = config;
        resolved.bootstrapped = true;
        resolved.config_hash = Some(config_hash.clone());

        // Step 7: persist, unless caching is disabled.
        if !options.no_cache || options.init_cache {
            self.write_cache(&resolved, &cache_path)?;
        }

        Ok(resolved)
    }

    fn try_read_cache(
        &self,
        config: &ClusterConfig,
        cache_path: &std::path::Path,
    ) -> Result<Option<ClusterConfig>, ConfigError> {
        let Some(record) = read_cache(cache_path) else {
            return Ok(None);
        };
        if !cache_version_matches(&record) {
            warn!(
                found = record.version,
                expected = CONFIG_CACHE_VERSION,
                "config cache version mismatch, re-resolving"
            );
            return Ok(None);
        }
        let cipher = self.cipher_for(&config.cluster_name)?;
        let plaintext = cipher.decrypt(&record.config)?;
        let resolved: ClusterConfig = serde_json::from_slice(&plaintext)?;
        info!("resolved config loaded from cache");
        Ok(Some(resolved))
    }

    fn write_cache(&self, resolved: &ClusterConfig, cache_path: &std::path::Path) -> Result<(), ConfigError> {
        let cipher = self.cipher_for(&resolved.cluster_name)?;
        let plaintext = serde_json::to_vec(resolved)?;
        let ciphertext = cipher.encrypt(&plaintext)?;
        let record = CacheRecord {
            version: CONFIG_CACHE_VERSION,
            provider_log_info: serde_json::Value::Null,
            config: ciphertext,
        };
        write_cache(cache_path, &record)
    }

    /// Per-cluster key derivation: a salt persisted once next to the cache
    /// directory, combined with the cluster name (§4.1, §10.6). Kept
    /// file-based rather than a global secret so two clusters' caches are
    /// not mutually decryptable.
    fn cipher_for(&self, cluster_name: &str) -> Result<CacheCipher, ConfigError> {
        use base64::Engine as _;
        const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

        let cache_dir = config_cache_dir(self.tmp_dir.to_string_lossy().as_ref());
        let salt_path = cache_dir.join(".salt");
        let salt = match LocalFile.read(&salt_path).ok().and_then(|encoded| BASE64.decode(encoded).ok()) {
            Some(bytes) => bytes,
            None => {
                let salt: [u8; 16] = {
                    use sha2::{Digest, Sha256};
                    let mut hasher = Sha256::new();
                    hasher.update(cluster_name.as_bytes());
                    hasher.update(std::process::id().to_le_bytes());
                    let digest = hasher.finalize();
                    digest[..16].try_into().unwrap()
                };
                DirectoryManagerFs
                    .create(&cache_dir)
                    .map_err(|err| ConfigError::Cache(format!("failed to create config cache directory: {err}")))?;
                LocalFile
                    .write(&salt_path, BASE64.encode(salt))
                    .map_err(|err| ConfigError::Cache(format!("failed to persist config cache salt: {err}")))?;
                salt.to_vec()
            }
        };
        Ok(CacheCipher::for_cluster(cluster_name, &salt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{AuthConfig, NodeTypeConfig, ProviderConfig};
    use crate::provider::static_provider::StaticNodeProvider;
    use crate::provider::{NodeProvider, NodeProviderFactory};
    use crate::resources::ResourceBundle;
    use std::collections::BTreeMap;

    struct OnPremiseFactory;
    impl NodeProviderFactory for OnPremiseFactory {
        fn provider_type(&self) -> &'static str {
            "onpremise"
        }
        fn create(&self, _cluster_name: &str) -> Box<dyn NodeProvider> {
            Box::new(StaticNodeProvider::new())
        }
    }

    fn registry() -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register(Box::new(OnPremiseFactory));
        registry
    }

    fn minimal_config(name: &str) -> ClusterConfig {
        let mut available_node_types = BTreeMap::new();
        available_node_types.insert(
            "head".to_string(),
            NodeTypeConfig {
                resources: ResourceBundle::single("CPU", 4.0),
                min_workers: 0,
                max_workers: 1,
                ..Default::default()
            },
        );
        ClusterConfig {
            cluster_name: name.to_string(),
            provider: ProviderConfig {
                provider_type: "onpremise".to_string(),
                ..Default::default()
            },
            auth: AuthConfig {
                ssh_user: "ubuntu".to_string(),
                ssh_private_key: "/keys/id_rsa".to_string(),
                ..Default::default()
            },
            available_node_types,
            head_node_type: "head".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn bootstrap_is_idempotent_on_already_bootstrapped_config() {
        let registry = registry();
        let hook = NoopRuntimeConfigHook;
        let tempdir = tempfile::tempdir().unwrap();
        let resolver = ConfigResolver::new(&registry, &hook, tempdir.path());

        let mut config = minimal_config("idempotent");
        config.bootstrapped = true;
        let resolved = resolver
            .bootstrap(config.clone(), BootstrapOptions::default())
            .unwrap();
        assert_eq!(resolved, config);
    }

    #[test]
    fn bootstrap_sets_hash_and_bootstrapped_flag() {
        let registry = registry();
        let hook = NoopRuntimeConfigHook;
        let tempdir = tempfile::tempdir().unwrap();
        let resolver = ConfigResolver::new(&registry, &hook, tempdir.path());

        let resolved = resolver
            .bootstrap(minimal_config("fresh"), BootstrapOptions::default())
            .unwrap();
        assert!(resolved.bootstrapped);
        assert!(resolved.config_hash.is_some());
    }

    #[test]
    fn second_bootstrap_call_reads_from_cache() {
        let registry = registry();
        let hook = NoopRuntimeConfigHook;
        let tempdir = tempfile::tempdir().unwrap();
        let resolver = ConfigResolver::new(&registry, &hook, tempdir.path());

        let config = minimal_config("cached");
        let first = resolver
            .bootstrap(config.clone(), BootstrapOptions::default())
            .unwrap();
        let second = resolver
            .bootstrap(config, BootstrapOptions::default())
            .unwrap();
        assert_eq!(first, second);

        let cache_dir = config_cache_dir(tempdir.path().to_string_lossy().as_ref());
        let mut entries = std::fs::read_dir(&cache_dir).unwrap();
        assert!(entries.any(|e| e
            .unwrap()
            .file_name()
            .to_string_lossy()
            .starts_with("cloudtik-config-")));
    }

    #[test]
    fn unknown_provider_type_is_fatal() {
        let registry = registry();
        let hook = NoopRuntimeConfigHook;
        let tempdir = tempfile::tempdir().unwrap();
        let resolver = ConfigResolver::new(&registry, &hook, tempdir.path());

        let mut config = minimal_config("bad-provider");
        config.provider.provider_type = "not-a-real-cloud".to_string();
        let err = resolver
            .bootstrap(config, BootstrapOptions::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedProvider(_)));
    }

    #[test]
    fn no_cache_option_skips_persisting_cache_file() {
        let registry = registry();
        let hook = NoopRuntimeConfigHook;
        let tempdir = tempfile::tempdir().unwrap();
        let resolver = ConfigResolver::new(&registry, &hook, tempdir.path());

        resolver
            .bootstrap(
                minimal_config("no-cache"),
                BootstrapOptions {
                    no_cache: true,
                    ..Default::default()
                },
            )
            .unwrap();

        let cache_dir = config_cache_dir(tempdir.path().to_string_lossy().as_ref());
        assert!(!cache_dir.exists() || std::fs::read_dir(&cache_dir).unwrap().next().is_none());
    }
}
