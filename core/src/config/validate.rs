//! Generic (provider-independent) normalization and validation (§4.1 steps
//! 2 and 6): `prepare_config` fills defaults and expands shorthands before a
//! provider ever sees the config; `verify_config` is the final sanity check
//! run after provider/runtime bootstrap has had a chance to fill in
//! cloud-specific fields.

use super::error::ConfigError;
use super::model::ClusterConfig;

/// Fills defaults and enforces presence of the sections every config needs
/// regardless of provider. Shorthand expansion (e.g. a single node type
/// implying both head and worker) is intentionally out of scope for this
/// core — it belongs to the CLI/config-loading layer named out of scope in
/// §1 — but the structural defaults every resolved config must carry live
/// here.
pub fn prepare_config(mut config: ClusterConfig) -> Result<ClusterConfig, ConfigError> {
    if config.cluster_name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "cluster_name must not be empty".to_string(),
        ));
    }
    if config.provider.provider_type.trim().is_empty() {
        return Err(ConfigError::Validation(
            "provider.type must be set".to_string(),
        ));
    }
    if config.head_node_type.trim().is_empty() {
        return Err(ConfigError::Validation(
            "head_node_type must be set".to_string(),
        ));
    }
    if !config
        .available_node_types
        .contains_key(&config.head_node_type)
    {
        return Err(ConfigError::Validation(format!(
            "head_node_type `{}` is not present in available_node_types",
            config.head_node_type
        )));
    }
    for (name, node_type) in config.available_node_types.iter_mut() {
        if node_type.min_workers > node_type.max_workers {
            return Err(ConfigError::Validation(format!(
                "node type `{name}`: min_workers ({}) exceeds max_workers ({})",
                node_type.min_workers, node_type.max_workers
            )));
        }
    }
    Ok(config)
}

/// Final check after both generic and provider-specific normalization have
/// run. Anything still missing here is a bug in either `prepare_config` or
/// the provider's `bootstrap_config`, not a user error, so it's a hard
/// validation failure rather than a missing-dependency message.
pub fn verify_config(config: &ClusterConfig) -> Result<(), ConfigError> {
    if config.auth.ssh_user.trim().is_empty() {
        return Err(ConfigError::Validation(
            "auth.ssh_user must be set".to_string(),
        ));
    }
    if config.auth.ssh_private_key.trim().is_empty() {
        return Err(ConfigError::Validation(
            "auth.ssh_private_key must be set".to_string(),
        ));
    }
    for (name, node_type) in &config.available_node_types {
        if node_type.resources.is_empty() {
            return Err(ConfigError::Validation(format!(
                "node type `{name}` declares no resources"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{AuthConfig, NodeTypeConfig, ProviderConfig};
    use crate::resources::ResourceBundle;
    use std::collections::BTreeMap;

    fn minimal_config() -> ClusterConfig {
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
            cluster_name: "test".to_string(),
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
    fn prepare_rejects_missing_head_node_type() {
        let mut config = minimal_config();
        config.head_node_type = "missing".to_string();
        assert!(prepare_config(config).is_err());
    }

    #[test]
    fn prepare_rejects_inverted_worker_bounds() {
        let mut config = minimal_config();
        config
            .available_node_types
            .get_mut("head")
            .unwrap()
            .min_workers = 5;
        assert!(prepare_config(config).is_err());
    }

    #[test]
    fn verify_rejects_missing_auth() {
        let mut config = minimal_config();
        config.auth.ssh_user.clear();
        assert!(verify_config(&config).is_err());
    }

    #[test]
    fn verify_accepts_minimal_config() {
        let config = prepare_config(minimal_config()).unwrap();
        assert!(verify_config(&config).is_ok());
    }
}
