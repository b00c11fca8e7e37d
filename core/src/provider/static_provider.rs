//! An in-memory `NodeProvider` used for unit/integration tests and for
//! single-box on-premise operation, where there is no cloud API to call and
//! "creating a node" just means allocating a synthetic id bound to
//! `127.0.0.1`. This is the one `NodeProvider` implementation this crate
//! ships; every real cloud adapter lives outside the core (§1).

use super::{CommandExecutor, NodeId, NodeProvider, NodeProviderFactory, ProviderError};
use crate::config::model::ClusterConfig;
use crate::provider::local_executor::LocalCommandExecutor;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

struct NodeRecord {
    tags: BTreeMap<String, String>,
    terminated: bool,
}

/// Static/local reference `NodeProvider`. All state lives in an in-process
/// mutex-guarded map; there is no external API call, so every method is
/// infallible except where the caller asks about an unknown node id.
pub struct StaticNodeProvider {
    nodes: Mutex<BTreeMap<NodeId, NodeRecord>>,
    next_id: AtomicU64,
}

impl Default for StaticNodeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticNodeProvider {
    pub fn new() -> Self {
        Self {
            nodes: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_node_id(&self) -> NodeId {
        format!("node-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

impl NodeProvider for StaticNodeProvider {
    fn non_terminated_nodes(
        &self,
        tag_filters: &BTreeMap<String, String>,
    ) -> Result<Vec<NodeId>, ProviderError> {
        let nodes = self.nodes.lock().unwrap();
        Ok(nodes
            .iter()
            .filter(|(_, record)| !record.terminated)
            .filter(|(_, record)| {
                tag_filters
                    .iter()
                    .all(|(k, v)| record.tags.get(k) == Some(v))
            })
            .map(|(id, _)| id.clone())
            .collect())
    }

    fn is_terminated(&self, node_id: &NodeId) -> Result<bool, ProviderError> {
        let nodes = self.nodes.lock().unwrap();
        nodes
            .get(node_id)
            .map(|record| record.terminated)
            .ok_or_else(|| ProviderError::Permanent(format!("unknown node {node_id}")))
    }

    fn node_tags(&self, node_id: &NodeId) -> Result<BTreeMap<String, String>, ProviderError> {
        let nodes = self.nodes.lock().unwrap();
        nodes
            .get(node_id)
            .map(|record| record.tags.clone())
            .ok_or_else(|| ProviderError::Permanent(format!("unknown node {node_id}")))
    }

    fn set_node_tags(&self, node_id: &NodeId, tags: BTreeMap<String, String>) -> Result<(), ProviderError> {
        let mut nodes = self.nodes.lock().unwrap();
        let record = nodes
            .get_mut(node_id)
            .ok_or_else(|| ProviderError::Permanent(format!("unknown node {node_id}")))?;
        record.tags.extend(tags);
        Ok(())
    }

    fn internal_ip(&self, node_id: &NodeId) -> Result<Option<String>, ProviderError> {
        let nodes = self.nodes.lock().unwrap();
        nodes
            .get(node_id)
            .map(|_| Some("127.0.0.1".to_string()))
            .ok_or_else(|| ProviderError::Permanent(format!("unknown node {node_id}")))
    }

    fn external_ip(&self, node_id: &NodeId) -> Result<Option<String>, ProviderError> {
        self.internal_ip(node_id)
    }

    fn create_nodes(
        &self,
        node_type: &str,
        _node_config: &BTreeMap<String, Value>,
        mut tags: BTreeMap<String, String>,
        count: u32,
    ) -> Result<Vec<NodeId>, ProviderError> {
        let mut nodes = self.nodes.lock().unwrap();
        let mut created = Vec::with_capacity(count as usize);
        tags.insert(
            crate::tags::NODE_TYPE.to_string(),
            node_type.to_string(),
        );
        for _ in 0..count {
            let id = self.next_node_id();
            nodes.insert(
                id.clone(),
                NodeRecord {
                    tags: tags.clone(),
                    terminated: false,
                },
            );
            created.push(id);
        }
        Ok(created)
    }

    fn terminate_node(&self, node_id: &NodeId) -> Result<(), ProviderError> {
        let mut nodes = self.nodes.lock().unwrap();
        let record = nodes
            .get_mut(node_id)
            .ok_or_else(|| ProviderError::Permanent(format!("unknown node {node_id}")))?;
        record.terminated = true;
        Ok(())
    }

    fn get_command_executor(&self, node_id: &NodeId) -> Result<Box<dyn CommandExecutor>, ProviderError> {
        let nodes = self.nodes.lock().unwrap();
        if !nodes.contains_key(node_id) {
            return Err(ProviderError::Permanent(format!("unknown node {node_id}")));
        }
        Ok(Box::new(LocalCommandExecutor::new()))
    }

    fn post_prepare(&self, config: ClusterConfig) -> Result<ClusterConfig, ProviderError> {
        Ok(config)
    }

    fn bootstrap_config(&self, config: ClusterConfig) -> Result<ClusterConfig, ProviderError> {
        Ok(config)
    }

    fn provider_type(&self) -> &str {
        "onpremise"
    }
}

/// Registers `StaticNodeProvider` under the `onpremise` provider type
/// (§6), the one cloud adapter this crate ships directly rather than
/// leaving to an out-of-tree implementation.
pub struct OnpremiseProviderFactory;

impl NodeProviderFactory for OnpremiseProviderFactory {
    fn provider_type(&self) -> &'static str {
        "onpremise"
    }

    fn create(&self, _cluster_name: &str) -> Box<dyn NodeProvider> {
        Box::new(StaticNodeProvider::new())
    }
}
