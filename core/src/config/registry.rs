//! Runtime polymorphism by string key (§9): the source dispatches on
//! `provider["type"]`. Here that becomes an interface (`NodeProviderFactory`)
//! plus a registry table populated once at startup, rather than a runtime
//! dictionary patch.

use crate::provider::{NodeProvider, NodeProviderFactory};
use std::collections::HashMap;

#[derive(Default)]
pub struct ProviderRegistry {
    factories: HashMap<String, Box<dyn NodeProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: Box<dyn NodeProviderFactory>) -> &mut Self {
        self.factories
            .insert(factory.provider_type().to_string(), factory);
        self
    }

    pub fn lookup(&self, provider_type: &str) -> Option<&dyn NodeProviderFactory> {
        self.factories.get(provider_type).map(|b| b.as_ref())
    }

    pub fn create(&self, provider_type: &str, cluster_name: &str) -> Option<Box<dyn NodeProvider>> {
        self.lookup(provider_type).map(|f| f.create(cluster_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::static_provider::StaticNodeProvider;

    struct OnPremiseFactory;
    impl NodeProviderFactory for OnPremiseFactory {
        fn provider_type(&self) -> &'static str {
            "onpremise"
        }
        fn create(&self, _cluster_name: &str) -> Box<dyn NodeProvider> {
            Box::new(StaticNodeProvider::new())
        }
    }

    #[test]
    fn lookup_returns_none_for_unregistered_type() {
        let registry = ProviderRegistry::new();
        assert!(registry.lookup("aws").is_none());
    }

    #[test]
    fn registered_factory_is_found_by_type() {
        let mut registry = ProviderRegistry::new();
        registry.register(Box::new(OnPremiseFactory));
        assert!(registry.create("onpremise", "test-cluster").is_some());
    }
}
