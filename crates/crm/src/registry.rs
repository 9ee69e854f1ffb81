//! CRM connector registry, keyed by system name.

use std::collections::HashMap;
use std::sync::Arc;

use cs_domain::config::CrmConfig;
use cs_domain::error::{Error, Result};

use crate::creatio::CreatioConnector;
use crate::hubspot::HubSpotConnector;
use crate::salesforce::SalesforceConnector;
use crate::traits::CrmConnector;

pub struct CrmRegistry {
    connectors: HashMap<String, Arc<dyn CrmConnector>>,
}

impl CrmRegistry {
    /// Registry with the three built-in connectors. Missing API tokens
    /// are logged per connector; the affected system fails at write
    /// time, not at startup.
    pub fn from_config(cfg: &CrmConfig) -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(SalesforceConnector::from_config(cfg)));
        registry.register(Arc::new(HubSpotConnector::from_config(cfg)));
        registry.register(Arc::new(CreatioConnector::from_config(cfg)));
        registry
    }

    pub fn empty() -> Self {
        Self {
            connectors: HashMap::new(),
        }
    }

    pub fn register(&mut self, connector: Arc<dyn CrmConnector>) {
        tracing::info!(system = connector.system(), "registered CRM connector");
        self.connectors
            .insert(connector.system().to_string(), connector);
    }

    pub fn get(&self, system: &str) -> Result<Arc<dyn CrmConnector>> {
        self.connectors
            .get(system)
            .cloned()
            .ok_or_else(|| Error::Validation(format!("unknown CRM system: {system}")))
    }

    pub fn systems(&self) -> Vec<String> {
        let mut systems: Vec<String> = self.connectors.keys().cloned().collect();
        systems.sort();
        systems
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}
