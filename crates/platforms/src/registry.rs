//! Platform bot registry.
//!
//! Holds one adapter instance per supported platform, keyed by the stable
//! platform name. The default registry carries the three built-in
//! adapters; tests substitute their own implementations.

use std::collections::HashMap;
use std::sync::Arc;

use cs_domain::error::{Error, Result};
use cs_domain::types::Platform;

use crate::meet::MeetBot;
use crate::teams::TeamsBot;
use crate::traits::PlatformBot;
use crate::zoom::ZoomBot;

pub struct PlatformRegistry {
    bots: HashMap<Platform, Arc<dyn PlatformBot>>,
}

impl PlatformRegistry {
    /// Registry with the built-in Meet/Teams/Zoom adapters.
    pub fn with_default_bots() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(MeetBot::new()));
        registry.register(Arc::new(TeamsBot::new()));
        registry.register(Arc::new(ZoomBot::new()));
        registry
    }

    pub fn empty() -> Self {
        Self {
            bots: HashMap::new(),
        }
    }

    /// Register an adapter under its own platform key. A later
    /// registration for the same platform replaces the earlier one.
    pub fn register(&mut self, bot: Arc<dyn PlatformBot>) {
        let platform = bot.platform();
        tracing::info!(platform = %platform, "registered platform bot");
        self.bots.insert(platform, bot);
    }

    pub fn get(&self, platform: Platform) -> Result<Arc<dyn PlatformBot>> {
        self.bots.get(&platform).cloned().ok_or_else(|| {
            Error::PermanentConnection(format!("no bot registered for platform {platform}"))
        })
    }

    pub fn len(&self) -> usize {
        self.bots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_covers_all_platforms() {
        let registry = PlatformRegistry::with_default_bots();
        assert_eq!(registry.len(), 3);
        for p in [Platform::Meet, Platform::Teams, Platform::Zoom] {
            assert!(registry.get(p).is_ok());
        }
    }

    #[test]
    fn missing_platform_is_permanent_error() {
        let registry = PlatformRegistry::empty();
        let result = registry.get(Platform::Meet);
        let err = match result {
            Err(err) => err,
            Ok(_) => panic!("expected an error"),
        };
        assert!(!err.is_recoverable());
    }
}
