//! Process-wide cache of [`LogicalModel`]s. Single writer (the refresh that
//! runs at startup and on the admin reload hook), many lock-free readers via
//! `ArcSwap`, matching the teacher's shared-cache idiom generalized from a
//! `DashMap` of individual entries to one versioned snapshot of the whole set
//! — the catalog is small and always read in full by the selector, so a
//! single swap avoids per-entry lock contention without losing anything.

use crate::models::LogicalModel;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;

pub struct LogicalModelCatalog {
    snapshot: ArcSwap<HashMap<String, LogicalModel>>,
}

impl LogicalModelCatalog {
    pub fn new(models: Vec<LogicalModel>) -> Self {
        let map = models.into_iter().map(|m| (m.logical_id.clone(), m)).collect();
        Self {
            snapshot: ArcSwap::from_pointee(map),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn get(&self, logical_id: &str) -> Option<Arc<LogicalModel>> {
        let snapshot = self.snapshot.load();
        snapshot.get(logical_id).map(|m| Arc::new(m.clone()))
    }

    /// Write-through refresh: readers either see the old snapshot or the new
    /// one in full, never a partially updated set.
    pub fn refresh(&self, models: Vec<LogicalModel>) {
        let map = models.into_iter().map(|m| (m.logical_id.clone(), m)).collect();
        self.snapshot.store(Arc::new(map));
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LogicalModelCatalog {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApiStyle, Capability, PhysicalModel, Transport};
    use std::collections::HashSet;

    fn sample(id: &str, enabled: bool) -> LogicalModel {
        LogicalModel {
            logical_id: id.to_string(),
            capabilities: HashSet::from([Capability::Chat]),
            enabled,
            upstreams: vec![PhysicalModel {
                provider_id: "openai".to_string(),
                model_id: "gpt-4o".to_string(),
                endpoint: "https://api.openai.com/v1".to_string(),
                base_weight: 1.0,
                region: None,
                max_qps: None,
                api_style: ApiStyle::OpenAi,
                transport: Transport::Http,
                capabilities: HashSet::from([Capability::Chat]),
                enabled: true,
            }],
        }
    }

    #[test]
    fn refresh_replaces_the_whole_snapshot() {
        let catalog = LogicalModelCatalog::new(vec![sample("gpt-4", true)]);
        assert!(catalog.get("gpt-4").is_some());
        assert!(catalog.get("claude-3").is_none());

        catalog.refresh(vec![sample("claude-3", true)]);
        assert!(catalog.get("gpt-4").is_none());
        assert!(catalog.get("claude-3").is_some());
    }
}
