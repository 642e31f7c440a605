//! Maps a source tag to its adapter. Replaces the original system's
//! dynamic class dispatch keyed by string with a plain registry of trait
//! objects — polymorphism the dispatcher and collectors use without
//! knowing which concrete adapter backs any given source.

use newsfeed_core::traits::PublisherAdapter;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn PublisherAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn PublisherAdapter>) {
        self.adapters.insert(adapter.source_tag().to_string(), adapter);
    }

    pub fn get(&self, source: &str) -> Option<Arc<dyn PublisherAdapter>> {
        self.adapters.get(source).cloned()
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(|s| s.as_str())
    }
}
