//! Adapters, embedders, vector store, schedulers, and broker satisfiers
//! that implement the capability contracts declared in `newsfeed-core`.

pub mod adapters;
pub mod broker;
pub mod embed;
pub mod schedulers;
pub mod vector;

pub use adapters::AdapterRegistry;
pub use broker::{InProcessQueue, StorePollingQueue};
pub use embed::{LocalEmbedder, RemoteEmbedder};
pub use schedulers::{
    DispatcherConfig, EmbeddingScheduler, EmbeddingSchedulerConfig, FreshLinkCollector,
    HistoricalLinkCollector, PageFetcherDispatcher,
};
pub use vector::LanceVectorStore;
