//! Worker-group schedulers: one per stage of the pipeline.

pub mod embedding_scheduler;
pub mod fresh_link_collector;
pub mod historical_link_collector;
pub mod page_fetcher_dispatcher;

pub use embedding_scheduler::{EmbeddingScheduler, EmbeddingSchedulerConfig};
pub use fresh_link_collector::FreshLinkCollector;
pub use historical_link_collector::HistoricalLinkCollector;
pub use page_fetcher_dispatcher::{DispatcherConfig, PageFetcherDispatcher};
