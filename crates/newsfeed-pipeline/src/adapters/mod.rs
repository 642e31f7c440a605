//! Concrete `PublisherAdapter` implementations and the registry that
//! looks one up by source tag.

pub mod archive_adapter;
pub mod registry;
pub mod rss_adapter;

pub use archive_adapter::ArchiveAdapter;
pub use registry::AdapterRegistry;
pub use rss_adapter::{ArticleSelectors, RssAdapter};
