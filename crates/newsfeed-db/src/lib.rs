pub mod cache;
pub mod database;
pub mod store;

pub use cache::RedisCache;
pub use database::{Database, DatabasePool};
pub use store::PostgresStore;
