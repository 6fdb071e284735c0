pub mod cache_store;
pub mod connection_pool;

pub use cache_store::CacheStore;
pub use connection_pool::ConnectionPool;
