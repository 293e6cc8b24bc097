mod repository;
mod server;

pub use repository::{CacheConfig, HistoryConfig, RepositoryConfig, StoreConfig};
pub use server::ServerConfig;
