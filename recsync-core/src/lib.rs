pub mod catalog;
pub mod config;
pub mod error;
pub mod notify;
pub mod publish;
pub mod store;
pub mod sync;
pub mod transcode;
pub mod transport;

pub use config::{load_recsync_config, RecsyncConfig, SnapshotFormat};
pub use error::{ConfigError, Result};
pub use catalog::{CatalogBrowser, CatalogError, HttpCatalogBrowser};
pub use store::{MetadataSnapshot, MetadataStore};
pub use sync::{SyncEngine, SyncError};
pub use transport::{TransportClient, TransportError};
