//! Infrastructure layer - HTTP clients, sqlite persistence, config, logging
//!
//! Concrete implementations of the domain service and repository traits:
//! the reqwest-backed carrier/registry/upload clients and the sqlite
//! repositories, plus configuration loading and logging initialization.

pub mod carrier_client;
pub mod config;
pub mod credential_repository;
pub mod database_connection;
pub mod logging;
pub mod order_repository;
pub mod partner_repository;
pub mod registry_client;
pub mod upload_client;

// Re-export commonly used items
pub use carrier_client::CarrierClient;
pub use config::AppConfig;
pub use credential_repository::{SqliteCredentialRepository, SqliteRoutingRepository};
pub use database_connection::DatabaseConnection;
pub use logging::{init_logging, init_logging_with_config};
pub use order_repository::SqliteOrderRepository;
pub use partner_repository::SqlitePartnerMirrorRepository;
pub use registry_client::RegistryClient;
pub use upload_client::UploadClient;
