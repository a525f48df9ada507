pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod http;
pub mod insights;
pub mod intervention;
pub mod memory;
pub mod metrics;
pub mod models;
pub mod report;
pub mod risk;
pub mod seed;
pub mod store;
pub mod webhook;

pub use error::{ServiceError, ServiceResult};
pub use http::{build_router, AppState};
pub use memory::MemoryStore;
pub use store::ChurnStore;
