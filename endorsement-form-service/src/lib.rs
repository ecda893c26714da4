pub mod config;
pub mod models;
pub mod service;

pub use config::{DEFAULT_BIND_ADDRESS, DEFAULT_CONFIG_PATH, ServiceConfig};
pub use service::{AppState, build_router};
