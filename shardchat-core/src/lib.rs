pub mod api;
pub mod config;
pub mod logging;
pub mod store;

pub use api::Dispatcher;
pub use config::Config;
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogLevel};
pub use store::Stores;
