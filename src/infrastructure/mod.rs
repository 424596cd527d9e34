//! Infrastructure layer
//!
//! Configuration discovery and logging setup shared by the library and the CLI.

pub mod config;
pub mod logging;

pub use config::{CacheConfig, CheckConfig, Config, ConfigError, EvalConfig, LogSettings};
pub use logging::{init_logging, init_dev_logging, init_prod_logging, LogConfig, LogFormat, LogOutput};
