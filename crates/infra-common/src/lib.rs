//! Common infrastructure for the rtcall crates.
//!
//! - [`logging`]: `tracing` subscriber setup shared by binaries and tests
//! - [`config`]: layered configuration loading (defaults, TOML file, environment)
//! - [`errors`]: the infrastructure error type

pub mod config;
pub mod errors;
pub mod logging;

pub use crate::config::load_layered;
pub use errors::types::{Error, Result};
pub use logging::setup::{log_welcome, parse_log_level, setup_logging, LoggingConfig};
