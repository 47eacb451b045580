//! # Waveon Common Library
//!
//! Shared code for the waveon tools including:
//! - Mixing configuration (TOML file, environment, compiled defaults)
//! - Logging configuration
//! - Common error types

pub mod config;
pub mod error;

pub use config::{CombineMode, LoggingConfig, MixConfig};
pub use error::{Error, Result};
