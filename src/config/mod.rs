//! Configuration module for Harvest Engine
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use harvest_engine::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Escalation stops at {} bytes", config.fetch.sufficient_bytes);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    BrowserConfig, CacheConfig, Config, FetchConfig, JobsConfig, ProxyConfig, RateLimitConfig,
    StorageConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
