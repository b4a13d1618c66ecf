//! Configuration management for imagefetch
//!
//! Settings are layered, lowest priority first:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. `.env` file
//! 4. Environment variables
//!
//! # Usage
//!
//! ```no_run
//! use imagefetch::config::Config;
//!
//! let config = Config::load(None).expect("Failed to load configuration");
//! println!("Saving images to: {}", config.output.directory.display());
//! ```
//!
//! # Environment Variables
//!
//! Any key can be overridden with `IMAGEFETCH__<section>__<key>`:
//! - `IMAGEFETCH__DOWNLOAD__MAX_RETRIES=5`
//! - `IMAGEFETCH__DOWNLOAD__MAX_IMAGE_BYTES=10MB`
//! - `IMAGEFETCH__OUTPUT__DIRECTORY=/srv/images`
//!
//! # Configuration File
//!
//! Read from `config/imagefetch.toml` unless `IMAGEFETCH_CONFIG` or an
//! explicit path says otherwise. A missing file is not an error.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{Config, DownloadConfig, LoggingConfig, OutputConfig};
pub use validation::ValidationError;

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources, validating the result
    ///
    /// `path` replaces the `IMAGEFETCH_CONFIG` / default file location.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed or a value fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = sources::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path, skipping `.env`
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Re-check invariants, e.g. after CLI overrides were applied
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate(self)
    }
}
