//! L-Store Common - Shared utilities and types
//!
//! This crate provides common functionality used by the storage engine:
//! - Error types and handling
//! - Configuration management
//! - Logging setup and metrics recorders
//! - Record, projection and version type definitions

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod types;

pub use config::Config;
pub use error::{Error, Result, StorageError};
pub use types::*;
