//! # Backscatter-Core
//!
//! Core types, errors and configuration for the CSI backscatter event
//! detector.

pub mod config;
pub mod error;
pub mod types;

pub use self::config::{DetectorConfig, ENV_PREFIX};
pub use error::{Error, Result};
pub use types::*;
