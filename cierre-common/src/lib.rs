//! # Cierre Common Library
//!
//! Shared code for the closure-review clients:
//! - Error types
//! - Bootstrap configuration (TOML / environment / CLI resolution)
//! - Event types and the broadcast EventBus
//! - Tracing subscriber setup

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
