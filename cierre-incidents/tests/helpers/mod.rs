//! Test Helper Utilities
//!
//! Shared fixtures and the recording closure-service mock for cierre-incidents tests

#![allow(dead_code)]

pub mod fixtures;
pub mod mock_api;

pub use fixtures::{classification_incident, element, incident, init_test_logging, wait_until};
pub use mock_api::{Call, MockClosureApi};
