//! Shared test utilities for joblog integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated test execution over a temporary store directory
//! - Builders for templates, configs and a canned classifier

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
