//! Shared test utilities for jobflow integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated orchestrator runs with temp directories
//! - Builders for configurations, records and submissions

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
