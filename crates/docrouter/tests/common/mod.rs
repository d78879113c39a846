//! Shared test utilities for docrouter integration tests.
//!
//! This module provides:
//! - `TestHarness`: a temp stage directory and an in-memory database
//! - `KeywordAi`: a scripted document-AI fake that counts calls

pub mod fakes;
pub mod harness;

pub use harness::TestHarness;
