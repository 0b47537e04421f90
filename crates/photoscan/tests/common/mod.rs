//! Shared test utilities for photoscan integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring an orchestrator to temp directories and a store
//! - `FakeTool`, a scripted stand-in for the reconstruction program
//! - Builders for photo sets and point cloud files

pub mod builders;
pub mod fake_tool;
pub mod harness;

pub use builders::*;
pub use fake_tool::{FakeTool, StageScript};
pub use harness::{standard_box, TestHarness};
