//! Testing utilities for docflow pipelines.
//!
//! This module provides:
//! - Probe-backed mock stages for every role
//! - A registry fixture wiring mocks to identifiers

mod fixtures;
mod mocks;

pub use fixtures::TestRegistry;
pub use mocks::{MockReader, MockRender, MockSource, MockTransform, StageProbe};
