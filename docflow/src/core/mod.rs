//! Core domain model types for docflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Document events and captured event fragments
//! - Stage roles
//! - Request-scoped stage parameters

mod event;
mod params;
mod status;

pub use event::{DocEvent, EventFragment};
pub use params::Parameters;
pub use status::StageRole;
