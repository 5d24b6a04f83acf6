//! Common types, traits, and error definitions for stomp_planner
//!
//! This module provides the data model of a planning request and the
//! interfaces of the collaborators (robot model, optimizer, IK solver,
//! collision model, time parameterizer) a planning session consumes.

pub mod types;
pub mod traits;
pub mod error;

pub use types::*;
pub use traits::*;
pub use error::*;
