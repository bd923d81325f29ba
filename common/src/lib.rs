//! Value types of the build farm scheduler.
//!
//! Everything here is free of persistence, the `diesel` feature only adds the
//! sqlite column mappings for the enums and resource sets.

pub mod config;
pub mod errors;
pub mod models;
pub mod utils;

pub use crate::models::*;
