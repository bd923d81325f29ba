//! Build farm scheduling core.
//!
//! Builds are queued as [`models::BuildQueue`] entries, ranked for a builder by
//! [`scheduler::find_build_candidates`] and handed out with
//! [`scheduler::acquire_build_candidate`]. All state lives in the database, any
//! number of dispatchers may work on it concurrently.

pub mod config;
pub mod db;
pub mod estimate;
pub mod farm;
pub mod metrics;
pub mod models;
pub mod registry;
pub mod scheduler;
pub mod schema;

pub use crate::farm::BuildFarm;
