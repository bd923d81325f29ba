//! Matching waiting builds with builders.
//!
//! [`find_build_candidates`] is a pure read, [`acquire_build_candidate`] turns a
//! candidate into a running build without racing other dispatchers.

mod candidates;
mod dispatch;

pub use self::candidates::*;
pub use self::dispatch::*;
