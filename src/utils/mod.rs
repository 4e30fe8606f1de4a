//! Utils Module - Shared Helpers
//!
//! Response cache, log decoder and application-wide constants.

pub mod cache;
pub mod constants;
pub mod decoder;

pub use cache::*;
pub use constants::*;
