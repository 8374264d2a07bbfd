//! This crate exists to coordinate versions of `tracing` and friends so that
//! every crate in the workspace logs through the same facade.

// Export these crates publicly so we can have a single reference
pub use tracing;
