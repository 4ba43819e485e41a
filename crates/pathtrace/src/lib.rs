//! Progressive path tracing: one sample per frame into an accumulation
//! target tied to a single committed scene version.
//!
//! # Invariants
//! - Samples from different scene versions are never mixed. The first trace
//!   against a new version clears the target.
//! - A trace is never submitted while the previous one may still be writing
//!   the accumulation target.

pub mod sample;
pub mod system;

pub use sample::{AccumulationState, SampleBuffer};
pub use system::PathtracingSystem;
