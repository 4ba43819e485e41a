//! wgpu implementation of [`pathtracer_render::RenderBackend`].
//!
//! # Invariants
//! - Each scene version owns its own set of device buffers. Nothing is
//!   written into a buffer after its upload submission.
//! - Submission ids come from a fence counter advanced by
//!   `on_submitted_work_done`, so completion is observed in submission order.
//! - A retired scene's buffers are dropped only after the last trace that
//!   bound them has completed.

mod backend;
mod fence;
mod shaders;

pub use backend::{SurfaceTarget, WgpuBackend, DEFAULT_MAX_BOUNCES};
pub use fence::FenceTracker;
