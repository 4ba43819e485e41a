//! Rendering adapter: renderer-agnostic GPU interface.
//!
//! # Invariants
//! - Every GPU submission returns a [`SubmissionId`]; ids increase monotonically
//!   and complete in submission order.
//! - A scene allocation is addressed by its version and is immutable once uploaded.
//! - Retired scene allocations are freed only after the last submission that
//!   read them has completed.
//!
//! [`HeadlessBackend`] implements the interface without a device so the frame
//! scheduling core can be exercised in tests and in the CLI.

mod backend;
mod headless;
mod scene_data;

pub use backend::{BackendError, RenderBackend, SubmissionId, TracePass};
pub use headless::{BackendEvent, HeadlessBackend, HeadlessControl, Journal};
pub use scene_data::{BvhNode, GpuCamera, GpuMaterial, GpuTriangle, SceneData};
