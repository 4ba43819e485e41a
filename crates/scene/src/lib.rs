//! GPU scene: the device-resident derivation of loaded assets and entity
//! transforms, rebuilt and versioned by [`GpuSceneSystem`].
//!
//! # Invariants
//! - Derivation is deterministic: the same store and world give the same scene.
//! - The version advances exactly when the asset revision or world revision
//!   changed since the previous build.
//! - Readers only see a committed version, and a version is committed only
//!   after its upload has completed on the device.
//! - Superseded versions are retired; the backend frees them once the last
//!   submission that read them has completed.

pub mod accel;
pub mod build;
pub mod system;

pub use accel::{build_bvh, Aabb, BvhStats};
pub use build::{derive_scene, SceneBuild, SceneError};
pub use system::{CommittedScene, GpuSceneSystem};
