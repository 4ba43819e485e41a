//! Asset loading for the pathtracer: mesh and material files scanned from a
//! directory and published into an [`AssetStore`] under stable handles.
//!
//! Renderables refer to assets by [`AssetName`](pathtracer_common::AssetName)
//! (the file's path below the asset root). The store maps each name to the
//! handle of its current content.
//!
//! # Invariants
//! - A handle is never reissued, even after the content it named is replaced.
//! - A file that fails to load leaves previously published handles untouched.
//! - The store revision advances once per scan that changed anything.

pub mod format;
pub mod store;
pub mod system;

pub use format::{fingerprint, AssetKind, Fingerprint, Material, Mesh};
pub use store::{Asset, AssetError, AssetHandle, AssetStore, LoadFailure, LoadReport};
pub use system::AssetSystem;
