//! Canonical composition of the pathtracer engine.
//!
//! The full engine declares, in order: assets, scene bootstrap, demo,
//! movement, GPU scene and pathtracing. The minimal engine keeps only the
//! asset, GPU scene and pathtracing systems. Both resolve to a schedule in
//! which the GPU scene commits before the pathtracer reads it.

mod bootstrap;
mod compose;

pub use bootstrap::{bootstrap, plan_bootstrap, BootstrapPlan, SceneBootstrap, CAMERA_NAME};
pub use compose::{full_engine, minimal_engine, status_line};
