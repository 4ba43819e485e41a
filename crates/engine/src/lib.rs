//! Engine composition core: a fixed set of systems, a dependency-derived
//! frame schedule, world state, and the window frame loop that drives it.
//!
//! # Invariants
//! - `Engine::system::<T>()` returns the same instance for the engine's lifetime.
//! - Update and render run in one deterministic order that respects every
//!   declared dependency; ties follow declaration order.
//! - All update hooks of a frame finish before the first render hook runs.
//! - At most one system writes a given entity's transform per frame.
//! - Shutdown waits for the device to go idle, then tears systems down once,
//!   in reverse initialization order.

pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod input;
pub mod schedule;
pub mod system;
pub mod window;
pub mod world;

pub use clock::{FrameClock, FrameTimer};
pub use config::{ConfigError, EngineConfig, MAX_GPU_WAIT_BUDGET_MS};
pub use diagnostics::{Diagnostic, Diagnostics};
pub use engine::{Engine, EngineBuilder};
pub use error::{EngineError, Phase, SystemError};
pub use input::{InputState, Key, MouseButton, WindowEvent};
pub use schedule::{Edge, Schedule};
pub use system::{FrameContext, RenderContext, System, SystemId, SystemView};
pub use window::{EventSource, LoopControl, PlatformError, ScriptedEvents, Window, WindowConfig};
pub use world::{CameraLens, EntityData, Renderable, World, WorldError};
