use std::any::{Any, TypeId};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use pathtracer_render::RenderBackend;

use crate::config::EngineConfig;
use crate::diagnostics::Diagnostics;
use crate::error::SystemError;
use crate::input::InputState;
use crate::world::World;

/// Type tag of a system. Identity is the concrete type; the name is for logs.
#[derive(Clone, Copy)]
pub struct SystemId {
    type_id: TypeId,
    name: &'static str,
}

impl SystemId {
    pub fn of<T: Any>() -> Self {
        let full = std::any::type_name::<T>();
        let name = full.rsplit("::").next().unwrap_or(full);
        Self {
            type_id: TypeId::of::<T>(),
            name,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for SystemId {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for SystemId {}

impl Hash for SystemId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl PartialOrd for SystemId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SystemId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.type_id.cmp(&other.type_id)
    }
}

impl fmt::Debug for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Downcasting support for boxed systems.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// An independently schedulable unit of per-frame logic.
///
/// Hooks run on the frame-loop thread only. `update` hooks for a frame all
/// complete before the first `render` hook of that frame.
pub trait System: AsAny + 'static {
    /// Systems whose output this system consumes. They are scheduled first.
    /// Dependencies that are not registered in the engine are ignored.
    fn dependencies(&self) -> Vec<SystemId> {
        Vec::new()
    }

    /// Called once, in declaration order, while the engine is built.
    fn init(&mut self, _ctx: &mut FrameContext<'_>) -> Result<(), SystemError> {
        Ok(())
    }

    fn update(&mut self, _ctx: &mut FrameContext<'_>) -> Result<(), SystemError> {
        Ok(())
    }

    fn render(&mut self, _ctx: &mut RenderContext<'_>) -> Result<(), SystemError> {
        Ok(())
    }

    /// Called exactly once, in reverse initialization order, after the GPU has
    /// gone idle.
    fn shutdown(&mut self, _gpu: &mut dyn RenderBackend) {}
}

pub(crate) struct Slot {
    pub(crate) id: SystemId,
    pub(crate) system: Option<Box<dyn System>>,
}

/// Read-only view of the other systems while one system's hook runs.
///
/// The running system itself is not reachable through the view.
#[derive(Clone, Copy)]
pub struct SystemView<'a> {
    slots: &'a [Slot],
    index: &'a HashMap<SystemId, usize>,
}

impl<'a> SystemView<'a> {
    pub(crate) fn new(slots: &'a [Slot], index: &'a HashMap<SystemId, usize>) -> Self {
        Self { slots, index }
    }

    pub fn get<T: System>(&self) -> Option<&'a T> {
        let slots: &'a [Slot] = self.slots;
        let idx = *self.index.get(&SystemId::of::<T>())?;
        let system: &'a dyn System = slots[idx].system.as_deref()?;
        system.as_any().downcast_ref::<T>()
    }

    /// Like [`get`](Self::get), but a missing system is a fatal error.
    pub fn require<T: System>(&self) -> Result<&'a T, SystemError> {
        self.get::<T>()
            .ok_or(SystemError::MissingDependency(SystemId::of::<T>().name()))
    }

    pub fn contains<T: System>(&self) -> bool {
        self.index.contains_key(&SystemId::of::<T>())
    }
}

/// Everything an `init` or `update` hook may touch.
pub struct FrameContext<'a> {
    /// Clamped seconds since the previous frame.
    pub dt: f32,
    pub frame: u64,
    pub config: &'a EngineConfig,
    pub world: &'a mut World,
    pub input: &'a InputState,
    pub gpu: &'a mut dyn RenderBackend,
    pub systems: SystemView<'a>,
    pub diagnostics: &'a mut Diagnostics,
    pub(crate) current: SystemId,
}

impl FrameContext<'_> {
    /// Id of the system whose hook is running. Used as the writer identity
    /// for transform ownership.
    pub fn current(&self) -> SystemId {
        self.current
    }

    /// Record a recoverable problem without failing the hook.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(system = self.current.name(), "{message}");
        self.diagnostics.record(self.frame, self.current.name(), message);
    }
}

/// Everything a `render` hook may touch. World state is read-only.
pub struct RenderContext<'a> {
    pub frame: u64,
    pub config: &'a EngineConfig,
    pub world: &'a World,
    pub input: &'a InputState,
    pub gpu: &'a mut dyn RenderBackend,
    pub systems: SystemView<'a>,
    pub diagnostics: &'a mut Diagnostics,
    pub(crate) current: SystemId,
}

impl RenderContext<'_> {
    pub fn current(&self) -> SystemId {
        self.current
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(system = self.current.name(), "{message}");
        self.diagnostics.record(self.frame, self.current.name(), message);
    }
}
