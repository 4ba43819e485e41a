use std::collections::HashMap;

use pathtracer_render::{BackendError, RenderBackend};

use crate::config::EngineConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{EngineError, Phase, SystemError};
use crate::input::{InputState, WindowEvent};
use crate::schedule::{Edge, Schedule};
use crate::system::{FrameContext, RenderContext, Slot, System, SystemId, SystemView};
use crate::world::World;

/// Declares the system set and ordering of an [`Engine`].
pub struct EngineBuilder {
    config: EngineConfig,
    world: World,
    slots: Vec<Slot>,
    edges: Vec<Edge>,
    duplicate: Option<&'static str>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            world: World::new(),
            slots: Vec::new(),
            edges: Vec::new(),
            duplicate: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Start from an existing world instead of an empty one.
    pub fn with_world(mut self, world: World) -> Self {
        self.world = world;
        self
    }

    /// Register a system. Declaration order is init order and the schedule's
    /// tie-breaker.
    pub fn with_system<S: System>(mut self, system: S) -> Self {
        let id = SystemId::of::<S>();
        if self.slots.iter().any(|slot| slot.id == id) {
            self.duplicate.get_or_insert(id.name());
            return self;
        }
        self.slots.push(Slot {
            id,
            system: Some(Box::new(system)),
        });
        self
    }

    /// Declare that `B` consumes output of `A`, in addition to the
    /// dependencies the systems report themselves.
    pub fn order<A: System, B: System>(mut self) -> Self {
        self.edges.push(Edge {
            before: SystemId::of::<A>(),
            after: SystemId::of::<B>(),
        });
        self
    }

    /// Resolve the schedule and initialize every system in declaration order.
    ///
    /// If a system fails fatally during init, the systems already initialized
    /// are shut down in reverse order before the error is returned.
    pub fn build(self, gpu: Box<dyn RenderBackend>) -> Result<Engine, EngineError> {
        if let Some(name) = self.duplicate {
            return Err(EngineError::DuplicateSystem(name));
        }

        let ids: Vec<SystemId> = self.slots.iter().map(|slot| slot.id).collect();
        let mut edges = self.edges;
        for slot in &self.slots {
            if let Some(system) = slot.system.as_deref() {
                edges.extend(system.dependencies().into_iter().map(|dep| Edge {
                    before: dep,
                    after: slot.id,
                }));
            }
        }
        let schedule = Schedule::resolve(&ids, &edges)?;
        let index = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        tracing::info!(
            backend = gpu.name(),
            systems = ?schedule.order().iter().map(|&i| ids[i]).collect::<Vec<_>>(),
            "engine schedule resolved"
        );

        let diagnostics = Diagnostics::new(self.config.diagnostics_capacity);
        let mut engine = Engine {
            config: self.config,
            world: self.world,
            input: InputState::new(),
            diagnostics,
            slots: self.slots,
            index,
            schedule,
            gpu,
            frame: 0,
            initialized: 0,
            shut_down: false,
        };

        for idx in 0..engine.slots.len() {
            let result = engine.run_hook(idx, Phase::Init, 0.0);
            if !matches!(&result, Err(err) if err.is_fatal()) {
                engine.initialized = idx + 1;
            }
            if let Err(err) = result {
                engine.handle_failure(idx, Phase::Init, err)?;
            }
        }
        Ok(engine)
    }
}

/// A fixed set of systems driven in dependency order.
///
/// Systems live in boxes that never move after [`EngineBuilder::build`], so
/// typed lookups return the same instance for the engine's whole lifetime.
pub struct Engine {
    config: EngineConfig,
    world: World,
    input: InputState,
    diagnostics: Diagnostics,
    slots: Vec<Slot>,
    index: HashMap<SystemId, usize>,
    schedule: Schedule,
    gpu: Box<dyn RenderBackend>,
    frame: u64,
    initialized: usize,
    shut_down: bool,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn system<T: System>(&self) -> Option<&T> {
        SystemView::new(&self.slots, &self.index).get::<T>()
    }

    pub fn system_mut<T: System>(&mut self) -> Option<&mut T> {
        let idx = *self.index.get(&SystemId::of::<T>())?;
        let system: &mut dyn System = self.slots[idx].system.as_deref_mut()?;
        system.as_any_mut().downcast_mut::<T>()
    }

    pub fn require<T: System>(&self) -> Result<&T, EngineError> {
        self.system::<T>()
            .ok_or(EngineError::MissingSystem(SystemId::of::<T>().name()))
    }

    /// Resolved update/render order.
    pub fn schedule(&self) -> Vec<SystemId> {
        self.schedule
            .order()
            .iter()
            .map(|&idx| self.slots[idx].id)
            .collect()
    }

    pub fn schedule_names(&self) -> Vec<&'static str> {
        self.schedule().into_iter().map(|id| id.name()).collect()
    }

    pub fn system_count(&self) -> usize {
        self.slots.len()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn input(&self) -> &InputState {
        &self.input
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn backend(&self) -> &dyn RenderBackend {
        self.gpu.as_ref()
    }

    pub fn backend_mut(&mut self) -> &mut dyn RenderBackend {
        self.gpu.as_mut()
    }

    /// Frames updated so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Feed one window event into the input state. Resizes reach the backend
    /// immediately.
    pub fn handle_event(&mut self, event: &WindowEvent) -> Result<(), EngineError> {
        if let WindowEvent::Resized { width, height } = *event {
            tracing::debug!(width, height, "resize");
            if let Err(err) = self.gpu.resize(width, height) {
                self.backend_failure("resize", err)?;
            }
        }
        self.input.apply(event);
        Ok(())
    }

    /// Run every update hook in schedule order.
    pub fn update(&mut self, dt: f32) -> Result<(), EngineError> {
        self.ensure_running()?;
        self.frame += 1;
        let _span = tracing::info_span!("engine_update", frame = self.frame).entered();
        self.world.begin_frame();
        for pos in 0..self.schedule.len() {
            let idx = self.schedule.order()[pos];
            if let Err(err) = self.run_hook(idx, Phase::Update, dt) {
                self.handle_failure(idx, Phase::Update, err)?;
            }
        }
        Ok(())
    }

    /// Run every render hook in schedule order. Per-frame input is consumed
    /// afterwards.
    pub fn render(&mut self) -> Result<(), EngineError> {
        self.ensure_running()?;
        let _span = tracing::info_span!("engine_render", frame = self.frame).entered();
        for pos in 0..self.schedule.len() {
            let idx = self.schedule.order()[pos];
            if let Err(err) = self.run_hook(idx, Phase::Render, 0.0) {
                self.handle_failure(idx, Phase::Render, err)?;
            }
        }
        self.input.end_frame();
        Ok(())
    }

    pub fn present(&mut self) -> Result<(), EngineError> {
        self.ensure_running()?;
        match self.gpu.present() {
            Ok(()) => Ok(()),
            Err(err) => self.backend_failure("present", err),
        }
    }

    /// Update, render and present one frame.
    pub fn frame_step(&mut self, dt: f32) -> Result<(), EngineError> {
        self.update(dt)?;
        self.render()?;
        self.present()
    }

    /// Wait for the device to go idle, then shut systems down in reverse
    /// initialization order. Runs at most once.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        let _span = tracing::info_span!("engine_shutdown").entered();

        if let Err(err) = self.gpu.wait_idle() {
            tracing::error!(error = %err, "device did not go idle before teardown");
        }
        for idx in (0..self.initialized).rev() {
            let slot = &mut self.slots[idx];
            if let Some(system) = slot.system.as_deref_mut() {
                tracing::debug!(system = slot.id.name(), "shutdown");
                system.shutdown(self.gpu.as_mut());
            }
        }
        tracing::info!(frames = self.frame, "engine shut down");
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        if self.shut_down {
            Err(EngineError::ShutDown)
        } else {
            Ok(())
        }
    }

    fn backend_failure(&mut self, what: &'static str, err: BackendError) -> Result<(), EngineError> {
        if err.is_recoverable() {
            tracing::warn!(error = %err, "{what} failed");
            self.diagnostics.record(self.frame, "Engine", format!("{what}: {err}"));
            Ok(())
        } else {
            tracing::error!(error = %err, "{what} failed");
            self.shutdown();
            Err(EngineError::Backend(err))
        }
    }

    /// Run one hook with the system taken out of its slot, so the hook can
    /// read every other system through the view.
    fn run_hook(&mut self, idx: usize, phase: Phase, dt: f32) -> Result<(), SystemError> {
        let id = self.slots[idx].id;
        let Some(mut system) = self.slots[idx].system.take() else {
            return Ok(());
        };
        let view = SystemView::new(&self.slots, &self.index);
        let result = match phase {
            Phase::Init | Phase::Update => {
                let mut ctx = FrameContext {
                    dt,
                    frame: self.frame,
                    config: &self.config,
                    world: &mut self.world,
                    input: &self.input,
                    gpu: self.gpu.as_mut(),
                    systems: view,
                    diagnostics: &mut self.diagnostics,
                    current: id,
                };
                if phase == Phase::Init {
                    system.init(&mut ctx)
                } else {
                    system.update(&mut ctx)
                }
            }
            Phase::Render => {
                let mut ctx = RenderContext {
                    frame: self.frame,
                    config: &self.config,
                    world: &self.world,
                    input: &self.input,
                    gpu: self.gpu.as_mut(),
                    systems: view,
                    diagnostics: &mut self.diagnostics,
                    current: id,
                };
                system.render(&mut ctx)
            }
        };
        self.slots[idx].system = Some(system);
        result
    }

    fn handle_failure(&mut self, idx: usize, phase: Phase, err: SystemError) -> Result<(), EngineError> {
        let name = self.slots[idx].id.name();
        if err.is_fatal() {
            tracing::error!(system = name, %phase, error = %err, "fatal system error");
            self.shutdown();
            return Err(EngineError::SystemFailed {
                system: name,
                phase,
                source: err,
            });
        }
        tracing::warn!(system = name, %phase, error = %err, "system error");
        self.diagnostics.record(self.frame, name, err.to_string());
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
        // Destroy in reverse creation order.
        while let Some(slot) = self.slots.pop() {
            drop(slot);
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("schedule", &self.schedule())
            .field("frame", &self.frame)
            .field("shut_down", &self.shut_down)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use pathtracer_render::HeadlessBackend;

    use super::*;

    type Log = Arc<Mutex<Vec<String>>>;

    fn push(log: &Log, entry: impl Into<String>) {
        log.lock().unwrap().push(entry.into());
    }

    fn headless() -> Box<dyn RenderBackend> {
        Box::new(HeadlessBackend::new(64, 64))
    }

    struct Producer {
        log: Log,
        produced: u32,
    }

    impl System for Producer {
        fn init(&mut self, _ctx: &mut FrameContext<'_>) -> Result<(), SystemError> {
            push(&self.log, "init Producer");
            Ok(())
        }

        fn update(&mut self, _ctx: &mut FrameContext<'_>) -> Result<(), SystemError> {
            self.produced += 1;
            push(&self.log, "update Producer");
            Ok(())
        }

        fn render(&mut self, _ctx: &mut RenderContext<'_>) -> Result<(), SystemError> {
            push(&self.log, "render Producer");
            Ok(())
        }

        fn shutdown(&mut self, _gpu: &mut dyn RenderBackend) {
            push(&self.log, "shutdown Producer");
        }
    }

    struct Consumer {
        log: Log,
        seen: u32,
        fail_on: Option<u32>,
    }

    impl System for Consumer {
        fn dependencies(&self) -> Vec<SystemId> {
            vec![SystemId::of::<Producer>()]
        }

        fn init(&mut self, _ctx: &mut FrameContext<'_>) -> Result<(), SystemError> {
            push(&self.log, "init Consumer");
            Ok(())
        }

        fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), SystemError> {
            self.seen = ctx.systems.require::<Producer>()?.produced;
            push(&self.log, "update Consumer");
            match self.fail_on {
                Some(frame) if u64::from(frame) == ctx.frame => Err(SystemError::fatal("consumer broke")),
                _ => Ok(()),
            }
        }

        fn render(&mut self, _ctx: &mut RenderContext<'_>) -> Result<(), SystemError> {
            push(&self.log, "render Consumer");
            Ok(())
        }

        fn shutdown(&mut self, _gpu: &mut dyn RenderBackend) {
            push(&self.log, "shutdown Consumer");
        }
    }

    struct Flaky;

    impl System for Flaky {
        fn update(&mut self, _ctx: &mut FrameContext<'_>) -> Result<(), SystemError> {
            Err(SystemError::recoverable("one item failed"))
        }
    }

    fn pair(log: &Log, fail_on: Option<u32>) -> EngineBuilder {
        // Consumer is declared first; its dependency still puts it second.
        EngineBuilder::new()
            .with_system(Consumer {
                log: log.clone(),
                seen: 0,
                fail_on,
            })
            .with_system(Producer {
                log: log.clone(),
                produced: 0,
            })
    }

    #[test]
    fn lookup_returns_same_instance() {
        let log = Log::default();
        let engine = pair(&log, None).build(headless()).unwrap();

        let a = engine.system::<Producer>().unwrap();
        let b = engine.system::<Producer>().unwrap();
        assert!(std::ptr::eq(a, b));
        assert!(engine.system::<Flaky>().is_none());
        assert!(matches!(
            engine.require::<Flaky>(),
            Err(EngineError::MissingSystem("Flaky"))
        ));
    }

    #[test]
    fn lookup_stable_across_frames() {
        let log = Log::default();
        let mut engine = pair(&log, None).build(headless()).unwrap();
        let before = engine.system::<Consumer>().unwrap() as *const Consumer;
        engine.frame_step(0.016).unwrap();
        engine.frame_step(0.016).unwrap();
        let after = engine.system::<Consumer>().unwrap() as *const Consumer;
        assert_eq!(before, after);
        assert_eq!(engine.system::<Consumer>().unwrap().seen, 2);
    }

    #[test]
    fn init_in_declaration_order_update_in_dependency_order() {
        let log = Log::default();
        let mut engine = pair(&log, None).build(headless()).unwrap();
        assert_eq!(engine.schedule_names(), ["Producer", "Consumer"]);

        engine.update(0.016).unwrap();
        engine.render().unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            [
                "init Consumer",
                "init Producer",
                "update Producer",
                "update Consumer",
                "render Producer",
                "render Consumer",
            ]
        );
    }

    #[test]
    fn fatal_error_tears_down_in_reverse_init_order() {
        let log = Log::default();
        let mut engine = pair(&log, Some(2)).build(headless()).unwrap();
        engine.frame_step(0.016).unwrap();
        log.lock().unwrap().clear();

        let err = engine.update(0.016).unwrap_err();
        assert!(matches!(
            err,
            EngineError::SystemFailed {
                system: "Consumer",
                phase: Phase::Update,
                ..
            }
        ));
        assert!(engine.is_shut_down());
        assert_eq!(
            *log.lock().unwrap(),
            [
                "update Producer",
                "update Consumer",
                "shutdown Producer",
                "shutdown Consumer",
            ]
        );
        assert!(matches!(engine.update(0.016), Err(EngineError::ShutDown)));
    }

    #[test]
    fn shutdown_runs_once() {
        let log = Log::default();
        let mut engine = pair(&log, None).build(headless()).unwrap();
        engine.shutdown();
        engine.shutdown();
        drop(engine);
        let shutdowns = log
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with("shutdown"))
            .count();
        assert_eq!(shutdowns, 2);
    }

    #[test]
    fn recoverable_error_keeps_frame_running() {
        let log = Log::default();
        let mut engine = pair(&log, None)
            .with_system(Flaky)
            .build(headless())
            .unwrap();
        engine.frame_step(0.016).unwrap();
        engine.frame_step(0.016).unwrap();

        assert_eq!(engine.diagnostics().total(), 2);
        assert_eq!(engine.diagnostics().from_system("Flaky").count(), 2);
        assert_eq!(engine.system::<Consumer>().unwrap().seen, 2);
    }

    #[test]
    fn duplicate_registration_rejected() {
        let result = EngineBuilder::new()
            .with_system(Flaky)
            .with_system(Flaky)
            .build(headless());
        assert!(matches!(result, Err(EngineError::DuplicateSystem("Flaky"))));
    }

    #[test]
    fn cycle_rejected_at_build() {
        let log = Log::default();
        let result = pair(&log, None)
            .order::<Consumer, Producer>()
            .build(headless());
        assert!(matches!(result, Err(EngineError::DependencyCycle(_))));
    }

    #[test]
    fn zero_systems_run_frames() {
        let mut engine = EngineBuilder::new().build(headless()).unwrap();
        assert_eq!(engine.system_count(), 0);
        engine.frame_step(0.016).unwrap();
        engine.shutdown();
        assert!(engine.is_shut_down());
    }

    struct BrokenInit;

    impl System for BrokenInit {
        fn init(&mut self, _ctx: &mut FrameContext<'_>) -> Result<(), SystemError> {
            Err(SystemError::fatal("no device"))
        }
    }

    #[test]
    fn fatal_init_shuts_down_initialized_systems() {
        let log = Log::default();
        let result = pair(&log, None)
            .with_system(BrokenInit)
            .build(headless());
        assert!(matches!(
            result,
            Err(EngineError::SystemFailed {
                system: "BrokenInit",
                phase: Phase::Init,
                ..
            })
        ));
        assert_eq!(
            *log.lock().unwrap(),
            [
                "init Consumer",
                "init Producer",
                "shutdown Producer",
                "shutdown Consumer",
            ]
        );
    }

    #[test]
    fn system_mut_reaches_registered_instance() {
        let log = Log::default();
        let mut engine = pair(&log, None).build(headless()).unwrap();
        engine.system_mut::<Producer>().unwrap().produced = 41;
        engine.update(0.016).unwrap();
        assert_eq!(engine.system::<Consumer>().unwrap().seen, 42);
    }
}
