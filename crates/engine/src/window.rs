use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::{FrameClock, FrameTimer};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::input::WindowEvent;

/// Title and pixel size of a window. Fixed once the window exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    title: String,
    width: u32,
    height: u32,
}

impl WindowConfig {
    pub fn new(title: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            title: title.into(),
            width: width.max(1),
            height: height.max(1),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self::new("pathtracer", 1280, 720)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("failed to create window: {0}")]
    Init(String),
    #[error("event loop failed: {0}")]
    EventLoop(String),
    #[error("platform event loop exited")]
    Exited,
}

/// OS side of a window: the source of input events.
pub trait EventSource {
    /// Append every pending event to `out`.
    fn poll_events(&mut self, out: &mut Vec<WindowEvent>) -> Result<(), PlatformError>;

    fn set_title(&mut self, _title: &str) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Quit,
}

type StatusFn = Box<dyn FnMut(&Engine) -> String>;

/// Owns an [`Engine`] and drives its frame loop from a platform's events.
///
/// Each iteration drains and dispatches all pending events, then takes the
/// frame delta, so time spent in dispatch is folded into the next delta
/// (clamped by `max_frame_dt`) rather than skipped.
pub struct Window<P: EventSource> {
    config: WindowConfig,
    platform: P,
    engine: Engine,
    clock: FrameClock,
    timer: FrameTimer,
    events: Vec<WindowEvent>,
    status: Option<StatusFn>,
}

impl<P: EventSource> Window<P> {
    pub fn new(config: WindowConfig, platform: P, engine: Engine) -> Self {
        let clock = FrameClock::new(engine.config().max_frame_dt);
        let timer = FrameTimer::new(engine.config().frame_stats_window);
        Self {
            config,
            platform,
            engine,
            clock,
            timer,
            events: Vec::new(),
            status: None,
        }
    }

    /// Title text refreshed once per stats window.
    pub fn with_status(mut self, status: impl FnMut(&Engine) -> String + 'static) -> Self {
        self.status = Some(Box::new(status));
        self
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn timer(&self) -> &FrameTimer {
        &self.timer
    }

    /// Run the frame loop until the window is closed or a system fails
    /// fatally. The engine is shut down either way.
    pub fn start(&mut self) -> Result<(), EngineError> {
        let _span = tracing::info_span!("window", title = %self.config.title).entered();
        tracing::info!(
            width = self.config.width,
            height = self.config.height,
            "frame loop started"
        );

        let result = loop {
            match self.tick() {
                Ok(LoopControl::Continue) => {}
                Ok(LoopControl::Quit) => break Ok(()),
                Err(err) => {
                    tracing::error!(error = %err, "frame loop failed");
                    break Err(err);
                }
            }
        };
        self.engine.shutdown();
        result
    }

    /// One loop iteration: dispatch events, then update, render and present.
    pub fn tick(&mut self) -> Result<LoopControl, EngineError> {
        self.events.clear();
        self.platform.poll_events(&mut self.events)?;

        for event in self.events.drain(..) {
            if event == WindowEvent::CloseRequested {
                tracing::info!("close requested");
                return Ok(LoopControl::Quit);
            }
            self.engine.handle_event(&event)?;
        }

        let dt = self.clock.tick();
        self.engine.update(dt)?;
        self.engine.render()?;
        self.engine.present()?;

        self.timer.record(Duration::from_secs_f32(dt));
        if self.timer.window_complete() {
            tracing::debug!(
                avg_ms = self.timer.average().as_secs_f64() * 1000.0,
                max_ms = self.timer.max().as_secs_f64() * 1000.0,
                "frame stats"
            );
            if let Some(status) = self.status.as_mut() {
                let title = format!("{} | {}", self.config.title, status(&self.engine));
                self.platform.set_title(&title);
            }
        }
        Ok(LoopControl::Continue)
    }
}

/// Event source that replays prepared batches, one per frame, and requests
/// close once they run out.
#[derive(Debug, Default)]
pub struct ScriptedEvents {
    batches: VecDeque<Vec<WindowEvent>>,
    titles: Vec<String>,
}

impl ScriptedEvents {
    pub fn new(batches: impl IntoIterator<Item = Vec<WindowEvent>>) -> Self {
        Self {
            batches: batches.into_iter().collect(),
            titles: Vec::new(),
        }
    }

    /// `frames` frames without input, then close.
    pub fn idle(frames: usize) -> Self {
        Self::new(std::iter::repeat_with(Vec::new).take(frames))
    }

    pub fn titles(&self) -> &[String] {
        &self.titles
    }
}

impl EventSource for ScriptedEvents {
    fn poll_events(&mut self, out: &mut Vec<WindowEvent>) -> Result<(), PlatformError> {
        match self.batches.pop_front() {
            Some(batch) => out.extend(batch),
            None => out.push(WindowEvent::CloseRequested),
        }
        Ok(())
    }

    fn set_title(&mut self, title: &str) {
        self.titles.push(title.to_string());
    }
}

#[cfg(test)]
mod tests {
    use pathtracer_render::HeadlessBackend;

    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::EngineBuilder;
    use crate::error::SystemError;
    use crate::input::Key;
    use crate::system::{FrameContext, System};

    fn engine() -> Engine {
        EngineBuilder::new()
            .build(Box::new(HeadlessBackend::new(32, 32)))
            .unwrap()
    }

    #[test]
    fn empty_engine_starts_and_quits() {
        let mut window = Window::new(WindowConfig::default(), ScriptedEvents::idle(3), engine());
        window.start().unwrap();
        assert_eq!(window.engine().frame(), 3);
        assert!(window.engine().is_shut_down());
    }

    #[derive(Default)]
    struct KeyWatcher {
        held_w: Vec<bool>,
    }

    impl System for KeyWatcher {
        fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), SystemError> {
            self.held_w.push(ctx.input.is_held(Key::W));
            Ok(())
        }
    }

    #[test]
    fn events_dispatched_before_update() {
        let engine = EngineBuilder::new()
            .with_system(KeyWatcher::default())
            .build(Box::new(HeadlessBackend::new(32, 32)))
            .unwrap();
        let events = ScriptedEvents::new([
            vec![],
            vec![WindowEvent::Key {
                key: Key::W,
                pressed: true,
            }],
            vec![WindowEvent::Key {
                key: Key::W,
                pressed: false,
            }],
        ]);
        let mut window = Window::new(WindowConfig::default(), events, engine);
        window.start().unwrap();

        let watcher = window.engine().system::<KeyWatcher>().unwrap();
        assert_eq!(watcher.held_w, [false, true, false]);
    }

    #[test]
    fn close_stops_before_next_frame() {
        let events = ScriptedEvents::new([
            vec![],
            vec![
                WindowEvent::Focused(true),
                WindowEvent::CloseRequested,
                WindowEvent::Focused(false),
            ],
            vec![],
        ]);
        let mut window = Window::new(WindowConfig::default(), events, engine());
        window.start().unwrap();
        assert_eq!(window.engine().frame(), 1);
    }

    struct Crash;

    impl System for Crash {
        fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), SystemError> {
            if ctx.frame == 2 {
                return Err(SystemError::fatal("crash"));
            }
            Ok(())
        }
    }

    #[test]
    fn fatal_error_ends_loop_with_error() {
        let engine = EngineBuilder::new()
            .with_system(Crash)
            .build(Box::new(HeadlessBackend::new(32, 32)))
            .unwrap();
        let mut window = Window::new(WindowConfig::default(), ScriptedEvents::idle(10), engine);
        let err = window.start().unwrap_err();
        assert!(matches!(err, EngineError::SystemFailed { system: "Crash", .. }));
        assert!(window.engine().is_shut_down());
    }

    #[test]
    fn status_updates_title_each_stats_window() {
        let config = EngineConfig {
            frame_stats_window: 2,
            ..EngineConfig::default()
        };
        let engine = EngineBuilder::new()
            .with_config(config)
            .build(Box::new(HeadlessBackend::new(32, 32)))
            .unwrap();
        let mut window = Window::new(
            WindowConfig::new("demo", 64, 48),
            ScriptedEvents::idle(5),
            engine,
        )
        .with_status(|engine| format!("frame {}", engine.frame()));
        window.start().unwrap();
        assert_eq!(window.platform().titles(), ["demo | frame 2", "demo | frame 4"]);
    }

    #[test]
    fn window_config_rejects_zero_size() {
        let config = WindowConfig::new("x", 0, 0);
        assert_eq!((config.width(), config.height()), (1, 1));
    }
}
