use std::sync::Arc;
use std::time::Duration;

use pathtracer_engine::{EventSource, Key, MouseButton, PlatformError, WindowConfig, WindowEvent};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, DeviceId, ElementState, KeyEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowId};

pub fn map_key(code: KeyCode) -> Option<Key> {
    Some(match code {
        KeyCode::KeyW => Key::W,
        KeyCode::KeyA => Key::A,
        KeyCode::KeyS => Key::S,
        KeyCode::KeyD => Key::D,
        KeyCode::KeyR => Key::R,
        KeyCode::Space => Key::Space,
        KeyCode::ControlLeft | KeyCode::ControlRight => Key::Ctrl,
        KeyCode::ShiftLeft | KeyCode::ShiftRight => Key::Shift,
        KeyCode::Escape => Key::Escape,
        _ => return None,
    })
}

fn map_button(button: winit::event::MouseButton) -> Option<MouseButton> {
    match button {
        winit::event::MouseButton::Left => Some(MouseButton::Left),
        winit::event::MouseButton::Right => Some(MouseButton::Right),
        _ => None,
    }
}

/// Collects engine events from winit callbacks between pumps.
struct Collector {
    config: WindowConfig,
    window: Option<Arc<Window>>,
    pending: Vec<WindowEvent>,
    look_captured: bool,
    error: Option<String>,
}

impl ApplicationHandler for Collector {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attrs = Window::default_attributes()
            .with_title(self.config.title())
            .with_inner_size(PhysicalSize::new(self.config.width(), self.config.height()));
        match event_loop.create_window(attrs) {
            Ok(window) => self.window = Some(Arc::new(window)),
            Err(err) => {
                self.error = Some(err.to_string());
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: winit::event::WindowEvent,
    ) {
        use winit::event::WindowEvent as W;
        match event {
            W::CloseRequested => self.pending.push(WindowEvent::CloseRequested),
            W::Resized(size) => self.pending.push(WindowEvent::Resized {
                width: size.width,
                height: size.height,
            }),
            W::Focused(focused) => self.pending.push(WindowEvent::Focused(focused)),
            W::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                if let Some(key) = map_key(code) {
                    self.pending.push(WindowEvent::Key {
                        key,
                        pressed: state == ElementState::Pressed,
                    });
                }
            }
            W::MouseInput { button, state, .. } => {
                let Some(button) = map_button(button) else {
                    return;
                };
                let pressed = state == ElementState::Pressed;
                if button == MouseButton::Right {
                    self.look_captured = pressed;
                    if let Some(window) = &self.window {
                        window.set_cursor_visible(!pressed);
                    }
                }
                self.pending.push(WindowEvent::MouseButton { button, pressed });
            }
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta } = event {
            if self.look_captured {
                self.pending.push(WindowEvent::MouseMotion {
                    dx: delta.0 as f32,
                    dy: delta.1 as f32,
                });
            }
        }
    }
}

/// winit event loop driven by pumping, so the engine owns the frame loop.
pub struct WinitPlatform {
    event_loop: EventLoop<()>,
    collector: Collector,
    closed: bool,
}

impl WinitPlatform {
    /// Create the event loop and pump it until the window exists.
    pub fn open(config: &WindowConfig) -> Result<Self, PlatformError> {
        let event_loop = EventLoop::new().map_err(|e| PlatformError::Init(e.to_string()))?;
        let mut platform = Self {
            event_loop,
            collector: Collector {
                config: config.clone(),
                window: None,
                pending: Vec::new(),
                look_captured: false,
                error: None,
            },
            closed: false,
        };
        while platform.collector.window.is_none() {
            let status = platform
                .event_loop
                .pump_app_events(Some(Duration::from_millis(10)), &mut platform.collector);
            if let Some(err) = platform.collector.error.take() {
                return Err(PlatformError::Init(err));
            }
            if let PumpStatus::Exit(_) = status {
                return Err(PlatformError::Exited);
            }
        }
        Ok(platform)
    }

    pub fn window(&self) -> Result<Arc<Window>, PlatformError> {
        self.collector
            .window
            .clone()
            .ok_or_else(|| PlatformError::Init("window not created".into()))
    }
}

impl EventSource for WinitPlatform {
    fn poll_events(&mut self, out: &mut Vec<WindowEvent>) -> Result<(), PlatformError> {
        if self.closed {
            return Err(PlatformError::Exited);
        }
        let status = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.collector);
        out.append(&mut self.collector.pending);
        if let PumpStatus::Exit(code) = status {
            tracing::debug!(code, "event loop exited");
            self.closed = true;
            out.push(WindowEvent::CloseRequested);
        }
        Ok(())
    }

    fn set_title(&mut self, title: &str) {
        if let Some(window) = &self.collector.window {
            window.set_title(title);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_keys_map() {
        assert_eq!(map_key(KeyCode::KeyW), Some(Key::W));
        assert_eq!(map_key(KeyCode::ShiftRight), Some(Key::Shift));
        assert_eq!(map_key(KeyCode::ControlLeft), Some(Key::Ctrl));
        assert_eq!(map_key(KeyCode::KeyQ), None);
    }

    #[test]
    fn only_left_and_right_buttons_map() {
        assert_eq!(map_button(winit::event::MouseButton::Right), Some(MouseButton::Right));
        assert_eq!(map_button(winit::event::MouseButton::Middle), None);
    }
}
