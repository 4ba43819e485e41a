use std::collections::HashSet;

use glam::Vec2;

/// Keys the engine's systems react to. Platforms map their key codes onto these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    W,
    A,
    S,
    D,
    Space,
    Ctrl,
    Shift,
    R,
    Escape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
}

/// Platform-neutral window event, produced by an
/// [`EventSource`](crate::window::EventSource).
#[derive(Debug, Clone, PartialEq)]
pub enum WindowEvent {
    CloseRequested,
    Resized { width: u32, height: u32 },
    Key { key: Key, pressed: bool },
    MouseButton { button: MouseButton, pressed: bool },
    MouseMotion { dx: f32, dy: f32 },
    Focused(bool),
}

/// Input accumulated from the events dispatched before the current frame.
#[derive(Debug, Clone, Default)]
pub struct InputState {
    held: HashSet<Key>,
    pressed: HashSet<Key>,
    mouse_delta: Vec2,
    look_active: bool,
    resized: Option<(u32, u32)>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &WindowEvent) {
        match *event {
            WindowEvent::Key { key, pressed } => {
                if pressed {
                    if self.held.insert(key) {
                        self.pressed.insert(key);
                    }
                } else {
                    self.held.remove(&key);
                }
            }
            WindowEvent::MouseButton {
                button: MouseButton::Right,
                pressed,
            } => self.look_active = pressed,
            WindowEvent::MouseButton { .. } => {}
            WindowEvent::MouseMotion { dx, dy } => {
                if self.look_active {
                    self.mouse_delta += Vec2::new(dx, dy);
                }
            }
            WindowEvent::Resized { width, height } => self.resized = Some((width, height)),
            WindowEvent::Focused(false) => {
                self.held.clear();
                self.look_active = false;
            }
            WindowEvent::Focused(true) | WindowEvent::CloseRequested => {}
        }
    }

    /// Forget per-frame state once a frame has consumed it.
    pub fn end_frame(&mut self) {
        self.pressed.clear();
        self.mouse_delta = Vec2::ZERO;
        self.resized = None;
    }

    pub fn is_held(&self, key: Key) -> bool {
        self.held.contains(&key)
    }

    /// Key went down since the previous frame.
    pub fn was_pressed(&self, key: Key) -> bool {
        self.pressed.contains(&key)
    }

    /// Mouse movement while look (right button) was held.
    pub fn mouse_delta(&self) -> Vec2 {
        self.mouse_delta
    }

    /// New framebuffer size, if the window was resized since the previous frame.
    pub fn resized(&self) -> Option<(u32, u32)> {
        self.resized
    }
}
