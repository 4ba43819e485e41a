use glam::{Quat, Vec2, Vec3};
use pathtracer_common::Transform;
use pathtracer_engine::{InputState, Key};

/// Yaw/pitch fly controller for the active camera.
#[derive(Debug, Clone)]
pub struct FlyCamera {
    pub yaw: f32,
    pub pitch: f32,
    /// Units per second.
    pub speed: f32,
    /// Speed multiplier while Shift is held.
    pub boost: f32,
    /// Radians per pixel of mouse motion.
    pub sensitivity: f32,
}

impl Default for FlyCamera {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            speed: 3.0,
            boost: 4.0,
            sensitivity: 0.003,
        }
    }
}

const PITCH_LIMIT: f32 = 89.0 * std::f32::consts::PI / 180.0;

impl FlyCamera {
    /// Pick up yaw and pitch from an existing camera transform.
    pub fn sync_from(&mut self, transform: &Transform) {
        let fwd = transform.forward().normalize_or_zero();
        if fwd == Vec3::ZERO {
            return;
        }
        self.pitch = fwd.y.clamp(-1.0, 1.0).asin().clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.yaw = (-fwd.x).atan2(-fwd.z);
    }

    pub fn rotation(&self) -> Quat {
        Quat::from_rotation_y(self.yaw) * Quat::from_rotation_x(self.pitch)
    }

    pub fn rotate(&mut self, delta: Vec2) {
        self.yaw -= delta.x * self.sensitivity;
        self.pitch = (self.pitch - delta.y * self.sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// Apply one frame of input. Returns `None` when the input leaves the
    /// camera where it is.
    pub fn step(&mut self, current: &Transform, input: &InputState, dt: f32) -> Option<Transform> {
        let look = input.mouse_delta();
        if look != Vec2::ZERO {
            self.rotate(look);
        }

        let rotation = self.rotation();
        let forward = rotation * Vec3::NEG_Z;
        let right = rotation * Vec3::X;
        let mut dir = Vec3::ZERO;
        if input.is_held(Key::W) {
            dir += forward;
        }
        if input.is_held(Key::S) {
            dir -= forward;
        }
        if input.is_held(Key::D) {
            dir += right;
        }
        if input.is_held(Key::A) {
            dir -= right;
        }
        if input.is_held(Key::Space) {
            dir += Vec3::Y;
        }
        if input.is_held(Key::Ctrl) {
            dir -= Vec3::Y;
        }

        if look == Vec2::ZERO && dir == Vec3::ZERO {
            return None;
        }
        let speed = if input.is_held(Key::Shift) {
            self.speed * self.boost
        } else {
            self.speed
        };
        Some(Transform {
            position: current.position + dir.normalize_or_zero() * speed * dt,
            rotation,
            scale: current.scale,
        })
    }
}

#[cfg(test)]
mod tests {
    use pathtracer_engine::{MouseButton, WindowEvent};

    use super::*;

    fn press(input: &mut InputState, key: Key) {
        input.apply(&WindowEvent::Key { key, pressed: true });
    }

    #[test]
    fn idle_input_leaves_camera() {
        let mut cam = FlyCamera::default();
        let input = InputState::new();
        assert!(cam.step(&Transform::default(), &input, 0.1).is_none());
    }

    #[test]
    fn forward_moves_along_view() {
        let mut cam = FlyCamera::default();
        let mut input = InputState::new();
        press(&mut input, Key::W);
        let moved = cam.step(&Transform::default(), &input, 1.0).unwrap();
        assert!((moved.position - Vec3::new(0.0, 0.0, -3.0)).length() < 1e-5);
    }

    #[test]
    fn shift_boosts() {
        let mut cam = FlyCamera::default();
        let mut input = InputState::new();
        press(&mut input, Key::Space);
        press(&mut input, Key::Shift);
        let moved = cam.step(&Transform::default(), &input, 1.0).unwrap();
        assert!((moved.position.y - 12.0).abs() < 1e-4);
    }

    #[test]
    fn mouse_look_clamps_pitch() {
        let mut cam = FlyCamera::default();
        let mut input = InputState::new();
        input.apply(&WindowEvent::MouseButton {
            button: MouseButton::Right,
            pressed: true,
        });
        input.apply(&WindowEvent::MouseMotion { dx: 0.0, dy: -100_000.0 });
        cam.step(&Transform::default(), &input, 0.016).unwrap();
        assert!((cam.pitch - PITCH_LIMIT).abs() < 1e-5);
    }

    #[test]
    fn sync_round_trips_view_direction() {
        let t = Transform::looking_at(Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO);
        let mut cam = FlyCamera::default();
        cam.sync_from(&t);
        let fwd = cam.rotation() * Vec3::NEG_Z;
        assert!((fwd - t.forward()).length() < 1e-4);
    }
}
