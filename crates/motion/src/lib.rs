//! Systems that author entity transforms.
//!
//! [`DemoSystem`] plays scripted tracks and claims the entities it drives for
//! the frame. [`MovementSystem`] runs after it and moves everything it is
//! still allowed to write: kinematic bodies and the active camera.

pub mod demo;
pub mod fly;
pub mod movement;

pub use demo::{DemoError, DemoScript, DemoSystem, Keyframe, Track};
pub use fly::FlyCamera;
pub use movement::{MovementSystem, Velocity};
