use std::collections::BTreeMap;

use glam::{Quat, Vec3};
use pathtracer_common::{EntityId, Transform};
use pathtracer_engine::{FrameContext, System, SystemError, SystemId};

use crate::demo::DemoSystem;
use crate::fly::FlyCamera;

/// Linear (units/s) and angular (axis * rad/s) velocity of a kinematic body.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Velocity {
    pub linear: Vec3,
    pub angular: Vec3,
}

impl Velocity {
    pub fn is_zero(&self) -> bool {
        self.linear == Vec3::ZERO && self.angular == Vec3::ZERO
    }

    pub fn integrate(&self, t: &Transform, dt: f32) -> Transform {
        let spin = if self.angular == Vec3::ZERO {
            Quat::IDENTITY
        } else {
            Quat::from_scaled_axis(self.angular * dt)
        };
        Transform {
            position: t.position + self.linear * dt,
            rotation: (spin * t.rotation).normalize(),
            scale: t.scale,
        }
    }
}

/// Per-frame kinematics and the fly camera.
///
/// Entities claimed by another system this frame are left alone.
#[derive(Debug, Default)]
pub struct MovementSystem {
    bodies: BTreeMap<EntityId, Velocity>,
    camera: FlyCamera,
    fly_enabled: bool,
    /// Camera the controller's yaw/pitch were last synced from.
    synced: Option<EntityId>,
    skipped: u64,
}

impl MovementSystem {
    pub fn new() -> Self {
        Self {
            fly_enabled: true,
            ..Self::default()
        }
    }

    pub fn with_fly_camera(mut self, camera: FlyCamera) -> Self {
        self.camera = camera;
        self
    }

    /// Drive the active camera from input or leave it to other writers.
    pub fn set_fly_enabled(&mut self, enabled: bool) {
        self.fly_enabled = enabled;
    }

    pub fn set_velocity(&mut self, entity: EntityId, velocity: Velocity) {
        if velocity.is_zero() {
            self.bodies.remove(&entity);
        } else {
            self.bodies.insert(entity, velocity);
        }
    }

    pub fn velocity(&self, entity: EntityId) -> Option<Velocity> {
        self.bodies.get(&entity).copied()
    }

    /// Entity updates skipped because another system owned the entity.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn owned_by_other(&self, ctx: &FrameContext<'_>, id: EntityId) -> bool {
        matches!(ctx.world.claimed_by(id), Some(holder) if holder != ctx.current())
    }
}

impl System for MovementSystem {
    fn dependencies(&self) -> Vec<SystemId> {
        // Demo claims must be in place before we decide what we may write.
        vec![SystemId::of::<DemoSystem>()]
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), SystemError> {
        let me = ctx.current();
        let dt = ctx.dt;

        self.bodies.retain(|id, _| ctx.world.get(*id).is_some());
        let bodies: Vec<(EntityId, Velocity)> = self.bodies.iter().map(|(i, v)| (*i, *v)).collect();
        for (id, velocity) in bodies {
            if self.owned_by_other(ctx, id) {
                self.skipped += 1;
                continue;
            }
            let Some(data) = ctx.world.get(id) else {
                continue;
            };
            let next = velocity.integrate(&data.transform, dt);
            ctx.world.write_transform(id, me, next)?;
        }

        if !self.fly_enabled {
            return Ok(());
        }
        let Some((cam_id, cam)) = ctx.world.active_camera() else {
            return Ok(());
        };
        let current = cam.transform;
        if self.owned_by_other(ctx, cam_id) {
            // Resync once the other writer lets go.
            self.synced = None;
            self.skipped += 1;
            return Ok(());
        }
        if self.synced != Some(cam_id) {
            self.camera.sync_from(&current);
            self.synced = Some(cam_id);
        }
        if let Some(next) = self.camera.step(&current, ctx.input, dt) {
            ctx.world.write_transform(cam_id, me, next)?;
        }
        Ok(())
    }
}
