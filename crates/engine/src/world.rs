use std::collections::BTreeMap;

use pathtracer_common::{AssetName, EntityId, Transform};
use serde::{Deserialize, Serialize};

use crate::system::SystemId;

/// Mesh and material an entity is drawn with, by asset name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Renderable {
    pub mesh: AssetName,
    /// Falls back to the default material.
    #[serde(default)]
    pub material: Option<AssetName>,
}

/// Pinhole lens parameters of a camera entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraLens {
    pub fov_y_degrees: f32,
}

impl Default for CameraLens {
    fn default() -> Self {
        Self { fov_y_degrees: 60.0 }
    }
}

/// Per-entity data stored in the world.
#[derive(Debug, Clone, Default)]
pub struct EntityData {
    pub name: Option<String>,
    pub transform: Transform,
    pub renderable: Option<Renderable>,
    pub camera: Option<CameraLens>,
}

/// Errors from world operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorldError {
    #[error("entity {0:?} not found")]
    EntityNotFound(EntityId),
    #[error("entity {entity:?} is owned by {holder:?} this frame; {writer:?} may not write it")]
    OwnershipConflict {
        entity: EntityId,
        holder: SystemId,
        writer: SystemId,
    },
}

/// Entities, their transforms, and per-frame transform ownership.
///
/// Uses BTreeMap for deterministic iteration order. Every change that can
/// alter a derived GPU scene bumps [`revision`](Self::revision); writes that
/// leave a value unchanged do not.
///
/// A system becomes the authoritative writer of an entity's transform for the
/// current frame by claiming it. Claims are cleared by
/// [`begin_frame`](Self::begin_frame), so ownership is partitioned per entity
/// and re-negotiated every frame.
#[derive(Debug, Clone, Default)]
pub struct World {
    entities: BTreeMap<EntityId, EntityData>,
    names: BTreeMap<String, EntityId>,
    claims: BTreeMap<EntityId, SystemId>,
    active_camera: Option<EntityId>,
    revision: u64,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monotonic change counter over everything a GPU scene derives from.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Read-only access to all entities (BTreeMap for deterministic iteration).
    pub fn entities(&self) -> &BTreeMap<EntityId, EntityData> {
        &self.entities
    }

    pub fn get(&self, id: EntityId) -> Option<&EntityData> {
        self.entities.get(&id)
    }

    pub fn find(&self, name: &str) -> Option<EntityId> {
        self.names.get(name).copied()
    }

    pub fn spawn(&mut self, transform: Transform) -> EntityId {
        self.spawn_entity(EntityData {
            transform,
            ..EntityData::default()
        })
    }

    pub fn spawn_named(&mut self, name: impl Into<String>, transform: Transform) -> EntityId {
        self.spawn_entity(EntityData {
            name: Some(name.into()),
            transform,
            ..EntityData::default()
        })
    }

    /// Spawn an entity with its components in place. A camera becomes the
    /// active one when none is active yet.
    pub fn spawn_entity(&mut self, data: EntityData) -> EntityId {
        let id = EntityId::new();
        if let Some(name) = &data.name {
            self.names.insert(name.clone(), id);
        }
        if data.camera.is_some() && self.active_camera.is_none() {
            self.active_camera = Some(id);
        }
        self.entities.insert(id, data);
        self.revision += 1;
        id
    }

    pub fn despawn(&mut self, id: EntityId) -> Option<EntityData> {
        let data = self.entities.remove(&id)?;
        if let Some(name) = &data.name {
            self.names.remove(name);
        }
        self.claims.remove(&id);
        if self.active_camera == Some(id) {
            self.active_camera = None;
        }
        self.revision += 1;
        Some(data)
    }

    pub fn set_renderable(&mut self, id: EntityId, renderable: Renderable) -> Result<(), WorldError> {
        let data = self
            .entities
            .get_mut(&id)
            .ok_or(WorldError::EntityNotFound(id))?;
        if data.renderable.as_ref() != Some(&renderable) {
            data.renderable = Some(renderable);
            self.revision += 1;
        }
        Ok(())
    }

    /// Attach a lens. The first camera becomes the active one.
    pub fn set_camera(&mut self, id: EntityId, lens: CameraLens) -> Result<(), WorldError> {
        let data = self
            .entities
            .get_mut(&id)
            .ok_or(WorldError::EntityNotFound(id))?;
        if data.camera != Some(lens) {
            data.camera = Some(lens);
            self.revision += 1;
        }
        if self.active_camera.is_none() {
            self.active_camera = Some(id);
            self.revision += 1;
        }
        Ok(())
    }

    pub fn set_active_camera(&mut self, id: EntityId) -> Result<(), WorldError> {
        let is_camera = self
            .entities
            .get(&id)
            .ok_or(WorldError::EntityNotFound(id))?
            .camera
            .is_some();
        if is_camera && self.active_camera != Some(id) {
            self.active_camera = Some(id);
            self.revision += 1;
        }
        Ok(())
    }

    pub fn active_camera(&self) -> Option<(EntityId, &EntityData)> {
        let id = self.active_camera?;
        self.entities.get(&id).map(|data| (id, data))
    }

    /// Start a new frame: all transform claims are released.
    pub fn begin_frame(&mut self) {
        self.claims.clear();
    }

    pub fn claimed_by(&self, id: EntityId) -> Option<SystemId> {
        self.claims.get(&id).copied()
    }

    /// Become the sole transform writer of `id` for this frame.
    pub fn claim(&mut self, id: EntityId, writer: SystemId) -> Result<(), WorldError> {
        if !self.entities.contains_key(&id) {
            return Err(WorldError::EntityNotFound(id));
        }
        match self.claims.get(&id) {
            Some(holder) if *holder != writer => Err(WorldError::OwnershipConflict {
                entity: id,
                holder: *holder,
                writer,
            }),
            _ => {
                self.claims.insert(id, writer);
                Ok(())
            }
        }
    }

    /// Write a transform as `writer`, claiming the entity for this frame.
    /// Returns whether the stored value changed.
    pub fn write_transform(
        &mut self,
        id: EntityId,
        writer: SystemId,
        transform: Transform,
    ) -> Result<bool, WorldError> {
        self.claim(id, writer)?;
        self.set_transform(id, transform)
    }

    /// Unowned write, for setup code outside the frame loop.
    /// Returns whether the stored value changed.
    pub fn set_transform(&mut self, id: EntityId, transform: Transform) -> Result<bool, WorldError> {
        let data = self
            .entities
            .get_mut(&id)
            .ok_or(WorldError::EntityNotFound(id))?;
        if data.transform == transform {
            return Ok(false);
        }
        data.transform = transform;
        self.revision += 1;
        Ok(true)
    }
}
