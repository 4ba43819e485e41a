use glam::Vec3;
use pathtracer_assets::{AssetStore, AssetSystem};
use pathtracer_common::{AssetName, Transform};
use pathtracer_engine::{
    CameraLens, Engine, EntityData, FrameContext, Renderable, System, SystemError, SystemId, World,
};

/// Name of the camera entity the bootstrap spawns. Demo scripts drive it by
/// this name.
pub const CAMERA_NAME: &str = "camera";

const SPACING: f32 = 2.5;

/// Entities to spawn for a world that references no assets yet.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapPlan {
    /// Mesh and, when `x.mesh.json` has a sibling `x.material.json`, that material.
    pub renderables: Vec<(AssetName, Option<AssetName>)>,
    pub camera: bool,
}

impl BootstrapPlan {
    /// Spawn the planned entities in a row along X, centered on the origin,
    /// with the camera looking at the row from +Z.
    pub fn apply(self, world: &mut World) -> usize {
        let count = self.renderables.len();
        let offset = (count.saturating_sub(1)) as f32 * SPACING * 0.5;
        for (i, (mesh, material)) in self.renderables.into_iter().enumerate() {
            let position = Vec3::new(i as f32 * SPACING - offset, 0.0, 0.0);
            world.spawn_entity(EntityData {
                name: Some(mesh.as_str().to_string()),
                transform: Transform::from_position(position),
                renderable: Some(Renderable { mesh, material }),
                camera: None,
            });
        }
        if self.camera {
            let eye = Vec3::new(0.0, 1.5, 4.0 + offset * 1.5);
            world.spawn_entity(EntityData {
                name: Some(CAMERA_NAME.to_string()),
                transform: Transform::looking_at(eye, Vec3::ZERO),
                renderable: None,
                camera: Some(CameraLens::default()),
            });
        }
        tracing::info!(renderables = count, camera = self.camera, "scene bootstrapped");
        count
    }
}

fn sibling_material(mesh: &AssetName) -> Option<AssetName> {
    let stem = mesh.as_str().strip_suffix(".mesh.json")?;
    Some(AssetName::new(format!("{stem}.material.json")))
}

/// Plan a default scene when no entity is renderable yet and the store holds
/// at least one mesh. Returns `None` otherwise.
pub fn plan_bootstrap(store: &AssetStore, world: &World) -> Option<BootstrapPlan> {
    if world.entities().values().any(|e| e.renderable.is_some()) {
        return None;
    }
    let renderables: Vec<_> = store
        .mesh_names()
        .map(|mesh| {
            let material = sibling_material(mesh).filter(|m| store.material(m).is_some());
            (mesh.clone(), material)
        })
        .collect();
    if renderables.is_empty() {
        return None;
    }
    Some(BootstrapPlan {
        renderables,
        camera: world.active_camera().is_none() && world.find(CAMERA_NAME).is_none(),
    })
}

/// Populate an engine's world from its asset store, for compositions
/// without [`SceneBootstrap`]. Returns the number of renderables spawned.
pub fn bootstrap(engine: &mut Engine) -> usize {
    let plan = engine
        .system::<AssetSystem>()
        .and_then(|assets| plan_bootstrap(assets.store(), engine.world()));
    match plan {
        Some(plan) => plan.apply(engine.world_mut()),
        None => 0,
    }
}

/// Spawns a default scene the first time assets are available and the world
/// has nothing to draw.
#[derive(Debug, Default)]
pub struct SceneBootstrap {
    done: bool,
}

impl SceneBootstrap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

impl System for SceneBootstrap {
    fn dependencies(&self) -> Vec<SystemId> {
        vec![SystemId::of::<AssetSystem>()]
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), SystemError> {
        if self.done {
            return Ok(());
        }
        if ctx.world.entities().values().any(|e| e.renderable.is_some()) {
            self.done = true;
            return Ok(());
        }
        let Some(assets) = ctx.systems.get::<AssetSystem>() else {
            return Ok(());
        };
        if let Some(plan) = plan_bootstrap(assets.store(), ctx.world) {
            plan.apply(ctx.world);
            self.done = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pathtracer_assets::{Asset, Material, Mesh};

    use super::*;

    fn store() -> AssetStore {
        let mut store = AssetStore::new();
        store.insert("b.mesh.json".into(), Asset::Mesh(Mesh::unit_cube()));
        store.insert("a.mesh.json".into(), Asset::Mesh(Mesh::unit_cube()));
        store.insert(
            "a.material.json".into(),
            Asset::Material(Material {
                base_color: [0.9, 0.1, 0.1],
                emission: [0.0; 3],
            }),
        );
        store
    }

    #[test]
    fn empty_store_plans_nothing() {
        assert_eq!(plan_bootstrap(&AssetStore::new(), &World::new()), None);
    }

    #[test]
    fn plans_one_renderable_per_mesh() {
        let plan = plan_bootstrap(&store(), &World::new()).unwrap();
        assert!(plan.camera);
        assert_eq!(
            plan.renderables,
            vec![
                ("a.mesh.json".into(), Some("a.material.json".into())),
                ("b.mesh.json".into(), None),
            ]
        );
    }

    #[test]
    fn apply_spawns_row_and_camera() {
        let mut world = World::new();
        let spawned = plan_bootstrap(&store(), &world).unwrap().apply(&mut world);
        assert_eq!(spawned, 2);
        assert_eq!(world.entity_count(), 3);
        let camera = world.find(CAMERA_NAME).unwrap();
        assert_eq!(world.active_camera().map(|(id, _)| id), Some(camera));
        let a = world.find("a.mesh.json").and_then(|id| world.get(id)).unwrap();
        assert_eq!(
            a.renderable,
            Some(Renderable {
                mesh: "a.mesh.json".into(),
                material: Some("a.material.json".into()),
            })
        );

        let xs: Vec<f32> = world
            .entities()
            .values()
            .filter(|e| e.renderable.is_some())
            .map(|e| e.transform.position.x)
            .collect();
        assert_eq!(xs.iter().sum::<f32>(), 0.0);
    }

    #[test]
    fn existing_renderables_are_left_alone() {
        let mut world = World::new();
        let id = world.spawn(Transform::default());
        world
            .set_renderable(
                id,
                Renderable {
                    mesh: "elsewhere".into(),
                    material: None,
                },
            )
            .unwrap();
        assert_eq!(plan_bootstrap(&store(), &world), None);
    }
}
