use std::collections::BTreeMap;

use glam::Vec3;
use pathtracer_assets::AssetStore;
use pathtracer_common::AssetName;
use pathtracer_engine::World;
use pathtracer_render::{GpuCamera, GpuMaterial, GpuTriangle, SceneData};

use crate::accel::{build_bvh, BvhStats};

/// Problems that leave part of the world out of a derived scene.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SceneError {
    #[error("entity {entity} references missing mesh {mesh}")]
    MissingMesh { entity: String, mesh: AssetName },
    #[error("entity {entity} references missing material {material}; using default")]
    MissingMaterial { entity: String, material: AssetName },
}

/// A derived scene plus what had to be skipped to produce it.
#[derive(Debug, Clone)]
pub struct SceneBuild {
    pub data: SceneData,
    pub stats: BvhStats,
    pub problems: Vec<SceneError>,
}

/// Derive the complete GPU scene from the store and the world.
///
/// Entities are visited in id order and materials are numbered by name, so
/// the result depends only on the inputs. Material 0 is the default material.
pub fn derive_scene(store: Option<&AssetStore>, world: &World, version: u64) -> SceneBuild {
    let mut problems = Vec::new();
    let mut triangles = Vec::new();
    let mut material_slots: BTreeMap<AssetName, u32> = BTreeMap::new();

    // Number referenced materials first so indices do not depend on which
    // entity mentions a material first.
    if let Some(store) = store {
        for data in world.entities().values() {
            if let Some(material) = data.renderable.as_ref().and_then(|r| r.material.as_ref()) {
                if store.material(material).is_some() {
                    material_slots.insert(material.clone(), 0);
                }
            }
        }
    }
    let mut materials = vec![GpuMaterial::default()];
    for (name, slot) in material_slots.iter_mut() {
        *slot = materials.len() as u32;
        if let Some(m) = store.and_then(|s| s.material(name)) {
            materials.push(GpuMaterial {
                base_color: [m.base_color[0], m.base_color[1], m.base_color[2], 1.0],
                emission: [m.emission[0], m.emission[1], m.emission[2], 0.0],
            });
        }
    }

    for (id, data) in world.entities() {
        let Some(renderable) = &data.renderable else {
            continue;
        };
        let label = data.name.clone().unwrap_or_else(|| id.short());
        let Some(mesh) = store.and_then(|s| s.mesh(&renderable.mesh)) else {
            problems.push(SceneError::MissingMesh {
                entity: label,
                mesh: renderable.mesh.clone(),
            });
            continue;
        };
        let material = match &renderable.material {
            None => 0,
            Some(name) => match material_slots.get(name) {
                Some(slot) => *slot,
                None => {
                    problems.push(SceneError::MissingMaterial {
                        entity: label,
                        material: name.clone(),
                    });
                    0
                }
            },
        };

        let matrix = data.transform.matrix();
        let to_world = |p: [f32; 3]| matrix.transform_point3(Vec3::from(p)).to_array();
        triangles.extend(
            mesh.triangles()
                .map(|[a, b, c]| GpuTriangle::new(to_world(a), to_world(b), to_world(c), material)),
        );
    }

    let (nodes, stats) = build_bvh(&mut triangles);

    SceneBuild {
        data: SceneData {
            version,
            triangles,
            materials,
            nodes,
            camera: camera(world),
        },
        stats,
        problems,
    }
}

fn camera(world: &World) -> GpuCamera {
    let Some((_, data)) = world.active_camera() else {
        return GpuCamera::default();
    };
    let fov = data.camera.map(|lens| lens.fov_y_degrees).unwrap_or(60.0);
    let t = &data.transform;
    GpuCamera {
        origin: t.position.to_array(),
        tan_half_fov: (fov.to_radians() * 0.5).tan(),
        forward: t.forward().normalize_or_zero().to_array(),
        right: t.right().normalize_or_zero().to_array(),
        up: t.up().normalize_or_zero().to_array(),
        ..GpuCamera::default()
    }
}
