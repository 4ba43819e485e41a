//! On-disk asset formats.
//!
//! - `*.mesh.json`: `{ "positions": [[x, y, z], ...], "indices": [i0, i1, i2, ...] }`
//! - `*.material.json`: `{ "base_color": [r, g, b], "emission": [r, g, b] }`
//! - `*.gltf`: metadata import. Each glTF mesh becomes a placeholder unit cube,
//!   each material keeps its base colour and emissive factors.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::store::{Asset, AssetError};

/// Triangle mesh in object space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub positions: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn triangles(&self) -> impl Iterator<Item = [[f32; 3]; 3]> + '_ {
        self.indices.chunks_exact(3).map(|tri| {
            [
                self.positions[tri[0] as usize],
                self.positions[tri[1] as usize],
                self.positions[tri[2] as usize],
            ]
        })
    }

    pub fn validate(&self) -> Result<(), AssetError> {
        if self.indices.is_empty() {
            return Err(AssetError::InvalidMesh("mesh has no triangles".into()));
        }
        if self.indices.len() % 3 != 0 {
            return Err(AssetError::InvalidMesh(format!(
                "index count {} is not a multiple of 3",
                self.indices.len()
            )));
        }
        if let Some(bad) = self
            .indices
            .iter()
            .find(|i| **i as usize >= self.positions.len())
        {
            return Err(AssetError::InvalidMesh(format!(
                "index {bad} out of range for {} positions",
                self.positions.len()
            )));
        }
        if self.positions.iter().flatten().any(|c| !c.is_finite()) {
            return Err(AssetError::InvalidMesh("non-finite vertex position".into()));
        }
        Ok(())
    }

    /// Axis-aligned cube from -0.5 to 0.5, outward-facing triangles.
    pub fn unit_cube() -> Self {
        let positions = vec![
            [-0.5, -0.5, -0.5],
            [0.5, -0.5, -0.5],
            [0.5, 0.5, -0.5],
            [-0.5, 0.5, -0.5],
            [-0.5, -0.5, 0.5],
            [0.5, -0.5, 0.5],
            [0.5, 0.5, 0.5],
            [-0.5, 0.5, 0.5],
        ];
        let indices = vec![
            4, 5, 6, 4, 6, 7, // +z
            1, 0, 3, 1, 3, 2, // -z
            5, 1, 2, 5, 2, 6, // +x
            0, 4, 7, 0, 7, 3, // -x
            7, 6, 2, 7, 2, 3, // +y
            0, 1, 5, 0, 5, 4, // -y
        ];
        Self { positions, indices }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    pub base_color: [f32; 3],
    pub emission: [f32; 3],
}

impl Default for Material {
    fn default() -> Self {
        Self {
            base_color: [0.8, 0.8, 0.8],
            emission: [0.0; 3],
        }
    }
}

impl Material {
    pub fn is_emissive(&self) -> bool {
        self.emission.iter().any(|c| *c > 0.0)
    }
}

/// SHA-256 of a file's bytes.
pub type Fingerprint = [u8; 32];

pub fn fingerprint(bytes: &[u8]) -> Fingerprint {
    let digest = Sha256::digest(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Mesh,
    Material,
    Gltf,
}

impl AssetKind {
    /// Kind of file by its name, or `None` for files the scan skips.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        if name.ends_with(".mesh.json") {
            Some(Self::Mesh)
        } else if name.ends_with(".material.json") {
            Some(Self::Material)
        } else if name.ends_with(".gltf") {
            Some(Self::Gltf)
        } else {
            None
        }
    }

    /// Parse file contents into named items. Single-asset files yield one item
    /// with an empty suffix; containers yield one item per sub-asset.
    pub fn parse(self, bytes: &[u8]) -> Result<Vec<(Option<String>, Asset)>, AssetError> {
        match self {
            Self::Mesh => {
                let mesh: Mesh = serde_json::from_slice(bytes)?;
                mesh.validate()?;
                Ok(vec![(None, Asset::Mesh(mesh))])
            }
            Self::Material => {
                let material: Material = serde_json::from_slice(bytes)?;
                Ok(vec![(None, Asset::Material(material))])
            }
            Self::Gltf => import_gltf(bytes),
        }
    }
}

fn color3(value: Option<&serde_json::Value>, default: [f32; 3]) -> [f32; 3] {
    let Some(arr) = value.and_then(|v| v.as_array()) else {
        return default;
    };
    let mut color = default;
    for (i, v) in arr.iter().enumerate().take(3) {
        if let Some(f) = v.as_f64() {
            color[i] = f as f32;
        }
    }
    color
}

/// Reads glTF JSON metadata and registers placeholder meshes and materials.
/// Buffer and accessor data is not read.
fn import_gltf(bytes: &[u8]) -> Result<Vec<(Option<String>, Asset)>, AssetError> {
    let json: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| AssetError::GltfParse(e.to_string()))?;
    if json.get("asset").is_none() {
        return Err(AssetError::GltfParse("missing \"asset\" header".into()));
    }

    let mut items = Vec::new();

    if let Some(meshes) = json.get("meshes").and_then(|m| m.as_array()) {
        for (i, mesh) in meshes.iter().enumerate() {
            let name = mesh.get("name").and_then(|n| n.as_str()).unwrap_or("mesh");
            items.push((Some(format!("{name}_{i}")), Asset::Mesh(Mesh::unit_cube())));
        }
    }

    if let Some(materials) = json.get("materials").and_then(|m| m.as_array()) {
        for (i, mat) in materials.iter().enumerate() {
            let name = mat.get("name").and_then(|n| n.as_str()).unwrap_or("material");
            let base_color = color3(
                mat.get("pbrMetallicRoughness")
                    .and_then(|pbr| pbr.get("baseColorFactor")),
                Material::default().base_color,
            );
            let emission = color3(mat.get("emissiveFactor"), [0.0; 3]);
            items.push((
                Some(format!("{name}_{i}")),
                Asset::Material(Material {
                    base_color,
                    emission,
                }),
            ));
        }
    }

    if items.is_empty() {
        items.push((Some("default".into()), Asset::Mesh(Mesh::unit_cube())));
    }
    Ok(items)
}
