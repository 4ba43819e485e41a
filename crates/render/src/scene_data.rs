use bytemuck::{Pod, Zeroable};

/// World-space triangle as laid out in the trace kernel's storage buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuTriangle {
    pub v0: [f32; 3],
    pub material: u32,
    pub v1: [f32; 3],
    pub _pad0: u32,
    pub v2: [f32; 3],
    pub _pad1: u32,
}

impl GpuTriangle {
    pub fn new(v0: [f32; 3], v1: [f32; 3], v2: [f32; 3], material: u32) -> Self {
        Self {
            v0,
            material,
            v1,
            _pad0: 0,
            v2,
            _pad1: 0,
        }
    }

    pub fn centroid(&self) -> [f32; 3] {
        [
            (self.v0[0] + self.v1[0] + self.v2[0]) / 3.0,
            (self.v0[1] + self.v1[1] + self.v2[1]) / 3.0,
            (self.v0[2] + self.v1[2] + self.v2[2]) / 3.0,
        ]
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuMaterial {
    pub base_color: [f32; 4],
    pub emission: [f32; 4],
}

impl Default for GpuMaterial {
    fn default() -> Self {
        Self {
            base_color: [0.8, 0.8, 0.8, 1.0],
            emission: [0.0; 4],
        }
    }
}

/// Flattened BVH node.
///
/// Leaf when `count > 0`: triangles `first..first + count`.
/// Internal when `count == 0`: children at `first` and `first + 1`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BvhNode {
    pub min: [f32; 3],
    pub first: u32,
    pub max: [f32; 3],
    pub count: u32,
}

impl BvhNode {
    pub fn is_leaf(&self) -> bool {
        self.count > 0
    }
}

const _: () = {
    assert!(std::mem::size_of::<GpuTriangle>() == 48);
    assert!(std::mem::size_of::<GpuMaterial>() == 32);
    assert!(std::mem::size_of::<BvhNode>() == 32);
    assert!(std::mem::size_of::<GpuCamera>() == 64);
};

/// Pinhole camera basis consumed by the trace kernel.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuCamera {
    pub origin: [f32; 3],
    pub tan_half_fov: f32,
    pub forward: [f32; 3],
    pub _pad0: f32,
    pub right: [f32; 3],
    pub _pad1: f32,
    pub up: [f32; 3],
    pub _pad2: f32,
}

impl Default for GpuCamera {
    fn default() -> Self {
        Self {
            origin: [0.0, 0.0, 5.0],
            tan_half_fov: (30.0_f32).to_radians().tan(),
            forward: [0.0, 0.0, -1.0],
            _pad0: 0.0,
            right: [1.0, 0.0, 0.0],
            _pad1: 0.0,
            up: [0.0, 1.0, 0.0],
            _pad2: 0.0,
        }
    }
}

/// Complete, immutable GPU scene for one version.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneData {
    pub version: u64,
    pub triangles: Vec<GpuTriangle>,
    pub materials: Vec<GpuMaterial>,
    pub nodes: Vec<BvhNode>,
    pub camera: GpuCamera,
}

impl SceneData {
    pub fn byte_size(&self) -> usize {
        std::mem::size_of_val(self.triangles.as_slice())
            + std::mem::size_of_val(self.materials.as_slice())
            + std::mem::size_of_val(self.nodes.as_slice())
            + std::mem::size_of::<GpuCamera>()
    }
}
