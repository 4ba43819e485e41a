//! Median-split BVH over world-space triangles, flattened for the trace kernel.
//!
//! Node 0 is the root. Internal nodes store their two children side by side,
//! so a node only needs the index of the first child.

use pathtracer_render::{BvhNode, GpuTriangle};

/// Most triangles a leaf holds before it is split.
pub const MAX_LEAF_SIZE: usize = 4;
const MAX_DEPTH: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Aabb {
    pub fn empty() -> Self {
        Self {
            min: [f32::INFINITY; 3],
            max: [f32::NEG_INFINITY; 3],
        }
    }

    pub fn expand_point(&mut self, p: [f32; 3]) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(p[i]);
            self.max[i] = self.max[i].max(p[i]);
        }
    }

    pub fn expand_triangle(&mut self, t: &GpuTriangle) {
        self.expand_point(t.v0);
        self.expand_point(t.v1);
        self.expand_point(t.v2);
    }

    pub fn extent(&self) -> [f32; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }

    pub fn contains(&self, other: &Aabb) -> bool {
        (0..3).all(|i| self.min[i] <= other.min[i] && self.max[i] >= other.max[i])
    }

    pub fn is_valid(&self) -> bool {
        (0..3).all(|i| self.min[i] <= self.max[i])
    }

    /// Axis with the largest extent.
    fn longest_axis(&self) -> usize {
        let e = self.extent();
        if e[0] > e[1] && e[0] > e[2] {
            0
        } else if e[1] > e[2] {
            1
        } else {
            2
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BvhStats {
    pub node_count: usize,
    pub leaf_count: usize,
    pub max_depth: u32,
}

fn bounds(triangles: &[GpuTriangle]) -> Aabb {
    let mut aabb = Aabb::empty();
    for t in triangles {
        aabb.expand_triangle(t);
    }
    aabb
}

fn centroid_bounds(triangles: &[GpuTriangle]) -> Aabb {
    let mut aabb = Aabb::empty();
    for t in triangles {
        aabb.expand_point(t.centroid());
    }
    aabb
}

fn node(aabb: &Aabb, first: u32, count: u32) -> BvhNode {
    BvhNode {
        min: aabb.min,
        first,
        max: aabb.max,
        count,
    }
}

/// Build a BVH over `triangles`, reordering them so every leaf covers a
/// contiguous range. An empty triangle list yields no nodes.
pub fn build_bvh(triangles: &mut [GpuTriangle]) -> (Vec<BvhNode>, BvhStats) {
    let mut stats = BvhStats::default();
    if triangles.is_empty() {
        return (Vec::new(), stats);
    }

    let mut nodes = vec![BvhNode {
        min: [0.0; 3],
        first: 0,
        max: [0.0; 3],
        count: 0,
    }];
    // (node index, first triangle, triangle count, depth)
    let mut work = vec![(0usize, 0usize, triangles.len(), 0u32)];

    while let Some((index, first, count, depth)) = work.pop() {
        stats.max_depth = stats.max_depth.max(depth);
        let range = &mut triangles[first..first + count];
        let aabb = bounds(range);

        let split_axis = if count <= MAX_LEAF_SIZE || depth >= MAX_DEPTH {
            None
        } else {
            let centroids = centroid_bounds(range);
            let axis = centroids.longest_axis();
            (centroids.extent()[axis] > 0.0).then_some(axis)
        };

        let Some(axis) = split_axis else {
            nodes[index] = node(&aabb, first as u32, count as u32);
            stats.leaf_count += 1;
            continue;
        };

        range.sort_by(|a, b| a.centroid()[axis].total_cmp(&b.centroid()[axis]));
        let mid = count / 2;

        let left = nodes.len();
        nodes.push(nodes[index]);
        nodes.push(nodes[index]);
        nodes[index] = node(&aabb, left as u32, 0);

        work.push((left + 1, first + mid, count - mid, depth + 1));
        work.push((left, first, mid, depth + 1));
    }

    stats.node_count = nodes.len();
    (nodes, stats)
}
