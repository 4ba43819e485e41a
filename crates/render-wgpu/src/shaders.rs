/// Progressive trace kernel: one sample per pixel per dispatch, accumulated
/// as a running sum with the sample count in `w`.
pub const TRACE_SHADER: &str = r#"
struct Triangle {
    v0: vec3<f32>,
    material: u32,
    v1: vec3<f32>,
    pad0: u32,
    v2: vec3<f32>,
    pad1: u32,
};

struct Material {
    base_color: vec4<f32>,
    emission: vec4<f32>,
};

struct Node {
    min: vec3<f32>,
    first: u32,
    max: vec3<f32>,
    count: u32,
};

struct Camera {
    origin: vec3<f32>,
    tan_half_fov: f32,
    forward: vec3<f32>,
    pad0: f32,
    right: vec3<f32>,
    pad1: f32,
    up: vec3<f32>,
    pad2: f32,
};

struct SceneInfo {
    camera: Camera,
    node_count: u32,
    triangle_count: u32,
    pad0: u32,
    pad1: u32,
};

struct Params {
    width: u32,
    height: u32,
    sample_index: u32,
    seed: u32,
    reset: u32,
    max_bounces: u32,
    pad0: u32,
    pad1: u32,
};

@group(0) @binding(0) var<storage, read> triangles: array<Triangle>;
@group(0) @binding(1) var<storage, read> materials: array<Material>;
@group(0) @binding(2) var<storage, read> nodes: array<Node>;
@group(0) @binding(3) var<uniform> scene: SceneInfo;

@group(1) @binding(0) var<storage, read_write> accumulation: array<vec4<f32>>;
@group(1) @binding(1) var<uniform> params: Params;

const NO_HIT: f32 = 1e30;
const STACK_SIZE: u32 = 64u;

var<private> rng_state: u32;

fn pcg(v: u32) -> u32 {
    let state = v * 747796405u + 2891336453u;
    let word = ((state >> ((state >> 28u) + 4u)) ^ state) * 277803737u;
    return (word >> 22u) ^ word;
}

fn rand() -> f32 {
    rng_state = pcg(rng_state);
    return f32(rng_state) / 4294967295.0;
}

struct Hit {
    t: f32,
    normal: vec3<f32>,
    material: u32,
};

fn hit_aabb(origin: vec3<f32>, inv_dir: vec3<f32>, lo: vec3<f32>, hi: vec3<f32>, t_max: f32) -> bool {
    let t0 = (lo - origin) * inv_dir;
    let t1 = (hi - origin) * inv_dir;
    let near3 = min(t0, t1);
    let far3 = max(t0, t1);
    let near = max(max(near3.x, near3.y), max(near3.z, 0.0));
    let far = min(min(far3.x, far3.y), min(far3.z, t_max));
    return near <= far;
}

// Moller-Trumbore. Returns NO_HIT on a miss.
fn hit_triangle(origin: vec3<f32>, dir: vec3<f32>, tri: Triangle) -> f32 {
    let e1 = tri.v1 - tri.v0;
    let e2 = tri.v2 - tri.v0;
    let p = cross(dir, e2);
    let det = dot(e1, p);
    if abs(det) < 1e-8 {
        return NO_HIT;
    }
    let inv_det = 1.0 / det;
    let s = origin - tri.v0;
    let u = dot(s, p) * inv_det;
    if u < 0.0 || u > 1.0 {
        return NO_HIT;
    }
    let q = cross(s, e1);
    let v = dot(dir, q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return NO_HIT;
    }
    let t = dot(e2, q) * inv_det;
    if t < 1e-4 {
        return NO_HIT;
    }
    return t;
}

fn intersect(origin: vec3<f32>, dir: vec3<f32>) -> Hit {
    var hit: Hit;
    hit.t = NO_HIT;
    hit.normal = vec3<f32>(0.0);
    hit.material = 0u;
    if scene.node_count == 0u {
        return hit;
    }

    let safe_dir = select(dir, vec3<f32>(1e-8), abs(dir) < vec3<f32>(1e-8));
    let inv_dir = 1.0 / safe_dir;

    var stack: array<u32, 64>;
    var sp = 1u;
    stack[0] = 0u;
    loop {
        if sp == 0u {
            break;
        }
        sp -= 1u;
        let node = nodes[stack[sp]];
        if !hit_aabb(origin, inv_dir, node.min, node.max, hit.t) {
            continue;
        }
        if node.count > 0u {
            for (var i = node.first; i < node.first + node.count; i++) {
                let tri = triangles[i];
                let t = hit_triangle(origin, dir, tri);
                if t < hit.t {
                    hit.t = t;
                    hit.material = tri.material;
                    hit.normal = normalize(cross(tri.v1 - tri.v0, tri.v2 - tri.v0));
                }
            }
        } else if sp + 2u <= STACK_SIZE {
            stack[sp] = node.first;
            stack[sp + 1u] = node.first + 1u;
            sp += 2u;
        }
    }
    return hit;
}

fn sky(dir: vec3<f32>) -> vec3<f32> {
    let t = 0.5 * (dir.y + 1.0);
    return mix(vec3<f32>(1.0), vec3<f32>(0.5, 0.7, 1.0), t) * 0.6;
}

fn cosine_direction(n: vec3<f32>) -> vec3<f32> {
    let r1 = rand();
    let r2 = rand();
    let phi = 6.2831853 * r1;
    let r = sqrt(r2);
    let up = select(vec3<f32>(1.0, 0.0, 0.0), vec3<f32>(0.0, 1.0, 0.0), abs(n.x) > 0.9);
    let tangent = normalize(cross(up, n));
    let bitangent = cross(n, tangent);
    return normalize(tangent * (r * cos(phi)) + bitangent * (r * sin(phi)) + n * sqrt(1.0 - r2));
}

@compute @workgroup_size(8, 8)
fn trace_main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if gid.x >= params.width || gid.y >= params.height {
        return;
    }
    let pixel = gid.y * params.width + gid.x;
    rng_state = pcg(pixel ^ pcg(params.seed + params.sample_index));

    let size = vec2<f32>(f32(params.width), f32(params.height));
    let uv = (vec2<f32>(f32(gid.x), f32(gid.y)) + vec2<f32>(rand(), rand())) / size;
    let ndc = vec2<f32>(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0);
    let aspect = size.x / size.y;

    let cam = scene.camera;
    var dir = normalize(
        cam.forward
            + cam.right * (ndc.x * cam.tan_half_fov * aspect)
            + cam.up * (ndc.y * cam.tan_half_fov)
    );
    var origin = cam.origin;
    var throughput = vec3<f32>(1.0);
    var radiance = vec3<f32>(0.0);

    for (var bounce = 0u; bounce < params.max_bounces; bounce++) {
        let hit = intersect(origin, dir);
        if hit.t >= NO_HIT {
            radiance += throughput * sky(dir);
            break;
        }
        let material = materials[hit.material];
        radiance += throughput * material.emission.rgb;
        throughput *= material.base_color.rgb;

        var n = hit.normal;
        if dot(n, dir) > 0.0 {
            n = -n;
        }
        origin = origin + dir * hit.t + n * 1e-3;
        dir = cosine_direction(n);
    }

    var previous = accumulation[pixel];
    if params.reset != 0u {
        previous = vec4<f32>(0.0);
    }
    accumulation[pixel] = previous + vec4<f32>(radiance, 1.0);
}
"#;

/// Fullscreen triangle that resolves the accumulation sum to the surface.
pub const BLIT_SHADER: &str = r#"
struct Params {
    width: u32,
    height: u32,
    sample_index: u32,
    seed: u32,
    reset: u32,
    max_bounces: u32,
    pad0: u32,
    pad1: u32,
};

@group(0) @binding(0) var<storage, read> accumulation: array<vec4<f32>>;
@group(0) @binding(1) var<uniform> params: Params;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
};

@vertex
fn vs_blit(@builtin(vertex_index) index: u32) -> VertexOutput {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    var out: VertexOutput;
    out.position = vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
    return out;
}

@fragment
fn fs_blit(in: VertexOutput) -> @location(0) vec4<f32> {
    let x = min(u32(in.position.x), params.width - 1u);
    let y = min(u32(in.position.y), params.height - 1u);
    let sum = accumulation[y * params.width + x];
    let color = sum.rgb / max(sum.w, 1.0);
    // Reinhard
    return vec4<f32>(color / (color + vec3<f32>(1.0)), 1.0);
}
"#;
