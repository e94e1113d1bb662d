//! WGSL generation for the compute kernels and the tile draw shader.
//!
//! The compute module has three entry points sharing one pipeline layout:
//!
//! | Entry point | Dispatch | Effect |
//! |-------------|----------|--------|
//! | `init` | `ceil(capacity / width)` | every slot inactive, free list holds every slot |
//! | `update` | `ceil(capacity / width)` | integrate, collide, age, push expired slots |
//! | `emit` | `min(cap, pool / width)` | pop a slot per invocation and initialize it |
//!
//! Bindings:
//!
//! | Group | Binding | Resource |
//! |-------|---------|----------|
//! | 0 | 0 | `particles: array<Particle>` (read_write) |
//! | 0 | 1 | `free_list: array<u32>` (read_write) |
//! | 0 | 2 | `free_count: atomic<u32>` |
//! | 0 | 3 | `update_params` (uniform) |
//! | 0 | 4 | `emit_params` (uniform) |
//! | 1 | 0 | `depth_tex: texture_depth_2d` |
//! | 1 | 1 | `normal_tex: texture_2d<f32>` |
//!
//! The free list is a stack: `free_list[0..free_count]` holds the free slots.
//! Pushes only happen in `update` and pops only in `emit`, so within one
//! dispatch the counter only moves in one direction.

use crate::particle::ParticleRecord;

/// Compare-exchange attempts before a pop gives up for this dispatch.
pub const POP_ATTEMPTS: u32 = 64;

const UPDATE_PARAMS_STRUCT: &str = r#"struct UpdateParams {
    view_proj: mat4x4<f32>,
    gravity: vec3<f32>,
    delta_time: f32,
    viewport: vec2<f32>,
    time_scale: f32,
    collision_enabled: u32,
    restitution: f32,
    thickness: f32,
    capacity: u32,
    _pad: u32,
};"#;

const EMIT_PARAMS_STRUCT: &str = r#"struct EmitParams {
    origin: vec3<f32>,
    scale: f32,
    spread: vec3<f32>,
    lifetime: f32,
    velocity_min: vec3<f32>,
    seed: u32,
    velocity_max: vec3<f32>,
    _pad0: u32,
    angular_velocity: vec3<f32>,
    _pad1: u32,
    color: vec4<f32>,
};"#;

/// Generate the compute module for the given workgroup width.
pub fn compute_shader(workgroup_size: u32) -> String {
    format!(
        r#"
// Particle pool kernels

{particle_struct}

{update_struct}

{emit_struct}

const INVALID_SLOT: u32 = 0xffffffffu;
const POP_ATTEMPTS: u32 = {pop_attempts}u;
const TAU: f32 = 6.283185307;

@group(0) @binding(0)
var<storage, read_write> particles: array<Particle>;

@group(0) @binding(1)
var<storage, read_write> free_list: array<u32>;

@group(0) @binding(2)
var<storage, read_write> free_count: atomic<u32>;

@group(0) @binding(3)
var<uniform> update_params: UpdateParams;

@group(0) @binding(4)
var<uniform> emit_params: EmitParams;

@group(1) @binding(0)
var depth_tex: texture_depth_2d;

@group(1) @binding(1)
var normal_tex: texture_2d<f32>;

// ============================================================================
// Slot pool
// ============================================================================

fn pool_push(slot: u32) {{
    let index = atomicAdd(&free_count, 1u);
    free_list[index] = slot;
}}

fn pool_pop() -> u32 {{
    var count = atomicLoad(&free_count);
    for (var attempt = 0u; attempt < POP_ATTEMPTS; attempt = attempt + 1u) {{
        if (count == 0u) {{
            return INVALID_SLOT;
        }}
        let result = atomicCompareExchangeWeak(&free_count, count, count - 1u);
        if (result.exchanged) {{
            return free_list[count - 1u];
        }}
        count = result.old_value;
    }}
    return INVALID_SLOT;
}}

// ============================================================================
// Random
// ============================================================================

fn hash(n: u32) -> u32 {{
    var x = n;
    x = x ^ (x >> 17u);
    x = x * 0xed5ad4bbu;
    x = x ^ (x >> 11u);
    x = x * 0xac4c1b51u;
    x = x ^ (x >> 15u);
    x = x * 0x31848babu;
    x = x ^ (x >> 14u);
    return x;
}}

fn rand(seed: u32) -> f32 {{
    return f32(hash(seed)) / 4294967295.0;
}}

fn rand3(seed: u32) -> vec3<f32> {{
    return vec3<f32>(rand(seed), rand(seed + 1u), rand(seed + 2u));
}}

// ============================================================================
// Collision
// ============================================================================

fn collide(position: vec3<f32>, velocity: vec3<f32>) -> vec3<f32> {{
    let clip = update_params.view_proj * vec4<f32>(position, 1.0);
    if (clip.w <= 0.0) {{
        return velocity;
    }}
    let ndc = clip.xyz / clip.w;
    if (abs(ndc.x) > 1.0 || abs(ndc.y) > 1.0 || ndc.z < 0.0 || ndc.z > 1.0) {{
        return velocity;
    }}

    let uv = vec2<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
    let dims = max(min(textureDimensions(depth_tex), textureDimensions(normal_tex)), vec2<u32>(1u));
    let texel = min(vec2<u32>(uv * update_params.viewport), dims - vec2<u32>(1u));

    let scene_depth = textureLoad(depth_tex, texel, 0);
    let penetration = ndc.z - scene_depth;
    if (penetration <= 0.0 || penetration >= update_params.thickness) {{
        return velocity;
    }}

    let decoded = textureLoad(normal_tex, texel, 0).xyz * 2.0 - 1.0;
    if (dot(decoded, decoded) < 1e-6) {{
        return velocity;
    }}
    let n = normalize(decoded);
    let vn = dot(velocity, n);
    if (vn >= 0.0) {{
        return velocity;
    }}
    return velocity - (1.0 + update_params.restitution) * vn * n;
}}

// ============================================================================
// Entry points
// ============================================================================

@compute @workgroup_size({workgroup_size})
fn init(@builtin(global_invocation_id) global_id: vec3<u32>) {{
    let index = global_id.x;
    let capacity = update_params.capacity;
    if (index >= capacity) {{
        return;
    }}

    var p: Particle;
    particles[index] = p;
    // Highest slot at the bottom so slot 0 is popped first.
    free_list[index] = capacity - 1u - index;
}}

@compute @workgroup_size({workgroup_size})
fn update(@builtin(global_invocation_id) global_id: vec3<u32>) {{
    let index = global_id.x;
    if (index >= update_params.capacity) {{
        return;
    }}

    var p = particles[index];
    if (p.active == 0u) {{
        return;
    }}

    let h = update_params.delta_time * update_params.time_scale;
    p.velocity = p.velocity + update_params.gravity * h;
    p.position = p.position + p.velocity * h;
    if (update_params.collision_enabled != 0u) {{
        p.velocity = collide(p.position, p.velocity);
    }}
    p.rotation = p.rotation + p.angular_velocity * h;
    p.age = p.age + h;

    if (p.age >= p.lifetime) {{
        p.active = 0u;
        pool_push(index);
    }}

    particles[index] = p;
}}

@compute @workgroup_size({workgroup_size})
fn emit(@builtin(global_invocation_id) global_id: vec3<u32>) {{
    let slot = pool_pop();
    if (slot == INVALID_SLOT) {{
        return;
    }}

    let s = hash(emit_params.seed ^ hash(global_id.x));
    let t = rand3(s + 3u);

    var p: Particle;
    p.position = emit_params.origin + (rand3(s) * 2.0 - 1.0) * emit_params.spread;
    p.active = 1u;
    p.velocity = emit_params.velocity_min * (1.0 - t) + emit_params.velocity_max * t;
    p.scale = emit_params.scale;
    p.rotation = rand3(s + 9u) * TAU;
    p.age = 0.0;
    p.angular_velocity = (rand3(s + 6u) * 2.0 - 1.0) * emit_params.angular_velocity;
    p.lifetime = emit_params.lifetime;
    p.color = emit_params.color;

    particles[slot] = p;
}}
"#,
        particle_struct = ParticleRecord::WGSL_STRUCT,
        update_struct = UPDATE_PARAMS_STRUCT,
        emit_struct = EMIT_PARAMS_STRUCT,
        pop_attempts = POP_ATTEMPTS,
        workgroup_size = workgroup_size,
    )
}

/// Generate the tile draw shader.
///
/// Each vertex carries its copy index in UV1. Together with the tile's
/// `id_offset` that names the slot whose particle the copy shows. Copies
/// whose slot is past the capacity or inactive are moved outside the clip
/// volume.
pub fn draw_shader() -> String {
    format!(
        r#"
// Combined-mesh particle tiles

{particle_struct}

struct Camera {{
    view_proj: mat4x4<f32>,
    light_dir: vec4<f32>,
}};

struct Tile {{
    id_offset: u32,
    copies_per_tile: u32,
    capacity: u32,
    _pad: u32,
}};

@group(0) @binding(0)
var<uniform> camera: Camera;

@group(0) @binding(1)
var<storage, read> particles: array<Particle>;

@group(1) @binding(0)
var<uniform> tile: Tile;

struct VertexInput {{
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(4) uv1: vec2<f32>,
}};

struct VertexOutput {{
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec4<f32>,
    @location(1) normal: vec3<f32>,
}};

// X first, then Y, then Z.
fn euler_xyz(r: vec3<f32>) -> mat3x3<f32> {{
    let cx = cos(r.x);
    let sx = sin(r.x);
    let cy = cos(r.y);
    let sy = sin(r.y);
    let cz = cos(r.z);
    let sz = sin(r.z);
    let rx = mat3x3<f32>(vec3<f32>(1.0, 0.0, 0.0), vec3<f32>(0.0, cx, sx), vec3<f32>(0.0, -sx, cx));
    let ry = mat3x3<f32>(vec3<f32>(cy, 0.0, -sy), vec3<f32>(0.0, 1.0, 0.0), vec3<f32>(sy, 0.0, cy));
    let rz = mat3x3<f32>(vec3<f32>(cz, sz, 0.0), vec3<f32>(-sz, cz, 0.0), vec3<f32>(0.0, 0.0, 1.0));
    return rz * ry * rx;
}}

@vertex
fn vs_main(model: VertexInput) -> VertexOutput {{
    var out: VertexOutput;
    out.clip_position = vec4<f32>(2.0, 2.0, 2.0, 1.0);

    let slot = tile.id_offset + u32(model.uv1.x);
    if (slot >= tile.capacity) {{
        return out;
    }}
    let p = particles[slot];
    if (p.active == 0u) {{
        return out;
    }}

    let rotation = euler_xyz(p.rotation);
    let world = rotation * (model.position * p.scale) + p.position;
    out.clip_position = camera.view_proj * vec4<f32>(world, 1.0);
    out.color = p.color;
    out.normal = rotation * model.normal;
    return out;
}}

@fragment
fn fs_main(frag: VertexOutput) -> @location(0) vec4<f32> {{
    let n = normalize(frag.normal);
    let diffuse = max(dot(n, camera.light_dir.xyz), 0.0);
    let ambient = camera.light_dir.w;
    let shade = ambient + (1.0 - ambient) * diffuse;
    return vec4<f32>(frag.color.rgb * shade, frag.color.a);
}}
"#,
        particle_struct = ParticleRecord::WGSL_STRUCT,
    )
}
