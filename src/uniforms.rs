//! Parameter blocks uploaded to the kernels and the tile shader.
//!
//! Every struct here is `#[repr(C)]` and mirrors a WGSL `struct` in
//! [`shaders`](crate::shaders) byte for byte. `vec3` fields take 16 bytes in a
//! uniform buffer, so each one is followed by a scalar or an explicit pad.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};

use crate::config::SystemConfig;
use crate::emitter::EmitParams;

/// Per-step parameters of the `update` kernel.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct UpdateUniforms {
    /// Column-major, as `Mat4::to_cols_array_2d` produces and `mat4x4<f32>` expects.
    pub view_proj: [[f32; 4]; 4],
    pub gravity: [f32; 3],
    pub delta_time: f32,
    /// Collision texture size in pixels.
    pub viewport: [f32; 2],
    pub time_scale: f32,
    /// 1 when collision textures are bound for this step.
    pub collision_enabled: u32,
    pub restitution: f32,
    /// Maximum depth difference (NDC) still counted as a penetration.
    pub thickness: f32,
    pub capacity: u32,
    pub _pad: u32,
}

impl UpdateUniforms {
    pub fn new(config: &SystemConfig, delta_time: f32, view_proj: Mat4, viewport: Vec2) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            gravity: config.gravity.to_array(),
            delta_time,
            viewport: viewport.to_array(),
            time_scale: config.time_scale,
            collision_enabled: 0,
            restitution: config.collision.restitution,
            thickness: config.collision.thickness,
            capacity: config.capacity,
            _pad: 0,
        }
    }

    pub fn with_collision(mut self, enabled: bool) -> Self {
        self.collision_enabled = enabled as u32;
        self
    }

    /// Scaled step actually integrated by the kernel.
    pub fn step(&self) -> f32 {
        self.delta_time * self.time_scale
    }

    pub fn view_proj(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.view_proj)
    }
}

/// Parameters of one `emit` dispatch.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct EmitUniforms {
    pub origin: [f32; 3],
    pub scale: f32,
    pub spread: [f32; 3],
    pub lifetime: f32,
    pub velocity_min: [f32; 3],
    pub seed: u32,
    pub velocity_max: [f32; 3],
    pub _pad0: u32,
    /// Radians per second.
    pub angular_velocity: [f32; 3],
    pub _pad1: u32,
    pub color: [f32; 4],
}

impl EmitUniforms {
    /// Converts angular velocity from degrees to radians.
    pub fn new(params: &EmitParams, origin: Vec3, seed: u32) -> Self {
        let radians = params.angular_velocity * (std::f32::consts::PI / 180.0);
        Self {
            origin: origin.to_array(),
            scale: params.scale,
            spread: params.spread.to_array(),
            lifetime: params.lifetime,
            velocity_min: params.velocity_min.to_array(),
            seed,
            velocity_max: params.velocity_max.to_array(),
            _pad0: 0,
            angular_velocity: radians.to_array(),
            _pad1: 0,
            color: params.color.to_array(),
        }
    }
}

/// Per-tile addressing for the draw shader.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct TileUniforms {
    pub id_offset: u32,
    pub copies_per_tile: u32,
    pub capacity: u32,
    pub _pad: u32,
}

/// Camera block of the draw shader.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct CameraUniforms {
    pub view_proj: [[f32; 4]; 4],
    /// xyz: direction towards the light, w: ambient term.
    pub light_dir: [f32; 4],
}

impl CameraUniforms {
    pub fn new(view_proj: Mat4) -> Self {
        let light = Vec3::new(0.4, 1.0, 0.3).normalize();
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            light_dir: [light.x, light.y, light.z, 0.25],
        }
    }
}
