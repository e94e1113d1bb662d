//! The per-slot particle record.
//!
//! Every backend stores a flat array of [`ParticleRecord`]s, one per slot. The
//! layout is fixed so the same bytes can be bound as a storage buffer by the
//! compute kernels and by the tile vertex shader.
//!
//! | Offset | Field | WGSL type |
//! |--------|-------|-----------|
//! | 0  | `position` | `vec3<f32>` |
//! | 12 | `active` | `u32` |
//! | 16 | `velocity` | `vec3<f32>` |
//! | 28 | `scale` | `f32` |
//! | 32 | `rotation` | `vec3<f32>` |
//! | 44 | `age` | `f32` |
//! | 48 | `angular_velocity` | `vec3<f32>` |
//! | 60 | `lifetime` | `f32` |
//! | 64 | `color` | `vec4<f32>` |

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

/// One slot of the particle buffer.
///
/// Scalars are packed into the trailing bytes of each `vec3` so no explicit
/// padding fields are needed.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ParticleRecord {
    pub position: [f32; 3],
    /// 1 while the slot holds a live particle, 0 while it sits in the pool.
    pub active: u32,
    pub velocity: [f32; 3],
    pub scale: f32,
    /// Euler angles in radians, applied X then Y then Z.
    pub rotation: [f32; 3],
    /// Seconds since emission.
    pub age: f32,
    /// Radians per second.
    pub angular_velocity: [f32; 3],
    /// Seconds the particle lives for.
    pub lifetime: f32,
    pub color: [f32; 4],
}

const _: () = assert!(std::mem::size_of::<ParticleRecord>() == ParticleRecord::STRIDE);

impl ParticleRecord {
    /// Byte size of one record in the GPU buffer.
    pub const STRIDE: usize = 80;

    /// WGSL declaration matching the Rust layout exactly.
    pub const WGSL_STRUCT: &'static str = r#"struct Particle {
    position: vec3<f32>,
    active: u32,
    velocity: vec3<f32>,
    scale: f32,
    rotation: vec3<f32>,
    age: f32,
    angular_velocity: vec3<f32>,
    lifetime: f32,
    color: vec4<f32>,
};"#;

    /// An unoccupied slot, as written by the `Init` kernel.
    pub fn inactive() -> Self {
        Self::zeroed()
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active != 0
    }

    /// Active and not yet expired.
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.is_active() && self.age < self.lifetime
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    #[inline]
    pub fn velocity(&self) -> Vec3 {
        Vec3::from_array(self.velocity)
    }

    #[inline]
    pub fn rotation(&self) -> Vec3 {
        Vec3::from_array(self.rotation)
    }

    #[inline]
    pub fn angular_velocity(&self) -> Vec3 {
        Vec3::from_array(self.angular_velocity)
    }

    #[inline]
    pub fn color(&self) -> Vec4 {
        Vec4::from_array(self.color)
    }

    /// Remaining life as a fraction (1.0 at emission, 0.0 at expiry).
    pub fn life_fraction(&self) -> f32 {
        if self.lifetime <= 0.0 {
            return 0.0;
        }
        (1.0 - self.age / self.lifetime).clamp(0.0, 1.0)
    }
}
