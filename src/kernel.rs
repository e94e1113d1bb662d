//! Host-side kernel math.
//!
//! These functions are the per-invocation bodies of the `emit` and `update`
//! compute kernels. The CPU backend runs them directly; the WGSL generated in
//! [`shaders`](crate::shaders) performs the same arithmetic in the same order,
//! including the integer hash, so both backends produce identical particles
//! for identical inputs.

use glam::{UVec2, Vec2, Vec3, Vec4, Vec4Swizzles};

use crate::particle::ParticleRecord;
use crate::uniforms::{EmitUniforms, UpdateUniforms};

/// Returned by the WGSL `pool_pop` when the pool is empty.
pub const INVALID_SLOT: u32 = u32::MAX;

/// Integer hash used for every random draw.
#[inline]
pub fn hash(n: u32) -> u32 {
    let mut x = n;
    x ^= x >> 17;
    x = x.wrapping_mul(0xed5a_d4bb);
    x ^= x >> 11;
    x = x.wrapping_mul(0xac4c_1b51);
    x ^= x >> 15;
    x = x.wrapping_mul(0x3184_8bab);
    x ^= x >> 14;
    x
}

/// Uniform float in `[0, 1]`.
#[inline]
pub fn rand(seed: u32) -> f32 {
    hash(seed) as f32 / 4_294_967_295.0
}

#[inline]
pub fn rand3(seed: u32) -> Vec3 {
    Vec3::new(
        rand(seed),
        rand(seed.wrapping_add(1)),
        rand(seed.wrapping_add(2)),
    )
}

/// Seed for one emit invocation.
#[inline]
pub fn invocation_seed(seed: u32, invocation: u32) -> u32 {
    hash(seed ^ hash(invocation))
}

/// The record written by emit invocation `invocation` into the slot it popped.
pub fn emit_record(params: &EmitUniforms, invocation: u32) -> ParticleRecord {
    let s = invocation_seed(params.seed, invocation);
    let origin = Vec3::from_array(params.origin);
    let spread = Vec3::from_array(params.spread);
    let velocity_min = Vec3::from_array(params.velocity_min);
    let velocity_max = Vec3::from_array(params.velocity_max);
    let angular = Vec3::from_array(params.angular_velocity);

    let position = origin + (rand3(s) * 2.0 - 1.0) * spread;
    let t = rand3(s.wrapping_add(3));
    let velocity = velocity_min * (1.0 - t) + velocity_max * t;
    let angular_velocity = (rand3(s.wrapping_add(6)) * 2.0 - 1.0) * angular;
    let rotation = rand3(s.wrapping_add(9)) * std::f32::consts::TAU;

    ParticleRecord {
        position: position.to_array(),
        active: 1,
        velocity: velocity.to_array(),
        scale: params.scale,
        rotation: rotation.to_array(),
        age: 0.0,
        angular_velocity: angular_velocity.to_array(),
        lifetime: params.lifetime,
        color: params.color,
    }
}

/// Read access to one collision texture.
pub trait TexelSource {
    fn dimensions(&self) -> UVec2;

    /// Texel at `coord`, which is always inside [`dimensions`](Self::dimensions).
    /// Depth textures return the depth in `x`.
    fn load(&self, coord: UVec2) -> Vec4;
}

/// Screen-space collision response for one particle.
///
/// Returns the velocity unchanged unless the particle projects onto the
/// screen, lies behind the captured surface by less than `thickness`, and is
/// moving into it.
pub fn collide<T: TexelSource + ?Sized>(
    params: &UpdateUniforms,
    depth: &T,
    normal: &T,
    position: Vec3,
    velocity: Vec3,
) -> Vec3 {
    let clip = params.view_proj() * position.extend(1.0);
    if clip.w <= 0.0 {
        return velocity;
    }
    let ndc = clip.xyz() / clip.w;
    if ndc.x.abs() > 1.0 || ndc.y.abs() > 1.0 || ndc.z < 0.0 || ndc.z > 1.0 {
        return velocity;
    }

    let uv = Vec2::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
    // Both textures are read at one texel, so stay inside the smaller.
    let dims = depth.dimensions().min(normal.dimensions()).max(UVec2::ONE);
    let texel = (uv * Vec2::from_array(params.viewport))
        .as_uvec2()
        .min(dims - UVec2::ONE);

    let scene_depth = depth.load(texel).x;
    let penetration = ndc.z - scene_depth;
    if penetration <= 0.0 || penetration >= params.thickness {
        return velocity;
    }

    let decoded = normal.load(texel).xyz() * 2.0 - 1.0;
    if decoded.length_squared() < 1e-6 {
        return velocity;
    }
    let n = decoded.normalize();
    let vn = velocity.dot(n);
    if vn >= 0.0 {
        return velocity;
    }
    velocity - (1.0 + params.restitution) * vn * n
}

/// Advance one slot by a step. Returns `true` when the particle expired on
/// this step and its slot must be returned to the pool.
pub fn update_record<T: TexelSource + ?Sized>(
    record: &mut ParticleRecord,
    params: &UpdateUniforms,
    collision: Option<(&T, &T)>,
) -> bool {
    if !record.is_active() {
        return false;
    }
    let h = params.step();

    let mut velocity = record.velocity() + Vec3::from_array(params.gravity) * h;
    let position = record.position() + velocity * h;
    if let Some((depth, normal)) = collision {
        if params.collision_enabled != 0 {
            velocity = collide(params, depth, normal, position, velocity);
        }
    }
    let rotation = record.rotation() + record.angular_velocity() * h;

    record.velocity = velocity.to_array();
    record.position = position.to_array();
    record.rotation = rotation.to_array();
    record.age += h;

    if record.age >= record.lifetime {
        record.active = 0;
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SystemConfig;
    use crate::emitter::EmitParams;
    use glam::Mat4;

    struct Flat {
        size: UVec2,
        value: Vec4,
    }

    impl TexelSource for Flat {
        fn dimensions(&self) -> UVec2 {
            self.size
        }

        fn load(&self, _coord: UVec2) -> Vec4 {
            self.value
        }
    }

    fn update_params(dt: f32) -> UpdateUniforms {
        UpdateUniforms::new(&SystemConfig::default(), dt, Mat4::IDENTITY, Vec2::new(4.0, 4.0))
    }

    #[test]
    fn test_hash_known_values() {
        assert_eq!(hash(0), 0);
        assert_ne!(hash(1), hash(2));
        assert!((0.0..=1.0).contains(&rand(12345)));
    }

    #[test]
    fn test_emit_record_within_ranges() {
        let params = EmitParams::default()
            .with_origin(Vec3::new(5.0, 0.0, 0.0))
            .with_spread(Vec3::splat(0.5));
        let uniforms = EmitUniforms::new(&params, params.origin, 42);

        for invocation in 0..256 {
            let record = emit_record(&uniforms, invocation);
            assert!(record.is_active());
            assert_eq!(record.age, 0.0);
            assert_eq!(record.lifetime, params.lifetime);

            let offset = record.position() - params.origin;
            assert!(offset.abs().cmple(params.spread + 1e-5).all());
            assert!(record.velocity().cmpge(params.velocity_min - 1e-5).all());
            assert!(record.velocity().cmple(params.velocity_max + 1e-5).all());
        }
    }

    #[test]
    fn test_emit_record_depends_on_seed_and_invocation() {
        let params = EmitParams::default();
        let a = EmitUniforms::new(&params, Vec3::ZERO, 1);
        let b = EmitUniforms::new(&params, Vec3::ZERO, 2);

        assert_ne!(emit_record(&a, 0), emit_record(&a, 1));
        assert_ne!(emit_record(&a, 0), emit_record(&b, 0));
        assert_eq!(emit_record(&a, 3), emit_record(&a, 3));
    }

    #[test]
    fn test_update_integrates_and_expires() {
        let mut record = ParticleRecord {
            active: 1,
            velocity: [1.0, 0.0, 0.0],
            angular_velocity: [0.0, 2.0, 0.0],
            lifetime: 0.25,
            ..ParticleRecord::inactive()
        };
        let params = update_params(0.1);

        assert!(!update_record::<Flat>(&mut record, &params, None));
        assert!((record.position[0] - 0.1).abs() < 1e-6);
        assert!((record.rotation[1] - 0.2).abs() < 1e-6);

        assert!(!update_record::<Flat>(&mut record, &params, None));
        assert!(update_record::<Flat>(&mut record, &params, None));
        assert!(!record.is_active());
    }

    #[test]
    fn test_update_skips_inactive() {
        let mut record = ParticleRecord::inactive();
        assert!(!update_record::<Flat>(&mut record, &update_params(1.0), None));
        assert_eq!(record, ParticleRecord::inactive());
    }

    #[test]
    fn test_collide_reflects_into_surface() {
        // Identity projection: NDC z equals world z.
        let params = update_params(0.0);
        let depth = Flat { size: UVec2::new(4, 4), value: Vec4::splat(0.5) };
        // Normal +Z encoded.
        let normal = Flat { size: UVec2::new(4, 4), value: Vec4::new(0.5, 0.5, 1.0, 1.0) };

        let velocity = collide(&params, &depth, &normal, Vec3::new(0.0, 0.0, 0.505), Vec3::new(1.0, 0.0, -2.0));
        assert!((velocity - Vec3::new(1.0, 0.0, 1.0)).length() < 1e-5);

        // Too far behind the surface.
        let behind = collide(&params, &depth, &normal, Vec3::new(0.0, 0.0, 0.9), Vec3::new(0.0, 0.0, -2.0));
        assert_eq!(behind, Vec3::new(0.0, 0.0, -2.0));

        // In front of the surface.
        let front = collide(&params, &depth, &normal, Vec3::new(0.0, 0.0, 0.2), Vec3::new(0.0, 0.0, -2.0));
        assert_eq!(front, Vec3::new(0.0, 0.0, -2.0));

        // Already moving away.
        let away = collide(&params, &depth, &normal, Vec3::new(0.0, 0.0, 0.505), Vec3::new(0.0, 0.0, 2.0));
        assert_eq!(away, Vec3::new(0.0, 0.0, 2.0));
    }

    #[test]
    fn test_collide_stays_inside_smaller_normal_texture() {
        use crate::cpu::CpuTexture;

        let params = update_params(0.0);
        let depth = CpuTexture::depth(4, 4, 0.5);
        let normal = CpuTexture::normal(1, 1, Vec3::Z);

        // Projects to texel (2, 2) of the depth texture, outside the normal one.
        let velocity = collide(&params, &depth, &normal, Vec3::new(0.0, 0.0, 0.505), Vec3::new(0.0, 0.0, -2.0));
        assert!((velocity - Vec3::new(0.0, 0.0, 1.0)).length() < 1e-5, "velocity {velocity:?}");
    }

    #[test]
    fn test_collide_ignores_offscreen() {
        let params = update_params(0.0);
        let depth = Flat { size: UVec2::ONE, value: Vec4::ZERO };
        let normal = Flat { size: UVec2::ONE, value: Vec4::new(0.5, 0.5, 1.0, 1.0) };
        let v = Vec3::new(0.0, 0.0, -1.0);

        assert_eq!(collide(&params, &depth, &normal, Vec3::new(1.5, 0.0, 0.001), v), v);
    }
}
