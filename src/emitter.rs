//! Emission parameters and cadence.
//!
//! Each emit dispatch pops free slots from the pool and initializes one
//! particle per invocation. Every attribute is drawn uniformly from the ranges
//! in [`EmitParams`]:
//!
//! | Attribute | Value |
//! |-----------|-------|
//! | position | `origin + (r * 2 - 1) * spread` |
//! | velocity | `mix(velocity_min, velocity_max, r)` |
//! | angular velocity | `(r * 2 - 1) * radians(angular_velocity)` |
//! | rotation | `r * TAU` |
//! | scale, lifetime, color | fixed |
//!
//! # Example
//!
//! ```ignore
//! let params = EmitParams::fountain()
//!     .with_origin(Vec3::new(0.0, -0.5, 0.0))
//!     .with_lifetime(3.0);
//! ```

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Ranges used to initialize freshly emitted particles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitParams {
    /// Centre of the spawn volume.
    pub origin: Vec3,
    /// Half-extents of the spawn box around `origin`.
    pub spread: Vec3,
    pub velocity_min: Vec3,
    pub velocity_max: Vec3,
    /// Maximum angular speed per axis in degrees per second.
    pub angular_velocity: Vec3,
    pub scale: f32,
    /// Seconds.
    pub lifetime: f32,
    pub color: Vec4,
}

impl Default for EmitParams {
    fn default() -> Self {
        Self {
            origin: Vec3::ZERO,
            spread: Vec3::ONE,
            velocity_min: Vec3::new(-2.0, -5.0, -2.0),
            velocity_max: Vec3::new(2.0, 5.0, 2.0),
            angular_velocity: Vec3::splat(45.0),
            scale: 0.2,
            lifetime: 2.0,
            color: Vec4::ONE,
        }
    }
}

impl EmitParams {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // PRESETS
    // =========================================================================

    /// Fountain: particles shoot upward from a tight nozzle and tumble slowly.
    pub fn fountain() -> Self {
        Self {
            spread: Vec3::splat(0.05),
            velocity_min: Vec3::new(-0.4, 2.0, -0.4),
            velocity_max: Vec3::new(0.4, 3.0, 0.4),
            angular_velocity: Vec3::splat(90.0),
            scale: 0.05,
            lifetime: 3.0,
            color: Vec4::new(0.7, 0.85, 1.0, 1.0),
            ..Default::default()
        }
    }

    /// Burst: fast omnidirectional debris that dies quickly.
    pub fn burst() -> Self {
        Self {
            spread: Vec3::splat(0.1),
            velocity_min: Vec3::splat(-3.0),
            velocity_max: Vec3::splat(3.0),
            angular_velocity: Vec3::splat(360.0),
            scale: 0.08,
            lifetime: 1.2,
            color: Vec4::new(1.0, 0.6, 0.2, 1.0),
            ..Default::default()
        }
    }

    /// Sparks: small, short-lived, biased upward.
    pub fn sparks() -> Self {
        Self {
            spread: Vec3::splat(0.02),
            velocity_min: Vec3::new(-1.0, 0.5, -1.0),
            velocity_max: Vec3::new(1.0, 2.5, 1.0),
            angular_velocity: Vec3::ZERO,
            scale: 0.02,
            lifetime: 0.6,
            color: Vec4::new(1.0, 0.9, 0.5, 1.0),
            ..Default::default()
        }
    }

    // =========================================================================
    // BUILDER
    // =========================================================================

    pub fn with_origin(mut self, origin: Vec3) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_spread(mut self, spread: Vec3) -> Self {
        self.spread = spread;
        self
    }

    pub fn with_velocity(mut self, min: Vec3, max: Vec3) -> Self {
        self.velocity_min = min;
        self.velocity_max = max;
        self
    }

    /// Maximum angular speed in degrees per second.
    pub fn with_angular_velocity(mut self, degrees_per_second: Vec3) -> Self {
        self.angular_velocity = degrees_per_second;
        self
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_lifetime(mut self, lifetime: f32) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn with_color(mut self, color: Vec4) -> Self {
        self.color = color;
        self
    }
}

/// When the emit stage runs.
///
/// Either way at most one emit dispatch is issued per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EmissionCadence {
    /// Emit only on steps whose [`FrameInput`](crate::FrameInput) carries an
    /// [`EmitRequest`] (input-triggered).
    #[default]
    OnRequest,
    /// Emit on every step. A request only overrides the origin.
    Continuous,
}

/// A request to emit on this step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EmitRequest {
    /// Spawn centre for this emit, replacing [`EmitParams::origin`].
    pub origin: Option<Vec3>,
}

impl EmitRequest {
    pub fn at(origin: Vec3) -> Self {
        Self { origin: Some(origin) }
    }
}
