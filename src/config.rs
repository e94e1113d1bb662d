//! System configuration.
//!
//! ```ignore
//! let config = SystemConfig::new(20_000)
//!     .with_gravity(Vec3::new(0.0, -9.8, 0.0))
//!     .with_cadence(EmissionCadence::Continuous)
//!     .with_emit(EmitParams::fountain());
//! config.save("particles.json")?;
//! ```

use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::emitter::{EmissionCadence, EmitParams};
use crate::error::{ParticleError, Result};
use crate::mesh::{DEFAULT_BOUNDS_HALF_EXTENT, VERTEX_CEILING};
use crate::provider::CHANNEL_COUNT;

/// Screen-space collision settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionConfig {
    pub enabled: bool,
    /// Provider channel holding encoded normals.
    pub normal_channel: usize,
    /// 0 stops the normal component, 1 reflects it fully.
    pub restitution: f32,
    /// Penetration depth (NDC units) beyond which a particle is considered
    /// behind the surface rather than inside it.
    pub thickness: f32,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            normal_channel: 2,
            restitution: 0.5,
            thickness: 0.01,
        }
    }
}

/// Everything a [`ParticleSystem`](crate::ParticleSystem) needs besides the
/// backend and the source mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Number of particle slots.
    pub capacity: u32,
    /// Compute workgroup width.
    pub group_width: u32,
    /// Upper bound on workgroups per emit dispatch.
    pub emit_group_cap: u32,
    /// Maximum vertices per combined-mesh tile.
    pub vertex_ceiling: u32,
    pub time_scale: f32,
    pub gravity: Vec3,
    pub cadence: EmissionCadence,
    pub emit: EmitParams,
    pub collision: CollisionConfig,
    /// Half-extent of the culling box around the simulation origin.
    pub bounds_half_extent: f32,
    /// Initial RNG seed; advanced once per emit.
    pub seed: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            group_width: 8,
            emit_group_cap: 10,
            vertex_ceiling: VERTEX_CEILING,
            time_scale: 1.0,
            gravity: Vec3::ZERO,
            cadence: EmissionCadence::OnRequest,
            emit: EmitParams::default(),
            collision: CollisionConfig::default(),
            bounds_half_extent: DEFAULT_BOUNDS_HALF_EXTENT,
            seed: 0x2545_f491,
        }
    }
}

impl SystemConfig {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_group_width(mut self, width: u32) -> Self {
        self.group_width = width;
        self
    }

    pub fn with_emit_group_cap(mut self, cap: u32) -> Self {
        self.emit_group_cap = cap;
        self
    }

    pub fn with_vertex_ceiling(mut self, ceiling: u32) -> Self {
        self.vertex_ceiling = ceiling;
        self
    }

    pub fn with_time_scale(mut self, scale: f32) -> Self {
        self.time_scale = scale;
        self
    }

    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_cadence(mut self, cadence: EmissionCadence) -> Self {
        self.cadence = cadence;
        self
    }

    pub fn with_emit(mut self, emit: EmitParams) -> Self {
        self.emit = emit;
        self
    }

    pub fn with_collision(mut self, collision: CollisionConfig) -> Self {
        self.collision = collision;
        self
    }

    pub fn with_bounds_half_extent(mut self, half_extent: f32) -> Self {
        self.bounds_half_extent = half_extent;
        self
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }

    /// Reject configurations no backend can run.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ParticleError::InvalidConfig(msg));

        if self.capacity == 0 {
            return invalid("capacity must be at least 1".into());
        }
        if self.group_width == 0 {
            return invalid("group_width must be at least 1".into());
        }
        if self.emit_group_cap == 0 {
            return invalid("emit_group_cap must be at least 1".into());
        }
        if self.vertex_ceiling == 0 {
            return invalid("vertex_ceiling must be at least 1".into());
        }
        if !(self.emit.lifetime > 0.0) {
            return invalid(format!("lifetime must be positive, got {}", self.emit.lifetime));
        }
        if !(self.time_scale >= 0.0 && self.time_scale.is_finite()) {
            return invalid(format!(
                "time_scale must be finite and non-negative, got {}",
                self.time_scale
            ));
        }
        if self.collision.normal_channel >= CHANNEL_COUNT {
            return invalid(format!(
                "normal_channel {} out of range 0..{}",
                self.collision.normal_channel, CHANNEL_COUNT
            ));
        }
        if !(self.bounds_half_extent > 0.0) {
            return invalid(format!(
                "bounds_half_extent must be positive, got {}",
                self.bounds_half_extent
            ));
        }
        Ok(())
    }

    // =========================================================================
    // PERSISTENCE
    // =========================================================================

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }
}
