//! # poolfx
//!
//! GPU-resident particle pools with a compute free-list allocator.
//!
//! A fixed buffer of `capacity` particle slots lives on the device. Slots are
//! recycled through a stack of free indices: the update kernel pushes a slot
//! back when its particle expires, the emit kernel pops slots to spawn new
//! particles. The host never tracks individual particles; it only reads back
//! the free count to size emit dispatches.
//!
//! Particles are drawn as copies of a small source mesh packed into
//! combined-mesh tiles under the per-draw vertex ceiling. Each copy stores its
//! index in UV1 and the vertex shader looks up the particle at
//! `tile_offset + copy`, so every live particle is drawn with a handful of
//! draw calls and no per-particle host work.
//!
//! ## Quick Start
//!
//! ```ignore
//! use poolfx::prelude::*;
//!
//! let context = GpuContext::headless()?;
//! let backend = GpuBackend::new(context.clone(), wgpu::TextureFormat::Bgra8UnormSrgb);
//! let config = SystemConfig::new(20_000).with_emit(EmitParams::fountain());
//!
//! let mut system = ParticleSystem::new(backend, SourceMesh::tetrahedron(), config)?;
//! system.start()?;
//!
//! // every frame
//! let input = FrameInput::new(dt)
//!     .with_camera(view_proj, Vec2::new(width, height))
//!     .with_emit(EmitRequest::default());
//! let report = system.step(&input)?;
//! system.draw(&mut render_pass);
//!
//! system.stop();
//! ```
//!
//! ## Stages
//!
//! | Stage | Runs | Sized by |
//! |-------|------|----------|
//! | Init | on `start()` | `ceil(capacity / group_width)` |
//! | Update | every `step()` | `ceil(capacity / group_width)` |
//! | Emit | per [`EmissionCadence`] | `min(emit_group_cap, pool_size / group_width)` |
//! | Draw | `draw()` | one draw per tile |
//!
//! ## Collision
//!
//! Inject a [`DepthNormalProvider`] with
//! [`ParticleSystem::with_provider`]. The update kernel projects each particle
//! to the screen and reflects its velocity off the captured surface. A
//! provider with no frame yet simply disables collision for that step.
//!
//! ## Backends
//!
//! - [`gpu::GpuBackend`]: wgpu compute and render.
//! - [`cpu::CpuBackend`]: the same kernels on the host with rayon, for
//!   headless runs and tests.

pub mod backend;
pub mod config;
pub mod cpu;
pub mod dispatch;
pub mod emitter;
pub mod error;
pub mod gpu;
pub mod kernel;
pub mod mesh;
pub mod particle;
pub mod pool;
pub mod provider;
pub mod shaders;
mod system;
pub mod uniforms;

pub use backend::{Backend, SessionLayout};
pub use bytemuck;
pub use config::{CollisionConfig, SystemConfig};
pub use emitter::{EmissionCadence, EmitParams, EmitRequest};
pub use error::{GpuError, ParticleError, Result};
pub use glam::{Mat4, Vec2, Vec3, Vec4};
pub use mesh::{Aabb, CombinedMesh, MeshTile, MeshVertex, SourceMesh, VERTEX_CEILING};
pub use particle::ParticleRecord;
pub use pool::{EmptyPool, LifoSlotPool, SlotPool};
pub use provider::{CollisionStatus, CollisionTextures, DepthNormalProvider, CHANNEL_COUNT};
pub use system::{EmitOutcome, FrameInput, ParticleSystem, SharedProvider, StepReport};
pub use wgpu;

/// Convenient re-exports for common usage.
///
/// ```ignore
/// use poolfx::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{CollisionConfig, SystemConfig};
    pub use crate::cpu::{CpuBackend, CpuTexture, StaticCapture};
    pub use crate::emitter::{EmissionCadence, EmitParams, EmitRequest};
    pub use crate::error::{ParticleError, Result};
    pub use crate::gpu::{GpuBackend, GpuContext, SceneCapture};
    pub use crate::mesh::{CombinedMesh, SourceMesh};
    pub use crate::provider::{CollisionStatus, DepthNormalProvider};
    pub use crate::system::{EmitOutcome, FrameInput, ParticleSystem, StepReport};
    pub use crate::{Mat4, Vec2, Vec3, Vec4};
}
