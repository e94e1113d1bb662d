//! The particle system orchestrator.
//!
//! [`ParticleSystem`] owns the combined mesh, the configuration and, while
//! running, the backend session holding the particle buffer and slot pool.
//! The caller's frame loop drives it explicitly:
//!
//! ```ignore
//! let mut system = ParticleSystem::new(CpuBackend::new(), SourceMesh::cube(), config)?;
//! system.start()?;
//! loop {
//!     let report = system.step(&FrameInput::new(dt).with_emit(EmitRequest::default()))?;
//!     // draw...
//! }
//! system.stop();
//! ```
//!
//! Each step runs, in order:
//!
//! 1. **Update** over every slot (`ceil(capacity / group_width)` groups),
//!    colliding against the provider's textures when it has a frame.
//! 2. **Emit**, if the cadence asks for it: read back the pool size, then
//!    dispatch `min(emit_group_cap, pool_size / group_width)` groups, or skip
//!    when that is zero.
//!
//! Drawing happens outside `step`, through the backend-specific `draw`.

use std::sync::Arc;

use glam::{Mat4, Vec2};
use log::{debug, info, trace, warn};

use crate::backend::{Backend, SessionLayout};
use crate::config::SystemConfig;
use crate::dispatch::DispatchConfig;
use crate::emitter::{EmissionCadence, EmitRequest};
use crate::error::{ParticleError, Result};
use crate::mesh::{Aabb, CombinedMesh, SourceMesh};
use crate::provider::{CollisionStatus, CollisionTextures, DepthNormalProvider};
use crate::uniforms::{EmitUniforms, UpdateUniforms};

/// Shared handle to a depth/normal provider producing `T` textures.
pub type SharedProvider<T> = Arc<dyn DepthNormalProvider<Texture = T>>;

/// Per-frame input to [`ParticleSystem::step`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInput {
    /// Seconds since the previous step, before `time_scale`.
    pub delta_time: f32,
    pub view_proj: Mat4,
    /// Size in pixels of the provider's textures.
    pub viewport: Vec2,
    pub emit: Option<EmitRequest>,
}

impl FrameInput {
    pub fn new(delta_time: f32) -> Self {
        Self {
            delta_time,
            view_proj: Mat4::IDENTITY,
            viewport: Vec2::ONE,
            emit: None,
        }
    }

    pub fn with_camera(mut self, view_proj: Mat4, viewport: Vec2) -> Self {
        self.view_proj = view_proj;
        self.viewport = viewport;
        self
    }

    pub fn with_emit(mut self, request: EmitRequest) -> Self {
        self.emit = Some(request);
        self
    }

    /// Reject a negative or non-finite `delta_time`. Either would stop ages
    /// from growing, so expired slots would never return to the pool.
    pub fn validate(&self) -> Result<()> {
        if !(self.delta_time >= 0.0 && self.delta_time.is_finite()) {
            return Err(ParticleError::InvalidFrame(format!(
                "delta_time must be finite and non-negative, got {}",
                self.delta_time
            )));
        }
        Ok(())
    }
}

/// What the emit stage did on a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmitOutcome {
    /// The cadence did not call for an emit.
    #[default]
    NotRequested,
    /// Too few free slots for one workgroup.
    Skipped { pool_size: u32 },
    Dispatched { pool_size: u32, groups: u32 },
}

impl EmitOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, EmitOutcome::Dispatched { .. })
    }
}

/// Summary of one [`ParticleSystem::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepReport {
    /// False when the system was stopped and nothing ran.
    pub running: bool,
    pub update_groups: u32,
    pub collision: CollisionStatus,
    pub emit: EmitOutcome,
}

impl StepReport {
    fn idle() -> Self {
        Self::default()
    }
}

/// A pool of particles simulated by backend `B`.
pub struct ParticleSystem<B: Backend> {
    backend: B,
    source: SourceMesh,
    mesh: CombinedMesh,
    config: SystemConfig,
    sizing: DispatchConfig,
    provider: Option<SharedProvider<B::Texture>>,
    session: Option<B::Session>,
    seed: u32,
    last_collision: CollisionStatus,
}

impl<B: Backend> ParticleSystem<B> {
    /// Build the combined mesh for `source`. Fails with
    /// [`CapacityMismatch`](crate::ParticleError::CapacityMismatch) if not even
    /// one copy of the mesh fits under the vertex ceiling.
    pub fn new(backend: B, source: SourceMesh, config: SystemConfig) -> Result<Self> {
        config.validate()?;
        let mesh = build_mesh(&source, &config)?;

        Ok(Self {
            backend,
            source,
            mesh,
            sizing: DispatchConfig::from_config(&config),
            seed: config.seed,
            config,
            provider: None,
            session: None,
            last_collision: CollisionStatus::Disabled,
        })
    }

    /// Collide against `provider`'s textures on every step.
    pub fn with_provider(mut self, provider: SharedProvider<B::Texture>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn set_provider(&mut self, provider: Option<SharedProvider<B::Texture>>) {
        self.provider = provider;
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Allocate the session and run `init`. Does nothing if already running.
    pub fn start(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let layout = SessionLayout {
            capacity: self.config.capacity,
            group_width: self.config.group_width,
            mesh: &self.mesh,
        };
        let mut session = self.backend.open_session(&layout)?;

        let groups = self.sizing.update_groups(self.config.capacity);
        if let Err(e) = self.backend.dispatch_init(&mut session, groups) {
            self.backend.close_session(session);
            return Err(e);
        }

        self.session = Some(session);
        self.seed = self.config.seed;
        self.last_collision = CollisionStatus::Disabled;
        info!(
            "particle system started: capacity {}, {} copies per tile, {} tiles",
            self.config.capacity,
            self.mesh.copies_per_tile,
            self.mesh.tile_count()
        );
        Ok(())
    }

    /// Wait for in-flight work and release the session. Particle state is
    /// discarded; the next `start` begins from `init` again.
    pub fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            self.backend.close_session(session);
            info!("particle system stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// Run one frame: update, then emit per the configured cadence.
    ///
    /// Fails with [`InvalidFrame`](ParticleError::InvalidFrame) before touching
    /// any particle if `input.delta_time` is negative or not finite.
    pub fn step(&mut self, input: &FrameInput) -> Result<StepReport> {
        input.validate()?;

        let Self {
            backend,
            config,
            sizing,
            provider,
            session,
            seed,
            last_collision,
            ..
        } = self;

        let Some(session) = session.as_mut() else {
            warn!("step called on a stopped particle system");
            return Ok(StepReport::idle());
        };

        let (collision, textures) = match provider {
            Some(provider) if config.collision.enabled => {
                match CollisionTextures::fetch(provider.as_ref(), config.collision.normal_channel) {
                    Some(textures) => (CollisionStatus::Applied, Some(textures)),
                    None => (CollisionStatus::ProviderUnavailable, None),
                }
            }
            _ => (CollisionStatus::Disabled, None),
        };
        if collision != *last_collision {
            debug!("collision {:?} -> {:?}", last_collision, collision);
            *last_collision = collision;
        }

        let params = UpdateUniforms::new(config, input.delta_time, input.view_proj, input.viewport)
            .with_collision(textures.is_some());
        let update_groups = sizing.update_groups(config.capacity);
        trace!("update: {} groups", update_groups);
        backend.dispatch_update(session, &params, textures.as_ref(), update_groups)?;

        let wants_emit = match config.cadence {
            EmissionCadence::OnRequest => input.emit.is_some(),
            EmissionCadence::Continuous => true,
        };

        let emit = if wants_emit {
            let pool_size = backend.read_pool_size(session)?;
            let groups = sizing.emit_groups(pool_size);
            if groups == 0 {
                debug!("emit skipped: {} free slots", pool_size);
                EmitOutcome::Skipped { pool_size }
            } else {
                let origin = input
                    .emit
                    .and_then(|request| request.origin)
                    .unwrap_or(config.emit.origin);
                let params = EmitUniforms::new(&config.emit, origin, *seed);
                *seed = seed.wrapping_add(1);
                trace!("emit: {} groups from {} free slots", groups, pool_size);
                backend.dispatch_emit(session, &params, groups)?;
                EmitOutcome::Dispatched { pool_size, groups }
            }
        } else {
            EmitOutcome::NotRequested
        };

        Ok(StepReport {
            running: true,
            update_groups,
            collision,
            emit,
        })
    }

    // =========================================================================
    // RECONFIGURATION
    // =========================================================================

    /// Replace the configuration.
    ///
    /// Changing capacity, group width or vertex ceiling rebuilds the combined
    /// mesh and, if running, restarts the system (discarding live particles).
    /// Other fields take effect on the next step; a new `seed` restarts the
    /// emit sequence from that seed.
    pub fn reconfigure(&mut self, config: SystemConfig) -> Result<()> {
        config.validate()?;
        let structural = config.capacity != self.config.capacity
            || config.group_width != self.config.group_width
            || config.vertex_ceiling != self.config.vertex_ceiling;

        if !structural {
            if config.bounds_half_extent != self.config.bounds_half_extent {
                self.mesh.bounds = Aabb::cube(config.bounds_half_extent);
            }
            if config.seed != self.config.seed {
                self.seed = config.seed;
            }
            self.sizing = DispatchConfig::from_config(&config);
            self.config = config;
            return Ok(());
        }

        let mesh = build_mesh(&self.source, &config)?;
        self.restart_with(|system| {
            system.mesh = mesh;
            system.sizing = DispatchConfig::from_config(&config);
            system.config = config;
        })
    }

    /// Replace the source mesh, rebuilding the tiles if its shape changed.
    pub fn set_source_mesh(&mut self, source: SourceMesh) -> Result<()> {
        if !self.mesh.needs_rebuild(&source, self.config.capacity) {
            self.source = source;
            return Ok(());
        }

        let mesh = build_mesh(&source, &self.config)?;
        self.restart_with(|system| {
            system.mesh = mesh;
            system.source = source;
        })
    }

    fn restart_with(&mut self, apply: impl FnOnce(&mut Self)) -> Result<()> {
        let was_running = self.is_running();
        self.stop();
        apply(self);
        if was_running {
            self.start()?;
        }
        Ok(())
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn mesh(&self) -> &CombinedMesh {
        &self.mesh
    }

    pub fn source_mesh(&self) -> &SourceMesh {
        &self.source
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Seed the next emit dispatch will use.
    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub(crate) fn session(&self) -> Option<&B::Session> {
        self.session.as_ref()
    }
}

impl<B: Backend> Drop for ParticleSystem<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_mesh(source: &SourceMesh, config: &SystemConfig) -> Result<CombinedMesh> {
    Ok(CombinedMesh::build(source, config.capacity, config.vertex_ceiling)?
        .with_bounds(Aabb::cube(config.bounds_half_extent)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuBackend;
    use crate::emitter::EmitParams;

    fn system(capacity: u32) -> ParticleSystem<CpuBackend> {
        let config = SystemConfig::new(capacity).with_emit(EmitParams::default().with_lifetime(1.0));
        ParticleSystem::new(CpuBackend::new(), SourceMesh::quad(), config).unwrap()
    }

    #[test]
    fn test_new_rejects_oversized_mesh() {
        let config = SystemConfig::new(10).with_vertex_ceiling(3);
        let result = ParticleSystem::new(CpuBackend::new(), SourceMesh::quad(), config);
        assert!(matches!(
            result,
            Err(ParticleError::CapacityMismatch { vertex_count: 4, ceiling: 3 })
        ));
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut system = system(64);
        system.start().unwrap();
        system.step(&FrameInput::new(0.1).with_emit(EmitRequest::default())).unwrap();
        let active = system.active_count();
        assert!(active > 0);

        system.start().unwrap();
        assert_eq!(system.active_count(), active);
    }

    #[test]
    fn test_on_request_cadence() {
        let mut system = system(256);
        system.start().unwrap();

        let idle = system.step(&FrameInput::new(0.016)).unwrap();
        assert_eq!(idle.emit, EmitOutcome::NotRequested);
        assert_eq!(idle.update_groups, 32);

        let report = system.step(&FrameInput::new(0.016).with_emit(EmitRequest::default())).unwrap();
        assert_eq!(report.emit, EmitOutcome::Dispatched { pool_size: 256, groups: 10 });
        assert_eq!(system.active_count(), 80);
    }

    #[test]
    fn test_continuous_cadence_emits_once_per_step() {
        let mut system = system(1000);
        system
            .reconfigure(system.config().clone().with_cadence(EmissionCadence::Continuous))
            .unwrap();
        system.start().unwrap();

        for step in 1..=3 {
            let report = system.step(&FrameInput::new(0.0).with_emit(EmitRequest::default())).unwrap();
            assert!(report.emit.is_dispatched());
            assert_eq!(system.active_count(), 80 * step);
        }
    }

    #[test]
    fn test_seed_advances_per_emit() {
        let mut system = system(128);
        system.start().unwrap();
        let initial = system.seed();

        system.step(&FrameInput::new(0.0)).unwrap();
        assert_eq!(system.seed(), initial);

        system.step(&FrameInput::new(0.0).with_emit(EmitRequest::default())).unwrap();
        assert_eq!(system.seed(), initial.wrapping_add(1));
    }

    #[test]
    fn test_reconfigure_capacity_restarts() {
        let mut system = system(64);
        system.start().unwrap();
        system.step(&FrameInput::new(0.0).with_emit(EmitRequest::default())).unwrap();

        system.reconfigure(system.config().clone().with_capacity(128)).unwrap();
        assert!(system.is_running());
        assert_eq!(system.particles().len(), 128);
        assert_eq!(system.free_count(), 128);
        assert_eq!(system.mesh().capacity(), 128);
    }

    #[test]
    fn test_reconfigure_soft_keeps_particles() {
        let mut system = system(64);
        system.start().unwrap();
        system.step(&FrameInput::new(0.0).with_emit(EmitRequest::default())).unwrap();
        let active = system.active_count();

        system.reconfigure(system.config().clone().with_time_scale(2.0)).unwrap();
        assert_eq!(system.active_count(), active);
        assert_eq!(system.config().time_scale, 2.0);
    }

    #[test]
    fn test_set_source_mesh_rebuilds_tiles() {
        let mut system = system(100);
        let copies = system.mesh().copies_per_tile;

        system.set_source_mesh(SourceMesh::cube()).unwrap();
        assert_ne!(system.mesh().copies_per_tile, copies);
        assert_eq!(system.mesh().copies_per_tile, 65534 / 24);
    }

    #[test]
    fn test_set_source_mesh_rebuilds_same_count_geometry() {
        let mut system = system(100);
        system.start().unwrap();
        system.set_source_mesh(SourceMesh::cube()).unwrap();

        let mut scaled = SourceMesh::cube();
        for p in &mut scaled.positions {
            *p *= 4.0;
        }
        system.set_source_mesh(scaled).unwrap();

        assert!(system.is_running());
        assert_eq!(system.mesh().vertices[0].position, [-2.0, -2.0, 2.0]);
        let last = system.mesh().vertices.last().unwrap();
        assert_eq!(
            last.position,
            system.source_mesh().positions.last().unwrap().to_array()
        );
    }

    #[test]
    fn test_reconfigure_seed_applies_immediately() {
        let mut system = system(64);
        system.start().unwrap();
        system.step(&FrameInput::new(0.0).with_emit(EmitRequest::default())).unwrap();
        assert_ne!(system.seed(), 1234);

        system.reconfigure(system.config().clone().with_seed(1234)).unwrap();
        assert_eq!(system.seed(), 1234);
    }

    #[test]
    fn test_frame_input_validation() {
        assert!(FrameInput::new(0.0).validate().is_ok());
        assert!(FrameInput::new(0.016).validate().is_ok());
        for dt in [-0.1, f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            assert!(matches!(
                FrameInput::new(dt).validate(),
                Err(ParticleError::InvalidFrame(_))
            ));
        }
    }
}
