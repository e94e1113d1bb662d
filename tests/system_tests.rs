//! Integration tests for the particle system, driven through the CPU backend.
//!
//! The CPU backend runs the same kernels and pool protocol as the GPU backend,
//! so these exercise the orchestration contract end to end without an adapter.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use poolfx::cpu::{CpuBackend, CpuSession, CpuTexture, StaticCapture};
use poolfx::prelude::*;
use poolfx::uniforms::{EmitUniforms, UpdateUniforms};
use poolfx::{Backend, CollisionTextures, ParticleRecord, SessionLayout};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn cpu_system(config: SystemConfig) -> ParticleSystem<CpuBackend> {
    init_logging();
    ParticleSystem::new(CpuBackend::new(), SourceMesh::quad(), config).unwrap()
}

fn emit_frame(dt: f32) -> FrameInput {
    FrameInput::new(dt).with_emit(EmitRequest::default())
}

/// Active slots and free slots partition `0..capacity`.
fn assert_partition(system: &ParticleSystem<CpuBackend>) {
    let capacity = system.config().capacity;
    let active: Vec<u32> = system
        .particles()
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_active())
        .map(|(slot, _)| slot as u32)
        .collect();
    let free = system.free_slots();

    assert_eq!(active.len() as u32 + free.len() as u32, capacity);

    let free_set: HashSet<u32> = free.iter().copied().collect();
    assert_eq!(free_set.len(), free.len(), "slot pushed twice");
    for slot in &active {
        assert!(!free_set.contains(slot), "slot {slot} is both active and free");
    }
    assert!(free.iter().all(|&slot| slot < capacity));
}

// ============================================================================
// Pool invariants
// ============================================================================

#[test]
fn test_conservation_under_random_steps() {
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..20 {
        let capacity = rng.gen_range(1..300);
        let width = rng.gen_range(1..=16);
        let config = SystemConfig::new(capacity)
            .with_group_width(width)
            .with_emit_group_cap(rng.gen_range(1..=10))
            .with_emit(EmitParams::default().with_lifetime(rng.gen_range(0.05..1.0)));
        let mut system = cpu_system(config);
        system.start().unwrap();
        assert_partition(&system);

        for _ in 0..40 {
            let dt = rng.gen_range(0.0..0.3);
            let input = if rng.gen_bool(0.6) { emit_frame(dt) } else { FrameInput::new(dt) };
            system.step(&input).unwrap();
            assert_partition(&system);
        }
    }
}

#[test]
fn test_popped_slots_are_unique_until_pushed() {
    let config = SystemConfig::new(200).with_emit(EmitParams::default().with_lifetime(10.0));
    let mut system = cpu_system(config);
    system.start().unwrap();

    let mut seen = HashSet::new();
    for _ in 0..2 {
        let before: HashSet<u32> = system.free_slots().into_iter().collect();
        system.step(&emit_frame(0.0)).unwrap();
        let after: HashSet<u32> = system.free_slots().into_iter().collect();

        for slot in before.difference(&after) {
            assert!(seen.insert(*slot), "slot {slot} allocated twice");
            assert!(system.particles()[*slot as usize].is_active());
        }
    }
    assert_eq!(seen.len(), 160);
}

#[test]
fn test_age_monotonic_and_reset_on_emission() {
    let config = SystemConfig::new(64)
        .with_cadence(EmissionCadence::Continuous)
        .with_emit(EmitParams::default().with_lifetime(0.35));
    let mut system = cpu_system(config);
    system.start().unwrap();

    let mut previous: Vec<ParticleRecord> = system.particles().to_vec();
    for _ in 0..50 {
        system.step(&FrameInput::new(0.05)).unwrap();
        for (before, after) in previous.iter().zip(system.particles()) {
            if !after.is_active() {
                continue;
            }
            let newly_emitted = !before.is_active() || after.age < before.age;
            if newly_emitted {
                assert_eq!(after.age, 0.0);
            } else {
                assert!(after.age >= before.age);
            }
            assert!(after.age < after.lifetime);
        }
        previous = system.particles().to_vec();
    }
}

#[test]
fn test_expired_slots_are_free_in_same_step() {
    let config = SystemConfig::new(16).with_emit(EmitParams::default().with_lifetime(1.0));
    let mut system = cpu_system(config);
    system.start().unwrap();

    system.step(&emit_frame(0.0)).unwrap();
    assert_eq!(system.active_count(), 16);
    assert_eq!(system.free_count(), 0);

    system.step(&FrameInput::new(0.5)).unwrap();
    assert_eq!(system.active_count(), 16);

    let report = system.step(&FrameInput::new(0.5)).unwrap();
    assert_eq!(report.emit, EmitOutcome::NotRequested);
    assert_eq!(system.active_count(), 0);
    assert_eq!(system.free_count(), 16);

    // Reclaimed slots are poppable by the very next emit.
    let report = system.step(&emit_frame(0.0)).unwrap();
    assert_eq!(report.emit, EmitOutcome::Dispatched { pool_size: 16, groups: 2 });
    assert_eq!(system.active_count(), 16);
}

#[test]
fn test_full_pool_skips_emit() {
    let config = SystemConfig::new(10)
        .with_group_width(1)
        .with_emit(EmitParams::default().with_lifetime(5.0));
    let mut system = cpu_system(config);
    system.start().unwrap();

    let report = system.step(&emit_frame(0.0)).unwrap();
    assert_eq!(report.emit, EmitOutcome::Dispatched { pool_size: 10, groups: 10 });
    assert_eq!(system.active_count(), 10);

    let report = system.step(&emit_frame(0.0)).unwrap();
    assert_eq!(report.emit, EmitOutcome::Skipped { pool_size: 0 });
    assert_eq!(system.active_count(), 10);
    assert_eq!(system.free_count(), 0);
}

#[test]
fn test_pool_smaller_than_group_skips_emit() {
    let config = SystemConfig::new(4).with_group_width(8);
    let mut system = cpu_system(config);
    system.start().unwrap();

    let report = system.step(&emit_frame(0.0)).unwrap();
    assert_eq!(report.emit, EmitOutcome::Skipped { pool_size: 4 });
    assert_eq!(system.active_count(), 0);
}

// ============================================================================
// Kernel contract
// ============================================================================

#[test]
fn test_zero_step_after_init_changes_nothing() {
    let mut system = cpu_system(SystemConfig::new(100));
    system.start().unwrap();
    let initial = system.particles().to_vec();
    assert!(initial.iter().all(|p| *p == ParticleRecord::inactive()));

    system.step(&FrameInput::new(0.0)).unwrap();
    assert_eq!(system.particles(), &initial[..]);
    assert_eq!(system.free_count(), 100);
}

#[test]
fn test_zero_step_keeps_live_particles() {
    let config = SystemConfig::new(100).with_gravity(Vec3::new(0.0, -9.8, 0.0));
    let mut system = cpu_system(config);
    system.start().unwrap();
    system.step(&emit_frame(0.0)).unwrap();

    let snapshot = system.particles().to_vec();
    system.step(&FrameInput::new(0.0)).unwrap();
    assert_eq!(system.particles(), &snapshot[..]);
}

#[test]
fn test_invalid_delta_time_is_rejected_without_touching_particles() {
    let config = SystemConfig::new(16)
        .with_group_width(8)
        .with_emit(EmitParams::default().with_lifetime(1.0));
    let mut system = cpu_system(config);
    system.start().unwrap();
    system.step(&emit_frame(0.0)).unwrap();
    system.step(&FrameInput::new(0.5)).unwrap();
    assert_eq!(system.active_count(), 16);
    let snapshot = system.particles().to_vec();

    for dt in [f32::NAN, -0.4, f32::INFINITY] {
        let result = system.step(&emit_frame(dt));
        assert!(
            matches!(result, Err(ParticleError::InvalidFrame(_))),
            "dt {dt} gave {result:?}"
        );
        assert_eq!(system.particles(), &snapshot[..]);
        assert_eq!(system.free_count(), 0);
    }

    // Ages stayed finite, so every slot still expires and returns to the pool.
    system.step(&FrameInput::new(0.6)).unwrap();
    assert_eq!(system.active_count(), 0);
    assert_eq!(system.free_count(), 16);
    assert_partition(&system);
}

#[test]
fn test_time_scale_slows_aging() {
    let config = SystemConfig::new(8)
        .with_time_scale(0.5)
        .with_emit(EmitParams::default().with_lifetime(1.0));
    let mut system = cpu_system(config);
    system.start().unwrap();
    system.step(&emit_frame(0.0)).unwrap();

    system.step(&FrameInput::new(1.0)).unwrap();
    assert_eq!(system.active_count(), 8);
    assert!(system.particles().iter().all(|p| (p.age - 0.5).abs() < 1e-6));

    system.step(&FrameInput::new(1.0)).unwrap();
    assert_eq!(system.active_count(), 0);
}

#[test]
fn test_emit_request_origin_overrides_params() {
    let params = EmitParams::default().with_spread(Vec3::ZERO);
    let mut system = cpu_system(SystemConfig::new(8).with_emit(params));
    system.start().unwrap();

    let origin = Vec3::new(3.0, -2.0, 1.0);
    system.step(&FrameInput::new(0.0).with_emit(EmitRequest::at(origin))).unwrap();

    for p in system.particles() {
        assert!((p.position() - origin).length() < 1e-6);
    }
}

// ============================================================================
// Collision
// ============================================================================

fn collision_system(provider: Arc<StaticCapture>, enabled: bool) -> ParticleSystem<CpuBackend> {
    let params = EmitParams::default()
        .with_spread(Vec3::ZERO)
        .with_velocity(Vec3::new(0.0, 0.0, -1.0), Vec3::new(0.0, 0.0, -1.0))
        .with_angular_velocity(Vec3::ZERO)
        .with_lifetime(10.0);
    let config = SystemConfig::new(8).with_emit(params).with_collision(CollisionConfig {
        enabled,
        ..Default::default()
    });
    cpu_system(config).with_provider(provider)
}

fn surface_frame(dt: f32) -> FrameInput {
    // Identity projection: NDC z is world z.
    FrameInput::new(dt).with_camera(Mat4::IDENTITY, Vec2::new(4.0, 4.0))
}

#[test]
fn test_provider_without_frame_skips_collision() {
    let provider = Arc::new(StaticCapture::new());
    let mut system = collision_system(provider.clone(), true);
    system.start().unwrap();

    system
        .step(&surface_frame(0.0).with_emit(EmitRequest::at(Vec3::new(0.0, 0.0, 0.505))))
        .unwrap();
    let report = system.step(&surface_frame(0.001)).unwrap();
    assert_eq!(report.collision, CollisionStatus::ProviderUnavailable);
    assert!(system.particles().iter().all(|p| p.velocity[2] < 0.0));

    // Depth alone is not a complete frame.
    provider.set_depth(CpuTexture::depth(4, 4, 0.5));
    let report = system.step(&surface_frame(0.0)).unwrap();
    assert_eq!(report.collision, CollisionStatus::ProviderUnavailable);
}

#[test]
fn test_collision_reflects_velocity() {
    let provider = Arc::new(StaticCapture::new());
    provider.set_depth(CpuTexture::depth(4, 4, 0.5));
    provider.set_channel(2, CpuTexture::normal(4, 4, Vec3::Z));

    let mut system = collision_system(provider, true);
    system.start().unwrap();
    system
        .step(&surface_frame(0.0).with_emit(EmitRequest::at(Vec3::new(0.0, 0.0, 0.505))))
        .unwrap();
    assert_eq!(system.active_count(), 8);

    let report = system.step(&surface_frame(0.001)).unwrap();
    assert_eq!(report.collision, CollisionStatus::Applied);
    for p in system.particles() {
        // v -= (1 + 0.5) * dot(v, n) * n with v = -z.
        assert!((p.velocity[2] - 0.5).abs() < 1e-5, "velocity {:?}", p.velocity);
    }
}

#[test]
fn test_collision_with_smaller_normal_channel() {
    let provider = Arc::new(StaticCapture::new());
    provider.set_depth(CpuTexture::depth(4, 4, 0.5));
    provider.set_channel(2, CpuTexture::normal(1, 1, Vec3::Z));

    let mut system = collision_system(provider, true);
    system.start().unwrap();
    system
        .step(&surface_frame(0.0).with_emit(EmitRequest::at(Vec3::new(0.0, 0.0, 0.505))))
        .unwrap();

    let report = system.step(&surface_frame(0.001)).unwrap();
    assert_eq!(report.collision, CollisionStatus::Applied);
    for p in system.particles() {
        assert!(
            (p.velocity() - Vec3::new(0.0, 0.0, 0.5)).length() < 1e-5,
            "velocity {:?}",
            p.velocity
        );
    }
}

#[test]
fn test_collision_disabled_in_config() {
    let provider = Arc::new(StaticCapture::new());
    provider.set_depth(CpuTexture::depth(4, 4, 0.5));
    provider.set_channel(2, CpuTexture::normal(4, 4, Vec3::Z));

    let mut system = collision_system(provider, false);
    system.start().unwrap();
    let report = system.step(&surface_frame(0.0)).unwrap();
    assert_eq!(report.collision, CollisionStatus::Disabled);
}

#[test]
fn test_no_provider_reports_disabled() {
    let mut system = cpu_system(SystemConfig::new(8));
    system.start().unwrap();
    assert!(!system.has_provider());
    assert_eq!(system.step(&FrameInput::new(0.1)).unwrap().collision, CollisionStatus::Disabled);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_stop_releases_and_restart_reinitializes() {
    let mut system = cpu_system(SystemConfig::new(32));
    system.start().unwrap();
    system.step(&emit_frame(0.0)).unwrap();
    assert!(system.active_count() > 0);

    system.stop();
    assert!(!system.is_running());
    assert!(system.particles().is_empty());
    assert_eq!(system.free_count(), 0);

    system.start().unwrap();
    assert_eq!(system.active_count(), 0);
    assert_eq!(system.free_count(), 32);
}

#[test]
fn test_step_while_stopped_is_idle() {
    let mut system = cpu_system(SystemConfig::new(32));
    let report = system.step(&emit_frame(0.1)).unwrap();
    assert!(!report.running);
    assert_eq!(report.update_groups, 0);
    assert_eq!(report.emit, EmitOutcome::NotRequested);

    system.start().unwrap();
    system.stop();
    assert!(!system.step(&emit_frame(0.1)).unwrap().running);
}

/// Counts session opens and closes, optionally failing `init`.
struct CountingBackend {
    inner: CpuBackend,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    fail_init: bool,
}

impl Backend for CountingBackend {
    type Session = CpuSession;
    type Texture = Arc<CpuTexture>;

    fn open_session(&mut self, layout: &SessionLayout<'_>) -> poolfx::Result<CpuSession> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.inner.open_session(layout)
    }

    fn dispatch_init(&mut self, session: &mut CpuSession, groups: u32) -> poolfx::Result<()> {
        if self.fail_init {
            return Err(ParticleError::InvalidConfig("init failed".into()));
        }
        self.inner.dispatch_init(session, groups)
    }

    fn dispatch_update(
        &mut self,
        session: &mut CpuSession,
        params: &UpdateUniforms,
        collision: Option<&CollisionTextures<Arc<CpuTexture>>>,
        groups: u32,
    ) -> poolfx::Result<()> {
        self.inner.dispatch_update(session, params, collision, groups)
    }

    fn read_pool_size(&mut self, session: &mut CpuSession) -> poolfx::Result<u32> {
        self.inner.read_pool_size(session)
    }

    fn dispatch_emit(
        &mut self,
        session: &mut CpuSession,
        params: &EmitUniforms,
        groups: u32,
    ) -> poolfx::Result<()> {
        self.inner.dispatch_emit(session, params, groups)
    }

    fn close_session(&mut self, session: CpuSession) {
        self.closed.fetch_add(1, Ordering::SeqCst);
        self.inner.close_session(session);
    }
}

fn counting(fail_init: bool) -> (CountingBackend, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let opened = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicUsize::new(0));
    let backend = CountingBackend {
        inner: CpuBackend::new(),
        opened: opened.clone(),
        closed: closed.clone(),
        fail_init,
    };
    (backend, opened, closed)
}

#[test]
fn test_drop_releases_session() {
    let (backend, opened, closed) = counting(false);
    let mut system = ParticleSystem::new(backend, SourceMesh::quad(), SystemConfig::new(16)).unwrap();
    system.start().unwrap();
    system.start().unwrap();
    assert_eq!(opened.load(Ordering::SeqCst), 1);

    drop(system);
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failed_init_releases_session() {
    let (backend, opened, closed) = counting(true);
    let mut system = ParticleSystem::new(backend, SourceMesh::quad(), SystemConfig::new(16)).unwrap();

    assert!(system.start().is_err());
    assert!(!system.is_running());
    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Draw addressing
// ============================================================================

#[test]
fn test_resolved_instances_match_active_slots() {
    // 4-vertex quad under a 12-vertex ceiling: 3 copies per tile, 4 tiles.
    let config = SystemConfig::new(10)
        .with_group_width(1)
        .with_emit_group_cap(6)
        .with_vertex_ceiling(12);
    let mut system = cpu_system(config);
    assert_eq!(system.mesh().copies_per_tile, 3);
    assert_eq!(system.mesh().tile_count(), 4);

    system.start().unwrap();
    system.step(&emit_frame(0.0)).unwrap();
    assert_eq!(system.active_count(), 6);

    let instances = system.resolve_instances();
    assert_eq!(instances.len(), 6);
    for instance in &instances {
        assert_eq!(instance.slot, instance.tile * 3 + instance.copy);
        assert!(system.particles()[instance.slot as usize].is_active());
    }
}

#[test]
fn test_oversized_mesh_is_fatal() {
    let config = SystemConfig::new(100).with_vertex_ceiling(20);
    let result = ParticleSystem::new(CpuBackend::new(), SourceMesh::cube(), config);
    assert!(matches!(
        result,
        Err(ParticleError::CapacityMismatch { vertex_count: 24, ceiling: 20 })
    ));
}
