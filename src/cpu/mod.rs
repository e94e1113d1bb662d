//! CPU fallback backend.
//!
//! Runs the same kernels as the GPU backend on the host with rayon, one
//! parallel task per slot (update) or per emit invocation. The slot pool is a
//! [`LifoSlotPool`] shared by every task. Useful for headless runs and for
//! testing the orchestrator without a graphics adapter.

mod texture;

pub use texture::{CpuTexture, StaticCapture};

use std::sync::Arc;

use log::trace;
use rayon::prelude::*;

use crate::backend::{Backend, SessionLayout};
use crate::dispatch::invocations;
use crate::error::Result;
use crate::kernel::{emit_record, update_record};
use crate::mesh::CombinedMesh;
use crate::particle::ParticleRecord;
use crate::pool::{LifoSlotPool, SlotPool};
use crate::provider::CollisionTextures;
use crate::system::ParticleSystem;
use crate::uniforms::{EmitUniforms, UpdateUniforms};

/// Host-side particle buffer and pool for one running span.
#[derive(Debug)]
pub struct CpuSession {
    particles: Vec<ParticleRecord>,
    pool: LifoSlotPool,
    group_width: u32,
}

impl CpuSession {
    pub fn particles(&self) -> &[ParticleRecord] {
        &self.particles
    }

    pub fn pool(&self) -> &LifoSlotPool {
        &self.pool
    }

    /// Number of slots a dispatch of `groups` workgroups reaches.
    fn covered(&self, groups: u32) -> usize {
        invocations(groups, self.group_width).min(self.particles.len() as u32) as usize
    }
}

/// Backend that simulates on the CPU.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for CpuBackend {
    type Session = CpuSession;
    type Texture = Arc<CpuTexture>;

    fn open_session(&mut self, layout: &SessionLayout<'_>) -> Result<CpuSession> {
        Ok(CpuSession {
            particles: vec![ParticleRecord::inactive(); layout.capacity as usize],
            pool: LifoSlotPool::new(layout.capacity),
            group_width: layout.group_width,
        })
    }

    fn dispatch_init(&mut self, session: &mut CpuSession, groups: u32) -> Result<()> {
        let covered = session.covered(groups);
        session.particles[..covered]
            .par_iter_mut()
            .for_each(|record| *record = ParticleRecord::inactive());

        session.pool.clear();
        for slot in (0..covered as u32).rev() {
            session.pool.push(slot);
        }
        Ok(())
    }

    fn dispatch_update(
        &mut self,
        session: &mut CpuSession,
        params: &UpdateUniforms,
        collision: Option<&CollisionTextures<Arc<CpuTexture>>>,
        groups: u32,
    ) -> Result<()> {
        let covered = session.covered(groups);
        let textures = collision.map(|t| (t.depth.as_ref(), t.normal.as_ref()));
        let pool = &session.pool;

        session.particles[..covered]
            .par_iter_mut()
            .enumerate()
            .for_each(|(slot, record)| {
                if update_record(record, params, textures) {
                    pool.push(slot as u32);
                }
            });
        Ok(())
    }

    fn read_pool_size(&mut self, session: &mut CpuSession) -> Result<u32> {
        Ok(session.pool.size())
    }

    fn dispatch_emit(
        &mut self,
        session: &mut CpuSession,
        params: &EmitUniforms,
        groups: u32,
    ) -> Result<()> {
        let count = invocations(groups, session.group_width);
        let pool = &session.pool;

        let emitted: Vec<(u32, ParticleRecord)> = (0..count)
            .into_par_iter()
            .filter_map(|invocation| {
                let slot = pool.pop().ok()?;
                Some((slot, emit_record(params, invocation)))
            })
            .collect();

        trace!("cpu emit: {} invocations, {} slots filled", count, emitted.len());
        for (slot, record) in emitted {
            let target = &mut session.particles[slot as usize];
            debug_assert!(!target.is_active(), "slot {slot} popped while active");
            *target = record;
        }
        Ok(())
    }

    fn close_session(&mut self, session: CpuSession) {
        drop(session);
    }
}

/// A copy of a combined-mesh tile that shows a live particle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VisibleInstance {
    pub tile: u32,
    /// Copy index within the tile, as stored in UV1.
    pub copy: u32,
    pub slot: u32,
}

/// Resolve which tile copies the draw shader would show for `particles`.
pub fn resolve_instances(mesh: &CombinedMesh, particles: &[ParticleRecord]) -> Vec<VisibleInstance> {
    mesh.tiles
        .iter()
        .flat_map(|tile| {
            (0..mesh.copies_per_tile).filter_map(move |copy| {
                let slot = tile.slot_for_copy(copy)?;
                let record = particles.get(slot as usize)?;
                record.is_active().then_some(VisibleInstance {
                    tile: tile.index,
                    copy,
                    slot,
                })
            })
        })
        .collect()
}

impl ParticleSystem<CpuBackend> {
    /// Slot records, or an empty slice while stopped.
    pub fn particles(&self) -> &[ParticleRecord] {
        self.session().map(CpuSession::particles).unwrap_or(&[])
    }

    /// Free slots in the pool, or 0 while stopped.
    pub fn free_count(&self) -> u32 {
        self.session().map(|s| s.pool.size()).unwrap_or(0)
    }

    /// Free slots, bottom of the stack first.
    pub fn free_slots(&self) -> Vec<u32> {
        self.session().map(|s| s.pool.snapshot()).unwrap_or_default()
    }

    pub fn active_count(&self) -> u32 {
        self.particles().iter().filter(|p| p.is_active()).count() as u32
    }

    /// The tile copies a draw would show this frame.
    pub fn resolve_instances(&self) -> Vec<VisibleInstance> {
        resolve_instances(self.mesh(), self.particles())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SystemConfig;
    use crate::emitter::EmitParams;
    use crate::mesh::SourceMesh;
    use glam::{Mat4, Vec2, Vec3};

    fn open(capacity: u32, width: u32) -> (CpuBackend, CpuSession) {
        let mesh = CombinedMesh::build(&SourceMesh::quad(), capacity, 65534).unwrap();
        let mut backend = CpuBackend::new();
        let layout = SessionLayout { capacity, group_width: width, mesh: &mesh };
        let mut session = backend.open_session(&layout).unwrap();
        let groups = crate::dispatch::update_groups(capacity, width);
        backend.dispatch_init(&mut session, groups).unwrap();
        (backend, session)
    }

    #[test]
    fn test_init_fills_pool() {
        let (mut backend, mut session) = open(20, 8);
        assert_eq!(backend.read_pool_size(&mut session).unwrap(), 20);
        assert!(session.particles().iter().all(|p| !p.is_active()));
        assert_eq!(session.pool().pop(), Ok(0));
    }

    #[test]
    fn test_emit_then_expire() {
        let (mut backend, mut session) = open(32, 8);
        let params = EmitParams::default().with_lifetime(0.5);
        let emit = EmitUniforms::new(&params, Vec3::ZERO, 1);

        backend.dispatch_emit(&mut session, &emit, 2).unwrap();
        assert_eq!(session.particles().iter().filter(|p| p.is_active()).count(), 16);
        assert_eq!(session.pool().size(), 16);

        let config = SystemConfig::new(32);
        let update = UpdateUniforms::new(&config, 0.6, Mat4::IDENTITY, Vec2::ONE);
        backend.dispatch_update(&mut session, &update, None, 4).unwrap();

        assert!(session.particles().iter().all(|p| !p.is_active()));
        assert_eq!(session.pool().size(), 32);
    }

    #[test]
    fn test_emit_stops_at_empty_pool() {
        let (mut backend, mut session) = open(5, 8);
        let emit = EmitUniforms::new(&EmitParams::default(), Vec3::ZERO, 1);

        backend.dispatch_emit(&mut session, &emit, 1).unwrap();
        assert_eq!(session.pool().size(), 0);
        assert_eq!(session.particles().iter().filter(|p| p.is_active()).count(), 5);
    }

    #[test]
    fn test_resolve_instances_skips_inactive_and_overflow() {
        let mesh = CombinedMesh::build(&SourceMesh::quad(), 10, 12).unwrap();
        assert_eq!(mesh.copies_per_tile, 3);
        assert_eq!(mesh.tile_count(), 4);

        let mut particles = vec![ParticleRecord::inactive(); 10];
        for slot in [0, 4, 9] {
            particles[slot].active = 1;
        }

        let visible = resolve_instances(&mesh, &particles);
        assert_eq!(
            visible,
            vec![
                VisibleInstance { tile: 0, copy: 0, slot: 0 },
                VisibleInstance { tile: 1, copy: 1, slot: 4 },
                VisibleInstance { tile: 3, copy: 0, slot: 9 },
            ]
        );
    }
}
