//! The seam between the orchestrator and the device that runs the kernels.
//!
//! A [`Backend`] owns no particle state itself. [`Backend::open_session`]
//! allocates the particle buffer and slot pool for one `start()`..`stop()`
//! span and returns them as a `Session`; every dispatch takes that session by
//! reference, and [`Backend::close_session`] consumes it. Since the session is
//! a value owned by [`ParticleSystem`](crate::ParticleSystem), a dispatch can
//! never reach buffers that were already released.

use crate::error::Result;
use crate::mesh::CombinedMesh;
use crate::provider::CollisionTextures;
use crate::uniforms::{EmitUniforms, UpdateUniforms};

/// What a backend needs to allocate a session.
#[derive(Debug, Clone, Copy)]
pub struct SessionLayout<'a> {
    pub capacity: u32,
    pub group_width: u32,
    pub mesh: &'a CombinedMesh,
}

/// A device able to run the `init`, `update` and `emit` kernels.
pub trait Backend {
    /// Buffers and pool of one running span.
    type Session;
    /// Handle to a collision texture.
    type Texture: Clone + 'static;

    /// Allocate the particle buffer, the free list and its counter.
    fn open_session(&mut self, layout: &SessionLayout<'_>) -> Result<Self::Session>;

    /// Mark every slot inactive and fill the pool with every slot.
    fn dispatch_init(&mut self, session: &mut Self::Session, groups: u32) -> Result<()>;

    /// Advance all slots by one step and push expired slots to the pool.
    fn dispatch_update(
        &mut self,
        session: &mut Self::Session,
        params: &UpdateUniforms,
        collision: Option<&CollisionTextures<Self::Texture>>,
        groups: u32,
    ) -> Result<()>;

    /// Number of free slots, as of the last completed dispatch.
    ///
    /// This is a synchronization point: pending work is flushed and the
    /// caller blocks until the count is available.
    fn read_pool_size(&mut self, session: &mut Self::Session) -> Result<u32>;

    /// Pop up to `groups * group_width` slots and initialize them.
    fn dispatch_emit(
        &mut self,
        session: &mut Self::Session,
        params: &EmitUniforms,
        groups: u32,
    ) -> Result<()>;

    /// Wait for in-flight work on the session, then release it.
    fn close_session(&mut self, session: Self::Session);
}
