//! Free-slot pools.
//!
//! A pool tracks which of the `capacity` particle slots are free. The update
//! stage pushes a slot back when its particle expires and the emit stage pops
//! one to initialize a new particle. Push and pop may be called from many
//! invocations at once, so implementations must be safe to share.
//!
//! The GPU backend implements the same protocol in WGSL (see
//! [`shaders`](crate::shaders)); [`LifoSlotPool`] is the host-side version used
//! by the CPU backend.

use parking_lot::Mutex;
use thiserror::Error;

/// Returned by [`SlotPool::pop`] when no slot is free.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("slot pool is empty")]
pub struct EmptyPool;

/// A concurrent-safe collection of free slot indices.
///
/// Every `push` must be matched with exactly one earlier transition of that
/// slot from free to occupied; pushing an already-free slot breaks the
/// active/free partition and is not checked at runtime.
pub trait SlotPool: Send + Sync {
    /// Number of slots the pool was created for.
    fn capacity(&self) -> u32;

    /// Return a slot to the free set.
    fn push(&self, slot: u32);

    /// Take one free slot.
    fn pop(&self) -> Result<u32, EmptyPool>;

    /// Number of free slots.
    fn size(&self) -> u32;

    fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

/// Stack-ordered pool: the most recently freed slot is reused first.
#[derive(Debug)]
pub struct LifoSlotPool {
    capacity: u32,
    free: Mutex<Vec<u32>>,
}

impl LifoSlotPool {
    /// An empty pool. The `Init` kernel fills it.
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            free: Mutex::new(Vec::with_capacity(capacity as usize)),
        }
    }

    /// A pool that already holds every slot, highest index on the bottom.
    pub fn full(capacity: u32) -> Self {
        Self {
            capacity,
            free: Mutex::new((0..capacity).rev().collect()),
        }
    }

    /// Drop every free slot (counter reset before `Init`).
    pub fn clear(&self) {
        self.free.lock().clear();
    }

    /// Copy of the free slots, bottom of the stack first.
    pub fn snapshot(&self) -> Vec<u32> {
        self.free.lock().clone()
    }
}

impl SlotPool for LifoSlotPool {
    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn push(&self, slot: u32) {
        debug_assert!(slot < self.capacity, "slot {slot} outside pool capacity {}", self.capacity);
        let mut free = self.free.lock();
        debug_assert!(free.len() < self.capacity as usize, "pool overflow");
        free.push(slot);
    }

    fn pop(&self) -> Result<u32, EmptyPool> {
        self.free.lock().pop().ok_or(EmptyPool)
    }

    fn size(&self) -> u32 {
        self.free.lock().len() as u32
    }
}
