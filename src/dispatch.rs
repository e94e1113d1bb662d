//! Dispatch sizing for the compute stages.

use crate::config::SystemConfig;

/// Workgroup sizing shared by every stage of one system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    pub group_width: u32,
    pub emit_group_cap: u32,
}

impl DispatchConfig {
    pub fn from_config(config: &SystemConfig) -> Self {
        Self {
            group_width: config.group_width,
            emit_group_cap: config.emit_group_cap,
        }
    }

    pub fn update_groups(&self, capacity: u32) -> u32 {
        update_groups(capacity, self.group_width)
    }

    pub fn emit_groups(&self, pool_size: u32) -> u32 {
        emit_groups(pool_size, self.group_width, self.emit_group_cap)
    }
}

/// Workgroups needed to cover every slot.
///
/// The update kernel always scans the full capacity, inactive slots included.
#[inline]
pub fn update_groups(capacity: u32, group_width: u32) -> u32 {
    capacity.div_ceil(group_width)
}

/// Workgroups for one emit dispatch.
///
/// Deliberately smaller than the pool: at most `group_cap` groups, and never
/// more invocations than there are free slots. Zero means emission is skipped
/// for this frame.
#[inline]
pub fn emit_groups(pool_size: u32, group_width: u32, group_cap: u32) -> u32 {
    group_cap.min(pool_size / group_width)
}

/// Invocations launched by `groups` workgroups.
#[inline]
pub fn invocations(groups: u32, group_width: u32) -> u32 {
    groups.saturating_mul(group_width)
}
