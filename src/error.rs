//! Error types for poolfx.
//!
//! Only two failures are fatal during normal operation: a source mesh that
//! cannot fit a single copy under the vertex ceiling, and GPU setup errors.
//! `EmptyPool` and `ProviderUnavailable` are expected transient conditions; the
//! orchestrator recovers them locally and reports them through
//! [`StepReport`](crate::StepReport) instead of failing the frame.

use thiserror::Error;

/// Errors that can occur during GPU initialization or readback.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Failed to create a surface for rendering.
    #[error("Failed to create GPU surface: {0}")]
    SurfaceCreation(#[from] wgpu::CreateSurfaceError),

    /// No compatible GPU adapter found.
    #[error("No compatible GPU adapter found. Ensure your system has a GPU with WebGPU/Vulkan/Metal/DX12 support.")]
    NoAdapter,

    /// Failed to create GPU device.
    #[error("Failed to create GPU device: {0}")]
    DeviceCreation(#[from] wgpu::RequestDeviceError),

    /// Failed to map buffer for reading.
    #[error("Failed to map GPU buffer: {0}")]
    BufferMapping(String),
}

/// Errors produced by the particle system.
#[derive(Error, Debug)]
pub enum ParticleError {
    /// The source mesh has more vertices than fit in a single draw call, so
    /// not even one copy fits in a tile.
    #[error("source mesh has {vertex_count} vertices, exceeding the per-draw vertex ceiling of {ceiling}")]
    CapacityMismatch { vertex_count: u32, ceiling: u32 },

    /// The source mesh is malformed.
    #[error("invalid source mesh: {0}")]
    InvalidMesh(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A frame input is unusable, e.g. a negative or non-finite delta time.
    #[error("invalid frame input: {0}")]
    InvalidFrame(String),

    /// A pop was attempted on a pool holding no free slots.
    #[error("slot pool is empty")]
    EmptyPool,

    /// The depth/normal provider has not produced a frame yet.
    #[error("depth/normal provider has not produced a frame")]
    ProviderUnavailable,

    /// GPU setup or readback failed.
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),

    /// Reading or writing a configuration file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration document could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<crate::pool::EmptyPool> for ParticleError {
    fn from(_: crate::pool::EmptyPool) -> Self {
        ParticleError::EmptyPool
    }
}

pub type Result<T> = std::result::Result<T, ParticleError>;
