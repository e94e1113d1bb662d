//! Free-list buffers and counter readback.

use std::sync::mpsc;

use wgpu::util::DeviceExt;

use crate::error::GpuError;

/// The GPU slot pool: a `u32` stack of free slots plus an atomic counter.
pub struct PoolBuffers {
    /// `capacity` slot indices; the first `counter` entries are free.
    pub free_list: wgpu::Buffer,
    /// Atomic count of free slots.
    pub counter: wgpu::Buffer,
    /// 4-byte MAP_READ copy of the counter.
    staging: wgpu::Buffer,
    capacity: u32,
}

impl PoolBuffers {
    pub fn new(device: &wgpu::Device, capacity: u32) -> Self {
        let free_list = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Free List Buffer"),
            size: (capacity.max(1) as u64) * 4,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        let counter = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Free Count Buffer"),
            contents: &[0u8; 4],
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
        });

        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Free Count Staging Buffer"),
            size: 4,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            free_list,
            counter,
            staging,
            capacity,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Set the counter, e.g. to `capacity` before `init` fills the list.
    pub fn reset(&self, queue: &wgpu::Queue, count: u32) {
        queue.write_buffer(&self.counter, 0, bytemuck::bytes_of(&count));
    }

    /// Copy the counter out and block until it can be read.
    pub fn read_size(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<u32, GpuError> {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Free Count Readback Encoder"),
        });
        encoder.copy_buffer_to_buffer(&self.counter, 0, &self.staging, 0, 4);
        queue.submit(std::iter::once(encoder.finish()));

        let (sender, receiver) = mpsc::channel();
        let buffer_slice = self.staging.slice(..);
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device.poll(wgpu::Maintain::Wait);

        receiver
            .recv()
            .map_err(|e| GpuError::BufferMapping(e.to_string()))?
            .map_err(|e| GpuError::BufferMapping(e.to_string()))?;

        let count = {
            let data = buffer_slice.get_mapped_range();
            u32::from_le_bytes([data[0], data[1], data[2], data[3]])
        };
        self.staging.unmap();
        Ok(count)
    }

    pub fn destroy(&self) {
        self.free_list.destroy();
        self.counter.destroy();
        self.staging.destroy();
    }
}
