//! Compute pipelines for `init`, `update` and `emit`.

use std::sync::Arc;

use wgpu::util::DeviceExt;

use super::pool::PoolBuffers;
use super::{CHANNEL_FORMAT, DEPTH_FORMAT};
use crate::particle::ParticleRecord;
use crate::shaders::compute_shader;
use crate::uniforms::{EmitUniforms, UpdateUniforms};

/// Particle buffer, parameter buffers and the three kernel pipelines.
pub struct ComputeKernels {
    pub particles: wgpu::Buffer,
    update_params: wgpu::Buffer,
    emit_params: wgpu::Buffer,
    storage_bind_group: wgpu::BindGroup,
    collision_layout: wgpu::BindGroupLayout,
    /// 1x1 textures bound when no collision data is available.
    fallback_collision: wgpu::BindGroup,
    init_pipeline: wgpu::ComputePipeline,
    update_pipeline: wgpu::ComputePipeline,
    emit_pipeline: wgpu::ComputePipeline,
}

impl ComputeKernels {
    pub fn new(device: &wgpu::Device, capacity: u32, group_width: u32, pool: &PoolBuffers) -> Self {
        let particles = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Buffer"),
            size: (capacity.max(1) as usize * ParticleRecord::STRIDE) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let update_params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Update Params Buffer"),
            contents: bytemuck::bytes_of(&<UpdateUniforms as bytemuck::Zeroable>::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let emit_params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Emit Params Buffer"),
            contents: bytemuck::bytes_of(&<EmitUniforms as bytemuck::Zeroable>::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let storage_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: false },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let uniform_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let storage_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Particle Storage Bind Group Layout"),
            entries: &[
                // Particles
                storage_entry(0),
                // Free list
                storage_entry(1),
                // Free count (atomic)
                storage_entry(2),
                uniform_entry(3),
                uniform_entry(4),
            ],
        });

        let collision_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Collision Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let storage_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Particle Storage Bind Group"),
            layout: &storage_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: particles.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: pool.free_list.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: pool.counter.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: update_params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: emit_params.as_entire_binding(),
                },
            ],
        });

        let fallback_depth = placeholder_view(device, "Fallback Depth Texture", DEPTH_FORMAT);
        let fallback_normal = placeholder_view(device, "Fallback Normal Texture", CHANNEL_FORMAT);
        let fallback_collision =
            collision_bind_group(device, &collision_layout, &fallback_depth, &fallback_normal);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Particle Kernels"),
            source: wgpu::ShaderSource::Wgsl(compute_shader(group_width).into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Particle Kernel Pipeline Layout"),
            bind_group_layouts: &[&storage_layout, &collision_layout],
            push_constant_ranges: &[],
        });

        let pipeline = |label: &str, entry_point: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some(entry_point),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        Self {
            init_pipeline: pipeline("Init Pipeline", "init"),
            update_pipeline: pipeline("Update Pipeline", "update"),
            emit_pipeline: pipeline("Emit Pipeline", "emit"),
            particles,
            update_params,
            emit_params,
            storage_bind_group,
            collision_layout,
            fallback_collision,
        }
    }

    pub fn write_update(&self, queue: &wgpu::Queue, params: &UpdateUniforms) {
        queue.write_buffer(&self.update_params, 0, bytemuck::bytes_of(params));
    }

    pub fn write_emit(&self, queue: &wgpu::Queue, params: &EmitUniforms) {
        queue.write_buffer(&self.emit_params, 0, bytemuck::bytes_of(params));
    }

    /// Bind group over this frame's provider textures.
    pub fn collision_bind_group(
        &self,
        device: &wgpu::Device,
        depth: &Arc<wgpu::TextureView>,
        normal: &Arc<wgpu::TextureView>,
    ) -> wgpu::BindGroup {
        collision_bind_group(device, &self.collision_layout, depth, normal)
    }

    pub fn encode_init(&self, encoder: &mut wgpu::CommandEncoder, groups: u32) {
        self.encode(encoder, "Init Pass", &self.init_pipeline, &self.fallback_collision, groups);
    }

    pub fn encode_update(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        collision: Option<&wgpu::BindGroup>,
        groups: u32,
    ) {
        let collision = collision.unwrap_or(&self.fallback_collision);
        self.encode(encoder, "Update Pass", &self.update_pipeline, collision, groups);
    }

    pub fn encode_emit(&self, encoder: &mut wgpu::CommandEncoder, groups: u32) {
        self.encode(encoder, "Emit Pass", &self.emit_pipeline, &self.fallback_collision, groups);
    }

    fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        label: &str,
        pipeline: &wgpu::ComputePipeline,
        collision: &wgpu::BindGroup,
        groups: u32,
    ) {
        if groups == 0 {
            return;
        }
        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        });
        compute_pass.set_pipeline(pipeline);
        compute_pass.set_bind_group(0, &self.storage_bind_group, &[]);
        compute_pass.set_bind_group(1, collision, &[]);
        compute_pass.dispatch_workgroups(groups, 1, 1);
    }

    pub fn destroy(&self) {
        self.particles.destroy();
        self.update_params.destroy();
        self.emit_params.destroy();
    }
}

fn placeholder_view(device: &wgpu::Device, label: &str, format: wgpu::TextureFormat) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn collision_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    depth: &wgpu::TextureView,
    normal: &wgpu::TextureView,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Collision Bind Group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(depth),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(normal),
            },
        ],
    })
}
