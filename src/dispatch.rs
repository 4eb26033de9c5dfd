//! Generates indirect-dispatch workgroup counts on device, so the rest of
//! a pipeline can be enqueued without a host round-trip once an element
//! count is known only after a prior kernel ran. See
//! `src/shaders/dispatch.wgsl`.

use bytemuck::{bytes_of, Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::{HIST_SEGMENT, RADIX_SEGMENT};

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct DispatchUniforms {
    count: u32,
}

/// Compiled `generate_dispatch` pipeline.
pub struct DispatchGenerator {
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

impl DispatchGenerator {
    pub fn new(device: &wgpu::Device) -> Self {
        let bind_group_layout = Self::bind_group_layout(device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("dispatch generator pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let raw_shader = include_str!("shaders/dispatch.wgsl");
        let shader_code = raw_shader
            .replace("{hist_segment}", HIST_SEGMENT.to_string().as_str())
            .replace("{radix_segment}", RADIX_SEGMENT.to_string().as_str());

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("dispatch generator shader"),
            source: wgpu::ShaderSource::Wgsl(shader_code.into()),
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("generate_dispatch"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: "generate_dispatch",
        });

        Self { bind_group_layout, pipeline }
    }

    fn bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        let storage = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("dispatch generator bind group layout"),
            entries: &[storage(0, true), storage(1, true), storage(2, false), storage(3, false)],
        })
    }

    /// Allocates the two output triples, each laid out as
    /// `wgpu::util::DispatchIndirectArgs` (`x, y, z`).
    pub fn create_dispatch_buffers(&self, device: &wgpu::Device, data: &wgpu::Buffer, count: u32) -> DispatchBuffers {
        let indirect_usage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::INDIRECT | wgpu::BufferUsages::COPY_SRC;
        let histogram_args = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("histogram indirect args"),
            size: 3 * std::mem::size_of::<u32>() as u64,
            usage: indirect_usage,
            mapped_at_creation: false,
        });
        let scatter_args = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("scatter indirect args"),
            size: 3 * std::mem::size_of::<u32>() as u64,
            usage: indirect_usage,
            mapped_at_creation: false,
        });
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("dispatch generator uniforms"),
            contents: bytes_of(&DispatchUniforms { count }),
            usage: wgpu::BufferUsages::STORAGE,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("dispatch generator bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: uniform_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: data.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: histogram_args.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: scatter_args.as_entire_binding() },
            ],
        });

        DispatchBuffers { histogram_args, scatter_args, bind_group }
    }

    pub fn record(&self, encoder: &mut wgpu::CommandEncoder, buffers: &DispatchBuffers) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("generate dispatch args"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &buffers.bind_group, &[]);
        pass.dispatch_workgroups(1, 1, 1);
    }
}

/// Indirect-dispatch argument buffers, each compatible with
/// [`wgpu::util::DispatchIndirectArgs`] and `wgpu::ComputePass::dispatch_workgroups_indirect`.
pub struct DispatchBuffers {
    histogram_args: wgpu::Buffer,
    scatter_args: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl DispatchBuffers {
    pub fn histogram_args(&self) -> &wgpu::Buffer {
        &self.histogram_args
    }

    pub fn scatter_args(&self) -> &wgpu::Buffer {
        &self.scatter_args
    }
}
