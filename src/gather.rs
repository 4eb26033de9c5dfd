//! Trivial indirection primitives: gather and scatter-by-index over opaque
//! 4-byte-element buffers. See `src/shaders/gather.wgsl`.

use bytemuck::{bytes_of, Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::WG_SIZE;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct GatherUniforms {
    n: u32,
}

/// Compiled `gather`/`scatter_by` pipelines, sharing one bind-group layout.
pub struct GatherPipeline {
    bind_group_layout: wgpu::BindGroupLayout,
    gather_p: wgpu::ComputePipeline,
    scatter_by_p: wgpu::ComputePipeline,
}

impl GatherPipeline {
    pub fn new(device: &wgpu::Device) -> Self {
        let bind_group_layout = Self::bind_group_layout(device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("gather pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let raw_shader = include_str!("shaders/gather.wgsl");
        let shader_code = raw_shader.replace("{gather_wg_size}", WG_SIZE.to_string().as_str());

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("gather shader"),
            source: wgpu::ShaderSource::Wgsl(shader_code.into()),
        });

        let make = |entry_point: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry_point),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point,
            })
        };

        Self { gather_p: make("gather"), scatter_by_p: make("scatter_by"), bind_group_layout }
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
            label: Some("gather bind group layout"),
            entries: &[storage(0, false), storage(1, true), storage(2, true), storage(3, false)],
        })
    }

    fn bind_group(
        &self,
        device: &wgpu::Device,
        n: u32,
        src: &wgpu::Buffer,
        indices: &wgpu::Buffer,
        dst: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("gather uniforms"),
            contents: bytes_of(&GatherUniforms { n }),
            usage: wgpu::BufferUsages::STORAGE,
        });
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("gather bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: uniform_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: src.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: indices.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: dst.as_entire_binding() },
            ],
        })
    }

    /// Records `dst[i] = src[indices[i]]` for `i < n`.
    pub fn record_gather(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        src: &wgpu::Buffer,
        indices: &wgpu::Buffer,
        dst: &wgpu::Buffer,
        n: u32,
    ) {
        let bind_group = self.bind_group(device, n, src, indices, dst);
        let mut pass =
            encoder.begin_compute_pass(&wgpu::ComputePassDescriptor { label: Some("gather"), timestamp_writes: None });
        pass.set_pipeline(&self.gather_p);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(crate::div_ceil(n, WG_SIZE), 1, 1);
    }

    /// Records `dst[indices[i]] = src[i]` for `i < n`. Collisions in
    /// `indices` are implementation-defined: any one store wins.
    pub fn record_scatter_by(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        src: &wgpu::Buffer,
        indices: &wgpu::Buffer,
        dst: &wgpu::Buffer,
        n: u32,
    ) {
        let bind_group = self.bind_group(device, n, src, indices, dst);
        let mut pass = encoder
            .begin_compute_pass(&wgpu::ComputePassDescriptor { label: Some("scatter_by"), timestamp_writes: None });
        pass.set_pipeline(&self.scatter_by_p);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(crate::div_ceil(n, WG_SIZE), 1, 1);
    }
}
