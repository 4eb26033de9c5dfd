//! Run-finding over a sorted key array.
//!
//! Built from two small embarrassingly-parallel passes either side of an
//! inclusive prefix sum, which `RunFinder` reuses by directly owning a
//! [`crate::scan::ScanPipeline`] rather than reimplementing the scan. See
//! `src/shaders/runs.wgsl`.

use std::num::NonZeroU32;

use bytemuck::{bytes_of, Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::{
    check_len, scan::ScanMode, utils::download_buffer, ScanBuffers, ScanPipeline, SortError, WG_SIZE,
};

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct RunUniforms {
    num_keys: u32,
}

/// Compiled pipelines for finding runs in sorted `u32` arrays. Owns a
/// [`ScanPipeline`] used to scan the run-start marks in place.
pub struct RunFinder {
    bind_group_layout: wgpu::BindGroupLayout,
    mark_run_starts_p: wgpu::ComputePipeline,
    count_runs_p: wgpu::ComputePipeline,
    collect_run_starts_p: wgpu::ComputePipeline,
    scan: ScanPipeline,
}

impl RunFinder {
    pub fn new(device: &wgpu::Device, mode: ScanMode) -> Self {
        let bind_group_layout = Self::bind_group_layout(device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("find runs pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let raw_shader = include_str!("shaders/runs.wgsl");
        let shader_code = raw_shader.replace("{runs_wg_size}", WG_SIZE.to_string().as_str());

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("find runs shader"),
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

        log::debug!("compiling find-runs pipelines ({:?} scan mode)", mode);

        Self {
            mark_run_starts_p: make("mark_run_starts"),
            count_runs_p: make("count_runs"),
            collect_run_starts_p: make("collect_run_starts"),
            bind_group_layout,
            scan: ScanPipeline::new(device, mode),
        }
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
            label: Some("find runs bind group layout"),
            entries: &[
                storage(0, false),
                storage(1, true),
                storage(2, false),
                storage(3, false),
                storage(4, false),
            ],
        })
    }

    /// Allocates scratch sufficient to find runs in `n` sorted keys.
    pub fn create_run_buffers(&self, device: &wgpu::Device, n: u32) -> Result<RunBuffers, SortError> {
        let length = check_len(n)?;
        Ok(self.create_run_buffers_exact(device, length))
    }

    fn create_run_buffers_exact(&self, device: &wgpu::Device, length: NonZeroU32) -> RunBuffers {
        let length = length.get();
        let scan_buffers = self.scan.create_scan_buffers_exact(device, NonZeroU32::new(length).unwrap());

        let sorted = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("find runs sorted input"),
            size: (length as u64) * std::mem::size_of::<u32>() as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let run_starts = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("run starts"),
            size: (length as u64) * std::mem::size_of::<u32>() as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let run_count = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("run count"),
            size: std::mem::size_of::<u32>() as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("find runs uniforms"),
            contents: bytes_of(&RunUniforms { num_keys: length }),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("find runs bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: uniform_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: sorted.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: scan_buffers.data().as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: run_starts.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 4, resource: run_count.as_entire_binding() },
            ],
        });

        RunBuffers { scan_buffers, sorted, run_starts, run_count, bind_group, length }
    }

    /// Records the run-marking, scan, and collection passes. The input
    /// buffer is expected to already hold the sorted keys in
    /// `buffers.sorted()` (see [`RunBuffers::sorted`]).
    ///
    /// Propagates [`SortError::MultiPassSegmentLimitExceeded`] if this
    /// finder's [`ScanMode::MultiPass`] cannot cover `buffers`' length; see
    /// [`ScanPipeline::scan`].
    pub fn record_find_runs(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        queue: &wgpu::Queue,
        buffers: &RunBuffers,
    ) -> Result<(), SortError> {
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("mark run starts"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.mark_run_starts_p);
            pass.set_bind_group(0, &buffers.bind_group, &[]);
            pass.dispatch_workgroups(crate::div_ceil(buffers.length, WG_SIZE), 1, 1);
        }

        self.scan.scan(encoder, queue, &buffers.scan_buffers, false)?;

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("count runs"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.count_runs_p);
            pass.set_bind_group(0, &buffers.bind_group, &[]);
            pass.dispatch_workgroups(1, 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("collect run starts"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.collect_run_starts_p);
            pass.set_bind_group(0, &buffers.bind_group, &[]);
            pass.dispatch_workgroups(crate::div_ceil(buffers.length, WG_SIZE), 1, 1);
        }
        Ok(())
    }

    /// Convenience entry point: uploads `sorted` into fresh buffers, records
    /// and submits the full pass sequence, and downloads the run count and
    /// run starts. Mirrors the teacher's `download_buffer`-based test helpers.
    pub async fn find_runs(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        sorted: &[u32],
    ) -> Result<(u32, Vec<u32>), SortError> {
        let n = sorted.len() as u32;
        let buffers = self.create_run_buffers(device, n)?;
        queue.write_buffer(buffers.sorted(), 0, bytemuck::cast_slice(sorted));

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        self.record_find_runs(&mut encoder, queue, &buffers)?;
        queue.submit(Some(encoder.finish()));

        let counts = download_buffer::<u32>(device, queue, &buffers.run_count).await;
        let run_count = counts[0];
        let starts = download_buffer::<u32>(device, queue, &buffers.run_starts).await;
        Ok((run_count, starts[..run_count as usize].to_vec()))
    }
}

/// Scratch for finding runs over `length` sorted keys.
pub struct RunBuffers {
    scan_buffers: ScanBuffers,
    sorted: wgpu::Buffer,
    run_starts: wgpu::Buffer,
    run_count: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    length: u32,
}

impl RunBuffers {
    pub fn len(&self) -> u32 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The buffer callers should upload the sorted keys into before
    /// recording.
    pub fn sorted(&self) -> &wgpu::Buffer {
        &self.sorted
    }

    /// Run-start marks, turned into per-position run indices in place by
    /// the scan step.
    pub fn marks(&self) -> &wgpu::Buffer {
        self.scan_buffers.data()
    }

    pub fn run_starts(&self) -> &wgpu::Buffer {
        &self.run_starts
    }

    pub fn run_count(&self) -> &wgpu::Buffer {
        &self.run_count
    }
}
