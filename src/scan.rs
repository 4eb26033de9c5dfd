//! Single-pass decoupled-lookback prefix sum over `u32` arrays.
//!
//! See `src/shaders/scan.wgsl` for the kernel itself. The host side mirrors
//! [`crate::sort::GPUSorter`]: a [`ScanPipeline`] holds the compiled
//! pipelines and is reused across many [`ScanBuffers`], one of which is
//! created per array size.

use std::{mem, num::NonZeroU32};

use bytemuck::{bytes_of, Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::{check_len, div_ceil, SortError, SCAN_ELEMS_PER_THREAD, SCAN_SEGMENT, WG_SIZE};

/// Whether a decoupled-lookback pipeline may rely on the weak
/// Occupancy-Bound-Execution forward-progress model, or must fall back to
/// a classical multi-pass scan.
///
/// Decoupled lookback has every workgroup spin-wait on the status published
/// by an earlier-indexed workgroup. This is only safe if the GPU scheduler
/// guarantees that every workgroup it has started *will* eventually run —
/// if a scheduler can starve an earlier workgroup indefinitely while a
/// later one spins, the pipeline deadlocks. `wgpu` does not expose a way to
/// query this guarantee, so callers choose explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanMode {
    /// single-pass decoupled lookback (fastest, requires weak OBE)
    #[default]
    Decoupled,
    /// segment-reduce -> single-workgroup-scan -> uniform-add (always correct)
    MultiPass,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ScanUniforms {
    num_elements: u32,
    exclusive: u32,
}

/// Compiled pipelines for prefix-summing `u32` arrays. Cheap to keep around
/// and reuse across many [`ScanBuffers`] of different sizes.
pub struct ScanPipeline {
    mode: ScanMode,
    bind_group_layout: wgpu::BindGroupLayout,
    zero_counters_p: wgpu::ComputePipeline,
    zero_group_state_p: wgpu::ComputePipeline,
    scan_p: wgpu::ComputePipeline,
    reduce_p: wgpu::ComputePipeline,
    scan_aggregates_p: wgpu::ComputePipeline,
    uniform_add_p: wgpu::ComputePipeline,
}

impl ScanPipeline {
    pub fn new(device: &wgpu::Device, mode: ScanMode) -> Self {
        let bind_group_layout = Self::bind_group_layout(device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("prefix sum pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let raw_shader = include_str!("shaders/scan.wgsl");
        let shader_code = raw_shader
            .replace("{scan_wg_size}", WG_SIZE.to_string().as_str())
            .replace("{segment_size}", SCAN_SEGMENT.to_string().as_str())
            .replace("{elems_per_thread}", SCAN_ELEMS_PER_THREAD.to_string().as_str());

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("prefix sum shader"),
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

        log::debug!("compiling prefix sum pipelines in {:?} mode", mode);

        Self {
            mode,
            zero_counters_p: make("zero_counters"),
            zero_group_state_p: make("zero_group_state"),
            scan_p: make("scan"),
            reduce_p: make("reduce_segments"),
            scan_aggregates_p: make("scan_aggregates"),
            uniform_add_p: make("uniform_add"),
            bind_group_layout,
        }
    }

    fn bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        let storage = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: false },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("prefix sum bind group layout"),
            entries: &[storage(0), storage(1), storage(2), storage(3), storage(4)],
        })
    }

    /// Allocates scratch and data buffers sufficient for scanning `n`
    /// elements. Rejects `n == 0` and `n >= `[`crate::MAX_ELEMENTS`].
    pub fn create_scan_buffers(&self, device: &wgpu::Device, n: u32) -> Result<ScanBuffers, SortError> {
        let length = check_len(n)?;
        Ok(self.create_scan_buffers_exact(device, length))
    }

    pub(crate) fn create_scan_buffers_exact(&self, device: &wgpu::Device, length: NonZeroU32) -> ScanBuffers {
        let length = length.get();
        let num_segments = div_ceil(length, SCAN_SEGMENT).max(1);

        let data = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("prefix sum data buffer"),
            size: (length as u64) * mem::size_of::<u32>() as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let group_counter = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("prefix sum group counter"),
            size: mem::size_of::<u32>() as u64,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });
        // 4 words (two split-tagged 16-bit halves each) per group.
        let group_state = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("prefix sum group state"),
            size: (num_segments as u64) * 4 * mem::size_of::<u32>() as u64,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });
        let segment_aggregates = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("prefix sum segment aggregates"),
            size: (num_segments.max(1) as u64) * mem::size_of::<u32>() as u64,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("prefix sum uniforms"),
            contents: bytes_of(&ScanUniforms { num_elements: length, exclusive: 0 }),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("prefix sum bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: uniform_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: group_counter.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: group_state.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: data.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 4, resource: segment_aggregates.as_entire_binding() },
            ],
        });

        ScanBuffers {
            data,
            group_counter,
            group_state,
            segment_aggregates,
            uniform_buffer,
            bind_group,
            length,
            num_segments,
        }
    }

    /// Records a prefix sum of `buffers.data()` in place.
    ///
    /// Fails without recording anything if `buffers` was built with more
    /// segments than [`ScanMode::MultiPass`] can cover in its single-
    /// workgroup aggregate scan (see [`Self::max_multi_pass_segments`]) —
    /// only reachable in [`ScanMode::MultiPass`]; [`ScanMode::Decoupled`]
    /// always succeeds.
    pub fn scan(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        queue: &wgpu::Queue,
        buffers: &ScanBuffers,
        exclusive: bool,
    ) -> Result<(), SortError> {
        queue.write_buffer(
            &buffers.uniform_buffer,
            0,
            bytes_of(&ScanUniforms { num_elements: buffers.length, exclusive: exclusive as u32 }),
        );

        match self.mode {
            ScanMode::Decoupled => {
                self.record_decoupled(encoder, buffers);
                Ok(())
            }
            ScanMode::MultiPass => self.record_multi_pass(encoder, buffers),
        }
    }

    /// Largest segment count [`ScanMode::MultiPass`] can scan in one call:
    /// its `scan_aggregates` pass is a single workgroup with no second
    /// hierarchy level above it.
    pub fn max_multi_pass_segments() -> u32 {
        WG_SIZE * SCAN_ELEMS_PER_THREAD
    }

    fn record_decoupled(&self, encoder: &mut wgpu::CommandEncoder, buffers: &ScanBuffers) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("prefix sum (decoupled lookback)"),
            timestamp_writes: None,
        });
        pass.set_bind_group(0, &buffers.bind_group, &[]);
        pass.set_pipeline(&self.zero_counters_p);
        pass.dispatch_workgroups(1, 1, 1);
        pass.set_pipeline(&self.zero_group_state_p);
        pass.dispatch_workgroups(div_ceil(buffers.num_segments * 4, WG_SIZE).max(1), 1, 1);
        pass.set_pipeline(&self.scan_p);
        pass.dispatch_workgroups(buffers.num_segments, 1, 1);
    }

    fn record_multi_pass(&self, encoder: &mut wgpu::CommandEncoder, buffers: &ScanBuffers) -> Result<(), SortError> {
        let max_segments = Self::max_multi_pass_segments();
        if buffers.num_segments > max_segments {
            return Err(SortError::MultiPassSegmentLimitExceeded {
                num_segments: buffers.num_segments,
                max_segments,
            });
        }
        log::debug!(
            "prefix sum falling back to multi-pass scan over {} segments",
            buffers.num_segments
        );
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("prefix sum (multi-pass fallback)"),
            timestamp_writes: None,
        });
        pass.set_bind_group(0, &buffers.bind_group, &[]);
        pass.set_pipeline(&self.reduce_p);
        pass.dispatch_workgroups(buffers.num_segments, 1, 1);
        pass.set_pipeline(&self.scan_aggregates_p);
        pass.dispatch_workgroups(1, 1, 1);
        pass.set_pipeline(&self.uniform_add_p);
        pass.dispatch_workgroups(buffers.num_segments, 1, 1);
        Ok(())
    }
}

/// Buffers for scanning one array of a fixed length.
pub struct ScanBuffers {
    data: wgpu::Buffer,
    #[allow(dead_code)]
    group_counter: wgpu::Buffer,
    #[allow(dead_code)]
    group_state: wgpu::Buffer,
    #[allow(dead_code)]
    segment_aggregates: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    length: u32,
    num_segments: u32,
}

impl ScanBuffers {
    pub fn len(&self) -> u32 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn data(&self) -> &wgpu::Buffer {
        &self.data
    }
}
