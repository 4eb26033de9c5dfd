//! Radix sort over 32-bit keys, optionally carrying a 32-bit payload.
//!
//! See `src/shaders/radix_sort.wgsl` for the kernel design: a histogram
//! pass computes, once, the occurrence count of every digit value for all
//! four 8-bit radix groups; a prefix pass turns each 256-entry histogram
//! row into exclusive base offsets; four scatter passes then each perform
//! an intra-workgroup 8-bit radix split, run-length extraction, and a
//! per-digit decoupled lookback before writing every key to its final
//! slot, ping-ponging between two key/value buffer pairs.

use std::{mem, num::NonZeroU32};

use bytemuck::{bytes_of, Pod, Zeroable};
use wgpu::{util::DeviceExt, ComputePassDescriptor};

use crate::{
    check_len, div_ceil, ScanMode, SortError, HIST_ELEMS_PER_THREAD, HIST_SEGMENT, NUM_PASSES, RADIX_DIGITS,
    RADIX_ELEMS_PER_THREAD, RADIX_SEGMENT, WG_SIZE, WORD_SIZE,
};

/// Radix sort pipeline. Reused across many [`SortBuffers`].
pub struct GPUSorter {
    mode: ScanMode,
    bind_group_layout: wgpu::BindGroupLayout,
    zero_histograms_p: wgpu::ComputePipeline,
    zero_digit_state_p: wgpu::ComputePipeline,
    histogram_p: wgpu::ComputePipeline,
    prefix_p: wgpu::ComputePipeline,
    scatter_even_p: wgpu::ComputePipeline,
    scatter_odd_p: wgpu::ComputePipeline,
    scatter_local_even_p: wgpu::ComputePipeline,
    scatter_local_odd_p: wgpu::ComputePipeline,
    prefix_digit_counts_p: wgpu::ComputePipeline,
    scatter_global_even_p: wgpu::ComputePipeline,
    scatter_global_odd_p: wgpu::ComputePipeline,
}

impl GPUSorter {
    /// `mode` governs the per-digit lookback inside each scatter pass; see
    /// [`ScanMode`].
    pub fn new(device: &wgpu::Device, mode: ScanMode) -> Self {
        let bind_group_layout = Self::bind_group_layout(device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("radix sort pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let raw_shader = include_str!("shaders/radix_sort.wgsl");
        let shader_code = raw_shader
            .replace("{radix_wg_size}", WG_SIZE.to_string().as_str())
            .replace("{radix_segment}", RADIX_SEGMENT.to_string().as_str())
            .replace("{radix_elems_per_thread}", RADIX_ELEMS_PER_THREAD.to_string().as_str())
            .replace("{hist_segment}", HIST_SEGMENT.to_string().as_str())
            .replace("{hist_elems_per_thread}", HIST_ELEMS_PER_THREAD.to_string().as_str());

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("radix sort shader"),
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

        log::debug!("compiling radix sort pipelines in {:?} mode", mode);

        Self {
            mode,
            zero_histograms_p: make("zero_histograms"),
            zero_digit_state_p: make("zero_digit_state"),
            histogram_p: make("calculate_histogram"),
            prefix_p: make("prefix_histogram"),
            scatter_even_p: make("scatter_even"),
            scatter_odd_p: make("scatter_odd"),
            scatter_local_even_p: make("scatter_local_even"),
            scatter_local_odd_p: make("scatter_local_odd"),
            prefix_digit_counts_p: make("prefix_digit_counts"),
            scatter_global_even_p: make("scatter_global_even"),
            scatter_global_odd_p: make("scatter_global_odd"),
            bind_group_layout,
        }
    }

    fn bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        let storage = |binding: u32, min_size: Option<u64>| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: false },
                has_dynamic_offset: false,
                min_binding_size: min_size.map(|s| std::num::NonZeroU64::new(s).unwrap()),
            },
            count: None,
        };
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("radix sort bind group layout"),
            entries: &[
                storage(0, Some(mem::size_of::<SorterState>() as u64)),
                storage(1, None),
                storage(2, None),
                storage(3, None),
                storage(4, None),
                storage(5, None),
                storage(6, None),
                storage(7, None),
                storage(8, None),
                storage(9, None),
            ],
        })
    }

    /// Allocates buffers sufficient for sorting `n` key/payload pairs.
    /// Rejects `n == 0` and `n >= `[`crate::MAX_ELEMENTS`].
    pub fn create_sort_buffers(&self, device: &wgpu::Device, n: u32) -> Result<SortBuffers, SortError> {
        let length = check_len(n)?;
        Ok(self.create_sort_buffers_exact(device, length))
    }

    fn create_sort_buffers_exact(&self, device: &wgpu::Device, length: NonZeroU32) -> SortBuffers {
        let length = length.get();
        let padded_size = keys_buffer_size(length);
        let num_segments = div_ceil(padded_size, RADIX_SEGMENT).max(1);

        let make_keyval = |label: &str, usage: wgpu::BufferUsages| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: (padded_size as u64) * WORD_SIZE as u64,
                usage,
                mapped_at_creation: false,
            })
        };
        let rw = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC;
        let keys_a = make_keyval("radix sort keys buffer", rw);
        let keys_b = make_keyval("radix sort keys auxiliary buffer", wgpu::BufferUsages::STORAGE);
        let vals_a = make_keyval("radix sort payload buffer", rw);
        let vals_b = make_keyval("radix sort payload auxiliary buffer", wgpu::BufferUsages::STORAGE);
        // only touched by ScanMode::MultiPass; always allocated for a
        // uniform bind group regardless of mode, matching how `scan`'s
        // `segment_aggregates` buffer is allocated unconditionally too.
        let keys_scratch = make_keyval("radix sort multi-pass keys scratch", wgpu::BufferUsages::STORAGE);
        let vals_scratch = make_keyval("radix sort multi-pass payload scratch", wgpu::BufferUsages::STORAGE);

        let histograms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("radix sort histograms"),
            size: (NUM_PASSES * RADIX_DIGITS) as u64 * mem::size_of::<u32>() as u64,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });
        let digit_state = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("radix sort segment state table"),
            size: (num_segments * RADIX_DIGITS) as u64 * mem::size_of::<u32>() as u64,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });
        let group_counter = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("radix sort group counter"),
            size: mem::size_of::<u32>() as u64,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        let state_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("radix sort state buffer"),
            contents: bytes_of(&SorterState { num_keys: length, padded_size, pass_index: 0, num_segments }),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("radix sort bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: state_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: group_counter.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: histograms.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: digit_state.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 4, resource: keys_a.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 5, resource: keys_b.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 6, resource: vals_a.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 7, resource: vals_b.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 8, resource: keys_scratch.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 9, resource: vals_scratch.as_entire_binding() },
            ],
        });

        SortBuffers {
            keys_a,
            keys_b,
            vals_a,
            vals_b,
            keys_scratch,
            vals_scratch,
            histograms,
            digit_state,
            group_counter,
            state_buffer,
            bind_group,
            length,
            padded_size,
            num_segments,
        }
    }

    fn record_histogram(&self, bind_group: &wgpu::BindGroup, length: u32, encoder: &mut wgpu::CommandEncoder) {
        let hist_blocks = div_ceil(length, HIST_SEGMENT).max(1);
        {
            let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                label: Some("zeroing histograms"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.zero_histograms_p);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(div_ceil(NUM_PASSES * RADIX_DIGITS, WG_SIZE), 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                label: Some("calculate histogram"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.histogram_p);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(hist_blocks, 1, 1);
        }
    }

    fn record_prefix_histogram(&self, bind_group: &wgpu::BindGroup, encoder: &mut wgpu::CommandEncoder) {
        let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
            label: Some("prefix histogram"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.prefix_p);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(NUM_PASSES, 1, 1);
    }

    fn record_scatter_pass(
        &self,
        bind_group: &wgpu::BindGroup,
        num_segments: u32,
        even: bool,
        encoder: &mut wgpu::CommandEncoder,
    ) {
        {
            let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                label: Some("zeroing segment state table"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.zero_digit_state_p);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(div_ceil(num_segments * RADIX_DIGITS, WG_SIZE).max(1), 1, 1);
        }

        match self.mode {
            ScanMode::Decoupled => {
                let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                    label: Some(if even { "scatter even" } else { "scatter odd" }),
                    timestamp_writes: None,
                });
                pass.set_pipeline(if even { &self.scatter_even_p } else { &self.scatter_odd_p });
                pass.set_bind_group(0, bind_group, &[]);
                pass.dispatch_workgroups(num_segments, 1, 1);
            }
            ScanMode::MultiPass => {
                {
                    let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                        label: Some(if even { "scatter local even" } else { "scatter local odd" }),
                        timestamp_writes: None,
                    });
                    pass.set_pipeline(if even { &self.scatter_local_even_p } else { &self.scatter_local_odd_p });
                    pass.set_bind_group(0, bind_group, &[]);
                    pass.dispatch_workgroups(num_segments, 1, 1);
                }
                {
                    let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                        label: Some("prefix digit counts"),
                        timestamp_writes: None,
                    });
                    pass.set_pipeline(&self.prefix_digit_counts_p);
                    pass.set_bind_group(0, bind_group, &[]);
                    pass.dispatch_workgroups(1, 1, 1);
                }
                {
                    let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                        label: Some(if even { "scatter global even" } else { "scatter global odd" }),
                        timestamp_writes: None,
                    });
                    pass.set_pipeline(if even { &self.scatter_global_even_p } else { &self.scatter_global_odd_p });
                    pass.set_bind_group(0, bind_group, &[]);
                    pass.dispatch_workgroups(num_segments, 1, 1);
                }
            }
        }
    }

    /// Records a full radix sort of `sort_buffers` into `encoder`. Sorts
    /// the first `sort_first_n` keys if given, otherwise the whole buffer.
    ///
    /// **IMPORTANT**: if less than the whole buffer is sorted, the
    /// remainder of the keys buffer is overwritten with sort scratch data.
    pub fn sort(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        queue: &wgpu::Queue,
        sort_buffers: &SortBuffers,
        sort_first_n: Option<u32>,
    ) {
        let bind_group = &sort_buffers.bind_group;
        let num_elements = sort_first_n.unwrap_or(sort_buffers.len());
        let padded_size = keys_buffer_size(num_elements);
        let num_segments = div_ceil(padded_size, RADIX_SEGMENT).max(1);

        queue.write_buffer(
            &sort_buffers.state_buffer,
            0,
            bytes_of(&SorterState { num_keys: num_elements, padded_size, pass_index: 0, num_segments }),
        );

        self.record_histogram(bind_group, num_elements, encoder);
        self.record_prefix_histogram(bind_group, encoder);

        for pass_index in 0..NUM_PASSES {
            if pass_index > 0 {
                let pass_index_offset = 2 * mem::size_of::<u32>() as u64;
                queue.write_buffer(&sort_buffers.state_buffer, pass_index_offset, bytes_of(&pass_index));
            }
            self.record_scatter_pass(bind_group, num_segments, pass_index % 2 == 0, encoder);
        }
    }
}

/// `#[repr(C)]` state uploaded once per [`SortBuffers`] and updated (just
/// the `pass_index` field) between the four scatter passes of one sort.
#[repr(C)]
#[derive(Clone, Copy, Zeroable, Pod)]
struct SorterState {
    num_keys: u32,
    padded_size: u32,
    pass_index: u32,
    num_segments: u32,
}

/// Buffers for sorting `length` key/payload pairs.
#[derive(Debug)]
pub struct SortBuffers {
    keys_a: wgpu::Buffer,
    #[allow(dead_code)]
    keys_b: wgpu::Buffer,
    vals_a: wgpu::Buffer,
    #[allow(dead_code)]
    vals_b: wgpu::Buffer,
    #[allow(dead_code)]
    keys_scratch: wgpu::Buffer,
    #[allow(dead_code)]
    vals_scratch: wgpu::Buffer,
    #[allow(dead_code)]
    histograms: wgpu::Buffer,
    #[allow(dead_code)]
    digit_state: wgpu::Buffer,
    #[allow(dead_code)]
    group_counter: wgpu::Buffer,
    state_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    length: u32,
    padded_size: u32,
    #[allow(dead_code)]
    num_segments: u32,
}

impl SortBuffers {
    /// number of key/payload pairs this buffer holds
    pub fn len(&self) -> u32 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Keys buffer. **WARNING**: padded at the end; see [`Self::keys_valid_size`].
    pub fn keys(&self) -> &wgpu::Buffer {
        &self.keys_a
    }

    /// number of valid (non-padding) bytes at the front of [`Self::keys`]
    pub fn keys_valid_size(&self) -> u64 {
        (self.length as u64) * WORD_SIZE as u64
    }

    /// Payload buffer, permuted the same way as [`Self::keys`].
    pub fn values(&self) -> &wgpu::Buffer {
        &self.vals_a
    }

    pub fn state_buffer(&self) -> &wgpu::Buffer {
        &self.state_buffer
    }
}

/// number of keys processed by one scatter workgroup, rounded up
fn scatter_blocks_ru(n: u32) -> u32 {
    div_ceil(n, RADIX_SEGMENT)
}

/// keys buffer length must be a multiple of [`HIST_SEGMENT`], so that the
/// histogram and scatter passes agree on where the (logical) padding starts
fn keys_buffer_size(n: u32) -> u32 {
    (scatter_blocks_ru(n).max(1) * RADIX_SEGMENT).max(HIST_SEGMENT)
}
