//! Host-side helpers shared by this crate's tests, benches, and demos.
//!
//! `upload_to_buffer`/`download_buffer` stage data through the GPU the same
//! way the original single-purpose sorter this crate grew out of did; they
//! are kept `pub` because every `tests/`/`benches/`/`demos/` entry point
//! needs them, not because the library itself uses them outside of tests.

use std::ops::Deref;

use wgpu::util::DeviceExt;

pub fn upload_to_buffer<T: bytemuck::Pod>(
    encoder: &mut wgpu::CommandEncoder,
    buffer: &wgpu::Buffer,
    device: &wgpu::Device,
    values: &[T],
) {
    let staging_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("staging buffer"),
        contents: bytemuck::cast_slice(values),
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
    });
    encoder.copy_buffer_to_buffer(&staging_buffer, 0, buffer, 0, staging_buffer.size());
}

/// Downloads the full contents of `buffer`, submitting its own copy
/// encoder. Only for tests/benches/demos — the library's own entry points
/// never read buffers back to the host except [`crate::RunFinder::find_runs`],
/// which needs `run_count` to size its own return value.
pub async fn download_buffer<T: Clone + bytemuck::Pod>(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    buffer: &wgpu::Buffer,
) -> Vec<T> {
    let download_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("download buffer"),
        size: buffer.size(),
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("copy encoder") });
    encoder.copy_buffer_to_buffer(buffer, 0, &download_buffer, 0, buffer.size());
    queue.submit([encoder.finish()]);

    let buffer_slice = download_buffer.slice(..);
    let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| tx.send(result).unwrap());
    device.poll(wgpu::Maintain::Wait);
    rx.receive().await.unwrap().unwrap();

    let data = buffer_slice.get_mapped_range();
    bytemuck::cast_slice(data.deref()).to_vec()
}
