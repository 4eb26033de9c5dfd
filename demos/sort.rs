// creates an array of 10 key/payload (u32, f32 bit-pattern) pairs and sorts them on the gpu
use gpu_parallel_primitives::{
    utils::{download_buffer, upload_to_buffer},
    GPUSorter, ScanMode,
};

#[pollster::main]
async fn main() {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());

    let adapter = wgpu::util::initialize_adapter_from_env_or_default(&instance, None).await.unwrap();

    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                label: None,
            },
            None,
        )
        .await
        .unwrap();

    let sorter = GPUSorter::new(&device, ScanMode::Decoupled);

    let n = 10;
    let sort_buffers = sorter.create_sort_buffers(&device, n).unwrap();

    let keys_scrambled: Vec<u32> = (0..n).rev().collect();
    let values_scrambled: Vec<f32> = keys_scrambled.iter().map(|v| 1. / (*v as f32)).collect();

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });

    upload_to_buffer(&mut encoder, sort_buffers.keys(), &device, keys_scrambled.as_slice());
    upload_to_buffer(&mut encoder, sort_buffers.values(), &device, values_scrambled.as_slice());

    println!("before: {:?}", keys_scrambled.iter().zip(values_scrambled.iter()).collect::<Vec<(_, _)>>());

    sorter.sort(&mut encoder, &queue, &sort_buffers, None);

    let idx = queue.submit([encoder.finish()]);
    device.poll(wgpu::Maintain::WaitForSubmissionIndex(idx));

    // the keys/payload buffers are padded out to one histogram segment;
    // only the first `n` entries are meaningful.
    let valid = (sort_buffers.keys_valid_size() / 4) as usize;
    let keys_sorted = download_buffer::<u32>(&device, &queue, sort_buffers.keys()).await;
    let value_sorted = download_buffer::<f32>(&device, &queue, sort_buffers.values()).await;

    println!(
        "after: {:?}",
        keys_sorted[..valid].iter().zip(value_sorted[..valid].iter()).collect::<Vec<(_, _)>>()
    );
}
