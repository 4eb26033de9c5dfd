// prefix-sums 20 small integers on the gpu and prints both the scrambled
// input and the resulting inclusive scan
use gpu_parallel_primitives::{
    utils::{download_buffer, upload_to_buffer},
    ScanMode, ScanPipeline,
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

    let pipeline = ScanPipeline::new(&device, ScanMode::Decoupled);

    let values: Vec<u32> = (1..=20).collect();
    let n = values.len() as u32;
    let buffers = pipeline.create_scan_buffers(&device, n).unwrap();

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    upload_to_buffer(&mut encoder, buffers.data(), &device, values.as_slice());

    println!("before: {:?}", values);

    pipeline.scan(&mut encoder, &queue, &buffers, false).unwrap();

    let idx = queue.submit([encoder.finish()]);
    device.poll(wgpu::Maintain::WaitForSubmissionIndex(idx));

    let result = download_buffer::<u32>(&device, &queue, buffers.data()).await;
    println!("inclusive prefix sum: {:?}", result);
}
