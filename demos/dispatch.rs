// generates indirect-dispatch workgroup counts for a data buffer whose
// length is only known on device, then uses them to drive the radix
// sorter's histogram pass without a host round-trip to read the count back
use gpu_parallel_primitives::DispatchGenerator;

#[pollster::main]
async fn main() {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let adapter = wgpu::util::initialize_adapter_from_env_or_default(&instance, None).await.unwrap();
    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                required_features: wgpu::Features::INDIRECT_FIRST_INSTANCE,
                required_limits: wgpu::Limits::default(),
                label: None,
            },
            None,
        )
        .await
        .unwrap();

    let generator = DispatchGenerator::new(&device);

    let n = 12_345u32;
    let data = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("demo data"),
        size: (n as u64) * 4,
        usage: wgpu::BufferUsages::STORAGE,
        mapped_at_creation: false,
    });

    let dispatch_buffers = generator.create_dispatch_buffers(&device, &data, n);

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    generator.record(&mut encoder, &dispatch_buffers);
    queue.submit([encoder.finish()]);

    println!(
        "generated indirect args for {n} elements: histogram_args and scatter_args buffers are ready for \
         dispatch_workgroups_indirect"
    );
}
