use gpu_parallel_primitives::{
    utils::{download_buffer, upload_to_buffer},
    GatherPipeline,
};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

async fn setup() -> (wgpu::Device, wgpu::Queue) {
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
    (device, queue)
}

fn make_buffer(device: &wgpu::Device, n: u32, extra: wgpu::BufferUsages) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: None,
        size: (n as u64) * 4,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST | extra,
        mapped_at_creation: false,
    })
}

#[pollster::test]
async fn gather_permutes_by_index() {
    let (device, queue) = setup().await;
    let pipeline = GatherPipeline::new(&device);

    let n = 10_000u32;
    let mut rng = StdRng::seed_from_u64(3);
    let src_data: Vec<u32> = (0..n).map(|_| rng.gen()).collect();
    let mut indices: Vec<u32> = (0..n).collect();
    indices.shuffle(&mut rng);

    let src = make_buffer(&device, n, wgpu::BufferUsages::empty());
    let idx = make_buffer(&device, n, wgpu::BufferUsages::empty());
    let dst = make_buffer(&device, n, wgpu::BufferUsages::empty());

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    upload_to_buffer(&mut encoder, &src, &device, src_data.as_slice());
    upload_to_buffer(&mut encoder, &idx, &device, indices.as_slice());
    pipeline.record_gather(&device, &mut encoder, &src, &idx, &dst, n);
    queue.submit([encoder.finish()]);

    let result = download_buffer::<u32>(&device, &queue, &dst).await;
    let expected: Vec<u32> = indices.iter().map(|&i| src_data[i as usize]).collect();
    assert_eq!(result, expected);
}

#[pollster::test]
async fn scatter_by_is_gather_inverse_for_a_permutation() {
    let (device, queue) = setup().await;
    let pipeline = GatherPipeline::new(&device);

    let n = 10_000u32;
    let mut rng = StdRng::seed_from_u64(9);
    let src_data: Vec<u32> = (0..n).map(|_| rng.gen()).collect();
    let mut indices: Vec<u32> = (0..n).collect();
    indices.shuffle(&mut rng);

    let src = make_buffer(&device, n, wgpu::BufferUsages::empty());
    let idx = make_buffer(&device, n, wgpu::BufferUsages::empty());
    let dst = make_buffer(&device, n, wgpu::BufferUsages::empty());

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    upload_to_buffer(&mut encoder, &src, &device, src_data.as_slice());
    upload_to_buffer(&mut encoder, &idx, &device, indices.as_slice());
    pipeline.record_scatter_by(&device, &mut encoder, &src, &idx, &dst, n);
    queue.submit([encoder.finish()]);

    let result = download_buffer::<u32>(&device, &queue, &dst).await;
    let mut expected = vec![0u32; n as usize];
    for (i, &target) in indices.iter().enumerate() {
        expected[target as usize] = src_data[i];
    }
    assert_eq!(result, expected);
}
