// finds the runs of equal values in a small pre-sorted array
use gpu_parallel_primitives::{scan::ScanMode, RunFinder};

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

    let finder = RunFinder::new(&device, ScanMode::Decoupled);

    let sorted: Vec<u32> = vec![1, 1, 1, 2, 2, 4, 4, 4, 4, 9];
    println!("sorted input: {:?}", sorted);

    let (run_count, run_starts) = finder.find_runs(&device, &queue, &sorted).await.unwrap();
    println!("run count: {run_count}, run starts: {:?}", run_starts);
}
