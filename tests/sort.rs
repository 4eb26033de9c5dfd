use std::fmt::Debug;

use float_ord::FloatOrd;
use rand::{
    distributions::{Distribution, Standard},
    rngs::StdRng,
    Rng, SeedableRng,
};
use gpu_parallel_primitives::{
    utils::{download_buffer, upload_to_buffer},
    GPUSorter, ScanMode, SortError, MAX_ELEMENTS,
};

/// sorting two u32 keys
#[pollster::test]
async fn sort_u32_small() {
    test_sort::<u32>(2, None, ScanMode::Decoupled).await;
}

/// sorting one hundred thousand u32 key/payload pairs, spanning many segments
#[pollster::test]
async fn sort_u32_large() {
    test_sort::<u32>(100_000, None, ScanMode::Decoupled).await;
}

/// sorting one hundred thousand f32-bit-pattern keys
#[pollster::test]
async fn sort_f32_large() {
    test_sort::<Float>(100_000, None, ScanMode::Decoupled).await;
}

/// sorting only the first half of a larger buffer leaves the tail untouched
/// as scratch, per `GPUSorter::sort`'s documented contract
#[pollster::test]
async fn sort_first_n() {
    test_sort::<u32>(1_000_000, Some(500_000), ScanMode::Decoupled).await;
}

/// a single key/payload pair, smaller than one histogram segment
#[pollster::test]
async fn sort_u32_single() {
    test_sort::<u32>(1, None, ScanMode::Decoupled).await;
}

/// one element short of, exactly at, and one past a single scatter segment
/// (`RADIX_SEGMENT` = 1024)
#[pollster::test]
async fn sort_u32_segment_boundary() {
    test_sort::<u32>(1023, None, ScanMode::Decoupled).await;
    test_sort::<u32>(1024, None, ScanMode::Decoupled).await;
    test_sort::<u32>(1025, None, ScanMode::Decoupled).await;
}

/// spans well over a million keys, beyond any single dispatch's segment count
#[pollster::test]
async fn sort_u32_above_one_million() {
    test_sort::<u32>(2_097_152, None, ScanMode::Decoupled).await;
}

/// `ScanMode::MultiPass` must agree with `ScanMode::Decoupled`
#[pollster::test]
async fn sort_multi_pass_matches_decoupled() {
    test_sort::<u32>(50_000, None, ScanMode::MultiPass).await;
}

/// sorting the same buffers twice in a row must not observe stale scratch
/// state left over by the first sort (histograms, segment state, and the
/// multi-pass scratch keys/values are all re-zeroed per call)
#[pollster::test]
async fn sort_reuses_buffers_across_calls() {
    let (device, queue) = setup().await;
    let sorter = GPUSorter::new(&device, ScanMode::Decoupled);
    let sort_buffers = sorter.create_sort_buffers(&device, 10_000).unwrap();

    let mut rng = StdRng::seed_from_u64(1);
    for _ in 0..2 {
        let keys_scrambled: Vec<u32> = (0..10_000).map(|_| rng.gen()).collect();
        let mut keys_sorted = keys_scrambled.clone();
        keys_sorted.sort();

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        upload_to_buffer(&mut encoder, sort_buffers.keys(), &device, keys_scrambled.as_slice());
        upload_to_buffer(&mut encoder, sort_buffers.values(), &device, keys_scrambled.as_slice());
        sorter.sort(&mut encoder, &queue, &sort_buffers, None);
        let idx = queue.submit([encoder.finish()]);
        device.poll(wgpu::Maintain::WaitForSubmissionIndex(idx));

        let keys_sorted_gpu = download_buffer::<u32>(&device, &queue, sort_buffers.keys()).await;
        assert_eq!(keys_sorted_gpu, keys_sorted);
    }
}

#[pollster::test]
async fn create_sort_buffers_rejects_empty_input() {
    let (device, _queue) = setup().await;
    let sorter = GPUSorter::new(&device, ScanMode::Decoupled);
    assert_eq!(sorter.create_sort_buffers(&device, 0).unwrap_err(), SortError::EmptyInput);
}

#[pollster::test]
async fn create_sort_buffers_rejects_oversized_input() {
    let (device, _queue) = setup().await;
    let sorter = GPUSorter::new(&device, ScanMode::Decoupled);
    assert_eq!(
        sorter.create_sort_buffers(&device, MAX_ELEMENTS).unwrap_err(),
        SortError::InputTooLarge { n: MAX_ELEMENTS }
    );
}

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

async fn test_sort<T>(n: u32, sort_first_n: Option<u32>, mode: ScanMode)
where
    Standard: Distribution<T>,
    T: PartialEq + Clone + Copy + Debug + bytemuck::Pod + Ord,
{
    let (device, queue) = setup().await;
    let sorter = GPUSorter::new(&device, mode);

    let sort_buffers = sorter.create_sort_buffers(&device, n).unwrap();
    let n_sorted = sort_first_n.unwrap_or(sort_buffers.len());

    let mut rng = StdRng::seed_from_u64(0);
    let keys_scrambled: Vec<T> = (0..n).map(|_| rng.gen()).collect();
    let mut keys_sorted = keys_scrambled.clone();
    keys_sorted[0..n_sorted as usize].sort();

    let values_scrambled = keys_scrambled.clone();
    let values_sorted = keys_sorted.clone();

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("test_sort") });

    upload_to_buffer(&mut encoder, sort_buffers.keys(), &device, keys_scrambled.as_slice());
    upload_to_buffer(&mut encoder, sort_buffers.values(), &device, values_scrambled.as_slice());

    sorter.sort(&mut encoder, &queue, &sort_buffers, sort_first_n);

    let idx = queue.submit([encoder.finish()]);
    device.poll(wgpu::Maintain::WaitForSubmissionIndex(idx));

    let keys_sorted_gpu = download_buffer::<T>(&device, &queue, sort_buffers.keys()).await;
    assert_eq!(
        keys_sorted_gpu[0..n_sorted as usize],
        keys_sorted[0..n_sorted as usize],
        "GPU keys equal keys sorted on CPU"
    );

    let values_sorted_gpu = download_buffer::<T>(&device, &queue, sort_buffers.values()).await;
    assert_eq!(
        values_sorted_gpu[0..n_sorted as usize],
        values_sorted[0..n_sorted as usize],
        "GPU payload permuted the same way as keys"
    );
}

#[repr(C)]
#[derive(PartialEq, Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Float(f32);

impl Eq for Float {}

impl Ord for Float {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        FloatOrd(self.0).cmp(&FloatOrd(other.0))
    }
}

impl PartialOrd for Float {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.0.partial_cmp(&other.0)
    }
}

impl Distribution<Float> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Float {
        Float(rng.gen())
    }
}
