use attention::{BlockSparseAttention, ExactBlockSparse, FusedBlockSparse, KernelConfig};
use candle_core::{Device, Tensor};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn build_case(
    device: &Device,
    batch: usize,
    seq_len: usize,
    feature_dim: usize,
    block_size: usize,
    blocks_per_query: usize,
) -> (Tensor, Tensor, Tensor, Tensor) {
    let shape = (batch, seq_len, feature_dim);
    let q = Tensor::randn(0f32, 1.0, shape, device).expect("q");
    let k = Tensor::randn(0f32, 1.0, shape, device).expect("k");
    let v = Tensor::randn(0f32, 1.0, shape, device).expect("v");
    let num_blocks = (seq_len + block_size - 1) / block_size;
    let indices: Vec<u32> = (0..batch * num_blocks * blocks_per_query)
        .map(|i| ((i * 7 + 3) % num_blocks) as u32)
        .collect();
    let block_indices = Tensor::from_vec(
        indices,
        (batch, num_blocks, blocks_per_query),
        device,
    )
    .expect("block indices");
    (q, k, v, block_indices)
}

fn bench_kernels(c: &mut Criterion) {
    let device = Device::Cpu;
    let cases = &[(1usize, 256usize), (2, 512), (4, 1024)];
    let feature_dim = 64usize;
    let block_size = 32usize;
    let blocks_per_query = 2usize;

    for &(batch, seq_len) in cases {
        let (q, k, v, block_indices) =
            build_case(&device, batch, seq_len, feature_dim, block_size, blocks_per_query);
        let config = KernelConfig {
            block_size,
            ..KernelConfig::default()
        };
        let elements = (batch * seq_len * feature_dim) as u64;

        let mut group = c.benchmark_group("block_sparse");
        group.throughput(Throughput::Elements(elements));
        group.bench_with_input(
            BenchmarkId::new("exact", format!("{}x{}", batch, seq_len)),
            &config,
            |b, config| {
                let kernel = ExactBlockSparse::new();
                b.iter(|| {
                    let out = kernel
                        .forward(
                            black_box(&q),
                            black_box(&k),
                            black_box(&v),
                            black_box(&block_indices),
                            config,
                        )
                        .expect("exact forward");
                    black_box(out);
                });
            },
        );
        group.bench_with_input(
            BenchmarkId::new("fused", format!("{}x{}", batch, seq_len)),
            &config,
            |b, config| {
                let kernel = FusedBlockSparse::new();
                b.iter(|| {
                    let out = kernel
                        .forward(
                            black_box(&q),
                            black_box(&k),
                            black_box(&v),
                            black_box(&block_indices),
                            config,
                        )
                        .expect("fused forward");
                    black_box(out);
                });
            },
        );
        group.finish();
    }
}

criterion_group!(benches, bench_kernels);
criterion_main!(benches);
