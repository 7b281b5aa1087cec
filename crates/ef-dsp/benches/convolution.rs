//! Hot-path benchmarks: biquad filtering and overlap-save convolution.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ef_dsp::{IIRFilterer, OverlapSaveEngine, OverlapSaveFIR, OverlapSavePartitioner, IIR};

fn bench_biquad(c: &mut Criterion) {
    let mut filter = IIRFilterer::new(IIR::low_shelf(800.0, 0.5, 48000));
    let input: Vec<f32> = (0..1024).map(|i| (i as f32 * 0.01).sin()).collect();
    let mut output = vec![0.0f32; 1024];

    c.bench_function("biquad_block_1024", |b| {
        b.iter(|| {
            filter.apply(black_box(&input), &mut output);
            black_box(&output);
        })
    });
}

fn bench_overlap_save(c: &mut Criterion) {
    let frame = 1024;
    let ir_size = 48000;
    let ir: Vec<f32> = (0..ir_size).map(|i| (-(i as f32) * 1e-4).exp()).collect();

    let mut fir = OverlapSaveFIR::new(1, ir_size, frame);
    let mut partitioner = OverlapSavePartitioner::new(frame);
    partitioner.partition(&[&ir], &mut fir);

    let mut engine = OverlapSaveEngine::new(fir.num_blocks(), frame);
    let input: Vec<f32> = (0..frame).map(|i| (i as f32 * 0.01).sin()).collect();
    let mut output = vec![0.0f32; frame];

    c.bench_function("overlap_save_1s_ir", |b| {
        b.iter(|| {
            engine.push_input(black_box(&input));
            engine.convolve(&fir, 0, &mut output);
            black_box(&output);
        })
    });
}

criterion_group!(benches, bench_biquad, bench_overlap_save);
criterion_main!(benches);
