//! Engine Performance Benchmarks
//!
//! Validates that the full engine (clock recovery, gate generation, voltage
//! generation, quantization) fits inside a real-time block budget.
//!
//! ## Real-Time Constraints
//!
//! The engine renders fixed-size blocks; the time budget per block is:
//!
//! ```text
//! time_budget = block_size / sample_rate
//! ```
//!
//! At the reference 32 kHz rate a 32-sample block must render in 1 ms, and a
//! 96-sample block (the maximum) in 3 ms.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rampgen::prelude::*;
use rampgen::ratio::Ratio;

const SAMPLE_RATE: f32 = 32000.0;
const BLOCK_SIZES: [usize; 4] = [16, 32, 64, 96];

fn bench_engine_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_block");
    for &block_size in BLOCK_SIZES.iter() {
        group.throughput(Throughput::Elements(block_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(block_size),
            &block_size,
            |b, &size| {
                let mut engine = Engine::new(1, SAMPLE_RATE);
                let parameters = EngineParameters {
                    t_rate: 24.0,
                    t_model: TGeneratorModel::Markov,
                    x_steps: 0.8,
                    ..EngineParameters::default()
                };
                let t_clock = vec![false; size];
                let xy_clock = vec![false; size];
                let mut voltages = vec![0.0f32; size * 4];
                let mut gates = vec![false; size * 3];
                b.iter(|| {
                    let mut outputs = EngineOutputs {
                        voltages: &mut voltages,
                        gates: &mut gates,
                    };
                    engine.process(
                        black_box(&parameters),
                        black_box(&t_clock),
                        black_box(&xy_clock),
                        &mut outputs,
                    );
                    black_box(outputs.voltages[0])
                });
            },
        );
    }
    group.finish();
}

fn bench_ramp_extractor(c: &mut Criterion) {
    let mut group = c.benchmark_group("ramp_extractor");
    group.throughput(Throughput::Elements(64));
    group.bench_function("steady_clock_block_64", |b| {
        let mut extractor = RampExtractor::new(SAMPLE_RATE, 1000.0 / SAMPLE_RATE);
        let mut classifier = GateEdgeClassifier::new();
        let mut flags = [GateFlags::LOW; 64];
        let mut ramp = [0.0f32; 64];
        let mut n = 0usize;
        b.iter(|| {
            for (i, flag) in flags.iter_mut().enumerate() {
                *flag = classifier.step((n + i) % 2000 < 1000);
            }
            n += 64;
            extractor.process(Ratio::UNITY, false, black_box(&flags), &mut ramp);
            black_box(ramp[0])
        });
    });
    group.finish();
}

fn bench_random_sequence(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_sequence");
    group.throughput(Throughput::Elements(1));
    for deja_vu in [0.0f32, 0.5, 1.0] {
        group.bench_with_input(
            BenchmarkId::new("next_value", format!("deja_vu_{}", deja_vu)),
            &deja_vu,
            |b, &deja_vu| {
                let mut stream = RandomStream::new(1);
                let mut sequence = RandomSequence::new();
                sequence.init(&mut stream);
                sequence.set_deja_vu(deja_vu, 8);
                b.iter(|| black_box(sequence.next_value(&mut stream, false, 0.0)));
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_engine_block,
    bench_ramp_extractor,
    bench_random_sequence
);
criterion_main!(benches);
