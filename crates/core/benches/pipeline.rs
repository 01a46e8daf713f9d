//! Criterion benchmarks for the visualization pipeline.
//!
//! Run with:
//!   cargo bench
//!   cargo bench --features parallel
//!
//! Results are saved to target/criterion/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use netviz::prelude::*;
use netviz::prng::Prng;
use netviz::timing::StageTimings;

/// Snapshot with roughly `density` of each layer above zero.
fn make_snapshot(cfg: &VisualizerConfig, hidden: usize, output: usize, density: f32, seed: u64) -> ActivationSnapshot {
    let mut rng = Prng::new(seed);
    let mut layer = |n: usize| -> Vec<f32> {
        (0..n)
            .map(|_| if rng.chance(density) { rng.next_f32_01() } else { 0.0 })
            .collect()
    };
    let pixels = layer(cfg.frame_width * cfg.frame_height);
    ActivationSnapshot {
        frame: GameFrame::new(cfg.frame_width, cfg.frame_height, pixels).unwrap(),
        hidden: layer(hidden),
        output: layer(output),
    }
}

/// Significance masks for the default first layer at growing hidden widths.
fn bench_masks(c: &mut Criterion) {
    let cfg = VisualizerConfig::default();
    let inputs = cfg.frame_width * cfg.frame_height;
    let mut group = c.benchmark_group("compute_mask");

    for hidden in [32usize, 100, 200].iter() {
        let s = NetworkStructure::synthetic(&[inputs, *hidden, 3], 7).unwrap();
        group.throughput(Throughput::Elements((inputs * hidden) as u64));
        group.bench_with_input(BenchmarkId::new("first_layer", hidden), hidden, |b, _| {
            b.iter(|| black_box(compute_mask(&s.layers()[0].weights, 0.02).len()));
        });
    }

    group.finish();
}

/// Decode plus a full redraw onto a recording surface and onto the software raster.
fn bench_render(c: &mut Criterion) {
    let cfg = VisualizerConfig::default();
    let s = NetworkStructure::synthetic(&[cfg.frame_width * cfg.frame_height, 200, 3], 7).unwrap();
    let model = PreparedModel::prepare(1, std::sync::Arc::new(s), &cfg, (1200.0, 800.0)).unwrap();
    let snapshot = make_snapshot(&cfg, 200, 3, 0.3, 11);

    let mut group = c.benchmark_group("render");

    group.bench_function("decode", |b| {
        b.iter(|| black_box(decode(&snapshot, &model.masks, cfg.firing_threshold).unwrap()));
    });

    group.bench_function("recording", |b| {
        let decoded = decode(&snapshot, &model.masks, cfg.firing_threshold).unwrap();
        let mut surface = RecordingSurface::new(1200.0, 800.0);
        b.iter(|| {
            surface.take();
            let stats = render_frame(&mut surface, &cfg, &model, &snapshot, &decoded, &mut StageTimings::new());
            black_box(stats.edges)
        });
    });

    group.bench_function("raster", |b| {
        let decoded = decode(&snapshot, &model.masks, cfg.firing_threshold).unwrap();
        let mut raster = Raster::new(1200, 800);
        b.iter(|| {
            let stats = render_frame(&mut raster, &cfg, &model, &snapshot, &decoded, &mut StageTimings::new());
            black_box(stats.active_edges)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_masks, bench_render);
criterion_main!(benches);
