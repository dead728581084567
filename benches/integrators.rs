//! Integrator benchmarks
//!
//! - Frame throughput of each integrator on a random cluster
//! - Massless fast path against the same test bodies carried as massive bodies
//! - A full sun-earth orbit with one test body

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use gravitas::physics::engine::{BodyDesc, Engine, EngineOptions, FRAME_RATE};
use gravitas::physics::integrators::registry::IntegratorRegistry;
use gravitas::physics::math::{Scalar, Vector};
use gravitas::physics::units::ScaleState;
use gravitas::resources::SharedRng;
use gravitas::scenarios;

const FRAME: Scalar = 1.0 / FRAME_RATE;

fn engine(integrator: &str, optimize_massless: bool) -> Engine {
    let options = EngineOptions {
        integrator: integrator.to_string(),
        optimize_massless,
        body_capacity: 64,
        seed: Some(1),
        ..EngineOptions::default()
    };
    Engine::new(&options, ScaleState::default(), &IntegratorRegistry::default())
        .expect("engine options are valid")
}

fn bench_cluster_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("cluster_frame");

    for integrator in ["leapfrog", "hermite"] {
        for count in [8, 32] {
            group.bench_with_input(BenchmarkId::new(integrator, count), &count, |b, &count| {
                let mut engine = engine(integrator, true);
                let mut rng = SharedRng::from_seed(9);
                scenarios::random_cluster(&mut engine, &mut rng, count).unwrap();
                engine.start().unwrap();
                b.iter(|| black_box(engine.step(black_box(FRAME)).unwrap()));
            });
        }
    }
    group.finish();
}

fn bench_three_body(c: &mut Criterion) {
    let mut group = c.benchmark_group("figure_eight_frame");

    for integrator in ["leapfrog", "hermite", "azt"] {
        group.bench_function(integrator, |b| {
            let mut engine = engine(integrator, true);
            scenarios::figure_eight(&mut engine).unwrap();
            engine.start().unwrap();
            b.iter(|| black_box(engine.step(black_box(FRAME)).unwrap()));
        });
    }
    group.finish();
}

fn bench_massless(c: &mut Criterion) {
    let mut group = c.benchmark_group("test_bodies_frame");
    group.sample_size(20);

    for (name, optimize) in [("fast_path", true), ("massive", false)] {
        group.bench_function(name, |b| {
            let mut engine = engine("leapfrog", optimize);
            let mut rng = SharedRng::from_seed(4);
            scenarios::planet_with_test_bodies(&mut engine, &mut rng, 200).unwrap();
            engine.start().unwrap();
            b.iter(|| black_box(engine.step(black_box(FRAME)).unwrap()));
        });
    }
    group.finish();
}

fn bench_energy_drift(c: &mut Criterion) {
    let mut group = c.benchmark_group("sun_earth_year");
    group.sample_size(10);

    group.bench_function("leapfrog", |b| {
        b.iter(|| {
            let mut engine = engine("leapfrog", true);
            scenarios::sun_earth(&mut engine).unwrap();
            engine
                .register_body(BodyDesc::new(0.0, Vector::new(0.0, 2.0, 0.0), Vector::new(-0.7, 0.0, 0.0)))
                .unwrap();
            engine.start().unwrap();
            // one orbit is 2π time units
            let frames = (std::f64::consts::TAU * FRAME_RATE).ceil() as usize;
            for _ in 0..frames {
                engine.step(FRAME).unwrap();
            }
            black_box(engine.energy_drift())
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_cluster_frame,
    bench_three_body,
    bench_massless,
    bench_energy_drift
);
criterion_main!(benches);
