use criterion::{criterion_group, criterion_main, Criterion};
use kmeans_engine::{generate_points, pairwise_squared_distances, EngineConfig, KMeansEngine};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn bench_kmeans(c: &mut Criterion) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let points = generate_points(20_000, 8, &mut rng);
    let centroids = generate_points(8, 8, &mut rng);

    c.bench_function("pairwise_distances_20k_x_8", |b| {
        b.iter(|| {
            pairwise_squared_distances(points.view(), centroids.view()).expect("distance bench")
        });
    });

    c.bench_function("kmeans_20k_8d_10_rounds", |b| {
        b.iter(|| {
            let mut rng = ChaCha8Rng::seed_from_u64(42);
            let config = EngineConfig { k: 8, n_iter: 10 };
            let mut engine =
                KMeansEngine::new(&points, config, &mut rng).expect("engine bench setup");
            engine.run().expect("engine bench run");
        });
    });
}

criterion_group!(benches, bench_kmeans);
criterion_main!(benches);
