use criterion::{criterion_group, criterion_main, Criterion};

use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;

use embrec::data::Rating;
use embrec::models::factorization::Hyperparameters;
use embrec::similarity::{most_similar, recommend};

fn synthetic_ratings(num_ratings: usize) -> Vec<Rating> {
    let mut rng = XorShiftRng::seed_from_u64(42);

    (0..num_ratings)
        .map(|timestamp| {
            Rating::new(
                rng.gen_range(1..944),
                rng.gen_range(1..1683),
                rng.gen_range(1..6),
                timestamp,
            )
        })
        .collect()
}

fn bench_factorization(c: &mut Criterion) {
    let data = synthetic_ratings(10_000);

    c.bench_function("fit", |b| {
        let mut model = Hyperparameters::new(943, 1682)
            .embedding_dim(32)
            .num_epochs(1)
            .build()
            .unwrap();

        b.iter(|| {
            model.fit(&data).unwrap();
        })
    });

    let mut model = Hyperparameters::new(943, 1682)
        .embedding_dim(32)
        .num_epochs(1)
        .build()
        .unwrap();
    model.fit(&data).unwrap();

    c.bench_function("most_similar", |b| {
        b.iter(|| most_similar(50, model.item_embeddings(), 10).unwrap())
    });
    c.bench_function("recommend", |b| {
        b.iter(|| recommend(&model, &data, 5, 10).unwrap())
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_factorization
}
criterion_main!(benches);
