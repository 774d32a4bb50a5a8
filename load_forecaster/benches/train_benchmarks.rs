use criterion::{black_box, criterion_group, criterion_main, Criterion};
use load_forecaster::{build_features, GbdtParams, LoadSeries, Matrix, QuantileGbdt};

fn synthetic_series(n: usize) -> LoadSeries {
    let loads = (0..n)
        .map(|i| {
            let daily = ((i % 24) as f64 / 24.0 * std::f64::consts::TAU).sin() * 120.0;
            900.0 + daily + (i as f64 * 0.37).sin() * 15.0
        })
        .collect();
    LoadSeries::hourly(1_672_531_200_000, loads)
}

fn benchmark_feature_build(c: &mut Criterion) {
    let series = synthetic_series(8760); // one year of hours

    c.bench_function("build_features_one_year", |b| {
        b.iter(|| black_box(build_features(&series).unwrap()));
    });
}

fn benchmark_quantile_fit(c: &mut Criterion) {
    let series = synthetic_series(2000);
    let table = build_features(&series).unwrap();
    let x = Matrix::from_rows(&table.rows).unwrap();

    c.bench_function("quantile_fit_median_50_rounds", |b| {
        let params = GbdtParams {
            num_rounds: 50,
            ..GbdtParams::for_quantile(0.5)
        };
        b.iter(|| {
            black_box(QuantileGbdt::fit(params.clone(), &x, &table.targets).unwrap())
        });
    });
}

criterion_group!(benches, benchmark_feature_build, benchmark_quantile_fit);
criterion_main!(benches);
