use std::hint::black_box;

use chrono::Duration;
use chrono::NaiveDate;
use criterion::criterion_group;
use criterion::criterion_main;
use criterion::BenchmarkId;
use criterion::Criterion;
use factor_allocator::config::RegressionFailurePolicy;
use factor_allocator::config::ShrinkageTarget;
use factor_allocator::data::FactorMatrix;
use factor_allocator::data::PriceMatrix;
use factor_allocator::model::estimate_expected_returns;
use factor_allocator::model::shrinkage_covariance;
use factor_allocator::portfolio::max_sharpe;
use ndarray::Array2;

const PERIODS: usize = 2_520;

fn dates(n: usize) -> Vec<NaiveDate> {
  let start = NaiveDate::from_ymd_opt(2010, 1, 4).unwrap();
  (0..n).map(|i| start + Duration::days(i as i64)).collect()
}

fn factors() -> FactorMatrix {
  let values = Array2::from_shape_fn((PERIODS, 5), |(t, c)| {
    let t = t as f64;
    match c {
      0 => 0.0004 + (0.83 * t).sin() * 0.01,
      1 => (1.19 * t).cos() * 0.004,
      2 => (0.31 * t + 0.7).sin() * 0.005,
      3 => (2.41 * t).sin() * (0.13 * t).cos() * 0.006,
      _ => 0.00005,
    }
  });
  FactorMatrix::new(dates(PERIODS), values).unwrap()
}

fn prices(factors: &FactorMatrix, n_assets: usize) -> PriceMatrix {
  let mut values = Array2::zeros((PERIODS, n_assets));
  for j in 0..n_assets {
    let s = j as f64;
    let betas = [0.6 + 0.05 * s, (0.3 * s).sin(), (0.7 * s).cos() * 0.5, 0.1 * (s % 3.0)];
    values[[0, j]] = 50.0 + s;
    for t in 1..PERIODS {
      let f = factors.values().row(t);
      let noise = ((t * (j + 5)) as f64 * 0.41).sin() * 0.006;
      let r = 0.0001 * (s % 4.0)
        + betas[0] * f[0]
        + betas[1] * f[1]
        + betas[2] * f[2]
        + betas[3] * f[3]
        + f[4]
        + noise;
      values[[t, j]] = values[[t - 1, j]] * (1.0 + r);
    }
  }
  let symbols = (0..n_assets).map(|j| format!("T{j:03}")).collect();
  PriceMatrix::new(dates(PERIODS), symbols, values).unwrap()
}

fn bench_pipeline(c: &mut Criterion) {
  let f = factors();
  let mut group = c.benchmark_group("allocation");

  for &n in &[10, 50, 200] {
    let p = prices(&f, n);

    group.bench_with_input(BenchmarkId::new("expected_returns", n), &n, |b, _| {
      b.iter(|| {
        black_box(
          estimate_expected_returns(&p, &f, 252, RegressionFailurePolicy::Exclude).unwrap(),
        )
      });
    });

    group.bench_with_input(BenchmarkId::new("ledoit_wolf", n), &n, |b, _| {
      b.iter(|| {
        black_box(shrinkage_covariance(&p, ShrinkageTarget::ConstantVariance, 1e-6).unwrap())
      });
    });

    let er = estimate_expected_returns(&p, &f, 252, RegressionFailurePolicy::Exclude).unwrap();
    let cov = shrinkage_covariance(&p, ShrinkageTarget::ConstantVariance, 1e-6).unwrap();
    group.bench_with_input(BenchmarkId::new("max_sharpe", n), &n, |b, _| {
      b.iter(|| black_box(max_sharpe(&er, &cov, true)));
    });
  }

  group.finish();
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
