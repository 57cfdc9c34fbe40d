use criterion::{Criterion, black_box, criterion_group, criterion_main};
use std::time::Duration;

use faer_core::Parallelism;
use slope_rs::{
    DesignMatrix, FitOptions, NormalizedDesign, SlopeSolver, SolverOptions, SortedL1Norm,
    SortedL1Workspace, fit_slope,
};

struct Lcg(u64);

impl Lcg {
    fn next_f64(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.0 >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
    }
}

fn random_values(rng: &mut Lcg, len: usize) -> Vec<f64> {
    (0..len).map(|_| rng.next_f64()).collect()
}

fn linear_lambda(p: usize) -> Vec<f64> {
    (0..p).map(|i| (p - i) as f64 / p as f64).collect()
}

fn bench_prox(c: &mut Criterion) {
    let p = 1000;
    let mut rng = Lcg(29);
    let v = random_values(&mut rng, p);
    let norm = SortedL1Norm::new(linear_lambda(p)).unwrap();
    let mut ws = SortedL1Workspace::new(p);
    let mut out = vec![0.0; p];
    c.bench_function("prox_1000", |b| {
        b.iter(|| {
            norm.prox_into(&v, 0.5, &mut out, &mut ws);
            black_box(&out);
        });
    });
}

fn bench_fit_dense(c: &mut Criterion) {
    let (n, p) = (200, 20);
    let mut rng = Lcg(31);
    let values = random_values(&mut rng, n * p);
    let mut beta_true = vec![0.0; p];
    beta_true[0] = 2.0;
    beta_true[3] = -1.5;
    beta_true[7] = 0.5;
    let y: Vec<f64> = (0..n)
        .map(|i| {
            let mut sum = 0.3;
            for (j, b) in beta_true.iter().enumerate() {
                sum += values[j * n + i] * b;
            }
            sum + 0.05 * rng.next_f64()
        })
        .collect();
    let x = DesignMatrix::from_column_major(n, p, values).unwrap();
    let lambda = linear_lambda(p);
    let options = FitOptions {
        solver: SolverOptions {
            tol: 1e-6,
            ..SolverOptions::default()
        },
        ..FitOptions::default()
    };
    c.bench_function("fit_dense_200x20", |b| {
        b.iter(|| {
            let fit = fit_slope(&x, &y, &lambda, 0.05, &options, None).unwrap();
            black_box(fit.stats.iterations);
        });
    });
}

fn bench_solver_reuse(c: &mut Criterion) {
    let (n, p) = (100, 10);
    let mut rng = Lcg(37);
    let values = random_values(&mut rng, n * p);
    let y = random_values(&mut rng, n);
    let x = DesignMatrix::from_column_major(n, p, values).unwrap();
    let penalty = SortedL1Norm::new(linear_lambda(p)).unwrap();
    let mut problem = NormalizedDesign::new(&x, None, Parallelism::None);
    let mut solver = SlopeSolver::new(n, p).unwrap();
    let opts_verbose = SolverOptions {
        tol: 1e-6,
        verbose: true,
        ..SolverOptions::default()
    };
    let opts_quiet = SolverOptions {
        verbose: false,
        ..opts_verbose.clone()
    };
    let mut beta = vec![0.0; p];
    let mut first = true;
    c.bench_function("solve_reused_workspace_100x10", |b| {
        b.iter(|| {
            beta.fill(0.0);
            let opts = if first {
                first = false;
                &opts_verbose
            } else {
                &opts_quiet
            };
            let stats = solver
                .solve(
                    &mut problem,
                    &y,
                    &penalty,
                    0.1,
                    &mut beta,
                    None,
                    opts,
                    None,
                )
                .unwrap();
            black_box(stats.iterations);
        });
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .sample_size(10)
        .warm_up_time(Duration::from_millis(500))
        .measurement_time(Duration::from_millis(1000));
    targets =
        bench_prox,
        bench_fit_dense,
        bench_solver_reuse
}
criterion_main!(benches);
