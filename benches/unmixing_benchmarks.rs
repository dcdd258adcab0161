//! Benchmarks for the unmixing stages
//!
//! Compares performance of:
//! - Statistics pass at several tile sizes
//! - VCA extraction
//! - UCLS, NCLS, ISRA and per-pixel MDMDNMF over a whole image

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hsi_unmix::cube::TilingConfig;
use hsi_unmix::simulation::{random_endmembers, simulate_scene, SceneOptions, SyntheticScene};
use hsi_unmix::statistics::{compute_statistics, StatisticsConfig};
use hsi_unmix::unmixing::{unmix_image, MdmdnmfConfig, PreparedSolver, UnmixingSolver};
use hsi_unmix::vca::{vca, VcaConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Generate a noisy 64 × 64 scene with 50 bands and 5 endmembers
fn generate_scene() -> SyntheticScene {
    let endmembers = random_endmembers(50, 5, Some(1));
    let options = SceneOptions {
        noise_sd: 0.005,
        ..SceneOptions::default()
    };
    simulate_scene(&endmembers, 64, 64, &options).expect("valid scene")
}

fn bench_statistics(c: &mut Criterion) {
    let scene = generate_scene();
    let mut group = c.benchmark_group("statistics");
    for tile in [8usize, 32, 64] {
        let tiling = TilingConfig {
            tile_height: tile,
            tile_width: tile,
        };
        group.bench_with_input(BenchmarkId::from_parameter(tile), &tiling, |b, tiling| {
            b.iter(|| {
                compute_statistics(black_box(&scene.cube), tiling, &StatisticsConfig::default())
            })
        });
    }
    group.finish();
}

fn bench_vca(c: &mut Criterion) {
    let scene = generate_scene();
    let tiling = TilingConfig::default();
    c.bench_function("vca_p5", |b| {
        b.iter(|| {
            let mut rng = StdRng::seed_from_u64(3);
            vca(black_box(&scene.cube), 5, &mut rng, &tiling, &VcaConfig::default())
        })
    });
}

fn bench_solvers(c: &mut Criterion) {
    let scene = generate_scene();
    let tiling = TilingConfig::default();
    let solvers = [
        UnmixingSolver::Ucls,
        UnmixingSolver::Ncls { max_iter: 10 },
        UnmixingSolver::Isra { max_iter: 10 },
        UnmixingSolver::Mdmdnmf(MdmdnmfConfig {
            max_iter: 20,
            update_endmembers: false,
            ..MdmdnmfConfig::default()
        }),
    ];

    let mut group = c.benchmark_group("unmix_image");
    group.sample_size(10);
    for solver in solvers {
        let prepared = PreparedSolver::new(solver, &scene.endmembers, 1e12).expect("well conditioned");
        group.bench_function(solver.name(), |b| {
            b.iter(|| unmix_image(black_box(&scene.cube), &prepared, &tiling))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_statistics, bench_vca, bench_solvers);
criterion_main!(benches);
