//! Work accounting for full sweeps in both directions.
//!
//! Contraction counters are process-wide, so this file holds a single test.

use num_complex::Complex64 as C64;
use rand::{ rngs::StdRng, Rng, SeedableRng };
use renorm_ops::{
    config::EngineConfig,
    integrals::IntegralTable,
    linalg::stats,
    ownership::Local,
    site::SiteTensor,
    sweep::Environment,
    symmetry::{ Sector, SectorTable },
};

// gemm calls of a left-to-right pass followed by a right-to-left pass
fn sweep_both_ways(n_sites: usize, seed: u64) -> (usize, usize) {
    let mut rng = StdRng::seed_from_u64(seed);
    let t = SectorTable::fci(vec![0; n_sites], 1, Sector::new(2, 0, 0), 1).unwrap();
    let mut ham = IntegralTable::new(n_sites, 2).unwrap();
    for i in 0..n_sites {
        for j in 0..n_sites {
            ham.set_one_body(i, j, rng.gen_range(-1.0..1.0)).unwrap();
            ham.set_two_body(i, j, i, j, rng.gen_range(0.0..1.0)).unwrap();
            ham.set_two_body(i, i, j, j, rng.gen_range(0.0..0.1)).unwrap();
        }
    }
    let sites: Vec<SiteTensor<C64>> =
        (0..n_sites).map(|s| SiteTensor::new_rand(&t, s, &mut rng)).collect();
    let config = EngineConfig::new().threads(2);
    let mut env: Environment<_, _, C64> =
        Environment::new(&t, &ham, config, Local).unwrap();

    let before = stats::snapshot();
    for b in 1..n_sites {
        env.update_moving_right_safe(b, &sites[b - 1], &sites[b - 1]).unwrap();
    }
    let right = (stats::snapshot() - before).gemm;

    let before = stats::snapshot();
    for b in (1..n_sites).rev() {
        env.update_moving_left_safe(b, &sites[b], &sites[b]).unwrap();
    }
    let left = (stats::snapshot() - before).gemm;
    (right, left)
}

#[test]
fn contraction_count_grows_at_most_cubically() {
    let counts: Vec<(usize, usize)> =
        [(6, 1), (12, 2), (24, 3)].into_iter()
        .map(|(n, seed)| sweep_both_ways(n, seed))
        .collect();
    for &(right, left) in counts.iter() {
        assert!(right > 0 && left > 0);
    }
    // doubling the chain: about 8x for cubic growth, 16x for quartic
    for pair in counts.windows(2) {
        let (small, large) = (pair[0], pair[1]);
        assert!(large.0 < 12 * small.0, "rightward gemm calls: {small:?} -> {large:?}");
        assert!(large.1 < 12 * small.1, "leftward gemm calls: {small:?} -> {large:?}");
    }
}
