use approx::assert_abs_diff_eq;
use num_complex::Complex64 as C64;
use num_traits::One;
use rand::{ rngs::StdRng, SeedableRng };
use renorm_ops::{
    config::EngineConfig,
    heff::EffectiveHamiltonian,
    integrals::IntegralTable,
    operator::Direction,
    ownership::Local,
    site::SiteTensor,
    superblock::SuperblockTensor,
    sweep::Environment,
    symmetry::{ Sector, SectorTable },
};

const U: f64 = 1.25;
const ECONST: f64 = -0.75;

// four sites, four electrons, every bond sector one-dimensional
fn table() -> SectorTable {
    SectorTable::fci(vec![0; 4], 1, Sector::new(4, 0, 0), 1).unwrap()
}

// on-site repulsion on the two middle orbitals only
fn hamiltonian() -> IntegralTable {
    let mut ham = IntegralTable::new(4, 4).unwrap();
    ham.set_econst(ECONST);
    ham.set_two_body(1, 1, 1, 1, U).unwrap();
    ham.set_two_body(2, 2, 2, 2, U).unwrap();
    ham
}

// unit outer sites: both overlaps are the identity
fn outer_sites(t: &SectorTable) -> (SiteTensor<C64>, SiteTensor<C64>) {
    let first = SiteTensor::from_fn(t, 0, |_, _, _| C64::one());
    let last = SiteTensor::from_fn(t, 3, |_, _, _| C64::one());
    (first, last)
}

fn check_diagonal(psi: &SuperblockTensor<C64>, h_psi: &SuperblockTensor<C64>, shift: f64) {
    for e in psi.entries() {
        let (_, loc, _) = e.key;
        let mut diag = ECONST + shift;
        if loc.n1 == 2 { diag += U; }
        if loc.n2 == 2 { diag += U; }
        let a = psi.block(&e.key).unwrap();
        let b = h_psi.block(&e.key).unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert_abs_diff_eq!(y.re, diag * x.re, epsilon = 1e-10);
            assert_abs_diff_eq!(y.im, diag * x.im, epsilon = 1e-10);
        }
    }
}

#[test]
fn interior_superblock_sees_only_local_repulsion() {
    let t = table();
    let ham = hamiltonian();
    let config = EngineConfig::new().threads(2);
    let mut env: Environment<_, _, C64> =
        Environment::new(&t, &ham, config, Local).unwrap();
    let (first, last) = outer_sites(&t);
    env.update_moving_right_safe(1, &first, &first).unwrap();
    env.update_moving_left_safe(3, &last, &last).unwrap();
    assert!(env.set(1, Direction::MovingRight).is_some());
    assert!(env.set(3, Direction::MovingLeft).is_some());

    let heff = EffectiveHamiltonian::new(&env, 1).unwrap();
    let mut rng = StdRng::seed_from_u64(10546);
    let psi = SuperblockTensor::new_rand(&t, 1, &mut rng);
    assert!(psi.n_blocks() > 0);
    let mut h_psi = heff.new_vector();
    heff.apply(&psi, &mut h_psi).unwrap();
    check_diagonal(&psi, &h_psi, 0.0);

    // the expectation value is the weighted average of the diagonal
    let e = heff.expectation(&psi).unwrap();
    let mut expected = 0.0;
    for entry in psi.entries() {
        let (_, loc, _) = entry.key;
        let w: f64 = psi.block(&entry.key).unwrap().iter().map(|x| x.norm_sqr()).sum();
        let mut diag = ECONST;
        if loc.n1 == 2 { diag += U; }
        if loc.n2 == 2 { diag += U; }
        expected += w * diag;
    }
    assert_abs_diff_eq!(e.re, expected, epsilon = 1e-10);
    assert_abs_diff_eq!(e.im, 0.0, epsilon = 1e-10);
}

#[test]
fn offset_energy_shifts_the_diagonal() {
    let t = table();
    let ham = hamiltonian();
    let config = EngineConfig::new().threads(1).offset_energy(0.5);
    let mut env: Environment<_, _, C64> =
        Environment::new(&t, &ham, config, Local).unwrap();
    let (first, last) = outer_sites(&t);
    env.update_moving_right_safe(1, &first, &first).unwrap();
    env.update_moving_left_safe(3, &last, &last).unwrap();

    let heff = EffectiveHamiltonian::new(&env, 1).unwrap();
    let mut rng = StdRng::seed_from_u64(8);
    let psi = SuperblockTensor::new_rand(&t, 1, &mut rng);
    let mut h_psi = heff.new_vector();
    heff.apply(&psi, &mut h_psi).unwrap();
    check_diagonal(&psi, &h_psi, 0.5);
}

#[test]
fn results_do_not_depend_on_thread_count() {
    let t = table();
    let ham = hamiltonian();
    let (first, last) = outer_sites(&t);
    let mut rng = StdRng::seed_from_u64(77);
    let psi = SuperblockTensor::new_rand(&t, 1, &mut rng);

    let outputs: Vec<SuperblockTensor<C64>> =
        [1, 3].into_iter()
        .map(|threads| {
            let config = EngineConfig::new().threads(threads);
            let mut env: Environment<_, _, C64> =
                Environment::new(&t, &ham, config, Local).unwrap();
            env.update_moving_right_safe(1, &first, &first).unwrap();
            env.update_moving_left_safe(3, &last, &last).unwrap();
            let heff = EffectiveHamiltonian::new(&env, 1).unwrap();
            let mut h_psi = heff.new_vector();
            heff.apply(&psi, &mut h_psi).unwrap();
            h_psi
        })
        .collect();
    for (x, y) in outputs[0].data().iter().zip(outputs[1].data()) {
        assert_abs_diff_eq!(x.re, y.re, epsilon = 1e-12);
        assert_abs_diff_eq!(x.im, y.im, epsilon = 1e-12);
    }
}
