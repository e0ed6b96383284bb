//! Angular-momentum recoupling coefficients.
//!
//! Every function here takes *doubled* arguments, so that half-integer spins
//! can be passed as odd integers: a spin-½ is `1`, a spin-1 is `2`, and so on.
//! Coefficients that violate a selection rule (triangle inequalities, parity,
//! projection ranges) evaluate to exactly zero rather than failing.

use once_cell::sync::Lazy;
use statrs::function::factorial::ln_factorial;

const TABLE_LEN: usize = 256;

/// `√3`, which relates the rank-0 and rank-1 couplings of two spin-½ legs.
pub const SQRT_3: f64 = 1.732_050_807_568_877_2;

static LN_FACT: Lazy<Vec<f64>> = Lazy::new(|| {
    (0..TABLE_LEN as u64).map(ln_factorial).collect()
});

fn ln_fact(n: i32) -> f64 {
    let n = n as usize;
    if n < TABLE_LEN { LN_FACT[n] } else { ln_factorial(n as u64) }
}

/// Sign `(-1)^(two_power / 2)`, where the halving truncates toward zero.
pub fn phase(two_power: i32) -> f64 {
    if (two_power / 2) % 2 != 0 { -1.0 } else { 1.0 }
}

/// Return `true` if the doubled spins `a`, `b`, `c` can couple.
pub fn triangle(a: i32, b: i32, c: i32) -> bool {
    a >= 0 && b >= 0 && c >= 0
        && (a + b + c) % 2 == 0
        && (a - b).abs() <= c
        && c <= a + b
}

// log of the triangle coefficient Δ(abc), doubled arguments
fn ln_delta(a: i32, b: i32, c: i32) -> f64 {
    0.5 * (
        ln_fact((a + b - c) / 2)
        + ln_fact((a - b + c) / 2)
        + ln_fact((-a + b + c) / 2)
        - ln_fact((a + b + c) / 2 + 1)
    )
}

/// Wigner 3j symbol
/// ```text
/// ( j1 j2 j3 )
/// ( m1 m2 m3 )
/// ```
pub fn wigner3j(
    two_j1: i32,
    two_j2: i32,
    two_j3: i32,
    two_m1: i32,
    two_m2: i32,
    two_m3: i32,
) -> f64 {
    if two_m1 + two_m2 + two_m3 != 0 { return 0.0; }
    if !triangle(two_j1, two_j2, two_j3) { return 0.0; }
    let proj_ok = |j: i32, m: i32| m.abs() <= j && (j + m) % 2 == 0;
    if !proj_ok(two_j1, two_m1)
        || !proj_ok(two_j2, two_m2)
        || !proj_ok(two_j3, two_m3)
    {
        return 0.0;
    }
    // integer-valued combinations
    let j1pj2mj3 = (two_j1 + two_j2 - two_j3) / 2;
    let j1mm1 = (two_j1 - two_m1) / 2;
    let j2pm2 = (two_j2 + two_m2) / 2;
    let j3mj2pm1 = (two_j3 - two_j2 + two_m1) / 2;
    let j3mj1mm2 = (two_j3 - two_j1 - two_m2) / 2;
    let k_min = 0.max(-j3mj2pm1).max(-j3mj1mm2);
    let k_max = j1pj2mj3.min(j1mm1).min(j2pm2);
    if k_min > k_max { return 0.0; }

    let ln_pre =
        ln_delta(two_j1, two_j2, two_j3)
        + 0.5 * (
            ln_fact((two_j1 + two_m1) / 2) + ln_fact((two_j1 - two_m1) / 2)
            + ln_fact((two_j2 + two_m2) / 2) + ln_fact((two_j2 - two_m2) / 2)
            + ln_fact((two_j3 + two_m3) / 2) + ln_fact((two_j3 - two_m3) / 2)
        );
    let sum: f64 =
        (k_min..=k_max)
        .map(|k| {
            let ln_den =
                ln_fact(k) + ln_fact(j1pj2mj3 - k) + ln_fact(j1mm1 - k)
                + ln_fact(j2pm2 - k) + ln_fact(j3mj2pm1 + k)
                + ln_fact(j3mj1mm2 + k);
            let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
            sign * (ln_pre - ln_den).exp()
        })
        .sum();
    let two_phase = two_j1 - two_j2 - two_m3;
    let sign = if (two_phase / 2).rem_euclid(2) == 0 { 1.0 } else { -1.0 };
    sign * sum
}

/// Wigner 6j symbol
/// ```text
/// { j1 j2 j3 }
/// { j4 j5 j6 }
/// ```
pub fn wigner6j(
    two_j1: i32,
    two_j2: i32,
    two_j3: i32,
    two_j4: i32,
    two_j5: i32,
    two_j6: i32,
) -> f64 {
    if !triangle(two_j1, two_j2, two_j3)
        || !triangle(two_j1, two_j5, two_j6)
        || !triangle(two_j4, two_j2, two_j6)
        || !triangle(two_j4, two_j5, two_j3)
    {
        return 0.0;
    }
    let a1 = (two_j1 + two_j2 + two_j3) / 2;
    let a2 = (two_j1 + two_j5 + two_j6) / 2;
    let a3 = (two_j4 + two_j2 + two_j6) / 2;
    let a4 = (two_j4 + two_j5 + two_j3) / 2;
    let b1 = (two_j1 + two_j2 + two_j4 + two_j5) / 2;
    let b2 = (two_j2 + two_j3 + two_j5 + two_j6) / 2;
    let b3 = (two_j3 + two_j1 + two_j6 + two_j4) / 2;
    let t_min = a1.max(a2).max(a3).max(a4);
    let t_max = b1.min(b2).min(b3);
    if t_min > t_max { return 0.0; }

    let ln_pre =
        ln_delta(two_j1, two_j2, two_j3)
        + ln_delta(two_j1, two_j5, two_j6)
        + ln_delta(two_j4, two_j2, two_j6)
        + ln_delta(two_j4, two_j5, two_j3);
    (t_min..=t_max)
        .map(|t| {
            let ln_term =
                ln_fact(t + 1)
                - ln_fact(t - a1) - ln_fact(t - a2)
                - ln_fact(t - a3) - ln_fact(t - a4)
                - ln_fact(b1 - t) - ln_fact(b2 - t) - ln_fact(b3 - t);
            let sign = if t % 2 == 0 { 1.0 } else { -1.0 };
            sign * (ln_pre + ln_term).exp()
        })
        .sum()
}

/// Wigner 9j symbol
/// ```text
/// { j1 j2 j3 }
/// { j4 j5 j6 }
/// { j7 j8 j9 }
/// ```
/// evaluated as a sum over products of three 6j symbols.
#[allow(clippy::too_many_arguments)]
pub fn wigner9j(
    two_j1: i32,
    two_j2: i32,
    two_j3: i32,
    two_j4: i32,
    two_j5: i32,
    two_j6: i32,
    two_j7: i32,
    two_j8: i32,
    two_j9: i32,
) -> f64 {
    let x_min =
        (two_j1 - two_j9).abs()
        .max((two_j8 - two_j4).abs())
        .max((two_j2 - two_j6).abs());
    let x_max =
        (two_j1 + two_j9)
        .min(two_j8 + two_j4)
        .min(two_j2 + two_j6);
    if x_min > x_max { return 0.0; }
    (x_min..=x_max).step_by(2)
        .map(|two_x| {
            let sign = if two_x % 2 == 0 { 1.0 } else { -1.0 };
            sign * (two_x + 1) as f64
                * wigner6j(two_j1, two_j4, two_j7, two_j8, two_j9, two_x)
                * wigner6j(two_j2, two_j5, two_j8, two_j4, two_x, two_j6)
                * wigner6j(two_j3, two_j6, two_j9, two_x, two_j1, two_j2)
        })
        .sum()
}

/// Clebsch-Gordan coefficient ⟨j1 m1 j2 m2 | J M⟩.
pub fn clebsch_gordan(
    two_j1: i32,
    two_m1: i32,
    two_j2: i32,
    two_m2: i32,
    two_j: i32,
    two_m: i32,
) -> f64 {
    let w = wigner3j(two_j1, two_j2, two_j, two_m1, two_m2, -two_m);
    if w == 0.0 { return 0.0; }
    let two_phase = two_j1 - two_j2 + two_m;
    let sign = if (two_phase / 2).rem_euclid(2) == 0 { 1.0 } else { -1.0 };
    sign * ((two_j + 1) as f64).sqrt() * w
}
