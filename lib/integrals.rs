//! Hamiltonian coefficients.
//!
//! The engine sees the Hamiltonian
//! ```text
//! H = E_c + Σ_ik T_ik Σ_σ a†_iσ a_kσ + ½ Σ_ijkl V_ijkl Σ_στ a†_iσ a†_jτ a_lτ a_kσ
//! ```
//! only through the folded element [`Integrals::mx_element`], which absorbs the
//! one-body part into the two-body part for a fixed particle count `N`:
//! ```text
//! V'_ijkl = V_ijkl + (T_ik δ_jl + T_jl δ_ik) / (N - 1)
//! ```
//! On `N`-particle states, `½ Σ V'_ijkl a†a†aa` then equals the full operator
//! minus the constant.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntegralError {
    /// Returned when an orbital index is out of bounds.
    #[error("error in integral table: orbital {0} out of range for {1} orbitals")]
    OrbitalRange(usize, usize),

    /// Returned when the particle count is too small to fold the one-body
    /// terms into the two-body terms.
    #[error("error in integral table: one-body folding needs at least two particles, got {0}")]
    TooFewParticles(usize),
}
use IntegralError::*;
pub type IntegralResult<T> = Result<T, IntegralError>;

/// Read access to Hamiltonian coefficients.
pub trait Integrals: Sync {
    /// Number of spatial orbitals (chain sites).
    fn n_orbitals(&self) -> usize;

    /// Total particle count of the target sector.
    fn n_particles(&self) -> usize;

    /// Constant energy shift.
    fn econst(&self) -> f64;

    /// One-body element `T_ik`.
    fn one_body(&self, i: usize, k: usize) -> f64;

    /// Two-body element `V_ijkl`, physicists' ordering.
    fn two_body(&self, i: usize, j: usize, k: usize, l: usize) -> f64;

    /// Folded element `V'_ijkl`.
    fn mx_element(&self, i: usize, j: usize, k: usize, l: usize) -> f64 {
        let n1 = (self.n_particles() as f64 - 1.0).max(1.0);
        let mut x = self.two_body(i, j, k, l);
        if j == l { x += self.one_body(i, k) / n1; }
        if i == k { x += self.one_body(j, l) / n1; }
        x
    }
}

/// Dense in-memory [`Integrals`] for real orbitals.
///
/// Two-body elements are stored with the eightfold permutational symmetry of
/// real orbitals: setting one element sets all of its images.
#[derive(Clone, Debug)]
pub struct IntegralTable {
    n_orb: usize,
    n_part: usize,
    econst: f64,
    t: Vec<f64>,
    v: Vec<f64>,
}

impl IntegralTable {
    /// Create a table of zeros.
    pub fn new(n_orb: usize, n_part: usize) -> IntegralResult<Self> {
        if n_part < 2 { return Err(TooFewParticles(n_part)); }
        Ok(Self {
            n_orb,
            n_part,
            econst: 0.0,
            t: vec![0.0; n_orb * n_orb],
            v: vec![0.0; n_orb.pow(4)],
        })
    }

    fn check(&self, idx: &[usize]) -> IntegralResult<()> {
        match idx.iter().find(|i| **i >= self.n_orb) {
            Some(&i) => Err(OrbitalRange(i, self.n_orb)),
            None => Ok(()),
        }
    }

    fn v_index(&self, i: usize, j: usize, k: usize, l: usize) -> usize {
        let n = self.n_orb;
        ((i * n + j) * n + k) * n + l
    }

    /// Set the constant energy shift.
    pub fn set_econst(&mut self, econst: f64) { self.econst = econst; }

    /// Set `T_ik = T_ki = val`.
    pub fn set_one_body(&mut self, i: usize, k: usize, val: f64)
        -> IntegralResult<()>
    {
        self.check(&[i, k])?;
        self.t[i * self.n_orb + k] = val;
        self.t[k * self.n_orb + i] = val;
        Ok(())
    }

    /// Set `V_ijkl` and its seven symmetric images.
    pub fn set_two_body(&mut self, i: usize, j: usize, k: usize, l: usize, val: f64)
        -> IntegralResult<()>
    {
        self.check(&[i, j, k, l])?;
        let images = [
            (i, j, k, l), (j, i, l, k), (k, l, i, j), (l, k, j, i),
            (k, j, i, l), (l, i, j, k), (i, l, k, j), (j, k, l, i),
        ];
        for (a, b, c, d) in images {
            let idx = self.v_index(a, b, c, d);
            self.v[idx] = val;
        }
        Ok(())
    }
}

impl Integrals for IntegralTable {
    fn n_orbitals(&self) -> usize { self.n_orb }

    fn n_particles(&self) -> usize { self.n_part }

    fn econst(&self) -> f64 { self.econst }

    fn one_body(&self, i: usize, k: usize) -> f64 {
        self.t[i * self.n_orb + k]
    }

    fn two_body(&self, i: usize, j: usize, k: usize, l: usize) -> f64 {
        self.v[self.v_index(i, j, k, l)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn two_body_symmetry() {
        let mut tab = IntegralTable::new(3, 2).unwrap();
        tab.set_two_body(0, 1, 2, 1, 0.25).unwrap();
        assert_eq!(tab.two_body(1, 0, 1, 2), 0.25);
        assert_eq!(tab.two_body(2, 1, 0, 1), 0.25);
        assert_eq!(tab.two_body(0, 1, 1, 2), 0.0);
    }

    #[test]
    fn folding_one_body() {
        let mut tab = IntegralTable::new(2, 3).unwrap();
        tab.set_one_body(0, 1, -1.0).unwrap();
        tab.set_one_body(0, 0, 2.0).unwrap();
        tab.set_two_body(0, 1, 1, 1, 0.5).unwrap();
        // V + T_01 δ_11 / (N - 1)
        assert_abs_diff_eq!(tab.mx_element(0, 1, 1, 1), 0.0, epsilon = 1e-14);
        assert_abs_diff_eq!(tab.mx_element(1, 0, 1, 1), 0.0, epsilon = 1e-14);
        assert_abs_diff_eq!(tab.mx_element(0, 1, 0, 1), 1.0, epsilon = 1e-14);
    }

    #[test]
    fn bad_indices() {
        let mut tab = IntegralTable::new(2, 2).unwrap();
        assert!(matches!(
            tab.set_two_body(0, 0, 2, 0, 1.0),
            Err(IntegralError::OrbitalRange(2, 2))
        ));
        assert!(matches!(
            IntegralTable::new(2, 1),
            Err(IntegralError::TooFewParticles(1))
        ));
    }
}
