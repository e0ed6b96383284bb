//! Amplitudes of single determinants in a spin-adapted chain.
//!
//! A chain of site tensors stores a whole spin multiplet. The amplitude of a
//! determinant with total projection `M` is found by following the chain from
//! the vacuum, carrying for each bond sector a row vector of bond amplitudes
//! together with the running projection, and weighting every singly occupied
//! site by the Clebsch-Gordan coefficient of `SL ⊗ ½ → SR`.
//!
//! Determinants are ordered site by site, spin up before spin down within a
//! site:
//! ```text
//! |D⟩ = Π_k ( a†_k↑ )^{u_k} ( a†_k↓ )^{d_k} |0⟩
//! ```

use num_traits::{ One, Zero };
use rustc_hash::FxHashMap;
use thiserror::Error;
use crate::{
    ComplexScalar,
    linalg::{ self, Op },
    site::SiteTensor,
    symmetry::{ grow, Occupation, Sector, SectorIndex },
    wigner::clebsch_gordan,
};

#[derive(Debug, Error)]
pub enum CoefficientError {
    /// Returned when the determinant does not have one entry per site.
    #[error("error in coefficient: determinant has {0} orbitals, expected {1}")]
    Length(usize, usize),

    /// Returned when the chain does not have one tensor per site, in order.
    #[error("error in coefficient: tensor {0} is for site {1}")]
    WrongSite(usize, usize),
}
use CoefficientError::*;
pub type CoefficientResult<T> = Result<T, CoefficientError>;

/// Occupation of one spatial orbital in a determinant.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Orbital {
    Empty,
    Up,
    Down,
    Double,
}

impl Orbital {
    /// Parse one orbital from `0`, `u`, `d`, `2`.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(Self::Empty),
            'u' | 'a' => Some(Self::Up),
            'd' | 'b' => Some(Self::Down),
            '2' => Some(Self::Double),
            _ => None,
        }
    }

    pub fn occupation(self) -> Occupation {
        match self {
            Self::Empty => Occupation::Empty,
            Self::Up | Self::Down => Occupation::Single,
            Self::Double => Occupation::Double,
        }
    }

    /// Doubled spin projection.
    pub fn two_m(self) -> i32 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
            _ => 0,
        }
    }
}

/// Parse a determinant written as a string of `0`, `u`, `d`, `2`.
pub fn parse_determinant(s: &str) -> Option<Vec<Orbital>> {
    s.chars().map(Orbital::from_char).collect()
}

/// Amplitude `⟨D|Ψ⟩` of the determinant `det` in the chain `sites`.
///
/// Returns zero if the determinant lies outside the target sector.
pub fn fci_coefficient<I, A>(index: &I, sites: &[SiteTensor<A>], det: &[Orbital])
    -> CoefficientResult<A>
where
    I: SectorIndex + ?Sized,
    A: ComplexScalar,
{
    let n_sites = index.n_sites();
    if det.len() != n_sites { return Err(Length(det.len(), n_sites)); }
    if sites.len() != n_sites { return Err(Length(sites.len(), n_sites)); }
    if let Some((k, t)) = sites.iter().enumerate().find(|(k, t)| t.site() != *k) {
        return Err(WrongSite(k, t.site()));
    }

    let mut two_m = 0;
    let mut rows: FxHashMap<Sector, Vec<A>> = FxHashMap::default();
    rows.insert(Sector::vacuum(), vec![A::one()]);
    for (k, (tens, orb)) in sites.iter().zip(det).enumerate() {
        let next_m = two_m + orb.two_m();
        let mut next: FxHashMap<Sector, Vec<A>> = FxHashMap::default();
        for (left, row) in rows.iter() {
            let v = linalg::view(row, 1, row.len());
            let grown =
                grow(*left, index.orbital_irrep(k))
                .filter(|(occ, _)| *occ == orb.occupation());
            for (_, right) in grown {
                if next_m.abs() > right.two_s { continue; }
                let Some(blk) = tens.block(*left, right) else { continue; };
                let cg =
                    if orb.occupation() == Occupation::Single {
                        clebsch_gordan(left.two_s, two_m, 1, orb.two_m(), right.two_s, next_m)
                    } else {
                        1.0
                    };
                if cg == 0.0 { continue; }
                let acc = next.entry(right).or_insert_with(|| vec![A::zero(); blk.ncols()]);
                let mut out = linalg::view_mut(acc, 1, blk.ncols());
                linalg::gemm(linalg::re(cg), Op::N, &v, Op::N, &blk, A::one(), &mut out);
            }
        }
        rows = next;
        two_m = next_m;
    }
    Ok(rows.get(&index.target())
        .and_then(|row| row.first().copied())
        .unwrap_or_else(A::zero))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use itertools::Itertools;
    use num_complex::Complex64 as C64;
    use crate::symmetry::SectorTable;

    fn det(s: &str) -> Vec<Orbital> { parse_determinant(s).unwrap() }

    #[test]
    fn singlet_of_two_orbitals() {
        let t = SectorTable::fci(vec![0; 2], 1, Sector::new(2, 0, 0), 1).unwrap();
        let sites: Vec<SiteTensor<C64>> =
            (0..2).map(|k| SiteTensor::from_fn(&t, k, |_, _, _| C64::one())).collect();
        let c = |s: &str| fci_coefficient(&t, &sites, &det(s)).unwrap();
        assert_abs_diff_eq!(c("20").re, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c("02").re, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c("ud").re, std::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-12);
        assert_abs_diff_eq!(c("du").re, -std::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-12);
        assert_eq!(c("uu"), C64::zero());
        assert_eq!(c("2u"), C64::zero());
    }

    #[test]
    fn determinant_weights_add_up_to_the_norm() {
        // all ones with unit dimensions: three paths, the open-shell one split
        // over two determinants
        let t = SectorTable::fci(vec![0; 2], 1, Sector::new(2, 0, 0), 1).unwrap();
        let sites: Vec<SiteTensor<C64>> =
            (0..2).map(|k| SiteTensor::from_fn(&t, k, |_, _, _| C64::one())).collect();
        let total: f64 =
            ["0", "u", "d", "2"].iter()
            .cartesian_product(["0", "u", "d", "2"].iter())
            .map(|(a, b)| {
                let d = det(&format!("{a}{b}"));
                fci_coefficient(&t, &sites, &d).unwrap().norm_sqr()
            })
            .sum();
        assert_abs_diff_eq!(total, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn malformed_input_is_an_error() {
        let t = SectorTable::fci(vec![0; 2], 1, Sector::new(2, 0, 0), 1).unwrap();
        let sites: Vec<SiteTensor<C64>> =
            (0..2).map(|k| SiteTensor::new(&t, k)).collect();
        assert!(matches!(fci_coefficient(&t, &sites, &det("2")), Err(Length(1, 2))));
        let swapped = vec![sites[1].clone(), sites[0].clone()];
        assert!(matches!(fci_coefficient(&t, &swapped, &det("20")), Err(WrongSite(0, 1))));
        assert!(parse_determinant("2x").is_none());
    }
}
