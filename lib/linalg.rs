//! Dense kernels on column-major blocks stored inside flat buffers.
//!
//! Every block in this crate lives as a contiguous column-major slice of some
//! larger buffer; the functions here wrap such slices in `nalgebra` views and
//! forward to its BLAS-like routines. Shape disagreements between operands are
//! logic errors and panic.

use std::sync::atomic::{ AtomicUsize, Ordering };
use nalgebra as na;
use num_traits::Zero;
use crate::ComplexScalar;

/// Immutable column-major view over a flat slice.
pub type View<'a, A> = na::DMatrixView<'a, A>;

/// Mutable column-major view over a flat slice.
pub type ViewMut<'a, A> = na::DMatrixViewMut<'a, A>;

/// Wrap `data[.. rows * cols]` as a `rows × cols` matrix.
pub fn view<A: na::Scalar>(data: &[A], rows: usize, cols: usize) -> View<'_, A> {
    View::from_slice(&data[.. rows * cols], rows, cols)
}

/// Wrap `data[.. rows * cols]` as a mutable `rows × cols` matrix.
pub fn view_mut<A: na::Scalar>(data: &mut [A], rows: usize, cols: usize)
    -> ViewMut<'_, A>
{
    ViewMut::from_slice(&mut data[.. rows * cols], rows, cols)
}

/// Operand flag for [`gemm`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Op {
    /// Use the operand as-is.
    N,
    /// Transpose.
    T,
    /// Conjugate-transpose.
    C,
}

impl Op {
    /// Shape of the operand after applying the flag.
    pub fn shape(self, (rows, cols): (usize, usize)) -> (usize, usize) {
        match self {
            Self::N => (rows, cols),
            Self::T | Self::C => (cols, rows),
        }
    }

    fn apply<A: ComplexScalar>(self, m: &View<'_, A>) -> na::DMatrix<A> {
        match self {
            Self::N => m.clone_owned(),
            Self::T => m.transpose(),
            Self::C => m.adjoint(),
        }
    }
}

/// `C ← α op(A) op(B) + β C`.
///
/// *Panics if the operand shapes are inconsistent.*
pub fn gemm<A: ComplexScalar>(
    alpha: A,
    op_a: Op,
    a: &View<'_, A>,
    op_b: Op,
    b: &View<'_, A>,
    beta: A,
    c: &mut ViewMut<'_, A>,
) {
    let (m, k) = op_a.shape(a.shape());
    let (kb, n) = op_b.shape(b.shape());
    if k != kb || c.shape() != (m, n) { panic!("inconsistent dimensions"); }
    stats::GEMM.fetch_add(1, Ordering::Relaxed);
    match (op_a, op_b) {
        (Op::N, Op::N) => { c.gemm(alpha, a, b, beta); },
        (Op::T, Op::N) => { c.gemm_tr(alpha, a, b, beta); },
        (Op::C, Op::N) => { c.gemm_ad(alpha, a, b, beta); },
        _ => {
            let aa = op_a.apply(a);
            let bb = op_b.apply(b);
            c.gemm(alpha, &aa, &bb, beta);
        },
    }
}

/// `y ← α x + y`.
///
/// *Panics if the slices differ in length.*
pub fn axpy<A: ComplexScalar>(alpha: A, x: &[A], y: &mut [A]) {
    if x.len() != y.len() { panic!("inconsistent dimensions"); }
    stats::AXPY.fetch_add(1, Ordering::Relaxed);
    y.iter_mut().zip(x)
        .for_each(|(yi, xi)| { *yi += alpha.clone() * xi.clone(); });
}

/// `x ← α x`.
pub fn scal<A: ComplexScalar>(alpha: A, x: &mut [A]) {
    x.iter_mut().for_each(|xi| { *xi *= alpha.clone(); });
}

/// Lift a real coefficient into the element type.
pub fn re<A: ComplexScalar>(x: f64) -> A { na::convert(x) }

/// Per-worker scratch space, grown on demand and never shared.
#[derive(Clone, Debug, Default)]
pub struct Scratch<A> {
    a: Vec<A>,
    b: Vec<A>,
}

impl<A: ComplexScalar> Scratch<A> {
    /// Create scratch space holding two buffers of `len` elements each.
    pub fn new(len: usize) -> Self {
        Self { a: vec![A::zero(); len], b: vec![A::zero(); len] }
    }

    /// Return the first buffer with at least `len` elements.
    pub fn one(&mut self, len: usize) -> &mut [A] {
        if self.a.len() < len { self.a.resize(len, A::zero()); }
        &mut self.a[.. len]
    }

    /// Return both buffers, with at least `len_a` and `len_b` elements.
    pub fn two(&mut self, len_a: usize, len_b: usize)
        -> (&mut [A], &mut [A])
    {
        if self.a.len() < len_a { self.a.resize(len_a, A::zero()); }
        if self.b.len() < len_b { self.b.resize(len_b, A::zero()); }
        (&mut self.a[.. len_a], &mut self.b[.. len_b])
    }
}

/// Process-wide counts of dense kernel calls.
///
/// These are plain relaxed counters: they are meant for work accounting (e.g.
/// checking how the number of contractions grows with chain length), not for
/// synchronization.
pub mod stats {
    use super::*;

    pub(super) static GEMM: AtomicUsize = AtomicUsize::new(0);
    pub(super) static AXPY: AtomicUsize = AtomicUsize::new(0);

    /// Snapshot of the counters.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct Counts {
        pub gemm: usize,
        pub axpy: usize,
    }

    impl std::ops::Sub for Counts {
        type Output = Counts;

        fn sub(self, rhs: Self) -> Self::Output {
            Counts { gemm: self.gemm - rhs.gemm, axpy: self.axpy - rhs.axpy }
        }
    }

    /// Read the current counts.
    pub fn snapshot() -> Counts {
        Counts {
            gemm: GEMM.load(Ordering::Relaxed),
            axpy: AXPY.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use num_complex::Complex64 as C64;

    fn c(re: f64, im: f64) -> C64 { C64::new(re, im) }

    #[test]
    fn gemm_respects_flags() {
        // A = [1 2; 3 4] (column-major), B = [i 0; 1 1]
        let a = vec![c(1.0, 0.0), c(3.0, 0.0), c(2.0, 0.0), c(4.0, 0.0)];
        let b = vec![c(0.0, 1.0), c(1.0, 0.0), c(0.0, 0.0), c(1.0, 0.0)];
        let av = view(&a, 2, 2);
        let bv = view(&b, 2, 2);
        let dense_a = av.clone_owned();
        let dense_b = bv.clone_owned();
        for (op_a, op_b) in [
            (Op::N, Op::N), (Op::T, Op::N), (Op::C, Op::N),
            (Op::N, Op::T), (Op::N, Op::C), (Op::C, Op::C),
        ] {
            let mut out = vec![c(1.0, 0.0); 4];
            let mut ov = view_mut(&mut out, 2, 2);
            gemm(c(2.0, 0.0), op_a, &av, op_b, &bv, c(1.0, 0.0), &mut ov);
            let ea = match op_a {
                Op::N => dense_a.clone(),
                Op::T => dense_a.transpose(),
                Op::C => dense_a.adjoint(),
            };
            let eb = match op_b {
                Op::N => dense_b.clone(),
                Op::T => dense_b.transpose(),
                Op::C => dense_b.adjoint(),
            };
            let expected =
                (ea * eb).map(|x| x * c(2.0, 0.0))
                .map(|x| x + c(1.0, 0.0));
            for (x, y) in ov.iter().zip(expected.iter()) {
                assert_abs_diff_eq!(x.re, y.re, epsilon = 1e-12);
                assert_abs_diff_eq!(x.im, y.im, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn gemm_rectangular() {
        // (2×3)ᴴ (2×1) → 3×1
        let a: Vec<C64> = (0..6).map(|k| c(k as f64, 1.0)).collect();
        let b = vec![c(1.0, 0.0), c(-1.0, 0.0)];
        let mut out = vec![C64::zero(); 3];
        gemm(
            c(1.0, 0.0),
            Op::C, &view(&a, 2, 3),
            Op::N, &view(&b, 2, 1),
            C64::zero(), &mut view_mut(&mut out, 3, 1),
        );
        // column j of A is (2j + i, 2j + 1 + i); conj dot (1, -1) = -1
        for x in out {
            assert_abs_diff_eq!(x.re, -1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(x.im, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    #[should_panic(expected = "inconsistent dimensions")]
    fn gemm_shape_mismatch_panics() {
        let a = vec![C64::zero(); 6];
        let mut out = vec![C64::zero(); 4];
        gemm(
            C64::zero(),
            Op::N, &view(&a, 2, 3),
            Op::N, &view(&a, 2, 3),
            C64::zero(), &mut view_mut(&mut out, 2, 2),
        );
    }

    #[test]
    fn axpy_and_scal() {
        let x = vec![c(1.0, 0.0), c(0.0, 1.0)];
        let mut y = vec![c(1.0, 1.0), c(1.0, 1.0)];
        axpy(c(0.0, 1.0), &x, &mut y);
        assert_eq!(y, vec![c(1.0, 2.0), c(0.0, 1.0)]);
        scal(c(2.0, 0.0), &mut y);
        assert_eq!(y, vec![c(2.0, 4.0), c(0.0, 2.0)]);
        assert_eq!(re::<C64>(0.5), c(0.5, 0.0));
    }
}
