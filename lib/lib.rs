#![allow(dead_code, non_snake_case, non_upper_case_globals)]

//! Renormalized boundary operators and effective-Hamiltonian application for
//! spin- and point-group-adapted matrix product states.
//!
//! A chain of `L` spatial orbitals is cut at a moving boundary. On either side
//! of the cut, the sites already swept over are summarized by a set of
//! [`BoundaryOperator`][operator::BoundaryOperator]s, each a block-sparse
//! matrix over the symmetry sectors of the virtual bond. As the cut moves, the
//! [update engine][update] renormalizes these operators one site at a time,
//! and the [effective Hamiltonian][heff] combines them with a two-site
//! [superblock][superblock::SuperblockTensor] to evaluate the action of the
//! full Hamiltonian on it.
//!
//! ```text
//!   left operators          superblock            right operators
//!  ┌──────────────┐   ┌───────┬───────┐   ┌───────────────────┐
//!  │ sites 0..s-1 ├───┤ site s│site s+1├───┤ sites s+2..L-1    │
//!  └──────────────┘   └───────┴───────┘   └───────────────────┘
//!     boundary s                              boundary s+2
//! ```

use nalgebra as na;

pub mod wigner;
pub mod symmetry;
pub mod linalg;
pub mod layout;
pub mod local;
pub mod integrals;

pub mod site;
pub mod superblock;
pub mod operator;
pub mod arena;
pub mod store;
pub mod triangle;

pub mod update;
pub mod ownership;
pub mod config;
pub mod sweep;

pub mod diagrams;
pub mod heff;
pub mod coefficient;

/// Convenience trait to identify number types that can be used as elements of
/// site tensors and boundary operators.
///
/// Recoupling coefficients are always real; they are lifted into the element
/// type through `nalgebra`'s `SupersetOf<f64>` conversion.
pub trait ComplexScalar
where Self: na::ComplexField<RealField = f64> + Copy
{ }

impl<A> ComplexScalar for A
where A: na::ComplexField<RealField = f64> + Copy
{ }
