//! Eigensolvers for the electronic Hamiltonian projected onto a determinant subspace.

use std::fmt;

use anyhow;
use ndarray::{Array1, Array2, Array4};
use serde::{Deserialize, Serialize};

use crate::integrals::HamiltonianIntegrals;
use crate::samples::occupancy::OrbitalOccupancies;
use crate::subspace::DeterminantSubspace;

pub mod davidson;
pub mod hamiltonian;


fn default_spin_shift() -> f64 {
    0.2
}

/// Structure describing a penalty that steers the eigensolver toward a target `⟨Ŝ²⟩`.
///
/// The penalised operator is `Ĥ + shift × (Ŝ² − s²)²`, where `s²` is the target value. The
/// penalty only affects which state is found: reported energies exclude it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpinConstraint {
    /// The target value of `⟨Ŝ²⟩`.
    pub target_spin_sq: f64,

    /// The strength of the penalty.
    #[serde(default = "default_spin_shift")]
    pub shift: f64,
}

impl SpinConstraint {
    /// Creates a spin constraint with the default penalty strength.
    pub fn new(target_spin_sq: f64) -> Self {
        Self {
            target_spin_sq,
            shift: default_spin_shift(),
        }
    }
}

impl fmt::Display for SpinConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "⟨S²⟩ = {:.6} (penalty shift {:.3e})",
            self.target_spin_sq, self.shift
        )
    }
}

/// The lowest eigenstate found in a determinant subspace.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubspaceSolution {
    /// The electronic energy, excluding the nuclear repulsion energy and any spin penalty.
    pub energy: f64,

    /// The normalised coefficients in the product basis of the subspace.
    pub coefficients: Array1<f64>,

    /// The α and β orbital occupancies of the state.
    pub occupancies: OrbitalOccupancies,

    /// The expectation value of `Ŝ²`.
    pub spin_sq: f64,

    /// The number of solver cycles used.
    pub cycles: usize,
}

/// Trait for eigensolvers acting on a determinant subspace.
///
/// Implementors must be shareable across threads, since batches are solved in parallel, and
/// cloneable, since drivers holding them are assembled with builders.
pub trait SubspaceEigensolver: Sync + Clone {
    /// Finds the lowest eigenstate of the Hamiltonian in a subspace.
    ///
    /// # Arguments
    ///
    /// * `subspace` - The determinant subspace.
    /// * `integrals` - The Hamiltonian integrals.
    /// * `spin_constraint` - An optional penalty on `⟨Ŝ²⟩`.
    /// * `max_cycles` - The largest number of solver cycles allowed.
    ///
    /// # Errors
    ///
    /// [`crate::error::SqdError::EigensolveNonConvergence`] if the cycle budget is exhausted.
    fn solve(
        &self,
        subspace: &DeterminantSubspace,
        integrals: &HamiltonianIntegrals,
        spin_constraint: Option<&SpinConstraint>,
        max_cycles: usize,
    ) -> Result<SubspaceSolution, anyhow::Error>;

    /// Computes the spin-summed one- and two-particle reduced density matrices of a solution.
    fn calc_rdms(
        &self,
        subspace: &DeterminantSubspace,
        solution: &SubspaceSolution,
    ) -> Result<(Array2<f64>, Array4<f64>), anyhow::Error> {
        hamiltonian::calc_rdms(subspace, solution.coefficients.view())
    }
}
