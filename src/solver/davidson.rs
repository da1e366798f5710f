//! Davidson eigensolver for the lowest eigenstate in a determinant subspace.

use std::fmt;

use anyhow::{self, format_err};
use derive_builder::Builder;
use log;
use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::SqdError;
use crate::integrals::HamiltonianIntegrals;
use crate::solver::hamiltonian::{calc_occupancies, SubspaceHamiltonian};
use crate::solver::{SpinConstraint, SubspaceEigensolver, SubspaceSolution};
use crate::subspace::DeterminantSubspace;

#[cfg(test)]
#[path = "davidson_tests.rs"]
mod davidson_tests;

/// Smallest denominator allowed in the diagonal preconditioner.
const PRECONDITIONER_FLOOR: f64 = 1e-8;

/// Norm below which a correction vector is considered to lie in the current search space.
const LINEAR_DEPENDENCE_THRESHOLD: f64 = 1e-10;

fn default_convergence_threshold() -> f64 {
    1e-8
}
fn default_max_space() -> usize {
    30
}
fn default_num_guesses() -> usize {
    2
}

/// Structure containing the control parameters of the Davidson eigensolver.
#[derive(Clone, Builder, Debug, PartialEq, Serialize, Deserialize)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct DavidsonSolver {
    /// Threshold on the residual norm for convergence.
    #[builder(default = "1e-8")]
    #[serde(default = "default_convergence_threshold")]
    pub convergence_threshold: f64,

    /// The largest number of search vectors kept before the search space is collapsed onto the
    /// current and previous eigenvector estimates. Must be at least `3`.
    #[builder(default = "30")]
    #[serde(default = "default_max_space")]
    pub max_space: usize,

    /// The number of unit vectors on the lowest diagonal elements used as initial guesses.
    #[builder(default = "2")]
    #[serde(default = "default_num_guesses")]
    pub num_guesses: usize,
}

impl DavidsonSolverBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(thresh) = self.convergence_threshold {
            if !(thresh > 0.0) {
                return Err(format!("Invalid convergence threshold `{thresh}`."));
            }
        }
        if matches!(self.max_space, Some(n) if n < 3) {
            return Err("The Davidson search space must hold at least three vectors.".to_string());
        }
        if self.num_guesses == Some(0) {
            return Err("At least one initial guess is required.".to_string());
        }
        Ok(())
    }
}

impl DavidsonSolver {
    /// Returns a builder to construct a [`DavidsonSolver`] structure.
    pub fn builder() -> DavidsonSolverBuilder {
        DavidsonSolverBuilder::default()
    }
}

impl Default for DavidsonSolver {
    fn default() -> Self {
        Self::builder()
            .build()
            .expect("Unable to construct a default `DavidsonSolver`.")
    }
}

impl fmt::Display for DavidsonSolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Davidson convergence threshold: {:.3e}",
            self.convergence_threshold
        )?;
        writeln!(f, "Davidson maximum search space: {}", self.max_space)?;
        writeln!(f, "Davidson initial guesses: {}", self.num_guesses)?;
        Ok(())
    }
}

/// The operator being diagonalised: the Hamiltonian with an optional spin penalty.
struct PenalisedOperator<'a> {
    hamiltonian: SubspaceHamiltonian<'a>,
    spin_constraint: Option<&'a SpinConstraint>,
}

impl<'a> PenalisedOperator<'a> {
    fn apply(&self, c: ArrayView1<f64>) -> Array1<f64> {
        let mut sigma = self.hamiltonian.apply(c);
        if let Some(spin) = self.spin_constraint {
            let mut s1 = self.hamiltonian.apply_spin_sq(c);
            s1.scaled_add(-spin.target_spin_sq, &c);
            let mut s2 = self.hamiltonian.apply_spin_sq(s1.view());
            s2.scaled_add(-spin.target_spin_sq, &s1);
            sigma.scaled_add(spin.shift, &s2);
        }
        sigma
    }

    fn diagonal(&self) -> Array1<f64> {
        match self.spin_constraint {
            Some(spin) => {
                let s2 = self.hamiltonian.spin_sq_diagonal();
                self.hamiltonian.diagonal()
                    + &s2.mapv(|x| spin.shift * (x - spin.target_spin_sq).powi(2))
            }
            None => self.hamiltonian.diagonal().clone(),
        }
    }
}

impl DavidsonSolver {
    /// Runs the Davidson iterations and returns the normalised lowest eigenvector together with
    /// the number of cycles used.
    fn iterate(
        &self,
        op: &PenalisedOperator,
        max_cycles: usize,
    ) -> Result<(Array1<f64>, usize), anyhow::Error> {
        let dim = op.hamiltonian.dimension();
        let diag = op.diagonal();

        let mut order = (0..dim).collect::<Vec<_>>();
        order.sort_by(|&i, &j| diag[i].total_cmp(&diag[j]));
        let mut basis = Vec::<Array1<f64>>::new();
        let mut sigmas = Vec::<Array1<f64>>::new();
        order
            .iter()
            .take(self.num_guesses.min(dim))
            .for_each(|&i| {
                let mut v = Array1::<f64>::zeros(dim);
                v[i] = 1.0;
                sigmas.push(op.apply(v.view()));
                basis.push(v);
            });

        let mut residual_norm = f64::INFINITY;
        let mut cycles = 0;
        let mut previous: Option<(Array1<f64>, Array1<f64>)> = None;
        for cycle in 1..=max_cycles {
            cycles = cycle;
            let n = basis.len();
            let projected = DMatrix::from_fn(n, n, |i, j| basis[i].dot(&sigmas[j]));
            let projected = (&projected + projected.transpose()) * 0.5;
            let eig = SymmetricEigen::new(projected);
            let (imin, theta) = eig
                .eigenvalues
                .iter()
                .copied()
                .enumerate()
                .min_by(|(_, a), (_, b)| a.total_cmp(b))
                .ok_or_else(|| format_err!("Empty Davidson search space."))?;
            let y = eig.eigenvectors.column(imin);

            let mut x = Array1::<f64>::zeros(dim);
            let mut ax = Array1::<f64>::zeros(dim);
            basis.iter().zip(sigmas.iter()).enumerate().for_each(|(i, (v, s))| {
                x.scaled_add(y[i], v);
                ax.scaled_add(y[i], s);
            });
            let residual = &ax - &(theta * &x);
            residual_norm = residual.dot(&residual).sqrt();
            log::debug!(
                "Davidson cycle {cycle:>3}: eigenvalue {theta:+.12}, residual {residual_norm:.3e}, \
                search space {n}"
            );
            if residual_norm < self.convergence_threshold || n >= dim {
                let norm = x.dot(&x).sqrt();
                return Ok((x / norm, cycle));
            }

            let mut t = Array1::from_shape_fn(dim, |k| {
                let denom = theta - diag[k];
                let denom = if denom.abs() < PRECONDITIONER_FLOOR {
                    PRECONDITIONER_FLOOR.copysign(denom)
                } else {
                    denom
                };
                residual[k] / denom
            });

            let xnorm = x.dot(&x).sqrt();
            let (x, ax) = (x / xnorm, ax / xnorm);
            if n + 1 > self.max_space {
                // Thick restart: keep the current and the previous Ritz vectors.
                basis = vec![x.clone()];
                sigmas = vec![ax.clone()];
                if let Some((px, pax)) = previous.as_ref() {
                    let overlap = x.dot(px);
                    let p = px - &(overlap * &x);
                    let pnorm = p.dot(&p).sqrt();
                    if pnorm > LINEAR_DEPENDENCE_THRESHOLD {
                        sigmas.push((pax - &(overlap * &ax)) / pnorm);
                        basis.push(p / pnorm);
                    }
                }
            }
            previous = Some((x, ax));
            let mut tnorm = orthonormalise(&mut t, &basis);
            if tnorm < LINEAR_DEPENDENCE_THRESHOLD {
                t = residual.clone();
                tnorm = orthonormalise(&mut t, &basis);
            }
            if tnorm < LINEAR_DEPENDENCE_THRESHOLD {
                break;
            }
            sigmas.push(op.apply(t.view()));
            basis.push(t);
        }
        Err(SqdError::EigensolveNonConvergence {
            cycles,
            residual: residual_norm,
        }
        .into())
    }
}

/// Orthogonalises `t` against an orthonormal basis twice and normalises it. Returns the norm
/// before normalisation.
fn orthonormalise(t: &mut Array1<f64>, basis: &[Array1<f64>]) -> f64 {
    for _ in 0..2 {
        basis.iter().for_each(|v| {
            let overlap = v.dot(t);
            t.scaled_add(-overlap, v);
        });
    }
    let norm = t.dot(t).sqrt();
    if norm > 0.0 {
        t.mapv_inplace(|x| x / norm);
    }
    norm
}

impl SubspaceEigensolver for DavidsonSolver {
    fn solve(
        &self,
        subspace: &DeterminantSubspace,
        integrals: &HamiltonianIntegrals,
        spin_constraint: Option<&SpinConstraint>,
        max_cycles: usize,
    ) -> Result<SubspaceSolution, anyhow::Error> {
        let op = PenalisedOperator {
            hamiltonian: SubspaceHamiltonian::new(subspace, integrals)?,
            spin_constraint,
        };
        let (coefficients, cycles) = self.iterate(&op, max_cycles)?;
        let energy = coefficients.dot(&op.hamiltonian.apply(coefficients.view()));
        let spin_sq = coefficients.dot(&op.hamiltonian.apply_spin_sq(coefficients.view()));
        let occupancies = calc_occupancies(subspace, coefficients.view())?;
        log::debug!(
            "Subspace of dimension {} solved in {cycles} cycle(s): E = {energy:+.12}, ⟨S²⟩ = {spin_sq:.6}",
            subspace.dimension()
        );
        Ok(SubspaceSolution {
            energy,
            coefficients,
            occupancies,
            spin_sq,
            cycles,
        })
    }
}
