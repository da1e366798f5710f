//! Orbital rotations generated by real antisymmetric matrices.
//!
//! A rotation is parametrised by a generator `κ` with `κ_qp = −κ_pq`. Only the strictly upper
//! triangular entries are stored, so antisymmetry holds by construction. The orbital rotation is
//! `U(κ) = exp(κ)`, applied identically to both spin sectors.

use std::fmt;

use anyhow;
use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::SqdError;

pub mod expm;
pub mod gradient;


/// A real orbital rotation stored as the strictly upper triangular part of its antisymmetric
/// generator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrbitalRotation {
    /// The number of spatial orbitals.
    norb: usize,

    /// The entries `κ_pq` with `p < q`, in row-major order.
    params: Array1<f64>,
}

impl OrbitalRotation {
    /// The identity rotation on `norb` orbitals.
    pub fn identity(norb: usize) -> Self {
        Self {
            norb,
            params: Array1::zeros(norb * norb.saturating_sub(1) / 2),
        }
    }

    /// Constructs a rotation from its upper triangular parameters.
    ///
    /// # Errors
    ///
    /// [`SqdError::Configuration`] if the number of parameters is not `norb (norb − 1) / 2`.
    pub fn from_params(norb: usize, params: Array1<f64>) -> Result<Self, anyhow::Error> {
        let expected = norb * norb.saturating_sub(1) / 2;
        if params.len() != expected {
            return Err(SqdError::Configuration(format!(
                "A rotation of {norb} orbitals requires {expected} parameters, but {} were given.",
                params.len()
            ))
            .into());
        }
        Ok(Self { norb, params })
    }

    /// Constructs a rotation from a full generator matrix.
    ///
    /// Deviations from antisymmetry up to `tolerance` are removed by replacing the matrix with
    /// its antisymmetric part `(κ − κᵀ) / 2`.
    ///
    /// # Errors
    ///
    /// [`SqdError::AntisymmetryViolation`] if `max |κ_pq + κ_qp|` exceeds `tolerance`.
    pub fn from_matrix(kappa: ArrayView2<f64>, tolerance: f64) -> Result<Self, anyhow::Error> {
        let norb = kappa.nrows();
        if kappa.ncols() != norb {
            return Err(SqdError::Configuration(format!(
                "A rotation generator must be square, but has shape {:?}.",
                kappa.shape()
            ))
            .into());
        }
        let deviation = kappa
            .indexed_iter()
            .map(|((p, q), x)| (x + kappa[(q, p)]).abs())
            .fold(0.0, f64::max);
        if !(deviation <= tolerance) {
            return Err(SqdError::AntisymmetryViolation {
                deviation,
                tolerance,
            }
            .into());
        }
        let params = Array1::from_iter(
            Self::upper_indices(norb).map(|(p, q)| 0.5 * (kappa[(p, q)] - kappa[(q, p)])),
        );
        Ok(Self { norb, params })
    }

    /// Iterates over the index pairs `(p, q)` with `p < q` in storage order.
    pub fn upper_indices(norb: usize) -> impl Iterator<Item = (usize, usize)> {
        (0..norb).flat_map(move |p| ((p + 1)..norb).map(move |q| (p, q)))
    }

    /// The number of spatial orbitals.
    pub fn norb(&self) -> usize {
        self.norb
    }

    /// The number of free parameters, `norb (norb − 1) / 2`.
    pub fn n_params(&self) -> usize {
        self.params.len()
    }

    /// The upper triangular parameters.
    pub fn params(&self) -> &Array1<f64> {
        &self.params
    }

    /// Moves the parameters by `-step_size × direction`.
    pub fn descend(&mut self, direction: &Array1<f64>, step_size: f64) {
        self.params.scaled_add(-step_size, direction);
    }

    /// The rotation generated by `−κ`, the inverse of this rotation.
    pub fn inverse(&self) -> Self {
        Self {
            norb: self.norb,
            params: -&self.params,
        }
    }

    /// The full antisymmetric generator matrix `κ`.
    pub fn to_matrix(&self) -> Array2<f64> {
        let mut kappa = Array2::<f64>::zeros((self.norb, self.norb));
        Self::upper_indices(self.norb)
            .zip(self.params.iter())
            .for_each(|((p, q), &x)| {
                kappa[(p, q)] = x;
                kappa[(q, p)] = -x;
            });
        kappa
    }

    /// The orthogonal rotation matrix `U = exp(κ)`.
    pub fn unitary(&self) -> Result<Array2<f64>, anyhow::Error> {
        expm::expm(self.to_matrix().view())
    }

    /// The Frobenius norm of `κ`.
    pub fn norm(&self) -> f64 {
        (2.0 * self.params.dot(&self.params)).sqrt()
    }
}

impl fmt::Display for OrbitalRotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Orbital rotation generator κ (‖κ‖ = {:.6e}):", self.norm())?;
        for row in self.to_matrix().rows() {
            let line = row
                .iter()
                .map(|x| format!("{x:>+11.6}"))
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(f, "  {line}")?;
        }
        Ok(())
    }
}
