//! Molecular Hamiltonian integrals in an orthonormal orbital basis.
//!
//! The one-electron integrals `h_pq` and the two-electron integrals `(pq|rs)` (chemists'
//! notation) are stored densely together with the nuclear repulsion energy. Integrals are never
//! modified in place: orbital rotations produce rotated copies.

use std::fmt;

use anyhow::{self, format_err};
use derive_builder::Builder;
use ndarray::{Array2, Array4, Ix2, Ix4};
use ndarray_einsum_beta::*;
use serde::{Deserialize, Serialize};

use crate::error::SqdError;
use crate::io::format::write_heading;

pub mod fcidump;

#[cfg(test)]
#[path = "integrals_tests.rs"]
mod integrals_tests;

#[cfg(test)]
#[path = "integrals_fixtures.rs"]
pub(crate) mod integrals_fixtures;

/// Tolerance for the permutational symmetry of the integrals.
const SYMMETRY_TOLERANCE: f64 = 1e-8;

/// Structure for managing the electronic Hamiltonian integrals in an orthonormal orbital basis.
#[derive(Builder, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct HamiltonianIntegrals {
    /// The nuclear repulsion energy.
    #[builder(default = "0.0")]
    enuc: f64,

    /// The one-electron integrals `h_pq`.
    onee: Array2<f64>,

    /// The two-electron integrals `(pq|rs)` in chemists' notation.
    twoe: Array4<f64>,
}

impl HamiltonianIntegralsBuilder {
    fn validate(&self) -> Result<(), String> {
        let onee = self
            .onee
            .as_ref()
            .ok_or("No one-electron integrals found.".to_string())?;
        let twoe = self
            .twoe
            .as_ref()
            .ok_or("No two-electron integrals found.".to_string())?;
        let norb = onee.nrows();
        if norb == 0 || onee.ncols() != norb {
            return Err(format!(
                "The one-electron integrals must form a non-empty square matrix, but have shape {:?}.",
                onee.shape()
            ));
        }
        if twoe.shape() != [norb; 4] {
            return Err(format!(
                "The two-electron integrals have shape {:?} but {norb} orbitals are expected.",
                twoe.shape()
            ));
        }
        if !onee.iter().chain(twoe.iter()).all(|x| x.is_finite())
            || !self.enuc.unwrap_or(0.0).is_finite()
        {
            return Err("The integrals contain non-finite entries.".to_string());
        }
        let asym = onee
            .indexed_iter()
            .map(|((p, q), h)| (h - onee[(q, p)]).abs())
            .fold(0.0, f64::max);
        if asym > SYMMETRY_TOLERANCE {
            return Err(format!(
                "The one-electron integrals are not symmetric (deviation {asym:.3e})."
            ));
        }
        Ok(())
    }
}

impl HamiltonianIntegrals {
    /// Returns a builder to construct a [`HamiltonianIntegrals`] structure.
    pub fn builder() -> HamiltonianIntegralsBuilder {
        HamiltonianIntegralsBuilder::default()
    }

    /// The number of spatial orbitals.
    pub fn norb(&self) -> usize {
        self.onee.nrows()
    }

    /// The nuclear repulsion energy.
    pub fn enuc(&self) -> f64 {
        self.enuc
    }

    /// The one-electron integrals.
    pub fn onee(&self) -> &Array2<f64> {
        &self.onee
    }

    /// The two-electron integrals in chemists' notation.
    pub fn twoe(&self) -> &Array4<f64> {
        &self.twoe
    }

    /// Transforms the integrals into a rotated orbital basis.
    ///
    /// With the new orbitals given by the columns of `u`, the rotated integrals are
    /// ```math
    ///     h'_{pq} = \sum_{ab} U_{ap} h_{ab} U_{bq},
    ///     \qquad
    ///     (pq|rs)' = \sum_{abcd} U_{ap} U_{bq} U_{cr} U_{ds} (ab|cd).
    /// ```
    ///
    /// # Arguments
    ///
    /// * `u` - The real orthogonal rotation matrix.
    ///
    /// # Returns
    ///
    /// The rotated integrals. The nuclear repulsion energy is unchanged.
    pub fn rotated(&self, u: &Array2<f64>) -> Result<Self, anyhow::Error> {
        let norb = self.norb();
        if u.shape() != [norb, norb] {
            return Err(SqdError::Configuration(format!(
                "Rotation matrix of shape {:?} does not match {norb} orbitals.",
                u.shape()
            ))
            .into());
        }
        let onee = u.t().dot(&self.onee).dot(u);
        let twoe = einsum("abcd,ap->pbcd", &[&self.twoe.view(), &u.view()])
            .and_then(|g| einsum("pbcd,bq->pqcd", &[&g.view(), &u.view()]))
            .and_then(|g| einsum("pqcd,cr->pqrd", &[&g.view(), &u.view()]))
            .and_then(|g| einsum("pqrd,ds->pqrs", &[&g.view(), &u.view()]))
            .map_err(|err| format_err!("Unable to rotate the two-electron integrals: {err}"))?
            .into_dimensionality::<Ix4>()
            .map_err(|err| format_err!(err))?;
        Ok(Self {
            enuc: self.enuc,
            onee,
            twoe,
        })
    }

    /// Evaluates the electronic energy from spin-summed reduced density matrices,
    /// ```math
    ///     E = \sum_{pq} h_{pq} \gamma_{pq} + \frac{1}{2} \sum_{pqrs} (pq|rs) \Gamma_{pqrs}.
    /// ```
    /// The nuclear repulsion energy is not included.
    ///
    /// # Arguments
    ///
    /// * `rdm1` - The spin-summed one-particle reduced density matrix.
    /// * `rdm2` - The spin-summed two-particle reduced density matrix in chemists' ordering.
    pub fn energy_from_rdms(
        &self,
        rdm1: &Array2<f64>,
        rdm2: &Array4<f64>,
    ) -> Result<f64, anyhow::Error> {
        let norb = self.norb();
        if rdm1.shape() != [norb, norb] || rdm2.shape() != [norb; 4] {
            return Err(SqdError::Configuration(format!(
                "Density matrices of shapes {:?} and {:?} do not match {norb} orbitals.",
                rdm1.shape(),
                rdm2.shape()
            ))
            .into());
        }
        let e1 = (&self.onee * rdm1).sum();
        let e2 = 0.5 * (&self.twoe * rdm2).sum();
        Ok(e1 + e2)
    }

    /// The generalised Fock-like intermediate `M` of these integrals for fixed density matrices.
    ///
    /// If these integrals were obtained as `base.rotated(U)`, the derivative of the energy of
    /// the base integrals with respect to the entries of `U` is `∂E/∂U = U M`, where
    /// ```math
    ///     M_{xa} = \sum_{b} h_{xb} (\gamma_{ab} + \gamma_{ba})
    ///     + \frac{1}{2} \sum_{bcd} \left[
    ///         (xb|cd) \Gamma_{abcd} + (bx|cd) \Gamma_{bacd}
    ///         + (bc|xd) \Gamma_{bcad} + (bc|dx) \Gamma_{bcda}
    ///     \right].
    /// ```
    pub fn energy_intermediate(
        &self,
        rdm1: &Array2<f64>,
        rdm2: &Array4<f64>,
    ) -> Result<Array2<f64>, anyhow::Error> {
        let one = self.onee.dot(&(rdm1 + &rdm1.t()));
        let g = self.twoe.view();
        let d = rdm2.view();
        let contract = |spec: &str| -> Result<Array2<f64>, anyhow::Error> {
            einsum(spec, &[&g, &d])
                .map_err(|err| format_err!("Unable to contract the energy intermediate: {err}"))?
                .into_dimensionality::<Ix2>()
                .map_err(|err| format_err!(err))
        };
        let y1 = contract("xbcd,abcd->xa")?;
        let y2 = contract("bxcd,bacd->xa")?;
        let y3 = contract("bcxd,bcad->xa")?;
        let y4 = contract("bcdx,bcda->xa")?;
        Ok(one + 0.5 * (y1 + y2 + y3 + y4))
    }
}

impl fmt::Display for HamiltonianIntegrals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_heading(f, "Hamiltonian integrals")?;
        writeln!(f, "Number of orbitals: {}", self.norb())?;
        writeln!(f, "Nuclear repulsion energy: {:+.10}", self.enuc)?;
        Ok(())
    }
}
