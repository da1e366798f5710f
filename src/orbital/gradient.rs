//! Energy and analytic gradient of a fixed pair of density matrices under orbital rotation.

use anyhow::{self, ensure};
use ndarray::{s, Array1, Array2, Array4};

use crate::integrals::HamiltonianIntegrals;
use crate::orbital::expm::expm;
use crate::orbital::OrbitalRotation;

#[cfg(test)]
#[path = "gradient_tests.rs"]
mod gradient_tests;

/// Evaluates the electronic energy
/// ```math
///     E(\kappa) = \sum_{pq} h'_{pq} \gamma_{pq} + \frac{1}{2} \sum_{pqrs} (pq|rs)' \Gamma_{pqrs}
/// ```
/// of fixed density matrices with integrals rotated by `U(κ)`, together with its gradient with
/// respect to the upper triangular parameters of `κ`.
///
/// With `G = ∂E/∂U`, the chain rule through `U = exp(κ)` gives `∂E/∂κ = L(κᵀ, G)`, where
/// `L(X, E)` is the Fréchet derivative of the exponential at `X` in the direction `E`, read off
/// the upper right block of `exp([[X, E], [0, X]])`. The antisymmetric parametrisation then gives
/// `∂E/∂κ_pq − ∂E/∂κ_qp` for every stored parameter.
///
/// # Arguments
///
/// * `integrals` - The unrotated Hamiltonian integrals.
/// * `rotation` - The current orbital rotation.
/// * `rdm1` - The spin-summed one-particle reduced density matrix.
/// * `rdm2` - The spin-summed two-particle reduced density matrix.
///
/// # Returns
///
/// The electronic energy and the gradient vector.
pub fn energy_and_gradient(
    integrals: &HamiltonianIntegrals,
    rotation: &OrbitalRotation,
    rdm1: &Array2<f64>,
    rdm2: &Array4<f64>,
) -> Result<(f64, Array1<f64>), anyhow::Error> {
    let norb = integrals.norb();
    ensure!(
        rotation.norb() == norb,
        "The rotation acts on {} orbitals but the integrals span {norb}.",
        rotation.norb()
    );
    let kappa = rotation.to_matrix();
    let u = expm(kappa.view())?;
    let rotated = integrals.rotated(&u)?;
    let energy = rotated.energy_from_rdms(rdm1, rdm2)?;
    let grad_u = u.dot(&rotated.energy_intermediate(rdm1, rdm2)?);

    let mut block = Array2::<f64>::zeros((2 * norb, 2 * norb));
    block.slice_mut(s![..norb, ..norb]).assign(&kappa.t());
    block.slice_mut(s![norb.., norb..]).assign(&kappa.t());
    block.slice_mut(s![..norb, norb..]).assign(&grad_u);
    let grad_kappa = expm(block.view())?
        .slice(s![..norb, norb..])
        .to_owned();

    let grad = Array1::from_iter(
        OrbitalRotation::upper_indices(norb).map(|(p, q)| grad_kappa[(p, q)] - grad_kappa[(q, p)]),
    );
    Ok((energy, grad))
}
