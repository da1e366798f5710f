use ndarray::{Array2, Array3, Array4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::integrals::HamiltonianIntegrals;

/// Random real integrals with the full eightfold permutational symmetry.
///
/// The two-electron integrals are built in the factorised form `(pq|rs) = Σ_L B^L_pq B^L_rs` with
/// symmetric `B^L`, which keeps the electron repulsion positive semidefinite. The one-electron
/// integrals have a spread of diagonal energies and weaker off-diagonal couplings.
pub(crate) fn random_integrals(norb: usize, seed: u64) -> HamiltonianIntegrals {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut onee = Array2::<f64>::zeros((norb, norb));
    for p in 0..norb {
        onee[(p, p)] = -2.0 + 0.6 * p as f64 + rng.gen_range(-0.1..0.1);
        for q in 0..p {
            let v = rng.gen_range(-0.3..0.3);
            onee[(p, q)] = v;
            onee[(q, p)] = v;
        }
    }
    let naux = norb + 2;
    let mut b = Array3::<f64>::zeros((naux, norb, norb));
    for l in 0..naux {
        for p in 0..norb {
            for q in 0..=p {
                let v = if p == q {
                    rng.gen_range(0.2..0.6)
                } else {
                    rng.gen_range(-0.15..0.15)
                };
                b[(l, p, q)] = v;
                b[(l, q, p)] = v;
            }
        }
    }
    let twoe = Array4::from_shape_fn((norb, norb, norb, norb), |(p, q, r, s)| {
        (0..naux).map(|l| b[(l, p, q)] * b[(l, r, s)]).sum::<f64>()
    });
    HamiltonianIntegrals::builder()
        .enuc(1.5)
        .onee(onee)
        .twoe(twoe)
        .build()
        .unwrap()
}
