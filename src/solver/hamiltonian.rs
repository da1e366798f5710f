//! Matrix-free action of the electronic Hamiltonian and of `Ŝ²` in a determinant subspace.
//!
//! Determinants are products of an α string and a β string. Matrix elements follow the
//! Slater–Condon rules, with the fermionic sign of every creation or annihilation operator on
//! orbital `k` given by the parity of the number of occupied orbitals below `k` in the same spin
//! sector. All α operators are ordered before all β operators, so that an even number of α
//! operators never changes the sign of β operators.

use anyhow;
use ndarray::{Array1, Array2, Array4, ArrayView1};
use rayon::prelude::*;

use crate::error::SqdError;
use crate::integrals::HamiltonianIntegrals;
use crate::samples::bitstring::DetString;
use crate::samples::occupancy::OrbitalOccupancies;
use crate::subspace::DeterminantSubspace;

#[cfg(test)]
#[path = "hamiltonian_tests.rs"]
mod hamiltonian_tests;

// ----------------
// String utilities
// ----------------

/// Iterates over the occupied orbitals of a determinant string in ascending order.
pub(crate) fn occupied(s: DetString) -> impl Iterator<Item = usize> {
    let mut rem = s;
    std::iter::from_fn(move || {
        if rem == 0 {
            None
        } else {
            let k = rem.trailing_zeros() as usize;
            rem &= rem - 1;
            Some(k)
        }
    })
}

/// The sign of moving an operator on orbital `k` past the occupied orbitals below it.
fn parity_sign(s: DetString, k: usize) -> f64 {
    let below = s & ((1u128 << k) - 1);
    if below.count_ones() % 2 == 0 {
        1.0
    } else {
        -1.0
    }
}

/// Applies `a_k` to `s`, which must have orbital `k` occupied.
fn annihilate(s: DetString, k: usize) -> (DetString, f64) {
    (s & !(1u128 << k), parity_sign(s, k))
}

/// Applies `a†_k` to `s`, which must have orbital `k` empty.
fn create(s: DetString, k: usize) -> (DetString, f64) {
    (s | (1u128 << k), parity_sign(s, k))
}

// -----------
// Connections
// -----------

/// A single excitation `|target⟩ = phase × a†_p a_q |source⟩` within one spin sector.
#[derive(Clone, Debug, PartialEq)]
pub struct SingleExcitation {
    /// The index of the target string.
    pub target: usize,

    /// The created orbital.
    pub p: usize,

    /// The annihilated orbital.
    pub q: usize,

    /// The fermionic sign.
    pub phase: f64,
}

/// A double excitation `|target⟩ = phase × a†_p a†_r a_s a_q |source⟩` within one spin sector,
/// with `p < r` and `q < s`.
#[derive(Clone, Debug, PartialEq)]
pub struct DoubleExcitation {
    /// The index of the target string.
    pub target: usize,

    /// The lower created orbital.
    pub p: usize,

    /// The lower annihilated orbital.
    pub q: usize,

    /// The higher created orbital.
    pub r: usize,

    /// The higher annihilated orbital.
    pub s: usize,

    /// The fermionic sign.
    pub phase: f64,
}

/// All single and double excitations connecting the strings of one spin sector.
#[derive(Clone, Debug)]
pub struct SectorConnections {
    /// `singles[i]` lists the single excitations out of string `i`.
    pub singles: Vec<Vec<SingleExcitation>>,

    /// `doubles[i]` lists the double excitations out of string `i`.
    pub doubles: Vec<Vec<DoubleExcitation>>,
}

impl SectorConnections {
    /// Enumerates the excitations between every pair of strings. All strings must have the same
    /// number of electrons.
    pub fn new(strings: &[DetString]) -> Self {
        let (singles, doubles) = strings
            .par_iter()
            .map(|&source| {
                let mut singles = vec![];
                let mut doubles = vec![];
                strings.iter().enumerate().for_each(|(target, &dest)| {
                    let diff = source ^ dest;
                    match diff.count_ones() {
                        2 => {
                            let q = (source & diff).trailing_zeros() as usize;
                            let p = (dest & diff).trailing_zeros() as usize;
                            let (s1, sign1) = annihilate(source, q);
                            let (_, sign2) = create(s1, p);
                            singles.push(SingleExcitation {
                                target,
                                p,
                                q,
                                phase: sign1 * sign2,
                            });
                        }
                        4 => {
                            let holes = occupied(source & diff).collect::<Vec<_>>();
                            let particles = occupied(dest & diff).collect::<Vec<_>>();
                            let (q, s) = (holes[0], holes[1]);
                            let (p, r) = (particles[0], particles[1]);
                            let (s1, sign1) = annihilate(source, q);
                            let (s2, sign2) = annihilate(s1, s);
                            let (s3, sign3) = create(s2, r);
                            let (_, sign4) = create(s3, p);
                            doubles.push(DoubleExcitation {
                                target,
                                p,
                                q,
                                r,
                                s,
                                phase: sign1 * sign2 * sign3 * sign4,
                            });
                        }
                        _ => {}
                    }
                });
                (singles, doubles)
            })
            .unzip();
        Self { singles, doubles }
    }
}

/// Checks that every string of a sector carries the same number of electrons.
fn check_uniform_weight(strings: &[DetString], sector: &str) -> Result<(), anyhow::Error> {
    if let Some(first) = strings.first() {
        let n = first.count_ones();
        if strings.iter().any(|s| s.count_ones() != n) {
            return Err(SqdError::Configuration(format!(
                "The {sector} strings of the subspace do not share a common electron count."
            ))
            .into());
        }
    }
    Ok(())
}

// --------------------
// Subspace Hamiltonian
// --------------------

/// The electronic Hamiltonian projected onto a determinant subspace.
pub struct SubspaceHamiltonian<'a> {
    /// The determinant subspace.
    subspace: &'a DeterminantSubspace,

    /// The Hamiltonian integrals.
    integrals: &'a HamiltonianIntegrals,

    /// The α excitations.
    alpha: SectorConnections,

    /// The β excitations.
    beta: SectorConnections,

    /// Same-spin parts of the α single-excitation matrix elements, without phases.
    alpha_single_values: Vec<Vec<f64>>,

    /// Same-spin parts of the β single-excitation matrix elements, without phases.
    beta_single_values: Vec<Vec<f64>>,

    /// α double-excitation matrix elements, without phases.
    alpha_double_values: Vec<Vec<f64>>,

    /// β double-excitation matrix elements, without phases.
    beta_double_values: Vec<Vec<f64>>,

    /// The diagonal of the Hamiltonian in the product basis.
    diagonal: Array1<f64>,
}

impl<'a> SubspaceHamiltonian<'a> {
    /// Sets up the Hamiltonian action in a subspace.
    ///
    /// # Errors
    ///
    /// [`SqdError::Configuration`] if the subspace is empty, spans a different number of
    /// orbitals than the integrals, or mixes strings with different electron counts.
    pub fn new(
        subspace: &'a DeterminantSubspace,
        integrals: &'a HamiltonianIntegrals,
    ) -> Result<Self, anyhow::Error> {
        if subspace.norb() != integrals.norb() {
            return Err(SqdError::Configuration(format!(
                "The subspace spans {} orbitals but the integrals span {}.",
                subspace.norb(),
                integrals.norb()
            ))
            .into());
        }
        if subspace.dimension() == 0 {
            return Err(SqdError::Configuration("The subspace is empty.".to_string()).into());
        }
        check_uniform_weight(subspace.alpha_strings(), "α")?;
        check_uniform_weight(subspace.beta_strings(), "β")?;

        let alpha = SectorConnections::new(subspace.alpha_strings());
        let beta = SectorConnections::new(subspace.beta_strings());
        let (alpha_single_values, alpha_double_values) =
            sector_values(subspace.alpha_strings(), &alpha, integrals);
        let (beta_single_values, beta_double_values) =
            sector_values(subspace.beta_strings(), &beta, integrals);

        let h = integrals.onee();
        let g = integrals.twoe();
        let sector_diagonal = |strings: &[DetString]| {
            strings
                .iter()
                .map(|&s| {
                    let occ = occupied(s).collect::<Vec<_>>();
                    let one = occ.iter().map(|&i| h[(i, i)]).sum::<f64>();
                    let two = occ
                        .iter()
                        .flat_map(|&i| occ.iter().map(move |&j| (i, j)))
                        .map(|(i, j)| g[(i, i, j, j)] - g[(i, j, j, i)])
                        .sum::<f64>();
                    one + 0.5 * two
                })
                .collect::<Vec<_>>()
        };
        let diag_a = sector_diagonal(subspace.alpha_strings());
        let diag_b = sector_diagonal(subspace.beta_strings());
        let nb = subspace.beta_strings().len();
        let diagonal = Array1::from_shape_fn(subspace.dimension(), |idx| {
            let (ia, ib) = (idx / nb, idx % nb);
            let cross = occupied(subspace.alpha_strings()[ia])
                .flat_map(|i| occupied(subspace.beta_strings()[ib]).map(move |j| (i, j)))
                .map(|(i, j)| g[(i, i, j, j)])
                .sum::<f64>();
            diag_a[ia] + diag_b[ib] + cross
        });

        Ok(Self {
            subspace,
            integrals,
            alpha,
            beta,
            alpha_single_values,
            beta_single_values,
            alpha_double_values,
            beta_double_values,
            diagonal,
        })
    }

    /// The dimension of the subspace.
    pub fn dimension(&self) -> usize {
        self.subspace.dimension()
    }

    /// The diagonal of the Hamiltonian.
    pub fn diagonal(&self) -> &Array1<f64> {
        &self.diagonal
    }

    /// Applies the Hamiltonian to a coefficient vector in the product basis.
    pub fn apply(&self, c: ArrayView1<f64>) -> Array1<f64> {
        let nb = self.subspace.beta_strings().len();
        let g = self.integrals.twoe();
        let sigma = (0..self.dimension())
            .into_par_iter()
            .map(|idx| {
                let (ja, jb) = (idx / nb, idx % nb);
                let str_a = self.subspace.alpha_strings()[ja];
                let str_b = self.subspace.beta_strings()[jb];
                let mut acc = self.diagonal[idx] * c[idx];

                // α singles and doubles with a fixed β string.
                for (ex, value) in self.alpha.singles[ja]
                    .iter()
                    .zip(self.alpha_single_values[ja].iter())
                {
                    let cross = occupied(str_b).map(|k| g[(ex.p, ex.q, k, k)]).sum::<f64>();
                    acc += ex.phase * (value + cross) * c[self.subspace.index(ex.target, jb)];
                }
                for (ex, value) in self.alpha.doubles[ja]
                    .iter()
                    .zip(self.alpha_double_values[ja].iter())
                {
                    acc += ex.phase * value * c[self.subspace.index(ex.target, jb)];
                }

                // β singles and doubles with a fixed α string.
                for (ex, value) in self.beta.singles[jb]
                    .iter()
                    .zip(self.beta_single_values[jb].iter())
                {
                    let cross = occupied(str_a).map(|k| g[(ex.p, ex.q, k, k)]).sum::<f64>();
                    acc += ex.phase * (value + cross) * c[self.subspace.index(ja, ex.target)];
                }
                for (ex, value) in self.beta.doubles[jb]
                    .iter()
                    .zip(self.beta_double_values[jb].iter())
                {
                    acc += ex.phase * value * c[self.subspace.index(ja, ex.target)];
                }

                // αβ doubles.
                for ex_a in self.alpha.singles[ja].iter() {
                    for ex_b in self.beta.singles[jb].iter() {
                        acc += ex_a.phase
                            * ex_b.phase
                            * g[(ex_a.p, ex_a.q, ex_b.p, ex_b.q)]
                            * c[self.subspace.index(ex_a.target, ex_b.target)];
                    }
                }
                acc
            })
            .collect::<Vec<_>>();
        Array1::from_vec(sigma)
    }

    /// The diagonal of `Ŝ²` in the product basis.
    pub fn spin_sq_diagonal(&self) -> Array1<f64> {
        let nb = self.subspace.beta_strings().len();
        Array1::from_shape_fn(self.dimension(), |idx| {
            let str_a = self.subspace.alpha_strings()[idx / nb];
            let str_b = self.subspace.beta_strings()[idx % nb];
            let sz = 0.5 * (f64::from(str_a.count_ones()) - f64::from(str_b.count_ones()));
            let unpaired = (str_b & !str_a).count_ones();
            sz * sz + sz + f64::from(unpaired)
        })
    }

    /// Applies the projection of `Ŝ² = Ŝ₋Ŝ₊ + Ŝ_z(Ŝ_z + 1)` onto the subspace to a coefficient
    /// vector.
    pub fn apply_spin_sq(&self, c: ArrayView1<f64>) -> Array1<f64> {
        let nb = self.subspace.beta_strings().len();
        let diag = self.spin_sq_diagonal();
        let sigma = (0..self.dimension())
            .into_par_iter()
            .map(|idx| {
                let (ja, jb) = (idx / nb, idx % nb);
                let mut acc = diag[idx] * c[idx];
                // α moves q → p while β moves p → q.
                for ex_a in self.alpha.singles[ja].iter() {
                    for ex_b in self.beta.singles[jb]
                        .iter()
                        .filter(|ex_b| ex_b.p == ex_a.q && ex_b.q == ex_a.p)
                    {
                        acc -= ex_a.phase
                            * ex_b.phase
                            * c[self.subspace.index(ex_a.target, ex_b.target)];
                    }
                }
                acc
            })
            .collect::<Vec<_>>();
        Array1::from_vec(sigma)
    }
}

/// Computes the phase-free same-spin parts of the single- and double-excitation matrix
/// elements of one spin sector.
fn sector_values(
    strings: &[DetString],
    connections: &SectorConnections,
    integrals: &HamiltonianIntegrals,
) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
    let h = integrals.onee();
    let g = integrals.twoe();
    let singles = strings
        .iter()
        .zip(connections.singles.iter())
        .map(|(&source, exs)| {
            exs.iter()
                .map(|ex| {
                    h[(ex.p, ex.q)]
                        + occupied(source)
                            .map(|k| g[(ex.p, ex.q, k, k)] - g[(ex.p, k, k, ex.q)])
                            .sum::<f64>()
                })
                .collect()
        })
        .collect();
    let doubles = connections
        .doubles
        .iter()
        .map(|exs| {
            exs.iter()
                .map(|ex| g[(ex.p, ex.q, ex.r, ex.s)] - g[(ex.p, ex.s, ex.r, ex.q)])
                .collect()
        })
        .collect();
    (singles, doubles)
}

// ----------------------
// Observables and RDMs
// ----------------------

/// Computes the α and β orbital occupancies of a normalised state in a subspace.
pub fn calc_occupancies(
    subspace: &DeterminantSubspace,
    coefficients: ArrayView1<f64>,
) -> Result<OrbitalOccupancies, anyhow::Error> {
    let norb = subspace.norb();
    let na = subspace.alpha_strings().len();
    let nb = subspace.beta_strings().len();
    let mut weight_a = vec![0.0; na];
    let mut weight_b = vec![0.0; nb];
    (0..na).for_each(|ia| {
        (0..nb).for_each(|ib| {
            let w = coefficients[subspace.index(ia, ib)].powi(2);
            weight_a[ia] += w;
            weight_b[ib] += w;
        })
    });
    let mut occ_a = Array1::<f64>::zeros(norb);
    let mut occ_b = Array1::<f64>::zeros(norb);
    subspace
        .alpha_strings()
        .iter()
        .zip(weight_a.iter())
        .for_each(|(&s, w)| occupied(s).for_each(|k| occ_a[k] += w));
    subspace
        .beta_strings()
        .iter()
        .zip(weight_b.iter())
        .for_each(|(&s, w)| occupied(s).for_each(|k| occ_b[k] += w));
    OrbitalOccupancies::new(occ_a, occ_b)
}

/// Computes the spin-summed one- and two-particle reduced density matrices of a state in a
/// subspace,
/// ```math
///     \gamma_{pq} = \sum_{\sigma} \braket{a^{\dagger}_{p\sigma} a_{q\sigma}},
///     \qquad
///     \Gamma_{pqrs} = \sum_{\sigma\tau}
///         \braket{a^{\dagger}_{p\sigma} a^{\dagger}_{r\tau} a_{s\tau} a_{q\sigma}},
/// ```
/// so that the electronic energy is `Σ h_pq γ_pq + ½ Σ (pq|rs) Γ_pqrs`.
pub fn calc_rdms(
    subspace: &DeterminantSubspace,
    coefficients: ArrayView1<f64>,
) -> Result<(Array2<f64>, Array4<f64>), anyhow::Error> {
    check_uniform_weight(subspace.alpha_strings(), "α")?;
    check_uniform_weight(subspace.beta_strings(), "β")?;
    let norb = subspace.norb();
    let na = subspace.alpha_strings().len();
    let nb = subspace.beta_strings().len();
    if coefficients.len() != na * nb {
        return Err(SqdError::Configuration(format!(
            "A coefficient vector of length {} does not match the subspace dimension {}.",
            coefficients.len(),
            na * nb
        ))
        .into());
    }
    let alpha = SectorConnections::new(subspace.alpha_strings());
    let beta = SectorConnections::new(subspace.beta_strings());
    let mut rdm1 = Array2::<f64>::zeros((norb, norb));
    let mut rdm2 = Array4::<f64>::zeros((norb, norb, norb, norb));

    for ia in 0..na {
        for ib in 0..nb {
            let ci = coefficients[subspace.index(ia, ib)];
            if ci == 0.0 {
                continue;
            }
            let str_a = subspace.alpha_strings()[ia];
            let str_b = subspace.beta_strings()[ib];
            let occ_a = occupied(str_a).collect::<Vec<_>>();
            let occ_b = occupied(str_b).collect::<Vec<_>>();

            // Diagonal contributions.
            let w = ci * ci;
            occ_a.iter().chain(occ_b.iter()).for_each(|&p| {
                rdm1[(p, p)] += w;
            });
            for (occ_s, occ_t) in [
                (&occ_a, &occ_a),
                (&occ_a, &occ_b),
                (&occ_b, &occ_a),
                (&occ_b, &occ_b),
            ] {
                for &p in occ_s.iter() {
                    for &r in occ_t.iter() {
                        rdm2[(p, p, r, r)] += w;
                    }
                }
            }
            for occ in [&occ_a, &occ_b] {
                for &p in occ.iter() {
                    // Same spin-orbital: cancels the `p == r` term added above.
                    rdm2[(p, p, p, p)] -= w;
                    for &r in occ.iter().filter(|&&r| r != p) {
                        rdm2[(p, r, r, p)] -= w;
                    }
                }
            }

            // Single excitations.
            let mut add_single =
                |ex: &SingleExcitation, cj: f64, same: &[usize], other: &[usize]| {
                    let v = ex.phase * cj * ci;
                    rdm1[(ex.p, ex.q)] += v;
                    for &k in same.iter().filter(|&&k| k != ex.q) {
                        rdm2[(ex.p, ex.q, k, k)] += v;
                        rdm2[(k, k, ex.p, ex.q)] += v;
                        rdm2[(ex.p, k, k, ex.q)] -= v;
                        rdm2[(k, ex.q, ex.p, k)] -= v;
                    }
                    for &k in other.iter() {
                        rdm2[(ex.p, ex.q, k, k)] += v;
                        rdm2[(k, k, ex.p, ex.q)] += v;
                    }
                };
            for ex in alpha.singles[ia].iter() {
                let cj = coefficients[subspace.index(ex.target, ib)];
                add_single(ex, cj, occ_a.as_slice(), occ_b.as_slice());
            }
            for ex in beta.singles[ib].iter() {
                let cj = coefficients[subspace.index(ia, ex.target)];
                add_single(ex, cj, occ_b.as_slice(), occ_a.as_slice());
            }

            // Same-spin double excitations.
            let mut add_double = |ex: &DoubleExcitation, cj: f64| {
                let v = ex.phase * cj * ci;
                rdm2[(ex.p, ex.q, ex.r, ex.s)] += v;
                rdm2[(ex.r, ex.s, ex.p, ex.q)] += v;
                rdm2[(ex.p, ex.s, ex.r, ex.q)] -= v;
                rdm2[(ex.r, ex.q, ex.p, ex.s)] -= v;
            };
            for ex in alpha.doubles[ia].iter() {
                add_double(ex, coefficients[subspace.index(ex.target, ib)]);
            }
            for ex in beta.doubles[ib].iter() {
                add_double(ex, coefficients[subspace.index(ia, ex.target)]);
            }

            // Opposite-spin double excitations.
            for ex_a in alpha.singles[ia].iter() {
                for ex_b in beta.singles[ib].iter() {
                    let cj = coefficients[subspace.index(ex_a.target, ex_b.target)];
                    let v = ex_a.phase * ex_b.phase * cj * ci;
                    rdm2[(ex_a.p, ex_a.q, ex_b.p, ex_b.q)] += v;
                    rdm2[(ex_b.p, ex_b.q, ex_a.p, ex_a.q)] += v;
                }
            }
        }
    }
    Ok((rdm1, rdm2))
}
