use std::collections::HashMap;

use approx::assert_abs_diff_eq;
use itertools::Itertools;
use ndarray::{Array1, Array2, Array4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::integrals::integrals_fixtures::random_integrals;
use crate::integrals::HamiltonianIntegrals;
use crate::solver::hamiltonian::{calc_occupancies, calc_rdms, SubspaceHamiltonian};
use crate::subspace::DeterminantSubspace;

/// An operator on spin-orbital `k`: `true` for creation, `false` for annihilation.
type Op = (usize, bool);

/// Applies a product of operators, rightmost first, to a determinant over `2 × norb`
/// spin-orbitals (α before β).
fn apply_ops(det: u128, ops: &[Op]) -> Option<(u128, f64)> {
    ops.iter().rev().try_fold((det, 1.0), |(d, sign), &(k, dagger)| {
        let occupied = (d >> k) & 1 == 1;
        if occupied == dagger {
            return None;
        }
        let below = (d & ((1u128 << k) - 1)).count_ones();
        let new_sign = if below % 2 == 0 { sign } else { -sign };
        Some((d ^ (1u128 << k), new_sign))
    })
}

fn strings(norb: usize, n: usize) -> Vec<u128> {
    (0..norb)
        .combinations(n)
        .map(|occ| occ.iter().fold(0u128, |s, &k| s | (1 << k)))
        .sorted()
        .collect()
}

fn full_det(subspace: &DeterminantSubspace, idx: usize) -> u128 {
    let nb = subspace.beta_strings().len();
    subspace.alpha_strings()[idx / nb] | (subspace.beta_strings()[idx % nb] << subspace.norb())
}

/// All terms `(coefficient, operators)` of the second-quantised Hamiltonian.
fn hamiltonian_terms(ints: &HamiltonianIntegrals) -> Vec<(f64, Vec<Op>)> {
    let norb = ints.norb();
    let mut terms = vec![];
    for sigma in [0, norb] {
        for p in 0..norb {
            for q in 0..norb {
                terms.push((
                    ints.onee()[(p, q)],
                    vec![(p + sigma, true), (q + sigma, false)],
                ));
            }
        }
    }
    for sigma in [0, norb] {
        for tau in [0, norb] {
            for (p, q, r, s) in (0..4).map(|_| 0..norb).multi_cartesian_product().map(|v| {
                (v[0], v[1], v[2], v[3])
            }) {
                terms.push((
                    0.5 * ints.twoe()[(p, q, r, s)],
                    vec![
                        (p + sigma, true),
                        (r + tau, true),
                        (s + tau, false),
                        (q + sigma, false),
                    ],
                ));
            }
        }
    }
    terms
}

fn spin_sq_terms(norb: usize) -> Vec<(f64, Vec<Op>)> {
    let mut terms = vec![];
    for p in 0..norb {
        for q in 0..norb {
            terms.push((
                1.0,
                vec![(q + norb, true), (q, false), (p, true), (p + norb, false)],
            ));
        }
    }
    terms
}

/// Dense matrix of an operator in the basis of `subspace`, with out-of-subspace results dropped.
fn dense_matrix(subspace: &DeterminantSubspace, terms: &[(f64, Vec<Op>)]) -> Array2<f64> {
    let dim = subspace.dimension();
    let lookup = (0..dim)
        .map(|idx| (full_det(subspace, idx), idx))
        .collect::<HashMap<_, _>>();
    let mut mat = Array2::<f64>::zeros((dim, dim));
    for i in 0..dim {
        let det = full_det(subspace, i);
        for (coeff, ops) in terms {
            if let Some((new_det, sign)) = apply_ops(det, ops) {
                if let Some(&j) = lookup.get(&new_det) {
                    mat[(j, i)] += coeff * sign;
                }
            }
        }
    }
    mat
}

fn columns_of(dim: usize, f: impl Fn(&Array1<f64>) -> Array1<f64>) -> Array2<f64> {
    let mut mat = Array2::<f64>::zeros((dim, dim));
    for i in 0..dim {
        let mut e = Array1::<f64>::zeros(dim);
        e[i] = 1.0;
        mat.column_mut(i).assign(&f(&e));
    }
    mat
}

fn truncated_subspace() -> DeterminantSubspace {
    let alpha = strings(5, 2);
    let beta = strings(5, 2);
    DeterminantSubspace::new(
        5,
        alpha.iter().copied().step_by(2).collect::<Vec<_>>(),
        beta.iter().copied().skip(1).step_by(3).collect::<Vec<_>>(),
    )
}

#[test]
fn test_hamiltonian_matches_second_quantisation_full_space() {
    let ints = random_integrals(4, 17);
    let subspace = DeterminantSubspace::new(4, strings(4, 2), strings(4, 1));
    let ham = SubspaceHamiltonian::new(&subspace, &ints).unwrap();
    let reference = dense_matrix(&subspace, &hamiltonian_terms(&ints));
    let actual = columns_of(subspace.dimension(), |e| ham.apply(e.view()));
    assert_abs_diff_eq!(actual, reference, epsilon = 1e-12);
    assert_abs_diff_eq!(
        ham.diagonal(),
        &reference.diag().to_owned(),
        epsilon = 1e-12
    );
}

#[test]
fn test_hamiltonian_matches_second_quantisation_truncated() {
    let ints = random_integrals(5, 23);
    let subspace = truncated_subspace();
    let ham = SubspaceHamiltonian::new(&subspace, &ints).unwrap();
    let reference = dense_matrix(&subspace, &hamiltonian_terms(&ints));
    let actual = columns_of(subspace.dimension(), |e| ham.apply(e.view()));
    assert_abs_diff_eq!(actual, reference, epsilon = 1e-12);
    assert_abs_diff_eq!(actual, actual.t(), epsilon = 1e-12);
}

#[test]
fn test_hamiltonian_spin_sq_matches_second_quantisation() {
    let ints = random_integrals(4, 2);
    let subspace = DeterminantSubspace::new(4, strings(4, 2), strings(4, 2));
    let ham = SubspaceHamiltonian::new(&subspace, &ints).unwrap();
    let dim = subspace.dimension();
    let reference = dense_matrix(&subspace, &spin_sq_terms(4));
    // Ŝ_z(Ŝ_z + 1) vanishes for n_α = n_β.
    let actual = columns_of(dim, |e| ham.apply_spin_sq(e.view()));
    assert_abs_diff_eq!(actual, reference, epsilon = 1e-12);

    // The closed-shell determinant is a singlet.
    let mut closed = Array1::<f64>::zeros(dim);
    closed[subspace.index(0, 0)] = 1.0;
    assert_abs_diff_eq!(
        closed.dot(&ham.apply_spin_sq(closed.view())),
        0.0,
        epsilon = 1e-12
    );

    // Ŝ² has eigenvalues S(S + 1) in the full space.
    let eig = nalgebra::SymmetricEigen::new(nalgebra::DMatrix::from_fn(dim, dim, |i, j| {
        reference[(i, j)]
    }));
    eig.eigenvalues.iter().for_each(|&x| {
        assert!([0.0, 2.0, 6.0].iter().any(|s| (x - s).abs() < 1e-10));
    });
}

#[test]
fn test_hamiltonian_rdms_match_second_quantisation() {
    let ints = random_integrals(5, 4);
    let subspace = truncated_subspace();
    let dim = subspace.dimension();
    let mut rng = StdRng::seed_from_u64(99);
    let mut c = Array1::<f64>::from_shape_fn(dim, |_| rng.gen_range(-1.0..1.0));
    let norm = c.dot(&c).sqrt();
    c /= norm;

    let (rdm1, rdm2) = calc_rdms(&subspace, c.view()).unwrap();
    let norb = 5;
    let expectation = |ops: Vec<Op>| {
        let mat = dense_matrix(&subspace, &[(1.0, ops)]);
        c.dot(&mat.dot(&c))
    };
    let mut ref1 = Array2::<f64>::zeros((norb, norb));
    let mut ref2 = Array4::<f64>::zeros((norb, norb, norb, norb));
    for p in 0..norb {
        for q in 0..norb {
            ref1[(p, q)] = [0, norb]
                .iter()
                .map(|&sg| expectation(vec![(p + sg, true), (q + sg, false)]))
                .sum();
            for r in 0..norb {
                for s in 0..norb {
                    ref2[(p, q, r, s)] = [0, norb]
                        .iter()
                        .cartesian_product([0, norb].iter())
                        .map(|(&sg, &ta)| {
                            expectation(vec![
                                (p + sg, true),
                                (r + ta, true),
                                (s + ta, false),
                                (q + sg, false),
                            ])
                        })
                        .sum();
                }
            }
        }
    }
    assert_abs_diff_eq!(rdm1, ref1, epsilon = 1e-12);
    assert_abs_diff_eq!(rdm2, ref2, epsilon = 1e-12);

    let ham = SubspaceHamiltonian::new(&subspace, &ints).unwrap();
    let direct = c.dot(&ham.apply(c.view()));
    assert_abs_diff_eq!(
        ints.energy_from_rdms(&rdm1, &rdm2).unwrap(),
        direct,
        epsilon = 1e-11
    );
    assert_abs_diff_eq!(rdm1.diag().sum(), 4.0, epsilon = 1e-12);
}

#[test]
fn test_hamiltonian_occupancies() {
    let subspace = DeterminantSubspace::new(3, vec![0b011, 0b101], vec![0b001]);
    let c = Array1::from_vec(vec![0.6, 0.8]);
    let occ = calc_occupancies(&subspace, c.view()).unwrap();
    assert_abs_diff_eq!(occ.alpha, Array1::from_vec(vec![1.0, 0.36, 0.64]), epsilon = 1e-12);
    assert_abs_diff_eq!(occ.beta, Array1::from_vec(vec![1.0, 0.0, 0.0]), epsilon = 1e-12);
}

#[test]
fn test_hamiltonian_rejects_inconsistent_subspaces() {
    let ints = random_integrals(3, 1);
    let mixed = DeterminantSubspace::new(3, vec![0b001, 0b011], vec![0b001]);
    assert!(SubspaceHamiltonian::new(&mixed, &ints).is_err());
    let wrong_norb = DeterminantSubspace::new(4, vec![0b001], vec![0b001]);
    assert!(SubspaceHamiltonian::new(&wrong_norb, &ints).is_err());
    let empty = DeterminantSubspace::new(3, vec![], vec![0b001]);
    assert!(SubspaceHamiltonian::new(&empty, &ints).is_err());
}
