use approx::assert_abs_diff_eq;
use itertools::Itertools;
use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::Array1;

use crate::error::SqdError;
use crate::integrals::integrals_fixtures::random_integrals;
use crate::solver::davidson::DavidsonSolver;
use crate::solver::hamiltonian::SubspaceHamiltonian;
use crate::solver::{SpinConstraint, SubspaceEigensolver};
use crate::subspace::DeterminantSubspace;

fn strings(norb: usize, n: usize) -> Vec<u128> {
    (0..norb)
        .combinations(n)
        .map(|occ| occ.iter().fold(0u128, |s, &k| s | (1 << k)))
        .collect()
}

fn dense_eigenvalues(ham: &SubspaceHamiltonian) -> Vec<f64> {
    let dim = ham.dimension();
    let columns = (0..dim)
        .map(|i| {
            let mut e = Array1::<f64>::zeros(dim);
            e[i] = 1.0;
            ham.apply(e.view())
        })
        .collect::<Vec<_>>();
    let eig = SymmetricEigen::new(DMatrix::from_fn(dim, dim, |i, j| columns[j][i]));
    eig.eigenvalues
        .iter()
        .copied()
        .sorted_by(|a, b| a.total_cmp(b))
        .collect()
}

#[test]
fn test_davidson_ground_state_full_space() {
    let ints = random_integrals(5, 31);
    let subspace = DeterminantSubspace::new(5, strings(5, 2), strings(5, 2));
    let ham = SubspaceHamiltonian::new(&subspace, &ints).unwrap();
    let reference = dense_eigenvalues(&ham);

    let solver = DavidsonSolver::builder().max_space(12).build().unwrap();
    let solution = solver.solve(&subspace, &ints, None, 300).unwrap();
    assert_abs_diff_eq!(solution.energy, reference[0], epsilon = 1e-9);
    assert_abs_diff_eq!(
        solution.coefficients.dot(&solution.coefficients),
        1.0,
        epsilon = 1e-12
    );
    assert_abs_diff_eq!(solution.occupancies.alpha.sum(), 2.0, epsilon = 1e-10);
    assert_abs_diff_eq!(solution.occupancies.beta.sum(), 2.0, epsilon = 1e-10);

    // The energy from the reduced density matrices agrees with the eigenvalue.
    let (rdm1, rdm2) = solver.calc_rdms(&subspace, &solution).unwrap();
    assert_abs_diff_eq!(
        ints.energy_from_rdms(&rdm1, &rdm2).unwrap(),
        solution.energy,
        epsilon = 1e-9
    );
}

#[test]
fn test_davidson_small_search_space_restarts() {
    let ints = random_integrals(6, 17);
    let subspace = DeterminantSubspace::new(6, strings(6, 3), strings(6, 3));
    let ham = SubspaceHamiltonian::new(&subspace, &ints).unwrap();
    let reference = dense_eigenvalues(&ham);

    for max_space in [3, 5] {
        let solver = DavidsonSolver::builder()
            .max_space(max_space)
            .build()
            .unwrap();
        let solution = solver.solve(&subspace, &ints, None, 2000).unwrap();
        assert_abs_diff_eq!(solution.energy, reference[0], epsilon = 1e-9);
        assert!(solution.cycles < 2000);
    }
}

#[test]
fn test_davidson_spin_penalty_selects_singlet() {
    let ints = random_integrals(4, 12);
    let subspace = DeterminantSubspace::new(4, strings(4, 2), strings(4, 2));
    let ham = SubspaceHamiltonian::new(&subspace, &ints).unwrap();
    let reference = dense_eigenvalues(&ham);

    let spin = SpinConstraint {
        target_spin_sq: 0.0,
        shift: 1.0,
    };
    let solution = DavidsonSolver::default()
        .solve(&subspace, &ints, Some(&spin), 300)
        .unwrap();
    assert!(solution.spin_sq.abs() < 1e-6);
    assert!(reference
        .iter()
        .any(|e| (e - solution.energy).abs() < 1e-7));
    assert!(solution.energy >= reference[0] - 1e-9);
}

#[test]
fn test_davidson_single_determinant() {
    let ints = random_integrals(3, 6);
    let subspace = DeterminantSubspace::new(3, vec![0b001], vec![0b001]);
    let solution = DavidsonSolver::default()
        .solve(&subspace, &ints, None, 5)
        .unwrap();
    let expected = 2.0 * ints.onee()[(0, 0)] + ints.twoe()[(0, 0, 0, 0)];
    assert_abs_diff_eq!(solution.energy, expected, epsilon = 1e-12);
    assert_eq!(solution.cycles, 1);
    assert_abs_diff_eq!(solution.spin_sq, 0.0, epsilon = 1e-12);
}

#[test]
fn test_davidson_non_convergence() {
    let ints = random_integrals(5, 2);
    let subspace = DeterminantSubspace::new(5, strings(5, 2), strings(5, 2));
    let err = DavidsonSolver::default()
        .solve(&subspace, &ints, None, 1)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SqdError>(),
        Some(SqdError::EigensolveNonConvergence { cycles: 1, .. })
    ));
}

#[test]
fn test_davidson_builder_validation() {
    assert!(DavidsonSolver::builder()
        .convergence_threshold(-1.0)
        .build()
        .is_err());
    assert!(DavidsonSolver::builder().max_space(1).build().is_err());
    assert!(DavidsonSolver::builder().max_space(2).build().is_err());
    assert!(DavidsonSolver::builder().max_space(3).build().is_ok());
    assert!(DavidsonSolver::builder().num_guesses(0).build().is_err());
}
