use approx::assert_abs_diff_eq;
use proptest::prelude::*;

use crate::error::SqdError;
use crate::samples::bitstring::{compose_bitstring, BitstringMatrix};
use crate::samples::postselection::postselect_by_hamming_weight;

#[test]
fn test_postselection_keeps_exact_weights() {
    let rows = vec![
        compose_bitstring(4, 0b0011, 0b0011),
        compose_bitstring(4, 0b0111, 0b0011),
        compose_bitstring(4, 0b0101, 0b1001),
        compose_bitstring(4, 0b0001, 0b0011),
    ];
    let table = BitstringMatrix::new(4, rows, vec![3.0, 10.0, 1.0, 5.0]).unwrap();
    let kept = postselect_by_hamming_weight(&table, 2, 2, 0).unwrap();
    assert_eq!(kept.n_rows(), 2);
    assert_eq!(kept.alpha_string(0), 0b0011);
    assert_eq!(kept.alpha_string(1), 0b0101);
    assert_abs_diff_eq!(kept.weights()[0], 0.75, epsilon = 1e-14);
    assert_abs_diff_eq!(kept.weights()[1], 0.25, epsilon = 1e-14);
}

#[test]
fn test_postselection_empty_result() {
    let table =
        BitstringMatrix::new(3, vec![compose_bitstring(3, 0b111, 0b001)], vec![1.0]).unwrap();
    let err = postselect_by_hamming_weight(&table, 1, 1, 4).unwrap_err();
    assert_eq!(
        err.downcast_ref::<SqdError>(),
        Some(&SqdError::EmptySubspace { round: 4, n_rows: 1 })
    );
}

#[test]
fn test_postselection_zero_weights_become_uniform() {
    let rows = vec![
        compose_bitstring(2, 0b01, 0b01),
        compose_bitstring(2, 0b10, 0b01),
    ];
    let table = BitstringMatrix::new(2, rows, vec![0.0, 0.0]).unwrap();
    let kept = postselect_by_hamming_weight(&table, 1, 1, 0).unwrap();
    assert_eq!(kept.weights(), &[0.5, 0.5]);
}

proptest! {
    #[test]
    fn prop_postselected_rows_have_target_weights(
        entries in prop::collection::vec((0u128..64, 0u128..64, 0.0f64..10.0), 1..40),
        n_up in 0usize..=6,
        n_dn in 0usize..=6,
    ) {
        let norb = 6;
        let rows = entries.iter().map(|(a, b, _)| compose_bitstring(norb, *a, *b)).collect();
        let weights = entries.iter().map(|(_, _, w)| *w).collect();
        let table = BitstringMatrix::new(norb, rows, weights).unwrap();
        match postselect_by_hamming_weight(&table, n_up, n_dn, 0) {
            Ok(kept) => {
                prop_assert!(kept.n_rows() > 0);
                for i in 0..kept.n_rows() {
                    prop_assert_eq!(kept.hamming_weights(i), (n_up, n_dn));
                }
                prop_assert!((kept.total_weight() - 1.0).abs() < 1e-10);
            }
            Err(err) => {
                let is_empty_subspace = matches!(
                    err.downcast_ref::<SqdError>(),
                    Some(SqdError::EmptySubspace { .. })
                );
                prop_assert!(is_empty_subspace);
                for i in 0..table.n_rows() {
                    prop_assert_ne!(table.hamming_weights(i), (n_up, n_dn));
                }
            }
        }
    }
}
