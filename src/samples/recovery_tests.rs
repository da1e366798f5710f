use ndarray::array;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::samples::bitstring::{compose_bitstring, BitstringMatrix};
use crate::samples::occupancy::OrbitalOccupancies;
use crate::samples::recovery::{flip_weight, recover_configurations};

fn noisy_table() -> BitstringMatrix {
    let rows = vec![
        compose_bitstring(4, 0b0011, 0b0011),
        compose_bitstring(4, 0b0111, 0b0011),
        compose_bitstring(4, 0b0001, 0b1011),
        compose_bitstring(4, 0b1111, 0b0000),
    ];
    BitstringMatrix::new(4, rows, vec![0.4, 0.3, 0.2, 0.1]).unwrap()
}

#[test]
fn test_recovery_flip_weight_shape() {
    let f = 0.5;
    assert_eq!(flip_weight(0.0, f), 0.0);
    assert!((flip_weight(0.25, f) - 0.005).abs() < 1e-12);
    assert!((flip_weight(0.5, f) - 0.01).abs() < 1e-12);
    assert!((flip_weight(1.0, f) - 1.0).abs() < 1e-12);
    assert!(flip_weight(0.9, f) > flip_weight(0.6, f));
    assert!(flip_weight(0.3, 0.0).is_finite());
    assert!(flip_weight(0.3, 1.0).is_finite());
}

#[test]
fn test_recovery_round_zero_is_identity() {
    let table = noisy_table();
    let mut rng = StdRng::seed_from_u64(1);
    let recovered = recover_configurations(&table, None, 2, 2, &mut rng).unwrap();
    assert_eq!(recovered, table);
}

#[test]
fn test_recovery_fixes_hamming_weights() {
    let table = noisy_table();
    let occ = OrbitalOccupancies::new(
        array![0.9, 0.8, 0.2, 0.1],
        array![0.95, 0.75, 0.2, 0.1],
    )
    .unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    let recovered = recover_configurations(&table, Some(&occ), 2, 2, &mut rng).unwrap();
    assert_eq!(recovered.n_rows(), table.n_rows());
    assert_eq!(recovered.weights(), table.weights());
    (0..recovered.n_rows()).for_each(|i| {
        assert_eq!(recovered.hamming_weights(i), (2, 2));
    });
    // Rows already at the target are untouched.
    assert_eq!(recovered.rows()[0], table.rows()[0]);
    // Only bits that were set can be removed from an overfull sector.
    assert_eq!(recovered.alpha_string(1) & !table.alpha_string(1), 0);
    // Only empty bits can be filled in an underfull sector.
    assert_eq!(recovered.alpha_string(2) & table.alpha_string(2), table.alpha_string(2));
}

#[test]
fn test_recovery_prefers_unlikely_bits() {
    // α has three electrons; orbital 2 is almost certainly empty so it is the one dropped.
    let table =
        BitstringMatrix::new(4, vec![compose_bitstring(4, 0b0111, 0b0011)], vec![1.0]).unwrap();
    let occ = OrbitalOccupancies::new(
        array![1.0, 1.0, 0.0, 0.0],
        array![1.0, 1.0, 0.0, 0.0],
    )
    .unwrap();
    let mut rng = StdRng::seed_from_u64(3);
    let recovered = recover_configurations(&table, Some(&occ), 2, 2, &mut rng).unwrap();
    assert_eq!(recovered.alpha_string(0), 0b0011);
    assert_eq!(recovered.beta_string(0), 0b0011);
}

#[test]
fn test_recovery_is_deterministic_for_fixed_seed() {
    let table = noisy_table();
    let occ = OrbitalOccupancies::new(
        array![0.6, 0.6, 0.4, 0.4],
        array![0.6, 0.6, 0.4, 0.4],
    )
    .unwrap();
    let a = recover_configurations(&table, Some(&occ), 2, 2, &mut StdRng::seed_from_u64(11))
        .unwrap();
    let b = recover_configurations(&table, Some(&occ), 2, 2, &mut StdRng::seed_from_u64(11))
        .unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_recovery_rejects_inconsistent_inputs() {
    let table = noisy_table();
    let mut rng = StdRng::seed_from_u64(0);
    assert!(recover_configurations(&table, None, 5, 2, &mut rng).is_err());
    let occ = OrbitalOccupancies::new(array![0.5, 0.5], array![0.5, 0.5]).unwrap();
    assert!(recover_configurations(&table, Some(&occ), 2, 2, &mut rng).is_err());
}
