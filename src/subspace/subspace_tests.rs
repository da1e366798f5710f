use crate::error::SqdError;
use crate::samples::bitstring::{compose_bitstring, BitstringMatrix};
use crate::subspace::DeterminantSubspace;

fn batch(pairs: &[(u128, u128)]) -> BitstringMatrix {
    let rows = pairs
        .iter()
        .map(|(a, b)| compose_bitstring(4, *a, *b))
        .collect::<Vec<_>>();
    let weights = vec![1.0; rows.len()];
    BitstringMatrix::new(4, rows, weights).unwrap()
}

#[test]
fn test_subspace_from_batch_sorted_unique() {
    let b = batch(&[(0b0101, 0b0011), (0b0011, 0b0011), (0b0101, 0b1001)]);
    let subspace = DeterminantSubspace::from_batch(&b, false, 2, 2).unwrap();
    assert_eq!(subspace.alpha_strings(), &[0b0011, 0b0101]);
    assert_eq!(subspace.beta_strings(), &[0b0011, 0b1001]);
    assert_eq!(subspace.dimension(), 4);
    assert_eq!(subspace.index(1, 1), 3);
}

#[test]
fn test_subspace_order_stable_and_idempotent() {
    let b1 = batch(&[(0b0101, 0b0011), (0b0011, 0b1001), (0b1001, 0b0011)]);
    let b2 = batch(&[(0b1001, 0b0011), (0b0101, 0b0011), (0b0011, 0b1001)]);
    let s1 = DeterminantSubspace::from_batch(&b1, false, 2, 2).unwrap();
    let s2 = DeterminantSubspace::from_batch(&b2, false, 2, 2).unwrap();
    assert_eq!(s1, s2);

    let rebuilt = DeterminantSubspace::new(
        s1.norb(),
        s1.alpha_strings().to_vec(),
        s1.beta_strings().to_vec(),
    );
    assert_eq!(rebuilt, s1);
}

#[test]
fn test_subspace_spin_symmetrisation() {
    let b = batch(&[(0b0101, 0b0011), (0b0011, 0b1001)]);
    let subspace = DeterminantSubspace::from_batch(&b, true, 2, 2).unwrap();
    assert_eq!(subspace.alpha_strings(), &[0b0011, 0b0101, 0b1001]);
    assert_eq!(subspace.alpha_strings(), subspace.beta_strings());

    let err = DeterminantSubspace::from_batch(&b, true, 2, 1).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SqdError>(),
        Some(SqdError::Configuration(_))
    ));
}

#[test]
fn test_subspace_union() {
    let s1 = DeterminantSubspace::new(4, vec![0b0011], vec![0b0101]);
    let s2 = DeterminantSubspace::new(4, vec![0b1001, 0b0011], vec![0b0011]);
    let merged = DeterminantSubspace::union([&s1, &s2]).unwrap().unwrap();
    assert_eq!(merged.alpha_strings(), &[0b0011, 0b1001]);
    assert_eq!(merged.beta_strings(), &[0b0011, 0b0101]);

    assert!(DeterminantSubspace::union(Vec::<&DeterminantSubspace>::new())
        .unwrap()
        .is_none());

    let s3 = DeterminantSubspace::new(5, vec![0b0011], vec![0b0011]);
    assert!(DeterminantSubspace::union([&s1, &s3]).is_err());
}
