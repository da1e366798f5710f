use approx::assert_abs_diff_eq;
use ndarray::{Array2, Array4};

use crate::integrals::fcidump::{parse_fcidump, FcidumpHeader};
use crate::integrals::integrals_fixtures::random_integrals;
use crate::integrals::HamiltonianIntegrals;

const FCIDUMP_H2: &str = " &FCI NORB=  2,NELEC= 2,MS2=0,
  ORBSYM=1,1,
  ISYM=1,
 &END
  0.6757101548  1  1  1  1
  0.1809270230  2  1  2  1
  0.6645817899  2  2  1  1
  0.6986292099  2  2  2  2
 -1.2563390730  1  1  0  0
 -0.4718960724  2  2  0  0
  0.7137539936  0  0  0  0
";

#[test]
fn test_integrals_builder_validation() {
    let onee = Array2::<f64>::eye(3);
    let twoe = Array4::<f64>::zeros((3, 3, 3, 3));
    assert!(HamiltonianIntegrals::builder()
        .onee(onee.clone())
        .twoe(twoe.clone())
        .build()
        .is_ok());
    assert!(HamiltonianIntegrals::builder()
        .onee(onee.clone())
        .twoe(Array4::<f64>::zeros((2, 2, 2, 2)))
        .build()
        .is_err());
    let mut asym = onee.clone();
    asym[(0, 1)] = 0.5;
    assert!(HamiltonianIntegrals::builder()
        .onee(asym)
        .twoe(twoe.clone())
        .build()
        .is_err());
    assert!(HamiltonianIntegrals::builder()
        .onee(onee)
        .twoe(twoe)
        .enuc(f64::NAN)
        .build()
        .is_err());
}

#[test]
fn test_integrals_identity_rotation() {
    let ints = random_integrals(4, 3);
    let rotated = ints.rotated(&Array2::eye(4)).unwrap();
    assert_abs_diff_eq!(rotated.onee(), ints.onee(), epsilon = 1e-14);
    assert_abs_diff_eq!(rotated.twoe(), ints.twoe(), epsilon = 1e-14);
    assert_eq!(rotated.enuc(), ints.enuc());
}

#[test]
fn test_integrals_permutation_rotation() {
    let ints = random_integrals(3, 5);
    // New orbital p is old orbital perm[p].
    let perm = [2, 0, 1];
    let mut u = Array2::<f64>::zeros((3, 3));
    perm.iter().enumerate().for_each(|(p, &a)| u[(a, p)] = 1.0);
    let rotated = ints.rotated(&u).unwrap();
    for p in 0..3 {
        for q in 0..3 {
            assert_abs_diff_eq!(
                rotated.onee()[(p, q)],
                ints.onee()[(perm[p], perm[q])],
                epsilon = 1e-14
            );
            for r in 0..3 {
                for s in 0..3 {
                    assert_abs_diff_eq!(
                        rotated.twoe()[(p, q, r, s)],
                        ints.twoe()[(perm[p], perm[q], perm[r], perm[s])],
                        epsilon = 1e-14
                    );
                }
            }
        }
    }
    assert!(ints.rotated(&Array2::eye(2)).is_err());
}

#[test]
fn test_integrals_energy_from_rdms() {
    let ints = random_integrals(3, 8);
    // Closed-shell determinant with orbital 0 doubly occupied.
    let mut rdm1 = Array2::<f64>::zeros((3, 3));
    rdm1[(0, 0)] = 2.0;
    let mut rdm2 = Array4::<f64>::zeros((3, 3, 3, 3));
    rdm2[(0, 0, 0, 0)] = 2.0;
    let energy = ints.energy_from_rdms(&rdm1, &rdm2).unwrap();
    let expected = 2.0 * ints.onee()[(0, 0)] + ints.twoe()[(0, 0, 0, 0)];
    assert_abs_diff_eq!(energy, expected, epsilon = 1e-14);
    assert!(ints
        .energy_from_rdms(&Array2::zeros((2, 2)), &rdm2)
        .is_err());
}

#[test]
fn test_integrals_fcidump_h2() {
    let (ints, header) = parse_fcidump(FCIDUMP_H2).unwrap();
    assert_eq!(header.norb, 2);
    assert_eq!(header.nelec, 2);
    assert_eq!(header.electron_counts().unwrap(), (1, 1));
    assert_abs_diff_eq!(ints.enuc(), 0.7137539936, epsilon = 1e-12);
    assert_abs_diff_eq!(ints.onee()[(1, 1)], -0.4718960724, epsilon = 1e-12);
    assert_abs_diff_eq!(ints.onee()[(0, 1)], 0.0, epsilon = 1e-12);
    // Eightfold symmetry expansion of (21|21).
    for ix in [(1, 0, 1, 0), (0, 1, 1, 0), (1, 0, 0, 1), (0, 1, 0, 1)] {
        assert_abs_diff_eq!(ints.twoe()[ix], 0.1809270230, epsilon = 1e-12);
    }
    assert_abs_diff_eq!(ints.twoe()[(1, 1, 0, 0)], 0.6645817899, epsilon = 1e-12);
    assert_abs_diff_eq!(ints.twoe()[(0, 0, 1, 1)], 0.6645817899, epsilon = 1e-12);
}

#[test]
fn test_integrals_fcidump_malformed() {
    assert!(parse_fcidump("NORB=2 NELEC=2\n 1.0 1 1 0 0\n").is_err());
    assert!(parse_fcidump(" &FCI NORB=2,NELEC=2,MS2=0,\n &END\n 1.0 3 1 0 0\n").is_err());
    assert!(parse_fcidump(" &FCI NORB=2,NELEC=2,MS2=0,\n &END\n 1.0 1 1\n").is_err());
}

#[test]
fn test_integrals_fcidump_write_omits_zeros() {
    let (ints, _) = parse_fcidump(FCIDUMP_H2).unwrap();
    let mut text = String::new();
    ints.write_fcidump(&mut text, 2, 0).unwrap();
    let lines = text.lines().collect::<Vec<_>>();

    // Four header lines, four two-electron, two one-electron and one core-energy line.
    assert_eq!(lines.len(), 11);
    assert_eq!(lines[0], " &FCI NORB=2,NELEC=2,MS2=0,");
    assert_eq!(lines[1], "  ORBSYM=1,1,");
    assert!(lines[10].trim_end().ends_with("0   0   0   0"));
    assert_eq!(text, ints.to_fcidump_string(2, 0).unwrap());

    let (read, _) = parse_fcidump(&text).unwrap();
    assert_eq!(read, ints);
}

#[test]
fn test_integrals_fcidump_write_and_read() {
    let ints = random_integrals(4, 17);
    let text = ints.to_fcidump_string(4, 0).unwrap();
    let (read, header) = parse_fcidump(&text).unwrap();
    assert_eq!(
        header,
        FcidumpHeader {
            norb: 4,
            nelec: 4,
            ms2: 0
        }
    );
    assert_abs_diff_eq!(read.enuc(), ints.enuc(), epsilon = 1e-14);
    assert_abs_diff_eq!(read.onee(), ints.onee(), epsilon = 1e-14);
    assert_abs_diff_eq!(read.twoe(), ints.twoe(), epsilon = 1e-14);
}
