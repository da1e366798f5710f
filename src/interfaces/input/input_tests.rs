use std::path::PathBuf;

use approx::assert_abs_diff_eq;

use crate::drivers::sqd::{SqdResult, SubspaceSelection};
use crate::error::SqdError;
use crate::integrals::integrals_fixtures::random_integrals;
use crate::interfaces::InputHandle;
use crate::io::{read_qsqd_binary, read_qsqd_yaml, write_qsqd_binary, write_qsqd_yaml, QSqdFileType};
use crate::samples::samples_fixtures::noisy_samples;

use super::{ElectronCounts, Input, IntegralsInputKind, SamplesInputKind};

const ROOT: &str = env!("CARGO_MANIFEST_DIR");

/// A unique name in the temporary directory for files written by a test.
fn temp_name(stem: &str) -> PathBuf {
    std::env::temp_dir().join(format!("qsqd_input_test_{stem}_{}", std::process::id()))
}

fn remove(name: &PathBuf, ext: &str) {
    let mut path = name.clone();
    path.set_extension(ext);
    let _ = std::fs::remove_file(path);
}

#[test]
fn test_interfaces_input_fcidump_counts() {
    let name = format!("{ROOT}/tests/input/test_input_sqd_fcidump_counts.yml");
    let inp = read_qsqd_yaml::<Input, _>(&name).unwrap();

    assert_eq!(
        inp.integrals,
        IntegralsInputKind::Fcidump(PathBuf::from("tests/fcidump/h2.fcidump"))
    );
    if let SamplesInputKind::Counts(counts) = &inp.samples {
        assert_eq!(counts.len(), 7);
        assert_eq!(counts.get_index(0).unwrap().0, "0101");
        assert_abs_diff_eq!(*counts.get("0101").unwrap(), 0.70);
    } else {
        panic!("Unexpected samples input kind.");
    }
    assert!(inp.electrons.is_none());
    assert_eq!(inp.sqd.max_recovery_iterations, 2);
    assert_eq!(inp.sqd.batching.num_batches, 2);
    assert_eq!(inp.sqd.batching.samples_per_batch, 20);
    assert_eq!(inp.sqd.seed, 3);
    assert_abs_diff_eq!(inp.sqd.spin_constraint.as_ref().unwrap().target_spin_sq, 0.0);
    assert_eq!(inp.sqd.orbital_optimisation.num_iters, 1);
    assert_eq!(inp.sqd.orbital_optimisation.num_steps_grad, 5);
    assert_eq!(inp.sqd.subspace_selection, SubspaceSelection::LowestEnergyBatch);
    assert!(!inp.sqd.symmetrise_spin);
    assert_abs_diff_eq!(inp.solver.convergence_threshold, 1.0e-9);
    assert_eq!(inp.solver.max_space, 30);
}

#[test]
fn test_interfaces_input_binary() {
    let name = format!("{ROOT}/tests/input/test_input_sqd_binary.yml");
    let inp = read_qsqd_yaml::<Input, _>(&name).unwrap();

    assert_eq!(
        inp.integrals,
        IntegralsInputKind::FromFile(PathBuf::from("integrals/h4"))
    );
    assert_eq!(
        inp.samples,
        SamplesInputKind::FromFile(PathBuf::from("samples/h4"))
    );
    assert_eq!(inp.electrons, Some(ElectronCounts { n_up: 2, n_dn: 2 }));
    assert_eq!(inp.sqd.subspace_selection, SubspaceSelection::UnionOfBatches);
    assert!(inp.sqd.symmetrise_spin);
    assert_eq!(inp.sqd.result_save_name, Some(PathBuf::from("h4_result")));
    assert_eq!(inp.sqd.max_recovery_iterations, 5);
    assert_eq!(inp.solver, Default::default());
}

#[test]
fn test_interfaces_input_handle_fcidump() {
    let name = format!("{ROOT}/tests/input/test_input_sqd_fcidump_counts.yml");
    let mut inp = read_qsqd_yaml::<Input, _>(&name).unwrap();
    inp.integrals =
        IntegralsInputKind::Fcidump(PathBuf::from(format!("{ROOT}/tests/fcidump/h2.fcidump")));
    let save_name = temp_name("h2");
    inp.sqd.result_save_name = Some(save_name.clone());
    inp.handle().unwrap();

    let res: SqdResult = read_qsqd_binary(&save_name, QSqdFileType::Res).unwrap();
    remove(&save_name, &QSqdFileType::Res.ext());

    // Between the full configuration interaction and the Hartree--Fock energies.
    assert!(res.total_energy >= -1.1435194221 - 1e-8);
    assert!(res.total_energy <= -1.1232139976 + 1e-8);
    assert_abs_diff_eq!(res.enuc, 0.7137539936, epsilon = 1e-10);
    assert_abs_diff_eq!(res.spin_sq, 0.0, epsilon = 1e-6);
}

#[test]
fn test_interfaces_input_handle_binary() {
    let ints_name = temp_name("ints");
    let smp_name = temp_name("smp");
    let save_name = temp_name("res");
    let ints = random_integrals(4, 21);
    let samples = noisy_samples(4, 2, 2, 22);
    write_qsqd_binary(&ints_name, QSqdFileType::Int, &ints).unwrap();
    write_qsqd_binary(&smp_name, QSqdFileType::Smp, &samples).unwrap();

    let mut inp = Input::default();
    inp.integrals = IntegralsInputKind::FromFile(ints_name.clone());
    inp.samples = SamplesInputKind::FromFile(smp_name.clone());
    inp.electrons = Some(ElectronCounts { n_up: 2, n_dn: 2 });
    inp.sqd.max_recovery_iterations = 2;
    inp.sqd.batching.num_batches = 2;
    inp.sqd.batching.samples_per_batch = 20;
    inp.sqd.orbital_optimisation.num_iters = 1;
    inp.sqd.orbital_optimisation.num_steps_grad = 5;
    inp.sqd.result_save_name = Some(save_name.clone());
    let outcome = inp.handle();

    let res = read_qsqd_binary::<SqdResult, _>(&save_name, QSqdFileType::Res);
    remove(&ints_name, &QSqdFileType::Int.ext());
    remove(&smp_name, &QSqdFileType::Smp.ext());
    remove(&save_name, &QSqdFileType::Res.ext());

    outcome.unwrap();
    let res = res.unwrap();
    assert_abs_diff_eq!(res.enuc, ints.enuc(), epsilon = 1e-12);
    assert!(res.total_energy <= res.pre_optimisation_energy + 1e-8);
    assert_eq!(res.recovery_history.n_rounds(), 2);
}

#[test]
fn test_interfaces_input_missing_electron_counts() {
    let ints_name = temp_name("noelec");
    write_qsqd_binary(&ints_name, QSqdFileType::Int, &random_integrals(4, 23)).unwrap();

    let mut inp = Input::default();
    inp.integrals = IntegralsInputKind::FromFile(ints_name.clone());
    let err = inp.handle().unwrap_err();
    remove(&ints_name, &QSqdFileType::Int.ext());

    assert!(matches!(
        err.downcast_ref::<SqdError>(),
        Some(SqdError::Configuration(_))
    ));
}

#[test]
fn test_interfaces_input_template_roundtrip() {
    let name = temp_name("template");
    write_qsqd_yaml(&name, &Input::default()).unwrap();
    let mut path = name.clone();
    path.set_extension("yml");
    let inp = read_qsqd_yaml::<Input, _>(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(inp, Input::default());
}
