//! # QSQD: Sample-based Quantum Diagonalisation
//!
//! QSQD is a program for the classical post-processing of bitstrings measured on a quantum
//! computer in the **S**ample-based **Q**uantum **D**iagonalisation approach to the electronic
//! structure problem. Starting from a set of noisy measured configurations and the Hamiltonian
//! integrals of a molecule, QSQD
//! - restores the correct electron counts of noisy configurations via self-consistent
//!   configuration recovery,
//! - discards configurations that still have the wrong Hamming weights,
//! - draws reproducible batches of configurations and builds a determinant subspace from each,
//! - diagonalises the Hamiltonian projected onto every subspace with a Davidson eigensolver,
//!   optionally with a spin penalty, and
//! - optimises the orbitals of the selected subspace by momentum gradient descent on the
//!   orbital rotation generator.
//!
//! Hamiltonian integrals are read from FCIDUMP files or from `QSqd` binary files, and measured
//! bitstrings are given inline as counts in the YAML input or read from `QSqd` binary files.
//!
//! ## Getting started
//!
//! The `qsqd` binary runs a calculation described by a YAML input file:
//!
//! ```text
//! qsqd template -n input
//! qsqd run -c input.yml -o output.log
//! ```
//!
//! For most items (structs, enums, functions, and traits), their usages are illustrated in test
//! functions.
//!
//! ## Pipeline
//!
//! Every configuration-recovery round runs the stages of [`samples`] in turn and solves the
//! batches of the round in parallel with a [`solver::SubspaceEigensolver`]. The averaged
//! orbital occupancies of the converged batches feed the recovery stage of the next round. The
//! orchestration is carried out by [`drivers::sqd::SqdDriver`] and the final orbital
//! optimisation by [`drivers::orbital_optimisation::OrbitalOptimisationDriver`].

pub mod drivers;
pub mod error;
pub mod integrals;
pub mod interfaces;
pub mod io;
pub mod orbital;
pub mod samples;
pub mod solver;
pub mod subspace;
