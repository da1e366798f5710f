//! YAML input files describing complete QSQD calculations.

use std::path::PathBuf;

use anyhow::{self, format_err};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::drivers::sqd::{SqdDriver, SqdParams};
use crate::drivers::QSqdDriver;
use crate::error::SqdError;
use crate::integrals::HamiltonianIntegrals;
use crate::interfaces::InputHandle;
use crate::io::format::{qsqd_error, qsqd_output, LogLines, Section};
use crate::io::{read_qsqd_binary, QSqdFileType};
use crate::samples::bitstring::BitstringMatrix;
use crate::solver::davidson::DavidsonSolver;

#[cfg(test)]
#[path = "input_tests.rs"]
mod input_tests;

// ================
// Enum definitions
// ================

/// An enumerated type representing possible sources of Hamiltonian integrals in a YAML input
/// file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum IntegralsInputKind {
    /// Variant indicating that the integrals are read from an FCIDUMP text file. The associated
    /// path is the full path to the file. The electron counts are taken from the FCIDUMP header
    /// unless given explicitly.
    Fcidump(PathBuf),

    /// Variant indicating that the integrals are read from a `QSqd` [`QSqdFileType::Int`] binary
    /// file. The associated path gives the name of the file without its `.qsqd.int` extension.
    FromFile(PathBuf),
}

impl Default for IntegralsInputKind {
    fn default() -> Self {
        IntegralsInputKind::Fcidump(PathBuf::from("FCIDUMP"))
    }
}

/// An enumerated type representing possible sources of measured bitstrings in a YAML input file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SamplesInputKind {
    /// Variant indicating that the bitstrings are given inline as a map from bitstring text to
    /// count or probability. The right-most character of every text is bit `0`.
    Counts(IndexMap<String, f64>),

    /// Variant indicating that the bitstrings are read from a `QSqd` [`QSqdFileType::Smp`] binary
    /// file. The associated path gives the name of the file without its `.qsqd.smp` extension.
    FromFile(PathBuf),
}

impl Default for SamplesInputKind {
    fn default() -> Self {
        SamplesInputKind::FromFile(PathBuf::from("samples"))
    }
}

// ==================
// Struct definitions
// ==================

/// Explicit numbers of α and β electrons.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectronCounts {
    /// The number of α electrons.
    pub n_up: usize,

    /// The number of β electrons.
    pub n_dn: usize,
}

/// A structure containing `QSqd` input parameters which can be serialised into and deserialised
/// from a YAML input file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Input {
    /// Specification of the Hamiltonian integrals.
    #[serde(default)]
    pub integrals: IntegralsInputKind,

    /// Specification of the measured bitstrings.
    #[serde(default)]
    pub samples: SamplesInputKind,

    /// Explicit electron counts. If `None`, the counts are taken from the FCIDUMP header, which
    /// is then required.
    #[serde(default)]
    pub electrons: Option<ElectronCounts>,

    /// Control parameters for the SQD calculation.
    #[serde(default)]
    pub sqd: SqdParams,

    /// Control parameters for the Davidson eigensolver.
    #[serde(default)]
    pub solver: DavidsonSolver,
}

impl Input {
    /// Loads the integrals and the electron counts specified by this input.
    fn load_integrals(&self) -> Result<(HamiltonianIntegrals, (usize, usize)), anyhow::Error> {
        let (integrals, header) = match &self.integrals {
            IntegralsInputKind::Fcidump(path) => {
                qsqd_output!("Reading integrals from FCIDUMP file {}.", path.display());
                let (integrals, header) = HamiltonianIntegrals::from_fcidump(path)?;
                (integrals, Some(header))
            }
            IntegralsInputKind::FromFile(name) => {
                qsqd_output!(
                    "Reading integrals from binary file {}.{}.",
                    name.display(),
                    QSqdFileType::Int.ext()
                );
                let stored: HamiltonianIntegrals = read_qsqd_binary(name, QSqdFileType::Int)?;
                let integrals = HamiltonianIntegrals::builder()
                    .enuc(stored.enuc())
                    .onee(stored.onee().clone())
                    .twoe(stored.twoe().clone())
                    .build()?;
                (integrals, None)
            }
        };
        let counts = match (self.electrons, header) {
            (Some(electrons), _) => (electrons.n_up, electrons.n_dn),
            (None, Some(header)) => header.electron_counts()?,
            (None, None) => {
                return Err(SqdError::Configuration(
                    "Electron counts must be given when the integrals are not read from an \
                    FCIDUMP file."
                        .to_string(),
                )
                .into())
            }
        };
        Ok((integrals, counts))
    }

    /// Loads the bitstrings specified by this input.
    fn load_samples(&self, norb: usize) -> Result<BitstringMatrix, anyhow::Error> {
        match &self.samples {
            SamplesInputKind::Counts(counts) => BitstringMatrix::from_counts(norb, counts),
            SamplesInputKind::FromFile(name) => {
                qsqd_output!(
                    "Reading bitstrings from binary file {}.{}.",
                    name.display(),
                    QSqdFileType::Smp.ext()
                );
                let stored: BitstringMatrix = read_qsqd_binary(name, QSqdFileType::Smp)?;
                BitstringMatrix::new(
                    stored.norb(),
                    stored.rows().to_vec(),
                    stored.weights().to_vec(),
                )
            }
        }
    }
}

impl InputHandle for Input {
    /// Handles the main input structure.
    fn handle(&self) -> Result<(), anyhow::Error> {
        let solver = DavidsonSolver::builder()
            .convergence_threshold(self.solver.convergence_threshold)
            .max_space(self.solver.max_space)
            .num_guesses(self.solver.num_guesses)
            .build()?;

        Section::Macro.begin("Input loading");
        qsqd_output!("");
        let (integrals, (n_up, n_dn)) = self.load_integrals()?;
        let samples = self.load_samples(integrals.norb())?;
        qsqd_output!(
            "Loaded {} orbitals, ({n_up}, {n_dn}) electrons and {} bitstrings.",
            integrals.norb(),
            samples.n_rows()
        );
        qsqd_output!("");
        solver.log_lines();
        qsqd_output!("");
        Section::Macro.end("Input loading");
        qsqd_output!("");

        Section::Macro.begin("Sample-based quantum diagonalisation");
        qsqd_output!("");
        let mut sqd_driver = SqdDriver::builder()
            .parameters(&self.sqd)
            .integrals(&integrals)
            .samples(&samples)
            .n_up(n_up)
            .n_dn(n_dn)
            .solver(&solver)
            .build()?;
        sqd_driver.run()?;
        let sqd_res = sqd_driver.result()?;
        Section::Macro.end("Sample-based quantum diagonalisation");
        qsqd_output!("");

        if !sqd_res.total_energy.is_finite() {
            qsqd_error!("Non-finite final energy obtained.");
            return Err(format_err!("Non-finite final energy obtained."));
        }
        qsqd_output!("Final total energy: {:+.12}", sqd_res.total_energy);
        qsqd_output!("");
        Ok(())
    }
}
