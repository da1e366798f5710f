//! Driver for sample-based quantum diagonalisation with self-consistent configuration recovery.
//!
//! Every configuration-recovery round carries out the following steps:
//!
//! 1. The raw bitstrings are corrected toward the target Hamming weights using the orbital
//! occupancies estimated in the previous round. In the first round no estimate exists and the
//! raw bitstrings are used as they are.
//! 2. Rows with wrong Hamming weights are discarded and the surviving weights renormalised.
//! 3. A number of weighted batches are drawn from the surviving rows.
//! 4. The determinant subspace spanned by each batch is eigensolved, with all batches solved in
//! parallel. Batches whose eigensolves fail are excluded from the rest of the round.
//! 5. The orbital occupancies of the converged batches are averaged to seed the next round.
//!
//! After the last round, one determinant subspace is selected from the final batches and handed
//! over to [`OrbitalOptimisationDriver`], which alternates orbital rotations with re-solves in that
//! subspace.

use std::fmt;
use std::path::PathBuf;

use anyhow::{self, format_err};
use derive_builder::Builder;
use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::drivers::orbital_optimisation::{
    OrbitalOptimisationDriver, OrbitalOptimisationHistory, OrbitalOptimisationParams,
};
use crate::drivers::QSqdDriver;
use crate::error::SqdError;
use crate::integrals::HamiltonianIntegrals;
use crate::io::format::{
    log_banner, log_heading, qsqd_output, qsqd_warn, rule, write_heading, yes_no, LogLines,
    Section, BATCH_TABLE_WIDTH,
};
use crate::io::{write_qsqd_binary, QSqdFileType};
use crate::orbital::OrbitalRotation;
use crate::samples::batching::{sample_batches, BatchSamplingParams};
use crate::samples::bitstring::BitstringMatrix;
use crate::samples::occupancy::OrbitalOccupancies;
use crate::samples::postselection::postselect_by_hamming_weight;
use crate::samples::random::RandomSource;
use crate::samples::recovery::recover_configurations;
use crate::solver::{SpinConstraint, SubspaceEigensolver, SubspaceSolution};
use crate::subspace::DeterminantSubspace;


// =================
// Enum definitions
// =================

/// Enumerated type for the policies selecting the determinant subspace handed over to orbital
/// optimisation after the last configuration-recovery round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubspaceSelection {
    /// The subspace of the final-round batch with the lowest energy.
    LowestEnergyBatch,

    /// The union of the subspaces of all converged final-round batches.
    UnionOfBatches,
}

impl Default for SubspaceSelection {
    fn default() -> Self {
        SubspaceSelection::LowestEnergyBatch
    }
}

impl fmt::Display for SubspaceSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubspaceSelection::LowestEnergyBatch => write!(f, "lowest-energy batch"),
            SubspaceSelection::UnionOfBatches => write!(f, "union of converged batches"),
        }
    }
}

// ==================
// Struct definitions
// ==================

// ----------
// Parameters
// ----------

fn default_max_recovery_iterations() -> usize {
    5
}
fn default_max_cycles() -> usize {
    200
}

/// Structure containing control parameters for sample-based quantum diagonalisation.
#[derive(Clone, Builder, Debug, PartialEq, Serialize, Deserialize)]
pub struct SqdParams {
    /// The number of self-consistent configuration-recovery rounds.
    #[builder(default = "5")]
    #[serde(default = "default_max_recovery_iterations")]
    pub max_recovery_iterations: usize,

    /// The parameters for drawing batches in every round.
    #[builder(default)]
    #[serde(default)]
    pub batching: BatchSamplingParams,

    /// Boolean indicating if both spin sectors of every batch subspace should use the union of
    /// the α and β strings.
    #[builder(default = "false")]
    #[serde(default)]
    pub symmetrise_spin: bool,

    /// The largest number of eigensolver cycles per solve.
    #[builder(default = "200")]
    #[serde(default = "default_max_cycles")]
    pub max_cycles: usize,

    /// An optional penalty steering every eigensolve toward a target `⟨Ŝ²⟩`.
    #[builder(default = "None")]
    #[serde(default)]
    pub spin_constraint: Option<SpinConstraint>,

    /// The seed of the random source driving configuration recovery and batch sampling.
    #[builder(default = "0")]
    #[serde(default)]
    pub seed: u64,

    /// The policy selecting the subspace for orbital optimisation.
    #[builder(default)]
    #[serde(default)]
    pub subspace_selection: SubspaceSelection,

    /// The parameters for orbital optimisation.
    #[builder(default)]
    #[serde(default)]
    pub orbital_optimisation: OrbitalOptimisationParams,

    /// The output verbosity level.
    #[builder(default = "0")]
    #[serde(default)]
    pub verbose: u8,

    /// Optional name for saving the result as a binary file of type [`QSqdFileType::Res`]. If
    /// `None`, the result will not be saved.
    #[builder(default = "None")]
    #[serde(default)]
    pub result_save_name: Option<PathBuf>,
}

impl SqdParams {
    /// Returns a builder to construct a [`SqdParams`] structure.
    pub fn builder() -> SqdParamsBuilder {
        SqdParamsBuilder::default()
    }
}

impl Default for SqdParams {
    fn default() -> Self {
        Self::builder()
            .build()
            .expect("Unable to construct a default `SqdParams`.")
    }
}

impl fmt::Display for SqdParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Configuration-recovery rounds: {}",
            self.max_recovery_iterations
        )?;
        write!(f, "{}", self.batching)?;
        writeln!(
            f,
            "Spin-symmetrised subspaces: {}",
            yes_no(self.symmetrise_spin)
        )?;
        writeln!(f, "Eigensolver cycle budget: {}", self.max_cycles)?;
        writeln!(
            f,
            "Spin constraint: {}",
            self.spin_constraint
                .as_ref()
                .map(|constraint| constraint.to_string())
                .unwrap_or_else(|| yes_no(false).to_string())
        )?;
        writeln!(f, "Random seed: {}", self.seed)?;
        writeln!(f, "Subspace selection: {}", self.subspace_selection)?;
        writeln!(f, "Output level: {}", self.verbose)?;
        writeln!(
            f,
            "Save SQD results to file: {}",
            if let Some(name) = self.result_save_name.as_ref() {
                let mut path = name.clone();
                path.set_extension(QSqdFileType::Res.ext());
                path.display().to_string()
            } else {
                yes_no(false).to_string()
            }
        )?;
        writeln!(f)?;
        Ok(())
    }
}

// -------
// History
// -------

/// A record of one batch eigensolve in a configuration-recovery round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    /// The configuration-recovery round, starting from `0`.
    pub round: usize,

    /// The index of the batch within its round.
    pub batch: usize,

    /// The dimension of the determinant subspace of the batch.
    pub subspace_dimension: usize,

    /// The total energy including the nuclear repulsion energy, if the eigensolve converged.
    pub energy: Option<f64>,

    /// The expectation value of `Ŝ²`, if the eigensolve converged.
    pub spin_sq: Option<f64>,

    /// The orbital occupancies, if the eigensolve converged.
    pub occupancies: Option<OrbitalOccupancies>,

    /// Boolean indicating if the eigensolve converged.
    pub converged: bool,
}

/// Append-only history of all batch eigensolves across configuration-recovery rounds.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IterationHistory {
    records: Vec<BatchRecord>,

    #[serde(default)]
    averaged_occupancies: Vec<OrbitalOccupancies>,
}

impl IterationHistory {
    /// Appends a record.
    pub fn push(&mut self, record: BatchRecord) {
        self.records.push(record);
    }

    /// Appends the occupancies averaged over the converged batches of the latest round.
    pub fn push_averaged_occupancies(&mut self, occupancies: OrbitalOccupancies) {
        self.averaged_occupancies.push(occupancies);
    }

    /// The averaged occupancies of every completed round, in round order.
    pub fn averaged_occupancies(&self) -> &[OrbitalOccupancies] {
        &self.averaged_occupancies
    }

    /// The records in chronological order.
    pub fn records(&self) -> &[BatchRecord] {
        &self.records
    }

    /// The number of rounds with at least one record.
    pub fn n_rounds(&self) -> usize {
        self.records
            .iter()
            .map(|record| record.round + 1)
            .max()
            .unwrap_or(0)
    }

    /// The records of one round.
    pub fn round(&self, round: usize) -> impl Iterator<Item = &BatchRecord> {
        self.records.iter().filter(move |record| record.round == round)
    }

    /// The lowest converged batch energy of every round, or `None` for a round without converged
    /// batches.
    pub fn lowest_energies(&self) -> Vec<Option<f64>> {
        (0..self.n_rounds())
            .map(|round| {
                self.round(round)
                    .filter_map(|record| record.energy)
                    .min_by(|a, b| a.total_cmp(b))
            })
            .collect()
    }
}

impl fmt::Display for IterationHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", rule(BATCH_TABLE_WIDTH))?;
        writeln!(
            f,
            " {:>5}  {:>5}  {:>10}  {:>20}  {:>10}  {:>10}",
            "Round", "Batch", "Dimension", "Energy", "⟨S²⟩", "Converged?"
        )?;
        writeln!(f, "{}", rule(BATCH_TABLE_WIDTH))?;
        for record in self.records.iter() {
            writeln!(f, "{}", format_batch_record(record))?;
        }
        writeln!(f, "{}", rule(BATCH_TABLE_WIDTH))?;
        Ok(())
    }
}

fn format_batch_record(record: &BatchRecord) -> String {
    format!(
        " {:>5}  {:>5}  {:>10}  {:>20}  {:>10}  {:>10}",
        record.round,
        record.batch,
        record.subspace_dimension,
        record
            .energy
            .map(|e| format!("{e:+.12}"))
            .unwrap_or_else(|| "--".to_string()),
        record
            .spin_sq
            .map(|s| format!("{s:.6}"))
            .unwrap_or_else(|| "--".to_string()),
        yes_no(record.converged)
    )
}

// ------
// Result
// ------

/// Structure to contain sample-based quantum diagonalisation results.
#[derive(Clone, Builder, Debug, Serialize, Deserialize)]
pub struct SqdResult {
    /// The control parameters used to obtain this set of results.
    parameters: SqdParams,

    /// The final total energy, including the nuclear repulsion energy.
    pub total_energy: f64,

    /// The final electronic energy.
    pub electronic_energy: f64,

    /// The nuclear repulsion energy.
    pub enuc: f64,

    /// The total energy in the selected subspace before orbital optimisation.
    pub pre_optimisation_energy: f64,

    /// The final orbital rotation.
    pub rotation: OrbitalRotation,

    /// The orbital occupancies of the final state in the rotated orbital basis.
    pub occupancies: OrbitalOccupancies,

    /// The expectation value of `Ŝ²` of the final state.
    pub spin_sq: f64,

    /// The determinant subspace selected for orbital optimisation.
    pub subspace: DeterminantSubspace,

    /// The postselected bitstrings of the final round, as accumulated weights.
    pub recovered_counts: IndexMap<String, f64>,

    /// The history of all configuration-recovery rounds.
    pub recovery_history: IterationHistory,

    /// The history of orbital optimisation.
    pub orbital_history: OrbitalOptimisationHistory,
}

impl SqdResult {
    fn builder() -> SqdResultBuilder {
        SqdResultBuilder::default()
    }

    /// The control parameters used to obtain this set of results.
    pub fn parameters(&self) -> &SqdParams {
        &self.parameters
    }
}

impl fmt::Display for SqdResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_heading(f, "SQD summary")?;
        writeln!(f)?;
        writeln!(
            f,
            "Configuration-recovery rounds: {}",
            self.recovery_history.n_rounds()
        )?;
        writeln!(f, "Selected subspace dimension: {}", self.subspace.dimension())?;
        writeln!(f, "Nuclear repulsion energy   : {:+.12}", self.enuc)?;
        writeln!(
            f,
            "Pre-optimisation energy    : {:+.12}",
            self.pre_optimisation_energy
        )?;
        writeln!(f, "Electronic energy          : {:+.12}", self.electronic_energy)?;
        writeln!(f, "Total energy               : {:+.12}", self.total_energy)?;
        writeln!(f, "⟨S²⟩                       : {:.6}", self.spin_sq)?;
        writeln!(f)?;
        writeln!(f, "Orbital occupancies:")?;
        write!(f, "{}", self.occupancies)?;
        writeln!(f)?;
        write!(f, "{}", self.rotation)?;
        Ok(())
    }
}

// ------
// Driver
// ------

/// The working states of the configuration-recovery cycle. Each state carries the data produced
/// by the preceding one.
enum SqdState {
    /// Start of a round: decides whether another round is due.
    AwaitingOccupancy,

    /// Correct the raw bitstrings with the current occupancy estimate.
    Recovering,

    /// Discard rows with wrong Hamming weights.
    Postselecting(BitstringMatrix),

    /// Draw batches from the postselected rows.
    Batching(BitstringMatrix),

    /// Eigensolve the batch subspaces in parallel.
    Solving(Vec<DeterminantSubspace>),

    /// Record the outcomes and average the occupancies of the converged batches.
    Aggregating(Vec<BatchOutcome>),

    /// All rounds completed.
    Done,
}

/// The tagged outcome of one batch eigensolve.
struct BatchOutcome {
    subspace: DeterminantSubspace,
    solution: Result<SubspaceSolution, anyhow::Error>,
}

/// Checks the mutual consistency of the inputs of an SQD calculation.
fn check_configuration(
    params: &SqdParams,
    integrals: &HamiltonianIntegrals,
    samples: &BitstringMatrix,
    n_up: usize,
    n_dn: usize,
) -> Result<(), SqdError> {
    let norb = integrals.norb();
    if samples.norb() != norb {
        return Err(SqdError::Configuration(format!(
            "The bitstrings span {} orbitals but the integrals span {norb}.",
            samples.norb()
        )));
    }
    if samples.is_empty() {
        return Err(SqdError::Configuration(
            "No bitstring samples given.".to_string(),
        ));
    }
    if n_up > norb || n_dn > norb {
        return Err(SqdError::Configuration(format!(
            "The electron counts ({n_up}, {n_dn}) exceed the number of orbitals {norb}."
        )));
    }
    if params.max_recovery_iterations == 0 {
        return Err(SqdError::Configuration(
            "At least one configuration-recovery round is required.".to_string(),
        ));
    }
    if params.max_cycles == 0 {
        return Err(SqdError::Configuration(
            "The eigensolver cycle budget must be positive.".to_string(),
        ));
    }
    if params.symmetrise_spin && n_up != n_dn {
        return Err(SqdError::Configuration(format!(
            "Spin symmetrisation requires equal α and β electron counts, but ({n_up}, {n_dn}) \
            was given."
        )));
    }
    if let Some(constraint) = params.spin_constraint.as_ref() {
        if !(constraint.target_spin_sq >= 0.0 && constraint.shift >= 0.0) {
            return Err(SqdError::Configuration(format!(
                "Invalid spin constraint: {constraint}."
            )));
        }
    }
    Ok(())
}

/// Driver for sample-based quantum diagonalisation with self-consistent configuration recovery
/// and orbital optimisation.
#[derive(Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct SqdDriver<'a, S>
where
    S: SubspaceEigensolver,
{
    /// The control parameters for SQD.
    parameters: &'a SqdParams,

    /// The Hamiltonian integrals.
    integrals: &'a HamiltonianIntegrals,

    /// The raw measured bitstrings with their weights.
    samples: &'a BitstringMatrix,

    /// The target number of α electrons.
    n_up: usize,

    /// The target number of β electrons.
    n_dn: usize,

    /// The subspace eigensolver.
    solver: &'a S,

    /// The result of the calculation.
    #[builder(setter(skip), default = "None")]
    result: Option<SqdResult>,
}

impl<'a, S> SqdDriverBuilder<'a, S>
where
    S: SubspaceEigensolver,
{
    fn validate(&self) -> Result<(), String> {
        let params = self
            .parameters
            .ok_or("No SQD parameters found.".to_string())?;
        let integrals = self
            .integrals
            .ok_or("No Hamiltonian integrals found.".to_string())?;
        let samples = self
            .samples
            .ok_or("No bitstring samples found.".to_string())?;
        let n_up = self.n_up.ok_or("No α electron count found.".to_string())?;
        let n_dn = self.n_dn.ok_or("No β electron count found.".to_string())?;
        check_configuration(params, integrals, samples, n_up, n_dn).map_err(|err| err.to_string())
    }
}

impl<'a, S> SqdDriver<'a, S>
where
    S: SubspaceEigensolver,
{
    /// Returns a builder to construct a [`SqdDriver`] structure.
    pub fn builder() -> SqdDriverBuilder<'a, S> {
        SqdDriverBuilder::default()
    }

    /// Eigensolves every batch subspace in parallel. Failed eigensolves are returned as tagged
    /// errors without affecting the other batches.
    fn solve_batches(&self, subspaces: Vec<DeterminantSubspace>) -> Vec<BatchOutcome> {
        let solver = self.solver;
        let integrals = self.integrals;
        let spin_constraint = self.parameters.spin_constraint.as_ref();
        let max_cycles = self.parameters.max_cycles;
        subspaces
            .into_par_iter()
            .map(|subspace| {
                let solution = solver.solve(&subspace, integrals, spin_constraint, max_cycles);
                BatchOutcome { subspace, solution }
            })
            .collect()
    }

    /// Selects the subspace for orbital optimisation from the converged batches of the final
    /// round.
    fn select_subspace(
        &self,
        converged: &[(DeterminantSubspace, SubspaceSolution)],
    ) -> Result<DeterminantSubspace, anyhow::Error> {
        match self.parameters.subspace_selection {
            SubspaceSelection::LowestEnergyBatch => converged
                .iter()
                .min_by(|(_, a), (_, b)| a.energy.total_cmp(&b.energy))
                .map(|(subspace, _)| subspace.clone())
                .ok_or_else(|| format_err!("No converged batch available for subspace selection.")),
            SubspaceSelection::UnionOfBatches => {
                DeterminantSubspace::union(converged.iter().map(|(subspace, _)| subspace))?
                    .ok_or_else(|| {
                        format_err!("No converged batch available for subspace selection.")
                    })
            }
        }
    }

    /// Executes sample-based quantum diagonalisation.
    fn diagonalise(&mut self) -> Result<(), anyhow::Error> {
        log_banner("Sample-based Quantum Diagonalisation");
        qsqd_output!("");
        let params = self.parameters;
        check_configuration(params, self.integrals, self.samples, self.n_up, self.n_dn)?;
        params.log_lines();
        qsqd_output!("Number of spatial orbitals: {}", self.integrals.norb());
        qsqd_output!("Electron counts (α, β): ({}, {})", self.n_up, self.n_dn);
        qsqd_output!("Raw bitstrings: {}", self.samples.n_rows());
        qsqd_output!("");

        let enuc = self.integrals.enuc();
        let mut random = RandomSource::from_seed(params.seed);
        let mut history = IterationHistory::default();
        let mut occupancies: Option<OrbitalOccupancies> = None;
        let mut final_table: Option<BitstringMatrix> = None;
        let mut final_converged: Vec<(DeterminantSubspace, SubspaceSolution)> = vec![];
        let mut round = 0;

        log_heading("Self-consistent configuration recovery");
        qsqd_output!("");
        qsqd_output!("{}", rule(BATCH_TABLE_WIDTH));
        qsqd_output!(
            " {:>5}  {:>5}  {:>10}  {:>20}  {:>10}  {:>10}",
            "Round",
            "Batch",
            "Dimension",
            "Energy",
            "⟨S²⟩",
            "Converged?"
        );
        qsqd_output!("{}", rule(BATCH_TABLE_WIDTH));

        let mut state = SqdState::AwaitingOccupancy;
        loop {
            state = match state {
                SqdState::AwaitingOccupancy => {
                    if round >= params.max_recovery_iterations {
                        SqdState::Done
                    } else {
                        SqdState::Recovering
                    }
                }
                SqdState::Recovering => {
                    let recovered = recover_configurations(
                        self.samples,
                        occupancies.as_ref(),
                        self.n_up,
                        self.n_dn,
                        random.rng_mut(),
                    )?;
                    SqdState::Postselecting(recovered)
                }
                SqdState::Postselecting(recovered) => {
                    let postselected =
                        postselect_by_hamming_weight(&recovered, self.n_up, self.n_dn, round)?;
                    log::debug!(
                        "Round {round}: {} of {} row(s) survive postselection.",
                        postselected.n_rows(),
                        recovered.n_rows()
                    );
                    SqdState::Batching(postselected)
                }
                SqdState::Batching(postselected) => {
                    let batches = sample_batches(&postselected, &params.batching, &mut random)?;
                    let subspaces = batches
                        .iter()
                        .map(|batch| {
                            DeterminantSubspace::from_batch(
                                batch,
                                params.symmetrise_spin,
                                self.n_up,
                                self.n_dn,
                            )
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    final_table = Some(postselected);
                    SqdState::Solving(subspaces)
                }
                SqdState::Solving(subspaces) => SqdState::Aggregating(self.solve_batches(subspaces)),
                SqdState::Aggregating(outcomes) => {
                    let n_batches = outcomes.len();
                    let mut converged = vec![];
                    for (batch, outcome) in outcomes.into_iter().enumerate() {
                        let record = match outcome.solution {
                            Ok(solution) => {
                                let record = BatchRecord {
                                    round,
                                    batch,
                                    subspace_dimension: outcome.subspace.dimension(),
                                    energy: Some(solution.energy + enuc),
                                    spin_sq: Some(solution.spin_sq),
                                    occupancies: Some(solution.occupancies.clone()),
                                    converged: true,
                                };
                                converged.push((outcome.subspace, solution));
                                record
                            }
                            Err(err) => {
                                log::warn!("Batch {batch} of round {round} failed: {err}");
                                BatchRecord {
                                    round,
                                    batch,
                                    subspace_dimension: outcome.subspace.dimension(),
                                    energy: None,
                                    spin_sq: None,
                                    occupancies: None,
                                    converged: false,
                                }
                            }
                        };
                        qsqd_output!("{}", format_batch_record(&record));
                        history.push(record);
                    }
                    if converged.is_empty() {
                        qsqd_output!("{}", rule(BATCH_TABLE_WIDTH));
                        return Err(SqdError::AllBatchesFailed { round, n_batches }.into());
                    }
                    if converged.len() < n_batches {
                        qsqd_warn!(
                            "{} of {n_batches} batch(es) in round {round} failed and are excluded.",
                            n_batches - converged.len()
                        );
                    }
                    occupancies = OrbitalOccupancies::average(
                        converged.iter().map(|(_, solution)| &solution.occupancies),
                    );
                    if let Some(occ) = occupancies.as_ref() {
                        if params.verbose >= 1 {
                            qsqd_output!("Averaged occupancies after round {round}:");
                            occ.log_lines();
                        }
                        history.push_averaged_occupancies(occ.clone());
                    }
                    final_converged = converged;
                    round += 1;
                    SqdState::AwaitingOccupancy
                }
                SqdState::Done => break,
            };
        }
        qsqd_output!("{}", rule(BATCH_TABLE_WIDTH));
        qsqd_output!("");

        let lowest = history.lowest_energies();
        if lowest
            .iter()
            .flatten()
            .zip(lowest.iter().flatten().skip(1))
            .any(|(prev, next)| next > prev)
        {
            log::info!("The lowest batch energy is not monotonic across recovery rounds.");
        }

        // ------------------
        // Subspace selection
        // ------------------
        Section::Micro.begin("Subspace selection");
        qsqd_output!("");
        let subspace = self.select_subspace(&final_converged)?;
        qsqd_output!(
            "Selected subspace ({}): {} α × {} β strings, dimension {}",
            params.subspace_selection,
            subspace.alpha_strings().len(),
            subspace.beta_strings().len(),
            subspace.dimension()
        );
        qsqd_output!("");
        Section::Micro.end("Subspace selection");
        qsqd_output!("");

        // --------------------
        // Orbital optimisation
        // --------------------
        Section::Macro.begin("Orbital optimisation");
        qsqd_output!("");
        let mut oo_driver = OrbitalOptimisationDriver::builder()
            .parameters(&params.orbital_optimisation)
            .integrals(self.integrals)
            .subspace(&subspace)
            .solver(self.solver)
            .spin_constraint(params.spin_constraint.as_ref())
            .max_cycles(params.max_cycles)
            .build()?;
        oo_driver.run()?;
        let oo_res = oo_driver.result()?;
        Section::Macro.end("Orbital optimisation");
        qsqd_output!("");

        let recovered_counts = final_table
            .as_ref()
            .map(|table| table.to_counts())
            .unwrap_or_default();
        let result = SqdResult::builder()
            .parameters(params.clone())
            .total_energy(oo_res.energy)
            .electronic_energy(oo_res.solution.energy)
            .enuc(enuc)
            .pre_optimisation_energy(oo_res.initial_energy)
            .rotation(oo_res.rotation.clone())
            .occupancies(oo_res.solution.occupancies.clone())
            .spin_sq(oo_res.solution.spin_sq)
            .subspace(subspace.clone())
            .recovered_counts(recovered_counts)
            .recovery_history(history)
            .orbital_history(oo_res.history.clone())
            .build()?;
        result.log_lines();
        qsqd_output!("");

        if let Some(name) = params.result_save_name.as_ref() {
            write_qsqd_binary(name, QSqdFileType::Res, &result)?;
            let mut path = name.to_path_buf();
            path.set_extension(QSqdFileType::Res.ext());
            qsqd_output!("SQD results saved as {}.", path.display());
            qsqd_output!("");
        }

        self.result = Some(result);
        Ok(())
    }
}

impl<'a, S> QSqdDriver for SqdDriver<'a, S>
where
    S: SubspaceEigensolver,
{
    type Params = SqdParams;

    type Outcome = SqdResult;

    fn result(&self) -> Result<&Self::Outcome, anyhow::Error> {
        self.result
            .as_ref()
            .ok_or_else(|| format_err!("No SQD results found."))
    }

    fn run(&mut self) -> Result<(), anyhow::Error> {
        self.diagonalise()
    }
}
