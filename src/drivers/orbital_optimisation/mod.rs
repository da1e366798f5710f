//! Driver for orbital optimisation in a fixed determinant subspace.
//!
//! The driver alternates between two states:
//!
//! 1. `ResolveSubspace`: the integrals are rotated by the current orbital rotation `U(κ)` and the
//! Hamiltonian is eigensolved in the unchanged determinant subspace. The reduced density matrices
//! of the new state are formed and the energy gradient with respect to `κ` is evaluated.
//! 2. `RotateAndDescend`: with the density matrices held fixed, `κ` is updated by a number of
//! momentum gradient-descent steps. The lowest-energy rotation visited during the descent is
//! kept, so the energy expectation of the previous state never increases.
//!
//! The cycle terminates after a fixed number of descents, or earlier when the energy improvement
//! between two consecutive solves falls below an optional threshold.

use std::fmt;

use anyhow::{self, ensure, format_err};
use derive_builder::Builder;
use ndarray::{Array1, Array2, Array4};
use serde::{Deserialize, Serialize};

use crate::drivers::QSqdDriver;
use crate::integrals::HamiltonianIntegrals;
use crate::io::format::{
    log_banner, log_heading, qsqd_output, qsqd_warn, rule, yes_no, LogLines, ORBITAL_TABLE_WIDTH,
};
use crate::orbital::gradient::energy_and_gradient;
use crate::orbital::OrbitalRotation;
use crate::solver::{SpinConstraint, SubspaceEigensolver, SubspaceSolution};
use crate::subspace::DeterminantSubspace;


/// Tolerance on an energy rise after a descent before a warning is issued.
const ENERGY_RISE_TOLERANCE: f64 = 1e-8;

// ==================
// Struct definitions
// ==================

// ----------
// Parameters
// ----------

fn default_num_iters() -> usize {
    10
}
fn default_num_steps_grad() -> usize {
    100
}
fn default_learning_rate() -> f64 {
    0.01
}
fn default_momentum() -> f64 {
    0.9
}

/// Structure containing control parameters for orbital optimisation.
#[derive(Clone, Builder, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrbitalOptimisationParams {
    /// The number of descent rounds, each followed by a re-solve in the rotated basis. If zero,
    /// the subspace is solved once in the unrotated basis.
    #[builder(default = "10")]
    #[serde(default = "default_num_iters")]
    pub num_iters: usize,

    /// The number of momentum gradient-descent steps per round.
    #[builder(default = "100")]
    #[serde(default = "default_num_steps_grad")]
    pub num_steps_grad: usize,

    /// The learning rate of the descent.
    #[builder(default = "0.01")]
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// The momentum coefficient of the descent.
    #[builder(default = "0.9")]
    #[serde(default = "default_momentum")]
    pub momentum: f64,

    /// Optional threshold on the energy improvement between two consecutive solves below which
    /// the optimisation terminates early.
    #[builder(default = "None")]
    #[serde(default)]
    pub convergence_threshold: Option<f64>,
}

impl OrbitalOptimisationParams {
    /// Returns a builder to construct a [`OrbitalOptimisationParams`] structure.
    pub fn builder() -> OrbitalOptimisationParamsBuilder {
        OrbitalOptimisationParamsBuilder::default()
    }
}

impl Default for OrbitalOptimisationParams {
    fn default() -> Self {
        Self::builder()
            .build()
            .expect("Unable to construct a default `OrbitalOptimisationParams`.")
    }
}

impl fmt::Display for OrbitalOptimisationParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Orbital optimisation rounds: {}", self.num_iters)?;
        writeln!(f, "Gradient steps per round: {}", self.num_steps_grad)?;
        writeln!(f, "Learning rate: {:.3e}", self.learning_rate)?;
        writeln!(f, "Momentum: {:.3}", self.momentum)?;
        writeln!(
            f,
            "Energy improvement threshold: {}",
            self.convergence_threshold
                .map(|thresh| format!("{thresh:.3e}"))
                .unwrap_or_else(|| yes_no(false).to_string())
        )?;
        writeln!(f)?;
        Ok(())
    }
}

// -------
// History
// -------

/// A record of one subspace solve during orbital optimisation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrbitalOptimisationRecord {
    /// The number of descent rounds preceding this solve.
    pub iteration: usize,

    /// The total energy, including the nuclear repulsion energy.
    pub energy: f64,

    /// The expectation value of `Ŝ²`.
    pub spin_sq: f64,

    /// The norm of the energy gradient with respect to the rotation parameters.
    pub gradient_norm: f64,

    /// The norm of the rotation generator `κ`.
    pub rotation_norm: f64,

    /// The number of eigensolver cycles used.
    pub cycles: usize,
}

/// Append-only history of the solves carried out during orbital optimisation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OrbitalOptimisationHistory {
    records: Vec<OrbitalOptimisationRecord>,
}

impl OrbitalOptimisationHistory {
    /// Appends a record.
    pub fn push(&mut self, record: OrbitalOptimisationRecord) {
        self.records.push(record);
    }

    /// The records in chronological order.
    pub fn records(&self) -> &[OrbitalOptimisationRecord] {
        &self.records
    }

    /// The energy of the latest record, if any.
    pub fn last_energy(&self) -> Option<f64> {
        self.records.last().map(|record| record.energy)
    }

    /// The number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no records have been made.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl fmt::Display for OrbitalOptimisationHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", rule(ORBITAL_TABLE_WIDTH))?;
        writeln!(
            f,
            " {:>4}  {:>20}  {:>12}  {:>12}  {:>12}  {:>10}  {:>6}",
            "#", "Energy", "ΔE", "‖∇E‖", "‖κ‖", "⟨S²⟩", "Cycles"
        )?;
        writeln!(f, "{}", rule(ORBITAL_TABLE_WIDTH))?;
        let mut prev: Option<f64> = None;
        for record in self.records.iter() {
            writeln!(f, "{}", format_record(record, prev))?;
            prev = Some(record.energy);
        }
        writeln!(f, "{}", rule(ORBITAL_TABLE_WIDTH))?;
        Ok(())
    }
}

fn format_record(record: &OrbitalOptimisationRecord, prev: Option<f64>) -> String {
    format!(
        " {:>4}  {:>+20.12}  {:>12}  {:>12.3e}  {:>12.3e}  {:>10.6}  {:>6}",
        record.iteration,
        record.energy,
        prev.map(|e| format!("{:+.3e}", record.energy - e))
            .unwrap_or_else(|| "--".to_string()),
        record.gradient_norm,
        record.rotation_norm,
        record.spin_sq,
        record.cycles
    )
}

// ------
// Result
// ------

/// Structure to contain orbital optimisation results.
#[derive(Clone, Builder, Debug)]
pub struct OrbitalOptimisationResult<'a> {
    /// The control parameters used to obtain this set of orbital optimisation results.
    parameters: &'a OrbitalOptimisationParams,

    /// The total energy of the first solve, before any rotation update.
    pub initial_energy: f64,

    /// The total energy of the final solve, including the nuclear repulsion energy.
    pub energy: f64,

    /// The final orbital rotation.
    pub rotation: OrbitalRotation,

    /// The final eigenstate in the rotated orbital basis.
    pub solution: SubspaceSolution,

    /// The history of all solves.
    pub history: OrbitalOptimisationHistory,

    /// Boolean indicating if the optimisation terminated on the energy improvement threshold.
    pub converged: bool,
}

impl<'a> OrbitalOptimisationResult<'a> {
    fn builder() -> OrbitalOptimisationResultBuilder<'a> {
        OrbitalOptimisationResultBuilder::default()
    }

    /// The control parameters used to obtain this set of results.
    pub fn parameters(&self) -> &OrbitalOptimisationParams {
        self.parameters
    }
}

// ------
// Driver
// ------

/// The two working states of the orbital optimisation cycle.
enum OptimisationState {
    /// Rotate the integrals by the current `κ` and eigensolve the subspace.
    ResolveSubspace,

    /// Descend in `κ` with the density matrices of the latest state held fixed.
    RotateAndDescend {
        rdm1: Array2<f64>,
        rdm2: Array4<f64>,
        energy: f64,
        gradient: Array1<f64>,
    },

    /// Terminated.
    Done,
}

/// Driver for orbital optimisation in a fixed determinant subspace.
#[derive(Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct OrbitalOptimisationDriver<'a, S>
where
    S: SubspaceEigensolver,
{
    /// The control parameters for orbital optimisation.
    parameters: &'a OrbitalOptimisationParams,

    /// The unrotated Hamiltonian integrals.
    integrals: &'a HamiltonianIntegrals,

    /// The determinant subspace, unchanged throughout the optimisation.
    subspace: &'a DeterminantSubspace,

    /// The subspace eigensolver.
    solver: &'a S,

    /// An optional penalty on `⟨Ŝ²⟩` passed on to the eigensolver.
    #[builder(default = "None")]
    spin_constraint: Option<&'a SpinConstraint>,

    /// The largest number of eigensolver cycles per solve.
    #[builder(default = "200")]
    max_cycles: usize,

    /// The starting orbital rotation. If `None`, the identity is used.
    #[builder(default = "None")]
    initial_rotation: Option<OrbitalRotation>,

    /// The result of the orbital optimisation.
    #[builder(setter(skip), default = "None")]
    result: Option<OrbitalOptimisationResult<'a>>,
}

impl<'a, S> OrbitalOptimisationDriverBuilder<'a, S>
where
    S: SubspaceEigensolver,
{
    fn validate(&self) -> Result<(), String> {
        let params = self
            .parameters
            .ok_or("No orbital optimisation parameters found.".to_string())?;
        if !(params.learning_rate.is_finite() && params.learning_rate > 0.0) {
            return Err(format!(
                "The learning rate must be positive, but `{}` was given.",
                params.learning_rate
            ));
        }
        if !(0.0..1.0).contains(&params.momentum) {
            return Err(format!(
                "The momentum must lie in `[0, 1)`, but `{}` was given.",
                params.momentum
            ));
        }
        if params
            .convergence_threshold
            .is_some_and(|thresh| !(thresh >= 0.0))
        {
            return Err("The energy improvement threshold cannot be negative.".to_string());
        }
        if self.max_cycles == Some(0) {
            return Err("The eigensolver cycle budget must be positive.".to_string());
        }

        let integrals = self
            .integrals
            .ok_or("No Hamiltonian integrals found.".to_string())?;
        let subspace = self
            .subspace
            .ok_or("No determinant subspace found.".to_string())?;
        if subspace.norb() != integrals.norb() {
            return Err(format!(
                "The subspace spans {} orbitals but the integrals span {}.",
                subspace.norb(),
                integrals.norb()
            ));
        }
        if let Some(Some(rotation)) = self.initial_rotation.as_ref() {
            if rotation.norb() != integrals.norb() {
                return Err(format!(
                    "The initial rotation acts on {} orbitals but the integrals span {}.",
                    rotation.norb(),
                    integrals.norb()
                ));
            }
        }
        Ok(())
    }
}

impl<'a, S> OrbitalOptimisationDriver<'a, S>
where
    S: SubspaceEigensolver,
{
    /// Returns a builder to construct a [`OrbitalOptimisationDriver`] structure.
    pub fn builder() -> OrbitalOptimisationDriverBuilder<'a, S> {
        OrbitalOptimisationDriverBuilder::default()
    }

    /// Carries out `num_steps_grad` momentum descent steps from `rotation` with fixed density
    /// matrices and returns the lowest-energy rotation visited together with its energy.
    ///
    /// `energy` and `gradient` are the fixed-density electronic energy and its gradient at
    /// `rotation`.
    fn descend(
        &self,
        rotation: &OrbitalRotation,
        rdm1: &Array2<f64>,
        rdm2: &Array4<f64>,
        energy: f64,
        gradient: Array1<f64>,
    ) -> Result<(OrbitalRotation, f64), anyhow::Error> {
        let params = self.parameters;
        let mut best_energy = energy;
        let mut best = rotation.clone();
        let mut trial = rotation.clone();
        let mut velocity = Array1::<f64>::zeros(rotation.n_params());
        let mut grad = gradient;
        for step in 1..=params.num_steps_grad {
            velocity = velocity * params.momentum + &grad;
            trial.descend(&velocity, params.learning_rate);
            let (energy, new_grad) = energy_and_gradient(self.integrals, &trial, rdm1, rdm2)?;
            ensure!(
                energy.is_finite(),
                "Non-finite energy encountered at gradient step {step}."
            );
            if energy < best_energy {
                best_energy = energy;
                best = trial.clone();
            }
            grad = new_grad;
        }
        log::debug!(
            "Lowest fixed-density energy over {} gradient step(s): {best_energy:+.12}",
            params.num_steps_grad
        );
        Ok((best, best_energy))
    }

    /// Executes orbital optimisation.
    fn optimise_orbitals(&mut self) -> Result<(), anyhow::Error> {
        log_banner("Orbital Optimisation");
        qsqd_output!("");
        let params = self.parameters;
        params.log_lines();
        let enuc = self.integrals.enuc();
        let mut rotation = self
            .initial_rotation
            .clone()
            .unwrap_or_else(|| OrbitalRotation::identity(self.integrals.norb()));
        qsqd_output!("Subspace dimension: {}", self.subspace.dimension());
        qsqd_output!("Number of rotation parameters: {}", rotation.n_params());
        qsqd_output!("");
        let mut history = OrbitalOptimisationHistory::default();
        let mut solution: Option<SubspaceSolution> = None;
        let mut converged = false;
        let mut iteration = 0;

        log_heading("Alternating subspace solves and orbital descents");
        qsqd_output!("");
        qsqd_output!("{}", rule(ORBITAL_TABLE_WIDTH));
        qsqd_output!(
            " {:>4}  {:>20}  {:>12}  {:>12}  {:>12}  {:>10}  {:>6}",
            "#",
            "Energy",
            "ΔE",
            "‖∇E‖",
            "‖κ‖",
            "⟨S²⟩",
            "Cycles"
        );
        qsqd_output!("{}", rule(ORBITAL_TABLE_WIDTH));

        let mut state = OptimisationState::ResolveSubspace;
        loop {
            state = match state {
                OptimisationState::ResolveSubspace => {
                    let rotated = self.integrals.rotated(&rotation.unitary()?)?;
                    let sol = self.solver.solve(
                        self.subspace,
                        &rotated,
                        self.spin_constraint,
                        self.max_cycles,
                    )?;
                    let (rdm1, rdm2) = self.solver.calc_rdms(self.subspace, &sol)?;
                    let (fixed_energy, gradient) =
                        energy_and_gradient(self.integrals, &rotation, &rdm1, &rdm2)?;

                    let energy = sol.energy + enuc;
                    let record = OrbitalOptimisationRecord {
                        iteration,
                        energy,
                        spin_sq: sol.spin_sq,
                        gradient_norm: gradient.dot(&gradient).sqrt(),
                        rotation_norm: rotation.norm(),
                        cycles: sol.cycles,
                    };
                    let prev = history.last_energy();
                    qsqd_output!("{}", format_record(&record, prev));
                    history.push(record);
                    solution = Some(sol);

                    let below_threshold = match (params.convergence_threshold, prev) {
                        (Some(thresh), Some(prev)) => prev - energy < thresh,
                        _ => false,
                    };
                    if below_threshold {
                        converged = true;
                        OptimisationState::Done
                    } else if iteration >= params.num_iters {
                        OptimisationState::Done
                    } else {
                        OptimisationState::RotateAndDescend {
                            rdm1,
                            rdm2,
                            energy: fixed_energy,
                            gradient,
                        }
                    }
                }
                OptimisationState::RotateAndDescend {
                    rdm1,
                    rdm2,
                    energy,
                    gradient,
                } => {
                    iteration += 1;
                    let (best, _) = self.descend(&rotation, &rdm1, &rdm2, energy, gradient)?;
                    rotation = best;
                    OptimisationState::ResolveSubspace
                }
                OptimisationState::Done => break,
            };
        }
        qsqd_output!("{}", rule(ORBITAL_TABLE_WIDTH));
        qsqd_output!("");

        let solution = solution.ok_or_else(|| format_err!("No subspace solution obtained."))?;
        let initial_energy = history
            .records()
            .first()
            .map(|record| record.energy)
            .ok_or_else(|| format_err!("No orbital optimisation history recorded."))?;
        let energy = solution.energy + enuc;
        if energy > initial_energy + ENERGY_RISE_TOLERANCE {
            qsqd_warn!(
                "Orbital optimisation raised the energy from {initial_energy:+.12} to {energy:+.12}."
            );
        }
        qsqd_output!("Initial energy: {initial_energy:+.12}");
        qsqd_output!("Final energy  : {energy:+.12}");
        qsqd_output!(
            "Terminated on energy improvement threshold: {}",
            yes_no(converged)
        );
        qsqd_output!("");
        rotation.log_lines();
        qsqd_output!("");

        self.result = Some(
            OrbitalOptimisationResult::builder()
                .parameters(self.parameters)
                .initial_energy(initial_energy)
                .energy(energy)
                .rotation(rotation)
                .solution(solution)
                .history(history)
                .converged(converged)
                .build()?,
        );
        Ok(())
    }
}

impl<'a, S> QSqdDriver for OrbitalOptimisationDriver<'a, S>
where
    S: SubspaceEigensolver,
{
    type Params = OrbitalOptimisationParams;

    type Outcome = OrbitalOptimisationResult<'a>;

    fn result(&self) -> Result<&Self::Outcome, anyhow::Error> {
        self.result
            .as_ref()
            .ok_or_else(|| format_err!("No orbital optimisation results found."))
    }

    fn run(&mut self) -> Result<(), anyhow::Error> {
        self.optimise_orbitals()
    }
}
