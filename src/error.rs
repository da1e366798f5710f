//! Error types raised by the SQD pipeline.

use std::error::Error;
use std::fmt;

/// Enumerated type for the failure modes of the SQD pipeline.
///
/// These are wrapped into [`anyhow::Error`] when propagated and can be recovered with
/// [`anyhow::Error::downcast_ref`].
#[derive(Debug, Clone, PartialEq)]
pub enum SqdError {
    /// No bitstring survived Hamming-weight postselection in a configuration-recovery round.
    EmptySubspace {
        /// The configuration-recovery round in which postselection came up empty.
        round: usize,

        /// The number of rows before postselection.
        n_rows: usize,
    },

    /// The iterative eigensolver did not converge within its cycle budget.
    EigensolveNonConvergence {
        /// The number of cycles carried out.
        cycles: usize,

        /// The residual norm at the last cycle.
        residual: f64,
    },

    /// Every batch of a configuration-recovery round failed to be eigensolved.
    AllBatchesFailed {
        /// The configuration-recovery round.
        round: usize,

        /// The number of batches attempted.
        n_batches: usize,
    },

    /// The rotation generator deviates from antisymmetry beyond the correctable tolerance.
    AntisymmetryViolation {
        /// The largest deviation `|κ_pq + κ_qp|` found.
        deviation: f64,

        /// The tolerance that was exceeded.
        tolerance: f64,
    },

    /// Inconsistent input parameters.
    Configuration(String),
}

impl fmt::Display for SqdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySubspace { round, n_rows } => write!(
                f,
                "Empty subspace error: none of the {n_rows} bitstring(s) in round {round} \
                satisfies the target Hamming weights."
            ),
            Self::EigensolveNonConvergence { cycles, residual } => write!(
                f,
                "Eigensolve non-convergence: residual norm {residual:.3e} after {cycles} cycle(s)."
            ),
            Self::AllBatchesFailed { round, n_batches } => write!(
                f,
                "All {n_batches} batch(es) failed to be eigensolved in round {round}."
            ),
            Self::AntisymmetryViolation {
                deviation,
                tolerance,
            } => write!(
                f,
                "Antisymmetry violation: maximum deviation {deviation:.3e} exceeds {tolerance:.3e}."
            ),
            Self::Configuration(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl Error for SqdError {}
