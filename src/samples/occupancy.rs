//! Per-orbital occupancy estimates.

use std::fmt;

use anyhow::{self, ensure};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Tolerance for occupancies falling marginally outside `[0, 1]` due to round-off.
const OCCUPANCY_SLACK: f64 = 1e-8;

/// Estimated occupation of every spatial orbital, separately for each spin sector.
///
/// Every entry lies in `[0, 1]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrbitalOccupancies {
    /// Occupancies of the α orbitals.
    pub alpha: Array1<f64>,

    /// Occupancies of the β orbitals.
    pub beta: Array1<f64>,
}

impl OrbitalOccupancies {
    /// Constructs an occupancy estimate, clamping round-off excursions into `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Errors if the two vectors have different lengths or if any entry lies outside `[0, 1]` by
    /// more than round-off.
    pub fn new(alpha: Array1<f64>, beta: Array1<f64>) -> Result<Self, anyhow::Error> {
        ensure!(
            alpha.len() == beta.len(),
            "Mismatched α ({}) and β ({}) occupancy lengths.",
            alpha.len(),
            beta.len()
        );
        ensure!(
            alpha
                .iter()
                .chain(beta.iter())
                .all(|x| x.is_finite() && *x >= -OCCUPANCY_SLACK && *x <= 1.0 + OCCUPANCY_SLACK),
            "Orbital occupancies must lie in [0, 1]."
        );
        Ok(Self {
            alpha: alpha.mapv(|x| x.clamp(0.0, 1.0)),
            beta: beta.mapv(|x| x.clamp(0.0, 1.0)),
        })
    }

    /// The number of spatial orbitals.
    pub fn norb(&self) -> usize {
        self.alpha.len()
    }

    /// Arithmetic mean of a collection of occupancy estimates. Returns `None` if the collection
    /// is empty.
    pub fn average<'a, I>(occupancies: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a OrbitalOccupancies>,
    {
        let mut iter = occupancies.into_iter();
        let first = iter.next()?;
        let (alpha, beta, n) = iter.fold(
            (first.alpha.clone(), first.beta.clone(), 1usize),
            |(alpha, beta, n), occ| (alpha + &occ.alpha, beta + &occ.beta, n + 1),
        );
        let nf = n as f64;
        Some(Self {
            alpha: alpha / nf,
            beta: beta / nf,
        })
    }
}

impl fmt::Display for OrbitalOccupancies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>5}  {:>10}  {:>10}", "Orb.", "n(α)", "n(β)")?;
        for (i, (a, b)) in self.alpha.iter().zip(self.beta.iter()).enumerate() {
            writeln!(f, "{i:>5}  {a:>10.6}  {b:>10.6}")?;
        }
        Ok(())
    }
}
