//! Determinant subspaces spanned by sampled configurations.
//!
//! A subspace is the Cartesian product of a set of α determinant strings and a set of β
//! determinant strings. Both sets are kept sorted in ascending order of their integer value, so
//! the product basis index of the determinant `(α_i, β_j)` is `i × |β| + j`.

use std::collections::BTreeSet;
use std::fmt;

use anyhow;
use serde::{Deserialize, Serialize};

use crate::error::SqdError;
use crate::io::format::write_heading;
use crate::samples::bitstring::{BitstringMatrix, DetString};

#[cfg(test)]
#[path = "subspace_tests.rs"]
mod subspace_tests;

/// A determinant subspace given by sorted unique α and β strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterminantSubspace {
    /// The number of spatial orbitals.
    norb: usize,

    /// The sorted unique α strings.
    alpha_strings: Vec<DetString>,

    /// The sorted unique β strings.
    beta_strings: Vec<DetString>,
}

impl DeterminantSubspace {
    /// Constructs a subspace from arbitrary collections of α and β strings, which are sorted and
    /// deduplicated.
    pub fn new<A, B>(norb: usize, alpha_strings: A, beta_strings: B) -> Self
    where
        A: IntoIterator<Item = DetString>,
        B: IntoIterator<Item = DetString>,
    {
        Self {
            norb,
            alpha_strings: alpha_strings
                .into_iter()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            beta_strings: beta_strings
                .into_iter()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        }
    }

    /// Builds the subspace spanned by the α and β halves of every row of a batch.
    ///
    /// # Arguments
    ///
    /// * `batch` - The batch of bitstrings.
    /// * `symmetrise_spin` - Boolean indicating if both spin sectors should use the union of the
    /// α and β strings.
    /// * `n_up` - The number of α electrons.
    /// * `n_dn` - The number of β electrons.
    ///
    /// # Errors
    ///
    /// [`SqdError::Configuration`] if spin symmetrisation is requested with `n_up ≠ n_dn`.
    pub fn from_batch(
        batch: &BitstringMatrix,
        symmetrise_spin: bool,
        n_up: usize,
        n_dn: usize,
    ) -> Result<Self, anyhow::Error> {
        let subspace = Self::new(
            batch.norb(),
            (0..batch.n_rows()).map(|i| batch.alpha_string(i)),
            (0..batch.n_rows()).map(|i| batch.beta_string(i)),
        );
        if symmetrise_spin {
            subspace.symmetrise_spin(n_up, n_dn)
        } else {
            Ok(subspace)
        }
    }

    /// Returns a subspace in which both spin sectors use the union of the α and β strings.
    ///
    /// # Errors
    ///
    /// [`SqdError::Configuration`] if `n_up ≠ n_dn`.
    pub fn symmetrise_spin(&self, n_up: usize, n_dn: usize) -> Result<Self, anyhow::Error> {
        if n_up != n_dn {
            return Err(SqdError::Configuration(format!(
                "Spin symmetrisation requires equal α and β electron counts, but ({n_up}, {n_dn}) \
                was given."
            ))
            .into());
        }
        let all = self
            .alpha_strings
            .iter()
            .chain(self.beta_strings.iter())
            .copied()
            .collect::<Vec<_>>();
        Ok(Self::new(self.norb, all.clone(), all))
    }

    /// Merges several subspaces into one spanning all their α and β strings. Returns `None` if
    /// the iterator is empty.
    ///
    /// # Errors
    ///
    /// [`SqdError::Configuration`] if the subspaces span different numbers of orbitals.
    pub fn union<'a, I>(subspaces: I) -> Result<Option<Self>, anyhow::Error>
    where
        I: IntoIterator<Item = &'a DeterminantSubspace>,
    {
        let subspaces = subspaces.into_iter().collect::<Vec<_>>();
        let Some(first) = subspaces.first() else {
            return Ok(None);
        };
        if subspaces.iter().any(|s| s.norb != first.norb) {
            return Err(SqdError::Configuration(
                "Unable to merge subspaces over different numbers of orbitals.".to_string(),
            )
            .into());
        }
        Ok(Some(Self::new(
            first.norb,
            subspaces
                .iter()
                .flat_map(|s| s.alpha_strings.iter().copied()),
            subspaces
                .iter()
                .flat_map(|s| s.beta_strings.iter().copied()),
        )))
    }

    /// The number of spatial orbitals.
    pub fn norb(&self) -> usize {
        self.norb
    }

    /// The sorted α strings.
    pub fn alpha_strings(&self) -> &[DetString] {
        &self.alpha_strings
    }

    /// The sorted β strings.
    pub fn beta_strings(&self) -> &[DetString] {
        &self.beta_strings
    }

    /// The dimension `|α| × |β|` of the product basis.
    pub fn dimension(&self) -> usize {
        self.alpha_strings.len() * self.beta_strings.len()
    }

    /// The product basis index of the determinant `(α_ia, β_ib)`.
    pub fn index(&self, ia: usize, ib: usize) -> usize {
        ia * self.beta_strings.len() + ib
    }
}

impl fmt::Display for DeterminantSubspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_heading(f, "Determinant subspace")?;
        writeln!(f, "Number of orbitals: {}", self.norb)?;
        writeln!(f, "Number of α strings: {}", self.alpha_strings.len())?;
        writeln!(f, "Number of β strings: {}", self.beta_strings.len())?;
        writeln!(f, "Dimension: {}", self.dimension())?;
        Ok(())
    }
}
