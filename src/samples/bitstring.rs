//! Containers for measured occupation bitstrings.

use std::fmt;

use anyhow::{self, ensure};
use bitvec::prelude::*;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::SqdError;
use crate::io::format::write_heading;

#[cfg(test)]
#[path = "bitstring_tests.rs"]
mod bitstring_tests;

/// The largest number of spatial orbitals whose determinant strings fit in a [`DetString`].
pub const MAX_NORB: usize = 128;

/// An occupation bitstring of length `2 × norb`.
///
/// Bit `i < norb` encodes the occupation of the spin-up (α) orbital `i`, and bit `norb + i` that
/// of the spin-down (β) orbital `i`.
pub type Bitstring = BitVec<u8, Lsb0>;

/// A determinant string for a single spin sector: bit `i` is set if orbital `i` is occupied.
pub type DetString = u128;

/// Composes a full bitstring from an α and a β determinant string.
///
/// # Arguments
///
/// * `norb` - The number of spatial orbitals.
/// * `alpha` - The α determinant string.
/// * `beta` - The β determinant string.
///
/// # Returns
///
/// The bitstring of length `2 × norb`.
pub fn compose_bitstring(norb: usize, alpha: DetString, beta: DetString) -> Bitstring {
    let mut row = bitvec![u8, Lsb0; 0; 2 * norb];
    (0..norb).for_each(|i| {
        row.set(i, (alpha >> i) & 1 == 1);
        row.set(norb + i, (beta >> i) & 1 == 1);
    });
    row
}

/// A table of measured bitstrings with a parallel vector of non-negative weights.
///
/// The weights are either probabilities or relative counts. Tables are never mutated once
/// constructed: every pipeline stage produces a new derived table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BitstringMatrix {
    /// The number of spatial orbitals.
    norb: usize,

    /// The bitstring rows, each of length `2 × norb`.
    rows: Vec<Bitstring>,

    /// The weights aligned with [`Self::rows`].
    weights: Vec<f64>,
}

impl BitstringMatrix {
    /// Constructs a bitstring table after validating its shape and weights.
    ///
    /// # Arguments
    ///
    /// * `norb` - The number of spatial orbitals.
    /// * `rows` - The bitstring rows.
    /// * `weights` - The non-negative weights of the rows.
    ///
    /// # Errors
    ///
    /// A [`SqdError::Configuration`] error if `norb` is zero or larger than [`MAX_NORB`], if the
    /// rows and weights have different lengths, if any row does not have length `2 × norb`, or if
    /// any weight is negative or not finite.
    pub fn new(norb: usize, rows: Vec<Bitstring>, weights: Vec<f64>) -> Result<Self, anyhow::Error> {
        if norb == 0 || norb > MAX_NORB {
            return Err(SqdError::Configuration(format!(
                "The number of orbitals must lie in `1..={MAX_NORB}`, but `{norb}` was given."
            ))
            .into());
        }
        if rows.len() != weights.len() {
            return Err(SqdError::Configuration(format!(
                "Mismatched numbers of bitstrings ({}) and weights ({}).",
                rows.len(),
                weights.len()
            ))
            .into());
        }
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != 2 * norb) {
            return Err(SqdError::Configuration(format!(
                "Bitstring {i} has length {} instead of {}.",
                row.len(),
                2 * norb
            ))
            .into());
        }
        if let Some((i, w)) = weights
            .iter()
            .enumerate()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(SqdError::Configuration(format!(
                "Bitstring {i} has an invalid weight `{w}`."
            ))
            .into());
        }
        Ok(Self {
            norb,
            rows,
            weights,
        })
    }

    /// Converts a sampler outcome map into a bitstring table.
    ///
    /// The text of each key follows the usual sampler ordering: the right-most character is bit
    /// `0`, so the right half of the text holds the α occupations and the left half the β
    /// occupations. The row order follows the insertion order of the map.
    ///
    /// # Arguments
    ///
    /// * `norb` - The number of spatial orbitals.
    /// * `counts` - The map from bitstring text to counts or probabilities.
    pub fn from_counts(norb: usize, counts: &IndexMap<String, f64>) -> Result<Self, anyhow::Error> {
        let rows = counts
            .keys()
            .map(|text| parse_bitstring(norb, text))
            .collect::<Result<Vec<_>, _>>()?;
        let weights = counts.values().copied().collect::<Vec<_>>();
        Self::new(norb, rows, weights)
    }

    /// Converts this table back into an ordered map from bitstring text to accumulated weight.
    /// Duplicated rows have their weights summed.
    pub fn to_counts(&self) -> IndexMap<String, f64> {
        let mut counts = IndexMap::<String, f64>::new();
        (0..self.n_rows()).for_each(|i| {
            *counts.entry(self.bitstring_text(i)).or_insert(0.0) += self.weights[i];
        });
        counts
    }

    /// The number of spatial orbitals.
    pub fn norb(&self) -> usize {
        self.norb
    }

    /// The number of rows in this table.
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if this table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The bitstring rows.
    pub fn rows(&self) -> &[Bitstring] {
        &self.rows
    }

    /// The row weights.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// The sum of all row weights.
    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }

    /// Returns the α determinant string of row `i`.
    pub fn alpha_string(&self, i: usize) -> DetString {
        self.rows[i][..self.norb].load_le::<DetString>()
    }

    /// Returns the β determinant string of row `i`.
    pub fn beta_string(&self, i: usize) -> DetString {
        self.rows[i][self.norb..].load_le::<DetString>()
    }

    /// Returns the α and β Hamming weights of row `i`.
    pub fn hamming_weights(&self, i: usize) -> (usize, usize) {
        let row = &self.rows[i];
        (row[..self.norb].count_ones(), row[self.norb..].count_ones())
    }

    /// Returns row `i` as text, with bit `0` as the right-most character.
    pub fn bitstring_text(&self, i: usize) -> String {
        self.rows[i]
            .iter()
            .rev()
            .map(|bit| if *bit { '1' } else { '0' })
            .collect()
    }

    /// Constructs a new table from a selection of rows of this table. Indices may repeat.
    ///
    /// # Arguments
    ///
    /// * `indices` - The indices of the rows to be selected, in order.
    /// * `weights` - Optional replacement weights for the selected rows. If `None`, the weights
    /// of the selected rows are kept.
    pub fn select(
        &self,
        indices: &[usize],
        weights: Option<Vec<f64>>,
    ) -> Result<Self, anyhow::Error> {
        ensure!(
            indices.iter().all(|&i| i < self.n_rows()),
            "Row selection out of bounds for a table with {} rows.",
            self.n_rows()
        );
        let rows = indices.iter().map(|&i| self.rows[i].clone()).collect();
        let weights = weights.unwrap_or_else(|| indices.iter().map(|&i| self.weights[i]).collect());
        Self::new(self.norb, rows, weights)
    }
}

impl fmt::Display for BitstringMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_heading(f, &format!("Bitstring table ({} rows)", self.n_rows()))?;
        let width = 2 * self.norb;
        writeln!(f, "{:>width$}  {:>12}", "Bitstring", "Weight")?;
        for i in 0..self.n_rows() {
            writeln!(f, "{:>width$}  {:>12.6e}", self.bitstring_text(i), self.weights[i])?;
        }
        Ok(())
    }
}

/// Parses a bitstring text of length `2 × norb` whose right-most character is bit `0`.
fn parse_bitstring(norb: usize, text: &str) -> Result<Bitstring, anyhow::Error> {
    if text.chars().count() != 2 * norb {
        return Err(SqdError::Configuration(format!(
            "Bitstring `{text}` does not have the expected length {}.",
            2 * norb
        ))
        .into());
    }
    text.chars()
        .rev()
        .map(|c| match c {
            '0' => Ok(false),
            '1' => Ok(true),
            _ => Err(SqdError::Configuration(format!(
                "Bitstring `{text}` contains the invalid character `{c}`."
            ))
            .into()),
        })
        .collect::<Result<Bitstring, anyhow::Error>>()
}
