//! Self-consistent configuration recovery.
//!
//! Noisy bitstrings whose Hamming weight in a spin sector differs from the target electron count
//! are corrected by flipping bits, with the flip probability of each orbital driven by how far
//! its sampled value lies from the current occupancy estimate. Without an occupancy estimate
//! (the first round), recovery is the identity and postselection does all the filtering.

use anyhow::{self, format_err};
use log;
use ndarray::ArrayView1;
use rand::seq::index::sample_weighted;
use rand::Rng;

use crate::error::SqdError;
use crate::samples::bitstring::{Bitstring, BitstringMatrix};
use crate::samples::occupancy::OrbitalOccupancies;

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod recovery_tests;

/// Floor weight of the modified-ReLU flip weighting.
const FLIP_EPSILON: f64 = 0.01;

/// Modified-ReLU weight for flipping a bit whose sampled value lies a distance `d ∈ [0, 1]`
/// from the estimated occupancy of its orbital.
///
/// Below the sector filling `filling` the weight rises linearly from `0` to [`FLIP_EPSILON`];
/// above it, it rises linearly from [`FLIP_EPSILON`] to `1`.
///
/// # Arguments
///
/// * `d` - The distance `|bit − occupancy|`.
/// * `filling` - The target filling `n / norb` of the spin sector.
pub fn flip_weight(d: f64, filling: f64) -> f64 {
    if filling <= 0.0 {
        return FLIP_EPSILON + (1.0 - FLIP_EPSILON) * d;
    }
    if filling >= 1.0 || d < filling {
        FLIP_EPSILON * d / filling
    } else {
        FLIP_EPSILON + (1.0 - FLIP_EPSILON) * (d - filling) / (1.0 - filling)
    }
}

/// Corrects a set of bitstrings toward the target Hamming weights.
///
/// # Arguments
///
/// * `bitstrings` - The full table of raw bitstrings.
/// * `occupancies` - The occupancy estimate from the previous round, or `None` in the first
/// round.
/// * `n_up` - The target number of α electrons.
/// * `n_dn` - The target number of β electrons.
/// * `rng` - The random source.
///
/// # Returns
///
/// A new table with the same number of rows and the same weights as `bitstrings`.
pub fn recover_configurations<R: Rng + ?Sized>(
    bitstrings: &BitstringMatrix,
    occupancies: Option<&OrbitalOccupancies>,
    n_up: usize,
    n_dn: usize,
    rng: &mut R,
) -> Result<BitstringMatrix, anyhow::Error> {
    let norb = bitstrings.norb();
    if n_up > norb || n_dn > norb {
        return Err(SqdError::Configuration(format!(
            "Target electron counts ({n_up}, {n_dn}) exceed the number of orbitals {norb}."
        ))
        .into());
    }
    let Some(occupancies) = occupancies else {
        log::debug!("No occupancy estimate available: configuration recovery skipped.");
        return Ok(bitstrings.clone());
    };
    if occupancies.norb() != norb {
        return Err(SqdError::Configuration(format!(
            "Occupancies span {} orbitals but bitstrings span {norb}.",
            occupancies.norb()
        ))
        .into());
    }

    let mut n_corrected = 0usize;
    let rows = bitstrings
        .rows()
        .iter()
        .map(|row| {
            let mut new_row = row.clone();
            let flipped_a = correct_sector(&mut new_row, 0, occupancies.alpha.view(), n_up, rng)?;
            let flipped_b =
                correct_sector(&mut new_row, norb, occupancies.beta.view(), n_dn, rng)?;
            if flipped_a + flipped_b > 0 {
                n_corrected += 1;
            }
            Ok(new_row)
        })
        .collect::<Result<Vec<_>, anyhow::Error>>()?;
    log::debug!(
        "Configuration recovery corrected {n_corrected} of {} bitstring(s).",
        bitstrings.n_rows()
    );
    BitstringMatrix::new(norb, rows, bitstrings.weights().to_vec())
}

/// Corrects in place the spin sector of `row` starting at bit `offset` and returns the number of
/// flipped bits.
fn correct_sector<R: Rng + ?Sized>(
    row: &mut Bitstring,
    offset: usize,
    occupancies: ArrayView1<f64>,
    target: usize,
    rng: &mut R,
) -> Result<usize, anyhow::Error> {
    let norb = occupancies.len();
    let n = row[offset..offset + norb].count_ones();
    if n == target {
        return Ok(0);
    }
    let filling = target as f64 / norb as f64;

    // Bits that can move the weight toward the target: occupied ones if there are too many
    // electrons, empty ones otherwise.
    let flip_from = n > target;
    let n_flips = n.abs_diff(target);
    let (candidates, weights): (Vec<usize>, Vec<f64>) = (0..norb)
        .filter(|&i| row[offset + i] == flip_from)
        .map(|i| {
            let bit = if flip_from { 1.0 } else { 0.0 };
            (i, flip_weight((bit - occupancies[i]).abs(), filling))
        })
        .filter(|(_, w)| *w > 0.0)
        .unzip();

    let amount = n_flips.min(candidates.len());
    if amount == 0 {
        return Ok(0);
    }
    let chosen = sample_weighted(rng, candidates.len(), |k| weights[k], amount)
        .map_err(|err| format_err!("Unable to draw bits to flip: {err}"))?;
    chosen.iter().for_each(|k| {
        row.set(offset + candidates[k], !flip_from);
    });
    Ok(amount)
}
