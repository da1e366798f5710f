//! Hamming-weight postselection of bitstring tables.

use anyhow;
use log;

use crate::error::SqdError;
use crate::samples::bitstring::BitstringMatrix;

#[cfg(test)]
#[path = "postselection_tests.rs"]
mod postselection_tests;

/// Keeps only the rows whose α and β halves have exactly the target Hamming weights.
///
/// The weights of the surviving rows are renormalised to sum to `1`. If all surviving weights
/// are zero, they are replaced by a uniform distribution.
///
/// # Arguments
///
/// * `bitstrings` - The table to be postselected.
/// * `n_up` - The required α Hamming weight.
/// * `n_dn` - The required β Hamming weight.
/// * `round` - The configuration-recovery round, used for error reporting.
///
/// # Errors
///
/// [`SqdError::EmptySubspace`] if no row survives.
pub fn postselect_by_hamming_weight(
    bitstrings: &BitstringMatrix,
    n_up: usize,
    n_dn: usize,
    round: usize,
) -> Result<BitstringMatrix, anyhow::Error> {
    let kept = (0..bitstrings.n_rows())
        .filter(|&i| bitstrings.hamming_weights(i) == (n_up, n_dn))
        .collect::<Vec<_>>();
    if kept.is_empty() {
        return Err(SqdError::EmptySubspace {
            round,
            n_rows: bitstrings.n_rows(),
        }
        .into());
    }

    let total = kept.iter().map(|&i| bitstrings.weights()[i]).sum::<f64>();
    let weights = if total > 0.0 {
        kept.iter()
            .map(|&i| bitstrings.weights()[i] / total)
            .collect::<Vec<_>>()
    } else {
        vec![1.0 / kept.len() as f64; kept.len()]
    };
    log::debug!(
        "Postselection kept {} of {} bitstring(s) with Hamming weights ({n_up}, {n_dn}).",
        kept.len(),
        bitstrings.n_rows()
    );
    bitstrings.select(&kept, Some(weights))
}
