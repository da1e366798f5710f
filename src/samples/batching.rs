//! Batched subsampling of postselected bitstring tables.

use std::fmt;

use anyhow::{self, ensure, format_err};
use derive_builder::Builder;
use log;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::index::sample_weighted;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::SqdError;
use crate::io::format::yes_no;
use crate::samples::bitstring::BitstringMatrix;
use crate::samples::random::RandomSource;

#[cfg(test)]
#[path = "batching_tests.rs"]
mod batching_tests;

// ----------
// Parameters
// ----------

fn default_num_batches() -> usize {
    1
}
fn default_samples_per_batch() -> usize {
    300
}
fn default_true() -> bool {
    true
}

/// Structure containing control parameters for batched subsampling.
#[derive(Clone, Builder, Debug, PartialEq, Serialize, Deserialize)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct BatchSamplingParams {
    /// The number of batches drawn in every configuration-recovery round.
    #[builder(default = "1")]
    #[serde(default = "default_num_batches")]
    pub num_batches: usize,

    /// The number of rows drawn into every batch.
    #[builder(default = "300")]
    #[serde(default = "default_samples_per_batch")]
    pub samples_per_batch: usize,

    /// Boolean indicating if rows are drawn with replacement. When drawing without replacement,
    /// the number of rows in a batch is capped by the number of rows with non-zero weight.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub with_replacement: bool,
}

impl BatchSamplingParamsBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.num_batches == Some(0) {
            return Err("The number of batches must be positive.".to_string());
        }
        if self.samples_per_batch == Some(0) {
            return Err("The number of samples per batch must be positive.".to_string());
        }
        Ok(())
    }
}

impl BatchSamplingParams {
    /// Returns a builder to construct a [`BatchSamplingParams`] structure.
    pub fn builder() -> BatchSamplingParamsBuilder {
        BatchSamplingParamsBuilder::default()
    }
}

impl Default for BatchSamplingParams {
    fn default() -> Self {
        Self::builder()
            .build()
            .expect("Unable to construct a default `BatchSamplingParams`.")
    }
}

impl fmt::Display for BatchSamplingParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Number of batches: {}", self.num_batches)?;
        writeln!(f, "Samples per batch: {}", self.samples_per_batch)?;
        writeln!(
            f,
            "Sampling with replacement: {}",
            yes_no(self.with_replacement)
        )?;
        Ok(())
    }
}

// ---------
// Functions
// ---------

/// Draws `num_batches` weighted subsamples from a bitstring table.
///
/// Every batch is drawn from its own stream derived from `random`, so batches are drawn in
/// parallel and a fixed seed reproduces the same batches.
///
/// # Arguments
///
/// * `bitstrings` - The postselected table to be subsampled.
/// * `params` - The batching parameters.
/// * `random` - The master random source.
///
/// # Returns
///
/// The batches, each keeping the original weights of its rows.
pub fn sample_batches(
    bitstrings: &BitstringMatrix,
    params: &BatchSamplingParams,
    random: &mut RandomSource,
) -> Result<Vec<BitstringMatrix>, anyhow::Error> {
    if params.num_batches == 0 || params.samples_per_batch == 0 {
        return Err(SqdError::Configuration(
            "Batch sampling requires positive batch counts and sizes.".to_string(),
        )
        .into());
    }
    ensure!(
        !bitstrings.is_empty(),
        "Unable to draw batches from an empty bitstring table."
    );
    let streams = random.derive_streams(params.num_batches);
    let batches = streams
        .into_par_iter()
        .map(|mut rng| draw_batch(bitstrings, params, &mut rng))
        .collect::<Result<Vec<_>, _>>()?;
    log::debug!(
        "Drew {} batch(es) of sizes {:?}.",
        batches.len(),
        batches.iter().map(|b| b.n_rows()).collect::<Vec<_>>()
    );
    Ok(batches)
}

/// Draws one batch from `bitstrings` using `rng`.
fn draw_batch(
    bitstrings: &BitstringMatrix,
    params: &BatchSamplingParams,
    rng: &mut StdRng,
) -> Result<BitstringMatrix, anyhow::Error> {
    let weights = bitstrings.weights();
    let indices = if params.with_replacement {
        let dist = WeightedIndex::new(weights)
            .map_err(|err| format_err!("Unable to set up weighted row sampling: {err}"))?;
        (0..params.samples_per_batch)
            .map(|_| dist.sample(rng))
            .collect::<Vec<_>>()
    } else {
        let positive = (0..bitstrings.n_rows())
            .filter(|&i| weights[i] > 0.0)
            .collect::<Vec<_>>();
        ensure!(
            !positive.is_empty(),
            "No row with a positive weight is available for sampling."
        );
        let amount = params.samples_per_batch.min(positive.len());
        sample_weighted(rng, positive.len(), |k| weights[positive[k]], amount)
            .map_err(|err| format_err!("Unable to draw rows without replacement: {err}"))?
            .iter()
            .map(|k| positive[k])
            .collect::<Vec<_>>()
    };
    bitstrings.select(&indices, None)
}
