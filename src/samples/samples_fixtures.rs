use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::samples::bitstring::{compose_bitstring, BitstringMatrix};

/// Bitstrings containing every configuration with the right electron counts, plus a random
/// share of configurations with wrong counts.
pub(crate) fn noisy_samples(norb: usize, n_up: u32, n_dn: u32, seed: u64) -> BitstringMatrix {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rows = vec![];
    let mut weights = vec![];
    for alpha in 0..(1u128 << norb) {
        for beta in 0..(1u128 << norb) {
            let correct = alpha.count_ones() == n_up && beta.count_ones() == n_dn;
            let weight = if correct {
                rng.gen_range(1.0..10.0)
            } else if rng.gen_bool(0.3) {
                rng.gen_range(0.5..5.0)
            } else {
                continue;
            };
            rows.push(compose_bitstring(norb, alpha, beta));
            weights.push(weight);
        }
    }
    BitstringMatrix::new(norb, rows, weights).unwrap()
}
