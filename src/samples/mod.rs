//! Measured bitstring samples and the stochastic stages that process them.
//!
//! A raw [`bitstring::BitstringMatrix`] passes through configuration recovery
//! ([`recovery`]), Hamming-weight postselection ([`postselection`]) and batched subsampling
//! ([`batching`]) in every configuration-recovery round. None of these stages mutates its input.

pub mod batching;
pub mod bitstring;
pub mod occupancy;
pub mod postselection;
pub mod random;
pub mod recovery;

#[cfg(test)]
#[path = "samples_fixtures.rs"]
pub(crate) mod samples_fixtures;
