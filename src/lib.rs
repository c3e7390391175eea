//! mphf_core — minimal perfect hashing, reverse lookup, and membership
//! filtering over string key sets.
//!
//! - [`Mphf`]: build once on a duplicate-free key set, then evaluate any
//!   key to `[0, n)` in O(1); optionally validated against non-members
//!   via an embedded fingerprint layer.
//! - [`Lookup`]: the inverse direction — recover the owning key(s) of a
//!   value out of a `key -> value[]` multi-map.
//! - [`Filter`]: approximate membership testing with zero false
//!   negatives, tunable false-positive rate.
//!
//! All three serialize to a compact binary form and can optionally be
//! gzip-wrapped via [`compress`] for storage or transport.

mod bitio;
mod codec;
mod compress;
mod cpu;
mod error;
mod filter;
mod hash;
mod lookup;
mod mphf;

pub use compress::{gunzip, gzip};
pub use cpu::{detect_features, CpuFeatures};
pub use error::{BuildError, DecodeError};
pub use filter::{Filter, FilterBuilder, FilterOptions, FilterWidth};
pub use lookup::{Lookup, LookupBuilder, MultiMapEntry};
pub use mphf::{BuildConfig, Builder, Mphf, ValidationMode};

/// Builds an [`Mphf`] over `keys` using the defaults `BuildConfig`
/// would pick for the current host (via [`detect_features`]), then
/// gzip-compresses its serialized form. Mirrors the factory-wrapper
/// surface the JSON/WASM bindings expose as `MphfOptions`-driven
/// `toCompressed`/`fromCompressed`.
pub fn build_compressed(keys: &[&str]) -> Result<Vec<u8>, BuildError> {
    let cfg = detect_features().optimal_config();
    let dict = Builder::new().with_config(cfg).build(keys)?;
    Ok(gzip(&dict.to_bytes()))
}

/// Decodes an [`Mphf`] from the gzip-wrapped bytes produced by
/// [`build_compressed`] (or by any other caller of `Mphf::to_bytes`
/// followed by [`gzip`]).
pub fn from_compressed(bytes: &[u8]) -> Result<Mphf, DecodeError> {
    let raw = gunzip(bytes)?;
    Mphf::from_bytes(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_compressed_round_trips() {
        let keys = ["alpha", "beta", "gamma", "delta"];
        let compressed = build_compressed(&keys).unwrap();
        let dict = from_compressed(&compressed).unwrap();
        let mut seen = vec![false; keys.len()];
        for k in &keys {
            let h = dict.hash(k);
            assert!((0..keys.len() as i64).contains(&h));
            seen[h as usize] = true;
        }
        assert!(seen.iter().all(|&b| b));
    }
}
