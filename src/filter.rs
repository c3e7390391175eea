//! C4 (part 2) — the membership filter `F`.
//!
//! An MPHF over the key set addresses a separate, fixed-width
//! fingerprint array: false positives occur at the expected
//! `2^-width` rate, false negatives never occur for a key that was in
//! the build set, since a member's own fingerprint is written at its
//! own slot by construction. Unlike `Mphf`'s own optional validation
//! layer (which reuses the MPHF's key-derived fingerprint seed), this
//! module owns an independent array so that filter width can be tuned
//! without touching the dictionary that addresses it.

use crate::bitio::BitPackedArray;
use crate::error::{BuildError, DecodeError};
use crate::hash;
use crate::mphf::{BuildConfig, Builder, Mphf, ValidationMode};

/// Fingerprint width in bits, trading memory for false-positive rate
/// (`fpr ~= 2^-width`). Mirrors the widths the MPHF's own validation
/// layer supports, minus `None` (a filter without fingerprints isn't a
/// filter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterWidth {
    Bits6,
    Bits8,
    Bits10,
    Bits12,
    Bits14,
    Bits16,
}

impl FilterWidth {
    pub fn bits(self) -> u32 {
        match self {
            FilterWidth::Bits6 => 6,
            FilterWidth::Bits8 => 8,
            FilterWidth::Bits10 => 10,
            FilterWidth::Bits12 => 12,
            FilterWidth::Bits14 => 14,
            FilterWidth::Bits16 => 16,
        }
    }
}

/// Seed distinguishing the filter's fingerprint stream from the MPHF's
/// own optional validation fingerprints, so the two never collide when
/// a caller builds both over the same key set.
const FILTER_FP_SEED: u32 = 0x4653_4c54; // "FSLT"

/// Every `CHECKPOINT_INTERVAL`-th slot's running popcount of "is this
/// slot a real member" is recorded, letting a caller binary-search an
/// approximate rank without scanning the whole array. Optional: a
/// filter built with `checkpoints: false` omits this entirely.
const CHECKPOINT_INTERVAL: usize = 128;

#[derive(Debug, Clone)]
pub struct FilterOptions {
    pub width: FilterWidth,
    pub checkpoints: bool,
    pub mphf_config: BuildConfig,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            width: FilterWidth::Bits10,
            checkpoints: false,
            mphf_config: BuildConfig {
                validation_mode: ValidationMode::None,
                ..Default::default()
            },
        }
    }
}

/// The membership filter: an MPHF plus an independent fingerprint
/// array, with an optional rank checkpoint table.
#[derive(Debug, Clone)]
pub struct Filter {
    mphf: Mphf,
    width: u32,
    fingerprints: BitPackedArray,
    checkpoints: Option<Vec<u32>>,
}

impl Filter {
    pub fn len(&self) -> usize {
        self.mphf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mphf.is_empty()
    }

    /// `true` iff `key` was present in the build set, modulo the
    /// `2^-width` false-positive rate; never a false negative for a
    /// genuine member.
    pub fn has(&self, key: &str) -> bool {
        let slot = self.mphf.hash(key);
        if slot < 0 {
            return false;
        }
        let expect = fingerprint(key, self.width);
        self.fingerprints.get(slot as usize) == expect
    }

    /// The number of member slots at or before `slot`, computed from
    /// the checkpoint table when present; `None` when the filter was
    /// built without checkpoints.
    pub fn rank_hint(&self, slot: usize) -> Option<u32> {
        self.checkpoints.as_ref().map(|cps| cps[slot / CHECKPOINT_INTERVAL])
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let mphf_bytes = self.mphf.to_bytes();
        out.extend_from_slice(&(mphf_bytes.len() as u32).to_be_bytes());
        out.extend_from_slice(&mphf_bytes);
        out.extend_from_slice(&self.width.to_be_bytes());
        let fp_bytes = self.fingerprints.as_bytes();
        out.extend_from_slice(&(fp_bytes.len() as u32).to_be_bytes());
        out.extend_from_slice(fp_bytes);
        match &self.checkpoints {
            Some(cps) => {
                out.push(1);
                out.extend_from_slice(&(cps.len() as u32).to_be_bytes());
                for &c in cps {
                    out.extend_from_slice(&c.to_be_bytes());
                }
            }
            None => out.push(0),
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut pos = 0usize;
        let mphf_len = read_u32(bytes, &mut pos)? as usize;
        let mphf_bytes = take(bytes, &mut pos, mphf_len)?;
        let mphf = Mphf::from_bytes(mphf_bytes)?;

        let width = read_u32(bytes, &mut pos)?;
        let fp_len = read_u32(bytes, &mut pos)? as usize;
        let fp_bytes = take(bytes, &mut pos, fp_len)?.to_vec();
        let fingerprints = BitPackedArray::from_raw(fp_bytes, mphf.len(), width)?;

        let has_checkpoints = *bytes.get(pos).ok_or(DecodeError::UnexpectedEof)?;
        pos += 1;
        let checkpoints = if has_checkpoints == 1 {
            let count = read_u32(bytes, &mut pos)? as usize;
            let mut cps = Vec::with_capacity(count);
            for _ in 0..count {
                cps.push(read_u32(bytes, &mut pos)?);
            }
            Some(cps)
        } else {
            None
        };

        Ok(Filter {
            mphf,
            width,
            fingerprints,
            checkpoints,
        })
    }
}

fn read_u32(bytes: &[u8], pos: &mut usize) -> Result<u32, DecodeError> {
    let slice = bytes.get(*pos..*pos + 4).ok_or(DecodeError::UnexpectedEof)?;
    *pos += 4;
    Ok(u32::from_be_bytes(slice.try_into().unwrap()))
}

fn take<'a>(bytes: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8], DecodeError> {
    let slice = bytes.get(*pos..*pos + len).ok_or(DecodeError::UnexpectedEof)?;
    *pos += len;
    Ok(slice)
}

#[inline]
fn fingerprint(key: &str, width: u32) -> u64 {
    (hash::hash_str(key, FILTER_FP_SEED) as u64) & ((1u64 << width) - 1)
}

pub struct FilterBuilder {
    options: FilterOptions,
}

impl Default for FilterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self {
            options: FilterOptions::default(),
        }
    }

    pub fn with_options(mut self, options: FilterOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self, keys: &[&str]) -> Result<Filter, BuildError> {
        let mphf = Builder::new().with_config(self.options.mphf_config).build(keys)?;
        let width = self.options.width.bits();
        let n = mphf.len();
        let mut fingerprints = BitPackedArray::with_capacity(n, width);
        for key in keys {
            let slot = mphf.hash(key);
            debug_assert!(slot >= 0, "every build key must evaluate to a valid slot");
            fingerprints.set(slot as usize, fingerprint(key, width));
        }

        let checkpoints = if self.options.checkpoints && n > 0 {
            let mut cps = Vec::with_capacity(n.div_ceil(CHECKPOINT_INTERVAL));
            let mut running = 0u32;
            for i in 0..n {
                if i % CHECKPOINT_INTERVAL == 0 {
                    cps.push(running);
                }
                // Every slot below `n` was written by the loop above, so
                // membership here is unconditional.
                running += 1;
            }
            Some(cps)
        } else {
            None
        };

        Ok(Filter {
            mphf,
            width,
            fingerprints,
            checkpoints,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fruit_keys() -> Vec<&'static str> {
        vec!["apple", "banana", "cherry", "date", "elderberry", "fig", "grape"]
    }

    #[test]
    fn members_always_pass() {
        let keys = fruit_keys();
        let filter = FilterBuilder::new().build(&keys).unwrap();
        for k in &keys {
            assert!(filter.has(k));
        }
    }

    #[test]
    fn non_members_mostly_rejected_at_wide_width() {
        let keys = fruit_keys();
        let options = FilterOptions {
            width: FilterWidth::Bits16,
            ..Default::default()
        };
        let filter = FilterBuilder::new().with_options(options).build(&keys).unwrap();
        let mut false_positives = 0;
        let trials = 500;
        for i in 0..trials {
            let probe = format!("not-a-fruit-{i}");
            if filter.has(&probe) {
                false_positives += 1;
            }
        }
        assert!((false_positives as f64 / trials as f64) < 0.01);
    }

    #[test]
    fn round_trip_preserves_membership() {
        let keys = fruit_keys();
        let options = FilterOptions {
            checkpoints: true,
            ..Default::default()
        };
        let filter = FilterBuilder::new().with_options(options).build(&keys).unwrap();
        let bytes = filter.to_bytes();
        let back = Filter::from_bytes(&bytes).unwrap();
        for k in &keys {
            assert!(back.has(k));
        }
        assert!(!back.has("kumquat"));
        assert_eq!(filter.rank_hint(0), back.rank_hint(0));
    }

    #[test]
    fn empty_filter_rejects_everything() {
        let filter = FilterBuilder::new().build(&[]).unwrap();
        assert!(filter.is_empty());
        assert!(!filter.has("anything"));
    }
}
