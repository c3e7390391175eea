//! C2 — the MPHF builder and evaluator.
//!
//! Builds a two-level bucketed displacement table over a duplicate-free
//! string set (the normative, scramble-based variant; see `SPEC_FULL.md`
//! §4) and evaluates it in O(1). The builder moves through four phases —
//! pre-hash, bucketing, displacement, optional fingerprinting — any of
//! which can fail fatally and non-recoverably; evaluation of a
//! successfully built dictionary never fails.

use crate::bitio::{self, BitPackedArray, BitSet};
use crate::codec::{CborReader, CborWriter};
use crate::error::{BuildError, DecodeError};
use crate::hash::{self, PreHash};

/// Fingerprint width for the MPHF's own optional validation layer
/// (`onlySet` in the factory options). `None` means no validation: the
/// evaluator returns an in-range slot for any input, member or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    #[default]
    None,
    Bits2,
    Bits4,
    Bits8,
    Bits16,
    Bits32,
}

impl ValidationMode {
    pub fn width(self) -> Option<u32> {
        match self {
            ValidationMode::None => None,
            ValidationMode::Bits2 => Some(2),
            ValidationMode::Bits4 => Some(4),
            ValidationMode::Bits8 => Some(8),
            ValidationMode::Bits16 => Some(16),
            ValidationMode::Bits32 => Some(32),
        }
    }

    /// `modeInt` mapping used by the wire format: `{none:0, 4:1, 8:2, 16:3, 32:4, 2:5}`.
    fn to_tag(self) -> u64 {
        match self {
            ValidationMode::None => 0,
            ValidationMode::Bits4 => 1,
            ValidationMode::Bits8 => 2,
            ValidationMode::Bits16 => 3,
            ValidationMode::Bits32 => 4,
            ValidationMode::Bits2 => 5,
        }
    }

    fn from_tag(tag: u64) -> Result<Self, DecodeError> {
        match tag {
            0 => Ok(ValidationMode::None),
            1 => Ok(ValidationMode::Bits4),
            2 => Ok(ValidationMode::Bits8),
            3 => Ok(ValidationMode::Bits16),
            4 => Ok(ValidationMode::Bits32),
            5 => Ok(ValidationMode::Bits2),
            other => Err(DecodeError::UnknownMode(other)),
        }
    }
}

/// Tunables that are *not* part of the public per-call factory surface
/// (`MphfOptions` in `lookup`/`filter` and the crate root) — these are
/// the internal dials a caller can override via `Builder::with_config`,
/// mirroring the teacher's own `Builder::new().with_config(cfg)` chain.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Target `n/m` ratio. `1..=10`; larger means fewer, bigger buckets.
    pub level: u8,
    /// Candidate `seed0` draws in Phase 1.
    pub attempts: u32,
    /// Phase 1 stops immediately once a trial's max bucket size drops
    /// below this.
    pub early_exit_below: usize,
    /// Once this many attempts have run, Phase 1 may stop early if the
    /// best trial so far is already feasible (max bucket size <= 15).
    pub bucketing_early_exit_attempts: u32,
    /// Phase 0 tries `hashSeed` in `0..=hash_seed_attempts`.
    pub hash_seed_attempts: u32,
    /// Phase 2 per-bucket trial cap for buckets of size <= 14.
    pub max_seed_attempts_small: u64,
    /// Phase 2 per-bucket trial cap for buckets of size > 14 (i.e. 15).
    pub max_seed_attempts_large: u64,
    /// Fingerprint width for the MPHF's own validation layer.
    pub validation_mode: ValidationMode,
    /// Score Phase 1 candidates with a `rayon` parallel iterator instead
    /// of scanning serially with early exit. Has no effect without the
    /// `parallel` feature.
    pub parallel_bucketing: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            level: 5,
            attempts: 2000,
            early_exit_below: 13,
            bucketing_early_exit_attempts: 50,
            hash_seed_attempts: 100,
            max_seed_attempts_small: 5_000_000,
            max_seed_attempts_large: 50_000_000,
            validation_mode: ValidationMode::None,
            parallel_bucketing: false,
        }
    }
}

/// The MPHF dictionary `D`: immutable once built or decoded, freely
/// shareable across threads for read-only access.
#[derive(Debug, Clone)]
pub struct Mphf {
    n: u32,
    m: u32,
    hash_seed: u32,
    seed0: u32,
    bucket_sizes: Vec<u8>,
    /// Reconstructed at build/decode time (Phase 3); never serialized.
    offsets: Vec<u32>,
    /// Expanded per-bucket displacement seeds, length `m`; never
    /// serialized directly (derived from `seedStream` + the zero bitmap).
    seeds: Vec<u32>,
    seed_zero_bitmap: BitSet,
    validation_mode: ValidationMode,
    fingerprints: Option<BitPackedArray>,
}

impl Mphf {
    /// `n`: the key-set cardinality this dictionary was built over.
    pub fn len(&self) -> usize {
        self.n as usize
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn validation_mode(&self) -> ValidationMode {
        self.validation_mode
    }

    fn empty(validation_mode: ValidationMode) -> Self {
        Self {
            n: 0,
            m: 0,
            hash_seed: 0,
            seed0: 0,
            bucket_sizes: Vec::new(),
            offsets: vec![0],
            seeds: Vec::new(),
            seed_zero_bitmap: BitSet::new(0),
            validation_mode,
            fingerprints: validation_mode.width().map(|w| BitPackedArray::with_capacity(0, w)),
        }
    }

    /// Evaluates `key`. Returns `[0, n)` on a genuine member (or, with
    /// validation off, any in-range value for a non-member); returns
    /// `-1` when validation is on and the fingerprint mismatches, or
    /// when the dictionary is empty.
    pub fn hash(&self, key: &str) -> i64 {
        if self.m == 0 {
            return -1;
        }
        let pre = PreHash::compute(key, self.hash_seed);
        let b = hash::reduce_range(hash::scramble(pre.h1, self.seed0) ^ pre.h2, self.m) as usize;
        let bucket_size = (self.offsets[b + 1] - self.offsets[b]) as usize;
        if bucket_size == 0 {
            return -1;
        }
        let result = if bucket_size == 1 {
            self.offsets[b]
        } else {
            let seed = self.seeds[b];
            let in_bucket = (hash::scramble(pre.h1, seed) ^ pre.h2) as u64 % bucket_size as u64;
            self.offsets[b] + in_bucket as u32
        };

        if let Some(w) = self.validation_mode.width() {
            let fp = self
                .fingerprints
                .as_ref()
                .expect("fingerprints present whenever validation_mode is set")
                .get(result as usize);
            let expect = fingerprint_value(key, w);
            if fp != expect {
                return -1;
            }
        }
        result as i64
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = CborWriter::new();
        w.array_head(9);
        w.uint(self.n as u64);
        w.uint(self.m as u64);
        w.uint(self.seed0 as u64);
        w.bytes(&bitio::pack_nibbles(&self.bucket_sizes));
        w.bytes(&self.encode_seed_stream());
        w.uint(self.validation_mode.to_tag());
        match &self.fingerprints {
            Some(fp) => w.bytes(fp.as_bytes()),
            None => w.null(),
        }
        if self.m == 0 {
            w.null();
        } else {
            w.bytes(&self.seed_zero_bitmap.to_bytes());
        }
        w.uint(self.hash_seed as u64);
        w.into_bytes()
    }

    fn encode_seed_stream(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for b in 0..self.m as usize {
            if !self.seed_zero_bitmap.test(b) {
                bitio::write_varint(&mut out, self.seeds[b] as u64);
            }
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = CborReader::new(bytes);
        let arity = r.array_head()?;
        if arity != 9 {
            return Err(DecodeError::BadArity {
                expected: 9,
                found: arity as usize,
            });
        }
        let n = r.uint()? as u32;
        let m = r.uint()? as u32;
        let seed0 = r.uint()? as u32;
        let bucket_sizes_packed = r.bytes()?;
        let bucket_sizes = bitio::unpack_nibbles(&bucket_sizes_packed, m as usize)?;

        let mut offsets = vec![0u32; m as usize + 1];
        for i in 0..m as usize {
            offsets[i + 1] = offsets[i] + bucket_sizes[i] as u32;
        }
        if offsets[m as usize] != n {
            return Err(DecodeError::BucketSizeSumMismatch {
                expected: n as usize,
                got: offsets[m as usize] as usize,
            });
        }

        let seed_stream_bytes = r.bytes()?;
        let mode_tag = r.uint()?;
        let validation_mode = ValidationMode::from_tag(mode_tag)?;
        let fingerprints_bytes = r.bytes_or_null()?;
        let seed_zero_bytes = r.bytes_or_null()?;
        let hash_seed = r.uint()? as u32;

        let seed_zero_bitmap = match seed_zero_bytes {
            Some(bytes) => BitSet::from_bytes(&bytes, m as usize)?,
            None => BitSet::new(m as usize),
        };

        let mut seeds = vec![0u32; m as usize];
        let mut pos = 0usize;
        for b in 0..m as usize {
            if !seed_zero_bitmap.test(b) {
                seeds[b] = bitio::read_varint(&seed_stream_bytes, &mut pos)? as u32;
            }
        }

        let fingerprints = match (validation_mode.width(), fingerprints_bytes) {
            (Some(w), Some(bytes)) => {
                let expected_len = ((n as usize) * (w as usize)).div_ceil(8);
                if bytes.len() != expected_len {
                    return Err(DecodeError::FingerprintLengthMismatch {
                        expected: expected_len,
                        got: bytes.len(),
                    });
                }
                Some(BitPackedArray::from_raw(bytes, n as usize, w)?)
            }
            (None, None) => None,
            _ => {
                return Err(DecodeError::FingerprintPresenceMismatch { mode: mode_tag });
            }
        };

        Ok(Mphf {
            n,
            m,
            hash_seed,
            seed0,
            bucket_sizes,
            offsets,
            seeds,
            seed_zero_bitmap,
            validation_mode,
            fingerprints,
        })
    }
}

#[inline]
fn fingerprint_value(key: &str, width: u32) -> u64 {
    (hash::hash_str(key, hash::FP_SEED) as u64) & ((1u64 << width) - 1)
}

/// Builds an [`Mphf`] over a duplicate-free key set.
pub struct Builder {
    cfg: BuildConfig,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Self {
            cfg: BuildConfig::default(),
        }
    }

    pub fn with_config(mut self, cfg: BuildConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Builds the dictionary. `keys` must be pairwise distinct; the core
    /// makes no attempt to deduplicate (see `spec.md`'s Non-goals) — a
    /// duplicate will either be caught as a Phase 0 hash collision or
    /// silently shrink the reachable range, which is the caller's
    /// responsibility to avoid.
    pub fn build(self, keys: &[&str]) -> Result<Mphf, BuildError> {
        let n = keys.len();
        if n == 0 {
            return Ok(Mphf::empty(self.cfg.validation_mode));
        }

        let hash_seed = find_hash_seed(keys, self.cfg.hash_seed_attempts)?;
        let prehashes: Vec<PreHash> = keys.iter().map(|k| PreHash::compute(k, hash_seed)).collect();

        let mut level = self.cfg.level as f64;
        if n > 500_000 {
            level *= 0.9;
        }
        let level = level.max(1.0);
        let m = ((n as f64 / level).ceil() as u32).max(1);

        let (seed0, buckets) = find_seed0(&prehashes, m, &self.cfg)?;
        let bucket_sizes: Vec<u8> = buckets.iter().map(|b| b.len() as u8).collect();

        let mut seeds = vec![0u32; m as usize];
        let mut seed_zero_bitmap = BitSet::new(m as usize);

        for (b, members) in buckets.iter().enumerate() {
            let k = members.len();
            if k <= 1 {
                seed_zero_bitmap.set(b);
                continue;
            }
            let cap = if k <= 14 {
                self.cfg.max_seed_attempts_small
            } else {
                self.cfg.max_seed_attempts_large
            };
            let seed = find_displacement_seed(&prehashes, members, k, cap)
                .ok_or(BuildError::DisplacementExhausted { bucket: b, size: k })?;
            if seed == 0 {
                seed_zero_bitmap.set(b);
            } else {
                seeds[b] = seed;
            }
        }

        let mut offsets = vec![0u32; m as usize + 1];
        for i in 0..m as usize {
            offsets[i + 1] = offsets[i] + bucket_sizes[i] as u32;
        }

        let mut dict = Mphf {
            n: n as u32,
            m,
            hash_seed,
            seed0,
            bucket_sizes,
            offsets,
            seeds,
            seed_zero_bitmap,
            validation_mode: self.cfg.validation_mode,
            fingerprints: None,
        };

        // Break the fingerprint/slot cyclic dependency: evaluate each key
        // against the fingerprint-less dictionary first, then fill the
        // fingerprint array at the slots that evaluation just produced.
        if let Some(w) = self.cfg.validation_mode.width() {
            let mut fp = BitPackedArray::with_capacity(n, w);
            for key in keys {
                let slot = dict.hash(key);
                debug_assert!(slot >= 0, "every build key must evaluate to a valid slot");
                fp.set(slot as usize, fingerprint_value(key, w));
            }
            dict.fingerprints = Some(fp);
        }

        Ok(dict)
    }
}

fn find_hash_seed(keys: &[&str], attempts: u32) -> Result<u32, BuildError> {
    for seed in 0..=attempts {
        let mut seen: hashbrown::HashSet<(u32, u32), ahash::RandomState> =
            hashbrown::HashSet::with_capacity_and_hasher(keys.len(), ahash::RandomState::new());
        let mut collided = false;
        for key in keys {
            let pre = PreHash::compute(key, seed);
            if !seen.insert((pre.h1, pre.h2)) {
                collided = true;
                break;
            }
        }
        if !collided {
            return Ok(seed);
        }
    }
    Err(BuildError::HashSeedExhausted {
        attempts: attempts + 1,
    })
}

fn assign_buckets(prehashes: &[PreHash], seed0: u32, m: u32) -> Vec<Vec<u32>> {
    let mut buckets = vec![Vec::new(); m as usize];
    for (i, ph) in prehashes.iter().enumerate() {
        let b = hash::reduce_range(hash::scramble(ph.h1, seed0) ^ ph.h2, m) as usize;
        buckets[b].push(i as u32);
    }
    buckets
}

/// Deterministically derives the `attempt`-th `seed0` candidate from a
/// fixed base constant, FNV-mixed with the attempt index — the same
/// shape as the teacher's `mix_salt`, scaled to 32 bits.
fn candidate_seed0(attempt: u32) -> u32 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut h = FNV_OFFSET ^ 0x9E37_79B9_7F4A_7C15u64;
    h ^= attempt as u64;
    h = h.wrapping_mul(FNV_PRIME);
    (h ^ (h >> 33)) as u32
}

fn find_seed0(
    prehashes: &[PreHash],
    m: u32,
    cfg: &BuildConfig,
) -> Result<(u32, Vec<Vec<u32>>), BuildError> {
    #[cfg(feature = "parallel")]
    if cfg.parallel_bucketing {
        return find_seed0_parallel(prehashes, m, cfg);
    }
    find_seed0_serial(prehashes, m, cfg)
}

fn find_seed0_serial(
    prehashes: &[PreHash],
    m: u32,
    cfg: &BuildConfig,
) -> Result<(u32, Vec<Vec<u32>>), BuildError> {
    let mut best: Option<(u32, Vec<Vec<u32>>, usize)> = None;
    let mut attempts_tried = 0u32;

    for attempt in 0..cfg.attempts {
        attempts_tried = attempt + 1;
        let seed0 = candidate_seed0(attempt);
        let buckets = assign_buckets(prehashes, seed0, m);
        let max_size = buckets.iter().map(|b| b.len()).max().unwrap_or(0);

        let improves = best.as_ref().map(|(_, _, best_max)| max_size < *best_max).unwrap_or(true);
        if improves {
            best = Some((seed0, buckets, max_size));
        }
        let current_max = best.as_ref().unwrap().2;
        if current_max < cfg.early_exit_below {
            break;
        }
        if attempts_tried >= cfg.bucketing_early_exit_attempts && current_max <= 15 {
            break;
        }
    }

    let (seed0, buckets, max_size) = best.expect("at least one attempt always runs");
    if max_size > 15 {
        return Err(BuildError::BucketOverflow {
            best_max: max_size,
            level: cfg.level,
            attempts: attempts_tried,
        });
    }
    Ok((seed0, buckets))
}

#[cfg(feature = "parallel")]
fn find_seed0_parallel(
    prehashes: &[PreHash],
    m: u32,
    cfg: &BuildConfig,
) -> Result<(u32, Vec<Vec<u32>>), BuildError> {
    use rayon::prelude::*;

    let results: Vec<(u32, Vec<Vec<u32>>, usize)> = (0..cfg.attempts)
        .into_par_iter()
        .map(|attempt| {
            let seed0 = candidate_seed0(attempt);
            let buckets = assign_buckets(prehashes, seed0, m);
            let max_size = buckets.iter().map(|b| b.len()).max().unwrap_or(0);
            (seed0, buckets, max_size)
        })
        .collect();

    let (idx, (seed0, buckets, max_size)) = results
        .into_iter()
        .enumerate()
        .min_by_key(|(i, (_, _, max))| (*max, *i))
        .expect("attempts is always > 0");
    let _ = idx;

    if max_size > 15 {
        return Err(BuildError::BucketOverflow {
            best_max: max_size,
            level: cfg.level,
            attempts: cfg.attempts,
        });
    }
    Ok((seed0, buckets))
}

/// Phase 2 for one bucket: search `s = 0, 1, 2, ...` until
/// `{ (S(h1,s) ^ h2) mod k : i in bucket }` is a permutation of `[0,k)`.
fn find_displacement_seed(
    prehashes: &[PreHash],
    members: &[u32],
    k: usize,
    cap: u64,
) -> Option<u32> {
    let mut visited = BitSet::new(k);
    let mut s: u64 = 0;
    while s < cap {
        visited.clear_all();
        let mut ok = true;
        for &idx in members {
            let ph = prehashes[idx as usize];
            let pos = (hash::scramble(ph.h1, s as u32) ^ ph.h2) as u64 % k as u64;
            if visited.test(pos as usize) {
                ok = false;
                break;
            }
            visited.set(pos as usize);
        }
        if ok {
            return Some(s as u32);
        }
        s += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fruit_keys() -> Vec<&'static str> {
        vec!["apple", "banana", "cherry", "date", "elderberry"]
    }

    #[test]
    fn s1_fruit_set_is_perfect_and_minimal() {
        let keys = fruit_keys();
        let dict = Builder::new().build(&keys).unwrap();
        let mut seen = vec![false; keys.len()];
        for k in &keys {
            let h = dict.hash(k);
            assert!((0..keys.len() as i64).contains(&h), "out of range: {h}");
            assert!(!seen[h as usize], "collision at {h}");
            seen[h as usize] = true;
        }
        assert!(seen.iter().all(|&b| b));
    }

    #[test]
    fn s2_validation_rejects_most_non_members() {
        let keys = fruit_keys();
        let cfg = BuildConfig {
            validation_mode: ValidationMode::Bits16,
            ..Default::default()
        };
        let dict = Builder::new().with_config(cfg).build(&keys).unwrap();
        for k in &keys {
            assert!((0..5).contains(&dict.hash(k)));
        }
        let mut misses = 0;
        let mut trials = 0;
        for i in 0..200 {
            let probe = format!("not-a-fruit-{i}");
            trials += 1;
            if dict.hash(&probe) == -1 {
                misses += 1;
            }
        }
        // Expect the overwhelming majority of 16-bit-validated probes to miss.
        assert!(misses as f64 / trials as f64 > 0.95);
    }

    #[test]
    fn s3_empty_set_round_trips_and_always_misses() {
        let dict = Builder::new().build(&[]).unwrap();
        assert_eq!(dict.hash("anything"), -1);
        let bytes = dict.to_bytes();
        let back = Mphf::from_bytes(&bytes).unwrap();
        assert_eq!(back.hash("anything"), -1);
        assert!(back.is_empty());
    }

    #[test]
    fn round_trip_preserves_evaluation_on_a_larger_set() {
        let owned: Vec<String> = (0..500).map(|i| format!("key-{i}")).collect();
        let keys: Vec<&str> = owned.iter().map(|s| s.as_str()).collect();
        let dict = Builder::new().build(&keys).unwrap();
        let bytes = dict.to_bytes();
        let back = Mphf::from_bytes(&bytes).unwrap();
        for k in &keys {
            assert_eq!(dict.hash(k), back.hash(k));
        }
    }

    #[test]
    fn bucket_sizes_never_exceed_fifteen_and_sum_to_n() {
        let owned: Vec<String> = (0..3000).map(|i| format!("item-{i}")).collect();
        let keys: Vec<&str> = owned.iter().map(|s| s.as_str()).collect();
        let dict = Builder::new().build(&keys).unwrap();
        assert_eq!(dict.bucket_sizes.iter().map(|&c| c as u32).sum::<u32>(), keys.len() as u32);
        assert!(dict.bucket_sizes.iter().all(|&c| c <= 15));
    }

    #[test]
    fn decode_rejects_bad_arity() {
        let mut w = CborWriter::new();
        w.array_head(3);
        w.uint(0);
        w.uint(0);
        w.uint(0);
        let bytes = w.into_bytes();
        assert!(matches!(
            Mphf::from_bytes(&bytes),
            Err(DecodeError::BadArity { expected: 9, found: 3 })
        ));
    }

    #[test]
    fn validation_mode_tag_round_trips() {
        for mode in [
            ValidationMode::None,
            ValidationMode::Bits2,
            ValidationMode::Bits4,
            ValidationMode::Bits8,
            ValidationMode::Bits16,
            ValidationMode::Bits32,
        ] {
            assert_eq!(ValidationMode::from_tag(mode.to_tag()).unwrap(), mode);
        }
    }
}
