//! C4 (part 1) — the reverse-lookup dictionary `L`.
//!
//! Compresses a multi-map `key -> value[]` so that a consumer can
//! recover the owning key(s) from any value using only an MPHF over the
//! value universe plus a compact key-assignment table. The builder
//! picks between two representations (§3/§4.4): a hybrid
//! direct-index-plus-collision-map form when fewer than 10% of distinct
//! values are shared by more than one key, and a sorted-hash-per-key
//! form otherwise.

use crate::bitio::{self, BitPackedArray, BitReader, BitWriter};
use crate::error::{BuildError, DecodeError};
use crate::mphf::{BuildConfig, Builder, Mphf, ValidationMode};
use std::collections::BTreeMap;

type Hasher = ahash::RandomState;
type HashMap<K, V> = hashbrown::HashMap<K, V, Hasher>;

/// One dictionary key together with the values it owns, as supplied to
/// [`LookupBuilder::build`].
pub type MultiMapEntry<'a> = (&'a str, Vec<&'a str>);

enum LookupRepr {
    /// Fewer than 10% of values are multiply-owned: each value's MPHF
    /// slot stores its owning key index directly, with a sentinel
    /// (`keys.len()`) marking the rare multiply-owned slots, whose true
    /// owners live in `collision_map`.
    Hybrid {
        bits_per_key: u32,
        value_to_key_indexes: BitPackedArray,
        collision_map: BTreeMap<u32, Vec<u32>>,
    },
    /// 10% or more of values are multiply-owned: each key stores the
    /// sorted list of MPHF slots of the values it owns, and queries go
    /// through an inverted index built once at construction time.
    Sparse {
        key_to_hashes: Vec<Vec<u32>>,
        inverted: HashMap<u32, Vec<u32>>,
    },
}

/// The reverse-lookup dictionary: immutable once built or decoded.
pub struct Lookup {
    mphf: Mphf,
    keys: Vec<String>,
    repr: LookupRepr,
}

impl Lookup {
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Returns the first owning key of `value`, or `None` if `value`
    /// never appeared in any key's value list at build time.
    pub fn query(&self, value: &str) -> Option<&str> {
        let h = self.mphf.hash(value);
        if h < 0 {
            return None;
        }
        let h = h as u32;
        match &self.repr {
            LookupRepr::Hybrid {
                value_to_key_indexes,
                collision_map,
                ..
            } => {
                let key_idx = value_to_key_indexes.get(h as usize);
                if key_idx == self.keys.len() as u64 {
                    collision_map
                        .get(&h)
                        .and_then(|owners| owners.first())
                        .map(|&i| self.keys[i as usize].as_str())
                } else {
                    Some(self.keys[key_idx as usize].as_str())
                }
            }
            LookupRepr::Sparse { inverted, .. } => inverted
                .get(&h)
                .and_then(|owners| owners.first())
                .map(|&i| self.keys[i as usize].as_str()),
        }
    }

    /// Returns every owning key of `value`, or `None` if `value` was
    /// never seen at build time (note: this is `None`, not `Some(vec![])` —
    /// a value genuinely present with zero owners cannot occur).
    pub fn query_all(&self, value: &str) -> Option<Vec<&str>> {
        let h = self.mphf.hash(value);
        if h < 0 {
            return None;
        }
        let h = h as u32;
        match &self.repr {
            LookupRepr::Hybrid {
                value_to_key_indexes,
                collision_map,
                ..
            } => {
                let key_idx = value_to_key_indexes.get(h as usize);
                if key_idx == self.keys.len() as u64 {
                    collision_map
                        .get(&h)
                        .map(|owners| owners.iter().map(|&i| self.keys[i as usize].as_str()).collect())
                } else {
                    Some(vec![self.keys[key_idx as usize].as_str()])
                }
            }
            LookupRepr::Sparse { inverted, .. } => inverted
                .get(&h)
                .map(|owners| owners.iter().map(|&i| self.keys[i as usize].as_str()).collect()),
        }
    }

    /// The hand-rolled framing from `spec.md` §4.3: a length-prefixed
    /// embedded MPHF, a length-prefixed key table, then either the
    /// hybrid or sparse tail, selected by a `u32::MAX` marker.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();

        let mphf_bytes = self.mphf.to_bytes();
        out.extend_from_slice(&(mphf_bytes.len() as u32).to_be_bytes());
        out.extend_from_slice(&mphf_bytes);

        out.extend_from_slice(&(self.keys.len() as u32).to_be_bytes());
        for key in &self.keys {
            let utf8 = key.as_bytes();
            out.extend_from_slice(&(utf8.len() as u32).to_be_bytes());
            out.extend_from_slice(utf8);
        }

        match &self.repr {
            LookupRepr::Hybrid {
                bits_per_key,
                value_to_key_indexes,
                collision_map,
            } => {
                out.extend_from_slice(&0xFFFF_FFFFu32.to_be_bytes());
                out.extend_from_slice(&bits_per_key.to_be_bytes());
                let data = value_to_key_indexes.as_bytes();
                out.extend_from_slice(&(data.len() as u32).to_be_bytes());
                out.extend_from_slice(data);

                let collision_bytes = encode_collision_map(collision_map);
                out.extend_from_slice(&(collision_bytes.len() as u32).to_be_bytes());
                out.extend_from_slice(&collision_bytes);
            }
            LookupRepr::Sparse { key_to_hashes, .. } => {
                let body = encode_key_to_hashes(key_to_hashes);
                out.extend_from_slice(&(body.len() as u32).to_be_bytes());
                out.extend_from_slice(&body);
            }
        }

        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut pos = 0usize;
        let mphf_len = read_u32(bytes, &mut pos)? as usize;
        let mphf_bytes = take(bytes, &mut pos, mphf_len)?;
        let mphf = Mphf::from_bytes(mphf_bytes)?;

        let key_count = read_u32(bytes, &mut pos)? as usize;
        let mut keys = Vec::with_capacity(key_count);
        for index in 0..key_count {
            let len = read_u32(bytes, &mut pos)? as usize;
            let raw = take(bytes, &mut pos, len)?.to_vec();
            let key = String::from_utf8(raw).map_err(|source| DecodeError::InvalidKeyUtf8 { index, source })?;
            keys.push(key);
        }

        let marker = read_u32(bytes, &mut pos)?;
        let repr = if marker == 0xFFFF_FFFF {
            let bits_per_key = read_u32(bytes, &mut pos)?;
            let data_len = read_u32(bytes, &mut pos)? as usize;
            let data = take(bytes, &mut pos, data_len)?.to_vec();
            let n = mphf.len();
            let value_to_key_indexes = BitPackedArray::from_raw(data, n, bits_per_key)?;

            let collision_bytes_len = read_u32(bytes, &mut pos)? as usize;
            let collision_bytes = take(bytes, &mut pos, collision_bytes_len)?;
            let collision_map = decode_collision_map(collision_bytes)?;

            LookupRepr::Hybrid {
                bits_per_key,
                value_to_key_indexes,
                collision_map,
            }
        } else {
            // `marker` doubles as the Mode 0 body length.
            let body = take(bytes, &mut pos, marker as usize)?;
            let key_to_hashes = decode_key_to_hashes(body, key_count)?;
            let inverted = build_inverted_index(&key_to_hashes);
            LookupRepr::Sparse {
                key_to_hashes,
                inverted,
            }
        };

        Ok(Lookup { mphf, keys, repr })
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

fn delta_encode_sorted(sorted: &[u32]) -> Vec<u8> {
    let mut writer = BitWriter::new();
    let mut prev = 0u32;
    let mut max_delta = 0u32;
    let deltas: Vec<u32> = sorted
        .iter()
        .map(|&v| {
            let d = v - prev;
            prev = v;
            max_delta = max_delta.max(d);
            d
        })
        .collect();
    let width = bitio::bits_for_max_value(max_delta as u64);

    let mut out = Vec::new();
    bitio::write_varint(&mut out, sorted.len() as u64);
    out.push(width as u8);
    for d in deltas {
        writer.push_bits(d as u64, width);
    }
    out.extend(writer.into_bytes());
    out
}

fn delta_decode_list(bytes: &[u8], pos: &mut usize) -> Result<Vec<u32>, DecodeError> {
    let count = bitio::read_varint(bytes, pos)? as usize;
    if count == 0 {
        let width = *bytes.get(*pos).ok_or(DecodeError::UnexpectedEof)?;
        *pos += 1;
        let _ = width;
        return Ok(Vec::new());
    }
    let width = *bytes.get(*pos).ok_or(DecodeError::UnexpectedEof)? as u32;
    *pos += 1;
    let packed_bytes = (count * width as usize).div_ceil(8);
    let packed = take(bytes, pos, packed_bytes)?;
    let mut reader = BitReader::new(packed);
    let mut out = Vec::with_capacity(count);
    let mut prev = 0u32;
    for _ in 0..count {
        let d = reader.read_bits(width)? as u32;
        prev += d;
        out.push(prev);
    }
    Ok(out)
}

fn encode_key_to_hashes(key_to_hashes: &[Vec<u32>]) -> Vec<u8> {
    let mut out = Vec::new();
    for list in key_to_hashes {
        out.extend(delta_encode_sorted(list));
    }
    out
}

fn decode_key_to_hashes(bytes: &[u8], key_count: usize) -> Result<Vec<Vec<u32>>, DecodeError> {
    let mut pos = 0usize;
    let mut out = Vec::with_capacity(key_count);
    for _ in 0..key_count {
        out.push(delta_decode_list(bytes, &mut pos)?);
    }
    Ok(out)
}

fn encode_collision_map(map: &BTreeMap<u32, Vec<u32>>) -> Vec<u8> {
    let mut out = Vec::new();
    bitio::write_varint(&mut out, map.len() as u64);
    let mut prev_hash = 0u32;
    for (&hash, owners) in map {
        bitio::write_varint(&mut out, (hash - prev_hash) as u64);
        prev_hash = hash;
        out.extend(delta_encode_sorted(owners));
    }
    out
}

fn decode_collision_map(bytes: &[u8]) -> Result<BTreeMap<u32, Vec<u32>>, DecodeError> {
    let mut pos = 0usize;
    let count = bitio::read_varint(bytes, &mut pos)? as usize;
    let mut map = BTreeMap::new();
    let mut prev_hash = 0u32;
    for _ in 0..count {
        let delta = bitio::read_varint(bytes, &mut pos)? as u32;
        let hash = prev_hash + delta;
        prev_hash = hash;
        let owners = delta_decode_list(bytes, &mut pos)?;
        map.insert(hash, owners);
    }
    Ok(map)
}

fn build_inverted_index(key_to_hashes: &[Vec<u32>]) -> HashMap<u32, Vec<u32>> {
    let mut inverted: HashMap<u32, Vec<u32>> = HashMap::with_hasher(Hasher::new());
    for (key_idx, hashes) in key_to_hashes.iter().enumerate() {
        for &h in hashes {
            inverted.entry(h).or_default().push(key_idx as u32);
        }
    }
    inverted
}

/// Builds a [`Lookup`] from a caller-supplied multi-map.
pub struct LookupBuilder {
    mphf_cfg: BuildConfig,
}

impl Default for LookupBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LookupBuilder {
    pub fn new() -> Self {
        Self {
            mphf_cfg: BuildConfig {
                validation_mode: ValidationMode::Bits8,
                ..Default::default()
            },
        }
    }

    pub fn with_mphf_config(mut self, cfg: BuildConfig) -> Self {
        self.mphf_cfg = cfg;
        self
    }

    pub fn build(self, multimap: &[MultiMapEntry]) -> Result<Lookup, BuildError> {
        let keys: Vec<String> = multimap.iter().map(|(k, _)| (*k).to_string()).collect();

        let mut values: Vec<&str> = Vec::new();
        let mut owners: HashMap<&str, Vec<u32>> = HashMap::with_hasher(Hasher::new());
        for (key_idx, (_, vals)) in multimap.iter().enumerate() {
            for &v in vals {
                owners
                    .entry(v)
                    .or_insert_with(|| {
                        values.push(v);
                        Vec::new()
                    })
                    .push(key_idx as u32);
            }
        }

        let mphf = Builder::new().with_config(self.mphf_cfg).build(&values)?;
        let n = values.len();
        let collision_count = owners.values().filter(|o| o.len() > 1).count();
        let use_hybrid = (collision_count as f64) < 0.1 * (n.max(1) as f64);

        let repr = if use_hybrid {
            let sentinel = keys.len() as u64;
            let bits_per_key = bitio::bits_for_max_value(sentinel);
            let mut value_to_key_indexes = BitPackedArray::with_capacity(n, bits_per_key);
            for i in 0..n {
                value_to_key_indexes.set(i, sentinel);
            }
            let mut collision_map = BTreeMap::new();
            for value in &values {
                let owner_list = &owners[value];
                let h = mphf.hash(value) as u32;
                if owner_list.len() == 1 {
                    value_to_key_indexes.set(h as usize, owner_list[0] as u64);
                } else {
                    let mut sorted = owner_list.clone();
                    sorted.sort_unstable();
                    collision_map.insert(h, sorted);
                }
            }
            LookupRepr::Hybrid {
                bits_per_key,
                value_to_key_indexes,
                collision_map,
            }
        } else {
            let mut key_to_hashes: Vec<Vec<u32>> = vec![Vec::new(); keys.len()];
            for value in &values {
                let h = mphf.hash(value) as u32;
                for &owner in &owners[value] {
                    key_to_hashes[owner as usize].push(h);
                }
            }
            for list in &mut key_to_hashes {
                list.sort_unstable();
            }
            let inverted = build_inverted_index(&key_to_hashes);
            LookupRepr::Sparse {
                key_to_hashes,
                inverted,
            }
        };

        Ok(Lookup { mphf, keys, repr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn country_capitals() -> Vec<MultiMapEntry<'static>> {
        vec![
            ("China", vec!["Beijing", "Shanghai", "Guangzhou"]),
            ("USA", vec!["New York", "Los Angeles", "Chicago"]),
            ("Japan", vec!["Tokyo", "Osaka", "Kyoto"]),
        ]
    }

    #[test]
    fn s4_lookup_basic() {
        let lookup = LookupBuilder::new().build(&country_capitals()).unwrap();
        assert_eq!(lookup.query("Beijing"), Some("China"));
        assert_eq!(lookup.query("Osaka"), Some("Japan"));
        assert_eq!(lookup.query("London"), None);
        assert_eq!(lookup.query_all("Beijing"), Some(vec!["China"]));
        assert_eq!(lookup.query_all("China"), None);
    }

    #[test]
    fn s5_lookup_many_to_one() {
        let entries: Vec<MultiMapEntry> = vec![
            ("A", vec!["Common"]),
            ("B", vec!["Common", "UniqueB"]),
            ("C", vec!["UniqueC", "Common"]),
        ];
        let lookup = LookupBuilder::new().build(&entries).unwrap();
        let mut owners = lookup.query_all("Common").unwrap();
        owners.sort_unstable();
        assert_eq!(owners, vec!["A", "B", "C"]);
        assert_eq!(lookup.query_all("UniqueB"), Some(vec!["B"]));
    }

    #[test]
    fn round_trip_preserves_query_results() {
        let entries = country_capitals();
        let lookup = LookupBuilder::new().build(&entries).unwrap();
        let bytes = lookup.to_bytes();
        let back = Lookup::from_bytes(&bytes).unwrap();
        for value in ["Beijing", "Osaka", "Chicago", "London"] {
            assert_eq!(lookup.query(value), back.query(value));
        }
        assert_eq!(lookup.keys(), back.keys());
    }

    #[test]
    fn sparse_mode_is_chosen_when_collisions_are_common() {
        // Every value shared by two keys: collision rate is 100% >= 10%.
        let entries: Vec<MultiMapEntry> = (0..20)
            .map(|i| {
                let owned: &'static str = Box::leak(format!("key{i}").into_boxed_str());
                (owned, vec!["shared-a", "shared-b"])
            })
            .collect();
        let lookup = LookupBuilder::new().build(&entries).unwrap();
        assert!(matches!(lookup.repr, LookupRepr::Sparse { .. }));
        let owners = lookup.query_all("shared-a").unwrap();
        assert_eq!(owners.len(), 20);
    }
}
