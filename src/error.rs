use thiserror::Error;

/// Fatal, non-retryable build failures. A caller that hits one of these
/// typically retries the whole build with a different `level`, not with
/// the same parameters again — none of these are transient.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(
        "no collision-free pre-hash seed found in {attempts} attempts; \
         the key set likely contains duplicates or pathologically colliding keys"
    )]
    HashSeedExhausted { attempts: u32 },

    #[error(
        "no seed0 candidate kept the largest bucket within the 15-slot cap after {attempts} attempts \
         (best observed max bucket size was {best_max}); lower `level` (currently {level}) and retry"
    )]
    BucketOverflow {
        best_max: usize,
        level: u8,
        attempts: u32,
    },

    #[error(
        "displacement search exhausted its trial budget for bucket {bucket} (size {size}); \
         this bucket's keys may be pathologically hash-colliding"
    )]
    DisplacementExhausted { bucket: usize, size: usize },
}

/// Errors raised while decoding a previously-serialized dictionary.
/// Evaluation of a *successfully decoded* dictionary never fails; these
/// only guard against malformed or truncated bytes.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unexpected end of input while decoding")]
    UnexpectedEof,

    #[error("expected CBOR major type {expected}, found {found}")]
    BadMajorType { expected: u8, found: u8 },

    #[error("expected a {expected}-element array, found {found}")]
    BadArity { expected: usize, found: usize },

    #[error("unknown validation mode tag {0}")]
    UnknownMode(u64),

    #[error("varint exceeds 64 bits")]
    VarintOverflow,

    #[error("fingerprint array length mismatch: expected {expected}, got {got}")]
    FingerprintLengthMismatch { expected: usize, got: usize },

    #[error("bit-packed array width {width} is outside the supported 1..=32 range")]
    InvalidBitWidth { width: u32 },

    #[error("bit-packed array byte length mismatch: expected at least {expected}, got {got}")]
    PackedArrayLengthMismatch { expected: usize, got: usize },

    #[error("bucket sizes sum to {got}, expected {expected} (= n)")]
    BucketSizeSumMismatch { expected: usize, got: usize },

    #[error("validation mode tag {mode} is inconsistent with fingerprint presence")]
    FingerprintPresenceMismatch { mode: u64 },

    #[error("embedded key at index {index} is not valid UTF-8: {source}")]
    InvalidKeyUtf8 {
        index: usize,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("gzip decompression failed: {0}")]
    Gzip(#[from] std::io::Error),
}
