//! The compression boundary (§4.3/§6 `enableCompression`). This module
//! is the entire surface the core exposes to its gzip collaborator —
//! nothing else in the crate calls into `flate2` directly. Bound to
//! `flate2` because it is the standard ecosystem crate for this concern
//! and none of the example repos in the pack carry one of their own to
//! imitate (see `DESIGN.md`).

use flate2::read::{GzDecoder, GzEncoder};
use flate2::Compression;
use std::io::Read;

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(bytes, Compression::default());
    let mut out = Vec::new();
    encoder
        .read_to_end(&mut out)
        .expect("in-memory gzip encoding cannot fail with I/O errors");
    out
}

pub fn gunzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_round_trips() {
        let original = b"minimal perfect hash core payload".repeat(20);
        let compressed = gzip(&original);
        assert!(compressed.len() < original.len());
        let decompressed = gunzip(&compressed).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn gunzip_rejects_garbage() {
        assert!(gunzip(b"not gzip data").is_err());
    }
}
