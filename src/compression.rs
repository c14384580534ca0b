//! The one format-level commitment this crate owns: text/attribute values
//! longer than 10 bytes are optionally deflated before being handed to the
//! page layer, and transparently inflated on read.
//!
//! `flate2`'s safe API does not expose zlib's `Z_HUFFMAN_ONLY` strategy
//! directly, so the fastest compression level is used as the closest
//! approximation (see DESIGN.md). Everything else about on-disk byte layout
//! belongs to the page layer, not to this crate.

use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::{Error, Result};

/// Values shorter than this are never compressed.
pub const COMPRESSION_THRESHOLD: usize = 10;

/// Compress `value` if it is eligible and `enabled` is set. Returns the
/// (possibly unchanged) bytes and whether they are now compressed.
pub fn maybe_compress(value: &[u8], enabled: bool) -> Result<(Vec<u8>, bool)> {
    if !enabled || value.len() <= COMPRESSION_THRESHOLD {
        return Ok((value.to_vec(), false));
    }
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::fast());
    encoder
        .write_all(value)
        .map_err(Error::Io)?;
    let compressed = encoder.finish().map_err(Error::Io)?;
    Ok((compressed, true))
}

/// Inflate `value` if `compressed` is set; otherwise return it unchanged.
pub fn maybe_decompress(value: &[u8], compressed: bool) -> Result<Vec<u8>> {
    if !compressed {
        return Ok(value.to_vec());
    }
    let mut decoder = DeflateDecoder::new(value);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).map_err(Error::Io)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_values_are_never_compressed() {
        let (bytes, compressed) = maybe_compress(b"hi", true).unwrap();
        assert!(!compressed);
        assert_eq!(bytes, b"hi");
    }

    #[test]
    fn round_trips_long_values() {
        let value = b"a reasonably long piece of text that exceeds the threshold";
        let (bytes, compressed) = maybe_compress(value, true).unwrap();
        assert!(compressed);
        let back = maybe_decompress(&bytes, compressed).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn disabled_compression_is_a_no_op() {
        let value = b"a reasonably long piece of text that exceeds the threshold";
        let (bytes, compressed) = maybe_compress(value, false).unwrap();
        assert!(!compressed);
        assert_eq!(bytes, value);
    }
}
