//! Streaming compression helpers used by the table block codecs.

use std::io::{self, Read, Write};

use snap::read::FrameDecoder;
use snap::write::FrameEncoder;

/// Compress `src` with Snappy framing, appending the result to `dst`.
pub(crate) fn compress(src: &[u8], dst: &mut Vec<u8>) -> io::Result<()> {
    let mut encoder = FrameEncoder::new(dst);
    encoder.write_all(src)?;
    encoder
        .into_inner()
        .map_err(|error| error.into_error())?;
    Ok(())
}

/// Decompress a Snappy frame stream from `src`, appending the result to `dst`.
pub(crate) fn decompress(src: &[u8], dst: &mut Vec<u8>) -> io::Result<()> {
    let mut decoder = FrameDecoder::new(src);
    decoder.read_to_end(dst)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn compression_round_trip() {
        let payload: Vec<u8> = b"a highly repetitive payload "
            .iter()
            .cycle()
            .take(4096)
            .copied()
            .collect();

        let mut compressed = Vec::new();
        compress(&payload, &mut compressed).unwrap();
        assert!(compressed.len() < payload.len());

        let mut decompressed = Vec::new();
        decompress(&compressed, &mut decompressed).unwrap();
        assert_eq!(decompressed, payload);
    }

    #[test]
    fn empty_payload_round_trip() {
        let mut compressed = Vec::new();
        compress(&[], &mut compressed).unwrap();

        let mut decompressed = Vec::new();
        decompress(&compressed, &mut decompressed).unwrap();
        assert_eq!(decompressed, Vec::<u8>::new());
    }
}
