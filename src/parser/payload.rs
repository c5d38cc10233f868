//! Fetcher payload decoding: optional gzip, then UTF-8.

use super::ParseError;
use flate2::read::GzDecoder;
use std::io::Read;

/// Gzip magic bytes.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Decode payload bytes into HTML text.
///
/// The fetcher stores large payloads gzipped; detection is by magic bytes
/// rather than headers so re-served files work too. Uncompressed payloads
/// pass through unchanged.
pub fn decode(payload: &[u8]) -> Result<String, ParseError> {
    let bytes = if payload.starts_with(&GZIP_MAGIC) {
        let mut decoder = GzDecoder::new(payload);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| ParseError::Syntax(format!("gzip decompression failed: {e}")))?;
        out
    } else {
        payload.to_vec()
    };

    String::from_utf8(bytes).map_err(|_| ParseError::Syntax("payload is not valid UTF-8".into()))
}
