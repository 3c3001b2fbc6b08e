// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Release payload codec.
//!
//! A stored release is `base64(gzip(json))`. Records written by old clients
//! skip the gzip layer, so decoding sniffs the gzip magic after the base64
//! step and falls back to plain JSON when it is absent. That fallback must
//! stay: clusters upgraded in place still carry those records.
//!
//! ```text
//! blob ──base64──► bytes ──[1f 8b 08]?──► gunzip ──► json ──► ReleaseRecord
//!                             │ no
//!                             └─────────────────────► json ──► ReleaseRecord
//! ```

use crate::error::DecodeError;
use crate::release::ReleaseRecord;
use base64::{engine::general_purpose::STANDARD, Engine};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// gzip member header: ID1, ID2, CM=deflate.
pub const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];

/// Decode a stored release blob.
///
/// Pure; safe to call from any number of workers at once.
pub fn decode(blob: &[u8]) -> Result<ReleaseRecord, DecodeError> {
    let raw = STANDARD.decode(blob)?;
    let json = maybe_gunzip(raw)?;
    serde_json::from_slice(&json).map_err(|e| DecodeError::schema(&e))
}

/// Inflate `data` if it starts with the gzip magic, otherwise return it as-is.
pub fn maybe_gunzip(data: Vec<u8>) -> Result<Vec<u8>, DecodeError> {
    if data.len() >= GZIP_MAGIC.len() && data[..GZIP_MAGIC.len()] == GZIP_MAGIC {
        let mut decoder = GzDecoder::new(data.as_slice());
        let mut inflated = Vec::new();
        decoder
            .read_to_end(&mut inflated)
            .map_err(DecodeError::CorruptStream)?;
        Ok(inflated)
    } else {
        Ok(data)
    }
}

/// Encode a release the way current Helm clients store it.
pub fn encode(record: &ReleaseRecord) -> Result<Vec<u8>, DecodeError> {
    let json = serde_json::to_vec(record).map_err(|e| DecodeError::schema(&e))?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(&json)
        .map_err(DecodeError::CorruptStream)?;
    let compressed = encoder.finish().map_err(DecodeError::CorruptStream)?;
    Ok(STANDARD.encode(compressed).into_bytes())
}

/// Encode without the gzip layer, as pre-compression clients did.
pub fn encode_uncompressed(record: &ReleaseRecord) -> Result<Vec<u8>, DecodeError> {
    let json = serde_json::to_vec(record).map_err(|e| DecodeError::schema(&e))?;
    Ok(STANDARD.encode(json).into_bytes())
}

/// Short, stable identifier for a payload.
///
/// First 12 hex chars of its SHA-256. Lets logs correlate a bad blob
/// without printing any of it.
pub fn payload_fingerprint(blob: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(blob);
    let mut hex = hex::encode(digest);
    hex.truncate(12);
    hex
}
