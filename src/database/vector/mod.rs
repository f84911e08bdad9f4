
use crate::{RagError, Result};

/// Encode an embedding vector as a little-endian f32 blob for storage.
#[inline]
pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode a stored blob back into an embedding vector.
#[inline]
pub fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(RagError::Database(format!(
            "embedding blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Cosine distance between two vectors, in [0, 2]; lower is more similar.
///
/// Zero-norm vectors have no direction and are treated as distance 1.0.
/// Dimension mismatches indicate mixed embedding models in the store and are
/// surfaced as an error rather than a bogus score.
#[inline]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(RagError::Database(format!(
            "embedding dimension mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(1.0);
    }

    Ok(1.0 - dot / (norm_a.sqrt() * norm_b.sqrt()))
}
