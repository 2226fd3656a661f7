// similarity.rs - Vector math shared by both embedding paths.

use crate::error::{EmbeddingError, Result};

/// Sentence vector produced by one encode call. Owned by the caller.
pub type EmbeddingVector = Vec<f32>;

pub fn dot(a: &[f32], b: &[f32]) -> Result<f32> {
    ensure_same_len(a, b)?;
    Ok(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale `v` to unit length in place. A zero vector is left as is.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm == 0.0 {
        return;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
}

/// Cosine similarity in [-1, 1].
///
/// Returns `NaN` when either vector has zero norm so callers can tell a
/// degenerate input apart from "orthogonal".
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    let d = dot(a, b)?;
    let denom = l2_norm(a) * l2_norm(b);
    if denom == 0.0 {
        return Ok(f32::NAN);
    }
    // Rounding can push |d / denom| a hair past 1.
    Ok((d / denom).clamp(-1.0, 1.0))
}

fn ensure_same_len(a: &[f32], b: &[f32]) -> Result<()> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(())
}
