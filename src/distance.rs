//! Distance Functions for Vector Similarity
//!
//! Scalar cosine similarity used by the brute-force vector index. Text
//! embeddings are compared by angle, so cosine is the only metric the
//! engine needs.
//!
//! # Example
//!
//! ```
//! use pathrag::distance::cosine_similarity;
//!
//! let a = vec![1.0, 0.0, 0.0];
//! let b = vec![0.0, 1.0, 0.0];
//!
//! // Orthogonal vectors have zero cosine similarity.
//! assert!(cosine_similarity(&a, &b).abs() < 1e-6);
//! ```

/// Cosine similarity between two vectors, in `[-1, 1]`.
///
/// Returns `0.0` when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

/// Cosine distance (`1 - cosine similarity`), in `[0, 2]`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}
