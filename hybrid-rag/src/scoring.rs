//! Similarity functions shared by the in-memory index.

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Late-interaction MAX-SIM score.
///
/// For each query token, take the best cosine similarity against any
/// document token, then sum over query tokens. An empty query or document
/// scores 0.0.
pub fn max_sim(query: &[Vec<f32>], document: &[Vec<f32>]) -> f32 {
    if document.is_empty() {
        return 0.0;
    }
    query
        .iter()
        .map(|q| {
            document.iter().map(|d| cosine_similarity(q, d)).fold(f32::NEG_INFINITY, f32::max)
        })
        .sum()
}
