//! Embedding vector extraction and similarity helpers.

use serde_json::Value;

use super::error::{ErrorKind, OllamaError, Result};

fn to_vector(values: &[Value]) -> Result<Vec<f64>> {
    values
        .iter()
        .map(|v| {
            v.as_f64().ok_or_else(|| {
                OllamaError::new(ErrorKind::Parse, format!("non-numeric embedding component: {v}"))
            })
        })
        .collect()
}

/// Extract the embedding vector from an embed response.
///
/// Accepts `{"embedding": [..]}`, `{"embeddings": [..]}` and
/// `{"embeddings": [[..], ..]}` (the first vector is used).
pub fn extract_embedding(response: &Value) -> Result<Vec<f64>> {
    if let Some(Value::Array(values)) = response.get("embedding") {
        return to_vector(values);
    }

    match response.get("embeddings") {
        Some(Value::Array(values)) => match values.first() {
            Some(Value::Array(first)) => to_vector(first),
            _ => to_vector(values),
        },
        _ => {
            let keys: Vec<&str> = response
                .as_object()
                .map(|obj| obj.keys().map(String::as_str).collect())
                .unwrap_or_default();
            Err(OllamaError::new(
                ErrorKind::Parse,
                format!("could not extract embedding from response (keys: {keys:?})"),
            ))
        }
    }
}

/// Cosine similarity of two vectors.
///
/// `None` when either vector is empty or the dimensions differ. Zero vectors
/// have similarity 0.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return None;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return Some(0.0);
    }
    Some(dot / (norm_a * norm_b))
}

/// Scale a vector to unit length. Zero vectors are returned unchanged.
pub fn normalize_vector(vector: &[f64]) -> Vec<f64> {
    let norm = vector.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm == 0.0 {
        tracing::warn!("cannot normalize zero vector, returning original");
        return vector.to_vec();
    }
    vector.iter().map(|x| x / norm).collect()
}

/// Indices and similarities of the `k` candidates closest to `query`,
/// best first. Candidates with mismatched dimensions score 0.
pub fn top_k_similar(query: &[f64], candidates: &[Vec<f64>], k: usize) -> Vec<(usize, f64)> {
    let mut scored: Vec<(usize, f64)> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (i, cosine_similarity(query, c).unwrap_or(0.0)))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(k);
    scored
}
