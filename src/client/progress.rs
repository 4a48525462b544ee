//! Monotonic progress accounting for pull/push streams.
//!
//! Progress records carry cumulative `completed`/`total` byte counts per
//! layer. The server may interleave records for several layers and repeat or
//! lower a layer's count; each layer keeps its own high-water mark, so
//! observers only ever see forward deltas.

use std::collections::HashMap;

use serde_json::Value;

/// Progress derived from one stream record.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub status: Option<String>,
    pub digest: Option<String>,
    /// Highest cumulative byte count seen for this record's layer.
    pub completed: u64,
    pub total: Option<u64>,
    /// Bytes gained since the previous update. Never negative.
    pub delta: u64,
    /// Whether `status` differs from the previous record's.
    pub status_changed: bool,
}

impl ProgressUpdate {
    /// Completion ratio of the current layer, when its size is known.
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0 => Some((self.completed as f64 / total as f64).min(1.0)),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone)]
struct Layer {
    completed: u64,
    total: Option<u64>,
}

/// Turns cumulative progress records into forward-only deltas.
///
/// Records without a digest count against the most recent digest seen.
#[derive(Debug, Default, Clone)]
pub struct ProgressTracker {
    last_status: Option<String>,
    digest: Option<String>,
    layers: HashMap<String, Layer>,
    transferred: u64,
}

fn read_count(record: &Value, key: &str) -> Option<u64> {
    let value = record.get(key)?;
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total forward bytes reported so far, across all layers.
    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    pub fn observe(&mut self, record: &Value) -> ProgressUpdate {
        let status = record
            .get("status")
            .and_then(Value::as_str)
            .map(str::to_string);
        let digest = record
            .get("digest")
            .and_then(Value::as_str)
            .map(str::to_string);
        let total = read_count(record, "total");
        let completed = read_count(record, "completed");

        if digest.is_some() {
            self.digest = digest.clone();
        }
        let layer = self
            .layers
            .entry(self.digest.clone().unwrap_or_default())
            .or_default();
        if total.is_some() {
            // Without digests a changed size is the only sign of a new layer.
            if self.digest.is_none() && layer.total.is_some() && total != layer.total {
                layer.completed = 0;
            }
            layer.total = total;
        }

        let mut delta = 0;
        if let Some(completed) = completed {
            if completed > layer.completed {
                delta = completed - layer.completed;
                layer.completed = completed;
            }
        }
        let (completed, total) = (layer.completed, layer.total);
        self.transferred += delta;

        let status_changed = status.is_some() && status != self.last_status;
        if status.is_some() {
            self.last_status = status.clone();
        }

        ProgressUpdate {
            status,
            digest: self.digest.clone(),
            completed,
            total,
            delta,
            status_changed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_progress_only_forward_deltas() {
        let mut tracker = ProgressTracker::new();
        let records = [
            json!({"status": "pulling manifest"}),
            json!({"status": "downloading", "digest": "sha256:a", "total": 100, "completed": 10}),
            json!({"status": "downloading", "digest": "sha256:a", "total": 100, "completed": 40}),
            json!({"status": "downloading", "digest": "sha256:a", "total": 100, "completed": 30}),
            json!({"status": "downloading", "digest": "sha256:a", "total": 100, "completed": 40}),
            json!({"status": "downloading", "digest": "sha256:a", "total": 100, "completed": 100}),
        ];

        let deltas: Vec<u64> = records.iter().map(|r| tracker.observe(r).delta).collect();
        assert_eq!(deltas, vec![0, 10, 30, 0, 0, 60]);
        assert_eq!(tracker.transferred(), 100);
    }

    #[test]
    fn test_progress_new_layer_counts_from_zero() {
        let mut tracker = ProgressTracker::new();
        tracker.observe(&json!({"digest": "sha256:a", "total": 100, "completed": 100}));
        let update = tracker.observe(&json!({"digest": "sha256:b", "total": 50, "completed": 20}));

        assert_eq!(update.delta, 20);
        assert_eq!(update.completed, 20);
        assert_eq!(update.fraction(), Some(0.4));
        assert_eq!(tracker.transferred(), 120);
    }

    #[test]
    fn test_progress_interleaved_layers_not_recounted() {
        let mut tracker = ProgressTracker::new();
        let records = [
            json!({"digest": "sha256:a", "total": 40, "completed": 10}),
            json!({"digest": "sha256:b", "total": 5, "completed": 5}),
            json!({"digest": "sha256:a", "total": 40, "completed": 20}),
            json!({"digest": "sha256:b", "total": 5, "completed": 5}),
            json!({"digest": "sha256:a", "total": 40, "completed": 20}),
        ];

        let deltas: Vec<u64> = records.iter().map(|r| tracker.observe(r).delta).collect();
        assert_eq!(deltas, vec![10, 5, 10, 0, 0]);
        assert_eq!(tracker.transferred(), 25);
    }

    #[test]
    fn test_progress_digestless_size_change_starts_layer() {
        let mut tracker = ProgressTracker::new();
        tracker.observe(&json!({"total": 10, "completed": 10}));
        let update = tracker.observe(&json!({"total": 30, "completed": 6}));
        assert_eq!(update.delta, 6);
        assert_eq!(update.fraction(), Some(0.2));
        assert_eq!(tracker.transferred(), 16);
    }

    #[test]
    fn test_progress_status_changes() {
        let mut tracker = ProgressTracker::new();
        assert!(tracker.observe(&json!({"status": "pulling manifest"})).status_changed);
        assert!(!tracker.observe(&json!({"status": "pulling manifest"})).status_changed);
        assert!(tracker.observe(&json!({"status": "success"})).status_changed);
        assert!(!tracker.observe(&json!({})).status_changed);
    }

    #[test]
    fn test_progress_ignores_negative_counts() {
        let mut tracker = ProgressTracker::new();
        let update = tracker.observe(&json!({"total": 10, "completed": -5}));
        assert_eq!(update.delta, 0);
        assert_eq!(update.fraction(), Some(0.0));
    }
}
