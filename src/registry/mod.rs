//! Model registry
//!
//! Process-wide map from a caller-chosen dataset id to the model most
//! recently trained for it. Entries are immutable once stored: a retrain
//! replaces the whole entry, and readers holding the previous `Arc` keep a
//! consistent snapshot of encoder, codec and model.

mod entry;

pub use entry::{FittedModel, ModelType, TrainedModelEntry};

use crate::error::{Result, StudioError};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Public description of a stored entry
#[derive(Debug, Clone, Serialize)]
pub struct ModelDescription {
    pub dataset_id: String,
    pub model_type: ModelType,
    pub method: String,
    pub n_raw_features: usize,
    pub n_encoded_features: usize,
    pub n_classes: Option<usize>,
    pub trained_at: DateTime<Utc>,
}

struct Slot {
    entry: Arc<TrainedModelEntry>,
    /// Store order, breaks `trained_at` ties during eviction
    seq: u64,
}

/// Registry of trained models keyed by dataset id
pub struct ModelRegistry {
    entries: RwLock<HashMap<String, Slot>>,
    capacity: Option<usize>,
    next_seq: AtomicU64,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    /// Unbounded registry
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: None,
            next_seq: AtomicU64::new(0),
        }
    }

    /// Registry holding at most `capacity` datasets; storing a new id into a
    /// full registry evicts the entry with the oldest `trained_at`
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Self::new()
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Store an entry, replacing whatever was stored under the id.
    ///
    /// Returns the replaced entry, if any.
    pub fn store(&self, dataset_id: impl Into<String>, entry: TrainedModelEntry) -> Option<Arc<TrainedModelEntry>> {
        let dataset_id = dataset_id.into();
        let model_type = entry.model_type;
        let method = entry.method.clone();
        let slot = Slot {
            entry: Arc::new(entry),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };

        let mut entries = self.entries.write();
        if let Some(capacity) = self.capacity {
            if !entries.contains_key(&dataset_id) && entries.len() >= capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, s)| (s.entry.trained_at, s.seq))
                    .map(|(id, _)| id.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                    info!(dataset_id = %oldest, "Registry full, evicted oldest model");
                }
            }
        }
        let previous = entries.insert(dataset_id.clone(), slot).map(|s| s.entry);
        drop(entries);

        info!(
            dataset_id = %dataset_id,
            model_type = %model_type,
            method = %method,
            replaced = previous.is_some(),
            "Model stored"
        );
        previous
    }

    /// Current entry for the id, if any
    pub fn get(&self, dataset_id: &str) -> Option<Arc<TrainedModelEntry>> {
        self.entries.read().get(dataset_id).map(|s| Arc::clone(&s.entry))
    }

    /// Current entry for the id, failing with `NoTrainedModel`
    pub fn lookup(&self, dataset_id: &str) -> Result<Arc<TrainedModelEntry>> {
        let entry = self.get(dataset_id);
        debug!(dataset_id, found = entry.is_some(), "Registry lookup");
        entry.ok_or_else(|| StudioError::NoTrainedModel(dataset_id.to_string()))
    }

    pub fn contains(&self, dataset_id: &str) -> bool {
        self.entries.read().contains_key(dataset_id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Stored dataset ids, sorted
    pub fn dataset_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Descriptions of every stored entry, sorted by dataset id
    pub fn describe(&self) -> Vec<ModelDescription> {
        let entries = self.entries.read();
        let mut out: Vec<ModelDescription> = entries
            .iter()
            .map(|(id, slot)| slot.entry.describe(id))
            .collect();
        out.sort_by(|a, b| a.dataset_id.cmp(&b.dataset_id));
        out
    }
}
