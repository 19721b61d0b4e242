#![deny(missing_docs)]
//! In-memory implementation of paradigm0's DataLedger trait.
//!
//! Uses a `Vec` of records behind a `std::sync::RwLock` — the trait is
//! synchronous, and under the runtime's single-writer discipline the lock
//! only exists so the trait object stays `Sync`. Session-wide properties
//! registered with `add_properties` are merged into every stored record and
//! every record appended afterwards.

use paradigm0::error::LedgerError;
use paradigm0::id::NodeId;
use paradigm0::ledger::DataLedger;
use paradigm0::trial::TrialRecord;
use serde_json::{Map, Value};
use std::sync::{PoisonError, RwLock};

struct Inner {
    records: Vec<TrialRecord>,
    properties: Map<String, Value>,
}

/// In-memory result ledger.
///
/// Suitable for testing, prototyping, and single-process experiments where
/// persistence across restarts is not required.
pub struct MemoryLedger {
    inner: RwLock<Inner>,
}

impl MemoryLedger {
    /// Create a new empty ledger.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                records: Vec::new(),
                properties: Map::new(),
            }),
        }
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLedger for MemoryLedger {
    fn append(&self, mut record: TrialRecord) -> Result<(), LedgerError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| LedgerError::AppendFailed(e.to_string()))?;
        for (k, v) in inner.properties.clone() {
            record.data.insert(k, v);
        }
        inner.records.push(record);
        Ok(())
    }

    fn by_node_prefix(&self, prefix: &NodeId) -> Vec<TrialRecord> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .records
            .iter()
            .filter(|r| prefix.is_prefix_of(&r.node_id))
            .cloned()
            .collect()
    }

    fn all(&self) -> Vec<TrialRecord> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).records.clone()
    }

    fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).records.len()
    }

    fn last(&self) -> Option<TrialRecord> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).records.last().cloned()
    }

    fn add_properties(&self, properties: Map<String, Value>) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        for record in inner.records.iter_mut() {
            for (k, v) in &properties {
                record.data.insert(k.clone(), v.clone());
            }
        }
        inner.properties.extend(properties);
    }
}
