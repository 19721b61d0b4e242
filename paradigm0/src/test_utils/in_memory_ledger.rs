//! A minimal in-memory ledger proving the trait API is usable.
//!
//! The production-shaped implementation lives in `paradigm-ledger-memory`;
//! this one exists so protocol-level tests need no extra crate.

use crate::error::LedgerError;
use crate::id::NodeId;
use crate::ledger::DataLedger;
use crate::trial::TrialRecord;
use serde_json::{Map, Value};
use std::sync::Mutex;

/// Append-only `Vec` of records behind a `Mutex`.
#[derive(Default)]
pub struct InMemoryLedger {
    records: Mutex<Vec<TrialRecord>>,
}

impl InMemoryLedger {
    /// An empty ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

impl DataLedger for InMemoryLedger {
    fn append(&self, record: TrialRecord) -> Result<(), LedgerError> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }

    fn by_node_prefix(&self, prefix: &NodeId) -> Vec<TrialRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| prefix.is_prefix_of(&r.node_id))
            .cloned()
            .collect()
    }

    fn all(&self) -> Vec<TrialRecord> {
        self.records.lock().unwrap().clone()
    }

    fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    fn last(&self) -> Option<TrialRecord> {
        self.records.lock().unwrap().last().cloned()
    }

    fn add_properties(&self, properties: Map<String, Value>) {
        let mut records = self.records.lock().unwrap();
        for record in records.iter_mut() {
            for (k, v) in &properties {
                record.data.insert(k.clone(), v.clone());
            }
        }
    }
}
