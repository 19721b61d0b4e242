//! The Ledger protocol — how result records persist and are queried.

use crate::error::LedgerError;
use crate::id::NodeId;
use crate::trial::TrialRecord;
use serde_json::{Map, Value};

/// Protocol ② — Ledger
///
/// An append-only store of result records, queryable by hierarchical node
/// id. Loop functions consume [`by_node_prefix`] to decide whether a subtree
/// runs again; progress reporting consumes [`len`].
///
/// The trait is synchronous by design: the runtime is one logical thread
/// with a single suspension point (the presenter), and ledger queries happen
/// inside the timeline dispatch where no await is possible. Implementations
/// guard interior state so the trait object stays `Sync`, but contention
/// never occurs under the single-writer discipline.
///
/// Implementations:
/// - `paradigm-ledger-memory`: `Vec` behind a lock (testing, single-process)
/// - A file-backed ledger flushing rows as they arrive
/// - A buffered uploader draining to a collection server
///
/// [`by_node_prefix`]: DataLedger::by_node_prefix
/// [`len`]: DataLedger::len
pub trait DataLedger: Send + Sync {
    /// Append one record. Records arrive in completion order.
    fn append(&self, record: TrialRecord) -> Result<(), LedgerError>;

    /// Every record produced at or under the given node id.
    fn by_node_prefix(&self, prefix: &NodeId) -> Vec<TrialRecord>;

    /// Every record, in completion order.
    fn all(&self) -> Vec<TrialRecord>;

    /// Number of records stored.
    fn len(&self) -> usize;

    /// Whether the ledger holds no records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The most recently appended record.
    fn last(&self) -> Option<TrialRecord>;

    /// Merge the given fields into every stored record and every record
    /// appended afterwards. Used for participant/session annotations.
    fn add_properties(&self, properties: Map<String, Value>);
}
