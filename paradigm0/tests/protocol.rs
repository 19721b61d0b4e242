//! Protocol-level tests: the traits are object-safe, minimal
//! implementations satisfy the contracts, and the data model round-trips.

use paradigm0::error::{LedgerError, PresentError};
use paradigm0::ledger::DataLedger;
use paradigm0::presenter::{OnLoaded, Presenter};
use paradigm0::schema::TrialInfo;
use paradigm0::trial::{ParamValue, ResolvedTrial, TrialRecord, TrialResult};
use paradigm0::NodeId;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn trial(trial_type: &str) -> ResolvedTrial {
    let mut params = std::collections::BTreeMap::new();
    params.insert("stimulus".to_string(), ParamValue::from("hello"));
    ResolvedTrial {
        node_id: NodeId::root(0).child(0, 0),
        trial_index: 0,
        trial_type: trial_type.into(),
        params,
        data: Map::new(),
        post_trial_gap: None,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MirrorPresenter — resolves instantly, echoing its stimulus
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct MirrorPresenter {
    info: TrialInfo,
}

impl MirrorPresenter {
    fn new() -> Self {
        Self {
            info: TrialInfo::new("mirror"),
        }
    }
}

#[async_trait::async_trait]
impl Presenter for MirrorPresenter {
    fn info(&self) -> &TrialInfo {
        &self.info
    }

    async fn present(
        &self,
        trial: &ResolvedTrial,
        on_loaded: OnLoaded<'_>,
    ) -> Result<TrialResult, PresentError> {
        on_loaded();
        let mut result = TrialResult::new();
        result.insert(
            "response".into(),
            trial.get("stimulus").cloned().unwrap_or(Value::Null),
        );
        Ok(result)
    }
}

#[tokio::test]
async fn presenter_fires_on_loaded_then_resolves() {
    let loads = Arc::new(AtomicUsize::new(0));
    let loads_clone = Arc::clone(&loads);
    let on_loaded = move || {
        loads_clone.fetch_add(1, Ordering::SeqCst);
    };

    let presenter = MirrorPresenter::new();
    let result = presenter
        .present(&trial("mirror"), &on_loaded)
        .await
        .unwrap();

    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(result["response"], json!("hello"));
}

#[tokio::test]
async fn usable_as_dyn_presenter() {
    let presenter: Arc<dyn Presenter> = Arc::new(MirrorPresenter::new());
    assert_eq!(presenter.info().name, "mirror");
    let noop = || {};
    let result = presenter.present(&trial("mirror"), &noop).await.unwrap();
    assert_eq!(result["response"], json!("hello"));
}

// --- Error propagation through the boundary ---

struct BrokenPresenter {
    info: TrialInfo,
}

#[async_trait::async_trait]
impl Presenter for BrokenPresenter {
    fn info(&self) -> &TrialInfo {
        &self.info
    }

    async fn present(
        &self,
        _trial: &ResolvedTrial,
        _on_loaded: OnLoaded<'_>,
    ) -> Result<TrialResult, PresentError> {
        Err(PresentError::Load("asset 404".into()))
    }
}

#[tokio::test]
async fn presenter_errors_carry_their_diagnosis() {
    let presenter = BrokenPresenter {
        info: TrialInfo::new("broken"),
    };
    let noop = || {};
    let err = presenter.present(&trial("broken"), &noop).await.unwrap_err();
    assert!(err.to_string().contains("asset 404"));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// VecLedger — the smallest possible conforming ledger
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct VecLedger {
    records: Mutex<Vec<TrialRecord>>,
}

impl DataLedger for VecLedger {
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

#[test]
fn ledger_scopes_queries_by_prefix() {
    let ledger = VecLedger::default();
    let root = NodeId::root(0);
    for i in 0..4u64 {
        let mut data = Map::new();
        data.insert("i".into(), json!(i));
        ledger
            .append(TrialRecord {
                node_id: root.child((i % 2) as usize, 0),
                trial_index: i,
                trial_type: "mirror".into(),
                time_elapsed_ms: 0,
                data,
            })
            .unwrap();
    }
    assert_eq!(ledger.len(), 4);
    assert_eq!(ledger.by_node_prefix(&root.child(0, 0)).len(), 2);
    assert_eq!(ledger.by_node_prefix(&root).len(), 4);

    let ledger: Arc<dyn DataLedger> = Arc::new(ledger);
    assert_eq!(ledger.last().unwrap().trial_index, 3);
    assert!(!ledger.is_empty());
}
