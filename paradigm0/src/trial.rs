//! Trial parameter values, resolved trials, and result records.

use crate::id::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A user-supplied deferred value: invoked exactly once during the
/// resolution pass, against the evaluation context of the active trial.
pub type ComputedFn = dyn Fn(&EvalContext) -> Value + Send + Sync;

/// One trial parameter value, possibly deferred.
///
/// Deferred variants ([`Var`], [`Computed`]) are resolved exactly once by the
/// runner, after the active-trial pointer is updated and before the presenter
/// is invoked — so variable lookups always see the currently active trial.
/// The exception is a parameter whose declared schema type is
/// [`ParamType::Function`], which passes through unevaluated.
///
/// [`Var`]: ParamValue::Var
/// [`Computed`]: ParamValue::Computed
/// [`ParamType::Function`]: crate::schema::ParamType::Function
#[derive(Clone)]
pub enum ParamValue {
    /// A concrete JSON value.
    Value(Value),
    /// A deferred reference to a timeline variable, by name.
    Var(String),
    /// A deferred user function producing the value at resolution time.
    Computed(Arc<ComputedFn>),
    /// A list whose elements may themselves be deferred.
    List(Vec<ParamValue>),
    /// A nested object whose entries may themselves be deferred.
    Map(BTreeMap<String, ParamValue>),
}

impl ParamValue {
    /// A deferred reference to the timeline variable `name`.
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    /// A deferred user function.
    pub fn computed(f: impl Fn(&EvalContext) -> Value + Send + Sync + 'static) -> Self {
        Self::Computed(Arc::new(f))
    }

    /// The concrete value, if already resolved.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Debug for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "Value({v})"),
            Self::Var(name) => write!(f, "Var({name:?})"),
            Self::Computed(_) => write!(f, "Computed(..)"),
            Self::List(items) => f.debug_tuple("List").field(items).finish(),
            Self::Map(entries) => f.debug_tuple("Map").field(entries).finish(),
        }
    }
}

impl From<Value> for ParamValue {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        Self::Value(Value::String(s.to_owned()))
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        Self::Value(Value::String(s))
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        Self::Value(Value::Bool(b))
    }
}

impl From<i64> for ParamValue {
    fn from(n: i64) -> Self {
        Self::Value(Value::from(n))
    }
}

impl From<f64> for ParamValue {
    fn from(n: f64) -> Self {
        Self::Value(Value::from(n))
    }
}

/// A trial's parameter bag, by parameter name.
pub type Params = BTreeMap<String, ParamValue>;

/// Result data a presenter resolves with: the raw response fields
/// (`response`, `rt`, and whatever else the trial type produces).
pub type TrialResult = Map<String, Value>;

/// The context deferred values resolve against: the active trial's identity
/// plus every timeline-variable binding visible from it (innermost wins).
///
/// Passed explicitly to every user callback — there is no ambient
/// immediate-vs-deferred mode; whether a lookup resolves now is decided by
/// which context it is handed.
#[derive(Debug, Clone)]
pub struct EvalContext {
    node_id: NodeId,
    variables: Map<String, Value>,
}

impl EvalContext {
    /// Build a context for the given node with its visible bindings.
    pub fn new(node_id: NodeId, variables: Map<String, Value>) -> Self {
        Self { node_id, variables }
    }

    /// The active node's identity.
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Look up a timeline variable visible from the active trial.
    pub fn var(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Every visible binding, innermost already applied.
    pub fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }
}

/// A fully resolved trial: an independent deep copy of the leaf's parameter
/// bag with every deferred value settled, handed to the presenter.
///
/// After resolution, every parameter is [`ParamValue::Value`] except those
/// the schema declares as functions, which remain [`ParamValue::Computed`]
/// for the presenter to invoke itself.
#[derive(Debug, Clone)]
pub struct ResolvedTrial {
    /// Identity of the producing leaf node.
    pub node_id: NodeId,
    /// Global, monotonic trial counter value.
    pub trial_index: u64,
    /// The trial type discriminator.
    pub trial_type: String,
    /// The resolved parameter bag.
    pub params: Params,
    /// Resolved `data` defaults merged into the final record.
    pub data: Map<String, Value>,
    /// Gap before the next trial starts, in milliseconds.
    pub post_trial_gap: Option<u64>,
}

impl ResolvedTrial {
    /// A resolved parameter's concrete value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.params.get(name).and_then(ParamValue::as_value)
    }

    /// A resolved string parameter.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// A function-typed parameter, for the presenter to call mid-trial.
    pub fn get_fn(&self, name: &str) -> Option<&Arc<ComputedFn>> {
        match self.params.get(name) {
            Some(ParamValue::Computed(f)) => Some(f),
            _ => None,
        }
    }
}

/// One flattened result row in the ledger.
///
/// `data` merges, in increasing precedence: the presenter's result, the
/// trial's declared `data` defaults, and the runtime fields mirrored below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    /// Identity of the producing leaf node (and, by prefix, its ancestors).
    pub node_id: NodeId,
    /// Global trial counter value at completion.
    pub trial_index: u64,
    /// The trial type that produced this record.
    pub trial_type: String,
    /// Milliseconds since the experiment started.
    pub time_elapsed_ms: u64,
    /// The merged result fields.
    pub data: Map<String, Value>,
}

impl TrialRecord {
    /// A field of the merged result data.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn param_values_convert_from_json() {
        let pv: ParamValue = json!({"a": 1}).into();
        assert_eq!(pv.as_value(), Some(&json!({"a": 1})));
        let pv: ParamValue = "text".into();
        assert_eq!(pv.as_value(), Some(&json!("text")));
    }

    #[test]
    fn deferred_values_have_no_concrete_value() {
        assert!(ParamValue::var("stimulus").as_value().is_none());
        assert!(ParamValue::computed(|_| json!(1)).as_value().is_none());
    }

    #[test]
    fn eval_context_lookup() {
        let mut vars = Map::new();
        vars.insert("word".into(), json!("blue"));
        let ctx = EvalContext::new(NodeId::root(0), vars);
        assert_eq!(ctx.var("word"), Some(&json!("blue")));
        assert_eq!(ctx.var("color"), None);
    }

    #[test]
    fn record_serializes_node_id_as_string() {
        let record = TrialRecord {
            node_id: NodeId::root(0).child(1, 0),
            trial_index: 3,
            trial_type: "probe".into(),
            time_elapsed_ms: 1200,
            data: Map::new(),
        };
        let v = serde_json::to_value(&record).unwrap();
        assert_eq!(v["node_id"], json!("0.0-1.0"));
    }
}
