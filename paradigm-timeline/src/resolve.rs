//! The resolve-exactly-once pass over a trial's parameter bag.
//!
//! Runs after the active-trial pointer is updated and before the presenter
//! is invoked, so variable lookups and user functions observe the currently
//! active trial. Deferred values are settled exactly once; the exception is
//! a parameter whose declared schema type is `Function`, which passes
//! through unevaluated for the presenter to call itself.

use paradigm0::schema::{ParamType, TrialInfo};
use paradigm0::trial::{EvalContext, ParamValue, Params, ResolvedTrial};
use serde_json::{Map, Value};
use tracing::{error, warn};

/// Settle one parameter value against the context.
fn resolve_value(value: ParamValue, ctx: &EvalContext) -> ParamValue {
    match value {
        ParamValue::Value(v) => ParamValue::Value(v),
        ParamValue::Var(name) => match ctx.var(&name) {
            Some(v) => ParamValue::Value(v.clone()),
            None => {
                warn!(variable = %name, node_id = %ctx.node_id(), "timeline variable not bound; resolving to null");
                ParamValue::Value(Value::Null)
            }
        },
        ParamValue::Computed(f) => ParamValue::Value(f(ctx)),
        ParamValue::List(items) => ParamValue::List(
            items.into_iter().map(|v| resolve_value(v, ctx)).collect(),
        ),
        ParamValue::Map(entries) => ParamValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k, resolve_value(v, ctx)))
                .collect(),
        ),
    }
}

/// Settle a parameter bag; `schema` exempts `Function`-typed parameters.
fn resolve_params(params: Params, schema: Option<&TrialInfo>, ctx: &EvalContext) -> Params {
    params
        .into_iter()
        .map(|(name, value)| {
            let declared_fn = schema
                .and_then(|s| s.parameter(&name))
                .is_some_and(|info| info.param_type == ParamType::Function);
            if declared_fn {
                (name, value)
            } else {
                let resolved = resolve_value(value, ctx);
                (name, resolved)
            }
        })
        .collect()
}

/// Settle the declared result-data defaults into plain values.
fn resolve_data(data: Params, ctx: &EvalContext) -> Map<String, Value> {
    data.into_iter()
        .map(|(name, value)| {
            let v = match resolve_value(value, ctx) {
                ParamValue::Value(v) => v,
                // Lists/maps with settled entries collapse to JSON.
                other => param_to_json(other),
            };
            (name, v)
        })
        .collect()
}

fn param_to_json(value: ParamValue) -> Value {
    match value {
        ParamValue::Value(v) => v,
        ParamValue::List(items) => Value::Array(items.into_iter().map(param_to_json).collect()),
        ParamValue::Map(entries) => Value::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k, param_to_json(v)))
                .collect(),
        ),
        // Unsettled deferred values cannot appear in data after resolution.
        ParamValue::Var(_) | ParamValue::Computed(_) => Value::Null,
    }
}

/// Inputs to one resolution pass, lifted off the active leaf.
pub(crate) struct TrialInputs {
    pub node_id: paradigm0::NodeId,
    pub trial_index: u64,
    pub trial_type: String,
    pub params: Params,
    pub data: Params,
    pub post_trial_gap: Option<u64>,
}

/// Produce the resolved trial handed to the presenter: deferred values
/// settled, schema defaults filled, missing required parameters diagnosed.
pub(crate) fn resolve_trial(
    inputs: TrialInputs,
    schema: Option<&TrialInfo>,
    ctx: &EvalContext,
) -> ResolvedTrial {
    let TrialInputs {
        node_id,
        trial_index,
        trial_type,
        params,
        data,
        post_trial_gap,
    } = inputs;
    let mut params = resolve_params(params, schema, ctx);
    let data = resolve_data(data, ctx);

    if let Some(schema) = schema {
        for (name, info) in &schema.parameters {
            if params.contains_key(name) {
                continue;
            }
            match &info.default {
                Some(default) => {
                    params.insert(name.clone(), ParamValue::Value(default.clone()));
                }
                None => {
                    error!(
                        trial_type = %trial_type,
                        parameter = %name,
                        node_id = %node_id,
                        "missing required parameter; the presenter will see it absent"
                    );
                }
            }
        }
    }

    ResolvedTrial {
        node_id,
        trial_index,
        trial_type,
        params,
        data,
        post_trial_gap,
    }
}
