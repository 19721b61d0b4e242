//! Declared parameter schemas — what each trial type accepts.
//!
//! Each presenter publishes a [`TrialInfo`]: the trial type's name plus a
//! [`ParamInfo`] per parameter. The engine checks resolved trials against
//! this schema instead of discovering shape mismatches at use: defaults fill
//! absent parameters, missing required parameters produce a diagnostic, and
//! `Function`-typed parameters are exempt from eager evaluation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The declared type of one trial parameter.
///
/// `Function` is load-bearing for resolution: a deferred value whose target
/// parameter is declared `Function` passes through unevaluated, because the
/// presenter wants to call it itself mid-trial.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    /// Boolean flag.
    Bool,
    /// Plain string.
    String,
    /// Integer.
    Int,
    /// Floating point number.
    Float,
    /// A single response key.
    Key,
    /// A set of response keys.
    Keys,
    /// Markup handed verbatim to the presentation layer.
    HtmlString,
    /// Structured object.
    Object,
    /// A callable the presenter invokes itself; never eagerly evaluated.
    Function,
    /// Nested compound parameter.
    Complex,
}

/// Schema entry for one parameter: declared type plus optional default.
///
/// A parameter with no default is required — resolving a trial that omits it
/// produces a diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamInfo {
    /// The declared type.
    pub param_type: ParamType,
    /// Value used when the trial omits the parameter. `None` = required.
    pub default: Option<Value>,
}

impl ParamInfo {
    /// A required parameter of the given type.
    pub fn new(param_type: ParamType) -> Self {
        Self {
            param_type,
            default: None,
        }
    }

    /// Attach a default, making the parameter optional.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Whether the trial must supply this parameter itself.
    pub fn required(&self) -> bool {
        self.default.is_none()
    }
}

/// A trial type's declared interface: its name and parameter schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialInfo {
    /// The trial type name trials reference as their discriminator.
    pub name: String,
    /// Declared parameters, by name.
    pub parameters: BTreeMap<String, ParamInfo>,
}

impl TrialInfo {
    /// Create a schema with no parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Declare a parameter.
    pub fn param(mut self, name: impl Into<String>, info: ParamInfo) -> Self {
        self.parameters.insert(name.into(), info);
        self
    }

    /// Look up a parameter's schema entry.
    pub fn parameter(&self, name: &str) -> Option<&ParamInfo> {
        self.parameters.get(name)
    }
}
