//! The declarative timeline description.
//!
//! A timeline is a tree: composite nodes own ordered children, timeline
//! variables, and sampling/loop configuration; trial-level leaves own a
//! parameter bag. The split is an explicit tagged union — a spec is
//! [`Timeline`] XOR [`Trial`] for its whole lifetime, checked by the type
//! system rather than by probing for a `timeline` field at use sites.
//!
//! Specs carry user callbacks (conditionals, loop functions, lifecycle
//! handlers), so they are authored through the builder API rather than
//! deserialized.
//!
//! [`Timeline`]: TimelineSpec::Timeline
//! [`Trial`]: TimelineSpec::Trial

use crate::trial::{EvalContext, ParamValue, Params, ResolvedTrial, TrialRecord};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Decides once, when the timeline is first reached, whether it runs at all.
pub type ConditionalFn = dyn Fn(&EvalContext) -> bool + Send + Sync;

/// Decides, after a timeline completes all repetitions, whether the whole
/// subtree runs again. Receives every record generated under the timeline's
/// node id during the pass.
pub type LoopFn = dyn Fn(&EvalContext, &[TrialRecord]) -> bool + Send + Sync;

/// Lifecycle callback on a timeline (start of first variable set / finish of
/// each repetition).
pub type TimelineCallback = dyn Fn(&EvalContext) + Send + Sync;

/// Trial lifecycle callback receiving the resolved parameter bag
/// (`on_start`, `on_load`).
pub type TrialCallback = dyn Fn(&ResolvedTrial) + Send + Sync;

/// Trial completion callback receiving the finalized result record.
pub type TrialFinishCallback = dyn Fn(&TrialRecord) + Send + Sync;

/// User-supplied ordering policy: maps the default index order to the order
/// actually traversed.
pub type CustomSampleFn = dyn Fn(&[usize]) -> Vec<usize> + Send + Sync;

/// One row of bound timeline-variable values, consumed by one pass over a
/// timeline's children.
pub type VariableSet = Map<String, Value>;

/// How a timeline orders and samples its variable sets each pass.
///
/// This enum is closed on purpose: an unrecognized policy is unrepresentable,
/// and bespoke orderings go through [`Custom`](Self::Custom).
#[derive(Clone)]
pub enum SamplingSpec {
    /// `size` independent draws, optionally weighted.
    WithReplacement {
        /// Number of draws.
        size: usize,
        /// Per-variable-set weights; must match the variable-set count.
        weights: Option<Vec<f64>>,
    },
    /// A random subset of `size` distinct variable sets.
    WithoutReplacement {
        /// Number of distinct sets to keep.
        size: usize,
    },
    /// Every variable set exactly `size` times, shuffled.
    FixedRepetitions {
        /// Repetitions per variable set.
        size: usize,
    },
    /// Round-robin interleave of independently shuffled index groups.
    AlternateGroups {
        /// Groups of variable-set indices.
        groups: Vec<Vec<usize>>,
        /// Whether the group order itself is shuffled.
        randomize_group_order: bool,
    },
    /// A user-supplied ordering function.
    Custom(Arc<CustomSampleFn>),
}

impl fmt::Debug for SamplingSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WithReplacement { size, weights } => f
                .debug_struct("WithReplacement")
                .field("size", size)
                .field("weights", weights)
                .finish(),
            Self::WithoutReplacement { size } => f
                .debug_struct("WithoutReplacement")
                .field("size", size)
                .finish(),
            Self::FixedRepetitions { size } => f
                .debug_struct("FixedRepetitions")
                .field("size", size)
                .finish(),
            Self::AlternateGroups {
                groups,
                randomize_group_order,
            } => f
                .debug_struct("AlternateGroups")
                .field("groups", groups)
                .field("randomize_group_order", randomize_group_order)
                .finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A node of the declarative timeline description.
#[derive(Debug, Clone)]
pub enum TimelineSpec {
    /// A block owning ordered children plus sampling/loop configuration.
    Timeline(CompositeSpec),
    /// A single trial: a parameter bag handed to a presenter.
    Trial(LeafSpec),
}

impl TimelineSpec {
    /// Whether this spec is a timeline block.
    pub fn is_timeline(&self) -> bool {
        matches!(self, Self::Timeline(_))
    }

    /// Whether this spec is a trial leaf.
    pub fn is_trial(&self) -> bool {
        matches!(self, Self::Trial(_))
    }
}

impl From<CompositeSpec> for TimelineSpec {
    fn from(spec: CompositeSpec) -> Self {
        Self::Timeline(spec)
    }
}

impl From<LeafSpec> for TimelineSpec {
    fn from(spec: LeafSpec) -> Self {
        Self::Trial(spec)
    }
}

/// A timeline block: ordered children, variable sets, sampling and loop
/// configuration, and shared trial defaults merged under child overrides.
#[derive(Clone)]
pub struct CompositeSpec {
    /// Ordered child specs.
    pub children: Vec<TimelineSpec>,
    /// Variable sets; one pass over the children runs per (sampled) set.
    /// Empty means a single pass with no bindings.
    pub timeline_variables: Vec<VariableSet>,
    /// Sampling policy for the variable-set order.
    pub sampling: Option<SamplingSpec>,
    /// Whether the (possibly sampled) order is shuffled each pass.
    pub randomize_order: bool,
    /// Full passes over all variable sets. Defaults to 1.
    pub repetitions: usize,
    /// Gate evaluated once when the block is first reached.
    pub conditional: Option<Arc<ConditionalFn>>,
    /// Post-completion loop decision.
    pub loop_fn: Option<Arc<LoopFn>>,
    /// Runs when the block starts its first variable set.
    pub on_timeline_start: Option<Arc<TimelineCallback>>,
    /// Runs when the block finishes a repetition.
    pub on_timeline_finish: Option<Arc<TimelineCallback>>,
    /// Shared trial defaults, merged key-wise under child overrides.
    pub defaults: LeafSpec,
}

impl Default for CompositeSpec {
    fn default() -> Self {
        Self {
            children: Vec::new(),
            timeline_variables: Vec::new(),
            sampling: None,
            randomize_order: false,
            repetitions: 1,
            conditional: None,
            loop_fn: None,
            on_timeline_start: None,
            on_timeline_finish: None,
            defaults: LeafSpec::default(),
        }
    }
}

impl CompositeSpec {
    /// An empty timeline block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a child spec.
    pub fn child(mut self, spec: impl Into<TimelineSpec>) -> Self {
        self.children.push(spec.into());
        self
    }

    /// Set the variable sets.
    pub fn variables(mut self, sets: Vec<VariableSet>) -> Self {
        self.timeline_variables = sets;
        self
    }

    /// Set the sampling policy.
    pub fn sampling(mut self, sampling: SamplingSpec) -> Self {
        self.sampling = Some(sampling);
        self
    }

    /// Shuffle the traversal order each pass.
    pub fn randomize_order(mut self) -> Self {
        self.randomize_order = true;
        self
    }

    /// Set the number of full passes.
    pub fn repetitions(mut self, n: usize) -> Self {
        self.repetitions = n;
        self
    }

    /// Gate the block on a conditional.
    pub fn conditional(
        mut self,
        f: impl Fn(&EvalContext) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.conditional = Some(Arc::new(f));
        self
    }

    /// Re-run the subtree while the loop function returns true.
    pub fn loop_while(
        mut self,
        f: impl Fn(&EvalContext, &[TrialRecord]) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.loop_fn = Some(Arc::new(f));
        self
    }

    /// Run a callback when the block starts.
    pub fn on_timeline_start(mut self, f: impl Fn(&EvalContext) + Send + Sync + 'static) -> Self {
        self.on_timeline_start = Some(Arc::new(f));
        self
    }

    /// Run a callback when the block finishes a repetition.
    pub fn on_timeline_finish(mut self, f: impl Fn(&EvalContext) + Send + Sync + 'static) -> Self {
        self.on_timeline_finish = Some(Arc::new(f));
        self
    }

    /// Set the shared trial defaults children inherit.
    pub fn defaults(mut self, defaults: LeafSpec) -> Self {
        self.defaults = defaults;
        self
    }
}

impl fmt::Debug for CompositeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeSpec")
            .field("children", &self.children)
            .field("timeline_variables", &self.timeline_variables)
            .field("sampling", &self.sampling)
            .field("randomize_order", &self.randomize_order)
            .field("repetitions", &self.repetitions)
            .field("conditional", &self.conditional.as_ref().map(|_| "<fn>"))
            .field("loop_fn", &self.loop_fn.as_ref().map(|_| "<fn>"))
            .finish_non_exhaustive()
    }
}

/// A trial-level spec: the parameter bag one presenter consumes.
#[derive(Clone, Default)]
pub struct LeafSpec {
    /// Trial type discriminator; may be inherited from composite defaults.
    /// A leaf reached with no effective type is a malformed-spec diagnostic.
    pub trial_type: Option<String>,
    /// The parameter bag, possibly containing deferred values.
    pub params: Params,
    /// Declared result-data defaults merged into the final record.
    pub data: Params,
    /// Gap before the next trial starts, in milliseconds.
    pub post_trial_gap: Option<u64>,
    /// Runs after resolution, before presentation.
    pub on_start: Option<Arc<TrialCallback>>,
    /// Runs when the presenter signals the stimulus has loaded.
    pub on_load: Option<Arc<TrialCallback>>,
    /// Runs after the result record is finalized.
    pub on_finish: Option<Arc<TrialFinishCallback>>,
}

impl LeafSpec {
    /// A trial of the given type.
    pub fn new(trial_type: impl Into<String>) -> Self {
        Self {
            trial_type: Some(trial_type.into()),
            ..Self::default()
        }
    }

    /// A trial with no type of its own — the type must come from composite
    /// defaults, or the leaf is malformed.
    pub fn untyped() -> Self {
        Self::default()
    }

    /// Set a parameter.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Set a declared result-data default.
    pub fn data(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.data.insert(name.into(), value.into());
        self
    }

    /// Set the post-trial gap in milliseconds.
    pub fn post_trial_gap(mut self, ms: u64) -> Self {
        self.post_trial_gap = Some(ms);
        self
    }

    /// Run a callback after resolution, before presentation.
    pub fn on_start(mut self, f: impl Fn(&ResolvedTrial) + Send + Sync + 'static) -> Self {
        self.on_start = Some(Arc::new(f));
        self
    }

    /// Run a callback when the stimulus has loaded.
    pub fn on_load(mut self, f: impl Fn(&ResolvedTrial) + Send + Sync + 'static) -> Self {
        self.on_load = Some(Arc::new(f));
        self
    }

    /// Run a callback once the result record is finalized.
    pub fn on_finish(mut self, f: impl Fn(&TrialRecord) + Send + Sync + 'static) -> Self {
        self.on_finish = Some(Arc::new(f));
        self
    }

    /// Merge `parent` defaults under this spec's own settings, key-wise.
    /// Own values win; `params` and `data` merge entry-by-entry.
    pub fn merged_over(&self, parent: &LeafSpec) -> LeafSpec {
        let mut params = parent.params.clone();
        params.extend(self.params.clone());
        let mut data = parent.data.clone();
        data.extend(self.data.clone());
        LeafSpec {
            trial_type: self.trial_type.clone().or_else(|| parent.trial_type.clone()),
            params,
            data,
            post_trial_gap: self.post_trial_gap.or(parent.post_trial_gap),
            on_start: self.on_start.clone().or_else(|| parent.on_start.clone()),
            on_load: self.on_load.clone().or_else(|| parent.on_load.clone()),
            on_finish: self.on_finish.clone().or_else(|| parent.on_finish.clone()),
        }
    }
}

impl fmt::Debug for LeafSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafSpec")
            .field("trial_type", &self.trial_type)
            .field("params", &self.params)
            .field("data", &self.data)
            .field("post_trial_gap", &self.post_trial_gap)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn leaf_overrides_win_key_wise() {
        let parent = LeafSpec::new("probe")
            .param("stimulus", "default")
            .param("duration", 500i64)
            .data("block", "practice");
        let child = LeafSpec::untyped()
            .param("stimulus", "override")
            .data("item", 3i64);
        let merged = child.merged_over(&parent);
        assert_eq!(merged.trial_type.as_deref(), Some("probe"));
        assert_eq!(
            merged.params.get("stimulus").unwrap().as_value(),
            Some(&json!("override"))
        );
        assert_eq!(
            merged.params.get("duration").unwrap().as_value(),
            Some(&json!(500))
        );
        assert!(merged.data.contains_key("block"));
        assert!(merged.data.contains_key("item"));
    }

    #[test]
    fn spec_is_composite_xor_leaf() {
        let spec: TimelineSpec = CompositeSpec::new().into();
        assert!(spec.is_timeline() && !spec.is_trial());
        let spec: TimelineSpec = LeafSpec::new("probe").into();
        assert!(spec.is_trial() && !spec.is_timeline());
    }
}
