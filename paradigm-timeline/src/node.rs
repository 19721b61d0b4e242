//! The timeline node — a recursive hierarchical trial state machine.
//!
//! A [`TimelineNode`] wraps one spec node at runtime: composites own their
//! children plus sampling/loop configuration; leaves own a trial parameter
//! bag. The tree is built once, advances exactly once per completed trial,
//! and mutates only through [`advance`], [`mark_current_trial_complete`],
//! [`reset`], and [`insert`].
//!
//! Ownership is strictly downward — a composite exclusively owns its
//! children, and there is no parent back-reference. Everything the original
//! design used the parent link for (upward variable search, loop re-entry)
//! is expressed as recursion from the root: ancestor bindings thread down
//! through [`advance`], and a loop re-entry re-enters the node's own
//! dispatch, which the parent's advance loop then revisits.
//!
//! [`advance`]: TimelineNode::advance
//! [`mark_current_trial_complete`]: TimelineNode::mark_current_trial_complete
//! [`reset`]: TimelineNode::reset
//! [`insert`]: TimelineNode::insert

use crate::sampling;
use paradigm0::error::SpecError;
use paradigm0::id::NodeId;
use paradigm0::ledger::DataLedger;
use paradigm0::spec::{
    CompositeSpec, ConditionalFn, LeafSpec, LoopFn, SamplingSpec, TimelineCallback, TimelineSpec,
    TrialCallback, TrialFinishCallback, VariableSet,
};
use paradigm0::trial::{EvalContext, Params};
use rand::RngCore;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::error;

/// Borrowed engine context threaded through tree mutation: the single
/// replaceable random source (order sampling) and the ledger (loop-function
/// data). Only the runner constructs one — the single-writer discipline is
/// visible in the signatures.
pub struct Host<'a> {
    /// The experiment's random source.
    pub rng: &'a mut dyn RngCore,
    /// The experiment's result store.
    pub ledger: &'a dyn DataLedger,
}

/// Mutable traversal state of one node.
#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    /// Index of the child currently being traversed; -1 = not started,
    /// `children.len()` = all children visited for the current variable set.
    pub current_location: isize,
    /// Position in `order` of the variable set currently in effect.
    pub current_variable_set: usize,
    /// Completed full passes over all variable sets.
    pub current_repetition: usize,
    /// Times this node has been reset (loop re-entry, repetition handling);
    /// feeds the node's identity string.
    pub current_iteration: usize,
    /// Whether this node and its subtree are complete. Monotonic except
    /// across a loop re-entry, which resets the subtree.
    pub done: bool,
    /// The sampled traversal order over variable-set indices; recomputed
    /// each time the node begins a fresh pass.
    pub order: Vec<usize>,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            current_location: -1,
            current_variable_set: 0,
            current_repetition: 0,
            current_iteration: 0,
            done: false,
            order: Vec::new(),
        }
    }
}

/// The explicit lifecycle state of a node, derived from its progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Never advanced (or freshly reset).
    NotStarted,
    /// Mid-traversal.
    Active,
    /// Complete, along with the whole subtree.
    Done,
}

struct CompositeState {
    children: Vec<TimelineNode>,
    variables: Vec<VariableSet>,
    sampling: Option<SamplingSpec>,
    randomize_order: bool,
    repetitions: usize,
    conditional: Option<Arc<ConditionalFn>>,
    loop_fn: Option<Arc<LoopFn>>,
    on_timeline_start: Option<Arc<TimelineCallback>>,
    on_timeline_finish: Option<Arc<TimelineCallback>>,
    /// Cumulative defaults (ancestors already folded in), used by `insert`.
    defaults: LeafSpec,
}

pub(crate) struct LeafState {
    pub(crate) trial_type: Option<String>,
    pub(crate) params: Params,
    pub(crate) data: Params,
    pub(crate) post_trial_gap: Option<u64>,
    pub(crate) on_start: Option<Arc<TrialCallback>>,
    pub(crate) on_load: Option<Arc<TrialCallback>>,
    pub(crate) on_finish: Option<Arc<TrialFinishCallback>>,
    /// Construction-time diagnosis; surfaces when the node is reached.
    pub(crate) invalid: Option<String>,
}

enum NodeKind {
    Composite(CompositeState),
    Leaf(LeafState),
}

/// A deep-copied snapshot of the active leaf, handed to the runner for
/// resolution and dispatch.
pub struct ActiveTrial {
    /// Identity of the leaf, including iteration counters.
    pub node_id: NodeId,
    /// Effective trial type (own or inherited).
    pub trial_type: Option<String>,
    /// The unresolved parameter bag.
    pub params: Params,
    /// The unresolved declared result-data defaults.
    pub data: Params,
    /// Gap before the next trial, in milliseconds.
    pub post_trial_gap: Option<u64>,
    /// Trial lifecycle callbacks.
    pub on_start: Option<Arc<TrialCallback>>,
    /// Fired when the presenter signals the stimulus has loaded.
    pub on_load: Option<Arc<TrialCallback>>,
    /// Fired once the result record is finalized.
    pub on_finish: Option<Arc<TrialFinishCallback>>,
    /// Construction-time diagnosis, if the leaf is malformed.
    pub invalid: Option<String>,
}

/// One runtime node of the timeline tree.
pub struct TimelineNode {
    index: usize,
    kind: NodeKind,
    progress: Progress,
}

impl TimelineNode {
    /// Build the runtime tree for a spec node. `inherited` is the cumulative
    /// defaults chain from enclosing timelines; the root passes an empty
    /// `LeafSpec`.
    pub fn build(
        spec: TimelineSpec,
        inherited: &LeafSpec,
        index: usize,
        rng: &mut dyn RngCore,
    ) -> Self {
        match spec {
            TimelineSpec::Timeline(composite) => {
                Self::build_composite(composite, inherited, index, rng)
            }
            TimelineSpec::Trial(leaf) => Self::build_leaf(leaf, inherited, index),
        }
    }

    fn build_composite(
        spec: CompositeSpec,
        inherited: &LeafSpec,
        index: usize,
        rng: &mut dyn RngCore,
    ) -> Self {
        let defaults = spec.defaults.merged_over(inherited);
        let variables = if spec.timeline_variables.is_empty() {
            vec![VariableSet::new()]
        } else {
            spec.timeline_variables
        };
        let children = spec
            .children
            .into_iter()
            .enumerate()
            .map(|(i, child)| Self::build(child, &defaults, i, rng))
            .collect();
        let mut state = CompositeState {
            children,
            variables,
            sampling: spec.sampling,
            randomize_order: spec.randomize_order,
            repetitions: spec.repetitions.max(1),
            conditional: spec.conditional,
            loop_fn: spec.loop_fn,
            on_timeline_start: spec.on_timeline_start,
            on_timeline_finish: spec.on_timeline_finish,
            defaults,
        };
        let order = sample_order(&state, rng);
        let mut node = Self {
            index,
            kind: NodeKind::Composite(state),
            progress: Progress::default(),
        };
        node.progress.order = order;
        node
    }

    fn build_leaf(spec: LeafSpec, inherited: &LeafSpec, index: usize) -> Self {
        let merged = spec.merged_over(inherited);
        let invalid = if merged.trial_type.is_none() {
            let diag = SpecError::MissingTrialType.to_string();
            error!(index, params = ?merged.params, "{diag}");
            Some(diag)
        } else {
            None
        };
        Self {
            index,
            kind: NodeKind::Leaf(LeafState {
                trial_type: merged.trial_type,
                params: merged.params,
                data: merged.data,
                post_trial_gap: merged.post_trial_gap,
                on_start: merged.on_start,
                on_load: merged.on_load,
                on_finish: merged.on_finish,
                invalid,
            }),
            progress: Progress::default(),
        }
    }

    /// This node's lifecycle state.
    pub fn state(&self) -> NodeState {
        if self.progress.done {
            NodeState::Done
        } else if self.progress.current_location < 0 {
            NodeState::NotStarted
        } else {
            NodeState::Active
        }
    }

    /// This node's traversal progress.
    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    /// Whether this node wraps a trial-level spec.
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    /// This node's id given its parent's id (`None` for the root).
    pub fn id(&self, parent_id: Option<&NodeId>) -> NodeId {
        match parent_id {
            None => NodeId::root(self.progress.current_iteration),
            Some(parent) => parent.child(self.index, self.progress.current_iteration),
        }
    }

    /// Advance toward the next runnable trial. Returns true iff this node
    /// and its whole subtree are done.
    ///
    /// `inherited` carries the timeline-variable bindings visible from the
    /// enclosing timelines (innermost last); the root passes an empty map.
    pub fn advance(
        &mut self,
        parent_id: Option<&NodeId>,
        inherited: &Map<String, Value>,
        host: &mut Host<'_>,
    ) -> bool {
        if self.progress.done {
            return true;
        }
        let own_id = self.id(parent_id);

        // Start phase: first entry for the current pass.
        if self.progress.current_location < 0 {
            if let NodeKind::Composite(state) = &self.kind {
                let first_entry = self.progress.current_repetition == 0
                    && self.progress.current_variable_set == 0;
                let conditional = state.conditional.clone();
                let on_start = state.on_timeline_start.clone();
                if first_entry {
                    if let Some(conditional) = conditional {
                        let ctx = self.eval_context(&own_id, inherited);
                        if !conditional(&ctx) {
                            self.progress.done = true;
                            return true;
                        }
                    }
                }
                if self.progress.current_variable_set == 0 {
                    if let Some(on_start) = on_start {
                        let ctx = self.eval_context(&own_id, inherited);
                        on_start(&ctx);
                    }
                }
            }
            self.progress.current_location = 0;
            return self.advance(parent_id, inherited, host);
        }

        let NodeKind::Composite(_) = &self.kind else {
            // An active leaf stays not-done until explicitly completed.
            return false;
        };

        // Child phase: advance children in order until one is runnable.
        let bindings = self.merged_bindings(inherited);
        loop {
            let location = self.progress.current_location as usize;
            let NodeKind::Composite(state) = &mut self.kind else {
                unreachable!()
            };
            if location >= state.children.len() {
                break;
            }
            let child_done = state.children[location].advance(Some(&own_id), &bindings, host);
            if !child_done {
                return false;
            }
            self.progress.current_location += 1;
        }

        // All children done: cycle variable sets, then repetitions.
        if self.progress.current_variable_set + 1 < self.progress.order.len() {
            self.next_variable_set(host);
            return self.advance(parent_id, inherited, host);
        }

        let (repetitions, on_finish, loop_fn) = {
            let NodeKind::Composite(state) = &self.kind else {
                unreachable!()
            };
            (
                state.repetitions,
                state.on_timeline_finish.clone(),
                state.loop_fn.clone(),
            )
        };

        if self.progress.current_repetition + 1 < repetitions {
            self.next_repetition(host);
            if let Some(on_finish) = &on_finish {
                let ctx = self.eval_context(&own_id, inherited);
                on_finish(&ctx);
            }
            return self.advance(parent_id, inherited, host);
        }

        if let Some(on_finish) = &on_finish {
            let ctx = self.eval_context(&own_id, inherited);
            on_finish(&ctx);
        }

        if let Some(loop_fn) = loop_fn {
            let generated = host.ledger.by_node_prefix(&own_id);
            let ctx = self.eval_context(&own_id, inherited);
            if loop_fn(&ctx, &generated) {
                self.reset(host);
                // Re-enter with the bumped iteration; the caller's advance
                // loop sees not-done and recurses back in.
                return self.advance(parent_id, inherited, host);
            }
        }

        self.progress.done = true;
        true
    }

    /// Set the active leaf's done flag — the only path by which a leaf
    /// becomes done, driven by the scheduler after its presenter completes.
    pub fn mark_current_trial_complete(&mut self) {
        match &mut self.kind {
            NodeKind::Leaf(_) => self.progress.done = true,
            NodeKind::Composite(state) => {
                let location = self.progress.current_location;
                if location >= 0 && (location as usize) < state.children.len() {
                    state.children[location as usize].mark_current_trial_complete();
                }
            }
        }
    }

    /// Restore this node and its subtree to NotStarted, re-deriving the
    /// traversal order and bumping the iteration counter that distinguishes
    /// repeated passes in the node's identity.
    pub fn reset(&mut self, host: &mut Host<'_>) {
        self.progress.current_location = -1;
        self.progress.current_variable_set = 0;
        self.progress.current_repetition = 0;
        self.progress.current_iteration += 1;
        self.progress.done = false;
        if let NodeKind::Composite(state) = &mut self.kind {
            self.progress.order = sample_order(state, host.rng);
            for child in &mut state.children {
                child.reset(host);
            }
        }
    }

    fn next_variable_set(&mut self, host: &mut Host<'_>) {
        self.progress.current_location = -1;
        self.progress.current_variable_set += 1;
        if let NodeKind::Composite(state) = &mut self.kind {
            for child in &mut state.children {
                child.reset(host);
            }
        }
    }

    fn next_repetition(&mut self, host: &mut Host<'_>) {
        self.progress.current_location = -1;
        self.progress.current_variable_set = 0;
        self.progress.current_repetition += 1;
        if let NodeKind::Composite(state) = &mut self.kind {
            self.progress.order = sample_order(state, host.rng);
            for child in &mut state.children {
                child.reset(host);
            }
        }
    }

    /// Force-mark this node done without running remaining children or
    /// loop/repetition logic.
    pub fn end(&mut self) {
        self.progress.done = true;
    }

    /// End whatever sub-timeline is running the current trial: the active
    /// leaf and its immediately enclosing timeline are both force-marked
    /// done.
    pub fn end_active_node(&mut self) {
        let Some(location) = clamp_location(&self.progress, self.child_count()) else {
            self.progress.done = true;
            return;
        };
        let NodeKind::Composite(state) = &mut self.kind else {
            self.progress.done = true;
            return;
        };
        if state.children[location].is_leaf() {
            state.children[location].end();
            self.progress.done = true;
        } else {
            state.children[location].end_active_node();
        }
    }

    /// Total leaf count, assuming every conditional currently true and every
    /// loop runs once — an estimate for progress reporting only.
    pub fn length(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf(_) => 1,
            NodeKind::Composite(state) => state.children.iter().map(TimelineNode::length).sum(),
        }
    }

    /// Share of trials completed, grouped at the first child level: a
    /// child's trials count once the child node itself is done.
    pub fn percent_complete(&self) -> f64 {
        match &self.kind {
            NodeKind::Leaf(_) => {
                if self.progress.done {
                    100.0
                } else {
                    0.0
                }
            }
            NodeKind::Composite(state) => {
                let total = self.length();
                if total == 0 {
                    return 100.0;
                }
                let completed: usize = state
                    .children
                    .iter()
                    .filter(|c| c.progress.done)
                    .map(|c| c.length())
                    .sum();
                completed as f64 / total as f64 * 100.0
            }
        }
    }

    /// Append a child spec to this timeline, inheriting its cumulative
    /// defaults — the dynamic/adaptive extension path. On a trial-level
    /// node this logs and is a no-op.
    pub fn insert(&mut self, spec: TimelineSpec, host: &mut Host<'_>) -> Result<(), SpecError> {
        match &mut self.kind {
            NodeKind::Leaf(_) => {
                error!("cannot add child nodes to a trial-level node");
                Err(SpecError::InsertOnLeaf)
            }
            NodeKind::Composite(state) => {
                let index = state.children.len();
                let defaults = state.defaults.clone();
                state
                    .children
                    .push(TimelineNode::build(spec, &defaults, index, host.rng));
                Ok(())
            }
        }
    }

    /// Identity of the leaf running the current trial.
    pub fn active_id(&self, parent_id: Option<&NodeId>) -> NodeId {
        let own_id = self.id(parent_id);
        match &self.kind {
            NodeKind::Leaf(_) => own_id,
            NodeKind::Composite(state) => {
                match clamp_location(&self.progress, state.children.len()) {
                    Some(location) => state.children[location].active_id(Some(&own_id)),
                    None => own_id,
                }
            }
        }
    }

    /// A deep-copied snapshot of the active leaf, or `None` when the active
    /// descent dead-ends in an empty composite.
    pub fn active_trial(&self, parent_id: Option<&NodeId>) -> Option<ActiveTrial> {
        let own_id = self.id(parent_id);
        match &self.kind {
            NodeKind::Leaf(leaf) => Some(ActiveTrial {
                node_id: own_id,
                trial_type: leaf.trial_type.clone(),
                params: leaf.params.clone(),
                data: leaf.data.clone(),
                post_trial_gap: leaf.post_trial_gap,
                on_start: leaf.on_start.clone(),
                on_load: leaf.on_load.clone(),
                on_finish: leaf.on_finish.clone(),
                invalid: leaf.invalid.clone(),
            }),
            NodeKind::Composite(state) => {
                let location = clamp_location(&self.progress, state.children.len())?;
                state.children[location].active_trial(Some(&own_id))
            }
        }
    }

    /// Resolve one timeline variable against the active descent
    /// (innermost binding wins).
    pub fn timeline_variable(&self, name: &str) -> Option<Value> {
        let mut bindings = Map::new();
        self.collect_variables(&mut bindings);
        bindings.get(name).cloned()
    }

    /// Every timeline-variable binding visible from the active trial.
    pub fn all_timeline_variables(&self) -> Map<String, Value> {
        let mut bindings = Map::new();
        self.collect_variables(&mut bindings);
        bindings
    }

    /// Overlay this node's current bindings and those of its active descent
    /// onto `acc`, deepest last so inner bindings win.
    pub(crate) fn collect_variables(&self, acc: &mut Map<String, Value>) {
        let NodeKind::Composite(state) = &self.kind else {
            return;
        };
        if let Some(set) = self.current_variable_bindings() {
            for (k, v) in set {
                acc.insert(k.clone(), v.clone());
            }
        }
        if let Some(location) = clamp_location(&self.progress, state.children.len()) {
            state.children[location].collect_variables(acc);
        }
    }

    /// The variable set currently in effect on this composite, if any.
    fn current_variable_bindings(&self) -> Option<&VariableSet> {
        let NodeKind::Composite(state) = &self.kind else {
            return None;
        };
        let set_index = *self.progress.order.get(self.progress.current_variable_set)?;
        state.variables.get(set_index)
    }

    /// Collect the parameter bags of every leaf with the given trial type.
    pub fn trials_of_type(&self, trial_type: &str) -> Vec<Params> {
        match &self.kind {
            NodeKind::Leaf(leaf) => {
                if leaf.trial_type.as_deref() == Some(trial_type) {
                    vec![leaf.params.clone()]
                } else {
                    Vec::new()
                }
            }
            NodeKind::Composite(state) => state
                .children
                .iter()
                .flat_map(|c| c.trials_of_type(trial_type))
                .collect(),
        }
    }

    fn child_count(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf(_) => 0,
            NodeKind::Composite(state) => state.children.len(),
        }
    }

    fn merged_bindings(&self, inherited: &Map<String, Value>) -> Map<String, Value> {
        let mut merged = inherited.clone();
        if let Some(set) = self.current_variable_bindings() {
            for (k, v) in set {
                merged.insert(k.clone(), v.clone());
            }
        }
        merged
    }

    /// Context for this node's own callbacks: ancestor bindings, this
    /// node's bindings, then the active descent below it.
    fn eval_context(&self, own_id: &NodeId, inherited: &Map<String, Value>) -> EvalContext {
        let mut bindings = inherited.clone();
        self.collect_variables(&mut bindings);
        EvalContext::new(own_id.clone(), bindings)
    }
}

/// Location clamped into the children range: callbacks that run before the
/// pass starts see the first child as active; callbacks that run after the
/// last child completes (loop functions) see the last one.
fn clamp_location(progress: &Progress, children: usize) -> Option<usize> {
    if children == 0 {
        return None;
    }
    let location = progress.current_location.max(0) as usize;
    Some(location.min(children - 1))
}

/// Compute the traversal order over variable-set indices for one pass,
/// applying the sampling policy and then the optional shuffle.
fn sample_order(state: &CompositeState, rng: &mut dyn RngCore) -> Vec<usize> {
    let base: Vec<usize> = (0..state.variables.len()).collect();
    let mut order = match &state.sampling {
        None => base,
        Some(SamplingSpec::Custom(f)) => f(&base),
        Some(SamplingSpec::WithReplacement { size, weights }) => {
            match sampling::sample_with_replacement(&base, *size, weights.as_deref(), rng) {
                Ok(order) => order,
                Err(e) => {
                    error!("with-replacement sampling failed: {e}; using default order");
                    base
                }
            }
        }
        Some(SamplingSpec::WithoutReplacement { size }) => {
            match sampling::sample_without_replacement(&base, *size, rng) {
                Ok(order) => order,
                Err(e) => {
                    error!("without-replacement sampling failed: {e}; using default order");
                    base
                }
            }
        }
        Some(SamplingSpec::FixedRepetitions { size }) => sampling::repeat(&base, *size, rng),
        Some(SamplingSpec::AlternateGroups {
            groups,
            randomize_group_order,
        }) => sampling::shuffle_alternate_groups(groups, *randomize_group_order, rng),
    };
    if state.randomize_order {
        order = sampling::shuffle(&order, rng);
    }
    order
}
