//! The Hook interface — observation and cancellation at lifecycle points.

use crate::error::HookError;
use crate::id::NodeId;
use crate::trial::TrialRecord;
use serde::{Deserialize, Serialize};

/// Where in the experiment lifecycle a hook fires.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPoint {
    /// After a trial is resolved, before its presenter runs.
    TrialStart,
    /// After a trial's result record is finalized.
    TrialFinish,
    /// After the finalized record lands in the ledger.
    DataUpdate,
    /// Once, when the root timeline reports done.
    ExperimentFinish,
}

/// What context is available to a hook at its firing point. Read-only —
/// hooks observe and decide; intervention happens via [`HookAction`].
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct HookContext {
    /// Current hook point.
    pub point: HookPoint,
    /// The active node (absent at `ExperimentFinish`).
    pub node_id: Option<NodeId>,
    /// Global trial counter value.
    pub trial_index: u64,
    /// The active trial's type (absent at `ExperimentFinish`).
    pub trial_type: Option<String>,
    /// The finalized record (only at `TrialFinish` / `DataUpdate`).
    pub record: Option<TrialRecord>,
}

impl HookContext {
    /// Create a context with only the hook point set.
    pub fn new(point: HookPoint) -> Self {
        Self {
            point,
            node_id: None,
            trial_index: 0,
            trial_type: None,
            record: None,
        }
    }
}

/// What a hook decides to do.
///
/// Cancellation travels back to the scheduler as a value instead of a
/// reentrant call — the hook runs while the scheduler holds the timeline
/// tree, so asking it to mutate the tree directly would violate the
/// single-writer discipline.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HookAction {
    /// Continue normally.
    Continue,
    /// Force-mark the timeline owning the active trial done; remaining
    /// children and loop/repetition logic do not run.
    EndCurrentTimeline {
        /// Reason for ending the timeline.
        reason: String,
    },
    /// End the whole experiment after the current trial settles.
    EndExperiment {
        /// Reason for ending the experiment.
        reason: String,
    },
}

/// A hook that observes the experiment lifecycle and may request
/// cancellation.
///
/// Hooks are registered externally (host configuration) and dispatched
/// synchronously at the defined points — the engine never suspends inside a
/// hook. Handlers SHOULD complete quickly; a slow hook delays every trial.
///
/// Implementations:
/// - ProgressHook: update a completion indicator after each trial
/// - AccuracyHook: end a block early once performance plateaus
/// - AuditHook: mirror records to an external sink on DataUpdate
pub trait ExperimentHook: Send + Sync {
    /// Which points this hook fires at.
    fn points(&self) -> &[HookPoint];

    /// Called at each registered hook point.
    /// Returning an error does NOT halt the experiment — it is logged and
    /// dispatch continues. Use [`HookAction::EndExperiment`] to halt.
    fn on_event(&self, ctx: &HookContext) -> Result<HookAction, HookError>;
}
