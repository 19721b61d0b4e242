#![deny(missing_docs)]
//! Hook registry and composition for paradigm.
//!
//! The [`HookRegistry`] collects multiple [`ExperimentHook`] implementations
//! into an ordered pipeline. At each lifecycle point, hooks are dispatched
//! in registration order, synchronously. The pipeline short-circuits on
//! `EndCurrentTimeline` or `EndExperiment` — subsequent hooks are not
//! called. Hook errors are logged and the pipeline continues (errors don't
//! end anything).

use paradigm0::hook::{ExperimentHook, HookAction, HookContext};
use std::sync::Arc;
use tracing::warn;

/// A registry that dispatches lifecycle events to an ordered pipeline of
/// hooks.
///
/// Hooks are called in the order they were registered, only at the points
/// they declared. The pipeline short-circuits on any action other than
/// `Continue` (except errors, which are logged and ignored).
pub struct HookRegistry {
    hooks: Vec<Arc<dyn ExperimentHook>>,
}

impl HookRegistry {
    /// Create a new empty hook registry.
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Add a hook to the end of the pipeline.
    pub fn add(&mut self, hook: Arc<dyn ExperimentHook>) {
        self.hooks.push(hook);
    }

    /// Number of registered hooks.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether the pipeline is empty.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Dispatch a lifecycle event through the pipeline.
    ///
    /// Returns the final action. If every hook returns `Continue`, the
    /// result is `Continue`. The first cancellation action stops the
    /// pipeline and is returned to the scheduler to apply.
    pub fn dispatch(&self, ctx: &HookContext) -> HookAction {
        for hook in &self.hooks {
            // Only dispatch to hooks registered for this point.
            if !hook.points().contains(&ctx.point) {
                continue;
            }
            match hook.on_event(ctx) {
                Ok(HookAction::Continue) => continue,
                Ok(action) => return action,
                Err(e) => {
                    warn!(point = ?ctx.point, "hook failed: {e}; continuing");
                    continue;
                }
            }
        }
        HookAction::Continue
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}
