//! A hook that counts its invocations, optionally ending the experiment.

use crate::error::HookError;
use crate::hook::{ExperimentHook, HookAction, HookContext, HookPoint};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Counts events per hook point. With [`end_after`], returns
/// `EndExperiment` once a given number of trials have finished — the
/// simplest cancellation-path exerciser.
///
/// [`end_after`]: CountingHook::end_after
pub struct CountingHook {
    points: Vec<HookPoint>,
    counts: Mutex<BTreeMap<&'static str, usize>>,
    end_after_finishes: Option<usize>,
}

fn point_name(point: HookPoint) -> &'static str {
    match point {
        HookPoint::TrialStart => "trial_start",
        HookPoint::TrialFinish => "trial_finish",
        HookPoint::DataUpdate => "data_update",
        HookPoint::ExperimentFinish => "experiment_finish",
    }
}

impl CountingHook {
    /// Count every hook point.
    pub fn new() -> Self {
        Self {
            points: vec![
                HookPoint::TrialStart,
                HookPoint::TrialFinish,
                HookPoint::DataUpdate,
                HookPoint::ExperimentFinish,
            ],
            counts: Mutex::new(BTreeMap::new()),
            end_after_finishes: None,
        }
    }

    /// End the experiment after `n` trials have finished.
    pub fn end_after(mut self, n: usize) -> Self {
        self.end_after_finishes = Some(n);
        self
    }

    /// How many times the given point has fired.
    pub fn count(&self, point: HookPoint) -> usize {
        *self
            .counts
            .lock()
            .unwrap()
            .get(point_name(point))
            .unwrap_or(&0)
    }
}

impl Default for CountingHook {
    fn default() -> Self {
        Self::new()
    }
}

impl ExperimentHook for CountingHook {
    fn points(&self) -> &[HookPoint] {
        &self.points
    }

    fn on_event(&self, ctx: &HookContext) -> Result<HookAction, HookError> {
        let mut counts = self.counts.lock().unwrap();
        let entry = counts.entry(point_name(ctx.point)).or_insert(0);
        *entry += 1;
        if ctx.point == HookPoint::TrialFinish {
            if let Some(limit) = self.end_after_finishes {
                if *entry >= limit {
                    return Ok(HookAction::EndExperiment {
                        reason: format!("reached {limit} completed trials"),
                    });
                }
            }
        }
        Ok(HookAction::Continue)
    }
}
