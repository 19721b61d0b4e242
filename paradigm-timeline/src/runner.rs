//! The experiment runner — drives the timeline tree through
//! advance/complete cycles.
//!
//! One logical thread of control: the runner owns the tree, the random
//! source, and the registries, and is the only writer of timeline state.
//! Cooperative suspension happens at exactly one point — awaiting the
//! presenter's result — and the only operations permitted during that
//! suspension are pause/resume/end bookkeeping on the shared
//! [`ExperimentHandle`]. Trial N's completion (record appended, hooks
//! fired) always finishes strictly before trial N+1 begins; an inter-trial
//! gap delays only the start of N+1.

use crate::node::{ActiveTrial, Host, TimelineNode};
use crate::resolve::{self, TrialInputs};
use paradigm_hooks::HookRegistry;
use paradigm0::error::{RunError, SpecError};
use paradigm0::hook::{HookAction, HookContext, HookPoint};
use paradigm0::ledger::DataLedger;
use paradigm0::presenter::Presenter;
use paradigm0::spec::{CompositeSpec, LeafSpec, TimelineSpec};
use paradigm0::trial::{EvalContext, ResolvedTrial, TrialRecord, TrialResult};
use paradigm0::NodeId;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, error, info};

/// Presenters by trial type name.
pub struct PresenterRegistry {
    presenters: HashMap<String, Arc<dyn Presenter>>,
}

impl PresenterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            presenters: HashMap::new(),
        }
    }

    /// Register a presenter under its declared trial type name.
    pub fn register(&mut self, presenter: Arc<dyn Presenter>) {
        self.presenters
            .insert(presenter.info().name.clone(), presenter);
    }

    /// Look up the presenter for a trial type.
    pub fn get(&self, trial_type: &str) -> Option<&Arc<dyn Presenter>> {
        self.presenters.get(trial_type)
    }
}

impl Default for PresenterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Host configuration consumed by the runner.
#[derive(Debug, Clone, Default)]
pub struct ExperimentConfig {
    /// Gap between trials when a trial declares none, in milliseconds.
    pub default_iti_ms: u64,
    /// Seed for the experiment's random source. `None` seeds from entropy;
    /// setting it makes sampling and trial order fully reproducible.
    pub seed: Option<u64>,
}

/// The runner's lifecycle. `Finished` is terminal — no further mutation of
/// the timeline tree is valid past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Constructed, not yet run.
    Idle,
    /// Between `run()` and completion.
    Running,
    /// Deferred advance: the next trial will not start until resumed.
    Paused,
    /// The root timeline reported done (or the experiment was ended).
    Finished,
}

/// Progress summary for reporting surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentProgress {
    /// Estimated total trials (conditionals assumed true, loops once).
    pub total_trials: usize,
    /// Global trial counter value.
    pub current_trial_global: u64,
    /// Completed share, grouped at the first child level.
    pub percent_complete: f64,
}

struct Control {
    paused: AtomicBool,
    ended: AtomicBool,
    end_reason: Mutex<Option<String>>,
    resume: Notify,
}

/// Shared pause/resume/end surface, usable while the runner is suspended on
/// a presenter. Pausing defers the next advance; resuming performs any
/// deferred advance immediately; ending finishes the experiment after the
/// in-flight trial settles.
#[derive(Clone)]
pub struct ExperimentHandle {
    control: Arc<Control>,
}

impl ExperimentHandle {
    /// Defer the next advance until [`resume`](Self::resume).
    pub fn pause(&self) {
        self.control.paused.store(true, Ordering::SeqCst);
    }

    /// Clear the pause flag and perform any deferred advance immediately.
    pub fn resume(&self) {
        self.control.paused.store(false, Ordering::SeqCst);
        self.control.resume.notify_waiters();
    }

    /// Whether the experiment is currently pausing between trials.
    pub fn is_paused(&self) -> bool {
        self.control.paused.load(Ordering::SeqCst)
    }

    /// End the experiment once the current trial settles. Remaining
    /// children and loop/repetition logic do not run.
    pub fn end_experiment(&self, reason: impl Into<String>) {
        *lock_reason(&self.control) = Some(reason.into());
        self.control.ended.store(true, Ordering::SeqCst);
        // A paused experiment still has to observe the end request.
        self.control.resume.notify_waiters();
    }
}

/// Drives one root timeline through advance/complete cycles, handing
/// resolved trials to presenters and completion records to the ledger.
pub struct ExperimentRunner {
    root: TimelineNode,
    presenters: PresenterRegistry,
    ledger: Arc<dyn DataLedger>,
    hooks: HookRegistry,
    rng: StdRng,
    config: ExperimentConfig,
    control: Arc<Control>,
    state: RunState,
    trial_index: u64,
    trials_completed: u64,
    current_trial_finished: bool,
    started_at: Option<Instant>,
}

impl ExperimentRunner {
    /// Build the runtime tree for a timeline description and wire up the
    /// collaborators. Fails fast on an empty timeline — advancing without a
    /// tree is a precondition violation, not a recoverable state.
    pub fn new(
        timeline: Vec<TimelineSpec>,
        presenters: PresenterRegistry,
        ledger: Arc<dyn DataLedger>,
        hooks: HookRegistry,
        config: ExperimentConfig,
    ) -> Result<Self, RunError> {
        if timeline.is_empty() {
            return Err(RunError::EmptyTimeline);
        }
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let root_spec = CompositeSpec {
            children: timeline,
            ..CompositeSpec::default()
        };
        let root = TimelineNode::build(
            TimelineSpec::Timeline(root_spec),
            &LeafSpec::untyped(),
            0,
            &mut rng,
        );
        Ok(Self {
            root,
            presenters,
            ledger,
            hooks,
            rng,
            config,
            control: Arc::new(Control {
                paused: AtomicBool::new(false),
                ended: AtomicBool::new(false),
                end_reason: Mutex::new(None),
                resume: Notify::new(),
            }),
            state: RunState::Idle,
            trial_index: 0,
            trials_completed: 0,
            current_trial_finished: false,
            started_at: None,
        })
    }

    /// The shared pause/resume/end surface.
    pub fn handle(&self) -> ExperimentHandle {
        ExperimentHandle {
            control: Arc::clone(&self.control),
        }
    }

    /// The runner's lifecycle state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Progress summary for reporting surfaces.
    pub fn progress(&self) -> ExperimentProgress {
        ExperimentProgress {
            total_trials: self.root.length(),
            current_trial_global: self.trial_index,
            percent_complete: self.root.percent_complete(),
        }
    }

    /// The result store.
    pub fn ledger(&self) -> &Arc<dyn DataLedger> {
        &self.ledger
    }

    /// Resolve one timeline variable against the currently active trial.
    pub fn timeline_variable(&self, name: &str) -> Option<Value> {
        self.root.timeline_variable(name)
    }

    /// Append a spec to the end of the root timeline — the dynamic
    /// extension path, valid while running.
    pub fn insert(&mut self, spec: TimelineSpec) -> Result<(), RunError> {
        let mut host = Host {
            rng: &mut self.rng,
            ledger: &*self.ledger,
        };
        self.root.insert(spec, &mut host)?;
        Ok(())
    }

    /// Force-mark the timeline owning the active trial done.
    pub fn end_current_timeline(&mut self) {
        self.root.end_active_node();
    }

    /// Run the experiment to completion.
    ///
    /// Advances the root once, then loops: resolve the active trial, hand
    /// it to its presenter, await the result (the single suspension point),
    /// record completion, honor the inter-trial gap and any pause, request
    /// the next trial. Resolves when the root reports done.
    pub async fn run(&mut self) -> Result<(), RunError> {
        if self.state == RunState::Finished {
            return Err(RunError::AlreadyFinished);
        }
        self.state = RunState::Running;
        self.started_at = Some(Instant::now());
        info!(total_trials = self.root.length(), "experiment starting");

        let mut done = self.advance_root();
        while !done && !self.control.ended.load(Ordering::SeqCst) {
            let gap_ms = self.run_current_trial().await?;

            if self.control.ended.load(Ordering::SeqCst) {
                break;
            }
            if gap_ms > 0 {
                tokio::time::sleep(Duration::from_millis(gap_ms)).await;
            }
            // Pause gate: register interest before re-checking the flag so
            // a resume between the check and the await cannot be missed.
            loop {
                let resumed = self.control.resume.notified();
                if !self.control.paused.load(Ordering::SeqCst) {
                    break;
                }
                self.state = RunState::Paused;
                resumed.await;
            }
            self.state = RunState::Running;
            if self.control.ended.load(Ordering::SeqCst) {
                break;
            }

            self.trial_index += 1;
            self.root.mark_current_trial_complete();
            done = self.advance_root();
        }

        self.finish_experiment();
        Ok(())
    }

    fn advance_root(&mut self) -> bool {
        let mut host = Host {
            rng: &mut self.rng,
            ledger: &*self.ledger,
        };
        self.root.advance(None, &Map::new(), &mut host)
    }

    /// Dispatch the active trial and settle its completion. Returns the gap
    /// to wait before the next trial starts.
    async fn run_current_trial(&mut self) -> Result<u64, RunError> {
        let active = self.root.active_trial(None).ok_or(RunError::NoActiveTrial)?;
        self.current_trial_finished = false;

        // Malformed leaves produce a locatable diagnostic record and
        // best-effort continuation — never a silent skip.
        if let Some(diagnosis) = active.invalid.clone() {
            return self.record_malformed(&active, diagnosis);
        }
        let Some(trial_type) = active.trial_type.clone() else {
            let diagnosis = SpecError::MissingTrialType.to_string();
            return self.record_malformed(&active, diagnosis);
        };
        let Some(presenter) = self.presenters.get(&trial_type).map(Arc::clone) else {
            let diagnosis = SpecError::UnknownTrialType(trial_type).to_string();
            return self.record_malformed(&active, diagnosis);
        };

        // Resolution happens after the active-child pointer update and
        // before the presenter runs, against the active trial's bindings.
        let ctx = EvalContext::new(active.node_id.clone(), self.root.all_timeline_variables());
        let resolved = resolve::resolve_trial(
            TrialInputs {
                node_id: active.node_id.clone(),
                trial_index: self.trial_index,
                trial_type,
                params: active.params.clone(),
                data: active.data.clone(),
                post_trial_gap: active.post_trial_gap,
            },
            Some(presenter.info()),
            &ctx,
        );

        match self.fire_trial_hooks(HookPoint::TrialStart, &resolved) {
            HookOutcome::Continue => {}
            HookOutcome::Ended => return Ok(0),
        }
        if let Some(on_start) = &active.on_start {
            on_start(&resolved);
        }

        debug!(node_id = %resolved.node_id, trial_type = %resolved.trial_type, "presenting trial");
        let on_load = active.on_load.clone();
        let loaded_trial = resolved.clone();
        let loaded = move || {
            if let Some(f) = &on_load {
                f(&loaded_trial);
            }
        };
        let result = presenter.present(&resolved, &loaded).await?;

        self.finish_trial(&active, &resolved, result)
    }

    /// Idempotent completion: merge result data, append the record, fire
    /// completion callbacks and hooks. A second completion for the same
    /// trial is a no-op.
    fn finish_trial(
        &mut self,
        active: &ActiveTrial,
        resolved: &ResolvedTrial,
        result: TrialResult,
    ) -> Result<u64, RunError> {
        if self.current_trial_finished {
            return Ok(0);
        }
        self.current_trial_finished = true;
        self.trials_completed += 1;

        // Merge order: presenter result, then declared data defaults, then
        // runtime fields — later wins.
        let mut data = result;
        for (k, v) in &resolved.data {
            data.insert(k.clone(), v.clone());
        }
        data.insert("trial_type".into(), Value::from(resolved.trial_type.clone()));
        data.insert("trial_index".into(), Value::from(resolved.trial_index));
        data.insert(
            "internal_node_id".into(),
            Value::from(resolved.node_id.to_string()),
        );
        let record = TrialRecord {
            node_id: resolved.node_id.clone(),
            trial_index: resolved.trial_index,
            trial_type: resolved.trial_type.clone(),
            time_elapsed_ms: self.elapsed_ms(),
            data,
        };

        self.ledger.append(record.clone())?;
        if let Some(on_finish) = &active.on_finish {
            on_finish(&record);
        }
        match self.fire_record_hooks(HookPoint::TrialFinish, &record) {
            HookOutcome::Continue => {}
            HookOutcome::Ended => return Ok(0),
        }
        match self.fire_record_hooks(HookPoint::DataUpdate, &record) {
            HookOutcome::Continue => {}
            HookOutcome::Ended => return Ok(0),
        }

        Ok(resolved
            .post_trial_gap
            .unwrap_or(self.config.default_iti_ms))
    }

    fn record_malformed(
        &mut self,
        active: &ActiveTrial,
        diagnosis: String,
    ) -> Result<u64, RunError> {
        error!(node_id = %active.node_id, "malformed trial: {diagnosis}");
        let mut data = Map::new();
        data.insert("error".into(), Value::from(diagnosis));
        data.insert("trial_index".into(), Value::from(self.trial_index));
        data.insert(
            "internal_node_id".into(),
            Value::from(active.node_id.to_string()),
        );
        let record = TrialRecord {
            node_id: active.node_id.clone(),
            trial_index: self.trial_index,
            trial_type: active.trial_type.clone().unwrap_or_default(),
            time_elapsed_ms: self.elapsed_ms(),
            data,
        };
        self.ledger.append(record)?;
        self.current_trial_finished = true;
        Ok(0)
    }

    fn finish_experiment(&mut self) {
        if self.state == RunState::Finished {
            return;
        }
        self.state = RunState::Finished;
        let mut ctx = HookContext::new(HookPoint::ExperimentFinish);
        ctx.trial_index = self.trial_index;
        let _ = self.hooks.dispatch(&ctx);
        let reason = lock_reason(&self.control).clone();
        match reason {
            Some(reason) => info!(trials = self.trials_completed, %reason, "experiment ended"),
            None => info!(trials = self.trials_completed, "experiment finished"),
        }
    }

    fn fire_trial_hooks(&mut self, point: HookPoint, resolved: &ResolvedTrial) -> HookOutcome {
        let mut ctx = HookContext::new(point);
        ctx.node_id = Some(resolved.node_id.clone());
        ctx.trial_index = resolved.trial_index;
        ctx.trial_type = Some(resolved.trial_type.clone());
        self.apply_hook_action(self.hooks.dispatch(&ctx), &resolved.node_id)
    }

    fn fire_record_hooks(&mut self, point: HookPoint, record: &TrialRecord) -> HookOutcome {
        let mut ctx = HookContext::new(point);
        ctx.node_id = Some(record.node_id.clone());
        ctx.trial_index = record.trial_index;
        ctx.trial_type = Some(record.trial_type.clone());
        ctx.record = Some(record.clone());
        self.apply_hook_action(self.hooks.dispatch(&ctx), &record.node_id)
    }

    fn apply_hook_action(&mut self, action: HookAction, node_id: &NodeId) -> HookOutcome {
        match action {
            HookAction::Continue => HookOutcome::Continue,
            HookAction::EndCurrentTimeline { reason } => {
                info!(%node_id, %reason, "hook ended the current timeline");
                self.root.end_active_node();
                HookOutcome::Continue
            }
            HookAction::EndExperiment { reason } => {
                info!(%node_id, %reason, "hook ended the experiment");
                *lock_reason(&self.control) = Some(reason);
                self.control.ended.store(true, Ordering::SeqCst);
                HookOutcome::Ended
            }
            _ => HookOutcome::Continue,
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.started_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }
}

fn lock_reason(control: &Control) -> std::sync::MutexGuard<'_, Option<String>> {
    control
        .end_reason
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

enum HookOutcome {
    Continue,
    Ended,
}
