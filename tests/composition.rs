//! Proof of composability: the same timeline logic runs against swapped
//! presenters, ledgers, and hooks without the engine noticing.
//!
//! 1. **Presenter swap** — same timeline, different presentation layer
//! 2. **Ledger swap** — same experiment, different result store
//! 3. **Nested composition** — blocks, variables, sampling, loops together
//! 4. **Hook-driven adaptation** — a hook ends a block once accuracy is met
//!
//! All tests run without any real rendering by using test implementations.

use paradigm_hooks::HookRegistry;
use paradigm_ledger_memory::MemoryLedger;
use paradigm_timeline::{ExperimentConfig, ExperimentRunner, PresenterRegistry};
use paradigm0::error::PresentError;
use paradigm0::hook::{HookAction, HookContext, HookPoint};
use paradigm0::ledger::DataLedger;
use paradigm0::presenter::{OnLoaded, Presenter};
use paradigm0::schema::{ParamInfo, ParamType, TrialInfo};
use paradigm0::spec::{CompositeSpec, LeafSpec, SamplingSpec, TimelineSpec, VariableSet};
use paradigm0::test_utils::{EchoPresenter, InMemoryLedger, ScriptedPresenter};
use paradigm0::trial::{ParamValue, ResolvedTrial, TrialResult};
use serde_json::{json, Value};
use std::sync::Arc;

fn word_sets(words: &[&str]) -> Vec<VariableSet> {
    words
        .iter()
        .map(|w| {
            let mut set = VariableSet::new();
            set.insert("word".into(), json!(w));
            set
        })
        .collect()
}

async fn run_timeline(
    timeline: Vec<TimelineSpec>,
    presenters: PresenterRegistry,
    ledger: Arc<dyn DataLedger>,
    hooks: HookRegistry,
) -> ExperimentRunner {
    let mut runner = ExperimentRunner::new(
        timeline,
        presenters,
        ledger,
        hooks,
        ExperimentConfig {
            seed: Some(99),
            ..ExperimentConfig::default()
        },
    )
    .unwrap();
    runner.run().await.unwrap();
    runner
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 1. Presenter swap
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn word_block() -> TimelineSpec {
    CompositeSpec::new()
        .variables(word_sets(&["left", "right"]))
        .child(LeafSpec::new("echo").param("stimulus", ParamValue::var("word")))
        .into()
}

#[tokio::test]
async fn same_timeline_different_presenter() {
    // Echo presenter: the response mirrors the stimulus.
    let mut echo = PresenterRegistry::new();
    echo.register(Arc::new(EchoPresenter::new()));
    let ledger = Arc::new(MemoryLedger::new());
    run_timeline(
        vec![word_block()],
        echo,
        Arc::clone(&ledger) as Arc<dyn DataLedger>,
        HookRegistry::new(),
    )
    .await;
    let echoed: Vec<Value> = ledger.all().iter().map(|r| r.data["response"].clone()).collect();
    assert_eq!(echoed, vec![json!("left"), json!("right")]);

    // Scripted presenter under the same trial type name: same timeline,
    // responses now come from the script.
    let mut scripted = PresenterRegistry::new();
    let mut canned = TrialResult::new();
    canned.insert("response".into(), json!("f"));
    scripted.register(Arc::new(ScriptedPresenter::new(
        "echo",
        vec![canned.clone(), canned],
    )));
    let ledger = Arc::new(MemoryLedger::new());
    run_timeline(
        vec![word_block()],
        scripted,
        Arc::clone(&ledger) as Arc<dyn DataLedger>,
        HookRegistry::new(),
    )
    .await;
    let scripted_responses: Vec<Value> =
        ledger.all().iter().map(|r| r.data["response"].clone()).collect();
    assert_eq!(scripted_responses, vec![json!("f"), json!("f")]);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 2. Ledger swap
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn same_experiment_different_ledger() {
    for ledger in [
        Arc::new(MemoryLedger::new()) as Arc<dyn DataLedger>,
        Arc::new(InMemoryLedger::new()) as Arc<dyn DataLedger>,
    ] {
        let mut presenters = PresenterRegistry::new();
        presenters.register(Arc::new(EchoPresenter::new()));
        run_timeline(
            vec![word_block()],
            presenters,
            Arc::clone(&ledger),
            HookRegistry::new(),
        )
        .await;
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.last().unwrap().trial_index, 1);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 3. Nested composition: practice gate + sampled test block + retry loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct GradingPresenter {
    info: TrialInfo,
}

impl GradingPresenter {
    fn new() -> Self {
        Self {
            info: TrialInfo::new("grade")
                .param("stimulus", ParamInfo::new(ParamType::HtmlString).with_default(""))
                .param("correct", ParamInfo::new(ParamType::Bool).with_default(true)),
        }
    }
}

#[async_trait::async_trait]
impl Presenter for GradingPresenter {
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
        result.insert("correct".into(), trial.get("correct").cloned().unwrap_or(json!(false)));
        Ok(result)
    }
}

#[tokio::test]
async fn full_experiment_composition() {
    let mut presenters = PresenterRegistry::new();
    presenters.register(Arc::new(GradingPresenter::new()));

    // Practice runs until every trial in the pass is correct; the scripted
    // "correct" flag fails once via a timeline variable.
    let practice = CompositeSpec::new()
        .variables(vec![
            {
                let mut s = VariableSet::new();
                s.insert("ok".into(), json!(false));
                s
            },
        ])
        .loop_while(|ctx, generated| {
            // Retry while any trial in this pass graded incorrect; the
            // second pass flips to correct via the conditional below.
            let _ = ctx;
            generated
                .iter()
                .any(|r| r.data["correct"] == json!(false))
                && generated.len() < 4
        })
        .child(
            LeafSpec::new("grade")
                .param("correct", ParamValue::computed(|ctx| {
                    // First pass: incorrect; later passes: correct.
                    json!(ctx.node_id().to_string().contains(".1"))
                }))
                .data("phase", "practice"),
        );

    let test_block = CompositeSpec::new()
        .variables(word_sets(&["cat", "dog", "bird"]))
        .sampling(SamplingSpec::FixedRepetitions { size: 2 })
        .child(
            LeafSpec::new("grade")
                .param("stimulus", ParamValue::var("word"))
                .data("phase", "test"),
        );

    let ledger = Arc::new(MemoryLedger::new());
    run_timeline(
        vec![practice.into(), test_block.into()],
        presenters,
        Arc::clone(&ledger) as Arc<dyn DataLedger>,
        HookRegistry::new(),
    )
    .await;

    let all = ledger.all();
    let practice_trials: Vec<_> = all
        .iter()
        .filter(|r| r.data["phase"] == json!("practice"))
        .collect();
    let test_trials: Vec<_> = all
        .iter()
        .filter(|r| r.data["phase"] == json!("test"))
        .collect();

    // The practice block looped exactly once (fail pass + pass pass).
    assert_eq!(practice_trials.len(), 2);
    assert_eq!(practice_trials[0].data["correct"], json!(false));
    assert_eq!(practice_trials[1].data["correct"], json!(true));

    // Fixed-repetitions sampling: every word exactly twice.
    assert_eq!(test_trials.len(), 6);

    // Records attribute to their blocks by id prefix.
    assert!(practice_trials
        .iter()
        .all(|r| r.node_id.to_string().starts_with("0.0-0.")));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 4. Hook-driven adaptation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct PlateauHook {
    needed: usize,
}

impl paradigm0::hook::ExperimentHook for PlateauHook {
    fn points(&self) -> &[HookPoint] {
        &[HookPoint::DataUpdate]
    }

    fn on_event(&self, ctx: &HookContext) -> Result<HookAction, paradigm0::error::HookError> {
        let correct = ctx
            .record
            .as_ref()
            .is_some_and(|r| r.data["correct"] == json!(true));
        if correct && ctx.trial_index + 1 >= self.needed as u64 {
            return Ok(HookAction::EndExperiment {
                reason: "performance plateau".into(),
            });
        }
        Ok(HookAction::Continue)
    }
}

#[tokio::test]
async fn a_hook_ends_the_session_once_performance_plateaus() {
    let mut presenters = PresenterRegistry::new();
    presenters.register(Arc::new(GradingPresenter::new()));
    let mut hooks = HookRegistry::new();
    hooks.add(Arc::new(PlateauHook { needed: 3 }));

    let endless: Vec<TimelineSpec> = (0..20)
        .map(|i| {
            LeafSpec::new("grade")
                .param("stimulus", format!("item-{i}"))
                .into()
        })
        .collect();

    let ledger = Arc::new(MemoryLedger::new());
    run_timeline(
        endless,
        presenters,
        Arc::clone(&ledger) as Arc<dyn DataLedger>,
        hooks,
    )
    .await;

    assert_eq!(ledger.len(), 3, "session ends at the plateau, not after 20");
}
