use paradigm_hooks::HookRegistry;
use paradigm0::error::HookError;
use paradigm0::hook::{ExperimentHook, HookAction, HookContext, HookPoint};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Records the order it fires in, always continuing.
struct OrderedHook {
    name: &'static str,
    points: Vec<HookPoint>,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl ExperimentHook for OrderedHook {
    fn points(&self) -> &[HookPoint] {
        &self.points
    }

    fn on_event(&self, _ctx: &HookContext) -> Result<HookAction, HookError> {
        self.log.lock().unwrap().push(self.name);
        Ok(HookAction::Continue)
    }
}

struct EndingHook;

impl ExperimentHook for EndingHook {
    fn points(&self) -> &[HookPoint] {
        &[HookPoint::TrialFinish]
    }

    fn on_event(&self, _ctx: &HookContext) -> Result<HookAction, HookError> {
        Ok(HookAction::EndExperiment {
            reason: "enough data".into(),
        })
    }
}

struct FailingHook {
    calls: Arc<AtomicUsize>,
}

impl ExperimentHook for FailingHook {
    fn points(&self) -> &[HookPoint] {
        &[HookPoint::TrialFinish]
    }

    fn on_event(&self, _ctx: &HookContext) -> Result<HookAction, HookError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(HookError::Failed("flaky sink".into()))
    }
}

fn ctx(point: HookPoint) -> HookContext {
    HookContext::new(point)
}

// --- Dispatch order and point filtering ---

#[test]
fn hooks_fire_in_registration_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = HookRegistry::new();
    for name in ["first", "second", "third"] {
        registry.add(Arc::new(OrderedHook {
            name,
            points: vec![HookPoint::TrialFinish],
            log: Arc::clone(&log),
        }));
    }

    registry.dispatch(&ctx(HookPoint::TrialFinish));
    assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
}

#[test]
fn hooks_only_fire_at_registered_points() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = HookRegistry::new();
    registry.add(Arc::new(OrderedHook {
        name: "start-only",
        points: vec![HookPoint::TrialStart],
        log: Arc::clone(&log),
    }));
    registry.add(Arc::new(OrderedHook {
        name: "finish-only",
        points: vec![HookPoint::TrialFinish],
        log: Arc::clone(&log),
    }));

    registry.dispatch(&ctx(HookPoint::TrialFinish));
    assert_eq!(*log.lock().unwrap(), vec!["finish-only"]);
}

#[test]
fn empty_registry_continues() {
    let registry = HookRegistry::new();
    assert!(registry.is_empty());
    assert!(matches!(
        registry.dispatch(&ctx(HookPoint::DataUpdate)),
        HookAction::Continue
    ));
}

// --- Short-circuiting ---

#[test]
fn cancellation_short_circuits_later_hooks() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = HookRegistry::new();
    registry.add(Arc::new(EndingHook));
    registry.add(Arc::new(OrderedHook {
        name: "never",
        points: vec![HookPoint::TrialFinish],
        log: Arc::clone(&log),
    }));

    let action = registry.dispatch(&ctx(HookPoint::TrialFinish));
    assert!(matches!(action, HookAction::EndExperiment { .. }));
    assert!(log.lock().unwrap().is_empty());
}

// --- Error policy ---

#[test]
fn hook_errors_are_swallowed_and_dispatch_continues() {
    let calls = Arc::new(AtomicUsize::new(0));
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = HookRegistry::new();
    registry.add(Arc::new(FailingHook {
        calls: Arc::clone(&calls),
    }));
    registry.add(Arc::new(OrderedHook {
        name: "after-failure",
        points: vec![HookPoint::TrialFinish],
        log: Arc::clone(&log),
    }));

    let action = registry.dispatch(&ctx(HookPoint::TrialFinish));
    assert!(matches!(action, HookAction::Continue));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*log.lock().unwrap(), vec!["after-failure"]);
}

// --- Interop with test-utils hooks ---

#[test]
fn counting_hook_counts_through_the_registry() {
    let counting = Arc::new(paradigm0::test_utils::CountingHook::new());
    let mut registry = HookRegistry::new();
    registry.add(Arc::clone(&counting) as Arc<dyn ExperimentHook>);

    registry.dispatch(&ctx(HookPoint::TrialStart));
    registry.dispatch(&ctx(HookPoint::TrialFinish));
    registry.dispatch(&ctx(HookPoint::TrialFinish));

    assert_eq!(counting.count(HookPoint::TrialStart), 1);
    assert_eq!(counting.count(HookPoint::TrialFinish), 2);
    assert_eq!(counting.count(HookPoint::DataUpdate), 0);
}
