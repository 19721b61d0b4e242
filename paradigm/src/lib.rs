#![deny(missing_docs)]
//! # paradigm — umbrella crate
//!
//! Provides a single import surface for the paradigm runtime. Re-exports
//! the protocol layer and key implementations behind feature flags, plus a
//! `prelude` for the happy path.

#[cfg(feature = "core")]
pub use paradigm_timeline;
#[cfg(feature = "core")]
pub use paradigm0;

#[cfg(feature = "hooks")]
pub use paradigm_hooks;

#[cfg(feature = "ledger-memory")]
pub use paradigm_ledger_memory;

/// Happy-path imports for composing experiments.
pub mod prelude {
    #[cfg(feature = "core")]
    pub use paradigm0::{
        CompositeSpec, DataLedger, EvalContext, ExperimentHook, HookAction, HookContext,
        HookPoint, LeafSpec, NodeId, ParamInfo, ParamType, ParamValue, Presenter, ResolvedTrial,
        SamplingSpec, TimelineSpec, TrialInfo, TrialRecord, TrialResult,
    };

    #[cfg(feature = "core")]
    pub use paradigm_timeline::{
        ExperimentConfig, ExperimentHandle, ExperimentRunner, PresenterRegistry, RunState,
    };

    #[cfg(feature = "hooks")]
    pub use paradigm_hooks::HookRegistry;

    #[cfg(feature = "ledger-memory")]
    pub use paradigm_ledger_memory::MemoryLedger;
}
