//! # paradigm0 — Protocol traits for composable behavioral-experiment runtimes
//!
//! This crate defines the protocol boundaries and the shared data model that
//! compose to form a behavioral-experiment runtime.
//!
//! ## The Protocols
//!
//! | Protocol | Trait | What it does |
//! |----------|-------|-------------|
//! | ① Presentation | [`Presenter`] | What one trial does (show a stimulus, collect a response) |
//! | ② Ledger | [`DataLedger`] | How result records persist and are queried |
//! | ③ Hooks | [`ExperimentHook`] | Observation + cancellation at lifecycle points |
//!
//! ## The Data Model
//!
//! | Types | What they describe |
//! |-------|--------------------|
//! | [`TimelineSpec`], [`CompositeSpec`], [`LeafSpec`] | The declarative timeline description |
//! | [`SamplingSpec`] | How a timeline orders and samples its variable sets |
//! | [`ParamValue`], [`EvalContext`] | Deferred parameter values and their resolution context |
//! | [`TrialInfo`], [`ParamInfo`] | The declared, validated schema for one trial type |
//! | [`ResolvedTrial`], [`TrialRecord`] | What a presenter receives and what the ledger stores |
//! | [`NodeId`] | Hierarchical identity attributing records to timeline positions |
//!
//! ## Design Principle
//!
//! Every protocol trait is operation-defined, not mechanism-defined.
//! [`Presenter::present`] means "cause this trial to run and resolve with its
//! result" — not "draw to a canvas" or "poll a keyboard." A browser renderer,
//! a terminal harness, and a simulation that answers instantly all implement
//! the same trait. The timeline engine never learns which one it is driving.
//!
//! ## Dependency Notes
//!
//! This crate depends on `serde_json::Value` for trial parameters, variable
//! sets, and result data. This is an intentional choice: experiment scripts
//! exchange loosely-shaped parameter bags with their presentation layer, and
//! `serde_json::Value` is the de facto standard payload type in the Rust
//! ecosystem. The alternative (generic `T: Serialize` everywhere) would
//! complicate trait object safety without practical benefit.

#![deny(missing_docs)]

pub mod error;
pub mod hook;
pub mod id;
pub mod ledger;
pub mod presenter;
pub mod schema;
pub mod spec;
pub mod trial;

#[cfg(feature = "test-utils")]
pub mod test_utils;

// Re-exports for convenience
pub use error::{HookError, LedgerError, PresentError, RunError, SamplingError, SpecError};
pub use hook::{ExperimentHook, HookAction, HookContext, HookPoint};
pub use id::NodeId;
pub use ledger::DataLedger;
pub use presenter::{OnLoaded, Presenter};
pub use schema::{ParamInfo, ParamType, TrialInfo};
pub use spec::{CompositeSpec, LeafSpec, SamplingSpec, TimelineSpec, VariableSet};
pub use trial::{EvalContext, ParamValue, Params, ResolvedTrial, TrialRecord, TrialResult};
