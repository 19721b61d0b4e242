//! Error types for each protocol.

use thiserror::Error;

/// Malformed-spec errors. These are logged at construction time and carried
/// in the tree; the node stays in a broken-but-non-fatal state that surfaces
/// a diagnostic only when it is reached.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SpecError {
    /// A trial-level node has no type discriminator, and none is inherited.
    #[error("trial node is missing the trial type discriminator")]
    MissingTrialType,

    /// A trial names a type no registered presenter provides.
    #[error("no presenter registered for trial type: {0}")]
    UnknownTrialType(String),

    /// `insert()` was called on a trial-level node.
    #[error("cannot add child nodes to a trial-level node")]
    InsertOnLeaf,

    /// A required parameter (schema default absent) was never supplied.
    #[error("missing required parameter {parameter} for trial type {trial_type}")]
    MissingParameter {
        /// The trial type whose schema declares the parameter.
        trial_type: String,
        /// The parameter that was not supplied.
        parameter: String,
    },

    /// Catch-all. Include context.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Sampling and argument errors. Reported immediately at call time —
/// authoring-bug-class failures, not runtime state.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SamplingError {
    /// A without-replacement sample larger than the pool.
    #[error("cannot sample {requested} items without replacement from {available}")]
    SampleTooLarge {
        /// How many items were requested.
        requested: usize,
        /// How many items exist to sample from.
        available: usize,
    },

    /// Weights array does not match the sampled sequence.
    #[error("weights length {weights} does not match sequence length {items}")]
    WeightLengthMismatch {
        /// Number of weights supplied.
        weights: usize,
        /// Number of items to sample from.
        items: usize,
    },

    /// Weights that cannot form a distribution (negative, or zero sum).
    #[error("invalid weights: {0}")]
    InvalidWeights(String),

    /// An integer range with the bounds reversed.
    #[error("upper bound {upper} is below lower bound {lower}")]
    InvalidRange {
        /// The lower bound.
        lower: i64,
        /// The upper bound.
        upper: i64,
    },

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Presentation errors. A presenter that fails has broken its contract to
/// eventually resolve with result data; the runner treats this as fatal.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PresentError {
    /// The stimulus or its assets failed to load.
    #[error("stimulus failed to load: {0}")]
    Load(String),

    /// Presentation failed after loading.
    #[error("presentation failed: {0}")]
    Failed(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Ledger errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum LedgerError {
    /// An append failed.
    #[error("append failed: {0}")]
    AppendFailed(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Hook errors. These are logged but do NOT halt the experiment
/// (use [`HookAction::EndExperiment`] to halt).
///
/// [`HookAction::EndExperiment`]: crate::hook::HookAction::EndExperiment
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum HookError {
    /// The hook execution failed.
    #[error("hook failed: {0}")]
    Failed(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Runner errors. Starting without a timeline is a fatal precondition
/// violation; double-completing a trial is a silent no-op by design and has
/// no variant here.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RunError {
    /// `run()` was called with no trials in the timeline.
    #[error("the timeline is empty; cannot start experiment")]
    EmptyTimeline,

    /// `run()` was called again after the experiment finished.
    #[error("the experiment has already finished")]
    AlreadyFinished,

    /// The engine asked for an active trial while none exists.
    #[error("no active trial")]
    NoActiveTrial,

    /// A presenter failed.
    #[error("presenter error: {0}")]
    Present(#[from] PresentError),

    /// The ledger rejected a record.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// A spec error propagated out of tree construction.
    #[error("spec error: {0}")]
    Spec(#[from] SpecError),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}
