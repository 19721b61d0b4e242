#![deny(missing_docs)]
//! Timeline execution engine — turns a declarative, arbitrarily-nestable
//! timeline description into a definite, steppable sequence of trials.
//!
//! Three parts:
//! - [`sampling`] — the randomization functions deciding trial order, all
//!   funneled through one replaceable (seedable) random source;
//! - [`node`] — the recursive hierarchical state machine tracking per-trial
//!   completion across nesting, repetition, sampling, looping, and
//!   conditional branching;
//! - [`runner`] — the scheduler driving one root node through
//!   advance/complete cycles against the `paradigm0` protocol boundaries.

pub mod node;
mod resolve;
pub mod runner;
pub mod sampling;

pub use node::{ActiveTrial, Host, NodeState, Progress, TimelineNode};
pub use runner::{
    ExperimentConfig, ExperimentHandle, ExperimentProgress, ExperimentRunner, PresenterRegistry,
    RunState,
};
