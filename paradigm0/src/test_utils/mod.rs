//! Minimal implementations for testing.
//!
//! Available behind the `test-utils` feature flag. These prove the protocol
//! traits are usable and let timeline logic be exercised without any real
//! presentation layer.

mod counting_hook;
mod echo_presenter;
mod in_memory_ledger;
mod scripted_presenter;

pub use counting_hook::CountingHook;
pub use echo_presenter::EchoPresenter;
pub use in_memory_ledger::InMemoryLedger;
pub use scripted_presenter::ScriptedPresenter;
