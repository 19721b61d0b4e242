//! The Presentation protocol — what one trial does.

use crate::error::PresentError;
use crate::schema::TrialInfo;
use crate::trial::{ResolvedTrial, TrialResult};
use async_trait::async_trait;

/// Callback the presenter fires once the stimulus has finished loading
/// (assets decoded, media ready). Fire it at most once, before resolving.
pub type OnLoaded<'a> = &'a (dyn Fn() + Send + Sync);

/// Protocol ① — Presentation
///
/// What one trial does: render a stimulus, collect a response, resolve with
/// the result data. One implementation per trial type, registered under
/// [`TrialInfo::name`].
///
/// Resolving the returned future IS the completion signal — the scheduler
/// awaits it, records the result, and only then requests the next trial.
/// This makes "complete exactly once" a property of the type system rather
/// than a convention. Everything that happens inside (timers, input
/// listeners, media playback) is the implementation's concern; any timers it
/// owns must be invalidated when the trial ends.
///
/// Implementations:
/// - A DOM/canvas renderer driving a participant's browser
/// - A terminal harness for lab hardware
/// - A simulator resolving instantly with scripted responses (testing)
#[async_trait]
pub trait Presenter: Send + Sync {
    /// The trial type's name and declared parameter schema.
    fn info(&self) -> &TrialInfo;

    /// Run one trial to completion.
    ///
    /// `trial` is an independent deep copy — the presenter may inspect it
    /// freely without affecting later repetitions. Call `on_loaded` when the
    /// stimulus is ready; resolve with the result data when the participant
    /// (or simulation) has responded.
    async fn present(
        &self,
        trial: &ResolvedTrial,
        on_loaded: OnLoaded<'_>,
    ) -> Result<TrialResult, PresentError>;
}
