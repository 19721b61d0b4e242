//! A presenter that replays a queue of scripted results.

use crate::error::PresentError;
use crate::presenter::{OnLoaded, Presenter};
use crate::schema::TrialInfo;
use crate::trial::{ResolvedTrial, TrialResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Resolves each trial with the next queued result; once the queue drains,
/// trials resolve with an empty result.
pub struct ScriptedPresenter {
    info: TrialInfo,
    responses: Mutex<VecDeque<TrialResult>>,
}

impl ScriptedPresenter {
    /// A scripted presenter for the given trial type with queued results.
    pub fn new(name: impl Into<String>, responses: Vec<TrialResult>) -> Self {
        Self {
            info: TrialInfo::new(name),
            responses: Mutex::new(responses.into()),
        }
    }

    /// How many scripted results remain unused.
    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

#[async_trait]
impl Presenter for ScriptedPresenter {
    fn info(&self) -> &TrialInfo {
        &self.info
    }

    async fn present(
        &self,
        _trial: &ResolvedTrial,
        on_loaded: OnLoaded<'_>,
    ) -> Result<TrialResult, PresentError> {
        on_loaded();
        let next = self.responses.lock().unwrap().pop_front();
        Ok(next.unwrap_or_default())
    }
}
