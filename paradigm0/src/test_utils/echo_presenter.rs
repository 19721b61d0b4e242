//! A presenter that completes instantly, echoing its stimulus.

use crate::error::PresentError;
use crate::presenter::{OnLoaded, Presenter};
use crate::schema::{ParamInfo, ParamType, TrialInfo};
use crate::trial::{ResolvedTrial, TrialResult};
use async_trait::async_trait;
use serde_json::Value;

/// Presents nothing; resolves immediately with the stimulus echoed back as
/// the response and a fixed reaction time of zero.
pub struct EchoPresenter {
    info: TrialInfo,
}

impl EchoPresenter {
    /// An echo presenter registered under the trial type `"echo"`.
    pub fn new() -> Self {
        Self::with_name("echo")
    }

    /// An echo presenter registered under a custom trial type name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            info: TrialInfo::new(name).param(
                "stimulus",
                ParamInfo::new(ParamType::HtmlString).with_default(""),
            ),
        }
    }
}

impl Default for EchoPresenter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Presenter for EchoPresenter {
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
        result.insert(
            "response".into(),
            trial.get("stimulus").cloned().unwrap_or(Value::Null),
        );
        result.insert("rt".into(), Value::from(0));
        Ok(result)
    }
}
