//! # Workflow Engine
//!
//! The [`Orchestrator`] owns the capabilities (one language model, a web
//! search tool and a paper search tool) and runs the research graph for a
//! topic. Each run gets its own [`ResearchState`]; runs share nothing mutable
//! except what the adapters themselves arbitrate.
//!
//! A run is observed as a stream:
//!
//! ```text
//! Step(planner) → Step(router) → Step(web_search) → Step(analyze) → ...
//!     → Step(write) → Completed
//! ```
//!
//! The stream ends after `Completed`, after the first error, or silently once
//! the run's cancellation token fires.
//!
//! ```rust,ignore
//! let mut run = orchestrator.run("battery recycling");
//! while let Some(event) = run.next().await {
//!     match event? {
//!         RunEvent::Step(obs) => println!("{} done", obs.step),
//!         RunEvent::Completed { report, .. } => println!("{report}"),
//!     }
//! }
//! ```

use async_stream::stream;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::WorkflowConfig;
use crate::error::{ResearchError, RunError};
use crate::graph::{self, Step};
use crate::llm::LanguageModel;
use crate::state::{ResearchState, ResearchUpdate};
use crate::steps::{self, Fallback, StepContext};
use crate::tools::SearchTool;

// =============================================================================
// OBSERVATIONS
// =============================================================================
/// One completed step, as seen by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepObservation {
    /// 1-based position of the step within the run
    pub index: usize,
    pub step: Step,
    /// The partial update merged into the state
    pub update: ResearchUpdate,
    /// Set when the step substituted a default for unusable model output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Fallback>,
}

/// Item of a [`ResearchRun`] stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    Step(StepObservation),
    /// Terminal sentinel carrying the final report
    Completed { report: String, state: ResearchState },
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct ResearchOutcome {
    pub report: String,
    pub state: ResearchState,
    pub observations: Vec<StepObservation>,
}

// =============================================================================
// RESEARCH RUN
// =============================================================================
/// A research run in progress.
///
/// Nothing executes until the stream is polled. Dropping it abandons the run.
pub struct ResearchRun {
    topic: String,
    events: BoxStream<'static, Result<RunEvent, RunError>>,
    cancel: CancellationToken,
}

impl ResearchRun {
    /// Token that abandons the run when cancelled.
    ///
    /// An in-flight model or tool call is interrupted and no further events
    /// are emitted.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Drive the run to the end and collect its output.
    pub async fn finish(mut self) -> Result<ResearchOutcome, RunError> {
        let mut observations: Vec<StepObservation> = Vec::new();

        while let Some(event) = self.events.next().await {
            match event? {
                RunEvent::Step(observation) => observations.push(observation),
                RunEvent::Completed { report, state } => {
                    return Ok(ResearchOutcome {
                        report,
                        state,
                        observations,
                    });
                }
            }
        }

        // Ended without a report: the run was cancelled. Rebuild the last
        // known state from the observed updates.
        let state = observations
            .iter()
            .fold(ResearchState::new(self.topic.as_str()), |state, obs| {
                state.apply_update(obs.update.clone())
            });
        let step = observations.last().map_or(Step::ENTRY, |obs| obs.step);
        Err(RunError::new(step, &state, ResearchError::Cancelled))
    }
}

impl Stream for ResearchRun {
    type Item = Result<RunEvent, RunError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for ResearchRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResearchRun")
            .field("topic", &self.topic)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// ORCHESTRATOR
// =============================================================================
/// Runs the research graph over the supplied capabilities.
#[derive(Clone)]
pub struct Orchestrator {
    model: Arc<dyn LanguageModel>,
    web: Arc<dyn SearchTool>,
    papers: Arc<dyn SearchTool>,
    config: WorkflowConfig,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Mermaid rendering of the workflow graph.
    pub fn to_mermaid(&self) -> String {
        graph::to_mermaid()
    }

    /// Start a research run with the orchestrator's configuration.
    pub fn run(&self, topic: impl Into<String>) -> ResearchRun {
        self.run_with_config(topic, self.config.clone())
    }

    /// Start a research run with a per-run configuration.
    ///
    /// An invalid configuration or an empty topic is reported as the first
    /// (and only) item of the stream.
    pub fn run_with_config(&self, topic: impl Into<String>, config: WorkflowConfig) -> ResearchRun {
        let topic = topic.into();
        let cancel = CancellationToken::new();

        let events = execute_run(
            Arc::clone(&self.model),
            Arc::clone(&self.web),
            Arc::clone(&self.papers),
            config,
            topic.clone(),
            cancel.clone(),
        );

        ResearchRun {
            topic,
            events,
            cancel,
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("model", &self.model.name())
            .field("web", &self.web.name())
            .field("papers", &self.papers.name())
            .field("config", &self.config)
            .finish()
    }
}

/// Builder for [`Orchestrator`]. All three capabilities are required.
#[derive(Default)]
pub struct OrchestratorBuilder {
    model: Option<Arc<dyn LanguageModel>>,
    web: Option<Arc<dyn SearchTool>>,
    papers: Option<Arc<dyn SearchTool>>,
    config: WorkflowConfig,
}

impl OrchestratorBuilder {
    pub fn model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn web_search(mut self, tool: Arc<dyn SearchTool>) -> Self {
        self.web = Some(tool);
        self
    }

    pub fn paper_search(mut self, tool: Arc<dyn SearchTool>) -> Self {
        self.papers = Some(tool);
        self
    }

    pub fn config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    /// Fails with [`ResearchError::Config`] when a capability is missing or
    /// the configuration is invalid.
    pub fn build(self) -> Result<Orchestrator, ResearchError> {
        let model = self
            .model
            .ok_or_else(|| ResearchError::config("no language model configured"))?;
        let web = self
            .web
            .ok_or_else(|| ResearchError::config("no web search tool configured"))?;
        let papers = self
            .papers
            .ok_or_else(|| ResearchError::config("no paper search tool configured"))?;
        self.config
            .validate()
            .map_err(|e| ResearchError::config(e.to_string()))?;

        info!(
            model = model.name(),
            web = web.name(),
            papers = papers.name(),
            max_retries = self.config.max_retries,
            max_steps = self.config.max_steps,
            "Orchestrator ready"
        );

        Ok(Orchestrator {
            model,
            web,
            papers,
            config: self.config,
        })
    }
}

// =============================================================================
// RUN LOOP
// =============================================================================
fn execute_run(
    model: Arc<dyn LanguageModel>,
    web: Arc<dyn SearchTool>,
    papers: Arc<dyn SearchTool>,
    config: WorkflowConfig,
    topic: String,
    cancel: CancellationToken,
) -> BoxStream<'static, Result<RunEvent, RunError>> {
    let events = stream! {
        let mut state = ResearchState::new(topic);

        if state.topic().trim().is_empty() {
            let source = ResearchError::config("topic must not be empty");
            yield Err(RunError::new(Step::ENTRY, &state, source));
            return;
        }
        if let Err(e) = config.validate() {
            yield Err(RunError::new(Step::ENTRY, &state, ResearchError::config(e.to_string())));
            return;
        }

        info!(topic = %state.topic(), max_steps = config.max_steps, "Starting research run");

        let mut next = Some(Step::ENTRY);
        let mut executed = 0usize;

        while let Some(step) = next {
            if cancel.is_cancelled() {
                info!(topic = %state.topic(), step = %step, "Research run cancelled");
                return;
            }
            if executed >= config.max_steps {
                error!(
                    topic = %state.topic(),
                    step = %step,
                    limit = config.max_steps,
                    "Step limit exceeded"
                );
                yield Err(RunError::new(
                    step,
                    &state,
                    ResearchError::StepLimitExceeded { limit: config.max_steps },
                ));
                return;
            }
            executed += 1;

            let ctx = StepContext {
                model: model.as_ref(),
                web: web.as_ref(),
                papers: papers.as_ref(),
                config: &config,
                cancel: &cancel,
            };

            let outcome = match steps::execute(step, ctx, &state).await {
                Ok(outcome) => outcome,
                Err(ResearchError::Cancelled) => {
                    info!(topic = %state.topic(), step = %step, "Research run cancelled");
                    return;
                }
                Err(source) => {
                    if cancel.is_cancelled() {
                        return;
                    }
                    error!(
                        topic = %state.topic(),
                        step = %step,
                        error = %source,
                        "Research run failed"
                    );
                    yield Err(RunError::new(step, &state, source));
                    return;
                }
            };

            if cancel.is_cancelled() {
                info!(topic = %state.topic(), step = %step, "Research run cancelled");
                return;
            }
            debug_assert!(step.allows(outcome.next), "{} -> {} is not an edge", step, outcome.next);

            state = state.apply_update(outcome.update.clone());
            next = outcome.next.target();

            yield Ok(RunEvent::Step(StepObservation {
                index: executed,
                step,
                update: outcome.update,
                fallback: outcome.fallback,
            }));
        }

        info!(topic = %state.topic(), steps = executed, "Research run completed");
        yield Ok(RunEvent::Completed {
            report: state.report().to_string(),
            state,
        });
    };

    events.boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::tools::SearchError;
    use async_trait::async_trait;

    static_assertions::assert_impl_all!(Orchestrator: Send, Sync);
    static_assertions::assert_impl_all!(ResearchRun: Send);

    struct Fixed(&'static str);

    #[async_trait]
    impl LanguageModel for Fixed {
        async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            Ok(self.0.to_string())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[async_trait]
    impl SearchTool for Fixed {
        async fn search(&self, _query: &str) -> Result<String, SearchError> {
            Ok(self.0.to_string())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[test]
    fn test_builder_requires_capabilities() {
        let err = Orchestrator::builder()
            .web_search(Arc::new(Fixed("r")))
            .paper_search(Arc::new(Fixed("r")))
            .build()
            .unwrap_err();
        assert!(matches!(err, ResearchError::Config(_)));

        let err = Orchestrator::builder()
            .model(Arc::new(Fixed("continue")))
            .web_search(Arc::new(Fixed("r")))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("paper search"));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let err = Orchestrator::builder()
            .model(Arc::new(Fixed("continue")))
            .web_search(Arc::new(Fixed("r")))
            .paper_search(Arc::new(Fixed("r")))
            .config(WorkflowConfig::new().with_max_steps(0))
            .build()
            .unwrap_err();
        assert!(matches!(err, ResearchError::Config(_)));
    }

    #[tokio::test]
    async fn test_empty_topic_is_rejected() {
        let orchestrator = Orchestrator::builder()
            .model(Arc::new(Fixed("continue")))
            .web_search(Arc::new(Fixed("r")))
            .paper_search(Arc::new(Fixed("r")))
            .build()
            .unwrap();

        let mut run = orchestrator.run("   ");
        let first = run.next().await.unwrap().unwrap_err();
        assert!(matches!(first.source, ResearchError::Config(_)));
        assert!(run.next().await.is_none());
    }

    #[test]
    fn test_observation_json_shape() {
        let event = RunEvent::Step(StepObservation {
            index: 2,
            step: Step::Router,
            update: ResearchUpdate::empty().with_tool_choice(crate::state::ToolChoice::WebSearch),
            fallback: None,
        });
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event"], "step");
        assert_eq!(json["step"], "router");
        assert_eq!(json["index"], 2);
        assert_eq!(json["update"]["tool_choice"], "web_search");
        assert!(json.get("fallback").is_none());
    }
}
