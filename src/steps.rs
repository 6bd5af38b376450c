//! Step functions of the research workflow.
//!
//! Each step reads the current [`ResearchState`], makes at most one external
//! call through the capabilities in [`StepContext`], and returns a
//! [`StepOutcome`]: the partial update to merge plus the transition the
//! orchestrator should follow. Steps never touch the state they are given.

use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WorkflowConfig;
use crate::decode::{decode_decision, decode_tool_choice};
use crate::error::ResearchError;
use crate::graph::{Step, Transition};
use crate::llm::LanguageModel;
use crate::policy;
use crate::prompts::ResearchPrompts;
use crate::retry::{call_with_retry, RetryPolicy};
use crate::state::{ResearchState, ResearchUpdate};
use crate::tools::SearchTool;

// =============================================================================
// STEP OUTCOME
// =============================================================================
/// Notice that a step replaced unusable model output with a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fallback {
    /// Which decision fell back (`planner`, `router`, `analyze`, `refine_query`)
    pub context: String,
    /// The normalized model output that failed to decode
    pub raw: String,
    /// What was used instead
    pub applied: String,
}

impl Fallback {
    pub fn new(
        context: impl Into<String>,
        raw: impl Into<String>,
        applied: impl Into<String>,
    ) -> Self {
        Self {
            context: context.into(),
            raw: raw.into(),
            applied: applied.into(),
        }
    }
}

/// Result of executing one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub update: ResearchUpdate,
    pub next: Transition,
    pub fallback: Option<Fallback>,
}

impl StepOutcome {
    fn to(next: Step, update: ResearchUpdate) -> Self {
        Self {
            update,
            next: Transition::To(next),
            fallback: None,
        }
    }

    fn with_fallback(mut self, fallback: Option<Fallback>) -> Self {
        self.fallback = fallback;
        self
    }
}

// =============================================================================
// STEP CONTEXT
// =============================================================================
/// Capabilities and settings available to a step.
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    pub model: &'a dyn LanguageModel,
    pub web: &'a dyn SearchTool,
    pub papers: &'a dyn SearchTool,
    pub config: &'a WorkflowConfig,
    pub cancel: &'a CancellationToken,
}

impl<'a> StepContext<'a> {
    /// Send one prompt to the model under the configured timeout and retry policy.
    async fn complete(
        &self,
        operation: &str,
        prompt: &str,
        policy: &RetryPolicy,
    ) -> Result<String, ResearchError> {
        let model = self.model;
        let text = self
            .guarded(operation, policy, move || model.complete(prompt))
            .await?;
        debug!(step = operation, response = %text, "Model response");
        Ok(text)
    }

    async fn guarded<T, E, F, Fut>(
        &self,
        operation: &str,
        policy: &RetryPolicy,
        call: F,
    ) -> Result<T, ResearchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<ResearchError>,
    {
        call_with_retry(operation, policy, self.config.call_timeout, self.cancel, call).await
    }
}

// =============================================================================
// DISPATCH
// =============================================================================
/// Execute `step` against `state`.
pub async fn execute(
    step: Step,
    ctx: StepContext<'_>,
    state: &ResearchState,
) -> Result<StepOutcome, ResearchError> {
    info!(
        step = %step,
        query = %state.current_query(),
        retries = state.retries(),
        "{}",
        step.description()
    );

    match step {
        Step::Planner => plan(ctx, state).await,
        Step::Router => route(ctx, state).await,
        Step::WebSearch | Step::PaperSearch => search(step, ctx, state).await,
        Step::Analyze => analyze(ctx, state).await,
        Step::RefineQuery => refine(ctx, state).await,
        Step::Write => write(ctx, state).await,
    }
}

// =============================================================================
// PLANNER
// =============================================================================
/// Split the topic into subtopics. A failed planning call is never retried.
pub async fn plan(
    ctx: StepContext<'_>,
    state: &ResearchState,
) -> Result<StepOutcome, ResearchError> {
    let count = ctx.config.subtopic_count;
    let prompt = ResearchPrompts::planner(state.topic(), count);
    let text = ctx
        .complete(Step::Planner.as_str(), &prompt, &RetryPolicy::no_retry())
        .await?;

    let subtopics = parse_subtopics(&text, count);
    let (query, fallback) = match subtopics.first() {
        Some(first) => (first.clone(), None),
        None => {
            warn!(
                topic = %state.topic(),
                "Planner returned no subtopics; researching the topic directly"
            );
            (
                state.topic().to_string(),
                Some(Fallback::new(Step::Planner.as_str(), text.trim(), "topic as query")),
            )
        }
    };

    info!(count = subtopics.len(), subtopics = ?subtopics, "Research plan ready");

    let update = ResearchUpdate::empty()
        .with_subtopics(subtopics)
        .with_current_query(query)
        .with_retries(0);
    Ok(StepOutcome::to(Step::Router, update).with_fallback(fallback))
}

/// Non-empty trimmed lines with list markers removed, at most `count` of them.
pub(crate) fn parse_subtopics(text: &str, count: usize) -> Vec<String> {
    text.lines()
        .map(strip_list_marker)
        .filter(|line| !line.is_empty())
        .take(count)
        .map(str::to_string)
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();

    for bullet in ['-', '*', '•'] {
        if let Some(rest) = line.strip_prefix(bullet) {
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                return rest.trim();
            }
        }
    }

    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                return rest.trim();
            }
        }
    }

    line
}

// =============================================================================
// ROUTER
// =============================================================================
/// Choose the search capability for the active query.
pub async fn route(
    ctx: StepContext<'_>,
    state: &ResearchState,
) -> Result<StepOutcome, ResearchError> {
    let prompt = ResearchPrompts::router(state.current_query());
    let text = ctx
        .complete(Step::Router.as_str(), &prompt, &ctx.config.call_retry)
        .await?;

    let decoded = decode_tool_choice(&text);
    let fallback = if decoded.is_fallback() {
        if ctx.config.strict_routing {
            return Err(ResearchError::unparseable(Step::Router.as_str(), decoded.raw));
        }
        warn!(
            raw = %decoded.raw,
            applied = %decoded.value,
            "Router output matched no tool; using default"
        );
        Some(Fallback::new(Step::Router.as_str(), &decoded.raw, decoded.value.as_str()))
    } else {
        None
    };

    info!(tool = %decoded.value, "Tool selected");
    let update = ResearchUpdate::empty().with_tool_choice(decoded.value);
    Ok(StepOutcome::to(Step::search_for(decoded.value), update).with_fallback(fallback))
}

// =============================================================================
// SEARCH
// =============================================================================
/// Run the search capability behind `step` and count the attempt.
pub async fn search(
    step: Step,
    ctx: StepContext<'_>,
    state: &ResearchState,
) -> Result<StepOutcome, ResearchError> {
    let tool = match step {
        Step::PaperSearch => ctx.papers,
        _ => ctx.web,
    };
    let query = compose_query(state.topic(), state.current_query());
    let query = query.as_str();

    let results = ctx
        .guarded(step.as_str(), &ctx.config.call_retry, move || tool.search(query))
        .await?;
    let retries = state.retries() + 1;
    debug!(tool = tool.name(), bytes = results.len(), retries, "Search payload received");

    let update = ResearchUpdate::empty()
        .with_search_results(results)
        .with_retries(retries);
    Ok(StepOutcome::to(Step::Analyze, update))
}

/// Prefix the topic unless the query already mentions it.
pub(crate) fn compose_query(topic: &str, query: &str) -> String {
    if query.to_lowercase().contains(&topic.to_lowercase()) {
        query.to_string()
    } else {
        format!("{} {}", topic, query)
    }
}

// =============================================================================
// ANALYZE
// =============================================================================
/// Judge the evidence, then apply the acceptance and retry policy.
pub async fn analyze(
    ctx: StepContext<'_>,
    state: &ResearchState,
) -> Result<StepOutcome, ResearchError> {
    let remaining = state.subtopics().len().saturating_sub(1);
    let prompt = ResearchPrompts::analyze(
        state.topic(),
        state.current_query(),
        state.search_results(),
        remaining,
    );
    let text = ctx
        .complete(Step::Analyze.as_str(), &prompt, &ctx.config.call_retry)
        .await?;

    let decoded = decode_decision(&text);
    let fallback = decoded.is_fallback().then(|| {
        warn!(
            raw = %decoded.raw,
            applied = %decoded.value,
            "Analysis output matched no decision; using default"
        );
        Fallback::new(Step::Analyze.as_str(), &decoded.raw, decoded.value.as_str())
    });

    let resolution = policy::resolve_analysis(state, decoded.value, ctx.config.max_retries);
    info!(
        decision = %decoded.value,
        next = %resolution.next,
        forced = resolution.forced,
        "Analysis complete"
    );

    Ok(StepOutcome {
        update: resolution.update,
        next: resolution.next,
        fallback,
    })
}

// =============================================================================
// REFINE QUERY
// =============================================================================
/// Ask the model for a sharper query after insufficient results.
pub async fn refine(
    ctx: StepContext<'_>,
    state: &ResearchState,
) -> Result<StepOutcome, ResearchError> {
    let max_chars = ctx.config.max_query_chars;
    let prompt = ResearchPrompts::refine_query(
        state.topic(),
        state.current_query(),
        state.search_results(),
        state.tool_choice(),
        max_chars,
    );
    let text = ctx
        .complete(Step::RefineQuery.as_str(), &prompt, &ctx.config.call_retry)
        .await?;

    let refined = bound_query(&text, max_chars);
    if refined.is_empty() {
        warn!(query = %state.current_query(), "Refinement was empty; keeping the previous query");
        let fallback = Fallback::new(Step::RefineQuery.as_str(), text.trim(), "previous query");
        let outcome = StepOutcome::to(Step::Router, ResearchUpdate::empty());
        return Ok(outcome.with_fallback(Some(fallback)));
    }

    info!(from = %state.current_query(), to = %refined, "Query refined");
    Ok(StepOutcome::to(
        Step::Router,
        ResearchUpdate::empty().with_current_query(refined),
    ))
}

/// Trim surrounding whitespace and quotes, then cut to `max_chars` characters.
pub(crate) fn bound_query(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => trimmed[..cut].trim_end().to_string(),
        None => trimmed.to_string(),
    }
}

// =============================================================================
// WRITE
// =============================================================================
/// Synthesize the final report from the accumulated evidence.
pub async fn write(
    ctx: StepContext<'_>,
    state: &ResearchState,
) -> Result<StepOutcome, ResearchError> {
    let prompt = ResearchPrompts::write(state.topic(), state.report_content());
    let text = ctx
        .complete(Step::Write.as_str(), &prompt, &ctx.config.call_retry)
        .await?;

    let report = text.trim();
    if report.is_empty() {
        warn!("Writer returned an empty report");
        return Err(ResearchError::unparseable(Step::Write.as_str(), text.as_str()));
    }

    info!(chars = report.len(), "Report written");
    Ok(StepOutcome {
        update: ResearchUpdate::empty().with_report(report),
        next: Transition::End,
        fallback: None,
    })
}
