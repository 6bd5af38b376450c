//! Scripted capabilities for workflow tests.
//!
//! `ScriptedModel` recognizes which step a prompt belongs to and answers from
//! a per-step queue, falling back to a per-step default once the queue is
//! empty. `ScriptedTool` returns numbered payloads and can fail on demand.

#![allow(dead_code)]

use async_trait::async_trait;
use research_graph::{
    LanguageModel, LlmError, RetryPolicy, SearchError, SearchTool, WorkflowConfig,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    Planner,
    Router,
    Analyze,
    Refine,
    Write,
}

impl PromptKind {
    fn of(prompt: &str) -> Self {
        if prompt.contains("planning a research project") {
            PromptKind::Planner
        } else if prompt.contains("choose the best search tool") {
            PromptKind::Router
        } else if prompt.contains("reviewing search results") {
            PromptKind::Analyze
        } else if prompt.contains("did not return sufficient information") {
            PromptKind::Refine
        } else {
            PromptKind::Write
        }
    }
}

#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    /// Connection failure (retryable)
    Unreachable,
    /// Never answers
    Hang,
}

pub struct ScriptedModel {
    queues: Mutex<HashMap<PromptKind, VecDeque<Reply>>>,
    defaults: HashMap<PromptKind, Reply>,
    prompts: Mutex<Vec<(PromptKind, String)>>,
}

impl ScriptedModel {
    /// Three subtopics, web search, always sufficient.
    pub fn new() -> Self {
        let defaults = HashMap::from([
            (PromptKind::Planner, text("Collection\nChemistry\nPolicy")),
            (PromptKind::Router, text("web_search")),
            (PromptKind::Analyze, text("continue")),
            (PromptKind::Refine, text("refined query")),
            (PromptKind::Write, text("FINAL REPORT")),
        ]);

        Self {
            queues: Mutex::new(HashMap::new()),
            defaults,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Replace the reply used once the queue for `kind` is empty.
    pub fn always(mut self, kind: PromptKind, reply: Reply) -> Self {
        self.defaults.insert(kind, reply);
        self
    }

    /// Queue replies for `kind`, answered before the default.
    pub fn then(self, kind: PromptKind, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.queues
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .extend(replies);
        self
    }

    pub fn calls(&self, kind: PromptKind) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    pub fn prompts(&self, kind: PromptKind) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let kind = PromptKind::of(prompt);
        self.prompts.lock().unwrap().push((kind, prompt.to_string()));

        let reply = self
            .queues
            .lock()
            .unwrap()
            .get_mut(&kind)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.defaults[&kind].clone());

        match reply {
            Reply::Text(t) => Ok(t),
            Reply::Unreachable => Err(LlmError::Connection("connection refused".into())),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn text(s: &str) -> Reply {
    Reply::Text(s.to_string())
}

pub fn texts(items: &[&str]) -> Vec<Reply> {
    items.iter().map(|s| text(s)).collect()
}

/// Search tool returning `"<name>-payload-<n>;"` for the n-th call.
pub struct ScriptedTool {
    name: &'static str,
    calls: AtomicUsize,
    failures: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl ScriptedTool {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            calls: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Answer the next `n` calls with a 503.
    pub fn failing_first(self, n: usize) -> Self {
        self.failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchTool for ScriptedTool {
    async fn search(&self, query: &str) -> Result<String, SearchError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.queries.lock().unwrap().push(query.to_string());

        let pending = self.failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.failures.store(pending - 1, Ordering::SeqCst);
            return Err(SearchError::Server(503));
        }

        Ok(format!("{}-payload-{};", self.name, n))
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Default engine settings with millisecond backoff.
pub fn fast_config() -> WorkflowConfig {
    let retry = RetryPolicy::new(2).with_backoff_base(Duration::from_millis(1));
    WorkflowConfig::default().with_call_retry(retry)
}
