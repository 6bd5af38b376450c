//! Evidence acceptance and the analyze-exit routing policy.
//!
//! Rules, evaluated in order when analysis finishes:
//! 1. `retries >= max_retries`: force-accept the current evidence
//! 2. decision is `Continue`: accept the evidence
//! 3. otherwise: refine the query and search again
//!
//! Accepting pops the front subtopic, resets `retries` and appends the last
//! search payload to the evidence. Control then returns to the router while
//! subtopics remain and moves on to the write step once they are exhausted.
//! Everything here is a pure function of the state.

use tracing::warn;

use crate::graph::{Step, Transition};
use crate::state::{Decision, ResearchState, ResearchUpdate};

/// Update and transition chosen at the exit of the analyze step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub update: ResearchUpdate,
    pub next: Transition,
    /// Whether the retry ceiling overrode the model's decision
    pub forced: bool,
}

/// Accept the latest search payload as evidence for the active subtopic.
pub fn accept_evidence(state: &ResearchState) -> (ResearchUpdate, Transition) {
    let update = ResearchUpdate::empty()
        .with_advance_subtopic()
        .with_retries(0)
        .with_evidence(state.search_results());

    match state.subtopics().get(1) {
        Some(next) => (
            update
                .with_current_query(next.clone())
                .with_decision(Decision::Continue),
            Transition::To(Step::Router),
        ),
        None => (
            update.with_decision(Decision::Write),
            Transition::To(Step::Write),
        ),
    }
}

/// Apply the retry ceiling and the model's decision.
pub fn resolve_analysis(state: &ResearchState, decision: Decision, max_retries: u32) -> Resolution {
    if state.retries() >= max_retries {
        warn!(
            query = %state.current_query(),
            retries = state.retries(),
            max_retries,
            "Retry limit reached; accepting current evidence"
        );
        let (update, next) = accept_evidence(state);
        return Resolution {
            update,
            next,
            forced: decision != Decision::Continue,
        };
    }

    match decision {
        Decision::Continue | Decision::Write => {
            let (update, next) = accept_evidence(state);
            Resolution {
                update,
                next,
                forced: false,
            }
        }
        Decision::Rewrite => Resolution {
            update: ResearchUpdate::empty().with_decision(Decision::Rewrite),
            next: Transition::To(Step::RefineQuery),
            forced: false,
        },
    }
}
