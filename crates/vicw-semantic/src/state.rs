//! Out-of-band state machine over the graph store.
//!
//! Extracted candidates are folded into State nodes with fuzzy dedup, and
//! the active set is rendered into the `[STATE MEMORY]` prompt block. Visit
//! counts on injected states feed boredom detection: a state the model keeps
//! circling back to earns an explicit loop warning.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use vicw_core::config::StateConfig;
use vicw_core::types::{StateCandidate, StateNode, StateStatus, StateType};
use vicw_memory::error::Result;
use vicw_memory::traits::GraphStore;

use crate::normalize::{fuzzy_match, normalize_description};

/// Upper bound on existing states fetched per fuzzy-match scan.
const MATCH_SCAN_LIMIT: usize = 64;

pub struct StateMachine {
    graph: Arc<dyn GraphStore>,
}

/// Active states grouped by type plus recent completions, visit counts
/// already incremented for this injection.
#[derive(Debug, Default)]
pub struct StateSnapshot {
    pub goals: Vec<StateNode>,
    pub tasks: Vec<StateNode>,
    pub decisions: Vec<StateNode>,
    pub facts: Vec<StateNode>,
    pub completed: Vec<StateNode>,
}

impl StateSnapshot {
    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
            && self.tasks.is_empty()
            && self.decisions.is_empty()
            && self.facts.is_empty()
            && self.completed.is_empty()
    }

    fn active(&self) -> impl Iterator<Item = &StateNode> {
        self.goals
            .iter()
            .chain(&self.tasks)
            .chain(&self.decisions)
            .chain(&self.facts)
    }
}

impl StateMachine {
    pub fn new(graph: Arc<dyn GraphStore>) -> Self {
        Self { graph }
    }

    /// Fold one candidate into the graph.
    ///
    /// No fuzzy-equivalent node of the same type → create. An active node
    /// matching a completed/invalid candidate → transition (visit count
    /// resets in the store). Matching statuses → refresh updated_at only.
    pub fn apply(&self, candidate: &StateCandidate) -> Result<()> {
        let normalized = normalize_description(&candidate.description);
        if normalized.len() < 3 {
            return Ok(());
        }

        let existing = self.find_match(candidate.state_type, &normalized)?;
        match existing {
            None => {
                self.graph.create_state(
                    candidate.state_type,
                    &candidate.description,
                    &normalized,
                    candidate.status,
                )?;
            }
            Some(node) if node.status == candidate.status => {
                self.graph.touch_state(&node.state_id)?;
            }
            Some(node) if node.status == StateStatus::Active => {
                debug!(
                    state_id = %node.state_id,
                    from = %node.status,
                    to = %candidate.status,
                    "state transition"
                );
                self.graph.set_state_status(&node.state_id, candidate.status)?;
            }
            // Completed/invalid nodes are terminal; a late "active"
            // re-mention does not resurrect them.
            Some(_) => {}
        }
        Ok(())
    }

    fn find_match(&self, state_type: StateType, normalized: &str) -> Result<Option<StateNode>> {
        for status in [StateStatus::Active, StateStatus::Completed, StateStatus::Invalid] {
            let nodes = self
                .graph
                .states(Some(state_type), status, MATCH_SCAN_LIMIT)?;
            if let Some(node) = nodes
                .into_iter()
                .find(|n| fuzzy_match(&normalize_description(&n.description), normalized))
            {
                return Ok(Some(node));
            }
        }
        Ok(None)
    }

    /// Active states per type under the configured caps, plus recent
    /// completions. Every returned active state gets a visit recorded.
    pub fn snapshot(&self, config: &StateConfig) -> Result<StateSnapshot> {
        let mut snapshot = StateSnapshot {
            goals: self
                .graph
                .states(Some(StateType::Goal), StateStatus::Active, config.max_goals)?,
            tasks: self
                .graph
                .states(Some(StateType::Task), StateStatus::Active, config.max_tasks)?,
            decisions: self.graph.states(
                Some(StateType::Decision),
                StateStatus::Active,
                config.max_decisions,
            )?,
            facts: self
                .graph
                .states(Some(StateType::Fact), StateStatus::Active, config.max_facts)?,
            completed: self
                .graph
                .states(None, StateStatus::Completed, config.completed_shown)?,
        };

        let now = Utc::now();
        for group in [
            &mut snapshot.goals,
            &mut snapshot.tasks,
            &mut snapshot.decisions,
            &mut snapshot.facts,
        ] {
            for node in group.iter_mut() {
                self.graph.record_visit(&node.state_id, now)?;
                node.visit_count += 1;
                node.last_visited = Some(now);
            }
        }
        Ok(snapshot)
    }

    /// Render the `[STATE MEMORY]` block. Empty sections are omitted; a
    /// fully empty snapshot renders nothing.
    pub fn render(snapshot: &StateSnapshot, config: &StateConfig) -> Option<String> {
        if snapshot.is_empty() {
            return None;
        }

        let mut block = String::from("[STATE MEMORY]");
        let section = |label: &str, nodes: &[StateNode]| {
            if nodes.is_empty() {
                return String::new();
            }
            let items: Vec<&str> = nodes.iter().map(|n| n.description.as_str()).collect();
            format!("\n{label}: {}", items.join("; "))
        };
        block.push_str(&section("Active goals", &snapshot.goals));
        block.push_str(&section("Active tasks", &snapshot.tasks));
        block.push_str(&section("Decisions", &snapshot.decisions));
        block.push_str(&section("Known facts", &snapshot.facts));
        block.push_str(&section("Recently completed", &snapshot.completed));

        if config.boredom_enabled {
            if let Some(bored) = snapshot
                .active()
                .find(|n| n.visit_count >= config.boredom_threshold)
            {
                block.push_str(&format!(
                    "\n⚠️ LOOP DETECTED: Repeated focus on {}. \
                     Consider concluding or exploring alternatives.",
                    bored.description
                ));
            }
        }
        Some(block)
    }
}
