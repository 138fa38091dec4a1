//! Hot-path context manager.
//!
//! Owns the live message list and the pinned header, enforces the token
//! budget with hysteresis, and sheds the oldest messages into exactly one
//! offload job when pressure trips. A shed copies messages, mints a chunk
//! id, and enqueues — no I/O, no embedding, no LLM call on this path.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use vicw_core::config::{ContextConfig, PLACEHOLDER_TOKENS};
use vicw_core::types::{ChunkId, Message, OffloadEvent, OffloadJob, Role};

use crate::queue::OffloadQueue;
use crate::tokens::estimate_tokens;

/// Fraction of the budget that header + injections may consume before the
/// injections are truncated (RAG first, then state).
const INJECTION_BUDGET_RATIO: f64 = 0.9;

pub struct ContextManager {
    pinned_header: Message,
    messages: Vec<Message>,
    live_tokens: u32,
    max_tokens: u32,
    trigger_ratio: f64,
    target_ratio: f64,
    resume_ratio: f64,
    shed_suppressed: bool,
    offload_count: u64,
    queue: Arc<OffloadQueue>,
}

/// Snapshot for GET /stats.
#[derive(Debug, Clone, Serialize)]
pub struct ContextStats {
    pub current_tokens: u32,
    pub max_tokens: u32,
    pub message_count: usize,
    pub offload_count: u64,
    pub pressure_percentage: f64,
}

impl ContextManager {
    pub fn new(config: &ContextConfig, queue: Arc<OffloadQueue>) -> Self {
        let header_tokens = estimate_tokens(&config.pinned_header);
        Self {
            pinned_header: Message::new(Role::System, config.pinned_header.clone(), header_tokens),
            messages: Vec::new(),
            live_tokens: 0,
            max_tokens: config.max_tokens,
            trigger_ratio: config.trigger_ratio,
            target_ratio: config.target_ratio,
            resume_ratio: config.resume_ratio,
            shed_suppressed: false,
            offload_count: 0,
            queue,
        }
    }

    /// Header plus live messages, in tokens.
    pub fn current_tokens(&self) -> u32 {
        self.pinned_header.token_count + self.live_tokens
    }

    fn ratio(&self) -> f64 {
        f64::from(self.current_tokens()) / f64::from(self.max_tokens)
    }

    /// Append a message, then evaluate pressure. Returns the offload event
    /// when a shed fired.
    pub fn add_message(&mut self, role: Role, content: impl Into<String>) -> Option<OffloadEvent> {
        let content = content.into();
        let tokens = estimate_tokens(&content);
        self.messages.push(Message::new(role, content, tokens));
        self.live_tokens += tokens;

        // Hysteresis: the suppression set by a shed clears only once
        // pressure has fallen to the resume line.
        if self.ratio() <= self.resume_ratio {
            self.shed_suppressed = false;
        }
        // Suppression yields when the hard budget itself is breached —
        // the window must never hold more than max_tokens.
        let triggered = self.ratio() >= self.trigger_ratio && !self.shed_suppressed;
        if triggered || self.current_tokens() > self.max_tokens {
            return self.shed();
        }
        None
    }

    /// Remove the oldest contiguous prefix (never the pinned header) until
    /// pressure is at or below the target, leaving one placeholder behind.
    fn shed(&mut self) -> Option<OffloadEvent> {
        let started = Instant::now();
        let tokens_before = self.current_tokens();
        let target = (f64::from(self.max_tokens) * self.target_ratio) as u32;

        // The most recent exchange is protected: everything from the last
        // user message onward stays live, even if that overshoots the target.
        let keep_from = self
            .messages
            .iter()
            .rposition(|m| m.role == Role::User)
            .unwrap_or(0);

        let mut cut = 0;
        let mut prefix_tokens = 0u32;
        while cut < keep_from {
            let after = self.pinned_header.token_count + (self.live_tokens - prefix_tokens)
                + PLACEHOLDER_TOKENS;
            if after <= target {
                break;
            }
            prefix_tokens += self.messages[cut].token_count;
            cut += 1;
        }

        // Nothing to remove, or the prefix holds no real conversation
        // (placeholders from earlier sheds carry no new content).
        let chunk_messages: Vec<Message> = self.messages[..cut]
            .iter()
            .filter(|m| matches!(m.role, Role::User | Role::Assistant))
            .cloned()
            .collect();
        if chunk_messages.is_empty() {
            debug!("shed skipped: empty chunk");
            return None;
        }

        let chunk_id = ChunkId::new();
        self.messages.drain(..cut);
        self.live_tokens -= prefix_tokens;

        let placeholder = Message::new(
            Role::System,
            format!("[ARCHIVED mem_id:{chunk_id}]"),
            PLACEHOLDER_TOKENS,
        );
        self.messages.insert(0, placeholder);
        self.live_tokens += PLACEHOLDER_TOKENS;

        self.queue.enqueue(OffloadJob {
            chunk_id: chunk_id.clone(),
            messages: chunk_messages,
            pinned_header_snapshot: self.pinned_header.content.clone(),
            metadata: None,
            created_at: Utc::now(),
        });

        self.shed_suppressed = true;
        self.offload_count += 1;

        let event = OffloadEvent {
            chunk_id,
            tokens_before,
            tokens_after: self.current_tokens(),
            duration_us: started.elapsed().as_micros() as u64,
        };
        info!(
            chunk_id = %event.chunk_id,
            tokens_before = event.tokens_before,
            tokens_after = event.tokens_after,
            "context shed"
        );
        Some(event)
    }

    /// Assemble the prompt: pinned header → state injection → RAG injection
    /// → live messages. Pure — the same state and blocks yield the same
    /// prompt.
    ///
    /// When header + injections exceed the injection budget, the RAG block
    /// is truncated first, then the state block. The header and the live
    /// messages are never touched.
    pub fn get_prompt(
        &self,
        state_block: Option<&str>,
        rag_block: Option<&str>,
    ) -> Vec<Message> {
        let budget = (f64::from(self.max_tokens) * INJECTION_BUDGET_RATIO) as u32;
        let header_tokens = self.pinned_header.token_count;

        let state_budget = budget.saturating_sub(header_tokens);
        let state_msg = state_block.and_then(|s| fit_block(Role::State, s, state_budget));

        let rag_budget = budget.saturating_sub(
            header_tokens + state_msg.as_ref().map(|m| m.token_count).unwrap_or(0),
        );
        let rag_msg = rag_block.and_then(|s| fit_block(Role::Rag, s, rag_budget));

        let mut prompt = Vec::with_capacity(2 + self.messages.len() + 1);
        prompt.push(self.pinned_header.clone());
        prompt.extend(state_msg);
        prompt.extend(rag_msg);
        prompt.extend(self.messages.iter().cloned());
        prompt
    }

    /// Remove the most recently appended assistant turn (echo-guard path).
    /// Returns false when the last message is not an assistant turn.
    pub fn rollback_last_assistant(&mut self) -> bool {
        match self.messages.last() {
            Some(m) if m.role == Role::Assistant => {
                let m = self.messages.pop().expect("checked non-empty");
                self.live_tokens -= m.token_count;
                if self.ratio() <= self.resume_ratio {
                    self.shed_suppressed = false;
                }
                true
            }
            _ => false,
        }
    }

    /// Clear live messages. Persistent stores are untouched; the lifetime
    /// offload counter survives.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.live_tokens = 0;
        self.shed_suppressed = false;
    }

    pub fn pinned_header(&self) -> &Message {
        &self.pinned_header
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Most recent user turn, if any (emergency-override prompt).
    pub fn last_user(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }

    pub fn shed_suppressed(&self) -> bool {
        self.shed_suppressed
    }

    pub fn stats(&self) -> ContextStats {
        ContextStats {
            current_tokens: self.current_tokens(),
            max_tokens: self.max_tokens,
            message_count: self.messages.len(),
            offload_count: self.offload_count,
            pressure_percentage: self.ratio() * 100.0,
        }
    }
}

/// Fit a block into `max_tokens`, truncating on a char boundary.
/// A zero budget drops the block entirely.
fn fit_block(role: Role, content: &str, max_tokens: u32) -> Option<Message> {
    if content.is_empty() || max_tokens == 0 {
        return None;
    }
    let tokens = estimate_tokens(content);
    if tokens <= max_tokens {
        return Some(Message::new(role, content, tokens));
    }
    let max_bytes = max_tokens as usize * 4;
    let mut end = max_bytes.min(content.len());
    while end > 0 && !content.is_char_boundary(end) {
        end -= 1;
    }
    let truncated = &content[..end];
    Some(Message::new(role, truncated, estimate_tokens(truncated)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vicw_core::config::ContextConfig;

    fn config(max_tokens: u32, header: &str) -> ContextConfig {
        ContextConfig {
            max_tokens,
            trigger_ratio: 0.80,
            target_ratio: 0.60,
            resume_ratio: 0.70,
            pinned_header: header.to_string(),
        }
    }

    fn manager(max_tokens: u32, header: &str) -> (ContextManager, Arc<OffloadQueue>) {
        let queue = Arc::new(OffloadQueue::new(100));
        let mgr = ContextManager::new(&config(max_tokens, header), queue.clone());
        (mgr, queue)
    }

    /// 20-token message body (80 chars).
    fn body() -> String {
        "x".repeat(80)
    }

    #[test]
    fn pressure_relief_fires_exactly_once() {
        // T_max = 100, header = 10 tokens, messages of 20 tokens each.
        let (mut mgr, queue) = manager(100, &"h".repeat(40));
        assert_eq!(mgr.current_tokens(), 10);

        assert!(mgr.add_message(Role::User, body()).is_none()); // 30
        assert!(mgr.add_message(Role::Assistant, body()).is_none()); // 50
        assert!(mgr.add_message(Role::User, body()).is_none()); // 70
        let event = mgr.add_message(Role::Assistant, body()); // 90 >= 80

        let event = event.expect("shed fires at trigger");
        assert_eq!(event.tokens_before, 90);
        assert!(event.tokens_after <= 60, "target missed: {}", event.tokens_after);
        assert!(mgr.shed_suppressed());

        // The chunk holds the removed exchange in order.
        let jobs = queue.drain_batch(10);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].messages.len(), 2);
        assert_eq!(jobs[0].messages[0].role, Role::User);
        assert_eq!(jobs[0].messages[1].role, Role::Assistant);

        // Placeholder sits where the prefix was.
        assert!(mgr.messages()[0].content.starts_with("[ARCHIVED mem_id:chunk-"));

        // Suppression blocks the immediate re-trigger at the same pressure.
        let again = mgr.add_message(Role::User, body()); // 80 -> ratio 0.8
        assert!(again.is_none(), "suppressed shed fired anyway");
        assert!(mgr.shed_suppressed());
    }

    #[test]
    fn suppression_clears_below_resume() {
        let (mut mgr, _queue) = manager(100, &"h".repeat(40));
        for _ in 0..2 {
            mgr.add_message(Role::User, body());
            mgr.add_message(Role::Assistant, body());
        }
        assert!(mgr.shed_suppressed());

        // After the shed the window is at 60 tokens. A small message keeps
        // pressure at or below resume (0.70), clearing suppression.
        mgr.add_message(Role::User, "ok"); // 61 tokens -> 0.61
        assert!(!mgr.shed_suppressed());
    }

    #[test]
    fn last_exchange_survives_even_with_overshoot() {
        // The trailing user turn alone exceeds the 60-token target.
        let (mut mgr, queue) = manager(100, "hdr");
        mgr.add_message(Role::User, body()); // 20 tokens
        mgr.add_message(Role::Assistant, body()); // 20
        let event = mgr.add_message(Role::User, "c".repeat(260)); // 65 -> 106 total

        let event = event.expect("shed fires");
        // Only the old exchange went; the oversized trailing turn stayed.
        let jobs = queue.drain_batch(10);
        assert_eq!(jobs[0].messages.len(), 2);
        assert_eq!(mgr.last_user().unwrap().content, "c".repeat(260));
        // Overshoot accepted: above target, but the exchange is intact.
        assert!(event.tokens_after > 60);
        assert!(event.tokens_after < event.tokens_before);
    }

    #[test]
    fn budget_backstop_overrides_suppression() {
        let (mut mgr, queue) = manager(100, "hdr");
        mgr.add_message(Role::User, body());
        mgr.add_message(Role::Assistant, body());
        mgr.add_message(Role::User, body());
        mgr.add_message(Role::Assistant, body()); // 81 -> shed, suppressed
        assert!(mgr.shed_suppressed());
        queue.drain_batch(10);

        // A jumbo message would push the window past max_tokens; the shed
        // fires despite suppression so the budget invariant holds.
        let event = mgr.add_message(Role::User, "j".repeat(280)); // 70 tokens
        assert!(event.is_some());
        assert!(mgr.current_tokens() <= 100);
    }

    #[test]
    fn shed_prefix_is_contiguous_and_excludes_header() {
        let (mut mgr, queue) = manager(200, &"h".repeat(40));
        for i in 0..8 {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            mgr.add_message(role, body());
        }
        let jobs = queue.drain_batch(10);
        assert_eq!(jobs.len(), 1);
        // Chunk messages alternate from the oldest turn, in order.
        assert_eq!(jobs[0].messages[0].role, Role::User);
        for pair in jobs[0].messages.windows(2) {
            assert_ne!(pair[0].role, pair[1].role);
        }
        // The pinned header was never part of the shed.
        assert_eq!(mgr.pinned_header().content, "h".repeat(40));
    }

    #[test]
    fn unique_chunk_ids_across_sheds() {
        let (mut mgr, queue) = manager(100, "hdr");
        let mut ids = Vec::new();
        for _ in 0..6 {
            mgr.add_message(Role::User, body());
            mgr.add_message(Role::Assistant, body());
            // Drain as we go so placeholders pile up instead of jobs.
            for job in queue.drain_batch(10) {
                ids.push(job.chunk_id.as_str().to_string());
            }
        }
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        assert!(!ids.is_empty());
    }

    #[test]
    fn prompt_order_is_header_state_rag_live() {
        let (mut mgr, _queue) = manager(8192, "header");
        mgr.add_message(Role::User, "hello");

        let prompt = mgr.get_prompt(Some("[STATE MEMORY]\nActive goals: x"), Some("[CONTEXT FROM MEMORY]\n- y"));
        let roles: Vec<Role> = prompt.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::State, Role::Rag, Role::User]);
    }

    #[test]
    fn get_prompt_is_pure() {
        let (mut mgr, _queue) = manager(8192, "header");
        mgr.add_message(Role::User, "hello");
        let a = mgr.get_prompt(Some("state"), Some("rag"));
        let b = mgr.get_prompt(Some("state"), Some("rag"));
        let texts = |p: &[Message]| p.iter().map(|m| m.content.clone()).collect::<Vec<_>>();
        assert_eq!(texts(&a), texts(&b));
    }

    #[test]
    fn rag_truncated_before_state() {
        // Budget = 0.9 * 100 = 90 tokens; header = 10.
        let (mgr, _queue) = manager(100, &"h".repeat(40));
        let state = "s".repeat(200); // 50 tokens
        let rag = "r".repeat(400); // 100 tokens

        let prompt = mgr.get_prompt(Some(&state), Some(&rag));
        let state_msg = prompt.iter().find(|m| m.role == Role::State).unwrap();
        let rag_msg = prompt.iter().find(|m| m.role == Role::Rag).unwrap();

        // State fits whole (10 + 50 <= 90); rag squeezed into the remainder.
        assert_eq!(state_msg.token_count, 50);
        assert!(rag_msg.token_count <= 30);
    }

    #[test]
    fn state_truncated_when_still_over() {
        let (mgr, _queue) = manager(100, &"h".repeat(40));
        let state = "s".repeat(800); // 200 tokens, alone over budget
        let rag = "r".repeat(400);

        let prompt = mgr.get_prompt(Some(&state), Some(&rag));
        let state_msg = prompt.iter().find(|m| m.role == Role::State).unwrap();
        assert!(state_msg.token_count <= 80);
        // Nothing left for rag.
        assert!(prompt.iter().all(|m| m.role != Role::Rag));
    }

    #[test]
    fn rollback_reverses_tokens() {
        let (mut mgr, _queue) = manager(8192, "hdr");
        mgr.add_message(Role::User, "question");
        let before = mgr.current_tokens();
        mgr.add_message(Role::Assistant, "a long answer that will be rolled back");

        assert!(mgr.rollback_last_assistant());
        assert_eq!(mgr.current_tokens(), before);
        // Second rollback finds a user turn on top and refuses.
        assert!(!mgr.rollback_last_assistant());
    }

    #[test]
    fn reset_clears_live_window_only() {
        let (mut mgr, queue) = manager(100, "hdr");
        for _ in 0..4 {
            mgr.add_message(Role::User, body());
            mgr.add_message(Role::Assistant, body());
        }
        let offloads = mgr.stats().offload_count;
        assert!(offloads > 0);

        mgr.reset();
        assert_eq!(mgr.messages().len(), 0);
        assert_eq!(mgr.current_tokens(), mgr.pinned_header().token_count);
        assert_eq!(mgr.stats().offload_count, offloads);
        // Jobs already enqueued stay enqueued.
        assert!(!queue.is_empty());
    }
}
