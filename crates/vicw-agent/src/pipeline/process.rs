//! The per-turn pipeline shared by every HTTP entry point.
//!
//! `process_turn` runs the full sequence: admit the user turn (a shed may
//! fire, non-blocking) → hybrid retrieval → state snapshot → pause the cold
//! worker → assemble prompt → generate → echo-guard loop → accept. Only an
//! LLM failure propagates to the caller; retrieval and state errors degrade
//! to a turn with fewer injections.

use tracing::{debug, info, warn};

use vicw_context::latch::PauseLatch;
use vicw_context::tokens::estimate_tokens;
use vicw_core::config::VicwConfig;
use vicw_core::types::{Message, RagResult, Role};
use vicw_semantic::retrieval::RetrievalCoordinator;
use vicw_semantic::state::StateMachine;

use crate::provider::{CompletionRequest, LlmClient, LlmError};

use super::echo::{EchoGuard, EchoVerdict};
use super::session::Session;

/// Host context required by the pipeline. Implemented by the gateway's
/// `AppState`; tests provide an in-process fixture.
pub trait TurnContext: Send + Sync {
    fn config(&self) -> &VicwConfig;
    fn llm(&self) -> &dyn LlmClient;
    fn retrieval(&self) -> &RetrievalCoordinator;
    fn states(&self) -> &StateMachine;
    fn echo(&self) -> &EchoGuard;
    fn latch(&self) -> &PauseLatch;
}

/// Result of one completed turn.
#[derive(Debug)]
pub struct TurnOutcome {
    pub response: String,
    pub model: String,
    pub tokens_in_context: u32,
    pub rag_items_injected: usize,
    pub latency_ms: u64,
}

pub async fn process_turn<C: TurnContext>(
    ctx: &C,
    session: &Session,
    text: &str,
    use_rag: bool,
) -> Result<TurnOutcome, LlmError> {
    // Admit the user turn. A shed copies + enqueues and returns; nothing
    // here waits on persistence.
    {
        let mut inner = session.lock().await;
        if let Some(event) = inner.context.add_message(Role::User, text) {
            debug!(
                chunk_id = %event.chunk_id,
                tokens_before = event.tokens_before,
                tokens_after = event.tokens_after,
                "shed on user turn"
            );
        }
    }

    let rag = if use_rag {
        ctx.retrieval().retrieve(text).await
    } else {
        RagResult::default()
    };
    let rag_block = RetrievalCoordinator::format_injection(&rag);

    let state_block = if ctx.config().state.enabled {
        match ctx.states().snapshot(&ctx.config().state) {
            Ok(snapshot) => StateMachine::render(&snapshot, &ctx.config().state),
            Err(e) => {
                warn!(error = %e, "state snapshot failed, skipping injection");
                None
            }
        }
    } else {
        None
    };

    // The cold worker yields the CPU while the guard is alive; it releases
    // on drop, including early error returns.
    let _pause = ctx.latch().pause();

    let llm_config = &ctx.config().llm;
    let final_attempt = ctx.echo().final_attempt();
    let mut attempt: u32 = 1;
    let mut warning: Option<String> = None;

    let (response, embedding, exhausted) = loop {
        let prompt = {
            let inner = session.lock().await;
            let strip = attempt == final_attempt && ctx.echo().strip_on_final();
            let mut messages = if strip && attempt > 1 {
                // Emergency override: pinned header and the latest user
                // turn only; the directive rides in as the warning below.
                let mut bare = vec![inner.context.pinned_header().clone()];
                bare.extend(inner.context.last_user().cloned());
                bare
            } else {
                inner
                    .context
                    .get_prompt(state_block.as_deref(), rag_block.as_deref())
            };
            if let Some(w) = &warning {
                messages.push(Message::new(Role::System, w.clone(), estimate_tokens(w)));
            }
            messages
        };

        let request = CompletionRequest {
            model: llm_config.model.clone(),
            messages: prompt,
            temperature: llm_config.temperature,
            max_tokens: llm_config.max_tokens,
        };
        let response = ctx.llm().generate(&request).await?;

        let verdict = {
            let inner = session.lock().await;
            ctx.echo().review(&inner.ring, &response.text).await
        };
        match verdict {
            EchoVerdict::Accept { embedding } => break (response, embedding, false),
            EchoVerdict::Echo {
                similarity,
                embedding,
            } => {
                warn!(similarity, attempt, "echo detected, regenerating");
                if attempt >= final_attempt {
                    ctx.echo().note_exhausted();
                    // Best effort: the repeated response goes out anyway.
                    break (response, Some(embedding), true);
                }
                attempt += 1;
                warning = Some(ctx.echo().warning(attempt, &response.text));
            }
        }
    };

    let tokens_in_context = {
        let mut inner = session.lock().await;
        inner.context.add_message(Role::Assistant, &response.text);
        if let Some(e) = embedding {
            inner.ring.push(e, &response.text);
        }
        inner.context.current_tokens()
    };

    info!(
        model = %response.model,
        latency_ms = response.latency_ms,
        tokens_in_context,
        rag_items = rag.items(),
        attempts = attempt,
        exhausted,
        "turn complete"
    );

    Ok(TurnOutcome {
        response: response.text,
        model: response.model,
        tokens_in_context,
        rag_items_injected: if rag_block.is_some() { rag.items() } else { 0 },
        latency_ms: response.latency_ms,
    })
}
