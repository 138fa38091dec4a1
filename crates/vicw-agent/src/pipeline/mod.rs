//! Per-turn orchestration: admit → retrieve → inject → generate → echo-guard.

pub mod echo;
pub mod process;
pub mod session;

pub use echo::{EchoGuard, EchoVerdict};
pub use process::{process_turn, TurnContext, TurnOutcome};
pub use session::{Session, SessionInner};
