//! Static pattern catalog for the state extractor.
//!
//! Each pattern carries the state type and status it emits; the single
//! capture group is the candidate description. Patterns are matched per
//! sentence, case-insensitively.

use std::sync::LazyLock;

use regex::Regex;

use vicw_core::types::{StateStatus, StateType};

pub struct StatePattern {
    pub state_type: StateType,
    pub status: StateStatus,
    pub regex: Regex,
}

fn pattern(state_type: StateType, status: StateStatus, re: &str) -> StatePattern {
    StatePattern {
        state_type,
        status,
        regex: Regex::new(re).expect("static pattern compiles"),
    }
}

/// The built-in catalog. Order matters: completion patterns run before the
/// affirmative ones so "we finished packing" is not also read as a new task.
pub static CATALOG: LazyLock<Vec<StatePattern>> = LazyLock::new(|| {
    use StateStatus::{Active, Completed};
    use StateType::{Decision, Fact, Goal, Task};
    vec![
        // Completions
        pattern(Goal, Completed, r"(?i)\bwe (?:arrived at|reached|got to|made it to) (.+)"),
        pattern(Task, Completed, r"(?i)\bwe (?:finished|completed|wrapped up) (.+)"),
        pattern(Task, Completed, r"(?i)\b(.+?) (?:is|are) (?:done|finished|complete|merged|deployed)\b"),
        pattern(Goal, Completed, r"(?i)\b(.+?) (?:is|was) (?:achieved|accomplished)\b"),
        // Goals
        pattern(Goal, Active, r"(?i)\blet'?s (?:go to|visit|head to|get to) (.+)"),
        pattern(Goal, Active, r"(?i)\bour goal is (?:to )?(.+)"),
        pattern(Goal, Active, r"(?i)\bwe(?:'re| are) (?:trying|aiming) to (.+)"),
        // Tasks
        pattern(Task, Active, r"(?i)\bwe need to (.+)"),
        pattern(Task, Active, r"(?i)\bwe (?:should|have to|must) (.+)"),
        pattern(Task, Active, r"(?i)\bi(?:'ll| will) (.+)"),
        pattern(Task, Active, r"(?i)\blet'?s (?:start|begin) (?:by |with )?(.+)"),
        // Decisions
        pattern(Decision, Active, r"(?i)\bwe (?:decided|agreed) (?:on |to )?(.+)"),
        pattern(Decision, Active, r"(?i)\b(.+?) (?:is|was) chosen\b"),
        pattern(Decision, Active, r"(?i)\bwe(?:'ll| will) go with (.+)"),
        // Facts
        pattern(Fact, Active, r"(?i)\bremember(?: that)?[,:]? (.+)"),
        pattern(Fact, Active, r"(?i)\bnote that (.+)"),
        pattern(Fact, Active, r"(?i)\bfor the record[,:]? (.+)"),
        pattern(Fact, Active, r"(?i)\bit turns out (?:that )?(.+)"),
    ]
});
