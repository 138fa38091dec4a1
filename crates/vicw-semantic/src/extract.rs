//! Rule-based state extraction over offloaded text.
//!
//! Pure: `(text) -> candidates`, no I/O. Fuzzy-matching candidates against
//! existing states is a separate step that talks to the graph (see
//! [`crate::state::StateMachine`]).

use vicw_core::types::StateCandidate;

use crate::catalog::CATALOG;

/// Longest description worth tracking; longer captures are tail-trimmed at
/// a word boundary.
const MAX_DESCRIPTION_CHARS: usize = 120;

/// Scan `text` sentence by sentence against the pattern catalog.
/// At most one candidate per sentence (first catalog hit wins), deduplicated
/// across the whole call.
pub fn extract_candidates(text: &str) -> Vec<StateCandidate> {
    let mut out: Vec<StateCandidate> = Vec::new();

    for sentence in text.split(['.', '!', '?', '\n']) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }
        for pattern in CATALOG.iter() {
            let Some(caps) = pattern.regex.captures(sentence) else {
                continue;
            };
            let Some(desc) = caps.get(1).map(|m| clean_description(m.as_str())) else {
                continue;
            };
            if desc.len() < 3 {
                break;
            }
            let candidate = StateCandidate {
                state_type: pattern.state_type,
                status: pattern.status,
                description: desc,
            };
            if !out.contains(&candidate) {
                out.push(candidate);
            }
            break;
        }
    }
    out
}

fn clean_description(raw: &str) -> String {
    let trimmed = raw
        .trim()
        .trim_end_matches(['.', '!', '?', ',', ';', ':'])
        .trim();
    if trimmed.len() <= MAX_DESCRIPTION_CHARS {
        return trimmed.to_string();
    }
    match trimmed[..MAX_DESCRIPTION_CHARS].rfind(' ') {
        Some(cut) => trimmed[..cut].to_string(),
        None => trimmed[..MAX_DESCRIPTION_CHARS].to_string(),
    }
}
