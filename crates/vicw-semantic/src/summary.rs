//! Extractive summarization.
//!
//! Lead/tail sentence extraction: the opening sentences carry the topic,
//! the closing ones carry the outcome. Deterministic and pure — re-running
//! a job always writes the identical summary.

/// Split `text` into sentences on `.`, `!`, `?` and newlines.
/// Whitespace-only fragments are dropped.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?' | '\n') {
            let end = i + c.len_utf8();
            let s = text[start..end].trim();
            if !s.is_empty() {
                sentences.push(s);
            }
            start = end;
        }
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

/// First `lead` and last `tail` sentences, joined, capped at `max_tokens`
/// (4 bytes per token, cut on a char boundary).
pub fn extractive_summary(text: &str, lead: usize, tail: usize, max_tokens: u32) -> String {
    let sentences = split_sentences(text);
    let summary = if sentences.len() <= lead + tail {
        sentences.join(" ")
    } else {
        let head = sentences[..lead].join(" ");
        let back = sentences[sentences.len() - tail..].join(" ");
        format!("{head} … {back}")
    };

    let max_bytes = max_tokens as usize * 4;
    if summary.len() <= max_bytes {
        return summary;
    }
    let mut end = max_bytes;
    while end > 0 && !summary.is_char_boundary(end) {
        end -= 1;
    }
    summary[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_passes_through() {
        let text = "One sentence. Another one.";
        assert_eq!(extractive_summary(text, 2, 1, 256), "One sentence. Another one.");
    }

    #[test]
    fn lead_and_tail_joined_with_ellipsis() {
        let text = "First. Second. Third. Fourth. Fifth.";
        let summary = extractive_summary(text, 2, 1, 256);
        assert_eq!(summary, "First. Second. … Fifth.");
    }

    #[test]
    fn deterministic() {
        let text = "A long chat. With several turns. And a conclusion!";
        assert_eq!(
            extractive_summary(text, 2, 1, 256),
            extractive_summary(text, 2, 1, 256)
        );
    }

    #[test]
    fn token_cap_respected() {
        let text = "word ".repeat(500);
        let summary = extractive_summary(&text, 2, 1, 16);
        assert!(summary.len() <= 64);
    }

    #[test]
    fn multibyte_cap_does_not_split_chars() {
        let text = "héllo wörld ".repeat(100);
        let summary = extractive_summary(&text, 2, 1, 8);
        // Must not panic and must still be valid UTF-8 of bounded size.
        assert!(summary.len() <= 32);
    }

    #[test]
    fn newlines_split_sentences() {
        let text = "user: let's go\n\nassistant: sure\n\nuser: thanks";
        let summary = extractive_summary(text, 1, 1, 256);
        assert!(summary.starts_with("user: let's go"));
        assert!(summary.ends_with("user: thanks"));
    }
}
