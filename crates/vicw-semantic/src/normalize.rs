//! Description normalization and fuzzy matching for state upserts.

use std::collections::HashSet;

/// Lowercase, trim, drop article tokens, strip trailing punctuation,
/// collapse whitespace.
pub fn normalize_description(description: &str) -> String {
    let lowered = description.to_lowercase();
    let trimmed = lowered.trim_end_matches(['.', '!', '?', ',', ';', ':']);
    trimmed
        .split_whitespace()
        .filter(|t| !matches!(*t, "the" | "a" | "an"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn token_set(s: &str) -> HashSet<&str> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Token-set ratio: Sorensen–Dice similarity of the sorted shared-token
/// string against each full sorted token string, best of the two. Subset
/// phrasing ("hydro plant" inside "go to hydro plant") scores 1.0, so
/// arrival phrasing matches goal phrasing.
fn token_set_ratio(a: &str, b: &str) -> f64 {
    let sa = token_set(a);
    let sb = token_set(b);
    let mut shared: Vec<&str> = sa.intersection(&sb).copied().collect();
    if shared.is_empty() {
        return 0.0;
    }
    shared.sort_unstable();
    let shared = shared.join(" ");

    let mut full_a: Vec<&str> = sa.into_iter().collect();
    full_a.sort_unstable();
    let mut full_b: Vec<&str> = sb.into_iter().collect();
    full_b.sort_unstable();

    strsim::sorensen_dice(&shared, &full_a.join(" "))
        .max(strsim::sorensen_dice(&shared, &full_b.join(" ")))
}

/// Two normalized descriptions refer to the same state when they are equal,
/// within Levenshtein distance 2, or their token-set ratio is ≥ 0.85.
pub fn fuzzy_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    if strsim::levenshtein(a, b) <= 2 {
        return true;
    }
    token_set_ratio(a, b) >= 0.85
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_strips_articles_and_case() {
        assert_eq!(normalize_description("Go to the Hydro-Plant."), "go to hydro-plant");
        assert_eq!(normalize_description("  A plan!  "), "plan");
        assert_eq!(normalize_description("an idea"), "idea");
    }

    #[test]
    fn exact_match_after_normalization() {
        let a = normalize_description("the Hydro-Plant");
        let b = normalize_description("Hydro-Plant.");
        assert!(fuzzy_match(&a, &b));
    }

    #[test]
    fn small_typos_match() {
        assert!(fuzzy_match("refill the tank", "refill the tanks"));
        assert!(fuzzy_match("deploy service", "deploy servics"));
    }

    #[test]
    fn subset_phrasing_matches() {
        // Arrival phrasing vs goal phrasing.
        assert!(fuzzy_match("hydro-plant", "go to hydro-plant"));
        assert!(fuzzy_match("fix login bug", "fix login bug today"));
    }

    #[test]
    fn unrelated_descriptions_do_not_match() {
        assert!(!fuzzy_match("go to hydro-plant", "buy groceries"));
        assert!(!fuzzy_match("write tests", "delete production database"));
    }

    #[test]
    fn partial_token_overlap_stays_below_threshold() {
        // One shared token out of several is not the same state.
        assert!(!fuzzy_match("deploy api service", "api gateway"));
    }
}
