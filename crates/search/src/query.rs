/// ~50 common English words dropped from a query before it's turned into an
/// FTS5 `MATCH` expression — data, not a dependency, per the
/// design note that a stop-word list doesn't earn its own crate.
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "if", "then", "else", "for", "of", "to", "in", "on",
    "at", "by", "with", "about", "against", "between", "into", "through", "during", "before",
    "after", "above", "below", "from", "up", "down", "out", "off", "over", "under", "again",
    "further", "is", "am", "are", "was", "were", "be", "been", "being", "do", "does", "did",
    "have", "has", "had", "i", "you", "he", "she", "it", "we", "they", "this", "that", "these",
    "those", "my", "your", "his", "her", "its", "our", "their", "me", "him", "them", "us",
];

/// Tokenise, drop stop-words, quote, and OR-join into an FTS5 `MATCH`
/// expression. Returns `None` when no tokens survive — callers should
/// treat that as "no results" rather than issuing an unconstrained MATCH.
pub fn build_match_expression(raw_query: &str) -> Option<String> {
    let tokens: Vec<String> = raw_query
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .filter(|t| !t.is_empty() && !STOP_WORDS.contains(&t.as_str()))
        .map(|t| format!("\"{}\"", t.replace('"', "")))
        .collect();

    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" OR "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_words_are_dropped_and_remaining_tokens_or_joined() {
        let expr = build_match_expression("the receipt and butter").unwrap();
        assert_eq!(expr, "\"receipt\" OR \"butter\"");
    }

    #[test]
    fn all_stop_words_yields_none() {
        assert!(build_match_expression("the and of").is_none());
    }

    #[test]
    fn empty_query_yields_none() {
        assert!(build_match_expression("   ").is_none());
    }
}
