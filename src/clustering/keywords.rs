use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    static ref WORD_RE: Regex = Regex::new(r"\b[a-z]{3,}\b").unwrap();

    /// Short common words that carry no topical signal in headlines.
    static ref COMMON_WORDS: HashSet<&'static str> = [
        "the", "and", "for", "are", "but", "not", "you", "all", "can", "had",
        "her", "was", "one", "our", "out", "day", "get", "has", "him", "his",
        "how", "man", "new", "now", "old", "see", "two", "who", "boy", "did",
        "its", "let", "put", "say", "she", "too", "use", "said", "says",
        "will", "with", "this", "that", "from", "they", "have", "been",
        "were", "what", "when", "over", "after", "more", "than", "into",
        "amid", "could", "would", "about",
    ]
    .into_iter()
    .collect();
}

/// Lowercase keyword set from a title: tokens of three or more letters,
/// minus common words.
pub fn title_keywords(title: &str) -> HashSet<String> {
    let lowered = title.to_lowercase();
    WORD_RE
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|w| !COMMON_WORDS.contains(w))
        .map(|w| w.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_common_words_and_short_tokens() {
        let kw = title_keywords("The storm has hit the coastal city of Tampa");
        assert!(kw.contains("storm"));
        assert!(kw.contains("coastal"));
        assert!(kw.contains("tampa"));
        assert!(!kw.contains("the"));
        assert!(!kw.contains("has"));
        assert!(!kw.contains("of"));
    }

    #[test]
    fn is_case_insensitive() {
        assert_eq!(
            title_keywords("Election RESULTS Contested"),
            title_keywords("election results contested")
        );
    }
}
