//! Full-text matching for `search`.
//!
//! Text is lower-cased, split on whitespace and ASCII punctuation, and
//! stripped of English stop words. A query matches a document when its
//! tokens can be placed, in order, on document tokens at increasing
//! positions, each query token being a substring of the token it lands on.

/// English stop words, sorted for binary search.
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for", "from",
    "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself", "him",
    "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "me", "more",
    "most", "my", "myself", "no", "nor", "not", "of", "off", "on", "once", "only", "or", "other",
    "ought", "our", "ours", "ourselves", "out", "over", "own", "same", "she", "should", "so",
    "some", "such", "than", "that", "the", "their", "theirs", "them", "themselves", "then",
    "there", "these", "they", "this", "those", "through", "to", "too", "under", "until", "up",
    "very", "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why",
    "with", "would", "you", "your", "yours", "yourself", "yourselves",
];

/// Whether `token` (already lower-cased) is a stop word.
#[must_use]
pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.binary_search(&token).is_ok()
}

/// Lower-cases `text`, splits it into tokens and drops stop words.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .filter(|token| !token.is_empty() && !is_stop_word(token))
        .map(str::to_string)
        .collect()
}

/// Greedy, leftmost-first ordered infix match of `needle` in `haystack`.
///
/// An empty needle matches nothing.
#[must_use]
pub fn infix_match(needle: &[String], haystack: &[String]) -> bool {
    if needle.is_empty() {
        return false;
    }
    let mut remaining = haystack.iter();
    needle
        .iter()
        .all(|term| remaining.any(|token| token.contains(term.as_str())))
}

/// A tokenized query, reusable across many documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    terms: Vec<String>,
}

impl SearchQuery {
    /// Tokenizes `query`.
    #[must_use]
    pub fn new(query: &str) -> Self {
        Self {
            terms: tokenize(query),
        }
    }

    /// The query's tokens after stop-word removal.
    #[must_use]
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Whether the query has no searchable terms left.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Whether `document` matches.
    #[must_use]
    pub fn matches(&self, document: &str) -> bool {
        !self.is_empty() && infix_match(&self.terms, &tokenize(document))
    }
}
