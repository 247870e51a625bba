//! Keyword tokenization and overlap scoring.

use std::collections::BTreeSet;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "are", "was", "use", "using",
];

/// Lowercase alphanumeric tokens longer than two characters, minus stopwords.
#[must_use]
pub fn tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Every lowercase word of `text`, short ones included.
///
/// Hyphenated and underscored words are kept whole and also split, so both
/// `actix-web` and `web` are found in "actix-web".
#[must_use]
pub fn words(text: &str) -> BTreeSet<String> {
    let mut words = BTreeSet::new();
    for word in text
        .split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
        .map(|w| w.trim_matches(|c: char| c == '-' || c == '_'))
        .filter(|w| !w.is_empty())
    {
        let word = word.to_lowercase();
        if word.contains(['-', '_']) {
            words.extend(
                word.split(['-', '_'])
                    .filter(|p| !p.is_empty())
                    .map(ToString::to_string),
            );
        }
        words.insert(word);
    }
    words
}

/// Fraction of `keywords` found among the words of `text`. An empty keyword
/// set scores zero.
#[must_use]
pub fn keyword_overlap(keywords: &BTreeSet<String>, text: &str) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }
    let found = words(text);
    #[allow(clippy::cast_precision_loss)]
    let ratio = keywords.intersection(&found).count() as f64 / keywords.len() as f64;
    ratio
}

/// Fraction of the query's tokens present in `text`.
#[must_use]
pub fn score(query: &str, text: &str) -> f64 {
    keyword_overlap(&tokens(query), text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens() {
        let t = tokens("Use the Axum router, v2 and SQLx!");
        assert!(t.contains("axum"));
        assert!(t.contains("router"));
        assert!(t.contains("sqlx"));
        assert!(!t.contains("the"));
        assert!(!t.contains("v2"));
    }

    #[test]
    fn test_overlap() {
        let keywords = tokens("rust axum postgres");
        assert!((keyword_overlap(&keywords, "axum handlers over postgres in rust") - 1.0).abs() < 1e-9);
        assert!((keyword_overlap(&keywords, "rust cli") - 1.0 / 3.0).abs() < 1e-9);
        assert!(keyword_overlap(&BTreeSet::new(), "anything").abs() < f64::EPSILON);
    }

    #[test]
    fn test_short_and_hyphenated_keywords_match() {
        let keywords: BTreeSet<String> = ["go", "actix-web"].into_iter().map(String::from).collect();
        assert!((keyword_overlap(&keywords, "Go services on actix-web") - 1.0).abs() < 1e-9);
        assert!((keyword_overlap(&keywords, "a gopher with a web ui") - 0.0).abs() < 1e-9);

        let found = words("scikit-learn, Go!");
        assert!(found.contains("scikit-learn"));
        assert!(found.contains("learn"));
        assert!(found.contains("go"));
    }

    #[test]
    fn test_score_query() {
        assert!(score("database migration", "run the database migration first") > 0.99);
        assert!(score("", "text").abs() < f64::EPSILON);
    }
}
