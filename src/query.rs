//! Turning what an operator types into a search request.

use crate::event::{Category, UnknownCategory};

/// Words that ask for the newest matches rather than the closest ones.
pub const TIME_KEYWORDS: [&str; 6] = ["now", "latest", "recent", "current", "last", "today"];

/// Query used when nothing but time keywords was given.
pub const RECENCY_SEED: &str = "system device error warning";
pub const RECENCY_SEED_K: usize = 10;
pub const DEFAULT_K: usize = 5;

#[derive(Clone, Debug, PartialEq)]
pub struct SearchRequest {
    pub category: Category,
    pub text: String,
    pub k: usize,
    pub recency_bias: bool,
}

impl SearchRequest {
    /// Builds a request from a category name and free text.
    ///
    /// Time keywords switch on recency ordering and are removed from the
    /// text. If no other words remain, the generic seed is searched with a
    /// larger `k`.
    ///
    /// # Errors
    ///
    /// Returns an error if `category` does not name a store.
    pub fn parse(
        category: &str,
        query: &str,
        k: Option<usize>,
        recent: bool,
    ) -> Result<Self, UnknownCategory> {
        let category = category.parse::<Category>()?;
        let mut recency_bias = recent;
        let mut words = Vec::new();
        for word in query.split_whitespace() {
            if is_time_keyword(word) {
                recency_bias = true;
            } else {
                words.push(word);
            }
        }
        if words.is_empty() {
            return Ok(Self {
                category,
                text: RECENCY_SEED.to_string(),
                k: k.unwrap_or(RECENCY_SEED_K),
                recency_bias: true,
            });
        }
        Ok(Self {
            category,
            text: words.join(" "),
            k: k.unwrap_or(DEFAULT_K),
            recency_bias,
        })
    }
}

fn is_time_keyword(word: &str) -> bool {
    let word = word
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    TIME_KEYWORDS.contains(&word.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_query_is_semantic() {
        let request = SearchRequest::parse("error", "disk failure", None, false).unwrap();
        assert_eq!(request.category, Category::Error);
        assert_eq!(request.text, "disk failure");
        assert_eq!(request.k, DEFAULT_K);
        assert!(!request.recency_bias);
    }

    #[test]
    fn time_keywords_are_stripped() {
        let request = SearchRequest::parse("Warning", "latest usb errors now", Some(3), false).unwrap();
        assert_eq!(request.category, Category::Warning);
        assert_eq!(request.text, "usb errors");
        assert_eq!(request.k, 3);
        assert!(request.recency_bias);
    }

    #[test]
    fn keywords_inside_words_are_kept() {
        let request = SearchRequest::parse("debug", "lastlog nowhere", None, false).unwrap();
        assert_eq!(request.text, "lastlog nowhere");
        assert!(!request.recency_bias);
    }

    #[test]
    fn bare_recency_uses_the_seed() {
        let request = SearchRequest::parse("debug", "Latest!", None, false).unwrap();
        assert_eq!(request.text, RECENCY_SEED);
        assert_eq!(request.k, RECENCY_SEED_K);
        assert!(request.recency_bias);

        let request = SearchRequest::parse("debug", "", None, false).unwrap();
        assert_eq!(request.text, RECENCY_SEED);
    }

    #[test]
    fn unknown_category_is_rejected() {
        let err = SearchRequest::parse("kernel", "oops", None, false).unwrap_err();
        assert_eq!(err.to_string(), "unknown category: kernel");
    }
}
