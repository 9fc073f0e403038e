//! Hierarchical topic matching.
//!
//! Topics are split on `/`. In patterns, `+` matches exactly one level and
//! `#` matches any remaining levels (zero or more).

use thiserror::Error;

/// Level separator.
pub const SEPARATOR: char = '/';
/// Single-level wildcard.
pub const SINGLE_LEVEL: &str = "+";
/// Multi-level wildcard.
pub const MULTI_LEVEL: &str = "#";

/// Why a topic string was rejected.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TopicError {
    /// The topic is empty.
    #[error("Topic must not be empty")]
    Empty,
    /// The topic starts with the separator.
    #[error("Topic must not start with '/'")]
    LeadingSeparator,
}

/// Split `topic` into levels.
pub fn tokenize(topic: &str) -> Result<Vec<String>, TopicError> {
    if topic.is_empty() {
        return Err(TopicError::Empty);
    }
    if topic.starts_with(SEPARATOR) {
        return Err(TopicError::LeadingSeparator);
    }
    Ok(topic.split(SEPARATOR).map(str::to_owned).collect())
}

/// Whether `message` (a tokenized topic) matches `pattern`.
///
/// Empty token lists never match.
pub fn compare<M: AsRef<str>, P: AsRef<str>>(message: &[M], pattern: &[P]) -> bool {
    if message.is_empty() || pattern.is_empty() {
        return false;
    }
    matches(message, pattern)
}

fn matches<M: AsRef<str>, P: AsRef<str>>(message: &[M], pattern: &[P]) -> bool {
    match (message.split_first(), pattern.split_first()) {
        (None, None) => true,
        (Some((m, _)), _) if m.as_ref() == MULTI_LEVEL => true,
        (_, Some((p, _))) if p.as_ref() == MULTI_LEVEL => true,
        (Some((m, m_rest)), Some((p, p_rest))) => {
            let (m, p) = (m.as_ref(), p.as_ref());
            if m == p || m == SINGLE_LEVEL || p == SINGLE_LEVEL {
                matches(m_rest, p_rest)
            } else {
                false
            }
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MESSAGE: [&str; 2] = ["level0", "level1"];

    #[test]
    fn multi_level_matches_everything_below() {
        assert!(compare(&MESSAGE, &["#"]));
        assert!(compare(&MESSAGE, &["level0", "#"]));
        assert!(compare(&MESSAGE, &["level0", "level1", "#"]));
    }

    #[test]
    fn single_level_matches_one() {
        assert!(compare(&MESSAGE, &["+", "+"]));
        assert!(compare(&MESSAGE, &["level0", "+"]));
        assert!(compare(&MESSAGE, &["+", "level1"]));
        assert!(!compare(&MESSAGE, &["+"]));
        assert!(!compare(&MESSAGE, &["+", "+", "+"]));
    }

    #[test]
    fn literal_prefix_is_not_a_match() {
        assert!(compare(&MESSAGE, &["level0", "level1"]));
        assert!(!compare(&MESSAGE, &["level0"]));
        assert!(!compare(&MESSAGE, &["level0", "level1", "level2"]));
        assert!(!compare(&MESSAGE, &["level0", "other"]));
    }

    #[test]
    fn empty_sides_never_match() {
        let empty: [&str; 0] = [];
        assert!(!compare(&empty, &["#"]));
        assert!(!compare(&MESSAGE, &empty));
    }

    #[test]
    fn tokenize_splits_levels() {
        assert_eq!(tokenize("a/b/c").unwrap(), vec!["a", "b", "c"]);
        assert_eq!(tokenize("a").unwrap(), vec!["a"]);
        assert_eq!(tokenize("a//b").unwrap(), vec!["a", "", "b"]);
    }

    #[test]
    fn tokenize_rejects_bad_topics() {
        assert_eq!(tokenize(""), Err(TopicError::Empty));
        assert_eq!(tokenize("/abc"), Err(TopicError::LeadingSeparator));
    }

    #[test]
    fn tokenized_patterns_compare() {
        let message = tokenize("sensors/kitchen/temp").unwrap();
        assert!(compare(&message, &tokenize("sensors/+/temp").unwrap()));
        assert!(compare(&message, &tokenize("sensors/#").unwrap()));
        assert!(!compare(&message, &tokenize("sensors/+").unwrap()));
    }

    fn level() -> impl Strategy<Value = String> {
        "[a-z0-9]{1,6}"
    }

    proptest! {
        #[test]
        fn topic_matches_itself_and_hash(levels in prop::collection::vec(level(), 1..6)) {
            let topic = levels.join("/");
            let tokens = tokenize(&topic).unwrap();
            prop_assert!(compare(&tokens, &tokens));
            prop_assert!(compare(&tokens, &["#"]));
        }

        #[test]
        fn all_plus_matches_same_depth_only(levels in prop::collection::vec(level(), 1..6)) {
            let pluses = vec!["+"; levels.len()];
            prop_assert!(compare(&levels, &pluses));
            let deeper = vec!["+"; levels.len() + 1];
            prop_assert!(!compare(&levels, &deeper));
        }
    }
}
