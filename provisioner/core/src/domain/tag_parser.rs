// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Parser for the operator-supplied tag string.
//!
//! Format: space separated `key:value` pairs. Either side may be wrapped in
//! single quotes to carry spaces or colons, e.g. `'team:a':infra env:'blue green'`.

use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagParseError {
    #[error("tag '{0}' has an unterminated quote")]
    UnterminatedQuote(String),

    #[error("tag '{0}' is missing the ':' separator")]
    MissingSeparator(String),

    #[error("tag '{0}' has an empty key")]
    EmptyKey(String),
}

/// Parse `raw` into a tag map, skipping pairs that fail to parse.
pub fn parse_tags(raw: &str) -> HashMap<String, String> {
    let mut tags = HashMap::new();
    for result in parse_tag_pairs(raw) {
        match result {
            Ok((key, value)) => {
                tags.insert(key, value);
            }
            Err(e) => warn!("Skipping malformed tag: {}", e),
        }
    }
    tags
}

/// Parse every pair of `raw`, one result per pair.
pub fn parse_tag_pairs(raw: &str) -> Vec<Result<(String, String), TagParseError>> {
    split_outside_quotes(raw)
        .into_iter()
        .map(|pair| parse_pair(&pair))
        .collect()
}

fn split_outside_quotes(raw: &str) -> Vec<String> {
    let mut pairs = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in raw.chars() {
        match c {
            '\'' => {
                quoted = !quoted;
                current.push(c);
            }
            ' ' if !quoted => {
                if !current.is_empty() {
                    pairs.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        pairs.push(current);
    }
    pairs
}

fn parse_pair(pair: &str) -> Result<(String, String), TagParseError> {
    let mut key = String::new();
    let mut value = String::new();
    let mut quoted = false;
    let mut in_value = false;

    for c in pair.chars() {
        match c {
            '\'' => quoted = !quoted,
            ':' if !quoted && !in_value => in_value = true,
            _ if in_value => value.push(c),
            _ => key.push(c),
        }
    }

    if quoted {
        return Err(TagParseError::UnterminatedQuote(pair.to_string()));
    }
    if !in_value {
        return Err(TagParseError::MissingSeparator(pair.to_string()));
    }
    if key.is_empty() {
        return Err(TagParseError::EmptyKey(pair.to_string()));
    }
    Ok((key, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_pairs() {
        let tags = parse_tags("env:prod team:storage");
        assert_eq!(tags.len(), 2);
        assert_eq!(tags["env"], "prod");
        assert_eq!(tags["team"], "storage");
    }

    #[test]
    fn test_empty_string() {
        assert!(parse_tags("").is_empty());
        assert!(parse_tags("   ").is_empty());
    }

    #[test]
    fn test_quoted_key_and_value() {
        let tags = parse_tags("'a:b':foo c:'x y z' d:");
        assert_eq!(tags["a:b"], "foo");
        assert_eq!(tags["c"], "x y z");
        assert_eq!(tags["d"], "");
    }

    #[test]
    fn test_value_keeps_later_colons() {
        let tags = parse_tags("url:http://host");
        assert_eq!(tags["url"], "http://host");
    }

    #[test]
    fn test_malformed_pairs_are_skipped() {
        let results = parse_tag_pairs("good:1 novalue :empty");
        assert_eq!(results[0], Ok(("good".to_string(), "1".to_string())));
        assert!(matches!(results[1], Err(TagParseError::MissingSeparator(_))));
        assert!(matches!(results[2], Err(TagParseError::EmptyKey(_))));

        let tags = parse_tags("good:1 novalue :empty 'open:x");
        assert_eq!(tags.len(), 1);
        assert_eq!(tags["good"], "1");
    }
}
