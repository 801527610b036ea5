use serde::{Deserialize, Deserializer};

use crate::error::SerdeError;

/// Strip leading ASCII whitespace (space, tab, CR, LF).
pub fn trim_left_whitespace(payload: &[u8]) -> &[u8] {
    let start = payload
        .iter()
        .position(|b| !matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
        .unwrap_or(payload.len());
    &payload[start..]
}

/// Topic filter from configuration: `/pattern/` is a regex, anything else
/// must match the topic name exactly.
#[derive(Debug, Clone)]
pub enum TopicMatcher {
    Literal(String),
    Regex(regex::Regex),
}

impl TopicMatcher {
    pub fn parse(raw: &str) -> Result<Self, SerdeError> {
        if raw.len() >= 2 && raw.starts_with('/') && raw.ends_with('/') {
            let pattern = &raw[1..raw.len() - 1];
            let re = regex::Regex::new(pattern)
                .map_err(|e| SerdeError::config(format!("invalid topic regex '{pattern}': {e}")))?;
            Ok(TopicMatcher::Regex(re))
        } else {
            Ok(TopicMatcher::Literal(raw.to_string()))
        }
    }

    pub fn matches(&self, topic: &str) -> bool {
        match self {
            TopicMatcher::Literal(s) => s == topic,
            TopicMatcher::Regex(re) => re.is_match(topic),
        }
    }
}

impl<'de> Deserialize<'de> for TopicMatcher {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TopicMatcher::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_only_leading_whitespace() {
        assert_eq!(trim_left_whitespace(b" \n\t{} "), b"{} ");
        assert_eq!(trim_left_whitespace(b"   "), b"");
    }

    #[test]
    fn literal_and_regex_matching() {
        let lit = TopicMatcher::parse("orders").unwrap();
        assert!(lit.matches("orders"));
        assert!(!lit.matches("orders-v2"));

        let re = TopicMatcher::parse("/^orders-.*$/").unwrap();
        assert!(re.matches("orders-v2"));
        assert!(!re.matches("payments"));
    }

    #[test]
    fn invalid_regex_is_config_error() {
        let err = TopicMatcher::parse("/(/").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn deserializes_from_string() {
        let m: TopicMatcher = serde_json::from_str(r#""/pay.*/""#).unwrap();
        assert!(m.matches("payments"));
    }
}
