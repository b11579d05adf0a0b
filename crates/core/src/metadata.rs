//! Dispatch-metadata codec
//!
//! The only piece of state that crosses the worker boundary. Encoded as
//! `key:value|key:value|…`; keys and values must not contain `:` or `|`.
//! The parser is tolerant: unknown keys are preserved and ignored, missing
//! keys read as empty.

use crate::error::{Error, Result};

/// Recognized dispatch-metadata keys plus preserved unknown pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchMetadata {
    /// Session id carried forward so both workers share one trace.
    pub session: Option<String>,
    /// Question replayed to the newly activated agent.
    pub question: Option<String>,
    /// Set when the realtime worker hands control back; value is the
    /// session id to recover.
    pub return_from_english: Option<String>,
    /// Prior subject, for diagnostic tracing on the receiving side.
    pub subject: Option<String>,
    /// Unknown pairs, kept in order for round-tripping.
    pub extra: Vec<(String, String)>,
}

impl DispatchMetadata {
    pub fn is_empty(&self) -> bool {
        self.session.is_none()
            && self.question.is_none()
            && self.return_from_english.is_none()
            && self.subject.is_none()
            && self.extra.is_empty()
    }

    /// Parse the `k:v|k:v` wire form. Never fails; malformed segments
    /// (no `:`) are skipped.
    pub fn parse(raw: &str) -> Self {
        let mut meta = Self::default();
        for segment in raw.split('|') {
            let Some((key, value)) = segment.split_once(':') else {
                continue;
            };
            let value = value.to_string();
            match key {
                "session" => meta.session = Some(value),
                "question" => meta.question = Some(value),
                "return_from_english" => meta.return_from_english = Some(value),
                "subject" => meta.subject = Some(value),
                _ => meta.extra.push((key.to_string(), value)),
            }
        }
        meta
    }

    /// Format to the wire form. Values containing the delimiters `:` or `|`
    /// are rejected rather than silently corrupted.
    pub fn format(&self) -> Result<String> {
        let mut pairs: Vec<(&str, &str)> = Vec::new();
        if let Some(v) = &self.session {
            pairs.push(("session", v));
        }
        if let Some(v) = &self.question {
            pairs.push(("question", v));
        }
        if let Some(v) = &self.return_from_english {
            pairs.push(("return_from_english", v));
        }
        if let Some(v) = &self.subject {
            pairs.push(("subject", v));
        }
        for (k, v) in &self.extra {
            pairs.push((k, v));
        }

        for (key, value) in &pairs {
            if key.contains(':') || key.contains('|') || value.contains(':') || value.contains('|')
            {
                return Err(Error::Metadata(format!(
                    "delimiter in metadata pair {key}={value}"
                )));
            }
        }

        Ok(pairs
            .iter()
            .map(|(k, v)| format!("{k}:{v}"))
            .collect::<Vec<_>>()
            .join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_recognized_keys() {
        let meta = DispatchMetadata::parse("session:abc|question:adjectives|subject:math");
        assert_eq!(meta.session.as_deref(), Some("abc"));
        assert_eq!(meta.question.as_deref(), Some("adjectives"));
        assert_eq!(meta.subject.as_deref(), Some("math"));
        assert!(meta.return_from_english.is_none());
    }

    #[test]
    fn unknown_keys_are_preserved() {
        let meta = DispatchMetadata::parse("session:abc|color:blue");
        assert_eq!(meta.extra, vec![("color".to_string(), "blue".to_string())]);
        let formatted = meta.format().unwrap();
        assert_eq!(DispatchMetadata::parse(&formatted), meta);
    }

    #[test]
    fn round_trip_identity() {
        let meta = DispatchMetadata {
            session: Some("9f1c".to_string()),
            question: Some("seven times eight".to_string()),
            return_from_english: Some("9f1c".to_string()),
            subject: Some("history".to_string()),
            extra: vec![("hint".to_string(), "short".to_string())],
        };
        let parsed = DispatchMetadata::parse(&meta.format().unwrap());
        assert_eq!(parsed, meta);
    }

    #[test]
    fn malformed_segments_are_skipped() {
        let meta = DispatchMetadata::parse("session:abc|garbage|question:q");
        assert_eq!(meta.session.as_deref(), Some("abc"));
        assert_eq!(meta.question.as_deref(), Some("q"));
        assert!(meta.extra.is_empty());
    }

    #[test]
    fn delimiters_in_values_are_rejected() {
        let meta = DispatchMetadata {
            question: Some("what is 3:4".to_string()),
            ..Default::default()
        };
        assert!(meta.format().is_err());
    }

    #[test]
    fn empty_input_parses_to_empty() {
        assert!(DispatchMetadata::parse("").is_empty());
    }
}
