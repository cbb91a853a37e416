//! The normalized source text that feeds every generation call in a run.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Heading of the section clarifying-question answers are appended under.
pub const ADDITIONAL_CONTEXT_HEADER: &str = "=== Additional Context ===";

/// Normalized source text.
///
/// Never modified in place: extending it with answers yields a new value
/// whose prefix is the original content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceContent(String);

impl SourceContent {
    /// Wrap already-normalized text.
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Get the text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the content is empty or whitespace.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Hex SHA-256 of the content.
    pub fn fingerprint(&self) -> String {
        format!("{:x}", Sha256::digest(self.0.as_bytes()))
    }

    /// Short fingerprint for log lines.
    pub fn short_fingerprint(&self) -> String {
        self.fingerprint()[..12].to_string()
    }

    /// Append question/answer pairs as an additional-context section.
    ///
    /// Pairs with a blank answer are dropped. With nothing left to append,
    /// the content is returned unchanged.
    pub fn with_answers<'a, I>(&self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let answered: Vec<String> = pairs
            .into_iter()
            .filter(|(_, answer)| !answer.trim().is_empty())
            .map(|(question, answer)| format!("Q: {}\nA: {}", question.trim(), answer.trim()))
            .collect();

        if answered.is_empty() {
            return self.clone();
        }

        Self(format!(
            "{}\n\n{}\n\n{}",
            self.0.trim_end(),
            ADDITIONAL_CONTEXT_HEADER,
            answered.join("\n\n")
        ))
    }
}

impl fmt::Display for SourceContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
