//! Operation paths
//!
//! An [`OperationPath`] is an ordered sequence of non-empty string tokens
//! locating a value inside the document state tree. Paths are first-class
//! data: every operation targets one, and the transform rules reason about
//! prefix and overlap relations between them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered sequence of string tokens identifying a location in a document.
///
/// Empty tokens are dropped on construction and append, so they can never
/// influence comparisons.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationPath {
    segments: Vec<String>,
}

impl OperationPath {
    /// The empty path (the document root)
    pub fn root() -> Self {
        Self { segments: Vec::new() }
    }

    /// Build a path from tokens, dropping empty ones
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: tokens
                .into_iter()
                .map(Into::into)
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Return a new path with `token` appended (ignored when empty)
    pub fn append(&self, token: impl Into<String>) -> Self {
        let token = token.into();
        let mut segments = self.segments.clone();
        if !token.is_empty() {
            segments.push(token);
        }
        Self { segments }
    }

    /// Remove and return the last token
    pub fn pop(&mut self) -> Option<String> {
        self.segments.pop()
    }

    /// Remove and return the first token
    pub fn shift(&mut self) -> Option<String> {
        if self.segments.is_empty() {
            None
        } else {
            Some(self.segments.remove(0))
        }
    }

    /// Borrow the tokens in order
    pub fn tokens(&self) -> &[String] {
        &self.segments
    }

    /// Number of tokens
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True when the path has no tokens
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Token at `index`, if present
    pub fn token(&self, index: usize) -> Option<&str> {
        self.segments.get(index).map(String::as_str)
    }

    /// True iff `self` is a prefix of `other` (equality counts)
    pub fn is_prefix(&self, other: &OperationPath) -> bool {
        self.segments.len() <= other.segments.len()
            && self
                .segments
                .iter()
                .zip(other.segments.iter())
                .all(|(a, b)| a == b)
    }

    /// True iff one path is a prefix of the other (equality counts)
    pub fn overlaps(&self, other: &OperationPath) -> bool {
        self.is_prefix(other) || other.is_prefix(self)
    }
}

impl fmt::Debug for OperationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OperationPath(/{})", self.segments.join("/"))
    }
}

impl fmt::Display for OperationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

impl<S: Into<String>> FromIterator<S> for OperationPath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::from_tokens(iter)
    }
}
