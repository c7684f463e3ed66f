//! Core error types.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// A single validation problem, located by a path into the offending input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    /// Machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Location of the offending field or array index.
    pub path: Vec<String>,
}

impl Issue {
    /// Create an issue with an empty path.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            path: Vec::new(),
        }
    }

    /// Set the path.
    pub fn at<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path = path.into_iter().map(Into::into).collect();
        self
    }

    /// Prepend path segments.
    pub fn with_prefix(mut self, prefix: &[&str]) -> Self {
        let mut path: Vec<String> = prefix.iter().map(|s| s.to_string()).collect();
        path.append(&mut self.path);
        self.path = path;
        self
    }

    /// Dotted form of the path.
    pub fn pointer(&self) -> String {
        self.path.join(".")
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} (at {})", self.message, self.pointer())
        }
    }
}

fn summarize(issues: &[Issue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Engine errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Unregistered type or inconsistent schema description.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Owner row or referenced relation target missing.
    #[error("not found: {}", summarize(.0))]
    NotFound(Vec<Issue>),

    /// Relationship payload does not match the relation's cardinality or type.
    #[error("invalid payload shape: {}", summarize(.0))]
    Shape(Vec<Issue>),

    /// Payload conflicts with the request (e.g. id mismatch).
    #[error("unprocessable entity: {}", summarize(.0))]
    Unprocessable(Vec<Issue>),

    /// Query names a field, relation or operand the schema does not support.
    #[error("invalid query: {}", summarize(.0))]
    InvalidQuery(Vec<Issue>),

    /// Relational store failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Value encoding or decoding failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Single-issue not-found error.
    pub fn not_found(issue: Issue) -> Self {
        Error::NotFound(vec![issue])
    }

    /// Single-issue invalid-query error.
    pub fn invalid_query(issue: Issue) -> Self {
        Error::InvalidQuery(vec![issue])
    }

    /// Machine-readable kind of this error.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "configuration",
            Error::NotFound(_) => "not_found",
            Error::Shape(_) => "shape",
            Error::Unprocessable(_) => "unprocessable_entity",
            Error::InvalidQuery(_) => "invalid_query",
            Error::Storage(_) => "storage",
            Error::Serialization(_) => "serialization",
        }
    }

    /// Structured issues carried by validation errors.
    pub fn issues(&self) -> &[Issue] {
        match self {
            Error::NotFound(issues)
            | Error::Shape(issues)
            | Error::Unprocessable(issues)
            | Error::InvalidQuery(issues) => issues,
            _ => &[],
        }
    }

    /// Prefix every issue path (used when a nested validator reports errors).
    pub fn with_prefix(self, prefix: &[&str]) -> Self {
        let map = |issues: Vec<Issue>| -> Vec<Issue> {
            issues.into_iter().map(|i| i.with_prefix(prefix)).collect()
        };
        match self {
            Error::NotFound(issues) => Error::NotFound(map(issues)),
            Error::Shape(issues) => Error::Shape(map(issues)),
            Error::Unprocessable(issues) => Error::Unprocessable(map(issues)),
            Error::InvalidQuery(issues) => Error::InvalidQuery(map(issues)),
            other => other,
        }
    }

    /// Fold independently collected errors into one.
    ///
    /// Shape problems take precedence over missing references; any non
    /// validation error is returned as-is.
    pub fn combine(errors: Vec<Error>) -> Option<Error> {
        let mut shape = Vec::new();
        let mut unprocessable = Vec::new();
        let mut not_found = Vec::new();
        for error in errors {
            match error {
                Error::Shape(issues) => shape.extend(issues),
                Error::Unprocessable(issues) => unprocessable.extend(issues),
                Error::NotFound(issues) => not_found.extend(issues),
                other => return Some(other),
            }
        }
        if !shape.is_empty() {
            Some(Error::Shape(shape))
        } else if !unprocessable.is_empty() {
            Some(Error::Unprocessable(unprocessable))
        } else if !not_found.is_empty() {
            Some(Error::NotFound(not_found))
        } else {
            None
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<ormapi_proto::Error> for Error {
    fn from(err: ormapi_proto::Error) -> Self {
        Error::invalid_query(Issue::new("invalid_query", err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_display() {
        let issue = Issue::new("not_found", "Resource 'roles' with id '9' does not exist")
            .at(["data", "1", "id"]);
        assert_eq!(issue.pointer(), "data.1.id");
        assert_eq!(
            issue.to_string(),
            "Resource 'roles' with id '9' does not exist (at data.1.id)"
        );
    }

    #[test]
    fn test_prefix() {
        let err = Error::not_found(Issue::new("not_found", "missing").at(["data", "0", "id"]))
            .with_prefix(&["relationships", "roles"]);
        assert_eq!(err.issues()[0].pointer(), "relationships.roles.data.0.id");
    }

    #[test]
    fn test_combine_prefers_shape() {
        let combined = Error::combine(vec![
            Error::not_found(Issue::new("not_found", "a")),
            Error::Shape(vec![Issue::new("shape", "b")]),
            Error::not_found(Issue::new("not_found", "c")),
        ])
        .unwrap();
        assert_eq!(combined.kind(), "shape");
        assert_eq!(combined.issues().len(), 1);

        let combined = Error::combine(vec![
            Error::not_found(Issue::new("not_found", "a")),
            Error::not_found(Issue::new("not_found", "c")),
        ])
        .unwrap();
        assert_eq!(combined.issues().len(), 2);

        assert!(Error::combine(vec![]).is_none());
    }
}
