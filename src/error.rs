//! Failure taxonomy shared by every phase.
//!
//! Variants map one-to-one onto the ways a single TestCase can degrade.
//! None of them is allowed to abort a batch: the pipeline matches on them at
//! the per-TestCase boundary and turns them into ledger annotations.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("artifact not found: {what}")]
    ArtifactNotFound { what: String },

    #[error("compilation failed after {attempts} repair attempt(s): {errors}")]
    CompilationFailed { attempts: u32, errors: String },

    #[error("{tool} exceeded its {seconds}s timeout")]
    ExecutionTimeout { tool: String, seconds: u64 },

    #[error("{tool} produced no report at {}", path.display())]
    ReportMissing { tool: String, path: PathBuf },

    #[error("{tool} failed (exit {exit}): {stderr}")]
    ToolFailed {
        tool: String,
        exit: String,
        stderr: String,
    },

    #[error("failed to parse {what}: {detail}")]
    ParseError { what: String, detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// The ledger tag for this failure.
    pub fn kind(&self) -> IssueKind {
        match self {
            Self::ArtifactNotFound { .. } => IssueKind::ArtifactNotFound,
            Self::CompilationFailed { .. } => IssueKind::CompilationFailed,
            Self::ExecutionTimeout { .. } => IssueKind::ExecutionTimeout,
            Self::ReportMissing { .. } => IssueKind::ReportMissing,
            Self::ParseError { .. } => IssueKind::ParseError,
            Self::ToolFailed { .. } | Self::Io(_) => IssueKind::ToolFailed,
        }
    }
}

/// Which measurement an issue degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Compilation,
    Coverage,
    Mutation,
    CodeMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    ArtifactNotFound,
    CompilationFailed,
    ExecutionTimeout,
    ReportMissing,
    ParseError,
    ToolFailed,
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ArtifactNotFound => write!(f, "artifact_not_found"),
            Self::CompilationFailed => write!(f, "compilation_failed"),
            Self::ExecutionTimeout => write!(f, "execution_timeout"),
            Self::ReportMissing => write!(f, "report_missing"),
            Self::ParseError => write!(f, "parse_error"),
            Self::ToolFailed => write!(f, "tool_failed"),
        }
    }
}

/// Annotation attached to a record whose metric was defaulted to 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementIssue {
    pub metric: MetricKind,
    pub kind: IssueKind,
    pub detail: String,
}

impl MeasurementIssue {
    pub fn new(metric: MetricKind, kind: IssueKind, detail: impl Into<String>) -> Self {
        Self {
            metric,
            kind,
            detail: detail.into(),
        }
    }

    pub fn from_error(metric: MetricKind, err: &EngineError) -> Self {
        Self::new(metric, err.kind(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        let err = EngineError::ExecutionTimeout {
            tool: "pitest".to_string(),
            seconds: 300,
        };
        assert_eq!(err.kind(), IssueKind::ExecutionTimeout);
        assert_eq!(err.to_string(), "pitest exceeded its 300s timeout");

        let err = EngineError::ReportMissing {
            tool: "jacoco".to_string(),
            path: PathBuf::from("/tmp/x/jacoco.xml"),
        };
        assert_eq!(err.kind(), IssueKind::ReportMissing);
        assert!(err.to_string().contains("/tmp/x/jacoco.xml"));
    }

    #[test]
    fn test_issue_serializes_snake_case() {
        let issue = MeasurementIssue::new(MetricKind::Mutation, IssueKind::ParseError, "bad xml");
        let json = serde_json::to_string(&issue).unwrap();
        assert!(json.contains("\"metric\":\"mutation\""));
        assert!(json.contains("\"kind\":\"parse_error\""));
    }

    #[test]
    fn test_issue_kind_display() {
        assert_eq!(IssueKind::ArtifactNotFound.to_string(), "artifact_not_found");
        assert_eq!(IssueKind::ToolFailed.to_string(), "tool_failed");
    }
}
