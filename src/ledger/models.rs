use crate::code_metrics::CodeMetrics;
use crate::coverage::{CoverageResult, LineMetric};
use crate::error::MeasurementIssue;
use crate::mutation::MutationResult;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One generator run, as written by the baseline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineEntry {
    pub project: String,
    #[serde(rename = "class")]
    pub class_name: String,
    #[serde(default)]
    pub test_files: Vec<PathBuf>,
    #[serde(default)]
    pub success: bool,
}

/// One refinement, as written by the refinement stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementEntry {
    pub project: String,
    #[serde(rename = "class")]
    pub class_name: String,
    pub original_file: PathBuf,
    pub refined_file: PathBuf,
    #[serde(default)]
    pub success: bool,
}

/// Why a TestCase did or did not pass verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationReason {
    PreservedPass,
    PreservedFail,
    Regression,
    UnexpectedFix,
    CompilationFailed,
    ArtifactNotFound,
}

impl VerificationReason {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::PreservedPass | Self::PreservedFail)
    }
}

impl std::fmt::Display for VerificationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PreservedPass => write!(f, "Preserved (Pass)"),
            Self::PreservedFail => write!(f, "Preserved (Fail)"),
            Self::Regression => write!(f, "Regression"),
            Self::UnexpectedFix => write!(f, "Fix (Unexpected)"),
            Self::CompilationFailed => write!(f, "Compilation failed"),
            Self::ArtifactNotFound => write!(f, "Artifact not found"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub project: String,
    #[serde(rename = "class")]
    pub class_name: String,
    pub original_file: PathBuf,
    pub refined_file: PathBuf,
    pub verified: bool,
    pub reason: VerificationReason,
    #[serde(default)]
    pub repair_attempts: u32,
    /// Truncated compiler or runner output for failed cases
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Hash of the refined file as it was verified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refined_sha256: Option<String>,
    /// Copy of the refined file in the validated tree
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated_file: Option<PathBuf>,
}

impl VerificationRecord {
    pub fn new(entry: &RefinementEntry, reason: VerificationReason) -> Self {
        Self {
            project: entry.project.clone(),
            class_name: entry.class_name.clone(),
            original_file: entry.original_file.clone(),
            refined_file: entry.refined_file.clone(),
            verified: reason.is_verified(),
            reason,
            repair_attempts: 0,
            detail: None,
            refined_sha256: None,
            validated_file: None,
        }
    }

    /// The file evaluation should measure: the validated copy if one exists.
    pub fn verified_file(&self) -> &PathBuf {
        self.validated_file.as_ref().unwrap_or(&self.refined_file)
    }
}

/// Dynamic metrics of one test file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestMetrics {
    /// 1 if the test compiled in the measurement scratch dir, else 0
    pub compilation_rate: f64,
    pub line_coverage: f64,
    pub branch_coverage: f64,
    pub instruction_coverage: f64,
    pub method_coverage: f64,
    pub line_metric_used: LineMetric,
    pub mutation_score: f64,
    pub mutation_score_testable: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<CoverageResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutation: Option<MutationResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<MeasurementIssue>,
}

impl TestMetrics {
    pub fn apply_coverage(&mut self, coverage: CoverageResult) {
        self.line_coverage = coverage.line_coverage;
        self.branch_coverage = coverage.branch_coverage;
        self.instruction_coverage = coverage.instruction_coverage;
        self.method_coverage = coverage.method_coverage;
        self.line_metric_used = coverage.line_metric_used;
        self.coverage = Some(coverage);
    }

    pub fn apply_mutation(&mut self, mutation: MutationResult) {
        self.mutation_score = mutation.score;
        self.mutation_score_testable = mutation.score_testable;
        self.mutation = Some(mutation);
    }

    /// Named percentage, for building comparison vectors.
    pub fn metric(&self, name: &str) -> Option<f64> {
        match name {
            "compilation_rate" => Some(self.compilation_rate),
            "line_coverage" => Some(self.line_coverage),
            "branch_coverage" => Some(self.branch_coverage),
            "instruction_coverage" => Some(self.instruction_coverage),
            "method_coverage" => Some(self.method_coverage),
            "mutation_score" => Some(self.mutation_score),
            "mutation_score_testable" => Some(self.mutation_score_testable),
            _ => None,
        }
    }
}

/// Measurements of one verified TestCase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub project: String,
    #[serde(rename = "class")]
    pub class_name: String,
    #[serde(flatten)]
    pub refined: TestMetrics,
    /// Static metrics of the SUT source, when one was found
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeMetrics>,
    /// The original test measured the same way
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<TestMetrics>,
}
