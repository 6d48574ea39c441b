use crate::code_metrics::CodeMetrics;
use crate::ledger::{
    read_ledger, read_ledger_or_empty, write_json, BaselineEntry, MetricsRecord, TestMetrics,
    VerificationReason, VerificationRecord,
};
use crate::stats::{compare, spearman, Comparison};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Percentages compared between the baseline and the refined test.
pub const COMPARED_METRICS: &[&str] = &[
    "line_coverage",
    "branch_coverage",
    "instruction_coverage",
    "method_coverage",
    "mutation_score",
    "mutation_score_testable",
];

/// Counts over the verification ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Generator runs in the baseline ledger, and how many produced a test
    pub baseline_attempted: usize,
    pub baseline_generated: usize,
    pub attempted: usize,
    pub compiled: usize,
    pub verified: usize,
    pub preserved_pass: usize,
    pub preserved_fail: usize,
    pub regressions: usize,
    pub unexpected_fixes: usize,
    pub compilation_failed: usize,
    pub artifact_not_found: usize,
    /// Percent of attempted TestCases whose refined test compiled
    pub compilation_rate: f64,
    /// Percent of attempted TestCases that were verified
    pub preservation_rate: f64,
}

impl BatchSummary {
    pub fn from_records(records: &[VerificationRecord], baseline: &[BaselineEntry]) -> Self {
        let mut summary = Self {
            baseline_attempted: baseline.len(),
            baseline_generated: baseline.iter().filter(|e| e.success).count(),
            attempted: records.len(),
            ..Default::default()
        };
        for record in records {
            match record.reason {
                VerificationReason::PreservedPass => summary.preserved_pass += 1,
                VerificationReason::PreservedFail => summary.preserved_fail += 1,
                VerificationReason::Regression => summary.regressions += 1,
                VerificationReason::UnexpectedFix => summary.unexpected_fixes += 1,
                VerificationReason::CompilationFailed => summary.compilation_failed += 1,
                VerificationReason::ArtifactNotFound => summary.artifact_not_found += 1,
            }
        }
        summary.verified = summary.preserved_pass + summary.preserved_fail;
        summary.compiled = summary.attempted - summary.compilation_failed - summary.artifact_not_found;
        summary.compilation_rate = percent(summary.compiled, summary.attempted);
        summary.preservation_rate = percent(summary.verified, summary.attempted);
        summary
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
    pub metric: String,
    #[serde(flatten)]
    pub comparison: Comparison,
}

/// Rank correlation between a static metric of the SUT and the change in
/// line coverage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationEntry {
    pub code_metric: String,
    pub n: usize,
    pub spearman: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    /// Local time the report was produced, RFC 3339
    pub generated_at: String,
    pub summary: BatchSummary,
    pub metrics: Vec<MetricComparison>,
    pub correlations: Vec<CorrelationEntry>,
}

/// Compare paired baseline and refined metrics over every record that
/// carries a baseline measurement.
pub fn compare_ledger(
    verification: &[VerificationRecord],
    metrics: &[MetricsRecord],
    baseline: &[BaselineEntry],
) -> ComparisonReport {
    let paired: Vec<(&TestMetrics, &TestMetrics)> = metrics
        .iter()
        .filter_map(|m| m.baseline.as_ref().map(|base| (base, &m.refined)))
        .collect();
    if paired.len() < metrics.len() {
        tracing::info!(
            "{} of {} metrics record(s) have no baseline and are not compared",
            metrics.len() - paired.len(),
            metrics.len()
        );
    }

    let mut comparisons = Vec::new();
    for name in COMPARED_METRICS {
        let (base, refined): (Vec<f64>, Vec<f64>) = paired
            .iter()
            .filter_map(|(b, r)| Some((b.metric(name)?, r.metric(name)?)))
            .unzip();
        if base.is_empty() {
            continue;
        }
        let comparison = compare(&base, &refined);
        tracing::info!(
            "{}: {:.2} -> {:.2} ({:+.2}%), p={:.4}, A12={:.3} ({:?})",
            name,
            comparison.mean_baseline,
            comparison.mean_refined,
            comparison.improvement_pct,
            comparison.p_value,
            comparison.a12,
            comparison.magnitude
        );
        comparisons.push(MetricComparison {
            metric: name.to_string(),
            comparison,
        });
    }

    ComparisonReport {
        generated_at: chrono::Local::now().to_rfc3339(),
        summary: BatchSummary::from_records(verification, baseline),
        metrics: comparisons,
        correlations: correlations(metrics),
    }
}

fn correlations(metrics: &[MetricsRecord]) -> Vec<CorrelationEntry> {
    let rows: Vec<(&CodeMetrics, f64)> = metrics
        .iter()
        .filter_map(|m| {
            let code = m.code.as_ref()?;
            let base = m.baseline.as_ref()?;
            Some((code, m.refined.line_coverage - base.line_coverage))
        })
        .collect();
    if rows.len() < 3 {
        return Vec::new();
    }

    let improvement: Vec<f64> = rows.iter().map(|(_, d)| *d).collect();
    let columns: [(&str, fn(&CodeMetrics) -> f64); 3] = [
        ("sloc", |c| c.sloc as f64),
        ("cyclomatic_complexity", |c| c.cyclomatic_complexity as f64),
        ("max_nesting_depth", |c| c.max_nesting_depth as f64),
    ];
    columns
        .iter()
        .map(|(name, column)| {
            let values: Vec<f64> = rows.iter().map(|(code, _)| column(code)).collect();
            CorrelationEntry {
                code_metric: name.to_string(),
                n: rows.len(),
                spearman: spearman(&values, &improvement),
            }
        })
        .collect()
}

/// Read the ledgers, compare, write the JSON report.
pub fn run_comparison(
    verification_ledger: &Path,
    metrics_ledger: &Path,
    baseline_ledger: &Path,
    report: &Path,
) -> anyhow::Result<ComparisonReport> {
    let verification: Vec<VerificationRecord> = read_ledger(verification_ledger)?;
    let metrics: Vec<MetricsRecord> = read_ledger(metrics_ledger)?;
    let baseline: Vec<BaselineEntry> = read_ledger_or_empty(baseline_ledger)?;

    let result = compare_ledger(&verification, &metrics, &baseline);
    write_json(report, &result)?;
    tracing::info!(
        "Compilation rate {:.1}%, preservation rate {:.1}%; report written to {}",
        result.summary.compilation_rate,
        result.summary.preservation_rate,
        report.display()
    );
    Ok(result)
}
