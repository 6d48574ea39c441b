use super::{resolver_for, select_worklist};
use crate::code_metrics::{analyze_file, CodeMetrics};
use crate::config::Config;
use crate::coverage::{measure_coverage, CoverageJob};
use crate::error::{EngineError, IssueKind, MeasurementIssue, MetricKind};
use crate::executor::{preview, truncate_output, Classpath, Compiler, JavaToolchain};
use crate::ledger::{read_ledger, write_ledger, MetricsRecord, TestMetrics, VerificationRecord};
use crate::mutation::{measure_mutation, MutationJob};
use crate::repair::TestFile;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// One test file to measure against one SUT class.
#[derive(Debug, Clone, Copy)]
pub struct MeasureJob<'a> {
    pub sut_jar: &'a Path,
    pub class_name: &'a str,
    pub test_file: &'a Path,
    pub source_dir: Option<&'a Path>,
}

/// Produces the dynamic metrics of one test. Never fails: every problem is
/// recorded as an issue next to a zeroed metric.
#[async_trait]
pub trait Measurer: Send + Sync {
    async fn measure(&self, job: &MeasureJob<'_>) -> TestMetrics;
}

/// Compiles the test, then runs JaCoCo and PIT against it.
pub struct JavaMeasurer<'a> {
    toolchain: &'a JavaToolchain,
    max_error_chars: usize,
}

impl<'a> JavaMeasurer<'a> {
    pub fn new(toolchain: &'a JavaToolchain, max_error_chars: usize) -> Self {
        Self {
            toolchain,
            max_error_chars,
        }
    }

    async fn compile(
        &self,
        test: &TestFile,
        sut_jar: &Path,
        out_dir: &Path,
    ) -> Result<(), EngineError> {
        let test_dir = test
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut classpath = Classpath::new().with(sut_jar);
        for jar in self.toolchain.test_support_jars() {
            classpath.push(jar);
        }
        classpath.push(&test_dir);

        let sources: Vec<PathBuf> = std::iter::once(test.path.clone())
            .chain(test.scaffolding())
            .collect();
        let output = self.toolchain.compile(&sources, &classpath, out_dir).await;
        if output.success() {
            return Ok(());
        }
        tracing::warn!(
            "{} failed to compile for measurement (exit {}): {}",
            test.path.display(),
            output.exit_label(),
            preview(&output.stderr, 10)
        );
        Err(EngineError::CompilationFailed {
            attempts: 0,
            errors: truncate_output(&output.stderr, self.max_error_chars),
        })
    }
}

#[async_trait]
impl Measurer for JavaMeasurer<'_> {
    async fn measure(&self, job: &MeasureJob<'_>) -> TestMetrics {
        let mut metrics = TestMetrics::default();

        let test = match TestFile::read(job.test_file) {
            Ok(test) => test,
            Err(e) => {
                metrics
                    .issues
                    .push(MeasurementIssue::from_error(MetricKind::Compilation, &e));
                return metrics;
            }
        };
        let scratch = match tempfile::Builder::new().prefix("verifine-measure-").tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                let err = EngineError::from(e);
                metrics
                    .issues
                    .push(MeasurementIssue::from_error(MetricKind::Compilation, &err));
                return metrics;
            }
        };

        let test_output = scratch.path().join("test-classes");
        let compiled = match std::fs::create_dir_all(&test_output) {
            Ok(()) => self.compile(&test, job.sut_jar, &test_output).await,
            Err(e) => Err(EngineError::from(e)),
        };
        if let Err(e) = compiled {
            metrics
                .issues
                .push(scratch_issue(MetricKind::Compilation, &e, scratch.path()));
            return metrics;
        }
        metrics.compilation_rate = 1.0;

        let test_class = test.test_class_or(job.class_name);
        let test_dir = test.path.parent().unwrap_or(Path::new("."));

        let coverage_scratch = scratch.path().join("coverage");
        let coverage = match std::fs::create_dir_all(&coverage_scratch) {
            Ok(()) => {
                measure_coverage(
                    self.toolchain,
                    &CoverageJob {
                        sut_jar: job.sut_jar,
                        class_name: job.class_name,
                        test_class: &test_class,
                        test_output: &test_output,
                        source_dir: job.source_dir,
                        scratch: &coverage_scratch,
                    },
                )
                .await
            }
            Err(e) => Err(EngineError::from(e)),
        };
        match coverage {
            Ok(result) => {
                if !result.class_found {
                    metrics.issues.push(MeasurementIssue::new(
                        MetricKind::Coverage,
                        IssueKind::ReportMissing,
                        format!("{} not present in the coverage report", job.class_name),
                    ));
                }
                metrics.apply_coverage(result);
            }
            Err(e) => {
                tracing::warn!("Coverage for {}: {}", job.class_name, e);
                metrics
                    .issues
                    .push(scratch_issue(MetricKind::Coverage, &e, scratch.path()));
            }
        }

        let mutation_scratch = scratch.path().join("mutation");
        let mutation = match std::fs::create_dir_all(&mutation_scratch) {
            Ok(()) => {
                measure_mutation(
                    self.toolchain,
                    &MutationJob {
                        sut_jar: job.sut_jar,
                        class_name: job.class_name,
                        test_class: &test_class,
                        test_output: &test_output,
                        source_dir: job.source_dir.unwrap_or(test_dir),
                        scratch: &mutation_scratch,
                    },
                )
                .await
            }
            Err(e) => Err(EngineError::from(e)),
        };
        match mutation {
            Ok(result) => metrics.apply_mutation(result),
            Err(e) => {
                tracing::warn!("Mutation analysis for {}: {}", job.class_name, e);
                metrics
                    .issues
                    .push(scratch_issue(MetricKind::Mutation, &e, scratch.path()));
            }
        }

        metrics
    }
}

/// Issue for `err` with the per-run scratch root replaced by `<scratch>`.
/// The full path is only in the warn log; the directory is gone by the time
/// the record is written.
fn scratch_issue(metric: MetricKind, err: &EngineError, scratch: &Path) -> MeasurementIssue {
    let mut issue = MeasurementIssue::from_error(metric, err);
    let root = scratch.display().to_string();
    if !root.is_empty() {
        issue.detail = issue.detail.replace(&root, "<scratch>");
    }
    issue
}

/// Measures every verified TestCase. Unverified records are never measured.
pub struct EvaluationPhase<'a> {
    config: &'a Config,
    measurer: &'a dyn Measurer,
}

impl<'a> EvaluationPhase<'a> {
    pub fn new(config: &'a Config, measurer: &'a dyn Measurer) -> Self {
        Self { config, measurer }
    }

    /// Read the verification ledger, measure, write the metrics ledger.
    pub async fn run_ledger(
        &self,
        verification_ledger: &Path,
        metrics_ledger: &Path,
    ) -> anyhow::Result<Vec<MetricsRecord>> {
        let records: Vec<VerificationRecord> = read_ledger(verification_ledger)?;
        let metrics = self.run(&records).await;
        write_ledger(metrics_ledger, &metrics)?;
        Ok(metrics)
    }

    pub async fn run(&self, records: &[VerificationRecord]) -> Vec<MetricsRecord> {
        let worklist = select_worklist(
            records.iter().filter(|r| r.verified),
            &self.config.filter,
            |r| r.class_name.as_str(),
        );
        let mut resolver = resolver_for(self.config);

        let total = worklist.len();
        let mut results = Vec::with_capacity(total);
        for (i, record) in worklist.into_iter().enumerate() {
            tracing::info!("[{}/{}] {} {}", i + 1, total, record.project, record.class_name);

            let project = resolver
                .project(&record.project)
                .map(|p| p.source_dir().to_path_buf());
            let resolved = project.and_then(|source_dir| {
                resolver
                    .sut_jar(&record.project)
                    .map(|jar| (jar, source_dir))
            });
            let (sut_jar, source_dir) = match resolved {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!("Cannot measure {}: {}", record.class_name, e);
                    let mut refined = TestMetrics::default();
                    refined
                        .issues
                        .push(MeasurementIssue::from_error(MetricKind::Compilation, &e));
                    results.push(MetricsRecord {
                        project: record.project.clone(),
                        class_name: record.class_name.clone(),
                        refined,
                        code: None,
                        baseline: None,
                    });
                    continue;
                }
            };

            let mut refined = self
                .measurer
                .measure(&MeasureJob {
                    sut_jar: &sut_jar,
                    class_name: &record.class_name,
                    test_file: record.verified_file(),
                    source_dir: Some(&source_dir),
                })
                .await;

            let code = match resolver.source_file(&record.project, &record.class_name) {
                Some(path) => match analyze_file(&path) {
                    Ok(metrics) => Some(metrics),
                    Err(e) => {
                        refined.issues.push(MeasurementIssue::new(
                            MetricKind::CodeMetrics,
                            IssueKind::ToolFailed,
                            format!("{}: {}", path.display(), e),
                        ));
                        None
                    }
                },
                None => None,
            };

            let baseline = if self.config.evaluation.measure_baseline {
                Some(
                    self.measurer
                        .measure(&MeasureJob {
                            sut_jar: &sut_jar,
                            class_name: &record.class_name,
                            test_file: &record.original_file,
                            source_dir: Some(&source_dir),
                        })
                        .await,
                )
            } else {
                None
            };

            log_measurement(&refined, baseline.as_ref(), code.as_ref());
            results.push(MetricsRecord {
                project: record.project.clone(),
                class_name: record.class_name.clone(),
                refined,
                code,
                baseline,
            });
        }

        tracing::info!("Evaluation complete: {} record(s)", results.len());
        results
    }
}

fn log_measurement(refined: &TestMetrics, baseline: Option<&TestMetrics>, code: Option<&CodeMetrics>) {
    tracing::info!(
        "  line {:.1}% branch {:.1}% mutation {:.1}% ({} issue(s))",
        refined.line_coverage,
        refined.branch_coverage,
        refined.mutation_score,
        refined.issues.len()
    );
    if let Some(base) = baseline {
        tracing::debug!(
            "  baseline line {:.1}% mutation {:.1}%",
            base.line_coverage,
            base.mutation_score
        );
    }
    if let Some(code) = code {
        tracing::debug!(
            "  sloc {} complexity {}",
            code.sloc,
            code.cyclomatic_complexity
        );
    }
}
