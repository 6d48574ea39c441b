//! Oracle verification.
//!
//! The original and the refined test of one TestCase are compiled into
//! separate output directories and run under identical classpaths. A refined
//! test is verified when its pass/fail verdict matches the original's.

mod outcome;

pub use outcome::{ExitCodeOutcomeParser, JUnit4OutcomeParser, OutcomeParser, RunVerdict};

use crate::config::OutcomeParserKind;
use crate::error::EngineError;
use crate::executor::{preview, truncate_output, Classpath, CommandOutput, Compiler, TestRunner};
use crate::ledger::{sha256_file, RefinementEntry, VerificationReason, VerificationRecord};
use crate::repair::{CompileRequest, RepairLoop, TestFile};
use std::path::{Path, PathBuf};

/// The configured runner output parser.
pub fn parser_for(kind: OutcomeParserKind) -> &'static dyn OutcomeParser {
    match kind {
        OutcomeParserKind::Junit4 => &JUnit4OutcomeParser,
        OutcomeParserKind::ExitCode => &ExitCodeOutcomeParser,
    }
}

/// Terminal state for a pair of verdicts.
pub fn classify(original_passed: bool, refined_passed: bool) -> VerificationReason {
    match (original_passed, refined_passed) {
        (true, true) => VerificationReason::PreservedPass,
        (false, false) => VerificationReason::PreservedFail,
        (true, false) => VerificationReason::Regression,
        (false, true) => VerificationReason::UnexpectedFix,
    }
}

/// Inputs for one TestCase.
#[derive(Debug, Clone, Copy)]
pub struct VerifyRequest<'a> {
    pub entry: &'a RefinementEntry,
    pub sut_jar: &'a Path,
    /// SUT summary used if the refined test needs repair
    pub context: &'a str,
}

pub struct Verifier<'a> {
    compiler: &'a dyn Compiler,
    runner: &'a dyn TestRunner,
    parser: &'a dyn OutcomeParser,
    repair: RepairLoop<'a>,
    test_support: Vec<PathBuf>,
    max_error_chars: usize,
}

impl<'a> Verifier<'a> {
    pub fn new(
        compiler: &'a dyn Compiler,
        runner: &'a dyn TestRunner,
        parser: &'a dyn OutcomeParser,
        repair: RepairLoop<'a>,
        test_support: Vec<PathBuf>,
        max_error_chars: usize,
    ) -> Self {
        Self {
            compiler,
            runner,
            parser,
            repair,
            test_support,
            max_error_chars,
        }
    }

    /// Verify one TestCase. Always yields a record; failures become reasons.
    pub async fn verify(&self, request: &VerifyRequest<'_>) -> VerificationRecord {
        match self.try_verify(request).await {
            Ok(record) => record,
            Err(e) => {
                let reason = match e {
                    EngineError::CompilationFailed { .. } => VerificationReason::CompilationFailed,
                    _ => VerificationReason::ArtifactNotFound,
                };
                tracing::warn!("{}: {}", request.entry.class_name, e);
                let mut record = VerificationRecord::new(request.entry, reason);
                record.detail = Some(truncate_output(&e.to_string(), self.max_error_chars));
                record
            }
        }
    }

    fn compile_classpath(&self, sut_jar: &Path, test_dir: &Path) -> Classpath {
        let mut classpath = Classpath::new().with(sut_jar);
        for jar in &self.test_support {
            classpath.push(jar);
        }
        classpath.with(test_dir)
    }

    async fn try_verify(
        &self,
        request: &VerifyRequest<'_>,
    ) -> Result<VerificationRecord, EngineError> {
        let entry = request.entry;
        let refined = TestFile::read(&entry.refined_file)?;
        let original = TestFile::read(&entry.original_file)?;

        let scratch = tempfile::Builder::new().prefix("verifine-").tempdir()?;
        let original_out = scratch.path().join("original");
        let refined_out = scratch.path().join("refined");
        std::fs::create_dir_all(&original_out)?;
        std::fs::create_dir_all(&refined_out)?;

        // Refined side, with repair.
        let refined_dir = parent_dir(&refined.path);
        let refined_cp = self.compile_classpath(request.sut_jar, &refined_dir);
        let refined_scaffolding = refined.scaffolding();
        let outcome = self
            .repair
            .run(&CompileRequest {
                primary: &refined.path,
                scaffolding: &refined_scaffolding,
                classpath: &refined_cp,
                out_dir: &refined_out,
                context: request.context,
            })
            .await?;
        let repair_attempts = outcome.attempts;
        if !outcome.compiled {
            let mut record = VerificationRecord::new(entry, VerificationReason::CompilationFailed);
            record.repair_attempts = repair_attempts;
            record.detail = outcome.final_errors.map(|e| format!("refined: {}", e));
            return Ok(record);
        }

        // Original side, never repaired.
        let original_dir = parent_dir(&original.path);
        let original_cp = self.compile_classpath(request.sut_jar, &original_dir);
        let original_scaffolding = original.scaffolding();
        let sources: Vec<PathBuf> = std::iter::once(original.path.clone())
            .chain(original_scaffolding)
            .collect();
        let compiled = self
            .compiler
            .compile(&sources, &original_cp, &original_out)
            .await;
        if !compiled.success() {
            tracing::warn!(
                "Original test failed to compile (exit {}): {}",
                compiled.exit_label(),
                preview(&compiled.stderr, 10)
            );
            let mut record = VerificationRecord::new(entry, VerificationReason::CompilationFailed);
            record.repair_attempts = repair_attempts;
            record.detail = Some(format!(
                "original: {}",
                truncate_output(&compiled.stderr, self.max_error_chars)
            ));
            return Ok(record);
        }

        // A hashing fault is noted on the record; the verdict still stands.
        let mut notes = Vec::new();
        let refined_sha256 = match sha256_file(&refined.path) {
            Ok(hash) => Some(hash),
            Err(e) => {
                tracing::warn!("Cannot hash {}: {}", refined.path.display(), e);
                notes.push(format!("sha256 unavailable: {}", e));
                None
            }
        };

        // Run both under the same SUT, original first.
        let original_class = original.test_class_or(&entry.class_name);
        let refined_class = refined.test_class_or(&entry.class_name);

        let original_run = original_cp.with(&original_out);
        let original_output = self.runner.run_test(&original_run, &original_class).await;
        let original_verdict = self.parser.parse(&original_output);
        log_run("original", &original_class, &original_output, &original_verdict);

        let refined_run = refined_cp.with(&refined_out);
        let refined_output = self.runner.run_test(&refined_run, &refined_class).await;
        let refined_verdict = self.parser.parse(&refined_output);
        log_run("refined", &refined_class, &refined_output, &refined_verdict);

        let reason = classify(original_verdict.passed, refined_verdict.passed);
        let timed_out = original_output.timed_out || refined_output.timed_out;
        if !reason.is_verified() || timed_out {
            notes.insert(
                0,
                format!(
                    "original: {}; refined: {}",
                    original_verdict.summary, refined_verdict.summary
                ),
            );
        }

        let mut record = VerificationRecord::new(entry, reason);
        record.repair_attempts = repair_attempts;
        record.refined_sha256 = refined_sha256;
        if !notes.is_empty() {
            record.detail = Some(notes.join("; "));
        }
        Ok(record)
    }
}

/// Timeouts are degraded runs and are logged with their exit and stderr.
fn log_run(side: &str, test_class: &str, output: &CommandOutput, verdict: &RunVerdict) {
    if output.timed_out {
        tracing::warn!(
            "{} {} timed out (exit {}): {}",
            side,
            test_class,
            output.exit_label(),
            preview(&output.stderr, 10)
        );
    } else {
        tracing::debug!("{} {}: {}", side, test_class, verdict.summary);
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
