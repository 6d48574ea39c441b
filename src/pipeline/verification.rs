use super::{resolver_for, select_worklist};
use crate::config::Config;
use crate::context::extract_context;
use crate::executor::{Compiler, JavaToolchain, TestRunner};
use crate::ledger::{
    copy_validated, read_ledger, write_ledger, RefinementEntry, VerificationReason,
    VerificationRecord,
};
use crate::repair::{find_scaffolding, RepairAdapter, RepairLoop, TestFile};
use crate::resolver::ProjectResolver;
use crate::verification::{OutcomeParser, Verifier, VerifyRequest};
use std::path::{Path, PathBuf};

/// Verifies every successful refinement and copies the verified tests into
/// the validated tree.
pub struct VerificationPhase<'a> {
    config: &'a Config,
    toolchain: &'a JavaToolchain,
    compiler: &'a dyn Compiler,
    runner: &'a dyn TestRunner,
    parser: &'a dyn OutcomeParser,
    adapter: Option<&'a dyn RepairAdapter>,
}

impl<'a> VerificationPhase<'a> {
    pub fn new(
        config: &'a Config,
        toolchain: &'a JavaToolchain,
        compiler: &'a dyn Compiler,
        runner: &'a dyn TestRunner,
        parser: &'a dyn OutcomeParser,
        adapter: Option<&'a dyn RepairAdapter>,
    ) -> Self {
        Self {
            config,
            toolchain,
            compiler,
            runner,
            parser,
            adapter,
        }
    }

    /// Read the refinement ledger, verify, write the verification ledger.
    pub async fn run_ledger(
        &self,
        refined_ledger: &Path,
        verification_ledger: &Path,
    ) -> anyhow::Result<Vec<VerificationRecord>> {
        let entries: Vec<RefinementEntry> = read_ledger(refined_ledger)?;
        let records = self.run(&entries).await;
        write_ledger(verification_ledger, &records)?;
        Ok(records)
    }

    /// One record per attempted TestCase, in ledger order.
    pub async fn run(&self, entries: &[RefinementEntry]) -> Vec<VerificationRecord> {
        let worklist = select_worklist(
            entries.iter().filter(|e| e.success),
            &self.config.filter,
            |e| e.class_name.as_str(),
        );
        let skipped = entries.iter().filter(|e| !e.success).count();
        if skipped > 0 {
            tracing::info!("Skipping {} unsuccessful refinement(s)", skipped);
        }

        let mut resolver = resolver_for(self.config);
        let repair = RepairLoop::new(self.compiler, self.adapter, &self.config.repair);
        let test_support: Vec<PathBuf> = self
            .toolchain
            .test_support_jars()
            .iter()
            .map(|p| p.to_path_buf())
            .collect();
        let verifier = Verifier::new(
            self.compiler,
            self.runner,
            self.parser,
            repair,
            test_support,
            self.config.repair.max_error_chars,
        );
        let validated_root = self.config.resolve(&self.config.paths.validated_dir);

        let total = worklist.len();
        let mut records = Vec::with_capacity(total);
        for (i, entry) in worklist.into_iter().enumerate() {
            tracing::info!("[{}/{}] {} {}", i + 1, total, entry.project, entry.class_name);
            let mut record = self.verify_one(&mut resolver, &verifier, entry).await;

            if record.verified {
                let scaffolding = find_scaffolding(&record.refined_file);
                match copy_validated(&validated_root, &record, &scaffolding) {
                    Ok(path) => record.validated_file = Some(path),
                    Err(e) => tracing::warn!(
                        "Verified {} but could not store it: {:#}",
                        entry.class_name,
                        e
                    ),
                }
            }
            tracing::info!("  -> {}", record.reason);
            records.push(record);
        }

        log_totals(&records);
        records
    }

    async fn verify_one(
        &self,
        resolver: &mut ProjectResolver,
        verifier: &Verifier<'_>,
        entry: &RefinementEntry,
    ) -> VerificationRecord {
        let sut_jar = match resolver.sut_jar(&entry.project) {
            Ok(jar) => jar,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", entry.class_name, e);
                let mut record = VerificationRecord::new(entry, VerificationReason::ArtifactNotFound);
                record.detail = Some(e.to_string());
                return record;
            }
        };

        let context = match self.adapter {
            Some(_) => self.repair_context(resolver, entry).await,
            None => String::new(),
        };

        verifier
            .verify(&VerifyRequest {
                entry,
                sut_jar: &sut_jar,
                context: &context,
            })
            .await
    }

    /// SUT summary for repair prompts. The SUT class comes from the refined
    /// test's package and stem, else from the ledger.
    async fn repair_context(
        &self,
        resolver: &mut ProjectResolver,
        entry: &RefinementEntry,
    ) -> String {
        let sut_class = TestFile::read(&entry.refined_file)
            .ok()
            .and_then(|test| test.sut_class())
            .unwrap_or_else(|| entry.class_name.clone());

        match resolver.locate_class(&entry.project, &sut_class) {
            Ok(location) => extract_context(&location, &sut_class, self.toolchain).await,
            Err(e) => format!("Context not available ({})", e),
        }
    }
}

fn log_totals(records: &[VerificationRecord]) {
    let verified = records.iter().filter(|r| r.verified).count();
    tracing::info!(
        "Verification complete: {}/{} verified",
        verified,
        records.len()
    );
}
