//! Mutation measurement with PIT.
//!
//! This module provides:
//! - A PIT run scoped to one SUT class and one test class
//! - Parsing of `mutations.xml` into kill counts and both score definitions

mod report;

pub use report::{parse_mutations_xml, MutantStatus, MutationResult};

use crate::error::EngineError;
use crate::executor::{Classpath, JavaToolchain, PitRequest};
use std::path::{Path, PathBuf};

/// One mutation measurement.
#[derive(Debug, Clone, Copy)]
pub struct MutationJob<'a> {
    pub sut_jar: &'a Path,
    pub class_name: &'a str,
    pub test_class: &'a str,
    pub test_output: &'a Path,
    pub source_dir: &'a Path,
    pub scratch: &'a Path,
}

/// Classpath handed to PIT: compiled tests, the SUT, then test support jars.
pub fn mutation_classpath(test_output: &Path, sut_jar: &Path, support: &[&Path]) -> Classpath {
    let mut classpath = Classpath::new().with(test_output).with(sut_jar);
    for jar in support {
        classpath.push(*jar);
    }
    classpath
}

pub async fn measure_mutation(
    toolchain: &JavaToolchain,
    job: &MutationJob<'_>,
) -> Result<MutationResult, EngineError> {
    let report_dir = job.scratch.join("pit-report");
    let classpath = mutation_classpath(job.test_output, job.sut_jar, &toolchain.test_support_jars());

    let output = toolchain
        .pitest(&PitRequest {
            classpath: &classpath,
            target_class: job.class_name,
            target_test: job.test_class,
            source_dir: job.source_dir,
            report_dir: &report_dir,
        })
        .await;
    if output.timed_out {
        return Err(EngineError::ExecutionTimeout {
            tool: "pitest".to_string(),
            seconds: toolchain.timeouts().mutation().as_secs(),
        });
    }

    let Some(xml_path) = find_mutations_report(&report_dir) else {
        if !output.success() {
            // PIT exits non-zero without a report when e.g. the test fails
            // on unmutated code.
            output.check("pitest", toolchain.timeouts().mutation())?;
        }
        return Err(EngineError::ReportMissing {
            tool: "pitest".to_string(),
            path: report_dir.join("mutations.xml"),
        });
    };

    let xml = std::fs::read_to_string(&xml_path)?;
    parse_mutations_xml(&xml)
}

/// `mutations.xml` directly in `report_dir`, else the first one below it.
/// Older PIT versions write into a timestamped subdirectory.
pub fn find_mutations_report(report_dir: &Path) -> Option<PathBuf> {
    let direct = report_dir.join("mutations.xml");
    if direct.is_file() {
        return Some(direct);
    }
    if !report_dir.is_dir() {
        return None;
    }

    walkdir::WalkDir::new(report_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_type().is_file() && e.file_name() == "mutations.xml")
        .map(|e| e.into_path())
}
