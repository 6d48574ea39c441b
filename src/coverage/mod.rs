//! Coverage measurement with JaCoCo offline instrumentation.
//!
//! The SUT jar is unpacked, its classes are instrumented into a second
//! directory and the test runs against the instrumented copies. The report is
//! generated against the original class files and filtered to the SUT class.

mod report;

pub use report::{parse_jacoco_xml, Counter, CoverageResult, LineMetric};

use crate::error::EngineError;
use crate::executor::{Classpath, JavaToolchain};
use std::path::Path;

/// One coverage measurement.
#[derive(Debug, Clone, Copy)]
pub struct CoverageJob<'a> {
    pub sut_jar: &'a Path,
    /// Fully-qualified SUT class
    pub class_name: &'a str,
    pub test_class: &'a str,
    /// Directory holding the compiled test classes
    pub test_output: &'a Path,
    pub source_dir: Option<&'a Path>,
    /// Empty directory owned by the caller
    pub scratch: &'a Path,
}

/// Classpath for running against offline-instrumented classes.
///
/// Instrumented classes must precede the extracted originals or the JVM
/// loads the uninstrumented copies and records nothing.
pub fn coverage_classpath(
    instrumented: &Path,
    extracted: &Path,
    test_output: &Path,
    support: &[&Path],
    agent: &Path,
) -> Classpath {
    let mut classpath = Classpath::new()
        .with(instrumented)
        .with(extracted)
        .with(test_output);
    for jar in support {
        classpath.push(*jar);
    }
    classpath.with(agent)
}

pub async fn measure_coverage(
    toolchain: &JavaToolchain,
    job: &CoverageJob<'_>,
) -> Result<CoverageResult, EngineError> {
    let timeouts = toolchain.timeouts();
    let extracted = job.scratch.join("sut-classes");
    let instrumented = job.scratch.join("instrumented");
    let exec_file = job.scratch.join("jacoco.exec");
    let xml_report = job.scratch.join("jacoco.xml");
    std::fs::create_dir_all(&extracted)?;

    toolchain
        .extract_jar(job.sut_jar, &extracted)
        .await
        .check("jar extraction", timeouts.instrument())?;

    toolchain
        .jacoco_instrument(&extracted, &instrumented)
        .await
        .check("jacoco instrument", timeouts.instrument())?;

    let classpath = coverage_classpath(
        &instrumented,
        &extracted,
        job.test_output,
        &toolchain.test_support_jars(),
        toolchain.jacoco_agent(),
    );
    let run = toolchain
        .run_test_offline(&classpath, job.test_class, &exec_file)
        .await;
    if run.timed_out {
        return Err(EngineError::ExecutionTimeout {
            tool: "junit (coverage)".to_string(),
            seconds: timeouts.test().as_secs(),
        });
    }
    // A failing test still produces execution data; only its absence matters.
    if !exec_file.exists() {
        return Err(EngineError::ReportMissing {
            tool: "jacoco runtime".to_string(),
            path: exec_file,
        });
    }

    let report = toolchain
        .jacoco_report(&exec_file, &extracted, job.source_dir, &xml_report)
        .await;
    if report.timed_out {
        return Err(EngineError::ExecutionTimeout {
            tool: "jacoco report".to_string(),
            seconds: timeouts.report().as_secs(),
        });
    }

    read_report(&xml_report, job.class_name)
}

fn read_report(xml_report: &Path, class_name: &str) -> Result<CoverageResult, EngineError> {
    if !xml_report.exists() {
        return Err(EngineError::ReportMissing {
            tool: "jacoco report".to_string(),
            path: xml_report.to_path_buf(),
        });
    }
    let xml = std::fs::read_to_string(xml_report)?;
    parse_jacoco_xml(&xml, class_name)
}
