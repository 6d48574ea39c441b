//! Stub toolchain used by unit tests that exercise phases without a JVM.

use crate::config::Config;
use crate::executor::{Classpath, CommandOutput, Compiler, TestRunner};
use crate::ledger::RefinementEntry;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

/// Succeeds unless the primary source path contains `fail_marker`.
#[derive(Default)]
pub struct StubCompiler {
    fail_marker: Option<String>,
    out_dirs: Mutex<Vec<PathBuf>>,
    sources: Mutex<Vec<Vec<PathBuf>>>,
}

impl StubCompiler {
    pub fn failing_under(marker: &str) -> Self {
        Self {
            fail_marker: Some(marker.to_string()),
            ..Default::default()
        }
    }

    pub fn out_dirs(&self) -> Vec<PathBuf> {
        self.out_dirs.lock().unwrap().clone()
    }

    pub fn sources(&self) -> Vec<Vec<PathBuf>> {
        self.sources.lock().unwrap().clone()
    }
}

#[async_trait]
impl Compiler for StubCompiler {
    async fn compile(
        &self,
        sources: &[PathBuf],
        _classpath: &Classpath,
        out_dir: &Path,
    ) -> CommandOutput {
        self.out_dirs.lock().unwrap().push(out_dir.to_path_buf());
        self.sources.lock().unwrap().push(sources.to_vec());

        let fails = match (&self.fail_marker, sources.first()) {
            (Some(marker), Some(primary)) => primary.to_string_lossy().contains(marker.as_str()),
            _ => false,
        };
        if fails {
            CommandOutput {
                exit_code: Some(1),
                stderr: "Foo_ESTest.java:3: error: cannot find symbol".to_string(),
                ..Default::default()
            }
        } else {
            CommandOutput {
                exit_code: Some(0),
                ..Default::default()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
    /// Killed by the runner timeout
    Timeout,
}

/// Answers per side, told apart by the last classpath entry
/// (`.../original` or `.../refined`).
pub struct StubRunner {
    original: Verdict,
    refined: Verdict,
    test_classes: Mutex<Vec<String>>,
}

impl StubRunner {
    pub fn new(original: Verdict, refined: Verdict) -> Self {
        Self {
            original,
            refined,
            test_classes: Mutex::new(Vec::new()),
        }
    }

    pub fn test_classes(&self) -> Vec<String> {
        self.test_classes.lock().unwrap().clone()
    }
}

#[async_trait]
impl TestRunner for StubRunner {
    async fn run_test(&self, classpath: &Classpath, test_class: &str) -> CommandOutput {
        self.test_classes.lock().unwrap().push(test_class.to_string());

        let is_original = classpath
            .entries()
            .last()
            .is_some_and(|p| p.ends_with("original"));
        let verdict = if is_original { self.original } else { self.refined };

        match verdict {
            Verdict::Pass => CommandOutput {
                exit_code: Some(0),
                stdout: "JUnit version 4.11\n..\nTime: 0.01\n\nOK (2 tests)\n".to_string(),
                ..Default::default()
            },
            Verdict::Fail => CommandOutput {
                exit_code: Some(1),
                stdout: "JUnit version 4.11\n.E.\nFAILURES!!!\nTests run: 2,  Failures: 1\n"
                    .to_string(),
                ..Default::default()
            },
            Verdict::Timeout => CommandOutput {
                exit_code: None,
                stdout: "JUnit version 4.11\n.".to_string(),
                stderr: "still running at deadline".to_string(),
                timed_out: true,
                ..Default::default()
            },
        }
    }
}

/// A base directory holding one project and its generated tests.
pub struct Workspace {
    pub dir: TempDir,
    pub config: Config,
}

/// Project `1_calc` with a jar and the source of `org.demo.Calculator`, plus
/// a baseline and a refined test for each class name given.
pub fn workspace(classes: &[&str]) -> (Workspace, Vec<RefinementEntry>) {
    let dir = TempDir::new().unwrap();
    let project = dir.path().join("projects/1_calc");
    let sources = project.join("src/main/java/org/demo");
    std::fs::create_dir_all(&sources).unwrap();
    std::fs::write(project.join("calc.jar"), "").unwrap();
    std::fs::write(
        sources.join("Calculator.java"),
        "package org.demo;\npublic class Calculator {\n    public int add(int a, int b) {\n        if (a > b) {\n            return a + b;\n        }\n        return b + a;\n    }\n}\n",
    )
    .unwrap();

    let mut entries = Vec::new();
    for class in classes {
        let simple = class.rsplit('.').next().unwrap();
        let file = format!("{}_ESTest.java", simple);
        let source = format!("package org.demo;\npublic class {}_ESTest {{}}\n", simple);
        let base = dir.path().join("baseline").join(simple);
        let refined = dir.path().join("refined").join(simple);
        for d in [&base, &refined] {
            std::fs::create_dir_all(d).unwrap();
            std::fs::write(d.join(&file), &source).unwrap();
            std::fs::write(d.join(format!("{}_ESTest_scaffolding.java", simple)), "").unwrap();
        }
        entries.push(RefinementEntry {
            project: "1_calc".to_string(),
            class_name: class.to_string(),
            original_file: base.join(&file),
            refined_file: refined.join(&file),
            success: true,
        });
    }

    let mut config = Config::default();
    config.general.base_dir = dir.path().to_path_buf();
    config.projects.roots = vec![PathBuf::from("projects")];

    (Workspace { dir, config }, entries)
}

/// Executable script standing in for `java`. It creates the JaCoCo destfile
/// when one is passed, sleeps `seconds` when its arguments contain any of
/// `slow_on`, and otherwise exits 0.
#[cfg(unix)]
pub fn stand_in_java(dir: &Path, slow_on: &[&str], seconds: u32) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let patterns = slow_on
        .iter()
        .map(|p| format!("*\"{}\"*", p))
        .collect::<Vec<_>>()
        .join("|");
    let script = format!(
        "#!/bin/sh\n\
         for arg in \"$@\"; do\n\
         \x20 case \"$arg\" in\n\
         \x20   -Djacoco-agent.destfile=*) : > \"${{arg#-Djacoco-agent.destfile=}}\" ;;\n\
         \x20 esac\n\
         done\n\
         case \" $* \" in\n\
         \x20 {}) exec sleep {} ;;\n\
         esac\n\
         exit 0\n",
        patterns, seconds
    );
    let path = dir.join("java-stand-in.sh");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
