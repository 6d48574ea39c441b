//! Java toolchain facade: javac, the JUnit runner, jar, javap, the JaCoCo CLI
//! and the PIT command line, all routed through [`run_command`].

use super::{run_command, Classpath, CommandOutput, Compiler, TestRunner, ToolCommand};
use crate::config::{Config, TimeoutConfig, ToolchainConfig};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Entry point class of the JUnit 4 text runner.
pub const JUNIT_RUNNER: &str = "org.junit.runner.JUnitCore";

/// Entry point class of the PIT command line.
const PIT_MAIN: &str = "org.pitest.mutationtest.commandline.MutationCoverageReport";

#[derive(Debug, Clone)]
pub struct JavaToolchain {
    programs: ToolchainConfig,
    timeouts: TimeoutConfig,
    junit: PathBuf,
    hamcrest: PathBuf,
    evosuite: PathBuf,
    jacoco_agent: PathBuf,
    jacoco_cli: PathBuf,
    pitest: PathBuf,
}

impl JavaToolchain {
    pub fn from_config(config: &Config) -> Self {
        Self {
            programs: config.toolchain.clone(),
            timeouts: config.timeouts.clone(),
            junit: config.resolve(&config.libs.junit),
            hamcrest: config.resolve(&config.libs.hamcrest),
            evosuite: config.resolve(&config.libs.evosuite),
            jacoco_agent: config.resolve(&config.libs.jacoco_agent),
            jacoco_cli: config.resolve(&config.libs.jacoco_cli),
            pitest: config.resolve(&config.libs.pitest),
        }
    }

    pub fn timeouts(&self) -> &TimeoutConfig {
        &self.timeouts
    }

    /// Assertion, runner and scaffolding-runtime jars, in classpath order.
    pub fn test_support_jars(&self) -> [&Path; 3] {
        [&self.junit, &self.hamcrest, &self.evosuite]
    }

    /// JaCoCo agent jar; also carries the runtime offline-instrumented
    /// classes register against.
    pub fn jacoco_agent(&self) -> &Path {
        &self.jacoco_agent
    }

    /// Run a test class with offline-instrumented classes on the classpath.
    /// The runtime picks up its output location from a system property.
    pub async fn run_test_offline(
        &self,
        classpath: &Classpath,
        test_class: &str,
        exec_file: &Path,
    ) -> CommandOutput {
        let mut destfile = std::ffi::OsString::from("-Djacoco-agent.destfile=");
        destfile.push(exec_file);

        let cmd = ToolCommand::new(&self.programs.java, self.timeouts.test())
            .arg("-Djava.awt.headless=true")
            .arg(destfile)
            .arg("-cp")
            .arg(classpath.to_arg())
            .arg(JUNIT_RUNNER)
            .arg(test_class);
        run_command(&cmd).await
    }

    /// Unpack a jar into `dest`.
    pub async fn extract_jar(&self, jar: &Path, dest: &Path) -> CommandOutput {
        let jar = absolute(jar);
        let cmd = ToolCommand::new(&self.programs.jar, self.timeouts.instrument())
            .arg("xf")
            .arg(jar)
            .current_dir(dest);
        run_command(&cmd).await
    }

    /// Public surface of one class inside a jar.
    pub async fn javap_public(&self, jar: &Path, class_name: &str) -> CommandOutput {
        let cmd = ToolCommand::new(&self.programs.javap, self.timeouts.javap())
            .arg("-cp")
            .arg(jar)
            .arg("-public")
            .arg(class_name);
        run_command(&cmd).await
    }

    /// `jacococli instrument <classes> --dest <dest>`
    pub async fn jacoco_instrument(&self, classes_dir: &Path, dest: &Path) -> CommandOutput {
        let cmd = ToolCommand::new(&self.programs.java, self.timeouts.instrument())
            .arg("-jar")
            .arg(&self.jacoco_cli)
            .arg("instrument")
            .arg(classes_dir)
            .arg("--dest")
            .arg(dest);
        run_command(&cmd).await
    }

    /// `jacococli report <exec> --classfiles <dir> [--sourcefiles <dir>] --xml <file>`
    pub async fn jacoco_report(
        &self,
        exec_file: &Path,
        class_files: &Path,
        source_files: Option<&Path>,
        xml_out: &Path,
    ) -> CommandOutput {
        let mut cmd = ToolCommand::new(&self.programs.java, self.timeouts.report())
            .arg("-jar")
            .arg(&self.jacoco_cli)
            .arg("report")
            .arg(exec_file)
            .arg("--classfiles")
            .arg(class_files);
        if let Some(sources) = source_files {
            cmd = cmd.arg("--sourcefiles").arg(sources);
        }
        let cmd = cmd.arg("--xml").arg(xml_out);
        run_command(&cmd).await
    }

    /// Run PIT scoped to one target class and one test class.
    pub async fn pitest(&self, request: &PitRequest<'_>) -> CommandOutput {
        let classpath = Classpath::new().with(&self.pitest);
        let mut full = classpath;
        for entry in request.classpath.entries() {
            full.push(entry);
        }

        let cmd = ToolCommand::new(&self.programs.java, self.timeouts.mutation())
            .arg("-Djava.awt.headless=true")
            .arg("-cp")
            .arg(full.to_arg())
            .arg(PIT_MAIN)
            .arg("--reportDir")
            .arg(request.report_dir)
            .arg("--targetClasses")
            .arg(request.target_class)
            .arg("--targetTests")
            .arg(request.target_test)
            .arg("--sourceDirs")
            .arg(request.source_dir)
            .arg("--outputFormats")
            .arg("XML")
            .arg("--timestampedReports=false")
            .arg("--timeoutConst")
            .arg(self.timeouts.mutant_timeout_const_ms.to_string())
            .arg("--threads")
            .arg("1");
        run_command(&cmd).await
    }
}

/// Inputs of one PIT run.
#[derive(Debug)]
pub struct PitRequest<'a> {
    pub classpath: &'a Classpath,
    pub target_class: &'a str,
    pub target_test: &'a str,
    pub source_dir: &'a Path,
    pub report_dir: &'a Path,
}

#[async_trait]
impl Compiler for JavaToolchain {
    async fn compile(
        &self,
        sources: &[PathBuf],
        classpath: &Classpath,
        out_dir: &Path,
    ) -> CommandOutput {
        let cmd = ToolCommand::new(&self.programs.javac, self.timeouts.compile())
            .arg("-nowarn")
            .arg("-cp")
            .arg(classpath.to_arg())
            .arg("-d")
            .arg(out_dir)
            .args(sources.iter().map(|s| s.as_os_str().to_owned()));
        run_command(&cmd).await
    }
}

#[async_trait]
impl TestRunner for JavaToolchain {
    async fn run_test(&self, classpath: &Classpath, test_class: &str) -> CommandOutput {
        let cmd = ToolCommand::new(&self.programs.java, self.timeouts.test())
            .arg("-Djava.awt.headless=true")
            .arg("-cp")
            .arg(classpath.to_arg())
            .arg(JUNIT_RUNNER)
            .arg(test_class);
        run_command(&cmd).await
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneralConfig;

    fn toolchain_at(base: &str) -> JavaToolchain {
        let config = Config {
            general: GeneralConfig {
                base_dir: PathBuf::from(base),
                ..Default::default()
            },
            ..Default::default()
        };
        JavaToolchain::from_config(&config)
    }

    #[test]
    fn test_libs_resolve_against_base_dir() {
        let toolchain = toolchain_at("/work");
        let jars = toolchain.test_support_jars();

        assert_eq!(jars[0], Path::new("/work/lib/junit-4.11.jar"));
        assert_eq!(jars[1], Path::new("/work/lib/hamcrest-core-1.3.jar"));
        assert_eq!(jars[2], Path::new("/work/lib/evosuite-1.2.0.jar"));
        assert_eq!(
            toolchain.jacoco_agent(),
            Path::new("/work/lib/jacocoagent.jar")
        );
    }

    #[test]
    fn test_absolute_keeps_absolute_paths() {
        assert_eq!(absolute(Path::new("/a/b.jar")), PathBuf::from("/a/b.jar"));
        assert!(absolute(Path::new("b.jar")).is_absolute());
    }

    #[tokio::test]
    async fn test_missing_javac_is_a_failed_compile() {
        let config = Config {
            toolchain: ToolchainConfig {
                javac: "no-such-javac-binary".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let toolchain = JavaToolchain::from_config(&config);
        let temp_dir = tempfile::TempDir::new().unwrap();

        let output = toolchain
            .compile(
                &[temp_dir.path().join("Foo.java")],
                &Classpath::new(),
                temp_dir.path(),
            )
            .await;

        assert!(!output.success());
        assert!(output.stderr.contains("Failed to spawn"));
    }
}
