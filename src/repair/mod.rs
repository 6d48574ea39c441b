//! Compile-and-repair loop.
//!
//! A candidate test is compiled together with its scaffolding. On failure a
//! repair adapter is asked for a replacement file, grounded by the SUT
//! context and the compiler errors. Each attempt starts from the previous
//! attempt's output and the number of repair attempts is bounded.

mod test_file;

pub use test_file::{find_scaffolding, TestFile, TEST_SUFFIX};

use crate::config::RepairConfig;
use crate::error::EngineError;
use crate::executor::{truncate_output, Classpath, CommandOutput, Compiler};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Produces a replacement source file from a repair prompt.
#[async_trait]
pub trait RepairAdapter: Send + Sync {
    async fn repair(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Result of compiling a candidate, possibly after repairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    pub compiled: bool,
    /// Repair attempts consumed, including ones where the adapter failed.
    pub attempts: u32,
    pub final_errors: Option<String>,
}

/// One compilation unit set and where it goes.
#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    pub primary: &'a Path,
    pub scaffolding: &'a [PathBuf],
    pub classpath: &'a Classpath,
    pub out_dir: &'a Path,
    /// SUT summary injected into repair prompts
    pub context: &'a str,
}

impl CompileRequest<'_> {
    fn sources(&self) -> Vec<PathBuf> {
        std::iter::once(self.primary.to_path_buf())
            .chain(self.scaffolding.iter().cloned())
            .collect()
    }
}

/// Loop state between transitions.
#[derive(Debug)]
struct RepairState {
    attempt: u32,
    current_source: String,
    current_errors: String,
}

pub struct RepairLoop<'a> {
    compiler: &'a dyn Compiler,
    adapter: Option<&'a dyn RepairAdapter>,
    max_attempts: u32,
    max_error_chars: usize,
}

impl<'a> RepairLoop<'a> {
    pub fn new(
        compiler: &'a dyn Compiler,
        adapter: Option<&'a dyn RepairAdapter>,
        config: &RepairConfig,
    ) -> Self {
        Self {
            compiler,
            adapter,
            max_attempts: config.max_attempts,
            max_error_chars: config.max_error_chars,
        }
    }

    /// Compile without repairing.
    pub async fn compile_once(&self, request: &CompileRequest<'_>) -> CommandOutput {
        self.compiler
            .compile(&request.sources(), request.classpath, request.out_dir)
            .await
    }

    /// Compile `request.primary`, rewriting it in place with repaired code
    /// until it compiles or the attempt budget is spent.
    pub async fn run(&self, request: &CompileRequest<'_>) -> Result<RepairOutcome, EngineError> {
        let mut state = RepairState {
            attempt: 0,
            current_source: tokio::fs::read_to_string(request.primary).await?,
            current_errors: String::new(),
        };

        loop {
            let output = self.compile_once(request).await;
            if output.success() {
                if state.attempt > 0 {
                    tracing::info!(
                        "Repair succeeded after {} attempt(s): {}",
                        state.attempt,
                        request.primary.display()
                    );
                }
                return Ok(RepairOutcome {
                    compiled: true,
                    attempts: state.attempt,
                    final_errors: None,
                });
            }
            state.current_errors = compiler_errors(&output);

            match self.next_source(request, &mut state).await {
                Some(code) => {
                    tokio::fs::write(request.primary, &code).await?;
                    state.current_source = code;
                }
                None => {
                    tracing::warn!(
                        "Compilation failed after {} repair attempt(s): {}",
                        state.attempt,
                        request.primary.display()
                    );
                    return Ok(RepairOutcome {
                        compiled: false,
                        attempts: state.attempt,
                        final_errors: Some(truncate_output(
                            &state.current_errors,
                            self.max_error_chars,
                        )),
                    });
                }
            }
        }
    }

    /// Ask the adapter for replacement code. Adapter failures consume an
    /// attempt without a recompile. `None` once the budget is spent.
    async fn next_source(
        &self,
        request: &CompileRequest<'_>,
        state: &mut RepairState,
    ) -> Option<String> {
        let adapter = self.adapter?;

        while state.attempt < self.max_attempts {
            state.attempt += 1;
            tracing::info!(
                "Repair attempt {}/{} for {}",
                state.attempt,
                self.max_attempts,
                request.primary.display()
            );

            let errors = truncate_output(&state.current_errors, self.max_error_chars);
            let prompt = build_repair_prompt(request.context, &state.current_source, &errors);

            match adapter.repair(&prompt).await {
                Ok(raw) => {
                    let code = clean_java_code(&raw);
                    if code.trim().is_empty() {
                        tracing::warn!("Repair attempt {} returned no code", state.attempt);
                        continue;
                    }
                    return Some(code);
                }
                Err(e) => {
                    tracing::warn!("Repair attempt {} failed: {:#}", state.attempt, e);
                }
            }
        }
        None
    }
}

/// javac writes diagnostics to stderr; spawn failures and timeouts also
/// land there.
fn compiler_errors(output: &CommandOutput) -> String {
    if output.stderr.trim().is_empty() {
        output.stdout.clone()
    } else {
        output.stderr.clone()
    }
}

pub fn build_repair_prompt(context: &str, code: &str, errors: &str) -> String {
    format!(
        r#"Fix the following Java compilation errors in the test file.

CONTEXT (System Under Test):
{context}

CODE:
```java
{code}
```

ERRORS:
{errors}

INSTRUCTIONS:
1. Fix missing imports (e.g. @RunWith, @Test).
2. Fix missing symbols (e.g. class names, methods).
3. Do not remove the test logic, just fix the syntax/imports.
4. Output the FULL corrected Java file.

OUTPUT ONLY JAVA CODE."#
    )
}

fn fenced_java_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```java\s*(.*?)\s*```").expect("valid regex"))
}

fn fenced_any_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```\s*(.*?)\s*```").expect("valid regex"))
}

/// Extract Java source from model output.
pub fn clean_java_code(raw: &str) -> String {
    for re in [fenced_java_regex(), fenced_any_regex()] {
        if let Some(caps) = re.captures(raw) {
            return caps[1].trim().to_string();
        }
    }

    let lines: Vec<&str> = raw.lines().collect();
    let start = lines.iter().position(|line| {
        let line = line.trim_start();
        line.starts_with("package ")
            || line.starts_with("import ")
            || line.starts_with("public class ")
            || line.starts_with("@RunWith")
    });

    match start {
        Some(idx) => lines[idx..].join("\n"),
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    // =========================================================================
    // Stubs
    // =========================================================================

    /// Fails the first `failures` compiles, then succeeds.
    struct StubCompiler {
        failures: u32,
        calls: AtomicU32,
    }

    impl StubCompiler {
        fn failing(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Compiler for StubCompiler {
        async fn compile(&self, _: &[PathBuf], _: &Classpath, _: &Path) -> CommandOutput {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n > self.failures {
                CommandOutput {
                    exit_code: Some(0),
                    ..Default::default()
                }
            } else {
                CommandOutput {
                    exit_code: Some(1),
                    stderr: format!("error #{}: cannot find symbol", n),
                    ..Default::default()
                }
            }
        }
    }

    /// Replays scripted replies, then keeps returning fixed code.
    struct StubAdapter {
        replies: Mutex<Vec<anyhow::Result<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl StubAdapter {
        fn new(mut replies: Vec<anyhow::Result<String>>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RepairAdapter for StubAdapter {
        async fn repair(&self, prompt: &str) -> anyhow::Result<String> {
            let n = {
                let mut prompts = self.prompts.lock().unwrap();
                prompts.push(prompt.to_string());
                prompts.len()
            };
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(format!("```java\nclass Fixed{} {{}}\n```", n)))
        }
    }

    fn fixture() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let primary = temp_dir.path().join("Foo_ESTest.java");
        std::fs::write(&primary, "class Foo_ESTest { broken }").unwrap();
        (temp_dir, primary)
    }

    fn config() -> RepairConfig {
        RepairConfig {
            max_attempts: 3,
            max_error_chars: 2000,
        }
    }

    async fn run_loop(
        compiler: &StubCompiler,
        adapter: Option<&dyn RepairAdapter>,
        primary: &Path,
    ) -> RepairOutcome {
        let classpath = Classpath::new();
        let out = primary.parent().unwrap().join("out");
        let request = CompileRequest {
            primary,
            scaffolding: &[],
            classpath: &classpath,
            out_dir: &out,
            context: "public class Foo { public int bar(); }",
        };
        RepairLoop::new(compiler, adapter, &config())
            .run(&request)
            .await
            .unwrap()
    }

    // =========================================================================
    // RepairLoop tests
    // =========================================================================

    #[tokio::test]
    async fn test_compiles_first_time_without_repair() {
        let (_dir, primary) = fixture();
        let compiler = StubCompiler::failing(0);
        let adapter = StubAdapter::new(vec![]);

        let outcome = run_loop(&compiler, Some(&adapter), &primary).await;

        assert!(outcome.compiled);
        assert_eq!(outcome.attempts, 0);
        assert_eq!(compiler.calls(), 1);
        assert!(adapter.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let (_dir, primary) = fixture();
        let compiler = StubCompiler::failing(u32::MAX);
        let adapter = StubAdapter::new(vec![]);

        let outcome = run_loop(&compiler, Some(&adapter), &primary).await;

        assert!(!outcome.compiled);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(adapter.prompts().len(), 3);
        // initial compile plus one per repair
        assert_eq!(compiler.calls(), 4);
        assert!(outcome.final_errors.unwrap().contains("error #4"));
    }

    #[tokio::test]
    async fn test_repair_rewrites_file_in_place() {
        let (_dir, primary) = fixture();
        let compiler = StubCompiler::failing(1);
        let adapter = StubAdapter::new(vec![Ok(
            "Here you go:\n```java\nclass Foo_ESTest {}\n```\nDone.".to_string(),
        )]);

        let outcome = run_loop(&compiler, Some(&adapter), &primary).await;

        assert!(outcome.compiled);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(
            std::fs::read_to_string(&primary).unwrap(),
            "class Foo_ESTest {}"
        );
    }

    #[tokio::test]
    async fn test_each_attempt_starts_from_previous_output() {
        let (_dir, primary) = fixture();
        let compiler = StubCompiler::failing(2);
        let adapter = StubAdapter::new(vec![
            Ok("```java\nclass FirstTry {}\n```".to_string()),
            Ok("```java\nclass SecondTry {}\n```".to_string()),
        ]);

        let outcome = run_loop(&compiler, Some(&adapter), &primary).await;
        let prompts = adapter.prompts();

        assert!(outcome.compiled);
        assert_eq!(outcome.attempts, 2);
        assert!(prompts[0].contains("class Foo_ESTest { broken }"));
        assert!(prompts[0].contains("error #1"));
        assert!(prompts[1].contains("class FirstTry {}"));
        assert!(prompts[1].contains("error #2"));
        assert!(prompts[1].contains("public int bar();"));
    }

    #[tokio::test]
    async fn test_adapter_error_consumes_an_attempt() {
        let (_dir, primary) = fixture();
        let compiler = StubCompiler::failing(1);
        let adapter = StubAdapter::new(vec![
            Err(anyhow::anyhow!("model offline")),
            Ok("```java\nclass Foo_ESTest {}\n```".to_string()),
        ]);

        let outcome = run_loop(&compiler, Some(&adapter), &primary).await;

        assert!(outcome.compiled);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(adapter.prompts().len(), 2);
        // no recompile after the failed adapter call
        assert_eq!(compiler.calls(), 2);
    }

    #[tokio::test]
    async fn test_adapter_errors_exhaust_budget() {
        let (_dir, primary) = fixture();
        let compiler = StubCompiler::failing(u32::MAX);
        let adapter = StubAdapter::new(vec![
            Err(anyhow::anyhow!("a")),
            Ok("   ".to_string()),
            Err(anyhow::anyhow!("c")),
        ]);

        let outcome = run_loop(&compiler, Some(&adapter), &primary).await;

        assert!(!outcome.compiled);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(compiler.calls(), 1);
        assert_eq!(
            std::fs::read_to_string(&primary).unwrap(),
            "class Foo_ESTest { broken }"
        );
    }

    #[tokio::test]
    async fn test_without_adapter_fails_immediately() {
        let (_dir, primary) = fixture();
        let compiler = StubCompiler::failing(u32::MAX);

        let outcome = run_loop(&compiler, None, &primary).await;

        assert!(!outcome.compiled);
        assert_eq!(outcome.attempts, 0);
        assert_eq!(compiler.calls(), 1);
        assert!(outcome.final_errors.is_some());
    }

    // =========================================================================
    // Prompt and cleaning tests
    // =========================================================================

    #[test]
    fn test_build_repair_prompt() {
        let prompt = build_repair_prompt("class Sut {}", "class T {}", "T.java:1: error");
        assert!(prompt.contains("CONTEXT (System Under Test):\nclass Sut {}"));
        assert!(prompt.contains("```java\nclass T {}\n```"));
        assert!(prompt.contains("ERRORS:\nT.java:1: error"));
        assert!(prompt.ends_with("OUTPUT ONLY JAVA CODE."));
    }

    #[test]
    fn test_clean_java_fenced() {
        let raw = "Sure!\n```java\npackage a;\nclass B {}\n```\nHope this helps";
        assert_eq!(clean_java_code(raw), "package a;\nclass B {}");
    }

    #[test]
    fn test_clean_any_fence() {
        let raw = "```\nclass B {}\n```";
        assert_eq!(clean_java_code(raw), "class B {}");
    }

    #[test]
    fn test_clean_heuristic_start() {
        let raw = "The fixed file is below.\n\nimport org.junit.Test;\npublic class B {}";
        assert_eq!(clean_java_code(raw), "import org.junit.Test;\npublic class B {}");
    }

    #[test]
    fn test_clean_unstructured_is_unchanged() {
        assert_eq!(clean_java_code("no code here"), "no code here");
    }
}
