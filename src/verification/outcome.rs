use crate::executor::CommandOutput;
use regex::Regex;
use std::sync::OnceLock;

/// Pass/fail verdict of one test-class run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunVerdict {
    pub passed: bool,
    pub tests_run: Option<u32>,
    pub failures: Option<u32>,
    /// One-line description for ledgers and logs
    pub summary: String,
}

impl RunVerdict {
    fn failed(summary: impl Into<String>) -> Self {
        Self {
            passed: false,
            tests_run: None,
            failures: None,
            summary: summary.into(),
        }
    }
}

/// Turns runner output into a verdict. One implementation per runner.
pub trait OutcomeParser: Send + Sync {
    fn parse(&self, output: &CommandOutput) -> RunVerdict;
}

/// JUnit 4 `JUnitCore` text output.
///
/// Pass requires the `OK (N tests)` banner and a zero exit code. Otherwise
/// the `Tests run: N,  Failures: M` summary is read when present.
#[derive(Debug, Clone, Copy, Default)]
pub struct JUnit4OutcomeParser;

fn ok_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"OK \((\d+) tests?\)").expect("valid regex"))
}

fn failures_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Tests run:\s*(\d+),\s*Failures:\s*(\d+)").expect("valid regex")
    })
}

impl OutcomeParser for JUnit4OutcomeParser {
    fn parse(&self, output: &CommandOutput) -> RunVerdict {
        if output.timed_out {
            return RunVerdict::failed("timed out");
        }

        if let Some(caps) = ok_regex().captures(&output.stdout) {
            let tests_run = caps[1].parse().ok();
            if output.success() {
                return RunVerdict {
                    passed: true,
                    tests_run,
                    failures: Some(0),
                    summary: caps[0].to_string(),
                };
            }
            return RunVerdict {
                passed: false,
                tests_run,
                failures: Some(0),
                summary: format!("{} but exit code {}", &caps[0], output.exit_label()),
            };
        }

        if let Some(caps) = failures_regex().captures(&output.stdout) {
            return RunVerdict {
                passed: false,
                tests_run: caps[1].parse().ok(),
                failures: caps[2].parse().ok(),
                summary: caps[0].to_string(),
            };
        }

        RunVerdict::failed(format!("no JUnit summary (exit code {})", output.exit_label()))
    }
}

/// Exit code only, for runners with no parseable summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExitCodeOutcomeParser;

impl OutcomeParser for ExitCodeOutcomeParser {
    fn parse(&self, output: &CommandOutput) -> RunVerdict {
        RunVerdict {
            passed: output.success(),
            tests_run: None,
            failures: None,
            summary: format!("exit code {}", output.exit_label()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(exit_code: Option<i32>, stdout: &str) -> CommandOutput {
        CommandOutput {
            exit_code,
            stdout: stdout.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_junit_ok_banner() {
        let out = output(Some(0), "JUnit version 4.11\n...\nTime: 0.1\n\nOK (3 tests)\n\n");
        let verdict = JUnit4OutcomeParser.parse(&out);

        assert!(verdict.passed);
        assert_eq!(verdict.tests_run, Some(3));
        assert_eq!(verdict.failures, Some(0));
        assert_eq!(verdict.summary, "OK (3 tests)");
    }

    #[test]
    fn test_junit_single_test_banner() {
        let verdict = JUnit4OutcomeParser.parse(&output(Some(0), "OK (1 test)\n"));
        assert!(verdict.passed);
        assert_eq!(verdict.tests_run, Some(1));
    }

    #[test]
    fn test_junit_failures() {
        let out = output(
            Some(1),
            "JUnit version 4.11\n.E\nThere was 1 failure:\n1) test0(Foo_ESTest)\n\nFAILURES!!!\nTests run: 2,  Failures: 1\n",
        );
        let verdict = JUnit4OutcomeParser.parse(&out);

        assert!(!verdict.passed);
        assert_eq!(verdict.tests_run, Some(2));
        assert_eq!(verdict.failures, Some(1));
    }

    #[test]
    fn test_junit_banner_with_nonzero_exit_fails() {
        let verdict = JUnit4OutcomeParser.parse(&output(Some(1), "OK (2 tests)\n"));
        assert!(!verdict.passed);
        assert!(verdict.summary.contains("exit code 1"));
    }

    #[test]
    fn test_junit_class_not_found() {
        let out = output(
            Some(1),
            "JUnit version 4.11\nCould not find class: a.Foo_ESTest\n\nTime: 0.001\n\nOK (0 tests)\n",
        );
        assert!(!JUnit4OutcomeParser.parse(&out).passed);
    }

    #[test]
    fn test_junit_timeout() {
        let out = CommandOutput {
            timed_out: true,
            stdout: "OK (1 test)".to_string(),
            ..Default::default()
        };
        let verdict = JUnit4OutcomeParser.parse(&out);
        assert!(!verdict.passed);
        assert_eq!(verdict.summary, "timed out");
    }

    #[test]
    fn test_junit_no_summary() {
        let verdict = JUnit4OutcomeParser.parse(&output(None, ""));
        assert!(!verdict.passed);
        assert!(verdict.summary.contains("exit code none"));
    }

    #[test]
    fn test_exit_code_parser() {
        assert!(ExitCodeOutcomeParser.parse(&output(Some(0), "")).passed);
        assert!(!ExitCodeOutcomeParser.parse(&output(Some(2), "OK (1 test)")).passed);
    }
}
