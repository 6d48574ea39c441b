//! Static metrics of a Java source file.
//!
//! These are lexical approximations computed with regular expressions, not a
//! parse. They describe the SUT class a test targets and are reported next to
//! the dynamic metrics.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeMetrics {
    pub sloc: u32,
    pub comment_lines: u32,
    pub javadoc_lines: u32,
    /// 1 + decision points
    pub cyclomatic_complexity: u32,
    pub switch_conditions: u32,
    pub type_checks: u32,
    pub null_checks: u32,
    pub std_lib_dependencies: u32,
    pub external_dependencies: u32,
    pub internal_dependencies: u32,
    pub avg_identifier_length: f64,
    /// Deepest indentation, in levels of four columns
    pub max_nesting_depth: u32,
}

const KEYWORDS: &[&str] = &[
    "if", "else", "for", "while", "do", "switch", "case", "default", "break", "continue",
    "return", "try", "catch", "finally", "throw", "throws", "public", "protected", "private",
    "static", "final", "void", "int", "double", "float", "boolean", "char", "byte", "short",
    "long", "class", "interface", "enum", "extends", "implements", "new", "this", "super",
    "import", "package", "true", "false", "null",
];

struct Patterns {
    decisions: Regex,
    switch: Regex,
    instanceof: Regex,
    null_check: Regex,
    import: Regex,
    identifier: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        decisions: Regex::new(r"\b(if|for|while|case|catch)\b|&&|\|\||\?").expect("valid regex"),
        switch: Regex::new(r"\bswitch\b").expect("valid regex"),
        instanceof: Regex::new(r"\binstanceof\b").expect("valid regex"),
        null_check: Regex::new(r"[=!]=\s*null\b").expect("valid regex"),
        import: Regex::new(r"^import\s+(?:static\s+)?([\w.]+(?:\.\*)?)\s*;").expect("valid regex"),
        identifier: Regex::new(r"\b[A-Za-z_][A-Za-z0-9_]*\b").expect("valid regex"),
    })
}

pub fn analyze_file(path: &Path) -> std::io::Result<CodeMetrics> {
    let bytes = std::fs::read(path)?;
    Ok(analyze(&String::from_utf8_lossy(&bytes)))
}

pub fn analyze(source: &str) -> CodeMetrics {
    let p = patterns();
    let mut metrics = CodeMetrics {
        cyclomatic_complexity: 1 + p.decisions.find_iter(source).count() as u32,
        switch_conditions: p.switch.find_iter(source).count() as u32,
        type_checks: p.instanceof.find_iter(source).count() as u32,
        null_checks: p.null_check.find_iter(source).count() as u32,
        ..Default::default()
    };

    count_lines(source, &mut metrics);
    count_imports(source, &mut metrics);

    let lengths: Vec<usize> = p
        .identifier
        .find_iter(source)
        .map(|m| m.as_str())
        .filter(|word| !KEYWORDS.contains(word))
        .map(str::len)
        .collect();
    if !lengths.is_empty() {
        metrics.avg_identifier_length =
            lengths.iter().sum::<usize>() as f64 / lengths.len() as f64;
    }

    metrics.max_nesting_depth = source
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(indent_width)
        .max()
        .unwrap_or(0) as u32
        / 4;

    metrics
}

fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

fn count_lines(source: &str, metrics: &mut CodeMetrics) {
    let mut in_block = false;
    for line in source.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if in_block {
            metrics.comment_lines += 1;
            if line.contains("*/") {
                in_block = false;
            }
            continue;
        }
        if line.starts_with("/*") {
            metrics.comment_lines += 1;
            if line.starts_with("/**") {
                metrics.javadoc_lines += 1;
            }
            in_block = !line.contains("*/");
            continue;
        }
        if line.starts_with("//") {
            metrics.comment_lines += 1;
            continue;
        }
        metrics.sloc += 1;
    }
}

fn count_imports(source: &str, metrics: &mut CodeMetrics) {
    for line in source.lines() {
        let Some(caps) = patterns().import.captures(line.trim()) else {
            continue;
        };
        let target = &caps[1];
        if target.starts_with("java.") || target.starts_with("javax.") {
            metrics.std_lib_dependencies += 1;
        } else if target.starts_with("org.junit") || target.starts_with("org.evosuite") {
            metrics.external_dependencies += 1;
        } else {
            metrics.internal_dependencies += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"package org.demo;

import java.util.List;
import static java.lang.Math.max;
import org.junit.Test;
import org.demo.util.Helper;

/**
 * Calculator.
 */
public class Calculator {
    // running total
    private int total;

    public int clamp(Object value, int limit) {
        if (value == null || !(value instanceof Integer)) {
            return 0;
        }
        int v = (Integer) value;
        for (int i = 0; i < limit && v > 0; i++) {
            v--;
        }
        switch (v) {
            case 1:
                return 1;
            default:
                return v > limit ? limit : v;
        }
    }
}
"#;

    #[test]
    fn test_line_counts() {
        let m = analyze(SOURCE);
        assert_eq!(m.comment_lines, 4);
        assert_eq!(m.javadoc_lines, 1);
        assert_eq!(m.sloc, 23);
    }

    #[test]
    fn test_complexity() {
        let m = analyze(SOURCE);
        // if, ||, for, &&, case, ?
        assert_eq!(m.cyclomatic_complexity, 7);
        assert_eq!(m.switch_conditions, 1);
        assert_eq!(m.type_checks, 1);
        assert_eq!(m.null_checks, 1);
    }

    #[test]
    fn test_dependencies() {
        let m = analyze(SOURCE);
        assert_eq!(m.std_lib_dependencies, 2);
        assert_eq!(m.external_dependencies, 1);
        assert_eq!(m.internal_dependencies, 1);
    }

    #[test]
    fn test_nesting_depth() {
        let m = analyze(SOURCE);
        // `return 1;` sits at 16 columns
        assert_eq!(m.max_nesting_depth, 4);
        assert_eq!(analyze("class A {\n\t\tint x;\n}").max_nesting_depth, 2);
    }

    #[test]
    fn test_identifier_length_excludes_keywords() {
        let m = analyze("public class Ab { int abcd; }");
        // Ab, abcd
        assert!((m.avg_identifier_length - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_source() {
        let m = analyze("");
        assert_eq!(m.sloc, 0);
        assert_eq!(m.cyclomatic_complexity, 1);
        assert_eq!(m.avg_identifier_length, 0.0);
        assert_eq!(m.max_nesting_depth, 0);
    }

    #[test]
    fn test_analyze_missing_file() {
        assert!(analyze_file(Path::new("/no/such/Calc.java")).is_err());
    }
}
