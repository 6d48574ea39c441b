//! SUT capability summaries used to ground repair prompts.
//!
//! The summary lists the package, non-private fields and non-private method
//! signatures of every type in a source file. Classes that only exist as
//! bytecode are summarised with `javap -public`. Extraction never fails
//! loudly: problems come back as a readable message in place of the summary.

use crate::executor::JavaToolchain;
use crate::resolver::{parse_package, SutLocation};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Summary of whatever `location` points at. Errors are returned as text.
pub async fn extract_context(
    location: &SutLocation,
    class_name: &str,
    toolchain: &JavaToolchain,
) -> String {
    match location {
        SutLocation::Source { path, .. } => extract_from_file(path),
        SutLocation::Binary { jar } => {
            let output = toolchain.javap_public(jar, class_name).await;
            if output.success() {
                strip_javap_preamble(&output.stdout)
            } else {
                format!("Error running javap: {}", output.stderr.trim())
            }
        }
    }
}

pub fn extract_from_file(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => {
            let source = String::from_utf8_lossy(&bytes);
            summarize_source(&source).unwrap_or_else(|e| format!("Error extracting context: {}", e))
        }
        Err(e) => format!(
            "Context not available ({}: {})",
            path.display(),
            e
        ),
    }
}

fn strip_javap_preamble(output: &str) -> String {
    output
        .lines()
        .filter(|l| !l.starts_with("Compiled from"))
        .collect::<Vec<_>>()
        .join("\n")
}

enum Frame {
    Type(usize),
    Block,
}

struct TypeSummary {
    header: String,
    members: Vec<String>,
}

/// Render the public/protected surface of Java source text.
pub fn summarize_source(source: &str) -> Result<String, String> {
    let cleaned = strip_comments_and_literals(source);

    let mut types: Vec<TypeSummary> = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut segment = String::new();

    for ch in cleaned.chars() {
        let in_block = matches!(stack.last(), Some(Frame::Block));
        match ch {
            '{' => {
                if in_block {
                    stack.push(Frame::Block);
                    continue;
                }
                let decl = normalize(&segment);
                segment.clear();

                if let Some(header) = type_header(&decl) {
                    types.push(TypeSummary {
                        header,
                        members: Vec::new(),
                    });
                    stack.push(Frame::Type(types.len() - 1));
                    continue;
                }

                if let Some(Frame::Type(idx)) = stack.last() {
                    if let Some(member) = classify_member(&decl) {
                        types[*idx].members.push(member);
                    }
                }
                stack.push(Frame::Block);
            }
            '}' => {
                stack.pop();
                segment.clear();
            }
            ';' if !in_block => {
                let decl = normalize(&segment);
                segment.clear();
                if let Some(Frame::Type(idx)) = stack.last() {
                    if let Some(member) = classify_member(&decl) {
                        types[*idx].members.push(member);
                    }
                }
            }
            _ if !in_block => segment.push(ch),
            _ => {}
        }
    }

    if types.is_empty() {
        return Err("no type declaration found".to_string());
    }

    let mut out = Vec::new();
    if let Some(package) = parse_package(source) {
        out.push(format!("package {};", package));
    }
    for summary in types {
        out.push(String::new());
        out.push(format!("{} {{", summary.header));
        for member in summary.members {
            out.push(format!("    {};", member));
        }
        out.push("}".to_string());
    }
    Ok(out.join("\n"))
}

fn annotation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@[\w.]+(\s*\([^)]*\))?").expect("valid regex"))
}

fn type_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(class|interface|enum|record)\s+\w+").expect("valid regex"))
}

/// Collapse whitespace and drop annotations.
fn normalize(segment: &str) -> String {
    let without_annotations = annotation_regex().replace_all(segment, " ");
    without_annotations
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn type_header(decl: &str) -> Option<String> {
    let m = type_regex().find(decl)?;
    let paren = decl.find('(');
    // `record Foo(int x)` keeps its component list; any other keyword after a
    // parenthesis is a method named like a keyword, not a type.
    let is_record = decl[m.start()..].starts_with("record");
    match paren {
        Some(p) if p < m.start() => None,
        Some(_) if !is_record => None,
        _ => Some(decl.to_string()),
    }
}

fn is_private(decl: &str) -> bool {
    let head = decl.split('(').next().unwrap_or(decl);
    head.split_whitespace().any(|w| w == "private")
}

/// A member declaration reduced to its signature, or `None` when it is
/// private, empty or an initializer block.
fn classify_member(decl: &str) -> Option<String> {
    if decl.is_empty() || is_private(decl) {
        return None;
    }

    let eq = decl.find('=');
    let paren = decl.find('(');
    match (eq, paren) {
        // Field with an initializer, possibly calling a constructor.
        (Some(e), Some(p)) if e < p => Some(decl[..e].trim().to_string()),
        (Some(e), None) => Some(decl[..e].trim().to_string()),
        // Method, constructor or abstract method.
        (_, Some(_)) => Some(decl.to_string()),
        // Plain field, enum constants, or `static` before an initializer block.
        (None, None) => {
            if decl == "static" {
                None
            } else {
                Some(decl.to_string())
            }
        }
    }
}

/// Replace comments with a space and string/char literal contents with
/// nothing so braces inside them do not disturb the scan.
fn strip_comments_and_literals(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '/' if chars.peek() == Some(&'/') => {
                for n in chars.by_ref() {
                    if n == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
                out.push(' ');
            }
            '"' | '\'' => {
                let quote = c;
                out.push(quote);
                let mut escaped = false;
                for n in chars.by_ref() {
                    if escaped {
                        escaped = false;
                    } else if n == '\\' {
                        escaped = true;
                    } else if n == quote {
                        break;
                    }
                }
                out.push(quote);
            }
            _ => out.push(c),
        }
    }
    out
}
