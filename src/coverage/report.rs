//! JaCoCo XML report parsing.

use crate::error::EngineError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

/// Covered/missed pair of one JaCoCo counter kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub covered: u64,
    pub missed: u64,
}

impl Counter {
    pub fn total(&self) -> u64 {
        self.covered + self.missed
    }

    /// Percentage in [0, 100]; 0 when nothing was counted.
    pub fn percent(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.covered as f64 / self.total() as f64 * 100.0
        }
    }

    fn add(&mut self, covered: u64, missed: u64) {
        self.covered += covered;
        self.missed += missed;
    }
}

/// Counter actually reported as `line_coverage`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineMetric {
    #[default]
    Line,
    Instruction,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageResult {
    pub line: Counter,
    pub branch: Counter,
    pub instruction: Counter,
    pub method: Counter,
    pub line_coverage: f64,
    pub branch_coverage: f64,
    pub instruction_coverage: f64,
    pub method_coverage: f64,
    pub line_metric_used: LineMetric,
    /// False when the report had no element for the target class.
    pub class_found: bool,
}

impl CoverageResult {
    pub fn from_counters(
        line: Counter,
        branch: Counter,
        instruction: Counter,
        method: Counter,
    ) -> Self {
        let instruction_coverage = instruction.percent();
        let (line_coverage, line_metric_used) =
            if line.covered == 0 && instruction.covered > 0 {
                (instruction_coverage, LineMetric::Instruction)
            } else {
                (line.percent(), LineMetric::Line)
            };

        Self {
            line,
            branch,
            instruction,
            method,
            line_coverage,
            branch_coverage: branch.percent(),
            instruction_coverage,
            method_coverage: method.percent(),
            line_metric_used,
            class_found: true,
        }
    }
}

/// Class-scoped counters for `class_name` (dotted, fully qualified).
///
/// Inner classes (`Name$N`) contribute to the total. Only the counters that
/// are direct children of a `<class>` element are summed, not the per-method
/// ones nested below it.
pub fn parse_jacoco_xml(xml: &str, class_name: &str) -> Result<CoverageResult, EngineError> {
    let target = class_name.replace('.', "/");
    let inner_prefix = format!("{}$", target);

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut line = Counter::default();
    let mut branch = Counter::default();
    let mut instruction = Counter::default();
    let mut method = Counter::default();

    let mut found = false;
    let mut in_class = false;
    let mut in_method = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"class" => {
                    let name = attr(&e, b"name")?.unwrap_or_default();
                    in_class = name == target || name.starts_with(&inner_prefix);
                    found |= in_class;
                }
                b"method" => in_method = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.name().as_ref() == b"counter" && in_class && !in_method {
                    let kind = attr(&e, b"type")?.unwrap_or_default();
                    let covered = numeric_attr(&e, b"covered")?;
                    let missed = numeric_attr(&e, b"missed")?;
                    match kind.as_str() {
                        "LINE" => line.add(covered, missed),
                        "BRANCH" => branch.add(covered, missed),
                        "INSTRUCTION" => instruction.add(covered, missed),
                        "METHOD" => method.add(covered, missed),
                        _ => {}
                    }
                } else if e.name().as_ref() == b"class" {
                    let name = attr(&e, b"name")?.unwrap_or_default();
                    found |= name == target || name.starts_with(&inner_prefix);
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"class" => in_class = false,
                b"method" => in_method = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(EngineError::ParseError {
                    what: "JaCoCo report".to_string(),
                    detail: format!("at position {}: {}", reader.buffer_position(), e),
                })
            }
        }
    }

    if !found {
        tracing::warn!(
            "Class {} not found in coverage report; reporting 0%",
            class_name
        );
        return Ok(CoverageResult::default());
    }

    Ok(CoverageResult::from_counters(line, branch, instruction, method))
}

fn attr(e: &BytesStart, key: &[u8]) -> Result<Option<String>, EngineError> {
    for attribute in e.attributes() {
        let attribute = attribute.map_err(|err| EngineError::ParseError {
            what: "XML attribute".to_string(),
            detail: err.to_string(),
        })?;
        if attribute.key.as_ref() == key {
            let value = attribute
                .unescape_value()
                .map_err(|err| EngineError::ParseError {
                    what: "XML attribute value".to_string(),
                    detail: err.to_string(),
                })?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn numeric_attr(e: &BytesStart, key: &[u8]) -> Result<u64, EngineError> {
    match attr(e, key)? {
        None => Ok(0),
        Some(value) => value.parse().map_err(|_| EngineError::ParseError {
            what: "JaCoCo counter".to_string(),
            detail: format!(
                "{}=\"{}\" is not a number",
                String::from_utf8_lossy(key),
                value
            ),
        }),
    }
}
