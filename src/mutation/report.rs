//! PIT `mutations.xml` parsing.

use crate::error::EngineError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

/// Outcome of one PIT mutant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutantStatus {
    Killed,
    Survived,
    NoCoverage,
    TimedOut,
    /// MEMORY_ERROR, RUN_ERROR, NON_VIABLE and anything newer
    Other,
}

impl MutantStatus {
    pub fn parse(status: &str) -> Self {
        match status.trim() {
            "KILLED" => Self::Killed,
            "SURVIVED" => Self::Survived,
            "NO_COVERAGE" => Self::NoCoverage,
            "TIMED_OUT" => Self::TimedOut,
            _ => Self::Other,
        }
    }
}

/// Mutant counts and both kill-ratio definitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationResult {
    pub killed: u32,
    pub survived: u32,
    pub no_coverage: u32,
    pub timed_out: u32,
    pub other: u32,
    pub total: u32,
    /// Mutants reached by at least one test: `total - no_coverage`
    pub testable: u32,
    /// killed / total, in percent
    pub score: f64,
    /// killed / testable, in percent
    pub score_testable: f64,
}

impl MutationResult {
    pub fn from_statuses(statuses: impl IntoIterator<Item = MutantStatus>) -> Self {
        let mut result = Self::default();
        for status in statuses {
            result.total += 1;
            match status {
                MutantStatus::Killed => result.killed += 1,
                MutantStatus::Survived => result.survived += 1,
                MutantStatus::NoCoverage => result.no_coverage += 1,
                MutantStatus::TimedOut => result.timed_out += 1,
                MutantStatus::Other => result.other += 1,
            }
        }
        result.testable = result.total - result.no_coverage;
        result.score = ratio(result.killed, result.total);
        result.score_testable = ratio(result.killed, result.testable);
        result
    }
}

fn ratio(killed: u32, denominator: u32) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        killed as f64 / denominator as f64 * 100.0
    }
}

pub fn parse_mutations_xml(xml: &str) -> Result<MutationResult, EngineError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut statuses = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"mutation" => {
                statuses.push(MutantStatus::parse(&status_of(&e)?));
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(EngineError::ParseError {
                    what: "PIT mutations report".to_string(),
                    detail: format!("at position {}: {}", reader.buffer_position(), e),
                })
            }
        }
    }

    Ok(MutationResult::from_statuses(statuses))
}

fn status_of(e: &BytesStart) -> Result<String, EngineError> {
    for attribute in e.attributes() {
        let attribute = attribute.map_err(|err| EngineError::ParseError {
            what: "mutation attribute".to_string(),
            detail: err.to_string(),
        })?;
        if attribute.key.as_ref() == b"status" {
            return attribute
                .unescape_value()
                .map(|v| v.into_owned())
                .map_err(|err| EngineError::ParseError {
                    what: "mutation status".to_string(),
                    detail: err.to_string(),
                });
        }
    }
    Ok(String::new())
}
