use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use lazy_static::lazy_static;
use parking_lot::RwLock;
use regex::Regex;

use crate::models::{TestOutcome, Verdict};

use super::{GradeReport, Grader, PASSED_MESSAGE};

const SOLUTION: &str = "SOLUTION";
const FAILURE_MESSAGE: &str = "FAILURE_MESSAGE";
const DETECT_PREFIX: &str = "FAILURE_DETECT_IF_CONTAINS_";
const MESSAGE_PREFIX: &str = "FAILURE_MESSAGE_";
const DEFAULT_FAILURE: &str = "The submitted code does not match the expected solution";

lazy_static! {
    /// `def name(args) -> type:` up to the colon that opens the body
    static ref DEF_SIGNATURE: Regex =
        Regex::new(r"(?m)^(?P<indent>[ \t]*)def\s+\w+\s*\([^)]*\)\s*(?:->[^:]*)?:").unwrap();
}

/// A known mistake: `needle` in the code explains the failure with `message`
#[derive(Debug, Clone, PartialEq)]
struct DetectRule {
    key: String,
    needle: String,
    message: String,
}

/// Directives read from the comment header of a test file
#[derive(Debug, Clone, PartialEq, Default)]
struct SolutionHints {
    solution: Option<String>,
    failure_message: Option<String>,
    rules: Vec<DetectRule>,
}

impl SolutionHints {
    /// Reads `# KEY: value` comment lines; rules keep their file order
    fn parse(source: &str) -> Self {
        let mut hints = SolutionHints::default();
        let mut detectors: Vec<(String, String)> = Vec::new();
        let mut messages: HashMap<String, String> = HashMap::new();

        for line in source.lines() {
            let Some(comment) = line.trim_start().strip_prefix('#') else {
                continue;
            };
            let Some((key, value)) = comment.split_once(':') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim().to_string();

            if key == SOLUTION {
                hints.solution = Some(value);
            } else if key == FAILURE_MESSAGE {
                hints.failure_message = Some(value);
            } else if let Some(rule_key) = key.strip_prefix(DETECT_PREFIX) {
                detectors.push((rule_key.to_string(), value));
            } else if let Some(rule_key) = key.strip_prefix(MESSAGE_PREFIX) {
                messages.insert(rule_key.to_string(), value);
            }
        }

        hints.rules = detectors
            .into_iter()
            .filter(|(_, needle)| !needle.is_empty())
            .map(|(key, needle)| {
                let message = messages
                    .remove(&key)
                    .unwrap_or_else(|| format!("Detected `{needle}` in the submitted code"));
                DetectRule {
                    key,
                    needle,
                    message,
                }
            })
            .collect();

        hints
    }
}

/// Grades by matching the code against the solution hints of the test file.
///
/// Nothing is executed. Parsed hints are cached per test file path until
/// the file disappears.
pub struct HintGrader {
    cache: RwLock<HashMap<PathBuf, Arc<SolutionHints>>>,
}

impl HintGrader {
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn load_hints(&self, test_file: &Path) -> Result<Arc<SolutionHints>> {
        if let Some(hints) = self.cache.read().get(test_file) {
            return Ok(hints.clone());
        }

        let source = fs::read_to_string(test_file)?;
        let hints = Arc::new(SolutionHints::parse(&source));

        let mut cache = self.cache.write();
        // Test files of deleted assignments are removed from disk
        cache.retain(|path, _| path.exists());
        cache.insert(test_file.to_path_buf(), hints.clone());

        Ok(hints)
    }
}

impl Default for HintGrader {
    fn default() -> Self {
        Self::new()
    }
}

impl Grader for HintGrader {
    fn grade(&self, code: &str, test_file: &Path) -> Result<GradeReport> {
        let hints = match self.load_hints(test_file) {
            Ok(hints) => hints,
            Err(e) => {
                log::error!("Failed to read test file {}: {e}", test_file.display());
                return Ok(GradeReport::system_error("Failed to read the test file"));
            }
        };

        let Some(solution) = hints.solution.as_deref() else {
            return Ok(GradeReport::system_error(
                "The test file declares no SOLUTION directive",
            ));
        };

        Ok(evaluate(&hints, solution, code))
    }
}

fn evaluate(hints: &SolutionHints, solution: &str, code: &str) -> GradeReport {
    let matched = strip_whitespace(code).contains(&strip_whitespace(solution));
    let body = code_without_def_headers(code);

    let mut tests = vec![TestOutcome {
        index: 0,
        name: SOLUTION.to_string(),
        passed: matched,
        message: String::new(),
        raw: String::new(),
    }];

    let mut first_detected: Option<&DetectRule> = None;
    for (i, rule) in hints.rules.iter().enumerate() {
        // Detectors only explain a failure; a matched solution wins
        let triggered = !matched && body.contains(&rule.needle);
        if triggered {
            first_detected = first_detected.or(Some(rule));
        }
        tests.push(TestOutcome {
            index: i as i64 + 1,
            name: rule.key.clone(),
            passed: !triggered,
            message: if triggered {
                rule.message.clone()
            } else {
                String::new()
            },
            raw: String::new(),
        });
    }

    let (verdict, message) = if matched {
        (Verdict::Passed, PASSED_MESSAGE.to_string())
    } else {
        let message = first_detected
            .map(|r| r.message.clone())
            .or_else(|| hints.failure_message.clone())
            .unwrap_or_else(|| DEFAULT_FAILURE.to_string());
        tests[0].message = message.clone();
        (Verdict::Failed, message)
    };

    GradeReport {
        verdict,
        message,
        execution_time_ms: None,
        tests,
    }
}

fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

/// The code with `def name(...):` signatures removed, so a function's own
/// signature is not mistaken for a call to it. A body written on the same
/// line as its signature is kept.
fn code_without_def_headers(code: &str) -> String {
    DEF_SIGNATURE.replace_all(code, "$indent").into_owned()
}
