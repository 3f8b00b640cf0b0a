use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

use crate::models::TestOutcome;

lazy_static! {
    /// `test_file.py::Class::test_name PASSED   [ 50%]`
    static ref RESULT_LINE: Regex = Regex::new(
        r"^(?P<nodeid>\S+?::\S+)\s+(?P<outcome>PASSED|FAILED|ERROR|SKIPPED|XFAIL|XPASS)\b"
    )
    .unwrap();
    /// `=== FAILURES ===`
    static ref BLOCK_HEADER: Regex = Regex::new(r"^={3,} (?P<title>.+?) ={3,}$").unwrap();
    /// `___ Class.test_name ___`
    static ref SECTION_HEADER: Regex = Regex::new(r"^_{3,} (?P<title>.+?) _{3,}$").unwrap();
    static ref SUMMARY_COUNT: Regex =
        Regex::new(r"(?P<count>\d+) (?P<kind>passed|failed|errors?|skipped|xfailed|xpassed)")
            .unwrap();
}

/// Parsed view of a `pytest -v -rA --tb=short` run
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PytestSummary {
    pub tests: Vec<TestOutcome>,
    pub passed: u32,
    pub failed: u32,
    pub errors: u32,
    pub skipped: u32,
    /// Last `E ` line of a collection error section, e.g. a syntax error
    pub collection_error: Option<String>,
}

impl PytestSummary {
    pub fn total(&self) -> u32 {
        self.passed + self.failed + self.errors
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Block {
    Results,
    Failures,
    Errors,
    Other,
}

/// Extracts per-test outcomes and the final counts from pytest's verbose output
pub fn parse_pytest_output(output: &str) -> PytestSummary {
    let mut summary = PytestSummary::default();
    let mut sections: HashMap<String, Vec<&str>> = HashMap::new();
    let mut block = Block::Results;
    let mut current_section: Option<String> = None;

    for line in output.lines() {
        if let Some(caps) = BLOCK_HEADER.captures(line) {
            let title = &caps["title"];
            current_section = None;
            block = match title {
                "test session starts" => Block::Results,
                "FAILURES" => Block::Failures,
                "ERRORS" => Block::Errors,
                _ => Block::Other,
            };
            if title.contains(" in ") {
                parse_counts(title, &mut summary);
            }
            continue;
        }

        match block {
            Block::Results => {
                if let Some(caps) = RESULT_LINE.captures(line) {
                    let outcome = &caps["outcome"];
                    if matches!(outcome, "SKIPPED" | "XFAIL") {
                        continue;
                    }
                    summary.tests.push(TestOutcome {
                        index: summary.tests.len() as i64,
                        name: display_name(&caps["nodeid"]),
                        passed: matches!(outcome, "PASSED" | "XPASS"),
                        message: String::new(),
                        raw: String::new(),
                    });
                }
            }
            Block::Failures | Block::Errors => {
                if let Some(caps) = SECTION_HEADER.captures(line) {
                    let title = caps["title"].to_string();
                    sections.entry(title.clone()).or_default();
                    current_section = Some(title);
                } else if let Some(title) = &current_section {
                    sections.entry(title.clone()).or_default().push(line);
                }
            }
            Block::Other => {}
        }
    }

    for (title, lines) in &sections {
        if title.starts_with("ERROR collecting") {
            let message = error_lines(lines).last().map(|l| l.to_string());
            if message.is_some() {
                summary.collection_error = message;
            }
            continue;
        }

        // Error sections read `ERROR at setup of Class.test`
        let test_name = title.rsplit(' ').next().unwrap_or(title);
        if let Some(test) = summary
            .tests
            .iter_mut()
            .find(|t| !t.passed && t.name == test_name)
        {
            test.message = error_lines(lines).next().unwrap_or_default().to_string();
            test.raw = lines.join("\n").trim().to_string();
        }
    }

    summary
}

/// `test_x.py::TestX::test_y` becomes `TestX.test_y`
fn display_name(nodeid: &str) -> String {
    let tail = nodeid.split_once("::").map_or(nodeid, |(_, tail)| tail);
    tail.replace("::", ".")
}

fn error_lines<'a>(lines: &'a [&'a str]) -> impl Iterator<Item = &'a str> + 'a {
    lines
        .iter()
        .filter_map(|l| l.strip_prefix("E "))
        .map(str::trim)
        .filter(|l| !l.is_empty())
}

fn parse_counts(summary_line: &str, summary: &mut PytestSummary) {
    for caps in SUMMARY_COUNT.captures_iter(summary_line) {
        let count: u32 = caps["count"].parse().unwrap_or(0);
        match &caps["kind"] {
            "passed" => summary.passed = count,
            "failed" => summary.failed = count,
            "error" | "errors" => summary.errors = count,
            "skipped" => summary.skipped = count,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MIXED_RUN: &str = "\
============================= test session starts ==============================
collecting ... collected 3 items

test_es_primo.py::TestEsPrimo::test_casos_limite PASSED                  [ 33%]
test_es_primo.py::TestEsPrimo::test_numeros_no_primos FAILED             [ 66%]
test_es_primo.py::TestEsPrimo::test_numeros_primos PASSED                [100%]

=================================== FAILURES ===================================
_____________________ TestEsPrimo.test_numeros_no_primos ______________________
test_es_primo.py:17: in test_numeros_no_primos
    self.assertFalse(es_primo(1), \"1 is not prime.\")
E   AssertionError: True is not false : 1 is not prime.
==================================== PASSES ====================================
=========================== short test summary info ============================
PASSED test_es_primo.py::TestEsPrimo::test_casos_limite
FAILED test_es_primo.py::TestEsPrimo::test_numeros_no_primos - AssertionError
PASSED test_es_primo.py::TestEsPrimo::test_numeros_primos
========================= 1 failed, 2 passed in 0.03s ==========================
";

    const SYNTAX_ERROR_RUN: &str = "\
============================= test session starts ==============================
collecting ... collected 0 items / 1 error

==================================== ERRORS ====================================
_____________________ ERROR collecting test_suma.py ______________________
test_suma.py:2: in <module>
    from main_solution import sumar
E     File \"/tmp/campus-grader/1/main_solution.py\", line 1
E       def sumar(a, b)
E                      ^
E   SyntaxError: expected ':'
=========================== short test summary info ============================
ERROR test_suma.py
!!!!!!!!!!!!!!!!!!!! Interrupted: 1 error during collection !!!!!!!!!!!!!!!!!!!!
=============================== 1 error in 0.05s ===============================
";

    #[test]
    fn test_parse_mixed_run() {
        let summary = parse_pytest_output(MIXED_RUN);

        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.tests.len(), 3);

        assert_eq!(summary.tests[0].name, "TestEsPrimo.test_casos_limite");
        assert!(summary.tests[0].passed);

        let failed = &summary.tests[1];
        assert_eq!(failed.name, "TestEsPrimo.test_numeros_no_primos");
        assert!(!failed.passed);
        assert_eq!(
            failed.message,
            "AssertionError: True is not false : 1 is not prime."
        );
        assert!(failed.raw.starts_with("test_es_primo.py:17"));
        assert_eq!(summary.collection_error, None);
    }

    #[test]
    fn test_parse_collection_error() {
        let summary = parse_pytest_output(SYNTAX_ERROR_RUN);

        assert!(summary.tests.is_empty());
        assert_eq!(summary.errors, 1);
        assert_eq!(
            summary.collection_error.as_deref(),
            Some("SyntaxError: expected ':'")
        );
    }

    #[test]
    fn test_function_level_node_ids() {
        let output = "test_sum.py::test_positive PASSED [ 50%]\n\
                      test_sum.py::test_negative[-1--1] PASSED [100%]\n\
                      ============ 2 passed in 0.01s ============\n";
        let summary = parse_pytest_output(output);

        assert_eq!(summary.passed, 2);
        assert_eq!(summary.tests[0].name, "test_positive");
        assert_eq!(summary.tests[1].name, "test_negative[-1--1]");
    }
}
