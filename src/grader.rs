mod hints;
mod pytest;
mod report;
mod runner;

use hints::HintGrader;
use pytest::PytestGrader;
pub use report::{PytestSummary, parse_pytest_output};
pub use runner::Grader;

use anyhow::Result;

use crate::config::{GraderConfig, GraderMode};
use crate::models::{TestOutcome, Verdict};

/// Outcome of grading one submission
#[derive(Debug, Clone)]
pub struct GradeReport {
    pub verdict: Verdict,
    pub message: String,
    pub execution_time_ms: Option<i64>,
    pub tests: Vec<TestOutcome>,
}

impl GradeReport {
    pub fn is_successful(&self) -> bool {
        self.verdict == Verdict::Passed
    }

    pub(crate) fn system_error(message: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::SystemError,
            message: message.into(),
            execution_time_ms: None,
            tests: Vec::new(),
        }
    }
}

pub const PASSED_MESSAGE: &str = "All tests passed";

/// Creates the grader selected by configuration
pub fn create_grader(id: u8, config: &GraderConfig) -> Result<Box<dyn Grader>> {
    match config.mode {
        GraderMode::Pytest => {
            log::info!("Creating PytestGrader {id} ({})", config.python());
            let grader = PytestGrader::build(id, config)?;
            Ok(Box::new(grader))
        }
        GraderMode::Hints => {
            log::info!("Creating HintGrader {id}");
            Ok(Box::new(HintGrader::new()))
        }
    }
}
