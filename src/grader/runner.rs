use std::path::Path;

use anyhow::Result;

use super::GradeReport;

/// Grades submitted Python code against a teacher's test file.
///
/// Implementations are called from a blocking thread and may block on
/// subprocesses. Failures of the student's code are reported in the
/// returned `GradeReport`; `Err` is reserved for failures of the grader
/// itself.
pub trait Grader: Send + Sync {
    fn grade(&self, code: &str, test_file: &Path) -> Result<GradeReport>;
}
