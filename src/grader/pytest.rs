use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use tokio::time::timeout;

use crate::config::GraderConfig;
use crate::models::Verdict;

use super::report::parse_pytest_output;
use super::{GradeReport, Grader, PASSED_MESSAGE};

/// Runs the teacher's test file with pytest against the submitted code.
///
/// Each run gets a fresh directory holding the student's code (under the
/// configured solution file name, so the test file can import it) and a
/// copy of the test file. The only limit enforced is wall time: the child
/// is killed when the timeout expires. There is no memory, file system or
/// permission isolation.
pub struct PytestGrader {
    id: u8,
    work_dir: PathBuf,
    python: String,
    solution_file: String,
    timeout: Duration,
}

impl PytestGrader {
    pub fn build(id: u8, config: &GraderConfig) -> Result<Self> {
        let work_dir = config.work_dir().join(id.to_string());
        fs::create_dir_all(&work_dir)?;

        log::warn!("PytestGrader provides NO sandboxing - student code runs with service privileges");

        Ok(Self {
            id,
            work_dir,
            python: config.python().to_string(),
            solution_file: config.solution_file().to_string(),
            timeout: Duration::from_millis(config.timeout_ms()),
        })
    }

    /// Creates the per-run directory with the solution and the test file
    fn prepare_run_dir(&self, code: &str, test_file: &Path) -> Result<(PathBuf, String)> {
        let run_dir = self.work_dir.join(uuid::Uuid::new_v4().to_string());
        fs::create_dir_all(&run_dir)?;

        fs::write(run_dir.join(&self.solution_file), format!("{code}\n"))?;

        let test_name = test_file
            .file_name()
            .ok_or_else(|| anyhow!("Test file path {} has no file name", test_file.display()))?
            .to_string_lossy()
            .into_owned();
        fs::copy(test_file, run_dir.join(&test_name))?;

        Ok((run_dir, test_name))
    }

    async fn execute_pytest_async(&self, run_dir: &Path, test_name: &str) -> Result<Output> {
        let output = tokio::process::Command::new(&self.python)
            .args([
                "-m",
                "pytest",
                "-v",
                "-rA",
                "--tb=short",
                "-p",
                "no:cacheprovider",
                test_name,
            ])
            .current_dir(run_dir)
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(output)
    }

    fn cleanup_run_dir(&self, run_dir: &Path) {
        if let Err(e) = fs::remove_dir_all(run_dir) {
            log::warn!(
                "Grader {} failed to remove run directory {}: {e}",
                self.id,
                run_dir.display()
            );
        }
    }
}

impl Grader for PytestGrader {
    fn grade(&self, code: &str, test_file: &Path) -> Result<GradeReport> {
        let (run_dir, test_name) = match self.prepare_run_dir(code, test_file) {
            Ok(prepared) => prepared,
            Err(e) => {
                log::error!("Grader {} could not prepare run: {e:#}", self.id);
                return Ok(GradeReport::system_error(format!("Failed to prepare test run: {e}")));
            }
        };

        let start_time = Instant::now();
        let execution = tokio::runtime::Handle::current().block_on(async {
            timeout(self.timeout, self.execute_pytest_async(&run_dir, &test_name)).await
        });
        let elapsed_ms = start_time.elapsed().as_millis() as i64;

        self.cleanup_run_dir(&run_dir);

        let report = match execution {
            Ok(Ok(output)) => interpret_output(&output, elapsed_ms),
            Ok(Err(e)) => {
                log::error!("Grader {} failed to run {}: {e}", self.id, self.python);
                GradeReport::system_error(format!("Failed to start test runner: {e}"))
            }
            Err(_) => GradeReport {
                verdict: Verdict::TimeLimitExceeded,
                message: format!(
                    "Execution timed out after {} ms",
                    self.timeout.as_millis()
                ),
                execution_time_ms: Some(elapsed_ms),
                tests: Vec::new(),
            },
        };

        Ok(report)
    }
}

/// Maps pytest's exit code and output to a report
fn interpret_output(output: &Output, elapsed_ms: i64) -> GradeReport {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let summary = parse_pytest_output(&stdout);

    if stderr.contains("No module named pytest") {
        return GradeReport::system_error("pytest is not installed for the configured interpreter");
    }

    let (verdict, message) = match output.status.code() {
        Some(0) => (Verdict::Passed, PASSED_MESSAGE.to_string()),
        Some(1) if !summary.tests.is_empty() => {
            let failing = summary.tests.iter().filter(|t| !t.passed).count();
            (
                Verdict::Failed,
                format!("{failing} of {} tests failed", summary.tests.len()),
            )
        }
        Some(5) => (Verdict::Error, "No tests were collected".to_string()),
        Some(_) => (
            Verdict::Error,
            summary
                .collection_error
                .clone()
                .or_else(|| last_line(&stderr))
                .unwrap_or_else(|| "Test run failed".to_string()),
        ),
        None => (Verdict::Error, "Test process was terminated".to_string()),
    };

    GradeReport {
        verdict,
        message,
        execution_time_ms: Some(elapsed_ms),
        tests: summary.tests,
    }
}

fn last_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .map(str::to_string)
}
