use std::path::PathBuf;
use std::sync::Arc;

use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::config::GraderConfig;
use crate::database as db;
use crate::grader::{GradeReport, Grader, create_grader};
use crate::models::{SubmissionRecord, SubmissionState};
use crate::queue::{GradeMessage, SubmissionQueue};

pub async fn worker(
    id: u8,
    grader_config: Arc<GraderConfig>,
    db_pool: SqlitePool,
    queue: Arc<SubmissionQueue>,
    token: CancellationToken,
) -> anyhow::Result<()> {
    let grader: Arc<dyn Grader> = Arc::from(create_grader(id, &grader_config)?);
    log::info!("Worker {id} initialized");

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                log::info!("Worker {id} received shutdown signal, stopping");
                break;
            }

            message = queue.pop() => {
                process_message(id, message, grader.clone(), &db_pool).await;
            }
        };
    }

    log::info!("Worker {id} has shut down gracefully");
    Ok(())
}

async fn process_message(
    id: u8,
    message: GradeMessage,
    grader: Arc<dyn Grader>,
    db_pool: &SqlitePool,
) {
    let submission_id = message.id();

    // 1. Load the submission and the test file of its assignment
    let submission = match db::fetch_submission(submission_id, db_pool).await {
        Ok(submission) => submission,
        Err(e) => {
            log::error!("Failed to fetch submission {submission_id}, discarded: {e}");
            return;
        }
    };
    let test_file = match db::fetch_assignment(submission.assignment_id, db_pool).await {
        Ok(Some(assignment)) => assignment.test_file.map(PathBuf::from),
        Ok(None) => {
            log::error!(
                "Assignment {} of submission {submission_id} no longer exists, discarded",
                submission.assignment_id
            );
            return;
        }
        Err(e) => {
            log::error!("Failed to fetch assignment of submission {submission_id}: {e}");
            return;
        }
    };
    log::info!("Worker {id} got submission {submission_id} from queue");

    // 2. Mark it running
    if let Err(e) = db::update_submission_to_running(submission_id, db_pool).await {
        log::error!("Failed to update submission {submission_id} to Running: {e}");
        return;
    }

    // 3. Grade on a blocking thread
    let code = submission.code.clone();
    let handle = tokio::task::spawn_blocking(move || match test_file {
        Some(path) => grader.grade(&code, &path),
        None => Ok(GradeReport::system_error("The assignment has no test file")),
    });

    let report = match handle.await {
        Ok(Ok(report)) => report,
        Ok(Err(e)) => {
            log::error!("Grading submission {submission_id} failed on worker {id}: {e:#}");
            GradeReport::system_error("The grader failed unexpectedly")
        }
        Err(e) => {
            log::error!("Grading task for submission {submission_id} panicked on worker {id}: {e}");
            GradeReport::system_error("The grader failed unexpectedly")
        }
    };
    log::info!(
        "Submission {submission_id} graded on worker {id}: {:?}",
        report.verdict
    );

    // 4. Persist and answer a waiting request
    let record = apply_report(submission, report);
    let saved = match db::save_result(&record, db_pool).await {
        Ok(()) => Some(record),
        Err(e) => {
            log::error!("Failed to save submission {submission_id} result: {e}");
            save_system_error(record, db_pool).await
        }
    };

    if let GradeMessage::Blocking { responder, .. } = message {
        let Some(record) = saved else {
            // Dropping the responder fails the waiting request
            log::warn!("No stored result for blocking submission {submission_id}");
            return;
        };
        if responder.send(record).is_err() {
            log::warn!("Failed to send submission {submission_id} result back to server");
        } else {
            log::debug!("Blocking submission {submission_id} result sent back from worker {id}");
        }
    }
}

/// Records a System Error verdict so the submission does not stay `Running`.
/// Returns the record as stored, or `None` if even that write failed.
async fn save_system_error(
    record: SubmissionRecord,
    db_pool: &SqlitePool,
) -> Option<SubmissionRecord> {
    let submission_id = record.id;
    let record = apply_report(
        record,
        GradeReport::system_error("Failed to save the grading result"),
    );

    match db::save_verdict(&record, db_pool).await {
        Ok(()) => Some(record),
        Err(e) => {
            log::error!("Failed to mark submission {submission_id} as System Error: {e}");
            None
        }
    }
}

/// Puts submissions interrupted by a restart back in the queue.
/// Rows caught `Running` are reset to `Queueing` first.
pub async fn requeue_unfinished(
    db_pool: &SqlitePool,
    queue: &SubmissionQueue,
) -> anyhow::Result<usize> {
    let ids = db::fetch_unfinished_submission_ids(db_pool).await?;

    for &submission_id in &ids {
        db::revert_submission_to_queueing(submission_id, db_pool).await?;
        queue
            .push(GradeMessage::FireAndForget { submission_id })
            .await;
        log::debug!("Requeued unfinished submission {submission_id}");
    }

    Ok(ids.len())
}

/// Folds a grade report into the submission record
pub fn apply_report(mut submission: SubmissionRecord, report: GradeReport) -> SubmissionRecord {
    submission.state = SubmissionState::Finished;
    submission.is_successful = Some(report.is_successful());
    submission.verdict = report.verdict;
    submission.message = report.message;
    submission.execution_time_ms = report.execution_time_ms;
    submission.tests = report.tests;
    submission.updated_time = crate::create_timestamp();
    submission
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Verdict;

    #[test]
    fn test_apply_report_marks_finished() {
        let submission = SubmissionRecord {
            id: 1,
            assignment_id: 2,
            student_id: 3,
            code: "print(1)".to_string(),
            state: SubmissionState::Running,
            verdict: Verdict::Running,
            is_successful: None,
            message: String::new(),
            execution_time_ms: None,
            teacher_comment: None,
            submitted_time: crate::create_timestamp(),
            updated_time: crate::create_timestamp(),
            tests: Vec::new(),
        };
        let report = GradeReport {
            verdict: Verdict::Failed,
            message: "1 of 1 tests failed".to_string(),
            execution_time_ms: Some(40),
            tests: Vec::new(),
        };

        let record = apply_report(submission, report);
        assert_eq!(record.state, SubmissionState::Finished);
        assert_eq!(record.is_successful, Some(false));
        assert_eq!(record.execution_time_ms, Some(40));
    }
}
