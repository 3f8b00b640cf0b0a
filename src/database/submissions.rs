use serde::Serialize;
use sqlx::sqlite::SqlitePool;

use crate::create_timestamp;
use crate::models::{ReviewStatus, SubmissionRecord, SubmissionState, TestOutcome, Verdict};

const SUBMISSION_COLUMNS: &str = "id, assignment_id, student_id, code, state, verdict, \
     is_successful, message, execution_time_ms, teacher_comment, submitted_time, updated_time";

#[derive(sqlx::FromRow)]
struct SubmissionRow {
    id: i64,
    assignment_id: i64,
    student_id: i64,
    code: String,
    state: SubmissionState,
    verdict: Verdict,
    is_successful: Option<bool>,
    message: String,
    execution_time_ms: Option<i64>,
    teacher_comment: Option<String>,
    submitted_time: String,
    updated_time: String,
}

impl SubmissionRow {
    fn into_record(self, tests: Vec<TestOutcome>) -> SubmissionRecord {
        SubmissionRecord {
            id: self.id,
            assignment_id: self.assignment_id,
            student_id: self.student_id,
            code: self.code,
            state: self.state,
            verdict: self.verdict,
            is_successful: self.is_successful,
            message: self.message,
            execution_time_ms: self.execution_time_ms,
            teacher_comment: self.teacher_comment,
            submitted_time: self.submitted_time,
            updated_time: self.updated_time,
            tests,
        }
    }
}

/// Inserts a new queued submission and returns its record
pub async fn create_submission(
    assignment_id: i64,
    student_id: i64,
    code: &str,
    pool: &SqlitePool,
) -> sqlx::Result<SubmissionRecord> {
    let now = create_timestamp();

    let id = sqlx::query(
        r#"
        INSERT INTO submissions (assignment_id, student_id, code, state, verdict, message, submitted_time, updated_time)
        VALUES (?, ?, ?, ?, ?, '', ?, ?)
        "#,
    )
    .bind(assignment_id)
    .bind(student_id)
    .bind(code)
    .bind(SubmissionState::Queueing)
    .bind(Verdict::Waiting)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?
    .last_insert_rowid();

    Ok(SubmissionRecord {
        id,
        assignment_id,
        student_id,
        code: code.to_string(),
        state: SubmissionState::Queueing,
        verdict: Verdict::Waiting,
        is_successful: None,
        message: String::new(),
        execution_time_ms: None,
        teacher_comment: None,
        submitted_time: now.clone(),
        updated_time: now,
        tests: Vec::new(),
    })
}

pub async fn fetch_submission(id: i64, pool: &SqlitePool) -> sqlx::Result<SubmissionRecord> {
    log::debug!("Trying to fetch submission {id} full record from database");

    let row = sqlx::query_as::<_, SubmissionRow>(&format!(
        "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = ?"
    ))
    .bind(id)
    .fetch_one(pool)
    .await?;

    let tests = sqlx::query_as::<_, TestOutcome>(
        r#"
        SELECT test_index AS "index", name, passed, message, raw
        FROM submission_tests
        WHERE submission_id = ?
        ORDER BY test_index
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(row.into_record(tests))
}

/// Submissions of an assignment, newest first. `student_id` narrows to one student.
pub async fn fetch_assignment_submissions(
    assignment_id: i64,
    student_id: Option<i64>,
    pool: &SqlitePool,
) -> sqlx::Result<Vec<SubmissionRecord>> {
    let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(format!(
        "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE assignment_id = "
    ));
    qb.push_bind(assignment_id);
    if let Some(student_id) = student_id {
        qb.push(" AND student_id = ").push_bind(student_id);
    }
    qb.push(" ORDER BY submitted_time DESC, id DESC");

    let rows = qb
        .build_query_as::<SubmissionRow>()
        .fetch_all(pool)
        .await?;

    // History listings leave per-test details to the detail endpoint
    Ok(rows.into_iter().map(|r| r.into_record(Vec::new())).collect())
}

#[derive(Serialize, sqlx::FromRow, Debug)]
pub struct HistoryEntry {
    pub id: i64,
    pub submitted_time: String,
    #[serde(skip_serializing)]
    pub is_successful: Option<bool>,
    #[sqlx(skip)]
    pub status: Option<ReviewStatus>,
    pub verdict: Verdict,
    pub student_id: i64,
    pub student_name: String,
    pub assignment_id: i64,
    pub assignment_title: String,
}

/// Every submission in a course, newest first
pub async fn fetch_course_history(
    course_id: i64,
    pool: &SqlitePool,
) -> sqlx::Result<Vec<HistoryEntry>> {
    let mut entries = sqlx::query_as::<_, HistoryEntry>(
        r#"
        SELECT s.id, s.submitted_time, s.is_successful, s.verdict,
               u.id AS student_id, u.last_name || ', ' || u.name AS student_name,
               a.id AS assignment_id, a.title AS assignment_title
        FROM submissions s
        JOIN users u ON s.student_id = u.id
        JOIN assignments a ON s.assignment_id = a.id
        JOIN modules m ON a.module_id = m.id
        WHERE m.course_id = ?
        ORDER BY s.submitted_time DESC, s.id DESC
        "#,
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;

    for entry in &mut entries {
        entry.status = Some(ReviewStatus::from_success(entry.is_successful));
    }

    Ok(entries)
}

pub async fn update_submission_to_running(id: i64, pool: &SqlitePool) -> sqlx::Result<()> {
    sqlx::query("UPDATE submissions SET state = ?, verdict = ?, updated_time = ? WHERE id = ?")
        .bind(SubmissionState::Running)
        .bind(Verdict::Running)
        .bind(create_timestamp())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn update_submission_to_canceled(id: i64, pool: &SqlitePool) -> sqlx::Result<()> {
    sqlx::query("UPDATE submissions SET state = ?, verdict = ?, updated_time = ? WHERE id = ?")
        .bind(SubmissionState::Canceled)
        .bind(Verdict::Skipped)
        .bind(create_timestamp())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Submissions left in `Queueing` or `Running`, oldest first
pub async fn fetch_unfinished_submission_ids(pool: &SqlitePool) -> sqlx::Result<Vec<i64>> {
    sqlx::query_scalar::<_, i64>(
        "SELECT id FROM submissions WHERE state IN (?, ?) ORDER BY submitted_time, id",
    )
        .bind(SubmissionState::Queueing)
        .bind(SubmissionState::Running)
        .fetch_all(pool)
        .await
}

/// Resets a graded submission so it can be queued again
pub async fn revert_submission_to_queueing(id: i64, pool: &SqlitePool) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE submissions
        SET state = ?, verdict = ?, is_successful = NULL, message = '',
            execution_time_ms = NULL, updated_time = ?
        WHERE id = ?
        "#,
    )
    .bind(SubmissionState::Queueing)
    .bind(Verdict::Waiting)
    .bind(create_timestamp())
    .bind(id)
    .execute(tx.as_mut())
    .await?;

    sqlx::query("DELETE FROM submission_tests WHERE submission_id = ?")
        .bind(id)
        .execute(tx.as_mut())
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Persists a graded submission together with its per-test outcomes.
/// A successful result also completes the assignment for the student.
pub async fn save_result(result: &SubmissionRecord, pool: &SqlitePool) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE submissions
        SET state = ?, verdict = ?, is_successful = ?, message = ?, execution_time_ms = ?, updated_time = ?
        WHERE id = ?
        "#,
    )
    .bind(result.state)
    .bind(result.verdict)
    .bind(result.is_successful)
    .bind(&result.message)
    .bind(result.execution_time_ms)
    .bind(&result.updated_time)
    .bind(result.id)
    .execute(tx.as_mut())
    .await?;

    sqlx::query("DELETE FROM submission_tests WHERE submission_id = ?")
        .bind(result.id)
        .execute(tx.as_mut())
        .await?;

    for test in &result.tests {
        sqlx::query(
            r#"
            INSERT INTO submission_tests (submission_id, test_index, name, passed, message, raw)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(result.id)
        .bind(test.index)
        .bind(&test.name)
        .bind(test.passed)
        .bind(&test.message)
        .bind(&test.raw)
        .execute(tx.as_mut())
        .await?;
    }

    if result.is_successful == Some(true) {
        super::mark_completed(result.student_id, result.assignment_id, tx.as_mut()).await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Writes only the verdict columns of a result, leaving per-test rows alone.
/// Used when the full `save_result` failed.
pub async fn save_verdict(result: &SubmissionRecord, pool: &SqlitePool) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        UPDATE submissions
        SET state = ?, verdict = ?, is_successful = ?, message = ?, execution_time_ms = ?, updated_time = ?
        WHERE id = ?
        "#,
    )
    .bind(result.state)
    .bind(result.verdict)
    .bind(result.is_successful)
    .bind(&result.message)
    .bind(result.execution_time_ms)
    .bind(&result.updated_time)
    .bind(result.id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Stores a teacher review; approving also completes the assignment
pub async fn save_review(
    id: i64,
    comment: &str,
    status: ReviewStatus,
    pool: &SqlitePool,
) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;

    let (student_id, assignment_id): (i64, i64) = sqlx::query_as(
        r#"
        UPDATE submissions
        SET teacher_comment = ?, is_successful = ?, updated_time = ?
        WHERE id = ?
        RETURNING student_id, assignment_id
        "#,
    )
    .bind(comment)
    .bind(status.to_success())
    .bind(create_timestamp())
    .bind(id)
    .fetch_one(tx.as_mut())
    .await?;

    if status == ReviewStatus::Approved {
        super::mark_completed(student_id, assignment_id, tx.as_mut()).await?;
    }

    tx.commit().await?;
    Ok(())
}
