use actix_web::{HttpResponse, delete, get, post, put, web};
use serde::Deserialize;
use sqlx::sqlite::SqlitePool;
use tokio::sync::oneshot;

use super::{AppSettings, ensure_can_view, ensure_owner, find_assignment};
use crate::auth::{CurrentUser, TeacherUser};
use crate::database as db;
use crate::error::{ApiError, ApiResult};
use crate::models::{ReviewStatus, SubmissionRecord, SubmissionState};
use crate::queue::{GradeMessage, SubmissionQueue};

#[derive(Deserialize)]
pub struct SubmissionRequest {
    pub code: String,
}

#[derive(Deserialize)]
pub struct ReviewRequest {
    #[serde(default)]
    pub comment: String,
    pub status: ReviewStatus,
}

async fn find_submission(submission_id: i64, pool: &SqlitePool) -> ApiResult<SubmissionRecord> {
    match db::fetch_submission(submission_id, pool).await {
        Ok(record) => Ok(record),
        Err(sqlx::Error::RowNotFound) => Err(ApiError::not_found("Submission", submission_id)),
        Err(e) => Err(e.into()),
    }
}

/// Queues a submission. In blocking mode waits for the worker's result,
/// otherwise hands back the queued record as is.
async fn dispatch_submission(
    record: SubmissionRecord,
    queue: &SubmissionQueue,
    blocking: bool,
) -> ApiResult<SubmissionRecord> {
    let submission_id = record.id;

    if !blocking {
        if !queue
            .push(GradeMessage::FireAndForget { submission_id })
            .await
        {
            return Err(ApiError::Conflict(format!(
                "Submission {submission_id} is already queued."
            )));
        }
        log::debug!("Sent non-blocking submission {submission_id} to queue");
        return Ok(record);
    }

    let (tx, rx) = oneshot::channel::<SubmissionRecord>();
    let message = GradeMessage::Blocking {
        submission_id,
        responder: tx,
    };
    if !queue.push(message).await {
        return Err(ApiError::Conflict(format!(
            "Submission {submission_id} is already queued."
        )));
    }
    log::debug!("Sent blocking submission {submission_id} to queue");

    match rx.await {
        Ok(result) => {
            log::info!("Received final result of blocking submission {}", result.id);
            Ok(result)
        }
        Err(e) => Err(ApiError::Internal(format!(
            "Failed to receive result of submission {submission_id}: {e}"
        ))),
    }
}

#[post("/assignments/{id}/submissions")]
pub async fn post_submission_handler(
    pool: web::Data<SqlitePool>,
    queue: web::Data<SubmissionQueue>,
    settings: web::Data<AppSettings>,
    current: CurrentUser,
    path: web::Path<(i64,)>,
    body: web::Json<SubmissionRequest>,
) -> ApiResult<HttpResponse> {
    let user = &current.user;
    if user.is_teacher() {
        return Err(ApiError::Forbidden);
    }

    let (assignment, _, course) = find_assignment(path.into_inner().0, &pool).await?;
    ensure_can_view(user, &course, &pool).await?;

    if !assignment.kind.is_code() {
        return Err(ApiError::InvalidState(format!(
            "Assignment {} does not accept code submissions.",
            assignment.id
        )));
    }
    if body.code.trim().is_empty() {
        return Err(ApiError::InvalidArgument("code must not be empty".to_string()));
    }

    let record = db::create_submission(assignment.id, user.id, &body.code, &pool).await?;
    log::info!(
        "Inserted submission {} of student {} for assignment {}",
        record.id,
        user.id,
        assignment.id
    );

    let record = dispatch_submission(record, &queue, settings.blocking).await?;
    Ok(HttpResponse::Created().json(record))
}

#[get("/assignments/{id}/submissions")]
pub async fn get_assignment_submissions_handler(
    pool: web::Data<SqlitePool>,
    current: CurrentUser,
    path: web::Path<(i64,)>,
) -> ApiResult<HttpResponse> {
    let (assignment, _, course) = find_assignment(path.into_inner().0, &pool).await?;
    let user = &current.user;
    ensure_can_view(user, &course, &pool).await?;

    let student_filter = (!user.is_teacher()).then_some(user.id);
    let records = db::fetch_assignment_submissions(assignment.id, student_filter, &pool).await?;

    Ok(HttpResponse::Ok().json(records))
}

#[get("/submissions/{id}")]
pub async fn get_submission_handler(
    pool: web::Data<SqlitePool>,
    current: CurrentUser,
    path: web::Path<(i64,)>,
) -> ApiResult<HttpResponse> {
    let record = find_submission(path.into_inner().0, &pool).await?;
    let user = &current.user;

    if user.is_teacher() {
        let (_, _, course) = find_assignment(record.assignment_id, &pool).await?;
        ensure_owner(user, &course)?;
    } else if record.student_id != user.id {
        return Err(ApiError::Forbidden);
    }

    Ok(HttpResponse::Ok().json(record))
}

#[put("/submissions/{id}/review")]
pub async fn review_submission_handler(
    pool: web::Data<SqlitePool>,
    teacher: TeacherUser,
    path: web::Path<(i64,)>,
    body: web::Json<ReviewRequest>,
) -> ApiResult<HttpResponse> {
    let record = find_submission(path.into_inner().0, &pool).await?;
    let (_, _, course) = find_assignment(record.assignment_id, &pool).await?;
    ensure_owner(&teacher.0, &course)?;

    // A grading still to come would overwrite the review
    if record.state != SubmissionState::Finished {
        return Err(ApiError::InvalidState(format!(
            "Submission {} not finished.",
            record.id
        )));
    }

    db::save_review(record.id, body.comment.trim(), body.status, &pool).await?;
    log::info!(
        "Teacher {} reviewed submission {} as {:?}",
        teacher.0.id,
        record.id,
        body.status
    );

    let record = find_submission(record.id, &pool).await?;
    Ok(HttpResponse::Ok().json(record))
}

#[delete("/submissions/{id}")]
pub async fn delete_submission_handler(
    pool: web::Data<SqlitePool>,
    queue: web::Data<SubmissionQueue>,
    current: CurrentUser,
    path: web::Path<(i64,)>,
) -> ApiResult<HttpResponse> {
    let record = find_submission(path.into_inner().0, &pool).await?;
    if record.student_id != current.user.id {
        return Err(ApiError::Forbidden);
    }

    if record.state != SubmissionState::Queueing || !queue.cancel(record.id).await {
        return Err(ApiError::InvalidState(format!(
            "Submission {} not queueing.",
            record.id
        )));
    }

    db::update_submission_to_canceled(record.id, &pool).await?;
    log::info!("Submission {} canceled by its student", record.id);

    let record = find_submission(record.id, &pool).await?;
    Ok(HttpResponse::Ok().json(record))
}

#[put("/submissions/{id}")]
pub async fn put_submission_handler(
    pool: web::Data<SqlitePool>,
    queue: web::Data<SubmissionQueue>,
    settings: web::Data<AppSettings>,
    teacher: TeacherUser,
    path: web::Path<(i64,)>,
) -> ApiResult<HttpResponse> {
    let record = find_submission(path.into_inner().0, &pool).await?;
    let (_, _, course) = find_assignment(record.assignment_id, &pool).await?;
    ensure_owner(&teacher.0, &course)?;

    if !matches!(
        record.state,
        SubmissionState::Finished | SubmissionState::Canceled
    ) {
        log::info!(
            "Regraded nothing because submission {} was in state {:?}",
            record.id,
            record.state
        );
        return Err(ApiError::InvalidState(format!(
            "Submission {} not finished.",
            record.id
        )));
    }

    db::revert_submission_to_queueing(record.id, &pool).await?;
    let record = find_submission(record.id, &pool).await?;
    log::info!("Submission {} queued for regrading", record.id);

    let record = dispatch_submission(record, &queue, settings.blocking).await?;
    Ok(HttpResponse::Ok().json(record))
}
