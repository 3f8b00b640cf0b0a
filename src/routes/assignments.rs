use std::path::{Path, PathBuf};

use actix_web::{HttpResponse, delete, get, post, web};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use tokio::io::AsyncWriteExt;

use super::{AppSettings, ensure_can_view, ensure_owner, find_assignment, find_module, required_text};
use crate::auth::{CurrentUser, TeacherUser};
use crate::database::{self as db, NewAssignment};
use crate::error::{ApiError, ApiResult};
use crate::models::{Assignment, AssignmentKind, ResourceKind, SubmissionRecord};
use crate::slugify;

#[derive(Deserialize)]
pub struct TestFileUpload {
    pub name: String,
    pub content: String,
}

#[derive(Deserialize)]
pub struct AssignmentRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub kind: AssignmentKind,
    pub test_file: Option<TestFileUpload>,
}

#[derive(Deserialize)]
pub struct ResourceRequest {
    pub title: String,
    pub url: String,
    pub kind: ResourceKind,
}

#[derive(Serialize)]
struct AssignmentDetail {
    #[serde(flatten)]
    assignment: Assignment,
    has_test_file: bool,
    module_title: String,
    course_id: i64,
    course_title: String,
    completed: bool,
    submissions: Vec<SubmissionRecord>,
}

/// Writes an uploaded test file as `<dir>/<slug>-<unix_millis>.py`
async fn store_test_file(dir: &Path, slug: &str, upload: &TestFileUpload) -> ApiResult<PathBuf> {
    if !upload.name.ends_with(".py") {
        return Err(ApiError::InvalidArgument(
            "test file must be a .py file".to_string(),
        ));
    }
    if upload.content.trim().is_empty() {
        return Err(ApiError::InvalidArgument("test file is empty".to_string()));
    }

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to create {}: {e}", dir.display())))?;

    let stem = format!("{slug}-{}", chrono::Utc::now().timestamp_millis());
    let path = write_new_file(dir, &stem, &upload.content)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to write test file {stem}: {e}")))?;
    log::debug!("Stored test file {} as {}", upload.name, path.display());

    Ok(path)
}

/// Creates `<stem>.py`, or `<stem>-1.py`, `<stem>-2.py`, ... when taken.
/// Never overwrites an existing file.
async fn write_new_file(dir: &Path, stem: &str, content: &str) -> std::io::Result<PathBuf> {
    let mut attempt = 0u32;
    loop {
        let path = match attempt {
            0 => dir.join(format!("{stem}.py")),
            n => dir.join(format!("{stem}-{n}.py")),
        };

        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(mut file) => {
                file.write_all(content.as_bytes()).await?;
                file.flush().await?;
                return Ok(path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e),
        }
    }
}

#[post("/modules/{id}/assignments")]
pub async fn post_assignment_handler(
    pool: web::Data<SqlitePool>,
    settings: web::Data<AppSettings>,
    teacher: TeacherUser,
    path: web::Path<(i64,)>,
    body: web::Json<AssignmentRequest>,
) -> ApiResult<HttpResponse> {
    let (module, course) = find_module(path.into_inner().0, &pool).await?;
    ensure_owner(&teacher.0, &course)?;

    let title = required_text("title", &body.title)?;
    let slug = slugify(&title);
    if slug.is_empty() {
        return Err(ApiError::InvalidArgument(
            "title must contain at least one letter or digit".to_string(),
        ));
    }

    // Lessons are never graded, so their uploads are dropped
    let test_file = match (&body.test_file, body.kind.is_code()) {
        (Some(upload), true) => Some(store_test_file(&settings.test_files_dir, &slug, upload).await?),
        (None, true) => {
            return Err(ApiError::InvalidArgument(format!(
                "a test file is required for {:?} assignments",
                body.kind
            )));
        }
        (_, false) => None,
    };
    let test_file = test_file.map(|p| p.to_string_lossy().into_owned());

    let new_assignment = NewAssignment {
        module_id: module.id,
        title: &title,
        slug: &slug,
        description: body.description.trim(),
        kind: body.kind,
        test_file: test_file.as_deref(),
    };
    let assignment = match db::create_assignment(&new_assignment, &pool).await {
        Ok(assignment) => assignment,
        Err(e) => {
            if let Some(path) = &test_file {
                remove_test_file(path).await;
            }
            return Err(e.into());
        }
    };
    log::info!(
        "Created {:?} assignment {} in module {}",
        assignment.kind,
        assignment.id,
        module.id
    );

    Ok(HttpResponse::Created().json(assignment))
}

#[get("/assignments/{id}")]
pub async fn get_assignment_handler(
    pool: web::Data<SqlitePool>,
    current: CurrentUser,
    path: web::Path<(i64,)>,
) -> ApiResult<HttpResponse> {
    let (assignment, module, course) = find_assignment(path.into_inner().0, &pool).await?;
    let user = &current.user;
    ensure_can_view(user, &course, &pool).await?;

    let student_filter = (!user.is_teacher()).then_some(user.id);
    let submissions = db::fetch_assignment_submissions(assignment.id, student_filter, &pool).await?;
    let completed = db::is_completed(user.id, assignment.id, &pool).await?;

    Ok(HttpResponse::Ok().json(AssignmentDetail {
        has_test_file: assignment.test_file.is_some(),
        assignment,
        module_title: module.title,
        course_id: course.id,
        course_title: course.title,
        completed,
        submissions,
    }))
}

async fn remove_test_file(path: &str) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        log::warn!("Failed to remove test file {path}: {e}");
    }
}

#[delete("/assignments/{id}")]
pub async fn delete_assignment_handler(
    pool: web::Data<SqlitePool>,
    teacher: TeacherUser,
    path: web::Path<(i64,)>,
) -> ApiResult<HttpResponse> {
    let (assignment, _, course) = find_assignment(path.into_inner().0, &pool).await?;
    ensure_owner(&teacher.0, &course)?;

    db::delete_assignment(assignment.id, &pool).await?;
    if let Some(path) = &assignment.test_file {
        remove_test_file(path).await;
    }
    log::info!("Deleted assignment {} of course {}", assignment.id, course.id);

    Ok(HttpResponse::NoContent().finish())
}

#[post("/assignments/{id}/resources")]
pub async fn post_resource_handler(
    pool: web::Data<SqlitePool>,
    teacher: TeacherUser,
    path: web::Path<(i64,)>,
    body: web::Json<ResourceRequest>,
) -> ApiResult<HttpResponse> {
    let (assignment, _, course) = find_assignment(path.into_inner().0, &pool).await?;
    ensure_owner(&teacher.0, &course)?;

    let title = required_text("title", &body.title)?;
    let url = body.url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ApiError::InvalidArgument(
            "url must start with http:// or https://".to_string(),
        ));
    }

    let resource = db::create_resource(assignment.id, &title, url, body.kind, &pool).await?;
    Ok(HttpResponse::Created().json(resource))
}

#[post("/assignments/{id}/complete")]
pub async fn complete_assignment_handler(
    pool: web::Data<SqlitePool>,
    current: CurrentUser,
    path: web::Path<(i64,)>,
) -> ApiResult<HttpResponse> {
    let user = &current.user;
    if user.is_teacher() {
        return Err(ApiError::Forbidden);
    }

    let (assignment, _, course) = find_assignment(path.into_inner().0, &pool).await?;
    ensure_can_view(user, &course, &pool).await?;

    if assignment.kind.is_code() {
        return Err(ApiError::InvalidState(format!(
            "Assignment {} is completed by passing its tests.",
            assignment.id
        )));
    }

    db::mark_completed(user.id, assignment.id, pool.get_ref()).await?;
    log::debug!("Student {} completed lesson {}", user.id, assignment.id);

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "assignment_id": assignment.id,
        "completed": true,
    })))
}
