mod assignments;
mod auth;
mod courses;
mod modules;
mod submissions;

use std::path::PathBuf;

use actix_web::error::{InternalError, JsonPayloadError, QueryPayloadError};
use actix_web::{HttpRequest, HttpResponse, web};
use serde::Serialize;
use sqlx::sqlite::SqlitePool;

use crate::config::SessionConfig;
use crate::database as db;
use crate::error::{ApiError, ApiResult};
use crate::models::{Assignment, Course, Module, User};

/// Server-wide settings shared with every handler
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub blocking: bool,
    pub session: SessionConfig,
    pub test_files_dir: PathBuf,
}

#[derive(Serialize)]
struct ErrorResponseWithMessage {
    reason: &'static str,
    code: u32,
    message: String,
}

pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = HttpResponse::BadRequest().json(ErrorResponseWithMessage {
        reason: "ERR_INVALID_ARGUMENT",
        code: 1,
        message: err.to_string(),
    });
    InternalError::from_response(err, response).into()
}

pub fn query_error_handler(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = HttpResponse::BadRequest().json(ErrorResponseWithMessage {
        reason: "ERR_INVALID_ARGUMENT",
        code: 1,
        message: err.to_string(),
    });
    InternalError::from_response(err, response).into()
}

/// Registers every endpoint of the service
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(auth::register_handler)
        .service(auth::login_handler)
        .service(auth::logout_handler)
        .service(auth::me_handler)
        .service(courses::dashboard_handler)
        .service(courses::post_course_handler)
        .service(courses::get_course_handler)
        .service(courses::delete_course_handler)
        .service(courses::get_materials_handler)
        .service(courses::get_course_submissions_handler)
        .service(modules::post_module_handler)
        .service(modules::delete_module_handler)
        .service(assignments::post_assignment_handler)
        .service(assignments::get_assignment_handler)
        .service(assignments::delete_assignment_handler)
        .service(assignments::post_resource_handler)
        .service(assignments::complete_assignment_handler)
        .service(submissions::post_submission_handler)
        .service(submissions::get_assignment_submissions_handler)
        .service(submissions::get_submission_handler)
        .service(submissions::review_submission_handler)
        .service(submissions::delete_submission_handler)
        .service(submissions::put_submission_handler);
}

async fn find_course(course_id: i64, pool: &SqlitePool) -> ApiResult<Course> {
    db::fetch_course(course_id, pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Course", course_id))
}

/// Loads a module together with the course it belongs to
async fn find_module(module_id: i64, pool: &SqlitePool) -> ApiResult<(Module, Course)> {
    let module = db::fetch_module(module_id, pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Module", module_id))?;
    let course = find_course(module.course_id, pool).await?;

    Ok((module, course))
}

/// Walks assignment -> module -> course
async fn find_assignment(
    assignment_id: i64,
    pool: &SqlitePool,
) -> ApiResult<(Assignment, Module, Course)> {
    let assignment = db::fetch_assignment(assignment_id, pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Assignment", assignment_id))?;
    let (module, course) = find_module(assignment.module_id, pool).await?;

    Ok((assignment, module, course))
}

/// The owning teacher, or a student whose commission is linked to the course
async fn ensure_can_view(user: &User, course: &Course, pool: &SqlitePool) -> ApiResult<()> {
    if user.is_teacher() {
        return ensure_owner(user, course);
    }

    let enrolled = match user.commission_id {
        Some(commission_id) => db::is_commission_enrolled(course.id, commission_id, pool).await?,
        None => false,
    };
    if enrolled {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

fn ensure_owner(user: &User, course: &Course) -> ApiResult<()> {
    if course.teacher_id == user.id {
        Ok(())
    } else {
        log::info!("User {} denied access to course {}", user.id, course.id);
        Err(ApiError::Forbidden)
    }
}

/// Required text field: trimmed and non-blank
fn required_text(field: &str, value: &str) -> ApiResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::InvalidArgument(format!("{field} is required")));
    }
    Ok(value.to_string())
}

/// Completed over total, as an integer percent
fn percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((completed.min(total) as f64 / total as f64) * 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_rounding() {
        assert_eq!(percent(0, 0), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(3, 3), 100);
    }

    #[test]
    fn test_required_text() {
        assert_eq!(required_text("title", "  Unit 1 ").unwrap(), "Unit 1");
        assert!(matches!(
            required_text("title", "   "),
            Err(ApiError::InvalidArgument(_))
        ));
    }
}
