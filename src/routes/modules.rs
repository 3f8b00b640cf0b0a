use actix_web::{HttpResponse, delete, post, web};
use serde::Deserialize;
use sqlx::sqlite::SqlitePool;

use super::{ensure_owner, find_course, find_module, required_text};
use crate::auth::TeacherUser;
use crate::database as db;
use crate::error::{ApiError, ApiResult};

#[derive(Deserialize)]
pub struct ModuleRequest {
    pub title: String,
}

#[post("/courses/{id}/modules")]
pub async fn post_module_handler(
    pool: web::Data<SqlitePool>,
    teacher: TeacherUser,
    path: web::Path<(i64,)>,
    body: web::Json<ModuleRequest>,
) -> ApiResult<HttpResponse> {
    let course = find_course(path.into_inner().0, &pool).await?;
    ensure_owner(&teacher.0, &course)?;
    let title = required_text("title", &body.title)?;

    let module = db::create_module(course.id, &title, &pool).await?;
    log::info!("Created module {} in course {}", module.id, course.id);

    Ok(HttpResponse::Created().json(module))
}

#[delete("/modules/{id}")]
pub async fn delete_module_handler(
    pool: web::Data<SqlitePool>,
    teacher: TeacherUser,
    path: web::Path<(i64,)>,
) -> ApiResult<HttpResponse> {
    let (module, course) = find_module(path.into_inner().0, &pool).await?;
    ensure_owner(&teacher.0, &course)?;

    if db::count_module_assignments(module.id, &pool).await? > 0 {
        return Err(ApiError::InvalidState(
            "module has assignments; delete them first".to_string(),
        ));
    }

    db::delete_module(module.id, &pool).await?;
    log::info!("Deleted module {} of course {}", module.id, course.id);

    Ok(HttpResponse::NoContent().finish())
}
