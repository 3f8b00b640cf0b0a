use actix_web::{HttpResponse, delete, get, post, web};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

use super::{ensure_can_view, ensure_owner, find_course, percent, required_text};
use crate::auth::{CurrentUser, TeacherUser};
use crate::database as db;
use crate::error::{ApiError, ApiResult};
use crate::models::{Assignment, Course, Module, Resource, ResourceKind};
use crate::slugify;

#[derive(Serialize)]
struct DashboardCourse {
    #[serde(flatten)]
    course: Course,
    commissions: Vec<String>,
    module_count: i64,
    assignment_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    completion_percent: Option<u8>,
}

#[derive(Deserialize)]
pub struct CourseRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub commission_codes: Vec<String>,
}

#[derive(Serialize)]
struct AssignmentSummary {
    #[serde(flatten)]
    assignment: Assignment,
    completed: bool,
}

#[derive(Serialize)]
struct ModuleDetail {
    #[serde(flatten)]
    module: Module,
    progress_percent: u8,
    assignments: Vec<AssignmentSummary>,
}

#[derive(Serialize)]
struct CourseDetail {
    #[serde(flatten)]
    course: Course,
    teacher_name: String,
    commissions: Vec<String>,
    modules: Vec<ModuleDetail>,
}

#[derive(Serialize)]
struct ModuleMaterials {
    module_id: i64,
    title: String,
    pdfs: Vec<Resource>,
    links: Vec<Resource>,
}

async fn commission_names(course_id: i64, pool: &SqlitePool) -> ApiResult<Vec<String>> {
    Ok(db::fetch_course_commissions(course_id, pool)
        .await?
        .into_iter()
        .map(|c| c.name)
        .collect())
}

#[get("/dashboard")]
pub async fn dashboard_handler(
    pool: web::Data<SqlitePool>,
    current: CurrentUser,
) -> ApiResult<HttpResponse> {
    let user = &current.user;
    let courses = if user.is_teacher() {
        db::courses_for_teacher(user.id, &pool).await?
    } else {
        match user.commission_id {
            Some(commission_id) => db::courses_for_commission(commission_id, &pool).await?,
            None => Vec::new(),
        }
    };

    let mut entries = Vec::with_capacity(courses.len());
    for course in courses {
        let (module_count, assignment_count) = db::course_counts(course.id, &pool).await?;
        let completion_percent = if user.is_teacher() {
            None
        } else {
            let completed = db::completed_in_course(user.id, course.id, &pool).await?;
            Some(percent(completed.len(), assignment_count as usize))
        };

        entries.push(DashboardCourse {
            commissions: commission_names(course.id, &pool).await?,
            course,
            module_count,
            assignment_count,
            completion_percent,
        });
    }

    Ok(HttpResponse::Ok().json(entries))
}

#[post("/courses")]
pub async fn post_course_handler(
    pool: web::Data<SqlitePool>,
    teacher: TeacherUser,
    body: web::Json<CourseRequest>,
) -> ApiResult<HttpResponse> {
    let title = required_text("title", &body.title)?;
    let slug = slugify(&title);
    if slug.is_empty() {
        return Err(ApiError::InvalidArgument(
            "title must contain at least one letter or digit".to_string(),
        ));
    }

    let mut commission_ids = Vec::with_capacity(body.commission_codes.len());
    for code in &body.commission_codes {
        let commission = db::find_commission_by_code(code.trim(), &pool)
            .await?
            .ok_or_else(|| ApiError::InvalidArgument(format!("Unknown commission code {code}")))?;
        commission_ids.push(commission.id);
    }

    let course = db::create_course(
        &title,
        &slug,
        body.description.trim(),
        teacher.0.id,
        &commission_ids,
        &pool,
    )
    .await?;
    log::info!("Teacher {} created course {} ({})", teacher.0.id, course.id, course.slug);

    Ok(HttpResponse::Created().json(DashboardCourse {
        commissions: commission_names(course.id, &pool).await?,
        course,
        module_count: 0,
        assignment_count: 0,
        completion_percent: None,
    }))
}

#[get("/courses/{id}")]
pub async fn get_course_handler(
    pool: web::Data<SqlitePool>,
    current: CurrentUser,
    path: web::Path<(i64,)>,
) -> ApiResult<HttpResponse> {
    let course = find_course(path.into_inner().0, &pool).await?;
    ensure_can_view(&current.user, &course, &pool).await?;

    let teacher_name = db::fetch_user(course.teacher_id, &pool)
        .await?
        .map(|t| t.full_name())
        .unwrap_or_default();
    let completed = db::completed_in_course(current.user.id, course.id, &pool).await?;
    let mut assignments = db::assignments_for_course(course.id, &pool).await?;

    let modules = db::modules_for_course(course.id, &pool)
        .await?
        .into_iter()
        .map(|module| {
            let (own, rest): (Vec<_>, Vec<_>) = assignments
                .drain(..)
                .partition(|a| a.module_id == module.id);
            assignments = rest;

            let done = own.iter().filter(|a| completed.contains(&a.id)).count();
            ModuleDetail {
                progress_percent: percent(done, own.len()),
                assignments: own
                    .into_iter()
                    .map(|a| AssignmentSummary {
                        completed: completed.contains(&a.id),
                        assignment: a,
                    })
                    .collect(),
                module,
            }
        })
        .collect();

    Ok(HttpResponse::Ok().json(CourseDetail {
        commissions: commission_names(course.id, &pool).await?,
        course,
        teacher_name,
        modules,
    }))
}

#[delete("/courses/{id}")]
pub async fn delete_course_handler(
    pool: web::Data<SqlitePool>,
    teacher: TeacherUser,
    path: web::Path<(i64,)>,
) -> ApiResult<HttpResponse> {
    let course = find_course(path.into_inner().0, &pool).await?;
    ensure_owner(&teacher.0, &course)?;

    let (module_count, _) = db::course_counts(course.id, &pool).await?;
    if module_count > 0 {
        return Err(ApiError::InvalidState(
            "course has modules; delete them first".to_string(),
        ));
    }

    db::delete_course(course.id, &pool).await?;
    log::info!("Teacher {} deleted course {}", teacher.0.id, course.id);

    Ok(HttpResponse::NoContent().finish())
}

#[get("/courses/{id}/materials")]
pub async fn get_materials_handler(
    pool: web::Data<SqlitePool>,
    current: CurrentUser,
    path: web::Path<(i64,)>,
) -> ApiResult<HttpResponse> {
    let course = find_course(path.into_inner().0, &pool).await?;
    ensure_can_view(&current.user, &course, &pool).await?;

    let mut materials: Vec<ModuleMaterials> = db::modules_for_course(course.id, &pool)
        .await?
        .into_iter()
        .map(|m| ModuleMaterials {
            module_id: m.id,
            title: m.title,
            pdfs: Vec::new(),
            links: Vec::new(),
        })
        .collect();

    for (module_id, resource) in db::resources_for_course(course.id, &pool).await? {
        let Some(entry) = materials.iter_mut().find(|m| m.module_id == module_id) else {
            continue;
        };
        match resource.kind {
            ResourceKind::Pdf => entry.pdfs.push(resource),
            _ => entry.links.push(resource),
        }
    }

    Ok(HttpResponse::Ok().json(materials))
}

#[get("/courses/{id}/submissions")]
pub async fn get_course_submissions_handler(
    pool: web::Data<SqlitePool>,
    teacher: TeacherUser,
    path: web::Path<(i64,)>,
) -> ApiResult<HttpResponse> {
    let course = find_course(path.into_inner().0, &pool).await?;
    ensure_owner(&teacher.0, &course)?;

    let history = db::fetch_course_history(course.id, &pool).await?;
    Ok(HttpResponse::Ok().json(history))
}
