use std::collections::BTreeMap;

use actix_web::{HttpResponse, get, post, web};
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::sqlite::SqlitePool;
use validator::Validate;

use super::AppSettings;
use crate::auth::{
    CurrentUser, hash_password, new_session_token, removal_cookie, session_cookie,
    verify_password,
};
use crate::database::{self as db, NewUser};
use crate::error::{ApiError, ApiResult};
use crate::models::Role;

lazy_static::lazy_static! {
    static ref DNI_REGEX: regex::Regex = regex::Regex::new(r"^\d{7,8}$").unwrap();
    static ref BIRTH_DATE_REGEX: regex::Regex = regex::Regex::new(r"^\d{2}/\d{2}/\d{4}$").unwrap();
}

const INVALID_CREDENTIALS: &str = "Invalid email or password";
const EMAIL_TAKEN: &str = "Email already registered";

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 2, message = "Name must have at least 2 characters"))]
    pub name: String,

    #[validate(length(min = 2, message = "Last name must have at least 2 characters"))]
    pub last_name: String,

    #[validate(email(message = "Invalid email address"))]
    pub email: String,

    #[validate(regex(path = *DNI_REGEX, message = "DNI must have 7 or 8 digits"))]
    pub dni: String,

    #[validate(regex(path = *BIRTH_DATE_REGEX, message = "Birth date must be dd/mm/yyyy"))]
    pub birth_date: String,

    #[validate(length(min = 1, message = "Commission code is required"))]
    pub commission_code: String,

    #[validate(length(min = 6, message = "Password must have at least 6 characters"))]
    pub password: String,

    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    pub confirm_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

fn field_error(field: &str, message: &str) -> ApiError {
    let mut fields = BTreeMap::new();
    fields.insert(field.to_string(), vec![message.to_string()]);
    ApiError::Validation(fields)
}

/// The unique email index catches registrations racing past `email_exists`
fn map_email_conflict(e: sqlx::Error) -> ApiError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return ApiError::Conflict(EMAIL_TAKEN.to_string());
        }
    }
    e.into()
}

/// Turns `dd/mm/yyyy` into an ISO date, rejecting days that do not exist
fn parse_birth_date(raw: &str) -> ApiResult<String> {
    NaiveDate::parse_from_str(raw, "%d/%m/%Y")
        .map(|date| date.format("%Y-%m-%d").to_string())
        .map_err(|_| field_error("birth_date", "Birth date is not a valid date"))
}

#[post("/auth/register")]
pub async fn register_handler(
    pool: web::Data<SqlitePool>,
    body: web::Json<RegisterRequest>,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    let birth_date = parse_birth_date(&body.birth_date)?;
    let email = body.email.trim().to_lowercase();

    if db::email_exists(&email, &pool).await? {
        return Err(ApiError::Conflict(EMAIL_TAKEN.to_string()));
    }

    let commission = db::find_commission_by_code(body.commission_code.trim(), &pool)
        .await?
        .ok_or_else(|| field_error("commission_code", "Unknown commission code"))?;

    let password_hash = hash_password(&body.password)?;
    let new_user = NewUser {
        name: body.name.trim(),
        last_name: body.last_name.trim(),
        email: &email,
        dni: Some(body.dni.as_str()),
        birth_date: Some(birth_date.as_str()),
        role: Role::Student,
        commission_id: Some(commission.id),
    };
    let user = db::create_user(&new_user, &password_hash, &pool)
        .await
        .map_err(map_email_conflict)?;
    log::info!(
        "Registered student {} in commission {}",
        user.id,
        commission.name
    );

    Ok(HttpResponse::Created().json(user))
}

#[post("/auth/login")]
pub async fn login_handler(
    pool: web::Data<SqlitePool>,
    settings: web::Data<AppSettings>,
    body: web::Json<LoginRequest>,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    let email = body.email.trim().to_lowercase();

    let Some((user, password_hash)) = db::fetch_credentials(&email, &pool).await? else {
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    };
    if !verify_password(&body.password, &password_hash) {
        log::info!("Failed login attempt for user {}", user.id);
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    }

    let token = new_session_token();
    db::create_session(&token, user.id, settings.session.ttl_hours(), &pool).await?;
    log::debug!("Created session for user {}", user.id);

    Ok(HttpResponse::Ok()
        .cookie(session_cookie(&settings.session, token))
        .json(user))
}

#[post("/auth/logout")]
pub async fn logout_handler(
    pool: web::Data<SqlitePool>,
    settings: web::Data<AppSettings>,
    current: CurrentUser,
) -> ApiResult<HttpResponse> {
    db::delete_session(&current.token, &pool).await?;
    log::debug!("User {} logged out", current.user.id);

    Ok(HttpResponse::NoContent()
        .cookie(removal_cookie(&settings.session))
        .finish())
}

#[get("/auth/me")]
pub async fn me_handler(current: CurrentUser) -> HttpResponse {
    HttpResponse::Ok().json(current.user)
}
