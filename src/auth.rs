use std::future::Future;
use std::pin::Pin;

use actix_web::cookie::{Cookie, SameSite, time};
use actix_web::{FromRequest, HttpRequest, dev::Payload, web};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sqlx::SqlitePool;

use crate::config::SessionConfig;
use crate::database as db;
use crate::error::ApiError;
use crate::models::User;
use crate::routes::AppSettings;

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {e}"))?
        .to_string();

    Ok(hash)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            log::error!("Stored password hash is malformed: {e}");
            false
        }
    }
}

pub fn new_session_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub fn session_cookie(config: &SessionConfig, token: String) -> Cookie<'static> {
    Cookie::build(config.cookie_name().to_string(), token)
        .path("/")
        .http_only(true)
        .secure(config.secure())
        .same_site(SameSite::Strict)
        .max_age(time::Duration::hours(config.ttl_hours()))
        .finish()
}

pub fn removal_cookie(config: &SessionConfig) -> Cookie<'static> {
    let mut cookie = Cookie::build(config.cookie_name().to_string(), "")
        .path("/")
        .finish();
    cookie.make_removal();
    cookie
}

/// The signed-in user, resolved from the session cookie
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub token: String,
}

/// A signed-in user with the teacher role
#[derive(Debug, Clone)]
pub struct TeacherUser(pub User);

async fn resolve_session(req: HttpRequest) -> Result<CurrentUser, ApiError> {
    let settings = req
        .app_data::<web::Data<AppSettings>>()
        .ok_or_else(|| ApiError::Internal("AppSettings not configured".to_string()))?;
    let pool = req
        .app_data::<web::Data<SqlitePool>>()
        .ok_or_else(|| ApiError::Internal("Database pool not configured".to_string()))?;

    let token = req
        .cookie(settings.session.cookie_name())
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;

    match db::fetch_session_user(&token, pool).await? {
        Some(user) => Ok(CurrentUser { user, token }),
        None => Err(ApiError::Unauthorized(
            "Session expired or invalid".to_string(),
        )),
    }
}

impl FromRequest for CurrentUser {
    type Error = ApiError;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        Box::pin(resolve_session(req.clone()))
    }
}

impl FromRequest for TeacherUser {
    type Error = ApiError;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            let current = resolve_session(req).await?;
            if current.user.is_teacher() {
                Ok(TeacherUser(current.user))
            } else {
                Err(ApiError::Forbidden)
            }
        })
    }
}
