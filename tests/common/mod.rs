#![allow(dead_code)]

use std::sync::Arc;

use sqlx::sqlite::SqlitePool;
use tempfile::TempDir;

use campus::auth::hash_password;
use campus::config::SessionConfig;
use campus::database::{self as db, NewUser};
use campus::models::{Role, User};
use campus::queue::SubmissionQueue;
use campus::routes::AppSettings;

pub const TEACHER_EMAIL: &str = "ada@example.org";
pub const TEACHER_PASSWORD: &str = "analytical";
pub const OTHER_TEACHER_EMAIL: &str = "alan@example.org";
pub const OTHER_TEACHER_PASSWORD: &str = "enigma-1936";
pub const STUDENT_PASSWORD: &str = "student123";
pub const COMMISSION_CODE: &str = "3A-2025";
pub const OTHER_COMMISSION_CODE: &str = "3B-2025";

/// Builds the app under test from a `TestContext`
macro_rules! campus_app {
    ($ctx:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($ctx.pool.clone()))
                .app_data(actix_web::web::Data::from($ctx.queue.clone()))
                .app_data(actix_web::web::Data::new($ctx.settings.clone()))
                .app_data(
                    actix_web::web::JsonConfig::default()
                        .error_handler(campus::routes::json_error_handler),
                )
                .configure(campus::routes::configure),
        )
        .await
    };
}

/// Logs in and returns the session cookie
macro_rules! login {
    ($app:expr, $email:expr, $password:expr) => {{
        let req = actix_web::test::TestRequest::post()
            .uri("/auth/login")
            .set_json(serde_json::json!({ "email": $email, "password": $password }))
            .to_request();
        let resp = actix_web::test::call_service(&$app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::OK);
        resp.response()
            .cookies()
            .find(|c| c.name() == "session")
            .expect("login sets a session cookie")
            .into_owned()
    }};
}

/// An isolated database and queue, with two commissions and two teachers
pub struct TestContext {
    pub dir: TempDir,
    pub pool: SqlitePool,
    pub queue: Arc<SubmissionQueue>,
    pub settings: AppSettings,
    pub teacher: User,
    pub other_teacher: User,
}

impl TestContext {
    pub async fn new(blocking: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::init_db(dir.path().join("campus.sqlite3")).await.unwrap();

        db::upsert_commission("3A", COMMISSION_CODE, &pool).await.unwrap();
        db::upsert_commission("3B", OTHER_COMMISSION_CODE, &pool).await.unwrap();

        let teacher = create_user(&pool, "Ada", TEACHER_EMAIL, TEACHER_PASSWORD, Role::Teacher, None).await;
        let other_teacher = create_user(
            &pool,
            "Alan",
            OTHER_TEACHER_EMAIL,
            OTHER_TEACHER_PASSWORD,
            Role::Teacher,
            None,
        )
        .await;

        let settings = AppSettings {
            blocking,
            session: SessionConfig::default(),
            test_files_dir: dir.path().join("test-files"),
        };

        Self {
            dir,
            pool,
            queue: Arc::new(SubmissionQueue::new()),
            settings,
            teacher,
            other_teacher,
        }
    }

    /// Inserts a student of the commission with the given registration code
    pub async fn create_student(&self, email: &str, commission_code: &str) -> User {
        let commission = db::find_commission_by_code(commission_code, &self.pool)
            .await
            .unwrap()
            .unwrap();
        create_user(
            &self.pool,
            "Grace",
            email,
            STUDENT_PASSWORD,
            Role::Student,
            Some(commission.id),
        )
        .await
    }
}

async fn create_user(
    pool: &SqlitePool,
    name: &str,
    email: &str,
    password: &str,
    role: Role,
    commission_id: Option<i64>,
) -> User {
    let password_hash = hash_password(password).unwrap();
    let new_user = NewUser {
        name,
        last_name: "Tester",
        email,
        dni: None,
        birth_date: None,
        role,
        commission_id,
    };
    db::create_user(&new_user, &password_hash, pool).await.unwrap()
}

pub fn register_body(email: &str) -> serde_json::Value {
    serde_json::json!({
        "name": "Grace",
        "last_name": "Hopper",
        "email": email,
        "dni": "30123456",
        "birth_date": "09/12/1990",
        "commission_code": COMMISSION_CODE,
        "password": STUDENT_PASSWORD,
        "confirm_password": STUDENT_PASSWORD,
    })
}

/// A test file the hint grader understands
pub const SUM_TEST_FILE: &str = "\
# SOLUTION: def sumar(a, b): return a + b
# FAILURE_MESSAGE: sumar does not return the sum of its arguments.
# FAILURE_DETECT_IF_CONTAINS_MUL: a * b
# FAILURE_MESSAGE_MUL: You are multiplying instead of adding.
from main_solution import sumar


def test_sumar():
    assert sumar(2, 3) == 5
";
