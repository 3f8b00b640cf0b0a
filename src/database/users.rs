use sqlx::sqlite::SqlitePool;

use crate::create_timestamp;
use crate::models::{Commission, Role, User};

const USER_COLUMNS: &str =
    "id, name, last_name, email, dni, birth_date, role, commission_id";

pub struct NewUser<'a> {
    pub name: &'a str,
    pub last_name: &'a str,
    pub email: &'a str,
    pub dni: Option<&'a str>,
    /// ISO-8601 date (YYYY-MM-DD)
    pub birth_date: Option<&'a str>,
    pub role: Role,
    pub commission_id: Option<i64>,
}

pub async fn create_user(
    user: &NewUser<'_>,
    password_hash: &str,
    pool: &SqlitePool,
) -> sqlx::Result<User> {
    let now = create_timestamp();

    let id = sqlx::query(
        r#"
        INSERT INTO users (name, last_name, email, dni, birth_date, password_hash, role, commission_id, created_time)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user.name)
    .bind(user.last_name)
    .bind(user.email)
    .bind(user.dni)
    .bind(user.birth_date)
    .bind(password_hash)
    .bind(user.role)
    .bind(user.commission_id)
    .bind(&now)
    .execute(pool)
    .await?
    .last_insert_rowid();

    Ok(User {
        id,
        name: user.name.to_string(),
        last_name: user.last_name.to_string(),
        email: user.email.to_string(),
        dni: user.dni.map(str::to_string),
        birth_date: user.birth_date.map(str::to_string),
        role: user.role,
        commission_id: user.commission_id,
    })
}

pub async fn fetch_user(id: i64, pool: &SqlitePool) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Returns the user together with the stored password hash
pub async fn fetch_credentials(
    email: &str,
    pool: &SqlitePool,
) -> sqlx::Result<Option<(User, String)>> {
    #[derive(sqlx::FromRow)]
    struct CredentialRow {
        #[sqlx(flatten)]
        user: User,
        password_hash: String,
    }

    let row = sqlx::query_as::<_, CredentialRow>(&format!(
        "SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = ?"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| (r.user, r.password_hash)))
}

pub async fn email_exists(email: &str, pool: &SqlitePool) -> sqlx::Result<bool> {
    let result = sqlx::query("SELECT 1 FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    Ok(result.is_some())
}

/// Inserts the commission, or renames it if the registration code is known
pub async fn upsert_commission(
    name: &str,
    registration_code: &str,
    pool: &SqlitePool,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO commissions (name, registration_code) VALUES (?, ?)
        ON CONFLICT (registration_code) DO UPDATE SET name = excluded.name
        "#,
    )
    .bind(name)
    .bind(registration_code)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn find_commission_by_code(
    registration_code: &str,
    pool: &SqlitePool,
) -> sqlx::Result<Option<Commission>> {
    sqlx::query_as::<_, Commission>(
        "SELECT id, name, registration_code FROM commissions WHERE registration_code = ?",
    )
    .bind(registration_code)
    .fetch_optional(pool)
    .await
}
