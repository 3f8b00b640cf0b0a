mod courses;
mod progress;
mod sessions;
mod submissions;
mod users;

pub use courses::*;
pub use progress::*;
pub use sessions::*;
pub use submissions::*;
pub use users::*;

use std::fs;
use std::path::{Path, PathBuf};

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

const DATABASE_NAME: &str = "campus.sqlite3";

pub fn get_db_path() -> anyhow::Result<PathBuf> {
    use directories::ProjectDirs;

    let proj_dirs = ProjectDirs::from("", "", "campus")
        .ok_or_else(|| anyhow::anyhow!("Unable to find user directory"))?;
    let data_dir = proj_dirs.data_local_dir();

    fs::create_dir_all(data_dir)?;

    Ok(data_dir.join(DATABASE_NAME))
}

pub async fn init_db(db_path: impl AsRef<Path>) -> sqlx::Result<SqlitePool> {
    let db_url = format!("sqlite://{}?mode=rwc", db_path.as_ref().display()); // rwc = read/write/create
    let db_pool = SqlitePoolOptions::new()
        .max_connections(4)
        .min_connections(0)
        // PRAGMAs are per connection, so they run on every new one
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                for pragma_sql in &[
                    "PRAGMA foreign_keys = ON;",
                    "PRAGMA busy_timeout = 2000;",
                    "PRAGMA journal_mode = WAL;",
                    "PRAGMA synchronous = NORMAL;",
                ] {
                    sqlx::query(pragma_sql).execute(&mut *conn).await?;
                }
                Ok(())
            })
        })
        .connect(&db_url)
        .await?;

    let mut tx = db_pool.begin().await?;

    for sql in &[
        r"
        CREATE TABLE IF NOT EXISTS commissions (
            id                 INTEGER PRIMARY KEY,
            name               TEXT    NOT NULL,
            registration_code  TEXT    NOT NULL UNIQUE
        );",
        r"
        CREATE TABLE IF NOT EXISTS users (
            id             INTEGER PRIMARY KEY,
            name           TEXT    NOT NULL,
            last_name      TEXT    NOT NULL,
            email          TEXT    NOT NULL UNIQUE,
            dni            TEXT,
            birth_date     TEXT,
            password_hash  TEXT    NOT NULL,
            role           TEXT    NOT NULL,
            commission_id  INTEGER,
            created_time   TEXT    NOT NULL,
            FOREIGN KEY (commission_id) REFERENCES commissions (id)
        );",
        r"
        CREATE TABLE IF NOT EXISTS sessions (
            token         TEXT    PRIMARY KEY,
            user_id       INTEGER NOT NULL,
            created_time  TEXT    NOT NULL,
            expires_time  TEXT    NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
        );",
        r"
        CREATE TABLE IF NOT EXISTS courses (
            id            INTEGER PRIMARY KEY,
            title         TEXT    NOT NULL,
            slug          TEXT    NOT NULL,
            description   TEXT    NOT NULL DEFAULT '',
            teacher_id    INTEGER NOT NULL,
            created_time  TEXT    NOT NULL,
            FOREIGN KEY (teacher_id) REFERENCES users (id)
        );",
        r"
        CREATE TABLE IF NOT EXISTS course_commissions (
            course_id      INTEGER NOT NULL,
            commission_id  INTEGER NOT NULL,
            PRIMARY KEY (course_id, commission_id),
            FOREIGN KEY (course_id)     REFERENCES courses (id) ON DELETE CASCADE,
            FOREIGN KEY (commission_id) REFERENCES commissions (id)
        );",
        r"
        CREATE TABLE IF NOT EXISTS modules (
            id            INTEGER PRIMARY KEY,
            course_id     INTEGER NOT NULL,
            title         TEXT    NOT NULL,
            created_time  TEXT    NOT NULL,
            FOREIGN KEY (course_id) REFERENCES courses (id)
        );",
        r"
        CREATE TABLE IF NOT EXISTS assignments (
            id            INTEGER PRIMARY KEY,
            module_id     INTEGER NOT NULL,
            title         TEXT    NOT NULL,
            slug          TEXT    NOT NULL,
            description   TEXT    NOT NULL DEFAULT '',
            kind          TEXT    NOT NULL,
            test_file     TEXT,
            created_time  TEXT    NOT NULL,
            FOREIGN KEY (module_id) REFERENCES modules (id)
        );",
        r"
        CREATE TABLE IF NOT EXISTS resources (
            id             INTEGER PRIMARY KEY,
            assignment_id  INTEGER NOT NULL,
            title          TEXT    NOT NULL,
            url            TEXT    NOT NULL,
            kind           TEXT    NOT NULL,
            FOREIGN KEY (assignment_id) REFERENCES assignments (id)
        );",
        r"
        CREATE TABLE IF NOT EXISTS student_progress (
            student_id      INTEGER NOT NULL,
            assignment_id   INTEGER NOT NULL,
            is_completed    INTEGER NOT NULL DEFAULT 0,
            completed_time  TEXT,
            PRIMARY KEY (student_id, assignment_id),
            FOREIGN KEY (student_id)    REFERENCES users (id),
            FOREIGN KEY (assignment_id) REFERENCES assignments (id)
        );",
        r"
        CREATE TABLE IF NOT EXISTS submissions (
            id                 INTEGER PRIMARY KEY,
            assignment_id      INTEGER NOT NULL,
            student_id         INTEGER NOT NULL,
            code               TEXT    NOT NULL,
            state              TEXT    NOT NULL,
            verdict            TEXT    NOT NULL,
            is_successful      INTEGER,
            message            TEXT    NOT NULL DEFAULT '',
            execution_time_ms  INTEGER,
            teacher_comment    TEXT,
            submitted_time     TEXT    NOT NULL,
            updated_time       TEXT    NOT NULL,
            FOREIGN KEY (assignment_id) REFERENCES assignments (id),
            FOREIGN KEY (student_id)    REFERENCES users (id)
        );",
        "CREATE INDEX IF NOT EXISTS idx_submissions_submitted_time ON submissions(submitted_time);",
        r"
        CREATE TABLE IF NOT EXISTS submission_tests (
            submission_id  INTEGER NOT NULL,
            test_index     INTEGER NOT NULL,
            name           TEXT    NOT NULL,
            passed         INTEGER NOT NULL,
            message        TEXT    NOT NULL DEFAULT '',
            raw            TEXT    NOT NULL DEFAULT '',
            PRIMARY KEY (submission_id, test_index),
            FOREIGN KEY (submission_id) REFERENCES submissions (id)
        );",
    ] {
        sqlx::query(sql).execute(tx.as_mut()).await?;
    }

    tx.commit().await?;

    log::info!("Initialized database at {}", db_path.as_ref().display());

    Ok(db_pool)
}

pub fn remove_db(db_path: impl AsRef<Path>) {
    // Remove WAL and SHM files (ignore errors as they might not exist)
    let wal_path = format!("{}-wal", db_path.as_ref().display());
    let shm_path = format!("{}-shm", db_path.as_ref().display());
    let _ = fs::remove_file(wal_path);
    let _ = fs::remove_file(shm_path);

    if let Err(e) = fs::remove_file(&db_path) {
        log::warn!(
            "Unable to remove database at {}: {e}",
            db_path.as_ref().display()
        );
    } else {
        log::info!("Removed database at {}", db_path.as_ref().display());
    }
}
