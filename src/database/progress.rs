use std::collections::HashSet;

use sqlx::Executor;
use sqlx::sqlite::{Sqlite, SqlitePool};

use crate::create_timestamp;

/// Marks an assignment completed for a student. Idempotent.
pub async fn mark_completed<'e, E>(student_id: i64, assignment_id: i64, executor: E) -> sqlx::Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO student_progress (student_id, assignment_id, is_completed, completed_time)
        VALUES (?, ?, 1, ?)
        ON CONFLICT (student_id, assignment_id) DO UPDATE
        SET is_completed = 1,
            completed_time = COALESCE(student_progress.completed_time, excluded.completed_time)
        "#,
    )
    .bind(student_id)
    .bind(assignment_id)
    .bind(create_timestamp())
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn is_completed(
    student_id: i64,
    assignment_id: i64,
    pool: &SqlitePool,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        "SELECT 1 FROM student_progress WHERE student_id = ? AND assignment_id = ? AND is_completed = 1",
    )
    .bind(student_id)
    .bind(assignment_id)
    .fetch_optional(pool)
    .await?;

    Ok(result.is_some())
}

/// Ids of the assignments of a course the student has completed
pub async fn completed_in_course(
    student_id: i64,
    course_id: i64,
    pool: &SqlitePool,
) -> sqlx::Result<HashSet<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        r#"
        SELECT p.assignment_id
        FROM student_progress p
        JOIN assignments a ON p.assignment_id = a.id
        JOIN modules m ON a.module_id = m.id
        WHERE p.student_id = ? AND m.course_id = ? AND p.is_completed = 1
        "#,
    )
    .bind(student_id)
    .bind(course_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}
