use sqlx::sqlite::SqlitePool;

use crate::create_timestamp;
use crate::models::{Assignment, AssignmentKind, Commission, Course, Module, Resource, ResourceKind};

const COURSE_COLUMNS: &str = "id, title, slug, description, teacher_id, created_time";
const ASSIGNMENT_COLUMNS: &str =
    "a.id, a.module_id, a.title, a.slug, a.description, a.kind, a.test_file, a.created_time";

/// Creates a course and links it to the given commissions in one transaction
pub async fn create_course(
    title: &str,
    slug: &str,
    description: &str,
    teacher_id: i64,
    commission_ids: &[i64],
    pool: &SqlitePool,
) -> sqlx::Result<Course> {
    let now = create_timestamp();
    let mut tx = pool.begin().await?;

    let id = sqlx::query(
        r#"
        INSERT INTO courses (title, slug, description, teacher_id, created_time)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(title)
    .bind(slug)
    .bind(description)
    .bind(teacher_id)
    .bind(&now)
    .execute(tx.as_mut())
    .await?
    .last_insert_rowid();

    for commission_id in commission_ids {
        sqlx::query(
            "INSERT OR IGNORE INTO course_commissions (course_id, commission_id) VALUES (?, ?)",
        )
        .bind(id)
        .bind(commission_id)
        .execute(tx.as_mut())
        .await?;
    }

    tx.commit().await?;

    Ok(Course {
        id,
        title: title.to_string(),
        slug: slug.to_string(),
        description: description.to_string(),
        teacher_id,
        created_time: now,
    })
}

pub async fn fetch_course(id: i64, pool: &SqlitePool) -> sqlx::Result<Option<Course>> {
    sqlx::query_as::<_, Course>(&format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn fetch_course_commissions(
    course_id: i64,
    pool: &SqlitePool,
) -> sqlx::Result<Vec<Commission>> {
    sqlx::query_as::<_, Commission>(
        r#"
        SELECT c.id, c.name, c.registration_code
        FROM commissions c JOIN course_commissions cc ON cc.commission_id = c.id
        WHERE cc.course_id = ?
        ORDER BY c.name
        "#,
    )
    .bind(course_id)
    .fetch_all(pool)
    .await
}

pub async fn courses_for_teacher(teacher_id: i64, pool: &SqlitePool) -> sqlx::Result<Vec<Course>> {
    sqlx::query_as::<_, Course>(&format!(
        "SELECT {COURSE_COLUMNS} FROM courses WHERE teacher_id = ? ORDER BY id"
    ))
    .bind(teacher_id)
    .fetch_all(pool)
    .await
}

pub async fn courses_for_commission(
    commission_id: i64,
    pool: &SqlitePool,
) -> sqlx::Result<Vec<Course>> {
    sqlx::query_as::<_, Course>(
        r#"
        SELECT c.id, c.title, c.slug, c.description, c.teacher_id, c.created_time
        FROM courses c JOIN course_commissions cc ON cc.course_id = c.id
        WHERE cc.commission_id = ?
        ORDER BY c.id
        "#,
    )
    .bind(commission_id)
    .fetch_all(pool)
    .await
}

pub async fn is_commission_enrolled(
    course_id: i64,
    commission_id: i64,
    pool: &SqlitePool,
) -> sqlx::Result<bool> {
    let result =
        sqlx::query("SELECT 1 FROM course_commissions WHERE course_id = ? AND commission_id = ?")
            .bind(course_id)
            .bind(commission_id)
            .fetch_optional(pool)
            .await?;

    Ok(result.is_some())
}

/// Returns `(module_count, assignment_count)` of a course
pub async fn course_counts(course_id: i64, pool: &SqlitePool) -> sqlx::Result<(i64, i64)> {
    sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM modules WHERE course_id = ?1),
            (SELECT COUNT(*) FROM assignments a JOIN modules m ON a.module_id = m.id
             WHERE m.course_id = ?1)
        "#,
    )
    .bind(course_id)
    .fetch_one(pool)
    .await
}

pub async fn delete_course(id: i64, pool: &SqlitePool) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM courses WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn create_module(course_id: i64, title: &str, pool: &SqlitePool) -> sqlx::Result<Module> {
    let now = create_timestamp();

    let id = sqlx::query("INSERT INTO modules (course_id, title, created_time) VALUES (?, ?, ?)")
        .bind(course_id)
        .bind(title)
        .bind(&now)
        .execute(pool)
        .await?
        .last_insert_rowid();

    Ok(Module {
        id,
        course_id,
        title: title.to_string(),
        created_time: now,
    })
}

pub async fn fetch_module(id: i64, pool: &SqlitePool) -> sqlx::Result<Option<Module>> {
    sqlx::query_as::<_, Module>("SELECT id, course_id, title, created_time FROM modules WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn modules_for_course(course_id: i64, pool: &SqlitePool) -> sqlx::Result<Vec<Module>> {
    sqlx::query_as::<_, Module>(
        "SELECT id, course_id, title, created_time FROM modules WHERE course_id = ? ORDER BY id",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await
}

pub async fn count_module_assignments(module_id: i64, pool: &SqlitePool) -> sqlx::Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM assignments WHERE module_id = ?")
        .bind(module_id)
        .fetch_one(pool)
        .await?;

    Ok(count)
}

pub async fn delete_module(id: i64, pool: &SqlitePool) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM modules WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

pub struct NewAssignment<'a> {
    pub module_id: i64,
    pub title: &'a str,
    pub slug: &'a str,
    pub description: &'a str,
    pub kind: AssignmentKind,
    pub test_file: Option<&'a str>,
}

pub async fn create_assignment(
    assignment: &NewAssignment<'_>,
    pool: &SqlitePool,
) -> sqlx::Result<Assignment> {
    let now = create_timestamp();

    let id = sqlx::query(
        r#"
        INSERT INTO assignments (module_id, title, slug, description, kind, test_file, created_time)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(assignment.module_id)
    .bind(assignment.title)
    .bind(assignment.slug)
    .bind(assignment.description)
    .bind(assignment.kind)
    .bind(assignment.test_file)
    .bind(&now)
    .execute(pool)
    .await?
    .last_insert_rowid();

    Ok(Assignment {
        id,
        module_id: assignment.module_id,
        title: assignment.title.to_string(),
        slug: assignment.slug.to_string(),
        description: assignment.description.to_string(),
        kind: assignment.kind,
        test_file: assignment.test_file.map(str::to_string),
        created_time: now,
    })
}

pub async fn fetch_assignment(id: i64, pool: &SqlitePool) -> sqlx::Result<Option<Assignment>> {
    sqlx::query_as::<_, Assignment>(&format!(
        "SELECT {ASSIGNMENT_COLUMNS} FROM assignments a WHERE a.id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// All assignments of a course, ordered by module and creation
pub async fn assignments_for_course(
    course_id: i64,
    pool: &SqlitePool,
) -> sqlx::Result<Vec<Assignment>> {
    sqlx::query_as::<_, Assignment>(&format!(
        r#"
        SELECT {ASSIGNMENT_COLUMNS}
        FROM assignments a JOIN modules m ON a.module_id = m.id
        WHERE m.course_id = ?
        ORDER BY m.id, a.id
        "#
    ))
    .bind(course_id)
    .fetch_all(pool)
    .await
}

/// Removes an assignment with everything that hangs off it
pub async fn delete_assignment(id: i64, pool: &SqlitePool) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;

    for sql in &[
        "DELETE FROM submission_tests WHERE submission_id IN (SELECT id FROM submissions WHERE assignment_id = ?)",
        "DELETE FROM submissions WHERE assignment_id = ?",
        "DELETE FROM student_progress WHERE assignment_id = ?",
        "DELETE FROM resources WHERE assignment_id = ?",
        "DELETE FROM assignments WHERE id = ?",
    ] {
        sqlx::query(sql).bind(id).execute(tx.as_mut()).await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn create_resource(
    assignment_id: i64,
    title: &str,
    url: &str,
    kind: ResourceKind,
    pool: &SqlitePool,
) -> sqlx::Result<Resource> {
    let id = sqlx::query(
        "INSERT INTO resources (assignment_id, title, url, kind) VALUES (?, ?, ?, ?)",
    )
    .bind(assignment_id)
    .bind(title)
    .bind(url)
    .bind(kind)
    .execute(pool)
    .await?
    .last_insert_rowid();

    Ok(Resource {
        id,
        assignment_id,
        title: title.to_string(),
        url: url.to_string(),
        kind,
    })
}

/// Resources of a course paired with the module they belong to
pub async fn resources_for_course(
    course_id: i64,
    pool: &SqlitePool,
) -> sqlx::Result<Vec<(i64, Resource)>> {
    #[derive(sqlx::FromRow)]
    struct ResourceRow {
        module_id: i64,
        #[sqlx(flatten)]
        resource: Resource,
    }

    let rows = sqlx::query_as::<_, ResourceRow>(
        r#"
        SELECT m.id AS module_id, r.id, r.assignment_id, r.title, r.url, r.kind
        FROM resources r
        JOIN assignments a ON r.assignment_id = a.id
        JOIN modules m ON a.module_id = m.id
        WHERE m.course_id = ?
        ORDER BY m.id, a.id, r.id
        "#,
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| (r.module_id, r.resource)).collect())
}
