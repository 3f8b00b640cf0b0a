#[macro_use]
mod common;

use actix_web::http::StatusCode;
use actix_web::test;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use common::*;

#[actix_web::test]
async fn test_course_lifecycle_and_progress() {
    let ctx = TestContext::new(true).await;
    let app = campus_app!(ctx);
    ctx.create_student("grace@example.org", COMMISSION_CODE).await;
    let teacher = login!(app, TEACHER_EMAIL, TEACHER_PASSWORD);
    let student = login!(app, "grace@example.org", STUDENT_PASSWORD);

    // Course linked to the student's commission
    let req = test::TestRequest::post()
        .uri("/courses")
        .cookie(teacher.clone())
        .set_json(json!({
            "title": "  Introducción a Python ",
            "description": "First steps",
            "commission_codes": [COMMISSION_CODE],
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let course: Value = test::read_body_json(resp).await;
    assert_eq!(course["title"], "Introducción a Python");
    assert_eq!(course["slug"], "introducción-a-python");
    assert_eq!(course["commissions"], json!(["3A"]));
    let course_id = course["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri(&format!("/courses/{course_id}/modules"))
        .cookie(teacher.clone())
        .set_json(json!({ "title": "Unit 1" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let module: Value = test::read_body_json(resp).await;
    let module_id = module["id"].as_i64().unwrap();

    let mut lesson_ids = Vec::new();
    for title in ["Variables", "Loops"] {
        let req = test::TestRequest::post()
            .uri(&format!("/modules/{module_id}/assignments"))
            .cookie(teacher.clone())
            .set_json(json!({ "title": title, "kind": "Lesson" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let lesson: Value = test::read_body_json(resp).await;
        assert!(lesson.get("test_file").is_none());
        lesson_ids.push(lesson["id"].as_i64().unwrap());
    }

    let req = test::TestRequest::get()
        .uri("/dashboard")
        .cookie(student.clone())
        .to_request();
    let dashboard: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(dashboard.as_array().unwrap().len(), 1);
    assert_eq!(dashboard[0]["module_count"], 1);
    assert_eq!(dashboard[0]["assignment_count"], 2);
    assert_eq!(dashboard[0]["completion_percent"], 0);

    // Completing twice is harmless
    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri(&format!("/assignments/{}/complete", lesson_ids[0]))
            .cookie(student.clone())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let req = test::TestRequest::get()
        .uri("/dashboard")
        .cookie(student.clone())
        .to_request();
    let dashboard: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(dashboard[0]["completion_percent"], 50);

    let req = test::TestRequest::get()
        .uri(&format!("/courses/{course_id}"))
        .cookie(student.clone())
        .to_request();
    let detail: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(detail["teacher_name"], "Ada Tester");
    assert_eq!(detail["modules"][0]["progress_percent"], 50);
    assert_eq!(detail["modules"][0]["assignments"][0]["completed"], true);
    assert_eq!(detail["modules"][0]["assignments"][1]["completed"], false);

    // Teachers see their own courses without a completion figure
    let req = test::TestRequest::get()
        .uri("/dashboard")
        .cookie(teacher.clone())
        .to_request();
    let dashboard: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(dashboard[0]["id"], course_id);
    assert!(dashboard[0].get("completion_percent").is_none());
}

#[actix_web::test]
async fn test_deletion_is_refused_while_children_exist() {
    let ctx = TestContext::new(true).await;
    let app = campus_app!(ctx);
    let teacher = login!(app, TEACHER_EMAIL, TEACHER_PASSWORD);

    let req = test::TestRequest::post()
        .uri("/courses")
        .cookie(teacher.clone())
        .set_json(json!({ "title": "Algorithms" }))
        .to_request();
    let course: Value = test::call_and_read_body_json(&app, req).await;
    let course_id = course["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri(&format!("/courses/{course_id}/modules"))
        .cookie(teacher.clone())
        .set_json(json!({ "title": "Sorting" }))
        .to_request();
    let module: Value = test::call_and_read_body_json(&app, req).await;
    let module_id = module["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri(&format!("/modules/{module_id}/assignments"))
        .cookie(teacher.clone())
        .set_json(json!({ "title": "Bubble sort", "kind": "Lesson" }))
        .to_request();
    let lesson: Value = test::call_and_read_body_json(&app, req).await;
    let lesson_id = lesson["id"].as_i64().unwrap();

    let req = test::TestRequest::delete()
        .uri(&format!("/modules/{module_id}"))
        .cookie(teacher.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["reason"], "ERR_INVALID_STATE");
    assert_eq!(body["message"], "module has assignments; delete them first");

    let req = test::TestRequest::delete()
        .uri(&format!("/courses/{course_id}"))
        .cookie(teacher.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Bottom-up deletion succeeds
    for uri in [
        format!("/assignments/{lesson_id}"),
        format!("/modules/{module_id}"),
        format!("/courses/{course_id}"),
    ] {
        let req = test::TestRequest::delete()
            .uri(&uri)
            .cookie(teacher.clone())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT, "DELETE {uri}");
    }

    let req = test::TestRequest::get()
        .uri(&format!("/courses/{course_id}"))
        .cookie(teacher)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], format!("Course {course_id} not found."));
}

#[actix_web::test]
async fn test_access_is_limited_to_owner_and_enrolled_students() {
    let ctx = TestContext::new(true).await;
    let app = campus_app!(ctx);
    ctx.create_student("outsider@example.org", OTHER_COMMISSION_CODE).await;
    let teacher = login!(app, TEACHER_EMAIL, TEACHER_PASSWORD);
    let other_teacher = login!(app, OTHER_TEACHER_EMAIL, OTHER_TEACHER_PASSWORD);
    let outsider = login!(app, "outsider@example.org", STUDENT_PASSWORD);

    let req = test::TestRequest::post()
        .uri("/courses")
        .cookie(teacher.clone())
        .set_json(json!({ "title": "Databases", "commission_codes": [COMMISSION_CODE] }))
        .to_request();
    let course: Value = test::call_and_read_body_json(&app, req).await;
    let course_id = course["id"].as_i64().unwrap();

    for cookie in [other_teacher.clone(), outsider.clone()] {
        let req = test::TestRequest::get()
            .uri(&format!("/courses/{course_id}"))
            .cookie(cookie)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    let req = test::TestRequest::post()
        .uri(&format!("/courses/{course_id}/modules"))
        .cookie(other_teacher)
        .set_json(json!({ "title": "Hijacked" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::get()
        .uri("/dashboard")
        .cookie(outsider)
        .to_request();
    let dashboard: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(dashboard, json!([]));
}

#[actix_web::test]
async fn test_create_course_validation() {
    let ctx = TestContext::new(true).await;
    let app = campus_app!(ctx);
    let teacher = login!(app, TEACHER_EMAIL, TEACHER_PASSWORD);

    for payload in [
        json!({ "title": "   " }),
        json!({ "title": "Networks", "commission_codes": ["UNKNOWN"] }),
    ] {
        let req = test::TestRequest::post()
            .uri("/courses")
            .cookie(teacher.clone())
            .set_json(payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["reason"], "ERR_INVALID_ARGUMENT");
    }
}

#[actix_web::test]
async fn test_materials_and_code_assignment_uploads() {
    let ctx = TestContext::new(true).await;
    let app = campus_app!(ctx);
    ctx.create_student("grace@example.org", COMMISSION_CODE).await;
    let teacher = login!(app, TEACHER_EMAIL, TEACHER_PASSWORD);
    let student = login!(app, "grace@example.org", STUDENT_PASSWORD);

    let req = test::TestRequest::post()
        .uri("/courses")
        .cookie(teacher.clone())
        .set_json(json!({ "title": "Python", "commission_codes": [COMMISSION_CODE] }))
        .to_request();
    let course: Value = test::call_and_read_body_json(&app, req).await;
    let course_id = course["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri(&format!("/courses/{course_id}/modules"))
        .cookie(teacher.clone())
        .set_json(json!({ "title": "Functions" }))
        .to_request();
    let module: Value = test::call_and_read_body_json(&app, req).await;
    let module_id = module["id"].as_i64().unwrap();

    // Code assignments need a Python test file
    for test_file in [Value::Null, json!({ "name": "tests.txt", "content": "x" })] {
        let req = test::TestRequest::post()
            .uri(&format!("/modules/{module_id}/assignments"))
            .cookie(teacher.clone())
            .set_json(json!({ "title": "Sum", "kind": "Quiz", "test_file": test_file }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    let req = test::TestRequest::post()
        .uri(&format!("/modules/{module_id}/assignments"))
        .cookie(teacher.clone())
        .set_json(json!({
            "title": "Sum two numbers",
            "kind": "Quiz",
            "test_file": { "name": "test_sum.py", "content": SUM_TEST_FILE },
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let quiz: Value = test::read_body_json(resp).await;
    let quiz_id = quiz["id"].as_i64().unwrap();

    let stored: Vec<_> = std::fs::read_dir(&ctx.settings.test_files_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].starts_with("sum-two-numbers-"));
    assert!(stored[0].ends_with(".py"));

    // Code assignments complete by passing, not by request
    let req = test::TestRequest::post()
        .uri(&format!("/assignments/{quiz_id}/complete"))
        .cookie(student.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    for (title, url, kind) in [
        ("Slides", "https://example.org/slides.pdf", "PDF"),
        ("Walkthrough", "https://example.org/watch", "Video"),
        ("Docs", "http://docs.python.org", "Link"),
    ] {
        let req = test::TestRequest::post()
            .uri(&format!("/assignments/{quiz_id}/resources"))
            .cookie(teacher.clone())
            .set_json(json!({ "title": title, "url": url, "kind": kind }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    let req = test::TestRequest::post()
        .uri(&format!("/assignments/{quiz_id}/resources"))
        .cookie(teacher.clone())
        .set_json(json!({ "title": "Bad", "url": "ftp://example.org", "kind": "Link" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::get()
        .uri(&format!("/courses/{course_id}/materials"))
        .cookie(student)
        .to_request();
    let materials: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(materials[0]["module_id"], module_id);
    assert_eq!(materials[0]["pdfs"].as_array().unwrap().len(), 1);
    assert_eq!(materials[0]["pdfs"][0]["title"], "Slides");
    assert_eq!(materials[0]["links"].as_array().unwrap().len(), 2);

    // Deleting the assignment removes its stored test file
    let req = test::TestRequest::delete()
        .uri(&format!("/assignments/{quiz_id}"))
        .cookie(teacher)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        std::fs::read_dir(&ctx.settings.test_files_dir).unwrap().count(),
        0
    );
}
