use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, sqlx::Type, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum Role {
    Student,
    Teacher,
}

#[derive(Serialize, Deserialize, sqlx::Type, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentKind {
    Lesson,
    Quiz,
    Project,
}

impl AssignmentKind {
    /// Quizzes and projects are graded from submitted code
    pub fn is_code(self) -> bool {
        matches!(self, Self::Quiz | Self::Project)
    }
}

#[derive(Serialize, Deserialize, sqlx::Type, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    #[serde(rename = "PDF")]
    #[sqlx(rename = "PDF")]
    Pdf,
    Video,
    Link,
}

#[derive(Serialize, Deserialize, sqlx::Type, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Queueing,
    Running,
    Finished,
    Canceled,
}

#[derive(Serialize, Deserialize, sqlx::Type, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Waiting,
    Running,
    Passed,
    Failed,
    Error,
    #[serde(rename = "Time Limit Exceeded")]
    #[sqlx(rename = "Time Limit Exceeded")]
    TimeLimitExceeded,
    #[serde(rename = "System Error")]
    #[sqlx(rename = "System Error")]
    SystemError,
    Skipped,
}

/// Teacher-facing review status derived from `is_successful`
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReviewStatus {
    Approved,
    Rejected,
    Pending,
}

impl ReviewStatus {
    pub fn from_success(is_successful: Option<bool>) -> Self {
        match is_successful {
            Some(true) => Self::Approved,
            Some(false) => Self::Rejected,
            None => Self::Pending,
        }
    }

    pub fn to_success(self) -> Option<bool> {
        match self {
            Self::Approved => Some(true),
            Self::Rejected => Some(false),
            Self::Pending => None,
        }
    }
}

#[derive(Serialize, sqlx::FromRow, Debug, Clone)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub last_name: String,
    pub email: String,
    pub dni: Option<String>,
    pub birth_date: Option<String>,
    pub role: Role,
    pub commission_id: Option<i64>,
}

impl User {
    pub fn is_teacher(&self) -> bool {
        self.role == Role::Teacher
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.name, self.last_name)
    }
}

#[derive(Serialize, sqlx::FromRow, Debug, Clone)]
pub struct Commission {
    pub id: i64,
    pub name: String,
    pub registration_code: String,
}

#[derive(Serialize, sqlx::FromRow, Debug, Clone)]
pub struct Course {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub teacher_id: i64,
    pub created_time: String,
}

#[derive(Serialize, sqlx::FromRow, Debug, Clone)]
pub struct Module {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub created_time: String,
}

#[derive(Serialize, sqlx::FromRow, Debug, Clone)]
pub struct Assignment {
    pub id: i64,
    pub module_id: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub kind: AssignmentKind,
    #[serde(skip_serializing)]
    pub test_file: Option<String>,
    pub created_time: String,
}

#[derive(Serialize, sqlx::FromRow, Debug, Clone)]
pub struct Resource {
    pub id: i64,
    pub assignment_id: i64,
    pub title: String,
    pub url: String,
    pub kind: ResourceKind,
}

#[derive(Serialize, Deserialize, sqlx::FromRow, Debug, Clone, PartialEq)]
pub struct TestOutcome {
    pub index: i64,
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub raw: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SubmissionRecord {
    pub id: i64,
    pub assignment_id: i64,
    pub student_id: i64,
    pub code: String,
    pub state: SubmissionState,
    pub verdict: Verdict,
    pub is_successful: Option<bool>,
    pub message: String,
    pub execution_time_ms: Option<i64>,
    pub teacher_comment: Option<String>,
    pub submitted_time: String,
    pub updated_time: String,
    pub tests: Vec<TestOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_status_round_trip() {
        for status in [
            ReviewStatus::Approved,
            ReviewStatus::Rejected,
            ReviewStatus::Pending,
        ] {
            assert_eq!(ReviewStatus::from_success(status.to_success()), status);
        }
    }

    #[test]
    fn test_verdict_serialization() {
        assert_eq!(
            serde_json::to_string(&Verdict::TimeLimitExceeded).unwrap(),
            "\"Time Limit Exceeded\""
        );
        assert_eq!(serde_json::to_string(&ResourceKind::Pdf).unwrap(), "\"PDF\"");
        assert_eq!(serde_json::to_string(&Role::Teacher).unwrap(), "\"TEACHER\"");
        assert!(AssignmentKind::Project.is_code());
        assert!(!AssignmentKind::Lesson.is_code());
    }
}
