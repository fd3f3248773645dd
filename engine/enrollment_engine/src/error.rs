//! Engine-wide error types.

use thiserror::Error;

use crate::types::CourseState;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The student already holds a confirmed or waitlisted place in the course.
    /// Callers should treat this as success-equivalent.
    #[error("student {student_id} is already registered for course {course_id}")]
    AlreadyRegistered { student_id: i64, course_id: i64 },

    #[error("course {course_id} is not open for registration (state: {state})")]
    CourseNotOpen { course_id: i64, state: CourseState },

    #[error("insufficient balance for student {student_id}: required {required}, available {available}")]
    InsufficientBalance {
        student_id: i64,
        required: i64,
        available: i64,
    },

    /// Serialization conflict that survived every internal retry.
    #[error("transaction conflict persisted after {attempts} attempts")]
    TransactionConflict { attempts: u32 },

    #[error("course {0} not found")]
    CourseNotFound(i64),

    #[error("student {0} not found")]
    StudentNotFound(i64),

    #[error("teacher {0} not found")]
    TeacherNotFound(i64),

    #[error("registration {0} not found")]
    RegistrationNotFound(i64),

    #[error("invalid course state transition from {from} to {to}")]
    InvalidTransition { from: CourseState, to: CourseState },

    #[error("course {course_id} is not accepting demand requests (state: {state})")]
    CourseNotDraft { course_id: i64, state: CourseState },

    #[error("student {student_id} already requested course {course_id}")]
    AlreadyRequested { student_id: i64, course_id: i64 },

    #[error("registration {0} is not confirmed")]
    NotConfirmed(i64),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl EngineError {
    /// Short machine-readable identifier, stable across releases.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AlreadyRegistered { .. } => "already_registered",
            Self::CourseNotOpen { .. } => "course_not_open",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::TransactionConflict { .. } => "transaction_conflict",
            Self::CourseNotFound(_) => "course_not_found",
            Self::StudentNotFound(_) => "student_not_found",
            Self::TeacherNotFound(_) => "teacher_not_found",
            Self::RegistrationNotFound(_) => "registration_not_found",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::CourseNotDraft { .. } => "course_not_draft",
            Self::AlreadyRequested { .. } => "already_requested",
            Self::NotConfirmed(_) => "not_confirmed",
            Self::Validation(_) => "validation",
            Self::Database(_) => "database",
            Self::Migrate(_) => "migration",
        }
    }

    /// `true` when the underlying store refused the transaction because another
    /// writer held or invalidated the lock (`SQLITE_BUSY`, `SQLITE_LOCKED` and
    /// their extended codes such as `SQLITE_BUSY_SNAPSHOT`).
    pub(crate) fn is_conflict(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(db_err)) => db_err
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
                .unwrap_or(false),
            _ => false,
        }
    }
}

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

pub type Result<T> = std::result::Result<T, EngineError>;
