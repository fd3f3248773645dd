//! Students, teachers, courses and the teacher-side actions around them:
//! course lifecycle, demand requests for draft courses, and grading.

use chrono::Utc;
use sqlx::{Executor, Sqlite};
use tracing::info;

use crate::engine::EnrollmentEngine;
use crate::error::{EngineError, Result};
use crate::roster::REGISTRATION_COLUMNS;
use crate::types::{
    Course, CourseRow, CourseState, CourseSummary, DemandRequest, NewCourse, Registration,
    RegistrationRow, RegistrationStatus, Student, Teacher,
};

const COURSE_COLUMNS: &str = "id, teacher_id, code, name, capacity, price, min_demand, state, \
                              confirmed_count, waitlist_len, created_at";

/// Highest grade a teacher may record.
pub const MAX_GRADE: i64 = 100;

// ─────────────────────────────────────────────────────────
// Lookup helpers (usable on the pool or inside a transaction)
// ─────────────────────────────────────────────────────────

pub(crate) async fn fetch_course<'e, E>(executor: E, course_id: i64) -> Result<Course>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, CourseRow>(&format!(
        "SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?1"
    ))
    .bind(course_id)
    .fetch_optional(executor)
    .await?
    .ok_or(EngineError::CourseNotFound(course_id))?;
    Course::try_from(row)
}

pub(crate) async fn fetch_student<'e, E>(executor: E, student_id: i64) -> Result<Student>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Student>(
        "SELECT id, full_name, student_no, created_at FROM students WHERE id = ?1",
    )
    .bind(student_id)
    .fetch_optional(executor)
    .await?
    .ok_or(EngineError::StudentNotFound(student_id))
}

pub(crate) async fn ensure_student<'e, E>(executor: E, student_id: i64) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM students WHERE id = ?1")
        .bind(student_id)
        .fetch_optional(executor)
        .await?;
    found
        .map(|_| ())
        .ok_or(EngineError::StudentNotFound(student_id))
}

async fn fetch_registration<'e, E>(executor: E, registration_id: i64) -> Result<Registration>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, RegistrationRow>(&format!(
        "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE id = ?1"
    ))
    .bind(registration_id)
    .fetch_optional(executor)
    .await?
    .ok_or(EngineError::RegistrationNotFound(registration_id))?;
    Registration::try_from(row)
}

async fn demand_count<'e, E>(executor: E, course_id: i64) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM demand_requests WHERE course_id = ?1")
            .bind(course_id)
            .fetch_one(executor)
            .await?;
    Ok(count)
}

fn unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

fn student_no_taken(err: sqlx::Error, student_no: &str) -> EngineError {
    if unique_violation(&err) {
        EngineError::Validation(format!("student number {student_no} is already in use"))
    } else {
        err.into()
    }
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(EngineError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

impl EnrollmentEngine {
    // ─────────────────────────────────────────────────────────
    // Students & teachers
    // ─────────────────────────────────────────────────────────

    /// Create a student together with an empty balance.
    pub async fn create_student(&self, full_name: &str, student_no: &str) -> Result<Student> {
        require_text("full_name", full_name)?;
        require_text("student_no", student_no)?;

        let created_at = Utc::now().timestamp();
        let id = self
            .with_conflict_retry("create_student", move || async move {
                let mut tx = self.begin_write().await?;
                let id: i64 = sqlx::query_scalar(
                    "INSERT INTO students (full_name, student_no, created_at) VALUES (?1, ?2, ?3) RETURNING id",
                )
                .bind(full_name)
                .bind(student_no)
                .bind(created_at)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| student_no_taken(e, student_no))?;
                sqlx::query("INSERT INTO balances (student_id, amount) VALUES (?1, 0)")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
                Ok::<_, EngineError>(id)
            })
            .await?;

        info!(student_id = id, "student created");
        Ok(Student {
            id,
            full_name: full_name.to_string(),
            student_no: student_no.to_string(),
            created_at,
        })
    }

    pub async fn student(&self, student_id: i64) -> Result<Student> {
        fetch_student(self.pool(), student_id).await
    }

    /// Change a student's name and number.
    pub async fn update_student(
        &self,
        student_id: i64,
        full_name: &str,
        student_no: &str,
    ) -> Result<Student> {
        require_text("full_name", full_name)?;
        require_text("student_no", student_no)?;

        self.with_conflict_retry("update_student", move || async move {
            let mut tx = self.begin_write().await?;
            let updated =
                sqlx::query("UPDATE students SET full_name = ?1, student_no = ?2 WHERE id = ?3")
                    .bind(full_name)
                    .bind(student_no)
                    .bind(student_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| student_no_taken(e, student_no))?
                    .rows_affected();
            if updated == 0 {
                return Err(EngineError::StudentNotFound(student_id));
            }
            let student = fetch_student(&mut *tx, student_id).await?;
            tx.commit().await?;
            Ok(student)
        })
        .await
    }

    pub async fn create_teacher(&self, full_name: &str, title: Option<&str>) -> Result<Teacher> {
        require_text("full_name", full_name)?;

        let created_at = Utc::now().timestamp();
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO teachers (full_name, title, created_at) VALUES (?1, ?2, ?3) RETURNING id",
        )
        .bind(full_name)
        .bind(title)
        .bind(created_at)
        .fetch_one(self.pool())
        .await?;

        info!(teacher_id = id, "teacher created");
        Ok(Teacher {
            id,
            full_name: full_name.to_string(),
            title: title.map(str::to_string),
            created_at,
        })
    }

    // ─────────────────────────────────────────────────────────
    // Courses
    // ─────────────────────────────────────────────────────────

    /// Create a course in the `draft` state.
    pub async fn create_course(&self, new: &NewCourse) -> Result<Course> {
        require_text("code", &new.code)?;
        require_text("name", &new.name)?;
        if new.capacity <= 0 {
            return Err(EngineError::Validation(
                "capacity must be a positive integer".to_string(),
            ));
        }
        if new.price < 0 {
            return Err(EngineError::Validation("price must not be negative".to_string()));
        }
        if new.min_demand < 0 {
            return Err(EngineError::Validation(
                "min_demand must not be negative".to_string(),
            ));
        }

        let course = self
            .with_conflict_retry("create_course", move || async move {
                let mut tx = self.begin_write().await?;
                let teacher: Option<i64> =
                    sqlx::query_scalar("SELECT id FROM teachers WHERE id = ?1")
                        .bind(new.teacher_id)
                        .fetch_optional(&mut *tx)
                        .await?;
                if teacher.is_none() {
                    return Err(EngineError::TeacherNotFound(new.teacher_id));
                }

                let id: i64 = sqlx::query_scalar(
                    r#"
                    INSERT INTO courses (teacher_id, code, name, capacity, price, min_demand, state, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'draft', ?7)
                    RETURNING id
                    "#,
                )
                .bind(new.teacher_id)
                .bind(&new.code)
                .bind(&new.name)
                .bind(new.capacity)
                .bind(new.price)
                .bind(new.min_demand)
                .bind(Utc::now().timestamp())
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| {
                    if unique_violation(&e) {
                        EngineError::Validation(format!(
                            "course code {} is already in use",
                            new.code
                        ))
                    } else {
                        e.into()
                    }
                })?;
                let course = fetch_course(&mut *tx, id).await?;
                tx.commit().await?;
                Ok(course)
            })
            .await?;

        info!(course_id = course.id, code = %course.code, "course created");
        Ok(course)
    }

    /// Course with occupancy and demand figures.
    pub async fn course(&self, course_id: i64) -> Result<CourseSummary> {
        let course = fetch_course(self.pool(), course_id).await?;
        let demand = demand_count(self.pool(), course_id).await?;
        Ok(CourseSummary::new(course, demand))
    }

    /// All courses, optionally restricted to one state, newest first.
    pub async fn list_courses(&self, state: Option<CourseState>) -> Result<Vec<CourseSummary>> {
        let rows = sqlx::query_as::<_, CourseRow>(&format!(
            r#"
            SELECT {COURSE_COLUMNS}
            FROM   courses
            WHERE  ?1 IS NULL OR state = ?1
            ORDER  BY created_at DESC, id DESC
            "#
        ))
        .bind(state.map(|s| s.as_str()))
        .fetch_all(self.pool())
        .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let course = Course::try_from(row)?;
            let demand = demand_count(self.pool(), course.id).await?;
            summaries.push(CourseSummary::new(course, demand));
        }
        Ok(summaries)
    }

    /// Move a course through its lifecycle.
    ///
    /// Holds the course gate so that no enrollment observes a half-changed
    /// state.
    pub async fn set_course_state(&self, course_id: i64, target: CourseState) -> Result<Course> {
        let _gate = self.lock_course(course_id).await;

        self.with_conflict_retry("set_course_state", move || async move {
            let mut tx = self.begin_write().await?;
            let course = fetch_course(&mut *tx, course_id).await?;
            if !course.state.can_transition_to(target) {
                return Err(EngineError::InvalidTransition {
                    from: course.state,
                    to: target,
                });
            }
            sqlx::query("UPDATE courses SET state = ?1 WHERE id = ?2")
                .bind(target.as_str())
                .bind(course_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            info!(course_id, from = %course.state, to = %target, "course state changed");
            Ok(Course {
                state: target,
                ..course
            })
        })
        .await
    }

    // ─────────────────────────────────────────────────────────
    // Demand requests
    // ─────────────────────────────────────────────────────────

    /// Record a student's interest in a draft course.
    pub async fn request_course(&self, student_id: i64, course_id: i64) -> Result<DemandRequest> {
        let request = self
            .with_conflict_retry("request_course", move || async move {
                let mut tx = self.begin_write().await?;
                let course = fetch_course(&mut *tx, course_id).await?;
                if course.state != CourseState::Draft {
                    return Err(EngineError::CourseNotDraft {
                        course_id,
                        state: course.state,
                    });
                }
                ensure_student(&mut *tx, student_id).await?;

                let created_at = Utc::now().timestamp();
                let id: i64 = sqlx::query_scalar(
                    r#"
                    INSERT INTO demand_requests (student_id, course_id, created_at)
                    VALUES (?1, ?2, ?3)
                    RETURNING id
                    "#,
                )
                .bind(student_id)
                .bind(course_id)
                .bind(created_at)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| {
                    if unique_violation(&e) {
                        EngineError::AlreadyRequested {
                            student_id,
                            course_id,
                        }
                    } else {
                        e.into()
                    }
                })?;
                tx.commit().await?;
                Ok(DemandRequest {
                    id,
                    student_id,
                    course_id,
                    created_at,
                })
            })
            .await?;

        info!(student_id, course_id, "demand request recorded");
        Ok(request)
    }

    // ─────────────────────────────────────────────────────────
    // Registrations & grading
    // ─────────────────────────────────────────────────────────

    /// Every registration of a student, confirmed and waitlisted, newest first.
    pub async fn student_registrations(&self, student_id: i64) -> Result<Vec<Registration>> {
        ensure_student(self.pool(), student_id).await?;
        let rows = sqlx::query_as::<_, RegistrationRow>(&format!(
            r#"
            SELECT {REGISTRATION_COLUMNS}
            FROM   registrations
            WHERE  student_id = ?1
            ORDER  BY created_at DESC, id DESC
            "#
        ))
        .bind(student_id)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(Registration::try_from).collect()
    }

    /// Record (or clear, with `None`) a grade and note on a confirmed registration.
    pub async fn set_grade(
        &self,
        registration_id: i64,
        grade: Option<i64>,
        note: Option<&str>,
    ) -> Result<Registration> {
        if let Some(grade) = grade {
            if !(0..=MAX_GRADE).contains(&grade) {
                return Err(EngineError::Validation(format!(
                    "grade must be between 0 and {MAX_GRADE}, got {grade}"
                )));
            }
        }
        let note = note.map(str::trim).filter(|n| !n.is_empty());

        let registration = self
            .with_conflict_retry("set_grade", move || async move {
                let mut tx = self.begin_write().await?;
                let registration = fetch_registration(&mut *tx, registration_id).await?;
                if registration.status != RegistrationStatus::Confirmed {
                    return Err(EngineError::NotConfirmed(registration_id));
                }
                sqlx::query("UPDATE registrations SET grade = ?1, grade_note = ?2 WHERE id = ?3")
                    .bind(grade)
                    .bind(note)
                    .bind(registration_id)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
                Ok(Registration {
                    grade,
                    grade_note: note.map(str::to_string),
                    ..registration
                })
            })
            .await?;

        info!(registration_id, ?grade, "grade recorded");
        Ok(registration)
    }
}
