//! # Waitlist
//!
//! Overflow queue of a full course. Positions are dense and start at 1:
//! `courses.waitlist_len` always equals the highest position handed out, and
//! the next arrival receives `waitlist_len + 1`. Because the increment and
//! the insert share the enrollment transaction, positions follow commit order.
//!
//! Promotion (removing position 1, confirming it and shifting the rest down by
//! one) fits this layout without schema changes but is not offered yet.

use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::error::{EngineError, Result};
use crate::roster::{self, REGISTRATION_COLUMNS};
use crate::types::{Registration, RegistrationRow, RegistrationStatus};

/// Append the student to the end of the course waitlist.
///
/// Returns `(registration_id, position)`.
pub(crate) async fn enqueue(
    tx: &mut Transaction<'_, Sqlite>,
    student_id: i64,
    course_id: i64,
) -> Result<(i64, i64)> {
    let position: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE courses
        SET    waitlist_len = waitlist_len + 1
        WHERE  id = ?1
        RETURNING waitlist_len
        "#,
    )
    .bind(course_id)
    .fetch_optional(&mut **tx)
    .await?;
    let position = position.ok_or(EngineError::CourseNotFound(course_id))?;

    let registration_id = roster::insert_registration(
        tx,
        student_id,
        course_id,
        RegistrationStatus::Waitlisted,
        Some(position),
    )
    .await?;

    Ok((registration_id, position))
}

/// Waitlisted registrations of a course, by position.
pub(crate) async fn list(pool: &SqlitePool, course_id: i64) -> Result<Vec<Registration>> {
    let rows = sqlx::query_as::<_, RegistrationRow>(&format!(
        r#"
        SELECT {REGISTRATION_COLUMNS}
        FROM   registrations
        WHERE  course_id = ?1 AND status = 'waitlisted'
        ORDER  BY waitlist_position ASC
        "#
    ))
    .bind(course_id)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(Registration::try_from).collect()
}
