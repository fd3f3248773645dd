//! # Roster
//!
//! The confirmed side of a course. `courses.confirmed_count` is the
//! authoritative seat counter used for admission; it is bounded by a
//! `CHECK (confirmed_count <= capacity)` constraint in the schema, so even a
//! buggy caller cannot oversell a course.

use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::error::Result;
use crate::types::{Registration, RegistrationRow, RegistrationStatus};

pub(crate) const REGISTRATION_COLUMNS: &str =
    "id, student_id, course_id, status, waitlist_position, grade, grade_note, created_at";

/// Take one seat if the course is not full.
///
/// Returns `false` when no seat was available at the moment of the update;
/// the caller then falls through to the waitlist.
pub(crate) async fn claim_seat(tx: &mut Transaction<'_, Sqlite>, course_id: i64) -> Result<bool> {
    let updated = sqlx::query(
        r#"
        UPDATE courses
        SET    confirmed_count = confirmed_count + 1
        WHERE  id = ?1 AND confirmed_count < capacity
        "#,
    )
    .bind(course_id)
    .execute(&mut **tx)
    .await?
    .rows_affected();
    Ok(updated == 1)
}

/// Insert a registration row and return its id.
pub(crate) async fn insert_registration(
    tx: &mut Transaction<'_, Sqlite>,
    student_id: i64,
    course_id: i64,
    status: RegistrationStatus,
    waitlist_position: Option<i64>,
) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO registrations (student_id, course_id, status, waitlist_position, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        RETURNING id
        "#,
    )
    .bind(student_id)
    .bind(course_id)
    .bind(status.as_str())
    .bind(waitlist_position)
    .bind(Utc::now().timestamp())
    .fetch_one(&mut **tx)
    .await?;
    Ok(id)
}

/// Whether the student already has a registration of any status in the course.
pub(crate) async fn is_registered(
    tx: &mut Transaction<'_, Sqlite>,
    student_id: i64,
    course_id: i64,
) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM registrations WHERE student_id = ?1 AND course_id = ?2",
    )
    .bind(student_id)
    .bind(course_id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(found.is_some())
}

/// Confirmed registrations of a course, in admission order.
pub(crate) async fn list(pool: &SqlitePool, course_id: i64) -> Result<Vec<Registration>> {
    let rows = sqlx::query_as::<_, RegistrationRow>(&format!(
        r#"
        SELECT {REGISTRATION_COLUMNS}
        FROM   registrations
        WHERE  course_id = ?1 AND status = 'confirmed'
        ORDER  BY id ASC
        "#
    ))
    .bind(course_id)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(Registration::try_from).collect()
}
