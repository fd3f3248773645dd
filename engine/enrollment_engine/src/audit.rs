//! Consistency audit over committed state.
//!
//! Each check is a single aggregate query; the whole audit runs inside one
//! read transaction so it sees a consistent snapshot.

use serde::Serialize;
use sqlx::FromRow;

use crate::engine::EnrollmentEngine;
use crate::error::Result;

/// A broken invariant found by [`EnrollmentEngine::audit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum Violation {
    /// More confirmed registrations than seats.
    Oversold {
        course_id: i64,
        confirmed: i64,
        capacity: i64,
    },
    /// Cached seat counter disagrees with the registrations table.
    ConfirmedCountDrift {
        course_id: i64,
        cached: i64,
        actual: i64,
    },
    /// Waitlist positions are not exactly `1..=waitlist_len`.
    WaitlistGap {
        course_id: i64,
        waitlist_len: i64,
        entries: i64,
        min_position: Option<i64>,
        max_position: Option<i64>,
    },
    /// Charge entries for a priced course do not match the registration status.
    ChargeMismatch {
        student_id: i64,
        course_id: i64,
        charges: i64,
        confirmed: bool,
    },
    /// Cached balance differs from the ledger sum.
    BalanceDrift {
        student_id: i64,
        cached: i64,
        ledger: i64,
    },
    NegativeBalance { student_id: i64, amount: i64 },
}

#[derive(FromRow)]
struct CourseCounts {
    id: i64,
    capacity: i64,
    confirmed_count: i64,
    waitlist_len: i64,
    confirmed: i64,
    waitlisted: i64,
    min_position: Option<i64>,
    max_position: Option<i64>,
}

#[derive(FromRow)]
struct ChargePair {
    student_id: i64,
    course_id: i64,
    charges: i64,
    confirmed: bool,
}

#[derive(FromRow)]
struct BalancePair {
    student_id: i64,
    cached: i64,
    ledger: i64,
}

impl EnrollmentEngine {
    /// Recompute every roster, waitlist and ledger invariant.
    ///
    /// Returns an empty list when the store is consistent.
    pub async fn audit(&self) -> Result<Vec<Violation>> {
        let mut tx = self.pool().begin().await?;
        let mut violations = Vec::new();

        let courses = sqlx::query_as::<_, CourseCounts>(
            r#"
            SELECT c.id, c.capacity, c.confirmed_count, c.waitlist_len,
                   COALESCE(SUM(r.status = 'confirmed'), 0)  AS confirmed,
                   COALESCE(SUM(r.status = 'waitlisted'), 0) AS waitlisted,
                   MIN(r.waitlist_position)                  AS min_position,
                   MAX(r.waitlist_position)                  AS max_position
            FROM   courses c
            LEFT   JOIN registrations r ON r.course_id = c.id
            GROUP  BY c.id
            ORDER  BY c.id
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        for c in courses {
            if c.confirmed > c.capacity {
                violations.push(Violation::Oversold {
                    course_id: c.id,
                    confirmed: c.confirmed,
                    capacity: c.capacity,
                });
            }
            if c.confirmed != c.confirmed_count {
                violations.push(Violation::ConfirmedCountDrift {
                    course_id: c.id,
                    cached: c.confirmed_count,
                    actual: c.confirmed,
                });
            }
            // Positions are unique per course, so count + min + max pin down 1..=N.
            let dense = if c.waitlisted == 0 {
                c.waitlist_len == 0
            } else {
                c.waitlisted == c.waitlist_len
                    && c.min_position == Some(1)
                    && c.max_position == Some(c.waitlisted)
            };
            if !dense {
                violations.push(Violation::WaitlistGap {
                    course_id: c.id,
                    waitlist_len: c.waitlist_len,
                    entries: c.waitlisted,
                    min_position: c.min_position,
                    max_position: c.max_position,
                });
            }
        }

        // Every (student, priced course) pair that has either a registration
        // or a charge: confirmed pairs need exactly one charge, others none.
        let pairs = sqlx::query_as::<_, ChargePair>(
            r#"
            SELECT p.student_id, p.course_id,
                   (SELECT COUNT(*) FROM ledger_entries l
                     WHERE l.kind = 'charge'
                       AND l.student_id = p.student_id
                       AND l.course_id = p.course_id)                AS charges,
                   EXISTS (SELECT 1 FROM registrations r
                            WHERE r.status = 'confirmed'
                              AND r.student_id = p.student_id
                              AND r.course_id = p.course_id)         AS confirmed
            FROM (
                SELECT student_id, course_id FROM registrations
                UNION
                SELECT student_id, course_id FROM ledger_entries
                WHERE  kind = 'charge' AND course_id IS NOT NULL
            ) p
            JOIN courses c ON c.id = p.course_id
            WHERE c.price > 0
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        for p in pairs {
            let expected = if p.confirmed { 1 } else { 0 };
            if p.charges != expected {
                violations.push(Violation::ChargeMismatch {
                    student_id: p.student_id,
                    course_id: p.course_id,
                    charges: p.charges,
                    confirmed: p.confirmed,
                });
            }
        }

        let balances = sqlx::query_as::<_, BalancePair>(
            r#"
            SELECT b.student_id, b.amount AS cached,
                   COALESCE((SELECT SUM(CASE l.kind WHEN 'charge' THEN -l.amount ELSE l.amount END)
                             FROM ledger_entries l
                             WHERE l.student_id = b.student_id), 0) AS ledger
            FROM   balances b
            ORDER  BY b.student_id
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        for b in balances {
            if b.cached < 0 {
                violations.push(Violation::NegativeBalance {
                    student_id: b.student_id,
                    amount: b.cached,
                });
            }
            if b.cached != b.ledger {
                violations.push(Violation::BalanceDrift {
                    student_id: b.student_id,
                    cached: b.cached,
                    ledger: b.ledger,
                });
            }
        }

        tx.commit().await?;
        Ok(violations)
    }
}
