//! # Enrollment transaction engine
//!
//! [`EnrollmentEngine::enroll`] moves a student from "unregistered" to either
//! a confirmed seat or a waitlist place in one SQLite transaction:
//!
//! 1. load the course and check it is open,
//! 2. reject a second registration for the same `(student, course)`,
//! 3. claim a seat with a conditional update (`confirmed_count < capacity`),
//! 4. on success debit the course price and insert a confirmed registration,
//! 5. otherwise append a waitlisted registration at `waitlist_len + 1`.
//!
//! ## Serialization
//!
//! Calls for the same course queue on a per-course async gate, so the
//! read-decide-write sequence for the last seat runs one caller at a time.
//! Every write transaction opens with `BEGIN IMMEDIATE`: it takes SQLite's
//! writer lock before its first read, so writers for different courses queue
//! on the busy timeout instead of failing on a stale snapshot. A writer that
//! still gets `SQLITE_BUSY` (timeout elapsed) is rolled back and retried from
//! scratch, up to [`EngineConfig::conflict_retries`] times.
//!
//! An uncommitted [`sqlx::Transaction`] rolls back when dropped, so a caller
//! that abandons the future never leaves a charged-but-unregistered student.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sqlx::{Sqlite, SqlitePool, Transaction};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::catalog;
use crate::error::{EngineError, Result};
use crate::ledger;
use crate::roster;
use crate::types::{
    CourseState, EnrollOutcome, LedgerEntry, LedgerKind, Registration, RegistrationStatus,
};
use crate::waitlist;

/// Tuning for conflict handling.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Extra attempts after a transaction conflict. Values below 1 are raised to 1.
    pub conflict_retries: u32,
    /// Base delay between attempts; attempt `n` waits `n * retry_backoff`.
    pub retry_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            conflict_retries: 3,
            retry_backoff: Duration::from_millis(10),
        }
    }
}

/// One async mutex per course id, created on first use.
///
/// A gate nobody holds or waits on has a strong count of one (the map's own
/// reference). Such entries are pruned on every acquire, so the map only
/// tracks courses with calls in flight.
#[derive(Debug, Default)]
struct CourseGates {
    gates: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl CourseGates {
    async fn acquire(&self, course_id: i64) -> OwnedMutexGuard<()> {
        let gate = {
            let mut gates = self.gates.lock().await;
            gates.retain(|_, gate| Arc::strong_count(gate) > 1);
            gates.entry(course_id).or_default().clone()
        };
        gate.lock_owned().await
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.gates.lock().await.len()
    }
}

/// Entry point for every state-changing operation of the summer school.
#[derive(Debug, Clone)]
pub struct EnrollmentEngine {
    pool: SqlitePool,
    config: EngineConfig,
    gates: Arc<CourseGates>,
}

impl EnrollmentEngine {
    pub fn new(pool: SqlitePool, config: EngineConfig) -> Self {
        EnrollmentEngine {
            pool,
            config,
            gates: Arc::new(CourseGates::default()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Hold the serialization gate of `course_id` for the guard's lifetime.
    pub(crate) async fn lock_course(&self, course_id: i64) -> OwnedMutexGuard<()> {
        self.gates.acquire(course_id).await
    }

    /// Number of course gates currently tracked.
    #[cfg(test)]
    pub(crate) async fn tracked_gates(&self) -> usize {
        self.gates.len().await
    }

    /// Open a transaction that holds the database writer lock from the start.
    pub(crate) async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    // ─────────────────────────────────────────────────────────
    // Enrollment
    // ─────────────────────────────────────────────────────────

    /// Register `student_id` for `course_id`.
    ///
    /// Returns a confirmed outcome when a seat was free and the price was
    /// collected, or a waitlisted outcome with a 1-based position when the
    /// course was full. No balance is touched on the waitlist path.
    pub async fn enroll(&self, student_id: i64, course_id: i64) -> Result<EnrollOutcome> {
        let _gate = self.lock_course(course_id).await;

        let result = self
            .with_conflict_retry("enroll", move || self.try_enroll(student_id, course_id))
            .await;

        match &result {
            Ok(outcome) => info!(
                student_id,
                course_id,
                registration_id = outcome.registration_id,
                status = outcome.status.as_str(),
                position = ?outcome.position,
                "enrollment committed"
            ),
            Err(EngineError::AlreadyRegistered { .. }) => {
                debug!(student_id, course_id, "student already registered")
            }
            Err(e) => warn!(student_id, course_id, "enrollment rejected: {e}"),
        }
        result
    }

    async fn try_enroll(&self, student_id: i64, course_id: i64) -> Result<EnrollOutcome> {
        let mut tx = self.begin_write().await?;

        let course = catalog::fetch_course(&mut *tx, course_id).await?;
        catalog::ensure_student(&mut *tx, student_id).await?;

        // An existing holder hears `AlreadyRegistered` whatever the course state.
        if roster::is_registered(&mut tx, student_id, course_id).await? {
            return Err(EngineError::AlreadyRegistered {
                student_id,
                course_id,
            });
        }
        if course.state != CourseState::Open {
            return Err(EngineError::CourseNotOpen {
                course_id,
                state: course.state,
            });
        }

        let outcome = if roster::claim_seat(&mut tx, course_id).await? {
            if course.price > 0 {
                let description = format!("Course registration: {} {}", course.code, course.name);
                ledger::debit(
                    &mut tx,
                    student_id,
                    course.price,
                    LedgerKind::Charge,
                    &description,
                    Some(course_id),
                )
                .await?;
            }
            let registration_id = roster::insert_registration(
                &mut tx,
                student_id,
                course_id,
                RegistrationStatus::Confirmed,
                None,
            )
            .await
            .map_err(|e| already_registered_on_unique(e, student_id, course_id))?;
            EnrollOutcome {
                registration_id,
                status: RegistrationStatus::Confirmed,
                position: None,
            }
        } else {
            let (registration_id, position) = waitlist::enqueue(&mut tx, student_id, course_id)
                .await
                .map_err(|e| already_registered_on_unique(e, student_id, course_id))?;
            EnrollOutcome {
                registration_id,
                status: RegistrationStatus::Waitlisted,
                position: Some(position),
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    // ─────────────────────────────────────────────────────────
    // Ledger operations
    // ─────────────────────────────────────────────────────────

    /// Add money to a student's balance (a `load` ledger entry).
    pub async fn load_balance(
        &self,
        student_id: i64,
        amount: i64,
        description: &str,
    ) -> Result<LedgerEntry> {
        self.credit(student_id, amount, LedgerKind::Load, description)
            .await
    }

    /// Return money to a student (a `refund` ledger entry).
    pub async fn refund(
        &self,
        student_id: i64,
        amount: i64,
        description: &str,
    ) -> Result<LedgerEntry> {
        self.credit(student_id, amount, LedgerKind::Refund, description)
            .await
    }

    async fn credit(
        &self,
        student_id: i64,
        amount: i64,
        kind: LedgerKind,
        description: &str,
    ) -> Result<LedgerEntry> {
        let entry = self
            .with_conflict_retry(kind.as_str(), move || async move {
                let mut tx = self.begin_write().await?;
                let entry = ledger::credit(&mut tx, student_id, amount, kind, description).await?;
                tx.commit().await?;
                Ok::<_, EngineError>(entry)
            })
            .await?;
        info!(
            student_id,
            amount,
            kind = kind.as_str(),
            "balance credited"
        );
        Ok(entry)
    }

    pub async fn balance(&self, student_id: i64) -> Result<i64> {
        ledger::balance(&self.pool, student_id).await
    }

    /// Ledger entries of a student, newest first.
    pub async fn ledger_history(&self, student_id: i64) -> Result<Vec<LedgerEntry>> {
        catalog::ensure_student(&self.pool, student_id).await?;
        ledger::history(&self.pool, student_id).await
    }

    // ─────────────────────────────────────────────────────────
    // Roster / waitlist reads
    // ─────────────────────────────────────────────────────────

    /// Confirmed registrations of a course, in admission order.
    pub async fn roster(&self, course_id: i64) -> Result<Vec<Registration>> {
        catalog::fetch_course(&self.pool, course_id).await?;
        roster::list(&self.pool, course_id).await
    }

    /// Waitlisted registrations of a course, by position.
    pub async fn waitlist(&self, course_id: i64) -> Result<Vec<Registration>> {
        catalog::fetch_course(&self.pool, course_id).await?;
        waitlist::list(&self.pool, course_id).await
    }

    // ─────────────────────────────────────────────────────────
    // Conflict handling
    // ─────────────────────────────────────────────────────────

    /// Run `op` until it succeeds, fails for a business reason, or keeps
    /// conflicting after every allowed retry.
    pub(crate) async fn with_conflict_retry<T, F, Fut>(&self, op: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.config.conflict_retries.max(1) + 1;
        let mut tries = 0u32;
        loop {
            tries += 1;
            match attempt().await {
                Err(e) if e.is_conflict() => {
                    if tries >= max_attempts {
                        warn!("{op}: giving up after {tries} conflicting attempts");
                        return Err(EngineError::TransactionConflict { attempts: tries });
                    }
                    debug!("{op}: transaction conflict on attempt {tries}, retrying");
                    tokio::time::sleep(self.config.retry_backoff * tries).await;
                }
                other => return other,
            }
        }
    }
}

/// The `(student_id, course_id)` unique index is the last line of defence
/// against a duplicate registration.
fn already_registered_on_unique(err: EngineError, student_id: i64, course_id: i64) -> EngineError {
    match &err {
        EngineError::Database(sqlx::Error::Database(db_err))
            if db_err.is_unique_violation()
                && db_err.message().contains("registrations.student_id") =>
        {
            EngineError::AlreadyRegistered {
                student_id,
                course_id,
            }
        }
        _ => err,
    }
}
