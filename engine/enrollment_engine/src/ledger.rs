//! # Ledger & balance store
//!
//! The ledger is append-only. Each student also has a cached running balance
//! in `balances`, which is only ever changed by [`credit`] and [`debit`]. Both
//! take an open transaction so that the entry and the balance change commit
//! or roll back together with whatever the caller is doing.
//!
//! | Kind     | Effect on balance |
//! |----------|-------------------|
//! | `load`   | `+amount`         |
//! | `refund` | `+amount`         |
//! | `charge` | `-amount`         |

use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::error::{EngineError, Result};
use crate::types::{LedgerEntry, LedgerKind, LedgerRow};

/// Add `amount` to the student's balance and record it.
pub(crate) async fn credit(
    tx: &mut Transaction<'_, Sqlite>,
    student_id: i64,
    amount: i64,
    kind: LedgerKind,
    description: &str,
) -> Result<LedgerEntry> {
    if kind.sign() < 0 {
        return Err(EngineError::Validation(format!(
            "{} entries cannot be credited",
            kind.as_str()
        )));
    }
    require_positive(amount)?;

    let updated = sqlx::query("UPDATE balances SET amount = amount + ?1 WHERE student_id = ?2")
        .bind(amount)
        .bind(student_id)
        .execute(&mut **tx)
        .await?
        .rows_affected();
    if updated == 0 {
        return Err(EngineError::StudentNotFound(student_id));
    }

    append(tx, student_id, kind, amount, description, None).await
}

/// Take `amount` from the student's balance and record it.
///
/// The balance check and the subtraction are a single conditional update, so
/// the balance can never go below zero even if another transaction changed it
/// since the caller last looked.
pub(crate) async fn debit(
    tx: &mut Transaction<'_, Sqlite>,
    student_id: i64,
    amount: i64,
    kind: LedgerKind,
    description: &str,
    course_id: Option<i64>,
) -> Result<LedgerEntry> {
    if kind.sign() > 0 {
        return Err(EngineError::Validation(format!(
            "{} entries cannot be debited",
            kind.as_str()
        )));
    }
    require_positive(amount)?;

    let updated = sqlx::query(
        "UPDATE balances SET amount = amount - ?1 WHERE student_id = ?2 AND amount >= ?1",
    )
    .bind(amount)
    .bind(student_id)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    if updated == 0 {
        let available: Option<i64> =
            sqlx::query_scalar("SELECT amount FROM balances WHERE student_id = ?1")
                .bind(student_id)
                .fetch_optional(&mut **tx)
                .await?;
        return Err(match available {
            Some(available) => EngineError::InsufficientBalance {
                student_id,
                required: amount,
                available,
            },
            None => EngineError::StudentNotFound(student_id),
        });
    }

    append(tx, student_id, kind, amount, description, course_id).await
}

async fn append(
    tx: &mut Transaction<'_, Sqlite>,
    student_id: i64,
    kind: LedgerKind,
    amount: i64,
    description: &str,
    course_id: Option<i64>,
) -> Result<LedgerEntry> {
    let created_at = Utc::now().timestamp();
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO ledger_entries (student_id, kind, amount, description, course_id, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        RETURNING id
        "#,
    )
    .bind(student_id)
    .bind(kind.as_str())
    .bind(amount)
    .bind(description)
    .bind(course_id)
    .bind(created_at)
    .fetch_one(&mut **tx)
    .await?;

    Ok(LedgerEntry {
        id,
        student_id,
        kind,
        amount,
        description: description.to_string(),
        course_id,
        created_at,
    })
}

fn require_positive(amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(EngineError::Validation(format!(
            "ledger amount must be positive, got {amount}"
        )));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────

/// Current cached balance of a student.
pub(crate) async fn balance(pool: &SqlitePool, student_id: i64) -> Result<i64> {
    let amount: Option<i64> =
        sqlx::query_scalar("SELECT amount FROM balances WHERE student_id = ?1")
            .bind(student_id)
            .fetch_optional(pool)
            .await?;
    amount.ok_or(EngineError::StudentNotFound(student_id))
}

/// A student's ledger, newest entry first.
pub(crate) async fn history(pool: &SqlitePool, student_id: i64) -> Result<Vec<LedgerEntry>> {
    let rows = sqlx::query_as::<_, LedgerRow>(
        r#"
        SELECT id, student_id, kind, amount, description, course_id, created_at
        FROM   ledger_entries
        WHERE  student_id = ?1
        ORDER  BY created_at DESC, id DESC
        "#,
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(LedgerEntry::try_from).collect()
}
