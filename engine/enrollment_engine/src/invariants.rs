#![allow(dead_code)]

use crate::engine::EnrollmentEngine;
use crate::types::{LedgerKind, RegistrationStatus};

/// Confirmed registrations never exceed the course capacity.
pub async fn assert_capacity_respected(engine: &EnrollmentEngine, course_id: i64) {
    let summary = engine.course(course_id).await.expect("course");
    let roster = engine.roster(course_id).await.expect("roster");
    assert!(
        roster.len() as i64 <= summary.course.capacity,
        "course {} oversold: {} confirmed for {} seats",
        course_id,
        roster.len(),
        summary.course.capacity
    );
    assert_eq!(
        roster.len() as i64,
        summary.course.confirmed_count,
        "course {course_id} seat counter drifted from roster"
    );
}

/// Waitlist positions are exactly 1..=N in order.
pub async fn assert_waitlist_dense(engine: &EnrollmentEngine, course_id: i64) {
    let waitlist = engine.waitlist(course_id).await.expect("waitlist");
    let positions: Vec<i64> = waitlist
        .iter()
        .map(|r| r.waitlist_position.expect("waitlisted registration without position"))
        .collect();
    let expected: Vec<i64> = (1..=waitlist.len() as i64).collect();
    assert_eq!(
        positions, expected,
        "course {course_id} waitlist positions are not dense"
    );
}

/// A student has exactly one charge for a priced course iff they are confirmed in it.
pub async fn assert_charged_iff_confirmed(
    engine: &EnrollmentEngine,
    student_id: i64,
    course_id: i64,
) {
    let charges = engine
        .ledger_history(student_id)
        .await
        .expect("ledger")
        .into_iter()
        .filter(|e| e.kind == LedgerKind::Charge && e.course_id == Some(course_id))
        .count();
    let confirmed = engine
        .student_registrations(student_id)
        .await
        .expect("registrations")
        .iter()
        .any(|r| r.course_id == course_id && r.status == RegistrationStatus::Confirmed);
    assert_eq!(
        charges,
        usize::from(confirmed),
        "student {student_id} has {charges} charges for course {course_id} (confirmed: {confirmed})"
    );
}

/// Cached balance equals the signed ledger sum and is never negative.
pub async fn assert_balance_matches_ledger(engine: &EnrollmentEngine, student_id: i64) {
    let balance = engine.balance(student_id).await.expect("balance");
    let ledger: i64 = engine
        .ledger_history(student_id)
        .await
        .expect("ledger")
        .iter()
        .map(|e| e.kind.sign() * e.amount)
        .sum();
    assert!(balance >= 0, "student {student_id} balance is negative: {balance}");
    assert_eq!(
        balance, ledger,
        "student {student_id} balance {balance} differs from ledger sum {ledger}"
    );
}

/// The full store-wide audit reports nothing.
pub async fn assert_audit_clean(engine: &EnrollmentEngine) {
    let violations = engine.audit().await.expect("audit");
    assert!(violations.is_empty(), "audit found violations: {violations:?}");
}
