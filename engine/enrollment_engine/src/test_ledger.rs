use crate::error::EngineError;
use crate::invariants::{assert_audit_clean, assert_balance_matches_ledger};
use crate::testutil::{funded_student, open_course, setup, student};
use crate::types::LedgerKind;

#[tokio::test]
async fn test_new_student_starts_with_zero_balance() {
    let engine = setup().await;
    let s = student(&engine, "L001").await;

    assert_eq!(engine.balance(s.id).await.unwrap(), 0);
    assert!(engine.ledger_history(s.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_load_and_refund_credit_the_balance() {
    let engine = setup().await;
    let s = student(&engine, "L002").await;

    let load = engine.load_balance(s.id, 300, "Card top-up").await.unwrap();
    assert_eq!(load.kind, LedgerKind::Load);
    assert_eq!(load.amount, 300);

    let refund = engine.refund(s.id, 45, "Goodwill").await.unwrap();
    assert_eq!(refund.kind, LedgerKind::Refund);

    assert_eq!(engine.balance(s.id).await.unwrap(), 345);
    assert_balance_matches_ledger(&engine, s.id).await;
}

#[tokio::test]
async fn test_history_is_newest_first() {
    let engine = setup().await;
    let course = open_course(&engine, "HIST1", 5, 120).await;
    let s = funded_student(&engine, "L003", 200).await;
    engine.enroll(s.id, course.id).await.unwrap();
    engine.refund(s.id, 20, "Partial refund").await.unwrap();

    let kinds: Vec<LedgerKind> = engine
        .ledger_history(s.id)
        .await
        .unwrap()
        .iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![LedgerKind::Refund, LedgerKind::Charge, LedgerKind::Load]
    );
    assert_eq!(engine.balance(s.id).await.unwrap(), 100);
    assert_audit_clean(&engine).await;
}

#[tokio::test]
async fn test_non_positive_amounts_are_rejected() {
    let engine = setup().await;
    let s = student(&engine, "L004").await;

    for amount in [0, -10] {
        let err = engine.load_balance(s.id, amount, "bad").await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)), "{err:?}");
    }
    assert!(engine.ledger_history(s.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_student_has_no_balance() {
    let engine = setup().await;

    assert!(matches!(
        engine.balance(42).await.unwrap_err(),
        EngineError::StudentNotFound(42)
    ));
    assert!(matches!(
        engine.load_balance(42, 10, "orphan").await.unwrap_err(),
        EngineError::StudentNotFound(42)
    ));
    assert!(matches!(
        engine.ledger_history(42).await.unwrap_err(),
        EngineError::StudentNotFound(42)
    ));
}
