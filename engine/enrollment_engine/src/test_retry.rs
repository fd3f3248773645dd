use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use sqlx::error::{DatabaseError, ErrorKind};

use crate::engine::EngineConfig;
use crate::error::{EngineError, Result};
use crate::testutil::setup_with;

/// Driver error carrying a raw SQLite result code.
#[derive(Debug)]
struct CodedError(&'static str);

impl fmt::Display for CodedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sqlite result code {}", self.0)
    }
}

impl StdError for CodedError {}

impl DatabaseError for CodedError {
    fn message(&self) -> &str {
        "database is locked"
    }

    fn code(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(self.0))
    }

    fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self
    }

    fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
        self
    }

    fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
        self
    }

    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

fn coded(code: &'static str) -> EngineError {
    EngineError::Database(sqlx::Error::Database(Box::new(CodedError(code))))
}

fn config(conflict_retries: u32) -> EngineConfig {
    EngineConfig {
        conflict_retries,
        retry_backoff: Duration::from_millis(1),
    }
}

#[test]
fn test_busy_and_locked_codes_are_conflicts() {
    // BUSY, BUSY_SNAPSHOT, LOCKED, LOCKED_SHAREDCACHE
    for code in ["5", "517", "6", "262"] {
        assert!(coded(code).is_conflict(), "code {code} should be a conflict");
    }
    // CONSTRAINT_UNIQUE, IOERR
    for code in ["2067", "10"] {
        assert!(!coded(code).is_conflict(), "code {code} is not a conflict");
    }
    assert!(!EngineError::Validation("x".to_string()).is_conflict());
    assert!(!EngineError::Database(sqlx::Error::RowNotFound).is_conflict());
}

#[tokio::test]
async fn test_persistent_conflict_surfaces_after_all_retries() {
    let engine = setup_with(config(3), 1).await;
    let mut attempts = 0u32;

    let result: Result<()> = engine
        .with_conflict_retry("busy", || {
            attempts += 1;
            async { Err(coded("5")) }
        })
        .await;

    assert_eq!(attempts, 4);
    assert!(matches!(
        result,
        Err(EngineError::TransactionConflict { attempts: 4 })
    ));
}

#[tokio::test]
async fn test_zero_retries_still_retries_once() {
    let engine = setup_with(config(0), 1).await;
    let mut attempts = 0u32;

    let result: Result<()> = engine
        .with_conflict_retry("busy", || {
            attempts += 1;
            async { Err(coded("517")) }
        })
        .await;

    assert_eq!(attempts, 2);
    assert!(matches!(
        result,
        Err(EngineError::TransactionConflict { attempts: 2 })
    ));
}

#[tokio::test]
async fn test_conflict_then_success_returns_the_value() {
    let engine = setup_with(config(3), 1).await;
    let mut attempts = 0u32;

    let result = engine
        .with_conflict_retry("flaky", || {
            attempts += 1;
            let first = attempts == 1;
            async move {
                if first {
                    Err(coded("5"))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), 7);
    assert_eq!(attempts, 2);
}

#[tokio::test]
async fn test_business_errors_are_not_retried() {
    let engine = setup_with(config(3), 1).await;
    let mut attempts = 0u32;

    let result: Result<()> = engine
        .with_conflict_retry("reject", || {
            attempts += 1;
            async { Err(EngineError::CourseNotFound(9)) }
        })
        .await;

    assert_eq!(attempts, 1);
    assert!(matches!(result, Err(EngineError::CourseNotFound(9))));
}
