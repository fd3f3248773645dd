use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::db;
use crate::engine::{EngineConfig, EnrollmentEngine};
use crate::types::{Course, CourseState, NewCourse, Student};

static NEXT_DB: AtomicU32 = AtomicU32::new(0);

/// Fresh file-backed database in the temp directory. File-backed (rather
/// than `:memory:`) so that every pooled connection sees the same data.
fn temp_db_path() -> PathBuf {
    let n = NEXT_DB.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!(
        "enrollment-engine-test-{}-{n}.db",
        std::process::id()
    ));
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
    }
    path
}

/// Engine with generous retries, for tests that are not about contention.
pub async fn setup() -> EnrollmentEngine {
    setup_with(
        EngineConfig {
            conflict_retries: 20,
            retry_backoff: Duration::from_millis(2),
        },
        8,
    )
    .await
}

pub async fn setup_with(config: EngineConfig, max_connections: u32) -> EnrollmentEngine {
    let path = temp_db_path();
    let pool = db::init_pool(&path.display().to_string(), max_connections)
        .await
        .expect("test database");
    EnrollmentEngine::new(pool, config)
}

pub async fn student(engine: &EnrollmentEngine, no: &str) -> Student {
    engine
        .create_student(&format!("Student {no}"), no)
        .await
        .expect("create student")
}

pub async fn funded_student(engine: &EnrollmentEngine, no: &str, amount: i64) -> Student {
    let s = student(engine, no).await;
    if amount > 0 {
        engine
            .load_balance(s.id, amount, "Card top-up")
            .await
            .expect("load balance");
    }
    s
}

/// Create a teacher plus a course and open it.
pub async fn open_course(engine: &EnrollmentEngine, code: &str, capacity: i64, price: i64) -> Course {
    let course = draft_course(engine, code, capacity, price).await;
    engine
        .set_course_state(course.id, CourseState::Open)
        .await
        .expect("open course")
}

pub async fn draft_course(
    engine: &EnrollmentEngine,
    code: &str,
    capacity: i64,
    price: i64,
) -> Course {
    let teacher = engine
        .create_teacher(&format!("Teacher of {code}"), Some("Dr."))
        .await
        .expect("create teacher");
    engine
        .create_course(&NewCourse {
            teacher_id: teacher.id,
            code: code.to_string(),
            name: format!("Course {code}"),
            capacity,
            price,
            min_demand: 2,
        })
        .await
        .expect("create course")
}
