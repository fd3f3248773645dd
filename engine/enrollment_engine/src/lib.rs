//! # Summer School Enrollment Engine
//!
//! Atomic course registration for a two-role (student / teacher) summer
//! school. The crate owns the relational schema and every operation that
//! mutates it:
//!
//! | Area         | Entry point(s)                                                   |
//! |--------------|------------------------------------------------------------------|
//! | Bootstrap    | [`db::init_pool`], [`EnrollmentEngine::new`]                     |
//! | Enrollment   | [`EnrollmentEngine::enroll`]                                     |
//! | Balance      | `load_balance`, `refund`, `balance`, `ledger_history`            |
//! | Catalog      | `create_student`, `update_student`, `create_teacher`, `create_course`, `set_course_state` |
//! | Demand       | `request_course`                                                 |
//! | Grading      | `set_grade`                                                      |
//! | Queries      | `course`, `list_courses`, `roster`, `waitlist`, `student_registrations` |
//! | Consistency  | [`EnrollmentEngine::audit`]                                      |
//!
//! ## Architecture
//!
//! Seat accounting lives in `roster` and `waitlist`, money in `ledger`.
//! [`engine`] composes them into the single enrollment transaction and owns
//! the per-course serialization; [`catalog`] covers the remaining
//! CRUD-style actions.

pub mod audit;
pub mod catalog;
pub mod db;
pub mod engine;
pub mod error;
mod ledger;
mod roster;
pub mod types;
mod waitlist;

#[cfg(test)]
mod invariants;
#[cfg(test)]
mod test_catalog;
#[cfg(test)]
mod test_ledger;
#[cfg(test)]
mod test_retry;
#[cfg(test)]
mod testutil;

pub use audit::Violation;
pub use engine::{EngineConfig, EnrollmentEngine};
pub use error::{EngineError, Result};
pub use types::{
    Course, CourseState, CourseSummary, DemandRequest, EnrollOutcome, LedgerEntry, LedgerKind,
    NewCourse, Registration, RegistrationStatus, Student, Teacher,
};
