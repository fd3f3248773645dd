//! # Types
//!
//! Shared data structures used across the engine.
//!
//! ## Course lifecycle
//!
//! [`CourseState`] follows the teacher approval flow:
//!
//! ```text
//! Draft ──► Open ──► Cancelled
//!             ▲          │
//!             └──────────┤
//! Draft ◄────────────────┘
//! ```
//!
//! Only `Open` courses accept enrollments; only `Draft` courses accept demand
//! requests.
//!
//! ## Storage rows
//!
//! Enumerations are persisted as short text identifiers (see the `as_str`
//! helpers). The `*Row` structs mirror the tables one-to-one and are converted
//! into the public types with [`TryFrom`], rejecting unknown identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Lifecycle state of a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseState {
    /// Created by a teacher; collecting demand requests.
    Draft,
    /// Accepting enrollments.
    Open,
    /// Closed by the teacher.
    Cancelled,
}

impl CourseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Open => "open",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "open" => Some(Self::Open),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether a teacher may move a course from `self` to `to`.
    pub fn can_transition_to(&self, to: CourseState) -> bool {
        matches!(
            (self, to),
            (Self::Draft, Self::Open)
                | (Self::Open, Self::Cancelled)
                | (Self::Cancelled, Self::Open)
                | (Self::Cancelled, Self::Draft)
        )
    }
}

impl fmt::Display for CourseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a registration holds a seat or waits for one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Confirmed,
    Waitlisted,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Waitlisted => "waitlisted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "confirmed" => Some(Self::Confirmed),
            "waitlisted" => Some(Self::Waitlisted),
            _ => None,
        }
    }
}

/// Kind of a balance-affecting ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    /// Money added by the student.
    Load,
    /// Course fee collected on a confirmed registration.
    Charge,
    /// Money returned to the student.
    Refund,
}

impl LedgerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Charge => "charge",
            Self::Refund => "refund",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "load" => Some(Self::Load),
            "charge" => Some(Self::Charge),
            "refund" => Some(Self::Refund),
            _ => None,
        }
    }

    /// Sign applied to the entry amount when deriving a balance.
    pub fn sign(&self) -> i64 {
        match self {
            Self::Load | Self::Refund => 1,
            Self::Charge => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Student {
    pub id: i64,
    pub full_name: String,
    pub student_no: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Teacher {
    pub id: i64,
    pub full_name: String,
    pub title: Option<String>,
    pub created_at: i64,
}

/// Input for creating a course. Amounts are in minor currency units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCourse {
    pub teacher_id: i64,
    pub code: String,
    pub name: String,
    pub capacity: i64,
    pub price: i64,
    #[serde(default)]
    pub min_demand: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub teacher_id: i64,
    pub code: String,
    pub name: String,
    /// Maximum number of confirmed registrations.
    pub capacity: i64,
    /// Fee charged on confirmation, in minor units.
    pub price: i64,
    /// Demand requests wanted before the teacher opens the course.
    pub min_demand: i64,
    pub state: CourseState,
    /// Current roster size.
    pub confirmed_count: i64,
    /// Current waitlist length; the next waitlisted position is this plus one.
    pub waitlist_len: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct CourseRow {
    pub id: i64,
    pub teacher_id: i64,
    pub code: String,
    pub name: String,
    pub capacity: i64,
    pub price: i64,
    pub min_demand: i64,
    pub state: String,
    pub confirmed_count: i64,
    pub waitlist_len: i64,
    pub created_at: i64,
}

impl TryFrom<CourseRow> for Course {
    type Error = EngineError;

    fn try_from(row: CourseRow) -> Result<Self, Self::Error> {
        let state = CourseState::parse(&row.state)
            .ok_or_else(|| decode_error("course state", &row.state))?;
        Ok(Course {
            id: row.id,
            teacher_id: row.teacher_id,
            code: row.code,
            name: row.name,
            capacity: row.capacity,
            price: row.price,
            min_demand: row.min_demand,
            state,
            confirmed_count: row.confirmed_count,
            waitlist_len: row.waitlist_len,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub id: i64,
    pub student_id: i64,
    pub course_id: i64,
    pub status: RegistrationStatus,
    /// 1-based place in the waitlist; `None` for confirmed registrations.
    pub waitlist_position: Option<i64>,
    pub grade: Option<i64>,
    pub grade_note: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct RegistrationRow {
    pub id: i64,
    pub student_id: i64,
    pub course_id: i64,
    pub status: String,
    pub waitlist_position: Option<i64>,
    pub grade: Option<i64>,
    pub grade_note: Option<String>,
    pub created_at: i64,
}

impl TryFrom<RegistrationRow> for Registration {
    type Error = EngineError;

    fn try_from(row: RegistrationRow) -> Result<Self, Self::Error> {
        let status = RegistrationStatus::parse(&row.status)
            .ok_or_else(|| decode_error("registration status", &row.status))?;
        Ok(Registration {
            id: row.id,
            student_id: row.student_id,
            course_id: row.course_id,
            status,
            waitlist_position: row.waitlist_position,
            grade: row.grade,
            grade_note: row.grade_note,
            created_at: row.created_at,
        })
    }
}

/// Immutable ledger record. `amount` is always positive; the direction comes
/// from [`LedgerKind::sign`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub student_id: i64,
    pub kind: LedgerKind,
    pub amount: i64,
    pub description: String,
    pub course_id: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct LedgerRow {
    pub id: i64,
    pub student_id: i64,
    pub kind: String,
    pub amount: i64,
    pub description: String,
    pub course_id: Option<i64>,
    pub created_at: i64,
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = EngineError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        let kind =
            LedgerKind::parse(&row.kind).ok_or_else(|| decode_error("ledger kind", &row.kind))?;
        Ok(LedgerEntry {
            id: row.id,
            student_id: row.student_id,
            kind,
            amount: row.amount,
            description: row.description,
            course_id: row.course_id,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DemandRequest {
    pub id: i64,
    pub student_id: i64,
    pub course_id: i64,
    pub created_at: i64,
}

/// Result of a successful `enroll` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollOutcome {
    pub registration_id: i64,
    pub status: RegistrationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
}

/// Course together with its occupancy and demand figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSummary {
    #[serde(flatten)]
    pub course: Course,
    pub seats_left: i64,
    pub demand: i64,
    pub min_demand_met: bool,
}

impl CourseSummary {
    pub(crate) fn new(course: Course, demand: i64) -> Self {
        let seats_left = (course.capacity - course.confirmed_count).max(0);
        let min_demand_met = demand >= course.min_demand;
        CourseSummary {
            course,
            seats_left,
            demand,
            min_demand_met,
        }
    }
}

fn decode_error(what: &str, value: &str) -> EngineError {
    EngineError::Database(sqlx::Error::Decode(
        format!("unknown {what} `{value}`").into(),
    ))
}
