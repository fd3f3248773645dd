//! Axum REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use enrollment_engine::{
    Course, CourseState, CourseSummary, EnrollmentEngine, LedgerEntry, NewCourse, Registration,
    Violation,
};
use serde::{Deserialize, Serialize};

use crate::errors::ApiError;

/// Description recorded on balance loads when the client sends none.
const DEFAULT_LOAD_DESCRIPTION: &str = "Card top-up";

#[derive(Clone)]
pub struct ApiState {
    pub engine: EnrollmentEngine,
}

type ApiResult<T> = Result<T, ApiError>;

// ─────────────────────────────────────────────────────────
// Request shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StudentRequest {
    pub full_name: String,
    pub student_no: String,
}

#[derive(Debug, Deserialize)]
pub struct TeacherRequest {
    pub full_name: String,
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoadRequest {
    pub amount: i64,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CourseStateRequest {
    pub state: CourseState,
}

#[derive(Debug, Deserialize)]
pub struct StudentRef {
    pub student_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct GradeRequest {
    pub grade: Option<i64>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CourseFilter {
    pub state: Option<CourseState>,
}

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub student_id: i64,
    pub balance: i64,
}

#[derive(Serialize)]
pub struct LedgerResponse {
    pub student_id: i64,
    pub balance: i64,
    pub count: usize,
    pub entries: Vec<LedgerEntry>,
}

#[derive(Serialize)]
pub struct StudentRegistrationsResponse {
    pub student_id: i64,
    pub count: usize,
    pub registrations: Vec<Registration>,
}

#[derive(Serialize)]
pub struct CourseRegistrationsResponse {
    pub course_id: i64,
    pub count: usize,
    pub registrations: Vec<Registration>,
}

#[derive(Serialize)]
pub struct CoursesResponse {
    pub count: usize,
    pub courses: Vec<CourseSummary>,
}

#[derive(Serialize)]
pub struct AuditResponse {
    pub healthy: bool,
    pub count: usize,
    pub violations: Vec<Violation>,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /students`
pub async fn create_student(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<StudentRequest>,
) -> ApiResult<impl IntoResponse> {
    let student = state
        .engine
        .create_student(&body.full_name, &body.student_no)
        .await?;
    Ok((StatusCode::CREATED, Json(student)))
}

/// `GET /students/:id`
pub async fn get_student(
    State(state): State<Arc<ApiState>>,
    Path(student_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.student(student_id).await?))
}

/// `PATCH /students/:id`
pub async fn update_student(
    State(state): State<Arc<ApiState>>,
    Path(student_id): Path<i64>,
    Json(body): Json<StudentRequest>,
) -> ApiResult<impl IntoResponse> {
    let student = state
        .engine
        .update_student(student_id, &body.full_name, &body.student_no)
        .await?;
    Ok(Json(student))
}

/// `GET /students/:id/balance`
pub async fn get_balance(
    State(state): State<Arc<ApiState>>,
    Path(student_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let balance = state.engine.balance(student_id).await?;
    Ok(Json(BalanceResponse {
        student_id,
        balance,
    }))
}

/// `POST /students/:id/balance/loads`
pub async fn load_balance(
    State(state): State<Arc<ApiState>>,
    Path(student_id): Path<i64>,
    Json(body): Json<LoadRequest>,
) -> ApiResult<impl IntoResponse> {
    let description = body
        .description
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or(DEFAULT_LOAD_DESCRIPTION);
    let entry = state
        .engine
        .load_balance(student_id, body.amount, description)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// `GET /students/:id/ledger`
///
/// Returns the current balance and every ledger entry, newest first.
pub async fn get_ledger(
    State(state): State<Arc<ApiState>>,
    Path(student_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let entries = state.engine.ledger_history(student_id).await?;
    let balance = state.engine.balance(student_id).await?;
    Ok(Json(LedgerResponse {
        student_id,
        balance,
        count: entries.len(),
        entries,
    }))
}

/// `GET /students/:id/registrations`
pub async fn get_student_registrations(
    State(state): State<Arc<ApiState>>,
    Path(student_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let registrations = state.engine.student_registrations(student_id).await?;
    Ok(Json(StudentRegistrationsResponse {
        student_id,
        count: registrations.len(),
        registrations,
    }))
}

/// `POST /teachers`
pub async fn create_teacher(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<TeacherRequest>,
) -> ApiResult<impl IntoResponse> {
    let teacher = state
        .engine
        .create_teacher(&body.full_name, body.title.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(teacher)))
}

/// `POST /courses`
pub async fn create_course(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<NewCourse>,
) -> ApiResult<impl IntoResponse> {
    let course: Course = state.engine.create_course(&body).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

/// `GET /courses?state=open`
pub async fn list_courses(
    State(state): State<Arc<ApiState>>,
    Query(filter): Query<CourseFilter>,
) -> ApiResult<impl IntoResponse> {
    let courses = state.engine.list_courses(filter.state).await?;
    Ok(Json(CoursesResponse {
        count: courses.len(),
        courses,
    }))
}

/// `GET /courses/:id`
pub async fn get_course(
    State(state): State<Arc<ApiState>>,
    Path(course_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.course(course_id).await?))
}

/// `POST /courses/:id/state`
pub async fn set_course_state(
    State(state): State<Arc<ApiState>>,
    Path(course_id): Path<i64>,
    Json(body): Json<CourseStateRequest>,
) -> ApiResult<impl IntoResponse> {
    let course = state
        .engine
        .set_course_state(course_id, body.state)
        .await?;
    Ok(Json(course))
}

/// `POST /courses/:id/enrollments`
///
/// `201` with `{registration_id, status, position?}` on success. An existing
/// registration answers `409` with kind `already_registered`, which clients
/// treat as success.
pub async fn enroll(
    State(state): State<Arc<ApiState>>,
    Path(course_id): Path<i64>,
    Json(body): Json<StudentRef>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state.engine.enroll(body.student_id, course_id).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// `POST /courses/:id/requests`
pub async fn request_course(
    State(state): State<Arc<ApiState>>,
    Path(course_id): Path<i64>,
    Json(body): Json<StudentRef>,
) -> ApiResult<impl IntoResponse> {
    let request = state
        .engine
        .request_course(body.student_id, course_id)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// `GET /courses/:id/roster`
pub async fn get_roster(
    State(state): State<Arc<ApiState>>,
    Path(course_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let registrations = state.engine.roster(course_id).await?;
    Ok(Json(CourseRegistrationsResponse {
        course_id,
        count: registrations.len(),
        registrations,
    }))
}

/// `GET /courses/:id/waitlist`
pub async fn get_waitlist(
    State(state): State<Arc<ApiState>>,
    Path(course_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let registrations = state.engine.waitlist(course_id).await?;
    Ok(Json(CourseRegistrationsResponse {
        course_id,
        count: registrations.len(),
        registrations,
    }))
}

/// `PUT /registrations/:id/grade`
pub async fn set_grade(
    State(state): State<Arc<ApiState>>,
    Path(registration_id): Path<i64>,
    Json(body): Json<GradeRequest>,
) -> ApiResult<impl IntoResponse> {
    let registration = state
        .engine
        .set_grade(registration_id, body.grade, body.note.as_deref())
        .await?;
    Ok(Json(registration))
}

/// `GET /audit`
pub async fn audit(State(state): State<Arc<ApiState>>) -> ApiResult<impl IntoResponse> {
    let violations = state.engine.audit().await?;
    Ok(Json(AuditResponse {
        healthy: violations.is_empty(),
        count: violations.len(),
        violations,
    }))
}
