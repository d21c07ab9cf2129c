use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::errors::{AppError, RecordsError, ResultExt};
use crate::models::*;
use crate::services::{EnrollmentService, GradeService};
use crate::storage::RecordStore;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Backing record store (Postgres or in-memory).
    pub store: Arc<dyn RecordStore>,
    pub enrollment: EnrollmentService,
    pub grades: GradeService,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            enrollment: EnrollmentService::new(store.clone()),
            grades: GradeService::new(store.clone()),
            store,
        }
    }

    async fn course(&self, id: CourseId) -> Result<Course, AppError> {
        self.store
            .get_course(id)
            .await?
            .ok_or_else(|| RecordsError::NotFound(format!("course {}", id)).into())
    }

    async fn student(&self, id: StudentId) -> Result<Student, AppError> {
        self.store
            .get_student(id)
            .await?
            .ok_or_else(|| RecordsError::NotFound(format!("student {}", id)).into())
    }
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "academic-records-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// POST /api/v1/courses
pub async fn create_course(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewCourse>,
) -> Result<(StatusCode, Json<Course>), AppError> {
    tracing::info!("POST /courses - name: {}", payload.name);
    let course = state.store.create_course(payload).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

/// GET /api/v1/courses
pub async fn list_courses(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Course>>, AppError> {
    Ok(Json(state.store.list_courses().await?))
}

/// GET /api/v1/courses/:id
pub async fn get_course(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Course>, AppError> {
    Ok(Json(state.course(CourseId(id)).await?))
}

/// GET /api/v1/courses/:id/students
pub async fn get_course_students(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Student>>, AppError> {
    let course = state.course(CourseId(id)).await?;
    let students = state.enrollment.get_students(&course).await?;
    Ok(Json(students))
}

/// POST /api/v1/students
pub async fn create_student(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewStudent>,
) -> Result<(StatusCode, Json<Student>), AppError> {
    tracing::info!("POST /students - name: {}", payload.name);
    let student = state.store.create_student(payload).await?;
    Ok((StatusCode::CREATED, Json(student)))
}

/// GET /api/v1/students
pub async fn list_students(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Student>>, AppError> {
    Ok(Json(state.store.list_students().await?))
}

/// GET /api/v1/students/:id
pub async fn get_student(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Student>, AppError> {
    Ok(Json(state.student(StudentId(id)).await?))
}

/// GET /api/v1/students/:id/courses
pub async fn get_student_courses(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Course>>, AppError> {
    let student = state.student(StudentId(id)).await?;
    let courses = state.enrollment.get_courses(&student).await?;
    Ok(Json(courses))
}

/// POST /api/v1/enrollments
pub async fn enroll(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<EnrollmentRequest>,
) -> Result<StatusCode, AppError> {
    tracing::info!(
        "POST /enrollments - course: {}, student: {}",
        payload.course_id,
        payload.student_id
    );

    let course = state.course(payload.course_id).await?;
    let student = state.student(payload.student_id).await?;
    state
        .enrollment
        .enroll(&student, &course)
        .await
        .with_context(|| format!("enrolling student {} in course {}", student.id, course.id))?;

    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/enrollments
pub async fn disenroll(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<EnrollmentRequest>,
) -> Result<StatusCode, AppError> {
    tracing::info!(
        "DELETE /enrollments - course: {}, student: {}",
        payload.course_id,
        payload.student_id
    );

    let course = state.course(payload.course_id).await?;
    let student = state.student(payload.student_id).await?;
    state.enrollment.disenroll(&student, &course).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/grades
pub async fn assign_grade(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GradeRequest>,
) -> Result<StatusCode, AppError> {
    tracing::info!(
        "POST /grades - course: {}, student: {}",
        payload.course_id,
        payload.student_id
    );

    let course = state.course(payload.course_id).await?;
    let student = state.student(payload.student_id).await?;
    state
        .grades
        .assign_grade(&course, &student, payload.value)
        .await
        .context("assigning grade")?;

    Ok(StatusCode::CREATED)
}

/// PUT /api/v1/grades
pub async fn adjust_grade(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GradeRequest>,
) -> Result<StatusCode, AppError> {
    tracing::info!(
        "PUT /grades - course: {}, student: {}",
        payload.course_id,
        payload.student_id
    );

    let course = state.course(payload.course_id).await?;
    let student = state.student(payload.student_id).await?;
    state
        .grades
        .adjust_grade(&course, &student, payload.value)
        .await
        .context("adjusting grade")?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/grades
pub async fn get_grade(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GradeQueryParams>,
) -> Result<Json<GradeValueResponse>, AppError> {
    let course = state.course(params.course_id).await?;
    let student = state.student(params.student_id).await?;
    let value = state.grades.get_grade(&course, &student).await?;

    Ok(Json(GradeValueResponse {
        course_id: course.id,
        student_id: student.id,
        value,
    }))
}

/// GET /api/v1/grades/average
///
/// Course average, or one student's average when `student_id` is given.
/// `letter=true` returns the letter bucket instead of the number.
pub async fn get_average_grade(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AverageQueryParams>,
) -> Result<Json<AverageGradeResponse>, AppError> {
    tracing::info!("GET /grades/average - params: {:?}", params);

    let Some(course_id) = params.course_id else {
        tracing::warn!("GET /grades/average rejected: no course_id");
        return Err(RecordsError::InvalidArgument("course must be specified".to_string()).into());
    };
    let course = state.course(course_id).await?;
    let student = match params.student_id {
        Some(id) => Some(state.student(id).await?),
        None => None,
    };

    let average = state
        .grades
        .get_average_grade(Some(&course), student.as_ref(), params.letter)
        .await?;

    Ok(Json(AverageGradeResponse {
        course_id,
        student_id: student.map(|s| s.id),
        average,
    }))
}
