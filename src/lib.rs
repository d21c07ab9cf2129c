//! Academic Records API Library
//!
//! This library manages courses, students, enrollments and grades, and
//! enforces the rules around them: a class-size cap of 20, one grade per
//! student per course, grade values in 0-100, and enrollment before grading.
//!
//! # Modules
//!
//! - `config`: Configuration management.
//! - `db`: Database connection, pool management and schema bootstrap.
//! - `db_storage`: Postgres-backed record store.
//! - `errors`: Domain and HTTP error types.
//! - `handlers`: HTTP request handlers.
//! - `models`: Entities, identifiers, letter grades and request payloads.
//! - `services`: Enrollment and grading rules.
//! - `storage`: Record store interface and in-memory store.
//! - `validators`: Pre-write guards.

pub mod config;
pub mod db;
pub mod db_storage;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod services;
pub mod storage;
pub mod validators;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::handlers::AppState;

/// Builds the HTTP router over the given state.
pub fn app(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route(
            "/api/v1/courses",
            post(handlers::create_course).get(handlers::list_courses),
        )
        .route("/api/v1/courses/:id", get(handlers::get_course))
        .route(
            "/api/v1/courses/:id/students",
            get(handlers::get_course_students),
        )
        .route(
            "/api/v1/students",
            post(handlers::create_student).get(handlers::list_students),
        )
        .route("/api/v1/students/:id", get(handlers::get_student))
        .route(
            "/api/v1/students/:id/courses",
            get(handlers::get_student_courses),
        )
        .route(
            "/api/v1/enrollments",
            post(handlers::enroll).delete(handlers::disenroll),
        )
        .route(
            "/api/v1/grades",
            post(handlers::assign_grade)
                .put(handlers::adjust_grade)
                .get(handlers::get_grade),
        )
        .route("/api/v1/grades/average", get(handlers::get_average_grade))
        // Request size limit: 1MB max payload
        .layer(ServiceBuilder::new().layer(RequestBodyLimitLayer::new(1024 * 1024)));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
