use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod session;
pub mod stores;
pub mod utils;

pub use config::Config;
pub use error::EngineError;
pub use services::AppState;

pub fn create_router(app_state: std::sync::Arc<services::AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any); // TODO: restrict to specific origins in production

    Router::new()
        // Public endpoints (no auth required)
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        // Protected endpoints (require JWT)
        .nest(
            "/api/v1/quizzes",
            quiz_routes().layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::auth_middleware,
            )),
        )
        .nest(
            "/api/v1/submissions",
            submission_routes().layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::auth_middleware,
            )),
        )
        .nest(
            "/api/v1/stats",
            stats_routes().layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::auth_middleware,
            )),
        )
        .with_state(app_state)
        .layer(cors)
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn quiz_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route("/questions", get(handlers::quizzes::get_quiz_questions))
        .route("/random", get(handlers::quizzes::get_random_quiz))
        .route("/recent", get(handlers::quizzes::get_recent_attempts))
        .route(
            "/recommendations",
            get(handlers::quizzes::get_recommendations),
        )
}

fn submission_routes() -> Router<std::sync::Arc<services::AppState>> {
    // The bare collection listing is admin-only; everything else is
    // owner-scoped inside the handler.
    let admin_listing = Router::new()
        .route("/", get(handlers::submissions::list_submissions))
        .route_layer(middleware::from_fn(
            middlewares::auth::admin_guard_middleware,
        ));

    Router::new()
        .route("/", post(handlers::submissions::submit_quiz))
        .merge(admin_listing)
        .route(
            "/user/{id}",
            get(handlers::submissions::get_user_submissions),
        )
        .route(
            "/{id}/answers",
            get(handlers::submissions::get_submission_answers),
        )
}

fn stats_routes() -> Router<std::sync::Arc<services::AppState>> {
    let admin_summary = Router::new()
        .route("/summary", get(handlers::stats::get_cohort_summary))
        .route_layer(middleware::from_fn(
            middlewares::auth::admin_guard_middleware,
        ));

    Router::new()
        .route("/students/{id}", get(handlers::stats::get_student_performance))
        .merge(admin_summary)
}
