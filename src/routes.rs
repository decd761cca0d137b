// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{attempt, quiz, result, usage},
    state::AppState,
    utils::jwt::{auth_middleware, instructor_middleware},
};

/// Assembles the main application router.
///
/// * Student routes (quizzes, attempts, results, usage) require a token.
/// * Authoring routes under `/api/manage` also require an instructor or admin.
/// * The leaderboard is public.
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let quiz_routes = Router::new()
        .route("/{id}", get(quiz::get_quiz))
        .route("/{id}/questions", get(quiz::exam_questions))
        .route("/{id}/attempt", get(attempt::attempt_status))
        .route("/{id}/attempt/start", post(attempt::start_attempt))
        .route("/{id}/attempt/timer", put(attempt::update_timer))
        .route("/{id}/attempt/submit", post(attempt::submit_attempt))
        .route("/{id}/result", get(result::latest_result))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let attempt_routes = Router::new()
        .route("/", get(result::my_attempts))
        .route("/mistakes", get(result::my_mistakes))
        .route("/{id}", get(result::get_result))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let usage_routes = Router::new()
        .route("/usage", get(usage::get_usage).post(usage::consume_usage))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let manage_routes = Router::new()
        .route("/quizzes", post(quiz::create_quiz))
        .route(
            "/quizzes/{id}",
            put(quiz::update_quiz).delete(quiz::delete_quiz),
        )
        .route(
            "/quizzes/{id}/questions",
            get(quiz::list_questions).post(quiz::add_questions),
        )
        .route("/quizzes/{id}/questions/append", post(quiz::append_questions))
        .route("/quizzes/{id}/marks", post(quiz::allocate_marks))
        .route(
            "/questions/{id}",
            put(quiz::update_question).delete(quiz::delete_question),
        )
        // Auth first, then the authoring role check
        .layer(middleware::from_fn(instructor_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/quizzes", quiz_routes)
        .nest("/api/attempts", attempt_routes)
        .nest("/api/ai", usage_routes)
        .nest("/api/manage", manage_routes)
        .route("/api/leaderboard", get(result::leaderboard))
        // Global Middleware (top to bottom: trace, then CORS)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
