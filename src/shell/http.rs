use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::get,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::shell::actuator;
use crate::shell::state::AppState;

pub fn router(state: AppState) -> Router {
    let config = state.context.config();
    let cors = cors_layer(&config.cors_allowed_origins);
    let context_path = config.context_path.clone();

    let routes = Router::new()
        .route("/actuator/health", get(actuator::health))
        .route("/actuator/info", get(actuator::info));
    let app = if context_path == "/" {
        routes
    } else {
        Router::new().nest(&context_path, routes)
    };

    app.with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
