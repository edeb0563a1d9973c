use crate::state::AppState;
use crate::{api, logging, middleware};
use axum::routing::{get, post};
use axum::Router;

pub fn build_http_app(state: AppState) -> Router {
    // agent-facing JSON routes go through body decoding
    let json_routes = Router::new()
        .route("/update/", post(api::update_json))
        .route("/updates/", post(api::update_batch))
        .route("/value/", post(api::value_json))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::decode_body,
        ));

    let plain_routes = Router::new()
        .route("/update/{type}/{name}/{value}", post(api::update_path))
        .route("/value/{type}/{name}", get(api::value_path))
        .route("/", get(api::list))
        .route("/ping", get(api::ping));

    json_routes
        .merge(plain_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::sign_response,
        ))
        .layer(axum::middleware::from_fn(logging::request_logging))
        .with_state(state)
}
