use axum::{extract::State, response::Json, routing::get, Router};
use serde_json::{json, Value};

use crate::refresh::RefreshBus;

pub fn router(bus: RefreshBus) -> Router {
    Router::new()
        .route("/refresh", get(refresh_value))
        .with_state(bus)
}

async fn refresh_value(State(bus): State<RefreshBus>) -> Json<Value> {
    Json(json!({
        "value": bus.current(),
        "subscribers": bus.subscriber_count(),
    }))
}
