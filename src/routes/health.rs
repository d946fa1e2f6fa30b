use axum::Json;

pub async fn health() -> &'static str {
    "ok"
}

pub async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "data": {
            "version": env!("CARGO_PKG_VERSION"),
            "git_sha": env!("WHAM_GIT_SHA"),
        }
    }))
}
