mod auth;
mod health;
mod memberships;
mod soundboards;
mod users;

use axum::extract::DefaultBodyLimit;
use axum::middleware as axum_mw;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::middleware::rate_limit::rate_limit_middleware;
use crate::state::AppState;
use crate::storage::local::LocalBlobStore;
use crate::storage::MAX_CLIP_SIZE;

/// Build the full application router. Consumes the state so middleware
/// layers that need `State<AppState>` (e.g. rate limiter) can be wired up.
pub fn router(state: AppState) -> Router {
    let api = api_routes(&state);
    let cdn_service = ServeDir::new(LocalBlobStore::public_dir(&state.storage_path));

    Router::new()
        .route("/health", get(health::health))
        .route("/ws", get(crate::relay::ws_upgrade))
        .nest_service("/cdn", cdn_service)
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        // Auth
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        // Users
        .route("/users/@me", get(users::get_current_user))
        // Clips
        .route(
            "/soundboards/upload",
            post(soundboards::upload_clip).layer(DefaultBodyLimit::max(MAX_CLIP_SIZE + 64 * 1024)),
        )
        .route("/soundboards/delete", post(soundboards::delete_clip))
        // Soundboards
        .route("/soundboards", post(soundboards::create_soundboard))
        .route("/soundboards/mine", get(soundboards::list_my_soundboards))
        .route(
            "/soundboards/my/{id}",
            get(soundboards::get_my_soundboard)
                .patch(soundboards::update_my_soundboard)
                .delete(soundboards::delete_my_soundboard),
        )
        .route("/soundboards/{id}", get(soundboards::get_soundboard))
        // Memberships (admin)
        .route(
            "/membership-types",
            get(memberships::list_types).post(memberships::create_type),
        )
        .route(
            "/membership-types/{id}",
            get(memberships::get_type)
                .patch(memberships::update_type)
                .delete(memberships::delete_type),
        )
        .route(
            "/memberships",
            get(memberships::list_memberships).post(memberships::create_membership),
        )
        // Version
        .route("/version", get(health::version))
        // Rate limit on all API routes
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
}
