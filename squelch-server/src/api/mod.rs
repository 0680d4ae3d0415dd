mod auth;
pub mod dash;
pub mod files;
pub mod vox;

pub use auth::DashSessions;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::app::App;
use crate::signaling::ws_handler;

pub fn router(app: Arc<App>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/vox/on", post(vox::on))
        .route("/api/vox/off", post(vox::off))
        .route("/api/dash/login", post(dash::login))
        .route("/api/dash/logout", post(dash::logout))
        .route("/api/dash/status", get(dash::status))
        .route("/api/dash/clients", get(dash::clients))
        .route("/api/dash/ptt", get(dash::ptt))
        .route("/api/dash/ptt/release", post(dash::ptt_release))
        .route("/api/dash/clients/:id/disconnect", post(dash::disconnect_client))
        .route("/api/dash/restart", post(dash::restart))
        .route("/api/audio", get(files::serve_recording))
        .layer(cors)
        .with_state(app)
}
