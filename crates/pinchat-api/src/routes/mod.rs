pub mod auth;
pub mod chats;
pub mod crypto;
pub mod users;

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::middleware::require_auth;
use crate::state::AppState;

/// All HTTP routes. Transport layers (CORS, tracing) are added by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/verify", post(auth::verify))
        .route("/auth/login", post(auth::login))
        .route("/auth/resend", post(auth::resend))
        .route("/auth/reset/request", post(auth::request_reset))
        .route("/auth/reset/confirm", post(auth::confirm_reset))
        .route("/crypto/encrypt", post(crypto::encrypt))
        .route("/crypto/decrypt", post(crypto::decrypt))
        .route("/crypto/key", get(crypto::new_key))
        .route("/crypto/chat-key", post(crypto::chat_key))
        .route("/health", get(crypto::health))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/users/me", get(users::me))
        .route("/users/search", post(users::search))
        .route("/chats/start", post(chats::start_chat))
        .route("/chats", get(chats::list_chats))
        .route(
            "/chats/{chat_id}/messages",
            get(chats::get_messages).post(chats::send_message),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}
