use axum::{Router, routing::{get, post}};
use crate::{AppState, controllers::auth_controller};

pub fn add_routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/auth/signup", post(auth_controller::post_signup))
        .route("/auth/login", post(auth_controller::post_login))
        .route("/me", get(auth_controller::me))
}
