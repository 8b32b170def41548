use axum::{Router, routing::{get, post}};
use crate::{AppState, controllers::wallet_controller};

pub fn add_routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/wallet/add", post(wallet_controller::post_add))
        .route("/wallet/send", post(wallet_controller::post_send))
        .route("/wallet/withdraw", post(wallet_controller::post_withdraw))
        .route("/transactions", get(wallet_controller::list_transactions))
}
