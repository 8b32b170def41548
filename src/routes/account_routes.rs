use axum::{Router, routing::get};
use crate::{AppState, controllers::account_controller};

pub fn add_routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route(
            "/account",
            get(account_controller::get_account)
                .patch(account_controller::patch_account)
                .delete(account_controller::delete_account),
        )
        .route("/account/summary", get(account_controller::get_summary))
}
