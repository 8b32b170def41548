use axum::{Router, routing::get};
use crate::{AppState, controllers::card_controller};

pub fn add_routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/cards", get(card_controller::list_cards).post(card_controller::post_card))
        .route(
            "/cards/:id",
            get(card_controller::get_card)
                .put(card_controller::put_card)
                .delete(card_controller::delete_card),
        )
}
