use std::{convert::Infallible, time::Duration};

use axum::{
    extract::{Extension, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use serde::Serialize;

use crate::{
    AppState,
    models::CurrentUser,
    services::{account_service, card_service, transaction_service},
    store::{self, StoreResult},
};

use super::{ApiError, ApiResult};

fn to_event<T: Serialize>(name: &'static str, res: StoreResult<T>) -> Event {
    match res {
        Ok(value) => Event::default()
            .event(name)
            .json_data(value)
            .unwrap_or_else(|_| Event::default().event("error").data("encode")),
        Err(e) => Event::default().event("error").data(e.to_string()),
    }
}

// GET /events
//
// `account` carries the whole account node, `cards` and `transactions` the
// decoded lists. Each stream opens with the current value.
pub async fn sse_events(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let Some(Extension(u)) = user else {
        return Err(ApiError::unauthorized());
    };

    let account = store::watch(state.store.clone(), account_service::account_path(&u.id)?)
        .map(|res| to_event("account", res.map(|v| v.unwrap_or_default())));
    let cards = card_service::watch_cards(state.store.clone(), &u.id)?.map(|res| to_event("cards", res));
    let transactions = transaction_service::watch_transactions(state.store.clone(), &u.id)?
        .map(|res| to_event("transactions", res));

    let streams: Vec<BoxStream<'static, Event>> = vec![account.boxed(), cards.boxed(), transactions.boxed()];
    let merged = stream::select_all(streams).map(Ok::<_, Infallible>);

    Ok(Sse::new(merged).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(20))
            .text("keep-alive"),
    ))
}
