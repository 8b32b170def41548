mod common;

use axum::http::StatusCode;
use common::{json_request, response_json, signup, test_app};
use serde_json::{Value, json};
use tower::ServiceExt;

async fn call(app: &axum::Router, method: &str, uri: &str, token: &str, body: Option<Value>) -> (StatusCode, Value) {
    let res = app
        .clone()
        .oneshot(json_request(method, uri, Some(token), body))
        .await
        .unwrap();
    let status = res.status();
    (status, response_json(res).await)
}

#[tokio::test]
async fn wallet_requires_sign_in() {
    let app = test_app();

    let res = app
        .oneshot(json_request("POST", "/wallet/add", None, Some(json!({ "amount": "10" }))))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn add_then_send_updates_balance_and_history() {
    let app = test_app();
    let token = signup(&app, "ann@example.com").await;

    let (status, body) = call(&app, "POST", "/wallet/add", &token, Some(json!({ "amount": "100.0" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], "100.0000");
    assert_eq!(body["transaction"]["type"], "add");

    // numbers are accepted as well as strings
    let (status, body) = call(&app, "POST", "/wallet/send", &token, Some(json!({ "amount": 40 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], "60.0000");
    assert_eq!(body["transaction"]["amount"], "40.0000");

    let (_, summary) = call(&app, "GET", "/account/summary", &token, None).await;
    assert_eq!(summary["balance"], "60.0000");
    assert_eq!(summary["interest"], "1.2000");

    let (status, txs) = call(&app, "GET", "/transactions", &token, None).await;
    assert_eq!(status, StatusCode::OK);
    let txs = txs.as_array().unwrap();
    assert_eq!(txs.len(), 2);
    assert_eq!(txs[0]["type"], "send");
    assert_eq!(txs[1]["type"], "add");
}

#[tokio::test]
async fn rejected_amounts_map_to_422() {
    let app = test_app();
    let token = signup(&app, "ann@example.com").await;

    let (status, body) = call(&app, "POST", "/wallet/add", &token, Some(json!({ "amount": "0" }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_amount");

    let (status, body) = call(&app, "POST", "/wallet/send", &token, Some(json!({ "amount": "5" }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "insufficient_funds");

    let (_, txs) = call(&app, "GET", "/transactions", &token, None).await;
    assert_eq!(txs, json!([]));
}

#[tokio::test]
async fn withdraw_by_label_moves_card_funds() {
    let app = test_app();
    let token = signup(&app, "ann@example.com").await;

    call(&app, "POST", "/wallet/add", &token, Some(json!({ "amount": "100" }))).await;
    call(&app, "POST", "/wallet/send", &token, Some(json!({ "amount": "40" }))).await;

    let card = json!({ "cardType": "VISA", "cardNumber": "4111", "cardName": "MyVisa", "balance": "50" });
    let (status, card) = call(&app, "POST", "/cards", &token, Some(card)).await;
    assert_eq!(status, StatusCode::CREATED);
    let card_id = card["id"].as_str().unwrap().to_string();

    let (status, receipt) = call(
        &app,
        "POST",
        "/wallet/withdraw",
        &token,
        Some(json!({ "cardName": "MyVisa", "cardNumber": "4111", "amount": "30" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["cardId"], card_id.as_str());
    assert_eq!(receipt["cardBalance"], "20.0000");
    assert_eq!(receipt["balance"], "90.0000");
    assert_eq!(receipt["transaction"]["type"], "withdraw");

    let (_, card) = call(&app, "GET", &format!("/cards/{card_id}"), &token, None).await;
    assert_eq!(card["balance"], "20.0000");
}

#[tokio::test]
async fn withdraw_errors() {
    let app = test_app();
    let token = signup(&app, "ann@example.com").await;

    let card = json!({ "cardType": "mastercard", "cardNumber": "5500", "cardName": "Main", "balance": "10" });
    let (_, card) = call(&app, "POST", "/cards", &token, Some(card)).await;
    let card_id = card["id"].as_str().unwrap().to_string();

    let (status, body) = call(
        &app,
        "POST",
        "/wallet/withdraw",
        &token,
        Some(json!({ "cardName": "Other", "cardNumber": "5500", "amount": "1" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "card_not_found");

    let (status, body) = call(
        &app,
        "POST",
        "/wallet/withdraw",
        &token,
        Some(json!({ "cardId": card_id, "amount": "10.5" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "insufficient_card_balance");

    let (status, body) = call(&app, "POST", "/wallet/withdraw", &token, Some(json!({ "amount": "1" }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["fields"]["cardName"].is_string());
    assert!(body["fields"]["cardNumber"].is_string());

    let (_, card) = call(&app, "GET", &format!("/cards/{card_id}"), &token, None).await;
    assert_eq!(card["balance"], "10.0000");
}

#[tokio::test]
async fn accounts_do_not_see_each_other() {
    let app = test_app();
    let ann = signup(&app, "ann@example.com").await;
    let bob = signup(&app, "bob@example.com").await;

    call(&app, "POST", "/wallet/add", &ann, Some(json!({ "amount": "25" }))).await;
    let (_, card) = call(
        &app,
        "POST",
        "/cards",
        &ann,
        Some(json!({ "cardType": "VISA", "cardNumber": "4111", "cardName": "MyVisa", "balance": "5" })),
    )
    .await;
    let card_id = card["id"].as_str().unwrap().to_string();

    let (_, summary) = call(&app, "GET", "/account/summary", &bob, None).await;
    assert_eq!(summary["balance"], "0.0000");

    let (status, _) = call(&app, "GET", &format!("/cards/{card_id}"), &bob, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app,
        "POST",
        "/wallet/withdraw",
        &bob,
        Some(json!({ "cardId": card_id, "amount": "1" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn withdraw_accepts_the_number_as_typed_when_adding() {
    let app = test_app();
    let token = signup(&app, "ann@example.com").await;

    let card = json!({ "cardType": "VISA", "cardNumber": "4111 1111", "cardName": "Travel", "balance": "50" });
    let (status, card) = call(&app, "POST", "/cards", &token, Some(card)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(card["cardNumber"], "41111111");

    let (status, receipt) = call(
        &app,
        "POST",
        "/wallet/withdraw",
        &token,
        Some(json!({ "cardName": " Travel ", "cardNumber": "4111 1111", "amount": "10" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["cardBalance"], "40.0000");
    assert_eq!(receipt["balance"], "10.0000");
}
