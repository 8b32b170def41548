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
async fn card_crud() {
    let app = test_app();
    let token = signup(&app, "ann@example.com").await;

    let (status, cards) = call(&app, "GET", "/cards", &token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cards, json!([]));

    let draft = json!({ "cardType": "visa", "cardNumber": "4111 1111", "cardName": " Travel ", "balance": "12.5" });
    let (status, card) = call(&app, "POST", "/cards", &token, Some(draft)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(card["cardType"], "VISA");
    assert_eq!(card["cardNumber"], "41111111");
    assert_eq!(card["cardName"], "Travel");
    assert_eq!(card["balance"], "12.5000");
    let id = card["id"].as_str().unwrap().to_string();

    let update = json!({ "cardType": "MASTERCARD", "cardNumber": "5500", "cardName": "Daily", "balance": "3" });
    let (status, card) = call(&app, "PUT", &format!("/cards/{id}"), &token, Some(update)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(card["cardType"], "MASTERCARD");
    assert_eq!(card["id"], id.as_str());

    let (_, cards) = call(&app, "GET", "/cards", &token, None).await;
    assert_eq!(cards.as_array().unwrap().len(), 1);
    assert_eq!(cards[0]["cardName"], "Daily");

    let (status, _) = call(&app, "DELETE", &format!("/cards/{id}"), &token, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = call(&app, "GET", &format!("/cards/{id}"), &token, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "card_not_found");
}

#[tokio::test]
async fn invalid_card_reports_fields() {
    let app = test_app();
    let token = signup(&app, "ann@example.com").await;

    let draft = json!({ "cardType": "AMEX", "cardNumber": "12ab", "cardName": "", "balance": "-1" });
    let (status, body) = call(&app, "POST", "/cards", &token, Some(draft)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let fields = &body["fields"];
    for key in ["cardType", "cardNumber", "cardName", "balance"] {
        assert!(fields[key].is_string(), "missing {key}");
    }
}
