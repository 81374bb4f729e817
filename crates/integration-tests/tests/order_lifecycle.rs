//! Order status rules as enforced through the HTTP API, plus media path
//! regressions that span the core resolver and the storefront.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use mockito::Matcher;
use serde_json::json;
use verdant_core::media::product_image_key;
use verdant_core::{CompanyId, MediaResolver, OrderId, OrderStatus, ProductId, UserId};
use verdant_integration_tests::{TestApp, body_json};

fn order_row(id: OrderId, user: UserId, company: CompanyId, status: OrderStatus) -> serde_json::Value {
    json!({
        "id": id,
        "user_id": user,
        "items": [{
            "product_id": ProductId::random(),
            "company_id": company,
            "name": "Little Millet",
            "unit_price": "90",
            "quantity": 2
        }],
        "shipping_address": {
            "line1": "4 Lake View Road",
            "city": "Mysuru",
            "state": "Karnataka",
            "pincode": "570001"
        },
        "subtotal": "180",
        "shipping_charge": "40",
        "tax_amount": "9",
        "total_amount": "229",
        "status": status,
        "created_at": "2024-03-10T11:00:00Z"
    })
}

async fn mock_order(app: &mut TestApp, row: &serde_json::Value) {
    app.backend
        .mock("GET", "/rest/v1/orders")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(json!([row]).to_string())
        .create_async()
        .await;
}

#[tokio::test]
async fn test_customer_cancels_pending_order() {
    let mut app = TestApp::new().await;
    let user = UserId::random();
    let id = OrderId::random();
    let cookie = app.sign_in(user, None).await;
    mock_order(&mut app, &order_row(id, user, CompanyId::random(), OrderStatus::Pending)).await;

    let mut cancelled = order_row(id, user, CompanyId::random(), OrderStatus::Cancelled);
    cancelled["updated_at"] = json!("2024-03-15T12:00:00Z");
    let patch = app
        .backend
        .mock("PATCH", "/rest/v1/orders")
        .match_query(Matcher::Any)
        .match_body(Matcher::PartialJson(json!({"status": "cancelled"})))
        .with_status(200)
        .with_body(json!([cancelled]).to_string())
        .expect(1)
        .create_async()
        .await;

    let response = app
        .json("POST", &format!("/api/orders/{id}/cancel"), None, Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "cancelled");
    patch.assert_async().await;
}

#[tokio::test]
async fn test_shipped_order_cannot_be_cancelled() {
    let mut app = TestApp::new().await;
    let user = UserId::random();
    let id = OrderId::random();
    let cookie = app.sign_in(user, None).await;
    mock_order(&mut app, &order_row(id, user, CompanyId::random(), OrderStatus::Shipped)).await;
    let patch = app
        .backend
        .mock("PATCH", "/rest/v1/orders")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let response = app
        .json("POST", &format!("/api/orders/{id}/cancel"), None, Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    patch.assert_async().await;
}

#[tokio::test]
async fn test_other_users_order_is_not_found() {
    let mut app = TestApp::new().await;
    let id = OrderId::random();
    let cookie = app.sign_in(UserId::random(), None).await;
    mock_order(
        &mut app,
        &order_row(id, UserId::random(), CompanyId::random(), OrderStatus::Pending),
    )
    .await;

    let response = app
        .json("GET", &format!("/api/orders/{id}"), None, Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_company_cannot_skip_a_step() {
    let mut app = TestApp::new().await;
    let company = CompanyId::random();
    let id = OrderId::random();
    let cookie = app.sign_in(UserId::random(), Some(company)).await;
    mock_order(&mut app, &order_row(id, UserId::random(), company, OrderStatus::Confirmed)).await;

    let response = app
        .json(
            "PUT",
            &format!("/api/dashboard/orders/{id}/status"),
            Some(json!({"status": "delivered"})),
            Some(&cookie),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[test]
fn test_every_status_reaches_a_terminal_state() {
    for status in OrderStatus::ALL {
        let mut current = status;
        let mut steps = 0;
        while let Some(next) = current.next() {
            assert!(current.can_transition_to(next));
            current = next;
            steps += 1;
        }
        assert!(current.is_terminal());
        assert!(steps <= 4);
    }
    assert!(!OrderStatus::Shipped.is_cancellable());
    assert!(OrderStatus::Preparing.is_cancellable());
}

#[test]
fn test_uploaded_key_resolves_without_double_encoding() {
    let media = MediaResolver::new("https://proj.backend.test", "product-images", "/none.png");
    let company = CompanyId::random();
    let product = ProductId::random();
    let key = product_image_key(company, product, 1_710_504_000_000, "Ragi Flour (1kg).jpg");

    assert_eq!(
        key,
        format!("{company}/{product}/1710504000000_Ragi_Flour__1kg_.jpg")
    );

    // Older rows stored the bucket-prefixed, already-encoded form.
    let legacy = format!("product-images/{company}/{product}/1710504000000_Ragi%20Flour.jpg");
    let url = media.resolve(Some(&legacy));
    assert_eq!(
        url,
        format!(
            "https://proj.backend.test/storage/v1/object/public/product-images/{company}/{product}/1710504000000_Ragi%20Flour.jpg"
        )
    );
    assert_eq!(
        media.object_key(&url).unwrap(),
        format!("{company}/{product}/1710504000000_Ragi Flour.jpg")
    );
}
