//! HTTP gateway tests against a mock backend.
//!
//! The mock speaks the storefront backend's `/orders/cart/` contract.

#![allow(clippy::unwrap_used)]

use ebasi_integration_tests::{TOKEN, credential, key, product, product_id, signed_in};
use ebasi_storefront::gateway::{CartGateway, GatewayError, HttpCartGateway};
use ebasi_storefront::store::{CartStore, FileStore};
use ebasi_storefront::{Cart, CartMode, Phase, StaleResponsePolicy};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{body_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CART_PATH: &str = "/api/v1/orders/cart/";

fn gateway(server: &MockServer) -> HttpCartGateway {
    let base = Url::parse(&format!("{}/api/v1", server.uri())).unwrap();
    HttpCartGateway::new(&base)
}

fn cart_body(items: &[(i64, &str, &str, i64)], total: &str) -> Value {
    let items: Vec<Value> = items
        .iter()
        .enumerate()
        .map(|(i, (id, name, price, quantity))| {
            json!({
                "id": i + 1,
                "product": {
                    "id": id,
                    "name": name,
                    "price": price,
                    "compare_price": null,
                    "primary_image": null,
                    "stock_status": "in_stock"
                },
                "quantity": quantity
            })
        })
        .collect();
    json!({"id": 7, "user": 1, "items": items, "total_price": total})
}

// ============================================================================
// Wire Contract
// ============================================================================

#[tokio::test]
async fn test_fetch_sends_token_and_parses_cart() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CART_PATH))
        .and(header("Authorization", format!("Token {TOKEN}").as_str()))
        .and(header_exists("X-Request-Id"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(cart_body(&[(42, "Chanderi Dupatta", "1299.00", 2)], "2598.00")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let snapshot = gateway(&server).fetch_cart(&credential("asha")).await.unwrap();

    assert_eq!(snapshot.item_count(), 2);
    assert_eq!(snapshot.total(), Decimal::new(259_800, 2));
    assert_eq!(snapshot.line(&key("42")).unwrap().name, "Chanderi Dupatta");
}

#[tokio::test]
async fn test_add_posts_product_and_quantity() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CART_PATH))
        .and(body_json(json!({"product_id": 42, "quantity": 3})))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(cart_body(&[(42, "Chanderi Dupatta", "1299.00", 3)], "3897.00")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let snapshot = gateway(&server)
        .add_item(&credential("asha"), &product_id("42"), 3)
        .await
        .unwrap();

    assert_eq!(snapshot.item_count(), 3);
}

#[tokio::test]
async fn test_update_patches_item() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/v1/orders/cart/item/42/"))
        .and(body_json(json!({"quantity": 5})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(cart_body(&[(42, "Chanderi Dupatta", "1299.00", 5)], "6495.00")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let snapshot = gateway(&server)
        .update_item(&credential("asha"), &product_id("42"), 5)
        .await
        .unwrap();

    assert_eq!(snapshot.total(), Decimal::new(649_500, 2));
}

#[tokio::test]
async fn test_remove_and_clear_use_delete() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/orders/cart/item/42/"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(CART_PATH))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway(&server);
    let asha = credential("asha");

    gateway.remove_item(&asha, &product_id("42")).await.unwrap();
    gateway.clear_cart(&asha).await.unwrap();
}

// ============================================================================
// Error Mapping
// ============================================================================

#[tokio::test]
async fn test_status_codes_map_to_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CART_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid token."})))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/v1/orders/cart/item/9/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(CART_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let gateway = gateway(&server);
    let asha = credential("asha");

    assert!(matches!(
        gateway.fetch_cart(&asha).await,
        Err(GatewayError::Unauthorized)
    ));
    assert!(matches!(
        gateway.update_item(&asha, &product_id("9"), 1).await,
        Err(GatewayError::NotFound(_))
    ));
    assert!(matches!(
        gateway.add_item(&asha, &product_id("9"), 1).await,
        Err(GatewayError::Status { status: 500, ref body }) if body == "boom"
    ));
}

#[tokio::test]
async fn test_malformed_cart_is_a_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CART_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    assert!(matches!(
        gateway(&server).fetch_cart(&credential("asha")).await,
        Err(GatewayError::Parse(_))
    ));
}

#[tokio::test]
async fn test_unreachable_backend_is_an_http_error() {
    let server = MockServer::start().await;
    let gateway = gateway(&server);
    drop(server);

    assert!(matches!(
        gateway.fetch_cart(&credential("asha")).await,
        Err(GatewayError::Http(_))
    ));
}

// ============================================================================
// Cart Over HTTP
// ============================================================================

#[tokio::test]
async fn test_signed_in_cart_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CART_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(cart_body(&[], "0.00")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(CART_PATH))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(cart_body(&[(42, "Chanderi Dupatta", "1299.00", 1)], "1249.00")),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path());
    let cart = Cart::start(
        gateway(&server),
        store.clone(),
        StaleResponsePolicy::Discard,
        &signed_in("asha"),
    );
    cart.settle().await;
    assert_eq!(cart.status().phase, Phase::Ready);
    assert_eq!(cart.status().mode, CartMode::Remote);

    let optimistic = cart.add(&product("42", 1299), 1, None, None);
    assert_eq!(optimistic.total(), Decimal::new(1299, 0));

    cart.settle().await;

    assert_eq!(cart.snapshot().total(), Decimal::new(124_900, 2));
    assert!(!cart.status().degraded);
    // Signed-in carts never touch the local store.
    assert!(store.load().unwrap().is_none());
}

#[tokio::test]
async fn test_backend_outage_degrades_signed_in_cart() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CART_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cart = Cart::start(
        gateway(&server),
        FileStore::new(dir.path()),
        StaleResponsePolicy::Discard,
        &signed_in("asha"),
    );
    let mut notices = cart.notices();
    cart.settle().await;

    let status = cart.status();
    assert_eq!(status.phase, Phase::Ready);
    assert!(status.degraded);
    assert!(cart.snapshot().is_empty());
    assert!(notices.try_recv().is_ok());
}
