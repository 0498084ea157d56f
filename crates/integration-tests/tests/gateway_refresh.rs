//! Integration tests for the single-flight refresh-on-401 protocol.
//!
//! Each test points a real gateway at an in-process stub commerce API that
//! answers 401 until the session cookie exists and counts refresh calls.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use greengrocer_core::{Price, ProductId};
use greengrocer_integration_tests::StubApi;
use greengrocer_storefront::Storefront;
use greengrocer_storefront::api::{
    ApiError, ApiGateway, CommerceClient, Navigator, NoopNavigator, OrderStatus, SessionEvent,
};
use greengrocer_storefront::cart::CartLineItem;
use greengrocer_storefront::config::StorefrontConfig;
use rust_decimal::Decimal;
use serde_json::json;

fn config_for(stub: &StubApi, cart_dir: Option<String>) -> StorefrontConfig {
    StorefrontConfig::build(&stub.base_url(), cart_dir, "5").expect("Failed to build config")
}

fn gateway_for(stub: &StubApi) -> ApiGateway {
    ApiGateway::new(&config_for(stub, None), Box::new(NoopNavigator))
        .expect("Failed to build gateway")
}

/// Navigator that counts redirects instead of navigating.
#[derive(Clone, Default)]
struct RecordingNavigator {
    redirects: Arc<AtomicUsize>,
}

impl Navigator for RecordingNavigator {
    fn at_login(&self) -> bool {
        false
    }

    fn to_login(&self) {
        self.redirects.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn concurrent_401s_share_a_single_refresh() {
    let stub = StubApi::spawn().await;
    let client = CommerceClient::new(gateway_for(&stub));

    let mut handles = Vec::new();
    for _ in 0..5 {
        let client = client.clone();
        handles.push(tokio::spawn(
            async move { client.products(None, None).await },
        ));
    }

    for handle in handles {
        let products = handle
            .await
            .expect("task panicked")
            .expect("request should succeed after refresh");
        assert_eq!(products.len(), 2);
    }

    assert_eq!(
        stub.refresh_calls(),
        1,
        "five simultaneous 401s must share one refresh call"
    );
}

#[tokio::test]
async fn refresh_success_broadcasts_session_event() {
    let stub = StubApi::spawn().await;
    let gateway = gateway_for(&stub);
    let mut events = gateway.subscribe();

    let client = CommerceClient::new(gateway);
    client
        .products(None, None)
        .await
        .expect("request should succeed after refresh");

    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("event should arrive")
        .expect("channel should stay open");
    assert_eq!(event, SessionEvent::Refreshed);
}

#[tokio::test]
async fn failed_refresh_rejects_all_waiters_and_redirects_once() {
    let stub = StubApi::spawn_failing_refresh().await;
    let navigator = RecordingNavigator::default();
    let redirects = Arc::clone(&navigator.redirects);

    let gateway = ApiGateway::new(&config_for(&stub, None), Box::new(navigator))
        .expect("Failed to build gateway");
    let client = CommerceClient::new(gateway);

    let mut handles = Vec::new();
    for _ in 0..5 {
        let client = client.clone();
        handles.push(tokio::spawn(
            async move { client.products(None, None).await },
        ));
    }

    for handle in handles {
        let err = handle
            .await
            .expect("task panicked")
            .expect_err("request must fail when refresh fails");
        assert!(
            matches!(err, ApiError::Session(_)),
            "waiters share the refresh error, got: {err}"
        );
    }

    assert_eq!(stub.refresh_calls(), 1, "the refresh is never retried");
    assert_eq!(
        redirects.load(Ordering::SeqCst),
        1,
        "one terminal failure redirects to login exactly once"
    );
}

#[tokio::test]
async fn auth_endpoint_401_bypasses_the_refresh_protocol() {
    let stub = StubApi::spawn().await;
    let gateway = gateway_for(&stub);

    let response = gateway
        .post_json(
            "auth/login",
            &json!({"email": "shopper@example.com", "password": "wrong"}),
        )
        .await
        .expect("the 401 must surface as a response, not enter the protocol");

    assert_eq!(response.status().as_u16(), 401);
    assert_eq!(stub.refresh_calls(), 0);
}

#[tokio::test]
async fn checkout_replays_after_refresh_and_clears_the_cart() {
    let stub = StubApi::spawn().await;
    let cart_dir = tempfile::tempdir().expect("Failed to create temp dir");

    let config = config_for(&stub, Some(cart_dir.path().display().to_string()));
    let storefront =
        Storefront::new(config, Box::new(NoopNavigator)).expect("Failed to build storefront");

    storefront.cart().add_item(CartLineItem::new(
        ProductId::new(1),
        "Apples".to_string(),
        Price::new(Decimal::new(250, 2)).expect("non-negative"),
    ));
    storefront.cart().add_item(CartLineItem::new(
        ProductId::new(2),
        "Oat Milk".to_string(),
        Price::new(Decimal::new(199, 2)).expect("non-negative"),
    ));

    let order = storefront.checkout().await.expect("checkout should succeed");
    assert_eq!(order.status, OrderStatus::Processing);

    // The cart emptied and its durable entry was purged, not rewritten
    assert!(storefront.cart().state().is_empty());
    assert!(!cart_dir.path().join("cart.json").exists());

    // The initial 401 cost exactly one refresh
    assert_eq!(stub.refresh_calls(), 1);
}

#[tokio::test]
async fn empty_cart_checkout_is_rejected_locally() {
    let stub = StubApi::spawn().await;
    let storefront = Storefront::new(config_for(&stub, None), Box::new(NoopNavigator))
        .expect("Failed to build storefront");

    let err = storefront
        .checkout()
        .await
        .expect_err("empty cart must not reach the network");
    assert!(matches!(err, ApiError::InvalidInput(_)));
    assert_eq!(stub.refresh_calls(), 0);
}
