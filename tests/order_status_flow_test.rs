mod common;

use common::{line, order_request, TestApp};

use storefront_api::{
    entities::order::OrderStatus,
    errors::ServiceError,
    services::orders::{OrderPaymentEvent, OrderService},
};

use std::sync::Arc;
use uuid::Uuid;

async fn seeded_order(app: &TestApp) -> (Arc<OrderService>, Uuid) {
    let (product, variant) = app.seed_variant(5_000, 50).await;
    let orders = app.state.services.orders.clone();
    let details = orders
        .create_order(order_request(vec![line(product.id, variant.id, 1)]))
        .await
        .expect("order creation");
    (orders, details.order.id)
}

#[tokio::test]
async fn happy_path_walks_the_full_lifecycle() {
    let app = TestApp::new().await;
    let (orders, order_id) = seeded_order(&app).await;

    let order = orders
        .update_order_status(order_id, OrderStatus::Processing, None, None)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Processing);

    let order = orders
        .update_order_status(order_id, OrderStatus::Shipped, None, None)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Shipped);
    assert!(order.shipped_at.is_some());

    let order = orders
        .update_order_status(order_id, OrderStatus::Delivered, None, None)
        .await
        .unwrap();
    assert!(order.delivered_at.is_some());

    // Every transition appended a history row on top of the creation row.
    let history = orders.get_status_history(order_id).await.unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].status, OrderStatus::Delivered);
}

#[tokio::test]
async fn invalid_transitions_carry_exact_reasons() {
    let app = TestApp::new().await;
    let (orders, order_id) = seeded_order(&app).await;

    // Self-transition.
    let err = orders
        .update_order_status(order_id, OrderStatus::Pending, None, None)
        .await
        .unwrap_err();
    match err {
        ServiceError::InvalidStatusTransition(msg) => {
            assert_eq!(msg, "Invalid transition from pending to pending");
        }
        other => panic!("expected InvalidStatusTransition, got {other:?}"),
    }

    // Skipping straight to shipped.
    let err = orders
        .update_order_status(order_id, OrderStatus::Shipped, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidStatusTransition(_)));

    // Delivered orders only refund.
    orders
        .update_order_status(order_id, OrderStatus::Processing, None, None)
        .await
        .unwrap();
    orders
        .update_order_status(order_id, OrderStatus::Shipped, None, None)
        .await
        .unwrap();
    orders
        .update_order_status(order_id, OrderStatus::Delivered, None, None)
        .await
        .unwrap();
    let err = orders
        .update_order_status(order_id, OrderStatus::Processing, None, None)
        .await
        .unwrap_err();
    match err {
        ServiceError::InvalidStatusTransition(msg) => {
            assert_eq!(msg, "Delivered orders can only be refunded");
        }
        other => panic!("expected InvalidStatusTransition, got {other:?}"),
    }

    // Terminal statuses reject everything.
    orders
        .update_order_status(order_id, OrderStatus::Refunded, None, None)
        .await
        .unwrap();
    let err = orders
        .update_order_status(order_id, OrderStatus::Pending, None, None)
        .await
        .unwrap_err();
    match err {
        ServiceError::InvalidStatusTransition(msg) => {
            assert_eq!(msg, "Cannot transition from refunded status");
        }
        other => panic!("expected InvalidStatusTransition, got {other:?}"),
    }
}

#[tokio::test]
async fn rejected_transition_leaves_no_history_row() {
    let app = TestApp::new().await;
    let (orders, order_id) = seeded_order(&app).await;

    let before = orders.get_status_history(order_id).await.unwrap().len();
    let _ = orders
        .update_order_status(order_id, OrderStatus::Delivered, None, None)
        .await
        .unwrap_err();
    let after = orders.get_status_history(order_id).await.unwrap().len();
    assert_eq!(before, after);

    let order = orders.find_order(order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn next_statuses_follow_the_machine() {
    let app = TestApp::new().await;
    let (orders, order_id) = seeded_order(&app).await;

    let next = orders.get_valid_next_statuses(order_id).await.unwrap();
    assert_eq!(
        next,
        vec![
            OrderStatus::Processing,
            OrderStatus::Cancelled,
            OrderStatus::Refunded
        ]
    );

    orders
        .update_order_status(order_id, OrderStatus::Cancelled, None, None)
        .await
        .unwrap();
    let next = orders.get_valid_next_statuses(order_id).await.unwrap();
    assert!(next.is_empty());
}

#[tokio::test]
async fn stale_payment_completed_event_is_dropped() {
    let app = TestApp::new().await;
    let (orders, order_id) = seeded_order(&app).await;

    orders
        .update_order_status(order_id, OrderStatus::Processing, None, None)
        .await
        .unwrap();
    orders
        .update_order_status(order_id, OrderStatus::Shipped, None, None)
        .await
        .unwrap();

    // The order has moved on; the event must be dropped without error and
    // without rewinding the status.
    orders
        .handle_payment_event(OrderPaymentEvent::PaymentCompleted { order_id })
        .await
        .unwrap();
    let order = orders.find_order(order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Shipped);
}

#[tokio::test]
async fn history_rows_sharing_a_timestamp_keep_insertion_order() {
    use sea_orm::{ActiveModelTrait, Set};
    use storefront_api::entities::order_status_history;

    let app = TestApp::new().await;
    let (orders, order_id) = seeded_order(&app).await;

    // Two entries landing in the same timestamp tick must still come back
    // newest-insertion-first.
    let now = chrono::Utc::now();
    for status in [OrderStatus::Processing, OrderStatus::Shipped] {
        order_status_history::ActiveModel {
            order_id: Set(order_id),
            status: Set(status),
            note: Set(None),
            changed_by: Set("system".to_string()),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(app.db())
        .await
        .unwrap();
    }

    let history = orders.get_status_history(order_id).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].status, OrderStatus::Shipped);
    assert_eq!(history[1].status, OrderStatus::Processing);
    assert_eq!(history[2].status, OrderStatus::Pending);
    assert!(history[0].id > history[1].id);
}

#[tokio::test]
async fn payment_failure_is_recorded_without_status_change() {
    let app = TestApp::new().await;
    let (orders, order_id) = seeded_order(&app).await;

    orders
        .handle_payment_event(OrderPaymentEvent::PaymentFailed {
            order_id,
            reason: "card declined".to_string(),
        })
        .await
        .unwrap();

    let order = orders.find_order(order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);

    let history = orders.get_status_history(order_id).await.unwrap();
    assert_eq!(
        history[0].note.as_deref(),
        Some("Payment failed: card declined")
    );
    assert_eq!(history[0].status, OrderStatus::Pending);
}
