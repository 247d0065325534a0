mod common;

use common::{line, order_request, TestApp, CARD_MERCHANT, CARD_SECRET};

use storefront_api::{
    entities::{
        order::{OrderPaymentStatus, OrderStatus},
        payment::{PaymentProvider, PaymentStatus},
    },
    errors::ServiceError,
    services::webhooks::{
        hmac_hex, CardGatewayNotification, PromptPayNotification, WebhookOutcome,
    },
};

use chrono::Utc;
use uuid::Uuid;

struct Settled {
    order_id: Uuid,
    payment_id: Uuid,
    total: i64,
}

async fn order_with_pending_payment(app: &TestApp, provider: PaymentProvider) -> Settled {
    let (product, variant) = app.seed_variant(5_000, 50).await;
    let details = app
        .state
        .services
        .orders
        .create_order(order_request(vec![line(product.id, variant.id, 2)]))
        .await
        .expect("order creation");
    let method = match provider {
        PaymentProvider::PromptPay => "promptpay",
        PaymentProvider::Card => "card",
    };
    let payment = app
        .state
        .services
        .payments
        .create_payment(details.order.id, provider, method)
        .await
        .expect("payment creation");
    assert_eq!(payment.amount, details.order.total_amount);
    Settled {
        order_id: details.order.id,
        payment_id: payment.id,
        total: details.order.total_amount,
    }
}

fn promptpay_notification(ctx: &Settled, transaction_id: &str, status: &str) -> PromptPayNotification {
    PromptPayNotification {
        transaction_id: transaction_id.to_string(),
        amount: ctx.total,
        currency: "THB".to_string(),
        status: status.to_string(),
        reference_id: ctx.payment_id.to_string(),
        timestamp: Utc::now().to_rfc3339(),
    }
}

#[tokio::test]
async fn successful_promptpay_webhook_settles_payment_and_order() {
    let app = TestApp::new().await;
    let ctx = order_with_pending_payment(&app, PaymentProvider::PromptPay).await;

    let outcome = app
        .state
        .services
        .webhooks
        .process_promptpay(promptpay_notification(&ctx, "TXN-PP-1", "success"))
        .await
        .unwrap();
    assert_eq!(outcome, WebhookOutcome::Processed);

    let payment = app
        .state
        .services
        .payments
        .get_payment(ctx.payment_id)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert_eq!(payment.transaction_id.as_deref(), Some("TXN-PP-1"));
    assert!(payment.completed_at.is_some());
    assert!(payment.provider_response.is_some());

    let order = app
        .state
        .services
        .orders
        .find_order(ctx.order_id)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Processing);
    assert_eq!(order.payment_status, OrderPaymentStatus::Paid);
    assert!(order.paid_at.is_some());

    let history = app
        .state
        .services
        .orders
        .get_status_history(ctx.order_id)
        .await
        .unwrap();
    assert_eq!(
        history[0].note.as_deref(),
        Some("Payment completed successfully")
    );
}

#[tokio::test]
async fn redelivered_webhook_is_a_duplicate_and_changes_nothing() {
    let app = TestApp::new().await;
    let ctx = order_with_pending_payment(&app, PaymentProvider::PromptPay).await;
    let notification = promptpay_notification(&ctx, "TXN-PP-2", "success");

    let first = app
        .state
        .services
        .webhooks
        .process_promptpay(notification.clone())
        .await
        .unwrap();
    assert_eq!(first, WebhookOutcome::Processed);

    let history_len = app
        .state
        .services
        .orders
        .get_status_history(ctx.order_id)
        .await
        .unwrap()
        .len();

    let second = app
        .state
        .services
        .webhooks
        .process_promptpay(notification)
        .await
        .unwrap();
    assert_eq!(second, WebhookOutcome::Duplicate);

    // No second transition, no second history row.
    let order = app
        .state
        .services
        .orders
        .find_order(ctx.order_id)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Processing);
    let after = app
        .state
        .services
        .orders
        .get_status_history(ctx.order_id)
        .await
        .unwrap()
        .len();
    assert_eq!(after, history_len);
}

#[tokio::test]
async fn amount_mismatch_is_rejected_before_settlement() {
    let app = TestApp::new().await;
    let ctx = order_with_pending_payment(&app, PaymentProvider::PromptPay).await;

    let mut notification = promptpay_notification(&ctx, "TXN-PP-3", "success");
    notification.amount = ctx.total - 1;

    let err = app
        .state
        .services
        .webhooks
        .process_promptpay(notification)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidOperation(_)));

    let payment = app
        .state
        .services
        .payments
        .get_payment(ctx.payment_id)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn failed_promptpay_webhook_marks_payment_failed_keeps_order_pending() {
    let app = TestApp::new().await;
    let ctx = order_with_pending_payment(&app, PaymentProvider::PromptPay).await;

    let outcome = app
        .state
        .services
        .webhooks
        .process_promptpay(promptpay_notification(&ctx, "TXN-PP-4", "failed"))
        .await
        .unwrap();
    assert_eq!(outcome, WebhookOutcome::Processed);

    let payment = app
        .state
        .services
        .payments
        .get_payment(ctx.payment_id)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert!(payment.failure_reason.is_some());
    assert!(payment.failed_at.is_some());

    let order = app
        .state
        .services
        .orders
        .find_order(ctx.order_id)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_status, OrderPaymentStatus::Failed);
}

#[tokio::test]
async fn card_webhook_resolves_by_order_number_and_masks_pan() {
    let app = TestApp::new().await;
    let ctx = order_with_pending_payment(&app, PaymentProvider::Card).await;
    let order = app
        .state
        .services
        .orders
        .find_order(ctx.order_id)
        .await
        .unwrap();

    let mut notification = CardGatewayNotification {
        merchant_id: CARD_MERCHANT.to_string(),
        order_id: order.order_number.clone(),
        payment_status: "000".to_string(),
        transaction_ref: "TXN-CARD-1".to_string(),
        amount: ctx.total.to_string(),
        currency: "THB".to_string(),
        hash_value: String::new(),
        card_number: Some("4111111111111111".to_string()),
        card_brand: Some("visa".to_string()),
    };
    notification.hash_value = hmac_hex(CARD_SECRET, notification.hash_base().as_bytes());

    app.state
        .services
        .webhooks
        .verify_card_hash(&notification)
        .expect("valid hash");

    let outcome = app
        .state
        .services
        .webhooks
        .process_card(notification)
        .await
        .unwrap();
    assert_eq!(outcome, WebhookOutcome::Processed);

    let payment = app
        .state
        .services
        .payments
        .get_payment(ctx.payment_id)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert_eq!(payment.card_last4.as_deref(), Some("1111"));
    assert_eq!(payment.card_brand.as_deref(), Some("visa"));
    // The stored provider response never contains the full card number.
    let stored = payment.provider_response.unwrap();
    assert!(stored.get("card_number").is_none());

    let order = app
        .state
        .services
        .orders
        .find_order(ctx.order_id)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Processing);
}

#[tokio::test]
async fn card_hash_and_merchant_are_verified() {
    let app = TestApp::new().await;

    let mut notification = CardGatewayNotification {
        merchant_id: CARD_MERCHANT.to_string(),
        order_id: "ORD-20260829-ABC123".to_string(),
        payment_status: "000".to_string(),
        transaction_ref: "TXN-CARD-2".to_string(),
        amount: "16050".to_string(),
        currency: "THB".to_string(),
        hash_value: hmac_hex("wrong-secret", "whatever".as_bytes()),
        card_number: None,
        card_brand: None,
    };
    let err = app
        .state
        .services
        .webhooks
        .verify_card_hash(&notification)
        .unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(_)));

    notification.merchant_id = "SOMEONE_ELSE".to_string();
    notification.hash_value = hmac_hex(CARD_SECRET, notification.hash_base().as_bytes());
    let err = app
        .state
        .services
        .webhooks
        .verify_card_hash(&notification)
        .unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(_)));
}

#[tokio::test]
async fn manual_verification_completes_a_failed_payment() {
    let app = TestApp::new().await;
    let ctx = order_with_pending_payment(&app, PaymentProvider::PromptPay).await;

    app.state
        .services
        .webhooks
        .process_promptpay(promptpay_notification(&ctx, "TXN-PP-5", "failed"))
        .await
        .unwrap();

    let payment = app
        .state
        .services
        .payments
        .manually_verify_payment(ctx.payment_id, "ops@example.com", Some("slip checked".into()))
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);

    let audit = payment.provider_response.unwrap();
    assert_eq!(
        audit.get("manually_verified_by").and_then(|v| v.as_str()),
        Some("ops@example.com")
    );

    let order = app
        .state
        .services
        .orders
        .find_order(ctx.order_id)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Processing);
    assert_eq!(order.payment_status, OrderPaymentStatus::Paid);

    // A second verification of the now-completed payment is refused.
    let err = app
        .state
        .services
        .payments
        .manually_verify_payment(ctx.payment_id, "ops@example.com", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidOperation(_)));
}

#[tokio::test]
async fn refund_moves_payment_and_order_to_refunded() {
    let app = TestApp::new().await;
    let ctx = order_with_pending_payment(&app, PaymentProvider::PromptPay).await;

    app.state
        .services
        .webhooks
        .process_promptpay(promptpay_notification(&ctx, "TXN-PP-6", "success"))
        .await
        .unwrap();

    let payment = app
        .state
        .services
        .payments
        .refund_payment(ctx.payment_id)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Refunded);

    let order = app
        .state
        .services
        .orders
        .find_order(ctx.order_id)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Refunded);
    assert_eq!(order.payment_status, OrderPaymentStatus::Refunded);
}
