mod common;

use common::{line, order_request, TestApp};
use chrono::{Duration, Utc};
use sea_orm::Set;
use uuid::Uuid;

use storefront_api::{
    entities::discount_code::{self, DiscountType},
    errors::ServiceError,
    services::discounts::DiscountRejection,
    services::orders::CreateOrderRequest,
};

fn with_code(mut request: CreateOrderRequest, code: &str, customer: Option<Uuid>) -> CreateOrderRequest {
    request.discount_code = Some(code.to_string());
    request.customer_id = customer;
    request
}

fn expect_rejection(err: ServiceError, expected: DiscountRejection) {
    match err {
        ServiceError::DiscountRejected(rejection) => assert_eq!(rejection, expected),
        other => panic!("expected DiscountRejected({expected:?}), got {other:?}"),
    }
}

#[tokio::test]
async fn usage_limits_are_enforced_at_the_boundary() {
    let app = TestApp::new().await;
    let (product, variant) = app.seed_variant(6_000, 100).await;
    app.seed_discount_code(
        "LAUNCH10",
        discount_code::ActiveModel {
            discount_type: Set(DiscountType::Percentage),
            value: Set(10),
            usage_limit: Set(Some(2)),
            usage_limit_per_customer: Set(Some(1)),
            is_active: Set(true),
            ..Default::default()
        },
    )
    .await;

    let customer_a = Uuid::new_v4();
    let customer_b = Uuid::new_v4();
    let customer_c = Uuid::new_v4();

    // First use by customer A: 10% of 6_000.
    let details = app
        .state
        .services
        .orders
        .create_order(with_code(
            order_request(vec![line(product.id, variant.id, 1)]),
            "LAUNCH10",
            Some(customer_a),
        ))
        .await
        .expect("first use");
    assert_eq!(details.order.discount_amount, 600);

    // Customer A again: blocked by the per-customer limit.
    let err = app
        .state
        .services
        .orders
        .create_order(with_code(
            order_request(vec![line(product.id, variant.id, 1)]),
            "LAUNCH10",
            Some(customer_a),
        ))
        .await
        .unwrap_err();
    expect_rejection(err, DiscountRejection::AlreadyUsed);

    // Customer B takes the second and last global use.
    app.state
        .services
        .orders
        .create_order(with_code(
            order_request(vec![line(product.id, variant.id, 1)]),
            "LAUNCH10",
            Some(customer_b),
        ))
        .await
        .expect("second use");

    // Customer C hits the global limit.
    let err = app
        .state
        .services
        .orders
        .create_order(with_code(
            order_request(vec![line(product.id, variant.id, 1)]),
            "LAUNCH10",
            Some(customer_c),
        ))
        .await
        .unwrap_err();
    expect_rejection(err, DiscountRejection::UsageLimitReached);
}

#[tokio::test]
async fn rejected_discount_leaves_no_order_or_usage_behind() {
    use sea_orm::{EntityTrait, PaginatorTrait};
    use storefront_api::entities::{discount_code_usage, order};

    let app = TestApp::new().await;
    let (product, variant) = app.seed_variant(6_000, 100).await;
    app.seed_discount_code(
        "BIGSPENDER",
        discount_code::ActiveModel {
            discount_type: Set(DiscountType::FixedAmount),
            value: Set(5_000),
            min_purchase_amount: Set(Some(100_000)),
            is_active: Set(true),
            ..Default::default()
        },
    )
    .await;

    let err = app
        .state
        .services
        .orders
        .create_order(with_code(
            order_request(vec![line(product.id, variant.id, 1)]),
            "BIGSPENDER",
            None,
        ))
        .await
        .unwrap_err();
    expect_rejection(err, DiscountRejection::MinPurchaseNotMet);

    assert_eq!(order::Entity::find().count(app.db()).await.unwrap(), 0);
    assert_eq!(
        discount_code_usage::Entity::find()
            .count(app.db())
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn time_window_checks() {
    let app = TestApp::new().await;
    let (product, variant) = app.seed_variant(6_000, 100).await;
    let now = Utc::now();

    app.seed_discount_code(
        "TOMORROW",
        discount_code::ActiveModel {
            discount_type: Set(DiscountType::Percentage),
            value: Set(10),
            starts_at: Set(Some(now + Duration::days(1))),
            is_active: Set(true),
            ..Default::default()
        },
    )
    .await;
    app.seed_discount_code(
        "YESTERDAY",
        discount_code::ActiveModel {
            discount_type: Set(DiscountType::Percentage),
            value: Set(10),
            expires_at: Set(Some(now - Duration::days(1))),
            is_active: Set(true),
            ..Default::default()
        },
    )
    .await;

    let err = app
        .state
        .services
        .orders
        .create_order(with_code(
            order_request(vec![line(product.id, variant.id, 1)]),
            "TOMORROW",
            None,
        ))
        .await
        .unwrap_err();
    expect_rejection(err, DiscountRejection::NotStarted);

    let err = app
        .state
        .services
        .orders
        .create_order(with_code(
            order_request(vec![line(product.id, variant.id, 1)]),
            "YESTERDAY",
            None,
        ))
        .await
        .unwrap_err();
    expect_rejection(err, DiscountRejection::Expired);

    let err = app
        .state
        .services
        .orders
        .create_order(with_code(
            order_request(vec![line(product.id, variant.id, 1)]),
            "NO-SUCH-CODE",
            None,
        ))
        .await
        .unwrap_err();
    expect_rejection(err, DiscountRejection::InvalidCode);
}

#[tokio::test]
async fn free_shipping_code_discounts_exactly_the_shipping_cost() {
    let app = TestApp::new().await;
    let (product, variant) = app.seed_variant(6_000, 100).await;
    app.seed_discount_code(
        "SHIPFREE",
        discount_code::ActiveModel {
            discount_type: Set(DiscountType::FreeShipping),
            value: Set(0),
            is_active: Set(true),
            ..Default::default()
        },
    )
    .await;

    let details = app
        .state
        .services
        .orders
        .create_order(with_code(
            order_request(vec![line(product.id, variant.id, 1)]),
            "SHIPFREE",
            None,
        ))
        .await
        .unwrap();

    // Tax is still computed on subtotal + shipping before the discount.
    assert_eq!(details.order.subtotal, 6_000);
    assert_eq!(details.order.shipping_cost, 5_000);
    assert_eq!(details.order.discount_amount, 5_000);
    assert_eq!(
        details.order.total_amount,
        6_000 + 5_000 + details.order.tax_amount - 5_000
    );
}

#[tokio::test]
async fn percentage_cap_limits_the_discount() {
    let app = TestApp::new().await;
    let (product, variant) = app.seed_variant(6_000, 100).await;
    app.seed_discount_code(
        "HALFOFF",
        discount_code::ActiveModel {
            discount_type: Set(DiscountType::Percentage),
            value: Set(50),
            max_discount_amount: Set(Some(1_000)),
            is_active: Set(true),
            ..Default::default()
        },
    )
    .await;

    let details = app
        .state
        .services
        .orders
        .create_order(with_code(
            order_request(vec![line(product.id, variant.id, 2)]),
            "HALFOFF",
            None,
        ))
        .await
        .unwrap();

    // 50% of 12_000 would be 6_000; the cap wins.
    assert_eq!(details.order.discount_amount, 1_000);
}
