//! Test harness: application state over an in-memory SQLite database with
//! the schema built straight from the entities.

// Each test binary uses a different slice of the helpers.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend,
    Schema, Set,
};
use tokio::task::JoinHandle;
use uuid::Uuid;

use storefront_api::{
    config::AppConfig,
    entities::{
        complimentary_gift, discount_code, discount_code_usage, gift_product, order,
        order_address, order_gift, order_item, order_status_history, payment, product,
        product_variant, shipment,
    },
    events,
    notifications::LogNotifier,
    services::orders::{AddressInput, CreateOrderRequest},
    services::pricing::OrderLineRequest,
    AppState,
};

pub const PROMPTPAY_SECRET: &str = "whsec_test_promptpay";
pub const CARD_SECRET: &str = "cgsec_test_card";
pub const CARD_MERCHANT: &str = "MERCHANT001";

pub struct TestApp {
    pub state: AppState,
    _event_task: JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        // A single connection keeps every statement on the same in-memory
        // database and serializes concurrent writers the way a server-side
        // database would.
        let mut opts = ConnectOptions::new("sqlite::memory:");
        opts.max_connections(1).min_connections(1).sqlx_logging(false);
        let db = Database::connect(opts).await.expect("connect to sqlite");

        create_schema(&db).await;

        let mut config = AppConfig::new("sqlite::memory:");
        config.promptpay_webhook_secret = Some(PROMPTPAY_SECRET.to_string());
        config.card_gateway_secret = Some(CARD_SECRET.to_string());
        config.card_merchant_id = Some(CARD_MERCHANT.to_string());

        let (event_sender, event_rx) = events::channel(64);
        let event_task = tokio::spawn(events::process_events(event_rx, Arc::new(LogNotifier)));

        let state = AppState::build(Arc::new(db), config, event_sender);
        Self {
            state,
            _event_task: event_task,
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.state.db
    }

    /// Seeds an active product with one tracked variant.
    pub async fn seed_variant(&self, price: i64, stock: i32) -> (product::Model, product_variant::Model) {
        let now = Utc::now();
        let product = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set("Ceramic Mug".to_string()),
            sku: Set(format!("MUG-{}", Uuid::new_v4().simple())),
            status: Set(product::ProductStatus::Active),
            base_price: Set(price),
            category_id: Set(None),
            sold_count: Set(0),
            is_deleted: Set(false),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(self.db())
        .await
        .expect("insert product");

        let variant = product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product.id),
            sku: Set(format!("MUG-V-{}", Uuid::new_v4().simple())),
            name: Set("350ml".to_string()),
            price: Set(price),
            stock_quantity: Set(stock),
            inventory_tracking: Set(true),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(self.db())
        .await
        .expect("insert variant");

        (product, variant)
    }

    pub async fn seed_discount_code(
        &self,
        code: &str,
        model: discount_code::ActiveModel,
    ) -> discount_code::Model {
        let mut model = model;
        model.id = Set(Uuid::new_v4());
        model.code = Set(code.to_string());
        model.created_at = Set(Utc::now());
        model.insert(self.db()).await.expect("insert discount code")
    }
}

pub fn address() -> AddressInput {
    AddressInput {
        first_name: "Nara".to_string(),
        last_name: "Srisuwan".to_string(),
        address_line1: "99/1 Sukhumvit Rd".to_string(),
        address_line2: None,
        city: "Bangkok".to_string(),
        province: "Bangkok".to_string(),
        postal_code: "10110".to_string(),
        country: "TH".to_string(),
        phone: "0812345678".to_string(),
    }
}

pub fn order_request(lines: Vec<OrderLineRequest>) -> CreateOrderRequest {
    CreateOrderRequest {
        email: "customer@example.com".to_string(),
        customer_id: None,
        items: lines,
        shipping_address: address(),
        billing_address: address(),
        discount_code: None,
        shipping_method: None,
        customer_note: None,
    }
}

pub fn line(product_id: Uuid, variant_id: Uuid, quantity: i32) -> OrderLineRequest {
    OrderLineRequest {
        product_id,
        variant_id: Some(variant_id),
        quantity,
    }
}

async fn create_schema(db: &DatabaseConnection) {
    let schema = Schema::new(DbBackend::Sqlite);
    let backend = db.get_database_backend();

    macro_rules! create {
        ($entity:expr) => {
            db.execute(backend.build(&schema.create_table_from_entity($entity)))
                .await
                .expect("create table");
        };
    }

    create!(product::Entity);
    create!(product_variant::Entity);
    create!(order::Entity);
    create!(order_item::Entity);
    create!(order_address::Entity);
    create!(shipment::Entity);
    create!(order_status_history::Entity);
    create!(order_gift::Entity);
    create!(complimentary_gift::Entity);
    create!(gift_product::Entity);
    create!(discount_code::Entity);
    create!(discount_code_usage::Entity);
    create!(payment::Entity);
}
