//! Database entities for the order lifecycle and payment settlement core.
//!
//! Orders and their sub-rows (items, addresses, shipment, history, gifts,
//! discount usage) are created together in a single transaction and never
//! partially exist. Products and variants are a minimal projection of the
//! catalog collaborator; only `stock_quantity` and `sold_count` are mutated
//! here, and only through the inventory service.

pub mod complimentary_gift;
pub mod discount_code;
pub mod discount_code_usage;
pub mod gift_product;
pub mod order;
pub mod order_address;
pub mod order_gift;
pub mod order_item;
pub mod order_status_history;
pub mod payment;
pub mod product;
pub mod product_variant;
pub mod shipment;
