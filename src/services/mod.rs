pub mod discounts;
pub mod inventory;
pub mod orders;
pub mod payments;
pub mod pricing;
pub mod webhooks;
