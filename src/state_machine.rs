//! Pure order-status state machine.
//!
//! A stateless lookup table over the six order statuses. No I/O, no side
//! effects; every caller that mutates an order consults this module first and
//! surfaces [`transition_rejection_reason`] verbatim on rejection.

use crate::entities::order::OrderStatus;

/// Status every order starts in.
pub fn initial_status() -> OrderStatus {
    OrderStatus::Pending
}

/// Whether `status` admits no further transitions.
pub fn is_terminal(status: OrderStatus) -> bool {
    matches!(status, OrderStatus::Cancelled | OrderStatus::Refunded)
}

/// The statuses reachable from `from` in one transition.
pub fn valid_next_statuses(from: OrderStatus) -> &'static [OrderStatus] {
    match from {
        OrderStatus::Pending => &[
            OrderStatus::Processing,
            OrderStatus::Cancelled,
            OrderStatus::Refunded,
        ],
        OrderStatus::Processing => &[
            OrderStatus::Shipped,
            OrderStatus::Cancelled,
            OrderStatus::Refunded,
        ],
        OrderStatus::Shipped => &[
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
            OrderStatus::Refunded,
        ],
        OrderStatus::Delivered => &[OrderStatus::Refunded],
        OrderStatus::Cancelled | OrderStatus::Refunded => &[],
    }
}

pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
    valid_next_statuses(from).contains(&to)
}

/// Human-readable reason a transition is rejected, or `None` when it is
/// allowed. Callers surface the sentence verbatim.
pub fn transition_rejection_reason(from: OrderStatus, to: OrderStatus) -> Option<String> {
    if is_valid_transition(from, to) {
        return None;
    }
    if is_terminal(from) {
        Some(format!("Cannot transition from {} status", from))
    } else if from == OrderStatus::Delivered {
        Some("Delivered orders can only be refunded".to_string())
    } else {
        Some(format!("Invalid transition from {} to {}", from, to))
    }
}
