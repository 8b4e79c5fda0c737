//! # Order State Machine
//!
//! Which status changes are legal, and what each one does to inventory.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Order Lifecycle                                  │
//! │                                                                         │
//! │   pending ──start──► in_progress ──complete──► completed ──pick_up──►  │
//! │      │                 │     │                    │        picked_up   │
//! │      │ cancel   cancel │     │ reject             │ refund     │       │
//! │      ▼                 ▼     ▼                    ▼            │refund │
//! │   cancelled ◄──────────┘   rejected            refunded ◄──────┘       │
//! │                                                                         │
//! │   Ledger effect:  → completed           consume reservation            │
//! │                   → cancelled/rejected  release reservation            │
//! │                   everything else       none                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `picked_up` only exists for delivery-partner orders; POS orders end at
//! `completed` (or `refunded`).

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::{Order, OrderSource, OrderStatus};

/// What a transition asks of the Reservation Ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEffect {
    None,
    Consume,
    Release,
}

/// Status an order is created in.
///
/// Walk-in orders go straight to the kitchen; scheduled ones wait.
pub fn initial_status(scheduled: bool) -> OrderStatus {
    if scheduled {
        OrderStatus::Pending
    } else {
        OrderStatus::InProgress
    }
}

/// Returns true if `from → to` is a legal move for an order from `source`.
pub fn can_transition(source: OrderSource, from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;

    match (from, to) {
        (Pending, InProgress) => true,
        (Pending | InProgress, Cancelled) => true,
        (InProgress, Rejected) => true,
        (InProgress, Completed) => true,
        (Completed, PickedUp) => source == OrderSource::DeliveryPartner,
        (Completed | PickedUp, Refunded) => true,
        _ => false,
    }
}

/// Validates a transition on an order, returning the ledger work it implies.
pub fn plan_transition(order: &Order, to: OrderStatus) -> CoreResult<LedgerEffect> {
    if !can_transition(order.source, order.status, to) {
        return Err(CoreError::InvalidTransition {
            order_id: order.id.clone(),
            from: order.status,
            to,
        });
    }

    Ok(match to {
        OrderStatus::Completed => LedgerEffect::Consume,
        OrderStatus::Cancelled | OrderStatus::Rejected => LedgerEffect::Release,
        _ => LedgerEffect::None,
    })
}

/// Only orders in the kitchen may have their lines edited.
pub fn ensure_editable(order: &Order) -> CoreResult<()> {
    if order.status == OrderStatus::InProgress {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            order_id: order.id.clone(),
            from: order.status,
            to: OrderStatus::InProgress,
        })
    }
}
