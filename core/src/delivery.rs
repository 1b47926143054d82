//! Out-of-band ticket delivery.
//!
//! After a confirmation commits, the purchaser's tickets are pushed through a
//! [`TicketDelivery`] (a messaging bot, email, ...). Delivery runs outside the
//! transaction and its failure never undoes the confirmation.

use crate::types::{OrderDetail, Purchaser};
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Delivery channel failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("ticket delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// Pushes issued tickets to a purchaser.
#[async_trait]
pub trait TicketDelivery: Send + Sync {
    /// Sends the tickets of a confirmed order.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] if the channel rejected the message.
    async fn deliver(&self, purchaser: &Purchaser, order: &OrderDetail) -> Result<(), DeliveryError>;
}

/// What happened to delivery after a confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// The channel accepted the tickets.
    Delivered,
    /// The purchaser has no delivery identity.
    NoRecipient,
    /// The channel failed; the order stays confirmed.
    Failed(String),
}
