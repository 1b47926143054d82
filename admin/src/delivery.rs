//! Delivery channel used by the CLI.

use async_trait::async_trait;
use boxoffice_core::delivery::{DeliveryError, TicketDelivery};
use boxoffice_core::types::{OrderDetail, Purchaser};

/// Logs the tickets instead of messaging the purchaser.
///
/// The messaging bot lives outside this workspace; operators confirming from
/// the CLI hand tickets over themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDelivery;

#[async_trait]
impl TicketDelivery for LogDelivery {
    async fn deliver(&self, purchaser: &Purchaser, order: &OrderDetail) -> Result<(), DeliveryError> {
        let Some(messenger_id) = purchaser.messenger_id else {
            return Err(DeliveryError(format!(
                "user {} has no messenger account",
                purchaser.user_id
            )));
        };
        for ticket in &order.tickets {
            tracing::info!(
                order_id = %order.order.id,
                ticket_id = %ticket.id,
                messenger_id,
                ticket_type = %ticket.ticket_type,
                "ticket ready for delivery"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxoffice_core::types::{
        EventId, Order, OrderId, OrderStatus, PaymentMethod, UserId,
    };
    use chrono::Utc;

    fn detail() -> OrderDetail {
        let now = Utc::now();
        OrderDetail {
            order: Order {
                id: OrderId::new(),
                user_id: UserId::new(7),
                event_id: EventId::new(1),
                event_title: String::new(),
                status: OrderStatus::Paid,
                payment_method: PaymentMethod::Phone,
                payment_reference: None,
                payment_notes: None,
                promo_code_id: None,
                subtotal_cents: 0,
                discount_cents: 0,
                total_cents: 0,
                currency: "USD".to_string(),
                confirmed_at: Some(now),
                confirmed_by: None,
                canceled_at: None,
                canceled_by: None,
                canceled_reason: None,
                redeemed_at: None,
                created_at: now,
                updated_at: now,
            },
            purchaser: None,
            items: Vec::new(),
            tickets: Vec::new(),
        }
    }

    fn purchaser(messenger_id: Option<i64>) -> Purchaser {
        Purchaser {
            user_id: UserId::new(7),
            messenger_id,
            first_name: String::new(),
            last_name: String::new(),
            username: String::new(),
        }
    }

    #[tokio::test]
    async fn purchasers_without_messenger_account_fail() {
        let result = LogDelivery.deliver(&purchaser(None), &detail()).await;
        assert!(matches!(result, Err(DeliveryError(message)) if message.contains("user 7")));
    }

    #[tokio::test]
    async fn linked_purchasers_are_delivered() {
        let result = LogDelivery.deliver(&purchaser(Some(7_000)), &detail()).await;
        assert_eq!(result, Ok(()));
    }
}
