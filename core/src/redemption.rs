//! Door check-in.
//!
//! A ticket is redeemed at most once. The check-and-set on `redeemed_at` is a
//! single conditional write, so when several scanners race on the same ticket
//! exactly one wins and the rest see `ticket_already_redeemed`. The owning
//! order stays locked for the whole redemption, so a concurrent cancel either
//! commits first and the scan is refused, or waits for the scan to finish.

use crate::environment::TicketingEnvironment;
use crate::error::{QrMismatch, Result, TicketingError};
use crate::qr::{self, hash_token};
use crate::store::{OrderTransition, StoreTx, TicketingStore, settle};
use crate::types::{AdminId, OrderStatus, Ticket, TicketId};
use serde::Serialize;

/// Result of a successful redemption.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionOutcome {
    /// The redeemed ticket.
    pub ticket: Ticket,
    /// Order status after the redemption.
    pub order_status: OrderStatus,
}

/// Redeems tickets at the door.
pub struct RedemptionService<S> {
    env: TicketingEnvironment<S>,
}

impl<S: TicketingStore> RedemptionService<S> {
    /// Creates the service.
    #[must_use]
    pub const fn new(env: TicketingEnvironment<S>) -> Self {
        Self { env }
    }

    /// Redeems a ticket, optionally authenticating a presented token.
    ///
    /// Without a token the redemption is an operator override. When the last
    /// ticket of an order is redeemed the order becomes `REDEEMED`.
    ///
    /// # Errors
    ///
    /// - [`TicketingError::TicketNotFound`] if the ticket does not exist
    /// - [`TicketingError::TicketAlreadyRedeemed`] if it was redeemed before or
    ///   by a concurrent call
    /// - [`TicketingError::OrderStateNotAllowed`] unless the order is `PAID` or
    ///   `REDEEMED`
    /// - [`TicketingError::TicketQrMismatch`] if the token does not authenticate
    ///   this ticket
    pub async fn redeem_ticket(
        &self,
        ticket_id: TicketId,
        admin_id: AdminId,
        presented_token: Option<&str>,
    ) -> Result<RedemptionOutcome> {
        let token = presented_token.map(str::trim).filter(|t| !t.is_empty());

        let mut tx = self.env.store.begin().await?;
        let outcome = self.redeem_in(&mut tx, ticket_id, admin_id, token).await;
        match settle(tx, outcome).await {
            Ok(redeemed) => {
                tracing::info!(
                    ticket_id = %ticket_id,
                    order_id = %redeemed.ticket.order_id,
                    admin_id = %admin_id,
                    order_status = %redeemed.order_status,
                    with_token = token.is_some(),
                    "ticket redeemed"
                );
                metrics::counter!("boxoffice.tickets.redeemed").increment(1);
                Ok(redeemed)
            }
            Err(error) => {
                if error.is_business_error() {
                    tracing::warn!(ticket_id = %ticket_id, reason = error.code(), "redemption rejected");
                    metrics::counter!("boxoffice.redemptions.rejected", "reason" => error.code())
                        .increment(1);
                }
                Err(error)
            }
        }
    }

    async fn redeem_in(
        &self,
        tx: &mut S::Tx,
        ticket_id: TicketId,
        admin_id: AdminId,
        token: Option<&str>,
    ) -> Result<RedemptionOutcome> {
        let now = self.env.clock.now();
        let locked = tx
            .lock_ticket(ticket_id)
            .await?
            .ok_or(TicketingError::TicketNotFound(ticket_id))?;
        if locked.ticket.is_redeemed() {
            return Err(TicketingError::TicketAlreadyRedeemed(ticket_id));
        }
        if !locked.order_status.is_purchased() {
            return Err(TicketingError::OrderStateNotAllowed {
                status: locked.order_status,
            });
        }
        if let Some(token) = token {
            self.authenticate(&locked.ticket, token)?;
        }

        if !tx.mark_ticket_redeemed(ticket_id, admin_id, now).await? {
            return Err(TicketingError::TicketAlreadyRedeemed(ticket_id));
        }

        let order_id = locked.ticket.order_id;
        let mut order_status = locked.order_status;
        if tx.count_unredeemed_tickets(order_id).await? == 0 {
            if !tx
                .transition_order(order_id, &OrderTransition::Redeem { at: now })
                .await?
            {
                let current = tx
                    .order_detail(order_id, false)
                    .await?
                    .ok_or(TicketingError::OrderNotFound(order_id))?;
                return Err(TicketingError::OrderStateNotAllowed {
                    status: current.order.status,
                });
            }
            order_status = OrderStatus::Redeemed;
        }

        let mut ticket = locked.ticket;
        ticket.redeemed_at = Some(now);
        ticket.redeemed_by = Some(admin_id);
        ticket.order_status = Some(order_status);
        Ok(RedemptionOutcome {
            ticket,
            order_status,
        })
    }

    fn authenticate(&self, ticket: &Ticket, token: &str) -> Result<()> {
        let payload = qr::verify(&self.env.signing_secret, token)
            .map_err(|e| TicketingError::TicketQrMismatch(QrMismatch::from(e)))?;
        if let Some(field) = payload.mismatched_field(ticket) {
            return Err(TicketingError::TicketQrMismatch(QrMismatch::Field(field)));
        }
        if let Some(stored) = ticket.qr_payload_hash.as_deref().filter(|h| !h.is_empty()) {
            let presented = hash_token(token);
            if !constant_time_eq::constant_time_eq(stored.as_bytes(), presented.as_bytes()) {
                return Err(TicketingError::TicketQrMismatch(QrMismatch::Hash));
            }
        }
        Ok(())
    }
}
