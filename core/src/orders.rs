//! Order lifecycle.
//!
//! ```text
//!            create                confirm                 redeem (last ticket)
//!   (none) ─────────▶ PENDING ─────────────▶ PAID ─────────────────────▶ REDEEMED
//!                        │                    │
//!                        └──── cancel ────────┴──▶ CANCELED
//! ```
//!
//! Promo usage is consumed when an order is created; inventory is reserved
//! only when it is confirmed, so unpaid orders never hold stock. Cancellation
//! returns the promo use in every case and the inventory only if it had been
//! reserved.

use crate::delivery::{DeliveryOutcome, TicketDelivery};
use crate::environment::TicketingEnvironment;
use crate::error::{Result, TicketingError};
use crate::promo::{PromoContext, PromoFailure, PromoRejection, PromoRule, validate_promo};
use crate::qr::{self, QrPayload, hash_token, new_nonce};
use crate::store::{
    IssuedQr, NewOrder, NewOrderItem, NewTicket, OrderQuery, OrderTransition, StoreTx,
    TicketingStore, normalize_limit, settle,
};
use crate::types::{
    AdminId, DiscountType, EventId, ItemType, Meta, OrderDetail, OrderId, OrderItem, OrderStatus,
    OrderSummary, Page, PaymentMethod, ProductId, PromoCodeId, Purchaser, Ticket, TicketId,
    UserId, normalize_token,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

/// Note attached to orders paid through a manually checked channel.
pub const MANUAL_PAYMENT_NOTE: &str = "waiting_for_manual_confirmation";

/// One requested product line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSelection {
    /// Product.
    pub product_id: ProductId,
    /// Units; zero is ignored.
    pub quantity: u32,
}

/// Input for [`OrderService::create_order`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    /// Purchaser.
    pub user_id: UserId,
    /// Event.
    pub event_id: EventId,
    /// Payment method, any case.
    pub payment_method: String,
    /// Purchaser payment reference.
    #[serde(default)]
    pub payment_reference: Option<String>,
    /// Ticket lines; at least one is required.
    pub ticket_items: Vec<ProductSelection>,
    /// Transfer lines.
    #[serde(default)]
    pub transfer_items: Vec<ProductSelection>,
    /// Promo code, any case.
    #[serde(default)]
    pub promo_code: Option<String>,
}

/// A confirmed order and who to deliver it to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedOrder {
    /// Order with issued tickets.
    pub detail: OrderDetail,
    /// Delivery identity of the purchaser, if the user exists.
    pub purchaser: Option<Purchaser>,
}

/// A confirmed order plus what happened to delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveredOrder {
    /// The confirmation.
    pub confirmed: ConfirmedOrder,
    /// Delivery result.
    pub delivery: DeliveryOutcome,
}

/// Result of a promo code lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoCheck {
    /// Whether the code would apply.
    pub valid: bool,
    /// Normalised code.
    pub code: String,
    /// Discount type of the stored code.
    pub discount_type: Option<DiscountType>,
    /// Value of the stored code.
    pub value: i64,
    /// Discount that would apply.
    pub discount_cents: i64,
    /// Amount that would be due.
    pub total_cents: i64,
    /// Why the code would not apply.
    pub reason: Option<PromoFailure>,
}

impl PromoCheck {
    fn failed(code: String, subtotal_cents: i64, reason: PromoFailure) -> Self {
        Self {
            valid: false,
            code,
            discount_type: None,
            value: 0,
            discount_cents: 0,
            total_cents: subtotal_cents.max(0),
            reason: Some(reason),
        }
    }
}

/// Merges duplicate selections, capping each selection before summing.
///
/// Returns products in id order, which is also the order they are locked in.
#[must_use]
pub fn merge_selections(selections: &[ProductSelection], cap: u32) -> Vec<(ProductId, u32)> {
    let mut merged: BTreeMap<ProductId, u32> = BTreeMap::new();
    for selection in selections.iter().filter(|s| s.quantity > 0) {
        let quantity = selection.quantity.min(cap);
        let entry = merged.entry(selection.product_id).or_insert(0);
        *entry = entry.saturating_add(quantity);
    }
    merged.into_iter().collect()
}

fn line_total(unit_price_cents: i64, quantity: u32) -> Result<i64> {
    unit_price_cents
        .checked_mul(i64::from(quantity))
        .ok_or_else(|| TicketingError::invalid_product("line total overflows"))
}

/// Items sorted into inventory reservation order.
///
/// Ticket products come before transfer products, each in id order, matching
/// the order order creation locks them in.
fn reservation_order(mut items: Vec<OrderItem>) -> Vec<OrderItem> {
    items.sort_by_key(|item| (item.item_type, item.product_id));
    items
}

struct PricedOrder {
    items: Vec<NewOrderItem>,
    tickets: Vec<NewTicket>,
    subtotal_cents: i64,
}

/// Creates, confirms and cancels orders.
pub struct OrderService<S> {
    env: TicketingEnvironment<S>,
}

impl<S: TicketingStore> OrderService<S> {
    /// Creates the service.
    #[must_use]
    pub const fn new(env: TicketingEnvironment<S>) -> Self {
        Self { env }
    }

    /// Creates a `PENDING` order.
    ///
    /// Locks every selected product and the promo code, prices the order,
    /// consumes one promo use and writes the order, its items and one unissued
    /// ticket per purchased ticket unit.
    ///
    /// # Errors
    ///
    /// - [`TicketingError::InvalidProduct`] for a bad user, event, payment
    ///   method, product or an empty ticket selection
    /// - [`TicketingError::PromoInvalid`] if the promo code does not apply
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<OrderDetail> {
        if !request.user_id.is_valid() || !request.event_id.is_valid() {
            return Err(TicketingError::invalid_product("user and event are required"));
        }
        let payment_method = PaymentMethod::parse(&request.payment_method).ok_or_else(|| {
            TicketingError::invalid_product(format!(
                "unsupported payment method {:?}",
                request.payment_method
            ))
        })?;

        let cap = self.env.policy.max_quantity_per_product;
        let tickets = merge_selections(&request.ticket_items, cap);
        if tickets.is_empty() {
            return Err(TicketingError::invalid_product("at least one ticket is required"));
        }
        let transfers = merge_selections(&request.transfer_items, cap);
        let promo_code = request
            .promo_code
            .as_deref()
            .map(normalize_token)
            .filter(|code| !code.is_empty());

        let mut tx = self.env.store.begin().await?;
        let outcome = self
            .create_in(&mut tx, &request, payment_method, &tickets, &transfers, promo_code.as_deref())
            .await;
        let detail = settle(tx, outcome).await?;

        tracing::info!(
            order_id = %detail.order.id,
            event_id = %detail.order.event_id,
            user_id = %detail.order.user_id,
            total_cents = detail.order.total_cents,
            tickets = detail.tickets.len(),
            "order created"
        );
        metrics::counter!("boxoffice.orders.created").increment(1);
        Ok(detail)
    }

    async fn create_in(
        &self,
        tx: &mut S::Tx,
        request: &CreateOrderRequest,
        payment_method: PaymentMethod,
        tickets: &[(ProductId, u32)],
        transfers: &[(ProductId, u32)],
        promo_code: Option<&str>,
    ) -> Result<OrderDetail> {
        let now = self.env.clock.now();
        let event_id = request.event_id;
        if tx.event_title(event_id).await?.is_none() {
            return Err(TicketingError::invalid_product(format!("event {event_id} not found")));
        }

        let order_id = OrderId::new();
        let priced = self
            .price_selections(tx, order_id, request.user_id, event_id, tickets, transfers)
            .await?;
        if priced.subtotal_cents <= 0 {
            return Err(TicketingError::invalid_product("order subtotal must be positive"));
        }

        let (promo_code_id, discount_cents) = match promo_code {
            Some(code) => self.apply_promo(tx, code, event_id, priced.subtotal_cents).await?,
            None => (None, 0),
        };

        tx.insert_order(&NewOrder {
            id: order_id,
            user_id: request.user_id,
            event_id,
            payment_method,
            payment_reference: request
                .payment_reference
                .as_deref()
                .map(str::trim)
                .filter(|reference| !reference.is_empty())
                .map(str::to_string),
            payment_notes: Some(MANUAL_PAYMENT_NOTE.to_string()),
            promo_code_id,
            subtotal_cents: priced.subtotal_cents,
            discount_cents,
            total_cents: (priced.subtotal_cents - discount_cents).max(0),
            currency: self.env.policy.currency.clone(),
            created_at: now,
        })
        .await?;
        for item in &priced.items {
            tx.insert_order_item(item).await?;
        }
        for ticket in &priced.tickets {
            tx.insert_ticket(ticket).await?;
        }

        tx.order_detail(order_id, false)
            .await?
            .ok_or(TicketingError::OrderNotFound(order_id))
    }

    async fn price_selections(
        &self,
        tx: &mut S::Tx,
        order_id: OrderId,
        user_id: UserId,
        event_id: EventId,
        tickets: &[(ProductId, u32)],
        transfers: &[(ProductId, u32)],
    ) -> Result<PricedOrder> {
        let now = self.env.clock.now();
        let mut priced = PricedOrder {
            items: Vec::with_capacity(tickets.len() + transfers.len()),
            tickets: Vec::new(),
            subtotal_cents: 0,
        };

        for &(product_id, quantity) in tickets {
            let product = tx
                .lock_ticket_product(product_id)
                .await?
                .filter(|p| p.event_id == event_id && p.is_active)
                .ok_or_else(|| {
                    TicketingError::invalid_product(format!("ticket product {product_id} is not on sale"))
                })?;
            let group_size = product.ticket_type.group_size();
            let line_total_cents = line_total(product.price_cents, quantity)?;
            priced.subtotal_cents = add_line(priced.subtotal_cents, line_total_cents)?;

            let mut meta = Meta::new();
            meta.insert("ticketType".to_string(), json!(product.ticket_type.as_str()));
            meta.insert("groupSize".to_string(), json!(group_size));
            priced.items.push(NewOrderItem {
                order_id,
                item_type: ItemType::Ticket,
                product_id,
                product_ref: product.ticket_type.as_str().to_string(),
                quantity,
                unit_price_cents: product.price_cents,
                line_total_cents,
                meta,
                created_at: now,
            });
            priced.tickets.extend((0..quantity).map(|_| NewTicket {
                id: TicketId::new(),
                order_id,
                user_id,
                event_id,
                ticket_type: product.ticket_type,
                quantity: group_size,
                created_at: now,
            }));
        }

        for &(product_id, quantity) in transfers {
            let product = tx
                .lock_transfer_product(product_id)
                .await?
                .filter(|p| p.event_id == event_id && p.is_active)
                .ok_or_else(|| {
                    TicketingError::invalid_product(format!("transfer product {product_id} is not on sale"))
                })?;
            let line_total_cents = line_total(product.price_cents, quantity)?;
            priced.subtotal_cents = add_line(priced.subtotal_cents, line_total_cents)?;

            let mut meta = Meta::new();
            meta.insert("direction".to_string(), json!(product.direction.as_str()));
            meta.insert("info".to_string(), serde_json::Value::Object(product.info.clone()));
            priced.items.push(NewOrderItem {
                order_id,
                item_type: ItemType::Transfer,
                product_id,
                product_ref: product.direction.as_str().to_string(),
                quantity,
                unit_price_cents: product.price_cents,
                line_total_cents,
                meta,
                created_at: now,
            });
        }

        Ok(priced)
    }

    async fn apply_promo(
        &self,
        tx: &mut S::Tx,
        code: &str,
        event_id: EventId,
        subtotal_cents: i64,
    ) -> Result<(Option<PromoCodeId>, i64)> {
        let promo = tx
            .lock_promo_by_code(code)
            .await?
            .ok_or(TicketingError::PromoInvalid(PromoFailure::NotFound))?;
        let context = PromoContext {
            now: self.env.clock.now(),
            event_id,
            subtotal_cents,
        };
        let discount_cents = validate_promo(&PromoRule::from(&promo), &context)
            .into_result()
            .map_err(|reason| TicketingError::PromoInvalid(PromoFailure::Rejected(reason)))?;
        if !tx.consume_promo(promo.id).await? {
            return Err(TicketingError::PromoInvalid(PromoFailure::Rejected(
                PromoRejection::UsageLimitReached,
            )));
        }
        Ok((Some(promo.id), discount_cents))
    }

    /// Confirms payment: reserves inventory, flips the order to `PAID` and
    /// issues a signed token for every ticket.
    ///
    /// # Errors
    ///
    /// - [`TicketingError::OrderNotFound`] if the order does not exist
    /// - [`TicketingError::OrderStateNotAllowed`] unless the order is `PENDING`
    /// - [`TicketingError::InventoryLimitReached`] if any product would oversell;
    ///   nothing is reserved in that case
    pub async fn confirm_order(&self, order_id: OrderId, admin_id: AdminId) -> Result<ConfirmedOrder> {
        let mut tx = self.env.store.begin().await?;
        let outcome = self.confirm_in(&mut tx, order_id, admin_id).await;
        let confirmed = match settle(tx, outcome).await {
            Ok(confirmed) => confirmed,
            Err(error) => {
                if let TicketingError::InventoryLimitReached { product_id } = &error {
                    tracing::warn!(order_id = %order_id, product_id = %product_id, "inventory exhausted at confirmation");
                    metrics::counter!("boxoffice.inventory.exhausted").increment(1);
                }
                return Err(error);
            }
        };

        let issued = confirmed.detail.tickets.len();
        tracing::info!(order_id = %order_id, admin_id = %admin_id, tickets = issued, "order confirmed");
        metrics::counter!("boxoffice.orders.confirmed").increment(1);
        metrics::counter!("boxoffice.tickets.issued").increment(u64::try_from(issued).unwrap_or(u64::MAX));
        Ok(confirmed)
    }

    async fn confirm_in(
        &self,
        tx: &mut S::Tx,
        order_id: OrderId,
        admin_id: AdminId,
    ) -> Result<ConfirmedOrder> {
        let now = self.env.clock.now();
        let order = tx
            .lock_order(order_id)
            .await?
            .ok_or(TicketingError::OrderNotFound(order_id))?;
        if order.status != OrderStatus::Pending {
            return Err(TicketingError::OrderStateNotAllowed { status: order.status });
        }

        let items = tx.lock_order_items(order_id).await?;
        for item in reservation_order(items) {
            if !tx
                .reserve_inventory(item.item_type, item.product_id, item.quantity)
                .await?
            {
                return Err(TicketingError::InventoryLimitReached {
                    product_id: item.product_id,
                });
            }
        }

        let transition = OrderTransition::Confirm { by: admin_id, at: now };
        if !tx.transition_order(order_id, &transition).await? {
            return Err(TicketingError::OrderStateNotAllowed { status: order.status });
        }

        for ticket in tx.lock_order_tickets(order_id).await? {
            let issued = self.issue_token(&ticket, now)?;
            tx.issue_ticket_qr(ticket.id, &issued).await?;
        }

        let purchaser = tx.purchaser(order.user_id).await?;
        let detail = tx
            .order_detail(order_id, false)
            .await?
            .ok_or(TicketingError::OrderNotFound(order_id))?;
        Ok(ConfirmedOrder { detail, purchaser })
    }

    fn issue_token(&self, ticket: &Ticket, now: chrono::DateTime<chrono::Utc>) -> Result<IssuedQr> {
        let payload = QrPayload::for_ticket(ticket, new_nonce(self.env.policy.nonce_bytes), now);
        let token = qr::sign(&self.env.signing_secret, &payload)?;
        Ok(IssuedQr {
            payload_hash: hash_token(&token),
            payload: token,
            issued_at: now,
        })
    }

    /// Confirms an order, then hands its tickets to a delivery channel.
    ///
    /// Delivery happens after the confirmation has committed; a delivery
    /// failure is logged and reported, never rolled back.
    ///
    /// # Errors
    ///
    /// Same as [`OrderService::confirm_order`].
    pub async fn confirm_and_deliver(
        &self,
        order_id: OrderId,
        admin_id: AdminId,
        delivery: &dyn TicketDelivery,
    ) -> Result<DeliveredOrder> {
        let confirmed = self.confirm_order(order_id, admin_id).await?;
        let outcome = match &confirmed.purchaser {
            None => DeliveryOutcome::NoRecipient,
            Some(purchaser) => match delivery.deliver(purchaser, &confirmed.detail).await {
                Ok(()) => DeliveryOutcome::Delivered,
                Err(error) => {
                    tracing::warn!(order_id = %order_id, error = %error, "ticket delivery failed");
                    metrics::counter!("boxoffice.delivery.failed").increment(1);
                    DeliveryOutcome::Failed(error.0)
                }
            },
        };
        Ok(DeliveredOrder {
            confirmed,
            delivery: outcome,
        })
    }

    /// Cancels a `PENDING` or `PAID` order.
    ///
    /// Returns the promo use if one was consumed and, for a `PAID` order, the
    /// reserved inventory.
    ///
    /// # Errors
    ///
    /// - [`TicketingError::OrderNotFound`] if the order does not exist
    /// - [`TicketingError::OrderStateNotAllowed`] if it is `CANCELED` or `REDEEMED`
    pub async fn cancel_order(
        &self,
        order_id: OrderId,
        admin_id: AdminId,
        reason: Option<String>,
    ) -> Result<OrderDetail> {
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        let mut tx = self.env.store.begin().await?;
        let outcome = self.cancel_in(&mut tx, order_id, admin_id, reason).await;
        let detail = settle(tx, outcome).await?;

        tracing::info!(order_id = %order_id, admin_id = %admin_id, "order canceled");
        metrics::counter!("boxoffice.orders.canceled").increment(1);
        Ok(detail)
    }

    async fn cancel_in(
        &self,
        tx: &mut S::Tx,
        order_id: OrderId,
        admin_id: AdminId,
        reason: Option<String>,
    ) -> Result<OrderDetail> {
        let order = tx
            .lock_order(order_id)
            .await?
            .ok_or(TicketingError::OrderNotFound(order_id))?;
        if order.status.is_terminal() {
            return Err(TicketingError::OrderStateNotAllowed { status: order.status });
        }

        if order.status == OrderStatus::Paid {
            let items = tx.lock_order_items(order_id).await?;
            for item in reservation_order(items) {
                tx.release_inventory(item.item_type, item.product_id, item.quantity)
                    .await?;
            }
        }
        if let Some(promo_code_id) = order.promo_code_id {
            tx.release_promo(promo_code_id).await?;
        }

        let transition = OrderTransition::Cancel {
            by: admin_id,
            at: self.env.clock.now(),
            reason,
        };
        if !tx.transition_order(order_id, &transition).await? {
            return Err(TicketingError::OrderStateNotAllowed { status: order.status });
        }

        tx.order_detail(order_id, false)
            .await?
            .ok_or(TicketingError::OrderNotFound(order_id))
    }

    /// Checks a promo code against a prospective order without consuming it.
    ///
    /// # Errors
    ///
    /// Returns a store error if the lookup fails. Rejections are reported in
    /// the returned [`PromoCheck`].
    pub async fn validate_promo_code(
        &self,
        event_id: EventId,
        code: &str,
        subtotal_cents: i64,
    ) -> Result<PromoCheck> {
        let code = normalize_token(code);
        if code.is_empty() || subtotal_cents <= 0 {
            return Ok(PromoCheck::failed(code, subtotal_cents, PromoFailure::InvalidInput));
        }
        let Some(promo) = self.env.store.find_promo_by_code(&code).await? else {
            return Ok(PromoCheck::failed(code, subtotal_cents, PromoFailure::NotFound));
        };

        let context = PromoContext {
            now: self.env.clock.now(),
            event_id,
            subtotal_cents,
        };
        let verdict = validate_promo(&PromoRule::from(&promo), &context);
        Ok(PromoCheck {
            valid: verdict.valid,
            code: promo.code,
            discount_type: Some(promo.discount_type),
            value: promo.value,
            discount_cents: verdict.discount_cents,
            total_cents: verdict.total_cents,
            reason: verdict.reason.map(PromoFailure::Rejected),
        })
    }

    /// Reads an order with items and tickets.
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::OrderNotFound`] if the order does not exist.
    pub async fn order_detail(&self, order_id: OrderId, include_purchaser: bool) -> Result<OrderDetail> {
        self.env
            .store
            .order_detail(order_id, include_purchaser)
            .await?
            .ok_or(TicketingError::OrderNotFound(order_id))
    }

    /// Lists orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns a store error on failure.
    pub async fn list_orders(&self, query: OrderQuery) -> Result<Page<OrderSummary>> {
        Ok(self.env.store.list_orders(&query.normalized()).await?)
    }

    /// Lists a user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns a store error on failure.
    pub async fn list_user_orders(
        &self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Page<OrderSummary>> {
        if !user_id.is_valid() {
            return Ok(Page {
                items: Vec::new(),
                total: 0,
            });
        }
        Ok(self
            .env
            .store
            .list_user_orders(user_id, normalize_limit(limit), offset)
            .await?)
    }

    /// Lists a user's tickets with their order status, newest first.
    ///
    /// # Errors
    ///
    /// Returns a store error on failure.
    pub async fn list_user_tickets(
        &self,
        user_id: UserId,
        event_id: Option<EventId>,
    ) -> Result<Vec<Ticket>> {
        Ok(self.env.store.list_user_tickets(user_id, event_id).await?)
    }
}

fn add_line(subtotal_cents: i64, line_total_cents: i64) -> Result<i64> {
    subtotal_cents
        .checked_add(line_total_cents)
        .ok_or_else(|| TicketingError::invalid_product("order subtotal overflows"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pick(product_id: ProductId, quantity: u32) -> ProductSelection {
        ProductSelection { product_id, quantity }
    }

    #[test]
    fn duplicate_selections_are_merged_and_capped() {
        let a = ProductId::new();
        let b = ProductId::new();
        let merged = merge_selections(&[pick(a, 2), pick(b, 0), pick(a, 250), pick(b, 1)], 100);

        let as_map: BTreeMap<_, _> = merged.into_iter().collect();
        assert_eq!(as_map.get(&a), Some(&102));
        assert_eq!(as_map.get(&b), Some(&1));
    }

    #[test]
    fn merged_selections_come_out_in_product_order() {
        let ids: Vec<ProductId> = (0..5).map(|_| ProductId::new()).collect();
        let selections: Vec<_> = ids.iter().rev().map(|id| pick(*id, 1)).collect();
        let merged = merge_selections(&selections, 100);

        let mut sorted = ids;
        sorted.sort();
        assert_eq!(merged.into_iter().map(|(id, _)| id).collect::<Vec<_>>(), sorted);
    }

    fn item(item_type: ItemType, product_id: ProductId) -> OrderItem {
        OrderItem {
            id: 0,
            order_id: OrderId::new(),
            item_type,
            product_id,
            product_ref: String::new(),
            quantity: 1,
            unit_price_cents: 0,
            line_total_cents: 0,
            meta: Meta::default(),
            created_at: chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
        }
    }

    #[test]
    fn reservations_take_ticket_products_before_transfers() {
        let mut ids: Vec<ProductId> = (0..4).map(|_| ProductId::new()).collect();
        ids.sort();
        // Transfers hold the lowest ids so that id order alone would interleave.
        let items = vec![
            item(ItemType::Ticket, ids[3]),
            item(ItemType::Transfer, ids[0]),
            item(ItemType::Ticket, ids[2]),
            item(ItemType::Transfer, ids[1]),
        ];

        let ordered: Vec<_> = reservation_order(items)
            .into_iter()
            .map(|item| (item.item_type, item.product_id))
            .collect();
        assert_eq!(
            ordered,
            vec![
                (ItemType::Ticket, ids[2]),
                (ItemType::Ticket, ids[3]),
                (ItemType::Transfer, ids[0]),
                (ItemType::Transfer, ids[1]),
            ]
        );
    }

    #[test]
    fn line_total_rejects_overflow() {
        assert_eq!(line_total(2_500, 3).ok(), Some(7_500));
        assert!(line_total(i64::MAX, 2).is_err());
    }
}
