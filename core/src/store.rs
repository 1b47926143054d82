//! Persistence contract.
//!
//! A [`TicketingStore`] hands out transactions ([`StoreTx`]). Every mutating
//! service operation is a unit of work over exactly one `StoreTx`: it locks the
//! rows it will change, writes, and then commits or rolls back as a whole.
//!
//! # Lock order
//!
//! Exclusive row locks are taken in the order
//! products → promo → order → order items → tickets. Implementations record
//! each lock in a [`LockLedger`], which refuses an out-of-order lock with
//! [`StoreError::LockOrder`] instead of letting two transactions deadlock.
//!
//! Counter updates (`sold_count`, `used_count`, ticket `redeemed_at`, order
//! status) are single conditional writes whose affected-row count is reported
//! back as a `bool`. They are not row locks taken for reading and are not
//! tracked by the ledger.

use crate::catalog::{
    ProductFilter, PromoCodeDraft, PromoCodePatch, TicketProductDraft, TicketProductPatch,
    TransferProductDraft, TransferProductPatch,
};
use crate::stats::{CheckInRow, StatsRow};
use crate::types::{
    AdminId, EventId, ItemType, Meta, Order, OrderDetail, OrderId, OrderItem, OrderStatus,
    OrderSummary, Page, PaymentMethod, ProductId, PromoCode, PromoCodeId, Purchaser, Ticket,
    TicketId, TicketProduct, TicketType, TransferProduct, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Storage failures. Always surfaced as internal errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Connectivity, constraint or query failure.
    #[error("database error: {0}")]
    Database(String),

    /// A stored row could not be mapped onto a domain type.
    #[error("failed to decode {entity}: {message}")]
    Decode {
        /// Row kind.
        entity: &'static str,
        /// What was wrong.
        message: String,
    },

    /// A lock was requested after a lock that must come later.
    #[error("lock order violation: {requested:?} requested while holding {held:?}")]
    LockOrder {
        /// Latest stage already locked.
        held: LockStage,
        /// Stage that was requested.
        requested: LockStage,
    },
}

impl StoreError {
    /// Builds a [`StoreError::Decode`].
    pub fn decode(entity: &'static str, message: impl ToString) -> Self {
        Self::Decode {
            entity,
            message: message.to_string(),
        }
    }
}

/// Row kinds in the order they must be locked within one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockStage {
    /// Ticket and transfer product rows.
    Product,
    /// Promo code row.
    Promo,
    /// Order row.
    Order,
    /// Order item rows.
    OrderItem,
    /// Ticket rows.
    Ticket,
}

/// Tracks the latest lock stage a transaction has entered.
///
/// Re-entering the current stage is fine (several products, several items);
/// going back to an earlier stage is not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockLedger {
    held: Option<LockStage>,
}

impl LockLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub const fn new() -> Self {
        Self { held: None }
    }

    /// Records a lock at `stage`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockOrder`] if a later stage is already held.
    pub fn acquire(&mut self, stage: LockStage) -> Result<(), StoreError> {
        match self.held {
            Some(held) if stage < held => Err(StoreError::LockOrder {
                held,
                requested: stage,
            }),
            _ => {
                self.held = Some(stage);
                Ok(())
            }
        }
    }

    /// Latest stage entered, if any.
    #[must_use]
    pub const fn held(&self) -> Option<LockStage> {
        self.held
    }
}

/// A new order row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    /// Pre-generated identifier.
    pub id: OrderId,
    /// Purchaser.
    pub user_id: UserId,
    /// Event.
    pub event_id: EventId,
    /// Payment method.
    pub payment_method: PaymentMethod,
    /// Purchaser payment reference.
    pub payment_reference: Option<String>,
    /// Operator note.
    pub payment_notes: Option<String>,
    /// Consumed promo code.
    pub promo_code_id: Option<PromoCodeId>,
    /// Sum of line totals.
    pub subtotal_cents: i64,
    /// Promo discount.
    pub discount_cents: i64,
    /// Amount due.
    pub total_cents: i64,
    /// Currency code.
    pub currency: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A new order line.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderItem {
    /// Owning order.
    pub order_id: OrderId,
    /// Ticket or transfer.
    pub item_type: ItemType,
    /// Product.
    pub product_id: ProductId,
    /// Ticket type or direction snapshot.
    pub product_ref: String,
    /// Units.
    pub quantity: u32,
    /// Unit price snapshot.
    pub unit_price_cents: i64,
    /// `unit_price_cents * quantity`.
    pub line_total_cents: i64,
    /// Snapshot details.
    pub meta: Meta,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A new, not yet issued ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTicket {
    /// Pre-generated identifier.
    pub id: TicketId,
    /// Owning order.
    pub order_id: OrderId,
    /// Holder.
    pub user_id: UserId,
    /// Event.
    pub event_id: EventId,
    /// Tier.
    pub ticket_type: TicketType,
    /// Group size of the tier.
    pub quantity: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A signed token ready to be attached to a ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedQr {
    /// Full token.
    pub payload: String,
    /// Hex SHA-256 of the token.
    pub payload_hash: String,
    /// Issue time.
    pub issued_at: DateTime<Utc>,
}

/// Guarded order status change.
///
/// The store applies the change only when the current status is one of
/// [`OrderTransition::allowed_from`] and reports whether it did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderTransition {
    /// `PENDING -> PAID`.
    Confirm {
        /// Operator.
        by: AdminId,
        /// Time.
        at: DateTime<Utc>,
    },
    /// `PENDING | PAID -> CANCELED`.
    Cancel {
        /// Operator.
        by: AdminId,
        /// Time.
        at: DateTime<Utc>,
        /// Free-text reason.
        reason: Option<String>,
    },
    /// `PAID | REDEEMED -> REDEEMED`. Keeps the first `redeemed_at`.
    Redeem {
        /// Time.
        at: DateTime<Utc>,
    },
}

impl OrderTransition {
    /// Status after the transition.
    #[must_use]
    pub const fn target(&self) -> OrderStatus {
        match self {
            Self::Confirm { .. } => OrderStatus::Paid,
            Self::Cancel { .. } => OrderStatus::Canceled,
            Self::Redeem { .. } => OrderStatus::Redeemed,
        }
    }

    /// Statuses the transition may start from.
    #[must_use]
    pub const fn allowed_from(&self) -> &'static [OrderStatus] {
        match self {
            Self::Confirm { .. } => &[OrderStatus::Pending],
            Self::Cancel { .. } => &[OrderStatus::Pending, OrderStatus::Paid],
            Self::Redeem { .. } => &[OrderStatus::Paid, OrderStatus::Redeemed],
        }
    }

    /// Whether the transition may start from `status`.
    #[must_use]
    pub fn applies_to(&self, status: OrderStatus) -> bool {
        self.allowed_from().contains(&status)
    }
}

/// A ticket locked together with its order's status.
#[derive(Debug, Clone, PartialEq)]
pub struct LockedTicket {
    /// The ticket.
    pub ticket: Ticket,
    /// Owning order's status at lock time.
    pub order_status: OrderStatus,
}

/// Filters for order listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderQuery {
    /// Restrict to one event.
    pub event_id: Option<EventId>,
    /// Restrict to one status.
    pub status: Option<OrderStatus>,
    /// Created at or after.
    pub from: Option<DateTime<Utc>>,
    /// Created at or before.
    pub to: Option<DateTime<Utc>>,
    /// Page size.
    pub limit: u32,
    /// Rows to skip.
    pub offset: u32,
}

impl OrderQuery {
    /// Default page size.
    pub const DEFAULT_LIMIT: u32 = 50;
    /// Largest page size.
    pub const MAX_LIMIT: u32 = 200;

    /// Returns the query with `limit` defaulted and capped.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.limit = normalize_limit(self.limit);
        self
    }

    /// Whether an order passes the filters (pagination aside).
    #[must_use]
    pub fn matches(&self, order: &Order) -> bool {
        self.event_id.is_none_or(|id| order.event_id == id)
            && self.status.is_none_or(|status| order.status == status)
            && self.from.is_none_or(|from| order.created_at >= from)
            && self.to.is_none_or(|to| order.created_at <= to)
    }
}

/// Applies the default and cap for page sizes.
#[must_use]
pub const fn normalize_limit(limit: u32) -> u32 {
    if limit == 0 {
        OrderQuery::DEFAULT_LIMIT
    } else if limit > OrderQuery::MAX_LIMIT {
        OrderQuery::MAX_LIMIT
    } else {
        limit
    }
}

/// One open transaction.
///
/// Dropping a `StoreTx` without calling [`StoreTx::commit`] discards its writes.
#[async_trait]
pub trait StoreTx: Send {
    /// Makes every write visible.
    async fn commit(self) -> Result<(), StoreError>;

    /// Discards every write.
    async fn rollback(self) -> Result<(), StoreError>;

    /// Title of an event, or `None` if the event does not exist.
    async fn event_title(&mut self, event_id: EventId) -> Result<Option<String>, StoreError>;

    /// Locks a ticket product. Stage: [`LockStage::Product`].
    async fn lock_ticket_product(&mut self, id: ProductId) -> Result<Option<TicketProduct>, StoreError>;

    /// Locks a transfer product. Stage: [`LockStage::Product`].
    async fn lock_transfer_product(
        &mut self,
        id: ProductId,
    ) -> Result<Option<TransferProduct>, StoreError>;

    /// Locks a promo code by case-insensitive code. Stage: [`LockStage::Promo`].
    async fn lock_promo_by_code(&mut self, code: &str) -> Result<Option<PromoCode>, StoreError>;

    /// `used_count += 1` if still under the limit. Returns whether it applied.
    async fn consume_promo(&mut self, id: PromoCodeId) -> Result<bool, StoreError>;

    /// `used_count = max(0, used_count - 1)`.
    async fn release_promo(&mut self, id: PromoCodeId) -> Result<(), StoreError>;

    /// Inserts an order row.
    async fn insert_order(&mut self, order: &NewOrder) -> Result<(), StoreError>;

    /// Inserts an order line.
    async fn insert_order_item(&mut self, item: &NewOrderItem) -> Result<(), StoreError>;

    /// Inserts an unissued ticket.
    async fn insert_ticket(&mut self, ticket: &NewTicket) -> Result<(), StoreError>;

    /// Locks an order. Stage: [`LockStage::Order`].
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Locks an order's items in id order. Stage: [`LockStage::OrderItem`].
    async fn lock_order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>, StoreError>;

    /// `sold_count += quantity` if the result stays within the limit.
    /// Returns whether it applied.
    async fn reserve_inventory(
        &mut self,
        item_type: ItemType,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<bool, StoreError>;

    /// `sold_count = max(0, sold_count - quantity)`.
    async fn release_inventory(
        &mut self,
        item_type: ItemType,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<(), StoreError>;

    /// Applies a guarded status change. Returns whether it applied.
    async fn transition_order(
        &mut self,
        id: OrderId,
        transition: &OrderTransition,
    ) -> Result<bool, StoreError>;

    /// Locks an order's tickets in creation order. Stage: [`LockStage::Ticket`].
    async fn lock_order_tickets(&mut self, order_id: OrderId) -> Result<Vec<Ticket>, StoreError>;

    /// Attaches a signed token to a ticket.
    async fn issue_ticket_qr(&mut self, ticket_id: TicketId, qr: &IssuedQr) -> Result<(), StoreError>;

    /// Locks a ticket's order, then the ticket.
    ///
    /// Stages: [`LockStage::Order`] then [`LockStage::Ticket`]. The returned
    /// order status cannot change until the transaction ends.
    async fn lock_ticket(&mut self, id: TicketId) -> Result<Option<LockedTicket>, StoreError>;

    /// Sets `redeemed_at`/`redeemed_by` only if unset. Returns whether it applied.
    async fn mark_ticket_redeemed(
        &mut self,
        id: TicketId,
        by: AdminId,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Tickets of an order not yet redeemed.
    async fn count_unredeemed_tickets(&mut self, order_id: OrderId) -> Result<u64, StoreError>;

    /// Reads an order with items and tickets, as seen by this transaction.
    async fn order_detail(
        &mut self,
        order_id: OrderId,
        include_purchaser: bool,
    ) -> Result<Option<OrderDetail>, StoreError>;

    /// Delivery identity of a user.
    async fn purchaser(&mut self, user_id: UserId) -> Result<Option<Purchaser>, StoreError>;
}

/// Transactional store for orders, tickets and the read side.
#[async_trait]
pub trait TicketingStore: Send + Sync + 'static {
    /// Transaction handle.
    type Tx: StoreTx;

    /// Opens a transaction.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    /// Looks up a promo code by case-insensitive code, without locking.
    async fn find_promo_by_code(&self, code: &str) -> Result<Option<PromoCode>, StoreError>;

    /// Reads an order with items, tickets and optionally the purchaser.
    async fn order_detail(
        &self,
        order_id: OrderId,
        include_purchaser: bool,
    ) -> Result<Option<OrderDetail>, StoreError>;

    /// Orders matching a query, newest first.
    async fn list_orders(&self, query: &OrderQuery) -> Result<Page<OrderSummary>, StoreError>;

    /// A user's orders, newest first.
    async fn list_user_orders(
        &self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Page<OrderSummary>, StoreError>;

    /// A user's tickets with their order status, newest first.
    async fn list_user_tickets(
        &self,
        user_id: UserId,
        event_id: Option<EventId>,
    ) -> Result<Vec<Ticket>, StoreError>;

    /// One row per order × item (orders without items yield one row).
    async fn stats_rows(&self, event_id: Option<EventId>) -> Result<Vec<StatsRow>, StoreError>;

    /// One row per redeemed ticket.
    async fn check_in_rows(&self, event_id: Option<EventId>) -> Result<Vec<CheckInRow>, StoreError>;
}

/// Catalog persistence. Plain single-statement CRUD.
#[async_trait]
pub trait CatalogStore: Send + Sync + 'static {
    /// Ticket products, newest first.
    async fn list_ticket_products(&self, filter: &ProductFilter)
    -> Result<Vec<TicketProduct>, StoreError>;

    /// Inserts a ticket product.
    async fn create_ticket_product(
        &self,
        draft: &TicketProductDraft,
    ) -> Result<TicketProduct, StoreError>;

    /// Patches a ticket product. `None` if it does not exist.
    async fn update_ticket_product(
        &self,
        id: ProductId,
        patch: &TicketProductPatch,
    ) -> Result<Option<TicketProduct>, StoreError>;

    /// Deletes a ticket product. `false` if it did not exist.
    async fn delete_ticket_product(&self, id: ProductId) -> Result<bool, StoreError>;

    /// Transfer products, newest first.
    async fn list_transfer_products(
        &self,
        filter: &ProductFilter,
    ) -> Result<Vec<TransferProduct>, StoreError>;

    /// Inserts a transfer product.
    async fn create_transfer_product(
        &self,
        draft: &TransferProductDraft,
    ) -> Result<TransferProduct, StoreError>;

    /// Patches a transfer product. `None` if it does not exist.
    async fn update_transfer_product(
        &self,
        id: ProductId,
        patch: &TransferProductPatch,
    ) -> Result<Option<TransferProduct>, StoreError>;

    /// Deletes a transfer product. `false` if it did not exist.
    async fn delete_transfer_product(&self, id: ProductId) -> Result<bool, StoreError>;

    /// Promo codes, newest first. An event filter also returns global codes.
    async fn list_promo_codes(&self, filter: &ProductFilter) -> Result<Vec<PromoCode>, StoreError>;

    /// Inserts a promo code.
    async fn create_promo_code(&self, draft: &PromoCodeDraft) -> Result<PromoCode, StoreError>;

    /// Patches a promo code. `None` if it does not exist.
    async fn update_promo_code(
        &self,
        id: PromoCodeId,
        patch: &PromoCodePatch,
    ) -> Result<Option<PromoCode>, StoreError>;

    /// Deletes a promo code. `false` if it did not exist.
    async fn delete_promo_code(&self, id: PromoCodeId) -> Result<bool, StoreError>;
}

/// Finishes a unit of work: commits on `Ok`, rolls back on `Err`.
///
/// A failed rollback is logged and the original error is returned.
///
/// # Errors
///
/// Returns the operation's error, or the commit error.
pub async fn settle<T, V, E>(tx: T, outcome: Result<V, E>) -> Result<V, E>
where
    T: StoreTx,
    E: From<StoreError>,
{
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback_error) = tx.rollback().await {
                tracing::error!(error = %rollback_error, "transaction rollback failed");
            }
            Err(error)
        }
    }
}
