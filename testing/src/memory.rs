//! In-memory implementation of the persistence contract.
//!
//! A transaction takes the store-wide lock for its whole lifetime and works on
//! a private copy of the tables, which replaces the shared tables on commit.
//! Transactions are therefore fully serialized: coarser than row locks, but
//! with the same observable outcome for the concurrency properties the core
//! relies on (one winner per guarded write, all-or-nothing commits).
//!
//! Because of that, a concurrency test passing against this store says
//! nothing about lock ordering or missing row locks. Those are only exercised
//! by the `PostgreSQL` integration tests.

use async_trait::async_trait;
use boxoffice_core::catalog::{
    ProductFilter, PromoCodeDraft, PromoCodePatch, TicketProductDraft, TicketProductPatch,
    TransferProductDraft, TransferProductPatch,
};
use boxoffice_core::environment::Clock;
use boxoffice_core::stats::{CheckInRow, StatsRow};
use boxoffice_core::store::{
    CatalogStore, IssuedQr, LockLedger, LockStage, LockedTicket, NewOrder, NewOrderItem, NewTicket,
    OrderQuery, OrderTransition, StoreError, StoreTx, TicketingStore,
};
use boxoffice_core::types::{
    AdminId, EventId, ItemType, Order, OrderDetail, OrderId, OrderItem, OrderStatus, OrderSummary,
    Page, ProductId, PromoCode, PromoCodeId, Purchaser, Ticket, TicketId, TicketProduct,
    TransferProduct, UserId,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
struct Tables {
    events: BTreeMap<EventId, String>,
    users: BTreeMap<UserId, Purchaser>,
    ticket_products: BTreeMap<ProductId, TicketProduct>,
    transfer_products: BTreeMap<ProductId, TransferProduct>,
    promo_codes: BTreeMap<PromoCodeId, PromoCode>,
    orders: BTreeMap<OrderId, Order>,
    order_items: Vec<OrderItem>,
    tickets: Vec<Ticket>,
    next_item_id: i64,
}

impl Tables {
    fn promo_by_code(&self, code: &str) -> Option<&PromoCode> {
        let code = code.trim();
        self.promo_codes
            .values()
            .find(|promo| promo.code.eq_ignore_ascii_case(code))
    }

    fn order_with_title(&self, order: &Order) -> Order {
        let mut order = order.clone();
        order.event_title = self.events.get(&order.event_id).cloned().unwrap_or_default();
        order
    }

    fn detail(&self, order_id: OrderId, include_purchaser: bool) -> Option<OrderDetail> {
        let order = self.order_with_title(self.orders.get(&order_id)?);
        let purchaser = if include_purchaser {
            self.users.get(&order.user_id).cloned()
        } else {
            None
        };
        Some(OrderDetail {
            purchaser,
            items: self
                .order_items
                .iter()
                .filter(|item| item.order_id == order_id)
                .cloned()
                .collect(),
            tickets: self
                .tickets
                .iter()
                .filter(|ticket| ticket.order_id == order_id)
                .cloned()
                .collect(),
            order,
        })
    }

    fn summaries(&self, matches: impl Fn(&Order) -> bool, limit: u32, offset: u32) -> Page<OrderSummary> {
        let mut orders: Vec<&Order> = self.orders.values().filter(|order| matches(order)).collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total = orders.len() as u64;
        let items = orders
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|order| OrderSummary {
                order: self.order_with_title(order),
                purchaser: self.users.get(&order.user_id).cloned(),
            })
            .collect();
        Page { items, total }
    }
}

fn reserve(sold_count: &mut u32, limit: Option<u32>, quantity: u32) -> bool {
    match sold_count.checked_add(quantity) {
        Some(next) if limit.is_none_or(|limit| next <= limit) => {
            *sold_count = next;
            true
        }
        _ => false,
    }
}

fn newest_first<T>(items: &mut [T], created_at: impl Fn(&T) -> DateTime<Utc>) {
    items.sort_by_key(|item| std::cmp::Reverse(created_at(item)));
}

/// Transactional store backed by in-process maps.
#[derive(Clone)]
pub struct InMemoryTicketingStore {
    tables: Arc<Mutex<Tables>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryTicketingStore {
    /// Creates an empty store. `clock` stamps catalog rows.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            clock,
        }
    }

    /// Registers an event.
    pub async fn add_event(&self, event_id: EventId, title: impl Into<String>) {
        self.tables.lock().await.events.insert(event_id, title.into());
    }

    /// Registers a user.
    pub async fn add_user(&self, purchaser: Purchaser) {
        self.tables.lock().await.users.insert(purchaser.user_id, purchaser);
    }

    /// Current state of a ticket product.
    pub async fn ticket_product(&self, id: ProductId) -> Option<TicketProduct> {
        self.tables.lock().await.ticket_products.get(&id).cloned()
    }

    /// Current state of a transfer product.
    pub async fn transfer_product(&self, id: ProductId) -> Option<TransferProduct> {
        self.tables.lock().await.transfer_products.get(&id).cloned()
    }

    /// Current state of a promo code.
    pub async fn promo_code(&self, id: PromoCodeId) -> Option<PromoCode> {
        self.tables.lock().await.promo_codes.get(&id).cloned()
    }

    /// Current state of a ticket.
    pub async fn ticket(&self, id: TicketId) -> Option<Ticket> {
        self.tables
            .lock()
            .await
            .tickets
            .iter()
            .find(|ticket| ticket.id == id)
            .cloned()
    }

    /// Number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.tables.lock().await.orders.len()
    }
}

/// Transaction over an [`InMemoryTicketingStore`].
pub struct InMemoryTx {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    ledger: LockLedger,
}

impl InMemoryTx {
    fn ticket_mut(&mut self, id: TicketId) -> Option<&mut Ticket> {
        self.working.tickets.iter_mut().find(|ticket| ticket.id == id)
    }
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn commit(self) -> Result<(), StoreError> {
        let Self {
            mut guard, working, ..
        } = self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn event_title(&mut self, event_id: EventId) -> Result<Option<String>, StoreError> {
        Ok(self.working.events.get(&event_id).cloned())
    }

    async fn lock_ticket_product(&mut self, id: ProductId) -> Result<Option<TicketProduct>, StoreError> {
        self.ledger.acquire(LockStage::Product)?;
        Ok(self.working.ticket_products.get(&id).cloned())
    }

    async fn lock_transfer_product(
        &mut self,
        id: ProductId,
    ) -> Result<Option<TransferProduct>, StoreError> {
        self.ledger.acquire(LockStage::Product)?;
        Ok(self.working.transfer_products.get(&id).cloned())
    }

    async fn lock_promo_by_code(&mut self, code: &str) -> Result<Option<PromoCode>, StoreError> {
        self.ledger.acquire(LockStage::Promo)?;
        Ok(self.working.promo_by_code(code).cloned())
    }

    async fn consume_promo(&mut self, id: PromoCodeId) -> Result<bool, StoreError> {
        let Some(promo) = self.working.promo_codes.get_mut(&id) else {
            return Ok(false);
        };
        Ok(reserve(&mut promo.used_count, promo.usage_limit.filter(|l| *l > 0), 1))
    }

    async fn release_promo(&mut self, id: PromoCodeId) -> Result<(), StoreError> {
        if let Some(promo) = self.working.promo_codes.get_mut(&id) {
            promo.used_count = promo.used_count.saturating_sub(1);
        }
        Ok(())
    }

    async fn insert_order(&mut self, order: &NewOrder) -> Result<(), StoreError> {
        if self.working.orders.contains_key(&order.id) {
            return Err(StoreError::Database(format!("duplicate order id {}", order.id)));
        }
        self.working.orders.insert(
            order.id,
            Order {
                id: order.id,
                user_id: order.user_id,
                event_id: order.event_id,
                event_title: String::new(),
                status: OrderStatus::Pending,
                payment_method: order.payment_method,
                payment_reference: order.payment_reference.clone(),
                payment_notes: order.payment_notes.clone(),
                promo_code_id: order.promo_code_id,
                subtotal_cents: order.subtotal_cents,
                discount_cents: order.discount_cents,
                total_cents: order.total_cents,
                currency: order.currency.clone(),
                confirmed_at: None,
                confirmed_by: None,
                canceled_at: None,
                canceled_by: None,
                canceled_reason: None,
                redeemed_at: None,
                created_at: order.created_at,
                updated_at: order.created_at,
            },
        );
        Ok(())
    }

    async fn insert_order_item(&mut self, item: &NewOrderItem) -> Result<(), StoreError> {
        self.working.next_item_id += 1;
        self.working.order_items.push(OrderItem {
            id: self.working.next_item_id,
            order_id: item.order_id,
            item_type: item.item_type,
            product_id: item.product_id,
            product_ref: item.product_ref.clone(),
            quantity: item.quantity,
            unit_price_cents: item.unit_price_cents,
            line_total_cents: item.line_total_cents,
            meta: item.meta.clone(),
            created_at: item.created_at,
        });
        Ok(())
    }

    async fn insert_ticket(&mut self, ticket: &NewTicket) -> Result<(), StoreError> {
        self.working.tickets.push(Ticket {
            id: ticket.id,
            order_id: ticket.order_id,
            order_status: None,
            user_id: ticket.user_id,
            event_id: ticket.event_id,
            ticket_type: ticket.ticket_type,
            quantity: ticket.quantity,
            qr_payload: None,
            qr_payload_hash: None,
            qr_issued_at: None,
            redeemed_at: None,
            redeemed_by: None,
            created_at: ticket.created_at,
        });
        Ok(())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        self.ledger.acquire(LockStage::Order)?;
        Ok(self
            .working
            .orders
            .get(&id)
            .map(|order| self.working.order_with_title(order)))
    }

    async fn lock_order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>, StoreError> {
        self.ledger.acquire(LockStage::OrderItem)?;
        Ok(self
            .working
            .order_items
            .iter()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn reserve_inventory(
        &mut self,
        item_type: ItemType,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<bool, StoreError> {
        let reserved = match item_type {
            ItemType::Ticket => self
                .working
                .ticket_products
                .get_mut(&product_id)
                .is_some_and(|p| reserve(&mut p.sold_count, p.inventory_limit, quantity)),
            ItemType::Transfer => self
                .working
                .transfer_products
                .get_mut(&product_id)
                .is_some_and(|p| reserve(&mut p.sold_count, p.inventory_limit, quantity)),
        };
        Ok(reserved)
    }

    async fn release_inventory(
        &mut self,
        item_type: ItemType,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<(), StoreError> {
        match item_type {
            ItemType::Ticket => {
                if let Some(p) = self.working.ticket_products.get_mut(&product_id) {
                    p.sold_count = p.sold_count.saturating_sub(quantity);
                }
            }
            ItemType::Transfer => {
                if let Some(p) = self.working.transfer_products.get_mut(&product_id) {
                    p.sold_count = p.sold_count.saturating_sub(quantity);
                }
            }
        }
        Ok(())
    }

    async fn transition_order(
        &mut self,
        id: OrderId,
        transition: &OrderTransition,
    ) -> Result<bool, StoreError> {
        let Some(order) = self.working.orders.get_mut(&id) else {
            return Ok(false);
        };
        if !transition.applies_to(order.status) {
            return Ok(false);
        }
        order.status = transition.target();
        match transition {
            OrderTransition::Confirm { by, at } => {
                order.confirmed_at = Some(*at);
                order.confirmed_by = Some(*by);
                order.updated_at = *at;
            }
            OrderTransition::Cancel { by, at, reason } => {
                order.canceled_at = Some(*at);
                order.canceled_by = Some(*by);
                order.canceled_reason.clone_from(reason);
                order.updated_at = *at;
            }
            OrderTransition::Redeem { at } => {
                order.redeemed_at = order.redeemed_at.or(Some(*at));
                order.updated_at = *at;
            }
        }
        Ok(true)
    }

    async fn lock_order_tickets(&mut self, order_id: OrderId) -> Result<Vec<Ticket>, StoreError> {
        self.ledger.acquire(LockStage::Ticket)?;
        Ok(self
            .working
            .tickets
            .iter()
            .filter(|ticket| ticket.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn issue_ticket_qr(&mut self, ticket_id: TicketId, qr: &IssuedQr) -> Result<(), StoreError> {
        let ticket = self
            .ticket_mut(ticket_id)
            .ok_or_else(|| StoreError::Database(format!("ticket {ticket_id} vanished")))?;
        ticket.qr_payload = Some(qr.payload.clone());
        ticket.qr_payload_hash = Some(qr.payload_hash.clone());
        ticket.qr_issued_at = Some(qr.issued_at);
        Ok(())
    }

    async fn lock_ticket(&mut self, id: TicketId) -> Result<Option<LockedTicket>, StoreError> {
        self.ledger.acquire(LockStage::Order)?;
        self.ledger.acquire(LockStage::Ticket)?;
        let Some(ticket) = self.working.tickets.iter().find(|ticket| ticket.id == id) else {
            return Ok(None);
        };
        let order_status = self
            .working
            .orders
            .get(&ticket.order_id)
            .map(|order| order.status)
            .ok_or_else(|| StoreError::decode("ticket", format!("order {} missing", ticket.order_id)))?;
        Ok(Some(LockedTicket {
            ticket: ticket.clone(),
            order_status,
        }))
    }

    async fn mark_ticket_redeemed(
        &mut self,
        id: TicketId,
        by: AdminId,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        match self.ticket_mut(id) {
            Some(ticket) if ticket.redeemed_at.is_none() => {
                ticket.redeemed_at = Some(at);
                ticket.redeemed_by = Some(by);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn count_unredeemed_tickets(&mut self, order_id: OrderId) -> Result<u64, StoreError> {
        Ok(self
            .working
            .tickets
            .iter()
            .filter(|ticket| ticket.order_id == order_id && ticket.redeemed_at.is_none())
            .count() as u64)
    }

    async fn order_detail(
        &mut self,
        order_id: OrderId,
        include_purchaser: bool,
    ) -> Result<Option<OrderDetail>, StoreError> {
        Ok(self.working.detail(order_id, include_purchaser))
    }

    async fn purchaser(&mut self, user_id: UserId) -> Result<Option<Purchaser>, StoreError> {
        Ok(self.working.users.get(&user_id).cloned())
    }
}

#[async_trait]
impl TicketingStore for InMemoryTicketingStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx, StoreError> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryTx {
            guard,
            working,
            ledger: LockLedger::new(),
        })
    }

    async fn find_promo_by_code(&self, code: &str) -> Result<Option<PromoCode>, StoreError> {
        Ok(self.tables.lock().await.promo_by_code(code).cloned())
    }

    async fn order_detail(
        &self,
        order_id: OrderId,
        include_purchaser: bool,
    ) -> Result<Option<OrderDetail>, StoreError> {
        Ok(self.tables.lock().await.detail(order_id, include_purchaser))
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Page<OrderSummary>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.summaries(|order| query.matches(order), query.limit, query.offset))
    }

    async fn list_user_orders(
        &self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Page<OrderSummary>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.summaries(|order| order.user_id == user_id, limit, offset))
    }

    async fn list_user_tickets(
        &self,
        user_id: UserId,
        event_id: Option<EventId>,
    ) -> Result<Vec<Ticket>, StoreError> {
        let tables = self.tables.lock().await;
        let mut tickets: Vec<Ticket> = tables
            .tickets
            .iter()
            .rev()
            .filter(|t| t.user_id == user_id && event_id.is_none_or(|id| t.event_id == id))
            .map(|t| Ticket {
                order_status: tables.orders.get(&t.order_id).map(|order| order.status),
                ..t.clone()
            })
            .collect();
        newest_first(&mut tickets, |t| t.created_at);
        Ok(tickets)
    }

    async fn stats_rows(&self, event_id: Option<EventId>) -> Result<Vec<StatsRow>, StoreError> {
        let tables = self.tables.lock().await;
        let mut rows = Vec::new();
        for order in tables
            .orders
            .values()
            .filter(|order| event_id.is_none_or(|id| order.event_id == id))
        {
            let base = StatsRow {
                order_id: order.id,
                event_id: order.event_id,
                event_title: tables.events.get(&order.event_id).cloned().unwrap_or_default(),
                status: order.status,
                total_cents: order.total_cents,
                item_type: None,
                product_ref: String::new(),
                quantity: 0,
            };
            let items: Vec<&OrderItem> = tables
                .order_items
                .iter()
                .filter(|item| item.order_id == order.id)
                .collect();
            if items.is_empty() {
                rows.push(base);
                continue;
            }
            rows.extend(items.into_iter().map(|item| StatsRow {
                item_type: Some(item.item_type),
                product_ref: item.product_ref.clone(),
                quantity: i64::from(item.quantity),
                ..base.clone()
            }));
        }
        Ok(rows)
    }

    async fn check_in_rows(&self, event_id: Option<EventId>) -> Result<Vec<CheckInRow>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .tickets
            .iter()
            .filter(|t| t.redeemed_at.is_some() && event_id.is_none_or(|id| t.event_id == id))
            .map(|t| CheckInRow {
                event_id: t.event_id,
                quantity: i64::from(t.quantity),
            })
            .collect())
    }
}

#[async_trait]
impl CatalogStore for InMemoryTicketingStore {
    async fn list_ticket_products(
        &self,
        filter: &ProductFilter,
    ) -> Result<Vec<TicketProduct>, StoreError> {
        let tables = self.tables.lock().await;
        let mut products: Vec<TicketProduct> = tables
            .ticket_products
            .values()
            .filter(|p| filter.event_id.is_none_or(|id| p.event_id == id))
            .filter(|p| filter.active.is_none_or(|active| p.is_active == active))
            .cloned()
            .collect();
        newest_first(&mut products, |p| p.created_at);
        Ok(products)
    }

    async fn create_ticket_product(
        &self,
        draft: &TicketProductDraft,
    ) -> Result<TicketProduct, StoreError> {
        let now = self.clock.now();
        let product = TicketProduct {
            id: ProductId::new(),
            event_id: draft.event_id,
            name: draft.name.clone(),
            ticket_type: draft.ticket_type,
            price_cents: draft.price_cents,
            inventory_limit: draft.inventory_limit,
            sold_count: 0,
            is_active: draft.is_active,
            created_by: draft.created_by,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .lock()
            .await
            .ticket_products
            .insert(product.id, product.clone());
        Ok(product)
    }

    async fn update_ticket_product(
        &self,
        id: ProductId,
        patch: &TicketProductPatch,
    ) -> Result<Option<TicketProduct>, StoreError> {
        let now = self.clock.now();
        let mut tables = self.tables.lock().await;
        Ok(tables.ticket_products.get_mut(&id).map(|p| {
            if let Some(name) = &patch.name {
                p.name.clone_from(name);
            }
            if let Some(price) = patch.price_cents {
                p.price_cents = price;
            }
            p.inventory_limit = patch.inventory_limit.apply(p.inventory_limit);
            if let Some(active) = patch.is_active {
                p.is_active = active;
            }
            p.updated_at = now;
            p.clone()
        }))
    }

    async fn delete_ticket_product(&self, id: ProductId) -> Result<bool, StoreError> {
        Ok(self.tables.lock().await.ticket_products.remove(&id).is_some())
    }

    async fn list_transfer_products(
        &self,
        filter: &ProductFilter,
    ) -> Result<Vec<TransferProduct>, StoreError> {
        let tables = self.tables.lock().await;
        let mut products: Vec<TransferProduct> = tables
            .transfer_products
            .values()
            .filter(|p| filter.event_id.is_none_or(|id| p.event_id == id))
            .filter(|p| filter.active.is_none_or(|active| p.is_active == active))
            .cloned()
            .collect();
        newest_first(&mut products, |p| p.created_at);
        Ok(products)
    }

    async fn create_transfer_product(
        &self,
        draft: &TransferProductDraft,
    ) -> Result<TransferProduct, StoreError> {
        let now = self.clock.now();
        let product = TransferProduct {
            id: ProductId::new(),
            event_id: draft.event_id,
            name: draft.name.clone(),
            direction: draft.direction,
            price_cents: draft.price_cents,
            info: draft.info.clone(),
            inventory_limit: draft.inventory_limit,
            sold_count: 0,
            is_active: draft.is_active,
            created_by: draft.created_by,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .lock()
            .await
            .transfer_products
            .insert(product.id, product.clone());
        Ok(product)
    }

    async fn update_transfer_product(
        &self,
        id: ProductId,
        patch: &TransferProductPatch,
    ) -> Result<Option<TransferProduct>, StoreError> {
        let now = self.clock.now();
        let mut tables = self.tables.lock().await;
        Ok(tables.transfer_products.get_mut(&id).map(|p| {
            if let Some(name) = &patch.name {
                p.name.clone_from(name);
            }
            if let Some(price) = patch.price_cents {
                p.price_cents = price;
            }
            if let Some(info) = &patch.info {
                p.info.clone_from(info);
            }
            p.inventory_limit = patch.inventory_limit.apply(p.inventory_limit);
            if let Some(active) = patch.is_active {
                p.is_active = active;
            }
            p.updated_at = now;
            p.clone()
        }))
    }

    async fn delete_transfer_product(&self, id: ProductId) -> Result<bool, StoreError> {
        Ok(self.tables.lock().await.transfer_products.remove(&id).is_some())
    }

    async fn list_promo_codes(&self, filter: &ProductFilter) -> Result<Vec<PromoCode>, StoreError> {
        let tables = self.tables.lock().await;
        let mut codes: Vec<PromoCode> = tables
            .promo_codes
            .values()
            .filter(|p| {
                filter
                    .event_id
                    .is_none_or(|id| p.event_id.is_none() || p.event_id == Some(id))
            })
            .filter(|p| filter.active.is_none_or(|active| p.is_active == active))
            .cloned()
            .collect();
        newest_first(&mut codes, |p| p.created_at);
        Ok(codes)
    }

    async fn create_promo_code(&self, draft: &PromoCodeDraft) -> Result<PromoCode, StoreError> {
        let now = self.clock.now();
        let mut tables = self.tables.lock().await;
        if tables.promo_by_code(&draft.code).is_some() {
            return Err(StoreError::Database(format!(
                "promo code {} already exists",
                draft.code
            )));
        }
        let promo = PromoCode {
            id: PromoCodeId::new(),
            code: draft.code.clone(),
            discount_type: draft.discount_type.clone(),
            value: draft.value,
            usage_limit: draft.usage_limit,
            used_count: 0,
            active_from: draft.active_from,
            active_to: draft.active_to,
            event_id: draft.event_id,
            is_active: draft.is_active,
            created_by: draft.created_by,
            created_at: now,
            updated_at: now,
        };
        tables.promo_codes.insert(promo.id, promo.clone());
        Ok(promo)
    }

    async fn update_promo_code(
        &self,
        id: PromoCodeId,
        patch: &PromoCodePatch,
    ) -> Result<Option<PromoCode>, StoreError> {
        let now = self.clock.now();
        let mut tables = self.tables.lock().await;
        Ok(tables.promo_codes.get_mut(&id).map(|p| {
            if let Some(discount_type) = &patch.discount_type {
                p.discount_type = discount_type.clone();
            }
            if let Some(value) = patch.value {
                p.value = value;
            }
            p.usage_limit = patch.usage_limit.apply(p.usage_limit);
            if patch.active_from.is_some() {
                p.active_from = patch.active_from;
            }
            if patch.active_to.is_some() {
                p.active_to = patch.active_to;
            }
            if patch.event_id.is_some() {
                p.event_id = patch.event_id;
            }
            if let Some(active) = patch.is_active {
                p.is_active = active;
            }
            p.updated_at = now;
            p.clone()
        }))
    }

    async fn delete_promo_code(&self, id: PromoCodeId) -> Result<bool, StoreError> {
        Ok(self.tables.lock().await.promo_codes.remove(&id).is_some())
    }
}
