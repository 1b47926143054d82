//! Transactions over a pooled connection.

use crate::queries;
use crate::rows::{
    self, ORDER_ITEM_COLUMNS, ORDER_SELECT, PROMO_CODE_COLUMNS, TICKET_COLUMNS,
    TICKET_PRODUCT_COLUMNS, TRANSFER_PRODUCT_COLUMNS, db, quantity_param,
};
use async_trait::async_trait;
use boxoffice_core::store::{
    IssuedQr, LockLedger, LockStage, LockedTicket, NewOrder, NewOrderItem, NewTicket,
    OrderTransition, StoreError, StoreTx,
};
use boxoffice_core::types::{
    AdminId, EventId, ItemType, Order, OrderDetail, OrderId, OrderItem, OrderStatus, ProductId,
    PromoCode, PromoCodeId, Purchaser, Ticket, TicketId, TicketProduct, TransferProduct, UserId,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Postgres, Transaction};

const fn product_table(item_type: ItemType) -> &'static str {
    match item_type {
        ItemType::Ticket => "ticket_products",
        ItemType::Transfer => "transfer_products",
    }
}

fn statuses(statuses: &[OrderStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

/// An open `PostgreSQL` transaction.
///
/// Row locks are taken with `SELECT ... FOR UPDATE` and held until commit or
/// rollback. Dropping the value without either rolls back.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
    ledger: LockLedger,
}

impl PgTx {
    pub(crate) const fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self {
            tx,
            ledger: LockLedger::new(),
        }
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(db)
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(db)
    }

    async fn event_title(&mut self, event_id: EventId) -> Result<Option<String>, StoreError> {
        sqlx::query_scalar("SELECT title FROM events WHERE id = $1")
            .bind(event_id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db)
    }

    async fn lock_ticket_product(&mut self, id: ProductId) -> Result<Option<TicketProduct>, StoreError> {
        self.ledger.acquire(LockStage::Product)?;
        sqlx::query(&format!(
            "SELECT {TICKET_PRODUCT_COLUMNS} FROM ticket_products WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db)?
        .as_ref()
        .map(rows::ticket_product)
        .transpose()
    }

    async fn lock_transfer_product(
        &mut self,
        id: ProductId,
    ) -> Result<Option<TransferProduct>, StoreError> {
        self.ledger.acquire(LockStage::Product)?;
        sqlx::query(&format!(
            "SELECT {TRANSFER_PRODUCT_COLUMNS} FROM transfer_products WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db)?
        .as_ref()
        .map(rows::transfer_product)
        .transpose()
    }

    async fn lock_promo_by_code(&mut self, code: &str) -> Result<Option<PromoCode>, StoreError> {
        self.ledger.acquire(LockStage::Promo)?;
        sqlx::query(&format!(
            "SELECT {PROMO_CODE_COLUMNS} FROM promo_codes WHERE upper(code) = upper($1) FOR UPDATE"
        ))
        .bind(code.trim())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db)?
        .as_ref()
        .map(rows::promo_code)
        .transpose()
    }

    async fn consume_promo(&mut self, id: PromoCodeId) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r"
            UPDATE promo_codes
            SET used_count = used_count + 1, updated_at = now()
            WHERE id = $1
              AND (usage_limit IS NULL OR usage_limit <= 0 OR used_count < usage_limit)
            ",
        )
        .bind(id.as_uuid())
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_promo(&mut self, id: PromoCodeId) -> Result<(), StoreError> {
        sqlx::query(
            r"
            UPDATE promo_codes
            SET used_count = GREATEST(used_count - 1, 0), updated_at = now()
            WHERE id = $1
            ",
        )
        .bind(id.as_uuid())
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn insert_order(&mut self, order: &NewOrder) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO orders (
                id, user_id, event_id, status, payment_method, payment_reference,
                payment_notes, promo_code_id, subtotal_cents, discount_cents, total_cents,
                currency, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
            ",
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.get())
        .bind(order.event_id.get())
        .bind(OrderStatus::Pending.as_str())
        .bind(order.payment_method.as_str())
        .bind(order.payment_reference.as_deref())
        .bind(order.payment_notes.as_deref())
        .bind(order.promo_code_id.map(|id| id.as_uuid()))
        .bind(order.subtotal_cents)
        .bind(order.discount_cents)
        .bind(order.total_cents)
        .bind(&order.currency)
        .bind(order.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn insert_order_item(&mut self, item: &NewOrderItem) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO order_items (
                order_id, item_type, product_id, product_ref, quantity,
                unit_price_cents, line_total_cents, meta_json, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(item.order_id.as_uuid())
        .bind(item.item_type.as_str())
        .bind(item.product_id.as_uuid())
        .bind(&item.product_ref)
        .bind(quantity_param(item.quantity)?)
        .bind(item.unit_price_cents)
        .bind(item.line_total_cents)
        .bind(Value::Object(item.meta.clone()))
        .bind(item.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn insert_ticket(&mut self, ticket: &NewTicket) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO tickets (id, order_id, user_id, event_id, ticket_type, quantity, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(ticket.id.as_uuid())
        .bind(ticket.order_id.as_uuid())
        .bind(ticket.user_id.get())
        .bind(ticket.event_id.get())
        .bind(ticket.ticket_type.as_str())
        .bind(quantity_param(ticket.quantity)?)
        .bind(ticket.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        self.ledger.acquire(LockStage::Order)?;
        sqlx::query(&format!("{ORDER_SELECT} WHERE o.id = $1 FOR UPDATE OF o"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db)?
            .as_ref()
            .map(rows::order)
            .transpose()
    }

    async fn lock_order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>, StoreError> {
        self.ledger.acquire(LockStage::OrderItem)?;
        sqlx::query(&format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY id FOR UPDATE"
        ))
        .bind(order_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db)?
        .iter()
        .map(rows::order_item)
        .collect()
    }

    async fn reserve_inventory(
        &mut self,
        item_type: ItemType,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<bool, StoreError> {
        let Ok(quantity) = i32::try_from(quantity) else {
            return Ok(false);
        };
        let table = product_table(item_type);
        let result = sqlx::query(&format!(
            "UPDATE {table} SET sold_count = sold_count + $2, updated_at = now() \
             WHERE id = $1 AND (inventory_limit IS NULL OR sold_count + $2 <= inventory_limit)"
        ))
        .bind(product_id.as_uuid())
        .bind(quantity)
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_inventory(
        &mut self,
        item_type: ItemType,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<(), StoreError> {
        let table = product_table(item_type);
        sqlx::query(&format!(
            "UPDATE {table} SET sold_count = GREATEST(sold_count - $2, 0), updated_at = now() \
             WHERE id = $1"
        ))
        .bind(product_id.as_uuid())
        .bind(quantity_param(quantity)?)
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn transition_order(
        &mut self,
        id: OrderId,
        transition: &OrderTransition,
    ) -> Result<bool, StoreError> {
        let target = transition.target().as_str();
        let allowed = statuses(transition.allowed_from());
        let query = match transition {
            OrderTransition::Confirm { by, at } => sqlx::query(
                r"
                UPDATE orders
                SET status = $2, confirmed_at = $3, confirmed_by = $4, updated_at = $3
                WHERE id = $1 AND status = ANY($5)
                ",
            )
            .bind(id.as_uuid())
            .bind(target)
            .bind(*at)
            .bind(by.get())
            .bind(allowed),
            OrderTransition::Cancel { by, at, reason } => sqlx::query(
                r"
                UPDATE orders
                SET status = $2, canceled_at = $3, canceled_by = $4, canceled_reason = $6,
                    updated_at = $3
                WHERE id = $1 AND status = ANY($5)
                ",
            )
            .bind(id.as_uuid())
            .bind(target)
            .bind(*at)
            .bind(by.get())
            .bind(allowed)
            .bind(reason.clone()),
            OrderTransition::Redeem { at } => sqlx::query(
                r"
                UPDATE orders
                SET status = $2, redeemed_at = COALESCE(redeemed_at, $3), updated_at = $3
                WHERE id = $1 AND status = ANY($4)
                ",
            )
            .bind(id.as_uuid())
            .bind(target)
            .bind(*at)
            .bind(allowed),
        };
        let result = query.execute(&mut *self.tx).await.map_err(db)?;
        Ok(result.rows_affected() == 1)
    }

    async fn lock_order_tickets(&mut self, order_id: OrderId) -> Result<Vec<Ticket>, StoreError> {
        self.ledger.acquire(LockStage::Ticket)?;
        sqlx::query(&format!(
            "SELECT {TICKET_COLUMNS}, NULL::text AS order_status FROM tickets t \
             WHERE t.order_id = $1 ORDER BY t.created_at, t.id FOR UPDATE"
        ))
        .bind(order_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db)?
        .iter()
        .map(rows::ticket)
        .collect()
    }

    async fn issue_ticket_qr(&mut self, ticket_id: TicketId, qr: &IssuedQr) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            UPDATE tickets
            SET qr_payload = $2, qr_payload_hash = $3, qr_issued_at = $4
            WHERE id = $1
            ",
        )
        .bind(ticket_id.as_uuid())
        .bind(&qr.payload)
        .bind(&qr.payload_hash)
        .bind(qr.issued_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Database(format!("ticket {ticket_id} vanished")));
        }
        Ok(())
    }

    async fn lock_ticket(&mut self, id: TicketId) -> Result<Option<LockedTicket>, StoreError> {
        // A ticket never changes order, so its order row can be locked first.
        self.ledger.acquire(LockStage::Order)?;
        let order = sqlx::query(
            "SELECT o.id FROM orders o JOIN tickets t ON t.order_id = o.id \
             WHERE t.id = $1 FOR UPDATE OF o",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db)?;
        if order.is_none() {
            return Ok(None);
        }

        self.ledger.acquire(LockStage::Ticket)?;
        let Some(row) = sqlx::query(&format!(
            "SELECT {TICKET_COLUMNS}, o.status AS order_status FROM tickets t \
             JOIN orders o ON o.id = t.order_id WHERE t.id = $1 FOR UPDATE OF t"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db)?
        else {
            return Ok(None);
        };
        let ticket = rows::ticket(&row)?;
        let order_status = ticket
            .order_status
            .ok_or_else(|| StoreError::decode("ticket", "order status missing"))?;
        Ok(Some(LockedTicket {
            ticket,
            order_status,
        }))
    }

    async fn mark_ticket_redeemed(
        &mut self,
        id: TicketId,
        by: AdminId,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r"
            UPDATE tickets
            SET redeemed_at = $2, redeemed_by = $3
            WHERE id = $1 AND redeemed_at IS NULL
            ",
        )
        .bind(id.as_uuid())
        .bind(at)
        .bind(by.get())
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        Ok(result.rows_affected() == 1)
    }

    async fn count_unredeemed_tickets(&mut self, order_id: OrderId) -> Result<u64, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT count(*) FROM tickets WHERE order_id = $1 AND redeemed_at IS NULL",
        )
        .bind(order_id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db)?;
        u64::try_from(count).map_err(|_| StoreError::decode("ticket_count", count))
    }

    async fn order_detail(
        &mut self,
        order_id: OrderId,
        include_purchaser: bool,
    ) -> Result<Option<OrderDetail>, StoreError> {
        queries::order_detail(&mut *self.tx, order_id, include_purchaser).await
    }

    async fn purchaser(&mut self, user_id: UserId) -> Result<Option<Purchaser>, StoreError> {
        queries::purchaser(&mut *self.tx, user_id).await
    }
}
