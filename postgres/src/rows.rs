//! Column lists and row decoding.
//!
//! Every `SELECT` in this crate goes through one of the column lists below so
//! the decoders can read columns by name.

use boxoffice_core::stats::{CheckInRow, StatsRow};
use boxoffice_core::store::StoreError;
use boxoffice_core::types::{
    DiscountType, EventId, ItemType, Meta, Order, OrderId, OrderItem, OrderStatus, OrderSummary,
    PaymentMethod, ProductId, PromoCode, PromoCodeId, Purchaser, Ticket, TicketId, TicketProduct,
    TicketType, TransferDirection, TransferProduct, UserId,
};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{Decode, Postgres, Row, Type};
use uuid::Uuid;

pub(crate) const TICKET_PRODUCT_COLUMNS: &str = "id, event_id, name, type, price_cents, \
     inventory_limit, sold_count, is_active, created_by, created_at, updated_at";

pub(crate) const TRANSFER_PRODUCT_COLUMNS: &str = "id, event_id, name, direction, price_cents, \
     info_json, inventory_limit, sold_count, is_active, created_by, created_at, updated_at";

pub(crate) const PROMO_CODE_COLUMNS: &str = "id, code, discount_type, value, usage_limit, \
     used_count, active_from, active_to, event_id, is_active, created_by, created_at, updated_at";

/// Orders joined to their event title. Alias `o` for orders, `e` for events.
pub(crate) const ORDER_SELECT: &str = "SELECT o.id, o.user_id, o.event_id, \
     COALESCE(e.title, '') AS event_title, o.status, o.payment_method, o.payment_reference, \
     o.payment_notes, o.promo_code_id, o.subtotal_cents, o.discount_cents, o.total_cents, \
     o.currency, o.confirmed_at, o.confirmed_by, o.canceled_at, o.canceled_by, \
     o.canceled_reason, o.redeemed_at, o.created_at, o.updated_at \
     FROM orders o LEFT JOIN events e ON e.id = o.event_id";

/// Like [`ORDER_SELECT`] plus the purchaser columns. Alias `u` for users.
pub(crate) const ORDER_SUMMARY_SELECT: &str = "SELECT o.id, o.user_id, o.event_id, \
     COALESCE(e.title, '') AS event_title, o.status, o.payment_method, o.payment_reference, \
     o.payment_notes, o.promo_code_id, o.subtotal_cents, o.discount_cents, o.total_cents, \
     o.currency, o.confirmed_at, o.confirmed_by, o.canceled_at, o.canceled_by, \
     o.canceled_reason, o.redeemed_at, o.created_at, o.updated_at, \
     u.id AS purchaser_id, u.telegram_id, u.first_name, u.last_name, u.username \
     FROM orders o LEFT JOIN events e ON e.id = o.event_id LEFT JOIN users u ON u.id = o.user_id";

pub(crate) const ORDER_ITEM_COLUMNS: &str = "id, order_id, item_type, product_id, product_ref, \
     quantity, unit_price_cents, line_total_cents, meta_json, created_at";

/// Ticket columns under alias `t`; callers append an `order_status` column.
pub(crate) const TICKET_COLUMNS: &str = "t.id, t.order_id, t.user_id, t.event_id, \
     t.ticket_type, t.quantity, t.qr_payload, t.qr_payload_hash, t.qr_issued_at, \
     t.redeemed_at, t.redeemed_by, t.created_at";

pub(crate) const PURCHASER_COLUMNS: &str = "id AS purchaser_id, telegram_id, first_name, last_name, username";

/// Maps a driver error to a store error.
pub(crate) fn db(err: sqlx::Error) -> StoreError {
    StoreError::Database(err.to_string())
}

fn col<'r, T>(row: &'r PgRow, entity: &'static str, name: &str) -> Result<T, StoreError>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::decode(entity, format!("{name}: {e}")))
}

fn count(row: &PgRow, entity: &'static str, name: &str) -> Result<u32, StoreError> {
    let raw: i32 = col(row, entity, name)?;
    u32::try_from(raw).map_err(|_| StoreError::decode(entity, format!("{name} is negative: {raw}")))
}

fn limit(row: &PgRow, entity: &'static str, name: &str) -> Result<Option<u32>, StoreError> {
    let raw: Option<i32> = col(row, entity, name)?;
    Ok(raw.and_then(|l| u32::try_from(l).ok()).filter(|l| *l > 0))
}

fn user(row: &PgRow, entity: &'static str, name: &str) -> Result<Option<UserId>, StoreError> {
    let raw: Option<i64> = col(row, entity, name)?;
    Ok(raw.map(UserId::new))
}

fn enumerated<T>(
    row: &PgRow,
    entity: &'static str,
    name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, StoreError> {
    let raw: String = col(row, entity, name)?;
    parse(&raw).ok_or_else(|| StoreError::decode(entity, format!("unknown {name} {raw:?}")))
}

fn meta(row: &PgRow, entity: &'static str, name: &str) -> Result<Meta, StoreError> {
    let raw: Option<Value> = col(row, entity, name)?;
    Ok(match raw {
        Some(Value::Object(map)) => map,
        _ => Meta::new(),
    })
}

pub(crate) fn ticket_product(row: &PgRow) -> Result<TicketProduct, StoreError> {
    const E: &str = "ticket_product";
    Ok(TicketProduct {
        id: ProductId::from_uuid(col(row, E, "id")?),
        event_id: EventId::new(col(row, E, "event_id")?),
        name: col(row, E, "name")?,
        ticket_type: enumerated(row, E, "type", TicketType::parse)?,
        price_cents: col(row, E, "price_cents")?,
        inventory_limit: limit(row, E, "inventory_limit")?,
        sold_count: count(row, E, "sold_count")?,
        is_active: col(row, E, "is_active")?,
        created_by: user(row, E, "created_by")?,
        created_at: col(row, E, "created_at")?,
        updated_at: col(row, E, "updated_at")?,
    })
}

pub(crate) fn transfer_product(row: &PgRow) -> Result<TransferProduct, StoreError> {
    const E: &str = "transfer_product";
    Ok(TransferProduct {
        id: ProductId::from_uuid(col(row, E, "id")?),
        event_id: EventId::new(col(row, E, "event_id")?),
        name: col(row, E, "name")?,
        direction: enumerated(row, E, "direction", TransferDirection::parse)?,
        price_cents: col(row, E, "price_cents")?,
        info: meta(row, E, "info_json")?,
        inventory_limit: limit(row, E, "inventory_limit")?,
        sold_count: count(row, E, "sold_count")?,
        is_active: col(row, E, "is_active")?,
        created_by: user(row, E, "created_by")?,
        created_at: col(row, E, "created_at")?,
        updated_at: col(row, E, "updated_at")?,
    })
}

pub(crate) fn promo_code(row: &PgRow) -> Result<PromoCode, StoreError> {
    const E: &str = "promo_code";
    let discount_type: String = col(row, E, "discount_type")?;
    let event_id: Option<i64> = col(row, E, "event_id")?;
    Ok(PromoCode {
        id: PromoCodeId::from_uuid(col(row, E, "id")?),
        code: col(row, E, "code")?,
        discount_type: DiscountType::parse(&discount_type),
        value: col(row, E, "value")?,
        usage_limit: limit(row, E, "usage_limit")?,
        used_count: count(row, E, "used_count")?,
        active_from: col(row, E, "active_from")?,
        active_to: col(row, E, "active_to")?,
        event_id: event_id.map(EventId::new).filter(EventId::is_valid),
        is_active: col(row, E, "is_active")?,
        created_by: user(row, E, "created_by")?,
        created_at: col(row, E, "created_at")?,
        updated_at: col(row, E, "updated_at")?,
    })
}

pub(crate) fn order(row: &PgRow) -> Result<Order, StoreError> {
    const E: &str = "order";
    let promo_code_id: Option<Uuid> = col(row, E, "promo_code_id")?;
    Ok(Order {
        id: OrderId::from_uuid(col(row, E, "id")?),
        user_id: UserId::new(col(row, E, "user_id")?),
        event_id: EventId::new(col(row, E, "event_id")?),
        event_title: col(row, E, "event_title")?,
        status: enumerated(row, E, "status", OrderStatus::parse)?,
        payment_method: enumerated(row, E, "payment_method", PaymentMethod::parse)?,
        payment_reference: col(row, E, "payment_reference")?,
        payment_notes: col(row, E, "payment_notes")?,
        promo_code_id: promo_code_id.map(PromoCodeId::from_uuid),
        subtotal_cents: col(row, E, "subtotal_cents")?,
        discount_cents: col(row, E, "discount_cents")?,
        total_cents: col(row, E, "total_cents")?,
        currency: col(row, E, "currency")?,
        confirmed_at: col(row, E, "confirmed_at")?,
        confirmed_by: user(row, E, "confirmed_by")?,
        canceled_at: col(row, E, "canceled_at")?,
        canceled_by: user(row, E, "canceled_by")?,
        canceled_reason: col(row, E, "canceled_reason")?,
        redeemed_at: col(row, E, "redeemed_at")?,
        created_at: col(row, E, "created_at")?,
        updated_at: col(row, E, "updated_at")?,
    })
}

/// Decodes the purchaser columns; `None` when the user row is missing.
pub(crate) fn purchaser(row: &PgRow) -> Result<Option<Purchaser>, StoreError> {
    const E: &str = "purchaser";
    let Some(user_id) = user(row, E, "purchaser_id")? else {
        return Ok(None);
    };
    let text = |name: &str| -> Result<String, StoreError> {
        let raw: Option<String> = col(row, E, name)?;
        Ok(raw.unwrap_or_default())
    };
    Ok(Some(Purchaser {
        user_id,
        messenger_id: col(row, E, "telegram_id")?,
        first_name: text("first_name")?,
        last_name: text("last_name")?,
        username: text("username")?,
    }))
}

pub(crate) fn order_summary(row: &PgRow) -> Result<OrderSummary, StoreError> {
    Ok(OrderSummary {
        order: order(row)?,
        purchaser: purchaser(row)?,
    })
}

pub(crate) fn order_item(row: &PgRow) -> Result<OrderItem, StoreError> {
    const E: &str = "order_item";
    Ok(OrderItem {
        id: col(row, E, "id")?,
        order_id: OrderId::from_uuid(col(row, E, "order_id")?),
        item_type: enumerated(row, E, "item_type", ItemType::parse)?,
        product_id: ProductId::from_uuid(col(row, E, "product_id")?),
        product_ref: col(row, E, "product_ref")?,
        quantity: count(row, E, "quantity")?,
        unit_price_cents: col(row, E, "unit_price_cents")?,
        line_total_cents: col(row, E, "line_total_cents")?,
        meta: meta(row, E, "meta_json")?,
        created_at: col(row, E, "created_at")?,
    })
}

pub(crate) fn ticket(row: &PgRow) -> Result<Ticket, StoreError> {
    const E: &str = "ticket";
    let order_status: Option<String> = col(row, E, "order_status")?;
    let order_status = order_status
        .map(|raw| {
            OrderStatus::parse(&raw)
                .ok_or_else(|| StoreError::decode(E, format!("unknown order_status {raw:?}")))
        })
        .transpose()?;
    Ok(Ticket {
        id: TicketId::from_uuid(col(row, E, "id")?),
        order_id: OrderId::from_uuid(col(row, E, "order_id")?),
        order_status,
        user_id: UserId::new(col(row, E, "user_id")?),
        event_id: EventId::new(col(row, E, "event_id")?),
        ticket_type: enumerated(row, E, "ticket_type", TicketType::parse)?,
        quantity: count(row, E, "quantity")?,
        qr_payload: col(row, E, "qr_payload")?,
        qr_payload_hash: col(row, E, "qr_payload_hash")?,
        qr_issued_at: col(row, E, "qr_issued_at")?,
        redeemed_at: col(row, E, "redeemed_at")?,
        redeemed_by: user(row, E, "redeemed_by")?,
        created_at: col(row, E, "created_at")?,
    })
}

pub(crate) fn stats_row(row: &PgRow) -> Result<StatsRow, StoreError> {
    const E: &str = "stats_row";
    let item_type: Option<String> = col(row, E, "item_type")?;
    let product_ref: Option<String> = col(row, E, "product_ref")?;
    let quantity: Option<i32> = col(row, E, "quantity")?;
    Ok(StatsRow {
        order_id: OrderId::from_uuid(col(row, E, "order_id")?),
        event_id: EventId::new(col(row, E, "event_id")?),
        event_title: col(row, E, "event_title")?,
        status: enumerated(row, E, "status", OrderStatus::parse)?,
        total_cents: col(row, E, "total_cents")?,
        item_type: item_type.as_deref().and_then(ItemType::parse),
        product_ref: product_ref.unwrap_or_default(),
        quantity: quantity.map_or(0, i64::from),
    })
}

pub(crate) fn check_in_row(row: &PgRow) -> Result<CheckInRow, StoreError> {
    const E: &str = "check_in_row";
    let quantity: i32 = col(row, E, "quantity")?;
    Ok(CheckInRow {
        event_id: EventId::new(col(row, E, "event_id")?),
        quantity: i64::from(quantity),
    })
}

/// Binds an optional `u32` limit as `INTEGER`.
pub(crate) fn limit_param(limit: Option<u32>) -> Option<i32> {
    limit.map(|l| i32::try_from(l).unwrap_or(i32::MAX))
}

/// Binds a quantity as `INTEGER`.
pub(crate) fn quantity_param(quantity: u32) -> Result<i32, StoreError> {
    i32::try_from(quantity)
        .map_err(|_| StoreError::Database(format!("quantity {quantity} out of range")))
}
