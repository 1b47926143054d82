//! Reads shared by the pool and by open transactions.

use crate::rows::{self, ORDER_ITEM_COLUMNS, ORDER_SELECT, PURCHASER_COLUMNS, TICKET_COLUMNS, db};
use boxoffice_core::store::StoreError;
use boxoffice_core::types::{OrderDetail, OrderId, Purchaser, UserId};
use sqlx::PgConnection;

pub(crate) async fn purchaser(
    conn: &mut PgConnection,
    user_id: UserId,
) -> Result<Option<Purchaser>, StoreError> {
    let row = sqlx::query(&format!("SELECT {PURCHASER_COLUMNS} FROM users WHERE id = $1"))
        .bind(user_id.get())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db)?;
    match row {
        Some(row) => rows::purchaser(&row),
        None => Ok(None),
    }
}

pub(crate) async fn order_detail(
    conn: &mut PgConnection,
    order_id: OrderId,
    include_purchaser: bool,
) -> Result<Option<OrderDetail>, StoreError> {
    let Some(row) = sqlx::query(&format!("{ORDER_SELECT} WHERE o.id = $1"))
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db)?
    else {
        return Ok(None);
    };
    let order = rows::order(&row)?;

    let items = sqlx::query(&format!(
        "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY id"
    ))
    .bind(order_id.as_uuid())
    .fetch_all(&mut *conn)
    .await
    .map_err(db)?
    .iter()
    .map(rows::order_item)
    .collect::<Result<Vec<_>, _>>()?;

    let tickets = sqlx::query(&format!(
        "SELECT {TICKET_COLUMNS}, NULL::text AS order_status FROM tickets t \
         WHERE t.order_id = $1 ORDER BY t.created_at, t.id"
    ))
    .bind(order_id.as_uuid())
    .fetch_all(&mut *conn)
    .await
    .map_err(db)?
    .iter()
    .map(rows::ticket)
    .collect::<Result<Vec<_>, _>>()?;

    let purchaser = if include_purchaser {
        purchaser(conn, order.user_id).await?
    } else {
        None
    };

    Ok(Some(OrderDetail {
        order,
        purchaser,
        items,
        tickets,
    }))
}
