//! `PostgreSQL` store for the boxoffice ticketing core.
//!
//! [`PostgresTicketingStore`] implements both
//! [`TicketingStore`](boxoffice_core::store::TicketingStore) and
//! [`CatalogStore`](boxoffice_core::store::CatalogStore) on top of a sqlx
//! connection pool. Every unit of work runs in one database transaction
//! ([`PgTx`]); row locks are `SELECT ... FOR UPDATE` and the counters
//! (`sold_count`, `used_count`, `redeemed_at`) are single conditional
//! `UPDATE`s, so concurrent confirmations and redemptions never oversell or
//! double-redeem.
//!
//! # Example
//!
//! ```ignore
//! use boxoffice_postgres::{PostgresConfig, PostgresTicketingStore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresTicketingStore::connect(&PostgresConfig::from_env()).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod config;
mod queries;
mod rows;
mod tx;

pub use config::PostgresConfig;
pub use tx::PgTx;

use async_trait::async_trait;
use boxoffice_core::stats::{CheckInRow, StatsRow};
use boxoffice_core::store::{OrderQuery, StoreError, TicketingStore};
use boxoffice_core::types::{
    EventId, OrderDetail, OrderId, OrderSummary, Page, PromoCode, Ticket, UserId,
};
use rows::{ORDER_SUMMARY_SELECT, PROMO_CODE_COLUMNS, TICKET_COLUMNS, db};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Executor;

fn page_param(value: u32) -> i64 {
    i64::from(value)
}

fn total(count: i64) -> u64 {
    u64::try_from(count).unwrap_or_default()
}

/// Ticketing store backed by a `PostgreSQL` pool.
#[derive(Clone)]
pub struct PostgresTicketingStore {
    pool: PgPool,
}

impl PostgresTicketingStore {
    /// Opens a pool according to `config`.
    ///
    /// A non-zero `statement_timeout_ms` is applied to every new connection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the pool cannot connect.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StoreError> {
        let statement_timeout_ms = config.statement_timeout_ms;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout())
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    if statement_timeout_ms > 0 {
                        conn.execute(format!("SET statement_timeout = {statement_timeout_ms}").as_str())
                            .await?;
                    }
                    Ok(())
                })
            })
            .connect(&config.url)
            .await
            .map_err(db)?;

        tracing::info!(
            url = %config.redacted_url(),
            max_connections = config.max_connections,
            "Connected to PostgreSQL"
        );
        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies the bundled schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("migration failed: {e}")))?;
        tracing::info!("Ticketing schema is up to date");
        Ok(())
    }
}

const ORDER_FILTER: &str = "($1::bigint IS NULL OR o.event_id = $1) \
     AND ($2::text IS NULL OR o.status = $2) \
     AND ($3::timestamptz IS NULL OR o.created_at >= $3) \
     AND ($4::timestamptz IS NULL OR o.created_at <= $4)";

fn summaries(found: &[PgRow], count: i64) -> Result<Page<OrderSummary>, StoreError> {
    Ok(Page {
        items: found
            .iter()
            .map(rows::order_summary)
            .collect::<Result<Vec<_>, _>>()?,
        total: total(count),
    })
}

#[async_trait]
impl TicketingStore for PostgresTicketingStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx, StoreError> {
        let tx = self.pool.begin().await.map_err(db)?;
        metrics::counter!("boxoffice.store.transactions").increment(1);
        Ok(PgTx::new(tx))
    }

    async fn find_promo_by_code(&self, code: &str) -> Result<Option<PromoCode>, StoreError> {
        sqlx::query(&format!(
            "SELECT {PROMO_CODE_COLUMNS} FROM promo_codes WHERE upper(code) = upper($1)"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?
        .as_ref()
        .map(rows::promo_code)
        .transpose()
    }

    async fn order_detail(
        &self,
        order_id: OrderId,
        include_purchaser: bool,
    ) -> Result<Option<OrderDetail>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(db)?;
        queries::order_detail(&mut conn, order_id, include_purchaser).await
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Page<OrderSummary>, StoreError> {
        let event_id = query.event_id.map(|id| id.get());
        let status = query.status.map(|s| s.as_str());
        let found = sqlx::query(&format!(
            "{ORDER_SUMMARY_SELECT} WHERE {ORDER_FILTER} \
             ORDER BY o.created_at DESC, o.id DESC LIMIT $5 OFFSET $6"
        ))
        .bind(event_id)
        .bind(status)
        .bind(query.from)
        .bind(query.to)
        .bind(page_param(query.limit))
        .bind(page_param(query.offset))
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        let (count,): (i64,) =
            sqlx::query_as(&format!("SELECT COUNT(*) FROM orders o WHERE {ORDER_FILTER}"))
                .bind(event_id)
                .bind(status)
                .bind(query.from)
                .bind(query.to)
                .fetch_one(&self.pool)
                .await
                .map_err(db)?;

        summaries(&found, count)
    }

    async fn list_user_orders(
        &self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Page<OrderSummary>, StoreError> {
        let found = sqlx::query(&format!(
            "{ORDER_SUMMARY_SELECT} WHERE o.user_id = $1 \
             ORDER BY o.created_at DESC, o.id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(user_id.get())
        .bind(page_param(limit))
        .bind(page_param(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE user_id = $1")
            .bind(user_id.get())
            .fetch_one(&self.pool)
            .await
            .map_err(db)?;

        summaries(&found, count)
    }

    async fn list_user_tickets(
        &self,
        user_id: UserId,
        event_id: Option<EventId>,
    ) -> Result<Vec<Ticket>, StoreError> {
        sqlx::query(&format!(
            "SELECT {TICKET_COLUMNS}, o.status AS order_status \
             FROM tickets t JOIN orders o ON o.id = t.order_id \
             WHERE t.user_id = $1 AND ($2::bigint IS NULL OR t.event_id = $2) \
             ORDER BY t.created_at DESC, t.id DESC"
        ))
        .bind(user_id.get())
        .bind(event_id.map(|id| id.get()))
        .fetch_all(&self.pool)
        .await
        .map_err(db)?
        .iter()
        .map(rows::ticket)
        .collect()
    }

    async fn stats_rows(&self, event_id: Option<EventId>) -> Result<Vec<StatsRow>, StoreError> {
        let found = sqlx::query(
            r"SELECT o.id AS order_id, o.event_id, COALESCE(e.title, '') AS event_title,
                     o.status, o.total_cents, i.item_type, i.product_ref, i.quantity
              FROM orders o
              LEFT JOIN events e ON e.id = o.event_id
              LEFT JOIN order_items i ON i.order_id = o.id
              WHERE ($1::bigint IS NULL OR o.event_id = $1)
              ORDER BY o.created_at, o.id, i.id",
        )
        .bind(event_id.map(|id| id.get()))
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        tracing::debug!(rows = found.len(), "Loaded stats rows");
        found.iter().map(rows::stats_row).collect()
    }

    async fn check_in_rows(&self, event_id: Option<EventId>) -> Result<Vec<CheckInRow>, StoreError> {
        sqlx::query(
            r"SELECT event_id, quantity FROM tickets
              WHERE redeemed_at IS NOT NULL AND ($1::bigint IS NULL OR event_id = $1)",
        )
        .bind(event_id.map(|id| id.get()))
        .fetch_all(&self.pool)
        .await
        .map_err(db)?
        .iter()
        .map(rows::check_in_row)
        .collect()
    }
}
