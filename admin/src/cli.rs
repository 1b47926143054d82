//! Command-line surface.

use crate::delivery::LogDelivery;
use anyhow::Context;
use boxoffice_core::catalog::CatalogService;
use boxoffice_core::environment::{OrderPolicy, SystemClock, TicketingEnvironment};
use boxoffice_core::orders::OrderService;
use boxoffice_core::qr::SigningSecret;
use boxoffice_core::redemption::RedemptionService;
use boxoffice_core::stats::StatsService;
use boxoffice_core::store::OrderQuery;
use boxoffice_core::types::{EventId, OrderId, OrderStatus, TicketId, UserId};
use boxoffice_postgres::PostgresTicketingStore;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "boxoffice-admin", about = "Boxoffice operator CLI", long_about = None)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Apply the ticketing schema migrations
    Migrate,
    /// Confirm payment of a pending order and issue its tickets
    Confirm(ConfirmArgs),
    /// Cancel a pending or paid order
    Cancel(CancelArgs),
    /// Redeem a ticket at the door
    Redeem(RedeemArgs),
    /// Sales and check-in statistics
    Stats(StatsArgs),
    /// Check what a promo code would do to a subtotal
    PromoCheck(PromoCheckArgs),
    /// Active products of an event
    Products(ProductsArgs),
    /// Order listings and details
    Orders(OrdersCommand),
}

#[derive(Debug, Args)]
pub(crate) struct ConfirmArgs {
    /// Order UUID
    order_id: OrderId,
    /// Operator user id
    #[arg(long, env = "BOXOFFICE_ADMIN_ID")]
    admin: UserId,
    /// Hand the issued tickets to the delivery channel after confirming
    #[arg(long)]
    deliver: bool,
}

#[derive(Debug, Args)]
pub(crate) struct CancelArgs {
    /// Order UUID
    order_id: OrderId,
    /// Operator user id
    #[arg(long, env = "BOXOFFICE_ADMIN_ID")]
    admin: UserId,
    /// Free-text reason stored on the order
    #[arg(long)]
    reason: Option<String>,
}

#[derive(Debug, Args)]
pub(crate) struct RedeemArgs {
    /// Ticket UUID
    ticket_id: TicketId,
    /// Operator user id
    #[arg(long, env = "BOXOFFICE_ADMIN_ID")]
    admin: UserId,
    /// Scanned QR token; omit for a manual override
    #[arg(long)]
    token: Option<String>,
}

#[derive(Debug, Args)]
pub(crate) struct StatsArgs {
    /// Restrict to one event
    #[arg(long)]
    event: Option<EventId>,
}

#[derive(Debug, Args)]
pub(crate) struct PromoCheckArgs {
    /// Event the order would be for
    #[arg(long)]
    event: EventId,
    /// Promo code, any case
    #[arg(long)]
    code: String,
    /// Order subtotal in minor units
    #[arg(long)]
    subtotal: i64,
}

#[derive(Debug, Args)]
pub(crate) struct ProductsArgs {
    /// Event id
    event: EventId,
}

#[derive(Debug, Args)]
pub(crate) struct OrdersCommand {
    #[command(subcommand)]
    command: OrdersSubcommand,
}

#[derive(Debug, Subcommand)]
enum OrdersSubcommand {
    /// Orders newest first
    List(ListOrdersArgs),
    /// One order with items and tickets
    Show(ShowOrderArgs),
    /// Orders and tickets of one user
    User(UserOrdersArgs),
}

#[derive(Debug, Args)]
struct ListOrdersArgs {
    /// Restrict to one event
    #[arg(long)]
    event: Option<EventId>,
    /// PENDING, PAID (or CONFIRMED), CANCELED, REDEEMED
    #[arg(long, value_parser = parse_status)]
    status: Option<OrderStatus>,
    /// Created at or after (RFC 3339)
    #[arg(long)]
    from: Option<DateTime<Utc>>,
    /// Created at or before (RFC 3339)
    #[arg(long)]
    to: Option<DateTime<Utc>>,
    /// Page size (max 200)
    #[arg(long, default_value_t = OrderQuery::DEFAULT_LIMIT)]
    limit: u32,
    /// Rows to skip
    #[arg(long, default_value_t = 0)]
    offset: u32,
}

#[derive(Debug, Args)]
struct ShowOrderArgs {
    /// Order UUID
    order_id: OrderId,
    /// Include the purchaser's identity
    #[arg(long)]
    purchaser: bool,
}

#[derive(Debug, Args)]
struct UserOrdersArgs {
    /// User id
    user_id: UserId,
    /// Restrict tickets to one event
    #[arg(long)]
    event: Option<EventId>,
    /// Page size (max 200)
    #[arg(long, default_value_t = OrderQuery::DEFAULT_LIMIT)]
    limit: u32,
    /// Rows to skip
    #[arg(long, default_value_t = 0)]
    offset: u32,
}

fn parse_status(raw: &str) -> Result<OrderStatus, String> {
    OrderStatus::parse(raw).ok_or_else(|| format!("unknown order status: {raw}"))
}

/// Services wired to one store.
pub(crate) struct App {
    store: Arc<PostgresTicketingStore>,
    env: TicketingEnvironment<PostgresTicketingStore>,
}

impl App {
    pub(crate) fn new(
        store: PostgresTicketingStore,
        secret: SigningSecret,
        policy: OrderPolicy,
    ) -> Self {
        let store = Arc::new(store);
        let env = TicketingEnvironment::new(Arc::clone(&store), Arc::new(SystemClock), secret)
            .with_policy(policy);
        Self { store, env }
    }

    fn orders(&self) -> OrderService<PostgresTicketingStore> {
        OrderService::new(self.env.clone())
    }

    pub(crate) async fn run(&self, command: Command) -> anyhow::Result<()> {
        match command {
            Command::Migrate => {
                self.store.migrate().await.context("running migrations")?;
                print_json(&serde_json::json!({ "migrated": true }))
            }
            Command::Confirm(args) => self.confirm(args).await,
            Command::Cancel(args) => {
                let detail = self
                    .orders()
                    .cancel_order(args.order_id, args.admin, args.reason)
                    .await?;
                print_json(&detail)
            }
            Command::Redeem(args) => {
                let outcome = RedemptionService::new(self.env.clone())
                    .redeem_ticket(args.ticket_id, args.admin, args.token.as_deref())
                    .await?;
                print_json(&outcome)
            }
            Command::Stats(args) => {
                let stats = StatsService::new(Arc::clone(&self.store))
                    .ticket_stats(args.event)
                    .await?;
                print_json(&stats)
            }
            Command::PromoCheck(args) => {
                let check = self
                    .orders()
                    .validate_promo_code(args.event, &args.code, args.subtotal)
                    .await?;
                print_json(&check)
            }
            Command::Products(args) => {
                let products = CatalogService::new(Arc::clone(&self.store))
                    .purchasable_products(args.event)
                    .await?;
                print_json(&products)
            }
            Command::Orders(OrdersCommand { command }) => self.orders_command(command).await,
        }
    }

    async fn confirm(&self, args: ConfirmArgs) -> anyhow::Result<()> {
        let orders = self.orders();
        if args.deliver {
            let delivered = orders
                .confirm_and_deliver(args.order_id, args.admin, &LogDelivery)
                .await?;
            print_json(&delivered)
        } else {
            let confirmed = orders.confirm_order(args.order_id, args.admin).await?;
            print_json(&confirmed)
        }
    }

    async fn orders_command(&self, command: OrdersSubcommand) -> anyhow::Result<()> {
        let orders = self.orders();
        match command {
            OrdersSubcommand::List(args) => {
                let page = orders
                    .list_orders(OrderQuery {
                        event_id: args.event,
                        status: args.status,
                        from: args.from,
                        to: args.to,
                        limit: args.limit,
                        offset: args.offset,
                    })
                    .await?;
                print_json(&page)
            }
            OrdersSubcommand::Show(args) => {
                let detail = orders.order_detail(args.order_id, args.purchaser).await?;
                print_json(&detail)
            }
            OrdersSubcommand::User(args) => {
                let page = orders
                    .list_user_orders(args.user_id, args.limit, args.offset)
                    .await?;
                let tickets = orders.list_user_tickets(args.user_id, args.event).await?;
                print_json(&serde_json::json!({ "orders": page, "tickets": tickets }))
            }
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("rendering output")?;
    println!("{rendered}");
    Ok(())
}
