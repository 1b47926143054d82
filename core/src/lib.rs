//! # Boxoffice Core
//!
//! Ticketing core for an events platform: order lifecycle, inventory
//! reservation, promo codes, signed tickets and exactly-once redemption.
//!
//! ## Layout
//!
//! - Pure components with no I/O: [`promo`] (discount rules), [`stats`]
//!   (sales reduction) and [`qr`] (ticket token signing)
//! - The persistence contract in [`store`]: a [`store::TicketingStore`] hands
//!   out [`store::StoreTx`] transactions that lock rows in a fixed order
//! - Services composing the two: [`catalog::CatalogService`],
//!   [`orders::OrderService`], [`redemption::RedemptionService`] and
//!   [`stats::StatsService`]
//!
//! ## Example
//!
//! ```ignore
//! use boxoffice_core::environment::{SystemClock, TicketingEnvironment};
//! use boxoffice_core::orders::OrderService;
//! use boxoffice_core::qr::SigningSecret;
//!
//! let env = TicketingEnvironment::new(store, Arc::new(SystemClock), SigningSecret::new(secret)?);
//! let orders = OrderService::new(env);
//! let detail = orders.create_order(request).await?;
//! let confirmed = orders.confirm_order(detail.order.id, admin_id).await?;
//! ```

pub mod catalog;
pub mod delivery;
pub mod environment;
pub mod error;
pub mod orders;
pub mod promo;
pub mod qr;
pub mod redemption;
pub mod stats;
pub mod store;
pub mod types;

pub use error::{ErrorClass, QrMismatch, Result, TicketingError};
