//! # Boxoffice Testing
//!
//! Testing utilities for the boxoffice ticketing core.
//!
//! This crate provides:
//! - Deterministic clocks implementing [`Clock`]
//! - [`InMemoryTicketingStore`], a transactional store without a database
//! - Delivery doubles that record or fail
//! - Fixtures and a [`TicketingHarness`] wiring every service together
//!
//! ## Example
//!
//! ```ignore
//! use boxoffice_testing::{TicketingHarness, fixtures};
//!
//! #[tokio::test]
//! async fn test_order_flow() {
//!     let harness = TicketingHarness::new().await;
//!     let product = harness.ticket_product("SINGLE", 1_000, None).await;
//!
//!     let detail = harness
//!         .orders
//!         .create_order(fixtures::order_request(vec![fixtures::select(product.id, 2)]))
//!         .await
//!         .unwrap();
//!
//!     assert_eq!(detail.tickets.len(), 2);
//! }
//! ```

use boxoffice_core::environment::Clock;
use chrono::{DateTime, Utc};

pub mod memory;

pub use memory::{InMemoryTicketingStore, InMemoryTx};

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use async_trait::async_trait;
    use boxoffice_core::delivery::{DeliveryError, TicketDelivery};
    use boxoffice_core::types::{OrderDetail, OrderId, Purchaser, UserId};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use boxoffice_testing::mocks::FixedClock;
    /// use boxoffice_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that moves one second forward on every reading.
    ///
    /// Useful when ordering by creation time matters.
    #[derive(Debug)]
    pub struct SteppingClock {
        start: DateTime<Utc>,
        ticks: AtomicI64,
    }

    impl SteppingClock {
        /// Create a clock whose first reading is `start`
        #[must_use]
        pub const fn new(start: DateTime<Utc>) -> Self {
            Self {
                start,
                ticks: AtomicI64::new(0),
            }
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> DateTime<Utc> {
            let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
            self.start + chrono::Duration::seconds(tick)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Delivery channel that records every handoff.
    #[derive(Debug, Default)]
    pub struct RecordingDelivery {
        sent: Mutex<Vec<(UserId, OrderId, usize)>>,
    }

    impl RecordingDelivery {
        /// Create an empty recorder
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Deliveries so far as `(user, order, ticket count)`.
        #[must_use]
        pub fn sent(&self) -> Vec<(UserId, OrderId, usize)> {
            self.sent
                .lock()
                .map(|sent| sent.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl TicketDelivery for RecordingDelivery {
        async fn deliver(&self, purchaser: &Purchaser, detail: &OrderDetail) -> Result<(), DeliveryError> {
            self.sent
                .lock()
                .map_err(|_| DeliveryError("recorder poisoned".to_string()))?
                .push((purchaser.user_id, detail.order.id, detail.tickets.len()));
            Ok(())
        }
    }

    /// Delivery channel that always fails.
    #[derive(Debug, Clone)]
    pub struct FailingDelivery {
        message: String,
    }

    impl FailingDelivery {
        /// Fail every delivery with `message`
        #[must_use]
        pub fn new(message: impl Into<String>) -> Self {
            Self {
                message: message.into(),
            }
        }
    }

    #[async_trait]
    impl TicketDelivery for FailingDelivery {
        async fn deliver(&self, _: &Purchaser, _: &OrderDetail) -> Result<(), DeliveryError> {
            Err(DeliveryError(self.message.clone()))
        }
    }
}

/// Builders for service inputs.
pub mod fixtures {
    use boxoffice_core::catalog::{PromoCodeInput, TicketProductInput, TransferProductInput};
    use boxoffice_core::orders::{CreateOrderRequest, ProductSelection};
    use boxoffice_core::types::{EventId, Meta, ProductId, Purchaser, UserId};

    /// Event every harness seeds.
    pub const EVENT_ID: EventId = EventId::new(1);
    /// Title of [`EVENT_ID`].
    pub const EVENT_TITLE: &str = "Summer Festival";
    /// Buyer every harness seeds.
    pub const BUYER_ID: UserId = UserId::new(7);
    /// Operator acting on orders.
    pub const ADMIN_ID: UserId = UserId::new(900);
    /// Signing secret used by the harness.
    pub const SIGNING_SECRET: &str = "test-ticket-secret";

    /// A purchaser with a linked messenger identity.
    #[must_use]
    pub fn purchaser(user_id: UserId) -> Purchaser {
        Purchaser {
            user_id,
            messenger_id: Some(user_id.get() * 1_000),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            username: format!("user{}", user_id.get()),
        }
    }

    /// Ticket product input for [`EVENT_ID`].
    #[must_use]
    pub fn ticket_input(ticket_type: &str, price_cents: i64, inventory_limit: Option<i64>) -> TicketProductInput {
        TicketProductInput {
            event_id: EVENT_ID,
            name: format!("{ticket_type} pass"),
            ticket_type: ticket_type.to_string(),
            price_cents,
            inventory_limit,
            is_active: None,
        }
    }

    /// Transfer product input for [`EVENT_ID`].
    #[must_use]
    pub fn transfer_input(direction: &str, price_cents: i64, inventory_limit: Option<i64>) -> TransferProductInput {
        TransferProductInput {
            event_id: EVENT_ID,
            name: format!("Shuttle {direction}"),
            direction: direction.to_string(),
            price_cents,
            info: Meta::new(),
            inventory_limit,
            is_active: None,
        }
    }

    /// Global, always-open promo code input.
    #[must_use]
    pub fn promo_input(code: &str, discount_type: &str, value: i64) -> PromoCodeInput {
        PromoCodeInput {
            code: code.to_string(),
            discount_type: discount_type.to_string(),
            value,
            usage_limit: None,
            active_from: None,
            active_to: None,
            event_id: None,
            is_active: None,
        }
    }

    /// One product line.
    #[must_use]
    pub const fn select(product_id: ProductId, quantity: u32) -> ProductSelection {
        ProductSelection {
            product_id,
            quantity,
        }
    }

    /// Phone-paid order by [`BUYER_ID`] for [`EVENT_ID`].
    #[must_use]
    pub fn order_request(ticket_items: Vec<ProductSelection>) -> CreateOrderRequest {
        CreateOrderRequest {
            user_id: BUYER_ID,
            event_id: EVENT_ID,
            payment_method: "phone".to_string(),
            payment_reference: None,
            ticket_items,
            transfer_items: Vec::new(),
            promo_code: None,
        }
    }
}

/// Every service over one in-memory store.
pub mod harness {
    use super::fixtures::{self, EVENT_ID, EVENT_TITLE};
    use super::memory::InMemoryTicketingStore;
    use super::mocks::test_clock;
    use boxoffice_core::catalog::CatalogService;
    use boxoffice_core::environment::{Clock, TicketingEnvironment};
    use boxoffice_core::orders::OrderService;
    use boxoffice_core::qr::SigningSecret;
    use boxoffice_core::redemption::RedemptionService;
    use boxoffice_core::stats::StatsService;
    use boxoffice_core::types::{PromoCode, TicketProduct, TransferProduct};
    use std::sync::Arc;

    /// Services sharing one store, a fixed clock and a known secret.
    pub struct TicketingHarness {
        /// Backing store, for seeding and inspection.
        pub store: Arc<InMemoryTicketingStore>,
        /// Shared environment.
        pub env: TicketingEnvironment<InMemoryTicketingStore>,
        /// Catalog administration.
        pub catalog: CatalogService<InMemoryTicketingStore>,
        /// Order lifecycle.
        pub orders: OrderService<InMemoryTicketingStore>,
        /// Door check-in.
        pub redemption: RedemptionService<InMemoryTicketingStore>,
        /// Sales statistics.
        pub stats: StatsService<InMemoryTicketingStore>,
    }

    impl TicketingHarness {
        /// Harness on the default test clock, seeded with
        /// [`fixtures::EVENT_ID`] and [`fixtures::BUYER_ID`].
        pub async fn new() -> Self {
            Self::with_clock(Arc::new(test_clock())).await
        }

        /// Harness on a custom clock, seeded like [`TicketingHarness::new`].
        ///
        /// # Panics
        ///
        /// Panics if the fixture signing secret is rejected.
        #[allow(clippy::expect_used)]
        pub async fn with_clock(clock: Arc<dyn Clock>) -> Self {
            let store = Arc::new(InMemoryTicketingStore::new(Arc::clone(&clock)));
            store.add_event(EVENT_ID, EVENT_TITLE).await;
            store.add_user(fixtures::purchaser(fixtures::BUYER_ID)).await;

            let secret = SigningSecret::new(fixtures::SIGNING_SECRET).expect("fixture secret is not blank");
            let env = TicketingEnvironment::new(Arc::clone(&store), clock, secret);
            Self {
                catalog: CatalogService::new(Arc::clone(&store)),
                orders: OrderService::new(env.clone()),
                redemption: RedemptionService::new(env.clone()),
                stats: StatsService::new(Arc::clone(&store)),
                store,
                env,
            }
        }

        /// Creates an active ticket product for the seeded event.
        ///
        /// # Panics
        ///
        /// Panics if the catalog rejects the input.
        #[allow(clippy::expect_used)]
        pub async fn ticket_product(
            &self,
            ticket_type: &str,
            price_cents: i64,
            inventory_limit: Option<i64>,
        ) -> TicketProduct {
            self.catalog
                .create_ticket_product(
                    fixtures::ADMIN_ID,
                    fixtures::ticket_input(ticket_type, price_cents, inventory_limit),
                )
                .await
                .expect("ticket product fixture")
        }

        /// Creates an active transfer product for the seeded event.
        ///
        /// # Panics
        ///
        /// Panics if the catalog rejects the input.
        #[allow(clippy::expect_used)]
        pub async fn transfer_product(
            &self,
            direction: &str,
            price_cents: i64,
            inventory_limit: Option<i64>,
        ) -> TransferProduct {
            self.catalog
                .create_transfer_product(
                    fixtures::ADMIN_ID,
                    fixtures::transfer_input(direction, price_cents, inventory_limit),
                )
                .await
                .expect("transfer product fixture")
        }

        /// Creates a global promo code.
        ///
        /// # Panics
        ///
        /// Panics if the catalog rejects the input.
        #[allow(clippy::expect_used)]
        pub async fn promo_code(&self, code: &str, discount_type: &str, value: i64) -> PromoCode {
            self.catalog
                .create_promo_code(fixtures::ADMIN_ID, fixtures::promo_input(code, discount_type, value))
                .await
                .expect("promo code fixture")
        }
    }
}

/// Installs a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; output goes through the test harness capture.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "boxoffice=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

pub use harness::TicketingHarness;
pub use mocks::{FailingDelivery, FixedClock, RecordingDelivery, SteppingClock, test_clock};
