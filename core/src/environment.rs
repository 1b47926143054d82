//! Injected dependencies.
//!
//! Services never call `Utc::now()` or read process configuration directly;
//! everything they depend on arrives through a [`TicketingEnvironment`].

use crate::qr::SigningSecret;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Clock trait - abstracts time operations for testability
///
/// # Examples
///
/// ```ignore
/// // Production - uses system clock
/// let clock = SystemClock;
///
/// // Test - fixed time for deterministic tests
/// let clock = boxoffice_testing::test_clock();
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Tunables for order creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPolicy {
    /// Currency recorded on every order.
    pub currency: String,
    /// Per-selection quantity cap applied before merging duplicates.
    pub max_quantity_per_product: u32,
    /// Nonce size for ticket tokens, in bytes.
    pub nonce_bytes: usize,
}

impl Default for OrderPolicy {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            max_quantity_per_product: 100,
            nonce_bytes: crate::qr::MIN_NONCE_BYTES,
        }
    }
}

/// Everything the order and redemption services need from the outside.
pub struct TicketingEnvironment<S> {
    /// Transactional store.
    pub store: Arc<S>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Ticket token key.
    pub signing_secret: SigningSecret,
    /// Order creation tunables.
    pub policy: OrderPolicy,
}

impl<S> TicketingEnvironment<S> {
    /// Creates an environment with the default [`OrderPolicy`].
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, signing_secret: SigningSecret) -> Self {
        Self {
            store,
            clock,
            signing_secret,
            policy: OrderPolicy::default(),
        }
    }

    /// Replaces the order policy.
    #[must_use]
    pub fn with_policy(mut self, policy: OrderPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl<S> Clone for TicketingEnvironment<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            signing_secret: self.signing_secret.clone(),
            policy: self.policy.clone(),
        }
    }
}
