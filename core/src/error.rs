//! Error types for ticketing operations.

use crate::promo::PromoFailure;
use crate::qr::QrError;
use crate::store::StoreError;
use crate::types::{OrderId, OrderStatus, ProductId, PromoCodeId, TicketId};
use thiserror::Error;

/// Result type alias for ticketing operations.
pub type Result<T> = std::result::Result<T, TicketingError>;

/// Which check rejected a presented ticket token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrMismatch {
    /// Token shape, encoding or claims are invalid.
    Malformed(String),
    /// Signature does not match.
    Signature,
    /// A claim disagrees with the stored ticket.
    Field(&'static str),
    /// Token differs from the one issued for this ticket.
    Hash,
}

impl std::fmt::Display for QrMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(detail) => write!(f, "malformed token ({detail})"),
            Self::Signature => f.write_str("bad signature"),
            Self::Field(field) => write!(f, "{field} does not match"),
            Self::Hash => f.write_str("token was not issued for this ticket"),
        }
    }
}

impl From<QrError> for QrMismatch {
    fn from(err: QrError) -> Self {
        match err {
            QrError::BadSignature => Self::Signature,
            other => Self::Malformed(other.to_string()),
        }
    }
}

/// How a caller should surface an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad request.
    InvalidInput,
    /// Missing entity.
    NotFound,
    /// Illegal transition or lost race.
    Conflict,
    /// Storage or encoding failure.
    Internal,
}

impl ErrorClass {
    /// Conventional HTTP status for this class.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::InvalidInput => 400,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::Internal => 500,
        }
    }
}

/// Error taxonomy for the ticketing core.
///
/// Every variant except [`TicketingError::Store`] and
/// [`TicketingError::Signing`] is an expected business outcome; all of them
/// abort the enclosing transaction.
#[derive(Debug, Error)]
pub enum TicketingError {
    // ═══════════════════════════════════════════════════════════
    // Input errors
    // ═══════════════════════════════════════════════════════════
    /// Unknown, inactive or mis-scoped product, bad payment method, or an
    /// empty selection.
    #[error("invalid product: {0}")]
    InvalidProduct(String),

    /// Promo code could not be applied.
    #[error("promo code rejected: {0}")]
    PromoInvalid(PromoFailure),

    /// Presented ticket token does not authenticate this ticket.
    #[error("ticket QR mismatch: {0}")]
    TicketQrMismatch(QrMismatch),

    // ═══════════════════════════════════════════════════════════
    // Lookup errors
    // ═══════════════════════════════════════════════════════════
    /// Order does not exist.
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// Ticket does not exist.
    #[error("ticket not found: {0}")]
    TicketNotFound(TicketId),

    /// Catalog product does not exist.
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    /// Promo code does not exist.
    #[error("promo code not found: {0}")]
    PromoCodeNotFound(PromoCodeId),

    // ═══════════════════════════════════════════════════════════
    // State conflicts
    // ═══════════════════════════════════════════════════════════
    /// Transition is illegal from the current status.
    #[error("order state {status} does not allow this operation")]
    OrderStateNotAllowed {
        /// Status observed under lock.
        status: OrderStatus,
    },

    /// Confirmation would push a product past its inventory limit.
    #[error("inventory limit reached for product {product_id}")]
    InventoryLimitReached {
        /// Exhausted product.
        product_id: ProductId,
    },

    /// Ticket was already checked in.
    #[error("ticket already redeemed: {0}")]
    TicketAlreadyRedeemed(TicketId),

    // ═══════════════════════════════════════════════════════════
    // Internal errors
    // ═══════════════════════════════════════════════════════════
    /// Ticket token could not be produced.
    #[error("ticket signing failed: {0}")]
    Signing(#[from] QrError),

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TicketingError {
    /// Stable snake_case error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidProduct(_) => "invalid_product",
            Self::PromoInvalid(_) => "promo_invalid",
            Self::TicketQrMismatch(_) => "ticket_qr_mismatch",
            Self::OrderNotFound(_) => "order_not_found",
            Self::TicketNotFound(_) => "ticket_not_found",
            Self::ProductNotFound(_) => "product_not_found",
            Self::PromoCodeNotFound(_) => "promo_code_not_found",
            Self::OrderStateNotAllowed { .. } => "order_state_not_allowed",
            Self::InventoryLimitReached { .. } => "inventory_limit_reached",
            Self::TicketAlreadyRedeemed(_) => "ticket_already_redeemed",
            Self::Signing(_) | Self::Store(_) => "internal",
        }
    }

    /// Classification used to pick a response.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidProduct(_) | Self::PromoInvalid(_) | Self::TicketQrMismatch(_) => {
                ErrorClass::InvalidInput
            }
            Self::OrderNotFound(_)
            | Self::TicketNotFound(_)
            | Self::ProductNotFound(_)
            | Self::PromoCodeNotFound(_) => ErrorClass::NotFound,
            Self::OrderStateNotAllowed { .. }
            | Self::InventoryLimitReached { .. }
            | Self::TicketAlreadyRedeemed(_) => ErrorClass::Conflict,
            Self::Signing(_) | Self::Store(_) => ErrorClass::Internal,
        }
    }

    /// Returns `true` for expected business outcomes, `false` for failures
    /// that should be logged and investigated.
    #[must_use]
    pub const fn is_business_error(&self) -> bool {
        !matches!(self.class(), ErrorClass::Internal)
    }

    pub(crate) fn invalid_product(detail: impl Into<String>) -> Self {
        Self::InvalidProduct(detail.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promo::PromoRejection;

    #[test]
    fn codes_and_classes_line_up() {
        let cases = [
            (TicketingError::invalid_product("x"), "invalid_product", 400),
            (
                TicketingError::PromoInvalid(PromoFailure::Rejected(PromoRejection::Inactive)),
                "promo_invalid",
                400,
            ),
            (TicketingError::TicketQrMismatch(QrMismatch::Hash), "ticket_qr_mismatch", 400),
            (TicketingError::OrderNotFound(OrderId::new()), "order_not_found", 404),
            (TicketingError::TicketNotFound(TicketId::new()), "ticket_not_found", 404),
            (
                TicketingError::OrderStateNotAllowed {
                    status: OrderStatus::Canceled,
                },
                "order_state_not_allowed",
                409,
            ),
            (
                TicketingError::InventoryLimitReached {
                    product_id: ProductId::new(),
                },
                "inventory_limit_reached",
                409,
            ),
            (
                TicketingError::TicketAlreadyRedeemed(TicketId::new()),
                "ticket_already_redeemed",
                409,
            ),
            (
                TicketingError::Store(StoreError::Database("down".to_string())),
                "internal",
                500,
            ),
        ];

        for (error, code, status) in cases {
            assert_eq!(error.code(), code);
            assert_eq!(error.class().http_status(), status);
        }
    }

    #[test]
    fn bad_signature_is_kept_distinct() {
        assert_eq!(QrMismatch::from(QrError::BadSignature), QrMismatch::Signature);
        assert!(matches!(
            QrMismatch::from(QrError::Malformed("x".to_string())),
            QrMismatch::Malformed(_)
        ));
    }
}
