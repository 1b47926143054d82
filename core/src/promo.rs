//! Promo engine.
//!
//! [`validate_promo`] is a pure function: it reads a rule and an order context
//! and returns a verdict. It never touches storage, the clock or randomness, so
//! the caller decides what "now" is and whether to consume the code.

use crate::types::{DiscountType, EventId, PromoCode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a promo rule rejected an order. Checked in declaration order; the first
/// failing check wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromoRejection {
    /// Subtotal is zero or negative.
    SubtotalTooLow,
    /// Rule is switched off.
    Inactive,
    /// `now` is before `active_from` or after `active_to`.
    OutOfWindow,
    /// `used_count` has reached `usage_limit`.
    UsageLimitReached,
    /// Rule is scoped to another event.
    EventNotAllowed,
    /// Discount type is neither `PERCENT` nor `FIXED`.
    UnsupportedDiscountType,
}

impl PromoRejection {
    /// Stable reason code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::SubtotalTooLow => "subtotal_too_low",
            Self::Inactive => "inactive",
            Self::OutOfWindow => "out_of_window",
            Self::UsageLimitReached => "usage_limit_reached",
            Self::EventNotAllowed => "event_not_allowed",
            Self::UnsupportedDiscountType => "unsupported_discount_type",
        }
    }
}

impl fmt::Display for PromoRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Why a promo code could not be applied, including lookup failures.
///
/// Serializes as its flat reason code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromoFailure {
    /// Blank code or non-positive subtotal on a lookup.
    InvalidInput,
    /// No code with that name.
    NotFound,
    /// The rule itself rejected the order.
    Rejected(PromoRejection),
}

impl PromoFailure {
    /// Stable reason code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::NotFound => "not_found",
            Self::Rejected(reason) => reason.code(),
        }
    }
}

impl fmt::Display for PromoFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl Serialize for PromoFailure {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl From<PromoRejection> for PromoFailure {
    fn from(reason: PromoRejection) -> Self {
        Self::Rejected(reason)
    }
}

/// The part of a promo code the engine looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromoRule {
    /// Discount computation.
    pub discount_type: DiscountType,
    /// Percentage or amount.
    pub value: i64,
    /// Optional usage cap. `Some(0)` is treated as no cap.
    pub usage_limit: Option<u32>,
    /// Current usage.
    pub used_count: u32,
    /// Inclusive window start.
    pub active_from: Option<DateTime<Utc>>,
    /// Inclusive window end.
    pub active_to: Option<DateTime<Utc>>,
    /// Event scope.
    pub event_id: Option<EventId>,
    /// Master switch.
    pub is_active: bool,
}

impl From<&PromoCode> for PromoRule {
    fn from(code: &PromoCode) -> Self {
        Self {
            discount_type: code.discount_type.clone(),
            value: code.value,
            usage_limit: code.usage_limit,
            used_count: code.used_count,
            active_from: code.active_from,
            active_to: code.active_to,
            event_id: code.event_id,
            is_active: code.is_active,
        }
    }
}

/// The order a rule is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromoContext {
    /// Evaluation time.
    pub now: DateTime<Utc>,
    /// Event being purchased.
    pub event_id: EventId,
    /// Order subtotal in minor units.
    pub subtotal_cents: i64,
}

/// Verdict of [`validate_promo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoValidation {
    /// Whether the code applies.
    pub valid: bool,
    /// Discount, `0` when invalid.
    pub discount_cents: i64,
    /// `subtotal - discount`; the unchanged subtotal when invalid.
    pub total_cents: i64,
    /// Set exactly when `valid` is false.
    pub reason: Option<PromoRejection>,
}

impl PromoValidation {
    fn accepted(subtotal_cents: i64, discount_cents: i64) -> Self {
        let discount_cents = discount_cents.clamp(0, subtotal_cents);
        Self {
            valid: true,
            discount_cents,
            total_cents: subtotal_cents - discount_cents,
            reason: None,
        }
    }

    fn rejected(subtotal_cents: i64, reason: PromoRejection) -> Self {
        Self {
            valid: false,
            discount_cents: 0,
            total_cents: subtotal_cents.max(0),
            reason: Some(reason),
        }
    }

    /// Converts the verdict into a `Result` carrying the discount.
    ///
    /// # Errors
    ///
    /// Returns the rejection reason when the rule did not apply.
    pub fn into_result(self) -> Result<i64, PromoRejection> {
        match self.reason {
            None => Ok(self.discount_cents),
            Some(reason) => Err(reason),
        }
    }
}

/// Evaluates a promo rule against an order context.
#[must_use]
pub fn validate_promo(rule: &PromoRule, ctx: &PromoContext) -> PromoValidation {
    let subtotal = ctx.subtotal_cents;
    match check(rule, ctx) {
        Ok(discount) => PromoValidation::accepted(subtotal, discount),
        Err(reason) => PromoValidation::rejected(subtotal, reason),
    }
}

fn check(rule: &PromoRule, ctx: &PromoContext) -> Result<i64, PromoRejection> {
    if ctx.subtotal_cents <= 0 {
        return Err(PromoRejection::SubtotalTooLow);
    }
    if !rule.is_active {
        return Err(PromoRejection::Inactive);
    }
    if rule.active_from.is_some_and(|from| ctx.now < from)
        || rule.active_to.is_some_and(|to| ctx.now > to)
    {
        return Err(PromoRejection::OutOfWindow);
    }
    if let Some(limit) = rule.usage_limit {
        if limit > 0 && rule.used_count >= limit {
            return Err(PromoRejection::UsageLimitReached);
        }
    }
    if let Some(scope) = rule.event_id {
        if scope.is_valid() && scope != ctx.event_id {
            return Err(PromoRejection::EventNotAllowed);
        }
    }
    discount_for(&rule.discount_type, rule.value, ctx.subtotal_cents)
}

fn discount_for(kind: &DiscountType, value: i64, subtotal: i64) -> Result<i64, PromoRejection> {
    match kind {
        DiscountType::Percent if value <= 0 => Ok(0),
        DiscountType::Percent => Ok(subtotal.saturating_mul(value.min(100)) / 100),
        DiscountType::Fixed => Ok(value.clamp(0, subtotal)),
        DiscountType::Other(_) => Err(PromoRejection::UnsupportedDiscountType),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn summer20() -> PromoRule {
        PromoRule {
            discount_type: DiscountType::Percent,
            value: 20,
            usage_limit: Some(10),
            used_count: 2,
            active_from: None,
            active_to: None,
            event_id: Some(EventId::new(42)),
            is_active: true,
        }
    }

    fn ctx(subtotal_cents: i64) -> PromoContext {
        PromoContext {
            now: now(),
            event_id: EventId::new(42),
            subtotal_cents,
        }
    }

    #[test]
    fn percent_discount_applies() {
        let result = validate_promo(&summer20(), &ctx(10_000));
        assert!(result.valid);
        assert_eq!(result.discount_cents, 2_000);
        assert_eq!(result.total_cents, 8_000);
        assert_eq!(result.reason, None);
    }

    #[test]
    fn future_window_is_rejected() {
        let rule = PromoRule {
            active_from: Some(now() + Duration::hours(24)),
            ..summer20()
        };
        let result = validate_promo(&rule, &ctx(10_000));
        assert!(!result.valid);
        assert_eq!(result.reason, Some(PromoRejection::OutOfWindow));
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let rule = PromoRule {
            active_from: Some(now()),
            active_to: Some(now()),
            ..summer20()
        };
        assert!(validate_promo(&rule, &ctx(10_000)).valid);
    }

    #[test]
    fn exhausted_code_is_rejected() {
        let rule = PromoRule {
            usage_limit: Some(1),
            used_count: 1,
            ..summer20()
        };
        assert_eq!(
            validate_promo(&rule, &ctx(10_000)).reason,
            Some(PromoRejection::UsageLimitReached)
        );
    }

    #[test]
    fn subtotal_is_checked_first() {
        let rule = PromoRule {
            is_active: false,
            ..summer20()
        };
        assert_eq!(validate_promo(&rule, &ctx(0)).reason, Some(PromoRejection::SubtotalTooLow));
        assert_eq!(validate_promo(&rule, &ctx(100)).reason, Some(PromoRejection::Inactive));
    }

    #[test]
    fn event_scope_is_enforced_and_global_codes_apply_anywhere() {
        let scoped = PromoRule {
            event_id: Some(EventId::new(7)),
            ..summer20()
        };
        assert_eq!(
            validate_promo(&scoped, &ctx(10_000)).reason,
            Some(PromoRejection::EventNotAllowed)
        );

        let global = PromoRule {
            event_id: None,
            ..summer20()
        };
        assert!(validate_promo(&global, &ctx(10_000)).valid);
    }

    #[test]
    fn fixed_discount_is_clamped_to_subtotal() {
        let rule = PromoRule {
            discount_type: DiscountType::Fixed,
            value: 50_000,
            ..summer20()
        };
        let result = validate_promo(&rule, &ctx(10_000));
        assert!(result.valid);
        assert_eq!(result.discount_cents, 10_000);
        assert_eq!(result.total_cents, 0);
    }

    #[test]
    fn percent_is_clamped_to_one_hundred_and_floored() {
        let over = PromoRule {
            value: 150,
            ..summer20()
        };
        assert_eq!(validate_promo(&over, &ctx(999)).discount_cents, 999);

        let third = PromoRule {
            value: 33,
            ..summer20()
        };
        assert_eq!(validate_promo(&third, &ctx(1_001)).discount_cents, 330);
    }

    #[test]
    fn unknown_discount_type_is_unsupported() {
        let rule = PromoRule {
            discount_type: DiscountType::Other("BOGO".to_string()),
            ..summer20()
        };
        let result = validate_promo(&rule, &ctx(10_000));
        assert!(!result.valid);
        assert_eq!(result.reason, Some(PromoRejection::UnsupportedDiscountType));
        assert_eq!(result.into_result(), Err(PromoRejection::UnsupportedDiscountType));
    }

    fn arb_rule() -> impl Strategy<Value = PromoRule> {
        (
            prop_oneof![
                Just(DiscountType::Percent),
                Just(DiscountType::Fixed),
                Just(DiscountType::Other("X".to_string())),
            ],
            -50i64..20_000,
            proptest::option::of(0u32..5),
            0u32..6,
            proptest::option::of(-48i64..48),
            proptest::option::of(-48i64..48),
            proptest::option::of(40i64..45),
            any::<bool>(),
        )
            .prop_map(|(discount_type, value, usage_limit, used_count, from, to, event, is_active)| {
                PromoRule {
                    discount_type,
                    value,
                    usage_limit,
                    used_count,
                    active_from: from.map(|h| now() + Duration::hours(h)),
                    active_to: to.map(|h| now() + Duration::hours(h)),
                    event_id: event.map(EventId::new),
                    is_active,
                }
            })
    }

    proptest! {
        #[test]
        fn validation_is_deterministic(rule in arb_rule(), subtotal in -100i64..100_000) {
            let first = validate_promo(&rule, &ctx(subtotal));
            let second = validate_promo(&rule, &ctx(subtotal));
            prop_assert_eq!(first, second);
        }

        #[test]
        fn verdict_is_consistent(rule in arb_rule(), subtotal in -100i64..100_000) {
            let result = validate_promo(&rule, &ctx(subtotal));
            prop_assert_eq!(result.valid, result.reason.is_none());
            prop_assert!(result.discount_cents >= 0);
            if result.valid {
                prop_assert!(result.discount_cents <= subtotal);
                prop_assert_eq!(result.total_cents, subtotal - result.discount_cents);
            } else {
                prop_assert_eq!(result.discount_cents, 0);
            }
        }
    }
}
