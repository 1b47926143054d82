//! Product catalog.
//!
//! Ticket products, transfer products and promo codes are plain records
//! scoped to an event. The catalog normalises input (upper-cased enum-like
//! fields, default `is_active`, non-positive limits meaning "no limit") and
//! otherwise passes straight through to the [`CatalogStore`].

use crate::error::{Result, TicketingError};
use crate::promo::{PromoFailure, PromoRejection};
use crate::store::CatalogStore;
use crate::types::{
    DiscountType, EventId, Meta, ProductId, PromoCode, PromoCodeId, TicketProduct, TicketType,
    TransferDirection, TransferProduct, UserId, normalize_token,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Listing filter shared by products and promo codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductFilter {
    /// Restrict to one event.
    pub event_id: Option<EventId>,
    /// Restrict by active flag.
    pub active: Option<bool>,
}

impl ProductFilter {
    /// Active products of one event.
    #[must_use]
    pub const fn purchasable(event_id: EventId) -> Self {
        Self {
            event_id: Some(event_id),
            active: Some(true),
        }
    }
}

/// Largest limit a store keeps; limits are `INTEGER` columns.
pub const MAX_LIMIT: u32 = i32::MAX.unsigned_abs();

/// Converts a raw limit: non-positive means "no limit", larger values are
/// capped at [`MAX_LIMIT`].
#[must_use]
pub fn limit_from_input(raw: Option<i64>) -> Option<u32> {
    raw.filter(|limit| *limit > 0)
        .map(|limit| u32::try_from(limit).map_or(MAX_LIMIT, |l| l.min(MAX_LIMIT)))
}

/// How a patch changes an optional limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LimitUpdate {
    /// Leave the limit alone.
    #[default]
    Keep,
    /// Remove the limit.
    Clear,
    /// Set a new limit.
    Set(u32),
}

impl LimitUpdate {
    /// Patch semantics for a raw limit: absent keeps, non-positive clears.
    #[must_use]
    pub fn from_input(raw: Option<i64>) -> Self {
        match raw {
            None => Self::Keep,
            Some(_) => limit_from_input(raw).map_or(Self::Clear, Self::Set),
        }
    }

    /// Applies the update to a current limit.
    #[must_use]
    pub const fn apply(self, current: Option<u32>) -> Option<u32> {
        match self {
            Self::Keep => current,
            Self::Clear => None,
            Self::Set(limit) => Some(limit),
        }
    }
}

/// Caller input for a new ticket product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketProductInput {
    /// Event.
    pub event_id: EventId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Tier, any case.
    #[serde(rename = "type")]
    pub ticket_type: String,
    /// Unit price.
    pub price_cents: i64,
    /// Cap; non-positive means none.
    pub inventory_limit: Option<i64>,
    /// Defaults to `true`.
    pub is_active: Option<bool>,
}

/// A validated ticket product ready to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketProductDraft {
    /// Event.
    pub event_id: EventId,
    /// Display name.
    pub name: String,
    /// Tier.
    pub ticket_type: TicketType,
    /// Unit price.
    pub price_cents: i64,
    /// Cap.
    pub inventory_limit: Option<u32>,
    /// Active flag.
    pub is_active: bool,
    /// Creating operator.
    pub created_by: Option<UserId>,
}

impl TicketProductInput {
    /// Validates and normalises the input.
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::InvalidProduct`] for an unknown tier, a
    /// non-positive event or a negative price.
    pub fn into_draft(self, created_by: Option<UserId>) -> Result<TicketProductDraft> {
        let ticket_type = TicketType::parse(&self.ticket_type).ok_or_else(|| {
            TicketingError::invalid_product(format!("unknown ticket type {:?}", self.ticket_type))
        })?;
        check_event(self.event_id)?;
        check_price(self.price_cents)?;
        Ok(TicketProductDraft {
            event_id: self.event_id,
            name: self.name.trim().to_string(),
            ticket_type,
            price_cents: self.price_cents,
            inventory_limit: limit_from_input(self.inventory_limit),
            is_active: self.is_active.unwrap_or(true),
            created_by,
        })
    }
}

/// Partial update of a ticket product. Unset fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketProductPatch {
    /// New name.
    pub name: Option<String>,
    /// New unit price.
    pub price_cents: Option<i64>,
    /// Limit change.
    pub inventory_limit: LimitUpdate,
    /// New active flag.
    pub is_active: Option<bool>,
}

/// Caller input for a new transfer product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProductInput {
    /// Event.
    pub event_id: EventId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Direction, any case.
    pub direction: String,
    /// Unit price.
    pub price_cents: i64,
    /// Route details.
    #[serde(default)]
    pub info: Meta,
    /// Cap; non-positive means none.
    pub inventory_limit: Option<i64>,
    /// Defaults to `true`.
    pub is_active: Option<bool>,
}

/// A validated transfer product ready to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferProductDraft {
    /// Event.
    pub event_id: EventId,
    /// Display name.
    pub name: String,
    /// Direction.
    pub direction: TransferDirection,
    /// Unit price.
    pub price_cents: i64,
    /// Route details.
    pub info: Meta,
    /// Cap.
    pub inventory_limit: Option<u32>,
    /// Active flag.
    pub is_active: bool,
    /// Creating operator.
    pub created_by: Option<UserId>,
}

impl TransferProductInput {
    /// Validates and normalises the input.
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::InvalidProduct`] for an unknown direction, a
    /// non-positive event or a negative price.
    pub fn into_draft(self, created_by: Option<UserId>) -> Result<TransferProductDraft> {
        let direction = TransferDirection::parse(&self.direction).ok_or_else(|| {
            TicketingError::invalid_product(format!("unknown transfer direction {:?}", self.direction))
        })?;
        check_event(self.event_id)?;
        check_price(self.price_cents)?;
        Ok(TransferProductDraft {
            event_id: self.event_id,
            name: self.name.trim().to_string(),
            direction,
            price_cents: self.price_cents,
            info: self.info,
            inventory_limit: limit_from_input(self.inventory_limit),
            is_active: self.is_active.unwrap_or(true),
            created_by,
        })
    }
}

/// Partial update of a transfer product. Unset fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferProductPatch {
    /// New name.
    pub name: Option<String>,
    /// New unit price.
    pub price_cents: Option<i64>,
    /// Replacement route details.
    pub info: Option<Meta>,
    /// Limit change.
    pub inventory_limit: LimitUpdate,
    /// New active flag.
    pub is_active: Option<bool>,
}

/// Caller input for a new promo code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoCodeInput {
    /// Code, any case.
    pub code: String,
    /// `PERCENT` or `FIXED`, any case.
    pub discount_type: String,
    /// Percentage or amount.
    pub value: i64,
    /// Cap; non-positive means none.
    pub usage_limit: Option<i64>,
    /// Window start.
    pub active_from: Option<DateTime<Utc>>,
    /// Window end.
    pub active_to: Option<DateTime<Utc>>,
    /// Scope; `None` or non-positive means global.
    pub event_id: Option<EventId>,
    /// Defaults to `true`.
    pub is_active: Option<bool>,
}

/// A validated promo code ready to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromoCodeDraft {
    /// Upper-cased code.
    pub code: String,
    /// Discount computation.
    pub discount_type: DiscountType,
    /// Percentage or amount.
    pub value: i64,
    /// Cap.
    pub usage_limit: Option<u32>,
    /// Window start.
    pub active_from: Option<DateTime<Utc>>,
    /// Window end.
    pub active_to: Option<DateTime<Utc>>,
    /// Scope.
    pub event_id: Option<EventId>,
    /// Active flag.
    pub is_active: bool,
    /// Creating operator.
    pub created_by: Option<UserId>,
}

impl PromoCodeInput {
    /// Validates and normalises the input.
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::PromoInvalid`] for a blank code, an inverted
    /// window or an unsupported discount type.
    pub fn into_draft(self, created_by: Option<UserId>) -> Result<PromoCodeDraft> {
        let code = normalize_token(&self.code);
        if code.is_empty() {
            return Err(TicketingError::PromoInvalid(PromoFailure::InvalidInput));
        }
        let discount_type = supported_discount(DiscountType::parse(&self.discount_type))?;
        check_window(self.active_from, self.active_to)?;
        Ok(PromoCodeDraft {
            code,
            discount_type,
            value: self.value,
            usage_limit: limit_from_input(self.usage_limit),
            active_from: self.active_from,
            active_to: self.active_to,
            event_id: self.event_id.filter(EventId::is_valid),
            is_active: self.is_active.unwrap_or(true),
            created_by,
        })
    }
}

/// Partial update of a promo code. Unset fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromoCodePatch {
    /// New discount type.
    pub discount_type: Option<DiscountType>,
    /// New value.
    pub value: Option<i64>,
    /// Limit change.
    pub usage_limit: LimitUpdate,
    /// New window start.
    pub active_from: Option<DateTime<Utc>>,
    /// New window end.
    pub active_to: Option<DateTime<Utc>>,
    /// New scope.
    pub event_id: Option<EventId>,
    /// New active flag.
    pub is_active: Option<bool>,
}

/// Active products of one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasableProducts {
    /// Ticket tiers.
    pub tickets: Vec<TicketProduct>,
    /// Transport add-ons.
    pub transfers: Vec<TransferProduct>,
}

fn check_event(event_id: EventId) -> Result<()> {
    if event_id.is_valid() {
        Ok(())
    } else {
        Err(TicketingError::invalid_product("event id must be positive"))
    }
}

fn check_price(price_cents: i64) -> Result<()> {
    if price_cents < 0 {
        Err(TicketingError::invalid_product("price must not be negative"))
    } else {
        Ok(())
    }
}

fn check_window(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Result<()> {
    match (from, to) {
        (Some(from), Some(to)) if from > to => {
            Err(TicketingError::PromoInvalid(PromoFailure::InvalidInput))
        }
        _ => Ok(()),
    }
}

fn supported_discount(discount_type: DiscountType) -> Result<DiscountType> {
    match discount_type {
        DiscountType::Other(_) => Err(TicketingError::PromoInvalid(PromoFailure::Rejected(
            PromoRejection::UnsupportedDiscountType,
        ))),
        supported => Ok(supported),
    }
}

/// Catalog administration.
pub struct CatalogService<S> {
    store: Arc<S>,
}

impl<S: CatalogStore> CatalogService<S> {
    /// Creates the service.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Lists ticket products.
    ///
    /// # Errors
    ///
    /// Returns a store error on failure.
    pub async fn list_ticket_products(&self, filter: ProductFilter) -> Result<Vec<TicketProduct>> {
        Ok(self.store.list_ticket_products(&filter).await?)
    }

    /// Creates a ticket product.
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::InvalidProduct`] for bad input.
    pub async fn create_ticket_product(
        &self,
        created_by: UserId,
        input: TicketProductInput,
    ) -> Result<TicketProduct> {
        let draft = input.into_draft(Some(created_by))?;
        let product = self.store.create_ticket_product(&draft).await?;
        tracing::info!(product_id = %product.id, event_id = %product.event_id, "ticket product created");
        Ok(product)
    }

    /// Updates a ticket product.
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::ProductNotFound`] if it does not exist.
    pub async fn update_ticket_product(
        &self,
        id: ProductId,
        patch: TicketProductPatch,
    ) -> Result<TicketProduct> {
        if let Some(price) = patch.price_cents {
            check_price(price)?;
        }
        self.store
            .update_ticket_product(id, &patch)
            .await?
            .ok_or(TicketingError::ProductNotFound(id))
    }

    /// Deletes a ticket product.
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::ProductNotFound`] if it does not exist.
    pub async fn delete_ticket_product(&self, id: ProductId) -> Result<()> {
        if self.store.delete_ticket_product(id).await? {
            tracing::info!(product_id = %id, "ticket product deleted");
            Ok(())
        } else {
            Err(TicketingError::ProductNotFound(id))
        }
    }

    /// Lists transfer products.
    ///
    /// # Errors
    ///
    /// Returns a store error on failure.
    pub async fn list_transfer_products(
        &self,
        filter: ProductFilter,
    ) -> Result<Vec<TransferProduct>> {
        Ok(self.store.list_transfer_products(&filter).await?)
    }

    /// Creates a transfer product.
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::InvalidProduct`] for bad input.
    pub async fn create_transfer_product(
        &self,
        created_by: UserId,
        input: TransferProductInput,
    ) -> Result<TransferProduct> {
        let draft = input.into_draft(Some(created_by))?;
        let product = self.store.create_transfer_product(&draft).await?;
        tracing::info!(product_id = %product.id, event_id = %product.event_id, "transfer product created");
        Ok(product)
    }

    /// Updates a transfer product.
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::ProductNotFound`] if it does not exist.
    pub async fn update_transfer_product(
        &self,
        id: ProductId,
        patch: TransferProductPatch,
    ) -> Result<TransferProduct> {
        if let Some(price) = patch.price_cents {
            check_price(price)?;
        }
        self.store
            .update_transfer_product(id, &patch)
            .await?
            .ok_or(TicketingError::ProductNotFound(id))
    }

    /// Deletes a transfer product.
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::ProductNotFound`] if it does not exist.
    pub async fn delete_transfer_product(&self, id: ProductId) -> Result<()> {
        if self.store.delete_transfer_product(id).await? {
            tracing::info!(product_id = %id, "transfer product deleted");
            Ok(())
        } else {
            Err(TicketingError::ProductNotFound(id))
        }
    }

    /// Lists promo codes. An event filter includes global codes.
    ///
    /// # Errors
    ///
    /// Returns a store error on failure.
    pub async fn list_promo_codes(&self, filter: ProductFilter) -> Result<Vec<PromoCode>> {
        Ok(self.store.list_promo_codes(&filter).await?)
    }

    /// Creates a promo code.
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::PromoInvalid`] for bad input.
    pub async fn create_promo_code(
        &self,
        created_by: UserId,
        input: PromoCodeInput,
    ) -> Result<PromoCode> {
        let draft = input.into_draft(Some(created_by))?;
        let promo = self.store.create_promo_code(&draft).await?;
        tracing::info!(promo_code_id = %promo.id, code = %promo.code, "promo code created");
        Ok(promo)
    }

    /// Updates a promo code.
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::PromoCodeNotFound`] if it does not exist, or
    /// [`TicketingError::PromoInvalid`] for an unsupported discount type or an
    /// inverted window.
    pub async fn update_promo_code(
        &self,
        id: PromoCodeId,
        patch: PromoCodePatch,
    ) -> Result<PromoCode> {
        if let Some(discount_type) = &patch.discount_type {
            supported_discount(discount_type.clone())?;
        }
        check_window(patch.active_from, patch.active_to)?;
        self.store
            .update_promo_code(id, &patch)
            .await?
            .ok_or(TicketingError::PromoCodeNotFound(id))
    }

    /// Deletes a promo code.
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::PromoCodeNotFound`] if it does not exist.
    pub async fn delete_promo_code(&self, id: PromoCodeId) -> Result<()> {
        if self.store.delete_promo_code(id).await? {
            tracing::info!(promo_code_id = %id, "promo code deleted");
            Ok(())
        } else {
            Err(TicketingError::PromoCodeNotFound(id))
        }
    }

    /// Active ticket and transfer products of an event.
    ///
    /// # Errors
    ///
    /// Returns a store error on failure.
    pub async fn purchasable_products(&self, event_id: EventId) -> Result<PurchasableProducts> {
        let filter = ProductFilter::purchasable(event_id);
        let tickets = self.store.list_ticket_products(&filter).await?;
        let transfers = self.store.list_transfer_products(&filter).await?;
        Ok(PurchasableProducts { tickets, transfers })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;

    fn ticket_input() -> TicketProductInput {
        TicketProductInput {
            event_id: EventId::new(1),
            name: "  Early bird ".to_string(),
            ticket_type: " group2".to_string(),
            price_cents: 2_500,
            inventory_limit: Some(0),
            is_active: None,
        }
    }

    #[test]
    fn ticket_input_is_normalized() {
        let draft = ticket_input().into_draft(None).unwrap();
        assert_eq!(draft.ticket_type, TicketType::Group2);
        assert_eq!(draft.name, "Early bird");
        assert_eq!(draft.inventory_limit, None);
        assert!(draft.is_active);
    }

    #[test]
    fn unknown_ticket_type_is_rejected() {
        let input = TicketProductInput {
            ticket_type: "VIP".to_string(),
            ..ticket_input()
        };
        assert!(matches!(input.into_draft(None), Err(TicketingError::InvalidProduct(_))));
    }

    #[test]
    fn transfer_direction_is_upper_cased() {
        let input = TransferProductInput {
            event_id: EventId::new(1),
            name: "Bus".to_string(),
            direction: "roundtrip".to_string(),
            price_cents: 900,
            info: Meta::new(),
            inventory_limit: Some(-3),
            is_active: Some(false),
        };
        let draft = input.into_draft(None).unwrap();
        assert_eq!(draft.direction, TransferDirection::Roundtrip);
        assert_eq!(draft.inventory_limit, None);
        assert!(!draft.is_active);
    }

    #[test]
    fn promo_input_is_normalized() {
        let input = PromoCodeInput {
            code: " summer20 ".to_string(),
            discount_type: "percent".to_string(),
            value: 20,
            usage_limit: Some(10),
            active_from: None,
            active_to: None,
            event_id: Some(EventId::new(0)),
            is_active: None,
        };
        let draft = input.into_draft(None).unwrap();
        assert_eq!(draft.code, "SUMMER20");
        assert_eq!(draft.discount_type, DiscountType::Percent);
        assert_eq!(draft.usage_limit, Some(10));
        assert_eq!(draft.event_id, None);
    }

    #[test]
    fn blank_promo_code_is_invalid_input() {
        let input = PromoCodeInput {
            code: "   ".to_string(),
            discount_type: "FIXED".to_string(),
            value: 100,
            usage_limit: None,
            active_from: None,
            active_to: None,
            event_id: None,
            is_active: None,
        };
        assert!(matches!(
            input.into_draft(None),
            Err(TicketingError::PromoInvalid(PromoFailure::InvalidInput))
        ));
    }

    #[test]
    fn limit_patches_keep_clear_or_set() {
        assert_eq!(LimitUpdate::from_input(None), LimitUpdate::Keep);
        assert_eq!(LimitUpdate::from_input(Some(0)), LimitUpdate::Clear);
        assert_eq!(LimitUpdate::from_input(Some(5)), LimitUpdate::Set(5));
        assert_eq!(
            LimitUpdate::from_input(Some(i64::MAX)),
            LimitUpdate::Set(MAX_LIMIT)
        );
        assert_eq!(limit_from_input(Some(3_000_000_000)), Some(MAX_LIMIT));
        assert_eq!(MAX_LIMIT, 2_147_483_647);
        assert_eq!(LimitUpdate::Keep.apply(Some(3)), Some(3));
        assert_eq!(LimitUpdate::Clear.apply(Some(3)), None);
        assert_eq!(LimitUpdate::Set(9).apply(None), Some(9));
    }
}
