//! Catalog administration: ticket products, transfer products, promo codes.

use crate::PostgresTicketingStore;
use crate::rows::{
    self, PROMO_CODE_COLUMNS, TICKET_PRODUCT_COLUMNS, TRANSFER_PRODUCT_COLUMNS, db, limit_param,
};
use async_trait::async_trait;
use boxoffice_core::catalog::{
    LimitUpdate, ProductFilter, PromoCodeDraft, PromoCodePatch, TicketProductDraft,
    TicketProductPatch, TransferProductDraft, TransferProductPatch,
};
use boxoffice_core::store::{CatalogStore, StoreError};
use boxoffice_core::types::{ProductId, PromoCode, PromoCodeId, TicketProduct, TransferProduct};
use serde_json::Value;

/// `(change?, new value)` pair for a `CASE WHEN $n THEN $m ELSE col END` update.
fn limit_change(update: LimitUpdate) -> (bool, Option<i32>) {
    match update {
        LimitUpdate::Keep => (false, None),
        LimitUpdate::Clear => (true, None),
        LimitUpdate::Set(limit) => (true, limit_param(Some(limit))),
    }
}

fn unique_code(err: sqlx::Error, code: &str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StoreError::Database(format!("promo code {code} already exists"));
        }
    }
    db(err)
}

#[async_trait]
impl CatalogStore for PostgresTicketingStore {
    async fn list_ticket_products(
        &self,
        filter: &ProductFilter,
    ) -> Result<Vec<TicketProduct>, StoreError> {
        sqlx::query(&format!(
            "SELECT {TICKET_PRODUCT_COLUMNS} FROM ticket_products \
             WHERE ($1::bigint IS NULL OR event_id = $1) AND ($2::boolean IS NULL OR is_active = $2) \
             ORDER BY created_at DESC, id"
        ))
        .bind(filter.event_id.map(|id| id.get()))
        .bind(filter.active)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?
        .iter()
        .map(rows::ticket_product)
        .collect()
    }

    async fn create_ticket_product(
        &self,
        draft: &TicketProductDraft,
    ) -> Result<TicketProduct, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO ticket_products \
             (id, event_id, name, type, price_cents, inventory_limit, is_active, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {TICKET_PRODUCT_COLUMNS}"
        ))
        .bind(ProductId::new().as_uuid())
        .bind(draft.event_id.get())
        .bind(&draft.name)
        .bind(draft.ticket_type.as_str())
        .bind(draft.price_cents)
        .bind(limit_param(draft.inventory_limit))
        .bind(draft.is_active)
        .bind(draft.created_by.map(|id| id.get()))
        .fetch_one(&self.pool)
        .await
        .map_err(db)?;
        rows::ticket_product(&row)
    }

    async fn update_ticket_product(
        &self,
        id: ProductId,
        patch: &TicketProductPatch,
    ) -> Result<Option<TicketProduct>, StoreError> {
        let (limit_changed, limit) = limit_change(patch.inventory_limit);
        sqlx::query(&format!(
            "UPDATE ticket_products SET \
                name = COALESCE($2, name), \
                price_cents = COALESCE($3, price_cents), \
                inventory_limit = CASE WHEN $4 THEN $5 ELSE inventory_limit END, \
                is_active = COALESCE($6, is_active), \
                updated_at = now() \
             WHERE id = $1 RETURNING {TICKET_PRODUCT_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(patch.name.as_deref().map(str::trim))
        .bind(patch.price_cents)
        .bind(limit_changed)
        .bind(limit)
        .bind(patch.is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?
        .as_ref()
        .map(rows::ticket_product)
        .transpose()
    }

    async fn delete_ticket_product(&self, id: ProductId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM ticket_products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_transfer_products(
        &self,
        filter: &ProductFilter,
    ) -> Result<Vec<TransferProduct>, StoreError> {
        sqlx::query(&format!(
            "SELECT {TRANSFER_PRODUCT_COLUMNS} FROM transfer_products \
             WHERE ($1::bigint IS NULL OR event_id = $1) AND ($2::boolean IS NULL OR is_active = $2) \
             ORDER BY created_at DESC, id"
        ))
        .bind(filter.event_id.map(|id| id.get()))
        .bind(filter.active)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?
        .iter()
        .map(rows::transfer_product)
        .collect()
    }

    async fn create_transfer_product(
        &self,
        draft: &TransferProductDraft,
    ) -> Result<TransferProduct, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO transfer_products \
             (id, event_id, name, direction, price_cents, info_json, inventory_limit, is_active, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {TRANSFER_PRODUCT_COLUMNS}"
        ))
        .bind(ProductId::new().as_uuid())
        .bind(draft.event_id.get())
        .bind(&draft.name)
        .bind(draft.direction.as_str())
        .bind(draft.price_cents)
        .bind(Value::Object(draft.info.clone()))
        .bind(limit_param(draft.inventory_limit))
        .bind(draft.is_active)
        .bind(draft.created_by.map(|id| id.get()))
        .fetch_one(&self.pool)
        .await
        .map_err(db)?;
        rows::transfer_product(&row)
    }

    async fn update_transfer_product(
        &self,
        id: ProductId,
        patch: &TransferProductPatch,
    ) -> Result<Option<TransferProduct>, StoreError> {
        let (limit_changed, limit) = limit_change(patch.inventory_limit);
        sqlx::query(&format!(
            "UPDATE transfer_products SET \
                name = COALESCE($2, name), \
                price_cents = COALESCE($3, price_cents), \
                info_json = COALESCE($4, info_json), \
                inventory_limit = CASE WHEN $5 THEN $6 ELSE inventory_limit END, \
                is_active = COALESCE($7, is_active), \
                updated_at = now() \
             WHERE id = $1 RETURNING {TRANSFER_PRODUCT_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(patch.name.as_deref().map(str::trim))
        .bind(patch.price_cents)
        .bind(patch.info.clone().map(Value::Object))
        .bind(limit_changed)
        .bind(limit)
        .bind(patch.is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?
        .as_ref()
        .map(rows::transfer_product)
        .transpose()
    }

    async fn delete_transfer_product(&self, id: ProductId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM transfer_products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_promo_codes(&self, filter: &ProductFilter) -> Result<Vec<PromoCode>, StoreError> {
        sqlx::query(&format!(
            "SELECT {PROMO_CODE_COLUMNS} FROM promo_codes \
             WHERE ($1::bigint IS NULL OR event_id IS NULL OR event_id = $1) \
               AND ($2::boolean IS NULL OR is_active = $2) \
             ORDER BY created_at DESC, id"
        ))
        .bind(filter.event_id.map(|id| id.get()))
        .bind(filter.active)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?
        .iter()
        .map(rows::promo_code)
        .collect()
    }

    async fn create_promo_code(&self, draft: &PromoCodeDraft) -> Result<PromoCode, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO promo_codes \
             (id, code, discount_type, value, usage_limit, active_from, active_to, event_id, is_active, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {PROMO_CODE_COLUMNS}"
        ))
        .bind(PromoCodeId::new().as_uuid())
        .bind(&draft.code)
        .bind(draft.discount_type.as_str())
        .bind(draft.value)
        .bind(limit_param(draft.usage_limit))
        .bind(draft.active_from)
        .bind(draft.active_to)
        .bind(draft.event_id.map(|id| id.get()))
        .bind(draft.is_active)
        .bind(draft.created_by.map(|id| id.get()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_code(e, &draft.code))?;
        rows::promo_code(&row)
    }

    async fn update_promo_code(
        &self,
        id: PromoCodeId,
        patch: &PromoCodePatch,
    ) -> Result<Option<PromoCode>, StoreError> {
        let (limit_changed, limit) = limit_change(patch.usage_limit);
        sqlx::query(&format!(
            "UPDATE promo_codes SET \
                discount_type = COALESCE($2, discount_type), \
                value = COALESCE($3, value), \
                usage_limit = CASE WHEN $4 THEN $5 ELSE usage_limit END, \
                active_from = COALESCE($6, active_from), \
                active_to = COALESCE($7, active_to), \
                event_id = COALESCE($8, event_id), \
                is_active = COALESCE($9, is_active), \
                updated_at = now() \
             WHERE id = $1 RETURNING {PROMO_CODE_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(patch.discount_type.as_ref().map(|t| t.as_str().to_string()))
        .bind(patch.value)
        .bind(limit_changed)
        .bind(limit)
        .bind(patch.active_from)
        .bind(patch.active_to)
        .bind(patch.event_id.map(|id| id.get()))
        .bind(patch.is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?
        .as_ref()
        .map(rows::promo_code)
        .transpose()
    }

    async fn delete_promo_code(&self, id: PromoCodeId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM promo_codes WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_updates_map_to_case_parameters() {
        assert_eq!(limit_change(LimitUpdate::Keep), (false, None));
        assert_eq!(limit_change(LimitUpdate::Clear), (true, None));
        assert_eq!(limit_change(LimitUpdate::Set(12)), (true, Some(12)));
    }
}
