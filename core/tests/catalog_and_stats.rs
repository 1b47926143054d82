//! Catalog administration and sales statistics over the in-memory store.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use boxoffice_core::TicketingError;
use boxoffice_core::catalog::{LimitUpdate, ProductFilter, PromoCodePatch, TicketProductPatch};
use boxoffice_core::orders::CreateOrderRequest;
use boxoffice_core::promo::{PromoFailure, PromoRejection};
use boxoffice_core::types::{
    DiscountType, EventId, ProductId, PromoCodeId, TicketType, TransferDirection,
};
use boxoffice_testing::TicketingHarness;
use boxoffice_testing::fixtures::{ADMIN_ID, EVENT_ID, EVENT_TITLE, order_request, promo_input, select, ticket_input};

#[tokio::test]
async fn products_are_created_active_and_listed_per_event() {
    let harness = TicketingHarness::new().await;
    harness.store.add_event(EventId::new(2), "Winter Ball").await;

    let single = harness.ticket_product("single", 1_000, Some(0)).await;
    assert_eq!(single.ticket_type, TicketType::Single);
    assert_eq!(single.inventory_limit, None);
    assert!(single.is_active);
    assert_eq!(single.created_by, Some(ADMIN_ID));

    let mut elsewhere = ticket_input("GROUP2", 1_800, Some(20));
    elsewhere.event_id = EventId::new(2);
    harness.catalog.create_ticket_product(ADMIN_ID, elsewhere).await.unwrap();

    let listed = harness
        .catalog
        .list_ticket_products(ProductFilter {
            event_id: Some(EVENT_ID),
            active: None,
        })
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, single.id);
}

#[tokio::test]
async fn bad_product_input_is_rejected() {
    let harness = TicketingHarness::new().await;

    let unknown_tier = harness
        .catalog
        .create_ticket_product(ADMIN_ID, ticket_input("VIP", 1_000, None))
        .await
        .unwrap_err();
    let negative = harness
        .catalog
        .create_ticket_product(ADMIN_ID, ticket_input("SINGLE", -1, None))
        .await
        .unwrap_err();
    let bad_direction = harness
        .catalog
        .create_transfer_product(ADMIN_ID, boxoffice_testing::fixtures::transfer_input("SIDEWAYS", 100, None))
        .await
        .unwrap_err();

    for err in [unknown_tier, negative, bad_direction] {
        assert!(matches!(err, TicketingError::InvalidProduct(_)), "{err}");
    }
}

#[tokio::test]
async fn patches_update_and_clear_limits() {
    let harness = TicketingHarness::new().await;
    let single = harness.ticket_product("SINGLE", 1_000, Some(50)).await;

    let updated = harness
        .catalog
        .update_ticket_product(
            single.id,
            TicketProductPatch {
                price_cents: Some(1_200),
                inventory_limit: LimitUpdate::from_input(Some(-1)),
                is_active: Some(false),
                ..TicketProductPatch::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.price_cents, 1_200);
    assert_eq!(updated.inventory_limit, None);
    assert!(!updated.is_active);
    assert_eq!(updated.name, single.name);

    let purchasable = harness.catalog.purchasable_products(EVENT_ID).await.unwrap();
    assert!(purchasable.tickets.is_empty());
}

#[tokio::test]
async fn missing_rows_are_reported_per_entity() {
    let harness = TicketingHarness::new().await;

    let product = harness
        .catalog
        .update_ticket_product(ProductId::new(), TicketProductPatch::default())
        .await
        .unwrap_err();
    let transfer = harness.catalog.delete_transfer_product(ProductId::new()).await.unwrap_err();
    let promo = harness.catalog.delete_promo_code(PromoCodeId::new()).await.unwrap_err();

    assert_eq!(product.code(), "product_not_found");
    assert_eq!(transfer.code(), "product_not_found");
    assert_eq!(promo.code(), "promo_code_not_found");
}

#[tokio::test]
async fn purchasable_products_cover_tickets_and_transfers() {
    let harness = TicketingHarness::new().await;
    harness.ticket_product("SINGLE", 1_000, None).await;
    let shuttle = harness.transfer_product("there", 400, None).await;

    let purchasable = harness.catalog.purchasable_products(EVENT_ID).await.unwrap();

    assert_eq!(purchasable.tickets.len(), 1);
    assert_eq!(purchasable.transfers.len(), 1);
    assert_eq!(purchasable.transfers[0].direction, TransferDirection::There);

    harness.catalog.delete_transfer_product(shuttle.id).await.unwrap();
    let purchasable = harness.catalog.purchasable_products(EVENT_ID).await.unwrap();
    assert!(purchasable.transfers.is_empty());
}

#[tokio::test]
async fn promo_codes_are_normalized_and_validated() {
    let harness = TicketingHarness::new().await;

    let promo = harness.promo_code(" early ", "percent", 15).await;
    assert_eq!(promo.code, "EARLY");
    assert_eq!(promo.discount_type, DiscountType::Percent);

    let blank = harness
        .catalog
        .create_promo_code(ADMIN_ID, promo_input("  ", "FIXED", 100))
        .await
        .unwrap_err();
    assert!(matches!(blank, TicketingError::PromoInvalid(PromoFailure::InvalidInput)));

    let bogus = harness
        .catalog
        .create_promo_code(ADMIN_ID, promo_input("BOGO", "BUY_ONE_GET_ONE", 1))
        .await
        .unwrap_err();
    assert!(matches!(
        bogus,
        TicketingError::PromoInvalid(PromoFailure::Rejected(PromoRejection::UnsupportedDiscountType))
    ));

    let mut scoped = promo_input("WINTER", "FIXED", 300);
    scoped.event_id = Some(EventId::new(2));
    harness.catalog.create_promo_code(ADMIN_ID, scoped).await.unwrap();
    let for_event = harness
        .catalog
        .list_promo_codes(ProductFilter {
            event_id: Some(EVENT_ID),
            active: None,
        })
        .await
        .unwrap();
    assert_eq!(for_event.len(), 1);
    assert_eq!(for_event[0].id, promo.id);
}

#[tokio::test]
async fn promo_patch_can_switch_a_code_off() {
    let harness = TicketingHarness::new().await;
    let single = harness.ticket_product("SINGLE", 1_000, None).await;
    let promo = harness.promo_code("OFF", "FIXED", 100).await;

    harness
        .catalog
        .update_promo_code(
            promo.id,
            PromoCodePatch {
                is_active: Some(false),
                usage_limit: LimitUpdate::Set(3),
                ..PromoCodePatch::default()
            },
        )
        .await
        .unwrap();

    let err = harness
        .orders
        .create_order(CreateOrderRequest {
            promo_code: Some("OFF".to_string()),
            ..order_request(vec![select(single.id, 1)])
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TicketingError::PromoInvalid(PromoFailure::Rejected(PromoRejection::Inactive))
    ));
}

#[tokio::test]
async fn stats_count_paid_units_and_check_ins() {
    let harness = TicketingHarness::new().await;
    let single = harness.ticket_product("SINGLE", 1_000, None).await;
    let group = harness.ticket_product("GROUP2", 3_000, None).await;
    let shuttle = harness.transfer_product("ROUNDTRIP", 500, None).await;

    let paid = harness
        .orders
        .create_order(CreateOrderRequest {
            transfer_items: vec![select(shuttle.id, 2)],
            ..order_request(vec![select(single.id, 2), select(group.id, 1)])
        })
        .await
        .unwrap();
    let paid = harness.orders.confirm_order(paid.order.id, ADMIN_ID).await.unwrap().detail;

    // Pending and canceled orders contribute nothing.
    let pending = harness
        .orders
        .create_order(order_request(vec![select(single.id, 5)]))
        .await
        .unwrap();
    harness.orders.cancel_order(pending.order.id, ADMIN_ID, None).await.unwrap();
    harness
        .orders
        .create_order(order_request(vec![select(group.id, 4)]))
        .await
        .unwrap();

    let group_ticket = paid
        .tickets
        .iter()
        .find(|t| t.ticket_type == TicketType::Group2)
        .unwrap();
    harness
        .redemption
        .redeem_ticket(group_ticket.id, ADMIN_ID, group_ticket.qr_payload.as_deref())
        .await
        .unwrap();

    let stats = harness.stats.ticket_stats(None).await.unwrap();

    let global = &stats.global;
    assert_eq!(global.purchased_amount_cents, 6_000);
    assert_eq!(global.redeemed_amount_cents, 0);
    assert_eq!(global.ticket_type_counts[&TicketType::Single], 2);
    assert_eq!(global.ticket_type_counts[&TicketType::Group2], 1);
    assert_eq!(global.ticket_type_counts[&TicketType::Group10], 0);
    assert_eq!(global.transfer_direction_counts[&TransferDirection::Roundtrip], 2);
    assert_eq!(global.checked_in_tickets, 1);
    assert_eq!(global.checked_in_people, 2);

    assert_eq!(stats.events.len(), 1);
    assert_eq!(stats.events[0].event_id, Some(EVENT_ID));
    assert_eq!(stats.events[0].event_title, EVENT_TITLE);
    assert_eq!(stats.events[0].purchased_amount_cents, 6_000);

    let other = harness.stats.ticket_stats(Some(EventId::new(2))).await.unwrap();
    assert!(other.events.is_empty());
    assert_eq!(other.global.purchased_amount_cents, 0);
}

#[tokio::test]
async fn fully_redeemed_orders_count_as_redeemed_revenue() {
    let harness = TicketingHarness::new().await;
    let single = harness.ticket_product("SINGLE", 2_500, None).await;
    let created = harness
        .orders
        .create_order(order_request(vec![select(single.id, 1)]))
        .await
        .unwrap();
    let paid = harness.orders.confirm_order(created.order.id, ADMIN_ID).await.unwrap().detail;
    harness
        .redemption
        .redeem_ticket(paid.tickets[0].id, ADMIN_ID, None)
        .await
        .unwrap();

    let stats = harness.stats.ticket_stats(Some(EVENT_ID)).await.unwrap();

    assert_eq!(stats.global.purchased_amount_cents, 2_500);
    assert_eq!(stats.global.redeemed_amount_cents, 2_500);
    assert_eq!(stats.global.ticket_type_counts[&TicketType::Single], 1);
}
