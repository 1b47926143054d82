//! Order lifecycle against the in-memory store: creation, confirmation,
//! cancellation and delivery.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use boxoffice_core::delivery::DeliveryOutcome;
use boxoffice_core::orders::{CreateOrderRequest, MANUAL_PAYMENT_NOTE};
use boxoffice_core::promo::{PromoFailure, PromoRejection};
use boxoffice_core::qr::{self, hash_token};
use boxoffice_core::store::OrderQuery;
use boxoffice_core::types::{EventId, OrderStatus, PaymentMethod, TicketType, UserId};
use boxoffice_core::TicketingError;
use boxoffice_testing::fixtures::{ADMIN_ID, BUYER_ID, EVENT_TITLE, order_request, select};
use boxoffice_testing::{
    FailingDelivery, RecordingDelivery, SteppingClock, TicketingHarness, test_clock,
};
use boxoffice_core::environment::Clock;
use std::sync::Arc;

#[tokio::test]
async fn group_tickets_expand_to_one_ticket_per_unit() {
    let harness = TicketingHarness::new().await;
    let group = harness.ticket_product("GROUP2", 5_000, None).await;

    let detail = harness
        .orders
        .create_order(order_request(vec![select(group.id, 3)]))
        .await
        .unwrap();

    assert_eq!(detail.order.status, OrderStatus::Pending);
    assert_eq!(detail.order.subtotal_cents, 15_000);
    assert_eq!(detail.order.total_cents, 15_000);
    assert_eq!(detail.order.event_title, EVENT_TITLE);
    assert_eq!(detail.order.payment_method, PaymentMethod::Phone);
    assert_eq!(detail.order.payment_notes.as_deref(), Some(MANUAL_PAYMENT_NOTE));
    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.items[0].product_ref, "GROUP2");
    assert_eq!(detail.items[0].line_total_cents, 15_000);
    assert_eq!(detail.tickets.len(), 3);
    for ticket in &detail.tickets {
        assert_eq!(ticket.ticket_type, TicketType::Group2);
        assert_eq!(ticket.quantity, 2);
        assert!(ticket.qr_payload.is_none());
    }

    // Unpaid orders hold no stock.
    assert_eq!(harness.store.ticket_product(group.id).await.unwrap().sold_count, 0);
}

#[tokio::test]
async fn duplicate_lines_are_merged() {
    let harness = TicketingHarness::new().await;
    let single = harness.ticket_product("SINGLE", 1_000, None).await;

    let detail = harness
        .orders
        .create_order(order_request(vec![select(single.id, 1), select(single.id, 2)]))
        .await
        .unwrap();

    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.items[0].quantity, 3);
    assert_eq!(detail.tickets.len(), 3);
}

#[tokio::test]
async fn transfers_are_priced_but_issue_no_tickets() {
    let harness = TicketingHarness::new().await;
    let single = harness.ticket_product("SINGLE", 1_000, None).await;
    let shuttle = harness.transfer_product("roundtrip", 700, None).await;

    let mut request = order_request(vec![select(single.id, 1)]);
    request.transfer_items = vec![select(shuttle.id, 2)];
    let detail = harness.orders.create_order(request).await.unwrap();

    assert_eq!(detail.order.subtotal_cents, 2_400);
    assert_eq!(detail.items.len(), 2);
    assert_eq!(detail.tickets.len(), 1);
}

#[tokio::test]
async fn bad_orders_are_rejected_as_invalid_product() {
    let harness = TicketingHarness::new().await;
    let single = harness.ticket_product("SINGLE", 1_000, None).await;
    let shuttle = harness.transfer_product("THERE", 500, None).await;

    let empty = order_request(Vec::new());
    let cash = CreateOrderRequest {
        payment_method: "cash".to_string(),
        ..order_request(vec![select(single.id, 1)])
    };
    let transfer_only = CreateOrderRequest {
        transfer_items: vec![select(shuttle.id, 1)],
        ..order_request(Vec::new())
    };
    let unknown_event = CreateOrderRequest {
        event_id: EventId::new(99),
        ..order_request(vec![select(single.id, 1)])
    };
    let anonymous = CreateOrderRequest {
        user_id: UserId::new(0),
        ..order_request(vec![select(single.id, 1)])
    };

    for request in [empty, cash, transfer_only, unknown_event, anonymous] {
        let err = harness.orders.create_order(request).await.unwrap_err();
        assert_eq!(err.code(), "invalid_product", "{err}");
    }
    assert_eq!(harness.store.order_count().await, 0);
}

#[tokio::test]
async fn inactive_or_foreign_products_cannot_be_ordered() {
    let harness = TicketingHarness::new().await;
    harness.store.add_event(EventId::new(2), "Winter Ball").await;
    let mut foreign = boxoffice_testing::fixtures::ticket_input("SINGLE", 1_000, None);
    foreign.event_id = EventId::new(2);
    let foreign = harness.catalog.create_ticket_product(ADMIN_ID, foreign).await.unwrap();

    let mut retired = boxoffice_testing::fixtures::ticket_input("SINGLE", 1_000, None);
    retired.is_active = Some(false);
    let retired = harness.catalog.create_ticket_product(ADMIN_ID, retired).await.unwrap();

    for product in [foreign.id, retired.id] {
        let err = harness
            .orders
            .create_order(order_request(vec![select(product, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, TicketingError::InvalidProduct(_)));
    }
}

#[tokio::test]
async fn promo_use_is_consumed_at_creation() {
    let harness = TicketingHarness::new().await;
    let single = harness.ticket_product("SINGLE", 10_000, None).await;
    let promo = harness.promo_code("SUMMER20", "percent", 20).await;

    let request = CreateOrderRequest {
        promo_code: Some(" summer20 ".to_string()),
        ..order_request(vec![select(single.id, 1)])
    };
    let detail = harness.orders.create_order(request).await.unwrap();

    assert_eq!(detail.order.discount_cents, 2_000);
    assert_eq!(detail.order.total_cents, 8_000);
    assert_eq!(detail.order.promo_code_id, Some(promo.id));
    assert_eq!(harness.store.promo_code(promo.id).await.unwrap().used_count, 1);
}

#[tokio::test]
async fn exhausted_promo_fails_the_whole_order() {
    let harness = TicketingHarness::new().await;
    let single = harness.ticket_product("SINGLE", 10_000, None).await;
    let mut input = boxoffice_testing::fixtures::promo_input("ONCE", "FIXED", 500);
    input.usage_limit = Some(1);
    let promo = harness.catalog.create_promo_code(ADMIN_ID, input).await.unwrap();

    let with_promo = || CreateOrderRequest {
        promo_code: Some("ONCE".to_string()),
        ..order_request(vec![select(single.id, 1)])
    };
    harness.orders.create_order(with_promo()).await.unwrap();
    let err = harness.orders.create_order(with_promo()).await.unwrap_err();

    assert!(matches!(
        err,
        TicketingError::PromoInvalid(PromoFailure::Rejected(PromoRejection::UsageLimitReached))
    ));
    assert_eq!(harness.store.order_count().await, 1);
    assert_eq!(harness.store.promo_code(promo.id).await.unwrap().used_count, 1);
}

#[tokio::test]
async fn unknown_promo_code_is_reported() {
    let harness = TicketingHarness::new().await;
    let single = harness.ticket_product("SINGLE", 10_000, None).await;

    let request = CreateOrderRequest {
        promo_code: Some("NOPE".to_string()),
        ..order_request(vec![select(single.id, 1)])
    };
    let err = harness.orders.create_order(request).await.unwrap_err();

    assert!(matches!(err, TicketingError::PromoInvalid(PromoFailure::NotFound)));
}

#[tokio::test]
async fn promo_check_does_not_consume() {
    let harness = TicketingHarness::new().await;
    let promo = harness.promo_code("TENOFF", "FIXED", 1_000).await;

    let check = harness
        .orders
        .validate_promo_code(boxoffice_testing::fixtures::EVENT_ID, "tenoff", 4_000)
        .await
        .unwrap();
    assert!(check.valid);
    assert_eq!(check.discount_cents, 1_000);
    assert_eq!(check.total_cents, 3_000);

    let missing = harness
        .orders
        .validate_promo_code(boxoffice_testing::fixtures::EVENT_ID, "other", 4_000)
        .await
        .unwrap();
    assert!(!missing.valid);
    assert_eq!(missing.reason, Some(PromoFailure::NotFound));
    assert_eq!(missing.total_cents, 4_000);

    assert_eq!(harness.store.promo_code(promo.id).await.unwrap().used_count, 0);
}

#[tokio::test]
async fn confirmation_issues_verifiable_tokens() {
    let harness = TicketingHarness::new().await;
    let single = harness.ticket_product("SINGLE", 1_000, Some(10)).await;
    let group = harness.ticket_product("GROUP10", 8_000, Some(10)).await;
    let created = harness
        .orders
        .create_order(order_request(vec![select(single.id, 2), select(group.id, 1)]))
        .await
        .unwrap();

    let confirmed = harness.orders.confirm_order(created.order.id, ADMIN_ID).await.unwrap();

    let order = &confirmed.detail.order;
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.confirmed_by, Some(ADMIN_ID));
    assert_eq!(order.confirmed_at, Some(test_clock().now()));
    assert_eq!(confirmed.purchaser.as_ref().map(|p| p.user_id), Some(BUYER_ID));
    assert_eq!(confirmed.detail.tickets.len(), 3);
    for ticket in &confirmed.detail.tickets {
        let token = ticket.qr_payload.as_deref().expect("token issued");
        let payload = qr::verify(&harness.env.signing_secret, token).unwrap();
        assert_eq!(payload.mismatched_field(ticket), None);
        assert_eq!(ticket.qr_payload_hash.as_deref(), Some(hash_token(token).as_str()));
        assert!(ticket.qr_issued_at.is_some());
    }

    assert_eq!(harness.store.ticket_product(single.id).await.unwrap().sold_count, 2);
    assert_eq!(harness.store.ticket_product(group.id).await.unwrap().sold_count, 1);
}

#[tokio::test]
async fn orders_confirm_once() {
    let harness = TicketingHarness::new().await;
    let single = harness.ticket_product("SINGLE", 1_000, None).await;
    let created = harness
        .orders
        .create_order(order_request(vec![select(single.id, 1)]))
        .await
        .unwrap();

    harness.orders.confirm_order(created.order.id, ADMIN_ID).await.unwrap();
    let err = harness
        .orders
        .confirm_order(created.order.id, ADMIN_ID)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TicketingError::OrderStateNotAllowed {
            status: OrderStatus::Paid
        }
    ));
    assert_eq!(harness.store.ticket_product(single.id).await.unwrap().sold_count, 1);
}

#[tokio::test]
async fn confirming_a_missing_order_fails() {
    let harness = TicketingHarness::new().await;
    let err = harness
        .orders
        .confirm_order(boxoffice_core::types::OrderId::new(), ADMIN_ID)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "order_not_found");
}

#[tokio::test]
async fn short_inventory_leaves_every_counter_untouched() {
    let harness = TicketingHarness::new().await;
    let plenty = harness.ticket_product("SINGLE", 1_000, Some(10)).await;
    let scarce = harness.ticket_product("GROUP2", 3_000, Some(1)).await;
    let created = harness
        .orders
        .create_order(order_request(vec![select(plenty.id, 2), select(scarce.id, 2)]))
        .await
        .unwrap();

    let err = harness
        .orders
        .confirm_order(created.order.id, ADMIN_ID)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TicketingError::InventoryLimitReached { product_id } if product_id == scarce.id
    ));
    assert_eq!(harness.store.ticket_product(plenty.id).await.unwrap().sold_count, 0);
    assert_eq!(harness.store.ticket_product(scarce.id).await.unwrap().sold_count, 0);
    let detail = harness.orders.order_detail(created.order.id, false).await.unwrap();
    assert_eq!(detail.order.status, OrderStatus::Pending);
    assert!(detail.tickets.iter().all(|t| t.qr_payload.is_none()));
}

/// Runs on the in-memory store, which serializes whole transactions, so this
/// checks the service's outcome accounting rather than row-lock safety. The
/// real race runs in `boxoffice-postgres`'s ignored integration tests.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_confirmations_never_oversell() {
    let harness = Arc::new(TicketingHarness::new().await);
    let limit = 5;
    let product = harness.ticket_product("SINGLE", 1_000, Some(limit)).await;

    let mut order_ids = Vec::new();
    for _ in 0..8 {
        let created = harness
            .orders
            .create_order(order_request(vec![select(product.id, 1)]))
            .await
            .unwrap();
        order_ids.push(created.order.id);
    }

    let handles: Vec<_> = order_ids
        .into_iter()
        .map(|order_id| {
            let harness = Arc::clone(&harness);
            tokio::spawn(async move { harness.orders.confirm_order(order_id, ADMIN_ID).await })
        })
        .collect();
    let results = futures::future::join_all(handles).await;

    let confirmed = results.iter().filter(|r| matches!(r, Ok(Ok(_)))).count();
    let exhausted = results
        .iter()
        .filter(|r| matches!(r, Ok(Err(TicketingError::InventoryLimitReached { .. }))))
        .count();
    assert_eq!(confirmed, 5);
    assert_eq!(exhausted, 3);
    assert_eq!(harness.store.ticket_product(product.id).await.unwrap().sold_count, 5);
}

#[tokio::test]
async fn canceling_a_paid_order_returns_stock_and_promo() {
    let harness = TicketingHarness::new().await;
    let single = harness.ticket_product("SINGLE", 2_000, Some(4)).await;
    let shuttle = harness.transfer_product("BACK", 500, Some(4)).await;
    let promo = harness.promo_code("HALF", "PERCENT", 50).await;

    let request = CreateOrderRequest {
        transfer_items: vec![select(shuttle.id, 1)],
        promo_code: Some("HALF".to_string()),
        ..order_request(vec![select(single.id, 2)])
    };
    let created = harness.orders.create_order(request).await.unwrap();
    harness.orders.confirm_order(created.order.id, ADMIN_ID).await.unwrap();
    assert_eq!(harness.store.ticket_product(single.id).await.unwrap().sold_count, 2);
    assert_eq!(harness.store.transfer_product(shuttle.id).await.unwrap().sold_count, 1);

    let canceled = harness
        .orders
        .cancel_order(created.order.id, ADMIN_ID, Some(" refund requested ".to_string()))
        .await
        .unwrap();

    assert_eq!(canceled.order.status, OrderStatus::Canceled);
    assert_eq!(canceled.order.canceled_by, Some(ADMIN_ID));
    assert_eq!(canceled.order.canceled_reason.as_deref(), Some("refund requested"));
    assert_eq!(harness.store.ticket_product(single.id).await.unwrap().sold_count, 0);
    assert_eq!(harness.store.transfer_product(shuttle.id).await.unwrap().sold_count, 0);
    assert_eq!(harness.store.promo_code(promo.id).await.unwrap().used_count, 0);
}

#[tokio::test]
async fn canceling_a_pending_order_keeps_other_reservations() {
    let harness = TicketingHarness::new().await;
    let single = harness.ticket_product("SINGLE", 2_000, None).await;
    let promo = harness.promo_code("FIVE", "FIXED", 500).await;

    let paid = harness
        .orders
        .create_order(order_request(vec![select(single.id, 2)]))
        .await
        .unwrap();
    harness.orders.confirm_order(paid.order.id, ADMIN_ID).await.unwrap();

    let pending = harness
        .orders
        .create_order(CreateOrderRequest {
            promo_code: Some("five".to_string()),
            ..order_request(vec![select(single.id, 3)])
        })
        .await
        .unwrap();
    assert_eq!(harness.store.promo_code(promo.id).await.unwrap().used_count, 1);

    harness.orders.cancel_order(pending.order.id, ADMIN_ID, None).await.unwrap();

    assert_eq!(harness.store.ticket_product(single.id).await.unwrap().sold_count, 2);
    assert_eq!(harness.store.promo_code(promo.id).await.unwrap().used_count, 0);
}

#[tokio::test]
async fn terminal_orders_cannot_be_canceled() {
    let harness = TicketingHarness::new().await;
    let single = harness.ticket_product("SINGLE", 2_000, None).await;
    let created = harness
        .orders
        .create_order(order_request(vec![select(single.id, 1)]))
        .await
        .unwrap();
    harness.orders.cancel_order(created.order.id, ADMIN_ID, None).await.unwrap();

    let again = harness
        .orders
        .cancel_order(created.order.id, ADMIN_ID, None)
        .await
        .unwrap_err();
    let confirm = harness
        .orders
        .confirm_order(created.order.id, ADMIN_ID)
        .await
        .unwrap_err();

    assert_eq!(again.code(), "order_state_not_allowed");
    assert_eq!(confirm.code(), "order_state_not_allowed");
}

#[tokio::test]
async fn delivery_reports_without_undoing_confirmation() {
    let harness = TicketingHarness::new().await;
    let single = harness.ticket_product("SINGLE", 1_000, None).await;

    let recorder = RecordingDelivery::new();
    let first = harness
        .orders
        .create_order(order_request(vec![select(single.id, 2)]))
        .await
        .unwrap();
    let delivered = harness
        .orders
        .confirm_and_deliver(first.order.id, ADMIN_ID, &recorder)
        .await
        .unwrap();
    assert_eq!(delivered.delivery, DeliveryOutcome::Delivered);
    assert_eq!(recorder.sent(), vec![(BUYER_ID, first.order.id, 2)]);

    let second = harness
        .orders
        .create_order(order_request(vec![select(single.id, 1)]))
        .await
        .unwrap();
    let failed = harness
        .orders
        .confirm_and_deliver(second.order.id, ADMIN_ID, &FailingDelivery::new("bot offline"))
        .await
        .unwrap();
    assert_eq!(failed.delivery, DeliveryOutcome::Failed("bot offline".to_string()));
    let detail = harness.orders.order_detail(second.order.id, false).await.unwrap();
    assert_eq!(detail.order.status, OrderStatus::Paid);
}

#[tokio::test]
async fn unknown_buyers_have_no_recipient() {
    let harness = TicketingHarness::new().await;
    let single = harness.ticket_product("SINGLE", 1_000, None).await;
    let created = harness
        .orders
        .create_order(CreateOrderRequest {
            user_id: UserId::new(8),
            ..order_request(vec![select(single.id, 1)])
        })
        .await
        .unwrap();

    let recorder = RecordingDelivery::new();
    let delivered = harness
        .orders
        .confirm_and_deliver(created.order.id, ADMIN_ID, &recorder)
        .await
        .unwrap();

    assert_eq!(delivered.delivery, DeliveryOutcome::NoRecipient);
    assert!(recorder.sent().is_empty());
}

#[tokio::test]
async fn listings_are_newest_first_and_filtered() {
    let harness = TicketingHarness::with_clock(Arc::new(SteppingClock::new(test_clock().now()))).await;
    let single = harness.ticket_product("SINGLE", 1_000, None).await;

    let mut ids = Vec::new();
    for _ in 0..3 {
        let created = harness
            .orders
            .create_order(order_request(vec![select(single.id, 1)]))
            .await
            .unwrap();
        ids.push(created.order.id);
    }
    harness.orders.confirm_order(ids[0], ADMIN_ID).await.unwrap();

    let all = harness.orders.list_orders(OrderQuery::default()).await.unwrap();
    assert_eq!(all.total, 3);
    let listed: Vec<_> = all.items.iter().map(|s| s.order.id).collect();
    assert_eq!(listed, vec![ids[2], ids[1], ids[0]]);
    assert_eq!(all.items[0].purchaser.as_ref().map(|p| p.user_id), Some(BUYER_ID));

    let paid = harness
        .orders
        .list_orders(OrderQuery {
            status: Some(OrderStatus::Paid),
            ..OrderQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(paid.total, 1);
    assert_eq!(paid.items[0].order.id, ids[0]);

    let page = harness.orders.list_user_orders(BUYER_ID, 2, 1).await.unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].order.id, ids[1]);

    let tickets = harness.orders.list_user_tickets(BUYER_ID, None).await.unwrap();
    assert_eq!(tickets.len(), 3);
    assert_eq!(tickets[0].order_id, ids[2]);
    assert_eq!(tickets[2].order_status, Some(OrderStatus::Paid));

    let nobody = harness.orders.list_user_orders(UserId::new(0), 10, 0).await.unwrap();
    assert_eq!(nobody.total, 0);
}
