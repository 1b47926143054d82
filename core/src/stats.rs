//! Sales and check-in reporting.
//!
//! [`aggregate_stats`] is a pure reducer over flattened order × item rows.
//! Order totals are summed once per distinct `(order, status)` pair; unit
//! counts are summed per row.

use crate::error::Result;
use crate::store::TicketingStore;
use crate::types::{EventId, ItemType, OrderId, OrderStatus, TicketType, TransferDirection};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// One order joined with one of its items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsRow {
    /// Order.
    pub order_id: OrderId,
    /// Event.
    pub event_id: EventId,
    /// Event title.
    pub event_title: String,
    /// Order status.
    pub status: OrderStatus,
    /// Order total, repeated on every row of the order.
    pub total_cents: i64,
    /// Item kind; `None` for an order without items.
    pub item_type: Option<ItemType>,
    /// Ticket type or direction snapshot.
    pub product_ref: String,
    /// Item quantity.
    pub quantity: i64,
}

/// One redeemed ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckInRow {
    /// Event.
    pub event_id: EventId,
    /// People the ticket admitted.
    pub quantity: i64,
}

/// Totals for one event, or for everything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsBucket {
    /// Event; `None` for the global bucket.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<EventId>,
    /// Event title.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub event_title: String,
    /// Revenue from paid and redeemed orders.
    pub purchased_amount_cents: i64,
    /// Revenue from fully redeemed orders.
    pub redeemed_amount_cents: i64,
    /// Tickets sold per tier.
    pub ticket_type_counts: BTreeMap<TicketType, i64>,
    /// Transfers sold per direction.
    pub transfer_direction_counts: BTreeMap<TransferDirection, i64>,
    /// Tickets redeemed at the door.
    pub checked_in_tickets: i64,
    /// People admitted by redeemed tickets.
    pub checked_in_people: i64,
}

impl StatsBucket {
    /// An empty bucket with every tier and direction present at zero.
    #[must_use]
    pub fn new(event_id: Option<EventId>, event_title: impl Into<String>) -> Self {
        Self {
            event_id,
            event_title: event_title.into(),
            purchased_amount_cents: 0,
            redeemed_amount_cents: 0,
            ticket_type_counts: TicketType::ALL.iter().map(|t| (*t, 0)).collect(),
            transfer_direction_counts: TransferDirection::ALL.iter().map(|d| (*d, 0)).collect(),
            checked_in_tickets: 0,
            checked_in_people: 0,
        }
    }

    fn add_order_total(&mut self, status: OrderStatus, total_cents: i64) {
        if status.is_purchased() {
            self.purchased_amount_cents += total_cents;
        }
        if status == OrderStatus::Redeemed {
            self.redeemed_amount_cents += total_cents;
        }
    }

    fn add_units(&mut self, item_type: ItemType, product_ref: &str, quantity: i64) {
        match item_type {
            ItemType::Ticket => {
                if let Some(count) = TicketType::parse(product_ref)
                    .and_then(|t| self.ticket_type_counts.get_mut(&t))
                {
                    *count += quantity;
                }
            }
            ItemType::Transfer => {
                if let Some(count) = TransferDirection::parse(product_ref)
                    .and_then(|d| self.transfer_direction_counts.get_mut(&d))
                {
                    *count += quantity;
                }
            }
        }
    }

    fn add_check_in(&mut self, quantity: i64) {
        self.checked_in_tickets += 1;
        self.checked_in_people += quantity;
    }
}

/// Reduces order rows into a global bucket and one bucket per event.
#[must_use]
pub fn aggregate_stats(rows: &[StatsRow]) -> (StatsBucket, BTreeMap<EventId, StatsBucket>) {
    let mut global = StatsBucket::new(None, "");
    let mut per_event: BTreeMap<EventId, StatsBucket> = BTreeMap::new();
    let mut seen: HashSet<(OrderId, OrderStatus)> = HashSet::new();

    for row in rows.iter().filter(|row| row.event_id.is_valid()) {
        let bucket = per_event
            .entry(row.event_id)
            .or_insert_with(|| StatsBucket::new(Some(row.event_id), row.event_title.clone()));
        if bucket.event_title.is_empty() && !row.event_title.is_empty() {
            bucket.event_title.clone_from(&row.event_title);
        }

        if seen.insert((row.order_id, row.status)) {
            bucket.add_order_total(row.status, row.total_cents);
            global.add_order_total(row.status, row.total_cents);
        }

        if row.status.is_purchased() {
            if let Some(item_type) = row.item_type {
                bucket.add_units(item_type, &row.product_ref, row.quantity);
                global.add_units(item_type, &row.product_ref, row.quantity);
            }
        }
    }

    (global, per_event)
}

/// Folds redeemed tickets into existing buckets.
///
/// Events with check-ins but no orders in `per_event` only count globally.
pub fn apply_check_ins(
    global: &mut StatsBucket,
    per_event: &mut BTreeMap<EventId, StatsBucket>,
    check_ins: &[CheckInRow],
) {
    for row in check_ins.iter().filter(|row| row.event_id.is_valid()) {
        global.add_check_in(row.quantity);
        if let Some(bucket) = per_event.get_mut(&row.event_id) {
            bucket.add_check_in(row.quantity);
        }
    }
}

/// Report returned by [`StatsService::ticket_stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketStats {
    /// Across all events in scope.
    pub global: StatsBucket,
    /// Per event, ordered by event id.
    pub events: Vec<StatsBucket>,
}

/// Reads order and check-in rows and reduces them into a [`TicketStats`].
pub struct StatsService<S> {
    store: Arc<S>,
}

impl<S: TicketingStore> StatsService<S> {
    /// Creates the service.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Sales and check-in totals, optionally for a single event.
    ///
    /// # Errors
    ///
    /// Returns a store error if the rows cannot be read.
    pub async fn ticket_stats(&self, event_id: Option<EventId>) -> Result<TicketStats> {
        let rows = self.store.stats_rows(event_id).await?;
        let check_ins = self.store.check_in_rows(event_id).await?;

        let (mut global, mut per_event) = aggregate_stats(&rows);
        apply_check_ins(&mut global, &mut per_event, &check_ins);

        tracing::debug!(
            event_id = ?event_id,
            rows = rows.len(),
            events = per_event.len(),
            "ticket stats aggregated"
        );

        Ok(TicketStats {
            global,
            events: per_event.into_values().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(
        order_id: OrderId,
        event_id: i64,
        status: OrderStatus,
        total_cents: i64,
        item: Option<(ItemType, &str, i64)>,
    ) -> StatsRow {
        let (item_type, product_ref, quantity) = match item {
            Some((item_type, product_ref, quantity)) => (Some(item_type), product_ref.to_string(), quantity),
            None => (None, String::new(), 0),
        };
        StatsRow {
            order_id,
            event_id: EventId::new(event_id),
            event_title: format!("Event {event_id}"),
            status,
            total_cents,
            item_type,
            product_ref,
            quantity,
        }
    }

    #[test]
    fn mixed_orders_aggregate_per_event_and_globally() {
        let (o1, o2, o3, o4) = (OrderId::new(), OrderId::new(), OrderId::new(), OrderId::new());
        let rows = vec![
            row(o1, 1, OrderStatus::Paid, 10_000, Some((ItemType::Ticket, "SINGLE", 2))),
            row(o1, 1, OrderStatus::Paid, 10_000, Some((ItemType::Transfer, "THERE", 1))),
            row(o2, 1, OrderStatus::Redeemed, 20_000, Some((ItemType::Ticket, "GROUP2", 1))),
            row(o3, 2, OrderStatus::Paid, 5_000, Some((ItemType::Ticket, "SINGLE", 1))),
            row(o4, 2, OrderStatus::Pending, 5_000, Some((ItemType::Ticket, "SINGLE", 4))),
        ];

        let (global, per_event) = aggregate_stats(&rows);

        assert_eq!(global.purchased_amount_cents, 35_000);
        assert_eq!(global.redeemed_amount_cents, 20_000);
        assert_eq!(global.ticket_type_counts[&TicketType::Single], 3);
        assert_eq!(global.ticket_type_counts[&TicketType::Group2], 1);
        assert_eq!(global.ticket_type_counts[&TicketType::Group10], 0);
        assert_eq!(global.transfer_direction_counts[&TransferDirection::There], 1);

        assert_eq!(per_event[&EventId::new(1)].purchased_amount_cents, 30_000);
        assert_eq!(per_event[&EventId::new(2)].purchased_amount_cents, 5_000);
        assert_eq!(per_event[&EventId::new(2)].event_title, "Event 2");
    }

    #[test]
    fn multi_item_order_total_counts_once() {
        let order = OrderId::new();
        let rows = vec![
            row(order, 1, OrderStatus::Paid, 7_000, Some((ItemType::Ticket, "SINGLE", 1))),
            row(order, 1, OrderStatus::Paid, 7_000, Some((ItemType::Ticket, "GROUP2", 1))),
        ];

        let (global, per_event) = aggregate_stats(&rows);

        assert_eq!(global.purchased_amount_cents, 7_000);
        assert_eq!(per_event[&EventId::new(1)].purchased_amount_cents, 7_000);
    }

    #[test]
    fn buckets_are_pre_seeded_and_unknown_refs_ignored() {
        let rows = vec![
            row(OrderId::new(), 3, OrderStatus::Paid, 1_000, Some((ItemType::Ticket, "VIP", 5))),
            row(OrderId::new(), 3, OrderStatus::Canceled, 1_000, None),
            row(OrderId::new(), 0, OrderStatus::Paid, 9_999, None),
        ];

        let (global, per_event) = aggregate_stats(&rows);

        assert_eq!(per_event.len(), 1);
        assert_eq!(global.purchased_amount_cents, 1_000);
        assert_eq!(global.ticket_type_counts.len(), 3);
        assert!(global.ticket_type_counts.values().all(|count| *count == 0));
        assert_eq!(global.transfer_direction_counts.len(), 3);
    }

    #[test]
    fn check_ins_count_tickets_and_people() {
        let rows = vec![row(OrderId::new(), 1, OrderStatus::Paid, 1_000, None)];
        let (mut global, mut per_event) = aggregate_stats(&rows);
        let check_ins = [
            CheckInRow { event_id: EventId::new(1), quantity: 2 },
            CheckInRow { event_id: EventId::new(1), quantity: 10 },
            CheckInRow { event_id: EventId::new(9), quantity: 1 },
        ];

        apply_check_ins(&mut global, &mut per_event, &check_ins);

        assert_eq!(global.checked_in_tickets, 3);
        assert_eq!(global.checked_in_people, 13);
        assert_eq!(per_event[&EventId::new(1)].checked_in_tickets, 2);
        assert_eq!(per_event[&EventId::new(1)].checked_in_people, 12);
    }
}
