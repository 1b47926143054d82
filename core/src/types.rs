//! Domain types for the ticketing core.
//!
//! Identifiers are newtypes so an [`OrderId`] can never be passed where a
//! [`TicketId`] is expected. Enum-like catalog fields (ticket type, transfer
//! direction, discount type, payment method) are parsed case-insensitively
//! and serialize in their canonical upper-case form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Free-form, JSON-compatible metadata carried through untouched.
///
/// Used for order item snapshots (`meta`) and transfer route details (`info`).
pub type Meta = serde_json::Map<String, serde_json::Value>;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            #[must_use]
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }
    };
}

macro_rules! int_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw numeric identifier.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the raw numeric identifier.
            #[must_use]
            pub const fn get(&self) -> i64 {
                self.0
            }

            /// Identifiers issued by the surrounding platform are strictly positive.
            #[must_use]
            pub const fn is_valid(&self) -> bool {
                self.0 > 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for an order.
    OrderId
);
uuid_id!(
    /// Unique identifier for an issued ticket.
    TicketId
);
uuid_id!(
    /// Unique identifier for a ticket or transfer product.
    ProductId
);
uuid_id!(
    /// Unique identifier for a promo code.
    PromoCodeId
);
int_id!(
    /// Identifier of an event owned by the surrounding platform.
    EventId
);
int_id!(
    /// Identifier of a platform user (purchaser or operator).
    UserId
);

/// The operator performing a transition. Operators are platform users.
pub type AdminId = UserId;

/// Normalises an enum-like input: surrounding whitespace dropped, upper-cased.
#[must_use]
pub fn normalize_token(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Ticket tier. Each tier admits a fixed number of people.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketType {
    /// Admits one person.
    Single,
    /// Admits two people.
    Group2,
    /// Admits ten people.
    Group10,
}

impl TicketType {
    /// Every ticket type, in reporting order.
    pub const ALL: [Self; 3] = [Self::Single, Self::Group2, Self::Group10];

    /// Number of people one ticket of this type admits.
    #[must_use]
    pub const fn group_size(self) -> u32 {
        match self {
            Self::Single => 1,
            Self::Group2 => 2,
            Self::Group10 => 10,
        }
    }

    /// Canonical string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Single => "SINGLE",
            Self::Group2 => "GROUP2",
            Self::Group10 => "GROUP10",
        }
    }

    /// Parses a ticket type, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match normalize_token(raw).as_str() {
            "SINGLE" => Some(Self::Single),
            "GROUP2" => Some(Self::Group2),
            "GROUP10" => Some(Self::Group10),
            _ => None,
        }
    }
}

impl fmt::Display for TicketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a transport add-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferDirection {
    /// To the venue.
    There,
    /// From the venue.
    Back,
    /// Both ways.
    Roundtrip,
}

impl TransferDirection {
    /// Every direction, in reporting order.
    pub const ALL: [Self; 3] = [Self::There, Self::Back, Self::Roundtrip];

    /// Canonical string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::There => "THERE",
            Self::Back => "BACK",
            Self::Roundtrip => "ROUNDTRIP",
        }
    }

    /// Parses a direction, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match normalize_token(raw).as_str() {
            "THERE" => Some(Self::There),
            "BACK" => Some(Self::Back),
            "ROUNDTRIP" => Some(Self::Roundtrip),
            _ => None,
        }
    }
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a promo code computes its discount.
///
/// Unknown types are kept verbatim so a stored code with an unexpected type
/// surfaces as `unsupported_discount_type` at validation time instead of
/// failing to load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DiscountType {
    /// Percentage of the subtotal, clamped to 100.
    Percent,
    /// Fixed amount in minor units, clamped to the subtotal.
    Fixed,
    /// Anything else, upper-cased.
    Other(String),
}

impl DiscountType {
    /// Parses a discount type, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match normalize_token(raw).as_str() {
            "PERCENT" => Self::Percent,
            "FIXED" => Self::Fixed,
            other => Self::Other(other.to_string()),
        }
    }

    /// Canonical string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Percent => "PERCENT",
            Self::Fixed => "FIXED",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for DiscountType {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<DiscountType> for String {
    fn from(value: DiscountType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for DiscountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order status.
///
/// `PAID` is canonical. `CONFIRMED` is accepted on input as an alias and never
/// produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created, awaiting payment confirmation.
    Pending,
    /// Payment confirmed, tickets issued.
    #[serde(alias = "CONFIRMED")]
    Paid,
    /// Canceled by an operator.
    Canceled,
    /// Every ticket redeemed.
    Redeemed,
}

impl OrderStatus {
    /// Canonical string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Canceled => "CANCELED",
            Self::Redeemed => "REDEEMED",
        }
    }

    /// Parses a status. `CONFIRMED` maps to [`OrderStatus::Paid`].
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match normalize_token(raw).as_str() {
            "PENDING" => Some(Self::Pending),
            "PAID" | "CONFIRMED" => Some(Self::Paid),
            "CANCELED" => Some(Self::Canceled),
            "REDEEMED" => Some(Self::Redeemed),
            _ => None,
        }
    }

    /// Whether the order counts as purchased revenue.
    #[must_use]
    pub const fn is_purchased(self) -> bool {
        matches!(self, Self::Paid | Self::Redeemed)
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Canceled | Self::Redeemed)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepted payment methods for new orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    /// Bank transfer to a phone number.
    Phone,
    /// Stablecoin transfer.
    Usdt,
    /// Static payment QR code.
    PaymentQr,
}

impl PaymentMethod {
    /// Canonical string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Phone => "PHONE",
            Self::Usdt => "USDT",
            Self::PaymentQr => "PAYMENT_QR",
        }
    }

    /// Parses a payment method against the allow-list.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match normalize_token(raw).as_str() {
            "PHONE" => Some(Self::Phone),
            "USDT" => Some(Self::Usdt),
            "PAYMENT_QR" => Some(Self::PaymentQr),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of product an order line refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemType {
    /// Admission ticket.
    Ticket,
    /// Transport add-on.
    Transfer,
}

impl ItemType {
    /// Canonical string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ticket => "TICKET",
            Self::Transfer => "TRANSFER",
        }
    }

    /// Parses an item type.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match normalize_token(raw).as_str() {
            "TICKET" => Some(Self::Ticket),
            "TRANSFER" => Some(Self::Transfer),
            _ => None,
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-event ticket tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketProduct {
    /// Product identifier.
    pub id: ProductId,
    /// Event this product sells admission to.
    pub event_id: EventId,
    /// Display name.
    pub name: String,
    /// Tier.
    #[serde(rename = "type")]
    pub ticket_type: TicketType,
    /// Unit price in minor currency units.
    pub price_cents: i64,
    /// Optional cap on `sold_count`.
    pub inventory_limit: Option<u32>,
    /// Units reserved by confirmed orders.
    pub sold_count: u32,
    /// Whether the product can be purchased.
    pub is_active: bool,
    /// Operator who created the product.
    pub created_by: Option<UserId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// Per-event transport add-on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProduct {
    /// Product identifier.
    pub id: ProductId,
    /// Event this transfer serves.
    pub event_id: EventId,
    /// Display name.
    pub name: String,
    /// Direction.
    pub direction: TransferDirection,
    /// Unit price in minor currency units.
    pub price_cents: i64,
    /// Route details, opaque to the core.
    pub info: Meta,
    /// Optional cap on `sold_count`.
    pub inventory_limit: Option<u32>,
    /// Units reserved by confirmed orders.
    pub sold_count: u32,
    /// Whether the product can be purchased.
    pub is_active: bool,
    /// Operator who created the product.
    pub created_by: Option<UserId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// Discount rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoCode {
    /// Promo identifier.
    pub id: PromoCodeId,
    /// Code as entered by purchasers, stored upper-cased.
    pub code: String,
    /// Discount computation.
    pub discount_type: DiscountType,
    /// Percentage or minor-unit amount, depending on `discount_type`.
    pub value: i64,
    /// Optional cap on `used_count`.
    pub usage_limit: Option<u32>,
    /// Orders currently holding this code.
    pub used_count: u32,
    /// Inclusive start of the activity window.
    pub active_from: Option<DateTime<Utc>>,
    /// Inclusive end of the activity window.
    pub active_to: Option<DateTime<Utc>>,
    /// Event scope; `None` means the code is global.
    pub event_id: Option<EventId>,
    /// Whether the code can be used at all.
    pub is_active: bool,
    /// Operator who created the code.
    pub created_by: Option<UserId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// A purchase intent for one event by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Order identifier.
    pub id: OrderId,
    /// Purchaser.
    pub user_id: UserId,
    /// Event.
    pub event_id: EventId,
    /// Event title, filled when read together with the event.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub event_title: String,
    /// Lifecycle state.
    pub status: OrderStatus,
    /// How the purchaser pays.
    pub payment_method: PaymentMethod,
    /// Purchaser-supplied payment reference.
    pub payment_reference: Option<String>,
    /// Operator-facing note about payment handling.
    pub payment_notes: Option<String>,
    /// Applied promo code, if any.
    pub promo_code_id: Option<PromoCodeId>,
    /// Sum of line totals.
    pub subtotal_cents: i64,
    /// Promo discount.
    pub discount_cents: i64,
    /// `subtotal - discount`, never negative.
    pub total_cents: i64,
    /// ISO currency code.
    pub currency: String,
    /// When payment was confirmed.
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Operator who confirmed.
    pub confirmed_by: Option<AdminId>,
    /// When the order was canceled.
    pub canceled_at: Option<DateTime<Utc>>,
    /// Operator who canceled.
    pub canceled_by: Option<AdminId>,
    /// Why the order was canceled.
    pub canceled_reason: Option<String>,
    /// When the last ticket was redeemed.
    pub redeemed_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// Immutable snapshot of one product line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    /// Sequential item identifier. Also the lock order for an order's items.
    pub id: i64,
    /// Owning order.
    pub order_id: OrderId,
    /// Ticket or transfer.
    pub item_type: ItemType,
    /// Referenced product.
    pub product_id: ProductId,
    /// Ticket type or direction at purchase time.
    pub product_ref: String,
    /// Units purchased.
    pub quantity: u32,
    /// Unit price at purchase time.
    pub unit_price_cents: i64,
    /// `unit_price_cents * quantity`.
    pub line_total_cents: i64,
    /// Snapshot details (`ticketType`/`groupSize` or `direction`/`info`).
    pub meta: Meta,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// One redeemable admission unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    /// Ticket identifier.
    pub id: TicketId,
    /// Owning order.
    pub order_id: OrderId,
    /// Owning order's status, filled by ticket listings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_status: Option<OrderStatus>,
    /// Ticket holder.
    pub user_id: UserId,
    /// Event.
    pub event_id: EventId,
    /// Tier.
    pub ticket_type: TicketType,
    /// Number of people this ticket admits.
    pub quantity: u32,
    /// Signed token, set at confirmation.
    pub qr_payload: Option<String>,
    /// Hex SHA-256 of `qr_payload`.
    pub qr_payload_hash: Option<String>,
    /// When the token was issued.
    pub qr_issued_at: Option<DateTime<Utc>>,
    /// When the ticket was redeemed.
    pub redeemed_at: Option<DateTime<Utc>>,
    /// Operator who redeemed.
    pub redeemed_by: Option<AdminId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    /// Whether the ticket has been checked in.
    #[must_use]
    pub const fn is_redeemed(&self) -> bool {
        self.redeemed_at.is_some()
    }
}

/// Delivery identity of a purchaser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchaser {
    /// Platform user.
    pub user_id: UserId,
    /// Messaging identity used to push tickets, if linked.
    pub messenger_id: Option<i64>,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Handle.
    pub username: String,
}

/// An order with everything hanging off it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetail {
    /// The order.
    pub order: Order,
    /// Purchaser summary, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchaser: Option<Purchaser>,
    /// Line items in id order.
    pub items: Vec<OrderItem>,
    /// Tickets in creation order.
    pub tickets: Vec<Ticket>,
}

/// An order row in listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    /// The order.
    pub order: Order,
    /// Purchaser summary, when the user still exists.
    pub purchaser: Option<Purchaser>,
}

/// One page of results plus the unpaginated total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Total matching rows.
    pub total: u64,
}
