//! Orders, cart lines and the order history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{HistoryId, OrderId, OrderStatus, ProductId, VehicleTag};

/// One (material, quantity) line of a cart or order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub catalog_entry_id: ProductId,
    pub name: String,
    pub quantity: i32,
}

/// Who placed an order.
///
/// Orders carry names only, not an account id; history visibility for
/// non-admins is decided by matching both names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requester {
    pub given_name: String,
    pub family_name: String,
}

impl Requester {
    #[must_use]
    pub fn new(given_name: impl Into<String>, family_name: impl Into<String>) -> Self {
        Self {
            given_name: given_name.into(),
            family_name: family_name.into(),
        }
    }

    /// Grouping key used by the history page (`"given family"`).
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.given_name, self.family_name)
    }
}

/// A submitted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub vehicle_tag: VehicleTag,
    pub lines: Vec<CartLine>,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub requester: Requester,
}

impl Order {
    /// Total number of units across all lines.
    #[must_use]
    pub fn total_units(&self) -> i64 {
        self.lines.iter().map(|l| i64::from(l.quantity)).sum()
    }
}

/// Input for creating a pending order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub vehicle_tag: VehicleTag,
    pub lines: Vec<CartLine>,
    pub requester: Requester,
    pub created_at: DateTime<Utc>,
}

/// A completed order archived in history.
///
/// `order` is the full pending document as it was at completion time, with
/// its status switched to [`OrderStatus::Completed`]; `order.id` is the id the
/// pending order had, and the store keeps at most one record per such id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalOrder {
    pub id: HistoryId,
    pub order: Order,
    pub completed_at: DateTime<Utc>,
}

impl HistoricalOrder {
    /// The id of the pending order this record was archived from.
    #[must_use]
    pub const fn source_order_id(&self) -> OrderId {
        self.order.id
    }

    /// Whether a non-admin requester may see this record.
    #[must_use]
    pub fn is_visible_to(&self, requester: &Requester) -> bool {
        self.order.requester.given_name == requester.given_name
            && self.order.requester.family_name == requester.family_name
    }
}
