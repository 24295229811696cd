use serde::{Deserialize, Serialize};

use crate::models::lifecycle::{self, LifecycleEvent};

/// Wire status codes: 1 received, 2 allocated, 3 picked up, 4 en route,
/// 5 delivered, 7 cancelled, 8 rebooked. Anything else is carried through
/// and rendered as unknown rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Received,
    Allocated,
    PickedUp,
    EnRoute,
    Delivered,
    Cancelled,
    Rebooked,
    Unknown(i64),
}

impl OrderStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Received,
            2 => Self::Allocated,
            3 => Self::PickedUp,
            4 => Self::EnRoute,
            5 => Self::Delivered,
            7 => Self::Cancelled,
            8 => Self::Rebooked,
            other => Self::Unknown(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Received => 1,
            Self::Allocated => 2,
            Self::PickedUp => 3,
            Self::EnRoute => 4,
            Self::Delivered => 5,
            Self::Cancelled => 7,
            Self::Rebooked => 8,
            Self::Unknown(code) => code,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled | Self::Rebooked)
    }

    /// Cancel and rebook are only open before delivery.
    pub fn can_escape(self) -> bool {
        self.code() < Self::Delivered.code()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub customer_name: String,
    pub postcode: String,
    pub address: String,
    pub pickup_time: String,
    pub delivery_time: String,
    pub status: OrderStatus,
    pub packed: i64,
    pub phone: String,
    pub total: f64,
    pub icon: String,
    pub pickup_image_url: Option<String>,
    pub delivery_image_url: Option<String>,
    pub allocated_time: String,
    pub pickup_eta: String,
    pub courier_id: String,
    pub courier_name: String,
    pub courier_phone: Option<String>,
    pub lifecycle: String,
}

impl Default for Order {
    fn default() -> Self {
        Self {
            order_id: String::new(),
            customer_name: String::new(),
            postcode: String::new(),
            address: String::new(),
            pickup_time: String::new(),
            delivery_time: String::new(),
            status: OrderStatus::Unknown(0),
            packed: 0,
            phone: String::new(),
            total: 0.0,
            icon: String::new(),
            pickup_image_url: None,
            delivery_image_url: None,
            allocated_time: String::new(),
            pickup_eta: String::new(),
            courier_id: String::new(),
            courier_name: String::new(),
            courier_phone: None,
            lifecycle: String::new(),
        }
    }
}

// Two snapshots with the same id are the same entity; field differences
// are reconciled by the feed, not by equality.
impl PartialEq for Order {
    fn eq(&self, other: &Self) -> bool {
        self.order_id == other.order_id
    }
}

impl Eq for Order {}

impl Order {
    /// The stub created client-side right after checkout, before the feed
    /// has ever returned this order.
    pub fn placed(order_id: &str, address: &str, postcode: &str, delivery_time: &str) -> Self {
        Self {
            order_id: order_id.to_string(),
            address: address.to_string(),
            postcode: postcode.to_string(),
            delivery_time: delivery_time.to_string(),
            status: OrderStatus::Received,
            ..Self::default()
        }
    }

    /// Parsed on demand from the raw log so a server refresh of the string
    /// is never shadowed by a stale parse.
    pub fn lifecycle_events(&self) -> Vec<LifecycleEvent> {
        lifecycle::parse_lifecycle(&self.lifecycle)
    }

    pub fn lifecycle_event(&self, action: &str) -> Option<LifecycleEvent> {
        let events = self.lifecycle_events();
        lifecycle::event_for(&events, action).cloned()
    }

    /// Appends a synthetic event to the raw log, mirroring the tokens the
    /// gateway writes.
    pub fn push_lifecycle_event(&mut self, action: &str, value: &str, timestamp: &str) {
        let token = format!("{action}*{value}*{timestamp}");
        if self.lifecycle.trim().is_empty() {
            self.lifecycle = token;
        } else {
            self.lifecycle.push(',');
            self.lifecycle.push_str(&token);
        }
    }
}
