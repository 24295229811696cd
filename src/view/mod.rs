//! Pure derivations over an order and its parsed lifecycle log. Nothing
//! here holds state; every screen recomputes from the latest snapshot.

use chrono::{Local, NaiveDateTime};

use crate::models::lifecycle::{self, LifecycleEvent};
use crate::models::order::{Order, OrderStatus};
use crate::wire;

/// Status text for list rows and the detail header. Couriers are shown by
/// first name once one is on the job.
pub fn status_label(order: &Order) -> String {
    let base = match order.status {
        OrderStatus::Received => "Received",
        OrderStatus::Allocated => "Allocated",
        OrderStatus::PickedUp => "Picked up",
        OrderStatus::EnRoute => "En route",
        OrderStatus::Delivered => "Delivered",
        OrderStatus::Cancelled => "Cancelled",
        OrderStatus::Rebooked => "Rebooked",
        OrderStatus::Unknown(_) => "Unknown status",
    };

    let with_courier = matches!(
        order.status,
        OrderStatus::Allocated | OrderStatus::PickedUp | OrderStatus::EnRoute
    );
    match courier_first_name(order) {
        Some(first) if with_courier => format!("{base} - {first}"),
        _ => base.to_string(),
    }
}

pub fn courier_first_name(order: &Order) -> Option<&str> {
    order.courier_name.split_whitespace().next()
}

/// Minutes between the received and deliveryEta events, clamped at zero.
/// Missing events or unparseable values degrade to no delay, never an
/// error.
pub fn delivery_eta_delay(order: &Order) -> i64 {
    let events = order.lifecycle_events();
    let received = lifecycle::event_for(&events, "received")
        .and_then(|event| wire::parse_wire_date(&event.value));
    let delivery_eta = lifecycle::event_for(&events, "deliveryEta")
        .and_then(|event| wire::parse_wire_date(&event.value));

    match (received, delivery_eta) {
        (Some(received), Some(eta)) => (eta - received).num_minutes().max(0),
        _ => 0,
    }
}

pub fn delay_text(order: &Order) -> Option<String> {
    let delay = delivery_eta_delay(order);
    (delay > 0).then(|| format!("Delay {delay} min"))
}

pub fn eta_display_text(raw: &str) -> String {
    eta_display_text_at(raw, Local::now().naive_local())
}

/// Three-tier ETA rendering: a forward window under an hour shows a
/// `{m}-{m+5}` range, a trailing window under an hour shows minutes ago,
/// everything else (including exactly 0 and ±60 minutes) falls back to the
/// absolute time.
pub fn eta_display_text_at(raw: &str, now: NaiveDateTime) -> String {
    let Some(target) = wire::parse_wire_date(raw) else {
        return String::new();
    };

    let minutes = (target - now).num_minutes();
    if minutes > 0 && minutes < 60 {
        format!("ETA {}-{} min", minutes, minutes + 5)
    } else if minutes < 0 && minutes > -60 {
        format!("ETA {} min ago", -minutes)
    } else {
        target.format("%a %d/%m %H:%M").to_string()
    }
}

/// The big headline on the order detail screen.
pub fn headline_text(order: &Order) -> String {
    headline_text_at(order, Local::now().naive_local())
}

pub fn headline_text_at(order: &Order, now: NaiveDateTime) -> String {
    match order.status {
        OrderStatus::Delivered => "Delivered".to_string(),
        OrderStatus::Cancelled => "Cancelled".to_string(),
        _ => next_expected_time(order)
            .map(|raw| eta_display_text_at(&raw, now))
            .unwrap_or_default(),
    }
}

/// The timestamp the order is currently tracking towards: the deliveryEta
/// event, else the received event, else the raw delivery-time field.
pub fn next_expected_time(order: &Order) -> Option<String> {
    let events = order.lifecycle_events();
    if let Some(event) = lifecycle::event_for(&events, "deliveryEta") {
        return Some(event.value.clone());
    }
    if let Some(event) = lifecycle::event_for(&events, "received") {
        return Some(event.value.clone());
    }
    if order.delivery_time.trim().is_empty() {
        None
    } else {
        Some(order.delivery_time.clone())
    }
}

pub fn is_overdue(order: &Order, now: NaiveDateTime) -> bool {
    next_expected_time(order)
        .and_then(|raw| wire::parse_wire_date(&raw))
        .is_some_and(|target| target < now)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionButton {
    pub label: &'static str,
    pub enabled: bool,
}

/// The single action affordance each screen shows for an order. Delivered
/// and later statuses disable it entirely.
pub fn action_button(order: &Order, customer_mode: bool) -> ActionButton {
    if customer_mode {
        return ActionButton {
            label: "Need help? Chat with us for support",
            enabled: true,
        };
    }

    let label = match order.status.code() {
        0..=2 => "Update pickup time",
        3 => "Mark as Collected",
        4 => "Mark as Delivered",
        5 => "Delivered",
        _ => "Unknown",
    };
    ActionButton {
        label,
        enabled: order.status.code() < 5,
    }
}

/// Clock text for a lifecycle bubble; unparseable timestamps pass through
/// unchanged.
pub fn event_clock(event: &LifecycleEvent) -> String {
    let raw = event.timestamp.trim();
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return parsed.format("%H:%M").to_string();
        }
    }
    raw.to_string()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{
        action_button, delay_text, delivery_eta_delay, eta_display_text_at, headline_text_at,
        is_overdue, status_label,
    };
    use crate::models::lifecycle::LifecycleEvent;
    use crate::models::order::{Order, OrderStatus};

    fn now() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn order_with(status: OrderStatus, lifecycle: &str) -> Order {
        Order {
            order_id: "100".to_string(),
            status,
            lifecycle: lifecycle.to_string(),
            ..Order::default()
        }
    }

    #[test]
    fn labels_cover_every_status() {
        assert_eq!(status_label(&order_with(OrderStatus::Received, "")), "Received");
        assert_eq!(status_label(&order_with(OrderStatus::Delivered, "")), "Delivered");
        assert_eq!(status_label(&order_with(OrderStatus::Cancelled, "")), "Cancelled");
        assert_eq!(status_label(&order_with(OrderStatus::Rebooked, "")), "Rebooked");
        assert_eq!(
            status_label(&order_with(OrderStatus::Unknown(9), "")),
            "Unknown status"
        );
    }

    #[test]
    fn courier_first_name_is_appended_while_on_the_job() {
        let mut order = order_with(OrderStatus::EnRoute, "");
        order.courier_name = "Dan Smith".to_string();
        assert_eq!(status_label(&order), "En route - Dan");

        order.status = OrderStatus::Received;
        assert_eq!(status_label(&order), "Received");

        order.status = OrderStatus::Allocated;
        order.courier_name = String::new();
        assert_eq!(status_label(&order), "Allocated");
    }

    #[test]
    fn delay_is_minutes_between_received_and_delivery_eta() {
        let order = order_with(
            OrderStatus::Allocated,
            "received*3/1/2024 10:00:00 AM*10:00,deliveryEta*3/1/2024 10:40:00 AM*10:00",
        );
        assert_eq!(delivery_eta_delay(&order), 40);
        assert_eq!(delay_text(&order).as_deref(), Some("Delay 40 min"));
    }

    #[test]
    fn delay_clamps_to_zero_when_eta_precedes_received() {
        let order = order_with(
            OrderStatus::Allocated,
            "received*3/1/2024 10:40:00 AM*10:40,deliveryEta*3/1/2024 10:00:00 AM*10:00",
        );
        assert_eq!(delivery_eta_delay(&order), 0);
        assert!(delay_text(&order).is_none());
    }

    #[test]
    fn delay_degrades_to_zero_on_missing_or_unparseable_events() {
        assert_eq!(delivery_eta_delay(&order_with(OrderStatus::Received, "")), 0);
        let order = order_with(
            OrderStatus::Received,
            "received*not a date*10:00,deliveryEta*3/1/2024 10:40:00 AM*10:00",
        );
        assert_eq!(delivery_eta_delay(&order), 0);
    }

    #[test]
    fn eta_text_boundaries_are_exact() {
        // 0 minutes: absolute fallback, neither relative branch.
        assert_eq!(eta_display_text_at("2024-03-01 10:00", now()), "Fri 01/03 10:00");
        // 59 minutes ahead: forward window.
        assert_eq!(eta_display_text_at("2024-03-01 10:59", now()), "ETA 59-64 min");
        // 60 minutes ahead: absolute fallback.
        assert_eq!(eta_display_text_at("2024-03-01 11:00", now()), "Fri 01/03 11:00");
        // 59 minutes behind: trailing window.
        assert_eq!(eta_display_text_at("2024-03-01 09:01", now()), "ETA 59 min ago");
        // 60 minutes behind: absolute fallback.
        assert_eq!(eta_display_text_at("2024-03-01 09:00", now()), "Fri 01/03 09:00");
    }

    #[test]
    fn eta_text_accepts_both_wire_formats_and_rejects_junk() {
        assert_eq!(
            eta_display_text_at("3/1/2024 10:30:00 AM", now()),
            "ETA 30-35 min"
        );
        assert_eq!(eta_display_text_at("whenever", now()), "");
    }

    #[test]
    fn headline_prefers_terminal_statuses() {
        assert_eq!(
            headline_text_at(&order_with(OrderStatus::Delivered, ""), now()),
            "Delivered"
        );
        assert_eq!(
            headline_text_at(&order_with(OrderStatus::Cancelled, ""), now()),
            "Cancelled"
        );
        let active = order_with(
            OrderStatus::EnRoute,
            "deliveryEta*2024-03-01 10:30*10:00",
        );
        assert_eq!(headline_text_at(&active, now()), "ETA 30-35 min");
    }

    #[test]
    fn overdue_follows_the_fallback_priority() {
        let eta_passed = order_with(
            OrderStatus::EnRoute,
            "received*3/1/2024 11:00:00 AM*09:00,deliveryEta*3/1/2024 09:30:00 AM*09:00",
        );
        assert!(is_overdue(&eta_passed, now()));

        let received_only = order_with(OrderStatus::Received, "received*3/1/2024 11:00:00 AM*09:00");
        assert!(!is_overdue(&received_only, now()));

        let mut field_only = order_with(OrderStatus::Received, "");
        field_only.delivery_time = "2024-03-01 09:45".to_string();
        assert!(is_overdue(&field_only, now()));

        let nothing = order_with(OrderStatus::Received, "");
        assert!(!is_overdue(&nothing, now()));
    }

    #[test]
    fn action_button_tracks_status() {
        let cases = [
            (OrderStatus::Received, "Update pickup time", true),
            (OrderStatus::Allocated, "Update pickup time", true),
            (OrderStatus::PickedUp, "Mark as Collected", true),
            (OrderStatus::EnRoute, "Mark as Delivered", true),
            (OrderStatus::Delivered, "Delivered", false),
            (OrderStatus::Cancelled, "Unknown", false),
            (OrderStatus::Rebooked, "Unknown", false),
        ];
        for (status, label, enabled) in cases {
            let button = action_button(&order_with(status, ""), false);
            assert_eq!(button.label, label);
            assert_eq!(button.enabled, enabled);
        }

        let support = action_button(&order_with(OrderStatus::Received, ""), true);
        assert_eq!(support.label, "Need help? Chat with us for support");
    }

    #[test]
    fn event_clock_extracts_the_time_of_day() {
        let event = LifecycleEvent {
            action: "allocated".to_string(),
            value: String::new(),
            timestamp: "2024-03-01 10:15:30".to_string(),
        };
        assert_eq!(super::event_clock(&event), "10:15");

        let raw = LifecycleEvent {
            action: "allocated".to_string(),
            value: String::new(),
            timestamp: "10:15".to_string(),
        };
        assert_eq!(super::event_clock(&raw), "10:15");
    }
}
