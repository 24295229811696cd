use tracing::debug;

use crate::error::AppError;
use crate::models::order::{Order, OrderStatus};
use crate::wire::{self, Field, RowSchema, ROW_SEPARATOR};

/// Field positions observed on the orders feed. The gateway emits 41+
/// fields per row; only these carry meaning for this app.
pub static FEED_SCHEMA: RowSchema = RowSchema {
    name: "order",
    min_fields: 10,
    fields: &[
        Field::at("customerName", 0),
        Field::at("address", 1),
        Field::at("postcode", 2),
        Field::at("orderId", 3),
        Field::at("total", 4),
        Field::at("status", 6),
        Field::at("pickupTime", 9),
        Field::at("deliveryTime", 10),
        Field::at("phone", 28),
        Field::at("packed", 29),
        Field::at("icon", 30),
        Field::at("pickupImageUrl", 32),
        Field::at("deliveryImageUrl", 33),
        Field::at("allocatedTime", 36),
        Field::at("pickupEta", 37),
        Field::at("courierName", 38),
        Field::at("courierPhone", 39),
        Field::at("lifecycle", 40),
    ],
};

pub struct FeedBatch {
    pub orders: Vec<Order>,
    pub dropped_rows: usize,
}

/// Decodes a full feed body. Malformed rows are dropped and counted, never
/// fatal to the batch.
pub fn decode_feed(body: &str) -> FeedBatch {
    let mut orders = Vec::new();
    let mut dropped_rows = 0;

    for row in body.split(ROW_SEPARATOR) {
        if row.trim().is_empty() {
            continue;
        }
        match decode_row(row) {
            Ok(order) => orders.push(order),
            Err(err) => {
                dropped_rows += 1;
                debug!(error = %err, "dropping malformed order row");
            }
        }
    }

    FeedBatch { orders, dropped_rows }
}

pub fn decode_row(row: &str) -> Result<Order, AppError> {
    let decoded = FEED_SCHEMA.decode(row)?;

    Ok(Order {
        order_id: decoded.str_at("orderId"),
        customer_name: wire::decode_html_entities(&decoded.str_at("customerName")),
        postcode: decoded.str_at("postcode"),
        address: wire::decode_html_entities(&decoded.str_at("address")),
        pickup_time: wire::format_display_time(&decoded.str_at("pickupTime")),
        delivery_time: decoded.str_at("deliveryTime"),
        status: OrderStatus::from_code(decoded.i64_at("status")),
        packed: decoded.i64_at("packed"),
        phone: decoded.str_at("phone"),
        total: decoded.f64_at("total"),
        icon: decoded.str_at("icon"),
        pickup_image_url: decoded.opt_at("pickupImageUrl"),
        delivery_image_url: decoded.opt_at("deliveryImageUrl"),
        allocated_time: wire::format_display_time(&decoded.str_at("allocatedTime")),
        pickup_eta: wire::format_display_time(&decoded.str_at("pickupEta")),
        courier_id: String::new(),
        courier_name: decoded.str_at("courierName"),
        courier_phone: decoded.opt_at("courierPhone"),
        lifecycle: decoded.str_at("lifecycle"),
    })
}

#[cfg(test)]
pub(crate) fn feed_row(
    order_id: &str,
    customer_name: &str,
    postcode: &str,
    status: i64,
    lifecycle: &str,
) -> String {
    let mut fields = vec![String::new(); 41];
    fields[0] = customer_name.to_string();
    fields[1] = "12 Mare St".to_string();
    fields[2] = postcode.to_string();
    fields[3] = order_id.to_string();
    fields[4] = "24.50".to_string();
    fields[6] = status.to_string();
    fields[28] = "07700900123".to_string();
    fields[29] = "1".to_string();
    fields[38] = "Dan Smith".to_string();
    fields[39] = "07700900001".to_string();
    fields[40] = lifecycle.to_string();
    fields.join("|")
}
