pub mod http;

use std::future::Future;

use crate::error::AppError;

/// Which slice of the orders feed a session polls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedFilter {
    pub shop: u32,
    pub courier_id: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vehicle {
    Moped,
    Car,
    Van,
}

impl Vehicle {
    pub fn as_str(self) -> &'static str {
        match self {
            Vehicle::Moped => "Moped",
            Vehicle::Car => "Car",
            Vehicle::Van => "Van",
        }
    }
}

/// Commands acknowledge with an opaque body containing this marker.
pub fn ack_ok(body: &str) -> bool {
    body.contains("|Ok|")
}

/// The seam to the legacy text gateway. Methods return raw response
/// bodies; decoding lives in `wire` so the in-memory test double speaks
/// the same format the real service does.
pub trait ShopGateway: Send + Sync + 'static {
    fn fetch_orders(
        &self,
        filter: &FeedFilter,
    ) -> impl Future<Output = Result<String, AppError>> + Send;

    fn fetch_lifecycle(
        &self,
        order_id: &str,
    ) -> impl Future<Output = Result<String, AppError>> + Send;

    fn fetch_couriers(&self) -> impl Future<Output = Result<String, AppError>> + Send;

    fn allocate_courier(
        &self,
        order_id: &str,
        courier_id: &str,
    ) -> impl Future<Output = Result<String, AppError>> + Send;

    fn update_pickup_eta(
        &self,
        order_id: &str,
        stamp: &str,
    ) -> impl Future<Output = Result<String, AppError>> + Send;

    fn update_delivery_eta(
        &self,
        order_id: &str,
        stamp: &str,
    ) -> impl Future<Output = Result<String, AppError>> + Send;

    fn update_status(
        &self,
        order_id: &str,
        status: i64,
    ) -> impl Future<Output = Result<String, AppError>> + Send;

    fn update_order_pod(
        &self,
        order_id: &str,
        pickup_image: bool,
        image_name: &str,
    ) -> impl Future<Output = Result<String, AppError>> + Send;

    fn upload_image(
        &self,
        image_name: &str,
        bytes: &[u8],
    ) -> impl Future<Output = Result<String, AppError>> + Send;

    fn rebook(
        &self,
        shop: u32,
        order_id: &str,
        vehicle: Vehicle,
    ) -> impl Future<Output = Result<String, AppError>> + Send;
}
