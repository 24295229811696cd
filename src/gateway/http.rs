use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::debug;

use crate::config::Config;
use crate::error::AppError;
use crate::gateway::{FeedFilter, ShopGateway, Vehicle};

/// Client for the legacy text gateway. Every command is a GET with query
/// parameters except image upload, which the gateway only accepts as a
/// form-encoded POST.
#[derive(Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| AppError::Internal(format!("failed to build http client: {err}")))?;

        Ok(Self {
            client,
            base_url: config.gateway_base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_text(&self, path: &str, query: &[(&str, String)]) -> Result<String, AppError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(%url, "gateway request");
        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Gateway(format!("{path} returned {status}")));
        }
        Ok(response.text().await?)
    }
}

impl ShopGateway for HttpGateway {
    async fn fetch_orders(&self, filter: &FeedFilter) -> Result<String, AppError> {
        let mut query = vec![
            ("command", "getOrders".to_string()),
            ("shop", filter.shop.to_string()),
        ];
        if let Some(courier_id) = &filter.courier_id {
            query.push(("courierid", courier_id.clone()));
            query.push(("date", String::new()));
        }
        if let Some(search) = &filter.search {
            query.push(("search", search.clone()));
        }
        self.get_text("ordersGate", &query).await
    }

    async fn fetch_lifecycle(&self, order_id: &str) -> Result<String, AppError> {
        self.get_text(
            "ordersGate",
            &[
                ("command", "getOrderLifecycle".to_string()),
                ("id", order_id.to_string()),
            ],
        )
        .await
    }

    async fn fetch_couriers(&self) -> Result<String, AppError> {
        self.get_text("shopgateway", &[("command", "getCouriers".to_string())])
            .await
    }

    async fn allocate_courier(&self, order_id: &str, courier_id: &str) -> Result<String, AppError> {
        self.get_text(
            "shopgateway",
            &[
                ("command", "updateCourierForOrder".to_string()),
                ("orderId", order_id.to_string()),
                ("courierId", courier_id.to_string()),
            ],
        )
        .await
    }

    async fn update_pickup_eta(&self, order_id: &str, stamp: &str) -> Result<String, AppError> {
        self.get_text(
            "ordersGate",
            &[
                ("command", "updatePickup".to_string()),
                ("id", order_id.to_string()),
                ("pickupTime", stamp.to_string()),
            ],
        )
        .await
    }

    async fn update_delivery_eta(&self, order_id: &str, stamp: &str) -> Result<String, AppError> {
        self.get_text(
            "ordersGate",
            &[
                ("command", "updateDelivery".to_string()),
                ("id", order_id.to_string()),
                ("delivery", stamp.to_string()),
            ],
        )
        .await
    }

    async fn update_status(&self, order_id: &str, status: i64) -> Result<String, AppError> {
        self.get_text(
            "ordersGate",
            &[
                ("command", "updateStatus".to_string()),
                ("orderId", order_id.to_string()),
                ("status", status.to_string()),
            ],
        )
        .await
    }

    async fn update_order_pod(
        &self,
        order_id: &str,
        pickup_image: bool,
        image_name: &str,
    ) -> Result<String, AppError> {
        self.get_text(
            "ordersGate",
            &[
                ("command", "updateOrderPod".to_string()),
                ("orderId", order_id.to_string()),
                ("pickupImage", if pickup_image { "1" } else { "0" }.to_string()),
                ("generatedName", image_name.to_string()),
            ],
        )
        .await
    }

    async fn upload_image(&self, image_name: &str, bytes: &[u8]) -> Result<String, AppError> {
        let url = format!("{}/saveimage", self.base_url);
        // The legacy endpoint glues the image name into the form key itself.
        let body = format!("{image_name}.pngimage={}", BASE64.encode(bytes));
        let response = self
            .client
            .post(&url)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Gateway(format!("image upload returned {status}")));
        }
        Ok(response.text().await?)
    }

    async fn rebook(&self, shop: u32, order_id: &str, vehicle: Vehicle) -> Result<String, AppError> {
        self.get_text(
            "gophrGateway",
            &[
                ("shop", shop.to_string()),
                ("orderid", order_id.to_string()),
                ("pickupTime", String::new()),
                ("v", vehicle.as_str().to_string()),
            ],
        )
        .await
    }
}
