use std::sync::Arc;

use chrono::{Duration, Local};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{Config, SessionContext};
use crate::error::AppError;
use crate::feed::OrderStore;
use crate::gateway::{self, ShopGateway, Vehicle};
use crate::models::courier::CourierDirectory;
use crate::models::order::{Order, OrderStatus};
use crate::observability::metrics::Metrics;

const ETA_STAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Drives the order status state machine. Local state is updated
/// optimistically on each accepted transition; the feed poll is the
/// authority that later confirms or corrects it. Transitions on the same
/// order are serialized, different orders run independently.
pub struct TransitionEngine<G> {
    gateway: Arc<G>,
    store: Arc<OrderStore>,
    directory: CourierDirectory,
    context: SessionContext,
    shop_id: u32,
    eta_buffer_minutes: i64,
    metrics: Metrics,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<G: ShopGateway> TransitionEngine<G> {
    pub fn new(
        gateway: Arc<G>,
        store: Arc<OrderStore>,
        directory: CourierDirectory,
        context: SessionContext,
        config: &Config,
        metrics: Metrics,
    ) -> Self {
        Self {
            gateway,
            store,
            directory,
            context,
            shop_id: config.shop_id,
            eta_buffer_minutes: config.eta_buffer_minutes,
            metrics,
            locks: DashMap::new(),
        }
    }

    fn order_lock(&self, order_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(order_id.to_string())
            .or_default()
            .clone()
    }

    fn load(&self, order_id: &str) -> Result<Order, AppError> {
        self.store
            .get(order_id)
            .ok_or_else(|| AppError::OrderNotFound(order_id.to_string()))
    }

    fn record(&self, transition: &str, outcome: &str) {
        self.metrics
            .transitions_total
            .with_label_values(&[transition, outcome])
            .inc();
    }

    /// Assigns a courier. Admin-only; the courier must exist in the
    /// session's directory.
    pub async fn allocate(&self, order_id: &str, courier_id: &str) -> Result<Order, AppError> {
        let lock = self.order_lock(order_id);
        let _guard = lock.lock().await;

        if !self.context.is_admin() {
            self.record("allocate", "rejected");
            return Err(AppError::InvalidTransition(
                "courier allocation is an admin action".to_string(),
            ));
        }
        if courier_id.trim().is_empty() {
            self.record("allocate", "rejected");
            return Err(AppError::UnknownCourier(courier_id.to_string()));
        }
        let Some(courier) = self.directory.find(courier_id) else {
            self.record("allocate", "rejected");
            return Err(AppError::UnknownCourier(courier_id.to_string()));
        };

        let order = self.load(order_id)?;
        if !matches!(order.status, OrderStatus::Received | OrderStatus::Allocated) {
            self.record("allocate", "rejected");
            return Err(AppError::InvalidTransition(format!(
                "cannot allocate a courier at status {}",
                order.status.code()
            )));
        }

        let timestamp = Local::now().format("%H:%M").to_string();
        let updated = self
            .store
            .apply_optimistic(order_id, |order| {
                order.status = OrderStatus::Allocated;
                order.courier_id = courier.id.clone();
                order.courier_name = courier.name.clone();
                order.push_lifecycle_event("allocated", &courier.name, &timestamp);
            })
            .ok_or_else(|| AppError::OrderNotFound(order_id.to_string()))?;

        if let Err(err) = self.gateway.allocate_courier(order_id, courier_id).await {
            warn!(error = %err, order_id, "allocate command failed; awaiting poll correction");
        }
        info!(order_id, courier = %courier.name, "courier allocated");
        self.record("allocate", "applied");
        Ok(updated)
    }

    /// Sets the pickup ETA from a minutes-from-now input. Does not advance
    /// the status; collection progress is a separate transition.
    pub async fn set_pickup_eta(&self, order_id: &str, minutes: &str) -> Result<Order, AppError> {
        let lock = self.order_lock(order_id);
        let _guard = lock.lock().await;

        let minutes = parse_minutes(minutes).inspect_err(|_| {
            self.record("pickup_eta", "rejected");
        })?;
        let order = self.load(order_id)?;
        if !matches!(order.status, OrderStatus::Received | OrderStatus::Allocated) {
            self.record("pickup_eta", "rejected");
            return Err(AppError::InvalidTransition(format!(
                "cannot set a pickup eta at status {}",
                order.status.code()
            )));
        }

        let stamp = self.eta_stamp(minutes);
        let timestamp = Local::now().format("%H:%M").to_string();
        let updated = self
            .store
            .apply_note(order_id, |order| {
                order.push_lifecycle_event("pickupEta", &stamp, &timestamp);
            })
            .ok_or_else(|| AppError::OrderNotFound(order_id.to_string()))?;

        if let Err(err) = self.gateway.update_pickup_eta(order_id, &stamp).await {
            warn!(error = %err, order_id, "pickup eta command failed");
        }
        self.record("pickup_eta", "applied");
        Ok(updated)
    }

    pub async fn set_delivery_eta(&self, order_id: &str, minutes: &str) -> Result<Order, AppError> {
        let lock = self.order_lock(order_id);
        let _guard = lock.lock().await;

        let minutes = parse_minutes(minutes).inspect_err(|_| {
            self.record("delivery_eta", "rejected");
        })?;
        let order = self.load(order_id)?;
        if !matches!(order.status, OrderStatus::PickedUp | OrderStatus::EnRoute) {
            self.record("delivery_eta", "rejected");
            return Err(AppError::InvalidTransition(format!(
                "cannot set a delivery eta at status {}",
                order.status.code()
            )));
        }

        let stamp = self.eta_stamp(minutes);
        let timestamp = Local::now().format("%H:%M").to_string();
        let updated = self
            .store
            .apply_note(order_id, |order| {
                order.push_lifecycle_event("deliveryEta", &stamp, &timestamp);
            })
            .ok_or_else(|| AppError::OrderNotFound(order_id.to_string()))?;

        if let Err(err) = self.gateway.update_delivery_eta(order_id, &stamp).await {
            warn!(error = %err, order_id, "delivery eta command failed");
        }
        self.record("delivery_eta", "applied");
        Ok(updated)
    }

    /// Collection proof: uploads the photo, then advances to en route. The
    /// upload must succeed before any local state changes.
    pub async fn mark_picked_up(&self, order_id: &str, photo: &[u8]) -> Result<Order, AppError> {
        let lock = self.order_lock(order_id);
        let _guard = lock.lock().await;

        if photo.is_empty() {
            self.record("picked_up", "rejected");
            return Err(AppError::MissingPhoto);
        }
        let order = self.load(order_id)?;
        if order.status != OrderStatus::PickedUp {
            self.record("picked_up", "rejected");
            return Err(AppError::InvalidTransition(format!(
                "cannot mark collected at status {}",
                order.status.code()
            )));
        }

        let image_name = unique_image_name();
        self.gateway.upload_image(&image_name, photo).await?;

        let timestamp = Local::now().format("%H:%M").to_string();
        let updated = self
            .store
            .apply_optimistic(order_id, |order| {
                order.status = OrderStatus::EnRoute;
                order.pickup_image_url = Some(image_name.clone());
                order.push_lifecycle_event("pickedup", "", &timestamp);
            })
            .ok_or_else(|| AppError::OrderNotFound(order_id.to_string()))?;

        if let Err(err) = self
            .gateway
            .update_order_pod(order_id, true, &image_name)
            .await
        {
            warn!(error = %err, order_id, "pickup pod command failed");
        }
        if let Err(err) = self
            .gateway
            .update_status(order_id, OrderStatus::EnRoute.code())
            .await
        {
            warn!(error = %err, order_id, "status command failed; awaiting poll correction");
        }
        info!(order_id, "order collected");
        self.record("picked_up", "applied");
        Ok(updated)
    }

    /// Delivery proof: uploads the photo, then closes the order.
    pub async fn mark_delivered(&self, order_id: &str, photo: &[u8]) -> Result<Order, AppError> {
        let lock = self.order_lock(order_id);
        let _guard = lock.lock().await;

        if photo.is_empty() {
            self.record("delivered", "rejected");
            return Err(AppError::MissingPhoto);
        }
        let order = self.load(order_id)?;
        if order.status != OrderStatus::EnRoute {
            self.record("delivered", "rejected");
            return Err(AppError::InvalidTransition(format!(
                "cannot mark delivered at status {}",
                order.status.code()
            )));
        }

        let image_name = unique_image_name();
        self.gateway.upload_image(&image_name, photo).await?;

        let timestamp = Local::now().format("%H:%M").to_string();
        let updated = self
            .store
            .apply_optimistic(order_id, |order| {
                order.status = OrderStatus::Delivered;
                order.delivery_image_url = Some(image_name.clone());
                order.push_lifecycle_event("delivered", "", &timestamp);
            })
            .ok_or_else(|| AppError::OrderNotFound(order_id.to_string()))?;

        if let Err(err) = self
            .gateway
            .update_order_pod(order_id, false, &image_name)
            .await
        {
            warn!(error = %err, order_id, "delivery pod command failed");
        }
        if let Err(err) = self
            .gateway
            .update_status(order_id, OrderStatus::Delivered.code())
            .await
        {
            warn!(error = %err, order_id, "status command failed; awaiting poll correction");
        }
        info!(order_id, "order delivered");
        self.record("delivered", "applied");
        Ok(updated)
    }

    pub async fn cancel(&self, order_id: &str) -> Result<Order, AppError> {
        let lock = self.order_lock(order_id);
        let _guard = lock.lock().await;

        let order = self.load(order_id)?;
        if !order.status.can_escape() {
            self.record("cancel", "rejected");
            return Err(AppError::InvalidTransition(format!(
                "cannot cancel at status {}",
                order.status.code()
            )));
        }

        let updated = self
            .store
            .apply_optimistic(order_id, |order| {
                order.status = OrderStatus::Cancelled;
            })
            .ok_or_else(|| AppError::OrderNotFound(order_id.to_string()))?;

        if let Err(err) = self
            .gateway
            .update_status(order_id, OrderStatus::Cancelled.code())
            .await
        {
            warn!(error = %err, order_id, "cancel command failed; awaiting poll correction");
        }
        info!(order_id, "order cancelled");
        self.record("cancel", "applied");
        Ok(updated)
    }

    /// Re-books the delivery with an external fleet. Unlike the other
    /// commands this one is gated on the gateway ack: the order only counts
    /// as superseded once the rebook is accepted.
    pub async fn rebook(&self, order_id: &str, vehicle: Vehicle) -> Result<Order, AppError> {
        let lock = self.order_lock(order_id);
        let _guard = lock.lock().await;

        let order = self.load(order_id)?;
        if !order.status.can_escape() {
            self.record("rebook", "rejected");
            return Err(AppError::InvalidTransition(format!(
                "cannot rebook at status {}",
                order.status.code()
            )));
        }

        let body = self.gateway.rebook(self.shop_id, order_id, vehicle).await?;
        if !gateway::ack_ok(&body) {
            self.record("rebook", "error");
            return Err(AppError::Gateway("rebook not acknowledged".to_string()));
        }

        let updated = self
            .store
            .apply_optimistic(order_id, |order| {
                order.status = OrderStatus::Rebooked;
            })
            .ok_or_else(|| AppError::OrderNotFound(order_id.to_string()))?;

        info!(order_id, vehicle = vehicle.as_str(), "order rebooked");
        self.record("rebook", "applied");
        Ok(updated)
    }

    fn eta_stamp(&self, minutes: i64) -> String {
        let target = Local::now() + Duration::minutes(minutes + self.eta_buffer_minutes);
        target.format(ETA_STAMP_FORMAT).to_string()
    }
}

fn parse_minutes(input: &str) -> Result<i64, AppError> {
    match input.trim().parse::<i64>() {
        Ok(minutes) if minutes > 0 => Ok(minutes),
        _ => Err(AppError::InvalidMinutes),
    }
}

/// Proof-of-delivery images get a collision-free name the gateway stores
/// them under, uuid plus unix seconds like the original app generated.
fn unique_image_name() -> String {
    format!("{}{}", Uuid::new_v4(), Local::now().timestamp())
}
