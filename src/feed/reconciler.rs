use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, MissedTickBehavior};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::feed::{FeedEvent, OrderStore};
use crate::gateway::{FeedFilter, ShopGateway};
use crate::models::order::Order;
use crate::observability::metrics::Metrics;
use crate::wire;

/// Polls the orders feed and merges server truth over local state. Each
/// outgoing request carries an increasing epoch; a response is only applied
/// if nothing newer has been applied already, so a slow response can never
/// overwrite a fast one. A new request goes out on every tick whether or
/// not the previous one came back.
pub struct Reconciler<G> {
    gateway: Arc<G>,
    store: Arc<OrderStore>,
    filter: FeedFilter,
    poll_interval: Duration,
    metrics: Metrics,
    events_tx: broadcast::Sender<FeedEvent>,
    request_epoch: Arc<AtomicU64>,
    applied_epoch: Arc<AtomicU64>,
    lifecycle_request_epoch: Arc<AtomicU64>,
    lifecycle_applied_epoch: Arc<AtomicU64>,
    stopped: Arc<AtomicBool>,
    apply_lock: Arc<tokio::sync::Mutex<()>>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
    lifecycle_task: Mutex<Option<JoinHandle<()>>>,
}

impl<G: ShopGateway> Reconciler<G> {
    pub fn new(
        gateway: Arc<G>,
        store: Arc<OrderStore>,
        filter: FeedFilter,
        poll_interval: Duration,
        event_buffer_size: usize,
        metrics: Metrics,
    ) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);
        Self {
            gateway,
            store,
            filter,
            poll_interval,
            metrics,
            events_tx,
            request_epoch: Arc::new(AtomicU64::new(0)),
            applied_epoch: Arc::new(AtomicU64::new(0)),
            lifecycle_request_epoch: Arc::new(AtomicU64::new(0)),
            lifecycle_applied_epoch: Arc::new(AtomicU64::new(0)),
            stopped: Arc::new(AtomicBool::new(false)),
            apply_lock: Arc::new(tokio::sync::Mutex::new(())),
            poll_task: Mutex::new(None),
            lifecycle_task: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> BroadcastStream<FeedEvent> {
        BroadcastStream::new(self.events_tx.subscribe())
    }

    pub fn store(&self) -> &Arc<OrderStore> {
        &self.store
    }

    /// Starts the list poll loop. Calling start on a running reconciler is
    /// a no-op.
    pub fn start(&self) {
        let mut slot = self.poll_task.lock().expect("poll task slot");
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        self.stopped.store(false, Ordering::Release);

        let gateway = self.gateway.clone();
        let store = self.store.clone();
        let filter = self.filter.clone();
        let metrics = self.metrics.clone();
        let events_tx = self.events_tx.clone();
        let request_epoch = self.request_epoch.clone();
        let applied_epoch = self.applied_epoch.clone();
        let stopped = self.stopped.clone();
        let apply_lock = self.apply_lock.clone();
        let poll_interval = self.poll_interval;

        *slot = Some(tokio::spawn(async move {
            info!(shop = filter.shop, "order feed polling started");
            let mut ticker = interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // In-flight requests are owned by this set, so aborting the
            // loop aborts them before they can touch the store.
            let mut in_flight = JoinSet::new();
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let epoch = request_epoch.fetch_add(1, Ordering::AcqRel) + 1;
                        in_flight.spawn(poll_once(
                            gateway.clone(),
                            store.clone(),
                            filter.clone(),
                            metrics.clone(),
                            events_tx.clone(),
                            applied_epoch.clone(),
                            stopped.clone(),
                            apply_lock.clone(),
                            epoch,
                        ));
                    }
                    Some(_) = in_flight.join_next() => {}
                }
            }
        }));
    }

    /// Starts the 10-second lifecycle refresh loop for one order, used by
    /// the order-detail screen. Restarting for a different order replaces
    /// the previous watch.
    pub fn start_lifecycle_watch(&self, order_id: &str) {
        let mut slot = self.lifecycle_task.lock().expect("lifecycle task slot");
        if let Some(task) = slot.take() {
            task.abort();
        }
        self.stopped.store(false, Ordering::Release);

        let gateway = self.gateway.clone();
        let store = self.store.clone();
        let metrics = self.metrics.clone();
        let request_epoch = self.lifecycle_request_epoch.clone();
        let applied_epoch = self.lifecycle_applied_epoch.clone();
        let stopped = self.stopped.clone();
        let apply_lock = self.apply_lock.clone();
        let poll_interval = self.poll_interval;
        let order_id = order_id.to_string();

        *slot = Some(tokio::spawn(async move {
            debug!(order_id = %order_id, "lifecycle watch started");
            let mut ticker = interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut in_flight = JoinSet::new();
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let epoch = request_epoch.fetch_add(1, Ordering::AcqRel) + 1;
                        in_flight.spawn(refresh_lifecycle_once(
                            gateway.clone(),
                            store.clone(),
                            metrics.clone(),
                            applied_epoch.clone(),
                            stopped.clone(),
                            apply_lock.clone(),
                            order_id.clone(),
                            epoch,
                        ));
                    }
                    Some(_) = in_flight.join_next() => {}
                }
            }
        }));
    }

    pub fn stop_lifecycle_watch(&self) {
        if let Some(task) = self
            .lifecycle_task
            .lock()
            .expect("lifecycle task slot")
            .take()
        {
            task.abort();
        }
    }

    /// Stops all polling. Idempotent; no state updates are emitted after
    /// this returns.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        if let Some(task) = self.poll_task.lock().expect("poll task slot").take() {
            task.abort();
        }
        self.stop_lifecycle_watch();
    }

    /// One immediate fetch-and-apply cycle outside the timer, e.g. for
    /// pull-to-refresh.
    pub async fn poll_now(&self) {
        let epoch = self.request_epoch.fetch_add(1, Ordering::AcqRel) + 1;
        poll_once(
            self.gateway.clone(),
            self.store.clone(),
            self.filter.clone(),
            self.metrics.clone(),
            self.events_tx.clone(),
            self.applied_epoch.clone(),
            self.stopped.clone(),
            self.apply_lock.clone(),
            epoch,
        )
        .await;
    }

    /// Fetches one order by id via the feed's search endpoint and merges it
    /// into the working set.
    pub async fn fetch_single(&self, order_id: &str) -> Result<Order, AppError> {
        let filter = FeedFilter {
            search: Some(order_id.to_string()),
            ..self.filter.clone()
        };
        let body = self.gateway.fetch_orders(&filter).await?;
        let batch = wire::orders::decode_feed(&body);
        let order = batch
            .orders
            .into_iter()
            .find(|order| order.order_id == order_id)
            .ok_or_else(|| AppError::OrderNotFound(order_id.to_string()))?;
        self.store.upsert(order.clone());
        Ok(order)
    }
}

impl<G> Drop for Reconciler<G> {
    fn drop(&mut self) {
        self.stopped.store(true, Ordering::Release);
        if let Ok(mut slot) = self.poll_task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
        if let Ok(mut slot) = self.lifecycle_task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn poll_once<G: ShopGateway>(
    gateway: Arc<G>,
    store: Arc<OrderStore>,
    filter: FeedFilter,
    metrics: Metrics,
    events_tx: broadcast::Sender<FeedEvent>,
    applied_epoch: Arc<AtomicU64>,
    stopped: Arc<AtomicBool>,
    apply_lock: Arc<tokio::sync::Mutex<()>>,
    epoch: u64,
) {
    match gateway.fetch_orders(&filter).await {
        Ok(body) => {
            let batch = wire::orders::decode_feed(&body);
            if batch.dropped_rows > 0 {
                metrics
                    .feed_rows_dropped_total
                    .inc_by(batch.dropped_rows as u64);
            }

            let _guard = apply_lock.lock().await;
            if stopped.load(Ordering::Acquire) {
                return;
            }
            if epoch <= applied_epoch.load(Ordering::Acquire) {
                debug!(epoch, "discarding stale poll response");
                metrics.poll_cycles_total.with_label_values(&["stale"]).inc();
                return;
            }
            applied_epoch.store(epoch, Ordering::Release);

            let new_orders = store.replace_all(batch.orders);
            metrics.orders_in_working_set.set(store.len() as i64);
            metrics
                .poll_cycles_total
                .with_label_values(&["success"])
                .inc();

            let _ = events_tx.send(FeedEvent::Replaced { total: store.len() });
            if let Some(first) = new_orders.first() {
                metrics.new_orders_total.inc_by(new_orders.len() as u64);
                info!(
                    order_id = %first.order_id,
                    count = new_orders.len(),
                    "new orders arrived"
                );
                let _ = events_tx.send(FeedEvent::NewOrders {
                    first: first.clone(),
                    count: new_orders.len(),
                });
            }
        }
        Err(err) => {
            warn!(error = %err, "order poll failed; keeping previous working set");
            metrics.poll_cycles_total.with_label_values(&["error"]).inc();
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn refresh_lifecycle_once<G: ShopGateway>(
    gateway: Arc<G>,
    store: Arc<OrderStore>,
    metrics: Metrics,
    applied_epoch: Arc<AtomicU64>,
    stopped: Arc<AtomicBool>,
    apply_lock: Arc<tokio::sync::Mutex<()>>,
    order_id: String,
    epoch: u64,
) {
    match gateway.fetch_lifecycle(&order_id).await {
        Ok(body) => {
            let lifecycle = wire::lifecycle::extract_lifecycle(&body);

            let _guard = apply_lock.lock().await;
            if stopped.load(Ordering::Acquire) {
                return;
            }
            if epoch <= applied_epoch.load(Ordering::Acquire) {
                debug!(epoch, order_id = %order_id, "discarding stale lifecycle response");
                metrics.poll_cycles_total.with_label_values(&["stale"]).inc();
                return;
            }
            applied_epoch.store(epoch, Ordering::Release);

            if !store.update_lifecycle(&order_id, &lifecycle) {
                debug!(order_id = %order_id, "lifecycle refresh for order not in working set");
            }
            metrics
                .poll_cycles_total
                .with_label_values(&["success"])
                .inc();
        }
        Err(err) => {
            warn!(error = %err, order_id = %order_id, "lifecycle refresh failed");
            metrics.poll_cycles_total.with_label_values(&["error"]).inc();
        }
    }
}
