use std::sync::Arc;

use tokio_stream::StreamExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use order_desk::config::{Config, Role, SessionContext};
use order_desk::error::AppError;
use order_desk::feed::reconciler::Reconciler;
use order_desk::feed::{FeedEvent, OrderStore};
use order_desk::gateway::http::HttpGateway;
use order_desk::gateway::ShopGateway;
use order_desk::models::courier::CourierDirectory;
use order_desk::observability::metrics::Metrics;
use order_desk::wire;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let gateway = Arc::new(HttpGateway::new(&config)?);
    let metrics = Metrics::new();
    let store = Arc::new(OrderStore::new());
    let directory = CourierDirectory::new();

    bootstrap_couriers(&config, gateway.as_ref(), &directory).await;

    let context = SessionContext::new(Role::Admin);
    let reconciler = Arc::new(Reconciler::new(
        gateway,
        store,
        context.feed_filter(&config),
        config.poll_interval,
        config.event_buffer_size,
        metrics,
    ));

    let mut events = reconciler.subscribe();
    tokio::spawn(async move {
        while let Some(Ok(event)) = events.next().await {
            if let FeedEvent::NewOrders { first, count } = event {
                info!(order_id = %first.order_id, count, "new order alert");
            }
        }
    });

    reconciler.start();

    tokio::signal::ctrl_c()
        .await
        .map_err(|err| AppError::Internal(format!("failed to listen for shutdown signal: {err}")))?;
    info!("shutting down");
    reconciler.stop();

    Ok(())
}

/// The courier directory is fetched once per session and mirrored to disk;
/// when the gateway is unreachable the mirror is the fallback list.
async fn bootstrap_couriers(config: &Config, gateway: &impl ShopGateway, directory: &CourierDirectory) {
    match gateway.fetch_couriers().await {
        Ok(body) => {
            let couriers = wire::couriers::decode_directory(&body);
            info!(count = couriers.len(), "courier directory fetched");
            directory.replace(couriers);
            if let Err(err) = directory.save_cache(&config.courier_cache_path) {
                warn!(error = %err, "failed to persist courier cache");
            }
        }
        Err(err) => {
            warn!(error = %err, "courier directory fetch failed; falling back to cache");
            match directory.load_cache(&config.courier_cache_path) {
                Ok(count) => info!(count, "courier directory loaded from cache"),
                Err(cache_err) => warn!(error = %cache_err, "no courier cache available"),
            }
        }
    }
}
