use std::env;
use std::time::Duration;

use crate::error::AppError;
use crate::gateway::FeedFilter;

#[derive(Debug, Clone)]
pub struct Config {
    pub gateway_base_url: String,
    pub shop_id: u32,
    pub aggregate_shop_id: u32,
    pub poll_interval: Duration,
    pub eta_buffer_minutes: i64,
    pub courier_cache_path: String,
    pub log_level: String,
    pub event_buffer_size: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            gateway_base_url: env::var("GATEWAY_BASE_URL")
                .unwrap_or_else(|_| "https://minitel.co.uk/app/models".to_string()),
            shop_id: parse_or_default("SHOP_ID", 1)?,
            aggregate_shop_id: parse_or_default("AGGREGATE_SHOP_ID", 100)?,
            poll_interval: Duration::from_secs(parse_or_default("POLL_INTERVAL_SECS", 10)?),
            eta_buffer_minutes: parse_or_default("ETA_BUFFER_MINUTES", 1)?,
            courier_cache_path: env::var("COURIER_CACHE_PATH")
                .unwrap_or_else(|_| "couriers.json".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

/// Who this process is signed in as. The original app read this out of
/// ambient device storage; here it is constructed once and handed to the
/// reconciler and transition engine explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Admin,
    Aggregator,
    Courier { courier_id: String },
    Customer { customer_id: String },
}

#[derive(Debug, Clone)]
pub struct SessionContext {
    pub role: Role,
}

impl SessionContext {
    pub fn new(role: Role) -> Self {
        Self { role }
    }

    pub fn feed_filter(&self, config: &Config) -> FeedFilter {
        match &self.role {
            Role::Admin | Role::Customer { .. } => FeedFilter {
                shop: config.shop_id,
                courier_id: None,
                search: None,
            },
            Role::Aggregator => FeedFilter {
                shop: config.aggregate_shop_id,
                courier_id: None,
                search: None,
            },
            Role::Courier { courier_id } => FeedFilter {
                shop: config.shop_id,
                courier_id: Some(courier_id.clone()),
                search: None,
            },
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Aggregator)
    }

    pub fn customer_mode(&self) -> bool {
        matches!(self.role, Role::Customer { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::{Role, SessionContext};

    #[test]
    fn courier_role_filters_by_courier_id() {
        let context = SessionContext::new(Role::Courier {
            courier_id: "17".to_string(),
        });
        let config = test_config();
        let filter = context.feed_filter(&config);
        assert_eq!(filter.shop, 1);
        assert_eq!(filter.courier_id.as_deref(), Some("17"));
    }

    #[test]
    fn aggregator_role_uses_aggregate_shop() {
        let context = SessionContext::new(Role::Aggregator);
        let filter = context.feed_filter(&test_config());
        assert_eq!(filter.shop, 100);
        assert!(filter.courier_id.is_none());
    }

    fn test_config() -> super::Config {
        super::Config {
            gateway_base_url: "http://localhost".to_string(),
            shop_id: 1,
            aggregate_shop_id: 100,
            poll_interval: std::time::Duration::from_secs(10),
            eta_buffer_minutes: 1,
            courier_cache_path: "couriers.json".to_string(),
            log_level: "info".to_string(),
            event_buffer_size: 1024,
        }
    }
}
