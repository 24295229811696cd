use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Courier {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// Shared read handle over the courier directory. The directory is fetched
/// once per session and replaced wholesale; on fetch failure the last
/// persisted copy serves as the fallback list.
#[derive(Debug, Clone, Default)]
pub struct CourierDirectory {
    inner: Arc<RwLock<Vec<Courier>>>,
}

impl CourierDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, couriers: Vec<Courier>) {
        *self.inner.write().expect("courier directory lock") = couriers;
    }

    pub fn find(&self, courier_id: &str) -> Option<Courier> {
        self.inner
            .read()
            .expect("courier directory lock")
            .iter()
            .find(|courier| courier.id == courier_id)
            .cloned()
    }

    pub fn all(&self) -> Vec<Courier> {
        self.inner.read().expect("courier directory lock").clone()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().expect("courier directory lock").is_empty()
    }

    pub fn save_cache(&self, path: impl AsRef<Path>) -> Result<(), AppError> {
        let json = serde_json::to_string(&self.all())
            .map_err(|err| AppError::Internal(format!("failed to encode courier cache: {err}")))?;
        fs::write(path, json)
            .map_err(|err| AppError::Internal(format!("failed to write courier cache: {err}")))
    }

    pub fn load_cache(&self, path: impl AsRef<Path>) -> Result<usize, AppError> {
        let json = fs::read_to_string(path)
            .map_err(|err| AppError::Internal(format!("failed to read courier cache: {err}")))?;
        let couriers: Vec<Courier> = serde_json::from_str(&json)
            .map_err(|err| AppError::Internal(format!("failed to decode courier cache: {err}")))?;
        let count = couriers.len();
        self.replace(couriers);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::{Courier, CourierDirectory};

    fn sample() -> Vec<Courier> {
        vec![
            Courier {
                id: "7".to_string(),
                name: "Dan Smith".to_string(),
                email: "dan@example.com".to_string(),
                phone: "07700900001".to_string(),
            },
            Courier {
                id: "9".to_string(),
                name: "Priya Patel".to_string(),
                email: "priya@example.com".to_string(),
                phone: "07700900002".to_string(),
            },
        ]
    }

    #[test]
    fn find_is_by_id() {
        let directory = CourierDirectory::new();
        directory.replace(sample());
        assert_eq!(directory.find("9").map(|c| c.name), Some("Priya Patel".to_string()));
        assert!(directory.find("404").is_none());
    }

    #[test]
    fn cache_round_trips_through_disk() {
        let directory = CourierDirectory::new();
        directory.replace(sample());

        let path = std::env::temp_dir().join(format!("couriers-{}.json", uuid::Uuid::new_v4()));
        directory.save_cache(&path).expect("save cache");

        let fallback = CourierDirectory::new();
        let loaded = fallback.load_cache(&path).expect("load cache");
        assert_eq!(loaded, 2);
        assert_eq!(fallback.all(), sample());

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn load_cache_fails_cleanly_when_missing() {
        let directory = CourierDirectory::new();
        let missing = std::env::temp_dir().join("no-such-courier-cache.json");
        assert!(directory.load_cache(missing).is_err());
        assert!(directory.is_empty());
    }
}
