pub mod reconciler;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use dashmap::DashMap;

use crate::models::order::{Order, OrderStatus};

/// Broadcast to consumers after each applied poll cycle. The new-order
/// variant is what the host app wires to its audible alert.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    NewOrders { first: Order, count: usize },
    Replaced { total: usize },
}

/// A local status mutation awaiting server confirmation via the feed.
#[derive(Debug, Clone, Copy)]
pub struct PendingTransition {
    pub status: OrderStatus,
    pub version: u64,
}

#[derive(Default)]
struct Inner {
    orders: Vec<Order>,
    previous_ids: HashSet<String>,
    search: String,
    last_order: Option<Order>,
    primed: bool,
}

/// The working set of orders a screen displays. Replaced wholesale on each
/// successful poll; search filtering and optimistic-status overlays are
/// recomputed views over it.
#[derive(Default)]
pub struct OrderStore {
    inner: RwLock<Inner>,
    pending: DashMap<String, PendingTransition>,
    version: AtomicU64,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replaces the working set with a freshly parsed batch and
    /// returns the orders that were not present in the previous cycle.
    /// The first batch primes the previous-cycle set without flagging
    /// anything as new.
    pub fn replace_all(&self, mut orders: Vec<Order>) -> Vec<Order> {
        for order in &mut orders {
            self.overlay_pending(order);
        }

        let mut inner = self.inner.write().expect("order store lock");
        let current_ids: HashSet<String> =
            orders.iter().map(|order| order.order_id.clone()).collect();

        let new_orders: Vec<Order> = if inner.primed {
            orders
                .iter()
                .filter(|order| !inner.previous_ids.contains(&order.order_id))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        if let Some(first) = new_orders.first() {
            inner.last_order = Some(first.clone());
        }
        inner.previous_ids = current_ids;
        inner.orders = orders;
        inner.primed = true;

        new_orders
    }

    fn overlay_pending(&self, order: &mut Order) {
        let confirmed = match self.pending.get(&order.order_id) {
            Some(entry) if order.status.code() >= entry.status.code() => true,
            Some(entry) => {
                // Server has not caught up; keep the optimistic status
                // visible instead of flickering backwards.
                order.status = entry.status;
                false
            }
            None => return,
        };
        if confirmed {
            self.pending.remove(&order.order_id);
        }
    }

    /// Snapshot filtered by the live search text; the unfiltered set is
    /// untouched, so clearing search restores it without a refetch.
    pub fn orders(&self) -> Vec<Order> {
        let inner = self.inner.read().expect("order store lock");
        if inner.search.is_empty() {
            return inner.orders.clone();
        }
        inner
            .orders
            .iter()
            .filter(|order| matches_search(order, &inner.search))
            .cloned()
            .collect()
    }

    pub fn all_orders(&self) -> Vec<Order> {
        self.inner.read().expect("order store lock").orders.clone()
    }

    pub fn get(&self, order_id: &str) -> Option<Order> {
        self.inner
            .read()
            .expect("order store lock")
            .orders
            .iter()
            .find(|order| order.order_id == order_id)
            .cloned()
    }

    pub fn set_search(&self, text: &str) {
        self.inner.write().expect("order store lock").search = text.trim().to_lowercase();
    }

    pub fn clear_search(&self) {
        self.set_search("");
    }

    pub fn last_order(&self) -> Option<Order> {
        self.inner.read().expect("order store lock").last_order.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("order store lock").orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts or replaces a single order without disturbing new-order
    /// detection, used by single-order fetches.
    pub fn upsert(&self, order: Order) {
        let mut inner = self.inner.write().expect("order store lock");
        match inner
            .orders
            .iter_mut()
            .find(|existing| existing.order_id == order.order_id)
        {
            Some(existing) => *existing = order,
            None => inner.orders.push(order),
        }
    }

    /// Replaces only the lifecycle log of one order, leaving the rest of
    /// the snapshot for the next full poll.
    pub fn update_lifecycle(&self, order_id: &str, lifecycle: &str) -> bool {
        let mut inner = self.inner.write().expect("order store lock");
        match inner
            .orders
            .iter_mut()
            .find(|order| order.order_id == order_id)
        {
            Some(order) => {
                order.lifecycle = lifecycle.to_string();
                true
            }
            None => false,
        }
    }

    /// Applies an optimistic transition: the mutation lands immediately and
    /// is flagged pending until a poll shows the server caught up.
    pub fn apply_optimistic<F>(&self, order_id: &str, mutate: F) -> Option<Order>
    where
        F: FnOnce(&mut Order),
    {
        let updated = self.apply_note(order_id, mutate)?;
        let version = self.version.fetch_add(1, Ordering::Relaxed) + 1;
        self.pending.insert(
            order_id.to_string(),
            PendingTransition {
                status: updated.status,
                version,
            },
        );
        Some(updated)
    }

    /// Applies a local mutation that needs no confirmation tracking.
    pub fn apply_note<F>(&self, order_id: &str, mutate: F) -> Option<Order>
    where
        F: FnOnce(&mut Order),
    {
        let mut inner = self.inner.write().expect("order store lock");
        let order = inner
            .orders
            .iter_mut()
            .find(|order| order.order_id == order_id)?;
        mutate(order);
        Some(order.clone())
    }

    pub fn is_pending(&self, order_id: &str) -> bool {
        self.pending.contains_key(order_id)
    }

    pub fn clear_pending(&self, order_id: &str) {
        self.pending.remove(order_id);
    }
}

fn matches_search(order: &Order, needle: &str) -> bool {
    order.order_id.to_lowercase().contains(needle)
        || order.customer_name.to_lowercase().contains(needle)
        || order.postcode.to_lowercase().contains(needle)
        || order.address.to_lowercase().contains(needle)
}

#[cfg(test)]
mod tests {
    use super::OrderStore;
    use crate::models::order::{Order, OrderStatus};

    fn order(id: &str, name: &str, postcode: &str) -> Order {
        Order {
            order_id: id.to_string(),
            customer_name: name.to_string(),
            postcode: postcode.to_string(),
            status: OrderStatus::Received,
            ..Order::default()
        }
    }

    #[test]
    fn first_batch_primes_without_flagging_new_orders() {
        let store = OrderStore::new();
        let new = store.replace_all(vec![order("A", "Ada", "E1"), order("B", "Bo", "E2")]);
        assert!(new.is_empty());
        assert!(store.last_order().is_none());
    }

    #[test]
    fn detects_exactly_the_newly_arrived_orders() {
        let store = OrderStore::new();
        store.replace_all(vec![order("A", "Ada", "E1"), order("B", "Bo", "E2")]);

        let new = store.replace_all(vec![
            order("A", "Ada", "E1"),
            order("B", "Bo", "E2"),
            order("C", "Cy", "E3"),
        ]);
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].order_id, "C");
        assert_eq!(store.last_order().map(|o| o.order_id), Some("C".to_string()));

        let unchanged = store.replace_all(vec![
            order("A", "Ada", "E1"),
            order("B", "Bo", "E2"),
            order("C", "Cy", "E3"),
        ]);
        assert!(unchanged.is_empty());
    }

    #[test]
    fn search_filters_and_clearing_restores() {
        let store = OrderStore::new();
        store.replace_all(vec![order("100", "Ada Lovelace", "E1 6AN"), order("200", "Bo", "N1 9GU")]);

        store.set_search("ada");
        assert_eq!(store.orders().len(), 1);
        assert_eq!(store.orders()[0].order_id, "100");

        store.set_search("N1");
        assert_eq!(store.orders()[0].order_id, "200");

        store.set_search("no-match-at-all");
        assert!(store.orders().is_empty());

        store.clear_search();
        assert_eq!(store.orders().len(), 2);
    }

    #[test]
    fn pending_status_survives_a_stale_poll_and_clears_on_catch_up() {
        let store = OrderStore::new();
        store.replace_all(vec![order("A", "Ada", "E1")]);

        store.apply_optimistic("A", |o| o.status = OrderStatus::Allocated);
        assert!(store.is_pending("A"));

        // Server still reports Received; optimistic status stays visible.
        let mut stale = order("A", "Ada", "E1");
        stale.status = OrderStatus::Received;
        store.replace_all(vec![stale]);
        assert_eq!(store.get("A").unwrap().status, OrderStatus::Allocated);
        assert!(store.is_pending("A"));

        // Server caught up; the flag clears and server truth wins.
        let mut confirmed = order("A", "Ada", "E1");
        confirmed.status = OrderStatus::Allocated;
        store.replace_all(vec![confirmed]);
        assert_eq!(store.get("A").unwrap().status, OrderStatus::Allocated);
        assert!(!store.is_pending("A"));
    }

    #[test]
    fn update_lifecycle_touches_only_the_log() {
        let store = OrderStore::new();
        store.replace_all(vec![order("A", "Ada", "E1")]);
        assert!(store.update_lifecycle("A", "received*3/1/2024 10:00:00 AM*10:00"));
        let refreshed = store.get("A").unwrap();
        assert_eq!(refreshed.lifecycle_events().len(), 1);
        assert_eq!(refreshed.customer_name, "Ada");
        assert!(!store.update_lifecycle("missing", ""));
    }
}
