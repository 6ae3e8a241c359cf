use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use tessera_core::repository::InventoryLedger;
use tessera_core::{TicketingError, TicketingResult};
use uuid::Uuid;

/// Point-in-time view of an event's seat counter
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct InventoryLevel {
    pub event_id: Uuid,
    pub total: u32,
    pub available: u32,
}

#[derive(Debug)]
struct SeatCounter {
    total: u32,
    available: AtomicU32,
}

impl SeatCounter {
    fn try_take(&self, count: u32) -> bool {
        let mut current = self.available.load(Ordering::Acquire);
        loop {
            if current < count {
                return false;
            }
            match self.available.compare_exchange_weak(
                current,
                current - count,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn give_back(&self, count: u32) {
        let total = self.total;
        // The closure always returns Some, so fetch_update cannot fail.
        let _ = self
            .available
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_add(count).min(total))
            });
    }
}

/// Lock-free seat counters for single-process deployments.
///
/// The map itself sits behind an `RwLock`, but reserve and release only take
/// the read side; the counters are updated with compare-and-swap.
pub struct InMemoryInventory {
    counters: RwLock<HashMap<Uuid, Arc<SeatCounter>>>,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
        }
    }

    /// Register (or reset) the counter for an event.
    pub fn initialize(&self, event_id: Uuid, total: u32, available: u32) -> TicketingResult<()> {
        if available > total {
            return Err(TicketingError::InvalidRequest(format!(
                "available tickets ({}) exceed total ({})",
                available, total
            )));
        }

        let mut counters = self
            .counters
            .write()
            .map_err(|_| TicketingError::Storage("inventory lock poisoned".to_string()))?;
        counters.insert(
            event_id,
            Arc::new(SeatCounter {
                total,
                available: AtomicU32::new(available),
            }),
        );
        Ok(())
    }

    /// Get current inventory
    pub fn level(&self, event_id: &Uuid) -> Option<InventoryLevel> {
        let counters = self.counters.read().ok()?;
        counters.get(event_id).map(|c| InventoryLevel {
            event_id: *event_id,
            total: c.total,
            available: c.available.load(Ordering::Acquire),
        })
    }

    fn counter(&self, event_id: &Uuid) -> TicketingResult<Arc<SeatCounter>> {
        let counters = self
            .counters
            .read()
            .map_err(|_| TicketingError::Storage("inventory lock poisoned".to_string()))?;
        counters
            .get(event_id)
            .cloned()
            .ok_or_else(|| TicketingError::NotFound(format!("inventory for event {}", event_id)))
    }

    pub fn try_reserve(&self, event_id: &Uuid, count: u32) -> TicketingResult<bool> {
        Ok(self.counter(event_id)?.try_take(count))
    }

    pub fn give_back(&self, event_id: &Uuid, count: u32) -> TicketingResult<()> {
        self.counter(event_id)?.give_back(count);
        Ok(())
    }

    /// Share of seats sold, between 0.0 and 1.0
    pub fn utilization(&self, event_id: &Uuid) -> Option<f64> {
        self.level(event_id).map(|level| {
            if level.total == 0 {
                0.0
            } else {
                1.0 - (level.available as f64 / level.total as f64)
            }
        })
    }
}

impl Default for InMemoryInventory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InventoryLedger for InMemoryInventory {
    async fn reserve(&self, event_id: Uuid, count: u32) -> TicketingResult<bool> {
        self.try_reserve(&event_id, count)
    }

    async fn release(&self, event_id: Uuid, count: u32) -> TicketingResult<()> {
        self.give_back(&event_id, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inventory_lifecycle() {
        let inventory = InMemoryInventory::new();
        let event_id = Uuid::new_v4();

        inventory.initialize(event_id, 100, 100).unwrap();
        assert_eq!(inventory.level(&event_id).unwrap().available, 100);

        assert!(inventory.try_reserve(&event_id, 10).unwrap());
        assert_eq!(inventory.level(&event_id).unwrap().available, 90);

        let utilization = inventory.utilization(&event_id).unwrap();
        assert!((utilization - 0.1).abs() < 0.01);

        inventory.give_back(&event_id, 10).unwrap();
        assert_eq!(inventory.level(&event_id).unwrap().available, 100);
    }

    #[test]
    fn test_reserve_beyond_available_leaves_counter_untouched() {
        let inventory = InMemoryInventory::new();
        let event_id = Uuid::new_v4();
        inventory.initialize(event_id, 5, 3).unwrap();

        assert!(!inventory.try_reserve(&event_id, 4).unwrap());
        assert_eq!(inventory.level(&event_id).unwrap().available, 3);

        assert!(inventory.try_reserve(&event_id, 3).unwrap());
        assert_eq!(inventory.level(&event_id).unwrap().available, 0);
        assert!(!inventory.try_reserve(&event_id, 1).unwrap());
    }

    #[test]
    fn test_release_is_clamped_to_total() {
        let inventory = InMemoryInventory::new();
        let event_id = Uuid::new_v4();
        inventory.initialize(event_id, 10, 8).unwrap();

        inventory.give_back(&event_id, 50).unwrap();
        assert_eq!(inventory.level(&event_id).unwrap().available, 10);
    }

    #[test]
    fn test_unknown_event_and_bad_initialization() {
        let inventory = InMemoryInventory::new();
        let event_id = Uuid::new_v4();

        assert!(matches!(
            inventory.try_reserve(&event_id, 1),
            Err(TicketingError::NotFound(_))
        ));
        assert!(matches!(
            inventory.initialize(event_id, 1, 2),
            Err(TicketingError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_concurrent_reservations_never_oversell() {
        let inventory = Arc::new(InMemoryInventory::new());
        let event_id = Uuid::new_v4();
        inventory.initialize(event_id, 25, 25).unwrap();

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let inventory = Arc::clone(&inventory);
                std::thread::spawn(move || inventory.try_reserve(&event_id, 1).unwrap())
            })
            .collect();

        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(granted, 25);
        assert_eq!(inventory.level(&event_id).unwrap().available, 0);
    }

    #[tokio::test]
    async fn test_ledger_trait() {
        let inventory = InMemoryInventory::new();
        let event_id = Uuid::new_v4();
        inventory.initialize(event_id, 2, 2).unwrap();

        let ledger: &dyn InventoryLedger = &inventory;
        assert!(ledger.reserve(event_id, 2).await.unwrap());
        assert!(!ledger.reserve(event_id, 1).await.unwrap());
        ledger.release(event_id, 1).await.unwrap();
        assert_eq!(inventory.level(&event_id).unwrap().available, 1);
    }
}
