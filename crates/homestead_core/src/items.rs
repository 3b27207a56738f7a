//! Item handles and the shared storage map.
//!
//! Complexes and transport agents both count stock in an [`ItemStore`]:
//! an ordered item → quantity map with checked and clamped mutation.
//! Quantities are unsigned and never wrap.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Handle identifying an item kind.
///
/// Assigned by the data registry in definition order; the numeric value
/// is what the save format stores.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct ItemId(pub u16);

impl ItemId {
    /// Create a new item handle.
    #[must_use]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Raw index value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

/// A quantity of one item kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemCount {
    /// How many.
    pub count: u32,
    /// Of what.
    pub item: ItemId,
}

impl ItemCount {
    /// Create a new item quantity.
    #[must_use]
    pub const fn new(count: u32, item: ItemId) -> Self {
        Self { count, item }
    }
}

/// Ordered item → quantity store shared by complexes and agents.
///
/// Iteration follows item handle order and zero quantities are pruned,
/// so two stores with the same contents compare, hash, and serialize
/// identically regardless of mutation history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemStore {
    counts: BTreeMap<ItemId, u32>,
}

impl ItemStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Quantity stored for an item (0 when absent).
    #[must_use]
    pub fn count(&self, item: ItemId) -> u32 {
        self.counts.get(&item).copied().unwrap_or(0)
    }

    /// Add quantity to an item.
    pub fn add(&mut self, item: ItemId, amount: u32) {
        if amount == 0 {
            return;
        }
        *self.counts.entry(item).or_insert(0) += amount;
    }

    /// Checked removal; fails without mutating when stock is short.
    pub fn remove(&mut self, item: ItemId, amount: u32) -> Result<()> {
        let available = self.count(item);
        if available < amount {
            return Err(CoreError::InsufficientStock {
                item: item.as_u16(),
                required: amount,
                available,
            });
        }
        self.set(item, available - amount);
        Ok(())
    }

    /// Remove up to `amount`, returning how much actually moved.
    pub fn remove_up_to(&mut self, item: ItemId, amount: u32) -> u32 {
        let available = self.count(item);
        let moved = amount.min(available);
        self.set(item, available - moved);
        moved
    }

    /// Overwrite the stored quantity (0 clears the entry).
    pub fn set(&mut self, item: ItemId, amount: u32) {
        if amount == 0 {
            self.counts.remove(&item);
        } else {
            self.counts.insert(item, amount);
        }
    }

    /// Whether every listed requirement is met.
    #[must_use]
    pub fn has_all(&self, required: &[ItemCount]) -> bool {
        required.iter().all(|req| self.count(req.item) >= req.count)
    }

    /// Number of distinct item kinds with non-zero stock.
    #[must_use]
    pub fn kind_count(&self) -> usize {
        self.counts.len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Iterate `(item, quantity)` pairs in item order.
    pub fn iter(&self) -> impl Iterator<Item = (ItemId, u32)> + '_ {
        self.counts.iter().map(|(&item, &count)| (item, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WOOD: ItemId = ItemId::new(0);
    const GRAIN: ItemId = ItemId::new(1);

    #[test]
    fn test_count_defaults_to_zero() {
        let store = ItemStore::new();
        assert_eq!(store.count(WOOD), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_add_and_remove() {
        let mut store = ItemStore::new();
        store.add(WOOD, 10);
        store.add(WOOD, 5);
        assert_eq!(store.count(WOOD), 15);

        store.remove(WOOD, 6).unwrap();
        assert_eq!(store.count(WOOD), 9);
    }

    #[test]
    fn test_checked_remove_fails_without_mutation() {
        let mut store = ItemStore::new();
        store.add(GRAIN, 3);

        let err = store.remove(GRAIN, 5).unwrap_err();
        match err {
            CoreError::InsufficientStock {
                item,
                required,
                available,
            } => {
                assert_eq!(item, GRAIN.as_u16());
                assert_eq!(required, 5);
                assert_eq!(available, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.count(GRAIN), 3);
    }

    #[test]
    fn test_remove_up_to_clamps() {
        let mut store = ItemStore::new();
        store.add(WOOD, 3);

        assert_eq!(store.remove_up_to(WOOD, 5), 3);
        assert_eq!(store.count(WOOD), 0);
        assert_eq!(store.remove_up_to(WOOD, 5), 0);
    }

    #[test]
    fn test_set_zero_prunes_entry() {
        let mut store = ItemStore::new();
        store.add(WOOD, 4);
        store.add(GRAIN, 2);
        assert_eq!(store.kind_count(), 2);

        store.set(WOOD, 0);
        assert_eq!(store.kind_count(), 1);

        // Removing everything leaves a canonical empty store
        store.remove(GRAIN, 2).unwrap();
        assert_eq!(store, ItemStore::new());
    }

    #[test]
    fn test_has_all() {
        let mut store = ItemStore::new();
        store.add(WOOD, 2);
        store.add(GRAIN, 1);

        assert!(store.has_all(&[ItemCount::new(2, WOOD), ItemCount::new(1, GRAIN)]));
        assert!(!store.has_all(&[ItemCount::new(3, WOOD)]));
        assert!(store.has_all(&[]));
    }

    #[test]
    fn test_iteration_in_item_order() {
        let mut store = ItemStore::new();
        store.add(GRAIN, 1);
        store.add(WOOD, 2);

        let pairs: Vec<_> = store.iter().collect();
        assert_eq!(pairs, vec![(WOOD, 2), (GRAIN, 1)]);
    }
}
