//! Production complexes: building groups with shared storage and timed
//! conversions.
//!
//! A complex is a cluster of building members pooling one item store.
//! Members run conversions that consume inputs from and emit outputs to
//! that shared store on a fixed period. Complexes live in a
//! [`ComplexBank`] slot pool so their ids stay stable across saves and
//! deletions; a deleted slot is recycled by the next creation.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::events::{SimEvent, TickEvents};
use crate::items::{ItemCount, ItemId, ItemStore};
use crate::math::{TileCoord, TileRect};

/// Stable identifier of a complex slot in the bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComplexId(pub u32);

impl ComplexId {
    /// Create a new complex ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The slot index in the bank.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A timed item conversion run by one building member.
///
/// The timer accumulates elapsed seconds; once a full period has passed
/// and every input is in stock, the conversion fires: inputs leave the
/// shared store, outputs enter it, and the overshoot beyond the period
/// carries into the next cycle. While inputs are missing the timer holds
/// at one full period, so a starved conversion fires immediately on
/// restock but never banks more than one owed cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    /// Items consumed per firing.
    inputs: Vec<ItemCount>,
    /// Items produced per firing.
    outputs: Vec<ItemCount>,
    /// Seconds between firings.
    period: f64,
    /// Seconds accumulated toward the next firing.
    elapsed: f64,
}

impl Conversion {
    /// Create a new conversion with a fresh timer.
    ///
    /// An empty input list makes a pure producer that fires every period
    /// unconditionally.
    ///
    /// # Panics
    ///
    /// Panics if `period` is not positive.
    #[must_use]
    pub fn new(inputs: Vec<ItemCount>, outputs: Vec<ItemCount>, period: f64) -> Self {
        assert!(period > 0.0, "Conversion period must be positive");
        Self {
            inputs,
            outputs,
            period,
            elapsed: 0.0,
        }
    }

    /// Items consumed per firing.
    #[must_use]
    pub fn inputs(&self) -> &[ItemCount] {
        &self.inputs
    }

    /// Items produced per firing.
    #[must_use]
    pub fn outputs(&self) -> &[ItemCount] {
        &self.outputs
    }

    /// Seconds between firings.
    #[must_use]
    pub const fn period(&self) -> f64 {
        self.period
    }

    /// Seconds accumulated toward the next firing.
    #[must_use]
    pub const fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Restore the timer to a saved value.
    ///
    /// Values above one period are clamped; the timer never owes more
    /// than one cycle.
    pub fn set_elapsed(&mut self, elapsed: f64) {
        self.elapsed = elapsed.clamp(0.0, self.period);
    }

    /// Fraction of the current cycle completed, in `[0, 1]`.
    #[must_use]
    pub fn progress(&self) -> f64 {
        (self.elapsed / self.period).clamp(0.0, 1.0)
    }

    /// Advance the timer and fire at most once.
    ///
    /// Returns `true` if the conversion fired. Inputs and outputs move
    /// through `storage`; a firing only happens when every input is fully
    /// in stock.
    pub fn update(&mut self, dt: f64, storage: &mut ItemStore) -> bool {
        self.elapsed += dt;
        if self.elapsed < self.period {
            return false;
        }
        if !storage.has_all(&self.inputs) {
            // Hold ready without banking extra cycles
            self.elapsed = self.period;
            return false;
        }
        self.elapsed -= self.period;
        for input in &self.inputs {
            let removed = storage.remove_up_to(input.item, input.count);
            debug_assert_eq!(removed, input.count);
        }
        for output in &self.outputs {
            storage.add(output.item, output.count);
        }
        true
    }
}

/// One building inside a complex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    /// Tiles the building occupies.
    footprint: TileRect,
    /// Conversions this building runs.
    conversions: Vec<Conversion>,
}

impl Member {
    /// Create a member with no conversions (pure storage or decoration).
    #[must_use]
    pub const fn new(footprint: TileRect) -> Self {
        Self {
            footprint,
            conversions: Vec::new(),
        }
    }

    /// Attach conversions.
    #[must_use]
    pub fn with_conversions(mut self, conversions: Vec<Conversion>) -> Self {
        self.conversions = conversions;
        self
    }

    /// Tiles the building occupies.
    #[must_use]
    pub const fn footprint(&self) -> TileRect {
        self.footprint
    }

    /// The member's conversions.
    #[must_use]
    pub fn conversions(&self) -> &[Conversion] {
        &self.conversions
    }

    /// Add a conversion.
    pub fn add_conversion(&mut self, conversion: Conversion) {
        self.conversions.push(conversion);
    }

    /// Advance every conversion against the shared store.
    ///
    /// Returns how many conversions fired this pass.
    pub fn update(&mut self, dt: f64, storage: &mut ItemStore) -> u32 {
        let mut fired = 0;
        for conversion in &mut self.conversions {
            if conversion.update(dt, storage) {
                fired += 1;
            }
        }
        fired
    }
}

/// A group of building members pooling one item store.
///
/// Members are keyed by their anchor (minimum) tile; iteration order is
/// therefore tile order and deterministic. The cached centroid of member
/// anchor tiles serves nearest-complex queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Complex {
    /// Members keyed by anchor tile.
    members: BTreeMap<TileCoord, Member>,
    /// Shared item store.
    storage: ItemStore,
    /// Centroid of member anchor tiles (x, tile units).
    center_x: f64,
    /// Centroid of member anchor tiles (z, tile units).
    center_z: f64,
}

impl Complex {
    /// Create an empty complex.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member anchored at `tile`.
    ///
    /// Returns the member previously anchored there, if any.
    pub fn add_member(&mut self, tile: TileCoord, member: Member) -> Option<Member> {
        let previous = self.members.insert(tile, member);
        self.recompute_center();
        previous
    }

    /// Remove the member anchored at `tile`.
    pub fn remove_member(&mut self, tile: TileCoord) -> Option<Member> {
        let removed = self.members.remove(&tile);
        if removed.is_some() {
            self.recompute_center();
        }
        removed
    }

    /// The member anchored exactly at `tile`.
    #[must_use]
    pub fn member_at(&self, tile: TileCoord) -> Option<&Member> {
        self.members.get(&tile)
    }

    /// The member whose footprint covers `tile`, with its anchor.
    #[must_use]
    pub fn member_covering(&self, tile: TileCoord) -> Option<(TileCoord, &Member)> {
        self.members
            .iter()
            .find(|(_, member)| member.footprint.contains(tile))
            .map(|(anchor, member)| (*anchor, member))
    }

    /// Iterate members in anchor-tile order.
    pub fn members(&self) -> impl Iterator<Item = (TileCoord, &Member)> {
        self.members.iter().map(|(tile, member)| (*tile, member))
    }

    /// Number of members.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Whether the complex has no members left.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Footprints of every member, in anchor-tile order.
    ///
    /// These are the stop targets for route searches toward this complex.
    #[must_use]
    pub fn member_footprints(&self) -> Vec<TileRect> {
        self.members.values().map(|m| m.footprint).collect()
    }

    /// Centroid of member anchor tiles in tile units.
    ///
    /// Zero for an empty complex.
    #[must_use]
    pub const fn center(&self) -> (f64, f64) {
        (self.center_x, self.center_z)
    }

    /// Distance in tile units from a tile to the cached centroid.
    #[must_use]
    pub fn center_distance(&self, tile: TileCoord) -> f64 {
        let dx = f64::from(tile.x) - self.center_x;
        let dz = f64::from(tile.z) - self.center_z;
        (dx * dx + dz * dz).sqrt()
    }

    /// The shared item store.
    #[must_use]
    pub const fn storage(&self) -> &ItemStore {
        &self.storage
    }

    /// The shared item store, mutably.
    pub fn storage_mut(&mut self) -> &mut ItemStore {
        &mut self.storage
    }

    /// Units of one item in the shared store.
    #[must_use]
    pub fn stored_count(&self, item: ItemId) -> u32 {
        self.storage.count(item)
    }

    /// Add items to the shared store.
    pub fn add_stored(&mut self, item: ItemId, count: u32) {
        self.storage.add(item, count);
    }

    /// Remove items from the shared store.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InsufficientStock`](crate::error::CoreError::InsufficientStock)
    /// if fewer than `count` units are stored; the store is unchanged on
    /// failure.
    pub fn remove_stored(&mut self, item: ItemId, count: u32) -> Result<()> {
        self.storage.remove(item, count)
    }

    /// Overwrite the stored amount of one item.
    pub fn set_stored(&mut self, item: ItemId, count: u32) {
        self.storage.set(item, count);
    }

    /// Advance every member's conversions against the shared store.
    ///
    /// Returns the anchor tile of each firing, in member order, one entry
    /// per conversion fired.
    pub fn update(&mut self, dt: f64) -> Vec<TileCoord> {
        let mut fired = Vec::new();
        for (tile, member) in &mut self.members {
            let count = member.update(dt, &mut self.storage);
            for _ in 0..count {
                fired.push(*tile);
            }
        }
        fired
    }

    fn recompute_center(&mut self) {
        if self.members.is_empty() {
            self.center_x = 0.0;
            self.center_z = 0.0;
            return;
        }
        #[allow(clippy::cast_precision_loss)]
        let count = self.members.len() as f64;
        let mut sum_x = 0.0;
        let mut sum_z = 0.0;
        for tile in self.members.keys() {
            sum_x += f64::from(tile.x);
            sum_z += f64::from(tile.z);
        }
        self.center_x = sum_x / count;
        self.center_z = sum_z / count;
    }
}

/// Slot pool of complexes with stable, recycled ids.
///
/// A complex id is its slot index. Deleting a complex frees the slot;
/// the next creation reuses the lowest free slot before growing the
/// pool, so ids stay dense and deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplexBank {
    /// Complexes by slot index; `None` marks a free slot.
    slots: Vec<Option<Complex>>,
    /// Free slot indices; the lowest is reused first.
    free: BTreeSet<u32>,
}

impl ComplexBank {
    /// Create an empty bank.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new empty complex, reusing the lowest free slot.
    pub fn create_complex(&mut self) -> ComplexId {
        let id = if let Some(index) = self.free.pop_first() {
            self.slots[index as usize] = Some(Complex::new());
            ComplexId::new(index)
        } else {
            self.slots.push(Some(Complex::new()));
            #[allow(clippy::cast_possible_truncation)]
            ComplexId::new((self.slots.len() - 1) as u32)
        };
        tracing::debug!(complex = id.0, "complex created");
        id
    }

    /// Delete a complex and free its slot for reuse.
    ///
    /// Returns `false` if the id is not live.
    pub fn delete_complex(&mut self, id: ComplexId) -> bool {
        match self.slots.get_mut(id.index()) {
            Some(slot) if slot.is_some() => {
                *slot = None;
                self.free.insert(id.0);
                tracing::debug!(complex = id.0, "complex deleted");
                true
            }
            _ => false,
        }
    }

    /// The complex with the given id, if live.
    #[must_use]
    pub fn get(&self, id: ComplexId) -> Option<&Complex> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    /// The complex with the given id, mutably, if live.
    pub fn get_mut(&mut self, id: ComplexId) -> Option<&mut Complex> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// The complex with the given id.
    ///
    /// # Panics
    ///
    /// Panics if the id is not live. Use [`get`](Self::get) at boundaries
    /// where stale ids can arrive.
    #[must_use]
    pub fn complex(&self, id: ComplexId) -> &Complex {
        self.get(id)
            .unwrap_or_else(|| panic!("complex {} is not live", id.0))
    }

    /// The complex with the given id, mutably.
    ///
    /// # Panics
    ///
    /// Panics if the id is not live.
    pub fn complex_mut(&mut self, id: ComplexId) -> &mut Complex {
        self.get_mut(id)
            .unwrap_or_else(|| panic!("complex {} is not live", id.0))
    }

    /// The live complex closest to a tile by centroid distance.
    ///
    /// Linear scan; ties go to the lowest slot index. Callers apply their
    /// own distance threshold.
    #[must_use]
    pub fn closest_to(&self, tile: TileCoord) -> Option<ComplexId> {
        self.iter()
            .map(|(id, complex)| (id, complex.center_distance(tile)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    /// The live complex with a member covering the given tile.
    #[must_use]
    pub fn complex_at(&self, tile: TileCoord) -> Option<ComplexId> {
        self.iter()
            .find(|(_, complex)| complex.member_covering(tile).is_some())
            .map(|(id, _)| id)
    }

    /// Iterate live complexes in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (ComplexId, &Complex)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            #[allow(clippy::cast_possible_truncation)]
            slot.as_ref().map(|c| (ComplexId::new(index as u32), c))
        })
    }

    /// Number of live complexes.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Total slots including free ones. Save encoding walks all slots.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// All slots in index order, free slots as `None`.
    #[must_use]
    pub fn slots(&self) -> &[Option<Complex>] {
        &self.slots
    }

    /// Rebuild a bank from decoded slots; the free list is derived from
    /// the `None` entries.
    #[must_use]
    pub fn from_slots(slots: Vec<Option<Complex>>) -> Self {
        let free = slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(index, _)| {
                #[allow(clippy::cast_possible_truncation)]
                {
                    index as u32
                }
            })
            .collect();
        Self { slots, free }
    }

    /// Advance every live complex, reporting conversion firings.
    pub fn update(&mut self, dt: f64, events: &mut TickEvents) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(complex) = slot {
                #[allow(clippy::cast_possible_truncation)]
                let id = ComplexId::new(index as u32);
                for tile in complex.update(dt) {
                    events.push(SimEvent::ConversionCompleted { complex: id, tile });
                }
            }
        }
    }
}
