//! Customization data shared by a map tile and its materialized room.
//!
//! Blocks live in an arena and are addressed by [`SharedRef`]. Plain ocean
//! tiles all point at the [`SharedRef::Ocean`] sentinel, which is immutable:
//! writers must split a private block first (see `World::shared_for_write`).

use std::collections::BTreeMap;

use crate::world::events::StoredEvents;
use crate::world::types::{DepletionType, ExtraKey, IslandId, RoomAffects, Track, NO_ISLAND};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SharedId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SharedRef {
    /// The interned "plain ocean" value.
    Ocean,
    Owned(SharedId),
}

impl SharedRef {
    pub fn is_ocean(self) -> bool {
        matches!(self, SharedRef::Ocean)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SharedRoomData {
    pub name: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub affects: RoomAffects,
    pub base_affects: RoomAffects,
    pub height: i32,
    pub island_id: IslandId,
    pub depletion: BTreeMap<DepletionType, i32>,
    pub extra: BTreeMap<ExtraKey, i32>,
    pub events: StoredEvents,
    pub tracks: Vec<Track>,
}

impl Default for SharedRoomData {
    fn default() -> Self {
        Self {
            name: None,
            description: None,
            icon: None,
            affects: RoomAffects::empty(),
            base_affects: RoomAffects::empty(),
            height: 0,
            island_id: NO_ISLAND,
            depletion: BTreeMap::new(),
            extra: BTreeMap::new(),
            events: StoredEvents::default(),
            tracks: Vec::new(),
        }
    }
}

impl SharedRoomData {
    /// Anything that differs from plain, never-touched ocean.
    pub fn is_customized(&self) -> bool {
        self.has_text_data()
            || !self.affects.is_empty()
            || !self.base_affects.is_empty()
            || self.height != 0
            || self.island_id != NO_ISLAND
    }

    /// Fields that only the text room file can hold.
    pub fn has_text_data(&self) -> bool {
        self.name.is_some()
            || self.description.is_some()
            || self.icon.is_some()
            || !self.depletion.is_empty()
            || !self.extra.is_empty()
            || !self.tracks.is_empty()
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    pub fn extra(&self, key: ExtraKey) -> Option<i32> {
        self.extra.get(&key).copied()
    }

    pub fn set_extra(&mut self, key: ExtraKey, value: i32) {
        self.extra.insert(key, value);
    }

    pub fn remove_extra(&mut self, key: ExtraKey) -> Option<i32> {
        self.extra.remove(&key)
    }

    pub fn depletion(&self, kind: DepletionType) -> i32 {
        self.depletion.get(&kind).copied().unwrap_or(0)
    }

    pub fn add_depletion(&mut self, kind: DepletionType, amount: i32) {
        *self.depletion.entry(kind).or_insert(0) += amount;
    }

    pub fn remove_depletion(&mut self, kind: DepletionType) {
        self.depletion.remove(&kind);
    }

    pub fn decustomize(&mut self) {
        self.name = None;
        self.description = None;
        self.icon = None;
    }
}

/// Arena of shared blocks plus the ocean sentinel.
#[derive(Debug, Default)]
pub struct SharedStore {
    slots: Vec<Option<SharedRoomData>>,
    free: Vec<u32>,
    ocean: SharedRoomData,
    live: usize,
}

impl SharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ocean(&self) -> &SharedRoomData {
        &self.ocean
    }

    pub fn get(&self, shared: SharedRef) -> Option<&SharedRoomData> {
        match shared {
            SharedRef::Ocean => Some(&self.ocean),
            SharedRef::Owned(SharedId(idx)) => {
                self.slots.get(idx as usize).and_then(|slot| slot.as_ref())
            }
        }
    }

    /// Mutable access to a private block; the sentinel is never handed out.
    pub fn get_mut(&mut self, shared: SharedRef) -> Option<&mut SharedRoomData> {
        match shared {
            SharedRef::Ocean => None,
            SharedRef::Owned(SharedId(idx)) => self
                .slots
                .get_mut(idx as usize)
                .and_then(|slot| slot.as_mut()),
        }
    }

    pub fn alloc(&mut self, data: SharedRoomData) -> SharedRef {
        self.live += 1;
        if let Some(idx) = self.free.pop() {
            self.slots[idx as usize] = Some(data);
            return SharedRef::Owned(SharedId(idx));
        }
        self.slots.push(Some(data));
        SharedRef::Owned(SharedId((self.slots.len() - 1) as u32))
    }

    /// Allocate a private copy of the ocean value.
    pub fn split_ocean(&mut self) -> SharedRef {
        let data = self.ocean.clone();
        self.alloc(data)
    }

    pub fn free(&mut self, shared: SharedRef) -> Option<SharedRoomData> {
        let SharedRef::Owned(SharedId(idx)) = shared else {
            return None;
        };
        let data = self.slots.get_mut(idx as usize)?.take()?;
        self.free.push(idx);
        self.live -= 1;
        Some(data)
    }

    /// Number of private blocks currently allocated.
    pub fn live(&self) -> usize {
        self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ocean_sentinel_is_read_only() {
        let mut store = SharedStore::new();
        assert!(store.get(SharedRef::Ocean).is_some());
        assert!(store.get_mut(SharedRef::Ocean).is_none());
        assert!(store.free(SharedRef::Ocean).is_none());
        assert!(!store.ocean().is_customized());
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut store = SharedStore::new();
        let a = store.split_ocean();
        let b = store.alloc(SharedRoomData {
            height: 4,
            ..SharedRoomData::default()
        });
        assert_eq!(store.live(), 2);
        assert_eq!(store.get(b).map(|d| d.height), Some(4));
        assert!(store.free(a).is_some());
        assert!(store.get(a).is_none());
        let c = store.split_ocean();
        assert_eq!(c, a);
        assert_eq!(store.live(), 2);
    }

    #[test]
    fn customization_tracks_every_field() {
        let mut data = SharedRoomData::default();
        assert!(!data.is_customized());
        data.add_depletion(DepletionType::Chop, 3);
        assert!(data.is_customized() && data.has_text_data());
        data.remove_depletion(DepletionType::Chop);
        data.island_id = 4;
        assert!(data.is_customized());
        assert!(!data.has_text_data());
    }
}
