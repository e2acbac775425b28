//! Reverse index from sector to the tiles and interior rooms currently using it.
//!
//! Two parallel indices are kept: one for current sectors and one for base
//! sectors. A location moves between buckets in a single call so no caller
//! can observe it in zero or two buckets.

use std::collections::{BTreeSet, HashMap};

use crate::world::types::{RoomVnum, SectorVnum};

#[derive(Debug, Default)]
pub struct SectorIndex {
    current: HashMap<SectorVnum, BTreeSet<RoomVnum>>,
    base: HashMap<SectorVnum, BTreeSet<RoomVnum>>,
}

fn shift(
    index: &mut HashMap<SectorVnum, BTreeSet<RoomVnum>>,
    vnum: RoomVnum,
    from: SectorVnum,
    to: SectorVnum,
) {
    if from == to {
        index.entry(to).or_default().insert(vnum);
        return;
    }
    if let Some(bucket) = index.get_mut(&from) {
        bucket.remove(&vnum);
        if bucket.is_empty() {
            index.remove(&from);
        }
    }
    index.entry(to).or_default().insert(vnum);
}

fn drop_from(index: &mut HashMap<SectorVnum, BTreeSet<RoomVnum>>, vnum: RoomVnum, sect: SectorVnum) {
    if let Some(bucket) = index.get_mut(&sect) {
        bucket.remove(&vnum);
        if bucket.is_empty() {
            index.remove(&sect);
        }
    }
}

impl SectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the index with a fresh all-ocean map.
    pub fn seed_map(&mut self, map_size: RoomVnum, ocean: SectorVnum) {
        let all: BTreeSet<RoomVnum> = (0..map_size).collect();
        self.current.insert(ocean, all.clone());
        self.base.insert(ocean, all);
    }

    pub fn add(&mut self, vnum: RoomVnum, sect: SectorVnum, base: SectorVnum) {
        self.current.entry(sect).or_default().insert(vnum);
        self.base.entry(base).or_default().insert(vnum);
    }

    pub fn remove(&mut self, vnum: RoomVnum, sect: SectorVnum, base: SectorVnum) {
        drop_from(&mut self.current, vnum, sect);
        drop_from(&mut self.base, vnum, base);
    }

    pub fn move_current(&mut self, vnum: RoomVnum, from: SectorVnum, to: SectorVnum) {
        shift(&mut self.current, vnum, from, to);
    }

    pub fn move_base(&mut self, vnum: RoomVnum, from: SectorVnum, to: SectorVnum) {
        shift(&mut self.base, vnum, from, to);
    }

    pub fn count(&self, sect: SectorVnum) -> usize {
        self.current.get(&sect).map(|b| b.len()).unwrap_or(0)
    }

    pub fn base_count(&self, sect: SectorVnum) -> usize {
        self.base.get(&sect).map(|b| b.len()).unwrap_or(0)
    }

    pub fn members(&self, sect: SectorVnum) -> Vec<RoomVnum> {
        self.current
            .get(&sect)
            .map(|b| b.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn base_members(&self, sect: SectorVnum) -> Vec<RoomVnum> {
        self.base
            .get(&sect)
            .map(|b| b.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, vnum: RoomVnum, sect: SectorVnum) -> bool {
        self.current.get(&sect).map(|b| b.contains(&vnum)).unwrap_or(false)
    }

    pub fn base_contains(&self, vnum: RoomVnum, base: SectorVnum) -> bool {
        self.base.get(&base).map(|b| b.contains(&vnum)).unwrap_or(false)
    }

    /// Sum of all current-sector bucket sizes.
    pub fn total(&self) -> usize {
        self.current.values().map(|b| b.len()).sum()
    }

    pub fn base_total(&self) -> usize {
        self.base.values().map(|b| b.len()).sum()
    }

    /// Number of current buckets holding `vnum` (1 when consistent).
    pub fn buckets_holding(&self, vnum: RoomVnum) -> usize {
        self.current.values().filter(|b| b.contains(&vnum)).count()
    }

    pub fn base_buckets_holding(&self, vnum: RoomVnum) -> usize {
        self.base.values().filter(|b| b.contains(&vnum)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moves_keep_each_location_in_one_bucket() {
        let mut index = SectorIndex::new();
        index.seed_map(4, 2);
        assert_eq!(index.count(2), 4);
        index.move_current(1, 2, 0);
        index.move_base(1, 2, 0);
        assert_eq!(index.count(2), 3);
        assert_eq!(index.members(0), vec![1]);
        assert_eq!(index.buckets_holding(1), 1);
        assert_eq!(index.base_buckets_holding(1), 1);
        index.move_current(1, 0, 0);
        assert_eq!(index.count(0), 1);
        assert_eq!(index.total(), 4);
    }

    #[test]
    fn add_and_remove_interior_rooms() {
        let mut index = SectorIndex::new();
        index.seed_map(2, 2);
        index.add(10, 12, 12);
        assert_eq!(index.total(), 3);
        assert_eq!(index.base_total(), 3);
        index.remove(10, 12, 12);
        assert_eq!(index.total(), 2);
        assert_eq!(index.count(12), 0);
    }
}
