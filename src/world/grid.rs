//! The always-resident map grid.
//!
//! One [`MapTile`] per coordinate, addressed by `vnum = y * width + x`. Both
//! axes wrap, so every step off an edge lands on the opposite edge. The land
//! set mirrors the original land list: every tile whose current sector is not
//! ocean, kept ordered so sweeps visit tiles in vnum order.

use std::collections::BTreeSet;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::world::shared::SharedRef;
use crate::world::types::{CropVnum, Direction, RoomVnum, SectorVnum};

bitflags! {
    /// Per-tile bits stored in the map record's misc field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct TileFlags: u32 {
        /// Custom icon was copied from the sector and is pinned.
        const ICON_LOCKED = 1 << 0;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapTile {
    pub vnum: RoomVnum,
    pub sector: SectorVnum,
    pub base_sector: SectorVnum,
    pub natural_sector: SectorVnum,
    pub crop: Option<CropVnum>,
    pub shared: SharedRef,
    /// Unix time of the last sector change.
    pub sector_time: i64,
    pub flags: TileFlags,
    pub(crate) room_loaded: bool,
}

impl MapTile {
    fn ocean(vnum: RoomVnum, ocean: SectorVnum) -> Self {
        Self {
            vnum,
            sector: ocean,
            base_sector: ocean,
            natural_sector: ocean,
            crop: None,
            shared: SharedRef::Ocean,
            sector_time: 0,
            flags: TileFlags::empty(),
            room_loaded: false,
        }
    }

    /// True while a full room is materialized for this tile.
    pub fn has_room(&self) -> bool {
        self.room_loaded
    }
}

#[derive(Debug, Clone)]
pub struct WorldMap {
    width: i32,
    height: i32,
    tiles: Vec<MapTile>,
    land: BTreeSet<RoomVnum>,
}

impl WorldMap {
    /// Build a grid where every tile is basic ocean.
    pub fn new(width: i32, height: i32, ocean: SectorVnum) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let tiles = (0..width * height)
            .map(|vnum| MapTile::ocean(vnum, ocean))
            .collect();
        Self {
            width,
            height,
            tiles,
            land: BTreeSet::new(),
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn size(&self) -> i32 {
        self.width * self.height
    }

    pub fn in_bounds(&self, vnum: RoomVnum) -> bool {
        vnum >= 0 && vnum < self.size()
    }

    pub fn tile(&self, vnum: RoomVnum) -> Option<&MapTile> {
        usize::try_from(vnum).ok().and_then(|i| self.tiles.get(i))
    }

    pub fn tile_mut(&mut self, vnum: RoomVnum) -> Option<&mut MapTile> {
        usize::try_from(vnum).ok().and_then(move |i| self.tiles.get_mut(i))
    }

    pub fn tiles(&self) -> impl Iterator<Item = &MapTile> {
        self.tiles.iter()
    }

    pub fn coords(&self, vnum: RoomVnum) -> (i32, i32) {
        (vnum.rem_euclid(self.width), vnum.div_euclid(self.width))
    }

    pub fn vnum_at(&self, x: i32, y: i32) -> RoomVnum {
        y.rem_euclid(self.height) * self.width + x.rem_euclid(self.width)
    }

    pub fn shift(&self, vnum: RoomVnum, dx: i32, dy: i32) -> RoomVnum {
        let (x, y) = self.coords(vnum);
        self.vnum_at(x + dx, y + dy)
    }

    /// Planar step in `dir`; `None` for up/down.
    pub fn step(&self, vnum: RoomVnum, dir: Direction) -> Option<RoomVnum> {
        dir.offset().map(|(dx, dy)| self.shift(vnum, dx, dy))
    }

    pub fn neighbors(&self, vnum: RoomVnum) -> Vec<RoomVnum> {
        Direction::PLANAR
            .iter()
            .filter_map(|dir| self.step(vnum, *dir))
            .collect()
    }

    /// Straight-line distance honouring wraparound on both axes.
    pub fn distance(&self, a: RoomVnum, b: RoomVnum) -> i32 {
        let (ax, ay) = self.coords(a);
        let (bx, by) = self.coords(b);
        let mut dx = (ax - bx).abs();
        let mut dy = (ay - by).abs();
        dx = dx.min(self.width - dx);
        dy = dy.min(self.height - dy);
        f64::from(dx * dx + dy * dy).sqrt() as i32
    }

    pub fn is_land(&self, vnum: RoomVnum) -> bool {
        self.land.contains(&vnum)
    }

    pub fn land_count(&self) -> usize {
        self.land.len()
    }

    /// Snapshot of the land set, safe to iterate while mutating tiles.
    pub fn land_vnums(&self) -> Vec<RoomVnum> {
        self.land.iter().copied().collect()
    }

    pub fn set_land(&mut self, vnum: RoomVnum, land: bool) {
        if land {
            self.land.insert(vnum);
        } else {
            self.land.remove(&vnum);
        }
    }

    /// Rescan every tile once and rebuild the land set.
    pub fn rebuild_land(&mut self, is_ocean: impl Fn(SectorVnum) -> bool) {
        self.land = self
            .tiles
            .iter()
            .filter(|tile| !is_ocean(tile.sector))
            .map(|tile| tile.vnum)
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_wrap_on_both_axes() {
        let map = WorldMap::new(10, 5, 2);
        assert_eq!(map.size(), 50);
        assert_eq!(map.vnum_at(3, 2), 23);
        assert_eq!(map.coords(23), (3, 2));
        assert_eq!(map.vnum_at(-1, 0), 9);
        assert_eq!(map.vnum_at(0, -1), 40);
        assert_eq!(map.vnum_at(10, 5), 0);
        assert_eq!(map.step(9, Direction::East), Some(0));
        assert_eq!(map.step(0, Direction::South), Some(40));
        assert_eq!(map.step(0, Direction::Up), None);
    }

    #[test]
    fn distance_takes_the_short_way_round() {
        let map = WorldMap::new(100, 100, 2);
        let a = map.vnum_at(1, 1);
        let b = map.vnum_at(98, 1);
        assert_eq!(map.distance(a, b), 3);
        let c = map.vnum_at(4, 5);
        assert_eq!(map.distance(a, c), 5);
    }

    #[test]
    fn new_map_is_all_ocean_and_no_land() {
        let mut map = WorldMap::new(4, 4, 2);
        assert!(map.tiles().all(|t| t.sector == 2 && t.shared == SharedRef::Ocean));
        assert_eq!(map.land_count(), 0);
        if let Some(tile) = map.tile_mut(5) {
            tile.sector = 0;
        }
        map.rebuild_land(|sect| sect == 2);
        assert_eq!(map.land_vnums(), vec![5]);
        assert_eq!(map.neighbors(5).len(), 8);
    }
}
