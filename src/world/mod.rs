//! The world/room state engine.
//!
//! [`World`] owns every table the engine mutates: the dense map grid, the
//! sparse room table, the shared-data arena, both sector indices, empire
//! aggregates, the event queue and the save-request queue. Nothing here is
//! global; each test builds its own `World`.
//!
//! ## Module organization
//!
//! - [`grid`] / [`room`] / [`shared`] - the spatial data structures
//! - [`terrain`] - the terrain mutation pipeline (`change_terrain`)
//! - [`lifecycle`] - room load/unload, create/delete, exits and resets
//! - [`territory`] - ownership, cities and the territory/tech aggregator
//! - [`annual`] - the yearly decay sweep
//! - [`events`] - delayed callbacks and their cancellation
//! - [`vehicles`] - vehicles and their interiors

pub mod annual;
pub mod catalog;
pub mod empire;
pub mod errors;
pub mod events;
pub mod grid;
pub mod hooks;
pub mod lifecycle;
pub mod room;
pub mod sector_index;
pub mod shared;
pub mod terrain;
pub mod territory;
pub mod types;
pub mod vehicles;

use std::collections::BTreeSet;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::Config;
use crate::storage::save_queue::{SaveBits, SaveQueue};
use crate::world::catalog::{Catalog, SectorFlags};
use crate::world::empire::EmpireRegistry;
use crate::world::events::{EventQueue, WorldEvent};
use crate::world::grid::WorldMap;
use crate::world::hooks::{NullHooks, WorldHooks};
use crate::world::room::RoomTable;
use crate::world::sector_index::SectorIndex;
use crate::world::shared::{SharedRef, SharedRoomData, SharedStore};
use crate::world::types::{CropVnum, IslandId, RoomVnum, SectorVnum, NO_ISLAND};
use crate::world::vehicles::VehicleTable;

pub use crate::world::errors::WorldError;

/// Source of "now" for timers. Tests pin the clock so timing is deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clock {
    System,
    Fixed(i64),
}

impl Clock {
    pub fn now(&self) -> i64 {
        match self {
            Clock::System => chrono::Utc::now().timestamp(),
            Clock::Fixed(t) => *t,
        }
    }
}

pub struct World {
    pub(crate) config: Config,
    pub(crate) catalog: Catalog,
    pub(crate) map: WorldMap,
    pub(crate) shared_data: SharedStore,
    pub(crate) rooms: RoomTable,
    pub(crate) sectors: SectorIndex,
    pub(crate) empires: EmpireRegistry,
    pub(crate) events: EventQueue<WorldEvent>,
    pub(crate) saves: SaveQueue,
    pub(crate) vehicles: VehicleTable,
    pub(crate) hooks: Box<dyn WorldHooks>,
    rng: StdRng,
    clock: Clock,
    /// Set when the map file was written by another version.
    pub save_world_after_startup: bool,
    pub(crate) extraction_room: Option<RoomVnum>,
    pub(crate) mapout_pending: BTreeSet<RoomVnum>,
    pub(crate) start_locations: BTreeSet<RoomVnum>,
    pub(crate) shutting_down: bool,
    pub(crate) in_terrain_fallback: bool,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("width", &self.map.width())
            .field("height", &self.map.height())
            .field("rooms", &self.rooms.len())
            .field("empires", &self.empires.len())
            .field("pending_events", &self.events.len())
            .finish()
    }
}

impl World {
    /// An all-ocean world sized by `config.world`.
    pub fn new(config: Config, catalog: Catalog) -> Self {
        let wc = &config.world;
        let map = WorldMap::new(wc.width, wc.height, wc.basic_ocean_sector);
        let mut sectors = SectorIndex::new();
        sectors.seed_map(map.size(), wc.basic_ocean_sector);
        let rooms = RoomTable::new(map.size(), wc.max_room_vnum);
        let rng = match wc.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        info!(
            "World initialised: {}x{} map, {} catalog sectors",
            map.width(),
            map.height(),
            catalog.sectors.len()
        );
        Self {
            config,
            catalog,
            map,
            shared_data: SharedStore::new(),
            rooms,
            sectors,
            empires: EmpireRegistry::new(),
            events: EventQueue::new(),
            saves: SaveQueue::new(),
            vehicles: VehicleTable::new(),
            hooks: Box::new(NullHooks),
            rng,
            clock: Clock::System,
            save_world_after_startup: false,
            extraction_room: None,
            mapout_pending: BTreeSet::new(),
            start_locations: BTreeSet::new(),
            shutting_down: false,
            in_terrain_fallback: false,
        }
    }

    pub fn with_hooks(mut self, hooks: Box<dyn WorldHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn set_hooks(&mut self, hooks: Box<dyn WorldHooks>) {
        self.hooks = hooks;
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Move a fixed clock forward; no effect on the system clock.
    pub fn advance_clock(&mut self, secs: i64) {
        if let Clock::Fixed(t) = self.clock {
            self.clock = Clock::Fixed(t + secs);
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn map(&self) -> &WorldMap {
        &self.map
    }

    pub fn rooms(&self) -> &RoomTable {
        &self.rooms
    }

    pub fn sectors(&self) -> &SectorIndex {
        &self.sectors
    }

    pub fn empires(&self) -> &EmpireRegistry {
        &self.empires
    }

    pub fn empires_mut(&mut self) -> &mut EmpireRegistry {
        &mut self.empires
    }

    pub fn shared_store(&self) -> &SharedStore {
        &self.shared_data
    }

    pub fn events(&self) -> &EventQueue<WorldEvent> {
        &self.events
    }

    pub fn saves(&self) -> &SaveQueue {
        &self.saves
    }

    pub fn saves_mut(&mut self) -> &mut SaveQueue {
        &mut self.saves
    }

    pub fn vehicles(&self) -> &VehicleTable {
        &self.vehicles
    }

    pub fn start_locations(&self) -> Vec<RoomVnum> {
        self.start_locations.iter().copied().collect()
    }

    pub fn extraction_room(&self) -> Option<RoomVnum> {
        self.extraction_room
    }

    pub fn map_size(&self) -> RoomVnum {
        self.map.size()
    }

    pub fn is_map_vnum(&self, vnum: RoomVnum) -> bool {
        self.map.in_bounds(vnum)
    }

    /// Whether `vnum` names a map tile or a materialized room.
    pub fn exists(&self, vnum: RoomVnum) -> bool {
        self.map.in_bounds(vnum) || self.rooms.contains(vnum)
    }

    pub fn set_shutting_down(&mut self, value: bool) {
        self.shutting_down = value;
    }

    /// Uniform roll in `from..=to`.
    pub(crate) fn number(&mut self, from: i32, to: i32) -> i32 {
        if to <= from {
            return from;
        }
        self.rng.gen_range(from..=to)
    }

    pub(crate) fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub(crate) fn shared_ref(&self, vnum: RoomVnum) -> Option<SharedRef> {
        if let Some(room) = self.rooms.get(vnum) {
            return Some(room.shared);
        }
        self.map.tile(vnum).map(|tile| tile.shared)
    }

    pub fn shared(&self, vnum: RoomVnum) -> Option<&SharedRoomData> {
        self.shared_ref(vnum).and_then(|r| self.shared_data.get(r))
    }

    /// Mutable shared data for private blocks only; ocean tiles return `None`.
    pub(crate) fn shared_mut(&mut self, vnum: RoomVnum) -> Option<&mut SharedRoomData> {
        let shared = self.shared_ref(vnum)?;
        self.shared_data.get_mut(shared)
    }

    /// Mutable shared data, splitting the ocean sentinel into a private
    /// block first. The tile and its room keep pointing at the same block.
    pub(crate) fn shared_for_write(&mut self, vnum: RoomVnum) -> Option<&mut SharedRoomData> {
        let current = self.shared_ref(vnum)?;
        let shared = if current.is_ocean() {
            let split = self.shared_data.split_ocean();
            if let Some(tile) = self.map.tile_mut(vnum) {
                tile.shared = split;
            }
            if let Some(room) = self.rooms.get_mut(vnum) {
                room.shared = split;
            }
            debug!("Split ocean shared data for {}", vnum);
            split
        } else {
            current
        };
        self.shared_data.get_mut(shared)
    }

    pub fn sector_of(&self, vnum: RoomVnum) -> Option<SectorVnum> {
        if let Some(room) = self.rooms.get(vnum) {
            return Some(room.sector);
        }
        self.map.tile(vnum).map(|tile| tile.sector)
    }

    pub fn base_sector_of(&self, vnum: RoomVnum) -> Option<SectorVnum> {
        if let Some(room) = self.rooms.get(vnum) {
            return Some(room.base_sector);
        }
        self.map.tile(vnum).map(|tile| tile.base_sector)
    }

    pub fn crop_of(&self, vnum: RoomVnum) -> Option<CropVnum> {
        if let Some(room) = self.rooms.get(vnum) {
            return room.crop;
        }
        self.map.tile(vnum).and_then(|tile| tile.crop)
    }

    pub fn height_of(&self, vnum: RoomVnum) -> i32 {
        self.shared(vnum).map(|s| s.height).unwrap_or(0)
    }

    pub fn island_of(&self, vnum: RoomVnum) -> IslandId {
        self.shared(vnum).map(|s| s.island_id).unwrap_or(NO_ISLAND)
    }

    /// Set a tile's island; islands are assigned by the map generator.
    /// Island-scoped techs counted at the tile move with it.
    pub fn set_island(&mut self, vnum: RoomVnum, island: IslandId) -> bool {
        if self.island_of(vnum) == island {
            return true;
        }
        let (buildings, vehicles) = self.tech_contributors_at(vnum);
        for room in &buildings {
            self.adjust_building_tech(*room, false);
        }
        for id in &vehicles {
            self.adjust_vehicle_tech(*id, false);
        }
        let changed = match self.shared_for_write(vnum) {
            Some(shared) => {
                shared.island_id = island;
                true
            }
            None => false,
        };
        for room in &buildings {
            self.adjust_building_tech(*room, true);
        }
        for id in &vehicles {
            self.adjust_vehicle_tech(*id, true);
        }
        if changed {
            self.request_world_save(vnum, SaveBits::MAP);
        }
        changed
    }

    pub fn set_height(&mut self, vnum: RoomVnum, height: i32) -> bool {
        if self.height_of(vnum) == height {
            return true;
        }
        match self.shared_for_write(vnum) {
            Some(shared) => {
                shared.height = height;
                self.request_world_save(vnum, SaveBits::MAP);
                true
            }
            None => false,
        }
    }

    pub fn owner_of(&self, vnum: RoomVnum) -> Option<i32> {
        self.rooms.get(vnum).and_then(|r| r.owner)
    }

    pub fn is_ocean_sector(&self, sect: SectorVnum) -> bool {
        self.catalog.sector_has(sect, SectorFlags::OCEAN)
    }

    /// Queue persistence for `vnum`; bits accumulate until the next flush.
    pub fn request_world_save(&mut self, vnum: RoomVnum, bits: SaveBits) {
        self.saves.request(vnum, bits);
    }

    pub(crate) fn request_mapout_update(&mut self, vnum: RoomVnum) {
        if self.map.in_bounds(vnum) {
            self.mapout_pending.insert(vnum);
        }
    }

    /// Drain the mapout set as `(x, y, icon)` lines.
    pub fn take_mapout(&mut self) -> Vec<(i32, i32, String)> {
        let pending = std::mem::take(&mut self.mapout_pending);
        pending
            .into_iter()
            .filter_map(|vnum| {
                let (x, y) = self.map.coords(vnum);
                let icon = self
                    .shared(vnum)
                    .and_then(|s| s.icon.clone())
                    .or_else(|| {
                        self.sector_of(vnum)
                            .and_then(|s| self.catalog.sector(s))
                            .map(|p| p.icon.clone())
                    })?;
                Some((x, y, icon))
            })
            .collect()
    }

    pub(crate) fn rebuild_land(&mut self) {
        let catalog = &self.catalog;
        self.map
            .rebuild_land(|sect| catalog.sector_has(sect, SectorFlags::OCEAN));
    }

    pub(crate) fn rebuild_start_locations(&mut self) {
        let catalog = &self.catalog;
        self.start_locations = self
            .map
            .tiles()
            .filter(|tile| catalog.sector_has(tile.sector, SectorFlags::START_LOCATION))
            .map(|tile| tile.vnum)
            .collect();
        debug!("{} start locations", self.start_locations.len());
    }

    /// Check that every tile and interior room sits in exactly one current
    /// and one base bucket matching its sectors, and that totals agree.
    pub fn verify_sector_index(&self) -> Result<(), String> {
        for tile in self.map.tiles() {
            if !self.sectors.contains(tile.vnum, tile.sector)
                || self.sectors.buckets_holding(tile.vnum) != 1
            {
                return Err(format!("tile {} not indexed under sector {}", tile.vnum, tile.sector));
            }
            if !self.sectors.base_contains(tile.vnum, tile.base_sector)
                || self.sectors.base_buckets_holding(tile.vnum) != 1
            {
                return Err(format!(
                    "tile {} not indexed under base {}",
                    tile.vnum, tile.base_sector
                ));
            }
            if let Some(room) = self.rooms.get(tile.vnum) {
                if room.sector != tile.sector || room.base_sector != tile.base_sector {
                    return Err(format!("room {} disagrees with its tile", tile.vnum));
                }
                if room.shared != tile.shared {
                    return Err(format!("room {} shared data differs from its tile", tile.vnum));
                }
            }
        }
        for vnum in self.rooms.interior_vnums() {
            let Some(room) = self.rooms.get(vnum) else {
                continue;
            };
            if !self.sectors.contains(vnum, room.sector) || self.sectors.buckets_holding(vnum) != 1 {
                return Err(format!("interior {} not indexed under {}", vnum, room.sector));
            }
            if !self.sectors.base_contains(vnum, room.base_sector)
                || self.sectors.base_buckets_holding(vnum) != 1
            {
                return Err(format!("interior {} not indexed under base {}", vnum, room.base_sector));
            }
        }
        let expected = self.map.size() as usize + self.rooms.interior_count();
        if self.sectors.total() != expected || self.sectors.base_total() != expected {
            return Err(format!(
                "index totals {}/{} != {}",
                self.sectors.total(),
                self.sectors.base_total(),
                expected
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn small_config() -> Config {
        let mut config = Config::default();
        config.world.width = 20;
        config.world.height = 20;
        config.world.max_room_vnum = 1_000;
        config.world.rng_seed = Some(7);
        config
    }

    pub fn small_world() -> World {
        World::new(small_config(), Catalog::builtin()).with_clock(Clock::Fixed(1_700_000_000))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::small_world;
    use super::*;

    #[test]
    fn fresh_world_is_consistent_ocean() {
        let world = small_world();
        assert_eq!(world.map_size(), 400);
        assert_eq!(world.map().land_count(), 0);
        assert_eq!(world.sectors().count(2), 400);
        assert!(world.verify_sector_index().is_ok());
        assert_eq!(world.shared_store().live(), 0);
    }

    #[test]
    fn writing_ocean_shared_data_splits_the_sentinel() {
        let mut world = small_world();
        assert!(world.set_height(5, 3));
        assert_eq!(world.height_of(5), 3);
        assert_eq!(world.height_of(6), 0);
        assert_eq!(world.shared_store().live(), 1);
        assert!(!world.map().tile(5).map(|t| t.shared.is_ocean()).unwrap_or(true));
        assert!(world.shared_store().ocean().height == 0);
    }

    #[test]
    fn fixed_clock_advances_only_when_asked() {
        let mut world = small_world();
        let start = world.now();
        world.advance_clock(90);
        assert_eq!(world.now(), start + 90);
    }
}
