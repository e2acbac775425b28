//! Terrain mutation pipeline.
//!
//! [`World::change_terrain`] is the only sanctioned way to change what a map
//! tile is. Every step tolerates state a previous step already applied, so a
//! partially applied change never leaves the indices inconsistent.

use log::{debug, info};

use crate::logutil::room_text;
use crate::metrics;
use crate::storage::save_queue::SaveBits;
use crate::syserr;
use crate::world::catalog::{BuildingFlags, CropFlags, EvolutionKind, SectorFlags};
use crate::world::events::StoredEventKind;
use crate::world::grid::TileFlags;
use crate::world::room::ComplexData;
use crate::world::shared::SharedRef;
use crate::world::types::{
    BuildingVnum, CropVnum, DepletionType, ExtraKey, RoomAffects, RoomVnum, SectorVnum, Track,
};
use crate::world::World;

const TRANSIENT_EXTRAS: [ExtraKey; 6] = [
    ExtraKey::ChopProgress,
    ExtraKey::HarvestProgress,
    ExtraKey::TrenchProgress,
    ExtraKey::SeedTime,
    ExtraKey::TrenchFillTime,
    ExtraKey::TrenchOriginalSector,
];

const TERRAIN_DEPLETIONS: [DepletionType; 3] =
    [DepletionType::Chop, DepletionType::Pick, DepletionType::Forage];

/// Clamp a unix time into the 32-bit extra-data store.
pub(crate) fn time_to_extra(t: i64) -> i32 {
    i32::try_from(t).unwrap_or(i32::MAX)
}

impl World {
    /// Change the sector of a map location, optionally with a distinct base
    /// sector (`None` makes the base match the new sector).
    pub fn change_terrain(
        &mut self,
        vnum: RoomVnum,
        sect: SectorVnum,
        base: Option<SectorVnum>,
    ) -> bool {
        if !self.map.in_bounds(vnum) {
            syserr!("change_terrain called outside the map ({})", vnum);
            return false;
        }
        let base = base.unwrap_or(sect);
        if self.catalog.sector(sect).is_none() || self.catalog.sector(base).is_none() {
            syserr!(
                "change_terrain called with invalid sector {} / base {} for room {}",
                sect,
                base,
                vnum
            );
            return false;
        }
        metrics::inc_terrain_changes();
        metrics::record_sector_entry(sect);

        let Some(old_sect) = self.sector_of(vnum) else {
            return false;
        };
        let old_crop = self.crop_of(vnum);
        let class_before = self.territory_class_of(vnum);

        // tear down the old building and customizations
        self.disassociate_building(vnum);
        self.decustomize_room(vnum);

        let wants_crop = self.catalog.sector_has(sect, SectorFlags::HAS_CROP_DATA)
            || self.catalog.sector_has(base, SectorFlags::HAS_CROP_DATA);
        let kept_crop = if wants_crop { old_crop } else { None };

        self.perform_change_sect(vnum, sect);
        self.perform_change_base_sect(vnum, base);
        self.set_crop(vnum, kept_crop);
        self.update_territory_class(vnum, class_before);

        if wants_crop && kept_crop.is_none() {
            match self.potential_crop_for_location(vnum) {
                Some(crop) => self.set_crop(vnum, Some(crop)),
                None => {
                    let fallback = self.config.world.default_land_sector;
                    syserr!(
                        "change_terrain: no crop available for room {}, using sector {}",
                        vnum,
                        fallback
                    );
                    if !self.in_terrain_fallback && fallback != sect {
                        self.in_terrain_fallback = true;
                        let changed = self.change_terrain(vnum, fallback, None);
                        self.in_terrain_fallback = false;
                        return changed;
                    }
                }
            }
        }

        self.reset_sector_transients(vnum, old_sect, sect);
        self.inherit_height(vnum);

        if self.owner_of(vnum).is_some() && self.catalog.sector_has(sect, SectorFlags::NO_CLAIM) {
            self.abandon_room(vnum);
        }
        if let Some(emp) = self.owner_of(vnum) {
            self.hooks.empire_tile_changed(emp, old_sect, sect);
        }
        self.hooks.deactivate_workforce(vnum);

        self.check_vehicle_climates(vnum);

        if self.catalog.sector_has(sect, SectorFlags::LOCK_ICON) {
            self.lock_icon(vnum);
        }
        self.release_plain_ocean(vnum, sect);
        if self.catalog.sector_has(old_sect, SectorFlags::START_LOCATION)
            != self.catalog.sector_has(sect, SectorFlags::START_LOCATION)
        {
            self.rebuild_start_locations();
        }
        self.request_mapout_update(vnum);
        debug!("Room {} changed from sector {} to {} (base {})", vnum, old_sect, sect, base);
        true
    }

    /// Move `vnum` to a new current sector, updating the index, the land
    /// set, the ocean sentinel link and owner counters together.
    pub(crate) fn perform_change_sect(&mut self, vnum: RoomVnum, sect: SectorVnum) {
        let Some(old) = self.sector_of(vnum) else {
            syserr!("perform_change_sect called on missing room {}", vnum);
            return;
        };

        if self.map.in_bounds(vnum) {
            let was_ocean = self.is_ocean_sector(old);
            let now_ocean = self.is_ocean_sector(sect);
            let shared = self.shared_ref(vnum).unwrap_or(SharedRef::Ocean);
            if shared.is_ocean() && !now_ocean {
                // split before the index ever sees a land tile on the sentinel
                self.shared_for_write(vnum);
            } else if now_ocean && !was_ocean {
                self.release_plain_ocean(vnum, sect);
            }

            self.sectors.move_current(vnum, old, sect);
            let now = self.now();
            if let Some(tile) = self.map.tile_mut(vnum) {
                tile.sector = sect;
                tile.sector_time = now;
            }
            if let Some(room) = self.rooms.get_mut(vnum) {
                room.sector = sect;
            }
            self.map.set_land(vnum, !now_ocean);
            self.request_mapout_update(vnum);
        } else {
            self.sectors.move_current(vnum, old, sect);
            if let Some(room) = self.rooms.get_mut(vnum) {
                room.sector = sect;
            }
        }

        if old != sect {
            if let Some(emp) = self.owner_of(vnum) {
                if let Some(agg) = self.empires.aggregates_mut(emp) {
                    agg.adjust_tile_sector(old, -1);
                    agg.adjust_tile_sector(sect, 1);
                }
            }
        }
        self.request_world_save(vnum, SaveBits::MAP | SaveBits::ROOM);
    }

    /// Relink an ocean tile whose private block holds nothing worth keeping.
    fn release_plain_ocean(&mut self, vnum: RoomVnum, sect: SectorVnum) {
        if !self.map.in_bounds(vnum) || !self.is_ocean_sector(sect) {
            return;
        }
        let Some(shared) = self.shared_ref(vnum).filter(|s| !s.is_ocean()) else {
            return;
        };
        let plain = self
            .shared_data
            .get(shared)
            .map(|data| !data.is_customized() && !data.has_events())
            .unwrap_or(false);
        if !plain {
            return;
        }
        if let Some(tile) = self.map.tile_mut(vnum) {
            tile.shared = SharedRef::Ocean;
        }
        if let Some(room) = self.rooms.get_mut(vnum) {
            room.shared = SharedRef::Ocean;
        }
        self.shared_data.free(shared);
        debug!("Room {} relinked to the ocean sentinel", vnum);
    }

    pub(crate) fn perform_change_base_sect(&mut self, vnum: RoomVnum, base: SectorVnum) {
        let Some(old) = self.base_sector_of(vnum) else {
            syserr!("perform_change_base_sect called on missing room {}", vnum);
            return;
        };
        self.sectors.move_base(vnum, old, base);
        if let Some(tile) = self.map.tile_mut(vnum) {
            tile.base_sector = base;
        }
        if let Some(room) = self.rooms.get_mut(vnum) {
            room.base_sector = base;
        }
        self.request_world_save(vnum, SaveBits::MAP | SaveBits::ROOM);
    }

    pub fn set_natural_sector(&mut self, vnum: RoomVnum, sect: SectorVnum) -> bool {
        if self.catalog.sector(sect).is_none() {
            return false;
        }
        match self.map.tile_mut(vnum) {
            Some(tile) => {
                tile.natural_sector = sect;
                self.request_world_save(vnum, SaveBits::MAP);
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_crop(&mut self, vnum: RoomVnum, crop: Option<CropVnum>) {
        if let Some(tile) = self.map.tile_mut(vnum) {
            if tile.crop == crop {
                return;
            }
            tile.crop = crop;
        }
        if let Some(room) = self.rooms.get_mut(vnum) {
            room.crop = crop;
        }
        self.request_world_save(vnum, SaveBits::MAP);
    }

    /// Pick a wild crop that could grow at `vnum`.
    pub fn potential_crop_for_location(&mut self, vnum: RoomVnum) -> Option<CropVnum> {
        let sect = self.sector_of(vnum)?;
        let climate = self.catalog.climate_of(sect);
        let newbie = self.empires.is_newbie_island(self.island_of(vnum));
        let has_water = self.fresh_water_within(vnum, self.config.world.water_crop_distance);

        let (x, y) = self.map.coords(vnum);
        let x_jitter = self.number(-10, 10);
        let y_jitter = self.number(-10, 10);
        let x_pct = (x * 100 / self.map.width() + x_jitter).rem_euclid(101);
        let y_pct = (y * 100 / self.map.height() + y_jitter).rem_euclid(101);

        let candidates: Vec<CropVnum> = self
            .catalog
            .crops
            .values()
            .filter(|crop| crop.climate.intersects(climate))
            .filter(|crop| !crop.flags.contains(CropFlags::NOT_WILD))
            .filter(|crop| has_water || !crop.flags.contains(CropFlags::REQUIRES_WATER))
            .filter(|crop| newbie || !crop.flags.contains(CropFlags::NEWBIE_ONLY))
            .filter(|crop| !newbie || !crop.flags.contains(CropFlags::NO_NEWBIE))
            .filter(|crop| x_pct >= crop.x_min && x_pct <= crop.x_max)
            .filter(|crop| y_pct >= crop.y_min && y_pct <= crop.y_max)
            .map(|crop| crop.vnum)
            .collect();

        let mut chosen = None;
        for (seen, crop) in candidates.into_iter().enumerate() {
            if self.number(0, seen as i32) == 0 {
                chosen = Some(crop);
            }
        }
        if chosen.is_none() {
            let first = self.catalog.first_crop().map(|c| c.vnum);
            syserr!(
                "potential_crop_for_location: no valid crop for room {}, defaulting to {:?}",
                vnum,
                first
            );
            chosen = first;
        }
        chosen
    }

    fn fresh_water_within(&self, vnum: RoomVnum, distance: i32) -> bool {
        for dx in -distance..=distance {
            for dy in -distance..=distance {
                let target = self.map.shift(vnum, dx, dy);
                if self
                    .sector_of(target)
                    .map(|s| self.catalog.sector_has(s, SectorFlags::FRESH_WATER))
                    .unwrap_or(false)
                {
                    return true;
                }
            }
        }
        false
    }

    /// Drop progress counters and timers that only made sense for the old
    /// sector, then start the ones the new sector needs.
    fn reset_sector_transients(&mut self, vnum: RoomVnum, old_sect: SectorVnum, sect: SectorVnum) {
        let original_trench = self
            .shared(vnum)
            .and_then(|s| s.extra(ExtraKey::TrenchOriginalSector));
        if let Some(shared) = self.shared_mut(vnum) {
            for key in TRANSIENT_EXTRAS {
                shared.remove_extra(key);
            }
            for dep in TERRAIN_DEPLETIONS {
                shared.remove_depletion(dep);
            }
        }

        let grows = self
            .catalog
            .sector(sect)
            .and_then(|p| p.evolves(EvolutionKind::Grows))
            .is_some();
        let trench = self.catalog.sector_has(sect, SectorFlags::IS_TRENCH);
        let now = self.now();
        let game = self.config.game.clone();

        if grows {
            if let Some(shared) = self.shared_for_write(vnum) {
                shared.set_extra(ExtraKey::SeedTime, time_to_extra(now));
            }
            self.add_stored_event(vnum, StoredEventKind::GrowCrop, game.crop_growth_secs as i64);
        } else {
            self.cancel_stored_event(vnum, StoredEventKind::GrowCrop);
        }

        if trench {
            let original = if self.catalog.sector_has(old_sect, SectorFlags::IS_TRENCH) {
                original_trench.unwrap_or(self.config.world.default_land_sector)
            } else {
                old_sect
            };
            if let Some(shared) = self.shared_for_write(vnum) {
                shared.set_extra(ExtraKey::TrenchOriginalSector, original);
                shared.set_extra(
                    ExtraKey::TrenchFillTime,
                    time_to_extra(now + game.trench_fill_secs as i64),
                );
            }
            self.add_stored_event(vnum, StoredEventKind::TrenchFill, game.trench_fill_secs as i64);
        } else {
            self.cancel_stored_event(vnum, StoredEventKind::TrenchFill);
        }
        self.request_world_save(vnum, SaveBits::ROOM);
    }

    /// Copy a neighbour's height onto sectors that need one; clear it on
    /// sectors that do not.
    pub(crate) fn inherit_height(&mut self, vnum: RoomVnum) {
        let Some(sect) = self.sector_of(vnum) else {
            return;
        };
        if !self.catalog.sector_has(sect, SectorFlags::NEEDS_HEIGHT) {
            if self.height_of(vnum) != 0 {
                self.set_height(vnum, 0);
            }
            return;
        }
        if self.height_of(vnum) != 0 {
            return;
        }
        let climate = self.catalog.climate_of(sect);
        let mut exact = None;
        let mut overlap = None;
        let mut any = None;
        for neighbor in self.map.neighbors(vnum) {
            let height = self.height_of(neighbor);
            if height == 0 {
                continue;
            }
            let their = self
                .sector_of(neighbor)
                .map(|s| self.catalog.climate_of(s))
                .unwrap_or_default();
            if exact.is_none() && their == climate {
                exact = Some(height);
            }
            if overlap.is_none() && their.intersects(climate) {
                overlap = Some(height);
            }
            if any.is_none() {
                any = Some(height);
            }
        }
        if let Some(height) = exact.or(overlap).or(any) {
            self.set_height(vnum, height);
        }
    }

    /// Pin the current sector icon as the tile's custom icon.
    pub fn lock_icon(&mut self, vnum: RoomVnum) -> bool {
        let Some(icon) = self
            .sector_of(vnum)
            .and_then(|s| self.catalog.sector(s))
            .map(|p| p.icon.clone())
        else {
            return false;
        };
        match self.shared_for_write(vnum) {
            Some(shared) => shared.icon = Some(icon),
            None => return false,
        }
        if let Some(tile) = self.map.tile_mut(vnum) {
            tile.flags.insert(TileFlags::ICON_LOCKED);
        }
        self.request_world_save(vnum, SaveBits::MAP | SaveBits::ROOM);
        self.request_mapout_update(vnum);
        true
    }

    /// Clear custom name, description and icon.
    pub fn decustomize_room(&mut self, vnum: RoomVnum) {
        let changed = match self.shared_mut(vnum) {
            Some(shared)
                if shared.name.is_some() || shared.description.is_some() || shared.icon.is_some() =>
            {
                shared.decustomize();
                true
            }
            _ => false,
        };
        if let Some(tile) = self.map.tile_mut(vnum) {
            tile.flags.remove(TileFlags::ICON_LOCKED);
        }
        if changed {
            self.request_world_save(vnum, SaveBits::ROOM);
        }
    }

    /// Give a room a custom name and/or description. `None` leaves a field as is.
    pub fn customize_room(
        &mut self,
        vnum: RoomVnum,
        name: Option<&str>,
        description: Option<&str>,
    ) -> bool {
        let Some(shared) = self.shared_for_write(vnum) else {
            return false;
        };
        if let Some(name) = name {
            shared.name = Some(name.to_string());
        }
        if let Some(desc) = description {
            shared.description = Some(desc.to_string());
        }
        debug!(
            "Customized room {}: name \"{}\" desc \"{}\"",
            vnum,
            room_text(name.unwrap_or_default()),
            room_text(description.unwrap_or_default())
        );
        self.request_world_save(vnum, SaveBits::ROOM);
        true
    }

    /// Record that someone passed through `vnum`.
    pub fn add_track(&mut self, vnum: RoomVnum, track: Track) -> bool {
        let Some(shared) = self.shared_for_write(vnum) else {
            return false;
        };
        shared.tracks.push(track);
        self.request_world_save(vnum, SaveBits::ROOM);
        true
    }

    /// Deplete a resource of the tile; the annual update recovers it.
    pub fn add_depletion(&mut self, vnum: RoomVnum, kind: DepletionType, amount: i32) -> bool {
        let Some(shared) = self.shared_for_write(vnum) else {
            return false;
        };
        shared.add_depletion(kind, amount);
        self.request_world_save(vnum, SaveBits::ROOM);
        true
    }

    pub fn building_is_complete(&self, vnum: RoomVnum) -> bool {
        let has_building = self.rooms.get(vnum).and_then(|r| r.building()).is_some();
        let affects = self.shared(vnum).map(|s| s.affects).unwrap_or_default();
        has_building && !affects.intersects(RoomAffects::INCOMPLETE | RoomAffects::DISMANTLING)
    }

    /// Remove a building and everything that hangs off it: tech, burning,
    /// interior rooms, exits, the complex data itself and any city on it.
    pub fn disassociate_building(&mut self, vnum: RoomVnum) {
        let Some(building) = self.rooms.get(vnum).and_then(|r| r.building()) else {
            let leftover = self.map.in_bounds(vnum)
                && self.rooms.get(vnum).map(|r| r.complex.is_some()).unwrap_or(false);
            if leftover {
                self.rooms.clear_exits(vnum);
                if let Some(room) = self.rooms.get_mut(vnum) {
                    room.complex = None;
                }
            }
            return;
        };
        let owner = self.owner_of(vnum);
        let class_before = self.territory_class_of(vnum);

        if owner.is_some() && self.building_is_complete(vnum) {
            self.adjust_building_tech(vnum, false);
        }
        self.cancel_stored_event(vnum, StoredEventKind::BurnDown);

        let homed: Vec<RoomVnum> = self
            .rooms
            .interior_vnums()
            .into_iter()
            .filter(|v| *v != vnum && self.rooms.get(*v).map(|r| r.home_room) == Some(vnum))
            .collect();
        for inside in homed {
            self.delete_room(inside, true);
        }

        self.rooms.clear_exits(vnum);
        if let Some(room) = self.rooms.get_mut(vnum) {
            room.complex = None;
        }
        if let Some(shared) = self.shared_mut(vnum) {
            let flags = RoomAffects::INCOMPLETE | RoomAffects::DISMANTLING;
            shared.affects.remove(flags);
            shared.base_affects.remove(flags);
        }

        if let Some(emp) = owner {
            let has_city = self
                .empires
                .get(emp)
                .map(|e| e.city_at(vnum).is_some())
                .unwrap_or(false);
            if has_city {
                self.abandon_city(emp, vnum);
            }
        }
        self.update_territory_class(vnum, class_before);
        self.request_world_save(vnum, SaveBits::ROOM);
        debug!("Disassociated building {} from room {}", building, vnum);
    }

    /// Put a building on a map tile. Incomplete buildings grant nothing
    /// until [`World::complete_building`].
    pub fn construct_building(
        &mut self,
        vnum: RoomVnum,
        building: BuildingVnum,
        complete: bool,
    ) -> bool {
        if self.catalog.building(building).is_none() {
            syserr!("construct_building called with invalid building {}", building);
            return false;
        }
        if !self.map.in_bounds(vnum) || !self.find_or_load_room(vnum) {
            return false;
        }
        let Some(current) = self.sector_of(vnum) else {
            return false;
        };
        let base = if self.catalog.sector_has(current, SectorFlags::MAP_BUILDING) {
            self.base_sector_of(vnum).unwrap_or(current)
        } else {
            current
        };
        let building_sector = self.config.world.building_sector;
        if !self.change_terrain(vnum, building_sector, Some(base)) {
            return false;
        }

        let class_before = self.territory_class_of(vnum);
        if let Some(room) = self.rooms.get_mut(vnum) {
            room.complex = Some(ComplexData {
                building: Some(building),
                ..ComplexData::default()
            });
        }
        if !complete {
            if let Some(shared) = self.shared_for_write(vnum) {
                shared.affects.insert(RoomAffects::INCOMPLETE);
                shared.base_affects.insert(RoomAffects::INCOMPLETE);
            }
        } else if self.owner_of(vnum).is_some() {
            self.adjust_building_tech(vnum, true);
        }
        self.update_territory_class(vnum, class_before);
        self.request_world_save(vnum, SaveBits::MAP | SaveBits::ROOM);
        info!("Constructed building {} at room {} (complete: {})", building, vnum, complete);
        true
    }

    pub fn complete_building(&mut self, vnum: RoomVnum) -> bool {
        if self.rooms.get(vnum).and_then(|r| r.building()).is_none() {
            return false;
        }
        let incomplete = self
            .shared(vnum)
            .map(|s| s.affects.contains(RoomAffects::INCOMPLETE))
            .unwrap_or(false);
        if !incomplete {
            return true;
        }
        let class_before = self.territory_class_of(vnum);
        if let Some(shared) = self.shared_mut(vnum) {
            shared.affects.remove(RoomAffects::INCOMPLETE);
            shared.base_affects.remove(RoomAffects::INCOMPLETE);
        }
        if let Some(complex) = self.rooms.get_mut(vnum).and_then(|r| r.complex.as_mut()) {
            complex.damage = 0.0;
        }
        if self.owner_of(vnum).is_some() && self.building_is_complete(vnum) {
            self.adjust_building_tech(vnum, true);
        }
        self.update_territory_class(vnum, class_before);
        self.request_world_save(vnum, SaveBits::MAP | SaveBits::ROOM);
        true
    }

    /// Replace a building with its ruins, abandoning it.
    pub fn ruin_one_building(&mut self, vnum: RoomVnum) -> bool {
        let Some(building) = self.rooms.get(vnum).and_then(|r| r.building()) else {
            return false;
        };
        let Some(proto) = self.catalog.building(building).cloned() else {
            syserr!("ruin_one_building: room {} has unknown building {}", vnum, building);
            return false;
        };
        let base = self.base_sector_of(vnum).unwrap_or(self.config.world.default_land_sector);
        if let Some(emp) = self.owner_of(vnum) {
            let (x, y) = self.map.coords(vnum);
            let msg = format!("The {} at ({}, {}) has fallen into ruin", proto.name, x, y);
            self.hooks.log_to_empire(emp, &msg);
            self.abandon_room(vnum);
        }
        self.hooks
            .send_to_room(vnum, &format!("The {} collapses into ruin!", proto.name));
        match proto.ruins_to {
            Some(ruins) if self.map.in_bounds(vnum) => self.construct_building(vnum, ruins, true),
            _ if self.map.in_bounds(vnum) => self.change_terrain(vnum, base, None),
            _ => {
                self.disassociate_building(vnum);
                true
            }
        }
    }

    /// Set a building (or burnable terrain) on fire.
    pub fn start_burning(&mut self, vnum: RoomVnum) -> bool {
        if self.stored_event(vnum, StoredEventKind::BurnDown).is_some() {
            return false;
        }
        let has_building = self.rooms.get(vnum).and_then(|r| r.building()).is_some();
        let burns = self
            .sector_of(vnum)
            .and_then(|s| self.catalog.sector(s))
            .and_then(|p| p.evolves(EvolutionKind::Burns))
            .is_some();
        if !has_building && !burns {
            return false;
        }
        let delay = self.config.game.burn_down_secs as i64;
        let now = self.now();
        if let Some(complex) = self.rooms.get_mut(vnum).and_then(|r| r.complex.as_mut()) {
            complex.burn_down_time = Some(now + delay);
        }
        if !self.add_stored_event(vnum, StoredEventKind::BurnDown, delay) {
            return false;
        }
        self.hooks.send_to_room(vnum, "Flames erupt and begin to spread!");
        self.request_world_save(vnum, SaveBits::ROOM);
        true
    }

    pub fn extinguish(&mut self, vnum: RoomVnum) -> bool {
        let cancelled = self.cancel_stored_event(vnum, StoredEventKind::BurnDown);
        if let Some(complex) = self.rooms.get_mut(vnum).and_then(|r| r.complex.as_mut()) {
            complex.burn_down_time = None;
        }
        if cancelled {
            self.hooks.send_to_room(vnum, "The flames die down.");
            self.request_world_save(vnum, SaveBits::ROOM);
        }
        cancelled
    }

    /// Burn-down event body.
    pub(crate) fn burn_down(&mut self, vnum: RoomVnum) {
        if let Some(complex) = self.rooms.get_mut(vnum).and_then(|r| r.complex.as_mut()) {
            complex.burn_down_time = None;
        }
        let has_building = self.rooms.get(vnum).and_then(|r| r.building()).is_some();
        if has_building {
            self.hooks.send_to_room(vnum, "The building burns to the ground!");
            if let Some(emp) = self.owner_of(vnum) {
                let (x, y) = self.map.coords(vnum);
                self.hooks
                    .log_to_empire(emp, &format!("A building at ({}, {}) has burned down", x, y));
                if self.config.game.abandon_on_burn {
                    self.abandon_room(vnum);
                }
            }
            if self.map.in_bounds(vnum) {
                let base = self
                    .base_sector_of(vnum)
                    .unwrap_or(self.config.world.default_land_sector);
                self.change_terrain(vnum, base, None);
            } else {
                self.disassociate_building(vnum);
            }
            return;
        }
        let burns_to = self
            .sector_of(vnum)
            .and_then(|s| self.catalog.sector(s))
            .and_then(|p| p.evolves(EvolutionKind::Burns));
        if let Some(becomes) = burns_to {
            self.hooks.send_to_room(vnum, "The fire burns itself out.");
            self.change_terrain(vnum, becomes, None);
        }
    }

    /// Trench-fill event body.
    pub(crate) fn fill_trench(&mut self, vnum: RoomVnum) {
        let Some(sect) = self.sector_of(vnum) else {
            return;
        };
        let original = self
            .shared(vnum)
            .and_then(|s| s.extra(ExtraKey::TrenchOriginalSector));
        let becomes = self
            .catalog
            .sector(sect)
            .and_then(|p| p.evolves(EvolutionKind::TrenchFull))
            .or(original);
        match becomes {
            Some(becomes) => {
                self.hooks.send_to_room(vnum, "The trench is full! It is now a canal!");
                self.change_terrain(vnum, becomes, None);
            }
            None => {
                syserr!("fill_trench: trench {} has nothing to become", vnum);
            }
        }
    }

    /// Apply the `Chopped` evolution, keeping a crop-bearing base.
    pub fn change_chop_territory(&mut self, vnum: RoomVnum) -> bool {
        self.evolve_keeping_crop_base(vnum, EvolutionKind::Chopped)
    }

    /// Apply the `Harvested` evolution to a crop tile.
    pub fn harvest(&mut self, vnum: RoomVnum) -> bool {
        let is_crop = self
            .sector_of(vnum)
            .map(|s| self.catalog.sector_has(s, SectorFlags::CROP))
            .unwrap_or(false);
        is_crop && self.evolve_keeping_crop_base(vnum, EvolutionKind::Harvested)
    }

    fn evolve_keeping_crop_base(&mut self, vnum: RoomVnum, kind: EvolutionKind) -> bool {
        let Some(becomes) = self
            .sector_of(vnum)
            .and_then(|s| self.catalog.sector(s))
            .and_then(|p| p.evolves(kind))
        else {
            return false;
        };
        let base = self
            .base_sector_of(vnum)
            .filter(|b| self.catalog.sector_has(*b, SectorFlags::HAS_CROP_DATA));
        self.change_terrain(vnum, becomes, base)
    }

    /// Whether the building in `vnum` extends city status to the outskirts.
    pub(crate) fn has_large_city_radius(&self, vnum: RoomVnum) -> bool {
        let building = self.rooms.get(vnum).and_then(|r| r.building());
        self.catalog
            .building_has(building, BuildingFlags::LARGE_CITY_RADIUS)
    }
}
