//! Ownership and the territory/tech aggregator.
//!
//! Room ownership is the source of truth. The incremental adjusters below
//! and the full rescans (`read_empire_territory`, `reread_empire_tech`) must
//! always agree; the rescans exist to rebuild after bulk changes.

use log::{debug, info, warn};

use crate::storage::save_queue::SaveBits;
use crate::world::catalog::{BuildingFlags, SectorFlags, Tech};
use crate::world::empire::{CityEntry, TerritoryClass};
use crate::world::errors::WorldError;
use crate::world::room::Room;
use crate::world::terrain::time_to_extra;
use crate::world::types::{EmpireVnum, ExtraKey, IslandId, RoomAffects, RoomVnum, NO_ISLAND};
use crate::world::vehicles::VehicleId;
use crate::world::World;

impl World {
    /// Owner and class of a room that counts toward territory.
    pub(crate) fn territory_class_of(&self, vnum: RoomVnum) -> Option<(EmpireVnum, TerritoryClass)> {
        let room = self.rooms.get(vnum)?;
        let emp = room.owner?;
        if !self.counts_as_territory(room) {
            return None;
        }
        Some((emp, self.classify_territory(emp, vnum)))
    }

    /// Rooms that are their own home count toward territory, except
    /// vehicle interiors.
    pub(crate) fn counts_as_territory(&self, room: &Room) -> bool {
        room.belongs_in_territory()
            && (self.map.in_bounds(room.vnum)
                || !self.vehicles.iter().any(|v| v.interior == Some(room.vnum)))
    }

    /// City if inside one of the empire's city radii, outskirts inside the
    /// extended radius, frontier otherwise.
    pub fn classify_territory(&self, emp: EmpireVnum, vnum: RoomVnum) -> TerritoryClass {
        if !self.map.in_bounds(vnum) {
            return TerritoryClass::Frontier;
        }
        let Some(empire) = self.empires.get(emp) else {
            return TerritoryClass::Frontier;
        };
        let multiplier = self.config.world.outskirts_multiplier;
        let mut class = TerritoryClass::Frontier;
        for city in &empire.cities {
            let center = self.rooms.get(city.location).and_then(|r| r.building());
            if !self.catalog.building_has(center, BuildingFlags::CITY_CENTER) {
                continue;
            }
            let dist = self.map.distance(vnum, city.location);
            if dist <= city.radius {
                return TerritoryClass::City;
            }
            if f64::from(dist) <= f64::from(city.radius) * multiplier {
                if self.has_large_city_radius(vnum) {
                    return TerritoryClass::City;
                }
                class = TerritoryClass::Outskirts;
            }
        }
        class
    }

    /// Move a room between territory buckets if its class changed since `before`.
    pub(crate) fn update_territory_class(
        &mut self,
        vnum: RoomVnum,
        before: Option<(EmpireVnum, TerritoryClass)>,
    ) {
        let after = self.territory_class_of(vnum);
        let (Some((emp, old)), Some((now_emp, new))) = (before, after) else {
            return;
        };
        if emp != now_emp || old == new {
            return;
        }
        if let Some(agg) = self.empires.aggregates_mut(emp) {
            agg.territory.adjust(old, -1);
            agg.territory.adjust(new, 1);
        }
        self.empires.mark_dirty(emp);
        debug!("Room {} moved from {:?} to {:?} for empire {}", vnum, old, new, emp);
    }

    /// Island used for island-scoped techs: the map location, or the home
    /// room's location for interiors.
    fn tech_island(&self, vnum: RoomVnum) -> Option<IslandId> {
        let loc = if self.map.in_bounds(vnum) {
            vnum
        } else {
            self.rooms.get(vnum).map(|r| r.home_room)?
        };
        if !self.map.in_bounds(loc) {
            return None;
        }
        Some(self.island_of(loc)).filter(|id| *id != NO_ISLAND)
    }

    /// Complete owned buildings and vehicles whose techs are counted on the
    /// island of map tile `vnum`: the tile itself and interiors homed on it.
    pub(crate) fn tech_contributors_at(&self, vnum: RoomVnum) -> (Vec<RoomVnum>, Vec<VehicleId>) {
        if !self.map.in_bounds(vnum) {
            return (Vec::new(), Vec::new());
        }
        let located: Vec<RoomVnum> = self
            .rooms
            .iter()
            .filter(|r| r.vnum == vnum || (!self.map.in_bounds(r.vnum) && r.home_room == vnum))
            .map(|r| r.vnum)
            .collect();
        let buildings = located
            .iter()
            .copied()
            .filter(|v| self.owner_of(*v).is_some() && self.building_is_complete(*v))
            .collect();
        let vehicles = self
            .vehicles
            .iter()
            .filter(|v| v.is_complete() && v.owner.is_some())
            .filter(|v| v.room == vnum || located.contains(&v.room))
            .map(|v| v.id)
            .collect();
        (buildings, vehicles)
    }

    /// Add or remove the techs and fame of the (complete) building in `vnum`.
    pub fn adjust_building_tech(&mut self, vnum: RoomVnum, add: bool) {
        let Some(room) = self.rooms.get(vnum) else {
            return;
        };
        let (Some(emp), Some(building)) = (room.owner, room.building()) else {
            return;
        };
        let Some(proto) = self.catalog.building(building) else {
            return;
        };
        let techs: Vec<Tech> = proto.techs.clone();
        let fame = proto.fame;
        let island = self.tech_island(vnum);
        let delta = if add { 1 } else { -1 };
        if let Some(agg) = self.empires.aggregates_mut(emp) {
            for tech in techs {
                agg.adjust_tech(tech, island, delta);
            }
            agg.fame += fame * delta;
        }
        self.empires.mark_dirty(emp);
    }

    pub fn adjust_vehicle_tech(&mut self, id: VehicleId, add: bool) {
        let Some(vehicle) = self.vehicles.get(id) else {
            return;
        };
        let Some(emp) = vehicle.owner else {
            return;
        };
        let Some(proto) = self.catalog.vehicle(vehicle.vnum) else {
            return;
        };
        let techs: Vec<Tech> = proto.techs.clone();
        let island = self.tech_island(vehicle.room);
        let delta = if add { 1 } else { -1 };
        if let Some(agg) = self.empires.aggregates_mut(emp) {
            for tech in techs {
                agg.adjust_tech(tech, island, delta);
            }
        }
        self.empires.mark_dirty(emp);
    }

    /// Give `vnum` to `emp`. Interiors homed on the room follow it.
    pub fn claim_room(&mut self, vnum: RoomVnum, emp: EmpireVnum) -> bool {
        if self.empires.get(emp).is_none() {
            warn!("claim_room: empire {} does not exist", emp);
            return false;
        }
        if !self.find_or_load_room(vnum) {
            return false;
        }
        let unclaimable = self
            .sector_of(vnum)
            .map(|s| self.catalog.sector_has(s, SectorFlags::NO_CLAIM))
            .unwrap_or(true)
            || self
                .shared(vnum)
                .map(|s| s.affects.contains(RoomAffects::UNCLAIMABLE))
                .unwrap_or(false);
        if unclaimable {
            return false;
        }
        match self.owner_of(vnum) {
            Some(current) if current == emp => return true,
            Some(_) => {
                self.abandon_room(vnum);
            }
            None => {}
        }

        let (sector, population) = match self.rooms.get_mut(vnum) {
            Some(room) => {
                room.owner = Some(emp);
                (room.sector, room.population)
            }
            None => return false,
        };
        let belongs = self
            .rooms
            .get(vnum)
            .map(|room| self.counts_as_territory(room))
            .unwrap_or(false);
        let class = belongs.then(|| self.classify_territory(emp, vnum));
        if let Some(agg) = self.empires.aggregates_mut(emp) {
            agg.adjust_tile_sector(sector, 1);
            agg.population += i64::from(population);
            if let Some(class) = class {
                agg.territory.adjust(class, 1);
                agg.territory_list.insert(vnum);
            }
        }
        if self.building_is_complete(vnum) {
            self.adjust_building_tech(vnum, true);
        }
        for inside in self.rooms_homed_on(vnum) {
            self.claim_room(inside, emp);
        }
        self.empires.mark_dirty(emp);
        self.request_world_save(vnum, SaveBits::ROOM);
        true
    }

    /// Remove ownership from `vnum` and the interiors homed on it.
    pub fn abandon_room(&mut self, vnum: RoomVnum) -> bool {
        let Some(emp) = self.owner_of(vnum) else {
            return false;
        };
        if self.building_is_complete(vnum) {
            self.adjust_building_tech(vnum, false);
        }
        let class = self.territory_class_of(vnum).map(|(_, c)| c);
        let (sector, population) = match self.rooms.get_mut(vnum) {
            Some(room) => {
                room.owner = None;
                (room.sector, room.population)
            }
            None => return false,
        };
        if let Some(agg) = self.empires.aggregates_mut(emp) {
            agg.adjust_tile_sector(sector, -1);
            agg.population -= i64::from(population);
            if let Some(class) = class {
                agg.territory.adjust(class, -1);
                agg.territory_list.remove(&vnum);
            }
        }
        for inside in self.rooms_homed_on(vnum) {
            self.abandon_room(inside);
        }
        let has_city = self
            .empires
            .get(emp)
            .map(|e| e.city_at(vnum).is_some())
            .unwrap_or(false);
        if has_city {
            self.abandon_city(emp, vnum);
        }
        self.empires.mark_dirty(emp);
        self.request_world_save(vnum, SaveBits::ROOM);
        true
    }

    pub(crate) fn rooms_homed_on(&self, vnum: RoomVnum) -> Vec<RoomVnum> {
        self.rooms
            .interior_vnums()
            .into_iter()
            .filter(|v| *v != vnum && self.rooms.get(*v).map(|r| r.home_room) == Some(vnum))
            .collect()
    }

    pub fn set_room_population(&mut self, vnum: RoomVnum, population: u32) -> bool {
        let (old, owner) = match self.rooms.get_mut(vnum) {
            Some(room) => {
                let old = room.population;
                room.population = population;
                (old, room.owner)
            }
            None => return false,
        };
        if let Some(emp) = owner {
            if let Some(agg) = self.empires.aggregates_mut(emp) {
                agg.population += i64::from(population) - i64::from(old);
            }
            self.empires.mark_dirty(emp);
        }
        self.request_world_save(vnum, SaveBits::ROOM);
        true
    }

    /// Rebuild territory, population and tile-sector counts from room
    /// ownership, for one empire or all of them.
    pub fn read_empire_territory(&mut self, emp: Option<EmpireVnum>) {
        let targets: Vec<EmpireVnum> = match emp {
            Some(e) => vec![e],
            None => self.empires.vnums(),
        };
        for target in &targets {
            if let Some(agg) = self.empires.aggregates_mut(*target) {
                agg.clear_territory();
            }
        }
        let owned: Vec<_> = self
            .rooms
            .iter()
            .filter_map(|room| {
                let owner = room.owner.filter(|o| targets.contains(o))?;
                let class = self
                    .counts_as_territory(room)
                    .then(|| self.classify_territory(owner, room.vnum));
                Some((owner, room.vnum, room.sector, room.population, class))
            })
            .collect();
        for (owner, vnum, sector, population, class) in owned {
            if let Some(agg) = self.empires.aggregates_mut(owner) {
                agg.adjust_tile_sector(sector, 1);
                agg.population += i64::from(population);
                if let Some(class) = class {
                    agg.territory.adjust(class, 1);
                    agg.territory_list.insert(vnum);
                }
            }
        }
        for target in targets {
            self.empires.mark_dirty(target);
            if let Some(empire) = self.empires.get(target) {
                debug!(
                    "Empire {} territory: {} total, {} city, {} outskirts, {} frontier",
                    target,
                    empire.aggregates.territory.total,
                    empire.aggregates.territory.city,
                    empire.aggregates.territory.outskirts,
                    empire.aggregates.territory.frontier
                );
            }
        }
    }

    /// Zero and recount techs and fame from complete owned buildings and vehicles.
    pub fn reread_empire_tech(&mut self, emp: Option<EmpireVnum>) {
        let targets: Vec<EmpireVnum> = match emp {
            Some(e) => vec![e],
            None => self.empires.vnums(),
        };
        for target in &targets {
            if let Some(empire) = self.empires.get_mut(*target) {
                empire.aggregates.clear_techs();
                empire.apply_tech_baseline();
            }
        }
        let buildings: Vec<RoomVnum> = self
            .rooms
            .iter()
            .filter(|r| r.owner.map(|o| targets.contains(&o)).unwrap_or(false))
            .map(|r| r.vnum)
            .filter(|v| self.building_is_complete(*v))
            .collect();
        for vnum in buildings {
            self.adjust_building_tech(vnum, true);
        }
        let vehicles: Vec<VehicleId> = self
            .vehicles
            .iter()
            .filter(|v| v.is_complete() && v.owner.map(|o| targets.contains(&o)).unwrap_or(false))
            .map(|v| v.id)
            .collect();
        for id in vehicles {
            self.adjust_vehicle_tech(id, true);
        }
    }

    /// Found a city on an owned city-center building.
    pub fn found_city(
        &mut self,
        emp: EmpireVnum,
        vnum: RoomVnum,
        name: &str,
        radius: i32,
    ) -> Result<(), WorldError> {
        let Some(empire) = self.empires.get(emp) else {
            return Err(WorldError::NotFound(format!("empire {}", emp)));
        };
        if empire.city_at(vnum).is_some() {
            return Err(WorldError::InvalidOperation(format!(
                "empire {} already has a city at {}",
                emp, vnum
            )));
        }
        if self.owner_of(vnum) != Some(emp) {
            return Err(WorldError::InvalidOperation(format!(
                "room {} is not owned by empire {}",
                vnum, emp
            )));
        }
        let building = self.rooms.get(vnum).and_then(|r| r.building());
        if !self.catalog.building_has(building, BuildingFlags::CITY_CENTER) {
            return Err(WorldError::InvalidOperation(format!(
                "room {} has no city center",
                vnum
            )));
        }
        let now = self.now();
        if let Some(empire) = self.empires.get_mut(emp) {
            empire.cities.push(CityEntry {
                name: name.to_string(),
                location: vnum,
                radius,
                founded: now,
            });
        }
        if let Some(shared) = self.shared_for_write(vnum) {
            shared.set_extra(ExtraKey::FoundTime, time_to_extra(now));
        }
        self.read_empire_territory(Some(emp));
        self.hooks
            .log_to_empire(emp, &format!("The city of {} has been founded", name));
        self.request_world_save(vnum, SaveBits::ROOM);
        info!("Empire {} founded city '{}' at {}", emp, name, vnum);
        Ok(())
    }

    pub fn abandon_city(&mut self, emp: EmpireVnum, vnum: RoomVnum) -> bool {
        let removed = match self.empires.get_mut(emp) {
            Some(empire) => {
                let before = empire.cities.len();
                let name = empire.city_at(vnum).map(|c| c.name.clone());
                empire.cities.retain(|c| c.location != vnum);
                (empire.cities.len() != before).then_some(name).flatten()
            }
            None => None,
        };
        let Some(name) = removed else {
            return false;
        };
        if let Some(shared) = self.shared_mut(vnum) {
            shared.remove_extra(ExtraKey::FoundTime);
        }
        self.read_empire_territory(Some(emp));
        self.hooks
            .log_to_empire(emp, &format!("The city of {} has been abandoned", name));
        self.request_world_save(vnum, SaveBits::ROOM);
        info!("Empire {} abandoned city '{}' at {}", emp, name, vnum);
        true
    }
}

#[cfg(test)]
mod tests {
    use crate::world::catalog::Tech;
    use crate::world::empire::{EmpireRecord, TerritoryClass};
    use crate::world::test_support::small_world;
    use crate::world::World;

    fn world_with_empire() -> World {
        let mut world = small_world();
        world.empires_mut().insert(EmpireRecord::new(1, "Aldor"));
        world
    }

    #[test]
    fn claim_and_abandon_adjust_counts() {
        let mut world = world_with_empire();
        world.change_terrain(44, 0, None);
        assert!(world.claim_room(44, 1));
        let agg = &world.empires().get(1).expect("empire").aggregates;
        assert_eq!(agg.territory.total, 1);
        assert_eq!(agg.territory.frontier, 1);
        assert_eq!(agg.tile_sectors.get(&0), Some(&1));
        assert!(world.abandon_room(44));
        let agg = &world.empires().get(1).expect("empire").aggregates;
        assert_eq!(agg.territory.total, 0);
        assert!(agg.tile_sectors.is_empty());
    }

    #[test]
    fn unclaimable_sectors_refuse_ownership() {
        let mut world = world_with_empire();
        world.change_terrain(60, 16, None);
        assert!(!world.claim_room(60, 1));
        assert_eq!(world.owner_of(60), None);
    }

    #[test]
    fn city_founding_reclassifies_nearby_land() {
        let mut world = world_with_empire();
        let center = world.map().vnum_at(10, 10);
        let near = world.map().vnum_at(12, 10);
        let far = world.map().vnum_at(16, 10);
        for vnum in [center, near, far] {
            world.change_terrain(vnum, 0, None);
            world.claim_room(vnum, 1);
        }
        assert!(world.construct_building(center, 101, true));
        world.found_city(1, center, "Aldoria", 3).expect("found city");
        assert_eq!(world.classify_territory(1, near), TerritoryClass::City);
        assert_eq!(world.classify_territory(1, far), TerritoryClass::Outskirts);
        let agg = &world.empires().get(1).expect("empire").aggregates;
        assert_eq!(agg.territory.city, 2);
        assert_eq!(agg.territory.outskirts, 1);
        assert!(agg.has_tech(Tech::Prominence));

        assert!(world.abandon_city(1, center));
        let agg = &world.empires().get(1).expect("empire").aggregates;
        assert_eq!(agg.territory.frontier, 3);
    }
}
