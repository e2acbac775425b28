//! The yearly sweep over the land map: building decay, depletion recovery,
//! crop despawn, trench collapse and island naturalization.

use log::{debug, info};

use crate::metrics;
use crate::storage::save_queue::SaveBits;
use crate::world::catalog::{BuildingFlags, CropFlags, SectorFlags};
use crate::world::types::{merge_resources, ExtraKey, RoomAffects, RoomVnum};
use crate::world::World;

const EARTHQUAKE_MESSAGE: &str = "The ground under you shakes violently!";

/// What one annual update did, for the log line and the `annual` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnualReport {
    pub tiles_visited: usize,
    pub ruins_crumbled: usize,
    pub buildings_damaged: usize,
    pub buildings_abandoned: usize,
    pub buildings_ruined: usize,
    pub roads_reverted: usize,
    pub affects_cleared: usize,
    pub depletions_removed: usize,
    pub crops_despawned: usize,
    pub trenches_collapsed: usize,
    pub tiles_naturalized: usize,
    pub vehicles_damaged: usize,
    pub vehicles_destroyed: usize,
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

impl World {
    /// Run the annual update over every land tile, every interior and every vehicle.
    pub fn annual_world_update(&mut self) -> AnnualReport {
        let mut report = AnnualReport::default();
        self.hooks.broadcast(EARTHQUAKE_MESSAGE);

        // snapshot: abandon and terrain changes below may reshape the land list
        for vnum in self.map.land_vnums() {
            if !self.map.is_land(vnum) {
                continue;
            }
            report.tiles_visited += 1;
            self.annual_update_map_tile(vnum, &mut report);
            self.annual_update_depletions(vnum, &mut report);
        }
        for vnum in self.rooms.interior_vnums() {
            self.annual_update_depletions(vnum, &mut report);
        }
        self.annual_update_vehicles(&mut report);

        self.read_empire_territory(None);
        metrics::inc_annual_runs();
        info!("Annual world update complete: {:?}", report);
        report
    }

    fn annual_update_map_tile(&mut self, vnum: RoomVnum, report: &mut AnnualReport) {
        let decay = self.config.decay.clone();
        let building = self.rooms.get(vnum).and_then(|r| r.building());
        let affects = self.shared(vnum).map(|s| s.affects).unwrap_or_default();

        if self.catalog.building_has(building, BuildingFlags::RUINS) {
            if self.number(0, decay.ruins_crumble_chance) == 0 {
                self.hooks.send_to_room(vnum, "The ruins finally crumble to dust!");
                if self.owner_of(vnum).is_some() {
                    self.abandon_room(vnum);
                }
                let base = self
                    .base_sector_of(vnum)
                    .unwrap_or(self.config.world.default_land_sector);
                self.change_terrain(vnum, base, None);
                report.ruins_crumbled += 1;
            }
        } else if building.is_some()
            && !self.catalog.building_has(building, BuildingFlags::CITY_CENTER)
            && !affects.intersects(RoomAffects::UNCLAIMABLE | RoomAffects::HAS_INSTANCE)
        {
            self.decay_building(vnum, report);
        }

        let owner = self.owner_of(vnum);
        let Some(sect) = self.sector_of(vnum) else {
            return;
        };

        if owner.is_none()
            && self.catalog.sector_has(sect, SectorFlags::IS_ROAD)
            && self.number(0, decay.road_revert_chance) == 0
        {
            let base = self.base_sector_of(vnum).unwrap_or(sect);
            if base != sect && self.change_terrain(vnum, base, None) {
                report.roads_reverted += 1;
            }
        }

        if owner.is_none() && self.number(0, decay.affect_loss_chance) == 0 {
            let cleared = match self.shared_mut(vnum) {
                Some(shared) if shared.base_affects.intersects(RoomAffects::PLAYER_SET) => {
                    shared.base_affects.remove(RoomAffects::PLAYER_SET);
                    shared.affects.remove(RoomAffects::PLAYER_SET);
                    true
                }
                _ => false,
            };
            if cleared {
                self.request_world_save(vnum, SaveBits::MAP | SaveBits::ROOM);
                report.affects_cleared += 1;
            }
        }

        // re-read: earlier steps may have changed the tile
        let Some(sect) = self.sector_of(vnum) else {
            return;
        };
        if owner.is_none() && self.catalog.sector_has(sect, SectorFlags::CROP) {
            let wild = self
                .crop_of(vnum)
                .and_then(|c| self.catalog.crop(c))
                .map(|c| !c.flags.contains(CropFlags::NOT_WILD))
                .unwrap_or(true);
            let chance = if wild {
                decay.wild_crop_despawn_chance
            } else {
                decay.nonwild_crop_despawn_chance
            };
            if self.number(0, chance) == 0 {
                let base = self
                    .base_sector_of(vnum)
                    .filter(|b| {
                        !self
                            .catalog
                            .sector_has(*b, SectorFlags::CROP | SectorFlags::HAS_CROP_DATA)
                    })
                    .unwrap_or(self.config.world.default_land_sector);
                if self.change_terrain(vnum, base, None) {
                    report.crops_despawned += 1;
                }
            }
        }

        if owner.is_none()
            && self.catalog.sector_has(sect, SectorFlags::IS_TRENCH)
            && self.number(0, decay.trench_collapse_chance) == 0
        {
            let original = self
                .shared(vnum)
                .and_then(|s| s.extra(ExtraKey::TrenchOriginalSector))
                .filter(|s| self.catalog.sector(*s).is_some())
                .unwrap_or(self.config.world.default_land_sector);
            if self.change_terrain(vnum, original, None) {
                self.hooks.send_to_room(vnum, "The trench collapses!");
                report.trenches_collapsed += 1;
            }
        }

        if decay.naturalize_newbie_islands {
            self.naturalize_tile(vnum, report);
        }
    }

    fn decay_building(&mut self, vnum: RoomVnum, report: &mut AnnualReport) {
        let decay = self.config.decay.clone();
        let owner = self.owner_of(vnum);
        let imm_only = owner
            .and_then(|e| self.empires.get(e))
            .map(|e| e.imm_only)
            .unwrap_or(false);
        if imm_only {
            return;
        }
        let Some(proto) = self
            .rooms
            .get(vnum)
            .and_then(|r| r.building())
            .and_then(|b| self.catalog.building(b))
            .cloned()
        else {
            return;
        };
        let divisor = if self.building_is_complete(vnum) {
            decay.disrepair_divisor
        } else {
            decay.disrepair_divisor_unfinished
        };
        let step = round_tenth(f64::from(proto.max_damage) / divisor.max(1.0));
        let damage = match self.rooms.get_mut(vnum).and_then(|r| r.complex.as_mut()) {
            Some(complex) => {
                complex.damage += step;
                merge_resources(&mut complex.resources, &proto.upkeep);
                complex.damage
            }
            None => return,
        };
        self.request_world_save(vnum, SaveBits::ROOM);
        report.buildings_damaged += 1;

        if damage < f64::from(proto.max_damage) {
            return;
        }
        if let Some(emp) = owner {
            let (x, y) = self.map.coords(vnum);
            self.hooks.log_to_empire(
                emp,
                &format!("The {} at ({}, {}) has crumbled from disrepair", proto.name, x, y),
            );
            self.abandon_room(vnum);
            report.buildings_abandoned += 1;
        }
        if self.number(0, decay.ruin_chance) == 0 && self.ruin_one_building(vnum) {
            report.buildings_ruined += 1;
        }
    }

    fn naturalize_tile(&mut self, vnum: RoomVnum, report: &mut AnnualReport) {
        let island = self.island_of(vnum);
        if !self.empires.is_newbie_island(island) || self.owner_of(vnum).is_some() {
            return;
        }
        let affects = self.shared(vnum).map(|s| s.affects).unwrap_or_default();
        if affects.contains(RoomAffects::HAS_INSTANCE) {
            return;
        }
        if affects.contains(RoomAffects::UNCLAIMABLE) && !self.config.decay.naturalize_unclaimable {
            return;
        }
        let Some(tile) = self.map.tile(vnum) else {
            return;
        };
        let natural = tile.natural_sector;
        if tile.sector == natural && tile.base_sector == natural {
            return;
        }
        if self.change_terrain(vnum, natural, Some(natural)) {
            debug!("Naturalized tile {} back to sector {}", vnum, natural);
            report.tiles_naturalized += 1;
        }
    }

    fn annual_update_depletions(&mut self, vnum: RoomVnum, report: &mut AnnualReport) {
        let divisor = self.config.decay.depletion_divisor.max(1);
        let threshold = self.config.decay.depletion_threshold;
        let removed = match self.shared_mut(vnum) {
            Some(shared) if !shared.depletion.is_empty() => {
                let before = shared.depletion.len();
                for count in shared.depletion.values_mut() {
                    *count /= divisor;
                }
                shared.depletion.retain(|_, count| *count >= threshold);
                Some(before - shared.depletion.len())
            }
            _ => None,
        };
        if let Some(removed) = removed {
            report.depletions_removed += removed;
            self.request_world_save(vnum, SaveBits::ROOM);
        }
    }

    fn annual_update_vehicles(&mut self, report: &mut AnnualReport) {
        let divisor = self.config.decay.vehicle_disrepair_divisor.max(1.0);
        for id in self.vehicles.ids() {
            let Some(vehicle) = self.vehicles.get(id) else {
                continue;
            };
            let imm_only = vehicle
                .owner
                .and_then(|e| self.empires.get(e))
                .map(|e| e.imm_only)
                .unwrap_or(false);
            let Some(proto) = self.catalog.vehicle(vehicle.vnum).cloned() else {
                continue;
            };
            if imm_only {
                continue;
            }
            let room = vehicle.room;
            let max = f64::from(proto.max_damage);
            let damage = match self.vehicles.get_mut(id) {
                Some(v) => {
                    v.damage += round_tenth(max / divisor);
                    v.damage
                }
                None => continue,
            };
            report.vehicles_damaged += 1;
            self.request_world_save(room, SaveBits::OBJECTS);
            if damage >= max {
                self.hooks
                    .send_to_room(room, &format!("The {} crumbles from disrepair.", proto.name));
                if self.extract_vehicle(id) {
                    report.vehicles_destroyed += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::hooks::{HookCall, RecordingHooks};
    use crate::world::test_support::small_world;
    use crate::world::types::DepletionType;

    #[test]
    fn depletions_quarter_and_small_ones_vanish() {
        let mut world = small_world();
        world.change_terrain(42, 1, None);
        if let Some(shared) = world.shared_for_write(42) {
            shared.add_depletion(DepletionType::Chop, 100);
            shared.add_depletion(DepletionType::Forage, 30);
        }
        let report = world.annual_world_update();
        let shared = world.shared(42).expect("shared");
        assert_eq!(shared.depletion(DepletionType::Chop), 25);
        assert_eq!(shared.depletion(DepletionType::Forage), 0);
        assert_eq!(report.depletions_removed, 1);
    }

    #[test]
    fn buildings_decay_until_abandoned() {
        let hooks = RecordingHooks::new();
        let mut world = small_world().with_hooks(Box::new(hooks.clone()));
        world.config.decay.ruin_chance = i32::MAX;
        world.change_terrain(55, 0, None);
        world.empires_mut().insert(crate::world::empire::EmpireRecord::new(1, "Tester"));
        assert!(world.construct_building(55, 100, true));
        assert!(world.claim_room(55, 1));

        // hut: max damage 100, divisor 10
        for _ in 0..9 {
            world.annual_world_update();
        }
        assert_eq!(world.owner_of(55), Some(1));
        let report = world.annual_world_update();
        assert_eq!(report.buildings_abandoned, 1);
        assert_eq!(world.owner_of(55), None);
        assert!(hooks.calls().contains(&HookCall::Broadcast(EARTHQUAKE_MESSAGE.to_string())));
    }

    #[test]
    fn annual_update_keeps_indices_consistent() {
        let mut world = small_world();
        for vnum in 0..60 {
            let sect = if vnum % 3 == 0 { 5 } else { 10 };
            world.change_terrain(vnum, sect, Some(0));
        }
        world.config.decay.road_revert_chance = 0;
        world.config.decay.wild_crop_despawn_chance = 0;
        world.config.decay.nonwild_crop_despawn_chance = 0;
        let report = world.annual_world_update();
        assert_eq!(report.roads_reverted, 20);
        assert_eq!(report.crops_despawned, 40);
        assert!(world.verify_sector_index().is_ok());
        assert_eq!(world.sectors().count(0), 60);
    }
}
