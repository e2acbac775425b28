// Integration tests for the annual world update

mod common;

use common::{test_config, NOW};
use empireworld::config::Config;
use empireworld::world::catalog::Catalog;
use empireworld::world::empire::{EmpireRecord, IslandFlags, IslandRecord};
use empireworld::world::events::StoredEventKind;
use empireworld::world::types::DepletionType;
use empireworld::world::{Clock, World};
use std::path::Path;

/// Every decay roll succeeds.
fn certain_decay() -> Config {
    let mut config = test_config(Path::new("unused"));
    config.decay.ruins_crumble_chance = 0;
    config.decay.ruin_chance = 0;
    config.decay.road_revert_chance = 0;
    config.decay.affect_loss_chance = 0;
    config.decay.wild_crop_despawn_chance = 0;
    config.decay.nonwild_crop_despawn_chance = 0;
    config.decay.trench_collapse_chance = 0;
    config
}

fn world_with(config: Config) -> World {
    World::new(config, Catalog::builtin()).with_clock(Clock::Fixed(NOW))
}

#[test]
fn unowned_land_decays_back_to_its_base() {
    let mut world = world_with(certain_decay());
    world.empires_mut().insert(EmpireRecord::new(1, "Aldor"));

    // ruins
    assert!(world.change_terrain(41, 0, None));
    assert!(world.construct_building(41, 110, true));
    // unowned and owned roads over plains
    assert!(world.change_terrain(42, 5, Some(0)));
    assert!(world.change_terrain(43, 5, Some(0)));
    assert!(world.claim_room(43, 1));
    // a wild crop
    assert!(world.change_terrain(44, 10, None));
    // an abandoned trench
    assert!(world.change_terrain(45, 0, None));
    assert!(world.change_terrain(45, 6, None));

    let report = world.annual_world_update();
    assert_eq!(report.tiles_visited, 5);
    assert_eq!(report.ruins_crumbled, 1);
    assert_eq!(report.roads_reverted, 1);
    assert_eq!(report.crops_despawned, 1);
    assert_eq!(report.trenches_collapsed, 1);

    assert_eq!(world.sector_of(41), Some(0));
    assert!(world.rooms().get(41).and_then(|r| r.building()).is_none());
    assert_eq!(world.sector_of(42), Some(0));
    assert_eq!(world.sector_of(43), Some(5));
    assert_eq!(world.sector_of(44), Some(0));
    assert_eq!(world.crop_of(44), None);
    assert_eq!(world.sector_of(45), Some(0));
    assert!(world.stored_event(45, StoredEventKind::TrenchFill).is_none());
    assert!(world.verify_sector_index().is_ok());
}

#[test]
fn newbie_islands_return_to_their_natural_sector() {
    let mut world = world_with(certain_decay());
    world
        .empires_mut()
        .insert_island(IslandRecord::new(3, "Nursery", IslandFlags::NEWBIE));
    world.empires_mut().insert(EmpireRecord::new(1, "Aldor"));
    for vnum in [61, 62] {
        assert!(world.change_terrain(vnum, 0, None));
        assert!(world.set_island(vnum, 3));
        assert!(world.set_natural_sector(vnum, 1));
    }
    assert!(world.claim_room(62, 1));
    // same natural sector, different island
    assert!(world.change_terrain(63, 0, None));
    assert!(world.set_natural_sector(63, 1));

    let report = world.annual_world_update();
    assert_eq!(report.tiles_naturalized, 1);
    assert_eq!(world.sector_of(61), Some(1));
    assert_eq!(world.base_sector_of(61), Some(1));
    assert_eq!(world.sector_of(62), Some(0));
    assert_eq!(world.sector_of(63), Some(0));
}

#[test]
fn depletions_recover_indoors_too() {
    let mut world = world_with(test_config(Path::new("unused")));
    let inside = world.create_room(None).unwrap();
    assert!(world.add_depletion(inside, DepletionType::Quarry, 100));
    assert!(world.add_depletion(inside, DepletionType::Dig, 12));

    let report = world.annual_world_update();
    let shared = world.shared(inside).unwrap();
    assert_eq!(shared.depletion(DepletionType::Quarry), 25);
    assert_eq!(shared.depletion(DepletionType::Dig), 0);
    assert_eq!(report.depletions_removed, 1);
}

#[test]
fn vehicles_wear_out_unless_imm_owned() {
    let mut config = test_config(Path::new("unused"));
    config.decay.vehicle_disrepair_divisor = 1.0;
    let mut world = world_with(config);
    let mut keepers = EmpireRecord::new(9, "Keepers");
    keepers.imm_only = true;
    world.empires_mut().insert(keepers);

    assert!(world.change_terrain(70, 0, None));
    let cart = world.place_vehicle(200, 70, None, true).unwrap();
    let wagon = world.place_vehicle(202, 70, Some(9), true).unwrap();
    let interior = world.vehicles().get(wagon).and_then(|v| v.interior);
    assert!(interior.is_some());

    let report = world.annual_world_update();
    assert_eq!(report.vehicles_damaged, 1);
    assert_eq!(report.vehicles_destroyed, 1);
    assert!(world.vehicles().get(cart).is_none());
    assert!(world.vehicles().get(wagon).is_some());
    assert_eq!(world.rooms().get(70).map(|r| r.vehicles.clone()), Some(vec![wagon]));
}
