// Integration tests for timed terrain changes driven by stored events

mod common;

use common::fresh_world;
use empireworld::world::events::StoredEventKind;

#[test]
fn trench_fills_into_a_canal() {
    let mut world = fresh_world();
    assert!(world.change_terrain(60, 0, None));
    assert!(world.change_terrain(60, 6, None));
    assert!(world.stored_event(60, StoredEventKind::TrenchFill).is_some());

    world.advance_clock(3_599);
    world.process_due_events();
    assert_eq!(world.sector_of(60), Some(6));

    world.advance_clock(1);
    world.process_due_events();
    assert_eq!(world.sector_of(60), Some(7));
    assert!(world.stored_event(60, StoredEventKind::TrenchFill).is_none());
    assert!(world.verify_sector_index().is_ok());
}

#[test]
fn leaving_a_trench_cancels_its_fill() {
    let mut world = fresh_world();
    assert!(world.change_terrain(61, 6, None));
    assert!(world.change_terrain(61, 0, None));
    assert!(world.stored_event(61, StoredEventKind::TrenchFill).is_none());
    assert!(world.events().is_empty());

    world.advance_clock(4_000);
    world.process_due_events();
    assert_eq!(world.sector_of(61), Some(0));
}

#[test]
fn seeded_field_grows_then_harvest_replants() {
    let mut world = fresh_world();
    assert!(world.change_terrain(70, 9, None));
    let crop = world.crop_of(70);
    assert!(crop.is_some());
    assert!(world.stored_event(70, StoredEventKind::GrowCrop).is_some());

    world.advance_clock(7_200);
    world.process_due_events();
    assert_eq!(world.sector_of(70), Some(10));
    assert_eq!(world.base_sector_of(70), Some(9));
    assert_eq!(world.crop_of(70), crop);

    assert!(world.harvest(70));
    assert_eq!(world.sector_of(70), Some(9));
    assert_eq!(world.crop_of(70), crop);
    assert!(world.stored_event(70, StoredEventKind::GrowCrop).is_some());
}

#[test]
fn forest_fire_burns_out_unless_extinguished() {
    let mut world = fresh_world();
    assert!(world.change_terrain(91, 1, None));
    assert!(world.change_terrain(92, 1, None));
    assert!(world.start_burning(91));
    assert!(world.start_burning(92));
    // already burning
    assert!(!world.start_burning(91));
    assert!(world.extinguish(92));
    assert!(!world.extinguish(92));

    world.advance_clock(180);
    world.process_due_events();
    assert_eq!(world.sector_of(91), Some(0));
    assert_eq!(world.sector_of(92), Some(1));
}

#[test]
fn plains_cannot_burn() {
    let mut world = fresh_world();
    assert!(world.change_terrain(93, 0, None));
    assert!(!world.start_burning(93));
    assert!(world.stored_event(93, StoredEventKind::BurnDown).is_none());
}

#[test]
fn chopping_clears_the_forest() {
    let mut world = fresh_world();
    assert!(world.change_terrain(90, 1, None));
    assert!(world.change_chop_territory(90));
    assert_eq!(world.sector_of(90), Some(0));
    // plains have nothing left to chop
    assert!(!world.change_chop_territory(90));
}

#[test]
fn start_locations_follow_the_sector() {
    let mut world = fresh_world();
    assert!(world.start_locations().is_empty());
    assert!(world.change_terrain(80, 17, None));
    assert_eq!(world.start_locations(), vec![80]);
    assert!(world.change_terrain(80, 0, None));
    assert!(world.start_locations().is_empty());
}

#[test]
fn building_keeps_the_land_as_its_base() {
    let mut world = fresh_world();
    assert!(world.change_terrain(100, 1, None));
    assert!(world.construct_building(100, 100, false));
    assert_eq!(world.sector_of(100), Some(8));
    assert_eq!(world.base_sector_of(100), Some(1));
    assert!(!world.building_is_complete(100));
    assert!(world.complete_building(100));
    assert!(world.building_is_complete(100));

    // the hut ruins into the generic ruins building on the same base
    assert!(world.ruin_one_building(100));
    assert_eq!(world.rooms().get(100).and_then(|r| r.building()), Some(110));
    assert_eq!(world.base_sector_of(100), Some(1));
    assert!(world.verify_sector_index().is_ok());
}
