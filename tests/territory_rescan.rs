// The incremental territory and tech counters must always match a full rescan

mod common;

use common::fresh_world;
use empireworld::world::catalog::Tech;
use empireworld::world::empire::{EmpireAggregates, EmpireRecord};
use empireworld::world::World;

fn snapshot(world: &World, emp: i32) -> EmpireAggregates {
    world.empires().get(emp).unwrap().aggregates.clone()
}

fn assert_rescan_agrees(world: &mut World) {
    let before: Vec<_> = [1, 2].iter().map(|e| snapshot(world, *e)).collect();
    world.read_empire_territory(None);
    world.reread_empire_tech(None);
    let after: Vec<_> = [1, 2].iter().map(|e| snapshot(world, *e)).collect();
    assert_eq!(before, after);
}

#[test]
fn counters_survive_a_busy_session() {
    let mut world = fresh_world();
    world.empires_mut().insert(EmpireRecord::new(1, "Aldor"));
    world.empires_mut().insert(EmpireRecord::new(2, "Borun"));

    let center = world.map().vnum_at(10, 10);
    let farm = world.map().vnum_at(11, 10);
    let tower = world.map().vnum_at(13, 10);
    let glass = world.map().vnum_at(16, 10);
    let contested = world.map().vnum_at(10, 15);
    for vnum in [center, farm, tower, glass, contested] {
        assert!(world.change_terrain(vnum, 0, None));
        assert!(world.claim_room(vnum, 1));
    }
    assert_rescan_agrees(&mut world);

    assert!(world.construct_building(center, 101, true));
    world.found_city(1, center, "Aldoria", 2).unwrap();
    assert!(world.construct_building(tower, 103, true));
    assert!(world.construct_building(glass, 102, false));
    assert_rescan_agrees(&mut world);

    assert!(world.complete_building(glass));
    assert!(world.set_room_population(farm, 12));
    let hall = world.create_room(Some(center)).unwrap();
    world.place_vehicle(202, farm, Some(1), true).unwrap();
    assert_rescan_agrees(&mut world);

    let agg = snapshot(&world, 1);
    assert!(agg.has_tech(Tech::Prominence));
    assert!(agg.has_tech(Tech::Glassblowing));
    assert!(agg.has_tech(Tech::Workforce));
    assert_eq!(agg.population, 12);
    assert_eq!(world.owner_of(hall), Some(1));

    // empire 2 takes a tile, a field turns to forest, the workshop hits wasteland
    assert!(world.claim_room(contested, 2));
    assert!(world.change_terrain(farm, 1, None));
    assert!(world.change_terrain(glass, 16, None));
    assert!(world.abandon_room(tower));
    assert_rescan_agrees(&mut world);

    let agg = snapshot(&world, 1);
    assert!(!agg.has_tech(Tech::Glassblowing));
    assert_eq!(world.owner_of(glass), None);
    assert_eq!(agg.territory.total, 2);
    assert_eq!(agg.tile_sectors.get(&1), Some(&1));
    assert_eq!(snapshot(&world, 2).territory.total, 1);
}

#[test]
fn burning_a_city_center_demotes_its_land() {
    let mut world = fresh_world();
    world.empires_mut().insert(EmpireRecord::new(1, "Aldor"));
    world.empires_mut().insert(EmpireRecord::new(2, "Borun"));

    let center = world.map().vnum_at(5, 5);
    let near = world.map().vnum_at(6, 5);
    for vnum in [center, near] {
        assert!(world.change_terrain(vnum, 0, None));
        assert!(world.claim_room(vnum, 1));
    }
    assert!(world.construct_building(center, 101, true));
    world.found_city(1, center, "Aldoria", 2).unwrap();
    assert_eq!(snapshot(&world, 1).territory.city, 2);

    // burning the center to the ground abandons it and takes the city with it
    assert!(world.start_burning(center));
    world.advance_clock(180);
    world.process_due_events();
    assert_eq!(world.owner_of(center), None);
    assert_eq!(world.sector_of(center), Some(0));
    assert!(world.empires().get(1).unwrap().cities.is_empty());
    let agg = snapshot(&world, 1);
    assert_eq!(agg.territory.city, 0);
    assert_eq!(agg.territory.total, 1);
    assert_eq!(agg.territory.frontier, 1);
    assert!(!agg.has_tech(Tech::Prominence));
    assert_rescan_agrees(&mut world);
}

#[test]
fn a_second_city_on_the_same_spot_is_refused() {
    let mut world = fresh_world();
    world.empires_mut().insert(EmpireRecord::new(1, "Aldor"));
    world.empires_mut().insert(EmpireRecord::new(2, "Borun"));
    let center = world.map().vnum_at(3, 3);
    assert!(world.change_terrain(center, 0, None));
    assert!(world.claim_room(center, 1));

    // no city center yet
    assert!(world.found_city(1, center, "Early", 1).is_err());
    assert!(world.construct_building(center, 101, true));
    assert!(world.found_city(2, center, "Theirs", 1).is_err());
    world.found_city(1, center, "Aldoria", 1).unwrap();
    assert!(world.found_city(1, center, "Again", 1).is_err());
    assert_eq!(world.empires().get(1).unwrap().cities.len(), 1);
}

#[test]
fn moving_a_tile_to_another_island_moves_its_techs() {
    let mut world = fresh_world();
    world.empires_mut().insert(EmpireRecord::new(1, "Aldor"));
    world.empires_mut().insert(EmpireRecord::new(2, "Borun"));

    let shop = world.map().vnum_at(4, 4);
    assert!(world.change_terrain(shop, 0, None));
    assert!(world.set_island(shop, 3));
    assert!(world.claim_room(shop, 1));
    assert!(world.construct_building(shop, 102, true));
    world.place_vehicle(202, shop, Some(1), true).unwrap();
    let on_three = snapshot(&world, 1).island_techs.get(&3).copied();
    assert!(on_three.is_some());

    assert!(world.set_island(shop, 4));
    let agg = snapshot(&world, 1);
    assert!(agg.island_techs.get(&3).is_none());
    assert_eq!(agg.island_techs.get(&4).copied(), on_three);
    assert!(agg.has_tech(Tech::Glassblowing));
    assert!(agg.has_tech(Tech::Workforce));
    assert_rescan_agrees(&mut world);
}
