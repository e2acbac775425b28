// Integration tests for saving a world and loading it back

mod common;

use common::{open_world, open_world_at, NOW};
use empireworld::world::catalog::Tech;
use empireworld::world::empire::EmpireRecord;
use empireworld::world::events::StoredEventKind;
use empireworld::world::types::{Direction, Track};
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use tempfile::tempdir;

#[test]
fn whole_world_save_reloads_every_layer() {
    let dir = tempdir().unwrap();
    let inside;
    {
        let (mut store, mut world) = open_world(dir.path());
        assert!(world.save_world_after_startup);

        // a customized tile with no room behind it
        assert!(world.change_terrain(21, 0, None));
        assert!(world.customize_room(21, Some("Old Mill"), Some("A quiet mill.")));
        assert!(world.set_height(21, 4));
        assert!(world.add_track(
            21,
            Track {
                player_id: 5,
                mob_vnum: -1,
                timestamp: NOW,
                dir: Direction::North,
            }
        ));

        // an empire city with an interior and a cart
        world.empires_mut().insert(EmpireRecord::new(1, "Aldor"));
        assert!(world.change_terrain(45, 0, None));
        assert!(world.claim_room(45, 1));
        assert!(world.construct_building(45, 101, true));
        world.found_city(1, 45, "Aldoria", 2).unwrap();
        inside = world.create_room(Some(45)).unwrap();
        assert!(world.create_exit(45, inside, Direction::Up, true));
        world.place_vehicle(200, 45, None, true).unwrap();

        let report = store.save_whole_world(&mut world).unwrap();
        assert_eq!(report.map_records, 400);
        assert_eq!(report.failures, 0);
        assert!(!world.save_world_after_startup);
        assert!(store.room_path(21).exists());
        assert!(store.room_path(inside).exists());
        assert!(store.pack_path(45).exists());
    }

    let (_store, world) = open_world(dir.path());
    assert!(!world.save_world_after_startup);
    assert_eq!(world.map().land_count(), 2);
    assert!(world.verify_sector_index().is_ok());

    let mill = world.shared(21).unwrap();
    assert_eq!(mill.name.as_deref(), Some("Old Mill"));
    assert_eq!(mill.description.as_deref(), Some("A quiet mill."));
    assert_eq!(mill.tracks.len(), 1);
    assert_eq!(world.height_of(21), 4);
    assert!(!world.rooms().contains(21));

    assert_eq!(world.sector_of(45), Some(8));
    assert_eq!(world.base_sector_of(45), Some(0));
    assert_eq!(world.owner_of(45), Some(1));
    let center = world.rooms().get(45).unwrap();
    assert_eq!(center.building(), Some(101));
    assert_eq!(center.vehicles.len(), 1);
    assert!(center
        .exits()
        .iter()
        .any(|ex| ex.dir == Direction::Up && ex.to_room == inside));

    let interior = world.rooms().get(inside).unwrap();
    assert_eq!(interior.home_room, 45);
    assert_eq!(interior.owner, Some(1));
    assert!(interior
        .exits()
        .iter()
        .any(|ex| ex.dir == Direction::Down && ex.to_room == 45));

    let empire = world.empires().get(1).unwrap();
    assert_eq!(empire.cities.len(), 1);
    assert_eq!(empire.cities[0].name, "Aldoria");
    // interiors never count as territory
    assert_eq!(empire.aggregates.territory.total, 1);
    assert_eq!(empire.aggregates.territory.city, 1);
    assert!(empire.aggregates.has_tech(Tech::Prominence));

    assert_eq!(world.vehicles().len(), 1);
    assert_eq!(world.vehicles().iter().next().map(|v| v.room), Some(45));
}

#[test]
fn incremental_flush_patches_the_map_and_prunes_room_files() {
    let dir = tempdir().unwrap();
    {
        let (mut store, mut world) = open_world(dir.path());
        assert!(world.change_terrain(21, 0, None));
        assert!(world.customize_room(21, Some("Old Mill"), None));
        store.save_whole_world(&mut world).unwrap();
        assert!(store.room_path(21).exists());

        assert!(world.change_terrain(46, 1, None));
        // flooding the mill clears its customizations
        assert!(world.change_terrain(21, 2, None));
        let report = store.perform_requested_world_saves(&mut world);
        assert_eq!(report.failures, 0);
        assert!(report.map_records >= 2);
        assert!(world.saves().is_empty());
        assert!(!store.room_path(21).exists());
    }

    let (_store, world) = open_world(dir.path());
    assert_eq!(world.sector_of(46), Some(1));
    assert_eq!(world.sector_of(21), Some(2));
    assert!(world.map().tile(21).unwrap().shared.is_ocean());
    assert_eq!(world.map().land_count(), 1);
    assert!(world.verify_sector_index().is_ok());
}

#[test]
fn burning_timer_keeps_running_while_down() {
    let dir = tempdir().unwrap();
    {
        let (mut store, mut world) = open_world(dir.path());
        assert!(world.change_terrain(30, 0, None));
        assert!(world.construct_building(30, 100, true));
        assert!(world.start_burning(30));
        store.save_whole_world(&mut world).unwrap();
    }

    // 100 of the 180 seconds pass while the world is down
    let (_store, mut world) = open_world_at(dir.path(), NOW + 100);
    let burn = world
        .rooms()
        .get(30)
        .and_then(|r| r.complex.as_ref())
        .and_then(|c| c.burn_down_time);
    assert_eq!(burn, Some(NOW + 180));

    world.advance_clock(79);
    world.process_due_events();
    assert_eq!(world.sector_of(30), Some(8));

    world.advance_clock(1);
    assert!(world.process_due_events() >= 1);
    assert_eq!(world.sector_of(30), Some(0));
    assert!(world.rooms().get(30).and_then(|r| r.building()).is_none());
}

#[test]
fn overdue_timers_fire_on_the_first_tick() {
    let dir = tempdir().unwrap();
    {
        let (mut store, mut world) = open_world(dir.path());
        assert!(world.change_terrain(60, 0, None));
        assert!(world.change_terrain(60, 6, None));
        assert!(world.change_terrain(31, 0, None));
        assert!(world.construct_building(31, 100, true));
        assert!(world.start_burning(31));
        store.save_whole_world(&mut world).unwrap();
    }

    let (_store, mut world) = open_world_at(dir.path(), NOW + 4_000);
    assert_eq!(world.sector_of(60), Some(6));
    assert!(world.stored_event(60, StoredEventKind::TrenchFill).is_some());
    assert!(world.process_due_events() >= 2);
    assert_eq!(world.sector_of(60), Some(7));
    assert_eq!(world.sector_of(31), Some(0));
    assert!(world.stored_event(60, StoredEventKind::TrenchFill).is_none());
}

#[test]
fn foreign_map_version_schedules_a_full_save() {
    let dir = tempdir().unwrap();
    {
        let (mut store, mut world) = open_world(dir.path());
        assert!(world.change_terrain(50, 3, None));
        store.save_whole_world(&mut world).unwrap();

        let mut file = OpenOptions::new().write(true).open(store.map_path()).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        file.write_all(&1i32.to_le_bytes()).unwrap();
    }

    let (_store, world) = open_world(dir.path());
    assert!(world.save_world_after_startup);
    assert_eq!(world.sector_of(50), Some(3));
}
