//! Room lifecycle: materializing and unloading map rooms, creating and
//! deleting interiors, exits, resets and the orphan sweep.

use log::{debug, info, warn};

use crate::metrics;
use crate::storage::save_queue::SaveBits;
use crate::syserr;
use crate::world::catalog::{EvolutionKind, SectorFlags};
use crate::world::errors::WorldError;
use crate::world::events::{StoredEventKind, WorldEvent};
use crate::world::room::{ComplexData, Room};
use crate::world::shared::SharedRoomData;
use crate::world::types::{
    Direction, Exit, ExitFlags, ExtraKey, ResetCommand, RoomAffects, RoomVnum, ScriptVar,
    SectorVnum,
};
use crate::world::World;

impl World {
    /// Make sure a room exists for `vnum`, materializing map rooms on demand.
    pub fn find_or_load_room(&mut self, vnum: RoomVnum) -> bool {
        if self.rooms.contains(vnum) {
            return true;
        }
        self.map.in_bounds(vnum) && self.load_map_room(vnum, true)
    }

    /// Materialize a map room from its tile.
    pub fn load_map_room(&mut self, vnum: RoomVnum, schedule_check: bool) -> bool {
        if self.rooms.contains(vnum) {
            return true;
        }
        let Some(tile) = self.map.tile(vnum) else {
            return false;
        };
        let mut room = Room::new(vnum, tile.sector, tile.base_sector, tile.shared);
        room.crop = tile.crop;
        self.rooms.insert(room);
        if let Some(tile) = self.map.tile_mut(vnum) {
            tile.room_loaded = true;
        }
        if schedule_check {
            self.schedule_unload_check(vnum);
        }
        metrics::inc_rooms_loaded();
        true
    }

    pub(crate) fn schedule_unload_check(&mut self, vnum: RoomVnum) {
        let jitter = self.config.world.unload_jitter_secs as i32;
        let delay = self.config.world.unload_check_secs as i64 + i64::from(self.number(0, jitter));
        let now = self.now();
        let previous = self.rooms.get_mut(vnum).and_then(|r| r.unload_event.take());
        if let Some(old) = previous {
            self.events.cancel(old);
        }
        let id = self
            .events
            .schedule(now, delay, WorldEvent::UnloadCheck { room: vnum });
        if let Some(room) = self.rooms.get_mut(vnum) {
            room.unload_event = Some(id);
        }
    }

    /// A map room can go back to being a bare tile when nothing but the tile
    /// would be lost.
    pub fn can_unload_map_room(&self, vnum: RoomVnum) -> bool {
        if !self.map.in_bounds(vnum) {
            return false;
        }
        let Some(room) = self.rooms.get(vnum) else {
            return false;
        };
        let instanced = self
            .shared(vnum)
            .map(|s| s.affects.contains(RoomAffects::HAS_INSTANCE))
            .unwrap_or(false);
        room.people.is_empty()
            && room.contents.is_empty()
            && room.vehicles.is_empty()
            && room.owner.is_none()
            && room.complex.is_none()
            && room.affects.is_empty()
            && room.script.is_empty()
            && room.resets.is_empty()
            && room.instance_id.is_none()
            && room.editor.is_none()
            && !instanced
            && self.rooms.exits_here(vnum) == 0
    }

    pub fn unload_map_room(&mut self, vnum: RoomVnum) -> bool {
        if !self.can_unload_map_room(vnum) {
            return false;
        }
        if self.delete_room(vnum, false) {
            metrics::inc_rooms_unloaded();
            debug!("Unloaded map room {}", vnum);
            true
        } else {
            false
        }
    }

    pub fn create_room(&mut self, home: Option<RoomVnum>) -> Result<RoomVnum, WorldError> {
        let sect = self.config.world.default_inside_sector;
        self.create_room_with_sector(home, sect)
    }

    /// Allocate a new interior room at the next free vnum.
    pub fn create_room_with_sector(
        &mut self,
        home: Option<RoomVnum>,
        sect: SectorVnum,
    ) -> Result<RoomVnum, WorldError> {
        if self.catalog.sector(sect).is_none() {
            syserr!("create_room called with invalid sector {}", sect);
            return Err(WorldError::UnknownPrototype {
                kind: "sector",
                vnum: sect,
            });
        }
        let vnum = match self.rooms.find_free_vnum() {
            Ok(vnum) => vnum,
            Err(err) => {
                syserr!("create_room: {}", err);
                return Err(err);
            }
        };
        let shared = self.shared_data.alloc(SharedRoomData::default());
        let mut room = Room::new(vnum, sect, sect, shared);
        room.complex = Some(ComplexData::default());
        if let Some(home) = home.filter(|h| self.rooms.contains(*h)) {
            room.home_room = home;
        }
        let home_room = room.home_room;
        self.rooms.insert(room);
        self.sectors.add(vnum, sect, sect);

        if home_room != vnum {
            if let Some(complex) = self.rooms.get_mut(home_room).and_then(|r| r.complex.as_mut()) {
                complex.inside_rooms += 1;
            }
            if let Some(emp) = self.owner_of(home_room) {
                self.claim_room(vnum, emp);
            }
        }
        self.request_world_save(vnum, SaveBits::ROOM);
        metrics::inc_rooms_created();
        debug!("Created room {} (home {})", vnum, home_room);
        Ok(vnum)
    }

    /// Lazily created room that receives evacuees from deleted rooms.
    pub fn get_extraction_room(&mut self) -> Option<RoomVnum> {
        if let Some(vnum) = self.extraction_room.filter(|v| self.rooms.contains(*v)) {
            return Some(vnum);
        }
        match self.create_room(None) {
            Ok(vnum) => {
                self.extraction_room = Some(vnum);
                info!("Created extraction room {}", vnum);
                Some(vnum)
            }
            Err(err) => {
                syserr!("unable to create extraction room: {}", err);
                None
            }
        }
    }

    /// Tear a room down and remove it from the world. With `check_exits`,
    /// every exit and home link into the room is repaired right away;
    /// without it only interiors are scanned and [`World::check_all_exits`]
    /// must run later.
    pub fn delete_room(&mut self, vnum: RoomVnum, check_exits: bool) -> bool {
        if !self.rooms.contains(vnum) {
            syserr!("delete_room() attempting to delete missing room {}", vnum);
            return false;
        }
        let is_map = self.map.in_bounds(vnum);
        if is_map && !self.shutting_down && !self.can_unload_map_room(vnum) {
            syserr!("delete_room() attempting to delete map room {} that cannot unload", vnum);
            return false;
        }

        let editor = self.rooms.get_mut(vnum).and_then(|r| r.editor.take());
        if let Some(ch) = editor {
            self.hooks.abort_description_editor(ch, vnum);
        }
        let unload = self.rooms.get_mut(vnum).and_then(|r| r.unload_event.take());
        if let Some(id) = unload {
            self.events.cancel(id);
        }
        if !is_map {
            // cancel before the block that holds the handles is freed
            let handles = self
                .shared_mut(vnum)
                .map(|s| s.events.drain())
                .unwrap_or_default();
            for id in handles {
                self.events.cancel(id);
                metrics::inc_events_cancelled();
            }
        }
        if let Some(instance) = self.rooms.get(vnum).and_then(|r| r.instance_id) {
            self.hooks.instance_room_deleted(instance, vnum);
        }
        if self.owner_of(vnum).is_some() {
            self.abandon_room(vnum);
        }
        let home = self.rooms.get(vnum).map(|r| r.home_room).unwrap_or(vnum);
        if home != vnum {
            if let Some(complex) = self.rooms.get_mut(home).and_then(|r| r.complex.as_mut()) {
                complex.inside_rooms = (complex.inside_rooms - 1).max(0);
            }
        }

        self.evacuate_room(vnum);

        if let Some(room) = self.rooms.get_mut(vnum) {
            room.script = Default::default();
            room.resets.clear();
        }

        if check_exits {
            let removed = self.rooms.remove_exits_to(vnum);
            for (source, _) in &removed {
                self.request_world_save(*source, SaveBits::ROOM);
            }
            self.orphan_rooms_homed_on(vnum, self.rooms.vnums());
        } else {
            self.orphan_rooms_homed_on(vnum, self.rooms.interior_vnums());
        }
        self.rooms.clear_exits(vnum);

        if let Some(room) = self.rooms.remove(vnum) {
            if is_map {
                if let Some(tile) = self.map.tile_mut(vnum) {
                    tile.room_loaded = false;
                }
            } else {
                self.sectors.remove(vnum, room.sector, room.base_sector);
                self.shared_data.free(room.shared);
                self.request_world_save(vnum, SaveBits::ROOM);
            }
        }
        if self.extraction_room == Some(vnum) {
            self.extraction_room = None;
        }

        let cities: Vec<_> = self
            .empires
            .iter()
            .filter(|e| e.city_at(vnum).is_some())
            .map(|e| e.vnum)
            .collect();
        for emp in cities {
            self.abandon_city(emp, vnum);
        }
        if !is_map {
            metrics::inc_rooms_deleted();
            debug!("Deleted room {}", vnum);
        }
        true
    }

    fn orphan_rooms_homed_on(&mut self, vnum: RoomVnum, candidates: Vec<RoomVnum>) {
        for other in candidates {
            if other == vnum {
                continue;
            }
            if let Some(room) = self.rooms.get_mut(other) {
                if room.home_room == vnum {
                    room.home_room = other;
                    room.auto_delete = true;
                }
            }
        }
    }

    /// Move people and vehicles out to the extraction room; objects are
    /// handed back to their owning subsystem.
    fn evacuate_room(&mut self, vnum: RoomVnum) {
        let (people, vehicles, contents) = match self.rooms.get_mut(vnum) {
            Some(room) => (
                std::mem::take(&mut room.people),
                room.vehicles.clone(),
                std::mem::take(&mut room.contents),
            ),
            None => return,
        };
        if !people.is_empty() || !vehicles.is_empty() {
            if self.extraction_room == Some(vnum) {
                self.extraction_room = None;
            }
            match self.get_extraction_room() {
                Some(target) => {
                    for ch in people {
                        self.hooks.relocate_character(ch, target);
                        if let Some(room) = self.rooms.get_mut(target) {
                            room.people.push(ch);
                        }
                    }
                    for id in vehicles {
                        self.move_vehicle(id, target);
                    }
                }
                None => {
                    warn!("No extraction room; extracting vehicles from {}", vnum);
                    for id in vehicles {
                        self.extract_vehicle(id);
                    }
                }
            }
        }
        for obj in contents {
            self.hooks.extract_object(obj);
        }
    }

    /// Create or retarget exit `dir` of `from`, optionally with the reverse exit.
    pub fn create_exit(
        &mut self,
        from: RoomVnum,
        to: RoomVnum,
        dir: Direction,
        back: bool,
    ) -> bool {
        if !self.exists(to) {
            return false;
        }
        if !self.set_exit_keeping_flags(from, dir, to) {
            return false;
        }
        if back {
            let to_has_complex = self
                .rooms
                .get(to)
                .map(|r| r.complex.is_some())
                .unwrap_or(false);
            if to_has_complex {
                self.set_exit_keeping_flags(to, dir.reverse(), from);
            }
        }
        true
    }

    fn set_exit_keeping_flags(&mut self, from: RoomVnum, dir: Direction, to: RoomVnum) -> bool {
        let existing = self
            .rooms
            .get(from)
            .and_then(|r| r.complex.as_ref())
            .and_then(|c| c.find_exit(dir))
            .cloned();
        let exit = match existing {
            Some(ex) => Exit { to_room: to, ..ex },
            None => Exit {
                dir,
                to_room: to,
                keyword: None,
                flags: ExitFlags::empty(),
            },
        };
        if self.rooms.set_exit(from, exit) {
            self.request_world_save(from, SaveBits::ROOM);
            true
        } else {
            false
        }
    }

    /// Global exit repair: drop exits into interiors that no longer exist
    /// and orphan rooms whose home vanished. Returns exits removed.
    pub fn check_all_exits(&mut self) -> usize {
        let mut dead = Vec::new();
        for room in self.rooms.iter() {
            for ex in room.exits() {
                if !self.exists(ex.to_room) {
                    dead.push((room.vnum, ex.dir));
                }
            }
        }
        for (source, dir) in &dead {
            self.rooms.remove_exit(*source, *dir);
            self.request_world_save(*source, SaveBits::ROOM);
        }
        for vnum in self.rooms.interior_vnums() {
            let home = self.rooms.get(vnum).map(|r| r.home_room).unwrap_or(vnum);
            if home != vnum && !self.rooms.contains(home) {
                if let Some(room) = self.rooms.get_mut(vnum) {
                    room.home_room = vnum;
                    room.auto_delete = true;
                }
            }
        }
        if !dead.is_empty() {
            info!("check_all_exits removed {} dangling exits", dead.len());
        }
        dead.len()
    }

    /// Delete interiors tagged for auto-delete. Returns how many went.
    pub fn delete_orphaned_rooms(&mut self) -> usize {
        let mut deleted = 0;
        loop {
            let orphans: Vec<RoomVnum> = self
                .rooms
                .interior_vnums()
                .into_iter()
                .filter(|v| self.rooms.get(*v).map(|r| r.auto_delete).unwrap_or(false))
                .collect();
            if orphans.is_empty() {
                break;
            }
            for vnum in orphans {
                if self.delete_room(vnum, true) {
                    deleted += 1;
                }
            }
        }
        if deleted > 0 {
            info!("Deleted {} orphaned rooms", deleted);
        }
        deleted
    }

    /// Consume the one-shot reset queue. Script triggers and variables attach
    /// to the room; everything else goes to the hooks.
    pub fn reset_one_room(&mut self, vnum: RoomVnum) -> bool {
        let resets = match self.rooms.get_mut(vnum) {
            Some(room) if !room.resets.is_empty() => std::mem::take(&mut room.resets),
            _ => return false,
        };
        for command in resets {
            match command {
                ResetCommand::Trigger { vnum: trigger, .. } => {
                    if let Some(room) = self.rooms.get_mut(vnum) {
                        if !room.script.triggers.contains(&trigger) {
                            room.script.triggers.push(trigger);
                        }
                    }
                }
                ResetCommand::Var {
                    context,
                    name,
                    value,
                    ..
                } => {
                    if let Some(room) = self.rooms.get_mut(vnum) {
                        room.script.vars.retain(|v| !(v.name == name && v.context == context));
                        room.script.vars.push(ScriptVar {
                            context,
                            name,
                            value,
                        });
                    }
                }
                other => self.hooks.apply_reset(vnum, &other),
            }
        }
        self.request_world_save(vnum, SaveBits::ROOM);
        true
    }

    /// Re-create timers from their persisted absolute times. Anything that
    /// came due while the world was down fires on the first tick.
    pub(crate) fn restore_stored_events(&mut self) {
        let mut restored = 0;
        let candidates: Vec<RoomVnum> = self
            .map
            .land_vnums()
            .into_iter()
            .chain(self.rooms.interior_vnums())
            .collect();
        for vnum in candidates {
            let Some(sect) = self.sector_of(vnum) else {
                continue;
            };
            let (seed, fill) = match self.shared(vnum) {
                Some(s) => (s.extra(ExtraKey::SeedTime), s.extra(ExtraKey::TrenchFillTime)),
                None => (None, None),
            };
            let grows = self
                .catalog
                .sector(sect)
                .and_then(|p| p.evolves(EvolutionKind::Grows))
                .is_some();
            if let (true, Some(seed)) = (grows, seed) {
                let due = i64::from(seed) + self.config.game.crop_growth_secs as i64;
                self.restore_stored_event(vnum, StoredEventKind::GrowCrop, due);
                restored += 1;
            }
            if let (true, Some(fill)) = (self.catalog.sector_has(sect, SectorFlags::IS_TRENCH), fill) {
                self.restore_stored_event(vnum, StoredEventKind::TrenchFill, i64::from(fill));
                restored += 1;
            }
            let burn = self
                .rooms
                .get(vnum)
                .and_then(|r| r.complex.as_ref())
                .and_then(|c| c.burn_down_time);
            if let Some(burn) = burn {
                self.restore_stored_event(vnum, StoredEventKind::BurnDown, burn);
                restored += 1;
            }
        }
        if restored > 0 {
            info!("Restored {} stored events", restored);
        }
    }

    /// Derived state rebuilt once every record has been loaded.
    pub fn finalize_load(&mut self) {
        self.rebuild_land();
        self.rebuild_start_locations();
        self.restore_stored_events();
        self.read_empire_territory(None);
        self.reread_empire_tech(None);
        info!(
            "World ready: {} land tiles, {} rooms ({} interior), {} empires",
            self.map.land_count(),
            self.rooms.len(),
            self.rooms.interior_count(),
            self.empires.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::save_queue::SaveBits;
    use crate::world::hooks::{HookCall, RecordingHooks};
    use crate::world::test_support::small_world;
    use crate::world::types::{CharId, Direction, ResetCommand};

    #[test]
    fn map_rooms_unload_only_when_idle() {
        let mut world = small_world();
        world.change_terrain(15, 0, None);
        assert!(world.load_map_room(15, true));
        assert!(world.rooms().get(15).and_then(|r| r.unload_event()).is_some());
        assert!(world.can_unload_map_room(15));
        assert!(world.unload_map_room(15));
        assert!(!world.rooms().contains(15));
        assert!(!world.map().tile(15).expect("tile").has_room());
        assert!(world.events().is_empty());
    }

    #[test]
    fn creating_rooms_tracks_home_and_index() {
        let mut world = small_world();
        let home = world.create_room(None).expect("home");
        let inside = world.create_room(Some(home)).expect("inside");
        assert!(inside > home);
        assert_eq!(world.rooms().get(inside).map(|r| r.home_room), Some(home));
        assert_eq!(
            world
                .rooms()
                .get(home)
                .and_then(|r| r.complex.as_ref())
                .map(|c| c.inside_rooms),
            Some(1)
        );
        assert!(world.verify_sector_index().is_ok());
    }

    #[test]
    fn deleting_home_orphans_its_interiors() {
        let mut world = small_world();
        let home = world.create_room(None).expect("home");
        let inside = world.create_room(Some(home)).expect("inside");
        assert!(world.delete_room(home, true));
        assert!(world.rooms().get(inside).map(|r| r.auto_delete).unwrap_or(false));
        assert_eq!(world.delete_orphaned_rooms(), 1);
        assert!(!world.rooms().contains(inside));
        assert!(world.verify_sector_index().is_ok());
    }

    #[test]
    fn people_are_evacuated_to_the_extraction_room() {
        let hooks = RecordingHooks::new();
        let mut world = small_world().with_hooks(Box::new(hooks.clone()));
        let room = world.create_room(None).expect("room");
        if let Some(r) = world.rooms.get_mut(room) {
            r.people.push(CharId(9));
        }
        assert!(world.delete_room(room, true));
        let target = world.extraction_room().expect("extraction room");
        assert!(hooks.calls().contains(&HookCall::Relocate(CharId(9), target)));
        assert_eq!(world.rooms().get(target).map(|r| r.people.clone()), Some(vec![CharId(9)]));
    }

    #[test]
    fn deleting_with_exit_check_repairs_every_way_in() {
        let mut world = small_world();
        let a = world.create_room(None).expect("a");
        let b = world.create_room(None).expect("b");
        let target = world.create_room(None).expect("target");
        assert!(world.create_exit(a, target, Direction::North, false));
        assert!(world.create_exit(b, target, Direction::East, false));
        assert_eq!(world.rooms().exits_here(target), 2);

        assert!(world.delete_room(target, true));
        assert!(!world.rooms().contains(target));
        assert_eq!(world.rooms().exits_here(target), 0);
        assert!(world.rooms().rooms_with_exits_to(target).is_empty());
        assert_eq!(world.rooms().get(a).map(|r| r.exits().len()), Some(0));
        assert_eq!(world.rooms().get(b).map(|r| r.exits().len()), Some(0));
        assert!(world.saves().bits(a).contains(SaveBits::ROOM));
        assert!(world.saves().bits(b).contains(SaveBits::ROOM));
        // nothing left for the global pass
        assert_eq!(world.check_all_exits(), 0);
    }

    #[test]
    fn exits_are_repaired_lazily_by_the_global_pass() {
        let mut world = small_world();
        let a = world.create_room(None).expect("a");
        let b = world.create_room(None).expect("b");
        assert!(world.create_exit(a, b, Direction::North, true));
        assert_eq!(world.rooms().exits_here(a), 1);
        assert!(world.delete_room(b, false));
        assert_eq!(world.rooms().get(a).map(|r| r.exits().len()), Some(1));
        assert_eq!(world.check_all_exits(), 1);
        assert_eq!(world.rooms().get(a).map(|r| r.exits().len()), Some(0));
    }

    #[test]
    fn reset_queue_is_consumed_once() {
        let hooks = RecordingHooks::new();
        let mut world = small_world().with_hooks(Box::new(hooks.clone()));
        let room = world.create_room(None).expect("room");
        if let Some(r) = world.rooms.get_mut(room) {
            r.resets = vec![
                ResetCommand::Trigger { attach: 2, vnum: 500 },
                ResetCommand::Mob {
                    vnum: 3000,
                    flags: 0,
                    rope: -1,
                },
            ];
        }
        assert!(world.reset_one_room(room));
        assert!(!world.reset_one_room(room));
        assert_eq!(world.rooms().get(room).map(|r| r.script.triggers.clone()), Some(vec![500]));
        assert_eq!(hooks.calls().len(), 1);
    }
}
