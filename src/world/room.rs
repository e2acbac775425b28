//! Materialized rooms and the sparse room table.
//!
//! The table keeps a reverse exit index (target vnum → rooms with exits into
//! it) so deleting a room repairs only the rooms that actually point at it.

use std::collections::{BTreeMap, HashMap};

use crate::world::errors::WorldError;
use crate::world::events::EventId;
use crate::world::shared::SharedRef;
use crate::world::types::{
    BuildingVnum, CharId, CropVnum, Direction, EmpireVnum, Exit, ObjId, ResetCommand, Resource,
    RoomAffect, RoomVnum, ScriptState, SectorVnum,
};
use crate::world::vehicles::VehicleId;

/// Building / vehicle-interior / adventure data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComplexData {
    pub building: Option<BuildingVnum>,
    pub template: Option<i32>,
    pub(crate) exits: Vec<Exit>,
    pub entrance: Option<Direction>,
    pub patron: Option<i32>,
    /// Unix time the building burns down, while on fire.
    pub burn_down_time: Option<i64>,
    pub damage: f64,
    pub private_owner: Option<i32>,
    pub paint_color: i32,
    pub resources: Vec<Resource>,
    pub built_with: Vec<Resource>,
    /// Interior rooms whose home is this room.
    pub inside_rooms: i32,
}

impl ComplexData {
    pub fn exits(&self) -> &[Exit] {
        &self.exits
    }

    pub fn find_exit(&self, dir: Direction) -> Option<&Exit> {
        self.exits.iter().find(|ex| ex.dir == dir)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    pub vnum: RoomVnum,
    pub sector: SectorVnum,
    pub base_sector: SectorVnum,
    pub crop: Option<CropVnum>,
    pub owner: Option<EmpireVnum>,
    pub home_room: RoomVnum,
    pub complex: Option<ComplexData>,
    pub shared: SharedRef,
    pub affects: Vec<RoomAffect>,
    pub script: ScriptState,
    pub resets: Vec<ResetCommand>,
    pub people: Vec<CharId>,
    pub contents: Vec<ObjId>,
    pub vehicles: Vec<VehicleId>,
    /// Resident workforce counted toward empire population.
    pub population: u32,
    pub instance_id: Option<i32>,
    /// Character currently editing this room's description.
    pub editor: Option<CharId>,
    /// Home room vanished without repair; delete on the next orphan sweep.
    pub auto_delete: bool,
    /// Last objects/vehicles pack written for this room was non-empty.
    pub has_pack: bool,
    pub(crate) unload_event: Option<EventId>,
}

impl Room {
    pub fn new(vnum: RoomVnum, sector: SectorVnum, base_sector: SectorVnum, shared: SharedRef) -> Self {
        Self {
            vnum,
            sector,
            base_sector,
            crop: None,
            owner: None,
            home_room: vnum,
            complex: None,
            shared,
            affects: Vec::new(),
            script: ScriptState::default(),
            resets: Vec::new(),
            people: Vec::new(),
            contents: Vec::new(),
            vehicles: Vec::new(),
            population: 0,
            instance_id: None,
            editor: None,
            auto_delete: false,
            has_pack: false,
            unload_event: None,
        }
    }

    /// Rooms that are their own home count toward territory.
    pub fn belongs_in_territory(&self) -> bool {
        self.home_room == self.vnum
    }

    pub fn building(&self) -> Option<BuildingVnum> {
        self.complex.as_ref().and_then(|c| c.building)
    }

    pub fn exits(&self) -> &[Exit] {
        self.complex.as_ref().map(|c| c.exits()).unwrap_or(&[])
    }

    pub fn unload_event(&self) -> Option<EventId> {
        self.unload_event
    }
}

#[derive(Debug)]
pub struct RoomTable {
    rooms: BTreeMap<RoomVnum, Room>,
    /// target → (source → number of exits from source into target)
    exits_to: HashMap<RoomVnum, BTreeMap<RoomVnum, u32>>,
    map_size: RoomVnum,
    max_vnum: RoomVnum,
    last_free: RoomVnum,
}

impl RoomTable {
    pub fn new(map_size: RoomVnum, max_vnum: RoomVnum) -> Self {
        Self {
            rooms: BTreeMap::new(),
            exits_to: HashMap::new(),
            map_size,
            max_vnum: max_vnum.max(map_size),
            last_free: map_size - 1,
        }
    }

    pub fn get(&self, vnum: RoomVnum) -> Option<&Room> {
        self.rooms.get(&vnum)
    }

    pub fn get_mut(&mut self, vnum: RoomVnum) -> Option<&mut Room> {
        self.rooms.get_mut(&vnum)
    }

    pub fn contains(&self, vnum: RoomVnum) -> bool {
        self.rooms.contains_key(&vnum)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    pub fn vnums(&self) -> Vec<RoomVnum> {
        self.rooms.keys().copied().collect()
    }

    pub fn interior_vnums(&self) -> Vec<RoomVnum> {
        self.rooms.range(self.map_size..).map(|(v, _)| *v).collect()
    }

    pub fn interior_count(&self) -> usize {
        self.rooms.range(self.map_size..).count()
    }

    pub fn insert(&mut self, room: Room) {
        let vnum = room.vnum;
        let targets: Vec<RoomVnum> = room.exits().iter().map(|ex| ex.to_room).collect();
        if let Some(old) = self.rooms.insert(vnum, room) {
            for ex in old.exits() {
                self.unindex_exit(vnum, ex.to_room);
            }
        }
        for target in targets {
            self.index_exit(vnum, target);
        }
    }

    /// Remove a room, dropping its own exits from the reverse index.
    pub fn remove(&mut self, vnum: RoomVnum) -> Option<Room> {
        let room = self.rooms.remove(&vnum)?;
        for ex in room.exits() {
            self.unindex_exit(vnum, ex.to_room);
        }
        Some(room)
    }

    fn index_exit(&mut self, from: RoomVnum, to: RoomVnum) {
        *self.exits_to.entry(to).or_default().entry(from).or_insert(0) += 1;
    }

    fn unindex_exit(&mut self, from: RoomVnum, to: RoomVnum) {
        if let Some(sources) = self.exits_to.get_mut(&to) {
            if let Some(count) = sources.get_mut(&from) {
                *count -= 1;
                if *count == 0 {
                    sources.remove(&from);
                }
            }
            if sources.is_empty() {
                self.exits_to.remove(&to);
            }
        }
    }

    /// Create or retarget the exit `dir` of `from`. Requires complex data.
    pub fn set_exit(&mut self, from: RoomVnum, exit: Exit) -> bool {
        let Some(complex) = self.rooms.get_mut(&from).and_then(|r| r.complex.as_mut()) else {
            return false;
        };
        let new_target = exit.to_room;
        let old_target = match complex.exits.iter_mut().find(|ex| ex.dir == exit.dir) {
            Some(existing) => Some(std::mem::replace(existing, exit).to_room),
            None => {
                complex.exits.push(exit);
                complex.exits.sort_by_key(|ex| ex.dir.code());
                None
            }
        };
        if let Some(old) = old_target {
            self.unindex_exit(from, old);
        }
        self.index_exit(from, new_target);
        true
    }

    pub fn remove_exit(&mut self, from: RoomVnum, dir: Direction) -> Option<Exit> {
        let complex = self.rooms.get_mut(&from)?.complex.as_mut()?;
        let pos = complex.exits.iter().position(|ex| ex.dir == dir)?;
        let exit = complex.exits.remove(pos);
        self.unindex_exit(from, exit.to_room);
        Some(exit)
    }

    /// Drop every exit leaving `from`.
    pub fn clear_exits(&mut self, from: RoomVnum) {
        let exits = match self.rooms.get_mut(&from).and_then(|r| r.complex.as_mut()) {
            Some(complex) => std::mem::take(&mut complex.exits),
            None => return,
        };
        for ex in exits {
            self.unindex_exit(from, ex.to_room);
        }
    }

    /// Number of exits in other rooms that lead into `target`.
    pub fn exits_here(&self, target: RoomVnum) -> u32 {
        self.exits_to
            .get(&target)
            .map(|sources| sources.values().sum())
            .unwrap_or(0)
    }

    pub fn rooms_with_exits_to(&self, target: RoomVnum) -> Vec<RoomVnum> {
        self.exits_to
            .get(&target)
            .map(|sources| sources.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Remove every exit that targets `target`; returns the (room, dir) pairs removed.
    pub fn remove_exits_to(&mut self, target: RoomVnum) -> Vec<(RoomVnum, Direction)> {
        let mut removed = Vec::new();
        for source in self.rooms_with_exits_to(target) {
            let dirs: Vec<Direction> = self
                .rooms
                .get(&source)
                .map(|r| {
                    r.exits()
                        .iter()
                        .filter(|ex| ex.to_room == target)
                        .map(|ex| ex.dir)
                        .collect()
                })
                .unwrap_or_default();
            for dir in dirs {
                if self.remove_exit(source, dir).is_some() {
                    removed.push((source, dir));
                }
            }
        }
        removed
    }

    /// Linear search for an unused interior vnum starting after the last hit,
    /// wrapping once back to the start of the interior range.
    pub fn find_free_vnum(&mut self) -> Result<RoomVnum, WorldError> {
        let start = (self.last_free + 1).max(self.map_size);
        let found = (start..=self.max_vnum)
            .chain(self.map_size..start)
            .find(|vnum| !self.rooms.contains_key(vnum));
        match found {
            Some(vnum) => {
                self.last_free = vnum;
                Ok(vnum)
            }
            None => Err(WorldError::VnumExhausted {
                min: self.map_size,
                max: self.max_vnum,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::types::ExitFlags;

    fn interior(vnum: RoomVnum) -> Room {
        let mut room = Room::new(vnum, 12, 12, SharedRef::Ocean);
        room.complex = Some(ComplexData::default());
        room
    }

    fn exit(dir: Direction, to_room: RoomVnum) -> Exit {
        Exit {
            dir,
            to_room,
            keyword: None,
            flags: ExitFlags::empty(),
        }
    }

    #[test]
    fn reverse_index_follows_exit_changes() {
        let mut table = RoomTable::new(100, 200);
        table.insert(interior(100));
        table.insert(interior(101));
        table.insert(interior(102));
        assert!(table.set_exit(101, exit(Direction::North, 100)));
        assert!(table.set_exit(102, exit(Direction::East, 100)));
        assert!(table.set_exit(102, exit(Direction::West, 100)));
        assert_eq!(table.exits_here(100), 3);
        assert_eq!(table.rooms_with_exits_to(100), vec![101, 102]);

        // retarget one exit elsewhere
        assert!(table.set_exit(102, exit(Direction::West, 101)));
        assert_eq!(table.exits_here(100), 2);
        assert_eq!(table.exits_here(101), 1);

        let removed = table.remove_exits_to(100);
        assert_eq!(removed.len(), 2);
        assert_eq!(table.exits_here(100), 0);
        assert_eq!(table.get(102).map(|r| r.exits().len()), Some(1));
    }

    #[test]
    fn removing_a_room_unindexes_its_exits() {
        let mut table = RoomTable::new(100, 200);
        table.insert(interior(100));
        table.insert(interior(101));
        table.set_exit(101, exit(Direction::Up, 100));
        table.remove(101);
        assert_eq!(table.exits_here(100), 0);
    }

    #[test]
    fn exits_need_complex_data() {
        let mut table = RoomTable::new(100, 200);
        table.insert(Room::new(5, 0, 0, SharedRef::Ocean));
        assert!(!table.set_exit(5, exit(Direction::North, 6)));
    }

    #[test]
    fn free_vnum_search_wraps_once_then_fails() {
        let mut table = RoomTable::new(10, 12);
        assert_eq!(table.find_free_vnum().expect("free"), 10);
        table.insert(interior(10));
        assert_eq!(table.find_free_vnum().expect("free"), 11);
        table.insert(interior(11));
        assert_eq!(table.find_free_vnum().expect("free"), 12);
        table.insert(interior(12));
        table.remove(10);
        assert_eq!(table.find_free_vnum().expect("wraps"), 10);
        table.insert(interior(10));
        assert!(matches!(
            table.find_free_vnum(),
            Err(WorldError::VnumExhausted { min: 10, max: 12 })
        ));
    }
}
