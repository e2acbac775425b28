//! # Storage Module - World Persistence
//!
//! Everything the world engine keeps on disk, under one data directory:
//!
//! ```text
//! data/
//! ├── .lock                ← held exclusively while a process owns the world
//! ├── map.bin              ← one fixed record per map tile (see [`map_file`])
//! ├── world_index.bin      ← one byte per vnum saying what else is stored
//! ├── world/<n>/<vnum>.wld ← text room files, n = vnum / 100 (see [`room_file`])
//! ├── packs/<vnum>.pack    ← vehicles and objects in a room
//! ├── empires/             ← sled database: empires, islands, timestamps
//! ├── mapout.txt           ← changed tiles for external map renderers
//! └── backups/             ← archives made by [`backup::BackupManager`]
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use empireworld::config::Config;
//! use empireworld::storage::WorldStore;
//! use empireworld::world::catalog::Catalog;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let mut store = WorldStore::open(&config.storage.data_dir)?;
//!     let mut world = store.load_world(config, Catalog::builtin())?;
//!
//!     world.change_terrain(42, 1, None);
//!     store.perform_requested_world_saves(&mut world);
//!     Ok(())
//! }
//! ```
//!
//! Saves are requested through `World::request_world_save` and flushed once
//! per tick by [`WorldStore::perform_requested_world_saves`]. A failed write
//! is logged and skipped; it never aborts the flush.

pub mod backup;
pub mod empire_store;
pub mod map_file;
pub mod pack_file;
pub mod room_file;
pub mod save_queue;
pub mod world_index;

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use fs2::FileExt;
use log::{debug, error, info, warn};

use crate::config::Config;
use crate::logutil::room_text;
use crate::metrics;
use crate::syserr;
use crate::world::catalog::Catalog;
use crate::world::empire::{EmpireRecord, IslandRecord};
use crate::world::errors::WorldError;
use crate::world::room::Room;
use crate::world::shared::SharedRef;
use crate::world::types::{RoomVnum, SectorVnum};
use crate::world::{Clock, World};

use empire_store::EmpireStore;
use map_file::{MapRecord, MAP_VERSION};
use pack_file::{PackRecord, PACK_SCHEMA_VERSION};
use room_file::{RoomFileEntry, RoomText, SharedText};
use save_queue::SaveBits;
use world_index::{IndexFlags, WorldIndex};

const LOCK_FILE: &str = ".lock";
const MAP_FILE: &str = "map.bin";
const INDEX_FILE: &str = "world_index.bin";
const ROOM_DIR: &str = "world";
const PACK_DIR: &str = "packs";
const EMPIRE_DIR: &str = "empires";
const MAPOUT_FILE: &str = "mapout.txt";

/// Rooms per `world/<n>/` bucket directory.
const ROOMS_PER_DIR: RoomVnum = 100;

/// Passes over the save queue before giving up on side effects that keep
/// re-requesting saves.
const MAX_FLUSH_PASSES: usize = 4;

/// What one flush of the save queue wrote.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub vnums: usize,
    pub map_records: usize,
    pub room_files: usize,
    pub packs: usize,
    pub empires: usize,
    pub failures: usize,
}

/// What a load found on disk.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub map_found: bool,
    pub custom_tiles: usize,
    pub room_files: usize,
    pub packs: usize,
    pub empires: usize,
    pub islands: usize,
}

/// Write `bytes` to a unique temp file beside `path`, fsync it, then rename
/// it over `path` and fsync the directory.
fn write_file_atomic(path: &Path, bytes: &[u8]) -> Result<(), WorldError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let base = path.file_name().and_then(|s| s.to_str()).unwrap_or("world");
    let mut counter = 0u32;
    let tmp_path = loop {
        let candidate = dir.join(format!(".{}.tmp-{}-{}", base, std::process::id(), counter));
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(mut tmp) => {
                tmp.write_all(bytes)?;
                tmp.flush()?;
                let _ = tmp.sync_all();
                break candidate;
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                counter = counter.saturating_add(1);
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    };
    fs::rename(&tmp_path, path)?;
    if let Ok(dir_file) = File::open(dir) {
        let _ = dir_file.sync_all();
    }
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<bool, WorldError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Owner of one world data directory.
pub struct WorldStore {
    data_dir: PathBuf,
    _lock: File,
    index: WorldIndex,
    empires: EmpireStore,
}

impl std::fmt::Debug for WorldStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldStore")
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

impl WorldStore {
    /// Open (or create) a data directory and take its exclusive lock.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, WorldError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(data_dir.join(ROOM_DIR))?;
        fs::create_dir_all(data_dir.join(PACK_DIR))?;

        let lock = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(data_dir.join(LOCK_FILE))?;
        lock.try_lock_exclusive().map_err(|_| {
            WorldError::InvalidOperation(format!(
                "world data in {} is locked by another process",
                data_dir.display()
            ))
        })?;

        let index_path = data_dir.join(INDEX_FILE);
        let index = if index_path.exists() {
            WorldIndex::read(&index_path)?
        } else {
            WorldIndex::new()
        };
        let empires = EmpireStore::open(data_dir.join(EMPIRE_DIR))?;
        debug!("Opened world store at {}", data_dir.display());
        Ok(Self {
            data_dir,
            _lock: lock,
            index,
            empires,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn map_path(&self) -> PathBuf {
        self.data_dir.join(MAP_FILE)
    }

    fn index_path(&self) -> PathBuf {
        self.data_dir.join(INDEX_FILE)
    }

    pub fn room_path(&self, vnum: RoomVnum) -> PathBuf {
        self.data_dir
            .join(ROOM_DIR)
            .join((vnum / ROOMS_PER_DIR).to_string())
            .join(format!("{}.wld", vnum))
    }

    pub fn pack_path(&self, vnum: RoomVnum) -> PathBuf {
        self.data_dir.join(PACK_DIR).join(format!("{}.pack", vnum))
    }

    pub fn mapout_path(&self) -> PathBuf {
        self.data_dir.join(MAPOUT_FILE)
    }

    pub fn has_map(&self) -> bool {
        self.map_path().exists()
    }

    pub fn empire_store(&self) -> &EmpireStore {
        &self.empires
    }

    pub fn last_annual_update(&self) -> Result<Option<i64>, WorldError> {
        self.empires.last_annual_update()
    }

    pub fn set_last_annual_update(&self, when: i64) -> Result<(), WorldError> {
        self.empires.set_last_annual_update(when)
    }

    // ---------------------------------------------------------------- load

    /// Build a world from disk. A missing map file yields a fresh ocean
    /// world flagged for a full save.
    pub fn load_world(&mut self, config: Config, catalog: Catalog) -> Result<World, WorldError> {
        self.load_world_at(config, catalog, Clock::System)
    }

    /// Load with an explicit clock; timers already past it fire on the first tick.
    pub fn load_world_at(
        &mut self,
        config: Config,
        catalog: Catalog,
        clock: Clock,
    ) -> Result<World, WorldError> {
        let started = Instant::now();
        let mut world = World::new(config, catalog).with_clock(clock);
        world.saves.set_blocked(true);
        let mut report = LoadReport::default();

        if self.has_map() {
            report.map_found = true;
            report.custom_tiles = self.load_map(&mut world)?;
        } else {
            info!("No map file in {}; starting a fresh world", self.data_dir.display());
            world.save_world_after_startup = true;
        }

        let entries: Vec<(RoomVnum, IndexFlags)> = self.index.iter().collect();
        for (vnum, flags) in &entries {
            if flags.intersects(IndexFlags::ROOM | IndexFlags::MAP_TEXT) {
                self.load_room_file(&mut world, *vnum)?;
                report.room_files += 1;
            }
        }
        // vehicles may sit in rooms loaded from any file, so packs go last
        for (vnum, flags) in &entries {
            if flags.contains(IndexFlags::PACK) {
                self.load_pack(&mut world, *vnum)?;
                report.packs += 1;
            }
        }

        for island in self.empires.list_islands()? {
            world.empires.insert_island(island);
            report.islands += 1;
        }
        for empire in self.empires.list_empires()? {
            world.empires.insert(empire);
            report.empires += 1;
        }
        // freshly inserted empires are not dirty
        world.empires.take_dirty();

        world.finalize_load();
        world.saves.set_blocked(false);
        world.saves.clear();
        info!(
            "Loaded world from {} in {} ms: {:?}",
            self.data_dir.display(),
            started.elapsed().as_millis(),
            report
        );
        Ok(world)
    }

    fn checked_sector(world: &World, vnum: RoomVnum, sect: SectorVnum, fallback: SectorVnum) -> SectorVnum {
        if world.catalog.sector(sect).is_some() {
            return sect;
        }
        syserr!("room {} has unknown sector {}; using {}", vnum, sect, fallback);
        fallback
    }

    /// Apply every map record. Returns how many tiles got a private shared block.
    fn load_map(&self, world: &mut World) -> Result<usize, WorldError> {
        let path = self.map_path();
        let (header, records) = map_file::read_map(&path)?;
        if header.width != world.map.width() || header.height != world.map.height() {
            return Err(WorldError::InvalidOperation(format!(
                "map file is {}x{} but the world is configured as {}x{}",
                header.width,
                header.height,
                world.map.width(),
                world.map.height()
            )));
        }
        if header.version != MAP_VERSION {
            warn!(
                "Map file version {} differs from {}; scheduling a full resave",
                header.version, MAP_VERSION
            );
            world.save_world_after_startup = true;
        }

        let ocean = world.config.world.basic_ocean_sector;
        let land = world.config.world.default_land_sector;
        let mut custom = 0;
        for (idx, record) in records.iter().enumerate() {
            let vnum = idx as RoomVnum;
            let sector = Self::checked_sector(world, vnum, record.sector, land);
            let base = Self::checked_sector(world, vnum, record.base_sector, land);
            let natural = Self::checked_sector(world, vnum, record.natural_sector, sector);
            let shared = if record.is_plain_ocean(ocean) {
                SharedRef::Ocean
            } else {
                custom += 1;
                world.shared_data.alloc(record.shared_data())
            };
            let Some(tile) = world.map.tile_mut(vnum) else {
                continue;
            };
            tile.sector = sector;
            tile.base_sector = base;
            tile.natural_sector = natural;
            tile.crop = record.crop();
            tile.shared = shared;
            tile.sector_time = i64::from(record.sector_time);
            tile.flags = record.flags();
            if sector != ocean {
                world.sectors.move_current(vnum, ocean, sector);
            }
            if base != ocean {
                world.sectors.move_base(vnum, ocean, base);
            }
        }
        debug!("Map file: {} tiles, {} customized", records.len(), custom);
        Ok(custom)
    }

    fn load_room_file(&self, world: &mut World, vnum: RoomVnum) -> Result<(), WorldError> {
        let path = self.room_path(vnum);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Index lists {} but {} is missing", vnum, path.display());
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let entry = room_file::parse_entry(&path, &text, world.now())?;
        if entry.vnum != vnum {
            return Err(WorldError::corrupt(
                &path,
                1,
                format!("file holds room {} instead of {}", entry.vnum, vnum),
            ));
        }
        if world.is_map_vnum(vnum) {
            self.install_map_entry(world, entry);
        } else {
            self.install_interior(world, entry);
        }
        Ok(())
    }

    fn install_map_entry(&self, world: &mut World, entry: RoomFileEntry) {
        let vnum = entry.vnum;
        if let Some(shared) = world.shared_for_write(vnum) {
            entry.shared.apply(shared, false);
        }
        let Some(text) = entry.room else {
            return;
        };
        let Some(tile) = world.map.tile(vnum) else {
            return;
        };
        if text.sector != tile.sector || text.base_sector != tile.base_sector {
            syserr!(
                "room file for {} says sector {}/{} but the map has {}/{}",
                vnum,
                text.sector,
                text.base_sector,
                tile.sector,
                tile.base_sector
            );
        }
        let mut room = Room::new(vnum, tile.sector, tile.base_sector, tile.shared);
        room.crop = tile.crop;
        text.fill(&mut room);
        world.rooms.insert(room);
        if let Some(tile) = world.map.tile_mut(vnum) {
            tile.room_loaded = true;
        }
        world.schedule_unload_check(vnum);
        metrics::inc_rooms_loaded();
    }

    fn install_interior(&self, world: &mut World, entry: RoomFileEntry) {
        let vnum = entry.vnum;
        let Some(text) = entry.room else {
            syserr!("map-only entry for interior vnum {}; ignored", vnum);
            return;
        };
        let inside = world.config.world.default_inside_sector;
        let sector = Self::checked_sector(world, vnum, text.sector, inside);
        let base = Self::checked_sector(world, vnum, text.base_sector, sector);
        let mut data = crate::world::shared::SharedRoomData::default();
        entry.shared.apply(&mut data, true);
        let shared = world.shared_data.alloc(data);
        let mut room = Room::new(vnum, sector, base, shared);
        room.crop = text.crop;
        text.fill(&mut room);
        world.rooms.insert(room);
        world.sectors.add(vnum, sector, base);
        if let Some(name) = world.shared(vnum).and_then(|s| s.name.clone()) {
            debug!("Loaded interior {} \"{}\"", vnum, room_text(&name));
        }
    }

    fn load_pack(&self, world: &mut World, vnum: RoomVnum) -> Result<(), WorldError> {
        let path = self.pack_path(vnum);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Index lists a pack for {} but {} is missing", vnum, path.display());
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let pack: PackRecord = bincode::deserialize(&bytes)?;
        if pack.schema_version != PACK_SCHEMA_VERSION {
            return Err(WorldError::SchemaMismatch {
                entity: "pack",
                expected: PACK_SCHEMA_VERSION,
                found: pack.schema_version,
            });
        }
        if !world.find_or_load_room(vnum) {
            syserr!("pack for missing room {}; {} vehicles dropped", vnum, pack.vehicles.len());
            return Ok(());
        }
        let ids: Vec<_> = pack.vehicles.iter().map(|v| v.id).collect();
        for mut vehicle in pack.vehicles {
            vehicle.room = vnum;
            world.vehicles.insert(vehicle);
        }
        if let Some(room) = world.rooms.get_mut(vnum) {
            room.vehicles.extend(ids);
            room.contents.extend(pack.objects);
            room.has_pack = true;
        }
        Ok(())
    }

    // ---------------------------------------------------------------- save

    /// Drain the save queue. For each vnum the pack is written first (it may
    /// request a room save), then the map record (which forces a room save
    /// when the shared block has text data), then the room file.
    pub fn perform_requested_world_saves(&mut self, world: &mut World) -> SaveReport {
        let started = Instant::now();
        let mut report = SaveReport::default();
        let mut map_patches: Vec<(RoomVnum, MapRecord)> = Vec::new();

        for _ in 0..MAX_FLUSH_PASSES {
            let pending = world.saves.pending_vnums();
            if pending.is_empty() {
                break;
            }
            for vnum in pending {
                report.vnums += 1;
                if !world.saves.take(vnum, SaveBits::OBJECTS).is_empty() {
                    match self.save_pack(world, vnum) {
                        Ok(()) => report.packs += 1,
                        Err(e) => {
                            error!("Failed to save pack for {}: {}", vnum, e);
                            report.failures += 1;
                        }
                    }
                }
                let mut force_room = false;
                if !world.saves.take(vnum, SaveBits::MAP).is_empty() {
                    if let Some(record) = self.map_record(world, vnum) {
                        map_patches.push((vnum, record));
                        report.map_records += 1;
                    }
                    force_room = world.shared(vnum).map(|s| s.has_text_data()).unwrap_or(false);
                }
                if !world.saves.take(vnum, SaveBits::ROOM).is_empty() || force_room {
                    match self.save_room_file(world, vnum) {
                        Ok(()) => report.room_files += 1,
                        Err(e) => {
                            error!("Failed to save room file for {}: {}", vnum, e);
                            report.failures += 1;
                        }
                    }
                }
                metrics::inc_saves_flushed();
            }
        }
        if !world.saves.is_empty() {
            warn!(
                "{} vnums still queued after {} flush passes",
                world.saves.len(),
                MAX_FLUSH_PASSES
            );
        }

        if !map_patches.is_empty() {
            let result = if self.has_map() {
                map_file::patch_records(&self.map_path(), &map_patches)
            } else {
                self.write_full_map(world)
            };
            if let Err(e) = result {
                error!("Failed to write {} map records: {}", map_patches.len(), e);
                report.failures += 1;
            }
        }
        if let Err(e) = self.flush_index() {
            error!("Failed to write world index: {}", e);
            report.failures += 1;
        }
        match self.save_dirty_empires(world) {
            Ok(count) => report.empires = count,
            Err(e) => {
                error!("Failed to save empires: {}", e);
                report.failures += 1;
            }
        }

        if report.vnums > 0 || report.empires > 0 {
            metrics::observe_flush_time(started);
            debug!("World save flush: {:?}", report);
        }
        report
    }

    fn map_record(&self, world: &World, vnum: RoomVnum) -> Option<MapRecord> {
        let tile = world.map.tile(vnum)?;
        Some(MapRecord::from_tile(tile, world.shared(vnum)))
    }

    fn write_full_map(&self, world: &World) -> Result<(), WorldError> {
        let records: Vec<MapRecord> = world
            .map
            .tiles()
            .map(|tile| MapRecord::from_tile(tile, world.shared_data.get(tile.shared)))
            .collect();
        let path = self.map_path();
        let tmp = self.data_dir.join(format!(".{}.tmp-{}", MAP_FILE, std::process::id()));
        map_file::write_map(&tmp, world.map.width(), world.map.height(), &records)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn flush_index(&mut self) -> Result<(), WorldError> {
        if self.index.is_dirty() {
            let path = self.index_path();
            if self.index.flush(&path)? {
                debug!("Rewrote world index");
            }
        }
        Ok(())
    }

    fn save_dirty_empires(&self, world: &mut World) -> Result<usize, WorldError> {
        let dirty = world.empires.take_dirty();
        let mut saved = 0;
        for vnum in dirty {
            match world.empires.get(vnum) {
                Some(empire) => {
                    self.empires.put_empire(empire)?;
                    saved += 1;
                }
                None => {
                    self.empires.delete_empire(vnum)?;
                }
            }
        }
        Ok(saved)
    }

    pub fn save_empire(&self, empire: &EmpireRecord) -> Result<(), WorldError> {
        self.empires.put_empire(empire)
    }

    pub fn save_island(&self, island: &IslandRecord) -> Result<(), WorldError> {
        self.empires.put_island(island)
    }

    /// Write (or remove) the text room file for `vnum`, keeping the index current.
    fn save_room_file(&mut self, world: &mut World, vnum: RoomVnum) -> Result<(), WorldError> {
        let now = world.now();
        let path = self.room_path(vnum);
        if !world.exists(vnum) {
            remove_if_exists(&path)?;
            remove_if_exists(&self.pack_path(vnum))?;
            self.index.set(vnum, IndexFlags::all(), IndexFlags::empty());
            return Ok(());
        }

        let min_track_time = now - world.config.game.track_lifetime_secs as i64;
        if let Some(shared) = world.shared_mut(vnum) {
            shared.tracks.retain(|t| t.timestamp >= min_track_time);
        }
        let shared = world
            .shared(vnum)
            .map(|s| SharedText::from_shared(s, min_track_time))
            .unwrap_or_default();
        let has_text = world.shared(vnum).map(|s| s.has_text_data()).unwrap_or(false);
        let room = world.rooms.get(vnum).map(RoomText::from_room);
        let is_map = world.is_map_vnum(vnum);
        let room = room.filter(|r| !is_map || r.worth_saving());

        let flags = match (&room, has_text) {
            (Some(_), _) => IndexFlags::ROOM,
            (None, true) if is_map => IndexFlags::MAP_TEXT,
            _ => IndexFlags::empty(),
        };
        if flags.is_empty() {
            if remove_if_exists(&path)? {
                debug!("Removed room file for {}", vnum);
            }
        } else {
            let entry = RoomFileEntry {
                vnum,
                shared,
                room,
            };
            write_file_atomic(&path, room_file::render_entry(&entry, now).as_bytes())?;
        }
        self.index
            .set(vnum, IndexFlags::ROOM | IndexFlags::MAP_TEXT, flags);
        Ok(())
    }

    /// Write the objects/vehicles pack. A change of the room's pack flag
    /// requests a room save, which the same flush picks up.
    fn save_pack(&mut self, world: &mut World, vnum: RoomVnum) -> Result<(), WorldError> {
        let path = self.pack_path(vnum);
        let Some(room) = world.rooms.get(vnum) else {
            remove_if_exists(&path)?;
            self.index.set(vnum, IndexFlags::PACK, IndexFlags::empty());
            return Ok(());
        };
        let mut pack = PackRecord::new(vnum);
        pack.vehicles = room
            .vehicles
            .iter()
            .filter_map(|id| world.vehicles.get(*id).cloned())
            .collect();
        pack.objects = room.contents.clone();
        let had_pack = room.has_pack;
        let has_pack = !pack.is_empty();

        if has_pack {
            write_file_atomic(&path, &bincode::serialize(&pack)?)?;
            self.index.set(vnum, IndexFlags::PACK, IndexFlags::PACK);
        } else {
            remove_if_exists(&path)?;
            self.index.set(vnum, IndexFlags::PACK, IndexFlags::empty());
        }
        if had_pack != has_pack {
            if let Some(room) = world.rooms.get_mut(vnum) {
                room.has_pack = has_pack;
            }
            world.request_world_save(vnum, SaveBits::ROOM);
        }
        Ok(())
    }

    /// Rewrite every file from scratch: the whole map, every room file and
    /// pack, the index, and every empire and island.
    pub fn save_whole_world(&mut self, world: &mut World) -> Result<SaveReport, WorldError> {
        let started = Instant::now();
        let mut report = SaveReport::default();
        self.write_full_map(world)?;
        report.map_records = world.map.size() as usize;

        let mut vnums: BTreeSet<RoomVnum> = world.rooms.vnums().into_iter().collect();
        vnums.extend(
            world
                .map
                .tiles()
                .filter(|t| !t.shared.is_ocean())
                .filter(|t| world.shared_data.get(t.shared).map(|s| s.has_text_data()).unwrap_or(false))
                .map(|t| t.vnum),
        );
        // stale entries get their files removed
        vnums.extend(self.index.iter().map(|(v, _)| v));

        for vnum in vnums {
            report.vnums += 1;
            if world.rooms.contains(vnum) || self.index.get(vnum).contains(IndexFlags::PACK) {
                self.save_pack(world, vnum)?;
                report.packs += 1;
            }
            self.save_room_file(world, vnum)?;
            report.room_files += 1;
        }
        self.flush_index()?;

        for island in world.empires.islands() {
            self.empires.put_island(island)?;
        }
        for empire in world.empires.iter() {
            self.empires.put_empire(empire)?;
            report.empires += 1;
        }
        world.empires.take_dirty();
        world.saves.clear();
        world.save_world_after_startup = false;

        metrics::observe_flush_time(started);
        info!(
            "Saved whole world in {} ms: {} rooms, {} empires",
            started.elapsed().as_millis(),
            report.room_files,
            report.empires
        );
        Ok(report)
    }

    /// Append pending mapout lines (`x y icon`). Returns how many were written.
    pub fn write_mapout(&self, world: &mut World) -> Result<usize, WorldError> {
        let lines = world.take_mapout();
        if lines.is_empty() {
            return Ok(0);
        }
        let mut out = String::new();
        for (x, y, icon) in &lines {
            out.push_str(&format!("{} {} {}\n", x, y, icon));
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.mapout_path())?;
        file.write_all(out.as_bytes())?;
        Ok(lines.len())
    }
}
