//! The world loop: one owner of the [`World`] driven by a tokio interval.
//!
//! Each tick fires due events, applies queued [`WorldCommand`]s, flushes
//! requested saves, runs the annual update when it is due, sweeps orphaned
//! interiors and appends mapout lines. Everything runs on the loop task, so
//! the world itself needs no locking.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Result};
use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::metrics;
use crate::storage::backup::{BackupManager, BackupMetadata, BackupType};
use crate::storage::{SaveReport, WorldStore};
use crate::world::annual::AnnualReport;
use crate::world::catalog::Catalog;
use crate::world::types::{BuildingVnum, EmpireVnum, RoomVnum, SectorVnum};
use crate::world::World;

/// Requests from sessions and admin tools, applied on the next tick.
#[derive(Debug, Clone, PartialEq)]
pub enum WorldCommand {
    ChangeTerrain {
        vnum: RoomVnum,
        sector: SectorVnum,
        base: Option<SectorVnum>,
    },
    ClaimRoom {
        vnum: RoomVnum,
        empire: EmpireVnum,
    },
    AbandonRoom {
        vnum: RoomVnum,
    },
    ConstructBuilding {
        vnum: RoomVnum,
        building: BuildingVnum,
        complete: bool,
    },
    StartBurning {
        vnum: RoomVnum,
    },
    Extinguish {
        vnum: RoomVnum,
    },
    FoundCity {
        empire: EmpireVnum,
        vnum: RoomVnum,
        name: String,
        radius: i32,
    },
    /// Full resave on the next tick.
    SaveWorld,
    /// Run the annual update now, regardless of the schedule.
    AnnualUpdate,
    Shutdown,
}

/// What a single tick did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub events_fired: usize,
    pub commands: usize,
    pub saves: SaveReport,
    pub annual: Option<AnnualReport>,
    pub orphans_deleted: usize,
    pub mapout_lines: usize,
}

/// Every sector the config names must exist in the catalog.
pub fn check_catalog(config: &Config, catalog: &Catalog) -> Result<()> {
    let w = &config.world;
    let named = [
        ("basic_ocean_sector", w.basic_ocean_sector),
        ("default_land_sector", w.default_land_sector),
        ("default_inside_sector", w.default_inside_sector),
        ("building_sector", w.building_sector),
    ];
    for (key, vnum) in named {
        if catalog.sector(vnum).is_none() {
            return Err(anyhow!("world.{} = {} is not a catalog sector", key, vnum));
        }
    }
    Ok(())
}

/// Read the configured JSON catalog, or fall back to the built-in one.
pub fn load_catalog(config: &Config) -> Result<Catalog> {
    let catalog = match &config.storage.catalog_file {
        Some(path) => Catalog::load_json(Path::new(path))
            .map_err(|e| anyhow!("Failed to load catalog {}: {}", path, e))?,
        None => Catalog::builtin(),
    };
    check_catalog(config, &catalog)?;
    Ok(catalog)
}

pub struct WorldServer {
    config: Config,
    world: World,
    store: WorldStore,
    backups: Option<BackupManager>,
    command_tx: mpsc::UnboundedSender<WorldCommand>,
    command_rx: mpsc::UnboundedReceiver<WorldCommand>,
    last_orphan_sweep: i64,
    save_requested: bool,
    shutdown_requested: bool,
}

impl WorldServer {
    /// Open the data directory, load the world and take a full save when the
    /// load asked for one.
    pub async fn new(config: Config) -> Result<Self> {
        let catalog = load_catalog(&config)?;
        let mut store = WorldStore::open(&config.storage.data_dir)?;
        let world = store.load_world(config.clone(), catalog)?;
        let mut server = Self::from_parts(config, world, store)?;
        if server.world.save_world_after_startup {
            info!("Writing a full save after startup");
            server.save_all()?;
        }
        Ok(server)
    }

    /// Wrap an already loaded world.
    pub fn from_parts(config: Config, world: World, store: WorldStore) -> Result<Self> {
        let backups = if config.backup.enabled {
            Some(BackupManager::from_config(store.data_dir(), &config.backup)?)
        } else {
            None
        };
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let now = world.now();
        Ok(Self {
            config,
            world,
            store,
            backups,
            command_tx,
            command_rx,
            last_orphan_sweep: now,
            save_requested: false,
            shutdown_requested: false,
        })
    }

    pub fn command_sender(&self) -> mpsc::UnboundedSender<WorldCommand> {
        self.command_tx.clone()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn store(&self) -> &WorldStore {
        &self.store
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    /// Run until Ctrl-C or a [`WorldCommand::Shutdown`], then save.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            "World loop started: {}x{} map, tick {} ms",
            self.config.world.width, self.config.world.height, self.config.game.tick_ms
        );
        let mut interval = tokio::time::interval(Duration::from_millis(self.config.game.tick_ms));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.tick();
                    if report.events_fired > 0 || report.commands > 0 {
                        debug!("Tick: {:?}", report);
                    }
                    if self.shutdown_requested {
                        break;
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl-C");
                    break;
                },
            }
        }
        self.shutdown()
    }

    /// One pass of the loop body.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport {
            events_fired: self.world.process_due_events(),
            ..TickReport::default()
        };

        while let Ok(command) = self.command_rx.try_recv() {
            report.commands += 1;
            if let Err(e) = self.apply_command(command) {
                warn!("World command failed: {}", e);
            }
        }

        if std::mem::take(&mut self.save_requested) {
            match self.save_all() {
                Ok(saves) => report.saves = saves,
                Err(e) => error!("Full save failed: {}", e),
            }
        } else {
            report.saves = self.store.perform_requested_world_saves(&mut self.world);
        }

        match self.annual_update_due() {
            Ok(true) => match self.run_annual_update() {
                Ok(annual) => report.annual = Some(annual),
                Err(e) => error!("Annual update failed: {}", e),
            },
            Ok(false) => {}
            Err(e) => error!("Could not read the annual update stamp: {}", e),
        }

        let now = self.world.now();
        if now - self.last_orphan_sweep >= self.config.game.orphan_sweep_secs as i64 {
            self.last_orphan_sweep = now;
            report.orphans_deleted = self.world.delete_orphaned_rooms();
        }

        match self.store.write_mapout(&mut self.world) {
            Ok(lines) => report.mapout_lines = lines,
            Err(e) => error!("Failed to write mapout: {}", e),
        }
        report
    }

    pub fn apply_command(&mut self, command: WorldCommand) -> Result<()> {
        let applied = match command {
            WorldCommand::ChangeTerrain { vnum, sector, base } => {
                self.world.change_terrain(vnum, sector, base)
            }
            WorldCommand::ClaimRoom { vnum, empire } => self.world.claim_room(vnum, empire),
            WorldCommand::AbandonRoom { vnum } => self.world.abandon_room(vnum),
            WorldCommand::ConstructBuilding {
                vnum,
                building,
                complete,
            } => self.world.construct_building(vnum, building, complete),
            WorldCommand::StartBurning { vnum } => self.world.start_burning(vnum),
            WorldCommand::Extinguish { vnum } => self.world.extinguish(vnum),
            WorldCommand::FoundCity {
                empire,
                vnum,
                name,
                radius,
            } => {
                self.world.found_city(empire, vnum, &name, radius)?;
                true
            }
            WorldCommand::SaveWorld => {
                self.save_requested = true;
                true
            }
            WorldCommand::AnnualUpdate => {
                self.run_annual_update()?;
                true
            }
            WorldCommand::Shutdown => {
                self.shutdown_requested = true;
                true
            }
        };
        if !applied {
            debug!("World command had no effect");
        }
        Ok(())
    }

    /// The first start only records a stamp; the update runs one interval later.
    fn annual_update_due(&mut self) -> Result<bool> {
        let now = self.world.now();
        match self.store.last_annual_update()? {
            Some(last) => Ok(now - last >= self.config.game.annual_interval_secs()),
            None => {
                self.store.set_last_annual_update(now)?;
                Ok(false)
            }
        }
    }

    /// Back up (when configured), run the annual update, then flush what it changed.
    pub fn run_annual_update(&mut self) -> Result<AnnualReport> {
        if self.config.backup.before_annual {
            self.create_backup(None, BackupType::BeforeAnnual)?;
        }
        let report = self.world.annual_world_update();
        self.store.set_last_annual_update(self.world.now())?;
        self.store.perform_requested_world_saves(&mut self.world);
        Ok(report)
    }

    /// Rewrite every world file.
    pub fn save_all(&mut self) -> Result<SaveReport> {
        if self.config.backup.before_full_save && self.store.has_map() {
            self.create_backup(None, BackupType::BeforeFullSave)?;
        }
        Ok(self.store.save_whole_world(&mut self.world)?)
    }

    /// Pending saves are flushed first so the archive matches memory.
    /// Returns `None` when backups are disabled.
    pub fn create_backup(
        &mut self,
        name: Option<String>,
        backup_type: BackupType,
    ) -> Result<Option<BackupMetadata>> {
        if self.backups.is_none() {
            return Ok(None);
        }
        self.store.perform_requested_world_saves(&mut self.world);
        let Some(backups) = self.backups.as_mut() else {
            return Ok(None);
        };
        let meta = backups.create_backup(name, backup_type)?;
        let removed = backups.apply_retention_policy()?;
        if !removed.is_empty() {
            debug!("Retention removed {} old backups", removed.len());
        }
        Ok(Some(meta))
    }

    pub fn show_status(&self) -> Result<()> {
        let world = &self.world;
        println!("=== Empireworld Status ===");
        println!("Data directory: {}", self.store.data_dir().display());
        println!("Map: {}x{} ({} land tiles)", world.map().width(), world.map().height(), world.map().land_count());
        println!("Loaded rooms: {}", world.rooms().len());
        println!("Interior rooms: {}", world.rooms().interior_count());
        println!("Empires: {}", world.empires().len());
        println!("Vehicles: {}", world.vehicles().len());
        println!("Pending events: {}", world.events().len());
        match self.store.last_annual_update()? {
            Some(ts) => match chrono::DateTime::from_timestamp(ts, 0) {
                Some(dt) => println!("Last annual update: {}", dt.format("%Y-%m-%d %H:%M:%SZ")),
                None => println!("Last annual update: {}", ts),
            },
            None => println!("Last annual update: never"),
        }
        if let Some(backups) = &self.backups {
            println!("Backups: {} ({} bytes)", backups.len(), backups.total_bytes());
        }
        let m = metrics::snapshot();
        println!("Rooms loaded this run: {}", m.rooms_loaded);
        Ok(())
    }

    /// Flush everything still queued.
    pub fn shutdown(&mut self) -> Result<()> {
        info!("Shutting down world loop...");
        self.world.set_shutting_down(true);
        let report = self.store.perform_requested_world_saves(&mut self.world);
        if let Err(e) = self.store.write_mapout(&mut self.world) {
            warn!("Failed to write mapout during shutdown: {}", e);
        }
        if report.failures > 0 {
            return Err(anyhow!("{} writes failed during the shutdown save", report.failures));
        }
        info!("Shutdown save complete: {} rooms written", report.room_files);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::test_support::small_config;
    use crate::world::Clock;
    use tempfile::TempDir;

    fn server_in(dir: &TempDir) -> WorldServer {
        let mut config = small_config();
        config.storage.data_dir = dir.path().join("data").to_string_lossy().into_owned();
        config.backup.before_annual = false;
        let mut store = WorldStore::open(&config.storage.data_dir).expect("store");
        let world = store
            .load_world_at(config.clone(), Catalog::builtin(), Clock::Fixed(1_700_000_000))
            .expect("load");
        WorldServer::from_parts(config, world, store).expect("server")
    }

    #[test]
    fn catalog_check_rejects_missing_building_sector() {
        let mut config = small_config();
        config.world.building_sector = 999;
        assert!(check_catalog(&config, &Catalog::builtin()).is_err());
        assert!(check_catalog(&small_config(), &Catalog::builtin()).is_ok());
    }

    #[test]
    fn queued_commands_apply_on_the_next_tick() {
        let dir = TempDir::new().expect("tempdir");
        let mut server = server_in(&dir);
        let tx = server.command_sender();
        tx.send(WorldCommand::ChangeTerrain {
            vnum: 45,
            sector: 1,
            base: None,
        })
        .expect("send");
        tx.send(WorldCommand::Shutdown).expect("send");

        let report = server.tick();
        assert_eq!(report.commands, 2);
        assert_eq!(server.world().sector_of(45), Some(1));
        assert_eq!(report.mapout_lines, 1);
        assert!(server.is_shutdown_requested());
        assert!(server.world().saves().is_empty());
    }

    #[test]
    fn annual_update_waits_one_interval_after_first_start() {
        let dir = TempDir::new().expect("tempdir");
        let mut server = server_in(&dir);
        assert!(server.tick().annual.is_none());
        assert_eq!(server.store().last_annual_update().expect("stamp"), Some(1_700_000_000));

        let interval = server.config.game.annual_interval_secs();
        server.world_mut().advance_clock(interval);
        assert!(server.tick().annual.is_some());
        assert_eq!(
            server.store().last_annual_update().expect("stamp"),
            Some(1_700_000_000 + interval)
        );
        assert!(server.tick().annual.is_none());
    }

    #[test]
    fn save_command_writes_the_map() {
        let dir = TempDir::new().expect("tempdir");
        let mut server = server_in(&dir);
        server.command_sender().send(WorldCommand::SaveWorld).expect("send");
        let report = server.tick();
        assert_eq!(report.saves.map_records, 400);
        assert!(server.store().has_map());
    }
}
