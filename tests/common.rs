//! Test utilities & fixtures.
//! Every test gets its own data directory and a pinned clock.

use empireworld::config::Config;
use empireworld::storage::WorldStore;
use empireworld::world::catalog::Catalog;
use empireworld::world::{Clock, World};
use std::path::Path;

/// Clock value every fixture world starts at.
#[allow(dead_code)]
pub const NOW: i64 = 1_700_000_000;

/// A 20x20 world with a fixed RNG seed, stored under `data_dir`.
pub fn test_config(data_dir: &Path) -> Config {
    let mut config = Config::default();
    config.world.width = 20;
    config.world.height = 20;
    config.world.max_room_vnum = 1_000;
    config.world.rng_seed = Some(7);
    config.storage.data_dir = data_dir.to_string_lossy().into_owned();
    config.backup.enabled = false;
    config.logging.file = None;
    config.logging.syserr_file = None;
    config
}

/// An in-memory world that never touches the disk.
#[allow(dead_code)]
pub fn fresh_world() -> World {
    World::new(test_config(Path::new("unused")), Catalog::builtin()).with_clock(Clock::Fixed(NOW))
}

/// Open the store in `dir` and load it with the clock pinned at `now`.
/// The store must be dropped before the directory can be opened again.
#[allow(dead_code)]
pub fn open_world_at(dir: &Path, now: i64) -> (WorldStore, World) {
    let mut store = WorldStore::open(dir).expect("open store");
    let world = store
        .load_world_at(test_config(dir), Catalog::builtin(), Clock::Fixed(now))
        .expect("load world");
    (store, world)
}

#[allow(dead_code)]
pub fn open_world(dir: &Path) -> (WorldStore, World) {
    open_world_at(dir, NOW)
}
