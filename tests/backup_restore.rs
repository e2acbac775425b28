// A backup taken from a running server restores into a loadable world

mod common;

use common::{open_world, test_config, NOW};
use empireworld::server::WorldServer;
use empireworld::storage::backup::{BackupManager, BackupType};
use empireworld::storage::WorldStore;
use empireworld::world::catalog::Catalog;
use empireworld::world::Clock;
use tempfile::tempdir;

#[test]
fn backup_flushes_pending_saves_before_archiving() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data");
    let mut config = test_config(&data);
    config.backup.enabled = true;
    config.backup.dir = dir.path().join("backups").to_string_lossy().into_owned();

    let mut store = WorldStore::open(&data).unwrap();
    let world = store
        .load_world_at(config.clone(), Catalog::builtin(), Clock::Fixed(NOW))
        .unwrap();
    let mut server = WorldServer::from_parts(config.clone(), world, store).unwrap();

    assert!(server.world_mut().change_terrain(33, 1, None));
    assert!(server
        .world_mut()
        .customize_room(33, Some("Old Grove"), None));
    assert!(!server.world().saves().is_empty());

    let meta = server
        .create_backup(Some("pre-flood".to_string()), BackupType::Manual)
        .unwrap()
        .expect("backups are enabled");
    assert!(server.world().saves().is_empty());
    assert_eq!(meta.name.as_deref(), Some("pre-flood"));

    let mut backups = BackupManager::from_config(&data, &config.backup).unwrap();
    assert!(backups.verify_backup(&meta.id).unwrap());
    let restore = dir.path().join("restore");
    backups.restore_backup(&meta.id, &restore).unwrap();

    let (_store, restored) = open_world(&restore.join("world"));
    assert_eq!(restored.sector_of(33), Some(1));
    assert_eq!(
        restored.shared(33).and_then(|s| s.name.clone()).as_deref(),
        Some("Old Grove")
    );
    assert_eq!(restored.map().land_count(), 1);
}

#[test]
fn disabled_backups_are_a_no_op() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let mut store = WorldStore::open(dir.path()).unwrap();
    let world = store
        .load_world_at(config.clone(), Catalog::builtin(), Clock::Fixed(NOW))
        .unwrap();
    let mut server = WorldServer::from_parts(config, world, store).unwrap();
    assert!(server
        .create_backup(None, BackupType::Manual)
        .unwrap()
        .is_none());
}
