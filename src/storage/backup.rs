//! Backups of the world data directory.
//!
//! Each backup is a gzipped tar of the data directory, leaving out the backup
//! directory itself and dotfiles such as the process lock. Every archive gets
//! a `<id>.json` sidecar with its SHA-256 so it can be checked before a
//! restore. Manual backups are never pruned.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tar::{Archive, Builder};

use super::write_file_atomic;
use crate::config::BackupConfig;
use crate::world::errors::WorldError;

/// Top-level directory inside every archive.
const ARCHIVE_ROOT: &str = "world";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub id: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub backup_type: BackupType,
    /// Hex SHA-256 of the archive
    pub checksum: String,
    pub verified: bool,
}

/// Why a backup was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupType {
    Manual,
    BeforeAnnual,
    BeforeFullSave,
}

pub struct BackupManager {
    data_dir: PathBuf,
    dir: PathBuf,
    /// Automatic archives kept by `apply_retention_policy`
    keep: usize,
    backups: BTreeMap<String, BackupMetadata>,
}

impl BackupManager {
    pub fn new(data_dir: PathBuf, dir: PathBuf, keep: usize) -> Result<Self, WorldError> {
        fs::create_dir_all(&dir)?;
        let mut manager = Self {
            data_dir,
            dir,
            keep,
            backups: BTreeMap::new(),
        };
        manager.scan()?;
        Ok(manager)
    }

    /// Backup directory from the config; relative paths live under the data directory.
    pub fn from_config(data_dir: &Path, config: &BackupConfig) -> Result<Self, WorldError> {
        let dir = Path::new(&config.dir);
        let dir = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            data_dir.join(dir)
        };
        Self::new(data_dir.to_path_buf(), dir, config.keep)
    }

    fn archive_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.tar.gz", id))
    }

    fn sidecar_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Read every sidecar; unreadable ones are skipped so one bad file does
    /// not hide the rest.
    fn scan(&mut self) -> Result<(), WorldError> {
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = fs::read(&path)
                .map_err(WorldError::from)
                .and_then(|bytes| serde_json::from_slice::<BackupMetadata>(&bytes).map_err(WorldError::from));
            match parsed {
                Ok(meta) => {
                    self.backups.insert(meta.id.clone(), meta);
                }
                Err(e) => warn!("Skipping backup sidecar {}: {}", path.display(), e),
            }
        }
        Ok(())
    }

    fn write_sidecar(&self, meta: &BackupMetadata) -> Result<(), WorldError> {
        let bytes = serde_json::to_vec_pretty(meta)?;
        write_file_atomic(&self.sidecar_path(&meta.id), &bytes)
    }

    fn should_archive(&self, path: &Path) -> bool {
        if path == self.dir {
            return false;
        }
        if let (Ok(a), Ok(b)) = (path.canonicalize(), self.dir.canonicalize()) {
            if a == b {
                return false;
            }
        }
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| !n.starts_with('.'))
    }

    fn next_id(&self, at: DateTime<Utc>) -> String {
        let base = format!("world_{}", at.format("%Y%m%d_%H%M%S_%3f"));
        let mut id = base.clone();
        let mut n = 1;
        while self.backups.contains_key(&id) || self.archive_path(&id).exists() {
            id = format!("{}_{}", base, n);
            n += 1;
        }
        id
    }

    pub fn create_backup(
        &mut self,
        name: Option<String>,
        backup_type: BackupType,
    ) -> Result<BackupMetadata, WorldError> {
        let created_at = Utc::now();
        let id = self.next_id(created_at);
        let archive = self.archive_path(&id);
        info!("Creating {:?} backup {}", backup_type, id);

        let mut entries: Vec<PathBuf> = fs::read_dir(&self.data_dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| self.should_archive(p))
            .collect();
        entries.sort();

        let mut tar = Builder::new(GzEncoder::new(File::create(&archive)?, Compression::default()));
        for path in entries {
            let Some(file_name) = path.file_name() else {
                continue;
            };
            let inside = Path::new(ARCHIVE_ROOT).join(file_name);
            if path.is_dir() {
                tar.append_dir_all(&inside, &path)?;
            } else {
                tar.append_path_with_name(&path, &inside)?;
            }
        }
        // finish the gzip stream before hashing
        tar.into_inner()?.finish()?;

        let meta = BackupMetadata {
            id: id.clone(),
            name,
            created_at,
            size_bytes: fs::metadata(&archive)?.len(),
            backup_type,
            checksum: checksum(&archive)?,
            verified: false,
        };
        self.write_sidecar(&meta)?;
        self.backups.insert(id, meta.clone());
        info!("Backup {} written ({} bytes)", meta.id, meta.size_bytes);
        Ok(meta)
    }

    fn lookup(&self, id: &str) -> Result<(&BackupMetadata, PathBuf), WorldError> {
        let meta = self
            .backups
            .get(id)
            .ok_or_else(|| WorldError::NotFound(format!("backup {}", id)))?;
        let archive = self.archive_path(id);
        if !archive.exists() {
            return Err(WorldError::NotFound(format!("archive {}", archive.display())));
        }
        Ok((meta, archive))
    }

    /// Recompute the archive checksum; a match marks the backup verified.
    pub fn verify_backup(&mut self, id: &str) -> Result<bool, WorldError> {
        let (meta, archive) = self.lookup(id)?;
        if checksum(&archive)? != meta.checksum {
            error!("Backup {} failed verification (checksum mismatch)", id);
            return Ok(false);
        }
        let mut meta = meta.clone();
        meta.verified = true;
        self.write_sidecar(&meta)?;
        self.backups.insert(id.to_string(), meta);
        info!("Backup {} verified", id);
        Ok(true)
    }

    /// Unpack a backup into `target`; world files land under `target/world`.
    pub fn restore_backup(&self, id: &str, target: &Path) -> Result<(), WorldError> {
        let (meta, archive) = self.lookup(id)?;
        if checksum(&archive)? != meta.checksum {
            return Err(WorldError::InvalidOperation(format!(
                "backup {} does not match its checksum",
                id
            )));
        }
        info!("Restoring backup {} into {}", id, target.display());
        fs::create_dir_all(target)?;
        Archive::new(GzDecoder::new(File::open(&archive)?)).unpack(target)?;
        Ok(())
    }

    /// Delete automatic backups beyond the newest `keep`. Returns the ids removed.
    pub fn apply_retention_policy(&mut self) -> Result<Vec<String>, WorldError> {
        let mut automatic: Vec<&BackupMetadata> = self
            .backups
            .values()
            .filter(|b| b.backup_type != BackupType::Manual)
            .collect();
        automatic.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let pruned: Vec<String> = automatic.iter().skip(self.keep).map(|b| b.id.clone()).collect();

        for id in &pruned {
            self.backups.remove(id);
            for path in [self.archive_path(id), self.sidecar_path(id)] {
                if path.exists() {
                    fs::remove_file(&path)?;
                }
            }
            info!("Pruned backup {}", id);
        }
        Ok(pruned)
    }

    /// Newest first
    pub fn list_backups(&self) -> Vec<BackupMetadata> {
        let mut all: Vec<_> = self.backups.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        all
    }

    pub fn len(&self) -> usize {
        self.backups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backups.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.backups.values().map(|b| b.size_bytes).sum()
    }
}

fn checksum(path: &Path) -> Result<String, WorldError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(temp: &TempDir, keep: usize) -> BackupManager {
        let data = temp.path().join("data");
        fs::create_dir_all(data.join("world/4")).unwrap();
        fs::write(data.join("map.bin"), b"map bytes").unwrap();
        fs::write(data.join("world/4/420.wld"), b"Saved: 1\n#420 R\nEnd World File\n").unwrap();
        fs::write(data.join(".lock"), b"").unwrap();
        BackupManager::new(data.clone(), data.join("backups"), keep).unwrap()
    }

    #[test]
    fn archive_skips_itself_and_the_lock() {
        let temp = TempDir::new().unwrap();
        let mut manager = manager(&temp, 3);
        manager.create_backup(None, BackupType::Manual).unwrap();
        let second = manager.create_backup(None, BackupType::Manual).unwrap();

        let restore = temp.path().join("restore");
        manager.restore_backup(&second.id, &restore).unwrap();
        assert!(restore.join("world/map.bin").exists());
        assert!(restore.join("world/world/4/420.wld").exists());
        assert!(!restore.join("world/.lock").exists());
        assert!(!restore.join("world/backups").exists());
    }

    #[test]
    fn verification_survives_a_reopen() {
        let temp = TempDir::new().unwrap();
        let mut manager = manager(&temp, 3);
        let meta = manager
            .create_backup(Some("pre-patch".into()), BackupType::Manual)
            .unwrap();
        assert!(manager.verify_backup(&meta.id).unwrap());

        let data = temp.path().join("data");
        let reopened = BackupManager::new(data.clone(), data.join("backups"), 3).unwrap();
        let listed = reopened.list_backups();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].verified);
        assert_eq!(listed[0].name.as_deref(), Some("pre-patch"));
    }

    #[test]
    fn tampered_archive_is_refused() {
        let temp = TempDir::new().unwrap();
        let mut manager = manager(&temp, 3);
        let meta = manager.create_backup(None, BackupType::Manual).unwrap();
        fs::write(manager.archive_path(&meta.id), b"not a tarball").unwrap();
        assert!(!manager.verify_backup(&meta.id).unwrap());
        assert!(manager
            .restore_backup(&meta.id, &temp.path().join("restore"))
            .is_err());
    }

    #[test]
    fn retention_keeps_newest_automatic_and_all_manual() {
        let temp = TempDir::new().unwrap();
        let mut manager = manager(&temp, 2);
        manager.create_backup(None, BackupType::Manual).unwrap();
        for _ in 0..4 {
            manager.create_backup(None, BackupType::BeforeAnnual).unwrap();
        }
        let pruned = manager.apply_retention_policy().unwrap();
        assert_eq!(pruned.len(), 2);
        assert_eq!(manager.len(), 3);
        for id in &pruned {
            assert!(!manager.archive_path(id).exists());
            assert!(!manager.sidecar_path(id).exists());
        }
        let manual = manager
            .list_backups()
            .iter()
            .filter(|b| b.backup_type == BackupType::Manual)
            .count();
        assert_eq!(manual, 1);
    }

    #[test]
    fn unknown_backup_is_not_found() {
        let temp = TempDir::new().unwrap();
        let mut manager = manager(&temp, 1);
        assert!(matches!(
            manager.verify_backup("world_nope"),
            Err(WorldError::NotFound(_))
        ));
    }
}
