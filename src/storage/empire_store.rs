use std::path::Path;

use sled::IVec;

use crate::world::empire::{
    EmpireRecord, IslandRecord, EMPIRE_SCHEMA_VERSION, ISLAND_SCHEMA_VERSION,
};
use crate::world::errors::WorldError;
use crate::world::types::{EmpireVnum, IslandId};

const TREE_EMPIRES: &str = "empires";
const TREE_ISLANDS: &str = "islands";
const TREE_META: &str = "meta";

const KEY_LAST_ANNUAL: &[u8] = b"last_annual";

/// Sled-backed persistence for empires, islands and a few world timestamps.
/// Territory and tech aggregates are never stored; they are rebuilt on load.
pub struct EmpireStore {
    _db: sled::Db,
    empires: sled::Tree,
    islands: sled::Tree,
    meta: sled::Tree,
}

impl EmpireStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, WorldError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let empires = db.open_tree(TREE_EMPIRES)?;
        let islands = db.open_tree(TREE_ISLANDS)?;
        let meta = db.open_tree(TREE_META)?;
        Ok(Self {
            _db: db,
            empires,
            islands,
            meta,
        })
    }

    fn empire_key(vnum: EmpireVnum) -> Vec<u8> {
        format!("empire:{}", vnum).into_bytes()
    }

    fn island_key(id: IslandId) -> Vec<u8> {
        format!("island:{}", id).into_bytes()
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, WorldError> {
        Ok(bincode::serialize(value)?)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(bytes: IVec) -> Result<T, WorldError> {
        Ok(bincode::deserialize::<T>(&bytes)?)
    }

    /// Insert or update an empire.
    pub fn put_empire(&self, empire: &EmpireRecord) -> Result<(), WorldError> {
        let mut record = empire.clone();
        record.schema_version = EMPIRE_SCHEMA_VERSION;
        let bytes = Self::serialize(&record)?;
        self.empires.insert(Self::empire_key(record.vnum), bytes)?;
        self.empires.flush()?;
        Ok(())
    }

    pub fn get_empire(&self, vnum: EmpireVnum) -> Result<EmpireRecord, WorldError> {
        let Some(bytes) = self.empires.get(Self::empire_key(vnum))? else {
            return Err(WorldError::NotFound(format!("empire: {}", vnum)));
        };
        let record: EmpireRecord = Self::deserialize(bytes)?;
        if record.schema_version != EMPIRE_SCHEMA_VERSION {
            return Err(WorldError::SchemaMismatch {
                entity: "empire",
                expected: EMPIRE_SCHEMA_VERSION,
                found: record.schema_version,
            });
        }
        Ok(record)
    }

    pub fn delete_empire(&self, vnum: EmpireVnum) -> Result<bool, WorldError> {
        let removed = self.empires.remove(Self::empire_key(vnum))?.is_some();
        self.empires.flush()?;
        Ok(removed)
    }

    pub fn list_empires(&self) -> Result<Vec<EmpireRecord>, WorldError> {
        let mut out = Vec::new();
        for entry in self.empires.scan_prefix(b"empire:") {
            let (_, bytes) = entry?;
            let record: EmpireRecord = Self::deserialize(bytes)?;
            if record.schema_version != EMPIRE_SCHEMA_VERSION {
                return Err(WorldError::SchemaMismatch {
                    entity: "empire",
                    expected: EMPIRE_SCHEMA_VERSION,
                    found: record.schema_version,
                });
            }
            out.push(record);
        }
        Ok(out)
    }

    pub fn put_island(&self, island: &IslandRecord) -> Result<(), WorldError> {
        let mut record = island.clone();
        record.schema_version = ISLAND_SCHEMA_VERSION;
        let bytes = Self::serialize(&record)?;
        self.islands.insert(Self::island_key(record.id), bytes)?;
        self.islands.flush()?;
        Ok(())
    }

    pub fn list_islands(&self) -> Result<Vec<IslandRecord>, WorldError> {
        let mut out = Vec::new();
        for entry in self.islands.scan_prefix(b"island:") {
            let (_, bytes) = entry?;
            let record: IslandRecord = Self::deserialize(bytes)?;
            if record.schema_version != ISLAND_SCHEMA_VERSION {
                return Err(WorldError::SchemaMismatch {
                    entity: "island",
                    expected: ISLAND_SCHEMA_VERSION,
                    found: record.schema_version,
                });
            }
            out.push(record);
        }
        Ok(out)
    }

    /// Unix time of the last annual update, if one ever ran.
    pub fn last_annual_update(&self) -> Result<Option<i64>, WorldError> {
        match self.meta.get(KEY_LAST_ANNUAL)? {
            Some(bytes) => Ok(Some(Self::deserialize(bytes)?)),
            None => Ok(None),
        }
    }

    pub fn set_last_annual_update(&self, when: i64) -> Result<(), WorldError> {
        self.meta.insert(KEY_LAST_ANNUAL, Self::serialize(&when)?)?;
        self.meta.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::empire::{CityEntry, IslandFlags};
    use tempfile::TempDir;

    #[test]
    fn empire_round_trip_drops_aggregates() {
        let dir = TempDir::new().expect("tempdir");
        let store = EmpireStore::open(dir.path()).expect("store");
        let mut empire = EmpireRecord::new(4, "Stonehold");
        empire.cities.push(CityEntry {
            name: "Granite".to_string(),
            location: 210,
            radius: 5,
            founded: 1_700_000_000,
        });
        empire.aggregates.population = 55;
        store.put_empire(&empire).expect("put");

        let fetched = store.get_empire(4).expect("get");
        assert_eq!(fetched.cities, empire.cities);
        assert_eq!(fetched.aggregates.population, 0);
        assert!(matches!(store.get_empire(5), Err(WorldError::NotFound(_))));

        assert!(store.delete_empire(4).expect("delete"));
        assert!(store.list_empires().expect("list").is_empty());
    }

    #[test]
    fn islands_and_annual_stamp_persist_across_reopen() {
        let dir = TempDir::new().expect("tempdir");
        {
            let store = EmpireStore::open(dir.path()).expect("store");
            store
                .put_island(&IslandRecord::new(2, "Newbie Isle", IslandFlags::NEWBIE))
                .expect("island");
            assert_eq!(store.last_annual_update().expect("meta"), None);
            store.set_last_annual_update(1_234).expect("meta");
        }
        let store = EmpireStore::open(dir.path()).expect("reopen");
        let islands = store.list_islands().expect("islands");
        assert_eq!(islands.len(), 1);
        assert!(islands[0].flags.contains(IslandFlags::NEWBIE));
        assert_eq!(store.last_annual_update().expect("meta"), Some(1_234));
    }
}
