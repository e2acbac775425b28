//! The binary map file: a fixed header followed by one fixed-size record per
//! map tile, in vnum order. Records are bincode with its default fixint
//! little-endian encoding, so a single tile can be patched in place at
//! `HEADER_SIZE + vnum * RECORD_SIZE`.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::world::errors::WorldError;
use crate::world::grid::{MapTile, TileFlags};
use crate::world::shared::SharedRoomData;
use crate::world::terrain::time_to_extra;
use crate::world::types::{IslandId, RoomAffects, RoomVnum, SectorVnum, NO_ISLAND};

pub const MAP_VERSION: i32 = 2;
pub const HEADER_SIZE: u64 = 12;
pub const RECORD_SIZE: u64 = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapHeader {
    pub version: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapRecord {
    pub sector: SectorVnum,
    pub base_sector: SectorVnum,
    pub natural_sector: SectorVnum,
    /// `-1` for no crop.
    pub crop: i32,
    pub affects: u64,
    pub base_affects: u64,
    pub height: i32,
    /// Tile flags.
    pub misc: u32,
    pub sector_time: i32,
    pub island_id: IslandId,
}

impl MapRecord {
    pub fn from_tile(tile: &MapTile, shared: Option<&SharedRoomData>) -> Self {
        Self {
            sector: tile.sector,
            base_sector: tile.base_sector,
            natural_sector: tile.natural_sector,
            crop: tile.crop.unwrap_or(-1),
            affects: shared.map(|s| s.affects.bits()).unwrap_or(0),
            base_affects: shared.map(|s| s.base_affects.bits()).unwrap_or(0),
            height: shared.map(|s| s.height).unwrap_or(0),
            misc: tile.flags.bits(),
            sector_time: time_to_extra(tile.sector_time),
            island_id: shared.map(|s| s.island_id).unwrap_or(NO_ISLAND),
        }
    }

    pub fn crop(&self) -> Option<i32> {
        (self.crop >= 0).then_some(self.crop)
    }

    pub fn flags(&self) -> TileFlags {
        TileFlags::from_bits_truncate(self.misc)
    }

    /// Nothing distinguishes this tile from untouched ocean.
    pub fn is_plain_ocean(&self, ocean: SectorVnum) -> bool {
        self.sector == ocean
            && self.base_sector == ocean
            && self.natural_sector == ocean
            && self.crop < 0
            && self.island_id == NO_ISLAND
            && self.height == 0
            && self.misc == 0
            && self.affects == 0
            && self.base_affects == 0
    }

    /// Seed a shared block with the fields the map file carries.
    pub fn shared_data(&self) -> SharedRoomData {
        SharedRoomData {
            height: self.height,
            island_id: self.island_id,
            affects: RoomAffects::from_bits_truncate(self.affects),
            base_affects: RoomAffects::from_bits_truncate(self.base_affects),
            ..SharedRoomData::default()
        }
    }
}

fn record_offset(vnum: RoomVnum) -> u64 {
    HEADER_SIZE + vnum as u64 * RECORD_SIZE
}

/// Read the whole file. Returns the header and every record in vnum order.
/// The caller decides what a version mismatch means.
pub fn read_map(path: &Path) -> Result<(MapHeader, Vec<MapRecord>), WorldError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut header_bytes = [0u8; HEADER_SIZE as usize];
    reader
        .read_exact(&mut header_bytes)
        .map_err(|_| WorldError::corrupt(path, 0, "truncated map header"))?;
    let header: MapHeader = bincode::deserialize(&header_bytes)?;
    if header.width <= 0 || header.height <= 0 {
        return Err(WorldError::corrupt(path, 0, "bad map dimensions"));
    }
    let count = header.width as usize * header.height as usize;
    let mut records = Vec::with_capacity(count);
    let mut buf = [0u8; RECORD_SIZE as usize];
    for idx in 0..count {
        reader
            .read_exact(&mut buf)
            .map_err(|_| WorldError::corrupt(path, idx + 1, "map file ended early"))?;
        records.push(bincode::deserialize(&buf)?);
    }
    Ok((header, records))
}

/// Write a complete map file to `path`. Callers write to a temp file and
/// rename it into place.
pub fn write_map(path: &Path, width: i32, height: i32, records: &[MapRecord]) -> Result<(), WorldError> {
    let mut writer = BufWriter::new(File::create(path)?);
    let header = MapHeader {
        version: MAP_VERSION,
        width,
        height,
    };
    writer.write_all(&bincode::serialize(&header)?)?;
    for record in records {
        writer.write_all(&bincode::serialize(record)?)?;
    }
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

/// Overwrite single records of an existing map file.
pub fn patch_records(path: &Path, records: &[(RoomVnum, MapRecord)]) -> Result<(), WorldError> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    for (vnum, record) in records {
        file.seek(SeekFrom::Start(record_offset(*vnum)))?;
        file.write_all(&bincode::serialize(record)?)?;
    }
    file.sync_data()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(sector: SectorVnum) -> MapRecord {
        MapRecord {
            sector,
            base_sector: sector,
            natural_sector: sector,
            crop: -1,
            affects: 0,
            base_affects: 0,
            height: 0,
            misc: 0,
            sector_time: 0,
            island_id: NO_ISLAND,
        }
    }

    #[test]
    fn record_and_header_sizes_are_fixed() {
        let header = MapHeader {
            version: MAP_VERSION,
            width: 1,
            height: 1,
        };
        assert_eq!(bincode::serialize(&header).unwrap().len() as u64, HEADER_SIZE);
        assert_eq!(bincode::serialize(&record(2)).unwrap().len() as u64, RECORD_SIZE);
    }

    #[test]
    fn patched_record_is_read_back() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("map.bin");
        let records = vec![record(2); 6];
        write_map(&path, 3, 2, &records).expect("write");

        let mut changed = record(1);
        changed.crop = 3;
        changed.height = -2;
        patch_records(&path, &[(4, changed)]).expect("patch");

        let (header, back) = read_map(&path).expect("read");
        assert_eq!((header.width, header.height), (3, 2));
        assert_eq!(header.version, MAP_VERSION);
        assert_eq!(back[4], changed);
        assert_eq!(back[4].crop(), Some(3));
        assert!(back[5].is_plain_ocean(2));
        assert!(!back[4].is_plain_ocean(2));
    }

    #[test]
    fn short_file_is_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("map.bin");
        // header claims six tiles but only three follow
        write_map(&path, 3, 2, &[record(2); 3]).expect("write");
        assert!(matches!(
            read_map(&path),
            Err(WorldError::CorruptFile { line: 4, .. })
        ));
    }
}
