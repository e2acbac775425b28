//! Which vnums have a room file or a pack on disk.
//!
//! The file is a `top_vnum: i32` header followed by `top_vnum + 1` bytes, one
//! per vnum; zero means nothing else is stored. Startup reads it instead of
//! walking the `world/` tree. Changes are queued and written as single-byte
//! patches, except when the file is new or has to grow.

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use bitflags::bitflags;

use crate::world::errors::WorldError;
use crate::world::types::RoomVnum;

const INDEX_HEADER_SIZE: u64 = 4;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct IndexFlags: u8 {
        /// Room file with shared data only (unloaded map tile).
        const MAP_TEXT = 1 << 0;
        /// Room file with a full room.
        const ROOM = 1 << 1;
        const PACK = 1 << 2;
    }
}

#[derive(Debug, Default)]
pub struct WorldIndex {
    bytes: Vec<u8>,
    /// Highest vnum the file on disk covers; `None` until first written.
    written_top: Option<RoomVnum>,
    pending: BTreeSet<RoomVnum>,
}

impl WorldIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(path: &Path) -> Result<Self, WorldError> {
        let mut data = Vec::new();
        File::open(path)?.read_to_end(&mut data)?;
        if data.len() < INDEX_HEADER_SIZE as usize {
            return Err(WorldError::corrupt(path, 0, "truncated index header"));
        }
        let top = i32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let body = &data[INDEX_HEADER_SIZE as usize..];
        if top < -1 || body.len() != (top + 1) as usize {
            return Err(WorldError::corrupt(
                path,
                0,
                format!("index covers {} vnums but header says {}", body.len(), top + 1),
            ));
        }
        Ok(Self {
            bytes: body.to_vec(),
            written_top: Some(top),
            pending: BTreeSet::new(),
        })
    }

    pub fn get(&self, vnum: RoomVnum) -> IndexFlags {
        usize::try_from(vnum)
            .ok()
            .and_then(|i| self.bytes.get(i))
            .map(|b| IndexFlags::from_bits_truncate(*b))
            .unwrap_or_default()
    }

    /// Replace the flags in `mask` for `vnum` with `value`.
    pub fn set(&mut self, vnum: RoomVnum, mask: IndexFlags, value: IndexFlags) {
        let Ok(idx) = usize::try_from(vnum) else {
            return;
        };
        let current = self.get(vnum);
        let next = (current - mask) | (value & mask);
        if next == current {
            return;
        }
        if idx >= self.bytes.len() {
            self.bytes.resize(idx + 1, 0);
        }
        self.bytes[idx] = next.bits();
        self.pending.insert(vnum);
    }

    /// Every vnum with something stored, in order.
    pub fn iter(&self) -> impl Iterator<Item = (RoomVnum, IndexFlags)> + '_ {
        self.bytes
            .iter()
            .enumerate()
            .filter(|(_, b)| **b != 0)
            .map(|(i, b)| (i as RoomVnum, IndexFlags::from_bits_truncate(*b)))
    }

    pub fn is_dirty(&self) -> bool {
        !self.pending.is_empty() || self.written_top.is_none()
    }

    fn top(&self) -> RoomVnum {
        self.bytes.len() as RoomVnum - 1
    }

    /// Write queued changes. Returns true when the whole file was rewritten.
    pub fn flush(&mut self, path: &Path) -> Result<bool, WorldError> {
        let grows = self.written_top.map(|t| self.top() > t).unwrap_or(true);
        if grows || !path.exists() {
            self.write_full(path)?;
            self.pending.clear();
            return Ok(true);
        }
        if self.pending.is_empty() {
            return Ok(false);
        }
        let mut file = OpenOptions::new().write(true).open(path)?;
        for vnum in std::mem::take(&mut self.pending) {
            file.seek(SeekFrom::Start(INDEX_HEADER_SIZE + vnum as u64))?;
            file.write_all(&[self.get(vnum).bits()])?;
        }
        file.sync_data()?;
        Ok(false)
    }

    fn write_full(&mut self, path: &Path) -> Result<(), WorldError> {
        let tmp = path.with_extension("bin.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            writer.write_all(&self.top().to_le_bytes())?;
            writer.write_all(&self.bytes)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        std::fs::rename(&tmp, path)?;
        self.written_top = Some(self.top());
        Ok(())
    }
}
