//! Per-vnum dirty bits waiting for the next flush.
//!
//! Requests for the same vnum OR together. An entry only leaves the queue
//! when every bit has been cleared, so a flush step that requests more work
//! for the vnum it is handling gets picked up in the same pass.

use std::collections::BTreeMap;

use bitflags::bitflags;

use crate::world::types::RoomVnum;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SaveBits: u8 {
        /// The fixed binary map record.
        const MAP = 1 << 0;
        /// The text room file.
        const ROOM = 1 << 1;
        /// The objects/vehicles pack.
        const OBJECTS = 1 << 2;
    }
}

#[derive(Debug, Default)]
pub struct SaveQueue {
    pending: BTreeMap<RoomVnum, SaveBits>,
    blocked: bool,
    /// Requests dropped while blocked, for diagnostics.
    suppressed: u64,
}

impl SaveQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, vnum: RoomVnum, bits: SaveBits) {
        if self.blocked {
            self.suppressed += 1;
            return;
        }
        if bits.is_empty() {
            return;
        }
        *self.pending.entry(vnum).or_default() |= bits;
    }

    /// Suppress every request, e.g. while the world is being loaded from disk.
    pub fn set_blocked(&mut self, blocked: bool) {
        self.blocked = blocked;
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }

    pub fn bits(&self, vnum: RoomVnum) -> SaveBits {
        self.pending.get(&vnum).copied().unwrap_or_default()
    }

    /// Clear `bits` for `vnum`; returns which of them were set. The entry is
    /// removed once nothing is left.
    pub fn take(&mut self, vnum: RoomVnum, bits: SaveBits) -> SaveBits {
        let Some(entry) = self.pending.get_mut(&vnum) else {
            return SaveBits::empty();
        };
        let taken = *entry & bits;
        entry.remove(bits);
        if entry.is_empty() {
            self.pending.remove(&vnum);
        }
        taken
    }

    pub fn pending_vnums(&self) -> Vec<RoomVnum> {
        self.pending.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_coalesce_per_vnum() {
        let mut queue = SaveQueue::new();
        queue.request(7, SaveBits::MAP);
        queue.request(7, SaveBits::ROOM);
        queue.request(9, SaveBits::OBJECTS);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.bits(7), SaveBits::MAP | SaveBits::ROOM);
    }

    #[test]
    fn entry_survives_until_all_bits_clear() {
        let mut queue = SaveQueue::new();
        queue.request(3, SaveBits::MAP | SaveBits::ROOM);
        assert_eq!(queue.take(3, SaveBits::MAP), SaveBits::MAP);
        assert_eq!(queue.pending_vnums(), vec![3]);
        // a side effect re-requests while the entry is still live
        queue.request(3, SaveBits::OBJECTS);
        assert_eq!(queue.take(3, SaveBits::ROOM), SaveBits::ROOM);
        assert!(!queue.is_empty());
        assert_eq!(queue.take(3, SaveBits::all()), SaveBits::OBJECTS);
        assert!(queue.is_empty());
    }

    #[test]
    fn blocked_queue_drops_requests() {
        let mut queue = SaveQueue::new();
        queue.set_blocked(true);
        queue.request(1, SaveBits::ROOM);
        assert!(queue.is_empty());
        assert_eq!(queue.suppressed(), 1);
        queue.set_blocked(false);
        queue.request(1, SaveBits::ROOM);
        assert_eq!(queue.len(), 1);
    }
}
