//! Delayed callbacks: burn-down, trench fill, crop growth and unload checks.
//!
//! The queue owns every payload. `cancel` hands the payload back and the
//! event can never fire afterwards; a fired event is removed before its
//! handler runs and is only re-added when the handler asks for it.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};

use log::debug;

use crate::metrics;
use crate::world::catalog::{EvolutionKind, SectorFlags};
use crate::world::types::RoomVnum;
use crate::world::World;

/// Stale heap entries may outnumber live events by this factor before the
/// heap is rebuilt.
const COMPACT_FACTOR: usize = 4;
/// Small heaps are never worth rebuilding.
const COMPACT_MIN_STALE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

#[derive(Debug)]
struct Pending<E> {
    due: i64,
    seq: u64,
    payload: E,
}

#[derive(Debug)]
pub struct EventQueue<E> {
    next_id: u64,
    next_seq: u64,
    heap: BinaryHeap<Reverse<(i64, u64, EventId)>>,
    live: HashMap<EventId, Pending<E>>,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self {
            next_id: 1,
            next_seq: 0,
            heap: BinaryHeap::new(),
            live: HashMap::new(),
        }
    }
}

impl<E> EventQueue<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `payload` to fire `delay_secs` from `now` (at least one second).
    pub fn schedule(&mut self, now: i64, delay_secs: i64, payload: E) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.push(id, now + delay_secs.max(1), payload);
        id
    }

    /// Schedule `payload` at an absolute time. A time already past fires on
    /// the next `pop_due(now)`.
    pub fn schedule_at(&mut self, due: i64, payload: E) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.push(id, due, payload);
        id
    }

    /// Put a fired event back under its original id.
    pub fn requeue(&mut self, id: EventId, now: i64, delay_secs: i64, payload: E) {
        self.push(id, now + delay_secs.max(1), payload);
    }

    fn push(&mut self, id: EventId, due: i64, payload: E) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse((due, seq, id)));
        self.live.insert(id, Pending { due, seq, payload });
    }

    /// Remove a pending event and return its payload; it will never fire.
    pub fn cancel(&mut self, id: EventId) -> Option<E> {
        let payload = self.live.remove(&id).map(|pending| pending.payload)?;
        self.compact_if_stale();
        Some(payload)
    }

    /// Cancelled entries stay in the heap until popped; rebuild it from the
    /// live set once they dominate.
    fn compact_if_stale(&mut self) {
        let stale = self.heap.len().saturating_sub(self.live.len());
        if stale >= COMPACT_MIN_STALE && stale > self.live.len() * COMPACT_FACTOR {
            self.heap = self
                .live
                .iter()
                .map(|(id, pending)| Reverse((pending.due, pending.seq, *id)))
                .collect();
        }
    }

    #[cfg(test)]
    fn heap_len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_pending(&self, id: EventId) -> bool {
        self.live.contains_key(&id)
    }

    pub fn due_time(&self, id: EventId) -> Option<i64> {
        self.live.get(&id).map(|pending| pending.due)
    }

    /// Take the earliest event due at or before `now`.
    pub fn pop_due(&mut self, now: i64) -> Option<(EventId, E)> {
        while let Some(Reverse((due, seq, id))) = self.heap.peek().copied() {
            let current = self.live.get(&id).map(|p| p.seq == seq).unwrap_or(false);
            if !current {
                // cancelled or requeued since this heap entry was pushed
                self.heap.pop();
                continue;
            }
            if due > now {
                return None;
            }
            self.heap.pop();
            return self.live.remove(&id).map(|pending| (id, pending.payload));
        }
        None
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

/// Events whose handle is stored with a room's shared data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoredEventKind {
    TrenchFill,
    BurnDown,
    GrowCrop,
}

impl StoredEventKind {
    fn payload(self, room: RoomVnum) -> WorldEvent {
        match self {
            StoredEventKind::TrenchFill => WorldEvent::TrenchFill { room },
            StoredEventKind::BurnDown => WorldEvent::BurnDown { room },
            StoredEventKind::GrowCrop => WorldEvent::GrowCrop { room },
        }
    }
}

/// At most one handle per kind; adding a kind replaces the previous handle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredEvents(BTreeMap<StoredEventKind, EventId>);

impl StoredEvents {
    pub fn get(&self, kind: StoredEventKind) -> Option<EventId> {
        self.0.get(&kind).copied()
    }

    pub(crate) fn insert(&mut self, kind: StoredEventKind, id: EventId) -> Option<EventId> {
        self.0.insert(kind, id)
    }

    pub(crate) fn remove(&mut self, kind: StoredEventKind) -> Option<EventId> {
        self.0.remove(&kind)
    }

    pub(crate) fn drain(&mut self) -> Vec<EventId> {
        std::mem::take(&mut self.0).into_values().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Payloads carry only the room vnum; state is re-read at fire time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldEvent {
    BurnDown { room: RoomVnum },
    TrenchFill { room: RoomVnum },
    GrowCrop { room: RoomVnum },
    UnloadCheck { room: RoomVnum },
}

impl WorldEvent {
    pub fn stored_kind(&self) -> Option<(StoredEventKind, RoomVnum)> {
        match *self {
            WorldEvent::BurnDown { room } => Some((StoredEventKind::BurnDown, room)),
            WorldEvent::TrenchFill { room } => Some((StoredEventKind::TrenchFill, room)),
            WorldEvent::GrowCrop { room } => Some((StoredEventKind::GrowCrop, room)),
            WorldEvent::UnloadCheck { .. } => None,
        }
    }
}

impl World {
    /// Schedule a stored event for `vnum`, cancelling any previous one of the same kind.
    pub fn add_stored_event(&mut self, vnum: RoomVnum, kind: StoredEventKind, delay_secs: i64) -> bool {
        let now = self.now();
        let id = self.events.schedule(now, delay_secs, kind.payload(vnum));
        self.attach_stored_event(vnum, kind, id)
    }

    /// Re-create a stored event from a persisted absolute time. Times already
    /// past fire on the next `process_due_events`.
    pub(crate) fn restore_stored_event(
        &mut self,
        vnum: RoomVnum,
        kind: StoredEventKind,
        due: i64,
    ) -> bool {
        let due = due.max(self.now());
        let id = self.events.schedule_at(due, kind.payload(vnum));
        self.attach_stored_event(vnum, kind, id)
    }

    fn attach_stored_event(&mut self, vnum: RoomVnum, kind: StoredEventKind, id: EventId) -> bool {
        let previous = match self.shared_for_write(vnum) {
            Some(shared) => shared.events.insert(kind, id),
            None => {
                self.events.cancel(id);
                return false;
            }
        };
        if let Some(old) = previous {
            self.events.cancel(old);
            metrics::inc_events_cancelled();
        }
        true
    }

    /// Cancel the stored event of `kind` for `vnum`, if any.
    pub fn cancel_stored_event(&mut self, vnum: RoomVnum, kind: StoredEventKind) -> bool {
        let handle = self.shared_mut(vnum).and_then(|shared| shared.events.remove(kind));
        match handle {
            Some(id) => {
                self.events.cancel(id);
                metrics::inc_events_cancelled();
                true
            }
            None => false,
        }
    }

    pub fn stored_event(&self, vnum: RoomVnum, kind: StoredEventKind) -> Option<EventId> {
        self.shared(vnum).and_then(|shared| shared.events.get(kind))
    }

    /// Fire every event due at the current clock time. Returns how many fired.
    pub fn process_due_events(&mut self) -> usize {
        let now = self.now();
        let mut fired = 0;
        while let Some((id, event)) = self.events.pop_due(now) {
            fired += 1;
            metrics::inc_events_fired();
            if let Some((kind, room)) = event.stored_kind() {
                // the handle is spent; handlers may schedule a fresh one
                if let Some(shared) = self.shared_mut(room) {
                    if shared.events.get(kind) == Some(id) {
                        shared.events.remove(kind);
                    }
                }
            }
            match self.fire_event(event) {
                Some(delay) => self.events.requeue(id, now, delay, event),
                None => {
                    if let WorldEvent::UnloadCheck { room } = event {
                        if let Some(r) = self.rooms.get_mut(room) {
                            if r.unload_event == Some(id) {
                                r.unload_event = None;
                            }
                        }
                    }
                }
            }
        }
        fired
    }

    /// Run one event; `Some(delay)` reschedules it.
    fn fire_event(&mut self, event: WorldEvent) -> Option<i64> {
        debug!("Firing {:?}", event);
        match event {
            WorldEvent::BurnDown { room } => {
                self.burn_down(room);
                None
            }
            WorldEvent::TrenchFill { room } => {
                if self.sector_of(room).map(|s| self.catalog.sector_has(s, SectorFlags::IS_TRENCH))
                    == Some(true)
                {
                    self.fill_trench(room);
                }
                None
            }
            WorldEvent::GrowCrop { room } => {
                let grows = self
                    .sector_of(room)
                    .and_then(|s| self.catalog.sector(s))
                    .and_then(|proto| proto.evolves(EvolutionKind::Grows));
                if let Some(becomes) = grows {
                    let base = self.base_sector_of(room);
                    self.change_terrain(room, becomes, base);
                }
                None
            }
            WorldEvent::UnloadCheck { room } => {
                if !self.rooms.contains(room) {
                    return None;
                }
                if self.can_unload_map_room(room) {
                    self.unload_map_room(room);
                    None
                } else {
                    Some(self.config.world.unload_check_secs as i64)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_fire_in_due_order() {
        let mut queue = EventQueue::new();
        queue.schedule(0, 30, "late");
        queue.schedule(0, 10, "early");
        assert!(queue.pop_due(5).is_none());
        assert_eq!(queue.pop_due(10).map(|(_, p)| p), Some("early"));
        assert!(queue.pop_due(20).is_none());
        assert_eq!(queue.pop_due(40).map(|(_, p)| p), Some("late"));
        assert!(queue.is_empty());
    }

    #[test]
    fn cancelled_event_returns_payload_and_never_fires() {
        let mut queue = EventQueue::new();
        let id = queue.schedule(0, 5, String::from("payload"));
        assert_eq!(queue.cancel(id).as_deref(), Some("payload"));
        assert!(queue.cancel(id).is_none());
        assert!(queue.pop_due(100).is_none());
    }

    #[test]
    fn requeue_keeps_the_id_and_ignores_stale_entries() {
        let mut queue = EventQueue::new();
        let id = queue.schedule(0, 5, 7u32);
        let (fired, payload) = queue.pop_due(5).expect("due");
        assert_eq!(fired, id);
        queue.requeue(id, 5, 10, payload);
        assert_eq!(queue.due_time(id), Some(15));
        assert!(queue.pop_due(10).is_none());
        assert_eq!(queue.pop_due(15).map(|(i, _)| i), Some(id));
    }

    #[test]
    fn past_absolute_time_fires_immediately() {
        let mut queue = EventQueue::new();
        let id = queue.schedule_at(50, "overdue");
        assert_eq!(queue.pop_due(100).map(|(i, _)| i), Some(id));
    }

    #[test]
    fn churned_cancellations_do_not_pile_up() {
        let mut queue = EventQueue::new();
        let keeper = queue.schedule(0, 10, 0u32);
        for n in 0..1_000u32 {
            let id = queue.schedule(0, 300, n);
            queue.cancel(id);
        }
        assert_eq!(queue.len(), 1);
        assert!(queue.heap_len() <= COMPACT_MIN_STALE + 1);
        assert_eq!(queue.pop_due(10).map(|(i, _)| i), Some(keeper));
        assert!(queue.pop_due(1_000).is_none());
    }

    #[test]
    fn zero_delay_is_bumped_to_one_second() {
        let mut queue = EventQueue::new();
        let id = queue.schedule(100, 0, ());
        assert_eq!(queue.due_time(id), Some(101));
    }
}
