//! Turns raw per-slot hardware reports into birth, move and death events.
//!
//! The panel driver has a few known defects this module repairs:
//!
//! - a full release may be reported late or never, so a later `Moving` report
//!   can arrive for a slot we already consider dead;
//! - it occasionally reports a third simultaneous touch on a two-touch panel;
//! - a resting finger produces a stream of identical positions.
//!
//! Within a tick, events are always emitted as deaths, then births (each with
//! an initial move), then moves, each group in ascending slot order.

use crate::multitouch::{
    DeviceStatus, DisplaySize, EventKind, HardwareState, Point, SlotSet, TouchEvent, TouchTick,
    MAX_ALIVE, MAX_TOUCHES,
};
use crate::registry::PointRegistry;
use tracing::{debug, warn};

pub struct EventNormalizer {
    registry: PointRegistry,
    next_id: u8,
    display: DisplaySize,
}

impl EventNormalizer {
    pub fn new(display: DisplaySize) -> Self {
        Self {
            registry: PointRegistry::new(),
            next_id: 0,
            display,
        }
    }

    pub fn registry(&self) -> &PointRegistry {
        &self.registry
    }

    pub fn display(&self) -> DisplaySize {
        self.display
    }

    /// Process one polling tick and return the events it produces, in order.
    pub fn process_tick(&mut self, tick: &TouchTick, now_ms: u64) -> Vec<TouchEvent> {
        let mut events = Vec::new();
        if tick.status != DeviceStatus::TouchInfo {
            debug!(status = ?tick.status, "device status report");
            return events;
        }

        let mut reported = SlotSet::EMPTY;
        let mut fresh: [Option<Point>; MAX_TOUCHES] = [None; MAX_TOUCHES];
        let mut births = SlotSet::EMPTY;
        let mut deaths = SlotSet::EMPTY;
        let mut moves = SlotSet::EMPTY;

        for report in &tick.reports {
            let slot = report.slot;
            if slot >= MAX_TOUCHES {
                warn!(slot, "ignoring report for out-of-range slot");
                continue;
            }
            if reported.contains(slot) {
                warn!(slot, "ignoring duplicate report within one tick");
                continue;
            }
            reported.insert(slot);
            fresh[slot] = Some(report.position);
            if let Some(point) = self.registry.point_mut(slot) {
                point.received_ms = now_ms;
            }

            match report.state {
                HardwareState::Down => {
                    if self.registry.is_alive(slot) {
                        // Release of the previous contact was never reported.
                        deaths.insert(slot);
                    }
                    births.insert(slot);
                }
                HardwareState::Moving if self.registry.is_alive(slot) => {
                    moves.insert(slot);
                }
                HardwareState::Moving => {
                    // The birth for this slot was lost. Restart everything.
                    warn!(slot, "move reported for a dead slot, resetting all points");
                    deaths = SlotSet::ALL;
                    births = self.registry.alive().union(births).union(moves);
                    births.insert(slot);
                }
                HardwareState::Up => deaths.insert(slot),
            }
        }

        for slot in deaths.intersection(self.registry.alive()).iter() {
            events.extend(self.death(slot));
        }

        let alive = self.registry.alive_count();
        if alive + births.len() > MAX_ALIVE {
            warn!(alive, births = births.len(), "too many touches, clearing all points");
            for slot in self.registry.alive().iter() {
                events.extend(self.death(slot));
            }
        }

        for slot in self.cap_births(births, reported).iter() {
            let position = match (fresh[slot], self.registry.point(slot)) {
                (Some(p), _) => p,
                (None, Some(point)) => point.position,
                (None, None) => continue,
            };
            events.extend(self.birth(slot, position, now_ms));
            events.extend(self.movement(slot, position, now_ms));
        }

        for slot in moves.iter() {
            if let Some(position) = fresh[slot] {
                events.extend(self.movement(slot, position, now_ms));
            }
        }

        events
    }

    /// Trim births to the room left under the two-touch limit. Slots reported
    /// this tick win over slots only being reborn, then lower slots win.
    fn cap_births(&self, births: SlotSet, reported: SlotSet) -> SlotSet {
        let room = MAX_ALIVE.saturating_sub(self.registry.alive_count());
        if births.len() <= room {
            return births;
        }
        let fresh = births.intersection(reported);
        let stale = births.iter().filter(|&slot| !reported.contains(slot));
        let mut kept = SlotSet::EMPTY;
        for slot in fresh.iter().chain(stale).take(room) {
            kept.insert(slot);
        }
        for slot in births.iter().filter(|&slot| !kept.contains(slot)) {
            warn!(slot, "dropping birth beyond the two-touch limit");
        }
        kept
    }

    /// Kill an alive slot outside of a hardware tick. With `refresh_ms` the
    /// record carries that time instead of the slot's last event time.
    pub fn force_death(&mut self, slot: usize, refresh_ms: Option<u64>) -> Option<TouchEvent> {
        if !self.registry.is_alive(slot) {
            return None;
        }
        if let (Some(now), Some(point)) = (refresh_ms, self.registry.point_mut(slot)) {
            point.time_ms = now;
        }
        self.death(slot)
    }

    fn birth(&mut self, slot: usize, position: Point, now_ms: u64) -> Option<TouchEvent> {
        let id = self.allocate_id();
        self.registry.mark_alive(slot, id);
        self.update(slot, position, now_ms, EventKind::Birth)
    }

    fn movement(&mut self, slot: usize, position: Point, now_ms: u64) -> Option<TouchEvent> {
        if !self.registry.is_alive(slot) {
            return None;
        }
        let point = self.registry.point(slot)?;
        if point.state != EventKind::Birth && !point.position.moved_beyond_slop(&position) {
            return None;
        }
        self.update(slot, position, now_ms, EventKind::Move)
    }

    fn death(&mut self, slot: usize) -> Option<TouchEvent> {
        if !self.registry.is_alive(slot) {
            return None;
        }
        let point = self.registry.point_mut(slot)?;
        point.state = EventKind::Death;
        self.next_id = point.id;
        self.registry.mark_dead(slot);
        self.emit(slot)
    }

    fn update(
        &mut self,
        slot: usize,
        position: Point,
        now_ms: u64,
        kind: EventKind,
    ) -> Option<TouchEvent> {
        let (x, y) = self.display.normalize(position);
        let point = self.registry.point_mut(slot)?;
        point.position = position;
        point.x = x;
        point.y = y;
        point.time_ms = now_ms;
        point.state = kind;
        self.emit(slot)
    }

    fn emit(&mut self, slot: usize) -> Option<TouchEvent> {
        let point = self.registry.point_mut(slot)?;
        point.sent_ms = point.received_ms;
        Some(TouchEvent {
            slot,
            id: point.id,
            kind: point.state,
            raw: point.position,
            x: point.x,
            y: point.y,
            time_ms: point.time_ms,
            alive: self.registry.alive(),
        })
    }

    /// Take `next_id` and toggle it. A death resets `next_id` to the freed ID.
    fn allocate_id(&mut self) -> u8 {
        let id = if self.registry.id_in_use(self.next_id) {
            1 - self.next_id
        } else {
            self.next_id
        };
        self.next_id = 1 - id;
        id
    }
}
