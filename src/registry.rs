use crate::multitouch::{EventKind, Point, SlotSet, MAX_TOUCHES};

/// Relay-side record of one hardware slot.
#[derive(Clone, Copy, Debug)]
pub struct TouchPoint {
    pub slot: usize,
    pub id: u8,
    /// Last accepted raw position.
    pub position: Point,
    pub x: f32,
    pub y: f32,
    /// Kind of the last event emitted for this slot.
    pub state: EventKind,
    /// Time carried by the next record for this slot.
    pub time_ms: u64,
    /// Time of the last tick that reported this slot.
    pub received_ms: u64,
    /// `received_ms` as of the last record emitted for this slot.
    pub sent_ms: u64,
}

impl TouchPoint {
    fn new(slot: usize) -> Self {
        Self {
            slot,
            id: 0,
            position: Point::default(),
            x: 0.0,
            y: 0.0,
            state: EventKind::Death,
            time_ms: 0,
            received_ms: 0,
            sent_ms: 0,
        }
    }
}

/// Fixed table of all hardware slots plus the bitset of alive ones.
///
/// The bitset is the only source of truth for liveness. Slot indices must be
/// below [`MAX_TOUCHES`]; anything else trips a debug assertion and is
/// ignored in release builds.
#[derive(Debug)]
pub struct PointRegistry {
    points: [TouchPoint; MAX_TOUCHES],
    alive: SlotSet,
}

impl Default for PointRegistry {
    fn default() -> Self {
        Self {
            points: std::array::from_fn(TouchPoint::new),
            alive: SlotSet::EMPTY,
        }
    }
}

impl PointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_alive(&self, slot: usize) -> bool {
        debug_assert!(slot < MAX_TOUCHES, "slot {slot} out of range");
        self.alive.contains(slot)
    }

    pub fn mark_alive(&mut self, slot: usize, id: u8) {
        debug_assert!(slot < MAX_TOUCHES, "slot {slot} out of range");
        if let Some(point) = self.points.get_mut(slot) {
            point.id = id;
            self.alive.insert(slot);
        }
    }

    pub fn mark_dead(&mut self, slot: usize) {
        debug_assert!(slot < MAX_TOUCHES, "slot {slot} out of range");
        self.alive.remove(slot);
    }

    pub fn alive_count(&self) -> usize {
        self.alive.len()
    }

    pub fn alive(&self) -> SlotSet {
        self.alive
    }

    pub fn point(&self, slot: usize) -> Option<&TouchPoint> {
        self.points.get(slot)
    }

    pub fn point_mut(&mut self, slot: usize) -> Option<&mut TouchPoint> {
        self.points.get_mut(slot)
    }

    /// True when an alive slot currently holds output `id`.
    pub fn id_in_use(&self, id: u8) -> bool {
        self.alive.iter().any(|slot| self.points[slot].id == id)
    }
}
