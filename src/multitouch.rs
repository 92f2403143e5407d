/// Number of hardware slots the panel can report.
pub const MAX_TOUCHES: usize = 32;

/// The panel is a strict two-touch device.
pub const MAX_ALIVE: usize = 2;

/// Moves within this many raw units on both axes are sensor chatter.
pub const TOUCH_SLOP: f32 = 1.0;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// True when `other` is more than the slop away on either axis.
    pub fn moved_beyond_slop(&self, other: &Point) -> bool {
        (self.x - other.x).abs() > TOUCH_SLOP || (self.y - other.y).abs() > TOUCH_SLOP
    }
}

/// Size of the coordinate space raw positions are normalized against.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplaySize {
    pub width: f32,
    pub height: f32,
}

impl DisplaySize {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn normalize(&self, p: Point) -> (f32, f32) {
        (p.x / self.width, p.y / self.height)
    }
}

/// Per-slot state tag as reported by the hardware.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HardwareState {
    Down = 1,
    Moving = 2,
    Up = 3,
}

impl HardwareState {
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for HardwareState {
    type Error = u32;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(HardwareState::Down),
            2 => Ok(HardwareState::Moving),
            3 => Ok(HardwareState::Up),
            other => Err(other),
        }
    }
}

/// Device status accompanying each tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceStatus {
    Connected,
    TouchInfo,
    Disconnected,
    Other(u32),
}

impl From<u32> for DeviceStatus {
    fn from(code: u32) -> Self {
        match code {
            1 => DeviceStatus::Connected,
            2 => DeviceStatus::TouchInfo,
            3 => DeviceStatus::Disconnected,
            other => DeviceStatus::Other(other),
        }
    }
}

/// One slot's record within a tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlotReport {
    pub slot: usize,
    pub state: HardwareState,
    pub position: Point,
}

impl SlotReport {
    pub fn new(slot: usize, state: HardwareState, x: f32, y: f32) -> Self {
        Self {
            slot,
            state,
            position: Point::new(x, y),
        }
    }
}

/// Everything the hardware reported in one polling tick.
#[derive(Clone, Debug, PartialEq)]
pub struct TouchTick {
    pub status: DeviceStatus,
    pub reports: Vec<SlotReport>,
    /// Time the source observed the tick. Unstamped ticks take the relay's
    /// clock on arrival.
    pub time_ms: Option<u64>,
}

impl TouchTick {
    pub fn touches(reports: Vec<SlotReport>) -> Self {
        Self {
            status: DeviceStatus::TouchInfo,
            reports,
            time_ms: None,
        }
    }

    pub fn status(status: DeviceStatus) -> Self {
        Self {
            status,
            reports: Vec::new(),
            time_ms: None,
        }
    }

    pub fn stamped(mut self, time_ms: u64) -> Self {
        self.time_ms = Some(time_ms);
        self
    }
}

/// Fixed-size bitset over the 32 hardware slots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SlotSet(u32);

impl SlotSet {
    pub const EMPTY: SlotSet = SlotSet(0);
    pub const ALL: SlotSet = SlotSet(u32::MAX);

    #[allow(dead_code)]
    pub const fn from_bits(bits: u32) -> Self {
        SlotSet(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, slot: usize) -> bool {
        slot < MAX_TOUCHES && self.0 & (1 << slot) != 0
    }

    pub fn insert(&mut self, slot: usize) {
        if slot < MAX_TOUCHES {
            self.0 |= 1 << slot;
        }
    }

    pub fn remove(&mut self, slot: usize) {
        if slot < MAX_TOUCHES {
            self.0 &= !(1 << slot);
        }
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn union(self, other: SlotSet) -> SlotSet {
        SlotSet(self.0 | other.0)
    }

    pub fn intersection(self, other: SlotSet) -> SlotSet {
        SlotSet(self.0 & other.0)
    }

    /// Slots in ascending index order.
    pub fn iter(self) -> impl Iterator<Item = usize> {
        (0..MAX_TOUCHES).filter(move |&slot| self.contains(slot))
    }
}

/// Kind of a normalized event, with its wire code.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Birth = 0,
    Death = 1,
    Move = 2,
}

impl EventKind {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for EventKind {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(EventKind::Birth),
            1 => Ok(EventKind::Death),
            2 => Ok(EventKind::Move),
            other => Err(other),
        }
    }
}

/// A normalized event for one slot, ready for the wire.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TouchEvent {
    pub slot: usize,
    pub id: u8,
    pub kind: EventKind,
    /// Last accepted raw position.
    pub raw: Point,
    /// Normalized position, 0.0-1.0 on a well-configured display.
    pub x: f32,
    pub y: f32,
    /// Milliseconds since process start.
    pub time_ms: u64,
    /// Slots alive right after this event.
    pub alive: SlotSet,
}

// Linux input event codes used by the slot tracker.
const EV_SYN: u16 = 0x00;
const EV_ABS: u16 = 0x03;
const SYN_REPORT: u16 = 0x00;
const SYN_DROPPED: u16 = 0x03;
const ABS_MT_SLOT: u16 = 0x2f;
const ABS_MT_POSITION_X: u16 = 0x35;
const ABS_MT_POSITION_Y: u16 = 0x36;
const ABS_MT_TRACKING_ID: u16 = 0x39;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum SlotChange {
    #[default]
    None,
    Down,
    Moved,
    Up,
}

#[derive(Clone, Copy, Debug, Default)]
struct MtSlot {
    active: bool,
    tracking_id: i32,
    position: Point,
    change: SlotChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MtState {
    Loading,
    NeedsReset,
}

/// Kernel multitouch (protocol B) slot tracker. Feeds on raw
/// `(type, code, value)` triples and yields one tick per `SYN_REPORT` in which
/// at least one slot changed.
#[derive(Debug)]
pub struct MtSlotTracker {
    state: MtState,
    slot: Option<usize>,
    slots: [MtSlot; MAX_TOUCHES],
}

impl Default for MtSlotTracker {
    fn default() -> Self {
        Self {
            state: MtState::Loading,
            slot: Some(0),
            slots: [MtSlot::default(); MAX_TOUCHES],
        }
    }
}

impl MtSlotTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, ev_type: u16, code: u16, value: i32) -> Option<TouchTick> {
        match ev_type {
            EV_ABS => {
                self.process_abs(code, value);
                None
            }
            EV_SYN if code == SYN_DROPPED => {
                self.state = MtState::NeedsReset;
                None
            }
            EV_SYN if code == SYN_REPORT => self.flush(),
            _ => None,
        }
    }

    fn process_abs(&mut self, code: u16, value: i32) {
        if code == ABS_MT_SLOT {
            self.slot = usize::try_from(value).ok().filter(|&s| s < MAX_TOUCHES);
            return;
        }
        // Slots beyond what the relay tracks are ignored until the next ABS_MT_SLOT.
        let Some(index) = self.slot else {
            return;
        };
        let slot = &mut self.slots[index];
        match code {
            ABS_MT_TRACKING_ID => {
                if value < 0 {
                    if slot.active {
                        slot.active = false;
                        slot.change = SlotChange::Up;
                    }
                } else if !slot.active || slot.tracking_id != value {
                    slot.active = true;
                    slot.tracking_id = value;
                    slot.change = SlotChange::Down;
                }
            }
            ABS_MT_POSITION_X | ABS_MT_POSITION_Y => {
                if code == ABS_MT_POSITION_X {
                    slot.position.x = value as f32;
                } else {
                    slot.position.y = value as f32;
                }
                if slot.active && slot.change == SlotChange::None {
                    slot.change = SlotChange::Moved;
                }
            }
            _ => {}
        }
    }

    fn flush(&mut self) -> Option<TouchTick> {
        if self.state == MtState::NeedsReset {
            // Events were lost; release everything and let the hardware
            // re-announce live contacts.
            for slot in self.slots.iter_mut().filter(|s| s.active) {
                slot.active = false;
                slot.change = SlotChange::Up;
            }
            self.state = MtState::Loading;
        }

        let mut reports = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let state = match slot.change {
                SlotChange::None => continue,
                SlotChange::Down => HardwareState::Down,
                SlotChange::Moved => HardwareState::Moving,
                SlotChange::Up => HardwareState::Up,
            };
            reports.push(SlotReport {
                slot: index,
                state,
                position: slot.position,
            });
            slot.change = SlotChange::None;
        }

        if reports.is_empty() {
            None
        } else {
            Some(TouchTick::touches(reports))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_set_iterates_in_ascending_order() {
        let mut set = SlotSet::EMPTY;
        set.insert(9);
        set.insert(0);
        set.insert(31);
        set.insert(40);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 9, 31]);
        assert_eq!(set.len(), 3);
        set.remove(9);
        assert!(!set.contains(9));
        assert!(!set.contains(40));
        assert_eq!(SlotSet::ALL.len(), MAX_TOUCHES);
    }

    #[test]
    fn hardware_codes_map_to_states() {
        assert_eq!(HardwareState::try_from(1), Ok(HardwareState::Down));
        assert_eq!(HardwareState::try_from(2), Ok(HardwareState::Moving));
        assert_eq!(HardwareState::try_from(3), Ok(HardwareState::Up));
        assert_eq!(HardwareState::try_from(7), Err(7));
        assert_eq!(DeviceStatus::from(2), DeviceStatus::TouchInfo);
        assert_eq!(DeviceStatus::from(9), DeviceStatus::Other(9));
    }

    #[test]
    fn slop_is_exclusive_on_each_axis() {
        let p = Point::new(100.0, 100.0);
        assert!(!p.moved_beyond_slop(&Point::new(101.0, 99.0)));
        assert!(p.moved_beyond_slop(&Point::new(101.5, 100.0)));
        assert!(p.moved_beyond_slop(&Point::new(100.0, 98.0)));
    }

    fn feed(tracker: &mut MtSlotTracker, events: &[(u16, u16, i32)]) -> Vec<TouchTick> {
        events
            .iter()
            .filter_map(|&(t, c, v)| tracker.process(t, c, v))
            .collect()
    }

    #[test]
    fn tracker_reports_down_move_up() {
        let mut tracker = MtSlotTracker::new();
        let ticks = feed(
            &mut tracker,
            &[
                (EV_ABS, ABS_MT_SLOT, 1),
                (EV_ABS, ABS_MT_TRACKING_ID, 42),
                (EV_ABS, ABS_MT_POSITION_X, 100),
                (EV_ABS, ABS_MT_POSITION_Y, 200),
                (EV_SYN, SYN_REPORT, 0),
                (EV_ABS, ABS_MT_POSITION_X, 110),
                (EV_SYN, SYN_REPORT, 0),
                (EV_ABS, ABS_MT_TRACKING_ID, -1),
                (EV_SYN, SYN_REPORT, 0),
            ],
        );
        assert_eq!(
            ticks,
            vec![
                TouchTick::touches(vec![SlotReport::new(1, HardwareState::Down, 100.0, 200.0)]),
                TouchTick::touches(vec![SlotReport::new(1, HardwareState::Moving, 110.0, 200.0)]),
                TouchTick::touches(vec![SlotReport::new(1, HardwareState::Up, 110.0, 200.0)]),
            ]
        );
    }

    #[test]
    fn tracker_skips_quiet_frames_and_out_of_range_slots() {
        let mut tracker = MtSlotTracker::new();
        let ticks = feed(
            &mut tracker,
            &[
                (EV_SYN, SYN_REPORT, 0),
                (EV_ABS, ABS_MT_SLOT, 40),
                (EV_ABS, ABS_MT_TRACKING_ID, 5),
                (EV_SYN, SYN_REPORT, 0),
            ],
        );
        assert!(ticks.is_empty());
    }

    #[test]
    fn tracker_releases_everything_after_dropped_events() {
        let mut tracker = MtSlotTracker::new();
        feed(
            &mut tracker,
            &[
                (EV_ABS, ABS_MT_TRACKING_ID, 3),
                (EV_ABS, ABS_MT_POSITION_X, 5),
                (EV_ABS, ABS_MT_POSITION_Y, 6),
                (EV_SYN, SYN_REPORT, 0),
            ],
        );
        let ticks = feed(&mut tracker, &[(EV_SYN, SYN_DROPPED, 0), (EV_SYN, SYN_REPORT, 0)]);
        assert_eq!(
            ticks,
            vec![TouchTick::touches(vec![SlotReport::new(0, HardwareState::Up, 5.0, 6.0)])]
        );
    }
}
