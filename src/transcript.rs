//! Replayable session transcript.
//!
//! In test mode every record is also written as a Jmol script line so a
//! session can be played back later, given a `data.spt` defining
//! `setWidthHeight(w, h)` and `pt(id, index, state, time, x, y, nx, ny)`.
//! Comments use `//` so the whole transcript is valid script.

use crate::multitouch::{DisplaySize, SlotReport, TouchEvent};
use std::io::{self, Write};

pub struct Transcript<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> Transcript<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn header(&mut self, display: DisplaySize) -> io::Result<()> {
        writeln!(
            self.out,
            "// {} {}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        )?;
        writeln!(self.out, "// Load this transcript in Jmol with SCRIPT <file>")?;
        writeln!(self.out, "script data.spt")?;
        writeln!(
            self.out,
            "setWidthHeight({},{});",
            display.width as i32, display.height as i32
        )?;
        self.out.flush()
    }

    pub fn event(&mut self, event: &TouchEvent) -> io::Result<()> {
        write!(
            self.out,
            "pt({},{},{},{},{},{},{},{});// Active touchpoints [",
            event.id,
            event.slot,
            event.kind.code(),
            event.time_ms,
            event.raw.x as i32,
            event.raw.y as i32,
            event.x,
            event.y
        )?;
        for slot in event.alive.iter() {
            write!(self.out, " {}", slot)?;
        }
        writeln!(self.out, " ]")?;
        self.out.flush()
    }

    pub fn comment(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "// {}", text)?;
        self.out.flush()
    }

    /// Raw capture line, readable by the replay backend.
    pub fn raw(&mut self, time_ms: u64, report: &SlotReport) -> io::Result<()> {
        writeln!(
            self.out,
            "received: {} id={} {} {} {}",
            time_ms,
            report.slot,
            report.state.code(),
            report.position.x,
            report.position.y
        )?;
        self.out.flush()
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multitouch::{EventKind, HardwareState, Point, SlotSet};

    fn text(transcript: Transcript<Vec<u8>>) -> String {
        String::from_utf8(transcript.into_inner()).unwrap_or_default()
    }

    #[test]
    fn header_names_the_display() {
        let mut t = Transcript::new(Vec::new());
        t.header(DisplaySize::new(1920.0, 1080.0)).unwrap();
        let out = text(t);
        assert!(out.contains("script data.spt\n"));
        assert!(out.ends_with("setWidthHeight(1920,1080);\n"));
    }

    #[test]
    fn event_line_lists_alive_slots() {
        let mut t = Transcript::new(Vec::new());
        let mut alive = SlotSet::EMPTY;
        alive.insert(3);
        alive.insert(5);
        let event = TouchEvent {
            slot: 5,
            id: 1,
            kind: EventKind::Move,
            raw: Point::new(110.0, 100.0),
            x: 0.5,
            y: 0.25,
            time_ms: 42,
            alive,
        };
        t.event(&event).unwrap();
        assert_eq!(
            text(t),
            "pt(1,5,2,42,110,100,0.5,0.25);// Active touchpoints [ 3 5 ]\n"
        );
    }

    #[test]
    fn raw_line_matches_capture_format() {
        let mut t = Transcript::new(Vec::new());
        t.raw(17, &SlotReport::new(4, HardwareState::Moving, 12.5, 8.0))
            .unwrap();
        assert_eq!(text(t), "received: 17 id=4 2 12.5 8\n");
    }
}
