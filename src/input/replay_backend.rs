//! Replays a raw capture, as printed with `--raw`, in place of hardware.
//!
//! Each line is `received: <ms> id=<slot> <state> <x> <y>`. Consecutive
//! lines with the same timestamp form one tick. Blank lines and `//`
//! comments are skipped, and so is any line that does not parse.

use super::{InputBackend, InputError};
use crate::multitouch::{HardwareState, SlotReport, TouchTick};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, PartialEq, thiserror::Error)]
#[error("line {line}: {reason}")]
pub struct ReplayError {
    pub line: usize,
    pub reason: String,
}

/// How replayed ticks are spread over time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pacing {
    /// Sleep between ticks as recorded; the relay runs on its own clock.
    Realtime,
    /// Deliver as fast as possible, each tick stamped with its recorded time.
    Recorded,
}

pub struct ReplayBackend<R> {
    lines: Lines<R>,
    line_no: usize,
    pending: Option<(u64, SlotReport)>,
    last_time: Option<u64>,
    pacing: Pacing,
}

impl ReplayBackend<BufReader<File>> {
    pub fn open(path: &Path, pacing: Pacing) -> Result<Self, InputError> {
        let file = File::open(path)
            .map_err(|e| InputError::OpenFailed(format!("{}: {}", path.display(), e)))?;
        Ok(Self::from_reader(BufReader::new(file), pacing))
    }
}

impl<R: BufRead> ReplayBackend<R> {
    pub fn from_reader(reader: R, pacing: Pacing) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            pending: None,
            last_time: None,
            pacing,
        }
    }

    fn next_record(&mut self) -> Result<Option<(u64, SlotReport)>, InputError> {
        if let Some(record) = self.pending.take() {
            return Ok(Some(record));
        }
        for line in self.lines.by_ref() {
            self.line_no += 1;
            let line = line.map_err(|e| InputError::ReadError(e.to_string()))?;
            match parse_line(&line, self.line_no) {
                Ok(Some(record)) => return Ok(Some(record)),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "skipping capture line"),
            }
        }
        Ok(None)
    }

    fn pace(&mut self, tick: TouchTick, time_ms: u64) -> TouchTick {
        let last = self.last_time.replace(time_ms);
        match self.pacing {
            Pacing::Realtime => {
                if let Some(last) = last {
                    thread::sleep(Duration::from_millis(time_ms.saturating_sub(last)));
                }
                tick
            }
            Pacing::Recorded => tick.stamped(time_ms),
        }
    }
}

impl<R: BufRead + Send + 'static> InputBackend for ReplayBackend<R> {
    fn grab(&mut self) -> Result<(), InputError> {
        Ok(())
    }

    fn poll_tick(&mut self) -> Result<Option<TouchTick>, InputError> {
        let Some((time_ms, first)) = self.next_record()? else {
            return Err(InputError::Closed);
        };
        let mut reports = vec![first];
        while let Some((time, report)) = self.next_record()? {
            if time != time_ms {
                self.pending = Some((time, report));
                break;
            }
            reports.push(report);
        }
        Ok(Some(self.pace(TouchTick::touches(reports), time_ms)))
    }
}

/// Parse one capture line. `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str, line_no: usize) -> Result<Option<(u64, SlotReport)>, ReplayError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with("//") {
        return Ok(None);
    }
    let err = |reason: &str| ReplayError {
        line: line_no,
        reason: reason.to_string(),
    };

    let rest = line
        .strip_prefix("received:")
        .ok_or_else(|| err("expected `received:`"))?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let [time, slot, state, x, y] = fields[..] else {
        return Err(err("expected 5 fields"));
    };

    let time: u64 = time.parse().map_err(|_| err("bad timestamp"))?;
    let slot: usize = slot
        .strip_prefix("id=")
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| err("bad slot"))?;
    let code: u32 = state.parse().map_err(|_| err("bad state"))?;
    let state = HardwareState::try_from(code).map_err(|c| err(&format!("unknown state {}", c)))?;
    let x: f32 = x.parse().map_err(|_| err("bad x"))?;
    let y: f32 = y.parse().map_err(|_| err("bad y"))?;

    Ok(Some((time, SlotReport::new(slot, state, x, y))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const CAPTURE: &str = "\
// session start
received: 10 id=3 1 100 100
received: 10 id=4 1 200 200

received: 30 id=3 2 110.5 100
not a capture line
received: 50 id=3 3 110.5 100
";

    #[test]
    fn parses_capture_lines() {
        assert_eq!(
            parse_line("received: 12 id=7 2 1.5 -3", 1),
            Ok(Some((12, SlotReport::new(7, HardwareState::Moving, 1.5, -3.0))))
        );
        assert_eq!(parse_line("   ", 2), Ok(None));
        assert_eq!(parse_line("// note", 3), Ok(None));
    }

    #[test]
    fn reports_what_is_wrong_with_a_line() {
        let e = parse_line("received: 1 id=2 9 0 0", 4).unwrap_err();
        assert_eq!(e.line, 4);
        assert!(e.reason.contains("unknown state 9"));
        assert!(parse_line("received: 1 slot=2 1 0 0", 5).is_err());
        assert!(parse_line("received: 1 id=2 1 0", 6).is_err());
        assert!(parse_line("pt(0,1,2);", 7).is_err());
    }

    #[test]
    fn groups_lines_by_timestamp_and_stamps_recorded_time() {
        let mut backend =
            ReplayBackend::from_reader(Cursor::new(CAPTURE.as_bytes()), Pacing::Recorded);

        let first = backend.poll_tick().unwrap().unwrap();
        assert_eq!(
            first.reports,
            vec![
                SlotReport::new(3, HardwareState::Down, 100.0, 100.0),
                SlotReport::new(4, HardwareState::Down, 200.0, 200.0),
            ]
        );
        assert_eq!(first.time_ms, Some(10));

        let second = backend.poll_tick().unwrap().unwrap();
        assert_eq!(
            second.reports,
            vec![SlotReport::new(3, HardwareState::Moving, 110.5, 100.0)]
        );
        assert_eq!(second.time_ms, Some(30));

        let third = backend.poll_tick().unwrap().unwrap();
        assert_eq!(third.reports[0].state, HardwareState::Up);
        assert_eq!(third.time_ms, Some(50));

        assert!(matches!(backend.poll_tick(), Err(InputError::Closed)));
    }

    #[test]
    fn realtime_ticks_are_left_for_the_relay_clock() {
        let mut backend = ReplayBackend::from_reader(
            Cursor::new("received: 4 id=1 1 0 0\n".as_bytes()),
            Pacing::Realtime,
        );
        let tick = backend.poll_tick().unwrap().unwrap();
        assert_eq!(tick.time_ms, None);
    }
}
