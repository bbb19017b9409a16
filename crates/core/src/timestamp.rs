use std::time::{SystemTime, UNIX_EPOCH};

use crate::CoreError;

const ENCODED_LEN: usize = 12;

fn wall_clock_ms() -> Result<u64, CoreError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .map_err(|_| CoreError::InvalidData("system clock before epoch".into()))
}

/// When a contact row was created, changed or deleted.
///
/// Stored as a 12-byte blob: milliseconds since the epoch, then a sequence
/// number for rows stamped within the same millisecond, both big-endian.
/// Blob order therefore equals field order, which is what primary election
/// compares.
#[derive(Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Timestamp {
    wall_ms: u64,
    counter: u32,
}

impl Timestamp {
    pub fn new(wall_ms: u64, counter: u32) -> Self {
        Self { wall_ms, counter }
    }

    pub fn wall_ms(&self) -> u64 {
        self.wall_ms
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn to_bytes(&self) -> [u8; ENCODED_LEN] {
        let mut buf = [0u8; ENCODED_LEN];
        buf[..8].copy_from_slice(&self.wall_ms.to_be_bytes());
        buf[8..].copy_from_slice(&self.counter.to_be_bytes());
        buf
    }

    /// Decode a stamp column. Anything but exactly 12 bytes is rejected.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        let (wall, counter) = match bytes {
            [wall @ .., c0, c1, c2, c3] if wall.len() == 8 => (wall, [*c0, *c1, *c2, *c3]),
            _ => {
                return Err(CoreError::InvalidData(format!(
                    "timestamp must be {ENCODED_LEN} bytes, got {}",
                    bytes.len()
                )));
            }
        };
        let mut wall_ms = [0u8; 8];
        wall_ms.copy_from_slice(wall);
        Ok(Self::new(u64::from_be_bytes(wall_ms), u32::from_be_bytes(counter)))
    }

    /// The next stamp after `self` given the wall clock reads `now_ms`.
    fn next(self, now_ms: u64) -> Self {
        if now_ms > self.wall_ms {
            Self::new(now_ms, 0)
        } else {
            Self::new(self.wall_ms, self.counter.saturating_add(1))
        }
    }
}

/// Issues stamps for one store handle. Each stamp sorts after every stamp the
/// clock has issued or observed, even if the wall clock stalls or steps back.
#[derive(Debug, Default)]
pub struct TimestampClock {
    last: Timestamp,
}

impl TimestampClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&mut self) -> Result<Timestamp, CoreError> {
        self.last = self.last.next(wall_clock_ms()?);
        Ok(self.last)
    }

    /// Move past a stamp already in the database, so rows written by this
    /// handle never sort before rows written earlier.
    pub fn observe(&mut self, seen: &Timestamp) {
        self.last = self.last.max(*seen);
    }
}
