//! The wall-clock contract (§6), used only to stamp CTIME entries.

/// A source of creation timestamps.
///
/// Returns `(days_since_epoch, picoseconds_within_day)`, matching the
/// two-word layout CTIME payloads use on disk.
pub trait Clock {
    fn now(&self) -> (u32, u64);
}

/// A deterministic clock for tests: ticks forward by one day on every call
/// so that successive creations are orderable without depending on wall
/// time.
#[derive(Default)]
pub struct TickingClock {
    day: std::cell::Cell<u32>,
}

impl Clock for TickingClock {
    fn now(&self) -> (u32, u64) {
        let day = self.day.get();
        self.day.set(day + 1);
        (day, 0)
    }
}
