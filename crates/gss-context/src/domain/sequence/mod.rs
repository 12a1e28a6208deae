//! # Sequence Tracker
//!
//! Classifies per-message sequence numbers received on a context as in
//! order, duplicate, old, unsequenced or a gap.
//!
//! History is kept as at most [`MAX_INTERVALS`] disjoint, non-adjacent,
//! sorted closed intervals of numbers already seen. When a new interval is
//! needed and the list is full, the interval marking the start of the
//! window is recycled and the window start advances to its successor.
//!
//! Numbers are carried as `i64` internally so that the sentinel below the
//! initial number and `number + 1` never overflow. Sequence numbers are not
//! expected to wrap around `u32::MAX` within a context.

use gss_types::SupplementaryStatus;

/// Maximum number of tracked intervals.
pub const MAX_INTERVALS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Interval {
    start: i64,
    end: i64,
}

impl Interval {
    fn single(number: i64) -> Self {
        Self {
            start: number,
            end: number,
        }
    }

    fn contains(&self, number: i64) -> bool {
        self.start <= number && number <= self.end
    }
}

/// Replay and ordering detector for one direction of one context.
///
/// Not internally synchronized: `classify` takes `&mut self`, so the owning
/// context serializes access.
#[derive(Debug, Clone)]
pub struct SequenceTracker {
    init_number: i64,
    window_start: i64,
    expected_number: i64,
    window_start_index: usize,
    intervals: Vec<Interval>,
}

impl SequenceTracker {
    /// Tracker expecting `init_number` first.
    pub fn new(init_number: u32) -> Self {
        let init = i64::from(init_number);
        let mut intervals = Vec::with_capacity(MAX_INTERVALS);
        // Sentinel: the number just before the first valid one counts as seen.
        intervals.push(Interval::single(init - 1));
        Self {
            init_number: init,
            window_start: init,
            expected_number: init,
            window_start_index: 0,
            intervals,
        }
    }

    pub fn init_number(&self) -> u32 {
        self.init_number as u32
    }

    /// Next number that would be in order.
    pub fn expected_number(&self) -> i64 {
        self.expected_number
    }

    /// Lower edge of the tracked history.
    pub fn window_start(&self) -> i64 {
        self.window_start
    }

    pub fn interval_count(&self) -> usize {
        self.intervals.len()
    }

    /// Classify `number` and record it.
    pub fn classify(&mut self, number: u32) -> SupplementaryStatus {
        let number = i64::from(number);
        let pos = self.interval_index(number);

        let status = if number == self.expected_number {
            self.expected_number += 1;
            SupplementaryStatus::InOrder
        } else if pos.is_some_and(|p| self.intervals[p].contains(number)) {
            SupplementaryStatus::Duplicate
        } else {
            self.position_status(number)
        };

        if !matches!(
            status,
            SupplementaryStatus::Duplicate | SupplementaryStatus::Old
        ) {
            self.add(number, pos);
        }
        if status == SupplementaryStatus::Gap {
            self.expected_number = number + 1;
        }
        status
    }

    /// Relative placement of an unseen, out-of-order number.
    fn position_status(&self, number: i64) -> SupplementaryStatus {
        use SupplementaryStatus::{Gap, Old, Unsequenced};

        let (init, start, expected) = (self.init_number, self.window_start, self.expected_number);
        if expected >= init {
            // ----|-----------|--------------|---->
            //   init     windowStart     expected
            if number > expected {
                Gap
            } else if number >= start {
                Unsequenced
            } else if number >= init {
                Old
            } else {
                Gap
            }
        } else if number > expected {
            // expected fell below init after a gap under the initial number
            if number < init {
                Gap
            } else if start >= init {
                if number >= start {
                    Unsequenced
                } else {
                    Old
                }
            } else {
                Old
            }
        } else if start > expected {
            Unsequenced
        } else if number < start {
            Old
        } else {
            Unsequenced
        }
    }

    /// Index of the last interval starting at or below `number`.
    fn interval_index(&self, number: i64) -> Option<usize> {
        self.intervals.iter().rposition(|i| i.start <= number)
    }

    fn add(&mut self, number: i64, prev: Option<usize>) {
        let mut prev = prev;

        let mut appended = false;
        if let Some(p) = prev {
            if number == self.intervals[p].end + 1 {
                self.intervals[p].end = number;
                appended = true;
            }
        }

        let next = prev.map_or(0, |p| p + 1);
        if next < self.intervals.len() && number == self.intervals[next].start - 1 {
            match prev {
                Some(p) if appended => {
                    // number bridges two intervals
                    self.intervals[next].start = self.intervals[p].start;
                    self.intervals.remove(p);
                    if self.window_start_index > p {
                        self.window_start_index -= 1;
                    }
                }
                _ => self.intervals[next].start = number,
            }
            return;
        }
        if appended {
            return;
        }

        if self.intervals.len() < MAX_INTERVALS {
            if prev.map_or(true, |p| p < self.window_start_index) {
                self.window_start_index += 1;
            }
        } else {
            let old_index = self.window_start_index;
            if self.window_start_index == self.intervals.len() - 1 {
                self.window_start_index = 0;
            }
            self.intervals.remove(old_index);
            self.window_start = self.intervals[self.window_start_index].start;

            match prev {
                Some(p) if p >= old_index => prev = p.checked_sub(1),
                _ if old_index != self.window_start_index => {
                    // window start wrapped to the front
                    if prev.is_none() {
                        self.window_start = number;
                    }
                }
                _ => self.window_start_index += 1,
            }
        }

        let at = prev.map_or(0, |p| p + 1);
        self.intervals.insert(at, Interval::single(number));
    }
}
