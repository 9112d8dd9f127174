//! The yaw/pitch movement plan.
//!
//! A plan is an ordered sequence of constant-rate segments with a cursor on
//! the segment containing "now". Everything before the cursor is history
//! whose durations have been fixed to what actually elapsed; the cursor
//! entry is in progress; entries after it are the planner's forecast; and
//! the final entry is always a search segment of effectively infinite
//! duration that slews the turret until a target reappears.
//!
//! The plan doubles as the record of the turret's own motion, which the
//! tracker consults when reprojecting users across time.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::angles::secs;

/// Duration standing in for "forever": the terminal search segment.
pub const LARGE_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// History beyond this window is useless to reprojection and gets pruned.
const HISTORY_WINDOW: Duration = Duration::from_secs(10);

/// One constant-rate segment of the trajectory.
///
/// `start` is `None` while the segment has not begun; the planner stamps
/// forecast segments with their predicted starts and the controller
/// restamps each one with the actual time the cursor arrives. Readers
/// walking the plan skip unstamped segments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SingleMovement {
    pub start: Option<Instant>,
    pub duration: Duration,
    /// Yaw angular velocity over the segment, rad/s.
    pub yaw_rate: f64,
    /// Pitch the turret must reach by the end of the segment, radians.
    pub ending_pitch: f64,
}

impl SingleMovement {
    /// Whether this is a search segment (unbounded duration).
    pub fn is_search(&self) -> bool {
        self.duration >= LARGE_DURATION
    }
}

/// The plan: segments plus the cursor.
#[derive(Debug)]
pub struct MovementPlan {
    segments: VecDeque<SingleMovement>,
    cursor: usize,
    /// Bumped every time the cursor advances; lets callers wait for
    /// movement boundaries.
    generation: u64,
}

impl MovementPlan {
    /// Bootstrap plan: an idle segment from startup, then a search segment.
    /// The cursor sits on the search segment, the only time it may sit on
    /// the last entry.
    pub fn new(now: Instant, search_yaw_velocity: f64) -> Self {
        let mut segments = VecDeque::new();
        segments.push_back(SingleMovement {
            start: Some(now),
            duration: Duration::ZERO,
            yaw_rate: 0.0,
            ending_pitch: 0.0,
        });
        segments.push_back(SingleMovement {
            start: None,
            duration: LARGE_DURATION,
            yaw_rate: search_yaw_velocity,
            ending_pitch: 0.0,
        });
        Self {
            segments,
            cursor: 1,
            generation: 0,
        }
    }

    pub fn current(&self) -> &SingleMovement {
        &self.segments[self.cursor]
    }

    pub fn cursor_on_search(&self) -> bool {
        self.cursor + 1 == self.segments.len()
    }

    /// Number of segments, history included.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> impl Iterator<Item = &SingleMovement> {
        self.segments.iter()
    }

    /// Move the cursor to the next segment, stamping its start to `now` and
    /// fixing the finished segment's duration to its actual elapsed time.
    /// Returns the new current segment, or `None` when the cursor already
    /// sits on the final (search) segment.
    pub fn advance(&mut self, now: Instant) -> Option<SingleMovement> {
        if self.cursor + 1 >= self.segments.len() {
            return None;
        }
        // Fix the finished segment into history: a still-unstamped start
        // (the bootstrap search) collapses to a zero-length segment at now.
        let prev_start = self.segments[self.cursor].start.unwrap_or(now);
        self.segments[self.cursor].start = Some(prev_start);
        self.segments[self.cursor].duration = now.saturating_duration_since(prev_start);
        self.cursor += 1;
        self.segments[self.cursor].start = Some(now);
        self.generation += 1;
        Some(self.segments[self.cursor])
    }

    /// Monotonic count of cursor advances.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replace everything after the cursor with `future` and a fresh search
    /// segment slewing in the direction the plan ends with. Prunes stale
    /// history. The whole edit happens under the caller's lock, so readers
    /// never observe a plan without its trailing search segment.
    pub fn replace_future(
        &mut self,
        now: Instant,
        future: Vec<SingleMovement>,
        search_yaw_velocity: f64,
    ) {
        self.segments.truncate(self.cursor + 1);
        let last_rate = future
            .last()
            .map(|m| m.yaw_rate)
            .unwrap_or(self.segments[self.cursor].yaw_rate);
        self.segments.extend(future);
        self.segments.push_back(SingleMovement {
            start: None,
            duration: LARGE_DURATION,
            yaw_rate: search_yaw_velocity.abs().copysign(last_rate),
            ending_pitch: 0.0,
        });
        self.prune_history(now);
    }

    /// Yaw the turret swept during `[early, late]`, radians, signed.
    ///
    /// Sums `yaw_rate × overlap` over every started segment (history, the
    /// current segment, and stamped forecasts). A segment that has not
    /// started (the trailing search) lies beyond any meaningful
    /// projection interval and contributes nothing.
    pub fn yaw_travel(&self, early: Instant, late: Instant) -> f64 {
        let mut total = 0.0;
        for segment in &self.segments {
            let Some(start) = segment.start else {
                continue;
            };
            let end = start + segment.duration;
            let from = start.max(early);
            let to = end.min(late);
            if to > from {
                total += segment.yaw_rate * secs(to.duration_since(from));
            }
        }
        total
    }

    fn prune_history(&mut self, now: Instant) {
        while self.cursor > 0 {
            let front = &self.segments[0];
            let ended = match front.start {
                Some(start) => start + front.duration,
                None => break,
            };
            if now.saturating_duration_since(ended) > HISTORY_WINDOW {
                self.segments.pop_front();
                self.cursor -= 1;
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movement(rate: f64, millis: u64) -> SingleMovement {
        SingleMovement {
            start: None,
            duration: Duration::from_millis(millis),
            yaw_rate: rate,
            ending_pitch: 0.0,
        }
    }

    #[test]
    fn test_bootstrap_shape() {
        let now = Instant::now();
        let plan = MovementPlan::new(now, 0.5);
        assert_eq!(plan.len(), 2);
        assert!(plan.cursor_on_search());
        assert!(plan.current().is_search());
        assert_eq!(plan.current().yaw_rate, 0.5);
    }

    #[test]
    fn test_replace_future_appends_single_search() {
        let now = Instant::now();
        let mut plan = MovementPlan::new(now, 0.5);
        plan.replace_future(
            now,
            vec![movement(0.1, 30), movement(-0.2, 30)],
            0.5,
        );

        let searches = plan.segments().filter(|m| m.is_search()).count();
        // The bootstrap search is still the cursor entry; exactly one new
        // search trails the forecast.
        assert_eq!(searches, 2);
        let last = plan.segments().last().unwrap();
        assert!(last.is_search());
        // Search direction follows the final planned rate.
        assert_eq!(last.yaw_rate, -0.5);
        assert!(!plan.cursor_on_search());
    }

    #[test]
    fn test_advance_stamps_times() {
        let now = Instant::now();
        let mut plan = MovementPlan::new(now, 0.5);
        plan.replace_future(now, vec![movement(0.1, 30), movement(0.2, 30)], 0.5);

        let later = now + Duration::from_millis(40);
        let current = plan.advance(later).unwrap();
        assert_eq!(current.yaw_rate, 0.1);
        assert_eq!(current.start, Some(later));

        // The segment we left (the bootstrap search, started implicitly at
        // `later`... it was unstamped) had its duration fixed.
        let durations: Vec<_> = plan.segments().map(|m| m.duration).collect();
        assert!(durations[1] < LARGE_DURATION);

        let even_later = later + Duration::from_millis(25);
        let current = plan.advance(even_later).unwrap();
        assert_eq!(current.yaw_rate, 0.2);
        // Previous segment's duration matches its actual run time.
        let stamped: Vec<_> = plan.segments().cloned().collect();
        assert_eq!(stamped[2].duration, Duration::from_millis(25));
    }

    #[test]
    fn test_advance_stops_at_search() {
        let now = Instant::now();
        let mut plan = MovementPlan::new(now, 0.5);
        plan.replace_future(now, vec![movement(0.1, 30)], 0.5);

        assert!(plan.advance(now).is_some()); // into the forecast
        assert!(plan.advance(now).is_some()); // into the search segment
        assert!(plan.cursor_on_search());
        assert!(plan.advance(now).is_none()); // nowhere further to go
    }

    #[test]
    fn test_yaw_travel_over_plan() {
        // Plan: 1.0 rad/s for 100 ms. A user recorded at segment start and
        // reprojected to its end sees 0.1 rad of turret travel.
        let t0 = Instant::now();
        let mut plan = MovementPlan::new(t0, 0.5);
        plan.replace_future(t0, vec![movement(1.0, 100)], 0.5);
        plan.advance(t0); // start the 1.0 rad/s segment at t0

        let travel = plan.yaw_travel(t0, t0 + Duration::from_millis(100));
        approx::assert_relative_eq!(travel, 0.1, epsilon = 1e-9);

        // A sub-interval counts only its overlap.
        let travel = plan.yaw_travel(
            t0 + Duration::from_millis(25),
            t0 + Duration::from_millis(75),
        );
        approx::assert_relative_eq!(travel, 0.05, epsilon = 1e-9);
    }

    #[test]
    fn test_yaw_travel_spans_segments() {
        let t0 = Instant::now();
        let mut plan = MovementPlan::new(t0, 0.5);
        plan.replace_future(t0, vec![movement(1.0, 100), movement(-0.5, 100)], 0.5);
        plan.advance(t0);
        plan.advance(t0 + Duration::from_millis(100));

        // 100 ms at 1.0 plus 100 ms at -0.5.
        let travel = plan.yaw_travel(t0, t0 + Duration::from_millis(200));
        approx::assert_relative_eq!(travel, 0.05, epsilon = 1e-9);
    }

    #[test]
    fn test_history_pruned() {
        let t0 = Instant::now();
        let mut plan = MovementPlan::new(t0, 0.5);
        plan.replace_future(t0, vec![movement(0.1, 10)], 0.5);
        plan.advance(t0);

        // Much later, a new plan lands; the early history is outside the
        // reprojection window and disappears.
        let much_later = t0 + Duration::from_secs(60);
        plan.advance(much_later);
        plan.replace_future(much_later, vec![movement(0.2, 10)], 0.5);

        assert!(plan.len() <= 4, "stale history kept: {} segments", plan.len());
        assert!(plan.segments().last().unwrap().is_search());
    }
}
