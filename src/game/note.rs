use bitflags::bitflags;
use smallvec::SmallVec;

use crate::game::timing::TimingData;
use crate::game::timing_windows::Rating;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HoldFlags: u8 {
        /// The attack was judged inside a window.
        const INITIAL_HIT = 1 << 0;
        /// The lane is currently engaged with this hold.
        const ACTIVE = 1 << 1;
        /// The attack aged out unjudged. Still eligible for reactivation.
        const MISSED_INITIAL = 1 << 2;
        /// The release edge has been judged.
        const RELEASED = 1 << 3;
    }
}

/// Per-hold sub-interval bookkeeping. Intervals are scored strictly in
/// order, so everything below `next_interval` is scored and the bitset only
/// has to remember which of those were hits.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HoldState {
    pub flags: HoldFlags,
    pub interval_count: u32,
    pub next_interval: u32,
    hits: SmallVec<[u64; 2]>,
    pub release_rating: Option<Rating>,
    pub reactivated_at_ms: Option<i64>,
    pub tail_progress: f32,
}

impl HoldState {
    pub fn new(interval_count: u32) -> Self {
        let words = (interval_count as usize).div_ceil(64);
        Self {
            interval_count,
            hits: SmallVec::from_elem(0, words),
            ..Self::default()
        }
    }

    #[inline(always)]
    pub const fn remaining(&self) -> u32 {
        self.interval_count - self.next_interval
    }

    /// Score the next unscored interval.
    pub fn mark_next(&mut self, hit: bool) {
        debug_assert!(
            self.next_interval < self.interval_count,
            "hold interval cursor ran past the last interval"
        );
        if self.next_interval >= self.interval_count {
            return;
        }
        if hit {
            let i = self.next_interval as usize;
            self.hits[i / 64] |= 1 << (i % 64);
        }
        self.next_interval += 1;
    }

    /// `None` for intervals that have not been scored yet.
    pub fn interval_result(&self, index: u32) -> Option<bool> {
        if index >= self.next_interval {
            return None;
        }
        let i = index as usize;
        Some(self.hits[i / 64] & (1 << (i % 64)) != 0)
    }

    pub fn hit_count(&self) -> u32 {
        self.hits.iter().map(|w| w.count_ones()).sum()
    }

    pub fn miss_count(&self) -> u32 {
        self.next_interval - self.hit_count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub lane: usize,
    /// Authored beat position. When present, `target_ms` is derived from it.
    pub beat: Option<f64>,
    pub release_beat: Option<f64>,
    pub target_ms: i64,
    pub release_ms: Option<i64>,
    /// False when another lane shares this timestamp.
    pub solo: bool,
    pub progress: f32,
    pub hit_at_ms: Option<i64>,
    pub released_at_ms: Option<i64>,
    rating: Option<Rating>,
    pub hold: Option<HoldState>,
}

impl Note {
    pub fn tap(lane: usize, target_ms: i64) -> Self {
        Self {
            lane,
            beat: None,
            release_beat: None,
            target_ms,
            release_ms: None,
            solo: true,
            progress: 0.0,
            hit_at_ms: None,
            released_at_ms: None,
            rating: None,
            hold: None,
        }
    }

    pub fn hold(lane: usize, target_ms: i64, release_ms: i64) -> Self {
        debug_assert!(release_ms > target_ms, "hold release must follow its target");
        Self { release_ms: Some(release_ms), ..Self::tap(lane, target_ms) }
    }

    pub fn tap_at_beat(lane: usize, beat: f64, timing: &TimingData) -> Self {
        Self { beat: Some(beat), ..Self::tap(lane, timing.project_ms(beat)) }
    }

    pub fn hold_at_beat(lane: usize, beat: f64, release_beat: f64, timing: &TimingData) -> Self {
        Self {
            beat: Some(beat),
            release_beat: Some(release_beat),
            ..Self::hold(lane, timing.project_ms(beat), timing.project_ms(release_beat))
        }
    }

    #[inline(always)]
    pub const fn is_hold(&self) -> bool {
        self.release_ms.is_some()
    }

    #[inline(always)]
    pub const fn rating(&self) -> Option<Rating> {
        self.rating
    }

    #[inline(always)]
    pub const fn is_judged(&self) -> bool {
        self.rating.is_some()
    }

    /// Assigns the attack rating. A note is rated at most once per session;
    /// a second call is ignored and reported as `false`.
    pub fn set_rating(&mut self, rating: Rating) -> bool {
        debug_assert!(self.rating.is_none(), "note at {}ms rated twice", self.target_ms);
        if self.rating.is_some() {
            return false;
        }
        self.rating = Some(rating);
        true
    }

    /// Recompute the millisecond projection from authored beats.
    pub fn project(&mut self, timing: &TimingData) {
        if let Some(beat) = self.beat {
            self.target_ms = timing.project_ms(beat);
        }
        if let Some(release_beat) = self.release_beat {
            self.release_ms = Some(timing.project_ms(release_beat));
        }
    }

    /// Prepare runtime hold state for the given sub-interval length.
    pub fn arm(&mut self, interval_ms: i64) {
        self.hold = self
            .release_ms
            .map(|release_ms| HoldState::new(interval_count(self.target_ms, release_ms, interval_ms)));
    }

    /// Clear every runtime field, keeping only the authored data.
    pub fn reset(&mut self, interval_ms: i64) {
        self.progress = 0.0;
        self.hit_at_ms = None;
        self.released_at_ms = None;
        self.rating = None;
        self.arm(interval_ms);
    }

    /// 0 when the note enters the look-ahead horizon, 1 at the judgment line.
    #[inline(always)]
    pub fn update_progress(&mut self, time_ms: i64, travel_ms: i64) {
        self.progress = approach_progress(self.target_ms, time_ms, travel_ms);
        if let (Some(release_ms), Some(hold)) = (self.release_ms, self.hold.as_mut()) {
            hold.tail_progress = approach_progress(release_ms, time_ms, travel_ms);
        }
    }
}

#[inline(always)]
fn approach_progress(target_ms: i64, time_ms: i64, travel_ms: i64) -> f32 {
    if travel_ms <= 0 {
        return if time_ms >= target_ms { 1.0 } else { 0.0 };
    }
    let remaining = (target_ms - time_ms) as f32 / travel_ms as f32;
    (1.0 - remaining).clamp(0.0, 1.0)
}

#[inline(always)]
pub fn interval_count(target_ms: i64, release_ms: i64, interval_ms: i64) -> u32 {
    let duration = (release_ms - target_ms).max(1);
    let step = interval_ms.max(1);
    ((duration + step - 1) / step).max(1) as u32
}

/// End of sub-interval `index`; the last interval is clipped to the release.
#[inline(always)]
pub fn interval_end_ms(target_ms: i64, release_ms: i64, interval_ms: i64, index: u32) -> i64 {
    (target_ms + interval_ms.max(1) * (i64::from(index) + 1)).min(release_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_bitset_tracks_hits_in_order() {
        let mut hold = HoldState::new(70);
        assert_eq!(hold.hits.len(), 2, "70 intervals need two words");
        for i in 0..70 {
            hold.mark_next(i % 3 != 0);
        }
        assert_eq!(hold.remaining(), 0);
        assert_eq!(hold.interval_result(0), Some(false));
        assert_eq!(hold.interval_result(1), Some(true));
        assert_eq!(hold.interval_result(66), Some(false));
        assert_eq!(hold.interval_result(67), Some(true));
        assert_eq!(hold.hit_count() + hold.miss_count(), 70);
        assert_eq!(hold.miss_count(), 24);
    }

    #[test]
    fn unscored_intervals_report_none() {
        let mut hold = HoldState::new(4);
        hold.mark_next(true);
        assert_eq!(hold.interval_result(0), Some(true));
        assert_eq!(hold.interval_result(1), None);
        assert_eq!(hold.remaining(), 3);
    }

    #[test]
    fn interval_geometry_clips_to_release() {
        assert_eq!(interval_count(2000, 3000, 100), 10);
        assert_eq!(interval_count(2000, 3050, 100), 11);
        assert_eq!(interval_count(2000, 2010, 100), 1);
        assert_eq!(interval_end_ms(2000, 3050, 100, 0), 2100);
        assert_eq!(interval_end_ms(2000, 3050, 100, 10), 3050);
    }

    #[test]
    fn rating_is_assigned_once() {
        let mut note = Note::tap(0, 1000);
        assert!(note.set_rating(Rating::Slap));
        assert_eq!(note.rating(), Some(Rating::Slap));
        note.reset(100);
        assert!(!note.is_judged());
    }

    #[test]
    fn progress_runs_from_horizon_to_line() {
        let mut note = Note::hold(0, 1000, 2000);
        note.arm(100);
        note.update_progress(0, 1000);
        assert!(note.progress.abs() < f32::EPSILON);
        note.update_progress(500, 1000);
        assert!((note.progress - 0.5).abs() < 1e-6);
        note.update_progress(1500, 1000);
        assert!((note.progress - 1.0).abs() < f32::EPSILON);
        let tail = note.hold.as_ref().map(|h| h.tail_progress).unwrap_or_default();
        assert!((tail - 0.5).abs() < 1e-6);
    }

    #[test]
    fn beat_authored_notes_follow_reprojection() {
        let slow = TimingData::constant(60.0);
        let fast = TimingData::constant(120.0);
        let mut note = Note::hold_at_beat(1, 2.0, 4.0, &slow);
        assert_eq!((note.target_ms, note.release_ms), (2000, Some(4000)));
        note.project(&fast);
        assert_eq!((note.target_ms, note.release_ms), (1000, Some(2000)));

        let mut fixed = Note::tap(0, 750);
        fixed.project(&fast);
        assert_eq!(fixed.target_ms, 750, "ms-authored notes keep their time");
    }
}
