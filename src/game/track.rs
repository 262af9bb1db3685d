use log::debug;
use serde::Serialize;

use crate::config::Config;
use crate::core::input::LaneInput;
use crate::game::hold::{self, HoldInput};
use crate::game::judgment::HitRecord;
use crate::game::note::Note;
use crate::game::score::Score;
use crate::game::timing::TimingData;
use crate::game::timing_windows::{RELEASE_WINDOW_MULTIPLIER, Rating, WindowTable};

pub const DEFAULT_TRAVEL_TIME_MS: i64 = 1500;
pub const DEFAULT_HOLD_INTERVAL_MS: i64 = 100;

/// Everything a lane needs to judge a note, resolved once per session.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct JudgeContext {
    pub windows: WindowTable,
    pub input_offset_ms: i64,
    pub travel_time_ms: i64,
    pub hold_interval_ms: i64,
    pub release_multiplier: f64,
}

impl Default for JudgeContext {
    fn default() -> Self {
        Self {
            windows: WindowTable::default(),
            input_offset_ms: 0,
            travel_time_ms: DEFAULT_TRAVEL_TIME_MS,
            hold_interval_ms: DEFAULT_HOLD_INTERVAL_MS,
            release_multiplier: RELEASE_WINDOW_MULTIPLIER,
        }
    }
}

impl JudgeContext {
    pub fn from_config(config: &Config) -> Self {
        Self {
            windows: config.windows,
            input_offset_ms: config.input_offset_ms,
            travel_time_ms: config.travel_time_ms.max(0),
            hold_interval_ms: config.hold_interval_ms.max(1),
            release_multiplier: config.release_window_multiplier,
        }
    }

    /// Playback time corrected for input latency.
    #[inline(always)]
    pub const fn effective_time(&self, time_ms: i64) -> i64 {
        time_ms - self.input_offset_ms
    }

    /// Signed judgment delta; positive means the input was early.
    #[inline(always)]
    pub const fn delta_ms(&self, target_ms: i64, time_ms: i64) -> i64 {
        target_ms - self.effective_time(time_ms)
    }
}

/// One active note as the renderer sees it.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct NoteView {
    pub note_index: usize,
    pub target_ms: i64,
    pub progress: f32,
    /// Tail progress for holds.
    pub tail_progress: Option<f32>,
    pub solo: bool,
    pub judged: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackSnapshot {
    pub lane: usize,
    pub activated: bool,
    pub stale: bool,
    pub notes: Vec<NoteView>,
}

/// One input lane: the full sorted note list, the window of notes that are
/// currently judgeable, and the lane's activation state.
#[derive(Clone, Debug)]
pub struct Track {
    lane: usize,
    notes: Vec<Note>,
    active: Vec<usize>,
    next_note_index: usize,
    activated: bool,
    stale: bool,
}

impl Track {
    pub fn new(lane: usize, mut notes: Vec<Note>, hold_interval_ms: i64) -> Self {
        debug_assert!(
            notes.is_sorted_by_key(|n| n.target_ms),
            "lane {lane} notes are not sorted by target time"
        );
        for note in &mut notes {
            note.arm(hold_interval_ms);
        }
        Self {
            lane,
            notes,
            active: Vec::new(),
            next_note_index: 0,
            activated: false,
            stale: false,
        }
    }

    #[inline(always)]
    pub const fn lane(&self) -> usize {
        self.lane
    }

    #[inline(always)]
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// Indices into `notes()` of every note currently in the judgeable window.
    #[inline(always)]
    pub fn active(&self) -> &[usize] {
        &self.active
    }

    #[inline(always)]
    pub const fn next_note_index(&self) -> usize {
        self.next_note_index
    }

    #[inline(always)]
    pub const fn is_activated(&self) -> bool {
        self.activated
    }

    #[inline(always)]
    pub const fn is_stale(&self) -> bool {
        self.stale
    }

    /// Every note has entered and left the active window.
    #[inline(always)]
    pub fn is_finished(&self) -> bool {
        self.next_note_index >= self.notes.len() && self.active.is_empty()
    }

    /// Admit notes in order while they fall inside the look-ahead horizon.
    fn admit(&mut self, time_ms: i64, ctx: &JudgeContext) {
        let horizon = ctx.effective_time(time_ms) + ctx.travel_time_ms;
        let before = self.next_note_index;
        while let Some(note) = self.notes.get(self.next_note_index) {
            if note.target_ms > horizon {
                break;
            }
            self.active.push(self.next_note_index);
            self.next_note_index += 1;
        }
        debug_assert!(self.next_note_index >= before, "track cursor regressed");
    }

    pub fn update(&mut self, time_ms: i64, input: LaneInput, ctx: &JudgeContext, score: &mut Score) {
        if input.activated {
            self.activated = true;
            self.stale = false;
        }
        self.admit(time_ms, ctx);

        let travel_ms = ctx.travel_time_ms;
        let mut i = 0;
        while i < self.active.len() {
            let note_index = self.active[i];
            let eligible = self.activated && !self.stale;
            let note = &mut self.notes[note_index];
            note.update_progress(ctx.effective_time(time_ms), travel_ms);

            let finished = if note.is_hold() {
                let step = hold::update(
                    note,
                    note_index,
                    time_ms,
                    HoldInput { eligible, pressed: input.activated, held: input.held },
                    ctx,
                    score,
                );
                if step.consumed {
                    self.stale = true;
                }
                step.finished
            } else {
                let (finished, consumed) = judge_tap(note, note_index, time_ms, eligible, ctx, score);
                if consumed {
                    self.stale = true;
                }
                finished
            };

            if finished {
                self.active.remove(i);
            } else {
                i += 1;
            }
        }

        if !input.held {
            self.activated = false;
            self.stale = false;
        }
    }

    pub fn snapshot(&self) -> TrackSnapshot {
        let notes = self
            .active
            .iter()
            .map(|&note_index| {
                let note = &self.notes[note_index];
                NoteView {
                    note_index,
                    target_ms: note.target_ms,
                    progress: note.progress,
                    tail_progress: note.hold.as_ref().map(|h| h.tail_progress),
                    solo: note.solo,
                    judged: note.is_judged(),
                }
            })
            .collect();
        TrackSnapshot { lane: self.lane, activated: self.activated, stale: self.stale, notes }
    }

    /// Reproject notes that have not entered the active window yet. Notes
    /// already admitted keep the times they are being judged against until
    /// the next `reset`.
    pub fn project(&mut self, timing: &TimingData, hold_interval_ms: i64) {
        let pending = &mut self.notes[self.next_note_index..];
        for note in pending.iter_mut() {
            note.project(timing);
            note.arm(hold_interval_ms);
        }
        pending.sort_by_key(|n| n.target_ms);
        debug_assert!(
            self.notes[self.next_note_index..].is_sorted_by_key(|n| n.target_ms),
            "lane {} pending notes are not sorted after projection",
            self.lane
        );
    }

    /// Rewind for a retry: every note loses its runtime state and is
    /// reprojected against `timing`, the cursor returns to the first note.
    pub fn reset(&mut self, timing: &TimingData, hold_interval_ms: i64) {
        for note in &mut self.notes {
            note.project(timing);
            note.reset(hold_interval_ms);
        }
        self.notes.sort_by_key(|n| n.target_ms);
        debug_assert!(
            self.notes.is_sorted_by_key(|n| n.target_ms),
            "lane {} notes are not sorted after reset",
            self.lane
        );
        self.active.clear();
        self.next_note_index = 0;
        self.activated = false;
        self.stale = false;
    }
}

/// Returns `(finished, consumed)`.
fn judge_tap(note: &mut Note, note_index: usize, time_ms: i64, eligible: bool, ctx: &JudgeContext, score: &mut Score) -> (bool, bool) {
    if note.is_judged() {
        return (true, false);
    }
    let delta = ctx.delta_ms(note.target_ms, time_ms);
    if eligible && let Some(rating) = ctx.windows.classify(delta, 1.0) {
        note.hit_at_ms = Some(time_ms);
        note.set_rating(rating);
        debug!(
            "JUDGED TAP: lane={}, target_ms={}, time={}, delta_ms={}, rating={}",
            note.lane, note.target_ms, time_ms, delta, rating.as_str()
        );
        score.record(HitRecord::attack(note.lane, note_index, note.target_ms, delta, rating, time_ms));
        return (true, true);
    }
    if ctx.windows.is_past_outer(delta, 1.0) {
        note.set_rating(Rating::Miss);
        debug!("MISSED TAP: lane={}, target_ms={}, time={}", note.lane, note.target_ms, time_ms);
        score.record(HitRecord::missed(note.lane, note_index, note.target_ms, time_ms));
        return (true, false);
    }
    (false, false)
}
