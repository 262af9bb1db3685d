use log::{debug, warn};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::game::timing::DEFAULT_BPM;

pub type PulseToken = u32;

/// A subscription that came due on this update.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Pulse {
    pub position: u32,
    pub token: PulseToken,
}

/// Cyclic beat counter driven by the playback clock.
///
/// The tracker only ever moves forward in whole beats. A time earlier than
/// the last one seen re-anchors the counter at that time without ticking, so
/// a seek never produces a burst of stale beats.
#[derive(Clone, Debug)]
pub struct BeatTracker {
    bpm: f64,
    ms_per_beat: f64,
    anchor_ms: f64,
    last_time_ms: i64,
    numerator: u32,
    denominator: u32,
    total_beats: u64,
    advanced: bool,
    subscriptions: FxHashMap<u32, SmallVec<[PulseToken; 4]>>,
    fired: Vec<Pulse>,
    next_token: PulseToken,
}

#[inline(always)]
fn ms_per_beat(bpm: f64) -> f64 {
    60_000.0 / bpm
}

#[inline(always)]
fn valid_bpm(bpm: f64) -> bool {
    bpm.is_finite() && bpm > 0.0
}

impl BeatTracker {
    pub fn new(bpm: f64, denominator: u32, start_ms: i64) -> Self {
        let bpm = if valid_bpm(bpm) {
            bpm
        } else {
            warn!("Invalid BPM {bpm} for beat tracker; using {DEFAULT_BPM}.");
            DEFAULT_BPM
        };
        Self {
            bpm,
            ms_per_beat: ms_per_beat(bpm),
            anchor_ms: start_ms as f64,
            last_time_ms: start_ms,
            numerator: 0,
            denominator: denominator.max(1),
            total_beats: 0,
            advanced: false,
            subscriptions: FxHashMap::default(),
            fired: Vec::new(),
            next_token: 0,
        }
    }

    /// Advance to `time_ms`. Returns true when at least one beat boundary was
    /// crossed since the previous call.
    pub fn update(&mut self, time_ms: i64) -> bool {
        self.advanced = false;
        if time_ms < self.last_time_ms {
            debug!(
                "Beat clock rewound from {} to {}ms; re-anchoring.",
                self.last_time_ms, time_ms
            );
            self.anchor_ms = time_ms as f64;
            self.last_time_ms = time_ms;
            return false;
        }
        self.last_time_ms = time_ms;

        let elapsed = time_ms as f64 - self.anchor_ms;
        if elapsed < self.ms_per_beat {
            return false;
        }
        let steps = (elapsed / self.ms_per_beat).floor() as u64;
        self.anchor_ms += steps as f64 * self.ms_per_beat;

        // A long frame may cross several beats; each cycle position fires at
        // most once per update.
        let denominator = u64::from(self.denominator);
        let skipped = steps.saturating_sub(denominator);
        for step in (skipped + 1)..=steps {
            let position = ((u64::from(self.numerator) + step) % denominator) as u32;
            if let Some(tokens) = self.subscriptions.get(&position) {
                self.fired
                    .extend(tokens.iter().map(|&token| Pulse { position, token }));
            }
        }
        self.numerator = ((u64::from(self.numerator) + steps) % denominator) as u32;
        self.total_beats += steps;
        self.advanced = true;
        true
    }

    /// Change tempo from the current moment on. The interval already in
    /// progress keeps its anchor; only its length changes.
    pub fn set_bpm(&mut self, bpm: f64) {
        if !valid_bpm(bpm) {
            warn!("Ignoring invalid BPM change to {bpm}.");
            return;
        }
        if (bpm - self.bpm).abs() > f64::EPSILON {
            debug!("Beat clock tempo {} -> {}", self.bpm, bpm);
        }
        self.bpm = bpm;
        self.ms_per_beat = ms_per_beat(bpm);
    }

    #[inline(always)]
    pub const fn bpm(&self) -> f64 {
        self.bpm
    }

    #[inline(always)]
    pub const fn ms_per_beat(&self) -> f64 {
        self.ms_per_beat
    }

    /// `(numerator, denominator)` within the current bar.
    #[inline(always)]
    pub const fn position(&self) -> (u32, u32) {
        (self.numerator, self.denominator)
    }

    #[inline(always)]
    pub const fn total_beats(&self) -> u64 {
        self.total_beats
    }

    /// Whether the last `update` crossed a beat boundary.
    #[inline(always)]
    pub const fn beat_advanced(&self) -> bool {
        self.advanced
    }

    /// Register interest in a cycle position. Positions wrap modulo the
    /// denominator.
    pub fn subscribe(&mut self, position: u32) -> PulseToken {
        let token = self.next_token;
        self.next_token = self.next_token.wrapping_add(1);
        self.subscriptions
            .entry(position % self.denominator)
            .or_default()
            .push(token);
        token
    }

    pub fn unsubscribe(&mut self, token: PulseToken) -> bool {
        for tokens in self.subscriptions.values_mut() {
            if let Some(i) = tokens.iter().position(|&t| t == token) {
                tokens.remove(i);
                return true;
            }
        }
        false
    }

    /// Pulses fired since the last drain, in firing order.
    pub fn drain_pulses(&mut self) -> std::vec::Drain<'_, Pulse> {
        self.fired.drain(..)
    }

    /// Back to beat zero at `start_ms`. Subscriptions survive a reset.
    pub fn reset(&mut self, start_ms: i64) {
        self.anchor_ms = start_ms as f64;
        self.last_time_ms = start_ms;
        self.numerator = 0;
        self.total_beats = 0;
        self.advanced = false;
        self.fired.clear();
    }
}
