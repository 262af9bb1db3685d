//! Chart-authored gameplay events and their at-most-once scheduler.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::game::timing::TimingData;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Tempo { bpm: f64 },
    LaneEffect { lane: usize, effect: String },
    Background { name: String },
    Speed { multiplier: f64 },
    Color { rgba: [f32; 4] },
    Particle { name: String },
    /// Start the backing track `offset_ms` into the audio.
    AudioStart { offset_ms: i64 },
    Countdown { count: u32 },
}

impl EventKind {
    pub const fn name(&self) -> &'static str {
        match self {
            EventKind::Tempo { .. } => "tempo",
            EventKind::LaneEffect { .. } => "lane_effect",
            EventKind::Background { .. } => "background",
            EventKind::Speed { .. } => "speed",
            EventKind::Color { .. } => "color",
            EventKind::Particle { .. } => "particle",
            EventKind::AudioStart { .. } => "audio_start",
            EventKind::Countdown { .. } => "countdown",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub time_ms: i64,
    /// Authored beat; when present `time_ms` is its projection.
    pub beat: Option<f64>,
    pub kind: EventKind,
    executed: bool,
}

impl Event {
    pub fn at_ms(time_ms: i64, kind: EventKind) -> Self {
        Self { time_ms, beat: None, kind, executed: false }
    }

    pub fn at_beat(beat: f64, kind: EventKind, timing: &TimingData) -> Self {
        Self { time_ms: timing.project_ms(beat), beat: Some(beat), kind, executed: false }
    }

    #[inline(always)]
    pub const fn is_executed(&self) -> bool {
        self.executed
    }
}

/// Side effects the scheduler triggers. Every hook defaults to a no-op so a
/// consumer only implements what it cares about.
pub trait EventSink {
    fn set_tempo(&mut self, _bpm: f64) {}
    fn lane_effect(&mut self, _lane: usize, _effect: &str) {}
    fn set_background(&mut self, _name: &str) {}
    fn set_scroll_speed(&mut self, _multiplier: f64) {}
    fn set_color(&mut self, _rgba: [f32; 4]) {}
    fn spawn_particles(&mut self, _name: &str) {}
    /// `offset_ms` already includes how late the marker fired.
    fn start_song(&mut self, _offset_ms: i64) {}
    fn countdown(&mut self, _count: u32) {}
}

/// Sink that ignores everything.
#[derive(Copy, Clone, Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {}

fn dispatch(event: &Event, now_ms: i64, sink: &mut dyn EventSink) {
    match &event.kind {
        EventKind::Tempo { bpm } => sink.set_tempo(*bpm),
        EventKind::LaneEffect { lane, effect } => sink.lane_effect(*lane, effect),
        EventKind::Background { name } => sink.set_background(name),
        EventKind::Speed { multiplier } => sink.set_scroll_speed(*multiplier),
        EventKind::Color { rgba } => sink.set_color(*rgba),
        EventKind::Particle { name } => sink.spawn_particles(name),
        EventKind::AudioStart { offset_ms } => {
            let lateness = (now_ms - event.time_ms).max(0);
            sink.start_song(offset_ms + lateness);
        }
        EventKind::Countdown { count } => sink.countdown(*count),
    }
}

/// Time-sorted event list with a single pending cursor.
#[derive(Clone, Debug, Default)]
pub struct EventManager {
    events: Vec<Event>,
    next: usize,
}

impl EventManager {
    pub fn from_events(mut events: Vec<Event>) -> Self {
        // Stable, so simultaneous events keep their authored order.
        events.sort_by_key(|e| e.time_ms);
        Self { events, next: 0 }
    }

    /// Insert keeping time order. An event that sorts before an already
    /// fired one is in the past for this playthrough; it is skipped until
    /// `reset`.
    pub fn add(&mut self, event: Event) {
        let t = event.time_ms;
        let (fired, pending) = self.events.split_at(self.next);
        let pos = if fired.iter().any(|e| e.time_ms > t) {
            debug!(
                "Event {} at {}ms added behind the cursor; it will fire after reset.",
                event.kind.name(),
                t
            );
            let pos = fired.partition_point(|e| e.time_ms <= t);
            self.next += 1;
            pos
        } else {
            self.next + pending.partition_point(|e| e.time_ms <= t)
        };
        self.events.insert(pos, event);
    }

    /// Fire every pending event with `time_ms <= now_ms`, in order. Returns
    /// how many fired.
    pub fn update(&mut self, now_ms: i64, sink: &mut dyn EventSink) -> usize {
        let start = self.next;
        while let Some(event) = self.events.get_mut(self.next) {
            if event.time_ms > now_ms {
                break;
            }
            debug_assert!(!event.executed, "event at {}ms fired twice", event.time_ms);
            event.executed = true;
            info!(
                "Event fired: {} at {}ms (now {}ms)",
                event.kind.name(),
                event.time_ms,
                now_ms
            );
            dispatch(event, now_ms, sink);
            self.next += 1;
        }
        self.next - start
    }

    /// Rewind for a retry. Events that a tempo map change moved relative to
    /// each other are put back in time order; simultaneous events keep their
    /// relative order.
    pub fn reset(&mut self) {
        for event in &mut self.events {
            event.executed = false;
        }
        self.events.sort_by_key(|e| e.time_ms);
        debug_assert!(self.events.is_sorted_by_key(|e| e.time_ms));
        self.next = 0;
    }

    /// Reproject beat-authored events after a tempo map change. Fired events
    /// get their new times too but keep their place until `reset`; only the
    /// pending tail is re-sorted.
    pub fn project(&mut self, timing: &TimingData) {
        for event in &mut self.events {
            if let Some(beat) = event.beat {
                event.time_ms = timing.project_ms(beat);
            }
        }
        self.events[self.next..].sort_by_key(|e| e.time_ms);
        debug_assert!(self.events[self.next..].is_sorted_by_key(|e| e.time_ms));
    }

    #[inline(always)]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[inline(always)]
    pub const fn next_index(&self) -> usize {
        self.next
    }

    #[inline(always)]
    pub fn remaining(&self) -> usize {
        self.events.len() - self.next
    }

    pub fn peek_next(&self) -> Option<&Event> {
        self.events.get(self.next)
    }
}
