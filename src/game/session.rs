//! One playthrough: owns every per-session component and sequences them in a
//! fixed order each frame (inputs, beat clock, lanes and score, events).

use log::info;
use serde::Serialize;

use crate::config::Config;
use crate::core::clock::PlaybackClock;
use crate::core::input::{InputQueue, LaneInput, LaneStates};
use crate::game::beat::{BeatTracker, Pulse, PulseToken};
use crate::game::chart::ChartBuild;
use crate::game::event::{EventManager, EventSink};
use crate::game::judgment::LetterGrade;
use crate::game::score::{Score, ScoreSnapshot};
use crate::game::timing::TimingData;
use crate::game::timing_stats::{HistogramMs, TimingStats, build_histogram_ms, compute_timing_stats};
use crate::game::timing_windows::Rating;
use crate::game::track::{JudgeContext, Track, TrackSnapshot};

const LOG_INTERVAL_MS: i64 = 1000;
const HISTOGRAM_BIN_MS: i64 = 5;

/// Final numbers for the evaluation screen, computed once at the end.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionResult {
    pub total_notes: u32,
    pub judged_notes: u32,
    pub slap: u32,
    pub slip: u32,
    pub miss: u32,
    pub release_slap: u32,
    pub release_slip: u32,
    pub release_miss: u32,
    pub interval_hits: u32,
    pub interval_misses: u32,
    pub max_combo: u32,
    pub score: i64,
    pub percent: f64,
    pub grade: LetterGrade,
    pub timing: TimingStats,
    pub histogram: HistogramMs,
}

/// Forwards effects to the caller's sink; tempo changes also retune the
/// beat clock.
struct SessionSink<'a, 's> {
    beat: &'a mut BeatTracker,
    inner: &'a mut (dyn EventSink + 's),
}

impl EventSink for SessionSink<'_, '_> {
    fn set_tempo(&mut self, bpm: f64) {
        self.beat.set_bpm(bpm);
        self.inner.set_tempo(bpm);
    }
    fn lane_effect(&mut self, lane: usize, effect: &str) {
        self.inner.lane_effect(lane, effect);
    }
    fn set_background(&mut self, name: &str) {
        self.inner.set_background(name);
    }
    fn set_scroll_speed(&mut self, multiplier: f64) {
        self.inner.set_scroll_speed(multiplier);
    }
    fn set_color(&mut self, rgba: [f32; 4]) {
        self.inner.set_color(rgba);
    }
    fn spawn_particles(&mut self, name: &str) {
        self.inner.spawn_particles(name);
    }
    fn start_song(&mut self, offset_ms: i64) {
        self.inner.start_song(offset_ms);
    }
    fn countdown(&mut self, count: u32) {
        self.inner.countdown(count);
    }
}

pub struct PlaySession {
    config: Config,
    ctx: JudgeContext,
    timing: TimingData,
    tracks: Vec<Track>,
    score: Score,
    events: EventManager,
    beat: BeatTracker,
    beat_start_ms: i64,
    inputs: InputQueue,
    lanes: LaneStates,
    current_time_ms: i64,
    last_log_ms: i64,
}

impl PlaySession {
    pub fn new(config: Config, chart: ChartBuild) -> Self {
        let ctx = JudgeContext::from_config(&config);
        let total_notes = chart.total_notes() as u32;
        let lane_count = chart.lanes.len();
        let tracks: Vec<Track> = chart
            .lanes
            .into_iter()
            .enumerate()
            .map(|(lane, notes)| Track::new(lane, notes, ctx.hold_interval_ms))
            .collect();
        let beat_start_ms = chart.timing.offset_ms().round() as i64;
        let beat = BeatTracker::new(chart.timing.initial_bpm(), config.beats_per_bar, beat_start_ms);
        info!(
            "Play session initialized: {lane_count} lanes, {total_notes} notes, {} events.",
            chart.events.len()
        );
        Self {
            score: Score::new(total_notes, config.weights),
            events: EventManager::from_events(chart.events),
            timing: chart.timing,
            config,
            ctx,
            tracks,
            beat,
            beat_start_ms,
            inputs: InputQueue::new(),
            lanes: LaneStates::new(lane_count),
            current_time_ms: 0,
            last_log_ms: 0,
        }
    }

    /// Producer handle for an input thread.
    pub fn input_queue(&self) -> InputQueue {
        self.inputs.clone()
    }

    /// Poll `clock` and run one frame. Does nothing while playback is paused.
    pub fn tick(&mut self, clock: &dyn PlaybackClock, sink: &mut dyn EventSink) -> bool {
        if !clock.is_playing() {
            return false;
        }
        self.update(clock.current_position_ms(), sink);
        true
    }

    /// Drain queued input edges, then run one frame at `time_ms`.
    pub fn update(&mut self, time_ms: i64, sink: &mut dyn EventSink) {
        for edge in self.inputs.drain() {
            self.lanes.apply(edge);
        }
        let frame = self.lanes.take_frame();
        self.step(time_ms, &frame, sink);
    }

    /// One frame with explicit per-lane input. Missing lanes read as idle.
    pub fn step(&mut self, time_ms: i64, inputs: &[LaneInput], sink: &mut dyn EventSink) {
        self.current_time_ms = time_ms;

        if time_ms >= self.beat_start_ms {
            self.beat.update(time_ms);
        }

        for track in &mut self.tracks {
            let input = inputs.get(track.lane()).copied().unwrap_or_default();
            track.update(time_ms, input, &self.ctx, &mut self.score);
        }

        let mut effects = SessionSink { beat: &mut self.beat, inner: sink };
        self.events.update(time_ms, &mut effects);

        if time_ms < self.last_log_ms {
            self.last_log_ms = time_ms;
        }
        if time_ms - self.last_log_ms >= LOG_INTERVAL_MS {
            let active: usize = self.tracks.iter().map(|t| t.active().len()).sum();
            info!(
                "Beat: {:.2}, Time: {}ms, Combo: {}, Misses: {}, Active Notes: {}",
                self.timing.beat_for_time_ms(time_ms as f64),
                time_ms,
                self.score.combo,
                self.score.count(Rating::Miss),
                active
            );
            self.last_log_ms = time_ms;
        }
    }

    /// Replace the tempo map. Pending notes and events are reprojected.
    pub fn set_timing(&mut self, timing: TimingData) {
        for track in &mut self.tracks {
            track.project(&timing, self.ctx.hold_interval_ms);
        }
        self.events.project(&timing);
        self.timing = timing;
        info!("Tempo map replaced; pending notes and events reprojected.");
    }

    /// Start the same chart over against the current tempo map. Nothing is
    /// re-parsed.
    pub fn reset(&mut self) {
        for track in &mut self.tracks {
            track.reset(&self.timing, self.ctx.hold_interval_ms);
        }
        self.score.reset();
        self.events.reset();
        self.beat.reset(self.beat_start_ms);
        self.beat.set_bpm(self.timing.initial_bpm());
        self.lanes.reset();
        self.inputs.clear();
        self.current_time_ms = 0;
        self.last_log_ms = 0;
        info!("Play session reset.");
    }

    /// Every note resolved and every event fired.
    pub fn is_complete(&self) -> bool {
        self.tracks.iter().all(Track::is_finished) && self.events.remaining() == 0
    }

    pub fn finish(&self) -> SessionResult {
        let score = &self.score;
        let result = SessionResult {
            total_notes: score.total_notes,
            judged_notes: score.judged_notes(),
            slap: score.count(Rating::Slap),
            slip: score.count(Rating::Slip),
            miss: score.count(Rating::Miss),
            release_slap: score.release_count(Rating::Slap),
            release_slip: score.release_count(Rating::Slip),
            release_miss: score.release_count(Rating::Miss),
            interval_hits: score.interval_hits,
            interval_misses: score.interval_misses,
            max_combo: score.max_combo,
            score: score.value(),
            percent: score.success_percent(),
            grade: score.letter_grade(),
            timing: compute_timing_stats(score.records()),
            histogram: build_histogram_ms(score.records(), HISTOGRAM_BIN_MS),
        };
        info!(
            "Session finished: {}/{} notes judged, grade {} ({:.2}%), max combo {}.",
            result.judged_notes,
            result.total_notes,
            result.grade.as_str(),
            result.percent,
            result.max_combo
        );
        result
    }

    pub fn subscribe_pulse(&mut self, position: u32) -> PulseToken {
        self.beat.subscribe(position)
    }

    pub fn unsubscribe_pulse(&mut self, token: PulseToken) -> bool {
        self.beat.unsubscribe(token)
    }

    pub fn drain_pulses(&mut self) -> Vec<Pulse> {
        self.beat.drain_pulses().collect()
    }

    pub fn track_snapshots(&self) -> Vec<TrackSnapshot> {
        self.tracks.iter().map(Track::snapshot).collect()
    }

    pub fn score_snapshot(&self) -> ScoreSnapshot {
        self.score.snapshot()
    }

    #[inline(always)]
    pub fn score(&self) -> &Score {
        &self.score
    }

    #[inline(always)]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    #[inline(always)]
    pub fn events(&self) -> &EventManager {
        &self.events
    }

    #[inline(always)]
    pub fn beat(&self) -> &BeatTracker {
        &self.beat
    }

    #[inline(always)]
    pub fn timing(&self) -> &TimingData {
        &self.timing
    }

    #[inline(always)]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline(always)]
    pub fn context(&self) -> &JudgeContext {
        &self.ctx
    }

    #[inline(always)]
    pub const fn current_time_ms(&self) -> i64 {
        self.current_time_ms
    }
}
