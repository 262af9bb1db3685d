use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub const DEFAULT_BPM: f64 = 120.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BpmSegment {
    pub beat: f64,
    pub bpm: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct BeatTimePoint {
    beat: f64,
    time_ms: f64,
    bpm: f64,
}

impl BeatTimePoint {
    #[inline(always)]
    fn ms_per_beat(&self) -> f64 {
        60_000.0 / self.bpm
    }
}

/// Tempo map. Beats are the authored unit; milliseconds are a projection of
/// them through the BPM segments, offset so beat 0 lands at `offset_ms`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingData {
    points: Vec<BeatTimePoint>,
    offset_ms: f64,
}

impl Default for TimingData {
    fn default() -> Self {
        Self::constant(DEFAULT_BPM)
    }
}

impl TimingData {
    pub fn constant(bpm: f64) -> Self {
        Self::new(0.0, &[BpmSegment { beat: 0.0, bpm }])
    }

    pub fn new(offset_ms: f64, segments: &[BpmSegment]) -> Self {
        let mut parsed: Vec<BpmSegment> = segments
            .iter()
            .copied()
            .filter(|s| {
                let ok = s.bpm.is_finite() && s.bpm > 0.0 && s.beat.is_finite();
                if !ok {
                    warn!("Ignoring invalid BPM segment at beat {}: {}", s.beat, s.bpm);
                }
                ok
            })
            .collect();
        parsed.sort_by(|a, b| a.beat.partial_cmp(&b.beat).unwrap_or(Ordering::Less));
        if parsed.is_empty() {
            parsed.push(BpmSegment { beat: 0.0, bpm: DEFAULT_BPM });
        }
        // The first tempo also governs everything before its beat.
        if parsed[0].beat > 0.0 {
            let first_bpm = parsed[0].bpm;
            parsed.insert(0, BpmSegment { beat: 0.0, bpm: first_bpm });
        }

        let mut points: Vec<BeatTimePoint> = Vec::with_capacity(parsed.len());
        let mut current_time = 0.0_f64;
        let mut last_beat = parsed[0].beat;
        let mut last_bpm = parsed[0].bpm;
        for seg in &parsed {
            // Later segments at the same beat replace earlier ones.
            if let Some(last) = points.last_mut()
                && (seg.beat - last_beat).abs() <= f64::EPSILON
            {
                last.bpm = seg.bpm;
                last_bpm = seg.bpm;
                continue;
            }
            current_time += (seg.beat - last_beat) * (60_000.0 / last_bpm);
            points.push(BeatTimePoint { beat: seg.beat, time_ms: current_time, bpm: seg.bpm });
            last_beat = seg.beat;
            last_bpm = seg.bpm;
        }
        info!("TimingData built with {} BPM segments.", points.len());
        Self { points, offset_ms }
    }

    #[inline(always)]
    pub fn offset_ms(&self) -> f64 {
        self.offset_ms
    }

    #[inline(always)]
    pub fn initial_bpm(&self) -> f64 {
        self.points[0].bpm
    }

    pub fn segments(&self) -> impl Iterator<Item = BpmSegment> + '_ {
        self.points.iter().map(|p| BpmSegment { beat: p.beat, bpm: p.bpm })
    }

    #[inline(always)]
    fn point_for_beat(&self, beat: f64) -> &BeatTimePoint {
        let idx = self.points.partition_point(|p| p.beat <= beat);
        &self.points[idx.saturating_sub(1)]
    }

    #[inline(always)]
    fn point_for_time(&self, song_ms: f64) -> &BeatTimePoint {
        let idx = self.points.partition_point(|p| p.time_ms <= song_ms);
        &self.points[idx.saturating_sub(1)]
    }

    pub fn time_ms_for_beat(&self, beat: f64) -> f64 {
        let p = self.point_for_beat(beat);
        self.offset_ms + p.time_ms + (beat - p.beat) * p.ms_per_beat()
    }

    pub fn beat_for_time_ms(&self, time_ms: f64) -> f64 {
        let song_ms = time_ms - self.offset_ms;
        let p = self.point_for_time(song_ms);
        p.beat + (song_ms - p.time_ms) / p.ms_per_beat()
    }

    #[inline(always)]
    pub fn bpm_at_beat(&self, beat: f64) -> f64 {
        self.point_for_beat(beat).bpm
    }

    #[inline(always)]
    pub fn bpm_at_time_ms(&self, time_ms: f64) -> f64 {
        self.point_for_time(time_ms - self.offset_ms).bpm
    }

    /// Integer projection used for note and event times.
    #[inline(always)]
    pub fn project_ms(&self, beat: f64) -> i64 {
        self.time_ms_for_beat(beat).round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_tempo_projects_linearly() {
        let timing = TimingData::constant(120.0);
        assert_eq!(timing.project_ms(0.0), 0);
        assert_eq!(timing.project_ms(1.0), 500);
        assert_eq!(timing.project_ms(8.0), 4000);
        assert!((timing.beat_for_time_ms(1250.0) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn tempo_changes_accumulate_time() {
        let timing = TimingData::new(
            100.0,
            &[BpmSegment { beat: 0.0, bpm: 60.0 }, BpmSegment { beat: 4.0, bpm: 120.0 }],
        );
        // 4 beats at 60 BPM = 4000ms, then 2 beats at 120 BPM = 1000ms.
        assert_eq!(timing.project_ms(4.0), 4100);
        assert_eq!(timing.project_ms(6.0), 5100);
        assert!((timing.beat_for_time_ms(5100.0) - 6.0).abs() < 1e-9);
        assert!((timing.bpm_at_beat(3.9) - 60.0).abs() < f64::EPSILON);
        assert!((timing.bpm_at_time_ms(4600.0) - 120.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unsorted_and_invalid_segments_are_normalized() {
        let timing = TimingData::new(
            0.0,
            &[
                BpmSegment { beat: 8.0, bpm: 240.0 },
                BpmSegment { beat: 2.0, bpm: -5.0 },
                BpmSegment { beat: 2.0, bpm: 60.0 },
            ],
        );
        let segs: Vec<BpmSegment> = timing.segments().collect();
        assert_eq!(segs.len(), 3, "leading segment should be synthesized at beat 0");
        assert!((segs[0].bpm - 60.0).abs() < f64::EPSILON);
        assert_eq!(timing.project_ms(2.0), 2000);
        assert_eq!(timing.project_ms(8.0), 8000);
        assert_eq!(timing.project_ms(12.0), 9000);
    }

    #[test]
    fn empty_map_falls_back_to_default_tempo() {
        let timing = TimingData::new(0.0, &[]);
        assert!((timing.initial_bpm() - DEFAULT_BPM).abs() < f64::EPSILON);
    }

    #[test]
    fn negative_beats_extrapolate_from_first_segment() {
        let timing = TimingData::constant(60.0);
        assert_eq!(timing.project_ms(-1.0), -1000);
    }
}
