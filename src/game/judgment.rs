use serde::{Deserialize, Serialize};

use crate::game::timing_windows::{Rating, Timing};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JudgePhase {
    Attack,
    Release,
}

/// Immutable outcome of one judgment, appended to the score log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HitRecord {
    pub lane: usize,
    pub note_index: usize,
    pub target_ms: i64,
    pub phase: JudgePhase,
    /// `target - hit time`; `None` when the note aged out unhit.
    pub hit_delta_ms: Option<i64>,
    /// `release target - release time` for judged releases.
    pub release_delta_ms: Option<i64>,
    pub rating: Rating,
    pub timing: Timing,
    pub judged_at_ms: i64,
}

impl HitRecord {
    pub fn attack(lane: usize, note_index: usize, target_ms: i64, delta_ms: i64, rating: Rating, judged_at_ms: i64) -> Self {
        Self {
            lane,
            note_index,
            target_ms,
            phase: JudgePhase::Attack,
            hit_delta_ms: Some(delta_ms),
            release_delta_ms: None,
            rating,
            timing: Timing::from_delta(delta_ms),
            judged_at_ms,
        }
    }

    /// An attack that left the outer window without a press.
    pub fn missed(lane: usize, note_index: usize, target_ms: i64, judged_at_ms: i64) -> Self {
        Self {
            lane,
            note_index,
            target_ms,
            phase: JudgePhase::Attack,
            hit_delta_ms: None,
            release_delta_ms: None,
            rating: Rating::Miss,
            timing: Timing::Late,
            judged_at_ms,
        }
    }

    pub fn release(
        lane: usize,
        note_index: usize,
        target_ms: i64,
        hit_delta_ms: Option<i64>,
        release_delta_ms: i64,
        rating: Rating,
        judged_at_ms: i64,
    ) -> Self {
        Self {
            lane,
            note_index,
            target_ms,
            phase: JudgePhase::Release,
            hit_delta_ms,
            release_delta_ms: Some(release_delta_ms),
            rating,
            timing: Timing::from_delta(release_delta_ms),
            judged_at_ms,
        }
    }

    /// The delta that decided `rating`.
    #[inline(always)]
    pub const fn deciding_delta_ms(&self) -> Option<i64> {
        match self.phase {
            JudgePhase::Attack => self.hit_delta_ms,
            JudgePhase::Release => self.release_delta_ms,
        }
    }
}

/// Point values per outcome. A policy set, never hard-coded at call sites.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub slap: i64,
    pub slip: i64,
    pub miss: i64,
    pub interval: i64,
    pub release: i64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self { slap: 300, slip: 100, miss: 0, interval: 10, release: 50 }
    }
}

impl ScoreWeights {
    #[inline(always)]
    pub const fn points_for(&self, rating: Rating) -> i64 {
        match rating {
            Rating::Slap => self.slap,
            Rating::Slip => self.slip,
            Rating::Miss => self.miss,
        }
    }

    /// Release points scale with the tier the release landed in.
    #[inline(always)]
    pub const fn release_points_for(&self, rating: Rating) -> i64 {
        match rating {
            Rating::Slap => self.release,
            Rating::Slip => self.release / 2,
            Rating::Miss => 0,
        }
    }
}

// --- Grade Definitions ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LetterGrade {
    S,
    A,
    B,
    C,
    D,
    F,
}

/// Minimum success percentage for each grade, best first.
pub const GRADE_THRESHOLDS: [(LetterGrade, f64); 5] = [
    (LetterGrade::S, 95.0),
    (LetterGrade::A, 90.0),
    (LetterGrade::B, 80.0),
    (LetterGrade::C, 70.0),
    (LetterGrade::D, 60.0),
];

impl LetterGrade {
    pub fn from_percent(percent: f64) -> Self {
        GRADE_THRESHOLDS
            .iter()
            .find(|(_, min)| percent >= *min)
            .map_or(LetterGrade::F, |(grade, _)| *grade)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            LetterGrade::S => "S",
            LetterGrade::A => "A",
            LetterGrade::B => "B",
            LetterGrade::C => "C",
            LetterGrade::D => "D",
            LetterGrade::F => "F",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_thresholds_are_inclusive() {
        assert_eq!(LetterGrade::from_percent(100.0), LetterGrade::S);
        assert_eq!(LetterGrade::from_percent(95.0), LetterGrade::S);
        assert_eq!(LetterGrade::from_percent(94.99), LetterGrade::A);
        assert_eq!(LetterGrade::from_percent(80.0), LetterGrade::B);
        assert_eq!(LetterGrade::from_percent(69.9), LetterGrade::D);
        assert_eq!(LetterGrade::from_percent(59.9), LetterGrade::F);
        assert_eq!(LetterGrade::from_percent(0.0), LetterGrade::F);
    }

    #[test]
    fn records_carry_timing_from_their_deciding_delta() {
        let hit = HitRecord::attack(0, 3, 1000, -10, Rating::Slap, 1010);
        assert_eq!(hit.timing, Timing::Late);
        assert_eq!(hit.deciding_delta_ms(), Some(-10));

        let rel = HitRecord::release(0, 3, 1000, Some(-10), 20, Rating::Slap, 2980);
        assert_eq!(rel.timing, Timing::Early);
        assert_eq!(rel.deciding_delta_ms(), Some(20));

        let miss = HitRecord::missed(1, 4, 500, 600);
        assert_eq!((miss.rating, miss.timing, miss.hit_delta_ms), (Rating::Miss, Timing::Late, None));
    }

    #[test]
    fn weights_map_every_rating() {
        let w = ScoreWeights::default();
        assert_eq!(w.points_for(Rating::Slap), 300);
        assert_eq!(w.points_for(Rating::Slip), 100);
        assert_eq!(w.points_for(Rating::Miss), 0);
        assert_eq!(w.release_points_for(Rating::Slip), 25);
    }
}
