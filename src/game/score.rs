use log::debug;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::game::judgment::{HitRecord, JudgePhase, LetterGrade, ScoreWeights};
use crate::game::timing_windows::Rating;

fn zeroed_counts() -> FxHashMap<Rating, u32> {
    Rating::ALL.iter().map(|r| (*r, 0)).collect()
}

/// Combo and tier bookkeeping derived from judgment outcomes.
#[derive(Clone, Debug)]
pub struct Score {
    weights: ScoreWeights,
    counts: FxHashMap<Rating, u32>,
    release_counts: FxHashMap<Rating, u32>,
    pub combo: u32,
    pub max_combo: u32,
    pub total_notes: u32,
    pub interval_hits: u32,
    pub interval_misses: u32,
    records: Vec<HitRecord>,
}

/// What the HUD reads each frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScoreSnapshot {
    pub combo: u32,
    pub max_combo: u32,
    pub slap: u32,
    pub slip: u32,
    pub miss: u32,
    pub value: i64,
    pub last: Option<HitRecord>,
}

impl Score {
    pub fn new(total_notes: u32, weights: ScoreWeights) -> Self {
        Self {
            weights,
            counts: zeroed_counts(),
            release_counts: zeroed_counts(),
            combo: 0,
            max_combo: 0,
            total_notes,
            interval_hits: 0,
            interval_misses: 0,
            records: Vec::with_capacity(total_notes as usize),
        }
    }

    #[inline(always)]
    fn bump_combo(&mut self, hit: bool) {
        if hit {
            self.combo += 1;
            self.max_combo = self.max_combo.max(self.combo);
        } else {
            if self.combo > 0 {
                debug!("Combo broken at {}", self.combo);
            }
            self.combo = 0;
        }
    }

    /// Attack records count toward the tier totals (one per note);
    /// release records are tallied separately. Both drive the combo.
    pub fn record(&mut self, record: HitRecord) {
        let counts = match record.phase {
            JudgePhase::Attack => &mut self.counts,
            JudgePhase::Release => &mut self.release_counts,
        };
        *counts.entry(record.rating).or_insert(0) += 1;
        self.bump_combo(record.rating.is_hit());
        self.records.push(record);
    }

    pub fn record_interval(&mut self, hit: bool) {
        if hit {
            self.interval_hits += 1;
        } else {
            self.interval_misses += 1;
        }
        self.bump_combo(hit);
    }

    #[inline(always)]
    pub fn count(&self, rating: Rating) -> u32 {
        self.counts.get(&rating).copied().unwrap_or(0)
    }

    #[inline(always)]
    pub fn release_count(&self, rating: Rating) -> u32 {
        self.release_counts.get(&rating).copied().unwrap_or(0)
    }

    /// Notes whose attack has been judged.
    pub fn judged_notes(&self) -> u32 {
        Rating::ALL.iter().map(|r| self.count(*r)).sum()
    }

    pub fn value(&self) -> i64 {
        let taps: i64 = Rating::ALL
            .iter()
            .map(|r| self.weights.points_for(*r) * i64::from(self.count(*r)))
            .sum();
        let releases: i64 = Rating::ALL
            .iter()
            .map(|r| self.weights.release_points_for(*r) * i64::from(self.release_count(*r)))
            .sum();
        taps + releases + self.weights.interval * i64::from(self.interval_hits)
    }

    #[inline(always)]
    pub fn last_record(&self) -> Option<&HitRecord> {
        self.records.last()
    }

    #[inline(always)]
    pub fn records(&self) -> &[HitRecord] {
        &self.records
    }

    #[inline(always)]
    pub const fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    /// Successful attacks over all notes in the chart, as a percentage.
    pub fn success_percent(&self) -> f64 {
        if self.total_notes == 0 {
            return 0.0;
        }
        let hits = self.count(Rating::Slap) + self.count(Rating::Slip);
        f64::from(hits) / f64::from(self.total_notes) * 100.0
    }

    /// Only meaningful once the session has ended.
    pub fn letter_grade(&self) -> LetterGrade {
        LetterGrade::from_percent(self.success_percent())
    }

    pub fn snapshot(&self) -> ScoreSnapshot {
        ScoreSnapshot {
            combo: self.combo,
            max_combo: self.max_combo,
            slap: self.count(Rating::Slap),
            slip: self.count(Rating::Slip),
            miss: self.count(Rating::Miss),
            value: self.value(),
            last: self.last_record().cloned(),
        }
    }

    pub fn reset(&mut self) {
        self.counts = zeroed_counts();
        self.release_counts = zeroed_counts();
        self.combo = 0;
        self.max_combo = 0;
        self.interval_hits = 0;
        self.interval_misses = 0;
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attack(rating: Rating) -> HitRecord {
        HitRecord::attack(0, 0, 1000, 0, rating, 1000)
    }

    #[test]
    fn combo_increments_and_resets() {
        let mut score = Score::new(4, ScoreWeights::default());
        score.record(attack(Rating::Slap));
        score.record(attack(Rating::Slip));
        assert_eq!(score.combo, 2);
        score.record(attack(Rating::Miss));
        assert_eq!(score.combo, 0);
        assert_eq!(score.max_combo, 2, "max combo must survive a break");
        score.record(attack(Rating::Slap));
        assert_eq!(score.combo, 1);
        assert_eq!(score.max_combo, 2);
    }

    #[test]
    fn intervals_drive_combo_but_not_tier_counts() {
        let mut score = Score::new(1, ScoreWeights::default());
        score.record(attack(Rating::Slap));
        score.record_interval(true);
        score.record_interval(true);
        assert_eq!(score.combo, 3);
        score.record_interval(false);
        assert_eq!(score.combo, 0);
        assert_eq!(score.judged_notes(), 1);
        assert_eq!((score.interval_hits, score.interval_misses), (2, 1));
    }

    #[test]
    fn release_records_are_tallied_separately() {
        let mut score = Score::new(1, ScoreWeights::default());
        score.record(attack(Rating::Slap));
        score.record(HitRecord::release(0, 0, 1000, Some(0), 5, Rating::Slap, 2000));
        assert_eq!(score.judged_notes(), 1);
        assert_eq!(score.release_count(Rating::Slap), 1);
        assert_eq!(score.value(), 300 + 50);
    }

    #[test]
    fn value_is_a_weighted_sum() {
        let mut score = Score::new(3, ScoreWeights::default());
        score.record(attack(Rating::Slap));
        score.record(attack(Rating::Slip));
        score.record(attack(Rating::Miss));
        score.record_interval(true);
        assert_eq!(score.value(), 300 + 100 + 10);
    }

    #[test]
    fn grade_uses_success_over_total() {
        let mut score = Score::new(10, ScoreWeights::default());
        for _ in 0..9 {
            score.record(attack(Rating::Slap));
        }
        score.record(attack(Rating::Miss));
        assert!((score.success_percent() - 90.0).abs() < 1e-9);
        assert_eq!(score.letter_grade(), LetterGrade::A);
    }

    #[test]
    fn reset_clears_everything_but_the_chart_size() {
        let mut score = Score::new(2, ScoreWeights::default());
        score.record(attack(Rating::Slap));
        score.reset();
        assert_eq!(score.judged_notes(), 0);
        assert_eq!(score.max_combo, 0);
        assert!(score.last_record().is_none());
        assert_eq!(score.total_notes, 2);
    }

    #[test]
    fn snapshot_exposes_last_record() {
        let mut score = Score::new(1, ScoreWeights::default());
        score.record(attack(Rating::Slip));
        let snap = score.snapshot();
        assert_eq!(snap.slip, 1);
        assert_eq!(snap.last.map(|r| r.rating), Some(Rating::Slip));
    }
}
