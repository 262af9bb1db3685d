// Shared timing window definitions so tap, hold and release judgment read one table.

use serde::{Deserialize, Serialize};

// All base windows are in milliseconds.
pub const BASE_SLAP_MS: f64 = 30.0;
pub const BASE_SLIP_MS: f64 = 45.0;

// Early presses get a narrower window than late ones.
pub const EARLY_SCALE: f64 = 0.4;

// Applied on top of the tier table when judging a hold release.
pub const RELEASE_WINDOW_MULTIPLIER: f64 = 3.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rating {
    Slap, // tight tier
    Slip, // loose tier
    Miss,
}

impl Rating {
    pub const ALL: [Rating; 3] = [Rating::Slap, Rating::Slip, Rating::Miss];

    #[inline(always)]
    pub const fn is_hit(self) -> bool {
        !matches!(self, Rating::Miss)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Rating::Slap => "Slap",
            Rating::Slip => "Slip",
            Rating::Miss => "Miss",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timing {
    Early,
    Late,
    None,
}

impl Timing {
    /// Positive deltas mean the input landed before the target.
    #[inline(always)]
    pub const fn from_delta(delta_ms: i64) -> Self {
        if delta_ms > 0 {
            Timing::Early
        } else if delta_ms < 0 {
            Timing::Late
        } else {
            Timing::None
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TierWindow {
    pub base_ms: f64,
    pub early_scale: f64,
}

impl TierWindow {
    #[inline(always)]
    pub fn bound_ms(&self, early: bool) -> f64 {
        if early {
            self.base_ms * self.early_scale
        } else {
            self.base_ms
        }
    }
}

/// The single `{tier: (base window, early scale)}` policy table.
///
/// Tiers are checked tightest first; the first window that contains the
/// delta decides the rating. A delta outside every tier has no rating.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct WindowTable {
    pub slap: TierWindow,
    pub slip: TierWindow,
}

impl Default for WindowTable {
    fn default() -> Self {
        Self {
            slap: TierWindow { base_ms: BASE_SLAP_MS, early_scale: EARLY_SCALE },
            slip: TierWindow { base_ms: BASE_SLIP_MS, early_scale: EARLY_SCALE },
        }
    }
}

impl WindowTable {
    #[inline(always)]
    pub fn tiers(&self) -> [(Rating, TierWindow); 2] {
        [(Rating::Slap, self.slap), (Rating::Slip, self.slip)]
    }

    /// Widest late bound across all tiers. Past this nothing can be judged.
    #[inline(always)]
    pub fn latest_ms(&self) -> f64 {
        self.tiers()
            .iter()
            .map(|(_, w)| w.bound_ms(false))
            .fold(0.0_f64, f64::max)
    }

    /// Map a signed delta to a tier. `multiplier` widens every window
    /// uniformly (1.0 for attacks, the release multiplier for releases).
    #[inline(always)]
    pub fn classify(&self, delta_ms: i64, multiplier: f64) -> Option<Rating> {
        let early = delta_ms > 0;
        let abs = delta_ms.unsigned_abs() as f64;
        self.tiers()
            .into_iter()
            .find(|(_, w)| abs <= w.bound_ms(early) * multiplier)
            .map(|(rating, _)| rating)
    }

    #[inline(always)]
    pub fn judge(&self, delta_ms: i64, multiplier: f64) -> (Option<Rating>, Timing) {
        (self.classify(delta_ms, multiplier), Timing::from_delta(delta_ms))
    }

    /// True once a late delta has left the outermost window.
    #[inline(always)]
    pub fn is_past_outer(&self, delta_ms: i64, multiplier: f64) -> bool {
        delta_ms < 0 && (-delta_ms) as f64 > self.latest_ms() * multiplier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn late_deltas_use_the_full_base_window() {
        let table = WindowTable::default();
        assert_eq!(table.classify(-10, 1.0), Some(Rating::Slap));
        assert_eq!(table.classify(-30, 1.0), Some(Rating::Slap));
        assert_eq!(table.classify(-31, 1.0), Some(Rating::Slip));
        assert_eq!(table.classify(-45, 1.0), Some(Rating::Slip));
        assert_eq!(table.classify(-46, 1.0), None);
        assert_eq!(table.classify(-150, 1.0), None);
    }

    #[test]
    fn early_deltas_are_scaled_narrower() {
        let table = WindowTable::default();
        // 30 * 0.4 = 12, 45 * 0.4 = 18
        assert_eq!(table.classify(12, 1.0), Some(Rating::Slap));
        assert_eq!(table.classify(13, 1.0), Some(Rating::Slip));
        assert_eq!(table.classify(18, 1.0), Some(Rating::Slip));
        assert_eq!(table.classify(19, 1.0), None);
        assert!(
            table.classify(-19, 1.0).is_some(),
            "the same magnitude late must still be judgeable"
        );
    }

    #[test]
    fn release_multiplier_widens_every_tier() {
        let table = WindowTable::default();
        assert_eq!(table.classify(-100, 1.0), None);
        assert_eq!(table.classify(-90, RELEASE_WINDOW_MULTIPLIER), Some(Rating::Slap));
        assert_eq!(table.classify(-100, RELEASE_WINDOW_MULTIPLIER), Some(Rating::Slip));
        assert_eq!(table.classify(-136, RELEASE_WINDOW_MULTIPLIER), None);
    }

    #[test]
    fn classification_is_deterministic() {
        let table = WindowTable::default();
        for delta in -200..=200 {
            assert_eq!(table.judge(delta, 1.0), table.judge(delta, 1.0));
        }
    }

    #[test]
    fn timing_follows_delta_sign() {
        assert_eq!(Timing::from_delta(5), Timing::Early);
        assert_eq!(Timing::from_delta(-5), Timing::Late);
        assert_eq!(Timing::from_delta(0), Timing::None);
    }

    #[test]
    fn outer_bound_is_the_widest_late_window() {
        let table = WindowTable::default();
        assert!((table.latest_ms() - BASE_SLIP_MS).abs() <= f64::EPSILON);
        assert!(!table.is_past_outer(-45, 1.0));
        assert!(table.is_past_outer(-46, 1.0));
        assert!(!table.is_past_outer(200, 1.0), "early deltas are never past the outer window");
    }
}
