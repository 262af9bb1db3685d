//! Hold-note lifecycle: attack, sub-interval scoring, reactivation after a
//! missed attack, release judgment and the outer release deadline.

use log::debug;

use crate::game::judgment::HitRecord;
use crate::game::note::{HoldFlags, HoldState, Note, interval_end_ms};
use crate::game::score::Score;
use crate::game::timing_windows::Rating;
use crate::game::track::JudgeContext;

/// Lane state as seen by one hold on one tick.
#[derive(Copy, Clone, Debug, Default)]
pub struct HoldInput {
    /// The lane is active and has not yet judged a note this press.
    pub eligible: bool,
    /// A fresh press happened this tick.
    pub pressed: bool,
    /// The lane is down at the end of this tick.
    pub held: bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct HoldStep {
    /// This hold took the lane's press (attack or reactivation).
    pub consumed: bool,
    /// The hold is fully resolved and leaves the active set.
    pub finished: bool,
}

/// Score every elapsed, unscored interval with the same outcome.
fn score_elapsed(hold: &mut HoldState, target_ms: i64, release_ms: i64, now_ms: i64, hit: bool, ctx: &JudgeContext, score: &mut Score) {
    while hold.next_interval < hold.interval_count {
        let end = interval_end_ms(target_ms, release_ms, ctx.hold_interval_ms, hold.next_interval);
        if end > now_ms {
            break;
        }
        hold.mark_next(hit);
        score.record_interval(hit);
    }
}

fn force_remaining_missed(hold: &mut HoldState, score: &mut Score) {
    while hold.remaining() > 0 {
        hold.mark_next(false);
        score.record_interval(false);
    }
}

/// Judge the release edge against the release target.
fn judge_release(note: &mut Note, hold: &mut HoldState, note_index: usize, release_ms: i64, time_ms: i64, ctx: &JudgeContext, score: &mut Score) {
    let delta = ctx.delta_ms(release_ms, time_ms);
    let rating = ctx
        .windows
        .classify(delta, ctx.release_multiplier)
        .unwrap_or(Rating::Miss);
    let hit_delta = note.hit_at_ms.map(|t| ctx.delta_ms(note.target_ms, t));
    hold.flags.remove(HoldFlags::ACTIVE);
    hold.flags.insert(HoldFlags::RELEASED);
    hold.release_rating = Some(rating);
    note.released_at_ms = Some(time_ms);
    debug!(
        "HOLD RELEASE: lane={}, release_ms={}, time={}, delta_ms={}, rating={}",
        note.lane, release_ms, time_ms, delta, rating.as_str()
    );
    score.record(HitRecord::release(
        note.lane,
        note_index,
        note.target_ms,
        hit_delta,
        delta,
        rating,
        time_ms,
    ));
}

/// Advance one hold note by one tick.
pub fn update(note: &mut Note, note_index: usize, time_ms: i64, input: HoldInput, ctx: &JudgeContext, score: &mut Score) -> HoldStep {
    let Some(release_ms) = note.release_ms else {
        return HoldStep { consumed: false, finished: true };
    };
    let Some(mut hold) = note.hold.take() else {
        return HoldStep { consumed: false, finished: true };
    };
    let step = advance(note, &mut hold, note_index, release_ms, time_ms, input, ctx, score);
    note.hold = Some(hold);
    step
}

#[allow(clippy::too_many_arguments)]
fn advance(
    note: &mut Note,
    hold: &mut HoldState,
    note_index: usize,
    release_ms: i64,
    time_ms: i64,
    input: HoldInput,
    ctx: &JudgeContext,
    score: &mut Score,
) -> HoldStep {
    let target_ms = note.target_ms;
    let now = ctx.effective_time(time_ms);
    let mut consumed = false;

    // Attack.
    if !hold.flags.intersects(HoldFlags::INITIAL_HIT | HoldFlags::MISSED_INITIAL) {
        let delta = ctx.delta_ms(target_ms, time_ms);
        if input.eligible
            && let Some(rating) = ctx.windows.classify(delta, 1.0)
        {
            note.hit_at_ms = Some(time_ms);
            note.set_rating(rating);
            hold.flags.insert(HoldFlags::INITIAL_HIT | HoldFlags::ACTIVE);
            debug!(
                "HOLD HIT: lane={}, target_ms={}, time={}, delta_ms={}, rating={}",
                note.lane, target_ms, time_ms, delta, rating.as_str()
            );
            score.record(HitRecord::attack(note.lane, note_index, target_ms, delta, rating, time_ms));
            consumed = true;
        } else if ctx.windows.is_past_outer(delta, 1.0) {
            hold.flags.insert(HoldFlags::MISSED_INITIAL);
            note.set_rating(Rating::Miss);
            debug!("HOLD MISSED (attack): lane={}, target_ms={}, time={}", note.lane, target_ms, time_ms);
            score.record(HitRecord::missed(note.lane, note_index, target_ms, time_ms));
        }
    }

    let release_delta = ctx.delta_ms(release_ms, time_ms);
    let past_deadline = ctx.windows.is_past_outer(release_delta, ctx.release_multiplier);

    // Reactivation after a missed attack. Intervals that elapsed while the
    // lane was up are already scored as misses; scoring resumes from here.
    // Once the release target has passed there is nothing left to hold, and
    // the press belongs to whatever note comes next.
    if hold.flags.contains(HoldFlags::MISSED_INITIAL)
        && !hold.flags.intersects(HoldFlags::ACTIVE | HoldFlags::RELEASED)
        && input.pressed
        && input.eligible
        && now < release_ms
        && hold.remaining() > 0
        && !past_deadline
    {
        score_elapsed(hold, target_ms, release_ms, now, false, ctx, score);
        hold.flags.insert(HoldFlags::ACTIVE);
        hold.reactivated_at_ms = Some(time_ms);
        debug!(
            "HOLD REACTIVATED: lane={}, target_ms={}, time={}, intervals_left={}",
            note.lane,
            target_ms,
            time_ms,
            hold.remaining()
        );
        consumed = true;
    }

    if hold.flags.contains(HoldFlags::ACTIVE) {
        // Everything that elapsed while engaged was held through.
        score_elapsed(hold, target_ms, release_ms, now, true, ctx, score);
        if !input.held {
            judge_release(note, hold, note_index, release_ms, time_ms, ctx, score);
        }
    } else if hold.flags.intersects(HoldFlags::INITIAL_HIT | HoldFlags::MISSED_INITIAL) {
        score_elapsed(hold, target_ms, release_ms, now, false, ctx, score);
    }

    if past_deadline {
        if hold.flags.contains(HoldFlags::ACTIVE) {
            // Still held long after the release target.
            judge_release(note, hold, note_index, release_ms, time_ms, ctx, score);
        }
        if hold.remaining() > 0 {
            debug!(
                "HOLD DEADLINE: lane={}, forcing {} intervals to miss",
                note.lane,
                hold.remaining()
            );
            force_remaining_missed(hold, score);
        }
        if !note.is_judged() {
            // Only reachable when the release deadline precedes the attack
            // deadline, e.g. very short holds with a narrow release multiplier.
            note.set_rating(Rating::Miss);
            score.record(HitRecord::missed(note.lane, note_index, target_ms, time_ms));
        }
        return HoldStep { consumed, finished: true };
    }

    let finished = hold.flags.contains(HoldFlags::RELEASED) && hold.remaining() == 0;
    HoldStep { consumed, finished }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::judgment::{JudgePhase, ScoreWeights};

    fn armed_hold(target: i64, release: i64) -> Note {
        let mut note = Note::hold(0, target, release);
        note.arm(100);
        note
    }

    fn press() -> HoldInput {
        HoldInput { eligible: true, pressed: true, held: true }
    }

    fn held() -> HoldInput {
        HoldInput { eligible: false, pressed: false, held: true }
    }

    fn up() -> HoldInput {
        HoldInput::default()
    }

    #[test]
    fn held_through_scores_every_interval() {
        let ctx = JudgeContext::default();
        let mut score = Score::new(1, ScoreWeights::default());
        let mut note = armed_hold(2000, 3000);

        let step = update(&mut note, 0, 2000, press(), &ctx, &mut score);
        assert!(step.consumed && !step.finished);
        for t in (2016..=3000).step_by(16) {
            let step = update(&mut note, 0, t, held(), &ctx, &mut score);
            assert!(!step.finished, "hold must wait for the release edge at {t}");
        }
        let step = update(&mut note, 0, 3005, up(), &ctx, &mut score);
        assert!(step.finished);

        let hold = note.hold.as_ref().expect("armed hold");
        assert_eq!(hold.hit_count(), 10);
        assert_eq!(hold.miss_count(), 0);
        assert_eq!(hold.release_rating, Some(Rating::Slap));
        let rel = score.last_record().expect("release record");
        assert_eq!(rel.phase, JudgePhase::Release);
        assert_eq!(rel.release_delta_ms, Some(3000 - 3005));
    }

    #[test]
    fn early_release_misses_the_rest() {
        let ctx = JudgeContext::default();
        let mut score = Score::new(1, ScoreWeights::default());
        let mut note = armed_hold(2000, 3000);

        update(&mut note, 0, 2000, press(), &ctx, &mut score);
        update(&mut note, 0, 2450, held(), &ctx, &mut score);
        let step = update(&mut note, 0, 2460, up(), &ctx, &mut score);
        assert!(!step.finished, "unscored intervals keep the hold alive");
        assert_eq!(note.hold.as_ref().map(|h| h.release_rating), Some(Some(Rating::Miss)));
        assert_eq!(score.combo, 0);

        let step = update(&mut note, 0, 3000, up(), &ctx, &mut score);
        assert!(step.finished);
        let hold = note.hold.as_ref().expect("armed hold");
        assert_eq!((hold.hit_count(), hold.miss_count()), (4, 6));
    }

    #[test]
    fn missed_attack_can_be_reactivated() {
        let ctx = JudgeContext::default();
        let mut score = Score::new(1, ScoreWeights::default());
        let mut note = armed_hold(2000, 3000);

        update(&mut note, 0, 2046, up(), &ctx, &mut score);
        assert_eq!(note.rating(), Some(Rating::Miss));
        let step = update(&mut note, 0, 2150, press(), &ctx, &mut score);
        assert!(step.consumed);
        let hold = note.hold.as_ref().expect("armed hold");
        assert!(hold.flags.contains(HoldFlags::ACTIVE));
        assert_eq!(hold.reactivated_at_ms, Some(2150));
        assert_eq!(hold.interval_result(0), Some(false), "interval elapsed while up");

        update(&mut note, 0, 3000, held(), &ctx, &mut score);
        update(&mut note, 0, 3001, up(), &ctx, &mut score);
        let hold = note.hold.as_ref().expect("armed hold");
        assert_eq!((hold.hit_count(), hold.miss_count()), (9, 1));
        assert_eq!(score.count(Rating::Miss), 1, "initial miss stays counted");
    }

    #[test]
    fn no_reactivation_after_the_release_target() {
        let ctx = JudgeContext::default();
        let mut score = Score::new(1, ScoreWeights::default());
        let mut note = armed_hold(1000, 1500);

        update(&mut note, 0, 1100, up(), &ctx, &mut score);
        update(&mut note, 0, 1500, up(), &ctx, &mut score);
        let step = update(&mut note, 0, 1560, press(), &ctx, &mut score);
        assert!(!step.consumed, "a hold with nothing left to hold must not take the press");
        let hold = note.hold.as_ref().expect("armed hold");
        assert!(!hold.flags.contains(HoldFlags::ACTIVE));
        assert_eq!(hold.reactivated_at_ms, None);
        assert_eq!(hold.release_rating, None);
        assert_eq!(score.release_count(Rating::Slap), 0);

        assert!(update(&mut note, 0, 1640, up(), &ctx, &mut score).finished);
    }

    #[test]
    fn holding_past_the_deadline_is_a_late_release_miss() {
        let ctx = JudgeContext::default();
        let mut score = Score::new(1, ScoreWeights::default());
        let mut note = armed_hold(1000, 1500);

        update(&mut note, 0, 1000, press(), &ctx, &mut score);
        let step = update(&mut note, 0, 1700, held(), &ctx, &mut score);
        assert!(step.finished);
        let hold = note.hold.as_ref().expect("armed hold");
        assert_eq!(hold.hit_count(), 5);
        assert_eq!(hold.release_rating, Some(Rating::Miss));
    }

    #[test]
    fn untouched_hold_is_discarded_at_the_deadline() {
        let ctx = JudgeContext::default();
        let mut score = Score::new(1, ScoreWeights::default());
        let mut note = armed_hold(1000, 1300);

        assert!(!update(&mut note, 0, 1100, up(), &ctx, &mut score).finished);
        assert!(update(&mut note, 0, 1500, up(), &ctx, &mut score).finished);
        let hold = note.hold.as_ref().expect("armed hold");
        assert_eq!(hold.miss_count(), 3);
        assert_eq!(hold.release_rating, None, "a never-engaged hold has no release");
        assert_eq!(score.judged_notes(), 1);
    }
}
