//! Playback session driving the navigation engine: advances the cursor
//! bar by bar, consulting the repeat indexer and the direction index
//! after each step, and can unroll a whole score into a flat play-order
//! list of locations.
//!
//! Handles:
//! - Repeat start/end barlines, including nested repeats
//! - Alternate endings (1st / 2nd / Nth time brackets)
//! - D.S. / D.C. jumps, Segno/SegnoSegno arming, To Coda, Fine

use crate::directions::DirectionIndex;
use crate::location::SystemLocation;
use crate::model::Score;
use crate::repeats::RepeatIndexer;

/// Safety limit for unrolling: generous enough for scores with many
/// repeat passes.  A section repeated N times visits ~N × its length.
const UNROLL_ITERATION_FACTOR: usize = 50;

/// A per-score playback session: owns the repeat and direction indexes
/// plus the cursor, and advances one barline at a time.
///
/// All navigation state lives here — construct a fresh `Navigator` (or
/// call [`rewind`](Self::rewind)) when a score is reloaded or playback
/// restarts, since followed directions are consumed as playback proceeds.
#[derive(Debug)]
pub struct Navigator<'s> {
    score: &'s Score,
    repeats: RepeatIndexer,
    directions: DirectionIndex,
    cursor: SystemLocation,
}

impl<'s> Navigator<'s> {
    pub fn new(score: &'s Score) -> Self {
        Self {
            score,
            repeats: RepeatIndexer::new(score),
            directions: DirectionIndex::new(score),
            cursor: score.first_bar_location().unwrap_or_default(),
        }
    }

    /// Current cursor location.
    pub fn location(&self) -> SystemLocation {
        self.cursor
    }

    /// Restore all navigation state for a replay from the start.
    pub fn rewind(&mut self) {
        self.repeats.reset();
        self.directions.reset();
        self.cursor = self.score.first_bar_location().unwrap_or_default();
    }

    /// Move the cursor without touching repeat or direction state.
    ///
    /// This is the "jump to location" a UI triggers mid-playback; replay
    /// from the start needs [`rewind`](Self::rewind) instead, because
    /// already-followed directions stay consumed across a seek.
    pub fn seek(&mut self, location: SystemLocation) {
        self.cursor = location;
    }

    /// Advance the cursor by one step and return the new location, or
    /// `None` at the end of the score.
    ///
    /// One step is: move to the next barline, let the enclosing repeat
    /// section (if any) redirect the cursor, then let the direction index
    /// act on the barlines crossed.
    pub fn advance(&mut self) -> Option<SystemLocation> {
        let prev = self.cursor;
        let next = self.score.next_bar_location(prev)?;

        // Repeat pass number used to gate direction symbols this step.
        let mut pass = 1;

        if let Some(section) = self.repeats.find_repeat_mut(next) {
            pass = section.active_repeat();
            let target = section.perform_repeat(next);

            if target < next {
                // Loop back to the section start (or an earlier ending).
                // A Segno sitting at the landing bar must be armed, not
                // silently skipped.
                let landing_pass = section.active_repeat();
                self.directions.check_segno_mark(target, landing_pass);
                self.cursor = target;
                return Some(target);
            }

            if section.is_exhausted() {
                // Fully exited: make the section replay correctly if an
                // outer repeat or jump brings us back.
                section.reset();
            }

            if target > next {
                // Forward branch: entering a later alternate ending, or
                // skipping out of an exhausted section.  The landing bar
                // itself may carry a direction.
                let landed = self.directions.perform_direction_by_end_bar(target, pass);
                self.cursor = landed;
                return Some(landed);
            }
        }

        let followed = self.directions.perform_direction(prev, next, pass);
        if followed != next {
            self.directions.check_segno_mark(followed, pass);
            self.cursor = followed;
            return Some(followed);
        }

        self.cursor = next;
        Some(next)
    }

    /// Unroll the score from the beginning into play order.  Rewinds the
    /// session first, so the result is always that of a fresh pass.
    pub fn play_order(&mut self) -> Vec<SystemLocation> {
        let Some(first) = self.score.first_bar_location() else {
            return Vec::new();
        };
        self.rewind();

        let limit = self.score.bar_count().saturating_mul(UNROLL_ITERATION_FACTOR);
        let mut order = vec![first];
        while let Some(location) = self.advance() {
            order.push(location);
            if order.len() > limit {
                log::warn!(
                    "unrolling hit the safety limit ({limit} locations) — \
                     play order may be truncated"
                );
                break;
            }
        }
        order
    }
}

/// Unroll a score into the effective playback order of its barlines.
pub fn unroll(score: &Score) -> Vec<SystemLocation> {
    Navigator::new(score).play_order()
}
