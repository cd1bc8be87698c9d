//! Repeat handling: discovery of (possibly nested) repeated sections and
//! the per-section playback state machine that decides where the cursor
//! goes when it reaches a repeat boundary.
//!
//! Discovery scans every barline once, in timeline order, and produces a
//! flat set of [`RepeatedSection`]s ordered by start location.  Nested
//! sections are found recursively; a parent never claims barlines that
//! already belong to one of its sub-sections.

use std::collections::BTreeMap;

use crate::location::SystemLocation;
use crate::model::{AlternateEnding, BarType, Score};

/// One repeat range: start bar, end bars, and the alternate-ending
/// sub-ranges keyed by repeat iteration number.
///
/// `active_repeat` is mutable playback state (1-based pass counter); the
/// rest is fixed once discovery finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatedSection {
    start_bar_location: SystemLocation,
    /// The furthest barline belonging to this section; playback resumes
    /// here once all repeats are exhausted.
    last_end_location: SystemLocation,
    /// The shared branch point: either the repeat-end bar (no alternate
    /// endings) or the bar where the endings start to diverge.
    base_end_location: SystemLocation,
    /// Iteration number → boundary bar that closes that iteration's
    /// ending (the first bar past the ending's content).
    alternate_endings: BTreeMap<i32, SystemLocation>,
    /// Iteration number → bar where that iteration's ending begins.
    alternate_startings: BTreeMap<i32, SystemLocation>,
    /// Total number of passes through the section.
    max_repeat_round: i32,
    /// Current pass, starting at 1.
    active_repeat: i32,
}

impl RepeatedSection {
    fn new(start_bar: SystemLocation) -> Self {
        Self {
            start_bar_location: start_bar,
            last_end_location: start_bar,
            base_end_location: start_bar,
            alternate_endings: BTreeMap::new(),
            alternate_startings: BTreeMap::new(),
            max_repeat_round: 0,
            active_repeat: 1,
        }
    }

    pub fn start_bar_location(&self) -> SystemLocation {
        self.start_bar_location
    }

    pub fn last_end_bar_location(&self) -> SystemLocation {
        self.last_end_location
    }

    pub fn total_repeat_count(&self) -> i32 {
        self.max_repeat_round
    }

    pub fn active_repeat(&self) -> i32 {
        self.active_repeat
    }

    pub fn alternate_ending_count(&self) -> usize {
        self.alternate_endings.len()
    }

    /// Boundary bar of the ending taken on iteration `number`, if one is
    /// assigned to that iteration.
    pub fn find_alternate_ending(&self, number: i32) -> Option<SystemLocation> {
        self.alternate_endings.get(&number).copied()
    }

    /// True on the final pass through the section.
    pub fn is_last_repeat_turn(&self) -> bool {
        self.max_repeat_round - self.active_repeat == 0
    }

    /// True once the pass counter has moved past the final pass.
    pub fn is_exhausted(&self) -> bool {
        self.active_repeat > self.max_repeat_round
    }

    /// Restore the section for a fresh pass.  Called when the section is
    /// fully exited so it replays correctly later (e.g. when nested
    /// inside an outer repeat), and on rewind-to-start.
    pub fn reset(&mut self) {
        self.active_repeat = 1;
    }

    /// Decide where playback goes from `loc`, advancing the pass counter
    /// when a boundary is crossed.
    ///
    /// Returns `loc` unchanged when nothing happens here, the start bar
    /// (or an alternate-ending start) when a repeat is taken, and the
    /// last end bar when the section is exhausted.
    pub fn perform_repeat(&mut self, loc: SystemLocation) -> SystemLocation {
        // Exhausted section queried again: fall through to the end.
        if self.is_exhausted() {
            return self.last_end_location;
        }

        if self.alternate_endings.is_empty() {
            if loc != self.base_end_location {
                return loc;
            }
            self.active_repeat += 1;
            if self.is_exhausted() {
                return self.last_end_location;
            }
            return self.start_bar_location;
        }

        // At the shared branch point, route to the ending assigned to the
        // current pass; with no assigned ending, just take the repeat.
        if loc == self.base_end_location {
            return match self.alternate_startings.get(&self.active_repeat) {
                Some(start) => *start,
                None => {
                    self.active_repeat += 1;
                    self.start_bar_location
                }
            };
        }

        match self.alternate_endings.get(&self.active_repeat) {
            // Inside an ending that doesn't belong to this pass.
            None => loc,
            Some(end) if loc == *end => {
                self.active_repeat += 1;
                if self.is_exhausted() {
                    self.last_end_location
                } else {
                    self.start_bar_location
                }
            }
            Some(_) => loc,
        }
    }
}

/// Record a closed-out ending bracket into the section's maps, one entry
/// per iteration number the bracket applies to.
fn log_alternate_ending(
    section: &mut RepeatedSection,
    ending_system: i32,
    ending: &AlternateEnding,
    end_location: SystemLocation,
    max_round: &mut i32,
) {
    let start_location = SystemLocation::new(ending_system, ending.position);
    for &number in &ending.numbers {
        if number > *max_round {
            *max_round = number;
        }
        section.alternate_endings.insert(number, end_location);
        section.alternate_startings.insert(number, start_location);
    }
    section.max_repeat_round = *max_round;
}

/// Recursively discover the repeated section starting at `start_location`
/// (exclusive), together with every nested section inside it.
///
/// Returns the base section only if some repeat marker (repeat-end bar or
/// alternate ending) was actually found for it; nested sub-sections are
/// returned regardless.  The top-level call passes the score origin, which
/// turns an unpaired repeat-end into a section that implicitly starts at
/// the beginning of the score.
pub(crate) fn search_repeated_section(
    score: &Score,
    start_location: SystemLocation,
) -> (Option<RepeatedSection>, Vec<RepeatedSection>) {
    let mut base = RepeatedSection::new(start_location);
    let mut sub_sections: Vec<RepeatedSection> = Vec::new();

    let mut found = false;
    // Pending (not yet closed) alternate ending and the system it sits in.
    let mut pending: Option<(i32, AlternateEnding)> = None;
    let mut max_round = 0;
    let mut cur = start_location;
    // Most recent plain barline, for ending boundaries that fall exactly
    // on a system break.
    let mut last_plain = SystemLocation::default();

    'scan: for (system_index, system) in score.systems.iter().enumerate() {
        for bar in &system.barlines {
            cur = SystemLocation::new(system_index as i32, bar.position);
            if cur <= start_location {
                continue;
            }

            if bar.bar_type == BarType::RepeatStart {
                let (inner, inner_subs) = search_repeated_section(score, cur);
                if let Some(inner) = inner {
                    sub_sections.push(inner);
                }
                sub_sections.extend(inner_subs);
            }

            // Barlines claimed by a nested section are not ours to scan.
            if sub_sections
                .iter()
                .any(|s| cur >= s.start_bar_location && cur <= s.last_end_location)
            {
                continue;
            }

            let ending_here = system
                .alternate_endings
                .iter()
                .find(|e| e.position == cur.position && !e.numbers.is_empty());
            if let Some(ending) = ending_here {
                found = true;
                match pending.take() {
                    Some((pending_system, pending_ending)) => {
                        // An ending bracket starting at position 0 means the
                        // previous one ended at the system break.
                        let end_location = if cur.position == 0 { last_plain } else { cur };
                        log_alternate_ending(
                            &mut base,
                            pending_system,
                            &pending_ending,
                            end_location,
                            &mut max_round,
                        );
                    }
                    None => {
                        // First ending seen: this bar is the shared branch
                        // point before the endings diverge.
                        base.base_end_location = cur;
                    }
                }
                pending = Some((system_index as i32, ending.clone()));
                continue;
            }

            if bar.bar_type == BarType::RepeatEnd {
                match &pending {
                    None => {
                        base.last_end_location = cur;
                        base.base_end_location = cur;
                        base.max_repeat_round = bar.repeat_count;
                        found = true;
                        break 'scan;
                    }
                    Some((pending_system, pending_ending)) => {
                        // A repeat-end inside the highest-numbered ending is
                        // part of that ending's content; anything lower
                        // closes out here.
                        let reaches_max =
                            pending_ending.numbers.iter().any(|&n| n >= max_round);
                        if !reaches_max {
                            let (pending_system, pending_ending) =
                                (*pending_system, pending_ending.clone());
                            log_alternate_ending(
                                &mut base,
                                pending_system,
                                &pending_ending,
                                cur,
                                &mut max_round,
                            );
                            base.last_end_location = cur;
                            pending = None;
                        }
                    }
                }
            }

            last_plain = cur;
        }
    }

    // An ending still open at the end of the scan closes at the final
    // location reached.
    if let Some((pending_system, pending_ending)) = pending {
        log_alternate_ending(&mut base, pending_system, &pending_ending, cur, &mut max_round);
        base.last_end_location = cur;
        base.max_repeat_round = max_round;
    }

    (found.then_some(base), sub_sections)
}

/// Index of every repeated section in a score, ordered by start location.
///
/// Built once per loaded score and queried during playback; only the
/// `active_repeat` counters inside the sections mutate after that.
#[derive(Debug, Clone)]
pub struct RepeatIndexer {
    repeats: BTreeMap<SystemLocation, RepeatedSection>,
}

impl RepeatIndexer {
    pub fn new(score: &Score) -> Self {
        let (base, mut sections) =
            search_repeated_section(score, SystemLocation::default());
        if let Some(base) = base {
            sections.push(base);
        }

        let repeats = sections
            .into_iter()
            .map(|section| (section.start_bar_location(), section))
            .collect();
        Self { repeats }
    }

    /// The innermost section containing `loc`, if any: among sections
    /// starting at or before `loc`, the latest-starting one whose end
    /// reaches `loc`.
    pub fn find_repeat(&self, loc: SystemLocation) -> Option<&RepeatedSection> {
        self.repeats
            .range(..=loc)
            .rev()
            .map(|(_, section)| section)
            .find(|section| section.last_end_bar_location() >= loc)
    }

    /// Mutable variant of [`find_repeat`](Self::find_repeat); playback
    /// advances the found section's pass counter in place.
    pub fn find_repeat_mut(&mut self, loc: SystemLocation) -> Option<&mut RepeatedSection> {
        self.repeats
            .range_mut(..=loc)
            .rev()
            .map(|(_, section)| section)
            .find(|section| section.last_end_bar_location() >= loc)
    }

    /// All discovered sections in start-location order.
    pub fn repeats(&self) -> impl Iterator<Item = &RepeatedSection> {
        self.repeats.values()
    }

    pub fn is_empty(&self) -> bool {
        self.repeats.is_empty()
    }

    /// Restore every section for a replay from the start of the score.
    pub fn reset(&mut self) {
        for section in self.repeats.values_mut() {
            section.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Barline, System};

    fn score_with_bars(bars: Vec<Barline>) -> Score {
        Score {
            systems: vec![System {
                barlines: bars,
                ..Default::default()
            }],
        }
    }

    #[test]
    fn plain_repeat_pair_discovery() {
        let score = score_with_bars(vec![
            Barline::new(0, BarType::RepeatStart),
            Barline::new(2, BarType::Bar),
            Barline::repeat_end(4, 3),
            Barline::new(6, BarType::Bar),
        ]);

        let indexer = RepeatIndexer::new(&score);
        let sections: Vec<_> = indexer.repeats().collect();
        assert_eq!(sections.len(), 1);

        let section = sections[0];
        assert_eq!(section.start_bar_location(), SystemLocation::new(0, 0));
        assert_eq!(section.last_end_bar_location(), SystemLocation::new(0, 4));
        assert_eq!(section.total_repeat_count(), 3);
        assert_eq!(section.alternate_ending_count(), 0);
    }

    #[test]
    fn unpaired_repeat_end_starts_at_score_origin() {
        let score = score_with_bars(vec![
            Barline::new(0, BarType::Bar),
            Barline::new(3, BarType::Bar),
            Barline::repeat_end(5, 2),
        ]);

        let indexer = RepeatIndexer::new(&score);
        let section = indexer.find_repeat(SystemLocation::new(0, 3)).unwrap();
        assert_eq!(section.start_bar_location(), SystemLocation::new(0, 0));
        assert_eq!(section.last_end_bar_location(), SystemLocation::new(0, 5));
    }

    #[test]
    fn section_after_repeat_end_is_outside() {
        let score = score_with_bars(vec![
            Barline::new(0, BarType::RepeatStart),
            Barline::repeat_end(4, 2),
            Barline::new(8, BarType::Bar),
        ]);

        let indexer = RepeatIndexer::new(&score);
        assert!(indexer.find_repeat(SystemLocation::new(0, 4)).is_some());
        assert!(indexer.find_repeat(SystemLocation::new(0, 8)).is_none());
    }
}
