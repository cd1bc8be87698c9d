//! Direction navigation: indexes every jump/landmark symbol in the score
//! and resolves which direction to follow as playback crosses barlines.
//!
//! Directions fire at most once per playback pass — a followed entry is
//! removed from the index.  `reset()` restores the index from a pristine
//! snapshot taken at build time, which is what a rewind-to-start must use
//! (a live index that has already fired would skip directions on replay).

use std::collections::BTreeMap;

use crate::location::SystemLocation;
use crate::model::{ActiveSymbolType, DirectionSymbol, Score, SymbolType};

/// Per-score-session direction index and navigation state machine.
#[derive(Debug, Clone)]
pub struct DirectionIndex {
    /// Location → symbols at that location, in insertion order.  Entries
    /// are consumed as directions fire.
    directions: BTreeMap<SystemLocation, Vec<DirectionSymbol>>,
    /// Snapshot of `directions` as built, for `reset()`.
    pristine: BTreeMap<SystemLocation, Vec<DirectionSymbol>>,
    /// First location of each landmark/symbol type (jump destinations).
    symbol_locations: BTreeMap<SymbolType, SystemLocation>,
    /// Destination of `Fine`: the final barline of the last system.
    fine_location: SystemLocation,

    active_symbol: ActiveSymbolType,
    /// A Segno was crossed; the next eligible symbol must resolve the
    /// DalSegno family (or a previously deferred To-Coda).
    need_segno: bool,
    /// Same, for SegnoSegno / the DalSegnoSegno family.
    need_segno_segno: bool,
    /// To-Coda symbol left pending by a DalSegno(Segno)AlCoda resolution:
    /// the next such symbol crossed after returning to the sign fires.
    deferred_symbol: Option<SymbolType>,
}

impl DirectionIndex {
    pub fn new(score: &Score) -> Self {
        let mut directions: BTreeMap<SystemLocation, Vec<DirectionSymbol>> = BTreeMap::new();
        let mut symbol_locations = BTreeMap::new();

        for (system_index, system) in score.systems.iter().enumerate() {
            for direction in &system.directions {
                let location = SystemLocation::new(system_index as i32, direction.position);
                for &symbol in &direction.symbols {
                    directions.entry(location).or_default().push(symbol);
                    symbol_locations
                        .entry(symbol.symbol_type)
                        .or_insert(location);
                }
            }
        }

        Self {
            pristine: directions.clone(),
            directions,
            symbol_locations,
            fine_location: score.last_bar_location().unwrap_or_default(),
            active_symbol: ActiveSymbolType::None,
            need_segno: false,
            need_segno_segno: false,
            deferred_symbol: None,
        }
    }

    pub fn active_symbol(&self) -> ActiveSymbolType {
        self.active_symbol
    }

    /// Restore the index and navigation state for a replay from the start
    /// of the score.
    pub fn reset(&mut self) {
        self.directions = self.pristine.clone();
        self.active_symbol = ActiveSymbolType::None;
        self.need_segno = false;
        self.need_segno_segno = false;
        self.deferred_symbol = None;
    }

    /// Examine the first direction crossed while advancing from
    /// `prev_location` to `current_location` and follow it if eligible.
    ///
    /// A bare Segno/SegnoSegno marker is consumed without jumping — it
    /// arms the two-step deferral so the matching DalSegno family symbol
    /// fires later.  Ineligible entries stay in the index for future
    /// passes.  Returns the (possibly redirected) playback location.
    pub fn perform_direction(
        &mut self,
        prev_location: SystemLocation,
        current_location: SystemLocation,
        active_repeat: i32,
    ) -> SystemLocation {
        let Some((location, symbol)) = self.first_in_range(prev_location, current_location)
        else {
            return current_location;
        };

        if symbol.repeat_number == 0 || symbol.repeat_number == active_repeat {
            if symbol.symbol_type == SymbolType::Segno && !self.need_segno_segno {
                self.need_segno = true;
                self.consume(location);
                return current_location;
            }
            if symbol.symbol_type == SymbolType::SegnoSegno && !self.need_segno {
                self.need_segno_segno = true;
                self.consume(location);
                return current_location;
            }
        }

        if self.should_perform(symbol, active_repeat) {
            let target = self.follow_direction(symbol.symbol_type);
            self.consume(location);
            return target;
        }
        current_location
    }

    /// Look-ahead hook for jumps that land on (or right before) a Segno
    /// mark: arm the corresponding deferral without jumping, so the mark
    /// isn't silently skipped by the landing.
    pub fn check_segno_mark(&mut self, current_location: SystemLocation, active_repeat: i32) {
        let after = SystemLocation::new(current_location.system, current_location.position + 1);
        let Some((location, symbol)) = self
            .first_at(after)
            .map(|symbol| (after, symbol))
            .or_else(|| self.first_at(current_location).map(|s| (current_location, s)))
        else {
            return;
        };

        if symbol.repeat_number == 0 || symbol.repeat_number == active_repeat {
            if symbol.symbol_type == SymbolType::Segno && !self.need_segno_segno {
                self.need_segno = true;
                self.consume(location);
            } else if symbol.symbol_type == SymbolType::SegnoSegno && !self.need_segno {
                self.need_segno_segno = true;
                self.consume(location);
            }
        }
    }

    /// Follow a direction sitting exactly on `current_location`, if
    /// eligible.  Used at end-of-section boundaries, where the cursor
    /// lands on the bar rather than crossing it.
    pub fn perform_direction_by_end_bar(
        &mut self,
        current_location: SystemLocation,
        active_repeat: i32,
    ) -> SystemLocation {
        let Some(symbol) = self.first_at(current_location) else {
            return current_location;
        };

        if self.should_perform(symbol, active_repeat) {
            let target = self.follow_direction(symbol.symbol_type);
            self.consume(current_location);
            return target;
        }
        current_location
    }

    /// Eligibility test for a candidate symbol, updating the deferral
    /// state in place.
    ///
    /// A symbol gated on a repeat number only fires on that iteration.
    /// While a Segno deferral is armed, only the DalSegno family resolves
    /// it (recording any To-Coda continuation as deferred); other symbols
    /// fire only if they match that deferred continuation.  Symmetric for
    /// SegnoSegno.  Absent deferrals, a symbol fires iff its active-state
    /// precondition holds and it is in the performable class.
    fn should_perform(&mut self, symbol: DirectionSymbol, active_repeat: i32) -> bool {
        if symbol.repeat_number != 0 && symbol.repeat_number != active_repeat {
            return false;
        }

        if self.need_segno {
            if !matches!(
                symbol.symbol_type,
                SymbolType::DalSegno
                    | SymbolType::DalSegnoAlCoda
                    | SymbolType::DalSegnoAlDoubleCoda
                    | SymbolType::DalSegnoAlFine
            ) {
                if Some(symbol.symbol_type) == self.deferred_symbol
                    && self.matches_active_symbol(symbol)
                {
                    self.need_segno = false;
                    return true;
                }
                return false;
            }
            self.deferred_symbol = match symbol.symbol_type {
                SymbolType::DalSegnoAlCoda => Some(SymbolType::ToCoda),
                SymbolType::DalSegnoAlDoubleCoda => Some(SymbolType::ToDoubleCoda),
                _ => None,
            };
            self.need_segno = false;
        }

        if self.need_segno_segno {
            if !matches!(
                symbol.symbol_type,
                SymbolType::DalSegnoSegno
                    | SymbolType::DalSegnoSegnoAlCoda
                    | SymbolType::DalSegnoSegnoAlDoubleCoda
                    | SymbolType::DalSegnoSegnoAlFine
            ) {
                if Some(symbol.symbol_type) == self.deferred_symbol
                    && self.matches_active_symbol(symbol)
                {
                    self.need_segno_segno = false;
                    return true;
                }
                return false;
            }
            self.deferred_symbol = match symbol.symbol_type {
                SymbolType::DalSegnoSegnoAlCoda => Some(SymbolType::ToCoda),
                SymbolType::DalSegnoSegnoAlDoubleCoda => Some(SymbolType::ToDoubleCoda),
                _ => None,
            };
            self.need_segno_segno = false;
        }

        self.matches_active_symbol(symbol) && symbol.symbol_type.is_performable()
    }

    fn matches_active_symbol(&self, symbol: DirectionSymbol) -> bool {
        symbol.active_symbol_type == ActiveSymbolType::None
            || symbol.active_symbol_type == self.active_symbol
    }

    /// Resolve a fired symbol to its destination, updating the active
    /// symbol state for the returning jumps.
    fn follow_direction(&mut self, symbol_type: SymbolType) -> SystemLocation {
        if symbol_type == SymbolType::Fine {
            return self.fine_location;
        }

        let landmark = match symbol_type {
            SymbolType::DaCapo
            | SymbolType::DaCapoAlCoda
            | SymbolType::DaCapoAlDoubleCoda
            | SymbolType::DaCapoAlFine => {
                self.active_symbol = ActiveSymbolType::DaCapo;
                return SystemLocation::default();
            }

            SymbolType::DalSegno
            | SymbolType::DalSegnoAlCoda
            | SymbolType::DalSegnoAlDoubleCoda
            | SymbolType::DalSegnoAlFine => {
                self.active_symbol = ActiveSymbolType::DalSegno;
                SymbolType::Segno
            }

            SymbolType::DalSegnoSegno
            | SymbolType::DalSegnoSegnoAlCoda
            | SymbolType::DalSegnoSegnoAlDoubleCoda
            | SymbolType::DalSegnoSegnoAlFine => {
                self.active_symbol = ActiveSymbolType::DalSegnoSegno;
                SymbolType::SegnoSegno
            }

            SymbolType::ToCoda => SymbolType::Coda,
            SymbolType::ToDoubleCoda => SymbolType::DoubleCoda,
            _ => SymbolType::Coda,
        };

        match self.symbol_locations.get(&landmark) {
            Some(location) => *location,
            None => {
                // Malformed score — degrade to the start rather than
                // interrupting playback.
                log::warn!(
                    "no {:?} landmark found for {:?}; falling back to the score start",
                    landmark,
                    symbol_type
                );
                SystemLocation::default()
            }
        }
    }

    /// First entry with a location in `[from, to]`.
    fn first_in_range(
        &self,
        from: SystemLocation,
        to: SystemLocation,
    ) -> Option<(SystemLocation, DirectionSymbol)> {
        if from > to {
            return None;
        }
        self.directions
            .range(from..=to)
            .next()
            .and_then(|(location, symbols)| symbols.first().map(|s| (*location, *s)))
    }

    /// First symbol at exactly `location`.
    fn first_at(&self, location: SystemLocation) -> Option<DirectionSymbol> {
        self.directions
            .get(&location)
            .and_then(|symbols| symbols.first())
            .copied()
    }

    /// Remove the first symbol recorded at `location`.
    fn consume(&mut self, location: SystemLocation) {
        if let Some(symbols) = self.directions.get_mut(&location) {
            symbols.remove(0);
            if symbols.is_empty() {
                self.directions.remove(&location);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Barline, BarType, Direction, System};

    fn score_with_directions(directions: Vec<Direction>) -> Score {
        Score {
            systems: vec![System {
                barlines: vec![
                    Barline::new(0, BarType::Bar),
                    Barline::new(12, BarType::DoubleBarFine),
                ],
                directions,
                ..Default::default()
            }],
        }
    }

    #[test]
    fn landmark_map_records_first_occurrence() {
        let score = score_with_directions(vec![
            Direction {
                position: 2,
                symbols: vec![DirectionSymbol::new(SymbolType::Coda)],
            },
            Direction {
                position: 8,
                symbols: vec![DirectionSymbol::new(SymbolType::Coda)],
            },
        ]);

        let mut index = DirectionIndex::new(&score);
        let target = index.follow_direction(SymbolType::ToCoda);
        assert_eq!(target, SystemLocation::new(0, 2));
    }

    #[test]
    fn fine_destination_is_last_barline() {
        let score = score_with_directions(vec![]);
        let mut index = DirectionIndex::new(&score);
        assert_eq!(
            index.follow_direction(SymbolType::Fine),
            SystemLocation::new(0, 12)
        );
    }

    #[test]
    fn missing_landmark_falls_back_to_score_start() {
        let score = score_with_directions(vec![]);
        let mut index = DirectionIndex::new(&score);
        assert_eq!(
            index.follow_direction(SymbolType::ToCoda),
            SystemLocation::default()
        );
    }
}
