//! Data model for the navigable parts of a score: systems, barlines,
//! alternate endings and jump directions.
//!
//! These structures are read-only as far as playback is concerned — the
//! navigation engine only consumes them.  They carry serde derives so the
//! host application can hand scores across FFI boundaries as JSON.

use serde::{Deserialize, Serialize};

use crate::location::SystemLocation;

/// The navigable score: an ordered list of systems (lines of music).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Score {
    pub systems: Vec<System>,
}

/// One system (line of music) in the score.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct System {
    /// Barlines in increasing position order.  Every system starts with a
    /// barline (conventionally at position 0) and ends with one.
    pub barlines: Vec<Barline>,
    /// Alternate-ending brackets ("1.", "2.", …) anchored to barline
    /// positions in this system.
    pub alternate_endings: Vec<AlternateEnding>,
    /// Jump directions (Segno, D.C., Fine, …) anchored to positions in
    /// this system.
    pub directions: Vec<Direction>,
}

/// Barline type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarType {
    #[default]
    Bar,
    DoubleBar,
    RepeatStart,
    RepeatEnd,
    DoubleBarFine,
}

/// A measure boundary, possibly marked as a repeat start/end.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Barline {
    /// Position of this barline within its system.
    pub position: i32,
    pub bar_type: BarType,
    /// Total number of times the repeated section is played (2 = play
    /// twice).  Only meaningful for `RepeatEnd` barlines.
    pub repeat_count: i32,
}

/// A numbered ending bracket: content played only during the listed
/// repeat iterations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlternateEnding {
    /// Barline position where this ending begins.
    pub position: i32,
    /// Repeat iterations during which this ending is taken, e.g. [1] or
    /// [2, 3].  Never empty for a real ending.
    pub numbers: Vec<i32>,
}

/// A direction marker holding one or more symbols at a position.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Direction {
    pub position: i32,
    pub symbols: Vec<DirectionSymbol>,
}

/// Direction symbol type.
///
/// The declaration order matters: the landmark symbols (Coda, DoubleCoda,
/// Segno, SegnoSegno) sort before `Fine`, and `Fine` plus every jump
/// symbol sort at or after it, so `symbol_type >= Fine` selects the class
/// of symbols that can actually be performed.  Landmarks are only ever
/// jumped *to*.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum SymbolType {
    Coda,
    DoubleCoda,
    Segno,
    SegnoSegno,
    Fine,
    DaCapo,
    DalSegno,
    DalSegnoSegno,
    ToCoda,
    ToDoubleCoda,
    DaCapoAlCoda,
    DaCapoAlDoubleCoda,
    DaCapoAlFine,
    DalSegnoAlCoda,
    DalSegnoAlDoubleCoda,
    DalSegnoAlFine,
    DalSegnoSegnoAlCoda,
    DalSegnoSegnoAlDoubleCoda,
    DalSegnoSegnoAlFine,
}

impl SymbolType {
    /// Whether this symbol belongs to the performable (terminal/jump)
    /// class, as opposed to being a landmark.
    pub fn is_performable(self) -> bool {
        self >= SymbolType::Fine
    }
}

/// Precondition on the engine's active-symbol state: the symbol only
/// fires when this matches, with `None` meaning "always eligible".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActiveSymbolType {
    #[default]
    None,
    DaCapo,
    DalSegno,
    DalSegnoSegno,
}

/// One jump/landmark symbol with its activation preconditions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DirectionSymbol {
    pub symbol_type: SymbolType,
    pub active_symbol_type: ActiveSymbolType,
    /// 0 applies on every repeat iteration; a nonzero value restricts the
    /// symbol to that iteration of the enclosing repeat.
    pub repeat_number: i32,
}

impl Barline {
    pub fn new(position: i32, bar_type: BarType) -> Self {
        Self {
            position,
            bar_type,
            repeat_count: 0,
        }
    }

    /// A repeat-end barline with its total play count.
    pub fn repeat_end(position: i32, repeat_count: i32) -> Self {
        Self {
            position,
            bar_type: BarType::RepeatEnd,
            repeat_count,
        }
    }
}

impl DirectionSymbol {
    pub fn new(symbol_type: SymbolType) -> Self {
        Self {
            symbol_type,
            active_symbol_type: ActiveSymbolType::None,
            repeat_number: 0,
        }
    }

    pub fn with_active_symbol(mut self, active: ActiveSymbolType) -> Self {
        self.active_symbol_type = active;
        self
    }

    pub fn with_repeat_number(mut self, repeat_number: i32) -> Self {
        self.repeat_number = repeat_number;
        self
    }
}

impl System {
    /// The last barline strictly before `position`, if any.
    pub fn previous_barline(&self, position: i32) -> Option<&Barline> {
        self.barlines
            .iter()
            .rev()
            .find(|bar| bar.position < position)
    }
}

impl Score {
    pub fn new() -> Self {
        Self::default()
    }

    /// Location of the first barline in the score.
    pub fn first_bar_location(&self) -> Option<SystemLocation> {
        self.systems.iter().enumerate().find_map(|(idx, system)| {
            system
                .barlines
                .first()
                .map(|bar| SystemLocation::new(idx as i32, bar.position))
        })
    }

    /// Location of the final barline of the last system — the destination
    /// of a `Fine`.
    pub fn last_bar_location(&self) -> Option<SystemLocation> {
        self.systems
            .iter()
            .enumerate()
            .rev()
            .find_map(|(idx, system)| {
                system
                    .barlines
                    .last()
                    .map(|bar| SystemLocation::new(idx as i32, bar.position))
            })
    }

    /// The barline immediately after `loc` in timeline order: the next
    /// barline of the same system, else the first barline of the next
    /// non-empty system.  `None` at the end of the score.
    pub fn next_bar_location(&self, loc: SystemLocation) -> Option<SystemLocation> {
        let system = self.systems.get(loc.system as usize)?;
        if let Some(bar) = system.barlines.iter().find(|b| b.position > loc.position) {
            return Some(SystemLocation::new(loc.system, bar.position));
        }

        let mut sys = loc.system as usize + 1;
        while let Some(system) = self.systems.get(sys) {
            if let Some(bar) = system.barlines.first() {
                return Some(SystemLocation::new(sys as i32, bar.position));
            }
            sys += 1;
        }
        None
    }

    /// Total number of barlines across all systems.
    pub fn bar_count(&self) -> usize {
        self.systems.iter().map(|s| s.barlines.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_system_score() -> Score {
        Score {
            systems: vec![
                System {
                    barlines: vec![
                        Barline::new(0, BarType::Bar),
                        Barline::new(4, BarType::Bar),
                        Barline::new(8, BarType::Bar),
                    ],
                    ..Default::default()
                },
                System {
                    barlines: vec![
                        Barline::new(0, BarType::Bar),
                        Barline::new(6, BarType::DoubleBar),
                    ],
                    ..Default::default()
                },
            ],
        }
    }

    #[test]
    fn next_bar_location_walks_within_and_across_systems() {
        let score = two_system_score();
        assert_eq!(
            score.next_bar_location(SystemLocation::new(0, 0)),
            Some(SystemLocation::new(0, 4))
        );
        assert_eq!(
            score.next_bar_location(SystemLocation::new(0, 8)),
            Some(SystemLocation::new(1, 0))
        );
        assert_eq!(score.next_bar_location(SystemLocation::new(1, 6)), None);
    }

    #[test]
    fn first_and_last_bar_locations() {
        let score = two_system_score();
        assert_eq!(score.first_bar_location(), Some(SystemLocation::new(0, 0)));
        assert_eq!(score.last_bar_location(), Some(SystemLocation::new(1, 6)));
        assert_eq!(Score::new().last_bar_location(), None);
    }

    #[test]
    fn previous_barline_is_strictly_before() {
        let score = two_system_score();
        let system = &score.systems[0];
        assert_eq!(system.previous_barline(5).map(|b| b.position), Some(4));
        assert_eq!(system.previous_barline(4).map(|b| b.position), Some(0));
        assert!(system.previous_barline(0).is_none());
    }
}
