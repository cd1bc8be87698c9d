//! A comparable (system, position) coordinate identifying a point in the
//! score timeline.  Used as the playback cursor and as the key for the
//! repeat and direction indexes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A location in the score: system index first, then position within the
/// system.  The derived ordering is lexicographic (system, then position),
/// which is exactly the timeline order of the score.
///
/// No validation happens at this layer — out-of-range values are a caller
/// error.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SystemLocation {
    /// Index of the system (line of music), 0-based.
    pub system: i32,
    /// Position within the system (barline slot), 0-based.
    pub position: i32,
}

impl SystemLocation {
    pub fn new(system: i32, position: i32) -> Self {
        Self { system, position }
    }
}

impl fmt::Display for SystemLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.system, self.position)
    }
}
