//! tabnav — score playback navigation engine for guitar tablature.
//!
//! Given a score whose bars carry repeat marks, alternate endings and
//! jump directions (Segno, Coda, D.C., D.S., Fine, …), this crate
//! computes the effective playback order: repeat discovery with arbitrary
//! nesting, per-iteration alternate-ending routing, and the direction
//! state machine with its Segno deferral and precedence rules.
//!
//! # Example
//! ```
//! use tabnav::{unroll, BarType, Barline, Score, System};
//!
//! let score = Score {
//!     systems: vec![System {
//!         barlines: vec![
//!             Barline::new(0, BarType::RepeatStart),
//!             Barline::new(1, BarType::Bar),
//!             Barline::repeat_end(2, 2),
//!             Barline::new(3, BarType::Bar),
//!         ],
//!         ..Default::default()
//!     }],
//! };
//!
//! let order: Vec<i32> = unroll(&score).iter().map(|loc| loc.position).collect();
//! assert_eq!(order, vec![0, 1, 0, 1, 2, 3]);
//! ```

pub mod directions;
pub mod location;
pub mod model;
pub mod navigator;
pub mod repeats;

pub use directions::DirectionIndex;
pub use location::SystemLocation;
pub use model::*;
pub use navigator::{unroll, Navigator};
pub use repeats::{RepeatIndexer, RepeatedSection};

/// Parse a score model from its JSON representation.
/// Useful for receiving score data across FFI boundaries.
pub fn score_from_json(json: &str) -> Result<Score, String> {
    serde_json::from_str(json).map_err(|e| format!("Invalid score JSON: {e}"))
}

/// Serialize a score model to a JSON string.
pub fn score_to_json(score: &Score) -> Result<String, String> {
    serde_json::to_string_pretty(score).map_err(|e| format!("JSON serialization error: {e}"))
}

/// Serialize an unrolled play order to JSON.
pub fn play_order_to_json(order: &[SystemLocation]) -> String {
    serde_json::to_string(order).unwrap_or_else(|_| "[]".to_string())
}
