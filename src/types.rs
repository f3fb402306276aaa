//! Core domain types shared by the board, controller and player agents.

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

/// Index of a board position in `[0, slot_count)`.
pub type Slot = usize;

/// A unit drawn from the finite supply.
///
/// Items are numbered `0..total_items`. The number itself carries no meaning
/// to the coordination core; validators may decode it (see
/// [`SetRules`](crate::SetRules)).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Serialize, Deserialize,
)]
#[display("#{_0}")]
pub struct Item(pub u32);

impl Item {
    /// Returns the raw item number.
    pub fn id(self) -> u32 {
        self.0
    }
}

/// Identifier of a player, in `[0, player_count)`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Serialize, Deserialize,
)]
#[display("player {_0}")]
pub struct PlayerId(pub usize);

impl PlayerId {
    /// Returns the player's index.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Maximum number of markers a player may hold at once.
pub const MARKERS_PER_PLAYER: usize = 3;

/// Controller's decision on a submitted triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Verdict {
    /// The triple was valid: score a point and serve the point freeze.
    Point,
    /// The triple was invalid: serve the penalty freeze.
    Penalty,
    /// The submission no longer referred to the board as it stands
    /// (an item vanished, or the round was reset). No side effects.
    Void,
}
