//! Error types for board operations.

use crate::types::{MARKERS_PER_PLAYER, PlayerId, Slot};
use derive_more::{Display, Error};

/// Rejection raised by a [`Board`](crate::Board) operation.
///
/// None of these are fatal: callers treat them as a no-op and log them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum BoardError {
    /// Slot index is outside the board.
    #[display("slot {slot} is outside the board (size {size})")]
    SlotOutOfRange {
        /// Requested slot.
        slot: Slot,
        /// Board size.
        size: usize,
    },
    /// Player index is outside the configured player range.
    #[display("{player} is not seated at this board")]
    UnknownPlayer {
        /// Requested player.
        player: PlayerId,
    },
    /// Slot already holds an item.
    #[display("slot {_0} is already occupied")]
    SlotOccupied(#[error(not(source))] Slot),
    /// Slot holds no item.
    #[display("slot {_0} is empty")]
    SlotEmpty(#[error(not(source))] Slot),
    /// Player already holds the maximum number of markers.
    #[display("{_0} already holds {} markers", MARKERS_PER_PLAYER)]
    MarkerLimit(#[error(not(source))] PlayerId),
    /// Player already marks this slot.
    #[display("{player} already marks slot {slot}")]
    DuplicateMarker {
        /// Marking player.
        player: PlayerId,
        /// Marked slot.
        slot: Slot,
    },
}
