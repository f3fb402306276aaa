//! Notification surface consumed by rendering and other collaborators.

use crate::types::{Item, PlayerId, Slot};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Receives one call per logical game event, in the order events occur.
///
/// Board notifications are delivered while the board lock is held, so an
/// implementation must not call back into the [`Board`](crate::Board).
/// Every method defaults to a no-op.
pub trait GameObserver: Send + Sync {
    /// An item was dealt onto `slot`.
    fn on_item_placed(&self, _slot: Slot, _item: Item) {}

    /// The item on `slot` left the board.
    fn on_item_removed(&self, _slot: Slot) {}

    /// `player` placed a marker on `slot`.
    fn on_marker_placed(&self, _player: PlayerId, _slot: Slot) {}

    /// `player`'s marker on `slot` was removed.
    fn on_marker_removed(&self, _player: PlayerId, _slot: Slot) {}

    /// `player`'s score changed to `score`.
    fn on_score_changed(&self, _player: PlayerId, _score: u32) {}

    /// `player` is frozen for `remaining` more time. Zero ends the freeze.
    fn on_freeze_changed(&self, _player: PlayerId, _remaining: Duration) {}

    /// The reshuffle countdown moved.
    fn on_countdown_changed(&self, _remaining: Duration, _low_time: bool) {}

    /// The game ended; `winners` holds every player with the top score.
    fn on_game_ended(&self, _winners: &BTreeSet<PlayerId>) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl GameObserver for NoopObserver {}

/// Observer that renders every notification as a tracing event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl GameObserver for TracingObserver {
    fn on_item_placed(&self, slot: Slot, item: Item) {
        debug!(slot, %item, "Item placed");
    }

    fn on_item_removed(&self, slot: Slot) {
        debug!(slot, "Item removed");
    }

    fn on_marker_placed(&self, player: PlayerId, slot: Slot) {
        debug!(%player, slot, "Marker placed");
    }

    fn on_marker_removed(&self, player: PlayerId, slot: Slot) {
        debug!(%player, slot, "Marker removed");
    }

    fn on_score_changed(&self, player: PlayerId, score: u32) {
        info!(%player, score, "Score changed");
    }

    fn on_freeze_changed(&self, player: PlayerId, remaining: Duration) {
        debug!(%player, remaining_ms = remaining.as_millis() as u64, "Freeze changed");
    }

    fn on_countdown_changed(&self, remaining: Duration, low_time: bool) {
        if low_time {
            info!(remaining_ms = remaining.as_millis() as u64, "Countdown running low");
        }
    }

    fn on_game_ended(&self, winners: &BTreeSet<PlayerId>) {
        let winners: Vec<_> = winners.iter().map(|p| p.index()).collect();
        info!(?winners, "Game ended");
    }
}

/// A notification, as forwarded by [`ChannelObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    /// See [`GameObserver::on_item_placed`].
    ItemPlaced {
        /// Slot that received the item.
        slot: Slot,
        /// Dealt item.
        item: Item,
    },
    /// See [`GameObserver::on_item_removed`].
    ItemRemoved {
        /// Cleared slot.
        slot: Slot,
    },
    /// See [`GameObserver::on_marker_placed`].
    MarkerPlaced {
        /// Marking player.
        player: PlayerId,
        /// Marked slot.
        slot: Slot,
    },
    /// See [`GameObserver::on_marker_removed`].
    MarkerRemoved {
        /// Owning player.
        player: PlayerId,
        /// Unmarked slot.
        slot: Slot,
    },
    /// See [`GameObserver::on_score_changed`].
    ScoreChanged {
        /// Scoring player.
        player: PlayerId,
        /// New score.
        score: u32,
    },
    /// See [`GameObserver::on_freeze_changed`].
    FreezeChanged {
        /// Frozen player.
        player: PlayerId,
        /// Remaining freeze time.
        remaining: Duration,
    },
    /// See [`GameObserver::on_countdown_changed`].
    CountdownChanged {
        /// Time left before reshuffle.
        remaining: Duration,
        /// Whether the warning threshold was crossed.
        low_time: bool,
    },
    /// See [`GameObserver::on_game_ended`].
    GameEnded {
        /// Players sharing the top score.
        winners: BTreeSet<PlayerId>,
    },
}

/// Observer that forwards each notification as a [`GameEvent`] on a channel.
///
/// Sends never block; events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    event_tx: mpsc::UnboundedSender<GameEvent>,
}

impl ChannelObserver {
    /// Creates an observer together with the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GameEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (Self { event_tx }, event_rx)
    }

    fn emit(&self, event: GameEvent) {
        // A closed receiver only means nobody is watching anymore.
        let _ = self.event_tx.send(event);
    }
}

impl GameObserver for ChannelObserver {
    fn on_item_placed(&self, slot: Slot, item: Item) {
        self.emit(GameEvent::ItemPlaced { slot, item });
    }

    fn on_item_removed(&self, slot: Slot) {
        self.emit(GameEvent::ItemRemoved { slot });
    }

    fn on_marker_placed(&self, player: PlayerId, slot: Slot) {
        self.emit(GameEvent::MarkerPlaced { player, slot });
    }

    fn on_marker_removed(&self, player: PlayerId, slot: Slot) {
        self.emit(GameEvent::MarkerRemoved { player, slot });
    }

    fn on_score_changed(&self, player: PlayerId, score: u32) {
        self.emit(GameEvent::ScoreChanged { player, score });
    }

    fn on_freeze_changed(&self, player: PlayerId, remaining: Duration) {
        self.emit(GameEvent::FreezeChanged { player, remaining });
    }

    fn on_countdown_changed(&self, remaining: Duration, low_time: bool) {
        self.emit(GameEvent::CountdownChanged { remaining, low_time });
    }

    fn on_game_ended(&self, winners: &BTreeSet<PlayerId>) {
        self.emit(GameEvent::GameEnded {
            winners: winners.clone(),
        });
    }
}
