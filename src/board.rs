//! Shared board: slot contents and per-player markers.
//!
//! Every operation runs under one board-wide lock, and every compound
//! "read, decide, mutate" step the game needs ([`Board::toggle_marker`],
//! [`Board::claim_triple`], [`Board::clear_all`]) is a single method so no
//! caller ever composes it from separate lock acquisitions. Observer
//! notifications are emitted inside the critical section, which keeps them
//! in mutation order.

use crate::error::BoardError;
use crate::observer::GameObserver;
use crate::types::{Item, MARKERS_PER_PLAYER, PlayerId, Slot};
use crate::validator::TripleValidator;
use derive_new::new;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, instrument, trace};

/// Item taken off a slot, and the players whose markers went with it.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct Removal {
    /// The removed item.
    pub item: Item,
    /// Players that had a marker on the slot.
    pub affected: Vec<PlayerId>,
}

/// Result of [`Board::toggle_marker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerToggle {
    /// The player's existing marker was removed.
    Removed,
    /// A new marker was placed; `count` is the player's marker total.
    Placed {
        /// Markers now held by the player.
        count: usize,
    },
}

/// Result of [`Board::claim_triple`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// The player's markers no longer cover three occupied slots. Their
    /// remaining markers were cleared.
    Stale,
    /// The three items do not form a valid triple. The player's markers
    /// were cleared; the items stay.
    Invalid {
        /// The marked slots.
        slots: [Slot; 3],
    },
    /// The triple was valid and its items left the board, together with
    /// every marker (from any player) on those slots.
    Valid {
        /// The freed slots.
        slots: [Slot; 3],
        /// The removed items.
        items: [Item; 3],
    },
}

#[derive(Debug)]
struct BoardState {
    slots: Vec<Option<Item>>,
    /// Per player, in placement order.
    markers: Vec<Vec<Slot>>,
}

/// The shared board.
pub struct Board {
    state: Mutex<BoardState>,
    observer: Arc<dyn GameObserver>,
}

impl std::fmt::Debug for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Board")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Board {
    /// Creates an empty board with `slot_count` slots for `player_count` players.
    #[instrument(skip(observer))]
    pub fn new(slot_count: usize, player_count: usize, observer: Arc<dyn GameObserver>) -> Self {
        Self {
            state: Mutex::new(BoardState {
                slots: vec![None; slot_count],
                markers: vec![Vec::with_capacity(MARKERS_PER_PLAYER); player_count],
            }),
            observer,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BoardState> {
        // Every mutation leaves the state consistent before it can panic, so a
        // poisoned lock still guards valid data.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of slots.
    pub fn slot_count(&self) -> usize {
        self.lock().slots.len()
    }

    /// Number of seated players.
    pub fn player_count(&self) -> usize {
        self.lock().markers.len()
    }

    /// Places `item` on an empty `slot`.
    #[instrument(skip(self))]
    pub fn place_item(&self, slot: Slot, item: Item) -> Result<(), BoardError> {
        let mut state = self.lock();
        state.check_slot(slot)?;
        if state.slots[slot].is_some() {
            return Err(BoardError::SlotOccupied(slot));
        }
        state.slots[slot] = Some(item);
        self.observer.on_item_placed(slot, item);
        trace!("Item placed");
        Ok(())
    }

    /// Clears `slot`, together with every marker on it.
    #[instrument(skip(self))]
    pub fn remove_item(&self, slot: Slot) -> Result<Removal, BoardError> {
        let mut state = self.lock();
        self.remove_item_locked(&mut state, slot)
    }

    fn remove_item_locked(
        &self,
        state: &mut BoardState,
        slot: Slot,
    ) -> Result<Removal, BoardError> {
        state.check_slot(slot)?;
        let item = state.slots[slot].ok_or(BoardError::SlotEmpty(slot))?;

        let mut affected = Vec::new();
        for (index, markers) in state.markers.iter_mut().enumerate() {
            if let Some(pos) = markers.iter().position(|&s| s == slot) {
                markers.remove(pos);
                let player = PlayerId(index);
                self.observer.on_marker_removed(player, slot);
                affected.push(player);
            }
        }

        state.slots[slot] = None;
        self.observer.on_item_removed(slot);
        trace!(%item, affected = affected.len(), "Item removed");
        Ok(Removal::new(item, affected))
    }

    /// Places a marker for `player` on an occupied `slot`.
    ///
    /// Returns the number of markers the player holds afterwards.
    #[instrument(skip(self))]
    pub fn place_marker(&self, player: PlayerId, slot: Slot) -> Result<usize, BoardError> {
        let mut state = self.lock();
        self.place_marker_locked(&mut state, player, slot)
    }

    fn place_marker_locked(
        &self,
        state: &mut BoardState,
        player: PlayerId,
        slot: Slot,
    ) -> Result<usize, BoardError> {
        state.check_player(player)?;
        state.check_slot(slot)?;
        if state.slots[slot].is_none() {
            return Err(BoardError::SlotEmpty(slot));
        }
        let markers = &mut state.markers[player.index()];
        if markers.contains(&slot) {
            return Err(BoardError::DuplicateMarker { player, slot });
        }
        if markers.len() >= MARKERS_PER_PLAYER {
            return Err(BoardError::MarkerLimit(player));
        }
        markers.push(slot);
        let count = markers.len();
        self.observer.on_marker_placed(player, slot);
        Ok(count)
    }

    /// Removes `player`'s marker on `slot`. Returns `false` if there was none.
    #[instrument(skip(self))]
    pub fn remove_marker(&self, player: PlayerId, slot: Slot) -> bool {
        let mut state = self.lock();
        self.remove_marker_locked(&mut state, player, slot)
    }

    fn remove_marker_locked(&self, state: &mut BoardState, player: PlayerId, slot: Slot) -> bool {
        let Some(markers) = state.markers.get_mut(player.index()) else {
            return false;
        };
        match markers.iter().position(|&s| s == slot) {
            Some(pos) => {
                markers.remove(pos);
                self.observer.on_marker_removed(player, slot);
                true
            }
            None => false,
        }
    }

    /// Removes `player`'s marker on `slot` if present, otherwise places one.
    #[instrument(skip(self))]
    pub fn toggle_marker(&self, player: PlayerId, slot: Slot) -> Result<MarkerToggle, BoardError> {
        let mut state = self.lock();
        if self.remove_marker_locked(&mut state, player, slot) {
            return Ok(MarkerToggle::Removed);
        }
        let count = self.place_marker_locked(&mut state, player, slot)?;
        Ok(MarkerToggle::Placed { count })
    }

    /// Removes every marker `player` holds and returns their slots.
    #[instrument(skip(self))]
    pub fn clear_markers(&self, player: PlayerId) -> Vec<Slot> {
        let mut state = self.lock();
        self.clear_markers_locked(&mut state, player)
    }

    fn clear_markers_locked(&self, state: &mut BoardState, player: PlayerId) -> Vec<Slot> {
        let Some(markers) = state.markers.get_mut(player.index()) else {
            return Vec::new();
        };
        let cleared = std::mem::take(markers);
        for &slot in &cleared {
            self.observer.on_marker_removed(player, slot);
        }
        cleared
    }

    /// Resolves and judges `player`'s three markers in one critical section.
    ///
    /// See [`Claim`] for what each outcome leaves behind.
    #[instrument(skip(self, validator))]
    pub fn claim_triple(&self, player: PlayerId, validator: &dyn TripleValidator) -> Claim {
        let mut state = self.lock();
        let resolved = match state.markers.get(player.index()).map(Vec::as_slice) {
            Some(&[a, b, c]) => match (state.slots[a], state.slots[b], state.slots[c]) {
                (Some(x), Some(y), Some(z)) => Some(([a, b, c], [x, y, z])),
                _ => None,
            },
            _ => None,
        };
        let Some((slots, items)) = resolved else {
            self.clear_markers_locked(&mut state, player);
            debug!("Submission went stale");
            return Claim::Stale;
        };

        if !validator.is_valid_triple(items[0], items[1], items[2]) {
            self.clear_markers_locked(&mut state, player);
            debug!(?slots, "Triple rejected");
            return Claim::Invalid { slots };
        }

        for slot in slots {
            // Checked above under the same lock: the slot is occupied.
            let _ = self.remove_item_locked(&mut state, slot);
        }
        debug!(?slots, ?items, "Triple accepted");
        Claim::Valid { slots, items }
    }

    /// Removes every marker and every item, returning the items.
    #[instrument(skip(self))]
    pub fn clear_all(&self) -> Vec<Item> {
        let mut state = self.lock();
        for index in 0..state.markers.len() {
            self.clear_markers_locked(&mut state, PlayerId(index));
        }
        let mut items = Vec::new();
        for slot in 0..state.slots.len() {
            if let Some(item) = state.slots[slot].take() {
                self.observer.on_item_removed(slot);
                items.push(item);
            }
        }
        debug!(returned = items.len(), "Board cleared");
        items
    }

    /// Currently empty slots, from a snapshot taken at call time.
    pub fn empty_slots(&self) -> impl Iterator<Item = Slot> + use<> {
        let snapshot = self.lock().slots.clone();
        snapshot
            .into_iter()
            .enumerate()
            .filter_map(|(slot, item)| item.is_none().then_some(slot))
    }

    /// Currently occupied slots, in index order.
    pub fn occupied_slots(&self) -> Vec<Slot> {
        self.lock()
            .slots
            .iter()
            .enumerate()
            .filter_map(|(slot, item)| item.map(|_| slot))
            .collect()
    }

    /// Number of items on the board.
    pub fn count_items_on_board(&self) -> usize {
        self.lock().slots.iter().filter(|s| s.is_some()).count()
    }

    /// Items on the board, in slot order.
    pub fn items_on_board(&self) -> Vec<Item> {
        self.lock().slots.iter().flatten().copied().collect()
    }

    /// The item on `slot`, if any.
    pub fn item_at(&self, slot: Slot) -> Option<Item> {
        self.lock().slots.get(slot).copied().flatten()
    }

    /// `player`'s markers, in placement order.
    pub fn markers(&self, player: PlayerId) -> Vec<Slot> {
        self.lock()
            .markers
            .get(player.index())
            .cloned()
            .unwrap_or_default()
    }
}

impl BoardState {
    fn check_slot(&self, slot: Slot) -> Result<(), BoardError> {
        if slot < self.slots.len() {
            Ok(())
        } else {
            Err(BoardError::SlotOutOfRange {
                slot,
                size: self.slots.len(),
            })
        }
    }

    fn check_player(&self, player: PlayerId) -> Result<(), BoardError> {
        if player.index() < self.markers.len() {
            Ok(())
        } else {
            Err(BoardError::UnknownPlayer { player })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{ChannelObserver, GameEvent, NoopObserver};

    const P0: PlayerId = PlayerId(0);
    const P1: PlayerId = PlayerId(1);

    fn filled(slots: usize, players: usize) -> Board {
        let board = Board::new(slots, players, Arc::new(NoopObserver));
        for slot in 0..slots {
            board.place_item(slot, Item(slot as u32)).unwrap();
        }
        board
    }

    fn always(_: Item, _: Item, _: Item) -> bool {
        true
    }

    fn never(_: Item, _: Item, _: Item) -> bool {
        false
    }

    #[test]
    fn place_item_rejects_occupied_and_out_of_range() {
        let board = filled(3, 1);
        assert_eq!(board.place_item(0, Item(9)), Err(BoardError::SlotOccupied(0)));
        assert!(matches!(
            board.place_item(3, Item(9)),
            Err(BoardError::SlotOutOfRange { slot: 3, size: 3 })
        ));
    }

    #[test]
    fn place_marker_enforces_limits() {
        let board = filled(5, 1);
        assert_eq!(board.place_marker(P0, 0), Ok(1));
        assert_eq!(
            board.place_marker(P0, 0),
            Err(BoardError::DuplicateMarker { player: P0, slot: 0 })
        );
        assert_eq!(board.place_marker(P0, 1), Ok(2));
        assert_eq!(board.place_marker(P0, 2), Ok(3));
        assert_eq!(board.place_marker(P0, 3), Err(BoardError::MarkerLimit(P0)));

        board.remove_item(4).unwrap();
        board.remove_marker(P0, 2);
        assert_eq!(board.place_marker(P0, 4), Err(BoardError::SlotEmpty(4)));
        assert!(matches!(
            board.place_marker(PlayerId(7), 0),
            Err(BoardError::UnknownPlayer { .. })
        ));
    }

    #[test]
    fn removing_missing_marker_is_a_noop() {
        let board = filled(4, 2);
        board.place_marker(P0, 1).unwrap();
        assert!(!board.remove_marker(P0, 2));
        assert!(!board.remove_marker(P1, 1));
        assert_eq!(board.markers(P0), vec![1]);
        assert!(board.markers(P1).is_empty());
    }

    #[test]
    fn place_then_remove_restores_markers() {
        let board = filled(4, 1);
        board.place_marker(P0, 3).unwrap();
        let before = board.markers(P0);
        board.place_marker(P0, 0).unwrap();
        assert!(board.remove_marker(P0, 0));
        assert_eq!(board.markers(P0), before);
    }

    #[test]
    fn toggle_places_then_removes() {
        let board = filled(3, 1);
        assert_eq!(board.toggle_marker(P0, 2), Ok(MarkerToggle::Placed { count: 1 }));
        assert_eq!(board.toggle_marker(P0, 2), Ok(MarkerToggle::Removed));
        assert!(board.markers(P0).is_empty());
    }

    #[test]
    fn removing_an_item_cascades_to_every_marker() {
        let board = filled(4, 3);
        board.place_marker(P0, 2).unwrap();
        board.place_marker(P1, 2).unwrap();
        board.place_marker(P1, 3).unwrap();

        let removal = board.remove_item(2).unwrap();
        assert_eq!(removal.item, Item(2));
        assert_eq!(removal.affected, vec![P0, P1]);
        assert!(board.markers(P0).is_empty());
        assert_eq!(board.markers(P1), vec![3]);
        assert_eq!(board.remove_item(2), Err(BoardError::SlotEmpty(2)));
    }

    #[test]
    fn empty_slots_is_recomputed_per_call() {
        let board = filled(5, 1);
        assert_eq!(board.empty_slots().count(), 0);
        board.remove_item(1).unwrap();
        board.remove_item(3).unwrap();
        assert_eq!(board.empty_slots().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(board.count_items_on_board(), 3);
        assert_eq!(board.occupied_slots(), vec![0, 2, 4]);
    }

    #[test]
    fn valid_claim_removes_items_and_other_players_markers() {
        let board = filled(12, 2);
        for slot in [1, 4, 9] {
            board.place_marker(P0, slot).unwrap();
        }
        board.place_marker(P1, 4).unwrap();
        board.place_marker(P1, 5).unwrap();

        let claim = board.claim_triple(P0, &always);
        assert_eq!(
            claim,
            Claim::Valid {
                slots: [1, 4, 9],
                items: [Item(1), Item(4), Item(9)]
            }
        );
        assert_eq!(board.empty_slots().collect::<Vec<_>>(), vec![1, 4, 9]);
        assert!(board.markers(P0).is_empty());
        assert_eq!(board.markers(P1), vec![5]);
    }

    #[test]
    fn invalid_claim_clears_only_the_claimant() {
        let board = filled(6, 2);
        for slot in [0, 1, 2] {
            board.place_marker(P0, slot).unwrap();
        }
        board.place_marker(P1, 0).unwrap();

        assert_eq!(board.claim_triple(P0, &never), Claim::Invalid { slots: [0, 1, 2] });
        assert_eq!(board.count_items_on_board(), 6);
        assert!(board.markers(P0).is_empty());
        assert_eq!(board.markers(P1), vec![0]);
    }

    #[test]
    fn overlapping_claims_leave_the_second_stale() {
        let board = filled(12, 2);
        for slot in [1, 4, 9] {
            board.place_marker(P0, slot).unwrap();
        }
        for slot in [4, 9, 11] {
            board.place_marker(P1, slot).unwrap();
        }

        assert!(matches!(board.claim_triple(P0, &always), Claim::Valid { .. }));
        // Refill the freed slots: the stale claim must not see the new items.
        for slot in [1, 4, 9] {
            board.place_item(slot, Item(100 + slot as u32)).unwrap();
        }
        assert_eq!(board.claim_triple(P1, &always), Claim::Stale);
        assert!(board.markers(P1).is_empty());
        assert_eq!(board.count_items_on_board(), 12);
    }

    #[test]
    fn clear_all_returns_every_item() {
        let board = filled(5, 2);
        board.place_marker(P0, 0).unwrap();
        board.place_marker(P1, 4).unwrap();
        let mut items = board.clear_all();
        items.sort();
        assert_eq!(items, (0..5).map(Item).collect::<Vec<_>>());
        assert_eq!(board.count_items_on_board(), 0);
        assert!(board.markers(P0).is_empty());
        assert!(board.markers(P1).is_empty());
    }

    #[test]
    fn notifications_follow_mutation_order() {
        let (observer, mut events) = ChannelObserver::new();
        let board = Board::new(3, 1, Arc::new(observer));
        board.place_item(0, Item(5)).unwrap();
        board.place_marker(P0, 0).unwrap();
        board.remove_item(0).unwrap();

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(
            seen,
            vec![
                GameEvent::ItemPlaced { slot: 0, item: Item(5) },
                GameEvent::MarkerPlaced { player: P0, slot: 0 },
                GameEvent::MarkerRemoved { player: P0, slot: 0 },
                GameEvent::ItemRemoved { slot: 0 },
            ]
        );
    }
}
