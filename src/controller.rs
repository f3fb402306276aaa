//! The arbitrating controller.
//!
//! The controller owns the item supply and is the only consumer of the
//! submission queue. It deals the board, starts the player agents, runs the
//! reshuffle countdown, validates submissions one at a time in arrival order,
//! and decides when a round and the game are over.

use crate::board::{Board, Claim};
use crate::config::GameConfig;
use crate::observer::GameObserver;
use crate::player::{
    ActionHandle, AgentTimings, PlayerAgent, PlayerMode, PlayerStatus, Submission,
};
use crate::rng::{CONTROLLER_STREAM, GameRng};
use crate::types::{Item, PlayerId, Slot, Verdict};
use crate::validator::{TripleValidator, find_triples, has_triple};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Controller lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    /// Filling the board from the supply.
    Dealing,
    /// Countdown running, submissions being validated.
    Running,
    /// Game over.
    Ended,
}

/// Why a round stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum RoundEnd {
    /// The reshuffle deadline elapsed.
    Timeout,
    /// The supply is empty and no valid triple is left on the board.
    Exhausted,
    /// Termination was requested.
    Terminated,
}

/// Where every item currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemLedger {
    /// Items still in the supply.
    pub supply: usize,
    /// Items on the board.
    pub on_board: usize,
    /// Items removed as part of a valid triple.
    pub removed: usize,
}

impl ItemLedger {
    /// Sum of all three partitions; always the configured item total.
    pub fn total(&self) -> usize {
        self.supply + self.on_board + self.removed
    }
}

/// Final result of a game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameOutcome {
    /// Every player holding the top score.
    pub winners: BTreeSet<PlayerId>,
    /// Final scores, indexed by player.
    pub scores: Vec<u32>,
    /// Item partition once the board was cleared.
    pub ledger: ItemLedger,
}

/// The arbitrating controller. Consumed by [`Controller::run`].
pub struct Controller {
    config: GameConfig,
    board: Arc<Board>,
    validator: Arc<dyn TripleValidator>,
    observer: Arc<dyn GameObserver>,
    supply: Vec<Item>,
    removed: usize,
    rng: GameRng,
    submission_tx: mpsc::UnboundedSender<Submission>,
    submission_rx: mpsc::UnboundedReceiver<Submission>,
    agents: Vec<PlayerAgent>,
    statuses: Vec<Arc<PlayerStatus>>,
    deadline: Instant,
    phase: Phase,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("phase", &self.phase)
            .field("supply", &self.supply.len())
            .field("removed", &self.removed)
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Builds the board, the supply and one agent per configured player.
    ///
    /// Humans take the lowest player ids. Returns the controller and one
    /// input handle per player, in id order.
    #[instrument(skip_all, fields(players = config.player_count(), slots = config.slot_count()))]
    pub fn new(
        config: GameConfig,
        validator: Arc<dyn TripleValidator>,
        observer: Arc<dyn GameObserver>,
    ) -> (Self, Vec<ActionHandle>) {
        let player_count = config.player_count();
        let board = Arc::new(Board::new(
            *config.slot_count(),
            player_count,
            Arc::clone(&observer),
        ));
        let (submission_tx, submission_rx) = mpsc::unbounded_channel();
        let timings = AgentTimings {
            point_freeze: config.point_freeze(),
            penalty_freeze: config.penalty_freeze(),
            freeze_tick: config.freeze_tick(),
            computer_delay: config.computer_delay(),
        };

        let mut agents = Vec::with_capacity(player_count);
        let mut handles = Vec::with_capacity(player_count);
        for index in 0..player_count {
            let mode = if index < *config.human_players() {
                PlayerMode::Human
            } else {
                PlayerMode::Computer
            };
            let (agent, handle) = PlayerAgent::new(
                PlayerId(index),
                mode,
                Arc::clone(&board),
                Arc::clone(&observer),
                submission_tx.clone(),
                timings,
                GameRng::for_stream(*config.seed(), CONTROLLER_STREAM + 1 + index as u64),
            );
            agents.push(agent);
            handles.push(handle);
        }
        let statuses = agents.iter().map(PlayerAgent::status).collect();

        let controller = Self {
            supply: (0..*config.total_items()).map(Item).collect(),
            rng: GameRng::for_stream(*config.seed(), CONTROLLER_STREAM),
            deadline: Instant::now() + config.turn_timeout(),
            config,
            board,
            validator,
            observer,
            removed: 0,
            submission_tx,
            submission_rx,
            agents,
            statuses,
            phase: Phase::Dealing,
        };
        (controller, handles)
    }

    /// The shared board.
    pub fn board(&self) -> Arc<Board> {
        Arc::clone(&self.board)
    }

    /// Sender side of the submission queue; every agent holds a clone.
    pub fn submitter(&self) -> mpsc::UnboundedSender<Submission> {
        self.submission_tx.clone()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Current item partition.
    pub fn ledger(&self) -> ItemLedger {
        ItemLedger {
            supply: self.supply.len(),
            on_board: self.board.count_items_on_board(),
            removed: self.removed,
        }
    }

    /// Runs the game until it ends on its own or `cancel` fires.
    ///
    /// Stops and joins every agent before returning.
    #[instrument(skip_all)]
    pub async fn run(mut self, cancel: CancellationToken) -> GameOutcome {
        info!("Controller starting");
        let players_cancel = cancel.child_token();
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        // `end_round` announces the reset countdown for the round after it.
        let mut countdown_announced = false;

        loop {
            self.set_phase(Phase::Dealing);
            self.deal();
            if !self.agents.is_empty() {
                tasks = std::mem::take(&mut self.agents)
                    .into_iter()
                    .map(|agent| agent.spawn(players_cancel.clone()))
                    .collect();
            }
            self.restart_deadline();
            if !countdown_announced {
                self.update_countdown();
            }

            self.set_phase(Phase::Running);
            let reason = self.timer_loop(&cancel).await;
            self.end_round(reason);
            countdown_announced = true;

            if reason == RoundEnd::Terminated || cancel.is_cancelled() {
                break;
            }
            if !has_triple(&self.supply, self.validator.as_ref()) {
                info!(remaining = self.supply.len(), "No valid triple left in the supply");
                break;
            }
        }

        self.set_phase(Phase::Ended);
        players_cancel.cancel();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Player task failed");
            }
        }
        // Agents are gone; anything still queued can only be answered void.
        self.drain_submissions();

        let outcome = self.outcome();
        self.observer.on_game_ended(&outcome.winners);
        info!(winners = ?outcome.winners, scores = ?outcome.scores, "Controller terminated");
        outcome
    }

    fn set_phase(&mut self, phase: Phase) {
        debug!(from = %self.phase, to = %phase, "Phase change");
        self.phase = phase;
    }

    async fn timer_loop(&mut self, cancel: &CancellationToken) -> RoundEnd {
        let tick = self.config.tick();
        loop {
            if cancel.is_cancelled() {
                return RoundEnd::Terminated;
            }
            if self.is_exhausted() {
                return RoundEnd::Exhausted;
            }
            let now = Instant::now();
            if now >= self.deadline {
                return RoundEnd::Timeout;
            }

            let wake = self.deadline.min(now + tick);
            let submission = tokio::select! {
                biased;
                _ = cancel.cancelled() => return RoundEnd::Terminated,
                Some(submission) = self.submission_rx.recv() => Some(submission),
                _ = sleep_until(wake) => None,
            };
            let verdict = submission.map(|submission| self.validate(submission));
            // A point already announced the fresh deadline.
            if verdict != Some(Verdict::Point) {
                self.update_countdown();
            }
        }
    }

    fn is_exhausted(&self) -> bool {
        self.supply.is_empty() && !has_triple(&self.board.items_on_board(), self.validator.as_ref())
    }

    /// Shuffles the supply and fills every empty slot.
    #[instrument(skip(self))]
    pub fn deal(&mut self) {
        self.rng.shuffle(&mut self.supply);
        let placed = self.replenish();
        info!(placed, supply = self.supply.len(), "Board dealt");
        if *self.config.hints() {
            let items = self.board.items_on_board();
            let triples = find_triples(&items, usize::MAX, self.validator.as_ref());
            info!(?triples, "Hint: valid triples on the board");
        }
    }

    /// Fills empty slots, in shuffled order, until slots or supply run out.
    fn replenish(&mut self) -> usize {
        let mut empty: Vec<Slot> = self.board.empty_slots().collect();
        self.rng.shuffle(&mut empty);
        let mut placed = 0;
        for slot in empty {
            let Some(item) = self.supply.pop() else {
                break;
            };
            match self.board.place_item(slot, item) {
                Ok(()) => placed += 1,
                Err(e) => {
                    warn!(slot, error = %e, "Replenishment skipped a slot");
                    self.supply.push(item);
                }
            }
        }
        placed
    }

    /// Validates one submission and sends its verdict.
    #[instrument(skip(self, submission), fields(player = %submission.player))]
    pub fn validate(&mut self, submission: Submission) -> Verdict {
        let Submission { player, reply } = submission;
        let verdict = match self.board.claim_triple(player, self.validator.as_ref()) {
            Claim::Stale => Verdict::Void,
            Claim::Invalid { slots } => {
                debug!(?slots, "Invalid triple");
                Verdict::Penalty
            }
            Claim::Valid { slots, items } => {
                self.removed += items.len();
                info!(?slots, ?items, "Valid triple");
                self.replenish();
                self.reset_deadline();
                Verdict::Point
            }
        };
        if reply.send(verdict).is_err() {
            debug!("Player stopped before its verdict arrived");
        }
        verdict
    }

    fn restart_deadline(&mut self) {
        self.deadline = Instant::now() + self.config.turn_timeout();
    }

    fn reset_deadline(&mut self) {
        self.restart_deadline();
        self.update_countdown();
    }

    fn update_countdown(&self) {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        let low_time = remaining <= self.config.turn_timeout_warning();
        self.observer.on_countdown_changed(remaining, low_time);
    }

    /// Returns every item to the supply and answers queued submissions void.
    #[instrument(skip(self))]
    pub fn end_round(&mut self, reason: RoundEnd) {
        let returned = self.board.clear_all();
        info!(returned = returned.len(), "Round over");
        self.supply.extend(returned);
        self.drain_submissions();
        self.observer
            .on_countdown_changed(self.config.turn_timeout(), false);
    }

    fn drain_submissions(&mut self) {
        while let Ok(Submission { player, reply }) = self.submission_rx.try_recv() {
            self.board.clear_markers(player);
            debug!(%player, "Pending submission dropped");
            let _ = reply.send(Verdict::Void);
        }
    }

    fn outcome(&self) -> GameOutcome {
        let scores: Vec<u32> = self.statuses.iter().map(|s| s.score()).collect();
        let top = scores.iter().copied().max();
        let winners = scores
            .iter()
            .enumerate()
            .filter(|&(_, &score)| Some(score) == top)
            .map(|(index, _)| PlayerId(index))
            .collect();
        GameOutcome {
            winners,
            scores,
            ledger: self.ledger(),
        }
    }

    /// Time left before the board is reshuffled.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{ChannelObserver, GameEvent, NoopObserver};
    use tokio::sync::oneshot;

    fn humans(players: usize, slots: usize, items: u32) -> GameConfig {
        GameConfig::default()
            .with_human_players(players)
            .with_computer_players(0)
            .with_slot_count(slots)
            .with_total_items(items)
            .with_seed(Some(11))
    }

    fn always() -> Arc<dyn TripleValidator> {
        Arc::new(|_: Item, _: Item, _: Item| true)
    }

    fn never() -> Arc<dyn TripleValidator> {
        Arc::new(|_: Item, _: Item, _: Item| false)
    }

    fn submit(
        controller: &mut Controller,
        player: PlayerId,
        slots: [Slot; 3],
    ) -> (Verdict, oneshot::Receiver<Verdict>) {
        let board = controller.board();
        for slot in slots {
            board.place_marker(player, slot).unwrap();
        }
        let (reply, rx) = oneshot::channel();
        (controller.validate(Submission { player, reply }), rx)
    }

    #[tokio::test]
    async fn deal_fills_board_and_keeps_ledger() {
        let (mut controller, _handles) =
            Controller::new(humans(1, 12, 81), always(), Arc::new(NoopObserver));
        controller.deal();
        let ledger = controller.ledger();
        assert_eq!(ledger.on_board, 12);
        assert_eq!(ledger.supply, 69);
        assert_eq!(ledger.total(), 81);
    }

    #[tokio::test]
    async fn valid_triple_removes_replenishes_and_scores() {
        let (mut controller, _handles) =
            Controller::new(humans(1, 12, 81), always(), Arc::new(NoopObserver));
        controller.deal();

        let (verdict, rx) = submit(&mut controller, PlayerId(0), [1, 4, 9]);

        assert_eq!(verdict, Verdict::Point);
        assert_eq!(rx.await.unwrap(), Verdict::Point);
        let ledger = controller.ledger();
        assert_eq!(ledger.removed, 3);
        assert_eq!(ledger.on_board, 12);
        assert_eq!(ledger.total(), 81);
    }

    #[tokio::test]
    async fn invalid_triple_is_penalized_without_removal() {
        let (mut controller, _handles) =
            Controller::new(humans(2, 12, 81), never(), Arc::new(NoopObserver));
        controller.deal();

        let (verdict, _rx) = submit(&mut controller, PlayerId(1), [0, 2, 3]);

        assert_eq!(verdict, Verdict::Penalty);
        assert_eq!(controller.ledger().removed, 0);
        assert!(controller.board().markers(PlayerId(1)).is_empty());
    }

    #[tokio::test]
    async fn overlapping_submission_is_void() {
        let (mut controller, _handles) =
            Controller::new(humans(2, 12, 81), always(), Arc::new(NoopObserver));
        controller.deal();
        let board = controller.board();
        for slot in [4, 9, 11] {
            board.place_marker(PlayerId(1), slot).unwrap();
        }

        let (first, _rx) = submit(&mut controller, PlayerId(0), [1, 4, 9]);
        let (reply, _rx2) = oneshot::channel();
        let second = controller.validate(Submission {
            player: PlayerId(1),
            reply,
        });

        assert_eq!(first, Verdict::Point);
        assert_eq!(second, Verdict::Void);
        assert_eq!(controller.ledger().removed, 3);
        assert!(board.markers(PlayerId(1)).is_empty());
    }

    #[tokio::test]
    async fn replenishment_stops_when_supply_runs_out() {
        let (mut controller, _handles) =
            Controller::new(humans(1, 12, 13), always(), Arc::new(NoopObserver));
        controller.deal();
        assert_eq!(controller.ledger().supply, 1);

        submit(&mut controller, PlayerId(0), [0, 1, 2]);

        let ledger = controller.ledger();
        assert_eq!(ledger.supply, 0);
        assert_eq!(ledger.on_board, 10);
        assert_eq!(controller.board().empty_slots().count(), 2);
        assert_eq!(ledger.total(), 13);
    }

    #[tokio::test]
    async fn end_round_returns_items_and_voids_pending() {
        let (observer, mut events) = ChannelObserver::new();
        let (mut controller, handles) =
            Controller::new(humans(1, 12, 81), always(), Arc::new(observer));
        controller.deal();
        let board = controller.board();
        board.place_marker(PlayerId(0), 3).unwrap();

        // A submission still queued when the round ends.
        let (reply, rx) = oneshot::channel();
        controller
            .submitter()
            .send(Submission { player: PlayerId(0), reply })
            .unwrap();

        controller.end_round(RoundEnd::Timeout);

        assert_eq!(rx.await.unwrap(), Verdict::Void);
        let ledger = controller.ledger();
        assert_eq!(ledger.supply, 81);
        assert_eq!(ledger.on_board, 0);
        assert!(board.markers(PlayerId(0)).is_empty());
        drop(handles);

        let mut last = None;
        while let Ok(event) = events.try_recv() {
            last = Some(event);
        }
        assert_eq!(
            last,
            Some(GameEvent::CountdownChanged {
                remaining: Duration::from_secs(60),
                low_time: false
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_game_ends_with_all_tied_winners() {
        let (observer, mut events) = ChannelObserver::new();
        let (controller, _handles) = Controller::new(humans(3, 3, 3), never(), Arc::new(observer));

        let outcome = controller.run(CancellationToken::new()).await;

        assert_eq!(outcome.scores, vec![0, 0, 0]);
        assert_eq!(outcome.winners.len(), 3);
        let mut ended = false;
        while let Ok(event) = events.try_recv() {
            ended |= matches!(event, GameEvent::GameEnded { .. });
        }
        assert!(ended);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_reshuffles_the_board() {
        let config = humans(1, 12, 81).with_turn_timeout_millis(1_000);
        let (observer, mut events) = ChannelObserver::new();
        let (controller, _handles) = Controller::new(config, always(), Arc::new(observer));
        let cancel = CancellationToken::new();
        let run = tokio::spawn(controller.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        cancel.cancel();
        let outcome = run.await.unwrap();

        let placed = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|e| matches!(e, GameEvent::ItemPlaced { .. }))
            .count();
        // Initial deal plus one deal per elapsed deadline.
        assert!(placed >= 36, "saw {placed} placements");
        assert_eq!(outcome.scores, vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn player_awaiting_a_verdict_rejects_actions() {
        let config = humans(1, 12, 81).with_point_freeze_millis(0);
        let (mut controller, handles) =
            Controller::new(config, always(), Arc::new(NoopObserver));
        controller.deal();
        let input = &handles[0];
        let cancel = CancellationToken::new();
        let agent = controller.agents.remove(0).spawn(cancel.clone());

        for slot in [1, 4, 9] {
            assert!(input.submit_action(slot));
        }
        let submission = controller.submission_rx.recv().await.unwrap();
        assert!(input.status().is_awaiting_verdict());
        assert!(!input.submit_action(5));

        assert_eq!(controller.validate(submission), Verdict::Point);
        tokio::time::timeout(Duration::from_secs(1), async {
            while input.status().is_awaiting_verdict() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(input.status().score(), 1);
        assert!(input.submit_action(5));

        cancel.cancel();
        agent.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_is_announced_once_per_reset() {
        let config = humans(1, 12, 81)
            .with_turn_timeout_millis(1_000)
            .with_turn_timeout_warning_millis(200);
        let (observer, mut events) = ChannelObserver::new();
        let (controller, _handles) = Controller::new(config, always(), Arc::new(observer));
        let cancel = CancellationToken::new();
        let run = tokio::spawn(controller.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        cancel.cancel();
        run.await.unwrap();

        let countdown: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .filter_map(|e| match e {
                GameEvent::CountdownChanged { remaining, low_time } => Some((remaining, low_time)),
                _ => None,
            })
            .collect();
        for pair in countdown.windows(2) {
            assert_ne!(pair[0], pair[1], "repeated countdown {:?}", pair[0]);
        }
        // First deal, two timeouts and the final termination.
        let resets = countdown
            .iter()
            .filter(|&&c| c == (Duration::from_secs(1), false))
            .count();
        assert_eq!(resets, 4);
    }
}
