//! Player agents: input handles, per-player state, and the action pipeline.
//!
//! Each player is an actor task. Input arrives through an [`ActionHandle`]
//! (keyboard events for humans, a generator task for computer players) into
//! a FIFO of capacity three. The agent turns actions into marker toggles and,
//! on the third marker, sends a [`Submission`] to the controller and waits on
//! its one-shot reply before applying the verdict.

mod automated;
mod freeze;

pub use freeze::{FreezeOutcome, FreezeTimer};

use crate::board::{Board, MarkerToggle};
use crate::observer::GameObserver;
use crate::rng::GameRng;
use crate::types::{MARKERS_PER_PLAYER, PlayerId, Slot, Verdict};
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// How a player's actions are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PlayerMode {
    /// Actions come from external input events.
    Human,
    /// Actions are generated at random from the occupied slots.
    Computer,
}

/// A player's claim that its three markers form a valid triple.
#[derive(Debug)]
pub struct Submission {
    /// Submitting player.
    pub player: PlayerId,
    /// Resolved by the controller with the verdict.
    pub reply: oneshot::Sender<Verdict>,
}

#[derive(Debug, Default)]
struct PlayerState {
    score: u32,
    frozen_until: Option<Instant>,
    awaiting_verdict: bool,
}

impl PlayerState {
    fn is_frozen(&self) -> bool {
        self.frozen_until.is_some_and(|until| Instant::now() < until)
    }

    fn accepts_actions(&self) -> bool {
        !self.is_frozen() && !self.awaiting_verdict
    }
}

/// Per-player state shared between the agent, its input handle and the
/// controller.
#[derive(Debug, Default)]
pub struct PlayerStatus {
    state: Mutex<PlayerState>,
}

impl PlayerStatus {
    fn lock(&self) -> MutexGuard<'_, PlayerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current score.
    pub fn score(&self) -> u32 {
        self.lock().score
    }

    /// Whether the player is serving a freeze right now.
    pub fn is_frozen(&self) -> bool {
        self.lock().is_frozen()
    }

    /// Whether the player is waiting for the controller's verdict.
    pub fn is_awaiting_verdict(&self) -> bool {
        self.lock().awaiting_verdict
    }

    fn award_point(&self) -> u32 {
        let mut state = self.lock();
        state.score += 1;
        state.score
    }

    fn set_awaiting(&self, awaiting: bool) {
        self.lock().awaiting_verdict = awaiting;
    }

    fn freeze_until(&self, until: Option<Instant>) {
        let mut state = self.lock();
        state.frozen_until = until;
        state.awaiting_verdict = false;
    }

    /// Drops every queued action, starts the freeze and releases the verdict
    /// wait under one lock. [`ActionHandle::submit_action`] queues under the
    /// same lock, so nothing lands in the queue once the freeze is set.
    ///
    /// Returns the number of dropped actions.
    fn settle(&self, pending: &mut mpsc::Receiver<Slot>, until: Option<Instant>) -> usize {
        let mut state = self.lock();
        let mut dropped = 0;
        while pending.try_recv().is_ok() {
            dropped += 1;
        }
        state.frozen_until = until;
        state.awaiting_verdict = false;
        dropped
    }
}

/// Input side of a player: accepts slot actions into the bounded queue.
#[derive(Debug, Clone)]
pub struct ActionHandle {
    player: PlayerId,
    slot_count: usize,
    status: Arc<PlayerStatus>,
    action_tx: mpsc::Sender<Slot>,
}

impl ActionHandle {
    /// The player this handle feeds.
    pub fn player(&self) -> PlayerId {
        self.player
    }

    /// The player's shared state.
    pub fn status(&self) -> &PlayerStatus {
        &self.status
    }

    /// Queues an action on `slot`.
    ///
    /// Returns `false` (and drops the action) if the slot is outside the
    /// board, the player is frozen or awaiting a verdict, or three actions are
    /// already queued.
    #[instrument(skip(self), fields(player = %self.player))]
    pub fn submit_action(&self, slot: Slot) -> bool {
        if slot >= self.slot_count {
            debug!(slot_count = self.slot_count, "Action outside the board rejected");
            return false;
        }
        let state = self.status.lock();
        if !state.accepts_actions() {
            debug!("Player is frozen or awaiting a verdict, action rejected");
            return false;
        }
        match self.action_tx.try_send(slot) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("Action queue full, action rejected");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Player has stopped, action rejected");
                false
            }
        }
    }
}

/// Timings an agent applies to verdicts.
#[derive(Debug, Clone, Copy)]
pub struct AgentTimings {
    /// Freeze after a point.
    pub point_freeze: Duration,
    /// Freeze after a penalty.
    pub penalty_freeze: Duration,
    /// Freeze display refresh interval.
    pub freeze_tick: Duration,
    /// Pause between generated actions of a computer player.
    pub computer_delay: Duration,
}

/// A player actor, ready to be spawned by the controller.
pub struct PlayerAgent {
    player: PlayerId,
    mode: PlayerMode,
    board: Arc<Board>,
    observer: Arc<dyn GameObserver>,
    status: Arc<PlayerStatus>,
    handle: ActionHandle,
    action_rx: mpsc::Receiver<Slot>,
    submissions: mpsc::UnboundedSender<Submission>,
    timings: AgentTimings,
    rng: GameRng,
}

impl std::fmt::Debug for PlayerAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerAgent")
            .field("player", &self.player)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl PlayerAgent {
    /// Creates an agent together with its input handle.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(board, observer, submissions, rng))]
    pub fn new(
        player: PlayerId,
        mode: PlayerMode,
        board: Arc<Board>,
        observer: Arc<dyn GameObserver>,
        submissions: mpsc::UnboundedSender<Submission>,
        timings: AgentTimings,
        rng: GameRng,
    ) -> (Self, ActionHandle) {
        let (action_tx, action_rx) = mpsc::channel(MARKERS_PER_PLAYER);
        let status = Arc::new(PlayerStatus::default());
        let handle = ActionHandle {
            player,
            slot_count: board.slot_count(),
            status: Arc::clone(&status),
            action_tx,
        };
        let agent = Self {
            player,
            mode,
            board,
            observer,
            status,
            handle: handle.clone(),
            action_rx,
            submissions,
            timings,
            rng,
        };
        (agent, handle)
    }

    /// The agent's player.
    pub fn player(&self) -> PlayerId {
        self.player
    }

    /// Shared state, readable by the controller.
    pub fn status(&self) -> Arc<PlayerStatus> {
        Arc::clone(&self.status)
    }

    /// Spawns the agent (and its generator, for computer players).
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Runs the action pipeline until `cancel` fires or input closes.
    #[instrument(skip(self, cancel), fields(player = %self.player, mode = %self.mode))]
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Player starting");
        let generator_cancel = cancel.child_token();
        let generator = match self.mode {
            PlayerMode::Computer => Some(automated::spawn_generator(
                self.handle.clone(),
                Arc::clone(&self.board),
                self.rng.clone(),
                self.timings.computer_delay,
                generator_cancel.clone(),
            )),
            PlayerMode::Human => None,
        };

        loop {
            let action = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                action = self.action_rx.recv() => action,
            };
            let Some(slot) = action else {
                debug!("Input closed");
                break;
            };
            if self.process(slot, &cancel).await.is_break() {
                break;
            }
        }

        generator_cancel.cancel();
        if let Some(generator) = generator
            && let Err(e) = generator.await
        {
            warn!(error = %e, "Action generator failed");
        }
        info!("Player terminated");
    }

    async fn process(&mut self, slot: Slot, cancel: &CancellationToken) -> ControlFlow<()> {
        match self.board.toggle_marker(self.player, slot) {
            Ok(MarkerToggle::Removed) => debug!(slot, "Marker removed"),
            Ok(MarkerToggle::Placed { count }) if count == MARKERS_PER_PLAYER => {
                return self.submit(cancel).await;
            }
            Ok(MarkerToggle::Placed { count }) => debug!(slot, count, "Marker placed"),
            Err(e) => debug!(slot, error = %e, "Action dropped"),
        }
        ControlFlow::Continue(())
    }

    /// Hands the completed triple to the controller and applies its verdict.
    #[instrument(skip(self, cancel), fields(player = %self.player))]
    async fn submit(&mut self, cancel: &CancellationToken) -> ControlFlow<()> {
        self.status.set_awaiting(true);
        let (reply, verdict_rx) = oneshot::channel();
        let submission = Submission {
            player: self.player,
            reply,
        };
        if self.submissions.send(submission).is_err() {
            debug!("Controller is gone");
            return ControlFlow::Break(());
        }

        let verdict = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Terminated while awaiting verdict");
                return ControlFlow::Break(());
            }
            verdict = verdict_rx => verdict,
        };
        let verdict = match verdict {
            Ok(verdict) => verdict,
            Err(_) => {
                debug!("Verdict channel dropped, treating as void");
                Verdict::Void
            }
        };
        debug!(%verdict, "Verdict received");

        self.board.clear_markers(self.player);

        let freeze = match verdict {
            Verdict::Point => self.timings.point_freeze,
            Verdict::Penalty => self.timings.penalty_freeze,
            Verdict::Void => Duration::ZERO,
        };
        let timer = (!freeze.is_zero())
            .then(|| FreezeTimer::start(freeze, self.timings.freeze_tick));
        // Actions queued before the verdict refer to a board that has moved on.
        let dropped = self
            .status
            .settle(&mut self.action_rx, timer.as_ref().map(FreezeTimer::deadline));
        if dropped > 0 {
            debug!(dropped, "Stale actions dropped");
        }

        if verdict == Verdict::Point {
            let score = self.status.award_point();
            self.observer.on_score_changed(self.player, score);
        }
        match timer {
            Some(timer) => self.freeze(freeze, timer, cancel).await,
            None => ControlFlow::Continue(()),
        }
    }

    async fn freeze(
        &self,
        duration: Duration,
        timer: FreezeTimer,
        cancel: &CancellationToken,
    ) -> ControlFlow<()> {
        self.observer.on_freeze_changed(self.player, duration);

        let outcome = timer
            .wait(cancel, |remaining| {
                self.observer.on_freeze_changed(self.player, remaining)
            })
            .await;

        self.status.freeze_until(None);
        match outcome {
            FreezeOutcome::Elapsed => {
                self.observer.on_freeze_changed(self.player, Duration::ZERO);
                ControlFlow::Continue(())
            }
            FreezeOutcome::Cancelled => ControlFlow::Break(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoopObserver;
    use crate::types::Item;

    fn seated(slots: usize) -> (PlayerAgent, ActionHandle) {
        let board = Arc::new(Board::new(slots, 1, Arc::new(NoopObserver)));
        for slot in 0..slots {
            board.place_item(slot, Item(slot as u32)).unwrap();
        }
        let (submissions, _) = mpsc::unbounded_channel();
        let timings = AgentTimings {
            point_freeze: Duration::from_secs(1),
            penalty_freeze: Duration::from_secs(3),
            freeze_tick: Duration::from_millis(100),
            computer_delay: Duration::from_millis(50),
        };
        PlayerAgent::new(
            PlayerId(0),
            PlayerMode::Human,
            board,
            Arc::new(NoopObserver),
            submissions,
            timings,
            GameRng::new(1),
        )
    }

    #[tokio::test]
    async fn awaiting_a_verdict_rejects_actions() {
        let (_agent, handle) = seated(6);
        handle.status.set_awaiting(true);
        assert!(!handle.submit_action(0));
        handle.status.set_awaiting(false);
        assert!(handle.submit_action(0));
    }

    #[tokio::test(start_paused = true)]
    async fn settling_drops_queued_actions_and_freezes() {
        let (mut agent, handle) = seated(6);
        assert!(handle.submit_action(0));
        assert!(handle.submit_action(1));

        let until = Instant::now() + Duration::from_secs(1);
        assert_eq!(agent.status.settle(&mut agent.action_rx, Some(until)), 2);

        assert!(handle.status().is_frozen());
        assert!(!handle.submit_action(2));
        assert!(agent.action_rx.try_recv().is_err());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(handle.submit_action(2));
        assert_eq!(agent.action_rx.try_recv(), Ok(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn actions_racing_a_freeze_are_never_queued() {
        let (mut agent, handle) = seated(6);
        for _ in 0..200 {
            let stop = CancellationToken::new();
            let presser = handle.clone();
            let stop_pressing = stop.clone();
            let pressing = tokio::spawn(async move {
                while !stop_pressing.is_cancelled() {
                    presser.submit_action(3);
                    tokio::task::yield_now().await;
                }
            });
            tokio::task::yield_now().await;

            let until = Instant::now() + Duration::from_secs(60);
            agent.status.settle(&mut agent.action_rx, Some(until));
            assert!(agent.action_rx.try_recv().is_err());

            stop.cancel();
            pressing.await.unwrap();
            assert!(agent.action_rx.try_recv().is_err());
            agent.status.freeze_until(None);
        }
    }
}
